//! Print the UTC time from the TDT, and local times from the TOT, found in a transport stream.
//!
//! ```text
//! tsdate [--all] [--notdt] [--notot] [--verbose] [FILE]
//! ```
//!
//! Reads standard input when no file is named.  Exits with status 1 if no time table was found.

use std::cell::RefCell;
use std::env;
use std::fs::File;
use std::io;
use std::process;
use std::rc::Rc;
use tssection::demultiplex::{DemuxConfig, DemuxControl, SectionDemux};
use tssection::packet::{Packet, Pid};
use tssection::psi::time::{format_time_offset, Tdt, Tot};
use tssection::psi::{tid, BinaryTable};

const TIME_FORMAT: &str = "%Y/%m/%d %H:%M:%S";

#[derive(Default)]
struct Options {
    all: bool,
    no_tdt: bool,
    no_tot: bool,
    verbose: bool,
    infile: Option<String>,
}

fn parse_args() -> Result<Options, String> {
    let mut opts = Options::default();
    for arg in env::args().skip(1) {
        match arg.as_str() {
            "-a" | "--all" => opts.all = true,
            "--notdt" => opts.no_tdt = true,
            "--notot" => opts.no_tot = true,
            "-v" | "--verbose" => opts.verbose = true,
            s if s.starts_with('-') => return Err(format!("unknown option {}", s)),
            _ if opts.infile.is_some() => return Err("only one input file allowed".to_string()),
            _ => opts.infile = Some(arg),
        }
    }
    Ok(opts)
}

#[derive(Default)]
struct Progress {
    tdt_done: bool,
    tot_done: bool,
    found: bool,
}

impl Progress {
    fn completed(&self) -> bool {
        self.tdt_done && self.tot_done
    }
}

fn print_tdt(table: &BinaryTable) {
    match Tdt::decode(table) {
        Ok(tdt) => println!("* TDT UTC time: {}", tdt.utc_time.format(TIME_FORMAT)),
        Err(e) => log::warn!("bad TDT: {}", e),
    }
}

fn print_tot(table: &BinaryTable) {
    let tot = match Tot::decode(table) {
        Ok(tot) => tot,
        Err(e) => {
            log::warn!("bad TOT: {}", e);
            return;
        }
    };
    println!("* TOT UTC time: {}", tot.utc_time.format(TIME_FORMAT));
    for region in &tot.regions {
        println!(
            "  Country: {}, region: {}",
            region.country_code, region.region_id
        );
        println!(
            "  Local time:   {}, local time offset: {}",
            tot.local_time(region).format(TIME_FORMAT),
            format_time_offset(region.offset)
        );
        let next_change = region
            .time_of_change
            .map(|t| t.format(TIME_FORMAT).to_string())
            .unwrap_or_else(|| "unspecified".to_string());
        println!(
            "  Next change:  {}, next time offset:  {}",
            next_change,
            format_time_offset(region.next_offset)
        );
    }
}

fn handle_table(opts: &Options, progress: &mut Progress, table: &BinaryTable) {
    match table.table_id() {
        tid::TDT if !opts.no_tdt => {
            progress.tdt_done = !opts.all;
            progress.found = true;
            if opts.verbose {
                println!("{:#?}", table);
            }
            print_tdt(table);
        }
        tid::TOT if !opts.no_tot => {
            progress.tot_done = !opts.all;
            progress.found = true;
            if opts.verbose {
                println!("{:#?}", table);
            }
            print_tot(table);
        }
        tid::TDT | tid::TOT => (),
        other => {
            if opts.verbose {
                let pid = table.source_pid().unwrap_or(Pid::NULL);
                println!("* Got unexpected TID {} ({:#04x}) on PID {}", other, other, pid);
            }
        }
    }
}

fn run<R: io::Read>(mut r: R, demux: &mut SectionDemux, done: impl Fn() -> bool) -> io::Result<()> {
    let mut buf = vec![0u8; Packet::SIZE * 1024];
    let mut len = 0;
    while !done() {
        let n = r.read(&mut buf[len..])?;
        if n == 0 {
            break;
        }
        len += n;
        let whole = len - len % Packet::SIZE;
        demux.push(&buf[..whole]);
        buf.copy_within(whole..len, 0);
        len -= whole;
    }
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let opts = match parse_args() {
        Ok(opts) => Rc::new(opts),
        Err(msg) => {
            eprintln!("tsdate: {}", msg);
            eprintln!("usage: tsdate [--all] [--notdt] [--notot] [--verbose] [FILE]");
            process::exit(2);
        }
    };
    let progress = Rc::new(RefCell::new(Progress {
        tdt_done: opts.no_tdt,
        tot_done: opts.no_tot,
        found: false,
    }));

    let mut demux = SectionDemux::new(DemuxConfig::default().with_short_section_tables(true));
    demux.add_pid(Pid::TDT);
    {
        let opts = opts.clone();
        let progress = progress.clone();
        demux.set_table_handler(Some(Box::new(
            move |_ctl: &mut DemuxControl<'_>, table: &BinaryTable| {
                handle_table(&opts, &mut progress.borrow_mut(), table)
            },
        )));
    }

    let done = || progress.borrow().completed();
    let result = match opts.infile {
        Some(ref name) => match File::open(name) {
            Ok(f) => run(f, &mut demux, done),
            Err(e) => {
                eprintln!("tsdate: {}: {}", name, e);
                process::exit(1);
            }
        },
        None => run(io::stdin().lock(), &mut demux, done),
    };
    if let Err(e) = result {
        eprintln!("tsdate: error reading input: {}", e);
        process::exit(1);
    }
    if demux.status().has_errors() {
        log::warn!("{}", demux.status());
    }
    if !progress.borrow().found {
        eprintln!("tsdate: no TDT or TOT found");
        process::exit(1);
    }
}
