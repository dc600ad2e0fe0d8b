//! Dump the tables found on some PIDs of a transport stream.
//!
//! ```text
//! tstables [--verbose] FILE [PID...]
//! ```
//!
//! PIDs may be given in decimal or as `0x`-prefixed hex, and default to the PAT PID.  The PMT
//! PIDs listed by a PAT are followed automatically.  With `--verbose`, a summary of the PCRs,
//! random access points and priority packets of every PID is printed at the end.

use std::collections::BTreeMap;
use std::env;
use std::fs::File;
use std::io;
use std::process;
use tssection::demultiplex::{DemuxConfig, DemuxControl, SectionDemux};
use tssection::packet::{Packet, Pid};
use tssection::psi::decode::{DecodedTable, TableRegistry};
use tssection::psi::BinaryTable;

fn parse_pid(s: &str) -> Option<Pid> {
    let value = match s.strip_prefix("0x") {
        Some(hex) => u16::from_str_radix(hex, 16).ok()?,
        None => s.parse().ok()?,
    };
    Pid::try_from(value).ok()
}

#[derive(Default)]
struct PidStats {
    packets: u64,
    priority: u64,
    random_access: u64,
    pcr_count: u64,
    first_pcr: Option<u64>,
    last_pcr: Option<u64>,
}

#[derive(Default)]
struct PacketStats {
    pids: BTreeMap<Pid, PidStats>,
}

impl PacketStats {
    fn record(&mut self, buf: &[u8]) {
        for pk in buf.chunks_exact(Packet::SIZE).filter_map(Packet::try_new) {
            let stats = self.pids.entry(pk.pid()).or_default();
            stats.packets += 1;
            if pk.transport_priority() {
                stats.priority += 1;
            }
            if let Some(af) = pk.adaptation_field() {
                if af.random_access_indicator() {
                    stats.random_access += 1;
                }
                if let Ok(pcr) = af.pcr() {
                    let pcr = u64::from(pcr);
                    stats.pcr_count += 1;
                    stats.first_pcr.get_or_insert(pcr);
                    stats.last_pcr = Some(pcr);
                }
            }
        }
    }

    fn print(&self) {
        for (pid, s) in &self.pids {
            print!(
                "PID {}: {} packets, {} priority, {} random access",
                pid, s.packets, s.priority, s.random_access
            );
            if let (Some(first), Some(last)) = (s.first_pcr, s.last_pcr) {
                print!(", {} PCRs from {} to {}", s.pcr_count, first, last);
            }
            println!();
        }
    }
}

fn run<R: io::Read>(
    mut r: R,
    demux: &mut SectionDemux,
    mut stats: Option<&mut PacketStats>,
) -> io::Result<()> {
    let mut buf = vec![0u8; Packet::SIZE * 1024];
    let mut len = 0;
    loop {
        let n = r.read(&mut buf[len..])?;
        if n == 0 {
            break;
        }
        len += n;
        let whole = len - len % Packet::SIZE;
        if let Some(stats) = stats.as_deref_mut() {
            stats.record(&buf[..whole]);
        }
        demux.push(&buf[..whole]);
        buf.copy_within(whole..len, 0);
        len -= whole;
    }
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let mut args = env::args().skip(1).peekable();
    let verbose = matches!(args.peek().map(String::as_str), Some("-v" | "--verbose"));
    if verbose {
        args.next();
    }
    let name = match args.next() {
        Some(name) => name,
        None => {
            eprintln!("usage: tstables [--verbose] FILE [PID...]");
            process::exit(2);
        }
    };
    let mut pids = vec![];
    for a in args {
        match parse_pid(&a) {
            Some(pid) => pids.push(pid),
            None => {
                eprintln!("tstables: invalid PID {:?}", a);
                process::exit(2);
            }
        }
    }
    if pids.is_empty() {
        pids.push(Pid::PAT);
    }

    let mut demux = SectionDemux::new(
        DemuxConfig::default()
            .with_next(true)
            .with_short_section_tables(true),
    );
    demux.add_pids(pids);
    let registry = TableRegistry::standard();
    demux.set_table_handler(Some(Box::new(
        move |ctl: &mut DemuxControl<'_>, table: &BinaryTable| {
            println!(
                "* PID {}, table_id {:#04x}, extension {}, version {}, {} section(s), {} bytes",
                table.source_pid().unwrap_or(Pid::NULL),
                table.table_id(),
                table.table_id_extension(),
                table.version(),
                table.section_count(),
                table.total_size()
            );
            match registry.decode(table) {
                Some(Ok(DecodedTable::Pat(pat))) => {
                    ctl.add_pids(pat.pmt_pids());
                    println!("{:#?}", pat);
                }
                Some(Ok(decoded)) => println!("{:#?}", decoded),
                Some(Err(e)) => println!("  undecodable: {}", e),
                None => (),
            }
        },
    )));

    let mut stats = PacketStats::default();
    let result = File::open(&name)
        .and_then(|f| run(f, &mut demux, Some(&mut stats).filter(|_| verbose)));
    if let Err(e) = result {
        eprintln!("tstables: {}: {}", name, e);
        process::exit(1);
    }
    println!("{}", demux.status());
    if verbose {
        stats.print();
    }
}
