#![no_main]

use libfuzzer_sys::fuzz_target;
use std::sync::Arc;
use tssection::demultiplex::{DemuxConfig, DemuxControl, SectionDemux};
use tssection::packet::Pid;
use tssection::psi::decode::{DecodedTable, TableRegistry};
use tssection::psi::{BinaryTable, Section};

fuzz_target!(|data: &[u8]| {
    let config = DemuxConfig::default()
        .with_next(true)
        .with_report_invalid_sections(true)
        .with_short_section_tables(true);
    let mut demux = SectionDemux::new(config);
    demux.add_pids(vec![Pid::PAT, Pid::TDT, Pid::new(0x100)]);
    let registry = TableRegistry::standard();
    demux.set_table_handler(Some(Box::new(
        move |ctl: &mut DemuxControl<'_>, table: &BinaryTable| {
            if let Some(Ok(DecodedTable::Pat(pat))) = registry.decode(table) {
                ctl.add_pids(pat.pmt_pids());
            }
        },
    )));
    demux.set_section_handler(Some(Box::new(
        |_ctl: &mut DemuxControl<'_>, section: &Arc<Section>| {
            let _ = section.payload();
        },
    )));
    demux.push(data);
});
