//! Main types implementing the demultiplexing of sections and tables from a transport stream.
//!
//! [`SectionDemux`](struct.SectionDemux.html) owns one
//! [`SectionPacketConsumer`](../psi/reassembly/struct.SectionPacketConsumer.html) per filtered
//! PID.  Each completed section is passed to the registered
//! [`SectionHandler`](trait.SectionHandler.html), and is also collected into a
//! [`BinaryTable`](../psi/table/struct.BinaryTable.html), which is passed to the registered
//! [`TableHandler`](trait.TableHandler.html) once every one of its sections has arrived.
//!
//! ```
//! # use tssection::demultiplex::{DemuxConfig, DemuxControl, SectionDemux};
//! # use tssection::packet::Pid;
//! # use tssection::psi::BinaryTable;
//! let mut demux = SectionDemux::new(DemuxConfig::default());
//! demux.set_table_handler(Some(Box::new(
//!     |_ctl: &mut DemuxControl<'_>, table: &BinaryTable| {
//!         println!("table_id {:#x} version {}", table.table_id(), table.version());
//!     },
//! )));
//! demux.add_pid(Pid::PAT);
//! # let data: [u8; 0] = [];
//! demux.push(&data);
//! ```

use crate::packet;
use crate::psi::{BinaryTable, CurrentNext, Section};
use fixedbitset::FixedBitSet;
use log::trace;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Counters of the stream impairments met while demultiplexing.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DemuxStatus {
    /// Packets with a bad sync byte or `transport_error_indicator` set
    pub invalid_ts: u64,
    /// Unexpected jumps in continuity counter values
    pub discontinuities: u64,
    /// Packets dropped because their payload was scrambled
    pub scrambled: u64,
    /// Sections with an impossible length, or abandoned incomplete
    pub inv_sect_length: u64,
    /// Sections with `section_number` greater than `last_section_number`
    pub inv_sect_index: u64,
    /// Long sections failing the CRC check
    pub wrong_crc: u64,
    /// Sections left out of table assembly because they were not yet applicable
    pub is_next: u64,
}

impl DemuxStatus {
    /// `true` if any impairment has been counted.  `is_next` is not an impairment.
    pub fn has_errors(&self) -> bool {
        self.invalid_ts != 0
            || self.discontinuities != 0
            || self.scrambled != 0
            || self.inv_sect_length != 0
            || self.inv_sect_index != 0
            || self.wrong_crc != 0
    }

    pub fn reset(&mut self) {
        *self = DemuxStatus::default();
    }
}

impl fmt::Display for DemuxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid TS packets: {}, discontinuities: {}, scrambled: {}, invalid section lengths: {}, invalid section numbers: {}, CRC errors: {}, next sections: {}",
            self.invalid_ts,
            self.discontinuities,
            self.scrambled,
            self.inv_sect_length,
            self.inv_sect_index,
            self.wrong_crc,
            self.is_next
        )
    }
}

/// Options controlling which sections and tables a `SectionDemux` reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemuxConfig {
    /// Also pass sections failing the length or CRC checks to the section handler.  Such
    /// sections never become part of a table.
    pub report_invalid_sections: bool,
    /// Assemble tables with `current_next_indicator` set.
    pub current: bool,
    /// Assemble tables with `current_next_indicator` clear.  These are tracked separately
    /// from current tables with the same identity.
    pub next: bool,
    /// Also report each valid short section as a single-section table.
    pub short_section_tables: bool,
}

impl Default for DemuxConfig {
    fn default() -> DemuxConfig {
        DemuxConfig {
            report_invalid_sections: false,
            current: true,
            next: false,
            short_section_tables: false,
        }
    }
}

impl DemuxConfig {
    pub fn with_report_invalid_sections(mut self, report: bool) -> DemuxConfig {
        self.report_invalid_sections = report;
        self
    }
    pub fn with_current(mut self, current: bool) -> DemuxConfig {
        self.current = current;
        self
    }
    pub fn with_next(mut self, next: bool) -> DemuxConfig {
        self.next = next;
        self
    }
    pub fn with_short_section_tables(mut self, tables: bool) -> DemuxConfig {
        self.short_section_tables = tables;
        self
    }
}

/// Receives every section demultiplexed from a filtered PID.
pub trait SectionHandler {
    fn handle_section(&mut self, demux: &mut DemuxControl<'_>, section: &Arc<Section>);
}

impl<F> SectionHandler for F
where
    F: FnMut(&mut DemuxControl<'_>, &Arc<Section>),
{
    fn handle_section(&mut self, demux: &mut DemuxControl<'_>, section: &Arc<Section>) {
        self(demux, section)
    }
}

/// Receives every complete table demultiplexed from a filtered PID.
pub trait TableHandler {
    fn handle_table(&mut self, demux: &mut DemuxControl<'_>, table: &BinaryTable);
}

impl<F> TableHandler for F
where
    F: FnMut(&mut DemuxControl<'_>, &BinaryTable),
{
    fn handle_table(&mut self, demux: &mut DemuxControl<'_>, table: &BinaryTable) {
        self(demux, table)
    }
}

// A handler can't change the set of filtered PIDs while the demultiplexer is part way through
// processing a packet, so this changeset protocol lets it request changes that the
// demultiplexer applies once the packet is complete.

/// A change to the set of filtered PIDs, requested through `DemuxControl`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FilterChange {
    Add(packet::Pid),
    Remove(packet::Pid),
    Reset,
}

impl FilterChange {
    fn apply(self, demux: &mut SectionDemux) {
        match self {
            FilterChange::Add(pid) => demux.add_pid(pid),
            FilterChange::Remove(pid) => demux.remove_pid(pid),
            FilterChange::Reset => demux.reset(),
        }
    }
}

#[derive(Debug, Default)]
struct FilterChangeset {
    updates: Vec<FilterChange>,
}

impl FilterChangeset {
    fn push(&mut self, change: FilterChange) {
        self.updates.push(change)
    }
    fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }
    fn iter(&self) -> impl Iterator<Item = &FilterChange> {
        self.updates.iter()
    }
}

/// The view of a `SectionDemux` given to handlers.
///
/// Changes requested here take effect once the packet being processed has been completely
/// handled, so later sections from the same packet are still delivered.
pub struct DemuxControl<'a> {
    changeset: &'a mut FilterChangeset,
    pid_filter: &'a FixedBitSet,
    status: &'a DemuxStatus,
}

impl<'a> DemuxControl<'a> {
    pub fn add_pid(&mut self, pid: packet::Pid) {
        self.changeset.push(FilterChange::Add(pid));
    }

    pub fn add_pids<I: IntoIterator<Item = packet::Pid>>(&mut self, pids: I) {
        for pid in pids {
            self.add_pid(pid);
        }
    }

    pub fn remove_pid(&mut self, pid: packet::Pid) {
        self.changeset.push(FilterChange::Remove(pid));
    }

    /// Drop every filtered PID and all demultiplexing state.
    pub fn reset(&mut self) {
        self.changeset.push(FilterChange::Reset);
    }

    /// Whether the given PID will be filtered once the changes requested so far are applied.
    pub fn has_pid(&self, pid: packet::Pid) -> bool {
        self.changeset
            .iter()
            .fold(self.pid_filter.contains(usize::from(pid)), |present, change| {
                match *change {
                    FilterChange::Add(p) if p == pid => true,
                    FilterChange::Remove(p) if p == pid => false,
                    FilterChange::Reset => false,
                    _ => present,
                }
            })
    }

    pub fn status(&self) -> &DemuxStatus {
        self.status
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct TableKey {
    table_id: u8,
    table_id_extension: u16,
    current_next: CurrentNext,
}

#[derive(Default)]
struct TableContext {
    notified_version: Option<u8>,
    partial: Option<BinaryTable>,
}

struct PidContext {
    consumer: crate::psi::reassembly::SectionPacketConsumer,
    tables: HashMap<TableKey, TableContext>,
}

impl PidContext {
    fn new(pid: packet::Pid) -> PidContext {
        PidContext {
            consumer: crate::psi::reassembly::SectionPacketConsumer::new(pid),
            tables: HashMap::new(),
        }
    }

    /// Fold the section into the table it belongs to, returning that table if it is now
    /// complete.
    fn add_section(
        &mut self,
        config: &DemuxConfig,
        status: &mut DemuxStatus,
        sect: Arc<Section>,
    ) -> Option<BinaryTable> {
        if !sect.is_valid() {
            return None;
        }
        if sect.is_short_section() {
            if config.short_section_tables {
                return BinaryTable::from_sections(Some(sect));
            }
            return None;
        }
        let current_next = sect.current_next();
        let wanted = match current_next {
            CurrentNext::Current => config.current,
            CurrentNext::Next => config.next,
        };
        if !wanted {
            if current_next == CurrentNext::Next {
                status.is_next += 1;
            }
            return None;
        }
        let key = TableKey {
            table_id: sect.table_id(),
            table_id_extension: sect.table_id_extension(),
            current_next,
        };
        let ctx = self.tables.entry(key).or_default();
        if ctx.notified_version == Some(sect.version()) {
            // repetition of a table already reported
            return None;
        }
        let restart = match ctx.partial {
            Some(ref partial) => {
                partial.version() != sect.version()
                    || partial.section_count() != usize::from(sect.last_section_number()) + 1
            }
            None => false,
        };
        if restart {
            trace!(
                "{}: table_id {:#x} ext {} changed to version {}, discarding partial table",
                sect.source_pid(),
                key.table_id,
                key.table_id_extension,
                sect.version()
            );
            ctx.partial = None;
        }
        let version = sect.version();
        let partial = ctx.partial.get_or_insert_with(BinaryTable::new);
        partial.add_section(sect);
        if partial.is_valid() {
            ctx.notified_version = Some(version);
            ctx.partial.take()
        } else {
            None
        }
    }
}

/// Splits transport stream packets by PID, reassembling sections and tables from each of the
/// PIDs added to its filter.
///
/// All work is done synchronously inside [`feed_packet()`](#method.feed_packet) (or
/// [`push()`](#method.push)), including calls to the registered handlers.  For any one PID,
/// sections and tables are delivered in the order their final byte appeared in the stream.
pub struct SectionDemux {
    config: DemuxConfig,
    pid_filter: FixedBitSet,
    contexts: HashMap<packet::Pid, PidContext>,
    tid_filter: FixedBitSet,
    section_handler: Option<Box<dyn SectionHandler>>,
    table_handler: Option<Box<dyn TableHandler>>,
    status: DemuxStatus,
    packet_count: u64,
    changeset: FilterChangeset,
    completed: Vec<Section>,
}

impl Default for SectionDemux {
    fn default() -> SectionDemux {
        SectionDemux::new(DemuxConfig::default())
    }
}

impl SectionDemux {
    pub fn new(config: DemuxConfig) -> SectionDemux {
        let mut tid_filter = FixedBitSet::with_capacity(0x100);
        tid_filter.insert_range(..);
        SectionDemux {
            config,
            pid_filter: FixedBitSet::with_capacity(packet::Pid::PID_COUNT),
            contexts: HashMap::new(),
            tid_filter,
            section_handler: None,
            table_handler: None,
            status: DemuxStatus::default(),
            packet_count: 0,
            changeset: FilterChangeset::default(),
            completed: Vec::new(),
        }
    }

    pub fn config(&self) -> &DemuxConfig {
        &self.config
    }

    /// Replace the section handler; `None` removes it.
    pub fn set_section_handler(&mut self, handler: Option<Box<dyn SectionHandler>>) {
        self.section_handler = handler;
    }

    /// Replace the table handler; `None` removes it.
    pub fn set_table_handler(&mut self, handler: Option<Box<dyn TableHandler>>) {
        self.table_handler = handler;
    }

    /// Restrict the sections and tables reported to those with one of the given `table_id`
    /// values.  `None` lets every `table_id` through, which is the initial setting.
    pub fn set_table_id_filter(&mut self, table_ids: Option<&[u8]>) {
        match table_ids {
            None => self.tid_filter.insert_range(..),
            Some(ids) => {
                self.tid_filter.clear();
                for &id in ids {
                    self.tid_filter.insert(usize::from(id));
                }
            }
        }
    }

    /// Start demultiplexing the given PID.  Has no effect if the PID is already filtered; any
    /// packets seen on it before now are not replayed.
    pub fn add_pid(&mut self, pid: packet::Pid) {
        if !self.pid_filter.put(usize::from(pid)) {
            self.contexts.insert(pid, PidContext::new(pid));
        }
    }

    pub fn add_pids<I: IntoIterator<Item = packet::Pid>>(&mut self, pids: I) {
        for pid in pids {
            self.add_pid(pid);
        }
    }

    /// Stop demultiplexing the given PID, abandoning any partial sections and tables from it.
    pub fn remove_pid(&mut self, pid: packet::Pid) {
        self.pid_filter.set(usize::from(pid), false);
        self.contexts.remove(&pid);
    }

    pub fn has_pid(&self, pid: packet::Pid) -> bool {
        self.pid_filter.contains(usize::from(pid))
    }

    pub fn pid_count(&self) -> usize {
        self.pid_filter.count_ones(..)
    }

    /// The filtered PIDs, in ascending order.
    pub fn pids(&self) -> Vec<packet::Pid> {
        self.pid_filter
            .ones()
            .map(|i| packet::Pid::new(i as u16))
            .collect()
    }

    /// Forget the filtered PIDs, all partial sections and tables, and the status counters.
    pub fn reset(&mut self) {
        self.pid_filter.clear();
        self.contexts.clear();
        self.status.reset();
    }

    /// Forget the partial sections and tables of one PID, and the table versions already
    /// reported from it, while leaving the PID filtered.
    pub fn reset_pid(&mut self, pid: packet::Pid) {
        if let Some(ctx) = self.contexts.get_mut(&pid) {
            *ctx = PidContext::new(pid);
        }
    }

    pub fn status(&self) -> &DemuxStatus {
        &self.status
    }

    /// The number of packets given to `feed_packet()`, whatever their PID.
    pub fn packet_count(&self) -> u64 {
        self.packet_count
    }

    /// Process one packet.  Packets from PIDs which are not filtered are ignored.
    pub fn feed_packet(&mut self, pk: &packet::Packet<'_>) {
        self.packet_count += 1;
        let pid = pk.pid();
        let SectionDemux {
            config,
            pid_filter,
            contexts,
            tid_filter,
            section_handler,
            table_handler,
            status,
            changeset,
            completed,
            ..
        } = self;
        let ctx = match contexts.get_mut(&pid) {
            Some(ctx) => ctx,
            None => return,
        };
        ctx.consumer.consume(pk, &mut *status, &mut *completed);
        for sect in completed.drain(..) {
            if !tid_filter.contains(usize::from(sect.table_id())) {
                continue;
            }
            let sect = Arc::new(sect);
            if sect.is_valid() || config.report_invalid_sections {
                if let Some(handler) = section_handler.as_mut() {
                    let mut ctl = DemuxControl {
                        changeset: &mut *changeset,
                        pid_filter: &*pid_filter,
                        status: &*status,
                    };
                    handler.handle_section(&mut ctl, &sect);
                }
            }
            if let Some(table) = ctx.add_section(config, status, sect) {
                if let Some(handler) = table_handler.as_mut() {
                    let mut ctl = DemuxControl {
                        changeset: &mut *changeset,
                        pid_filter: &*pid_filter,
                        status: &*status,
                    };
                    handler.handle_table(&mut ctl, &table);
                }
            }
        }
        if !self.changeset.is_empty() {
            self.apply_changes();
        }
    }

    fn apply_changes(&mut self) {
        let updates = std::mem::take(&mut self.changeset.updates);
        for change in updates {
            change.apply(self);
        }
    }

    /// Process every complete packet in the given buffer, which is expected to start on a
    /// packet boundary.  A partial packet at the end of the buffer is ignored.
    pub fn push(&mut self, buf: &[u8]) {
        for pk_buf in buf.chunks_exact(packet::Packet::SIZE) {
            self.feed_packet(&packet::Packet::new(pk_buf));
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::packet::{Packet, PacketBuffer, Pid};
    use crate::psi::reassembly::test::{pusi_packet, ts_packet, PAT};
    use crate::psi::table::test::long_section;
    use crate::psi::CrcValidation;
    use bitstream_io::{BigEndian, BitWrite, BitWriter};
    use std::cell::RefCell;
    use std::io;
    use std::rc::Rc;

    type Seen<T> = Rc<RefCell<Vec<T>>>;

    /// a demux filtering `pids`, recording every section and table it reports
    fn recording_demux(
        config: DemuxConfig,
        pids: &[Pid],
    ) -> (SectionDemux, Seen<Arc<Section>>, Seen<BinaryTable>) {
        let sections: Seen<Arc<Section>> = Rc::new(RefCell::new(vec![]));
        let tables: Seen<BinaryTable> = Rc::new(RefCell::new(vec![]));
        let mut demux = SectionDemux::new(config);
        let s = sections.clone();
        demux.set_section_handler(Some(Box::new(
            move |_ctl: &mut DemuxControl<'_>, sect: &Arc<Section>| {
                s.borrow_mut().push(sect.clone())
            },
        )));
        let t = tables.clone();
        demux.set_table_handler(Some(Box::new(
            move |_ctl: &mut DemuxControl<'_>, table: &BinaryTable| {
                t.borrow_mut().push(table.clone())
            },
        )));
        demux.add_pids(pids.iter().cloned());
        (demux, sections, tables)
    }

    /// Each section starts a new packet; continuity counters start at `*cc`.
    fn packetize(pid: Pid, cc: &mut u8, sections: &[&[u8]]) -> Vec<PacketBuffer> {
        let mut result = vec![];
        for sect in sections {
            let first = sect.len().min(Packet::MAX_PAYLOAD_SIZE - 1);
            result.push(pusi_packet(pid, *cc, 0, &sect[..first]));
            *cc = (*cc + 1) & 0xf;
            for chunk in sect[first..].chunks(Packet::MAX_PAYLOAD_SIZE) {
                result.push(ts_packet(pid, *cc, false, chunk));
                *cc = (*cc + 1) & 0xf;
            }
        }
        result
    }

    fn feed(demux: &mut SectionDemux, packets: &[PacketBuffer]) {
        for buf in packets {
            demux.feed_packet(&Packet::new(&buf[..]));
        }
    }

    fn make_test_data<F>(builder: F) -> Vec<u8>
    where
        F: Fn(&mut BitWriter<Vec<u8>, BigEndian>) -> Result<(), io::Error>,
    {
        let mut w = BitWriter::endian(Vec::new(), BigEndian);
        builder(&mut w).unwrap();
        w.into_writer()
    }

    #[test]
    fn demux_empty() {
        let (mut demux, sections, tables) = recording_demux(DemuxConfig::default(), &[Pid::PAT]);
        demux.push(&[0x0; 0][..]);
        assert!(sections.borrow().is_empty());
        assert!(tables.borrow().is_empty());
        assert_eq!(demux.packet_count(), 0);
    }

    #[test]
    fn pat() {
        let (mut demux, sections, tables) = recording_demux(DemuxConfig::default(), &[Pid::PAT]);
        feed(
            &mut demux,
            &[
                pusi_packet(Pid::PAT, 0, 0, &PAT),
                pusi_packet(Pid::PAT, 1, 0, &PAT),
            ],
        );
        // every repetition of the section is reported, but the table only once
        assert_eq!(sections.borrow().len(), 2);
        let tables = tables.borrow();
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].table_id(), 0);
        assert_eq!(tables[0].table_id_extension(), 1);
        assert_eq!(tables[0].source_pid(), Some(Pid::PAT));
        assert_eq!(tables[0].section_at(0).unwrap().content(), &PAT[..]);
    }

    #[test]
    fn push_whole_packets_only() {
        let (mut demux, sections, _) = recording_demux(DemuxConfig::default(), &[Pid::PAT]);
        let mut buf = pusi_packet(Pid::PAT, 0, 0, &PAT).to_vec();
        buf.extend_from_slice(&pusi_packet(Pid::PAT, 1, 0, &PAT)[..100]);
        demux.push(&buf);
        assert_eq!(demux.packet_count(), 1);
        assert_eq!(sections.borrow().len(), 1);
    }

    #[test]
    fn unfiltered_pid_ignored() {
        let (mut demux, sections, tables) = recording_demux(DemuxConfig::default(), &[]);
        feed(&mut demux, &[pusi_packet(Pid::PAT, 0, 0, &PAT)]);
        assert!(sections.borrow().is_empty());
        assert!(tables.borrow().is_empty());
        assert_eq!(demux.packet_count(), 1);
        assert!(!demux.status().has_errors());
    }

    #[test]
    fn remove_pid_abandons_table() {
        let pid = Pid::new(0x100);
        let s0 = long_section(pid, 0x42, 1, 0, 0, 1, b"zero");
        let s1 = long_section(pid, 0x42, 1, 0, 1, 1, b"one");
        let (mut demux, sections, tables) = recording_demux(DemuxConfig::default(), &[pid]);
        let mut cc = 0;
        feed(&mut demux, &packetize(pid, &mut cc, &[s0.content()]));
        assert_eq!(sections.borrow().len(), 1);
        demux.remove_pid(pid);
        assert!(!demux.has_pid(pid));
        feed(&mut demux, &packetize(pid, &mut cc, &[s1.content()]));
        assert_eq!(sections.borrow().len(), 1);
        demux.add_pid(pid);
        feed(&mut demux, &packetize(pid, &mut cc, &[s1.content()]));
        assert_eq!(sections.borrow().len(), 2);
        // section 0 was forgotten along with the PID
        assert!(tables.borrow().is_empty());
    }

    #[test]
    fn discontinuity_never_splices_sections() {
        let pid = Pid::new(0x100);
        let a = long_section(pid, 0x42, 1, 0, 0, 0, &[0xaa; 288]);
        let b = long_section(pid, 0x42, 2, 0, 0, 0, &[0xbb; 288]);
        let (mut demux, sections, tables) = recording_demux(
            DemuxConfig::default().with_report_invalid_sections(true),
            &[pid],
        );
        let mut a_packets = packetize(pid, &mut 0, &[a.content()]);
        let b_packets = packetize(pid, &mut 2, &[b.content()]);
        // the first 60% of a, then the remainder of b
        a_packets.truncate(1);
        a_packets.push(b_packets[1]);
        feed(&mut demux, &a_packets);
        assert!(sections.borrow().is_empty());
        assert_eq!(demux.status().discontinuities, 1);
        // a complete, contiguous section afterwards is reported
        feed(&mut demux, &packetize(pid, &mut 4, &[b.content()]));
        assert_eq!(sections.borrow().len(), 1);
        assert_eq!(sections.borrow()[0].content(), b.content());
        assert_eq!(tables.borrow().len(), 1);
    }

    #[test]
    fn version_change_is_atomic() {
        let pid = Pid::new(0x100);
        let v3_0 = long_section(pid, 0x42, 1, 3, 0, 1, b"v3 s0");
        let v3_1 = long_section(pid, 0x42, 1, 3, 1, 1, b"v3 s1");
        let v4_0 = long_section(pid, 0x42, 1, 4, 0, 1, b"v4 s0");
        let v4_1 = long_section(pid, 0x42, 1, 4, 1, 1, b"v4 s1");
        let (mut demux, _, tables) = recording_demux(DemuxConfig::default(), &[pid]);
        let mut cc = 0;
        feed(
            &mut demux,
            &packetize(
                pid,
                &mut cc,
                &[v3_0.content(), v4_0.content(), v3_1.content()],
            ),
        );
        assert!(tables.borrow().is_empty());
        // each change of version restarted the table, so v4 s0 must be seen again
        feed(&mut demux, &packetize(pid, &mut cc, &[v4_1.content()]));
        assert!(tables.borrow().is_empty());
        feed(&mut demux, &packetize(pid, &mut cc, &[v4_0.content()]));
        let tables = tables.borrow();
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].version(), 4);
        assert!(tables[0].sections().all(|s| s.version() == 4));
        assert_eq!(tables[0].section_at(0).unwrap().payload(), b"v4 s0");
        assert_eq!(tables[0].section_at(1).unwrap().payload(), b"v4 s1");
    }

    #[test]
    fn new_version_reported_again() {
        let pid = Pid::new(0x100);
        let v1 = long_section(pid, 0x42, 1, 1, 0, 0, b"one");
        let v2 = long_section(pid, 0x42, 1, 2, 0, 0, b"two");
        let (mut demux, _, tables) = recording_demux(DemuxConfig::default(), &[pid]);
        let mut cc = 0;
        feed(
            &mut demux,
            &packetize(pid, &mut cc, &[v1.content(), v1.content(), v2.content(), v2.content()]),
        );
        let versions: Vec<u8> = tables.borrow().iter().map(|t| t.version()).collect();
        assert_eq!(versions, vec![1, 2]);
    }

    #[test]
    fn interleaved_table_instances() {
        let pid = Pid::new(0x100);
        let a0 = long_section(pid, 0x02, 101, 0, 0, 1, b"a0");
        let a1 = long_section(pid, 0x02, 101, 0, 1, 1, b"a1");
        let b0 = long_section(pid, 0x02, 102, 0, 0, 1, b"b0");
        let b1 = long_section(pid, 0x02, 102, 0, 1, 1, b"b1");
        let (mut demux, _, tables) = recording_demux(DemuxConfig::default(), &[pid]);
        feed(
            &mut demux,
            &packetize(
                pid,
                &mut 0,
                &[a0.content(), b0.content(), a1.content(), b1.content()],
            ),
        );
        let tables = tables.borrow();
        assert_eq!(tables.len(), 2);
        assert_eq!(tables[0].table_id_extension(), 101);
        assert_eq!(tables[0].section_at(0).unwrap().payload(), b"a0");
        assert_eq!(tables[0].section_at(1).unwrap().payload(), b"a1");
        assert_eq!(tables[1].table_id_extension(), 102);
        assert_eq!(tables[1].section_at(0).unwrap().payload(), b"b0");
        assert_eq!(tables[1].section_at(1).unwrap().payload(), b"b1");
    }

    #[test]
    fn trailing_stuffing_is_not_a_section() {
        let (mut demux, sections, _) = recording_demux(
            DemuxConfig::default().with_report_invalid_sections(true),
            &[Pid::PAT],
        );
        feed(&mut demux, &[pusi_packet(Pid::PAT, 0, 0, &PAT)]);
        assert_eq!(sections.borrow().len(), 1);
        assert!(!demux.status().has_errors());
    }

    #[test]
    fn invalid_sections_reported_on_request() {
        let mut bad = PAT;
        bad[8] ^= 0x10;
        let packets = [pusi_packet(Pid::PAT, 0, 0, &bad)];

        let (mut demux, sections, tables) = recording_demux(DemuxConfig::default(), &[Pid::PAT]);
        feed(&mut demux, &packets);
        assert!(sections.borrow().is_empty());
        assert_eq!(demux.status().wrong_crc, 1);

        let (mut demux, sections, tables2) = recording_demux(
            DemuxConfig::default().with_report_invalid_sections(true),
            &[Pid::PAT],
        );
        feed(&mut demux, &packets);
        assert_eq!(sections.borrow().len(), 1);
        assert!(!sections.borrow()[0].is_valid());
        assert!(tables.borrow().is_empty());
        assert!(tables2.borrow().is_empty());
    }

    #[test]
    fn next_tables() {
        let pid = Pid::new(0x100);
        let mut data = long_section(pid, 0x42, 1, 5, 0, 0, b"soon")
            .content()
            .to_vec();
        data[5] &= 0b1111_1110; // current_next_indicator
        let next = Section::new(data, pid, CrcValidation::Compute);
        assert!(next.is_next());
        let packets = packetize(pid, &mut 0, &[next.content()]);

        let (mut demux, sections, tables) = recording_demux(DemuxConfig::default(), &[pid]);
        feed(&mut demux, &packets);
        assert_eq!(sections.borrow().len(), 1);
        assert!(tables.borrow().is_empty());
        assert_eq!(demux.status().is_next, 1);

        let (mut demux, _, tables) =
            recording_demux(DemuxConfig::default().with_next(true), &[pid]);
        feed(&mut demux, &packets);
        assert_eq!(tables.borrow().len(), 1);
        assert_eq!(tables.borrow()[0].current_next(), Some(CurrentNext::Next));
    }

    #[test]
    fn short_section_tables() {
        let tdt = make_test_data(|w| {
            w.write(8, 0x70)?; // table_id
            w.write_bit(false)?; // section_syntax_indicator
            w.write_bit(true)?; // reserved_future_use
            w.write(2, 3)?; // reserved
            w.write(12, 5)?; // section_length
            w.write(16, 0xC079)?; // MJD
            w.write(24, 0x124500) // hh mm ss
        });
        let packets = [pusi_packet(Pid::TDT, 0, 0, &tdt)];

        let (mut demux, sections, tables) = recording_demux(DemuxConfig::default(), &[Pid::TDT]);
        feed(&mut demux, &packets);
        assert_eq!(sections.borrow().len(), 1);
        assert!(sections.borrow()[0].is_short_section());
        assert!(tables.borrow().is_empty());

        let (mut demux, _, tables) = recording_demux(
            DemuxConfig::default().with_short_section_tables(true),
            &[Pid::TDT],
        );
        feed(&mut demux, &packets);
        let tables = tables.borrow();
        assert_eq!(tables.len(), 1);
        assert!(tables[0].is_short_section());
        assert_eq!(tables[0].table_id(), 0x70);
    }

    #[test]
    fn table_id_filter() {
        let pid = Pid::new(0x100);
        let sdt = long_section(pid, 0x42, 1, 0, 0, 0, b"sdt");
        let bat = long_section(pid, 0x4a, 1, 0, 0, 0, b"bat");
        let (mut demux, sections, tables) = recording_demux(DemuxConfig::default(), &[pid]);
        demux.set_table_id_filter(Some(&[0x4a]));
        feed(
            &mut demux,
            &packetize(pid, &mut 0, &[sdt.content(), bat.content()]),
        );
        assert_eq!(sections.borrow().len(), 1);
        assert_eq!(sections.borrow()[0].table_id(), 0x4a);
        assert_eq!(tables.borrow().len(), 1);
        demux.set_table_id_filter(None);
        feed(
            &mut demux,
            &packetize(pid, &mut 2, &[sdt.content()]),
        );
        assert_eq!(tables.borrow().len(), 2);
    }

    #[test]
    fn handler_adds_pid() {
        // PAT announcing program 1 on PID 0x1e0
        let pmt_pid = Pid::new(0x1e0);
        let pmt = long_section(pmt_pid, 0x02, 1, 0, 0, 0, &[0xe1, 0x00, 0xf0, 0x00]);
        let mut demux = SectionDemux::default();
        let seen: Seen<u8> = Rc::new(RefCell::new(vec![]));
        let s = seen.clone();
        demux.set_table_handler(Some(Box::new(
            move |ctl: &mut DemuxControl<'_>, table: &BinaryTable| {
                s.borrow_mut().push(table.table_id());
                if table.table_id() == 0 {
                    assert!(!ctl.has_pid(pmt_pid));
                    ctl.add_pid(pmt_pid);
                    assert!(ctl.has_pid(pmt_pid));
                    ctl.remove_pid(Pid::PAT);
                    assert!(!ctl.has_pid(Pid::PAT));
                }
            },
        )));
        demux.add_pid(Pid::PAT);
        let mut packets = vec![pusi_packet(Pid::PAT, 0, 0, &PAT)];
        packets.extend(packetize(pmt_pid, &mut 0, &[pmt.content()]));
        packets.push(pusi_packet(Pid::PAT, 1, 0, &PAT));
        feed(&mut demux, &packets);
        assert_eq!(*seen.borrow(), vec![0, 2]);
        assert_eq!(demux.pids(), vec![pmt_pid]);
        assert_eq!(demux.pid_count(), 1);
    }

    #[test]
    fn reset() {
        let (mut demux, sections, _) =
            recording_demux(DemuxConfig::default(), &[Pid::PAT, Pid::NIT]);
        assert_eq!(demux.pid_count(), 2);
        let mut tei = pusi_packet(Pid::PAT, 0, 0, &PAT);
        tei[1] |= 0b1000_0000;
        feed(&mut demux, &[tei]);
        assert_eq!(demux.status().invalid_ts, 1);
        demux.reset();
        assert_eq!(demux.pid_count(), 0);
        assert!(!demux.status().has_errors());
        feed(&mut demux, &[pusi_packet(Pid::PAT, 1, 0, &PAT)]);
        assert!(sections.borrow().is_empty());
    }

    #[test]
    fn reset_pid_reports_table_again() {
        let (mut demux, _, tables) = recording_demux(DemuxConfig::default(), &[Pid::PAT]);
        feed(&mut demux, &[pusi_packet(Pid::PAT, 0, 0, &PAT)]);
        demux.reset_pid(Pid::PAT);
        assert!(demux.has_pid(Pid::PAT));
        feed(&mut demux, &[pusi_packet(Pid::PAT, 1, 0, &PAT)]);
        assert_eq!(tables.borrow().len(), 2);
    }

    #[test]
    fn status_display() {
        let mut status = DemuxStatus::default();
        status.wrong_crc = 2;
        assert!(status.has_errors());
        assert!(status.to_string().contains("CRC errors: 2"));
        status.reset();
        assert_eq!(status, DemuxStatus::default());
        status.is_next = 1;
        assert!(!status.has_errors());
    }
}
