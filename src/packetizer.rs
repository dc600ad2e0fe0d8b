//! Turning sections back into transport stream packets.
//!
//! A [`Packetizer`](struct.Packetizer.html) produces the packets of a single PID, one per call
//! to `next_packet()`, pulling sections from a [`SectionProvider`](trait.SectionProvider.html)
//! as it needs them.  [`CyclingPacketizer`](struct.CyclingPacketizer.html) is a packetizer with
//! a provider that repeats a set of sections forever, the way PSI/SI tables are carried in a
//! broadcast.
//!
//! The packets produced demultiplex (with
//! [`SectionDemux`](../demultiplex/struct.SectionDemux.html)) to exactly the sections given.
//!
//! ```
//! # use tssection::packet::{Packet, Pid};
//! # use tssection::packetizer::CyclingPacketizer;
//! # use tssection::psi::{CrcValidation, Section};
//! # use std::sync::Arc;
//! let pat = Section::from_slice(
//!     &[0x00, 0xB0, 0x0D, 0x00, 0x01, 0xC1, 0x00, 0x00, 0x00, 0x01, 0xE1, 0xE0, 0, 0, 0, 0],
//!     Pid::PAT,
//!     CrcValidation::Compute,
//! );
//! let mut pzer = CyclingPacketizer::new(Pid::PAT);
//! pzer.add_section(Arc::new(pat), 0);
//! let buf = pzer.next_packet();
//! let pk = Packet::new(&buf);
//! assert_eq!(pk.pid(), Pid::PAT);
//! assert!(pk.payload_unit_start_indicator());
//! ```

use crate::packet::{ContinuityCounter, Packet, PacketBuffer, Pid};
use crate::psi::{BinaryTable, Section, SectionCommonHeader};
use log::{debug, trace};
use std::collections::VecDeque;
use std::sync::Arc;

/// Supplies the sections a `Packetizer` is to send.
pub trait SectionProvider {
    /// The next section to send, or `None` if there is nothing to send at the moment.
    ///
    /// `packet_index` is the number of packets the packetizer has produced so far, i.e. the
    /// position in its output of the packet which will carry the start of the section.
    fn next_section(&mut self, packet_index: u64) -> Option<Arc<Section>>;

    /// `true` if the section most recently returned completed a cycle of the provider's
    /// sections.  Drives `StuffingPolicy::AtEnd`.
    fn at_cycle_end(&self) -> bool {
        false
    }
}

/// Sends each queued section once.
impl SectionProvider for VecDeque<Arc<Section>> {
    fn next_section(&mut self, _packet_index: u64) -> Option<Arc<Section>> {
        self.pop_front()
    }

    fn at_cycle_end(&self) -> bool {
        self.is_empty()
    }
}

/// When to pad the remainder of a packet with stuffing instead of starting the next section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StuffingPolicy {
    /// Pack sections back to back; stuff only when there is no section to send
    #[default]
    Never,
    /// Stuff after the last section of each cycle, so that a cycle never shares a packet with
    /// the next one
    AtEnd,
    /// Stuff after every section, so that each section starts a packet
    Always,
}

fn null_packet() -> PacketBuffer {
    let mut buf = [0xFF; Packet::SIZE];
    buf[0] = Packet::SYNC_BYTE;
    buf[1] = (u16::from(Pid::NULL) >> 8) as u8;
    buf[2] = u16::from(Pid::NULL) as u8;
    buf[3] = 0b0001_0000;
    buf
}

/// Produces the packets of one PID from the sections of a `SectionProvider`.
///
/// Each packet carries a payload only (no adaptation field).  A section may only start in a
/// packet if its whole 3-byte common header fits there, and the end of the last section in a
/// packet is followed by `0xFF` stuffing.  When the provider has nothing to send, a null packet
/// is returned.
pub struct Packetizer<P> {
    provider: P,
    pid: Pid,
    stuffing: StuffingPolicy,
    cc: ContinuityCounter,
    section: Option<Arc<Section>>,
    next_byte: usize,
    packet_count: u64,
    section_count: u64,
}

impl<P: SectionProvider> Packetizer<P> {
    pub fn new(pid: Pid, provider: P) -> Packetizer<P> {
        Packetizer {
            provider,
            pid,
            stuffing: StuffingPolicy::default(),
            cc: ContinuityCounter::default(),
            section: None,
            next_byte: 0,
            packet_count: 0,
            section_count: 0,
        }
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// Packets produced from now on use the given PID.  The continuity counter carries on.
    pub fn set_pid(&mut self, pid: Pid) {
        if pid != self.pid {
            debug!("packetizer moving from PID {} to {}", self.pid, pid);
            self.pid = pid;
        }
    }

    pub fn stuffing_policy(&self) -> StuffingPolicy {
        self.stuffing
    }

    pub fn set_stuffing_policy(&mut self, policy: StuffingPolicy) {
        self.stuffing = policy;
    }

    /// The continuity counter the next (non-null) packet will carry.
    pub fn continuity_counter(&self) -> ContinuityCounter {
        self.cc
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn provider_mut(&mut self) -> &mut P {
        &mut self.provider
    }

    /// Number of packets produced, null packets included.
    pub fn packet_count(&self) -> u64 {
        self.packet_count
    }

    /// Number of sections completely sent.
    pub fn section_count(&self) -> u64 {
        self.section_count
    }

    /// `true` if no section is partially sent and the last one sent completed a cycle of the
    /// provider.
    pub fn at_cycle_boundary(&self) -> bool {
        self.section.is_none() && self.provider.at_cycle_end()
    }

    /// Abandon any partially sent section.  The next packet starts afresh with the next section
    /// of the provider.
    pub fn reset(&mut self) {
        self.section = None;
        self.next_byte = 0;
    }

    fn stuff_after_section(&self) -> bool {
        match self.stuffing {
            StuffingPolicy::Never => false,
            StuffingPolicy::AtEnd => self.provider.at_cycle_end(),
            StuffingPolicy::Always => true,
        }
    }

    pub fn next_packet(&mut self) -> PacketBuffer {
        let index = self.packet_count;
        self.packet_count += 1;

        // pointer_field value, if this packet has one
        let mut pointer = None;
        // a section to start after the one in progress ends
        let mut following = None;
        match self.section.as_ref().map(|s| s.size() - self.next_byte) {
            None => {
                self.section = self.provider.next_section(index);
                self.next_byte = 0;
                if self.section.is_none() {
                    return null_packet();
                }
                pointer = Some(0);
            }
            Some(remaining) => {
                if remaining + 1 + SectionCommonHeader::SIZE <= Packet::MAX_PAYLOAD_SIZE
                    && !self.stuff_after_section()
                {
                    following = self.provider.next_section(index);
                    if following.is_some() {
                        pointer = Some(remaining as u8);
                    }
                }
            }
        }

        let mut buf = [0xFF; Packet::SIZE];
        let pid = u16::from(self.pid);
        buf[0] = Packet::SYNC_BYTE;
        let pusi = if pointer.is_some() { 0b0100_0000 } else { 0 };
        buf[1] = pusi | (pid >> 8) as u8;
        buf[2] = pid as u8;
        buf[3] = 0b0001_0000 | self.cc.count();
        self.cc = self.cc.next();
        let mut pos = 4;
        if let Some(p) = pointer {
            buf[pos] = p;
            pos += 1;
        }

        while let Some(section) = self.section.take() {
            let data = section.content();
            let len = (data.len() - self.next_byte).min(Packet::SIZE - pos);
            buf[pos..pos + len].copy_from_slice(&data[self.next_byte..self.next_byte + len]);
            pos += len;
            self.next_byte += len;
            if self.next_byte < data.len() {
                self.section = Some(section);
                break;
            }
            self.section_count += 1;
            self.next_byte = 0;
            // the pointer_field already announces this one
            if let Some(s) = following.take() {
                self.section = Some(s);
                continue;
            }
            if pointer.is_none()
                || self.stuff_after_section()
                || pos + SectionCommonHeader::SIZE > Packet::SIZE
            {
                break;
            }
            self.section = self.provider.next_section(index);
        }
        buf
    }
}

struct ScheduledSection {
    section: Arc<Section>,
    repetition_ms: u32,
    due_packet: u64,
    last_cycle: u64,
}

/// The provider behind `CyclingPacketizer`.
struct SectionCycler {
    sections: Vec<ScheduledSection>,
    bitrate: u32,
    round_robin: usize,
    current_cycle: u64,
    cycle_count: u64,
    cycle_end: bool,
}

impl SectionCycler {
    fn new() -> SectionCycler {
        SectionCycler {
            sections: vec![],
            bitrate: 0,
            round_robin: 0,
            current_cycle: 1,
            cycle_count: 0,
            cycle_end: false,
        }
    }

    fn is_scheduled(&self, s: &ScheduledSection) -> bool {
        self.bitrate > 0 && s.repetition_ms > 0
    }

    fn interval_packets(&self, repetition_ms: u32) -> u64 {
        let bits = u64::from(self.bitrate) * u64::from(repetition_ms);
        (bits / (1000 * 8 * Packet::SIZE as u64)).max(1)
    }

    fn due_section(&self, packet_index: u64) -> Option<usize> {
        self.sections
            .iter()
            .enumerate()
            .filter(|(_, s)| self.is_scheduled(s) && s.due_packet <= packet_index)
            .min_by_key(|(_, s)| s.due_packet)
            .map(|(i, _)| i)
    }

    fn round_robin_section(&mut self) -> Option<usize> {
        let count = self.sections.len();
        let found = (0..count)
            .map(|k| (self.round_robin + k) % count)
            .find(|&i| !self.is_scheduled(&self.sections[i]))?;
        self.round_robin = found + 1;
        Some(found)
    }

    fn update_cycle(&mut self) {
        let current = self.current_cycle;
        self.cycle_end = self.sections.iter().all(|s| s.last_cycle == current);
        if self.cycle_end {
            trace!("section cycle {} complete", current);
            self.cycle_count += 1;
            self.current_cycle += 1;
        }
    }
}

impl SectionProvider for SectionCycler {
    fn next_section(&mut self, packet_index: u64) -> Option<Arc<Section>> {
        let index = match self.due_section(packet_index) {
            Some(i) => i,
            None => self.round_robin_section()?,
        };
        let interval = self.interval_packets(self.sections[index].repetition_ms);
        let current = self.current_cycle;
        let s = &mut self.sections[index];
        s.due_packet = packet_index + interval;
        s.last_cycle = current;
        let section = s.section.clone();
        self.update_cycle();
        Some(section)
    }

    fn at_cycle_end(&self) -> bool {
        self.cycle_end
    }
}

/// Repeatedly sends a set of sections on one PID.
///
/// Sections added with a non-zero repetition rate are sent, as far as possible, once per
/// repetition period, measured in packets at the configured bitrate.  All other sections are
/// sent round-robin in the remaining packets.  If the bitrate is unknown (zero), repetition
/// rates are ignored and every section is sent round-robin.
///
/// A *cycle* completes each time every stored section has been sent at least once since the
/// previous cycle completed.
pub struct CyclingPacketizer {
    packetizer: Packetizer<SectionCycler>,
}

impl CyclingPacketizer {
    pub fn new(pid: Pid) -> CyclingPacketizer {
        CyclingPacketizer {
            packetizer: Packetizer::new(pid, SectionCycler::new()),
        }
    }

    pub fn pid(&self) -> Pid {
        self.packetizer.pid()
    }

    pub fn set_pid(&mut self, pid: Pid) {
        self.packetizer.set_pid(pid);
    }

    pub fn bitrate(&self) -> u32 {
        self.packetizer.provider().bitrate
    }

    /// The bitrate of this PID in bits per second, or `0` if unknown.
    pub fn set_bitrate(&mut self, bitrate: u32) {
        self.packetizer.provider_mut().bitrate = bitrate;
    }

    pub fn stuffing_policy(&self) -> StuffingPolicy {
        self.packetizer.stuffing_policy()
    }

    pub fn set_stuffing_policy(&mut self, policy: StuffingPolicy) {
        self.packetizer.set_stuffing_policy(policy);
    }

    /// Add every section of the table, to be repeated every `repetition_ms` milliseconds (`0`
    /// meaning no particular rate).
    pub fn add_table(&mut self, table: &BinaryTable, repetition_ms: u32) {
        for section in table.sections() {
            self.add_section(section.clone(), repetition_ms);
        }
    }

    /// Add one section, to be repeated every `repetition_ms` milliseconds (`0` meaning no
    /// particular rate).  A newly added section with a repetition rate is due immediately.
    pub fn add_section(&mut self, section: Arc<Section>, repetition_ms: u32) {
        let cycler = self.packetizer.provider_mut();
        let last_cycle = cycler.current_cycle - 1;
        cycler.sections.push(ScheduledSection {
            section,
            repetition_ms,
            due_packet: 0,
            last_cycle,
        });
        cycler.cycle_end = false;
    }

    /// Remove the stored sections with the given `table_id`, and if given, `table_id_extension`.
    /// A section already partially sent is completed.
    pub fn remove_sections(&mut self, table_id: u8, table_id_extension: Option<u16>) {
        let cycler = self.packetizer.provider_mut();
        cycler.sections.retain(|s| {
            s.section.table_id() != table_id
                || table_id_extension
                    .map(|ext| s.section.table_id_extension() != ext)
                    .unwrap_or(false)
        });
        if cycler.round_robin >= cycler.sections.len() {
            cycler.round_robin = 0;
        }
    }

    /// Remove all stored sections.  A section already partially sent is completed.
    pub fn remove_all(&mut self) {
        let cycler = self.packetizer.provider_mut();
        cycler.sections.clear();
        cycler.round_robin = 0;
    }

    pub fn stored_section_count(&self) -> usize {
        self.packetizer.provider().sections.len()
    }

    pub fn next_packet(&mut self) -> PacketBuffer {
        self.packetizer.next_packet()
    }

    /// Number of packets produced, null packets included.
    pub fn packet_count(&self) -> u64 {
        self.packetizer.packet_count()
    }

    /// Number of sections completely sent.
    pub fn section_count(&self) -> u64 {
        self.packetizer.section_count()
    }

    /// Number of complete cycles through the stored sections.
    pub fn cycle_count(&self) -> u64 {
        self.packetizer.provider().cycle_count
    }

    /// `true` if the last packet produced ended a cycle.
    pub fn at_cycle_boundary(&self) -> bool {
        self.packetizer.at_cycle_boundary()
    }

    /// Abandon any partially sent section.
    pub fn reset(&mut self) {
        self.packetizer.reset();
    }
}
