//! Recovering complete sections from the packets of a single PID.

use super::section::{CrcValidation, Section};
use super::{tid, SectionCommonHeader};
use crate::demultiplex::DemuxStatus;
use crate::packet;
use log::{debug, warn};

/// Where a `SectionPacketConsumer` is in the byte stream of its PID.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReassemblyState {
    /// No section in progress; bytes are ignored until a packet with
    /// `payload_unit_start_indicator` set arrives.
    WaitingForStart,
    /// Part of a section has been buffered and further bytes are expected.
    Accumulating,
    /// An impairment was seen while a section was in progress; everything is ignored until the
    /// next `payload_unit_start_indicator`.
    Skipping,
}

/// Reassembles the sections carried by the packets of one PID.
///
/// Each call to [`consume()`](#method.consume) handles one packet, appending any sections which
/// were completed by it to the given output vector, in the order their final byte appeared in the
/// packet.  Stream impairments are never reported as errors; instead they are tallied in the
/// given [`DemuxStatus`](../../demultiplex/struct.DemuxStatus.html) and the partial section
/// affected is abandoned.
pub struct SectionPacketConsumer {
    pid: packet::Pid,
    buf: Vec<u8>,
    state: ReassemblyState,
    last_cc: Option<packet::ContinuityCounter>,
    // bytes of the last packet accepted, to recognise a duplicate
    last_packet: Vec<u8>,
    duplicate_seen: bool,
}

impl SectionPacketConsumer {
    pub fn new(pid: packet::Pid) -> SectionPacketConsumer {
        SectionPacketConsumer {
            pid,
            buf: Vec::new(),
            state: ReassemblyState::WaitingForStart,
            last_cc: None,
            last_packet: Vec::with_capacity(packet::Packet::SIZE),
            duplicate_seen: false,
        }
    }

    pub fn pid(&self) -> packet::Pid {
        self.pid
    }

    pub fn state(&self) -> ReassemblyState {
        self.state
    }

    /// Number of bytes of the section currently in progress.
    pub fn pending_len(&self) -> usize {
        self.buf.len()
    }

    /// Forget any partial section and the last continuity counter seen.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.state = ReassemblyState::WaitingForStart;
        self.last_cc = None;
        self.last_packet.clear();
        self.duplicate_seen = false;
    }

    fn lose_sync(&mut self) {
        self.buf.clear();
        self.state = ReassemblyState::Skipping;
    }

    pub fn consume(
        &mut self,
        pk: &packet::Packet<'_>,
        status: &mut DemuxStatus,
        out: &mut Vec<Section>,
    ) {
        if !pk.has_valid_sync() || pk.transport_error_indicator() {
            status.invalid_ts += 1;
            debug!("{}: dropping corrupt packet", self.pid);
            self.lose_sync();
            self.last_cc = None;
            return;
        }
        if pk.transport_scrambling_control().is_scrambled() {
            status.scrambled += 1;
            debug!("{}: dropping scrambled packet", self.pid);
            self.lose_sync();
            self.last_cc = None;
            return;
        }
        // the continuity counter only advances on packets with a payload
        let payload = match pk.payload() {
            Some(p) => p,
            None => return,
        };
        if !self.check_continuity(pk, status) {
            return;
        }

        if pk.payload_unit_start_indicator() {
            // pointer_field, then the tail of any previous section, then a new section
            let pointer = usize::from(payload[0]);
            let data = &payload[1..];
            if pointer >= data.len() {
                status.inv_sect_length += 1;
                warn!(
                    "{}: pointer_field {} beyond end of {} byte payload",
                    self.pid,
                    pointer,
                    data.len()
                );
                self.lose_sync();
                return;
            }
            let (tail, head) = data.split_at(pointer);
            if self.state == ReassemblyState::Accumulating {
                self.buf.extend_from_slice(tail);
                self.extract(status, out);
                if !self.buf.is_empty() {
                    status.inv_sect_length += 1;
                    warn!(
                        "{}: section incomplete with {} bytes when next section started",
                        self.pid,
                        self.buf.len()
                    );
                }
            }
            self.buf.clear();
            self.buf.extend_from_slice(head);
            self.state = ReassemblyState::Accumulating;
            self.extract(status, out);
        } else if self.state == ReassemblyState::Accumulating {
            self.buf.extend_from_slice(payload);
            self.extract(status, out);
        }
    }

    fn remember(&mut self, pk: &packet::Packet<'_>) {
        self.last_packet.clear();
        self.last_packet.extend_from_slice(pk.buffer());
        self.duplicate_seen = false;
    }

    /// Returns `false` if the packet should be ignored.
    ///
    /// A packet repeating the previous continuity counter is a duplicate only if it is the first
    /// repeat and is byte-for-byte identical to the previous packet.  Any other repeat is a
    /// discontinuity.
    fn check_continuity(&mut self, pk: &packet::Packet<'_>, status: &mut DemuxStatus) -> bool {
        let cc = pk.continuity_counter();
        let signalled = pk
            .adaptation_field()
            .map(|af| af.discontinuity_indicator())
            .unwrap_or(false);
        let last = self.last_cc.replace(cc);
        match last {
            Some(last) if cc == last && !signalled => {
                if !self.duplicate_seen && self.last_packet[..] == pk.buffer()[..] {
                    debug!("{}: duplicate packet, cc={}", self.pid, cc.count());
                    self.duplicate_seen = true;
                    return false;
                }
                warn!(
                    "{}: continuity error, cc {} repeated",
                    self.pid,
                    cc.count()
                );
                status.discontinuities += 1;
                self.remember(pk);
                self.lose_sync();
                true
            }
            Some(last) if !cc.follows(last) => {
                if signalled {
                    debug!(
                        "{}: signalled discontinuity, cc {} -> {}",
                        self.pid,
                        last.count(),
                        cc.count()
                    );
                } else {
                    warn!(
                        "{}: continuity error, cc {} -> {}",
                        self.pid,
                        last.count(),
                        cc.count()
                    );
                    status.discontinuities += 1;
                }
                self.remember(pk);
                self.lose_sync();
                true
            }
            _ => {
                self.remember(pk);
                true
            }
        }
    }

    /// Emit every complete section at the front of the buffer.
    fn extract(&mut self, status: &mut DemuxStatus, out: &mut Vec<Section>) {
        let mut start = 0;
        loop {
            let rest = &self.buf[start..];
            if rest.is_empty() {
                break;
            }
            if rest[0] == tid::STUFFING {
                // no further section in this packet
                start = self.buf.len();
                break;
            }
            if rest.len() < SectionCommonHeader::SIZE {
                break;
            }
            let header = SectionCommonHeader::new(rest);
            let size = header.total_size();
            let limit = if header.section_syntax_indicator {
                Section::MAX_LONG_SECTION_SIZE
            } else {
                Section::MAX_SHORT_SECTION_SIZE
            };
            if size > limit {
                status.inv_sect_length += 1;
                warn!(
                    "{}: section_length {} too large for table_id {:#x}",
                    self.pid, header.section_length, header.table_id
                );
                self.lose_sync();
                return;
            }
            if rest.len() < size {
                break;
            }
            let sect = Section::from_slice(&rest[..size], self.pid, CrcValidation::Check);
            if !sect.is_valid() {
                if sect.is_long_section() && size < Section::MIN_LONG_SECTION_SIZE {
                    status.inv_sect_length += 1;
                } else if sect.section_number() > sect.last_section_number() {
                    status.inv_sect_index += 1;
                } else {
                    status.wrong_crc += 1;
                }
                debug!("{}: invalid section {:?}", self.pid, sect);
            }
            out.push(sect);
            start += size;
        }
        self.buf.drain(..start);
        if self.buf.is_empty() {
            self.state = ReassemblyState::WaitingForStart;
        }
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use crate::packet::{Packet, PacketBuffer, Pid};
    use crate::psi::table::test::long_section;
    use hex_literal::hex;

    pub(crate) const PAT: [u8; 16] = hex!("00B00D0001C100000001E1E02D507804");

    /// a payload-only packet, with any space after `payload` filled with `0xff`
    pub(crate) fn ts_packet(pid: Pid, cc: u8, pusi: bool, payload: &[u8]) -> PacketBuffer {
        let mut buf = [0xffu8; Packet::SIZE];
        let pid = u16::from(pid);
        buf[0] = Packet::SYNC_BYTE;
        buf[1] = if pusi { 0b0100_0000 } else { 0 } | (pid >> 8) as u8;
        buf[2] = pid as u8;
        buf[3] = 0b0001_0000 | cc;
        buf[4..4 + payload.len()].copy_from_slice(payload);
        buf
    }

    /// a payload-unit-start packet whose payload holds `pointer` followed by `data`
    pub(crate) fn pusi_packet(pid: Pid, cc: u8, pointer: u8, data: &[u8]) -> PacketBuffer {
        let mut payload = vec![pointer];
        payload.extend_from_slice(data);
        ts_packet(pid, cc, true, &payload)
    }

    fn consume_all(
        consumer: &mut SectionPacketConsumer,
        status: &mut DemuxStatus,
        packets: &[PacketBuffer],
    ) -> Vec<Section> {
        let mut out = vec![];
        for buf in packets {
            consumer.consume(&Packet::new(&buf[..]), status, &mut out);
        }
        out
    }

    fn big_section(pid: Pid, table_id: u8) -> Vec<u8> {
        // 300 bytes in total
        long_section(pid, table_id, 1, 0, 0, 0, &[0x5a; 288])
            .content()
            .to_vec()
    }

    #[test]
    fn single_section() {
        let mut c = SectionPacketConsumer::new(Pid::PAT);
        let mut status = DemuxStatus::default();
        let out = consume_all(&mut c, &mut status, &[pusi_packet(Pid::PAT, 0, 0, &PAT)]);
        assert_eq!(out.len(), 1);
        assert!(out[0].is_valid());
        assert_eq!(out[0].content(), &PAT[..]);
        assert_eq!(out[0].source_pid(), Pid::PAT);
        assert_eq!(c.state(), ReassemblyState::WaitingForStart);
        assert!(!status.has_errors());
    }

    #[test]
    fn continuation_outside_section() {
        let mut c = SectionPacketConsumer::new(Pid::PAT);
        let mut status = DemuxStatus::default();
        let out = consume_all(&mut c, &mut status, &[ts_packet(Pid::PAT, 0, false, &PAT)]);
        assert!(out.is_empty());
        assert_eq!(c.pending_len(), 0);
    }

    #[test]
    fn section_spanning_packets() {
        let pid = Pid::new(0x100);
        let sect = big_section(pid, 0x42);
        let mut c = SectionPacketConsumer::new(pid);
        let mut status = DemuxStatus::default();
        let out = consume_all(
            &mut c,
            &mut status,
            &[pusi_packet(pid, 0, 0, &sect[..183])],
        );
        assert!(out.is_empty());
        assert_eq!(c.state(), ReassemblyState::Accumulating);
        assert_eq!(c.pending_len(), 183);
        let out = consume_all(&mut c, &mut status, &[ts_packet(pid, 1, false, &sect[183..])]);
        assert_eq!(out.len(), 1);
        assert!(out[0].is_valid());
        assert_eq!(out[0].content(), &sect[..]);
    }

    #[test]
    fn several_sections_then_stuffing() {
        let pid = Pid::new(0x100);
        let a = long_section(pid, 0x42, 1, 0, 0, 1, b"first");
        let b = long_section(pid, 0x42, 1, 0, 1, 1, b"second");
        let mut data = a.content().to_vec();
        data.extend_from_slice(b.content());
        let mut c = SectionPacketConsumer::new(pid);
        let mut status = DemuxStatus::default();
        let out = consume_all(&mut c, &mut status, &[pusi_packet(pid, 0, 0, &data)]);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].payload(), b"first");
        assert_eq!(out[1].payload(), b"second");
        // the trailing 0xff bytes are not a section
        assert_eq!(c.pending_len(), 0);
        assert_eq!(c.state(), ReassemblyState::WaitingForStart);
        assert!(!status.has_errors());
    }

    #[test]
    fn header_split_across_packets() {
        let pid = Pid::new(0x100);
        // 181 bytes, leaving room for only 2 bytes of the following section's header
        let a = long_section(pid, 0x42, 1, 0, 0, 0, &[0xaa; 169]);
        assert_eq!(a.size(), 181);
        let mut data = a.content().to_vec();
        data.extend_from_slice(&PAT[..2]);
        let mut c = SectionPacketConsumer::new(pid);
        let mut status = DemuxStatus::default();
        let out = consume_all(
            &mut c,
            &mut status,
            &[
                pusi_packet(pid, 5, 0, &data),
                ts_packet(pid, 6, false, &PAT[2..]),
            ],
        );
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].content(), a.content());
        assert_eq!(out[1].content(), &PAT[..]);
        assert!(!status.has_errors());
    }

    #[test]
    fn discontinuity_discards_partial_section() {
        let pid = Pid::new(0x100);
        let x = big_section(pid, 0x42);
        let y = big_section(pid, 0x46);
        let mut c = SectionPacketConsumer::new(pid);
        let mut status = DemuxStatus::default();
        let out = consume_all(
            &mut c,
            &mut status,
            &[
                pusi_packet(pid, 0, 0, &x[..183]),
                // cc 1 lost; this carries the end of some other section
                ts_packet(pid, 2, false, &y[183..]),
            ],
        );
        assert!(out.is_empty());
        assert_eq!(status.discontinuities, 1);
        assert_eq!(c.state(), ReassemblyState::Skipping);
        let out = consume_all(&mut c, &mut status, &[pusi_packet(pid, 3, 0, &PAT)]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].content(), &PAT[..]);
    }

    #[test]
    fn discontinuity_on_unit_start_ignores_tail() {
        let pid = Pid::new(0x100);
        let x = big_section(pid, 0x42);
        let y = big_section(pid, 0x46);
        let mut data = y[290..].to_vec();
        data.extend_from_slice(&PAT);
        let mut c = SectionPacketConsumer::new(pid);
        let mut status = DemuxStatus::default();
        let out = consume_all(
            &mut c,
            &mut status,
            &[
                pusi_packet(pid, 7, 0, &x[..183]),
                pusi_packet(pid, 9, 10, &data),
            ],
        );
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].content(), &PAT[..]);
        assert_eq!(status.discontinuities, 1);
    }

    #[test]
    fn duplicate_packet_ignored() {
        let pid = Pid::new(0x100);
        let x = big_section(pid, 0x42);
        let first = pusi_packet(pid, 15, 0, &x[..183]);
        let mut c = SectionPacketConsumer::new(pid);
        let mut status = DemuxStatus::default();
        let out = consume_all(
            &mut c,
            &mut status,
            &[first, first, ts_packet(pid, 0, false, &x[183..])],
        );
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].content(), &x[..]);
        assert_eq!(status.discontinuities, 0);
    }

    #[test]
    fn repeated_cc_with_other_content() {
        let pid = Pid::new(0x100);
        let x = long_section(pid, 0x42, 1, 0, 0, 0, &[0x5a; 488]).content().to_vec();
        assert_eq!(x.len(), 500);
        let mut c = SectionPacketConsumer::new(pid);
        let mut status = DemuxStatus::default();
        let out = consume_all(
            &mut c,
            &mut status,
            &[
                pusi_packet(pid, 0, 0, &x[..183]),
                // same cc, but not a copy of the previous packet
                ts_packet(pid, 0, false, &x[183..367]),
                ts_packet(pid, 1, false, &x[367..]),
                ts_packet(pid, 2, false, &[]),
            ],
        );
        assert!(out.is_empty());
        assert_eq!(status.discontinuities, 1);
        assert_eq!(c.state(), ReassemblyState::Skipping);
    }

    #[test]
    fn second_duplicate_is_a_discontinuity() {
        let pid = Pid::new(0x100);
        let x = big_section(pid, 0x42);
        let first = pusi_packet(pid, 3, 0, &x[..183]);
        let mut c = SectionPacketConsumer::new(pid);
        let mut status = DemuxStatus::default();
        let out = consume_all(
            &mut c,
            &mut status,
            &[first, first, first, ts_packet(pid, 4, false, &x[183..])],
        );
        // the third copy starts the section afresh
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].content(), &x[..]);
        assert_eq!(status.discontinuities, 1);
    }

    #[test]
    fn signalled_discontinuity_is_not_an_error() {
        let pid = Pid::new(0x100);
        let mut pk = [0xffu8; Packet::SIZE];
        pk[0] = Packet::SYNC_BYTE;
        pk[1] = 0b0100_0001;
        pk[2] = 0x00;
        pk[3] = 0b0011_0000 | 9; // adaptation field and payload
        pk[4] = 1; // adaptation_field_length
        pk[5] = 0b1000_0000; // discontinuity_indicator
        pk[6] = 0; // pointer_field
        pk[7..7 + PAT.len()].copy_from_slice(&PAT);
        let mut c = SectionPacketConsumer::new(pid);
        let mut status = DemuxStatus::default();
        let out = consume_all(&mut c, &mut status, &[pusi_packet(pid, 2, 0, &PAT), pk]);
        assert_eq!(out.len(), 2);
        assert_eq!(status.discontinuities, 0);
    }

    #[test]
    fn incomplete_section_when_next_starts() {
        let pid = Pid::new(0x100);
        let x = big_section(pid, 0x42);
        let mut data = x[183..193].to_vec();
        data.extend_from_slice(&PAT);
        let mut c = SectionPacketConsumer::new(pid);
        let mut status = DemuxStatus::default();
        let out = consume_all(
            &mut c,
            &mut status,
            &[pusi_packet(pid, 0, 0, &x[..183]), pusi_packet(pid, 1, 10, &data)],
        );
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].content(), &PAT[..]);
        assert_eq!(status.inv_sect_length, 1);
    }

    #[test]
    fn pointer_beyond_payload() {
        let pid = Pid::new(0x100);
        let mut c = SectionPacketConsumer::new(pid);
        let mut status = DemuxStatus::default();
        let out = consume_all(&mut c, &mut status, &[pusi_packet(pid, 0, 183, &PAT)]);
        assert!(out.is_empty());
        assert_eq!(status.inv_sect_length, 1);
        assert_eq!(c.state(), ReassemblyState::Skipping);
    }

    #[test]
    fn oversized_short_section() {
        let pid = Pid::new(0x100);
        let mut c = SectionPacketConsumer::new(pid);
        let mut status = DemuxStatus::default();
        let out = consume_all(&mut c, &mut status, &[pusi_packet(pid, 0, 0, &hex!("707200"))]);
        assert!(out.is_empty());
        assert_eq!(status.inv_sect_length, 1);
    }

    #[test]
    fn crc_error_still_emitted() {
        let mut bad = PAT;
        bad[9] ^= 0x01;
        let mut c = SectionPacketConsumer::new(Pid::PAT);
        let mut status = DemuxStatus::default();
        let out = consume_all(&mut c, &mut status, &[pusi_packet(Pid::PAT, 0, 0, &bad)]);
        assert_eq!(out.len(), 1);
        assert!(!out[0].is_valid());
        assert_eq!(status.wrong_crc, 1);
    }

    #[test]
    fn corrupt_and_scrambled_packets() {
        let mut tei = pusi_packet(Pid::PAT, 0, 0, &PAT);
        tei[1] |= 0b1000_0000;
        let mut scrambled = pusi_packet(Pid::PAT, 1, 0, &PAT);
        scrambled[3] |= 0b1000_0000;
        let mut bad_sync = pusi_packet(Pid::PAT, 2, 0, &PAT);
        bad_sync[0] = 0x48;
        let mut c = SectionPacketConsumer::new(Pid::PAT);
        let mut status = DemuxStatus::default();
        let out = consume_all(&mut c, &mut status, &[tei, scrambled, bad_sync]);
        assert!(out.is_empty());
        assert_eq!(status.invalid_ts, 2);
        assert_eq!(status.scrambled, 1);
        // no continuity error is reported after the sync was lost
        let out = consume_all(&mut c, &mut status, &[pusi_packet(Pid::PAT, 9, 0, &PAT)]);
        assert_eq!(out.len(), 1);
        assert_eq!(status.discontinuities, 0);
    }

    #[test]
    fn reset_forgets_partial_section() {
        let pid = Pid::new(0x100);
        let x = big_section(pid, 0x42);
        let mut c = SectionPacketConsumer::new(pid);
        let mut status = DemuxStatus::default();
        consume_all(&mut c, &mut status, &[pusi_packet(pid, 0, 0, &x[..183])]);
        c.reset();
        let out = consume_all(&mut c, &mut status, &[ts_packet(pid, 1, false, &x[183..])]);
        assert!(out.is_empty());
        assert_eq!(c.state(), ReassemblyState::WaitingForStart);
    }
}
