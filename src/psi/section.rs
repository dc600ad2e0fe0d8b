//! A complete PSI/SI section, as recovered from the transport stream.

use super::{CurrentNext, SectionCommonHeader, TableSyntaxHeader};
use crate::mpegts_crc;
use crate::packet::Pid;
use std::fmt;

/// What `Section::new()` should do about the CRC-32 of a long section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrcValidation {
    /// Trust the stored CRC without checking it
    Ignore,
    /// Recompute the CRC and mark the section invalid on mismatch
    Check,
    /// Overwrite the stored CRC with a freshly computed value
    Compute,
}

/// An owned PSI/SI section.
///
/// A `Section` is created with a validity flag rather than failing, so that callers can
/// inspect sections that were received damaged.  The header accessors of an invalid section
/// return `0` (or `false`) instead of panicking when the underlying bytes are too short.
///
/// Once created, a section is immutable; share it between owners with `Arc<Section>`.
#[derive(Clone, PartialEq, Eq)]
pub struct Section {
    data: Vec<u8>,
    source_pid: Pid,
    valid: bool,
}

impl Section {
    /// Largest size of a long section, header and CRC included.
    pub const MAX_LONG_SECTION_SIZE: usize = 4096;
    /// Largest size of a short section, header included.
    pub const MAX_SHORT_SECTION_SIZE: usize = 256;
    /// Smallest valid long section: common header, syntax header and CRC.
    pub const MIN_LONG_SECTION_SIZE: usize =
        SectionCommonHeader::SIZE + TableSyntaxHeader::SIZE + Self::CRC_SIZE;
    /// Size of the CRC which ends every long section.
    pub const CRC_SIZE: usize = 4;

    /// Wrap the given complete section bytes, checking the length fields and (depending on
    /// `crc`) the CRC-32 of long sections.
    pub fn new(data: Vec<u8>, source_pid: Pid, crc: CrcValidation) -> Section {
        let mut sect = Section {
            data,
            source_pid,
            valid: false,
        };
        if !sect.lengths_valid() {
            return sect;
        }
        if sect.is_long_section() {
            let crc_start = sect.data.len() - Self::CRC_SIZE;
            match crc {
                CrcValidation::Ignore => (),
                CrcValidation::Check => {
                    if !mpegts_crc::check(&sect.data) {
                        return sect;
                    }
                }
                CrcValidation::Compute => {
                    let value = mpegts_crc::sum32(&sect.data[..crc_start]);
                    sect.data[crc_start..].copy_from_slice(&value.to_be_bytes());
                }
            }
        }
        sect.valid = true;
        sect
    }

    /// Like `new()`, copying from a slice.
    pub fn from_slice(data: &[u8], source_pid: Pid, crc: CrcValidation) -> Section {
        Section::new(data.to_vec(), source_pid, crc)
    }

    fn lengths_valid(&self) -> bool {
        if self.data.len() < SectionCommonHeader::SIZE {
            return false;
        }
        let header = SectionCommonHeader::new(&self.data);
        if header.total_size() != self.data.len() {
            return false;
        }
        if header.section_syntax_indicator {
            self.data.len() >= Self::MIN_LONG_SECTION_SIZE
                && self.data.len() <= Self::MAX_LONG_SECTION_SIZE
                && self.data[6] <= self.data[7]
        } else {
            self.data.len() <= Self::MAX_SHORT_SECTION_SIZE
        }
    }

    /// `true` if the declared length matched the data and, for long sections, the CRC was
    /// correct.
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// The PID from which this section was demultiplexed.  This is metadata, not part of the
    /// section bytes.
    pub fn source_pid(&self) -> Pid {
        self.source_pid
    }

    /// All bytes of the section, from `table_id` to the end of the CRC (if any).
    pub fn content(&self) -> &[u8] {
        &self.data
    }

    /// Total size of the section in bytes.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    fn has_header(&self) -> bool {
        self.data.len() >= SectionCommonHeader::SIZE
    }

    fn has_syntax_header(&self) -> bool {
        self.is_long_section()
            && self.data.len() >= SectionCommonHeader::SIZE + TableSyntaxHeader::SIZE
    }

    /// The common header, if at least 3 bytes are present.
    pub fn common_header(&self) -> Option<SectionCommonHeader> {
        if self.has_header() {
            Some(SectionCommonHeader::new(&self.data))
        } else {
            None
        }
    }

    /// The table syntax header, for long sections only.
    pub fn syntax_header(&self) -> Option<TableSyntaxHeader<'_>> {
        if self.has_syntax_header() {
            Some(TableSyntaxHeader::new(&self.data[SectionCommonHeader::SIZE..]))
        } else {
            None
        }
    }

    pub fn table_id(&self) -> u8 {
        self.data.first().copied().unwrap_or(0)
    }

    /// `true` for sections with `section_syntax_indicator` set, which carry a
    /// `table_id_extension`, version, section numbering and a CRC.
    pub fn is_long_section(&self) -> bool {
        self.data.len() >= 2 && self.data[1] & 0b1000_0000 != 0
    }

    pub fn is_short_section(&self) -> bool {
        !self.is_long_section()
    }

    pub fn is_private_section(&self) -> bool {
        self.data.len() >= 2 && self.data[1] & 0b0100_0000 != 0
    }

    pub fn section_length(&self) -> usize {
        self.common_header().map(|h| h.section_length).unwrap_or(0)
    }

    pub fn table_id_extension(&self) -> u16 {
        self.syntax_header().map(|h| h.id()).unwrap_or(0)
    }

    pub fn version(&self) -> u8 {
        self.syntax_header().map(|h| h.version()).unwrap_or(0)
    }

    pub fn current_next(&self) -> CurrentNext {
        self.syntax_header()
            .map(|h| h.current_next_indicator())
            .unwrap_or(CurrentNext::Current)
    }

    /// Short sections are always considered current.
    pub fn is_current(&self) -> bool {
        self.current_next() == CurrentNext::Current
    }

    pub fn is_next(&self) -> bool {
        self.current_next() == CurrentNext::Next
    }

    pub fn section_number(&self) -> u8 {
        self.syntax_header().map(|h| h.section_number()).unwrap_or(0)
    }

    pub fn last_section_number(&self) -> u8 {
        self.syntax_header()
            .map(|h| h.last_section_number())
            .unwrap_or(0)
    }

    fn header_size(&self) -> usize {
        if self.is_long_section() {
            SectionCommonHeader::SIZE + TableSyntaxHeader::SIZE
        } else {
            SectionCommonHeader::SIZE
        }
    }

    fn trailer_size(&self) -> usize {
        if self.is_long_section() {
            Self::CRC_SIZE
        } else {
            0
        }
    }

    /// The table-specific bytes of the section, after the fixed header and before the CRC.
    /// Empty if the section is invalid.
    pub fn payload(&self) -> &[u8] {
        if !self.valid {
            return &[];
        }
        &self.data[self.header_size()..self.data.len() - self.trailer_size()]
    }

    pub fn payload_size(&self) -> usize {
        self.payload().len()
    }

    /// The CRC value stored at the end of a long section.
    pub fn stored_crc32(&self) -> Option<u32> {
        if self.is_long_section() && self.data.len() >= Self::MIN_LONG_SECTION_SIZE {
            let c = &self.data[self.data.len() - Self::CRC_SIZE..];
            Some(u32::from_be_bytes([c[0], c[1], c[2], c[3]]))
        } else {
            None
        }
    }
}

impl fmt::Debug for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("Section");
        d.field("pid", &self.source_pid)
            .field("table_id", &self.table_id())
            .field("valid", &self.valid)
            .field("size", &self.data.len());
        if self.is_long_section() {
            d.field("table_id_extension", &self.table_id_extension())
                .field("version", &self.version())
                .field("current_next", &self.current_next())
                .field("section_number", &self.section_number())
                .field("last_section_number", &self.last_section_number());
        }
        d.finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use hex_literal::hex;

    const PAT: [u8; 16] = hex!("00B00D0001C100000001E1E02D507804");

    #[test]
    fn valid_pat() {
        let s = Section::from_slice(&PAT, Pid::PAT, CrcValidation::Check);
        assert!(s.is_valid());
        assert!(s.is_long_section());
        assert_eq!(s.table_id(), 0);
        assert_eq!(s.table_id_extension(), 1);
        assert_eq!(s.version(), 0);
        assert!(s.is_current());
        assert_eq!(s.section_number(), 0);
        assert_eq!(s.last_section_number(), 0);
        assert_eq!(s.payload(), &hex!("0001E1E0")[..]);
        assert_eq!(s.stored_crc32(), Some(0x2D50_7804));
        assert_eq!(s.source_pid(), Pid::PAT);
    }

    #[test]
    fn corrupt_crc() {
        let mut data = PAT;
        data[10] ^= 0x40;
        let s = Section::from_slice(&data, Pid::PAT, CrcValidation::Check);
        assert!(!s.is_valid());
        assert!(s.payload().is_empty());
        // header fields are still readable
        assert_eq!(s.table_id_extension(), 1);
        let s = Section::from_slice(&data, Pid::PAT, CrcValidation::Ignore);
        assert!(s.is_valid());
    }

    #[test]
    fn compute_crc() {
        let mut data = PAT;
        data[12..].copy_from_slice(&[0, 0, 0, 0]);
        let s = Section::from_slice(&data, Pid::PAT, CrcValidation::Compute);
        assert!(s.is_valid());
        assert_eq!(s.content(), &PAT[..]);
    }

    #[test]
    fn too_short() {
        let s = Section::from_slice(&hex!("00B0"), Pid::PAT, CrcValidation::Check);
        assert!(!s.is_valid());
        assert_eq!(s.table_id_extension(), 0);
        assert_eq!(s.version(), 0);
        assert_eq!(s.section_length(), 0);
        let s = Section::new(vec![], Pid::PAT, CrcValidation::Check);
        assert!(!s.is_valid());
        assert_eq!(s.table_id(), 0);
    }

    #[test]
    fn length_mismatch() {
        // declares 13 bytes after the header, but only 12 present
        let s = Section::from_slice(&PAT[..15], Pid::PAT, CrcValidation::Ignore);
        assert!(!s.is_valid());
    }

    #[test]
    fn section_number_beyond_last() {
        let mut data = PAT;
        data[6] = 1;
        let s = Section::from_slice(&data, Pid::PAT, CrcValidation::Compute);
        assert!(!s.is_valid());
    }

    #[test]
    fn short_section() {
        // TDT, 93/10/13 12:45:00
        let s = Section::from_slice(&hex!("7070 05 C079124500"), Pid::TDT, CrcValidation::Check);
        assert!(s.is_valid());
        assert!(s.is_short_section());
        assert!(s.is_current());
        assert_eq!(s.payload(), &hex!("C079124500")[..]);
        assert_eq!(s.stored_crc32(), None);
    }

    #[test]
    fn short_section_size_limit() {
        // section_length=0x101, one byte more than a short section may hold
        let mut data = vec![0x80, 0x71, 0x01];
        data.resize(3 + 0x101, 0);
        let s = Section::new(data, Pid::new(0x100), CrcValidation::Check);
        assert!(!s.is_valid());
    }
}
