//! Types for processing tables of *Program Specific Information* and *Service Information* in a
//! transport stream.
//!
//! # Concepts
//!
//! * There are multiple standard types of PSI/SI table, like the *Program Association Table* and
//!   *Program Map Table*.  Standards derived from mpegts may define their own table types.
//! * A *Table* can be split into *Sections*
//! * A Section can be split across a number of individual transport stream *Packets*, and a
//!   single packet may carry the end of one section and the start of several more.
//! * A Section may use the 'long' syntax common across a number of the standard table types
//!   (with version, section numbering and a CRC), or may be a 'short' section, an opaque bag of
//!   bytes whose interpretation is defined by the table type.
//!
//! # Core types
//!
//! * [`SectionPacketConsumer`](reassembly/struct.SectionPacketConsumer.html) converts the
//!   *Packets* of one PID into *Sections*
//! * [`BinaryTable`](table/struct.BinaryTable.html) collects *Sections* into a *Table*
//! * [`TableRegistry`](decode/struct.TableRegistry.html) decodes some well known tables
//!
//! Demultiplexing packets from many PIDs is the job of
//! [`SectionDemux`](../demultiplex/struct.SectionDemux.html).

pub mod decode;
pub mod pat;
pub mod pmt;
pub mod reassembly;
pub mod section;
pub mod table;
pub mod time;

pub use self::section::{CrcValidation, Section};
pub use self::table::BinaryTable;

/// Well-known `table_id` values.
pub mod tid {
    /// Program Association Table
    pub const PAT: u8 = 0x00;
    /// Conditional Access Table
    pub const CAT: u8 = 0x01;
    /// Program Map Table
    pub const PMT: u8 = 0x02;
    /// Transport Stream Description Table
    pub const TSDT: u8 = 0x03;
    /// Network Information Table, actual network
    pub const NIT_ACT: u8 = 0x40;
    /// Network Information Table, other network
    pub const NIT_OTH: u8 = 0x41;
    /// Service Description Table, actual TS
    pub const SDT_ACT: u8 = 0x42;
    /// Service Description Table, other TS
    pub const SDT_OTH: u8 = 0x46;
    /// Bouquet Association Table
    pub const BAT: u8 = 0x4A;
    /// Event Information Table present/following, actual TS
    pub const EIT_PF_ACT: u8 = 0x4E;
    /// Event Information Table present/following, other TS
    pub const EIT_PF_OTH: u8 = 0x4F;
    /// Time and Date Table
    pub const TDT: u8 = 0x70;
    /// Running Status Table
    pub const RST: u8 = 0x71;
    /// Stuffing Table
    pub const ST: u8 = 0x72;
    /// Time Offset Table
    pub const TOT: u8 = 0x73;
    /// Not a table: the value of stuffing bytes following the last section in a packet
    pub const STUFFING: u8 = 0xFF;
}

/// Indicates whether a table is applicable now, or will become applicable in the future.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum CurrentNext {
    /// The table is currently applicable
    Current,
    /// The table will become applicable at some point in the future
    Next,
}

impl CurrentNext {
    fn from(v: u8) -> CurrentNext {
        match v & 1 {
            0 => CurrentNext::Next,
            _ => CurrentNext::Current,
        }
    }
}

/// The 3 bytes which start every section, whatever its syntax.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionCommonHeader {
    pub table_id: u8,
    pub section_syntax_indicator: bool,
    pub private_indicator: bool,
    pub section_length: usize,
}

impl SectionCommonHeader {
    pub const SIZE: usize = 3;

    /// Panics if fewer than `SectionCommonHeader::SIZE` bytes are given.
    pub fn new(buf: &[u8]) -> SectionCommonHeader {
        assert!(buf.len() >= Self::SIZE);
        SectionCommonHeader {
            table_id: buf[0],
            section_syntax_indicator: buf[1] & 0b1000_0000 != 0,
            private_indicator: buf[1] & 0b0100_0000 != 0,
            section_length: ((u16::from(buf[1] & 0b0000_1111) << 8) | u16::from(buf[2])) as usize,
        }
    }

    /// The size of the whole section described by this header, including the header itself.
    pub fn total_size(&self) -> usize {
        Self::SIZE + self.section_length
    }
}

/// Represents the fields that appear within table sections that use the common 'section syntax'.
///
/// This will only be used for a table section if the
/// [`section_syntax_indicator`](struct.SectionCommonHeader.html#structfield.section_syntax_indicator)
/// field in the `SectionCommonHeader` of the section is `true`.
#[derive(Debug)]
pub struct TableSyntaxHeader<'buf> {
    buf: &'buf [u8],
}

impl<'buf> TableSyntaxHeader<'buf> {
    pub const SIZE: usize = 5;

    /// Panics if fewer than `TableSyntaxHeader::SIZE` bytes are given.
    pub fn new(buf: &'buf [u8]) -> TableSyntaxHeader<'buf> {
        assert!(buf.len() >= Self::SIZE);
        TableSyntaxHeader { buf }
    }
    /// The initial 16-bit field within a 'section syntax' PSI table (which immediately follows the
    /// `section_length` field).
    /// _13818-1_ refers to this field as,
    ///  - `transport_stream_id` when it appears within a Program Association Section
    ///  - part of the `reserved` field when it appears within a Conditional Access Section
    ///  - `program_number` when it appears within a Program Map Section
    ///  - `table_id_extension` when it appears within a Private Section
    pub fn id(&self) -> u16 {
        u16::from(self.buf[0]) << 8 | u16::from(self.buf[1])
    }
    /// A 5-bit value that can be used to quickly check if this table has changed since the last
    /// time it was periodically inserted within the transport stream being read.
    pub fn version(&self) -> u8 {
        (self.buf[2] >> 1) & 0b0001_1111
    }
    /// Is this table applicable now, or will it become applicable at some future time.
    pub fn current_next_indicator(&self) -> CurrentNext {
        CurrentNext::from(self.buf[2])
    }
    /// The number of this section, within a potentially multi-section table.
    pub fn section_number(&self) -> u8 {
        self.buf[3]
    }
    /// Indicates the value of `section_number()` that will appear within the last section within
    /// a table.
    pub fn last_section_number(&self) -> u8 {
        self.buf[4]
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn common_header() {
        let h = SectionCommonHeader::new(&hex!("02B017"));
        assert_eq!(h.table_id, tid::PMT);
        assert!(h.section_syntax_indicator);
        assert!(!h.private_indicator);
        assert_eq!(h.section_length, 0x17);
        assert_eq!(h.total_size(), 0x17 + 3);
    }

    #[test]
    fn syntax_header() {
        let h = TableSyntaxHeader::new(&hex!("0001C70203"));
        assert_eq!(h.id(), 1);
        assert_eq!(h.version(), 3);
        assert_eq!(h.current_next_indicator(), CurrentNext::Current);
        assert_eq!(h.section_number(), 2);
        assert_eq!(h.last_section_number(), 3);
        let next = TableSyntaxHeader::new(&hex!("0001C60203"));
        assert_eq!(next.current_next_indicator(), CurrentNext::Next);
    }
}
