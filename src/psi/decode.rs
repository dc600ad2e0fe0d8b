//! Turning complete `BinaryTable` values into typed tables.
//!
//! The demultiplexer knows nothing of the syntax of particular tables.  A
//! [`TableRegistry`](struct.TableRegistry.html) maps each `table_id` to a function able to decode
//! tables with that id, and is typically consulted from a table handler:
//!
//! ```
//! # use tssection::demultiplex::{DemuxControl, SectionDemux};
//! # use tssection::psi::decode::{DecodedTable, TableRegistry};
//! # use tssection::psi::BinaryTable;
//! let registry = TableRegistry::standard();
//! let mut demux = SectionDemux::default();
//! demux.set_table_handler(Some(Box::new(
//!     move |ctl: &mut DemuxControl<'_>, table: &BinaryTable| {
//!         if let Some(Ok(DecodedTable::Pat(pat))) = registry.decode(table) {
//!             ctl.add_pids(pat.pmt_pids());
//!         }
//!     },
//! )));
//! ```

use super::pat::Pat;
use super::pmt::Pmt;
use super::time::{Tdt, Tot};
use super::{tid, BinaryTable};
use crate::descriptor::DescriptorError;
use std::collections::HashMap;
use std::error;
use std::fmt;

/// Reasons a table could not be decoded.
#[derive(Debug, PartialEq, Eq)]
pub enum DecodeError {
    /// Some sections of the table are missing
    IncompleteTable,
    WrongTableId {
        expected: u8,
        actual: u8,
    },
    NotEnoughData {
        field: &'static str,
        expected: usize,
        actual: usize,
    },
    /// An MJD/BCD encoded time could not be read
    InvalidTime,
    CrcMismatch,
    Descriptor(DescriptorError),
}

impl From<DescriptorError> for DecodeError {
    fn from(e: DescriptorError) -> DecodeError {
        DecodeError::Descriptor(e)
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::IncompleteTable => f.write_str("table is incomplete"),
            DecodeError::WrongTableId { expected, actual } => write!(
                f,
                "expected table_id {:#04x}, got {:#04x}",
                expected, actual
            ),
            DecodeError::NotEnoughData {
                field,
                expected,
                actual,
            } => write!(
                f,
                "{} needs {} bytes, only {} available",
                field, expected, actual
            ),
            DecodeError::InvalidTime => f.write_str("invalid MJD/BCD time"),
            DecodeError::CrcMismatch => f.write_str("CRC mismatch"),
            DecodeError::Descriptor(e) => write!(f, "descriptor error: {}", e),
        }
    }
}

impl error::Error for DecodeError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            DecodeError::Descriptor(e) => Some(e),
            _ => None,
        }
    }
}

/// Fails unless the table is complete and has the expected `table_id`.
pub(crate) fn check_table(table: &BinaryTable, table_id: u8) -> Result<(), DecodeError> {
    if !table.is_valid() {
        return Err(DecodeError::IncompleteTable);
    }
    if table.table_id() != table_id {
        return Err(DecodeError::WrongTableId {
            expected: table_id,
            actual: table.table_id(),
        });
    }
    Ok(())
}

/// The result of decoding a table.
#[derive(Debug)]
pub enum DecodedTable {
    Pat(Pat),
    Pmt(Pmt),
    Tdt(Tdt),
    Tot(Tot),
    /// Produced by decoders registered by the application
    Other(Box<dyn fmt::Debug + Send>),
}

pub type DecodeFn = fn(&BinaryTable) -> Result<DecodedTable, DecodeError>;

/// Maps `table_id` values to the function decoding tables with that id.
#[derive(Clone, Default)]
pub struct TableRegistry {
    decoders: HashMap<u8, DecodeFn>,
}

impl TableRegistry {
    /// An empty registry.
    pub fn new() -> TableRegistry {
        TableRegistry::default()
    }

    /// A registry able to decode the tables this crate knows about: PAT, PMT, TDT and TOT.
    pub fn standard() -> TableRegistry {
        let mut reg = TableRegistry::new();
        reg.register(tid::PAT, |t| Pat::decode(t).map(DecodedTable::Pat));
        reg.register(tid::PMT, |t| Pmt::decode(t).map(DecodedTable::Pmt));
        reg.register(tid::TDT, |t| Tdt::decode(t).map(DecodedTable::Tdt));
        reg.register(tid::TOT, |t| Tot::decode(t).map(DecodedTable::Tot));
        reg
    }

    /// Use `decoder` for tables with the given id, returning any decoder it replaces.
    pub fn register(&mut self, table_id: u8, decoder: DecodeFn) -> Option<DecodeFn> {
        self.decoders.insert(table_id, decoder)
    }

    pub fn is_registered(&self, table_id: u8) -> bool {
        self.decoders.contains_key(&table_id)
    }

    /// Decode the table, or return `None` if no decoder is registered for its `table_id`.
    pub fn decode(&self, table: &BinaryTable) -> Option<Result<DecodedTable, DecodeError>> {
        self.decoders
            .get(&table.table_id())
            .map(|decoder| decoder(table))
    }
}

impl fmt::Debug for TableRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ids: Vec<_> = self.decoders.keys().collect();
        ids.sort();
        f.debug_struct("TableRegistry")
            .field("table_ids", &ids)
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::packet::Pid;
    use crate::psi::table::test::long_section;
    use crate::psi::{CrcValidation, Section};
    use assert_matches::assert_matches;
    use hex_literal::hex;
    use std::sync::Arc;

    fn table(sections: &[Arc<Section>]) -> BinaryTable {
        BinaryTable::from_sections(sections.iter().cloned()).unwrap()
    }

    #[test]
    fn standard() {
        let reg = TableRegistry::standard();
        let pat = Section::from_slice(
            &hex!("00B00D0001C100000001E1E02D507804"),
            Pid::PAT,
            CrcValidation::Check,
        );
        assert_matches!(
            reg.decode(&table(&[Arc::new(pat)])),
            Some(Ok(DecodedTable::Pat(ref pat))) if pat.transport_stream_id == 1
        );
        let sdt = long_section(Pid::SDT, tid::SDT_ACT, 1, 0, 0, 0, b"");
        assert!(reg.decode(&table(&[sdt])).is_none());
    }

    #[test]
    fn wrong_table_id() {
        let sdt = long_section(Pid::SDT, tid::SDT_ACT, 1, 0, 0, 0, b"");
        assert_eq!(
            Pat::decode(&table(&[sdt])).unwrap_err(),
            DecodeError::WrongTableId {
                expected: tid::PAT,
                actual: tid::SDT_ACT
            }
        );
    }

    #[test]
    fn incomplete() {
        let mut t = BinaryTable::new();
        t.add_section(long_section(Pid::PAT, tid::PAT, 1, 0, 0, 1, b""));
        assert_eq!(Pat::decode(&t).unwrap_err(), DecodeError::IncompleteTable);
    }

    #[derive(Debug)]
    struct SectionCount(usize);

    #[test]
    fn custom_decoder() {
        let mut reg = TableRegistry::new();
        assert!(!reg.is_registered(tid::SDT_ACT));
        reg.register(tid::SDT_ACT, |t| {
            Ok(DecodedTable::Other(Box::new(SectionCount(t.section_count()))))
        });
        assert!(reg.is_registered(tid::SDT_ACT));
        let sdt = long_section(Pid::SDT, tid::SDT_ACT, 1, 0, 0, 0, b"");
        let decoded = reg.decode(&table(&[sdt])).unwrap().unwrap();
        assert_eq!(format!("{:?}", decoded), "Other(SectionCount(1))");
    }

    #[test]
    fn display() {
        assert_eq!(
            DecodeError::Descriptor(DescriptorError::UnhandledTagValue(1)).to_string(),
            "descriptor error: unhandled descriptor tag 0x01"
        );
    }
}
