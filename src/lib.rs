//! Demultiplexing of PSI/SI sections and tables from MPEG Transport Stream data, per
//! _ISO/IEC 13818-1_ and _ETSI EN 300 468_.
//!
//! # Design principals
//!
//!  * *Push, don't pull*.  The caller hands over 188-byte packets (or any buffer of whole
//!    packets) and receives complete sections and tables through handler callbacks.  There is
//!    no I/O here; the APIs accept `&[u8]`, and the caller handles providing the data from
//!    wherever.
//!  * *Damage is counted, not fatal*.  Corrupt packets, continuity errors, bad lengths and CRC
//!    failures are tallied in [`DemuxStatus`](demultiplex/struct.DemuxStatus.html) and the
//!    demultiplexer resynchronises at the next section start.
//!  * *Extensible*.  Tables and descriptors not interpreted by this crate are still delivered,
//!    and applications can register their own table decoders and descriptor types.
//!  * *Symmetric*.  Tables can be turned back into packets with
//!    [`CyclingPacketizer`](packetizer/struct.CyclingPacketizer.html), and the result
//!    demultiplexes to the same sections.
//!
//! # Example
//!
//! ```
//! use tssection::demultiplex::{DemuxControl, SectionDemux};
//! use tssection::packet::Pid;
//! use tssection::psi::BinaryTable;
//!
//! let mut demux = SectionDemux::default();
//! demux.add_pid(Pid::PAT);
//! demux.set_table_handler(Some(Box::new(
//!     |_ctl: &mut DemuxControl<'_>, table: &BinaryTable| {
//!         println!("table_id {:#04x} version {}", table.table_id(), table.version());
//!     },
//! )));
//! # let data: [u8; 0] = [];
//! demux.push(&data);
//! ```

pub mod descriptor;
pub mod demultiplex;
pub mod mjd;
mod mpegts_crc;
pub mod packet;
pub mod packetizer;
pub mod psi;

pub use crate::psi::pmt::StreamType;
