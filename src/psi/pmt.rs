//! Types related to the _Program Map Table_

use super::decode::{check_table, DecodeError};
use super::{tid, BinaryTable};
use crate::descriptor::{self, OwnedDescriptor};
use crate::packet::Pid;
use log::warn;
use std::fmt;

/// The `stream_type` of an elementary stream listed in a PMT.
///
/// Any 8-bit value may appear in a stream, so this is a thin wrapper, with constants for the
/// commonly seen values.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamType(pub u8);

impl StreamType {
    pub const ISO_11172_VIDEO: StreamType = StreamType(0x01);
    pub const H262: StreamType = StreamType(0x02);
    pub const ISO_11172_AUDIO: StreamType = StreamType(0x03);
    pub const ISO_13818_3_AUDIO: StreamType = StreamType(0x04);
    pub const PRIVATE_SECTIONS: StreamType = StreamType(0x05);
    pub const PES_PRIVATE_DATA: StreamType = StreamType(0x06);
    pub const MHEG: StreamType = StreamType(0x07);
    pub const DSMCC_SECTIONS: StreamType = StreamType(0x0d);
    pub const ADTS: StreamType = StreamType(0x0f);
    pub const ISO_14496_2_VISUAL: StreamType = StreamType(0x10);
    pub const LATM: StreamType = StreamType(0x11);
    pub const METADATA_IN_PES: StreamType = StreamType(0x15);
    pub const H264: StreamType = StreamType(0x1b);
    pub const H265: StreamType = StreamType(0x24);
    pub const ATSC_DOLBY_DIGITAL_AUDIO: StreamType = StreamType(0x81);

    /// `true` for the stream types which carry sections rather than PES packets.
    pub fn carries_sections(self) -> bool {
        matches!(self.0, 0x05 | 0x0a..=0x0d | 0x13 | 0x16)
    }

    pub fn is_user_private(self) -> bool {
        self.0 >= 0x80
    }

    fn name(self) -> Option<&'static str> {
        Some(match self {
            Self::ISO_11172_VIDEO => "MPEG-1 Video",
            Self::H262 => "MPEG-2 Video",
            Self::ISO_11172_AUDIO => "MPEG-1 Audio",
            Self::ISO_13818_3_AUDIO => "MPEG-2 Audio",
            Self::PRIVATE_SECTIONS => "MPEG-2 Private sections",
            Self::PES_PRIVATE_DATA => "MPEG-2 PES private data",
            Self::MHEG => "MHEG",
            Self::DSMCC_SECTIONS => "DSM-CC Sections",
            Self::ADTS => "AAC Audio",
            Self::ISO_14496_2_VISUAL => "MPEG-4 Video",
            Self::LATM => "MPEG-4 AAC Audio",
            Self::METADATA_IN_PES => "Metadata in PES",
            Self::H264 => "AVC Video",
            Self::H265 => "HEVC Video",
            Self::ATSC_DOLBY_DIGITAL_AUDIO => "AC-3 Audio",
            _ => return None,
        })
    }
}

impl From<u8> for StreamType {
    fn from(v: u8) -> StreamType {
        StreamType(v)
    }
}

impl From<StreamType> for u8 {
    fn from(t: StreamType) -> u8 {
        t.0
    }
}

impl fmt::Debug for StreamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{:#04x} ({})", self.0, name),
            None => write!(f, "{:#04x}", self.0),
        }
    }
}

/// A view over the payload of a _Program Map Table_ section, which gives details of the streams
/// within a particular program.
pub struct PmtSection<'buf> {
    data: &'buf [u8],
}
impl<'buf> fmt::Debug for PmtSection<'buf> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        f.debug_struct("PmtSection")
            .field("pcr_pid", &self.pcr_pid())
            .field("descriptors", &DescriptorsDebug(self))
            .field("streams", &StreamsDebug(self))
            .finish()
    }
}
struct StreamsDebug<'buf>(&'buf PmtSection<'buf>);
impl<'buf> fmt::Debug for StreamsDebug<'buf> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        f.debug_list().entries(self.0.streams()).finish()
    }
}
struct DescriptorsDebug<'buf>(&'buf PmtSection<'buf>);
impl<'buf> fmt::Debug for DescriptorsDebug<'buf> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        f.debug_list()
            .entries(self.0.descriptors::<descriptor::CoreDescriptors<'buf>>())
            .finish()
    }
}

impl<'buf> PmtSection<'buf> {
    const HEADER_SIZE: usize = 4;

    /// Wrap the payload of a PMT section (the bytes after the table syntax header, CRC excluded).
    pub fn from_bytes(data: &'buf [u8]) -> Result<PmtSection<'buf>, DecodeError> {
        if data.len() < Self::HEADER_SIZE {
            return Err(DecodeError::NotEnoughData {
                field: "program_map_section",
                expected: Self::HEADER_SIZE,
                actual: data.len(),
            });
        }
        let sect = PmtSection { data };
        if sect.descriptor_end() > data.len() {
            return Err(DecodeError::NotEnoughData {
                field: "program_info",
                expected: sect.descriptor_end(),
                actual: data.len(),
            });
        }
        Ok(sect)
    }

    /// The PID of packets that will contain the Program Clock Reference for this program
    pub fn pcr_pid(&self) -> Pid {
        Pid::new(u16::from(self.data[0] & 0b0001_1111) << 8 | u16::from(self.data[1]))
    }
    fn program_info_length(&self) -> usize {
        usize::from(self.data[2] & 0b0000_1111) << 8 | usize::from(self.data[3])
    }
    fn descriptor_end(&self) -> usize {
        Self::HEADER_SIZE + self.program_info_length()
    }
    /// The raw program-level descriptor loop.
    pub fn descriptor_data(&self) -> &'buf [u8] {
        &self.data[Self::HEADER_SIZE..self.descriptor_end()]
    }
    pub fn descriptors<Desc: descriptor::Descriptor<'buf> + 'buf>(
        &self,
    ) -> impl Iterator<Item = Result<Desc, descriptor::DescriptorError>> + 'buf {
        descriptor::DescriptorIter::new(self.descriptor_data())
    }
    /// Returns an iterator over the streams of which this program is composed
    pub fn streams(&self) -> impl Iterator<Item = StreamInfo<'buf>> {
        StreamInfoIter {
            buf: &self.data[self.descriptor_end()..],
        }
    }
}

struct StreamInfoIter<'buf> {
    buf: &'buf [u8],
}
impl<'buf> Iterator for StreamInfoIter<'buf> {
    type Item = StreamInfo<'buf>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buf.is_empty() {
            return None;
        }
        match StreamInfo::from_bytes(self.buf) {
            Some((stream_info, info_len)) => {
                self.buf = &self.buf[info_len..];
                Some(stream_info)
            }
            None => {
                self.buf = &self.buf[0..0];
                None
            }
        }
    }
}

/// Details of a particular elementary stream within a program.
pub struct StreamInfo<'buf> {
    data: &'buf [u8],
}

impl<'buf> StreamInfo<'buf> {
    const HEADER_SIZE: usize = 5;

    fn from_bytes(data: &'buf [u8]) -> Option<(StreamInfo<'buf>, usize)> {
        if data.len() < Self::HEADER_SIZE {
            warn!(
                "only {} bytes remaining for stream info, at least {} required",
                data.len(),
                Self::HEADER_SIZE
            );
            return None;
        }
        let result = StreamInfo { data };
        let descriptor_end = Self::HEADER_SIZE + result.es_info_length();
        if descriptor_end > data.len() {
            warn!(
                "PMT section of size {} is not large enough to contain es_info_length of {}",
                data.len(),
                result.es_info_length()
            );
            return None;
        }
        Some((result, descriptor_end))
    }

    pub fn stream_type(&self) -> StreamType {
        StreamType(self.data[0])
    }
    /// The PID of packets carrying this elementary stream
    pub fn elementary_pid(&self) -> Pid {
        Pid::new(u16::from(self.data[1] & 0b0001_1111) << 8 | u16::from(self.data[2]))
    }
    fn es_info_length(&self) -> usize {
        usize::from(self.data[3] & 0b0000_1111) << 8 | usize::from(self.data[4])
    }
    pub fn descriptor_data(&self) -> &'buf [u8] {
        &self.data[Self::HEADER_SIZE..Self::HEADER_SIZE + self.es_info_length()]
    }
    pub fn descriptors<Desc: descriptor::Descriptor<'buf> + 'buf>(
        &self,
    ) -> impl Iterator<Item = Result<Desc, descriptor::DescriptorError>> + 'buf {
        descriptor::DescriptorIter::new(self.descriptor_data())
    }
}
impl<'buf> fmt::Debug for StreamInfo<'buf> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        f.debug_struct("StreamInfo")
            .field("stream_type", &self.stream_type())
            .field("elementary_pid", &self.elementary_pid())
            .field("descriptors", &StreamInfoDescriptorsDebug(self))
            .finish()
    }
}
struct StreamInfoDescriptorsDebug<'buf>(&'buf StreamInfo<'buf>);
impl<'buf> fmt::Debug for StreamInfoDescriptorsDebug<'buf> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        f.debug_list()
            .entries(self.0.descriptors::<descriptor::CoreDescriptors<'buf>>())
            .finish()
    }
}

/// One elementary stream of a decoded `Pmt`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PmtStream {
    pub stream_type: StreamType,
    pub elementary_pid: Pid,
    pub descriptors: Vec<OwnedDescriptor>,
}

/// A decoded _Program Map Table_.
///
/// Streams are listed in the order of the sections, then of the entries within each section.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Pmt {
    pub program_number: u16,
    pub version: u8,
    pub pcr_pid: Pid,
    pub descriptors: Vec<OwnedDescriptor>,
    pub streams: Vec<PmtStream>,
}

impl Pmt {
    pub fn decode(table: &BinaryTable) -> Result<Pmt, DecodeError> {
        check_table(table, tid::PMT)?;
        let mut pmt = Pmt {
            program_number: table.table_id_extension(),
            version: table.version(),
            pcr_pid: Pid::NULL,
            descriptors: vec![],
            streams: vec![],
        };
        for (i, section) in table.sections().enumerate() {
            let sect = PmtSection::from_bytes(section.payload())?;
            if i == 0 {
                pmt.pcr_pid = sect.pcr_pid();
            }
            pmt.descriptors
                .extend(descriptor::collect_descriptors(sect.descriptor_data())?);
            for info in sect.streams() {
                pmt.streams.push(PmtStream {
                    stream_type: info.stream_type(),
                    elementary_pid: info.elementary_pid(),
                    descriptors: descriptor::collect_descriptors(info.descriptor_data())?,
                });
            }
        }
        Ok(pmt)
    }

    /// The first stream carried on the given PID.
    pub fn stream(&self, pid: Pid) -> Option<&PmtStream> {
        self.streams.iter().find(|s| s.elementary_pid == pid)
    }
}
