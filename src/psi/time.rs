//! The _Time and Date Table_ and _Time Offset Table_ of _ETSI EN 300 468_.
//!
//! Both are short sections carried on PID `0x0014`.  The TDT gives the current UTC time, the TOT
//! gives the same and adds, per country and region, the offset of local time from UTC.

use super::decode::{check_table, DecodeError};
use super::{tid, BinaryTable, CrcValidation, Section};
use crate::descriptor::local_time_offset::{LocalTimeOffsetDescriptor, Region};
use crate::descriptor::{self, OwnedDescriptor};
use crate::mjd;
use crate::mpegts_crc;
use crate::packet::Pid;
use chrono::{Duration, NaiveDateTime};

/// Format an offset in minutes as `+hh:mm` or `-hh:mm`.
pub fn format_time_offset(minutes: i32) -> String {
    let sign = if minutes < 0 { '-' } else { '+' };
    let abs = minutes.unsigned_abs();
    format!("{}{:02}:{:02}", sign, abs / 60, abs % 60)
}

fn short_section_header(table_id: u8, section_length: usize) -> [u8; 3] {
    [
        table_id,
        0b0111_0000 | (section_length >> 8) as u8 & 0x0f,
        section_length as u8,
    ]
}

/// Time and Date Table
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tdt {
    pub utc_time: NaiveDateTime,
}

impl Tdt {
    pub fn decode(table: &BinaryTable) -> Result<Tdt, DecodeError> {
        check_table(table, tid::TDT)?;
        let section = table.section_at(0).ok_or(DecodeError::IncompleteTable)?;
        let payload = section.payload();
        if payload.len() < mjd::UTC_TIME_SIZE {
            return Err(DecodeError::NotEnoughData {
                field: "UTC_time",
                expected: mjd::UTC_TIME_SIZE,
                actual: payload.len(),
            });
        }
        let utc_time = mjd::decode_utc_time(payload).ok_or(DecodeError::InvalidTime)?;
        Ok(Tdt { utc_time })
    }

    /// Serialise as a section, or `None` if the time cannot be represented.
    pub fn to_section(&self) -> Option<Section> {
        let mut data = short_section_header(tid::TDT, mjd::UTC_TIME_SIZE).to_vec();
        data.extend_from_slice(&mjd::encode_utc_time(&self.utc_time)?);
        Some(Section::new(data, Pid::TDT, CrcValidation::Ignore))
    }
}

/// One entry of the local time offset descriptors of a `Tot`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocalTimeRegion {
    pub country_code: String,
    pub region_id: u8,
    /// local time minus UTC, in minutes
    pub offset: i32,
    pub time_of_change: Option<NaiveDateTime>,
    /// the offset in effect from `time_of_change`
    pub next_offset: i32,
}

impl LocalTimeRegion {
    fn from_region(region: &Region<'_>) -> Result<LocalTimeRegion, DecodeError> {
        Ok(LocalTimeRegion {
            country_code: region.country_code().into_owned(),
            region_id: region.region_id(),
            offset: region.local_time_offset().ok_or(DecodeError::InvalidTime)?,
            time_of_change: region.time_of_change(),
            next_offset: region.next_time_offset().ok_or(DecodeError::InvalidTime)?,
        })
    }

    fn encode(&self, out: &mut Vec<u8>) -> Option<()> {
        let code = self.country_code.as_bytes();
        if code.len() != 3 || self.region_id > 0b11_1111 {
            return None;
        }
        // both offsets share one polarity bit
        let negative = self.offset < 0 || self.next_offset < 0;
        if negative && (self.offset > 0 || self.next_offset > 0) {
            return None;
        }
        out.extend_from_slice(code);
        out.push(self.region_id << 2 | 0b10 | u8::from(negative));
        out.extend_from_slice(&mjd::encode_time_offset(self.offset.unsigned_abs())?);
        match self.time_of_change {
            Some(t) => out.extend_from_slice(&mjd::encode_utc_time(&t)?),
            None => out.extend_from_slice(&[0xff; mjd::UTC_TIME_SIZE]),
        }
        out.extend_from_slice(&mjd::encode_time_offset(self.next_offset.unsigned_abs())?);
        Some(())
    }
}

/// Time Offset Table
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tot {
    pub utc_time: NaiveDateTime,
    /// The entries of all local time offset descriptors, in order
    pub regions: Vec<LocalTimeRegion>,
    /// Descriptors other than local time offset descriptors
    pub other_descriptors: Vec<OwnedDescriptor>,
}

impl Tot {
    const FIXED_SIZE: usize = mjd::UTC_TIME_SIZE + 2;
    const REGIONS_PER_DESCRIPTOR: usize = 255 / Region::SIZE;

    /// Decode the table, checking the CRC which ends the (short) TOT section.
    pub fn decode(table: &BinaryTable) -> Result<Tot, DecodeError> {
        check_table(table, tid::TOT)?;
        let section = table.section_at(0).ok_or(DecodeError::IncompleteTable)?;
        if !mpegts_crc::check(section.content()) {
            return Err(DecodeError::CrcMismatch);
        }
        let payload = section.payload();
        let body = &payload[..payload.len().saturating_sub(Section::CRC_SIZE)];
        if body.len() < Self::FIXED_SIZE {
            return Err(DecodeError::NotEnoughData {
                field: "time_offset_section",
                expected: Self::FIXED_SIZE,
                actual: body.len(),
            });
        }
        let utc_time = mjd::decode_utc_time(body).ok_or(DecodeError::InvalidTime)?;
        let loop_length = usize::from(body[5] & 0b0000_1111) << 8 | usize::from(body[6]);
        let descriptors = &body[Self::FIXED_SIZE..];
        if loop_length > descriptors.len() {
            return Err(DecodeError::NotEnoughData {
                field: "descriptors_loop",
                expected: loop_length,
                actual: descriptors.len(),
            });
        }
        let mut tot = Tot {
            utc_time,
            regions: vec![],
            other_descriptors: vec![],
        };
        for desc in descriptor::collect_descriptors(&descriptors[..loop_length])? {
            if desc.tag() == LocalTimeOffsetDescriptor::TAG {
                let lto = LocalTimeOffsetDescriptor::new(desc.tag(), desc.payload())?;
                for region in lto.regions() {
                    tot.regions.push(LocalTimeRegion::from_region(&region)?);
                }
            } else {
                tot.other_descriptors.push(desc);
            }
        }
        Ok(tot)
    }

    /// The local time of the region, at the time this table was sent.
    pub fn local_time(&self, region: &LocalTimeRegion) -> NaiveDateTime {
        let offset = match region.time_of_change {
            Some(change) if self.utc_time >= change => region.next_offset,
            _ => region.offset,
        };
        self.utc_time + Duration::minutes(i64::from(offset))
    }

    /// Serialise as a section with a freshly computed CRC, or `None` if some field cannot be
    /// represented.
    pub fn to_section(&self) -> Option<Section> {
        let mut loop_data = vec![];
        for chunk in self.regions.chunks(Self::REGIONS_PER_DESCRIPTOR) {
            let mut payload = vec![];
            for region in chunk {
                region.encode(&mut payload)?;
            }
            loop_data.extend_from_slice(
                OwnedDescriptor::new(LocalTimeOffsetDescriptor::TAG, &payload).as_bytes(),
            );
        }
        for desc in &self.other_descriptors {
            loop_data.extend_from_slice(desc.as_bytes());
        }
        if loop_data.len() > 0x0fff {
            return None;
        }
        let section_length = Self::FIXED_SIZE + loop_data.len() + Section::CRC_SIZE;
        if section_length + 3 > Section::MAX_SHORT_SECTION_SIZE {
            return None;
        }
        let mut data = short_section_header(tid::TOT, section_length).to_vec();
        data.extend_from_slice(&mjd::encode_utc_time(&self.utc_time)?);
        data.push(0xf0 | (loop_data.len() >> 8) as u8);
        data.push(loop_data.len() as u8);
        data.extend_from_slice(&loop_data);
        let crc = mpegts_crc::sum32(&data);
        data.extend_from_slice(&crc.to_be_bytes());
        Some(Section::new(data, Pid::TOT, CrcValidation::Ignore))
    }
}
