//! Local time offset descriptor, _ETSI EN 300 468_ section 6.2.20
//!
//! Carried in the Time Offset Table, giving the difference between UTC and local time for a
//! list of countries (or regions of countries), and the time at which that difference is next
//! due to change.

use super::DescriptorError;
use crate::mjd;
use chrono::NaiveDateTime;
use std::borrow::Cow;
use std::fmt;

pub struct LocalTimeOffsetDescriptor<'buf> {
    buf: &'buf [u8],
}
impl<'buf> LocalTimeOffsetDescriptor<'buf> {
    pub const TAG: u8 = 0x58;

    pub fn new(
        tag: u8,
        buf: &'buf [u8],
    ) -> Result<LocalTimeOffsetDescriptor<'buf>, DescriptorError> {
        if buf.len() % Region::SIZE != 0 {
            return Err(DescriptorError::InvalidLength {
                tag,
                len: buf.len(),
            });
        }
        Ok(LocalTimeOffsetDescriptor { buf })
    }

    pub fn regions(&self) -> RegionIter<'buf> {
        RegionIter { buf: self.buf }
    }
}
impl<'buf> fmt::Debug for LocalTimeOffsetDescriptor<'buf> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.regions()).finish()
    }
}

pub struct RegionIter<'buf> {
    buf: &'buf [u8],
}
impl<'buf> Iterator for RegionIter<'buf> {
    type Item = Region<'buf>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buf.len() < Region::SIZE {
            return None;
        }
        let (head, tail) = self.buf.split_at(Region::SIZE);
        self.buf = tail;
        Some(Region { buf: head })
    }
}

/// One entry of the descriptor.
pub struct Region<'buf> {
    buf: &'buf [u8],
}
impl<'buf> Region<'buf> {
    pub const SIZE: usize = 13;

    /// The three-letter _ISO 3166_ country code
    pub fn country_code(&self) -> Cow<'buf, str> {
        encoding_rs::mem::decode_latin1(&self.buf[0..3])
    }
    /// Identifies a time zone within the country; zero when the country has only one.
    pub fn region_id(&self) -> u8 {
        self.buf[3] >> 2
    }
    fn negative(&self) -> bool {
        self.buf[3] & 1 != 0
    }
    fn signed(&self, minutes: i32) -> i32 {
        if self.negative() {
            -minutes
        } else {
            minutes
        }
    }
    /// Local time minus UTC, in minutes.  `None` if the BCD digits are invalid.
    pub fn local_time_offset(&self) -> Option<i32> {
        mjd::decode_time_offset(&self.buf[4..6]).map(|m| self.signed(m))
    }
    /// The UTC time at which `next_time_offset()` replaces `local_time_offset()`.
    pub fn time_of_change(&self) -> Option<NaiveDateTime> {
        mjd::decode_utc_time(&self.buf[6..11])
    }
    /// The offset in effect after `time_of_change()`, in minutes.  Shares the polarity of
    /// `local_time_offset()`.
    pub fn next_time_offset(&self) -> Option<i32> {
        mjd::decode_time_offset(&self.buf[11..13]).map(|m| self.signed(m))
    }
}
impl<'buf> fmt::Debug for Region<'buf> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Region")
            .field("country_code", &self.country_code())
            .field("region_id", &self.region_id())
            .field("local_time_offset", &self.local_time_offset())
            .field("time_of_change", &self.time_of_change())
            .field("next_time_offset", &self.next_time_offset())
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::descriptor::{CoreDescriptors, Descriptor};
    use assert_matches::assert_matches;
    use chrono::NaiveDate;
    use hex_literal::hex;

    #[test]
    fn two_regions() {
        let data = hex!("581a 465241 02 0100 C079124500 0200 505254 07 0100 C079124500 0000");
        let desc = CoreDescriptors::from_bytes(&data).unwrap();
        assert_matches!(desc, CoreDescriptors::LocalTimeOffset(lto) => {
            let mut regions = lto.regions();
            let fra = regions.next().unwrap();
            assert_eq!(fra.country_code(), "FRA");
            assert_eq!(fra.region_id(), 0);
            assert_eq!(fra.local_time_offset(), Some(60));
            assert_eq!(fra.next_time_offset(), Some(120));
            assert_eq!(
                fra.time_of_change(),
                NaiveDate::from_ymd_opt(1993, 10, 13).and_then(|d| d.and_hms_opt(12, 45, 0))
            );
            let prt = regions.next().unwrap();
            assert_eq!(prt.country_code(), "PRT");
            assert_eq!(prt.region_id(), 1);
            assert_eq!(prt.local_time_offset(), Some(-60));
            assert_eq!(prt.next_time_offset(), Some(0));
            assert!(regions.next().is_none());
        });
    }

    #[test]
    fn bad_length() {
        assert_matches!(
            LocalTimeOffsetDescriptor::new(0x58, &[0; 12]),
            Err(DescriptorError::InvalidLength { tag: 0x58, len: 12 })
        );
    }
}
