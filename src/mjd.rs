//! Date and time encodings used inside DVB SI sections (_ETSI EN 300 468_, Annex C).
//!
//! Dates are carried as a 16-bit _Modified Julian Date_ and times of day as three 4-bit/4-bit
//! BCD bytes, so a complete UTC time occupies 40 bits.

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};

/// Size in bytes of an encoded MJD + BCD UTC time
pub const UTC_TIME_SIZE: usize = 5;

fn mjd_epoch() -> NaiveDate {
    // MJD day zero
    NaiveDate::from_ymd_opt(1858, 11, 17).unwrap_or(NaiveDate::MIN)
}

/// Decode one BCD byte, e.g. `0x45` becomes `45`.  Returns `None` if either nibble is not a
/// decimal digit.
pub fn decode_bcd(b: u8) -> Option<u8> {
    let hi = b >> 4;
    let lo = b & 0x0f;
    if hi > 9 || lo > 9 {
        None
    } else {
        Some(hi * 10 + lo)
    }
}

/// Encode a value in the range `0..=99` as a BCD byte.  Returns `None` for larger values.
pub fn encode_bcd(v: u8) -> Option<u8> {
    if v > 99 {
        None
    } else {
        Some((v / 10) << 4 | (v % 10))
    }
}

/// Convert a Modified Julian Date day number to a calendar date.
pub fn decode_mjd(mjd: u16) -> Option<NaiveDate> {
    mjd_epoch().checked_add_signed(Duration::days(i64::from(mjd)))
}

/// Convert a calendar date to a Modified Julian Date, if it can be represented in 16 bits.
pub fn encode_mjd(date: NaiveDate) -> Option<u16> {
    let days = date.signed_duration_since(mjd_epoch()).num_days();
    u16::try_from(days).ok()
}

/// Decode a 40-bit UTC time: 16 bits of MJD followed by `hh`, `mm`, `ss` in BCD.
///
/// Returns `None` if fewer than 5 bytes are given or if any BCD digit is invalid.  A value of
/// all-ones bits is used in some tables to mean 'undefined', and also yields `None`.
pub fn decode_utc_time(data: &[u8]) -> Option<NaiveDateTime> {
    if data.len() < UTC_TIME_SIZE {
        return None;
    }
    let mjd = u16::from(data[0]) << 8 | u16::from(data[1]);
    let date = decode_mjd(mjd)?;
    let hour = decode_bcd(data[2])?;
    let minute = decode_bcd(data[3])?;
    let second = decode_bcd(data[4])?;
    let time = NaiveTime::from_hms_opt(hour.into(), minute.into(), second.into())?;
    Some(date.and_time(time))
}

/// Encode a UTC time into the 40-bit MJD + BCD form.
pub fn encode_utc_time(time: &NaiveDateTime) -> Option<[u8; UTC_TIME_SIZE]> {
    use chrono::Timelike;
    let mjd = encode_mjd(time.date())?;
    Some([
        (mjd >> 8) as u8,
        mjd as u8,
        encode_bcd(time.hour() as u8)?,
        encode_bcd(time.minute() as u8)?,
        encode_bcd(time.second() as u8)?,
    ])
}

/// Decode a 16-bit BCD `hhmm` duration, as used by the `local_time_offset` fields, into a
/// number of minutes.
pub fn decode_time_offset(data: &[u8]) -> Option<i32> {
    if data.len() < 2 {
        return None;
    }
    let hours = decode_bcd(data[0])?;
    let minutes = decode_bcd(data[1])?;
    if minutes > 59 {
        return None;
    }
    Some(i32::from(hours) * 60 + i32::from(minutes))
}

/// Encode a number of minutes as a 16-bit BCD `hhmm` duration.  Returns `None` for 100 hours
/// or more.
pub fn encode_time_offset(minutes: u32) -> Option<[u8; 2]> {
    let hours = u8::try_from(minutes / 60).ok()?;
    Some([encode_bcd(hours)?, encode_bcd((minutes % 60) as u8)?])
}
