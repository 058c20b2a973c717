//! Fixed-layout ASCII header at the start of every `R22` spectrum reply.
//!
//! All numeric fields are zero-padded decimals at fixed byte ranges. The bytes
//! are decoded as ISO-8859-1 because the binary payload that follows may carry
//! any byte value, and a header from a confused device must fail cleanly
//! rather than as invalid UTF-8.

use crate::constants::{BIN_SIZE, SPECTRUM_HEADER_SIZE, SPECTRUM_TRAILER_SIZE};
use crate::error::PdsError;
use chrono::NaiveDateTime;
use serde::Serialize;
use std::fmt;
use std::ops::Range;
use std::str::FromStr;

const SERIAL: Range<usize> = 4..12;
const GAIN: Range<usize> = 12..15;
const OFFSET: Range<usize> = 15..18;
const TEMPERATURE: Range<usize> = 18..21;
const ACQ_TIME: Range<usize> = 21..24;
const DOSE_RATE: Range<usize> = 24..29;
const NEUTRON_RATE: Range<usize> = 29..32;
const TIME: Range<usize> = 32..38;
const DAY: Range<usize> = 38..40;
const MONTH: Range<usize> = 40..42;
const YEAR: Range<usize> = 42..44;
const BIN_COUNT: Range<usize> = 44..48;
const SPECTRUM_INDEX: Range<usize> = 48..51;

/// Spectrum metadata reported by the device.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpectrumHeader {
    pub serial: String,
    /// keV per channel
    pub gain: f32,
    /// Calibration offset in bins
    pub offset_bins: i32,
    pub temperature_c: i32,
    /// Acquisition time, at most 999 seconds
    pub acq_time_seconds: i32,
    pub dose_rate_usv_h: f32,
    pub neutron_rate: f32,
    /// `20yymmdd`
    pub date: String,
    /// `hhmmss`
    pub time: String,
    pub bin_count: usize,
    /// Position in device memory, counting down from the most recent spectrum
    pub spectrum_index: i32,
}

impl SpectrumHeader {
    /// Decode the header from the first 51 bytes of a spectrum reply.
    pub fn decode(reply: &[u8]) -> Result<Self, PdsError> {
        if reply.len() < SPECTRUM_HEADER_SIZE {
            return Err(PdsError::InsufficientData {
                expected: SPECTRUM_HEADER_SIZE,
                actual: reply.len(),
            });
        }

        let bin_count: usize = parse_field(reply, "bin_count", BIN_COUNT)?;
        if bin_count == 0 {
            return Err(PdsError::MalformedHeader {
                field: "bin_count",
                offset: BIN_COUNT.start,
            });
        }

        Ok(Self {
            serial: latin1(&reply[SERIAL]),
            gain: parse_field::<i32>(reply, "gain", GAIN)? as f32 / 100.0,
            offset_bins: parse_field(reply, "offset_bins", OFFSET)?,
            temperature_c: parse_field(reply, "temperature_c", TEMPERATURE)?,
            acq_time_seconds: parse_field(reply, "acq_time_seconds", ACQ_TIME)?,
            dose_rate_usv_h: parse_field::<i32>(reply, "dose_rate_usv_h", DOSE_RATE)? as f32 / 100.0,
            neutron_rate: parse_field::<i32>(reply, "neutron_rate", NEUTRON_RATE)? as f32 / 100.0,
            date: format!(
                "20{}{}{}",
                latin1(&reply[YEAR]),
                latin1(&reply[MONTH]),
                latin1(&reply[DAY])
            ),
            time: latin1(&reply[TIME]),
            bin_count,
            spectrum_index: parse_field(reply, "spectrum_index", SPECTRUM_INDEX)?,
        })
    }

    /// Bytes expected after the header: channel data plus trailer
    pub fn payload_len(&self) -> usize {
        self.bin_count * BIN_SIZE + SPECTRUM_TRAILER_SIZE
    }

    /// Total size of the complete reply this header announces
    pub fn reply_len(&self) -> usize {
        SPECTRUM_HEADER_SIZE + self.payload_len()
    }

    /// Acquisition timestamp, if the date and time digits form a valid one
    pub fn acquired_at(&self) -> Option<NaiveDateTime> {
        NaiveDateTime::parse_from_str(&format!("{}{}", self.date, self.time), "%Y%m%d%H%M%S").ok()
    }
}

impl fmt::Display for SpectrumHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Gain: {:.2} offset: {} Temp: {} Time: {} sec",
            self.gain, self.offset_bins, self.temperature_c, self.acq_time_seconds
        )
    }
}

impl TryFrom<&[u8]> for SpectrumHeader {
    type Error = PdsError;

    fn try_from(reply: &[u8]) -> Result<Self, Self::Error> {
        Self::decode(reply)
    }
}

/// Decode bytes one-to-one as ISO-8859-1 characters.
pub(crate) fn latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

fn parse_field<T: FromStr>(reply: &[u8], field: &'static str, range: Range<usize>) -> Result<T, PdsError> {
    let offset = range.start;
    latin1(&reply[range])
        .parse()
        .map_err(|_| PdsError::MalformedHeader { field, offset })
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &[u8; 51] = b"\x02R22AB123456150000030213000123000512301102240512007";

    #[test]
    fn test_decode_header() {
        let header = SpectrumHeader::decode(HEADER).unwrap();
        assert_eq!(header.serial, "AB123456");
        assert_eq!(header.gain, 1.5);
        assert_eq!(header.offset_bins, 0);
        assert_eq!(header.temperature_c, 30);
        assert_eq!(header.acq_time_seconds, 213);
        assert_eq!(header.dose_rate_usv_h, 0.12);
        assert_eq!(header.neutron_rate, 3.0);
        assert_eq!(header.time, "051230");
        assert_eq!(header.date, "20240211");
        assert_eq!(header.bin_count, 512);
        assert_eq!(header.spectrum_index, 7);
        assert_eq!(header.reply_len(), 51 + 1024 + 3);
    }

    #[test]
    fn test_acquired_at() {
        let header = SpectrumHeader::decode(HEADER).unwrap();
        let at = header.acquired_at().unwrap();
        assert_eq!(at.to_string(), "2024-02-11 05:12:30");
    }

    #[test]
    fn test_latin1_keeps_high_bytes() {
        assert_eq!(latin1(&[0x41, 0xE9, 0xFF]), "Aé\u{ff}");
    }
}
