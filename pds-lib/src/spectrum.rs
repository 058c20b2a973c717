use crate::constants::{BIN_SIZE, CALIBRATION_CHANNELS, DUMP_EDGE_CHANNELS, SPECTRUM_HEADER_SIZE};
use crate::error::PdsError;
use crate::header::SpectrumHeader;
use serde::Serialize;
use std::fmt;
use tracing::trace;
use zerocopy::FromBytes;
use zerocopy::byteorder::big_endian::U16;

/// A fully received spectrum.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpectrumRecord {
    pub header: SpectrumHeader,
    /// One count per channel. The last channel is always reported as 0.
    pub counts: Vec<u32>,
    /// Sum of all channels as sent by the device, last channel included
    pub total_counts: u64,
}

impl SpectrumRecord {
    /// Average count rate over the acquisition time
    pub fn counts_per_second(&self) -> Option<f64> {
        match self.header.acq_time_seconds {
            secs if secs <= 0 => None,
            secs => Some(self.total_counts as f64 / secs as f64),
        }
    }

    /// `(channel, energy)` pairs of the linear calibration
    pub fn calibration_points(&self) -> [(f32, f32); 3] {
        CALIBRATION_CHANNELS.map(|channel| {
            (
                channel,
                channel * self.header.gain + self.header.offset_bins as f32,
            )
        })
    }
}

impl fmt::Display for SpectrumRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Spectrum#{} Total counts: {}",
            self.header.spectrum_index, self.total_counts
        )
    }
}

/// Channels fully received so far, given the number of buffered reply bytes
pub fn channels_received(buffered: usize) -> usize {
    buffered.saturating_sub(SPECTRUM_HEADER_SIZE) / BIN_SIZE
}

/// Whether the buffered reply holds all channels plus the trailer
pub fn is_complete(header: &SpectrumHeader, buffered: usize) -> bool {
    buffered.saturating_sub(SPECTRUM_HEADER_SIZE) >= header.payload_len()
}

/// Channels logged at trace level: the first and last [`DUMP_EDGE_CHANNELS`]
pub fn dumped_channels(bin_count: usize) -> impl Iterator<Item = usize> {
    let head = bin_count.min(DUMP_EDGE_CHANNELS);
    let tail = bin_count.saturating_sub(DUMP_EDGE_CHANNELS).max(head);
    (0..head).chain(tail..bin_count)
}

/// Decode the big-endian channel counts that follow the header.
///
/// The device fills its final channel with a meaningless value. It still goes
/// into `total_counts`, but the emitted channel is forced to 0.
pub fn decode_bins(header: SpectrumHeader, reply: &[u8]) -> Result<SpectrumRecord, PdsError> {
    let payload = reply.get(SPECTRUM_HEADER_SIZE..).unwrap_or_default();
    let (raw, _trailer) = <[U16]>::ref_from_prefix_with_elems(payload, header.bin_count).map_err(|_| {
        PdsError::InsufficientData {
            expected: SPECTRUM_HEADER_SIZE + header.bin_count * BIN_SIZE,
            actual: reply.len(),
        }
    })?;
    for channel in dumped_channels(raw.len()) {
        let value = raw[channel].get();
        trace!(channel, "{} 0x{:04x}", value, value);
    }

    let mut counts: Vec<u32> = raw.iter().map(|value| u32::from(value.get())).collect();
    let total_counts = counts.iter().map(|&count| u64::from(count)).sum();
    if let Some(last) = counts.last_mut() {
        *last = 0;
    }

    Ok(SpectrumRecord {
        header,
        counts,
        total_counts,
    })
}
