//! Text spectrum files (`FORMAT: 2`).
//!
//! Layout, one value per line:
//!
//! ```text
//! FORMAT: 2
//! <date time zone> Counts: <total>, ~cps: <rate>, Time: <seconds> s
//! <acquisition time, unix milliseconds, 13 digits>
//! 0
//! 0
//! 0
//! <acquisition time, seconds>
//! <channel count>
//! 2                        polynomial degree
//! <channel> <energy>       x3, one value per line
//! <count>                  one line per channel
//! ```

use crate::error::PdsError;
use crate::spectrum::SpectrumRecord;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

const POLYNOMIAL_DEGREE: u32 = 2;

/// Writes finished spectra into a directory, one file per spectrum.
#[derive(Debug, Clone)]
pub struct SpectrumFileWriter {
    dir: PathBuf,
}

impl SpectrumFileWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `pds_<date>_<time>.txt`
    pub fn file_name(record: &SpectrumRecord) -> String {
        format!("pds_{}_{}.txt", record.header.date, record.header.time)
    }

    pub fn path_for(&self, record: &SpectrumRecord) -> PathBuf {
        self.dir.join(Self::file_name(record))
    }

    /// Write `record` and return the path of the new file.
    pub fn write(&self, record: &SpectrumRecord) -> Result<PathBuf, PdsError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(record);
        let mut out = BufWriter::new(File::create(&path)?);
        write_spectrum(record, &mut out)?;
        out.flush()?;
        info!(path = %path.display(), "Spectrum {} saved", record.header.spectrum_index);
        Ok(path)
    }
}

/// Serialize `record` in the `FORMAT: 2` layout.
pub fn write_spectrum<W: Write>(record: &SpectrumRecord, out: &mut W) -> io::Result<()> {
    writeln!(out, "FORMAT: 2")?;
    writeln!(out, "{}", metadata_line(record))?;
    writeln!(out, "{}", timestamp_millis(record))?;
    for _ in 0..3 {
        writeln!(out, "0")?;
    }
    writeln!(out, "{}", record.header.acq_time_seconds)?;
    writeln!(out, "{}", record.header.bin_count)?;
    writeln!(out, "{}", POLYNOMIAL_DEGREE)?;
    for (channel, energy) in record.calibration_points() {
        writeln!(out, "{:.6}", channel)?;
        writeln!(out, "{:.6}", energy)?;
    }
    for count in &record.counts {
        writeln!(out, "{}", count)?;
    }
    Ok(())
}

/// Free-text summary line: acquisition time, total counts, rate and duration
pub fn metadata_line(record: &SpectrumRecord) -> String {
    let header = &record.header;
    let when = match header.acquired_at() {
        Some(at) => at.format("%Y.%m.%d %H:%M:%S").to_string(),
        None => format!("{} {}", header.date, header.time),
    };
    format!(
        "{} +0000 Counts: {}, ~cps: {:.3}, Time: {:.2} s",
        when,
        record.total_counts,
        record.counts_per_second().unwrap_or(0.0),
        header.acq_time_seconds as f64
    )
}

/// Acquisition time as 13-digit Unix milliseconds, zeros if unknown
pub fn timestamp_millis(record: &SpectrumRecord) -> String {
    let millis = record
        .header
        .acquired_at()
        .map(|at| at.and_utc().timestamp_millis())
        .unwrap_or(0);
    format!("{:013}", millis)
}
