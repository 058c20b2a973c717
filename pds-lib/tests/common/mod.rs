//! Common test utilities and shared imports

// Allow unused imports and dead code since this is a shared module
// used across multiple test files - not all items are used in every test file
#[allow(unused_imports)]
pub use bytes::Bytes;
#[allow(unused_imports)]
pub use pds_lib::assembler::{AssemblerEvent, ProtocolState, SpectrumAssembler};
#[allow(unused_imports)]
pub use pds_lib::command::Command;
#[allow(unused_imports)]
pub use pds_lib::error::PdsError;
#[allow(unused_imports)]
pub use pds_lib::header::SpectrumHeader;
#[allow(unused_imports)]
pub use pds_lib::spectrum::SpectrumRecord;

/// Header fields as the device prints them, before decoding
#[allow(dead_code)]
#[derive(Debug, Clone)]
pub struct HeaderFields {
    pub serial: &'static str,
    pub gain: &'static str,
    pub offset: &'static str,
    pub temperature: &'static str,
    pub acq_time: &'static str,
    pub dose_rate: &'static str,
    pub neutron_rate: &'static str,
    pub time: &'static str,
    pub day: &'static str,
    pub month: &'static str,
    pub year: &'static str,
    pub bins: &'static str,
    pub index: &'static str,
}

impl Default for HeaderFields {
    fn default() -> Self {
        Self {
            serial: "PD100123",
            gain: "298",
            offset: "005",
            temperature: "024",
            acq_time: "300",
            dose_rate: "00017",
            neutron_rate: "002",
            time: "142748",
            day: "22",
            month: "03",
            year: "21",
            bins: "0512",
            index: "007",
        }
    }
}

impl HeaderFields {
    /// Render the 51-byte `R22` header
    #[allow(dead_code)]
    pub fn encode(&self) -> Vec<u8> {
        let mut header = b"\x02R22".to_vec();
        for field in [
            self.serial,
            self.gain,
            self.offset,
            self.temperature,
            self.acq_time,
            self.dose_rate,
            self.neutron_rate,
            self.time,
            self.day,
            self.month,
            self.year,
            self.bins,
            self.index,
        ] {
            header.extend_from_slice(field.as_bytes());
        }
        assert_eq!(header.len(), 51, "header fields have the wrong widths");
        header
    }
}

/// Build a complete spectrum reply: header, big-endian counts, 3-byte trailer
#[allow(dead_code)]
pub fn spectrum_reply(fields: &HeaderFields, counts: &[u16]) -> Vec<u8> {
    let mut reply = fields.encode();
    for count in counts {
        reply.extend_from_slice(&count.to_be_bytes());
    }
    reply.extend_from_slice(&[0x0D, 0x0A, 0x03]);
    reply
}

/// Deterministic channel counts, including bytes above 0x7F
#[allow(dead_code)]
pub fn sample_counts(bins: usize) -> Vec<u16> {
    (0..bins).map(|i| ((i * 131 + 17) % 4095) as u16 * 16).collect()
}

/// Build a serial number reply carrying `serial` at bytes 22..30
#[allow(dead_code)]
pub fn serial_reply(serial: &str) -> Vec<u8> {
    let mut reply = b"\x02R18".to_vec();
    reply.extend_from_slice(b"000000000000000000");
    reply.extend_from_slice(serial.as_bytes());
    reply.push(0x03);
    reply
}

/// Feed `reply` split at `boundaries` and collect every event
#[allow(dead_code)]
pub fn feed_split(assembler: &mut SpectrumAssembler, reply: &[u8], boundaries: &[usize]) -> Vec<AssemblerEvent> {
    let mut events = Vec::new();
    let mut start = 0;
    for &end in boundaries.iter().chain(std::iter::once(&reply.len())) {
        let end = end.min(reply.len());
        if end > start {
            events.extend(assembler.receive(&reply[start..end]));
            start = end;
        }
    }
    events
}

/// Pull the completed record out of an event list
#[allow(dead_code)]
pub fn completed(events: Vec<AssemblerEvent>) -> SpectrumRecord {
    let mut records: Vec<SpectrumRecord> = events
        .into_iter()
        .filter_map(|event| match event {
            AssemblerEvent::Completed(record) => Some(record),
            _ => None,
        })
        .collect();
    assert_eq!(records.len(), 1, "expected exactly one completed spectrum");
    records.remove(0)
}
