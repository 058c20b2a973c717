//! Reassembles device replies from arbitrarily fragmented chunks.
//!
//! The transport hands over whatever it read, which may split a reply
//! anywhere, including inside the prefix or a header field. The assembler
//! buffers one reply at a time and reports what happened through
//! [`AssemblerEvent`]s:
//!
//! ```text
//! Idle --begin(G18)--------> AwaitingSerialNumber ---30 bytes--------> Idle
//! Idle --begin(G22xxx)-----> AwaitingSpectrumHeader --51 bytes-------> AwaitingSpectrumBins
//! AwaitingSpectrumBins ----> (payload incomplete) AwaitingSpectrumBins
//! AwaitingSpectrumBins ----> (payload + trailer)  Idle
//! any ---------------------> (error / abort)      Idle
//! ```

use crate::buffer::ReceiveBuffer;
use crate::command::Command;
use crate::constants::{MAX_REPLY_SIZE, REPLY_PREFIX_SIZE, SERIAL_REPLY_RANGE, SPECTRUM_HEADER_SIZE};
use crate::error::PdsError;
use crate::header::SpectrumHeader;
use crate::reply::{self, ReplyKind};
use crate::spectrum::{self, SpectrumRecord};
use bytes::Bytes;
use std::fmt;
use tracing::{debug, info, warn};

/// Where the assembler is within the current reply.
#[derive(Debug, Clone, PartialEq)]
pub enum ProtocolState {
    Idle,
    AwaitingSerialNumber,
    AwaitingSpectrumHeader,
    AwaitingSpectrumBins(SpectrumHeader),
}

/// Outcome of feeding a chunk to the assembler.
#[derive(Debug)]
pub enum AssemblerEvent {
    SerialNumber(String),
    /// Header decoded, channel data still to come
    SpectrumStarted(SpectrumHeader),
    Progress { received: usize, expected: usize },
    Completed(SpectrumRecord),
    /// The reply was dropped; the assembler is idle again
    Failed(PdsError),
}

impl fmt::Display for AssemblerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssemblerEvent::SerialNumber(serial) => write!(f, "got pds S/N: {}", serial),
            AssemblerEvent::SpectrumStarted(header) => write!(
                f,
                "Spectrum {} {}-{} started with {} bins ({})",
                header.spectrum_index, header.date, header.time, header.bin_count, header
            ),
            AssemblerEvent::Progress { received, expected } => write!(f, "{} of {} fetched", received, expected),
            AssemblerEvent::Completed(record) => write!(
                f,
                "all {} bins fetched, done for spectrum#{} Total counts: {}",
                record.header.bin_count, record.header.spectrum_index, record.total_counts
            ),
            AssemblerEvent::Failed(err) => write!(f, "reply aborted: {}", err),
        }
    }
}

/// State machine for the single reply in flight.
#[derive(Debug)]
pub struct SpectrumAssembler {
    state: ProtocolState,
    buffer: ReceiveBuffer,
    last_spectrum_index: i32,
}

impl SpectrumAssembler {
    pub fn new() -> Self {
        Self::with_limit(MAX_REPLY_SIZE)
    }

    /// Create an assembler that refuses replies larger than `limit` bytes
    pub fn with_limit(limit: usize) -> Self {
        Self {
            state: ProtocolState::Idle,
            buffer: ReceiveBuffer::with_limit(limit),
            last_spectrum_index: -1,
        }
    }

    pub fn state(&self) -> &ProtocolState {
        &self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state == ProtocolState::Idle
    }

    /// Index of the most recent spectrum header seen, `-1` before the first
    pub fn last_spectrum_index(&self) -> i32 {
        self.last_spectrum_index
    }

    /// Bytes buffered for the reply in flight
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// The spectrum command to send next: latest first, then walk backwards
    pub fn next_spectrum_command(&self) -> Command {
        Command::spectrum_after(self.last_spectrum_index)
    }

    /// Prepare for the reply to `command` and return the frame to send.
    ///
    /// Any unfinished reply is dropped: once a new command is on the wire a
    /// stale fragment cannot be told apart from a fresh one.
    pub fn begin(&mut self, command: Command) -> Bytes {
        if !self.is_idle() {
            debug!(
                state = ?self.state,
                buffered = self.buffer.len(),
                "Discarding unfinished reply"
            );
        }
        self.reset();
        self.state = match command.expected_reply() {
            ReplyKind::SerialNumber => ProtocolState::AwaitingSerialNumber,
            ReplyKind::Spectrum => ProtocolState::AwaitingSpectrumHeader,
        };
        info!(command = command.as_str(), "CMD: {}", command);
        command.frame()
    }

    /// Drop the reply in flight, e.g. on disconnect.
    pub fn abort(&mut self, reason: &str) {
        if !self.is_idle() {
            warn!(state = ?self.state, buffered = self.buffer.len(), "Reply aborted: {}", reason);
        }
        self.reset();
    }

    /// Drop the reply in flight because of `error` and report it.
    pub fn fail(&mut self, error: PdsError) -> AssemblerEvent {
        self.abort(&error.to_string());
        AssemblerEvent::Failed(error)
    }

    /// Feed one chunk from the transport.
    ///
    /// A single chunk may produce several events, e.g. the header and the
    /// completed spectrum when the whole reply arrives at once.
    pub fn receive(&mut self, chunk: &[u8]) -> Vec<AssemblerEvent> {
        let mut events = Vec::new();
        if let Err(err) = self.step(chunk, &mut events) {
            events.push(self.fail(err));
        }
        events
    }

    fn step(&mut self, chunk: &[u8], events: &mut Vec<AssemblerEvent>) -> Result<(), PdsError> {
        match std::mem::replace(&mut self.state, ProtocolState::Idle) {
            ProtocolState::Idle => {
                debug!(len = chunk.len(), "Ignoring bytes, no reply expected");
                Ok(())
            }
            ProtocolState::AwaitingSerialNumber => {
                self.state = ProtocolState::AwaitingSerialNumber;
                let wanted = SERIAL_REPLY_RANGE.end.saturating_sub(self.buffer.len());
                if !self.buffer_prefixed(&chunk[..chunk.len().min(wanted)], ReplyKind::SerialNumber)?
                    || self.buffer.len() < SERIAL_REPLY_RANGE.end
                {
                    return Ok(());
                }
                let serial = reply::decode_serial_number(self.buffer.as_slice())?;
                self.reset();
                info!(%serial, "Got serial number");
                events.push(AssemblerEvent::SerialNumber(serial));
                Ok(())
            }
            ProtocolState::AwaitingSpectrumHeader => {
                self.state = ProtocolState::AwaitingSpectrumHeader;
                // Only the header is buffered until it announces the reply length
                let split = SPECTRUM_HEADER_SIZE.saturating_sub(self.buffer.len()).min(chunk.len());
                let (head, rest) = chunk.split_at(split);
                if !self.buffer_prefixed(head, ReplyKind::Spectrum)? || self.buffer.len() < SPECTRUM_HEADER_SIZE {
                    return Ok(());
                }
                let header = SpectrumHeader::decode(self.buffer.as_slice())?;
                self.buffer.ensure_fits(header.reply_len())?;
                self.last_spectrum_index = header.spectrum_index;
                info!(
                    index = header.spectrum_index,
                    bins = header.bin_count,
                    date = %header.date,
                    time = %header.time,
                    "Spectrum started"
                );
                events.push(AssemblerEvent::SpectrumStarted(header.clone()));
                self.extend_payload(&header, rest)?;
                self.advance_bins(header, events)
            }
            ProtocolState::AwaitingSpectrumBins(header) => {
                self.extend_payload(&header, chunk)?;
                self.advance_bins(header, events)
            }
        }
    }

    /// Append a chunk to an unfinished prefix and classify it once complete.
    ///
    /// Returns `false` while fewer than four bytes are buffered.
    fn buffer_prefixed(&mut self, chunk: &[u8], expected: ReplyKind) -> Result<bool, PdsError> {
        let before = self.buffer.len();
        self.buffer.extend(chunk)?;
        let buffered = self.buffer.as_slice();

        if buffered.len() < REPLY_PREFIX_SIZE {
            reply::check_partial_prefix(buffered)?;
            return Ok(false);
        }
        if before < REPLY_PREFIX_SIZE {
            let kind = reply::classify(buffered)?;
            if kind != expected {
                return Err(PdsError::UnexpectedReplyPrefix(Bytes::copy_from_slice(
                    &buffered[..REPLY_PREFIX_SIZE],
                )));
            }
            debug!(?kind, "Reply classified");
        }
        Ok(true)
    }

    fn extend_payload(&mut self, header: &SpectrumHeader, chunk: &[u8]) -> Result<(), PdsError> {
        // Anything past the trailer is not part of this reply
        let wanted = header.reply_len().saturating_sub(self.buffer.len());
        self.buffer.extend(&chunk[..chunk.len().min(wanted)])
    }

    fn advance_bins(&mut self, header: SpectrumHeader, events: &mut Vec<AssemblerEvent>) -> Result<(), PdsError> {
        if !spectrum::is_complete(&header, self.buffer.len()) {
            let received = spectrum::channels_received(self.buffer.len());
            debug!(received, expected = header.bin_count, "Channels fetched");
            events.push(AssemblerEvent::Progress {
                received,
                expected: header.bin_count,
            });
            self.state = ProtocolState::AwaitingSpectrumBins(header);
            return Ok(());
        }

        let record = spectrum::decode_bins(header, self.buffer.as_slice())?;
        self.reset();
        info!(
            index = record.header.spectrum_index,
            total_counts = record.total_counts,
            "Spectrum complete"
        );
        events.push(AssemblerEvent::Completed(record));
        Ok(())
    }

    fn reset(&mut self) {
        self.state = ProtocolState::Idle;
        self.buffer = ReceiveBuffer::with_limit(self.buffer.limit());
    }
}

impl Default for SpectrumAssembler {
    fn default() -> Self {
        Self::new()
    }
}
