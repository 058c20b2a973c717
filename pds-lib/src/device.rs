use crate::assembler::{AssemblerEvent, SpectrumAssembler};
use crate::command::Command;
use crate::error::PdsError;
use crate::spectrum::SpectrumRecord;
use bytes::{Bytes, BytesMut};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;
use tracing::debug;

// Default timeout for a single read from the transport
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

// Largest single read from a stream transport
const DEFAULT_CHUNK_SIZE: usize = 1024;

/// A byte-stream link to the device.
///
/// `receive` returns whatever arrived next, in arbitrary fragments; it never
/// returns an empty chunk.
#[allow(async_fn_in_trait)]
pub trait Transport {
    async fn send(&mut self, frame: &[u8]) -> Result<(), PdsError>;
    async fn receive(&mut self) -> Result<Bytes, PdsError>;
}

/// Session settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceConfig {
    pub read_timeout: Duration,
}

impl DeviceConfig {
    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            read_timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// [`Transport`] over any tokio byte stream (TCP bridge, pipe, `duplex`, ...)
pub struct StreamTransport<S> {
    stream: S,
    chunk_size: usize,
}

impl<S> StreamTransport<S> {
    pub fn new(stream: S) -> Self {
        Self::with_chunk_size(stream, DEFAULT_CHUNK_SIZE)
    }

    pub fn with_chunk_size(stream: S, chunk_size: usize) -> Self {
        Self {
            stream,
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn into_inner(self) -> S {
        self.stream
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> Transport for StreamTransport<S> {
    async fn send(&mut self, frame: &[u8]) -> Result<(), PdsError> {
        self.stream.write_all(frame).await?;
        self.stream.flush().await?;
        Ok(())
    }

    async fn receive(&mut self) -> Result<Bytes, PdsError> {
        let mut buffer = BytesMut::with_capacity(self.chunk_size);
        let n = self.stream.read_buf(&mut buffer).await?;
        if n == 0 {
            return Err(PdsError::Transport("stream closed by device".to_string()));
        }
        Ok(buffer.freeze())
    }
}

/// A PDS-100G session: one transport, one reply in flight at a time.
pub struct Pds100g<T> {
    transport: T,
    assembler: SpectrumAssembler,
    config: DeviceConfig,
}

impl<T: Transport> Pds100g<T> {
    pub fn new(transport: T) -> Self {
        Self::with_config(transport, DeviceConfig::default())
    }

    pub fn with_config(transport: T, config: DeviceConfig) -> Self {
        Self {
            transport,
            assembler: SpectrumAssembler::new(),
            config,
        }
    }

    pub fn assembler(&self) -> &SpectrumAssembler {
        &self.assembler
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    /// Drop any partial reply, e.g. before closing the link
    pub fn disconnect(&mut self) {
        self.assembler.abort("disconnected");
    }

    pub fn into_inner(self) -> T {
        self.transport
    }

    /// Send a command, discarding whatever reply was still in flight
    pub async fn send(&mut self, command: Command) -> Result<(), PdsError> {
        let frame = self.assembler.begin(command);
        if let Err(err) = self.transport.send(&frame).await {
            self.assembler.abort(&err.to_string());
            return Err(err);
        }
        debug!(frame = %hex::encode(&frame), "Sent {} bytes", frame.len());
        Ok(())
    }

    /// Ask the device for its serial number
    pub async fn request_serial_number(&mut self) -> Result<String, PdsError> {
        match self.exchange(Command::GetSerialNumber, |_| {}).await? {
            AssemblerEvent::SerialNumber(serial) => Ok(serial),
            other => Err(PdsError::UnexpectedReply(other.to_string())),
        }
    }

    /// Fetch the next spectrum: the latest one first, then older ones
    pub async fn fetch_spectrum(&mut self) -> Result<SpectrumRecord, PdsError> {
        self.fetch_spectrum_with(|_| {}).await
    }

    /// Like [`fetch_spectrum`](Self::fetch_spectrum), reporting every event to `on_event`
    pub async fn fetch_spectrum_with<F>(&mut self, on_event: F) -> Result<SpectrumRecord, PdsError>
    where
        F: FnMut(&AssemblerEvent),
    {
        let command = self.assembler.next_spectrum_command();
        match self.exchange(command, on_event).await? {
            AssemblerEvent::Completed(record) => Ok(record),
            other => Err(PdsError::UnexpectedReply(other.to_string())),
        }
    }

    /// Send `command` and read until its reply completes or fails
    async fn exchange<F>(&mut self, command: Command, mut on_event: F) -> Result<AssemblerEvent, PdsError>
    where
        F: FnMut(&AssemblerEvent),
    {
        self.send(command).await?;

        loop {
            let chunk = match timeout(self.config.read_timeout, self.transport.receive()).await {
                Ok(Ok(chunk)) => chunk,
                Ok(Err(err)) => {
                    self.assembler.abort(&err.to_string());
                    return Err(err);
                }
                Err(elapsed) => {
                    self.assembler.abort("no data from device");
                    return Err(elapsed.into());
                }
            };
            debug!(
                len = chunk.len(),
                buffered = self.assembler.buffered(),
                "Received chunk"
            );

            for event in self.assembler.receive(&chunk) {
                on_event(&event);
                match event {
                    AssemblerEvent::SerialNumber(_) | AssemblerEvent::Completed(_) => return Ok(event),
                    AssemblerEvent::Failed(err) => return Err(err),
                    AssemblerEvent::SpectrumStarted(_) | AssemblerEvent::Progress { .. } => {}
                }
            }
        }
    }
}
