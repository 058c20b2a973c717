use bytes::Bytes;
use pds_lib::{PdsError, Transport};
use serialport::SerialPort;
use std::io::{self, Read, Write};
use std::time::Duration;
use tracing::info;

// How long a blocking read waits before yielding back to the runtime
const POLL_INTERVAL: Duration = Duration::from_millis(50);

const READ_BUFFER_SIZE: usize = 1024;

/// [`Transport`] over a serial port, e.g. `/dev/rfcomm0` bound to the
/// PDS-100G Bluetooth SPP channel.
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
    buffer: Vec<u8>,
}

impl SerialTransport {
    pub fn open(path: &str, baud_rate: u32) -> Result<Self, serialport::Error> {
        let port = serialport::new(path, baud_rate).timeout(POLL_INTERVAL).open()?;
        info!(path, baud_rate, "Serial port opened");
        Ok(Self {
            port,
            buffer: vec![0; READ_BUFFER_SIZE],
        })
    }
}

impl Transport for SerialTransport {
    async fn send(&mut self, frame: &[u8]) -> Result<(), PdsError> {
        let port = &mut self.port;
        tokio::task::block_in_place(|| {
            port.write_all(frame)?;
            port.flush()
        })?;
        Ok(())
    }

    async fn receive(&mut self) -> Result<Bytes, PdsError> {
        loop {
            let port = &mut self.port;
            let buffer = &mut self.buffer;
            match tokio::task::block_in_place(|| port.read(buffer)) {
                Ok(0) => return Err(PdsError::Transport("serial port closed".to_string())),
                Ok(n) => return Ok(Bytes::copy_from_slice(&self.buffer[..n])),
                // Give the caller's timeout a chance to fire
                Err(e) if e.kind() == io::ErrorKind::TimedOut => tokio::task::yield_now().await,
                Err(e) => return Err(e.into()),
            }
        }
    }
}
