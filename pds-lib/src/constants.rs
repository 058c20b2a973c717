// Protocol constants for the PDS-100G

/// Start of text, first byte of every command and reply
pub const STX: u8 = 0x02;

/// End of text, last byte of every command
pub const ETX: u8 = 0x03;

/// Size of the reply prefix (`STX 'R' d d`)
pub const REPLY_PREFIX_SIZE: usize = 4;

/// Size of the ASCII spectrum header, prefix included (51 bytes)
pub const SPECTRUM_HEADER_SIZE: usize = 51;

/// Trailer appended by the device after the channel data (3 bytes)
pub const SPECTRUM_TRAILER_SIZE: usize = 3;

/// Each channel count is a big-endian u16
pub const BIN_SIZE: usize = 2;

/// Largest channel count the device can report in a four-digit field
pub const MAX_BINS: usize = 9999;

/// Upper bound for one buffered reply (9999 channels plus headers)
pub const MAX_REPLY_SIZE: usize = MAX_BINS * BIN_SIZE + 200;

/// Serial number location inside an `R18` reply
pub const SERIAL_REPLY_RANGE: std::ops::Range<usize> = 22..30;

/// Calibration channels written to the spectrum file
pub const CALIBRATION_CHANNELS: [f32; 3] = [100.0, 500.0, 1000.0];

/// Channels at each end of a spectrum dumped at trace level
pub const DUMP_EDGE_CHANNELS: usize = 50;
