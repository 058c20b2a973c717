use crate::constants::{ETX, STX};
use crate::reply::ReplyKind;
use bytes::{BufMut, Bytes, BytesMut};
use strum_macros::Display;

/// Commands understood by the PDS-100G.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Command {
    #[strum(to_string = "get S/N")]
    GetSerialNumber,
    /// Most recent spectrum in device memory
    #[strum(to_string = "get last spectrum")]
    GetLastSpectrum,
    /// The spectrum stored before the one fetched last
    #[strum(to_string = "get prev spectrum")]
    GetPreviousSpectrum,
}

impl Command {
    /// Pick the spectrum command that follows a previously seen spectrum index.
    ///
    /// A negative index means nothing has been fetched yet, so the device is
    /// asked for its most recent spectrum.
    pub fn spectrum_after(spectrum_index: i32) -> Self {
        if spectrum_index < 0 {
            Command::GetLastSpectrum
        } else {
            Command::GetPreviousSpectrum
        }
    }

    /// ASCII command body without framing
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::GetSerialNumber => "G18",
            Command::GetLastSpectrum => "G22000",
            Command::GetPreviousSpectrum => "G22002",
        }
    }

    /// The reply family the device answers this command with
    pub fn expected_reply(&self) -> ReplyKind {
        match self {
            Command::GetSerialNumber => ReplyKind::SerialNumber,
            Command::GetLastSpectrum | Command::GetPreviousSpectrum => ReplyKind::Spectrum,
        }
    }

    /// Encode as `STX <command> ETX`
    pub fn frame(&self) -> Bytes {
        let body = self.as_str().as_bytes();
        let mut frame = BytesMut::with_capacity(body.len() + 2);
        frame.put_u8(STX);
        frame.put_slice(body);
        frame.put_u8(ETX);
        frame.freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frames() {
        assert_eq!(Command::GetSerialNumber.frame().as_ref(), b"\x02G18\x03");
        assert_eq!(Command::GetLastSpectrum.frame().as_ref(), b"\x02G22000\x03");
        assert_eq!(Command::GetPreviousSpectrum.frame().as_ref(), b"\x02G22002\x03");
    }

    #[test]
    fn test_spectrum_after() {
        assert_eq!(Command::spectrum_after(-1), Command::GetLastSpectrum);
        assert_eq!(Command::spectrum_after(0), Command::GetPreviousSpectrum);
        assert_eq!(Command::spectrum_after(7), Command::GetPreviousSpectrum);
    }

    #[test]
    fn test_labels() {
        assert_eq!(Command::GetSerialNumber.to_string(), "get S/N");
        assert_eq!(Command::GetPreviousSpectrum.to_string(), "get prev spectrum");
    }
}
