use crate::constants::{REPLY_PREFIX_SIZE, SERIAL_REPLY_RANGE, STX};
use crate::error::PdsError;
use crate::header::latin1;
use bytes::Bytes;
use num_enum::TryFromPrimitive;

const KNOWN_PREFIXES: [&[u8]; 2] = [b"\x02R18", b"\x02R22"];

/// Two-digit code echoed after `STX 'R'` in every reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
pub enum ReplyCode {
    SerialNumber = 18,
    Spectrum = 22,
}

/// Reply families the assembler knows how to decode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyKind {
    SerialNumber,
    Spectrum,
}

impl From<ReplyCode> for ReplyKind {
    fn from(code: ReplyCode) -> Self {
        match code {
            ReplyCode::SerialNumber => ReplyKind::SerialNumber,
            ReplyCode::Spectrum => ReplyKind::Spectrum,
        }
    }
}

/// Classify the first chunk of a reply by its `STX 'R' d d` prefix.
pub fn classify(chunk: &[u8]) -> Result<ReplyKind, PdsError> {
    let prefix = chunk.get(..REPLY_PREFIX_SIZE).ok_or_else(|| unexpected_prefix(chunk))?;
    if prefix[0] != STX || prefix[1] != b'R' {
        return Err(unexpected_prefix(prefix));
    }

    let code = match (prefix[2], prefix[3]) {
        (tens @ b'0'..=b'9', ones @ b'0'..=b'9') => (tens - b'0') * 10 + (ones - b'0'),
        _ => return Err(unexpected_prefix(prefix)),
    };

    ReplyCode::try_from(code)
        .map(ReplyKind::from)
        .map_err(|_| unexpected_prefix(prefix))
}

/// Reject a reply whose first few bytes already rule out every known prefix.
///
/// Used while fewer than four bytes have arrived.
pub fn check_partial_prefix(partial: &[u8]) -> Result<(), PdsError> {
    if KNOWN_PREFIXES.iter().any(|prefix| prefix.starts_with(partial)) {
        Ok(())
    } else {
        Err(unexpected_prefix(partial))
    }
}

/// Extract the device serial number from a complete `R18` reply.
pub fn decode_serial_number(reply: &[u8]) -> Result<String, PdsError> {
    let serial = reply
        .get(SERIAL_REPLY_RANGE)
        .ok_or(PdsError::InsufficientData {
            expected: SERIAL_REPLY_RANGE.end,
            actual: reply.len(),
        })?;
    Ok(latin1(serial))
}

fn unexpected_prefix(bytes: &[u8]) -> PdsError {
    let shown = &bytes[..bytes.len().min(REPLY_PREFIX_SIZE)];
    PdsError::UnexpectedReplyPrefix(Bytes::copy_from_slice(shown))
}
