use crate::constants::MAX_REPLY_SIZE;
use crate::error::PdsError;
use bytes::BytesMut;

/// Accumulates the chunks of a single reply.
///
/// Growth is checked against a hard limit instead of pre-allocating the
/// largest possible reply.
#[derive(Debug)]
pub struct ReceiveBuffer {
    data: BytesMut,
    limit: usize,
}

impl ReceiveBuffer {
    pub fn new() -> Self {
        Self::with_limit(MAX_REPLY_SIZE)
    }

    pub fn with_limit(limit: usize) -> Self {
        Self {
            data: BytesMut::new(),
            limit,
        }
    }

    /// Append a chunk, refusing to grow past the limit.
    ///
    /// On error the buffer is left untouched.
    pub fn extend(&mut self, chunk: &[u8]) -> Result<(), PdsError> {
        let required = self.data.len() + chunk.len();
        self.ensure_fits(required)?;
        self.data.extend_from_slice(chunk);
        Ok(())
    }

    /// Check that a reply of `required` bytes can be buffered at all
    pub fn ensure_fits(&self, required: usize) -> Result<(), PdsError> {
        if required > self.limit {
            return Err(PdsError::BufferOverrun {
                required,
                limit: self.limit,
            });
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }
}

impl Default for ReceiveBuffer {
    fn default() -> Self {
        Self::new()
    }
}
