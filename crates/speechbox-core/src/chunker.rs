//! Fixed-size packet slicing over a synthesized audio buffer.
//!
//! A [`PacketChunker`] owns the raw byte buffer delivered by the speech
//! provider and hands it out in successive payloads of at most
//! `packet_size` bytes. The final payload is truncated to whatever
//! remains, never padded. Exhaustion is signalled by `None`, at which
//! point the device releases its codec session and returns to idle.

/// Iterator-style reader that slices a byte buffer into packet payloads.
#[derive(Debug, Clone)]
pub struct PacketChunker {
    buffer: Vec<u8>,
    offset: usize,
    packet_size: usize,
}

impl PacketChunker {
    /// Create a chunker over `buffer` producing payloads of at most
    /// `packet_size` bytes.
    ///
    /// `packet_size` must be non-zero; device configuration validates
    /// this before a chunker is ever constructed.
    #[must_use]
    pub fn new(buffer: Vec<u8>, packet_size: usize) -> Self {
        debug_assert!(packet_size > 0, "packet size must be non-zero");
        Self {
            buffer,
            offset: 0,
            packet_size,
        }
    }

    /// Take the next payload, advancing the read offset.
    ///
    /// Returns `None` once every byte has been handed out. An empty
    /// buffer is exhausted from the start.
    pub fn next_payload(&mut self) -> Option<Vec<u8>> {
        if self.offset >= self.buffer.len() {
            return None;
        }
        let end = usize::min(self.offset + self.packet_size, self.buffer.len());
        let payload = self.buffer[self.offset..end].to_vec();
        self.offset = end;
        Some(payload)
    }

    /// Number of bytes not yet handed out.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.buffer.len() - self.offset
    }

    /// Whether every byte has been handed out.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.offset >= self.buffer.len()
    }

    /// Total length of the underlying buffer.
    #[must_use]
    pub fn total_len(&self) -> usize {
        self.buffer.len()
    }

    /// Configured maximum payload size in bytes.
    #[must_use]
    pub const fn packet_size(&self) -> usize {
        self.packet_size
    }
}
