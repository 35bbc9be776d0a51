use bytes::{Buf, Bytes, BytesMut};

/// Response body bytes staged between the backend and the frontend.
#[derive(Debug, Default)]
pub struct BodyBuffer {
    buf: BytesMut,
}

/// Result of taking bytes out of a [`BodyBuffer`].
#[derive(Debug)]
pub(crate) struct Drained {
    pub(crate) data: Bytes,
    /// The buffer went from non-empty to empty: the low watermark was reached.
    pub(crate) low_watermark: bool,
}

impl BodyBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn chunk(&self) -> &[u8] {
        &self.buf
    }

    pub(crate) fn append(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    pub(crate) fn drain(&mut self, max: usize) -> Drained {
        let before = self.buf.len();
        let take = max.min(before);
        let data = self.buf.split_to(take).freeze();
        Drained {
            data,
            low_watermark: before > 0 && self.buf.is_empty(),
        }
    }

    pub(crate) fn discard(&mut self, n: usize) -> bool {
        let before = self.buf.len();
        self.buf.advance(n.min(before));
        before > 0 && self.buf.is_empty()
    }
}
