//! The zero-copy cell carrier.
//!
//! Grounded on the teacher's `Span` (`fast-export/src/parse/span.rs`): a
//! range is kept separate from the buffer it slices so that the range can be
//! created and passed around before the buffer's final shape is known. The
//! difference from the teacher's `Span` is that cells here cross thread
//! boundaries (the writer and each column's typing-engine thread live on
//! different threads), so the buffer handle is an `Arc` rather than a
//! borrowed lifetime.

use std::{
    fmt::{self, Debug, Formatter},
    str::{self, Utf8Error},
    sync::Arc,
};

use bstr::ByteSlice as _;

/// A view of a contiguous, immutable byte range, backed by a shared buffer.
///
/// Never owns storage directly: the backing buffer is reference-counted so
/// that a cell slice stays valid for as long as any reader retains it, even
/// after the writer has moved on to a new block.
#[derive(Clone)]
pub struct ByteSlice {
    buf: Arc<Vec<u8>>,
    begin: usize,
    end: usize,
}

impl ByteSlice {
    #[inline]
    pub(crate) fn new(buf: Arc<Vec<u8>>, begin: usize, end: usize) -> Self {
        debug_assert!(begin <= end && end <= buf.len());
        ByteSlice { buf, begin, end }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.end - self.begin
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.begin == self.end
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[self.begin..self.end]
    }

    /// UTF-8-safe conversion to a borrowed string, failing if the bytes are
    /// not valid UTF-8.
    #[inline]
    pub fn to_str(&self) -> Result<&str, Utf8Error> {
        str::from_utf8(self.as_bytes())
    }

    /// UTF-8-safe conversion to an owned string.
    #[inline]
    pub fn to_owned_string(&self) -> Result<String, Utf8Error> {
        self.to_str().map(str::to_owned)
    }

}

impl PartialEq for ByteSlice {
    fn eq(&self, other: &Self) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl Eq for ByteSlice {}

impl Debug for ByteSlice {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.as_bytes().as_bstr())
    }
}
