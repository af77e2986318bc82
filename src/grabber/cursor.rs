use std::io::{self, BufRead};

/// A one-byte-lookahead cursor over a buffered reader.
///
/// Grounded on the teacher's `Input` (`fast-export/src/parse/input.rs`),
/// which reads through a `BufRead` using `fill_buf`/`consume` rather than a
/// byte-at-a-time adapter, so a grabber can inspect the next byte before
/// deciding whether to consume it.
pub(super) struct ByteCursor<R> {
    r: R,
    eof: bool,
}

impl<R: BufRead> ByteCursor<R> {
    pub(super) fn new(r: R) -> Self {
        ByteCursor { r, eof: false }
    }

    /// Returns the next byte without consuming it, or `None` at EOF.
    pub(super) fn peek(&mut self) -> io::Result<Option<u8>> {
        if self.eof {
            return Ok(None);
        }
        let buf = self.r.fill_buf()?;
        if buf.is_empty() {
            self.eof = true;
            return Ok(None);
        }
        Ok(Some(buf[0]))
    }

    /// Consumes one byte. Panics if called without a preceding successful
    /// `peek` that returned `Some`.
    pub(super) fn bump(&mut self) {
        self.r.consume(1);
    }

    /// Returns the reader's current buffered chunk without consuming it, for
    /// callers that want to scan several bytes at once (e.g. with `memchr`)
    /// instead of peeking one byte at a time. Empty only at EOF.
    pub(super) fn fill_buf(&mut self) -> io::Result<&[u8]> {
        if self.eof {
            return Ok(&[]);
        }
        let buf = self.r.fill_buf()?;
        if buf.is_empty() {
            self.eof = true;
        }
        Ok(buf)
    }

    /// Consumes `n` bytes already returned by a prior `fill_buf`.
    pub(super) fn consume(&mut self, n: usize) {
        self.r.consume(n);
    }

    pub(super) fn eof(&self) -> bool {
        self.eof
    }
}
