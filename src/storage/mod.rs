//! Dense storage: a bounded, single-writer/multi-reader FIFO of tokenized
//! cells, used to decouple the tokenizer thread from each column's typing
//! thread and to let a column be re-read from the start for two-pass
//! inference.
//!
//! The design follows `spec.md` §9 directly: a sentinel head node, a mutex
//! guarding the one-shot `next` link plus an `observed` flag, and
//! condition-variable notification on publish. The teacher's crates are all
//! single-threaded, so this subsystem has no direct teacher analog; its
//! byte-buffer bookkeeping (a growable packed buffer sliced by ranges rather
//! than copied) is the same idea as the teacher's `Span`-over-`command_buf`
//! pattern in `fast-export/src/parse/{span,pool}.rs`, generalized to be safe
//! to share across threads via `Arc`.

mod node;
mod reader;
mod writer;

use std::sync::Arc;

use node::QueueNode;

pub use node::BlockSemaphore;
pub use reader::{DenseStorageReader, IteratorHolder};
pub use writer::DenseStorageWriter;

/// Creates a writer/reader pair for one column's dense storage, sharing the
/// sentinel head node and the back-pressure semaphore between them.
pub(crate) fn dense_storage(column: usize) -> (DenseStorageWriter, DenseStorageReader) {
    dense_storage_with_capacity(column, MAX_UNOBSERVED_BLOCKS)
}

/// As [`dense_storage`], but with an explicit back-pressure bound. The
/// coordinator uses this directly: `concurrent = false` runs the whole
/// producer-then-consumers pipeline on one thread, so no reader is ever
/// active to release a permit while the writer is still running, and the
/// bound must be effectively unbounded to avoid a self-deadlock.
pub(crate) fn dense_storage_with_capacity(
    column: usize,
    max_unobserved_blocks: usize,
) -> (DenseStorageWriter, DenseStorageReader) {
    let head = QueueNode::sentinel();
    let sem = Arc::new(BlockSemaphore::new(max_unobserved_blocks));
    let writer = DenseStorageWriter::new(column, head.clone(), sem.clone());
    let reader = DenseStorageReader::new(head, sem);
    (writer, reader)
}

/// Cells at or above this many bytes are stored as their own owned buffer in
/// the large-array, rather than being packed inline.
pub const LARGE_THRESHOLD: u32 = 4096;

/// Capacity, in bytes, of each packed buffer before it is flushed.
pub const PACKED_CAP: usize = 64 * 1024;

/// Capacity, in entries, of each large-array buffer before it is flushed.
pub const LARGE_CAP: usize = 256;

/// How many published-but-unobserved blocks the writer may run ahead of the
/// first reader to reach them.
pub const MAX_UNOBSERVED_BLOCKS: usize = 4;

/// Sentinel control word meaning "the next large-array handle is this cell".
const CTRL_LARGE: u32 = u32::MAX - 1;
/// Sentinel control word meaning "no more cells in this column".
const CTRL_END_OF_STREAM: u32 = u32::MAX;

/// A decoded control word read from the packed buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Control {
    /// A small cell of this many bytes follows in the packed buffer.
    Small(u32),
    /// The next large-array handle is this cell.
    Large,
    /// No more cells in this column.
    EndOfStream,
}

impl Control {
    #[inline]
    fn decode(word: u32) -> Control {
        match word {
            CTRL_END_OF_STREAM => Control::EndOfStream,
            CTRL_LARGE => Control::Large,
            n => Control::Small(n),
        }
    }

    #[inline]
    fn encode(self) -> u32 {
        match self {
            Control::Small(n) => {
                debug_assert!(n < LARGE_THRESHOLD, "small-cell control word collides with a sentinel");
                n
            }
            Control::Large => CTRL_LARGE,
            Control::EndOfStream => CTRL_END_OF_STREAM,
        }
    }

    #[inline]
    fn write_to(self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.encode().to_le_bytes());
    }

    #[inline]
    fn read_from(buf: &[u8], at: usize) -> Control {
        let word = u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]]);
        Control::decode(word)
    }
}

/// Size in bytes of an encoded control word.
pub(crate) const CONTROL_WORD_LEN: usize = 4;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_word_round_trip() {
        let mut buf = Vec::new();
        Control::Small(0).write_to(&mut buf);
        Control::Small(LARGE_THRESHOLD - 1).write_to(&mut buf);
        Control::Large.write_to(&mut buf);
        Control::EndOfStream.write_to(&mut buf);

        assert_eq!(Control::read_from(&buf, 0), Control::Small(0));
        assert_eq!(
            Control::read_from(&buf, 4),
            Control::Small(LARGE_THRESHOLD - 1)
        );
        assert_eq!(Control::read_from(&buf, 8), Control::Large);
        assert_eq!(Control::read_from(&buf, 12), Control::EndOfStream);
    }
}
