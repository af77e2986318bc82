use std::sync::Arc;

use super::node::{BlockSemaphore, QueueNode};
use super::{Control, CONTROL_WORD_LEN};
use crate::bytes::ByteSlice;
use crate::error::Result;

/// Forward-only cursor over one column's dense storage. Cheaply cloneable:
/// cloning snapshots the current node pointer and local cursors, and the two
/// copies advance independently from then on, which is what the typing
/// engine uses to implement two-pass inference without rebuffering the
/// input.
#[derive(Clone)]
pub struct DenseStorageReader {
    current: Arc<QueueNode>,
    packed_pos: usize,
    large_idx: usize,
    sem: Arc<BlockSemaphore>,
    done: bool,
}

impl DenseStorageReader {
    pub(crate) fn new(head: Arc<QueueNode>, sem: Arc<BlockSemaphore>) -> Self {
        let packed_pos = head.packed_range.start;
        let large_idx = head.large_range.start;
        DenseStorageReader {
            current: head,
            packed_pos,
            large_idx,
            sem,
            done: false,
        }
    }

    /// Returns the next cell's slice, or `None` once `END_OF_STREAM` has been
    /// read.
    pub fn try_get_next_slice(&mut self) -> Result<Option<ByteSlice>> {
        if self.done {
            return Ok(None);
        }
        loop {
            if self.packed_pos >= self.current.packed_range.end {
                let (next, first_observer) = self.current.wait_for_next();
                if first_observer {
                    self.sem.release();
                }
                self.packed_pos = next.packed_range.start;
                self.large_idx = next.large_range.start;
                self.current = next;
                continue;
            }

            let ctrl = Control::read_from(&self.current.packed, self.packed_pos);
            self.packed_pos += CONTROL_WORD_LEN;
            return match ctrl {
                Control::EndOfStream => {
                    self.done = true;
                    Ok(None)
                }
                Control::Large => {
                    let buf = self
                        .current
                        .large
                        .get(self.large_idx)
                        .cloned()
                        .expect("large-array index out of range for its queue node");
                    self.large_idx += 1;
                    let len = buf.len();
                    Ok(Some(ByteSlice::new(buf, 0, len)))
                }
                Control::Small(n) => {
                    let begin = self.packed_pos;
                    let end = begin + n as usize;
                    self.packed_pos = end;
                    Ok(Some(ByteSlice::new(self.current.packed.clone(), begin, end)))
                }
            };
        }
    }
}

/// A forward cursor over a [`DenseStorageReader`] that caches the current
/// cell slice, so callers can peek without re-reading.
pub struct IteratorHolder {
    reader: DenseStorageReader,
    current: Option<ByteSlice>,
    consumed_count: usize,
    exhausted: bool,
}

impl IteratorHolder {
    pub fn new(reader: DenseStorageReader) -> Result<Self> {
        let mut holder = IteratorHolder {
            reader,
            current: None,
            consumed_count: 0,
            exhausted: false,
        };
        holder.fill()?;
        Ok(holder)
    }

    fn fill(&mut self) -> Result<()> {
        match self.reader.try_get_next_slice()? {
            Some(slice) => self.current = Some(slice),
            None => {
                self.current = None;
                self.exhausted = true;
            }
        }
        Ok(())
    }

    #[inline]
    pub fn current(&self) -> Option<&ByteSlice> {
        self.current.as_ref()
    }

    #[inline]
    pub fn consumed_count(&self) -> usize {
        self.consumed_count
    }

    #[inline]
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Advances to the next cell, if any.
    pub fn advance(&mut self) -> Result<()> {
        if self.exhausted {
            return Ok(());
        }
        self.consumed_count += 1;
        self.fill()
    }

    /// Produces an independent iterator positioned identically to this one;
    /// the two subsequently advance without affecting each other.
    pub fn clone_independent(&self) -> IteratorHolder {
        IteratorHolder {
            reader: self.reader.clone(),
            current: self.current.clone(),
            consumed_count: self.consumed_count,
            exhausted: self.exhausted,
        }
    }
}
