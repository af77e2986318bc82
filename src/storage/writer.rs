use std::sync::Arc;

use super::node::{BlockSemaphore, QueueNode};
use super::{Control, CONTROL_WORD_LEN, LARGE_CAP, LARGE_THRESHOLD, PACKED_CAP};
use crate::error::{CsvError, Result};

/// Accepts cells in arrival order, categorizes each as small or large, and
/// publishes them in blocks to readers. Single-writer; any number of
/// independent readers may trail behind it.
pub struct DenseStorageWriter {
    column: usize,
    packed: Vec<u8>,
    large: Vec<Arc<Vec<u8>>>,
    tail: Arc<QueueNode>,
    sem: Arc<BlockSemaphore>,
    finished: bool,
}

impl DenseStorageWriter {
    pub(crate) fn new(column: usize, head: Arc<QueueNode>, sem: Arc<BlockSemaphore>) -> Self {
        DenseStorageWriter {
            column,
            packed: Vec::with_capacity(PACKED_CAP),
            large: Vec::with_capacity(LARGE_CAP),
            tail: head,
            sem,
            finished: false,
        }
    }

    /// Appends one cell. Cells at or above [`LARGE_THRESHOLD`] bytes are
    /// copied into their own buffer and referenced from the large array;
    /// smaller cells are packed inline after their control word.
    pub fn append(&mut self, bytes: &[u8]) -> Result<()> {
        debug_assert!(!self.finished, "append called after finish");
        if bytes.len() as u32 >= LARGE_THRESHOLD {
            if self.packed.len() + CONTROL_WORD_LEN > PACKED_CAP || self.large.len() >= LARGE_CAP {
                self.flush()?;
            }
            Control::Large.write_to(&mut self.packed);
            self.large.push(Arc::new(bytes.to_vec()));
        } else {
            let needed = CONTROL_WORD_LEN + bytes.len();
            if self.packed.len() + needed > PACKED_CAP {
                self.flush()?;
            }
            Control::Small(bytes.len() as u32).write_to(&mut self.packed);
            self.packed.extend_from_slice(bytes);
        }
        Ok(())
    }

    /// Returns this writer's back-pressure semaphore, so the coordinator can
    /// poison it if this column's reader dies before the writer is finished
    /// (otherwise a future `flush` would block on `acquire` forever, since
    /// the one reader that would have released a permit is gone).
    pub(crate) fn semaphore(&self) -> Arc<BlockSemaphore> {
        self.sem.clone()
    }

    /// Writes the end-of-stream sentinel and publishes any unflushed block.
    /// Consumes the writer: nothing may be appended after this.
    pub fn finish(mut self) -> Result<()> {
        if self.packed.len() + CONTROL_WORD_LEN > PACKED_CAP {
            self.flush()?;
        }
        Control::EndOfStream.write_to(&mut self.packed);
        self.flush()?;
        self.finished = true;
        Ok(())
    }

    /// Publishes the current packed/large buffers as a new queue node and
    /// resets both to freshly-allocated, empty buffers.
    fn flush(&mut self) -> Result<()> {
        self.sem
            .acquire()
            .map_err(|()| CsvError::Interrupted { column: self.column })?;

        let packed = std::mem::replace(&mut self.packed, Vec::with_capacity(PACKED_CAP));
        let large = std::mem::replace(&mut self.large, Vec::with_capacity(LARGE_CAP));
        let packed_len = packed.len();
        let large_len = large.len();

        let node = QueueNode::new(Arc::new(packed), 0..packed_len, Arc::new(large), 0..large_len);
        self.tail.publish_next(node.clone());
        self.tail = node;
        Ok(())
    }
}

/// If a writer is dropped without calling [`DenseStorageWriter::finish`]
/// (e.g. because another column's thread failed first), readers blocked on
/// this column would otherwise hang forever waiting for `END_OF_STREAM`. The
/// coordinator poisons every column's semaphore on the first fatal error for
/// exactly this reason; this impl only guards against forgetting to call
/// `finish` in a successful run.
impl Drop for DenseStorageWriter {
    fn drop(&mut self) {
        if !self.finished {
            log::debug!(
                "dense storage writer for column {} dropped without finish()",
                self.column
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::dense_storage;

    #[test]
    fn append_then_read_is_byte_equal() {
        let (mut writer, mut reader) = dense_storage(0);
        writer.append(b"hello").unwrap();
        writer.append(b"").unwrap();
        writer.append(b"world").unwrap();
        writer.finish().unwrap();

        assert_eq!(
            reader.try_get_next_slice().unwrap().unwrap().as_bytes(),
            b"hello"
        );
        assert_eq!(reader.try_get_next_slice().unwrap().unwrap().as_bytes(), b"");
        assert_eq!(
            reader.try_get_next_slice().unwrap().unwrap().as_bytes(),
            b"world"
        );
        assert!(reader.try_get_next_slice().unwrap().is_none());
    }

    #[test]
    fn large_cell_threshold_boundary() {
        use super::super::LARGE_THRESHOLD;

        let small = vec![b'a'; LARGE_THRESHOLD as usize - 1];
        let large = vec![b'b'; LARGE_THRESHOLD as usize];

        let (mut writer, mut reader) = dense_storage(0);
        writer.append(&small).unwrap();
        writer.append(&large).unwrap();
        writer.finish().unwrap();

        assert_eq!(reader.try_get_next_slice().unwrap().unwrap().as_bytes(), &small[..]);
        assert_eq!(reader.try_get_next_slice().unwrap().unwrap().as_bytes(), &large[..]);
        assert!(reader.try_get_next_slice().unwrap().is_none());
    }

    #[test]
    fn exactly_full_packed_buffer_flushes_cleanly() {
        use super::super::{CONTROL_WORD_LEN, PACKED_CAP};

        // Fill the packed buffer to exactly its capacity with fixed-size
        // cells, so the next cell must start a brand new queue node.
        let cell_len = 16;
        let per_cell = CONTROL_WORD_LEN + cell_len;
        let count = PACKED_CAP / per_cell;
        let cell = vec![b'x'; cell_len];

        let (mut writer, mut reader) = dense_storage(0);
        for _ in 0..count {
            writer.append(&cell).unwrap();
        }
        writer.append(b"tail").unwrap();
        writer.finish().unwrap();

        for _ in 0..count {
            assert_eq!(reader.try_get_next_slice().unwrap().unwrap().as_bytes(), &cell[..]);
        }
        assert_eq!(reader.try_get_next_slice().unwrap().unwrap().as_bytes(), b"tail");
        assert!(reader.try_get_next_slice().unwrap().is_none());
    }

    #[test]
    fn two_independent_readers_see_the_same_cells() {
        let (mut writer, reader) = dense_storage(0);
        let mut reader_a = reader.clone();
        let mut reader_b = reader;
        writer.append(b"one").unwrap();
        writer.append(b"two").unwrap();
        writer.append(b"three").unwrap();
        writer.finish().unwrap();

        for r in [&mut reader_a, &mut reader_b] {
            assert_eq!(r.try_get_next_slice().unwrap().unwrap().as_bytes(), b"one");
            assert_eq!(r.try_get_next_slice().unwrap().unwrap().as_bytes(), b"two");
            assert_eq!(r.try_get_next_slice().unwrap().unwrap().as_bytes(), b"three");
            assert!(r.try_get_next_slice().unwrap().is_none());
        }
    }

    #[test]
    fn empty_input_yields_only_end_of_stream() {
        let (writer, mut reader) = dense_storage(0);
        writer.finish().unwrap();
        assert!(reader.try_get_next_slice().unwrap().is_none());
    }
}
