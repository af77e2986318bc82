use std::{
    ops::Range,
    sync::{Arc, Condvar, Mutex},
};

/// An immutable element of the dense-storage queue.
///
/// Ownership is shared between the writer's tail pointer and any readers
/// that have not yet advanced past it. `next` starts unset and transitions to
/// set at most once, under `link`'s mutex; once set it never changes. Every
/// other field is fixed at construction time.
pub(crate) struct QueueNode {
    /// The packed buffer this node's `packed_range` slices into.
    pub(crate) packed: Arc<Vec<u8>>,
    pub(crate) packed_range: Range<usize>,
    /// The large-array buffer this node's `large_range` slices into. Each
    /// entry is an independently-owned buffer for one large cell.
    pub(crate) large: Arc<Vec<Arc<Vec<u8>>>>,
    pub(crate) large_range: Range<usize>,

    link: Mutex<Link>,
    ready: Condvar,
}

struct Link {
    next: Option<Arc<QueueNode>>,
    /// Whether some reader has already released the writer's semaphore
    /// permit for the `next` transition on this node. Set at most once.
    observed: bool,
}

impl QueueNode {
    /// The empty sentinel node every dense-storage queue starts with.
    pub(crate) fn sentinel() -> Arc<QueueNode> {
        Arc::new(QueueNode {
            packed: Arc::new(Vec::new()),
            packed_range: 0..0,
            large: Arc::new(Vec::new()),
            large_range: 0..0,
            link: Mutex::new(Link {
                next: None,
                observed: false,
            }),
            ready: Condvar::new(),
        })
    }

    pub(crate) fn new(
        packed: Arc<Vec<u8>>,
        packed_range: Range<usize>,
        large: Arc<Vec<Arc<Vec<u8>>>>,
        large_range: Range<usize>,
    ) -> Arc<QueueNode> {
        Arc::new(QueueNode {
            packed,
            packed_range,
            large,
            large_range,
            link: Mutex::new(Link {
                next: None,
                observed: false,
            }),
            ready: Condvar::new(),
        })
    }

    /// Links `next` as this node's successor and wakes any readers blocked
    /// waiting for it. May only be called once per node (by the single
    /// writer).
    pub(crate) fn publish_next(&self, next: Arc<QueueNode>) {
        let mut link = self.link.lock().unwrap();
        debug_assert!(link.next.is_none(), "a queue node's `next` is one-shot");
        link.next = Some(next);
        self.ready.notify_all();
    }

    /// Blocks until `next` is set, then returns it. If this call is the first
    /// to observe the transition (across every reader of this node), returns
    /// `true` in the second element so the caller can release one semaphore
    /// permit.
    pub(crate) fn wait_for_next(&self) -> (Arc<QueueNode>, bool) {
        let mut link = self.link.lock().unwrap();
        while link.next.is_none() {
            link = self.ready.wait(link).unwrap();
        }
        let first_observer = !link.observed;
        link.observed = true;
        (link.next.clone().unwrap(), first_observer)
    }

    /// Non-blocking peek, used by the writer to avoid repeated locking when
    /// it already knows its own tail has no successor yet.
    #[cfg(test)]
    pub(crate) fn has_next(&self) -> bool {
        self.link.lock().unwrap().next.is_some()
    }
}

/// A bounded counting semaphore used to keep the writer from running more
/// than `MAX_UNOBSERVED_BLOCKS` ahead of the first reader to reach each
/// published block.
///
/// No crate in the teacher or the pack supplies a blocking counting
/// semaphore of this exact shape, so this is a small `Mutex` + `Condvar`
/// implementation local to the crate, matching the strategy spec.md §9
/// prescribes for the dense-storage queue itself.
pub struct BlockSemaphore {
    state: Mutex<SemState>,
    available: Condvar,
}

struct SemState {
    permits: usize,
    /// Set once a fatal error has occurred anywhere in the pipeline, so that
    /// threads blocked here wake up and fail instead of hanging forever.
    poisoned: bool,
}

impl BlockSemaphore {
    pub fn new(initial: usize) -> Self {
        BlockSemaphore {
            state: Mutex::new(SemState {
                permits: initial,
                poisoned: false,
            }),
            available: Condvar::new(),
        }
    }

    /// Acquires one permit, blocking if none is available. Returns `Err` if
    /// the semaphore was poisoned (a fatal error occurred elsewhere) while
    /// waiting.
    pub fn acquire(&self) -> Result<(), ()> {
        let mut state = self.state.lock().unwrap();
        loop {
            if state.poisoned {
                return Err(());
            }
            if state.permits > 0 {
                state.permits -= 1;
                return Ok(());
            }
            state = self.available.wait(state).unwrap();
        }
    }

    /// Releases one permit, waking a single waiter if any is blocked.
    pub fn release(&self) {
        let mut state = self.state.lock().unwrap();
        state.permits += 1;
        self.available.notify_one();
    }

    /// Wakes every thread blocked on `acquire`, causing them to fail.
    pub fn poison(&self) {
        let mut state = self.state.lock().unwrap();
        state.poisoned = true;
        self.available.notify_all();
    }

    #[cfg(test)]
    pub(crate) fn available_permits(&self) -> usize {
        self.state.lock().unwrap().permits
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn semaphore_blocks_until_released() {
        let sem = Arc::new(BlockSemaphore::new(1));
        sem.acquire().unwrap();
        assert_eq!(sem.available_permits(), 0);

        let sem2 = sem.clone();
        let handle = thread::spawn(move || {
            sem2.acquire().unwrap();
        });
        thread::sleep(Duration::from_millis(20));
        assert!(!handle.is_finished());
        sem.release();
        handle.join().unwrap();
    }

    #[test]
    fn poison_wakes_waiters() {
        let sem = Arc::new(BlockSemaphore::new(0));
        let sem2 = sem.clone();
        let handle = thread::spawn(move || sem2.acquire());
        thread::sleep(Duration::from_millis(20));
        sem.poison();
        assert_eq!(handle.join().unwrap(), Err(()));
    }

    #[test]
    fn node_chain_publishes_and_observes_once() {
        let head = QueueNode::sentinel();
        let next = QueueNode::new(Arc::new(vec![1, 2, 3]), 0..3, Arc::new(Vec::new()), 0..0);
        head.publish_next(next.clone());

        let (got, first) = head.wait_for_next();
        assert!(Arc::ptr_eq(&got, &next));
        assert!(first);
        let (got2, first2) = head.wait_for_next();
        assert!(Arc::ptr_eq(&got2, &next));
        assert!(!first2);
    }
}
