use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Fixed-capacity FIFO shared by one producer and one consumer.
///
/// `push` never blocks: when the queue is full the oldest item is evicted to
/// admit the new one. `pop_timeout` blocks the consumer until an item arrives
/// or the timeout elapses.
///
/// # Examples
/// ```
/// use std::time::Duration;
///
/// use packetscope_core::BoundedQueue;
///
/// let queue = BoundedQueue::new(2);
/// queue.push(1);
/// queue.push(2);
/// assert!(queue.push(3));
/// assert_eq!(queue.pop_timeout(Duration::ZERO), Some(2));
/// assert_eq!(queue.dropped(), 1);
/// ```
#[derive(Debug)]
pub struct BoundedQueue<T> {
    items: Mutex<VecDeque<T>>,
    ready: Condvar,
    capacity: usize,
    dropped: AtomicU64,
}

impl<T> BoundedQueue<T> {
    /// A zero capacity is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            ready: Condvar::new(),
            capacity,
            dropped: AtomicU64::new(0),
        }
    }

    /// Append `item`, evicting the oldest entry if full. Returns `true` when
    /// an entry was evicted.
    pub fn push(&self, item: T) -> bool {
        let mut items = self.lock();
        let evicted = if items.len() >= self.capacity {
            items.pop_front();
            self.dropped.fetch_add(1, Ordering::Relaxed);
            true
        } else {
            false
        };
        items.push_back(item);
        drop(items);
        self.ready.notify_one();
        evicted
    }

    pub fn pop_timeout(&self, timeout: Duration) -> Option<T> {
        let items = self.lock();
        let (mut items, _) = self
            .ready
            .wait_timeout_while(items, timeout, |items| items.is_empty())
            .unwrap_or_else(PoisonError::into_inner);
        items.pop_front()
    }

    /// Discard everything queued and return how many entries were dropped.
    pub fn clear(&self) -> usize {
        let mut items = self.lock();
        let count = items.len();
        items.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Entries evicted by the overflow policy since creation.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<T>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
