//! A bounded, condvar-backed FIFO shared between threads.
//!
//! The consumer blocks on a condition variable and wakes either when an
//! item arrives or when the queue is told to stop, so no thread spins.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::Duration;

struct Inner<T> {
    items: VecDeque<T>,
    stopped: bool,
}

/// A bounded FIFO with drop-on-overflow `push` and blocking `pop`.
pub struct BoundedQueue<T> {
    capacity: usize,
    inner: Mutex<Inner<T>>,
    not_empty: Condvar,
}

impl<T> BoundedQueue<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(Inner {
                items: VecDeque::new(),
                stopped: false,
            }),
            not_empty: Condvar::new(),
        }
    }

    /// Non-blocking enqueue. Returns `false` and drops `item` if the queue
    /// is full. Callers are expected to log the drop themselves (the queue
    /// doesn't know whether it's the WiFi-in or USB-out side for a useful
    /// log message).
    pub fn push(&self, item: T) -> bool {
        let mut guard = self.inner.lock().unwrap();
        if guard.items.len() >= self.capacity {
            return false;
        }
        guard.items.push_back(item);
        self.not_empty.notify_one();
        true
    }

    /// Current depth, for high-water-mark warnings.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().items.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pop the head element immediately, or `None` if empty. Used by the
    /// Bus Pump, which must never block on the USB-out queue (it has its
    /// own read/write turn to run every loop iteration).
    pub fn try_pop(&self) -> Option<T> {
        self.inner.lock().unwrap().items.pop_front()
    }

    /// Block until an item is available, the queue is stopped, or `timeout`
    /// elapses. Returns `None` on stop or timeout.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<T> {
        let mut guard = self.inner.lock().unwrap();
        loop {
            if let Some(item) = guard.items.pop_front() {
                return Some(item);
            }
            if guard.stopped {
                return None;
            }
            let (next_guard, result) = self.not_empty.wait_timeout(guard, timeout).unwrap();
            guard = next_guard;
            if result.timed_out() && guard.items.is_empty() {
                return None;
            }
        }
    }

    /// Wake any blocked consumer and mark the queue stopped; subsequent
    /// `pop_timeout` calls drain remaining items then return `None`.
    pub fn stop(&self) {
        let mut guard = self.inner.lock().unwrap();
        guard.stopped = true;
        self.not_empty.notify_all();
    }

    /// Drop everything currently queued. Used on device reset (for
    /// deterministic state after a reconnect) and on shutdown.
    pub fn clear(&self) {
        self.inner.lock().unwrap().items.clear();
    }
}
