//! Bounded output queue shared between a running command and its consumers
//!
//! The producer never waits on consumers: once the queue holds `capacity`
//! lines, publishing a new line evicts the oldest one. Consumers drain lines
//! in production order and can tell "nothing yet" apart from "run finished"
//! through the queue's closed flag.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Number of lines an engine's output queue retains
pub const MAX_OUTPUT_LINES: usize = 100;

#[derive(Debug)]
struct QueueState {
    lines: VecDeque<String>,
    closed: bool,
    evicted: u64,
}

#[derive(Debug)]
struct QueueInner {
    capacity: usize,
    state: Mutex<QueueState>,
    available: Condvar,
}

/// Fixed-capacity FIFO of output lines with drop-oldest overflow
///
/// Cloning yields another handle to the same queue.
#[derive(Debug, Clone)]
pub struct OutputQueue {
    inner: Arc<QueueInner>,
}

impl OutputQueue {
    /// Create an open queue holding at most `capacity` lines (minimum 1)
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Arc::new(QueueInner {
                capacity,
                state: Mutex::new(QueueState {
                    lines: VecDeque::with_capacity(capacity),
                    closed: false,
                    evicted: 0,
                }),
                available: Condvar::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        // Lines are plain strings; a panicking holder cannot leave them half-written.
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a line, evicting the oldest entry first if the queue is full
    ///
    /// Returns the evicted line, if any. Never blocks waiting for consumers.
    pub fn publish(&self, line: impl Into<String>) -> Option<String> {
        let mut state = self.lock();
        let evicted = if state.lines.len() >= self.inner.capacity {
            state.evicted += 1;
            state.lines.pop_front()
        } else {
            None
        };
        state.lines.push_back(line.into());
        drop(state);
        self.inner.available.notify_one();
        evicted
    }

    /// Take the oldest line, blocking until one is published or the queue is closed
    ///
    /// Returns `None` only when the queue is closed and empty.
    pub fn recv(&self) -> Option<String> {
        let mut state = self.lock();
        loop {
            if let Some(line) = state.lines.pop_front() {
                return Some(line);
            }
            if state.closed {
                return None;
            }
            state = self
                .inner
                .available
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Like [`recv`](Self::recv) but gives up after `timeout`
    ///
    /// A timeout too large to represent as a deadline waits like `recv`.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<String> {
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            return self.recv();
        };
        let mut state = self.lock();
        loop {
            if let Some(line) = state.lines.pop_front() {
                return Some(line);
            }
            if state.closed {
                return None;
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            state = self
                .inner
                .available
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// Take the oldest line without blocking
    pub fn try_recv(&self) -> Option<String> {
        self.lock().lines.pop_front()
    }

    /// Take every queued line, oldest first
    pub fn drain(&self) -> Vec<String> {
        self.lock().lines.drain(..).collect()
    }

    /// Copy of the queued lines without consuming them
    pub fn snapshot(&self) -> Vec<String> {
        self.lock().lines.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().lines.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Total number of lines dropped by overflow since the queue was created
    pub fn evicted(&self) -> u64 {
        self.lock().evicted
    }

    /// Whether the run feeding this queue has finished
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Mark the run as finished and wake every blocked consumer
    pub(crate) fn close(&self) {
        self.lock().closed = true;
        self.inner.available.notify_all();
    }

    /// Clear the finished flag ahead of a new run; queued lines are kept
    pub(crate) fn reopen(&self) {
        self.lock().closed = false;
    }
}

impl Default for OutputQueue {
    fn default() -> Self {
        Self::with_capacity(MAX_OUTPUT_LINES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_default_capacity() {
        let queue = OutputQueue::default();
        assert_eq!(queue.capacity(), MAX_OUTPUT_LINES);
        assert!(queue.is_empty());
        assert!(!queue.is_closed());
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let queue = OutputQueue::with_capacity(0);
        assert_eq!(queue.capacity(), 1);
        queue.publish("a");
        queue.publish("b");
        assert_eq!(queue.snapshot(), vec!["b"]);
    }

    #[test]
    fn test_publish_preserves_order() {
        let queue = OutputQueue::with_capacity(4);
        for line in ["a", "b", "c"] {
            assert!(queue.publish(line).is_none());
        }
        assert_eq!(queue.snapshot(), vec!["a", "b", "c"]);
        assert_eq!(queue.try_recv().as_deref(), Some("a"));
        assert_eq!(queue.drain(), vec!["b", "c"]);
        assert!(queue.try_recv().is_none());
    }

    #[test]
    fn test_overflow_evicts_exactly_one_oldest() {
        let queue = OutputQueue::with_capacity(3);
        queue.publish("1");
        queue.publish("2");
        queue.publish("3");
        assert_eq!(queue.publish("4").as_deref(), Some("1"));
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.snapshot(), vec!["2", "3", "4"]);
        assert_eq!(queue.evicted(), 1);
    }

    #[test]
    fn test_never_exceeds_capacity() {
        let queue = OutputQueue::default();
        for i in 0..1_000 {
            queue.publish(i.to_string());
            assert!(queue.len() <= MAX_OUTPUT_LINES);
        }
        let expected: Vec<String> = (900..1_000).map(|i| i.to_string()).collect();
        assert_eq!(queue.snapshot(), expected);
        assert_eq!(queue.evicted(), 900);
    }

    #[test]
    fn test_recv_returns_none_once_closed_and_drained() {
        let queue = OutputQueue::with_capacity(4);
        queue.publish("last");
        queue.close();
        assert_eq!(queue.recv().as_deref(), Some("last"));
        assert!(queue.recv().is_none());
    }

    #[test]
    fn test_recv_timeout_on_open_empty_queue() {
        let queue = OutputQueue::with_capacity(4);
        assert!(queue.recv_timeout(Duration::from_millis(20)).is_none());
        assert!(!queue.is_closed());
    }

    #[test]
    fn test_recv_timeout_with_unbounded_duration() {
        let queue = OutputQueue::with_capacity(4);
        queue.publish("x");
        assert_eq!(queue.recv_timeout(Duration::MAX).as_deref(), Some("x"));

        let consumer = {
            let queue = queue.clone();
            thread::spawn(move || queue.recv_timeout(Duration::MAX))
        };
        thread::sleep(Duration::from_millis(20));
        queue.close();
        assert!(consumer.join().unwrap().is_none());
    }

    #[test]
    fn test_reopen_keeps_lines() {
        let queue = OutputQueue::with_capacity(4);
        queue.publish("kept");
        queue.close();
        queue.reopen();
        assert!(!queue.is_closed());
        assert_eq!(queue.snapshot(), vec!["kept"]);
    }

    #[test]
    fn test_close_wakes_blocked_consumer() {
        let queue = OutputQueue::with_capacity(4);
        let consumer = {
            let queue = queue.clone();
            thread::spawn(move || queue.recv())
        };
        thread::sleep(Duration::from_millis(20));
        queue.close();
        assert!(consumer.join().unwrap().is_none());
    }

    #[test]
    fn test_concurrent_consumer_sees_production_order() {
        let queue = OutputQueue::with_capacity(8);
        let consumer = {
            let queue = queue.clone();
            thread::spawn(move || {
                let mut seen = Vec::new();
                while let Some(line) = queue.recv() {
                    seen.push(line.parse::<u32>().unwrap());
                }
                seen
            })
        };

        for i in 0..5_000u32 {
            queue.publish(i.to_string());
        }
        queue.close();

        let seen = consumer.join().unwrap();
        assert!(!seen.is_empty());
        assert!(seen.windows(2).all(|w| w[0] < w[1]), "out of order");
        assert_eq!(seen.last(), Some(&4_999));
        assert_eq!(seen.len() as u64 + queue.evicted(), 5_000);
    }
}
