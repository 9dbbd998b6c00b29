//! Unbounded blocking FIFO with an end-of-stream latch.
//!
//! Every link between two stages is one [`Queue`]. A stage holds the
//! [`QueueSender`] of its outputs and the [`QueueReceiver`] of its input;
//! neither half can be cloned, so each queue has exactly one producer and one
//! consumer. Closing (or dropping) the sender latches EOF; the receiver drains
//! whatever was pushed before it and then observes the end of the stream.

use std::collections::VecDeque;
use std::fmt::{Debug, Formatter};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

/// Returned by [`Queue::push`] when the queue already reached EOF. Carries the
/// rejected item back to the caller.
pub struct Closed<T>(pub T);

impl<T> Debug for Closed<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("Closed(..)")
    }
}

impl<T> std::fmt::Display for Closed<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("push after end of stream")
    }
}

impl<T> std::error::Error for Closed<T> {}

pub struct Queue<T> {
    state: Mutex<QueueState<T>>,
    not_empty: Condvar,
}

struct QueueState<T> {
    items: VecDeque<T>,
    eof: bool,
    total_pushed: u64,
    total_popped: u64,
}

impl<T> Queue<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::new(),
                eof: false,
                total_pushed: 0,
                total_popped: 0,
            }),
            not_empty: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState<T>> {
        // A panicking peer cannot leave the deque half-updated.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends to the tail and wakes one waiting consumer. Never blocks.
    pub fn push(&self, item: T) -> Result<(), Closed<T>> {
        let mut state = self.lock();
        if state.eof {
            return Err(Closed(item));
        }
        state.items.push_back(item);
        state.total_pushed += 1;
        drop(state);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Removes the head. Blocks while the queue is empty and not at EOF;
    /// returns `None` once it is empty and at EOF, every time after that.
    pub fn pop(&self) -> Option<T> {
        let mut state = self.lock();
        loop {
            if let Some(item) = state.items.pop_front() {
                state.total_popped += 1;
                return Some(item);
            }
            if state.eof {
                return None;
            }
            state = self
                .not_empty
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Non-blocking variant of [`Queue::pop`].
    pub fn try_pop(&self) -> Option<T> {
        let mut state = self.lock();
        let item = state.items.pop_front();
        if item.is_some() {
            state.total_popped += 1;
        }
        item
    }

    /// Latches EOF and wakes every waiter. Idempotent.
    pub fn set_eof(&self) {
        let mut state = self.lock();
        state.eof = true;
        drop(state);
        self.not_empty.notify_all();
    }

    pub fn is_eof(&self) -> bool {
        self.lock().eof
    }

    /// Items buffered right now. Unbounded: a slow consumer makes this grow.
    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> QueueStats {
        let state = self.lock();
        QueueStats {
            buffered: state.items.len(),
            total_pushed: state.total_pushed,
            total_popped: state.total_popped,
            eof: state.eof,
        }
    }
}

impl<T> Default for Queue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueStats {
    pub buffered: usize,
    pub total_pushed: u64,
    pub total_popped: u64,
    pub eof: bool,
}

/// Creates a queue and splits it into its producer and consumer halves.
pub fn channel<T>() -> (QueueSender<T>, QueueReceiver<T>) {
    let queue = Arc::new(Queue::new());
    (
        QueueSender {
            queue: Arc::clone(&queue),
        },
        QueueReceiver { queue },
    )
}

/// Producer half. Sets EOF when closed or dropped.
pub struct QueueSender<T> {
    queue: Arc<Queue<T>>,
}

impl<T> QueueSender<T> {
    pub fn push(&self, item: T) {
        // EOF is only latched by close/drop, which consume the sender.
        if self.queue.push(item).is_err() {
            log::error!("queue sender pushed after end of stream, item dropped");
        }
    }

    /// Signals end of stream to the consumer.
    pub fn close(self) {
        self.queue.set_eof();
    }

    pub fn stats(&self) -> QueueStats {
        self.queue.stats()
    }
}

impl<T> Drop for QueueSender<T> {
    fn drop(&mut self) {
        self.queue.set_eof();
    }
}

/// Consumer half.
pub struct QueueReceiver<T> {
    queue: Arc<Queue<T>>,
}

impl<T> QueueReceiver<T> {
    pub fn pop(&self) -> Option<T> {
        self.queue.pop()
    }

    pub fn try_pop(&self) -> Option<T> {
        self.queue.try_pop()
    }

    pub fn is_eof(&self) -> bool {
        self.queue.is_eof()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn stats(&self) -> QueueStats {
        self.queue.stats()
    }
}

impl<T> Iterator for QueueReceiver<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.pop()
    }
}

#[cfg(test)]
#[path = "queue_test.rs"]
mod queue_test;
