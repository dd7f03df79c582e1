//! Asynchronous FIFO work queue
//!
//! Producers call [`AsyncQueue::enqueue`]; consumers await
//! [`AsyncQueue::dequeue`]. A waiting consumer is handed the next item
//! directly instead of it being buffered. The queue has three states:
//!
//! - **open**: items flow normally
//! - **completed**: no more items will arrive; waiting and future dequeues on
//!   an empty queue resolve to [`DequeueError::Cancelled`]
//! - **poisoned**: buffered items are discarded and every dequeue raises the
//!   stored cause
//!
//! All transitions happen under one internal lock.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::oneshot;

/// Error returned by [`AsyncQueue::enqueue`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("cannot enqueue into a completed queue")]
    Completed,
}

/// Error returned by [`AsyncQueue::dequeue`]
#[derive(Debug, Clone, Error)]
pub enum DequeueError {
    /// The queue was completed and no item is left
    #[error("the queue has been completed")]
    Cancelled,

    /// The queue was poisoned with this cause
    #[error("the queue has faulted: {0}")]
    Faulted(Arc<anyhow::Error>),
}

impl DequeueError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, DequeueError::Cancelled)
    }
}

type Waiter<T> = oneshot::Sender<Result<T, DequeueError>>;

enum QueueState {
    Open,
    Completed,
    Poisoned(Arc<anyhow::Error>),
}

struct Inner<T> {
    items: VecDeque<T>,
    waiters: VecDeque<Waiter<T>>,
    state: QueueState,
}

/// Thread-safe asynchronous queue
pub struct AsyncQueue<T> {
    inner: Mutex<Inner<T>>,
}

impl<T: Send> AsyncQueue<T> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::new(),
                waiters: VecDeque::new(),
                state: QueueState::Open,
            }),
        }
    }

    /// Append an item, handing it straight to a waiting consumer if there is one
    ///
    /// Enqueueing into a poisoned queue silently drops the item.
    pub fn enqueue(&self, item: T) -> Result<(), QueueError> {
        let mut inner = self.inner.lock();
        match inner.state {
            QueueState::Poisoned(_) => return Ok(()),
            QueueState::Completed => {
                log::error!("enqueue called on a completed queue");
                return Err(QueueError::Completed);
            }
            QueueState::Open => {}
        }

        let mut item = item;
        while let Some(waiter) = inner.waiters.pop_front() {
            // A waiter whose future was dropped hands the item back.
            match waiter.send(Ok(item)) {
                Ok(()) => return Ok(()),
                Err(Ok(returned)) => item = returned,
                Err(Err(_)) => return Ok(()),
            }
        }

        inner.items.push_back(item);
        Ok(())
    }

    /// Take the next item, waiting if none is buffered
    pub async fn dequeue(&self) -> Result<T, DequeueError> {
        let receiver = {
            let mut inner = self.inner.lock();
            if let QueueState::Poisoned(cause) = &inner.state {
                return Err(DequeueError::Faulted(cause.clone()));
            }
            if let Some(item) = inner.items.pop_front() {
                return Ok(item);
            }
            if let QueueState::Completed = inner.state {
                return Err(DequeueError::Cancelled);
            }

            let (sender, receiver) = oneshot::channel();
            inner.waiters.push_back(sender);
            receiver
        };

        receiver.await.unwrap_or(Err(DequeueError::Cancelled))
    }

    /// Take a buffered item without waiting
    pub fn try_dequeue(&self) -> Option<T> {
        let mut inner = self.inner.lock();
        match inner.state {
            QueueState::Poisoned(_) => None,
            _ => inner.items.pop_front(),
        }
    }

    /// Mark that no more items will arrive
    ///
    /// Completing twice is harmless; use [`try_complete`](Self::try_complete)
    /// to learn whether this call performed the transition.
    pub fn complete(&self) {
        self.try_complete();
    }

    /// Complete the queue, returning `false` if it was already completed or poisoned
    pub fn try_complete(&self) -> bool {
        let waiters = {
            let mut inner = self.inner.lock();
            if !matches!(inner.state, QueueState::Open) {
                return false;
            }
            inner.state = QueueState::Completed;
            std::mem::take(&mut inner.waiters)
        };

        for waiter in waiters {
            let _ = waiter.send(Err(DequeueError::Cancelled));
        }
        true
    }

    /// Poison the queue with `cause`, discarding buffered items
    pub fn set_exception(&self, cause: anyhow::Error) {
        let cause = Arc::new(cause);
        let waiters = {
            let mut inner = self.inner.lock();
            if matches!(inner.state, QueueState::Poisoned(_)) {
                return;
            }
            inner.state = QueueState::Poisoned(cause.clone());
            inner.items.clear();
            std::mem::take(&mut inner.waiters)
        };

        for waiter in waiters {
            let _ = waiter.send(Err(DequeueError::Faulted(cause.clone())));
        }
    }

    /// Best-effort number of buffered items
    pub fn count(&self) -> usize {
        self.inner.lock().items.len()
    }

    pub fn is_completed(&self) -> bool {
        !matches!(self.inner.lock().state, QueueState::Open)
    }

    /// Remove every buffered item, returning them in FIFO order
    pub fn drain(&self) -> Vec<T> {
        self.inner.lock().items.drain(..).collect()
    }
}

impl<T: Send> Default for AsyncQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for AsyncQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        let state = match inner.state {
            QueueState::Open => "open",
            QueueState::Completed => "completed",
            QueueState::Poisoned(_) => "poisoned",
        };
        f.debug_struct("AsyncQueue")
            .field("state", &state)
            .field("count", &inner.items.len())
            .field("waiters", &inner.waiters.len())
            .finish()
    }
}
