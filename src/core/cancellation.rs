//! Cooperative cancellation
//!
//! A [`CancellationToken`] is shared by every unit of work that belongs to one
//! analysis request. Analyzer callbacks observe it through their context and
//! bail out with [`OperationCanceled`]; the executor compares the token id
//! carried by that error against the ambient token to decide whether the
//! cancellation belongs to the request or is a fault of the analyzer.

use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Notify;

static NEXT_TOKEN_ID: AtomicU64 = AtomicU64::new(1);

/// Raised when work observes a cancelled token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("the operation was canceled (token {token_id})")]
pub struct OperationCanceled {
    /// Id of the token that was observed as cancelled
    pub token_id: u64,
}

type Callback = Box<dyn FnOnce() + Send>;

struct TokenInner {
    id: u64,
    cancelled: AtomicBool,
    notify: Notify,
    callbacks: Mutex<Vec<Callback>>,
}

/// Shared, cloneable cancellation signal
///
/// Clones observe the same state. Callbacks registered with
/// [`register`](Self::register) run exactly once, on the thread that cancels.
#[derive(Clone)]
pub struct CancellationToken {
    inner: Arc<TokenInner>,
}

impl CancellationToken {
    /// Create a new, uncancelled token with a fresh identity
    pub fn new() -> Self {
        Self {
            inner: Arc::new(TokenInner {
                id: NEXT_TOKEN_ID.fetch_add(1, Ordering::Relaxed),
                cancelled: AtomicBool::new(false),
                notify: Notify::new(),
                callbacks: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Identity of this token
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn is_cancellation_requested(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Request cancellation. Only the first call runs the registered callbacks.
    pub fn cancel(&self) {
        if self.inner.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }

        let callbacks = std::mem::take(&mut *self.inner.callbacks.lock());
        self.inner.notify.notify_waiters();
        for callback in callbacks {
            callback();
        }
    }

    /// Return `Err` if cancellation has been requested
    pub fn check(&self) -> Result<(), OperationCanceled> {
        if self.is_cancellation_requested() {
            Err(self.error())
        } else {
            Ok(())
        }
    }

    /// The error value that identifies this token
    pub fn error(&self) -> OperationCanceled {
        OperationCanceled {
            token_id: self.inner.id,
        }
    }

    /// Run `callback` when the token is cancelled, or immediately if it already is
    pub fn register<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut callbacks = self.inner.callbacks.lock();
        if self.is_cancellation_requested() {
            drop(callbacks);
            callback();
        } else {
            callbacks.push(Box::new(callback));
        }
    }

    /// A new token that is cancelled whenever this one is
    ///
    /// The child has its own identity, so cancelling the child alone does not
    /// look like ambient cancellation to holders of the parent.
    pub fn child_token(&self) -> CancellationToken {
        let child = CancellationToken::new();
        let linked = child.clone();
        self.register(move || linked.cancel());
        child
    }

    /// Resolve once cancellation has been requested
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_cancellation_requested() {
                return;
            }
            notified.await;
        }
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationToken")
            .field("id", &self.inner.id)
            .field("cancelled", &self.is_cancellation_requested())
            .finish()
    }
}
