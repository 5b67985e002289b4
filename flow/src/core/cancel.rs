//! Cooperative cancellation tokens.
//!
//! Cancellation is advisory, never preemptive: cancelling a token tells the
//! components waiting on it to wind down, it does not terminate anything.
//! Tokens form a hierarchy — a child created with [`CancelToken::child`] is
//! cancelled whenever its parent is — which is how a halt on a composed run
//! reaches every live branch.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// Shared, clonable cancellation signal for one run.
#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    state: Mutex<TokenState>,
    cond: Condvar,
}

#[derive(Default)]
struct TokenState {
    cancelled: bool,
    children: Vec<CancelToken>,
}

impl CancelToken {
    /// Create a fresh, uncancelled token.
    pub fn new() -> CancelToken {
        CancelToken::default()
    }

    /// Create a token that is cancelled whenever this one is.
    ///
    /// If the parent is already cancelled, the child starts out cancelled.
    pub fn child(&self) -> CancelToken {
        let child = CancelToken::new();
        let mut state = self.inner.state.lock();
        if state.cancelled {
            drop(state);
            child.cancel();
        } else {
            state.children.push(child.clone());
        }
        child
    }

    /// Request cancellation: wake all waiters and cancel linked children.
    ///
    /// Idempotent; later calls are no-ops.
    pub fn cancel(&self) {
        let children = {
            let mut state = self.inner.state.lock();
            if state.cancelled {
                return;
            }
            state.cancelled = true;
            self.inner.cond.notify_all();
            std::mem::take(&mut state.children)
        };
        for child in children {
            child.cancel();
        }
    }

    /// True once cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.inner.state.lock().cancelled
    }

    /// Block the calling thread until cancellation is requested.
    pub fn wait(&self) {
        let mut state = self.inner.state.lock();
        while !state.cancelled {
            self.inner.cond.wait(&mut state);
        }
    }

    /// Block until cancellation or the timeout elapses; true if cancelled.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.inner.state.lock();
        while !state.cancelled {
            if self.inner.cond.wait_until(&mut state, deadline).timed_out() {
                break;
            }
        }
        state.cancelled
    }
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
