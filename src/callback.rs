//! Callback registration for update streams.

use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{broadcast, watch};

static CALLBACK_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Callback handle for unregistering callbacks.
///
/// Dropping the handle unregisters the callback.
pub struct CallbackHandle {
    id: u64,
    unregister_fn: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl CallbackHandle {
    /// Create a new callback handle.
    pub(crate) fn new(id: u64, unregister_fn: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            id,
            unregister_fn: Some(Box::new(unregister_fn)),
        }
    }

    /// Unregister this callback.
    pub fn unregister(mut self) {
        if let Some(f) = self.unregister_fn.take() {
            f();
        }
    }

    /// Get the callback ID.
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for CallbackHandle {
    fn drop(&mut self) {
        if let Some(f) = self.unregister_fn.take() {
            f();
        }
    }
}

impl std::fmt::Debug for CallbackHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackHandle").field("id", &self.id).finish()
    }
}

/// Run `callback` on every change published to `rx` until the handle is dropped
/// or the sender goes away.
pub(crate) fn on_watch_change<T, F>(mut rx: watch::Receiver<T>, callback: F) -> CallbackHandle
where
    T: Clone + Send + Sync + 'static,
    F: Fn(&T) + Send + Sync + 'static,
{
    let callback_id = CALLBACK_COUNTER.fetch_add(1, Ordering::SeqCst);
    rx.mark_unchanged();

    let handle = tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            let value = rx.borrow_and_update().clone();
            callback(&value);
        }
    });

    CallbackHandle::new(callback_id, move || {
        handle.abort();
    })
}

/// Run `callback` on every value broadcast on `rx` until the handle is dropped
/// or the sender goes away. Lagged receivers skip ahead.
pub(crate) fn on_broadcast<T, F>(mut rx: broadcast::Receiver<T>, callback: F) -> CallbackHandle
where
    T: Clone + Send + 'static,
    F: Fn(&T) + Send + Sync + 'static,
{
    let callback_id = CALLBACK_COUNTER.fetch_add(1, Ordering::SeqCst);

    let handle = tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(value) => callback(&value),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    CallbackHandle::new(callback_id, move || {
        handle.abort();
    })
}
