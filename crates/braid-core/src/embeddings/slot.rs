//! Process-wide model handles
//!
//! Loading an ONNX model costs seconds and hundreds of megabytes, so each
//! model lives in one static slot shared by every caller. The first caller
//! initializes it under the slot lock; everyone else gets a clone of the
//! same `Arc`. `reset` drops the handle so tests can start clean.

use std::sync::{Arc, Mutex};

/// A lazily initialized, resettable singleton
pub struct ModelSlot<T> {
    inner: Mutex<Option<Arc<T>>>,
}

impl<T> Default for ModelSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ModelSlot<T> {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(None),
        }
    }

    /// Return the loaded handle, initializing it on first use.
    ///
    /// A failed initialization leaves the slot empty; the next caller retries.
    pub fn get_or_try_init<E, F>(&self, init: F) -> Result<Arc<T>, E>
    where
        F: FnOnce() -> Result<T, E>,
    {
        let mut guard = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(existing) = guard.as_ref() {
            return Ok(Arc::clone(existing));
        }
        let loaded = Arc::new(init()?);
        *guard = Some(Arc::clone(&loaded));
        Ok(loaded)
    }

    /// The loaded handle, if any
    pub fn get(&self) -> Option<Arc<T>> {
        self.inner
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .as_ref()
            .map(Arc::clone)
    }

    pub fn is_initialized(&self) -> bool {
        self.get().is_some()
    }

    /// Drop the slot's handle. Outstanding clones stay valid until dropped.
    ///
    /// Returns whether a handle was loaded.
    pub fn reset(&self) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take()
            .is_some()
    }
}
