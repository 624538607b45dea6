//! Cancellation state shared between a call's worker and its canceler.

use crate::transport::AbortHandle;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, ThreadId};

/// Cancellation token for one call.
///
/// The canceled flag is recorded before the attached connection is aborted,
/// so an executor that sees an I/O failure can tell a cancellation from a
/// network error by checking the token.
#[derive(Default)]
pub struct CancelToken {
    canceled: AtomicBool,
    connection: Mutex<Option<AbortHandle>>,
    worker: Mutex<Option<ThreadId>>,
    finished: Mutex<bool>,
    finished_cv: Condvar,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::Acquire)
    }

    /// Trips the token and aborts the attached connection, if any.
    ///
    /// Returns `true` for the first call only.
    pub fn cancel(&self) -> bool {
        let connection = self.connection.lock();
        let first = !self.canceled.swap(true, Ordering::AcqRel);
        if let Some(handle) = connection.as_ref() {
            handle.abort();
        }
        first
    }

    /// Attaches the call's connection.
    ///
    /// If the token was already tripped the connection is aborted right away
    /// and `false` is returned.
    pub(crate) fn attach(&self, handle: AbortHandle) -> bool {
        let mut connection = self.connection.lock();
        if self.is_canceled() {
            drop(connection);
            handle.abort();
            return false;
        }
        *connection = Some(handle);
        true
    }

    pub(crate) fn detach(&self) {
        self.connection.lock().take();
    }

    /// Records the current thread as the call's worker.
    pub(crate) fn bind_worker(&self) {
        *self.worker.lock() = Some(thread::current().id());
    }

    pub(crate) fn finish(&self) {
        let mut finished = self.finished.lock();
        *finished = true;
        self.finished_cv.notify_all();
    }

    pub fn is_finished(&self) -> bool {
        *self.finished.lock()
    }

    /// Blocks until the worker has terminated.
    ///
    /// Returns immediately when called from the worker itself.
    pub fn wait(&self) {
        if *self.worker.lock() == Some(thread::current().id()) {
            return;
        }
        let mut finished = self.finished.lock();
        while !*finished {
            self.finished_cv.wait(&mut finished);
        }
    }
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken")
            .field("canceled", &self.is_canceled())
            .field("finished", &self.is_finished())
            .finish()
    }
}

/// Marks the token finished when the worker exits, including by panic.
pub(crate) struct FinishGuard<'a>(pub(crate) &'a CancelToken);

impl Drop for FinishGuard<'_> {
    fn drop(&mut self) {
        self.0.finish();
    }
}
