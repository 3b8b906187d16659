//! Cooperative cancellation shared by the worker threads of a source.
//!
//! Every blocking loop polls with a short socket timeout and checks the
//! token between polls. Cancelling also shuts down the read half of the
//! attached control socket so a blocked read returns at once.

use std::net::{Shutdown, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::error::{Result, SourceError};

/// Read timeout applied to every socket; bounds how long a blocked call
/// can delay noticing cancellation.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Default)]
struct Inner {
    cancelled: AtomicBool,
    socket: Mutex<Option<TcpStream>>,
    lock: Mutex<()>,
    wakeup: Condvar,
}

#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);

        if let Some(socket) = self.inner.socket.lock().as_ref() {
            let _ = socket.shutdown(Shutdown::Read);
        }

        let _guard = self.inner.lock.lock();
        self.inner.wakeup.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// `Err(Cancelled)` once cancelled.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(SourceError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Replace an error by `Cancelled` if it was caused by cancellation.
    pub fn filter(&self, err: SourceError) -> SourceError {
        if self.is_cancelled() {
            SourceError::Cancelled
        } else {
            err
        }
    }

    /// Register the control socket to interrupt on cancel.
    pub fn attach(&self, socket: &TcpStream) {
        match socket.try_clone() {
            Ok(clone) => {
                if self.is_cancelled() {
                    let _ = clone.shutdown(Shutdown::Read);
                }
                *self.inner.socket.lock() = Some(clone);
            }
            Err(e) => tracing::debug!(error = %e, "cannot clone socket for cancellation"),
        }
    }

    pub fn detach(&self) {
        self.inner.socket.lock().take();
    }

    /// Sleep for `duration` or until cancelled. Returns `true` if cancelled.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        let mut guard = self.inner.lock.lock();
        while !self.is_cancelled() {
            if self.inner.wakeup.wait_until(&mut guard, deadline).timed_out() {
                break;
            }
        }
        self.is_cancelled()
    }
}
