//! Callback and signal presentations of scope results.
//!
//! Every scope is a future. [`complete`] drives one to completion on the
//! runtime and hands the outcome to a callback; [`Done`] lets a unit of work
//! report its outcome explicitly instead of returning it.

use crate::error::{DbError, DbResult};
use std::future::Future;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::debug;

/// Spawn `deferred` and invoke `callback` exactly once with its outcome.
///
/// Returns immediately. The handle resolves after the callback has run; it
/// carries no result of its own.
pub fn complete<T, Fut, Cb>(deferred: Fut, callback: Cb) -> JoinHandle<()>
where
    T: Send + 'static,
    Fut: Future<Output = DbResult<T>> + Send + 'static,
    Cb: FnOnce(DbResult<T>) + Send + 'static,
{
    tokio::spawn(async move { callback(deferred.await) })
}

/// Completion signal handed to a signal-style unit of work.
///
/// Signalling consumes the value, so a unit of work reports at most once.
/// Dropping it without signalling fails the scope.
#[derive(Debug)]
pub struct Done<T> {
    tx: oneshot::Sender<DbResult<T>>,
}

impl<T> Done<T> {
    pub(crate) fn channel() -> (Self, Signal<T>) {
        let (tx, rx) = oneshot::channel();
        (Self { tx }, Signal { rx })
    }

    /// Report success with `value`.
    pub fn ok(self, value: T) {
        self.send(Ok(value));
    }

    /// Report failure with `error`.
    pub fn err(self, error: DbError) {
        self.send(Err(error));
    }

    pub fn send(self, outcome: DbResult<T>) {
        if self.tx.send(outcome).is_err() {
            debug!("Completion signalled after its scope was abandoned");
        }
    }
}

/// Receiving side of a [`Done`].
#[derive(Debug)]
pub(crate) struct Signal<T> {
    rx: oneshot::Receiver<DbResult<T>>,
}

impl<T> Signal<T> {
    pub(crate) async fn outcome(self) -> DbResult<T> {
        self.rx.await.unwrap_or_else(|_| {
            Err(DbError::internal(
                "unit of work finished without signalling completion",
            ))
        })
    }
}
