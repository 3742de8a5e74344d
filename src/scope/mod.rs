//! Execution and transactional scopes.
//!
//! A scope leases one connection, runs a unit of work on it and always
//! releases the connection before the outcome is delivered:
//!
//! - [`execute`] runs the work and releases the connection.
//! - [`transact`] opens a transaction, runs the work, commits when it
//!   succeeded, then releases. A failed unit of work is never committed;
//!   releasing the connection rolls it back.
//!
//! Units of work either return their outcome
//! (`|conn| Box::pin(async move { ... })`) or report it through a
//! [`Done`] signal (`|conn, done| Box::pin(async move { ... })`).

pub mod completion;

pub use completion::{Done, complete};

use crate::config::DriverSettings;
use crate::db::{DbConnection, PoolHandle};
use crate::error::DbResult;
use crate::models::{QueryResult, Statement};
use futures_util::future::BoxFuture;
use std::sync::Arc;
use tracing::{debug, warn};

/// A unit of work, independent of how it reports completion.
trait Work<T>: Send {
    fn run<'c>(self, conn: &'c mut DbConnection) -> BoxFuture<'c, DbResult<T>>;
}

/// Work that returns its outcome.
struct Returning<F>(F);

impl<T, F> Work<T> for Returning<F>
where
    F: for<'c> FnOnce(&'c mut DbConnection) -> BoxFuture<'c, DbResult<T>> + Send,
{
    fn run<'c>(self, conn: &'c mut DbConnection) -> BoxFuture<'c, DbResult<T>> {
        (self.0)(conn)
    }
}

/// Work that reports its outcome through a [`Done`].
struct Signalled<F>(F);

impl<T, F> Work<T> for Signalled<F>
where
    T: Send + 'static,
    F: for<'c> FnOnce(&'c mut DbConnection, Done<T>) -> BoxFuture<'c, ()> + Send,
{
    fn run<'c>(self, conn: &'c mut DbConnection) -> BoxFuture<'c, DbResult<T>> {
        let (done, signal) = Done::channel();
        let work = (self.0)(conn, done);
        Box::pin(async move {
            work.await;
            signal.outcome().await
        })
    }
}

/// Run `work` on a leased connection, then release it.
pub async fn execute<T, F>(pool: &PoolHandle, settings: Arc<DriverSettings>, work: F) -> DbResult<T>
where
    T: Send + 'static,
    F: for<'c> FnOnce(&'c mut DbConnection) -> BoxFuture<'c, DbResult<T>> + Send,
{
    run_scope(pool, settings, Returning(work), false).await
}

/// [`execute`] for a unit of work that signals completion through [`Done`].
pub async fn execute_signalled<T, F>(
    pool: &PoolHandle,
    settings: Arc<DriverSettings>,
    work: F,
) -> DbResult<T>
where
    T: Send + 'static,
    F: for<'c> FnOnce(&'c mut DbConnection, Done<T>) -> BoxFuture<'c, ()> + Send,
{
    run_scope(pool, settings, Signalled(work), false).await
}

/// Run `work` inside a transaction on a leased connection.
///
/// The transaction is committed when `work` succeeds; a commit failure
/// replaces the result. The connection is released on every path.
pub async fn transact<T, F>(pool: &PoolHandle, settings: Arc<DriverSettings>, work: F) -> DbResult<T>
where
    T: Send + 'static,
    F: for<'c> FnOnce(&'c mut DbConnection) -> BoxFuture<'c, DbResult<T>> + Send,
{
    run_scope(pool, settings, Returning(work), true).await
}

/// [`transact`] for a unit of work that signals completion through [`Done`].
pub async fn transact_signalled<T, F>(
    pool: &PoolHandle,
    settings: Arc<DriverSettings>,
    work: F,
) -> DbResult<T>
where
    T: Send + 'static,
    F: for<'c> FnOnce(&'c mut DbConnection, Done<T>) -> BoxFuture<'c, ()> + Send,
{
    run_scope(pool, settings, Signalled(work), true).await
}

/// Execute one statement in its own execution scope.
pub async fn query(
    pool: &PoolHandle,
    settings: Arc<DriverSettings>,
    statement: Statement,
) -> DbResult<QueryResult> {
    execute(pool, settings, move |conn| {
        Box::pin(async move { conn.execute(statement).await })
    })
    .await
}

async fn run_scope<T, W>(
    pool: &PoolHandle,
    settings: Arc<DriverSettings>,
    work: W,
    transactional: bool,
) -> DbResult<T>
where
    W: Work<T>,
{
    let mut conn = pool.acquire(settings).await?;

    let outcome = if transactional {
        match conn.begin().await {
            Ok(()) => match work.run(&mut conn).await {
                Ok(value) => conn.commit().await.map(|()| value),
                Err(e) => {
                    debug!(error = %e, "Unit of work failed; not committing");
                    Err(e)
                }
            },
            Err(e) => Err(e),
        }
    } else {
        work.run(&mut conn).await
    };

    release(conn, outcome).await
}

/// Close `conn`, keeping the earliest error.
///
/// A close failure is reported only when nothing failed before it.
async fn release<T>(mut conn: DbConnection, outcome: DbResult<T>) -> DbResult<T> {
    match (conn.close().await, outcome) {
        (Ok(()), outcome) => outcome,
        (Err(close_error), Ok(_)) => Err(close_error),
        (Err(close_error), Err(e)) => {
            warn!(error = %close_error, "Discarding connection close failure after earlier error");
            Err(e)
        }
    }
}
