//! A single connection leased from a pool.

use crate::config::DriverSettings;
use crate::db::executor::RunStatement;
use crate::db::macros::impl_db_dispatch;
use crate::error::{DbError, DbResult};
use crate::models::{DatabaseType, QueryResult, Statement};
use sqlx::pool::PoolConnection;
use sqlx::{Connection, Database, MySql, Postgres, Sqlite, TransactionManager};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::{debug, warn};

/// Backend-specific pooled connection.
#[derive(Debug)]
pub(crate) enum Lease {
    MySql(PoolConnection<MySql>),
    Postgres(PoolConnection<Postgres>),
    SQLite(PoolConnection<Sqlite>),
}

impl From<PoolConnection<MySql>> for Lease {
    fn from(conn: PoolConnection<MySql>) -> Self {
        Self::MySql(conn)
    }
}

impl From<PoolConnection<Postgres>> for Lease {
    fn from(conn: PoolConnection<Postgres>) -> Self {
        Self::Postgres(conn)
    }
}

impl From<PoolConnection<Sqlite>> for Lease {
    fn from(conn: PoolConnection<Sqlite>) -> Self {
        Self::SQLite(conn)
    }
}

/// Transaction control through the driver's own transaction manager, the
/// same machinery `sqlx::Transaction` runs on, applied to a held lease.
mod tx {
    use super::*;

    type Manager<DB> = <DB as Database>::TransactionManager;

    pub(super) async fn begin<DB: Database>(conn: &mut PoolConnection<DB>) -> sqlx::Result<()> {
        <Manager<DB> as TransactionManager>::begin(&mut **conn, None).await
    }

    pub(super) async fn commit<DB: Database>(conn: &mut PoolConnection<DB>) -> sqlx::Result<()> {
        <Manager<DB> as TransactionManager>::commit(&mut **conn).await
    }

    pub(super) async fn rollback<DB: Database>(conn: &mut PoolConnection<DB>) -> sqlx::Result<()> {
        <Manager<DB> as TransactionManager>::rollback(&mut **conn).await
    }

    /// Queue a rollback that runs before the session is next used.
    pub(super) fn start_rollback<DB: Database>(conn: &mut PoolConnection<DB>) {
        <Manager<DB> as TransactionManager>::start_rollback(&mut **conn)
    }
}

impl Lease {
    fn in_transaction(&self) -> bool {
        impl_db_dispatch!(self, Lease, |c| c.is_in_transaction())
    }

    async fn begin(&mut self) -> DbResult<()> {
        impl_db_dispatch!(self, Lease, |c| tx::begin(c).await)?;
        Ok(())
    }

    async fn commit(&mut self) -> DbResult<()> {
        impl_db_dispatch!(self, Lease, |c| tx::commit(c).await)?;
        Ok(())
    }

    async fn rollback(&mut self) -> DbResult<()> {
        impl_db_dispatch!(self, Lease, |c| tx::rollback(c).await)?;
        Ok(())
    }

    fn start_rollback(&mut self) {
        impl_db_dispatch!(self, Lease, |c| tx::start_rollback(c))
    }

    /// Close the underlying session instead of returning it to the pool.
    fn discard(&mut self) {
        impl_db_dispatch!(self, Lease, |c| c.close_on_drop())
    }
}

/// Counts a lease against its pool until dropped.
#[derive(Debug)]
pub(crate) struct LeaseCount(Arc<AtomicU32>);

impl LeaseCount {
    pub(crate) fn new(in_use: &Arc<AtomicU32>) -> Self {
        in_use.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(in_use))
    }
}

impl Drop for LeaseCount {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// One exclusive lease of a database session.
///
/// Statements run in autocommit mode until [`begin`](Self::begin) opens an
/// explicit transaction, which only `commit`, `rollback` or `close` end.
/// Once closed, every operation fails with an invalid connection error.
///
/// Dropping the connection with a transaction still open queues a rollback,
/// which the pool flushes before the session is handed out again.
#[derive(Debug)]
pub struct DbConnection {
    lease: Option<(Lease, LeaseCount)>,
    db_type: DatabaseType,
    settings: Arc<DriverSettings>,
}

impl DbConnection {
    pub(crate) fn new(
        lease: Lease,
        count: LeaseCount,
        db_type: DatabaseType,
        settings: Arc<DriverSettings>,
    ) -> Self {
        Self {
            lease: Some((lease, count)),
            db_type,
            settings,
        }
    }

    pub fn db_type(&self) -> DatabaseType {
        self.db_type
    }

    /// False once the connection has been closed.
    pub fn is_open(&self) -> bool {
        self.lease.is_some()
    }

    pub fn in_transaction(&self) -> bool {
        self.lease
            .as_ref()
            .is_some_and(|(lease, _)| lease.in_transaction())
    }

    /// Output settings applied to statements on this connection.
    pub fn settings(&self) -> &DriverSettings {
        &self.settings
    }

    fn lease_mut(&mut self) -> DbResult<&mut Lease> {
        self.lease
            .as_mut()
            .map(|(lease, _)| lease)
            .ok_or_else(|| DbError::invalid_connection("connection was already closed"))
    }

    /// Execute one statement.
    ///
    /// Accepts anything convertible into a [`Statement`]: `"sql"`,
    /// `("sql", binds)`, `("sql", binds, options)` or a built statement.
    pub async fn execute(&mut self, statement: impl Into<Statement>) -> DbResult<QueryResult> {
        let statement = statement.into();
        let options = self.settings.resolve(&statement.options);
        let lease = self.lease_mut()?;
        impl_db_dispatch!(lease, Lease, |c| c.run(&statement, &options).await)
    }

    /// Open an explicit transaction.
    pub async fn begin(&mut self) -> DbResult<()> {
        let lease = self.lease_mut()?;
        if lease.in_transaction() {
            return Err(DbError::invalid_input(
                "a transaction is already open on this connection",
            ));
        }
        lease.begin().await?;
        debug!("Transaction started");
        Ok(())
    }

    /// Commit the open transaction. Without one this succeeds and does nothing.
    ///
    /// A failed commit leaves the transaction open, so a later `close` still
    /// rolls it back.
    pub async fn commit(&mut self) -> DbResult<()> {
        let lease = self.lease_mut()?;
        if !lease.in_transaction() {
            return Ok(());
        }
        lease.commit().await?;
        debug!("Transaction committed");
        Ok(())
    }

    /// Roll back the open transaction. Without one this succeeds and does nothing.
    pub async fn rollback(&mut self) -> DbResult<()> {
        let lease = self.lease_mut()?;
        if !lease.in_transaction() {
            return Ok(());
        }
        lease.rollback().await?;
        debug!("Transaction rolled back");
        Ok(())
    }

    /// Release the session back to its pool.
    ///
    /// An open transaction is rolled back first. If that fails, the session
    /// is discarded instead of being reused and the rollback error returned.
    pub async fn close(&mut self) -> DbResult<()> {
        let Some((mut lease, count)) = self.lease.take() else {
            return Err(DbError::invalid_connection("connection was already closed"));
        };

        if lease.in_transaction() {
            if let Err(e) = lease.rollback().await {
                warn!(error = %e, "Rollback on close failed; discarding session");
                lease.discard();
                return Err(e);
            }
            debug!("Open transaction rolled back on close");
        }

        drop(lease);
        drop(count);
        Ok(())
    }
}

impl Drop for DbConnection {
    fn drop(&mut self) {
        if let Some((lease, _)) = self.lease.as_mut() {
            if lease.in_transaction() {
                warn!("Connection dropped with an open transaction; rolling back");
                lease.start_rollback();
            }
        }
    }
}
