//! Registered database resources.

use crate::config::DriverSettings;
use crate::db::{DbConnection, PoolHandle};
use crate::error::{DbError, DbResult};
use crate::models::{DatabaseType, QueryResult, Statement};
use crate::scope::{self, Done, complete};
use futures_util::future::BoxFuture;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// A pool bound to a registration slot, with its own output settings.
///
/// Clones share the pool and settings.
#[derive(Debug, Clone)]
pub struct DbResource {
    name: Option<String>,
    pool: PoolHandle,
    settings: Arc<DriverSettings>,
}

impl DbResource {
    pub fn new(name: Option<String>, pool: PoolHandle, settings: DriverSettings) -> Self {
        Self {
            name,
            pool,
            settings: Arc::new(settings),
        }
    }

    /// Registration name; `None` for the default resource.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn pool(&self) -> &PoolHandle {
        &self.pool
    }

    pub fn settings(&self) -> &DriverSettings {
        &self.settings
    }

    pub fn db_type(&self) -> DatabaseType {
        self.pool.db_type()
    }

    /// Lease a connection. The caller must close it.
    pub async fn get_connection(&self) -> DbResult<DbConnection> {
        self.pool.acquire(Arc::clone(&self.settings)).await
    }

    /// Execute one statement on its own connection.
    pub async fn query(&self, statement: impl Into<Statement>) -> DbResult<QueryResult> {
        scope::query(&self.pool, Arc::clone(&self.settings), statement.into()).await
    }

    /// [`query`](Self::query), reporting through `callback`.
    pub fn query_then<Cb>(&self, statement: impl Into<Statement>, callback: Cb) -> JoinHandle<()>
    where
        Cb: FnOnce(DbResult<QueryResult>) + Send + 'static,
    {
        let (pool, settings) = self.parts();
        let statement = statement.into();
        complete(
            async move { scope::query(&pool, settings, statement).await },
            callback,
        )
    }

    /// Run `work` in a transaction that is committed if it succeeds.
    pub async fn transact<T, F>(&self, work: F) -> DbResult<T>
    where
        T: Send + 'static,
        F: for<'c> FnOnce(&'c mut DbConnection) -> BoxFuture<'c, DbResult<T>> + Send,
    {
        scope::transact(&self.pool, Arc::clone(&self.settings), work).await
    }

    /// [`transact`](Self::transact), reporting through `callback`.
    pub fn transact_then<T, F, Cb>(&self, work: F, callback: Cb) -> JoinHandle<()>
    where
        T: Send + 'static,
        F: for<'c> FnOnce(&'c mut DbConnection) -> BoxFuture<'c, DbResult<T>> + Send + 'static,
        Cb: FnOnce(DbResult<T>) + Send + 'static,
    {
        let (pool, settings) = self.parts();
        complete(
            async move { scope::transact(&pool, settings, work).await },
            callback,
        )
    }

    /// [`transact`](Self::transact) for work that signals through [`Done`].
    pub async fn transact_signalled<T, F>(&self, work: F) -> DbResult<T>
    where
        T: Send + 'static,
        F: for<'c> FnOnce(&'c mut DbConnection, Done<T>) -> BoxFuture<'c, ()> + Send,
    {
        scope::transact_signalled(&self.pool, Arc::clone(&self.settings), work).await
    }

    /// [`transact_signalled`](Self::transact_signalled), reporting through
    /// `callback`.
    pub fn transact_signalled_then<T, F, Cb>(&self, work: F, callback: Cb) -> JoinHandle<()>
    where
        T: Send + 'static,
        F: for<'c> FnOnce(&'c mut DbConnection, Done<T>) -> BoxFuture<'c, ()> + Send + 'static,
        Cb: FnOnce(DbResult<T>) + Send + 'static,
    {
        let (pool, settings) = self.parts();
        complete(
            async move { scope::transact_signalled(&pool, settings, work).await },
            callback,
        )
    }

    /// Run `work` on a connection that is released afterwards, without a
    /// transaction.
    pub async fn scope<T, F>(&self, work: F) -> DbResult<T>
    where
        T: Send + 'static,
        F: for<'c> FnOnce(&'c mut DbConnection) -> BoxFuture<'c, DbResult<T>> + Send,
    {
        scope::execute(&self.pool, Arc::clone(&self.settings), work).await
    }

    /// [`scope`](Self::scope), reporting through `callback`.
    pub fn scope_then<T, F, Cb>(&self, work: F, callback: Cb) -> JoinHandle<()>
    where
        T: Send + 'static,
        F: for<'c> FnOnce(&'c mut DbConnection) -> BoxFuture<'c, DbResult<T>> + Send + 'static,
        Cb: FnOnce(DbResult<T>) + Send + 'static,
    {
        let (pool, settings) = self.parts();
        complete(
            async move { scope::execute(&pool, settings, work).await },
            callback,
        )
    }

    /// [`scope`](Self::scope) for work that signals through [`Done`].
    pub async fn scope_signalled<T, F>(&self, work: F) -> DbResult<T>
    where
        T: Send + 'static,
        F: for<'c> FnOnce(&'c mut DbConnection, Done<T>) -> BoxFuture<'c, ()> + Send,
    {
        scope::execute_signalled(&self.pool, Arc::clone(&self.settings), work).await
    }

    /// [`scope_signalled`](Self::scope_signalled), reporting through `callback`.
    pub fn scope_signalled_then<T, F, Cb>(&self, work: F, callback: Cb) -> JoinHandle<()>
    where
        T: Send + 'static,
        F: for<'c> FnOnce(&'c mut DbConnection, Done<T>) -> BoxFuture<'c, ()> + Send + 'static,
        Cb: FnOnce(DbResult<T>) + Send + 'static,
    {
        let (pool, settings) = self.parts();
        complete(
            async move { scope::execute_signalled(&pool, settings, work).await },
            callback,
        )
    }

    fn parts(&self) -> (PoolHandle, Arc<DriverSettings>) {
        (self.pool.clone(), Arc::clone(&self.settings))
    }
}

/// Resources registered on a host: the default one plus named ones.
#[derive(Debug, Clone, Default)]
pub struct Databases {
    primary: Option<DbResource>,
    named: HashMap<String, DbResource>,
}

impl Databases {
    pub(crate) fn with_primary(resource: DbResource) -> Self {
        Self {
            primary: Some(resource),
            named: HashMap::new(),
        }
    }

    pub(crate) fn insert(&mut self, name: String, resource: DbResource) {
        self.named.insert(name, resource);
    }

    /// The default resource.
    pub fn primary(&self) -> Option<&DbResource> {
        self.primary.as_ref()
    }

    pub fn get(&self, name: &str) -> Option<&DbResource> {
        self.named.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.named.contains_key(name)
    }

    /// Look up a named resource, or the default one when `name` is `None`.
    pub fn resolve(&self, name: Option<&str>) -> DbResult<&DbResource> {
        match name {
            Some(name) => self.get(name).ok_or_else(|| {
                DbError::invalid_input(format!("no database registered under '{name}'"))
            }),
            None => self
                .primary()
                .ok_or_else(|| DbError::invalid_input("no default database registered")),
        }
    }

    /// Names of the named resources, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.named.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Every slot, default first. A resource that is both the default and
    /// named appears twice.
    pub fn iter(&self) -> impl Iterator<Item = &DbResource> {
        self.primary.iter().chain(self.named.values())
    }
}
