//! Registration of database resources on a host.

use crate::config::DriverSettings;
use crate::db::{DbPool, PoolHandle, PoolRegistry};
use crate::error::{DbError, DbResult};
use crate::models::{FetchKind, OutFormat, PoolConfig};
use crate::plugin::host::Host;
use crate::plugin::resource::{Databases, DbResource};
use futures_util::FutureExt;
use sqlx::{MySqlPool, PgPool, SqlitePool};
use std::any::Any;
use std::time::Duration;
use tracing::info;

/// Options accepted by [`register`].
///
/// Exactly one pool source must be set: `pool` (create a fresh pool),
/// `client` (reuse a pool built elsewhere) or `pool_alias` (reuse a pool
/// cached in the [`PoolRegistry`]).
#[derive(Default)]
pub struct RegisterOptions {
    pub pool: Option<PoolConfig>,
    pub client: Option<Box<dyn Any + Send + Sync>>,
    pub pool_alias: Option<String>,
    /// Register under this name instead of as the default resource.
    pub name: Option<String>,
    /// Grace period for leased connections when the pool is closed at shutdown.
    pub drain_time: Option<Duration>,
    pub out_format: Option<OutFormat>,
    pub fetch_as_string: Vec<FetchKind>,
    pub query_timeout: Option<Duration>,
    pub max_rows: Option<u32>,
}

enum PoolSource {
    Create(PoolConfig),
    Client(Box<dyn Any + Send + Sync>),
    Alias(String),
}

impl RegisterOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pool(mut self, pool: PoolConfig) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Reuse an existing pool: a [`PoolHandle`], [`DbPool`], `MySqlPool`,
    /// `PgPool` or `SqlitePool`. Anything else fails registration.
    pub fn with_client(mut self, client: impl Any + Send + Sync) -> Self {
        self.client = Some(Box::new(client));
        self
    }

    pub fn with_pool_alias(mut self, alias: impl Into<String>) -> Self {
        self.pool_alias = Some(alias.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_drain_time(mut self, drain_time: Duration) -> Self {
        self.drain_time = Some(drain_time);
        self
    }

    pub fn with_out_format(mut self, format: OutFormat) -> Self {
        self.out_format = Some(format);
        self
    }

    pub fn with_fetch_as_string(mut self, kinds: Vec<FetchKind>) -> Self {
        self.fetch_as_string = kinds;
        self
    }

    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = Some(timeout);
        self
    }

    pub fn with_max_rows(mut self, max_rows: u32) -> Self {
        self.max_rows = Some(max_rows);
        self
    }

    /// Output settings for the registered resource.
    pub fn settings(&self) -> DriverSettings {
        let defaults = DriverSettings::default();
        DriverSettings {
            out_format: self.out_format.unwrap_or(defaults.out_format),
            fetch_as_string: self.fetch_as_string.clone(),
            query_timeout: self.query_timeout.unwrap_or(defaults.query_timeout),
            max_rows: self.max_rows.filter(|&rows| rows > 0),
        }
    }

    fn take_source(&mut self) -> DbResult<PoolSource> {
        let supplied = [
            self.client.is_some(),
            self.pool_alias.is_some(),
            self.pool.is_some(),
        ]
        .into_iter()
        .filter(|&set| set)
        .count();
        if supplied > 1 {
            return Err(DbError::configuration(
                "supply only one of client, pool_alias or pool",
            ));
        }

        if let Some(client) = self.client.take() {
            Ok(PoolSource::Client(client))
        } else if let Some(alias) = self.pool_alias.take() {
            Ok(PoolSource::Alias(alias))
        } else if let Some(pool) = self.pool.take() {
            Ok(PoolSource::Create(pool))
        } else {
            Err(DbError::configuration("must supply pool options"))
        }
    }
}

impl std::fmt::Debug for RegisterOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisterOptions")
            .field("pool", &self.pool)
            .field("client", &self.client.as_ref().map(|_| "<client>"))
            .field("pool_alias", &self.pool_alias)
            .field("name", &self.name)
            .field("drain_time", &self.drain_time)
            .field("out_format", &self.out_format)
            .field("fetch_as_string", &self.fetch_as_string)
            .field("query_timeout", &self.query_timeout)
            .field("max_rows", &self.max_rows)
            .finish()
    }
}

/// Register a database resource on `host`.
///
/// Resolves the pool from the configured source, binds it to the default
/// slot or to `name`, and adds a shutdown hook that closes the pool with the
/// configured drain time. The first named registration on a host without
/// resources also becomes the default resource.
///
/// Slot conflicts are detected before any pool is created.
pub async fn register<H>(
    host: &mut H,
    registry: &PoolRegistry,
    mut options: RegisterOptions,
) -> DbResult<DbResource>
where
    H: Host + ?Sized,
{
    let source = options.take_source()?;
    check_slot(host.databases(), options.name.as_deref())?;

    let pool = match source {
        PoolSource::Client(client) => pool_from_client(client)?,
        PoolSource::Alias(alias) => registry
            .get_pool(&alias)
            .await
            .ok_or_else(|| DbError::pool_alias_not_found(&alias))?,
        PoolSource::Create(config) => registry.create_pool(config).await?,
    };

    let resource = DbResource::new(options.name.clone(), pool.clone(), options.settings());
    match &options.name {
        Some(name) => {
            if let Some(databases) = host.databases_mut() {
                databases.insert(name.clone(), resource.clone());
            } else {
                let mut databases = Databases::with_primary(resource.clone());
                databases.insert(name.clone(), resource.clone());
                host.decorate(databases)?;
            }
        }
        None => host.decorate(Databases::with_primary(resource.clone()))?,
    }

    let drain = options.drain_time;
    host.add_shutdown_hook(Box::new(move || {
        async move { pool.close(drain).await }.boxed()
    }));

    info!(
        name = options.name.as_deref().unwrap_or("default"),
        db_type = %resource.db_type(),
        alias = ?resource.pool().alias(),
        "Database registered"
    );
    Ok(resource)
}

fn check_slot(databases: Option<&Databases>, name: Option<&str>) -> DbResult<()> {
    match (databases, name) {
        (_, Some("")) => Err(DbError::configuration("connection name cannot be empty")),
        (Some(databases), Some(name)) if databases.contains(name) => Err(DbError::configuration(
            format!("connection name \"{name}\" has already been registered"),
        )),
        (Some(_), None) => Err(DbError::configuration("db-scope has already been registered")),
        _ => Ok(()),
    }
}

fn pool_from_client(client: Box<dyn Any + Send + Sync>) -> DbResult<PoolHandle> {
    let client = match client.downcast::<PoolHandle>() {
        Ok(handle) => return Ok(*handle),
        Err(other) => other,
    };
    let client = match client.downcast::<DbPool>() {
        Ok(pool) => return Ok(PoolHandle::from_pool(*pool, None)),
        Err(other) => other,
    };
    let client = match client.downcast::<MySqlPool>() {
        Ok(pool) => return Ok(PoolHandle::from_pool(*pool, None)),
        Err(other) => other,
    };
    let client = match client.downcast::<PgPool>() {
        Ok(pool) => return Ok(PoolHandle::from_pool(*pool, None)),
        Err(other) => other,
    };
    match client.downcast::<SqlitePool>() {
        Ok(pool) => Ok(PoolHandle::from_pool(*pool, None)),
        Err(_) => Err(DbError::configuration(
            "supplied client must be an instance of a database pool",
        )),
    }
}
