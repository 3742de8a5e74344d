//! Host framework integration.

use crate::db::PoolRegistry;
use crate::error::{DbError, DbResult};
use crate::plugin::register::{RegisterOptions, register};
use crate::plugin::resource::{Databases, DbResource};
use futures_util::future::BoxFuture;
use tracing::{info, warn};

/// Teardown action run when the host shuts down.
pub type ShutdownHook = Box<dyn FnOnce() -> BoxFuture<'static, DbResult<()>> + Send>;

/// A framework that database resources are registered on.
pub trait Host {
    /// The installed resource container, if any registration happened.
    fn databases(&self) -> Option<&Databases>;

    fn databases_mut(&mut self) -> Option<&mut Databases>;

    /// Install the resource container. Fails if one is already installed.
    fn decorate(&mut self, databases: Databases) -> DbResult<()>;

    fn add_shutdown_hook(&mut self, hook: ShutdownHook);
}

/// Minimal host: holds registered resources and runs shutdown hooks on
/// [`close`](App::close).
#[derive(Default)]
pub struct App {
    databases: Option<Databases>,
    hooks: Vec<ShutdownHook>,
    registry: PoolRegistry,
}

impl App {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `registry` for pool aliases instead of a private one.
    pub fn with_registry(registry: PoolRegistry) -> Self {
        Self {
            registry,
            ..Self::default()
        }
    }

    pub fn registry(&self) -> &PoolRegistry {
        &self.registry
    }

    /// Register a database resource using this app's pool registry.
    pub async fn register(&mut self, options: RegisterOptions) -> DbResult<DbResource> {
        let registry = self.registry.clone();
        register(self, &registry, options).await
    }

    /// Run every shutdown hook once, in registration order.
    ///
    /// All hooks run even if one fails; the first error is returned.
    pub async fn close(&mut self) -> DbResult<()> {
        let hooks = std::mem::take(&mut self.hooks);
        info!(hooks = hooks.len(), "Running shutdown hooks");

        let mut first_error = None;
        for hook in hooks {
            if let Err(e) = hook().await {
                warn!(error = %e, "Shutdown hook failed");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

impl Host for App {
    fn databases(&self) -> Option<&Databases> {
        self.databases.as_ref()
    }

    fn databases_mut(&mut self) -> Option<&mut Databases> {
        self.databases.as_mut()
    }

    fn decorate(&mut self, databases: Databases) -> DbResult<()> {
        if self.databases.is_some() {
            return Err(DbError::configuration("db-scope has already been registered"));
        }
        self.databases = Some(databases);
        Ok(())
    }

    fn add_shutdown_hook(&mut self, hook: ShutdownHook) {
        self.hooks.push(hook);
    }
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("databases", &self.databases)
            .field("hooks", &self.hooks.len())
            .finish_non_exhaustive()
    }
}
