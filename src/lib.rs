//! db-scope
//!
//! Pooled connection, query and transaction scopes for SQL databases
//! (SQLite, PostgreSQL, MySQL), registered on a host application.
//!
//! Every scope acquires a connection, runs a unit of work on it and releases
//! the connection exactly once, whatever the outcome. Transactional scopes
//! commit only when the work succeeds.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod plugin;
pub mod scope;
pub mod transport;

pub use config::{Config, DriverSettings};
pub use db::{DbConnection, PoolHandle, PoolRegistry};
pub use error::{DbError, DbResult};
pub use models::{OutFormat, QueryOptions, QueryParam, QueryResult, Statement};
pub use plugin::{App, Databases, DbResource, Host, RegisterOptions, register};
pub use scope::{Done, complete};
