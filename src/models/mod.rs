//! Data models for db-scope.
//!
//! This module re-exports all model types used throughout the crate.

pub mod connection;
pub mod query;

// Re-export commonly used types
pub use connection::{DatabaseType, PoolConfig};
pub use query::{
    ColumnMetadata, DEFAULT_QUERY_TIMEOUT_SECS, FetchKind, MAX_QUERY_TIMEOUT_SECS, OutFormat,
    QueryOptions, QueryParam, QueryResult, Statement,
};
