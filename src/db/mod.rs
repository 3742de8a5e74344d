//! Database abstraction layer.
//!
//! This module provides database access functionality:
//! - Connection pool handles with drain-aware shutdown
//! - An alias registry for sharing pools between registrations
//! - Leased connections with explicit transaction control
//! - Statement execution and row decoding
//! - Database dispatch macros for reducing code duplication

pub mod connection;
pub mod executor;
pub(crate) mod macros;
pub(crate) mod params;
pub mod pool;
pub mod registry;
pub mod types;

pub use connection::DbConnection;
pub use pool::{DbPool, PoolHandle, PoolStatus};
pub use registry::PoolRegistry;
