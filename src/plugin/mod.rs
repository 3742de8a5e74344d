//! Registration of pooled database resources on a host framework.
//!
//! [`register`] resolves a pool from exactly one source, binds it to the
//! host's default slot or a named slot, and wires a shutdown hook that closes
//! the pool. [`App`] is a ready-made [`Host`].

pub mod host;
pub mod register;
pub mod resource;

pub use host::{App, Host, ShutdownHook};
pub use register::{RegisterOptions, register};
pub use resource::{Databases, DbResource};
