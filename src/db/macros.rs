//! Database dispatch macros for reducing code duplication.
//!
//! Pools and leased connections both come as one enum variant per backend.
//! The macro below expands the same expression once per variant, with the
//! inner value bound to a caller-chosen identifier.

/// Expand `$body` for every backend variant of `$enum`.
///
/// ```ignore
/// impl_db_dispatch!(self, DbPool, |p| p.size())
/// impl_db_dispatch!(&mut lease, Lease, |c| c.run(&statement, &options).await)
/// ```
macro_rules! impl_db_dispatch {
    ($value:expr, $enum:ident, |$p:ident| $body:expr) => {
        match $value {
            $enum::MySql($p) => $body,
            $enum::Postgres($p) => $body,
            $enum::SQLite($p) => $body,
        }
    };
}

pub(crate) use impl_db_dispatch;
