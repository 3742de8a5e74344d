//! Integration tests for registering databases on a host.
//!
//! Tests verify that:
//! - Exactly one pool source is accepted
//! - Default and named slots are filled once
//! - Existing pools can be reused by value or by alias
//! - Shutdown closes pools, waiting for leased connections when asked to

use db_scope::db::{PoolHandle, PoolRegistry, PoolStatus};
use db_scope::error::DbError;
use db_scope::models::PoolConfig;
use db_scope::plugin::{App, Host, RegisterOptions};
use sqlx::SqlitePool;
use std::time::Duration;
use tempfile::NamedTempFile;

fn temp_db_url() -> String {
    let temp_file = NamedTempFile::new().unwrap();
    let db_path = temp_file
        .into_temp_path()
        .keep()
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    format!("sqlite:{}", db_path)
}

fn pool_options() -> RegisterOptions {
    RegisterOptions::new().with_pool(PoolConfig::new(temp_db_url()))
}

#[tokio::test]
async fn test_missing_source_is_rejected() {
    let mut app = App::new();
    let err = app.register(RegisterOptions::new()).await.unwrap_err();
    assert_eq!(err.to_string(), "db-scope: must supply pool options");
    assert!(app.databases().is_none());
}

#[tokio::test]
async fn test_default_registered_once() {
    let mut app = App::new();
    let db = app.register(pool_options()).await.unwrap();
    assert_eq!(db.name(), None);

    let primary = app.databases().and_then(|d| d.primary()).unwrap();
    assert!(primary.pool().same_pool(db.pool()));

    let err = app.register(pool_options()).await.unwrap_err();
    assert_eq!(err.to_string(), "db-scope: db-scope has already been registered");
    app.close().await.unwrap();
}

#[tokio::test]
async fn test_named_registrations() {
    let mut app = App::new();
    app.register(pool_options()).await.unwrap();
    let reports = app
        .register(pool_options().with_name("reports"))
        .await
        .unwrap();
    assert_eq!(reports.name(), Some("reports"));

    let databases = app.databases().unwrap();
    assert!(databases.contains("reports"));
    assert!(!databases.primary().unwrap().pool().same_pool(reports.pool()));

    let err = app
        .register(pool_options().with_name("reports"))
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "db-scope: connection name \"reports\" has already been registered"
    );
    app.close().await.unwrap();
}

#[tokio::test]
async fn test_named_registration_on_empty_host_is_also_default() {
    let mut app = App::new();
    let db = app
        .register(pool_options().with_name("analytics"))
        .await
        .unwrap();

    let databases = app.databases().unwrap();
    assert!(databases.primary().unwrap().pool().same_pool(db.pool()));
    assert!(databases.get("analytics").unwrap().pool().same_pool(db.pool()));
    assert_eq!(databases.names(), vec!["analytics"]);

    // The default slot is taken now
    assert!(app.register(pool_options()).await.is_err());
    app.close().await.unwrap();
}

#[tokio::test]
async fn test_several_sources_are_rejected() {
    let mut app = App::new();
    let err = app
        .register(pool_options().with_pool_alias("shared"))
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::Configuration { .. }));
}

#[tokio::test]
async fn test_existing_client_is_reused() {
    let pool = SqlitePool::connect(&temp_db_url()).await.unwrap();
    let mut app = App::new();
    let db = app
        .register(RegisterOptions::new().with_client(pool.clone()))
        .await
        .unwrap();

    let result = db.query("SELECT 1 AS FOO").await.unwrap();
    assert_eq!(result.rows()[0][0], 1);

    app.close().await.unwrap();
    assert!(pool.is_closed());
}

#[tokio::test]
async fn test_invalid_client_is_rejected() {
    let mut app = App::new();
    let err = app
        .register(RegisterOptions::new().with_client("not a pool".to_string()))
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "db-scope: supplied client must be an instance of a database pool"
    );
}

#[tokio::test]
async fn test_pool_alias_is_shared() {
    let registry = PoolRegistry::new();
    let mut app = App::with_registry(registry.clone());

    let first = app
        .register(RegisterOptions::new().with_pool(PoolConfig::new(temp_db_url()).with_alias("shared")))
        .await
        .unwrap();
    assert_eq!(registry.aliases().await, vec!["shared".to_string()]);

    let second = app
        .register(
            RegisterOptions::new()
                .with_pool_alias("shared")
                .with_name("replica"),
        )
        .await
        .unwrap();
    assert!(first.pool().same_pool(second.pool()));
    assert_eq!(second.pool().alias(), Some("shared"));

    app.close().await.unwrap();
    assert_eq!(first.pool().status(), PoolStatus::Closed);
}

#[tokio::test]
async fn test_unknown_pool_alias() {
    let mut app = App::new();
    let err = app
        .register(RegisterOptions::new().with_pool_alias("nope"))
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::PoolAliasNotFound { .. }));
    assert_eq!(err.to_string(), "db-scope: could not get pool alias 'nope'");
}

#[tokio::test]
async fn test_shutdown_closes_pool() {
    let mut app = App::new();
    let db = app.register(pool_options()).await.unwrap();
    assert_eq!(db.pool().status(), PoolStatus::Open);

    app.close().await.unwrap();
    assert_eq!(db.pool().status(), PoolStatus::Closed);

    let err = db.query("SELECT 1").await.unwrap_err();
    assert!(matches!(err, DbError::Connection { .. }));
}

#[tokio::test]
async fn test_shutdown_with_drain_time_forces_close() {
    let mut app = App::new();
    let db = app
        .register(pool_options().with_drain_time(Duration::from_millis(100)))
        .await
        .unwrap();

    let conn = db.get_connection().await.unwrap();
    app.close().await.unwrap();
    assert_eq!(db.pool().status(), PoolStatus::Closed);
    drop(conn);
}

#[tokio::test]
async fn test_shutdown_without_drain_time_reports_busy() {
    let mut app = App::new();
    let db = app.register(pool_options()).await.unwrap();

    let mut conn = db.get_connection().await.unwrap();
    let err = app.close().await.unwrap_err();
    assert!(matches!(err, DbError::PoolBusy { in_use: 1 }));
    assert_eq!(db.pool().status(), PoolStatus::Open);

    conn.close().await.unwrap();
    db.pool().close(None).await.unwrap();
    assert_eq!(db.pool().status(), PoolStatus::Closed);
}

#[tokio::test]
async fn test_pool_handle_as_client() {
    let handle = PoolHandle::create(&PoolConfig::new(temp_db_url()))
        .await
        .unwrap();
    let mut app = App::new();
    let db = app
        .register(RegisterOptions::new().with_client(handle.clone()))
        .await
        .unwrap();
    assert!(db.pool().same_pool(&handle));
    app.close().await.unwrap();
}
