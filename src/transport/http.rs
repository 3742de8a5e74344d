//! HTTP transport for registered databases.
//!
//! Endpoints:
//! - `GET /health`: pool status of every registered database
//! - `POST /query`: one statement in its own execution scope
//! - `POST /transact`: several statements in one transactional scope

use crate::error::{DbError, DbResult};
use crate::models::{QueryOptions, QueryParam, QueryResult, Statement};
use crate::plugin::{Databases, DbResource};
use crate::transport::Transport;
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};

/// Body of `POST /query`.
#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    /// Named database; the default one when omitted.
    #[serde(default)]
    pub database: Option<String>,
    pub sql: String,
    #[serde(default, alias = "binds")]
    pub params: Vec<QueryParam>,
    #[serde(flatten)]
    pub options: QueryOptions,
}

/// One statement of a `POST /transact` body.
#[derive(Debug, Deserialize)]
pub struct TransactStatement {
    pub sql: String,
    #[serde(default, alias = "binds")]
    pub params: Vec<QueryParam>,
}

/// Body of `POST /transact`.
#[derive(Debug, Deserialize)]
pub struct TransactRequest {
    #[serde(default)]
    pub database: Option<String>,
    pub statements: Vec<TransactStatement>,
}

#[derive(Debug, Serialize)]
pub struct TransactResponse {
    pub results: Vec<QueryResult>,
}

/// HTTP transport implementation.
pub struct HttpTransport {
    databases: Databases,
    /// Host to bind to
    host: String,
    /// Port to bind to
    port: u16,
}

impl HttpTransport {
    pub fn new(databases: Databases, host: impl Into<String>, port: u16) -> Self {
        Self {
            databases,
            host: host.into(),
            port,
        }
    }

    /// Get the bind address.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Build the router serving the registered databases.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/health", get(health))
            .route("/query", post(query))
            .route("/transact", post(transact))
            .with_state(self.databases.clone())
    }
}

impl Transport for HttpTransport {
    async fn run(&self) -> DbResult<()> {
        let bind_addr = self.bind_addr();
        info!("Starting HTTP transport on {}", bind_addr);

        let listener = TcpListener::bind(&bind_addr).await.map_err(|e| {
            DbError::connection(
                format!("Failed to bind to {}: {}", bind_addr, e),
                "Check that the port is available",
            )
        })?;

        axum::serve(listener, self.router())
            .with_graceful_shutdown(wait_for_signal())
            .await
            .map_err(|e| {
                error!(error = %e, "HTTP server error");
                DbError::internal(format!("HTTP server error: {}", e))
            })?;

        info!("HTTP server stopped");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

fn health_entry(resource: &DbResource, name: &str) -> JsonValue {
    let pool = resource.pool();
    json!({
        "name": name,
        "db_type": resource.db_type(),
        "status": pool.status(),
        "connections_in_use": pool.connections_in_use(),
        "size": pool.pool().size(),
        "idle": pool.pool().num_idle(),
        "alias": pool.alias(),
        "opened_at": pool.opened_at().to_rfc3339(),
    })
}

async fn health(State(databases): State<Databases>) -> Json<JsonValue> {
    let mut entries: Vec<JsonValue> = databases
        .primary()
        .map(|resource| health_entry(resource, "default"))
        .into_iter()
        .collect();
    for name in databases.names() {
        if let Some(resource) = databases.get(name) {
            entries.push(health_entry(resource, name));
        }
    }
    Json(json!({ "status": "ok", "databases": entries }))
}

async fn query(
    State(databases): State<Databases>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<QueryResult>, DbError> {
    let resource = databases.resolve(request.database.as_deref())?.clone();
    let statement = Statement::new(request.sql)
        .with_binds(request.params)
        .with_options(request.options);
    Ok(Json(resource.query(statement).await?))
}

async fn transact(
    State(databases): State<Databases>,
    Json(request): Json<TransactRequest>,
) -> Result<Json<TransactResponse>, DbError> {
    if request.statements.is_empty() {
        return Err(DbError::invalid_input("statements cannot be empty"));
    }
    let resource = databases.resolve(request.database.as_deref())?.clone();
    let statements = request.statements;

    let results = resource
        .transact(move |conn| {
            Box::pin(async move {
                let mut results = Vec::with_capacity(statements.len());
                for statement in statements {
                    results.push(conn.execute((statement.sql, statement.params)).await?);
                }
                Ok(results)
            })
        })
        .await?;
    Ok(Json(TransactResponse { results }))
}

/// Wait for a shutdown signal (SIGINT or SIGTERM).
async fn wait_for_signal() {
    let ctrl_c = signal::ctrl_c();

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
