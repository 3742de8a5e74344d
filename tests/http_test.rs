//! Integration tests for the HTTP transport.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use db_scope::models::PoolConfig;
use db_scope::plugin::{App, Host, RegisterOptions};
use db_scope::transport::HttpTransport;
use serde_json::{Value, json};
use tempfile::NamedTempFile;
use tower::ServiceExt;

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

async fn setup() -> (App, HttpTransport) {
    let mut app = App::new();
    let db = app
        .register(RegisterOptions::new().with_pool(PoolConfig::new(temp_db_url())))
        .await
        .unwrap();
    db.query("CREATE TABLE notes (id INTEGER PRIMARY KEY, body TEXT NOT NULL)")
        .await
        .unwrap();
    app.register(
        RegisterOptions::new()
            .with_pool(PoolConfig::new(temp_db_url()))
            .with_name("archive"),
    )
    .await
    .unwrap();

    let transport = HttpTransport::new(app.databases().cloned().unwrap(), "127.0.0.1", 0);
    (app, transport)
}

async fn send(transport: &HttpTransport, request: Request<Body>) -> (StatusCode, Value) {
    let response = transport.router().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_health_lists_databases() {
    let (_app, transport) = setup().await;

    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let (status, body) = send(&transport, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let databases = body["databases"].as_array().unwrap();
    assert_eq!(databases.len(), 2);
    assert_eq!(databases[0]["name"], "default");
    assert_eq!(databases[0]["status"], "open");
    assert_eq!(databases[0]["db_type"], "sqlite");
    assert_eq!(databases[0]["connections_in_use"], 0);
    let size = databases[0]["size"].as_u64().unwrap();
    let idle = databases[0]["idle"].as_u64().unwrap();
    assert!(idle <= size);
    assert_eq!(databases[1]["name"], "archive");
}

#[tokio::test]
async fn test_query_endpoint() {
    let (_app, transport) = setup().await;

    let (status, body) = send(
        &transport,
        post("/query", json!({"sql": "SELECT ? AS FOO", "params": [7]})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["rows"], json!([[7]]));

    let (status, body) = send(
        &transport,
        post(
            "/query",
            json!({"sql": "SELECT 1 AS FOO", "out_format": "object", "database": "archive"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["rows"], json!([{"FOO": 1}]));
}

#[tokio::test]
async fn test_query_endpoint_errors() {
    let (_app, transport) = setup().await;

    let (status, body) = send(
        &transport,
        post("/query", json!({"sql": "SELECT 1", "database": "missing"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("missing"));

    let (status, body) = send(
        &transport,
        post("/query", json!({"sql": "SELECT * FROM missing_table"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().starts_with("Database error"));
}

#[tokio::test]
async fn test_transact_endpoint() {
    let (_app, transport) = setup().await;

    let (status, body) = send(
        &transport,
        post(
            "/transact",
            json!({"statements": [
                {"sql": "INSERT INTO notes (id, body) VALUES (1, 'first')"},
                {"sql": "UPDATE notes SET body = ? WHERE id = 1", "params": ["edited"]}
            ]}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["results"].as_array().unwrap().len(), 2);
    assert_eq!(body["results"][1]["rows_affected"], 1);

    // A failing statement discards the whole batch
    let (status, _) = send(
        &transport,
        post(
            "/transact",
            json!({"statements": [
                {"sql": "INSERT INTO notes (id, body) VALUES (2, 'second')"},
                {"sql": "INSERT INTO notes (id, body) VALUES (1, 'duplicate')"}
            ]}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, body) = send(
        &transport,
        post("/query", json!({"sql": "SELECT id, body FROM notes"})),
    )
    .await;
    assert_eq!(body["rows"], json!([[1, "edited"]]));
}

#[tokio::test]
async fn test_transact_requires_statements() {
    let (_app, transport) = setup().await;

    let (status, _) = send(&transport, post("/transact", json!({"statements": []}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
