//! HTTP server startup
//!
//! Builds the shared state once, then serves every endpoint from one axum
//! router. Handlers reach the pipelines through `AppState`.

use tracing::info;

use crate::{config::Config, shared_state::AppState};

/// Run the HTTP server until it fails or the process exits
pub async fn run_server(cfg: Config) -> anyhow::Result<()> {
    crate::telemetry::init_tracing();
    crate::metrics::init_metrics();
    cfg.print_config();

    let addr = cfg.api_addr()?;
    let state = AppState::from_config(cfg)?;

    info!("Starting HTTP server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    let app = build_router(state);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Router with every endpoint plus CORS, tracing and a request timeout
pub fn build_router(state: AppState) -> axum::Router {
    use axum::{
        routing::{delete, get, post},
        Router,
    };
    use std::time::Duration;
    use tower_http::{
        cors::{Any, CorsLayer},
        timeout::TimeoutLayer,
        trace::TraceLayer,
    };

    use crate::api::{database_api, events_api, nl_to_sql_api, query_api, schema_api};

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::PUT,
            axum::http::Method::DELETE,
        ])
        .allow_headers(Any);

    Router::new()
        // Pipelines
        .route("/nl-to-sql/convert", post(nl_to_sql_api::convert))
        .route("/query-execution/execute", post(query_api::execute))
        .route(
            "/query-execution/test-connection/:database_id",
            get(query_api::test_connection),
        )
        // Schema index
        .route("/schema-embeddings/index", post(schema_api::index_schema))
        .route("/schema-embeddings/search", post(schema_api::search_schemas))
        .route(
            "/schema-embeddings/database/:database_id",
            get(schema_api::list_schemas),
        )
        .route("/schema-embeddings/:id", delete(schema_api::delete_schema))
        // Profile registry
        .route(
            "/databases",
            get(database_api::list_databases).post(database_api::create_database),
        )
        .route(
            "/databases/:id",
            get(database_api::get_database)
                .put(database_api::update_database)
                .delete(database_api::delete_database),
        )
        // Progress streams
        .route("/events/nl-to-sql", get(events_api::nl_to_sql_events))
        .route("/events/query-execution", get(events_api::query_execution_events))
        .route("/healthz", get(|| async { "OK" }))
        .route("/metrics", get(crate::metrics::get_metrics))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(600)))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;
    use crate::llm_client::fakes::{KeywordEmbedder, ScriptedGenerator};
    use crate::schema_index::{InMemoryProfileRepository, InMemorySchemaIndex};
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn state(reply: &str) -> AppState {
        AppState::assemble(
            test_config(),
            Arc::new(KeywordEmbedder),
            Arc::new(ScriptedGenerator::replying(reply)),
            Arc::new(InMemorySchemaIndex::new()),
            Arc::new(InMemoryProfileRepository::new()),
        )
    }

    async fn send(app: &axum::Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(match body {
                Some(body) => Body::from(body.to_string()),
                None => Body::empty(),
            })
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    async fn register(app: &axum::Router) -> i64 {
        let (status, body) = send(
            app,
            "POST",
            "/databases",
            Some(json!({
                "name": "shop",
                "databaseType": "postgres",
                "host": "localhost",
                "port": 5432,
                "databaseName": "shop",
                "username": "reader",
                "password": "secret"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        body["id"].as_i64().unwrap()
    }

    // ===== Health =====

    #[tokio::test]
    async fn test_healthz() {
        let app = build_router(state("SELECT 1"));
        let request = Request::builder().uri("/healthz").body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    // ===== Profile Registry =====

    #[tokio::test]
    async fn test_profile_password_is_never_returned() {
        let app = build_router(state("SELECT 1"));
        let id = register(&app).await;

        let (status, body) = send(&app, "GET", &format!("/databases/{}", id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["hasPassword"], true);
        assert!(body.get("password").is_none());
        assert_eq!(body["dialect"], "postgres");
    }

    #[tokio::test]
    async fn test_duplicate_profile_name_rejected() {
        let app = build_router(state("SELECT 1"));
        register(&app).await;
        let (status, body) = send(
            &app,
            "POST",
            "/databases",
            Some(json!({"name": "shop", "dialect": "mysql", "database": "other"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("already exists"));
    }

    // ===== Pipelines =====

    #[tokio::test]
    async fn test_convert_unknown_database_is_not_found() {
        let app = build_router(state("SELECT 1"));
        let (status, body) = send(
            &app,
            "POST",
            "/nl-to-sql/convert",
            Some(json!({"databaseId": 77, "naturalLanguageQuery": "orders", "clientRequestId": "abc"})),
        )
        .await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["requestId"], "abc");
        assert_eq!(body["isValid"], false);
        assert_eq!(body["validationErrors"][0], "Error: Database not found with ID: 77");
    }

    #[tokio::test]
    async fn test_index_then_convert() {
        let app = build_router(state("SELECT * FROM orders;"));
        let id = register(&app).await;

        let (status, indexed) = send(
            &app,
            "POST",
            "/schema-embeddings/index",
            Some(json!({
                "databaseId": id,
                "schemaName": "orders",
                "schemaDescription": "orders table with id, customer_id, total"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(indexed["name"], "orders");
        assert!(indexed.get("vector").is_none());

        let (status, body) = send(
            &app,
            "POST",
            "/nl-to-sql/convert",
            Some(json!({"databaseId": id, "naturalLanguageQuery": "show me all orders"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["sqlQuery"], "SELECT * FROM orders;");
        assert_eq!(body["isValid"], true);
        assert_eq!(body["relevantSchemas"][0]["schemaName"], "orders");
    }

    #[tokio::test]
    async fn test_execute_rejected_sql_is_bad_request() {
        let app = build_router(state("SELECT 1"));
        let id = register(&app).await;

        let (status, body) = send(
            &app,
            "POST",
            "/query-execution/execute",
            Some(json!({"databaseId": id, "sqlQuery": "DROP TABLE orders"})),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert_eq!(body["sqlQuery"], "DROP TABLE orders");
        assert!(body["errorMessage"].as_str().unwrap().starts_with("SQL validation failed"));
    }

    // ===== SQLite Data Directory =====

    #[tokio::test]
    async fn test_sqlite_profiles_confined_to_data_dir() {
        let dir = tempfile::TempDir::new().unwrap();
        rusqlite::Connection::open(dir.path().join("shop.db"))
            .unwrap()
            .execute_batch("CREATE TABLE orders (id INTEGER); INSERT INTO orders VALUES (1);")
            .unwrap();
        let index_path = dir.path().join("index.db");
        crate::schema_index::IndexDatabase::new(&index_path).unwrap();

        let mut config = test_config();
        config.index_db_path = index_path.clone();
        config.sqlite_data_dir = Some(dir.path().to_path_buf());
        let app = build_router(AppState::assemble(
            config,
            Arc::new(KeywordEmbedder),
            Arc::new(ScriptedGenerator::replying("SELECT 1")),
            Arc::new(InMemorySchemaIndex::new()),
            Arc::new(InMemoryProfileRepository::new()),
        ));

        let mut ids = Vec::new();
        for (name, database) in [("shop", "shop.db"), ("index", index_path.to_str().unwrap())] {
            let (status, body) = send(
                &app,
                "POST",
                "/databases",
                Some(json!({"name": name, "dialect": "sqlite", "database": database})),
            )
            .await;
            assert_eq!(status, StatusCode::CREATED);
            ids.push(body["id"].as_i64().unwrap());
        }

        let (status, body) = send(
            &app,
            "POST",
            "/query-execution/execute",
            Some(json!({"databaseId": ids[0], "sqlQuery": "SELECT id FROM orders"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["rowCount"], 1);

        let (status, body) = send(
            &app,
            "POST",
            "/query-execution/execute",
            Some(json!({"databaseId": ids[1], "sqlQuery": "SELECT name, password FROM database_profiles"})),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["success"], false);
        assert!(body["errorMessage"]
            .as_str()
            .unwrap()
            .contains("outside the permitted data directory"));
    }

    #[tokio::test]
    async fn test_sqlite_disabled_without_data_dir() {
        let app = build_router(state("SELECT 1"));
        let (_, created) = send(
            &app,
            "POST",
            "/databases",
            Some(json!({"name": "local", "dialect": "sqlite", "database": "/tmp/local.db"})),
        )
        .await;

        let (status, body) = send(
            &app,
            "POST",
            "/query-execution/execute",
            Some(json!({"databaseId": created["id"], "sqlQuery": "SELECT 1"})),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["errorMessage"], "Unsupported database type: sqlite");
    }
}
