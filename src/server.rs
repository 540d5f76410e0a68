//! HTTP surface: one POST endpoint pattern per module, plus root and
//! health. The module registry is built during startup and handed in as
//! immutable state.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::database::DatastoreProvider;
use crate::dispatch::{response, Registry};
use crate::error::ApiError;

pub fn app(registry: Arc<Registry>) -> Router {
    Router::new()
        // Public
        .route("/", get(root))
        .route("/health", get(health))
        // Action dispatch: empty action name routes to the module default
        .route("/:module", post(action_default))
        .route("/:module/", post(action_default))
        .route("/:module/:name", post(action_named))
        // Global middleware
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(registry)
}

async fn action_default(
    State(registry): State<Arc<Registry>>,
    Path(module): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    run_action(registry, module, String::new(), headers, body).await
}

async fn action_named(
    State(registry): State<Arc<Registry>>,
    Path((module, name)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    run_action(registry, module, name, headers, body).await
}

async fn run_action(
    registry: Arc<Registry>,
    module: String,
    name: String,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(table) = registry.module(&module) else {
        return ApiError::not_found(format!("unknown module: {}", module)).into_response();
    };

    let payload = match parse_payload(&headers, &body) {
        Ok(payload) => payload,
        Err(err) => return err.into_response(),
    };

    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    response::respond(table, &module, &name, authorization, payload).await
}

/// The body is treated as keyword arguments only when the request
/// declares a JSON content type; anything else dispatches without a
/// payload. A declared-JSON body that does not parse is a 400.
fn parse_payload(headers: &HeaderMap, body: &Bytes) -> Result<Option<Value>, ApiError> {
    if body.is_empty() {
        return Ok(None);
    }
    let is_json = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.contains("json"))
        .unwrap_or(false);
    if !is_json {
        return Ok(None);
    }
    serde_json::from_slice(body)
        .map(Some)
        .map_err(|e| ApiError::invalid_json(format!("invalid JSON body: {}", e)))
}

async fn root(State(registry): State<Arc<Registry>>) -> Json<Value> {
    let version = env!("CARGO_PKG_VERSION");

    let mut modules = serde_json::Map::new();
    for (name, table) in registry.modules() {
        let mut actions: Vec<&str> = table.names().collect();
        actions.sort_unstable();
        modules.insert(name.to_string(), json!(actions));
    }

    Json(json!({
        "name": "dbapi (Rust)",
        "version": version,
        "description": "Bearer-authenticated action gateway over Postgres",
        "endpoints": {
            "home": "/ (public)",
            "health": "/health (public)",
            "actions": "POST /:module[/:action] (bearer token required)",
        },
        "modules": modules,
    }))
}

async fn health() -> impl IntoResponse {
    let now = chrono::Utc::now();

    match DatastoreProvider::health_check().await {
        Ok(_) => (
            StatusCode::OK,
            Json(json!({
                "status": "ok",
                "timestamp": now,
                "database": "ok"
            })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "degraded",
                "timestamp": now,
                "database_error": e.to_string()
            })),
        ),
    }
}
