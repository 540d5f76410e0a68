use axum::response::{IntoResponse, Json, Response};
use serde_json::Value;
use std::time::Instant;
use tracing::{error, info};

use crate::dispatch::dispatcher;
use crate::dispatch::route::RouteTable;
use crate::error::ApiError;

/// Run the dispatch, convert the outcome into the wire response, and emit
/// one completion record with the elapsed wall-clock time. Faults become
/// a generic 500 here; this stage itself never fails the request.
pub async fn respond(
    table: &RouteTable,
    module: &str,
    name: &str,
    authorization: Option<String>,
    payload: Option<Value>,
) -> Response {
    let start = Instant::now();

    let result = match dispatcher::dispatch(table, module, name, authorization, payload).await {
        Ok(result) => result,
        Err(fault) => {
            error!(module = %module, action = %name, error = %fault, "action failed");
            return ApiError::internal_server_error("internal server error").into_response();
        }
    };

    let duration_seconds = start.elapsed().as_secs_f64();
    info!(
        module = %module,
        action = %name,
        duration_seconds,
        "Done {}/{} in {} seconds",
        module,
        name,
        duration_seconds
    );

    (result.status, Json(result.body)).into_response()
}
