use axum::http::StatusCode;
use serde_json::{json, Value};
use tracing::error;

use crate::dispatch::route::{ActionContext, RouteTable};
use crate::dispatch::ActionError;
use crate::schema::FieldError;

/// Normalized `(status, body)` outcome of one action invocation. Produced
/// exactly once per dispatch, on success and on every expected failure.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchResult {
    pub status: StatusCode,
    pub body: Value,
}

impl DispatchResult {
    fn completed(body: Value) -> Self {
        Self {
            status: StatusCode::OK,
            body,
        }
    }

    fn unauthorized() -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            body: json!("unauthorized"),
        }
    }

    fn validation_failed(errors: Vec<FieldError>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            body: json!(errors),
        }
    }

    fn route_not_found() -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            body: json!("route not found"),
        }
    }
}

/// Resolve `name` in the table and run the compiled pipeline.
///
/// Recoverable failures (unauthorized, invalid payload, unknown route)
/// come back as `Ok` carrying their status and body. Faults (datastore
/// unreachable, failed transaction, handler bugs) propagate as `Err` for
/// the HTTP boundary to convert into a generic server error. No retries
/// happen at this layer.
pub async fn dispatch(
    table: &RouteTable,
    module: &str,
    name: &str,
    authorization: Option<String>,
    payload: Option<Value>,
) -> Result<DispatchResult, ActionError> {
    let Some(entry) = table.resolve(name) else {
        error!(module = %module, action = %name, "Route not found");
        return Ok(DispatchResult::route_not_found());
    };

    let mut ctx = ActionContext::new(module, name, authorization, payload);
    match entry.run(&mut ctx).await {
        Ok(body) => Ok(DispatchResult::completed(body)),
        Err(ActionError::Unauthorized) => Ok(DispatchResult::unauthorized()),
        Err(ActionError::Validation(errors)) => Ok(DispatchResult::validation_failed(errors)),
        Err(ActionError::RouteNotFound) => Ok(DispatchResult::route_not_found()),
        Err(fault) => Err(fault),
    }
}
