// Payload schema collaborator for the dispatch pipeline
use serde::Serialize;
use serde_json::Value;

/// One field-level validation failure, surfaced verbatim in 400 bodies
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Declared payload shape for an action. Validators are supplied per route
/// at registration time; an empty error list means the payload is valid.
///
/// A request without a JSON body is validated as `Value::Null`, so schemas
/// that require fields reject body-less requests.
pub trait Schema: Send + Sync {
    fn validate(&self, data: &Value) -> Vec<FieldError>;
}
