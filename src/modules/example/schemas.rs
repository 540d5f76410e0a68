use serde_json::Value;

use crate::schema::{FieldError, Schema};

const KNOWN_FIELDS: [&str; 2] = ["name", "email"];

/// Payload shape shared by `foo` and `bar`: required string `name`,
/// optional string `email`, no unknown fields.
pub struct FooSchema;

impl Schema for FooSchema {
    fn validate(&self, data: &Value) -> Vec<FieldError> {
        let Value::Object(map) = data else {
            return vec![FieldError::new("_schema", "expected a JSON object")];
        };

        let mut errors = Vec::new();
        match map.get("name") {
            Some(Value::String(name)) if !name.is_empty() => {}
            Some(Value::String(_)) => errors.push(FieldError::new("name", "must not be empty")),
            Some(_) => errors.push(FieldError::new("name", "must be a string")),
            None => errors.push(FieldError::new("name", "missing required field")),
        }
        if let Some(email) = map.get("email") {
            if !email.is_string() {
                errors.push(FieldError::new("email", "must be a string"));
            }
        }
        for field in map.keys() {
            if !KNOWN_FIELDS.contains(&field.as_str()) {
                errors.push(FieldError::new(field, "unknown field"));
            }
        }
        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_accepts_name_with_optional_email() {
        assert!(FooSchema.validate(&json!({"name": "alice"})).is_empty());
        assert!(FooSchema
            .validate(&json!({"name": "alice", "email": "a@x.com"}))
            .is_empty());
    }

    #[test]
    fn test_rejects_missing_name() {
        let errors = FooSchema.validate(&json!({"email": "a@x.com"}));
        assert_eq!(errors, vec![FieldError::new("name", "missing required field")]);
    }

    #[test]
    fn test_rejects_non_object_payload() {
        let errors = FooSchema.validate(&Value::Null);
        assert_eq!(errors, vec![FieldError::new("_schema", "expected a JSON object")]);

        let errors = FooSchema.validate(&json!(["name"]));
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn test_rejects_wrong_types_and_unknown_fields() {
        let errors = FooSchema.validate(&json!({"name": 7, "email": true, "extra": 1}));
        assert_eq!(
            errors,
            vec![
                FieldError::new("name", "must be a string"),
                FieldError::new("email", "must be a string"),
                FieldError::new("extra", "unknown field"),
            ]
        );
    }
}
