use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::dispatch::{Action, ActionContext, ActionError};

use super::sql::SQL_USERS;

#[derive(Debug, Deserialize)]
struct FooParams {
    name: String,
    #[serde(default)]
    email: Option<String>,
}

/// Echo the validated payload back with a server timestamp.
pub struct Foo;

#[async_trait]
impl Action for Foo {
    async fn call(&self, ctx: &mut ActionContext) -> Result<Value, ActionError> {
        let params: FooParams = ctx.params()?;
        Ok(json!({
            "name": params.name,
            "email": params.email,
            "time": Utc::now(),
        }))
    }
}

/// Upsert the user inside the injected transaction scope, then read the
/// matching users back on the same session so the response reflects the
/// write before the scope commits.
pub struct Bar;

#[async_trait]
impl Action for Bar {
    async fn call(&self, ctx: &mut ActionContext) -> Result<Value, ActionError> {
        let params: FooParams = ctx.params()?;

        let mut values = Map::new();
        values.insert("email".to_string(), json!(params.email));
        let mut key = Map::new();
        key.insert("name".to_string(), json!(params.name));
        ctx.db()?.upsert("users", &values, &key).await?;

        let mut query_params = Map::new();
        query_params.insert("name".to_string(), json!(params.name));
        let users = ctx.db()?.fetch_all(SQL_USERS, &query_params).await?;

        Ok(Value::Array(users))
    }
}
