//! The cross-cutting stages of the per-route pipeline. Each stage wraps
//! an inner [`Action`] and either short-circuits or delegates, so a
//! compiled route is itself just an `Action`.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::error;

use crate::database::{DatastoreProvider, DbError};
use crate::dispatch::route::{Action, ActionContext};
use crate::dispatch::ActionError;
use crate::schema::Schema;

const BEARER_PREFIX: &str = "Bearer ";

/// Bearer credential check. Always the outermost stage: nothing below it
/// runs, and no session is acquired, until the token matches.
pub(crate) struct AuthStage {
    secret: String,
    inner: Arc<dyn Action>,
}

impl AuthStage {
    pub(crate) fn new(secret: String, inner: Arc<dyn Action>) -> Self {
        Self { secret, inner }
    }
}

#[async_trait]
impl Action for AuthStage {
    async fn call(&self, ctx: &mut ActionContext) -> Result<Value, ActionError> {
        let Some(header) = ctx.authorization.as_deref() else {
            return Err(ActionError::Unauthorized);
        };
        // A token sent without the scheme prefix is compared as-is
        let token = header.strip_prefix(BEARER_PREFIX).unwrap_or(header);
        if token != self.secret {
            return Err(ActionError::Unauthorized);
        }
        self.inner.call(ctx).await
    }
}

/// Payload validation against the route's declared schema. On failure the
/// error list is logged and surfaced verbatim; on success the payload
/// passes through unchanged.
pub(crate) struct SchemaStage {
    schema: Arc<dyn Schema>,
    inner: Arc<dyn Action>,
}

impl SchemaStage {
    pub(crate) fn new(schema: Arc<dyn Schema>, inner: Arc<dyn Action>) -> Self {
        Self { schema, inner }
    }
}

#[async_trait]
impl Action for SchemaStage {
    async fn call(&self, ctx: &mut ActionContext) -> Result<Value, ActionError> {
        let data = ctx.payload.as_ref().unwrap_or(&Value::Null);
        let errors = self.schema.validate(data);
        if !errors.is_empty() {
            error!(
                module = %ctx.module,
                action = %ctx.action,
                ?errors,
                "payload validation failed"
            );
            return Err(ActionError::Validation(errors));
        }
        self.inner.call(ctx).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SessionMode {
    Autocommit,
    Transactional,
}

/// Per-route session configuration, fixed at registration time.
pub(crate) struct SessionSpec {
    pub datastore: String,
    pub named: bool,
    pub mode: SessionMode,
}

/// Session injection and, for transactional routes, the transaction
/// scope: the session is acquired before the handler, committed after it
/// succeeds, and released on every exit path (dropping a transactional
/// session rolls it back).
pub(crate) struct DatabaseStage {
    spec: SessionSpec,
    inner: Arc<dyn Action>,
}

impl DatabaseStage {
    pub(crate) fn new(spec: SessionSpec, inner: Arc<dyn Action>) -> Self {
        Self { spec, inner }
    }
}

#[async_trait]
impl Action for DatabaseStage {
    async fn call(&self, ctx: &mut ActionContext) -> Result<Value, ActionError> {
        let autocommit = self.spec.mode == SessionMode::Autocommit;
        let session =
            DatastoreProvider::acquire(&self.spec.datastore, self.spec.named, autocommit).await?;
        ctx.put_session(session);

        let result = self.inner.call(ctx).await;
        let session = ctx.take_session();

        match result {
            Ok(value) => {
                if let Some(session) = session {
                    session
                        .commit()
                        .await
                        .map_err(|e| ActionError::Transaction(Box::new(DbError::Sqlx(e))))?;
                }
                Ok(value)
            }
            Err(err) => {
                drop(session);
                if autocommit {
                    Err(err)
                } else {
                    // query failures inside the scope are transaction faults
                    match err {
                        ActionError::Db(db_err) => {
                            Err(ActionError::Transaction(Box::new(db_err)))
                        }
                        other => Err(other),
                    }
                }
            }
        }
    }
}
