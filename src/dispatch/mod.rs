//! Request dispatch pipeline: route tables, the per-route stage chain
//! (auth -> schema validation -> session injection -> transaction scope ->
//! handler), and the normalization of every outcome into a status + body
//! pair.

pub mod dispatcher;
pub mod response;
pub mod route;
mod stages;

pub use dispatcher::{dispatch, DispatchResult};
pub use route::{Action, ActionContext, Registry, Route, RouteTable};

use thiserror::Error;

use crate::database::{DbError, ProviderError};
use crate::schema::FieldError;

/// Failure of one pipeline run.
///
/// The first three kinds are recovered by the dispatcher into a
/// (status, body) pair; the rest are faults that propagate to the HTTP
/// boundary as a generic server error.
#[derive(Debug, Error)]
pub enum ActionError {
    /// Missing or mismatched bearer credential. No detail beyond the 401.
    #[error("unauthorized")]
    Unauthorized,

    /// Payload failed its declared schema; the list is surfaced verbatim.
    #[error("payload validation failed")]
    Validation(Vec<FieldError>),

    /// Unknown action name.
    #[error("route not found")]
    RouteNotFound,

    /// Datastore unreachable or misconfigured.
    #[error("datastore unavailable: {0}")]
    Resource(#[from] ProviderError),

    /// A write inside a transaction scope failed; the scope has already
    /// rolled back by the time this surfaces.
    #[error("transaction failed: {0}")]
    Transaction(#[source] Box<DbError>),

    /// Query failure outside a transaction scope.
    #[error("query failed: {0}")]
    Db(#[from] DbError),

    /// Unclassified handler failure.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}
