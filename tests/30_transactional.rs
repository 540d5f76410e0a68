//! Transaction scope and datastore round trips. These tests need a real
//! Postgres reachable via DATABASE_URL and are ignored by default:
//!
//!   DATABASE_URL=postgres://... cargo test -- --ignored

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Map, Value};
use sqlx::PgPool;
use tower::ServiceExt;

use dbapi_rust::config::DEFAULT_DATASTORE;
use dbapi_rust::database::{DatastoreProvider, Db};
use dbapi_rust::dispatch::{Action, ActionContext, ActionError, Registry, Route, RouteTable};
use dbapi_rust::modules::example;
use dbapi_rust::server;

const SECRET: &str = "tx-secret";

async fn pool() -> Result<PgPool> {
    let url = std::env::var("DATABASE_URL")?;
    let pool = PgPool::connect(&url).await?;
    sqlx::query("CREATE TABLE IF NOT EXISTS users (name TEXT, email TEXT)")
        .execute(&pool)
        .await?;
    Ok(pool)
}

async fn clear_user(pool: &PgPool, name: &str) -> Result<()> {
    sqlx::query("DELETE FROM users WHERE name = $1")
        .bind(name)
        .execute(pool)
        .await?;
    Ok(())
}

async fn user_email(pool: &PgPool, name: &str) -> Result<Option<String>> {
    let row: Option<(Option<String>,)> =
        sqlx::query_as("SELECT email FROM users WHERE name = $1")
            .bind(name)
            .fetch_optional(pool)
            .await?;
    Ok(row.and_then(|(email,)| email))
}

fn params(entries: &[(&str, Value)]) -> Map<String, Value> {
    entries
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

/// Writes a row and then fails, so the scope must roll the write back.
struct FailAfterWrite;

#[async_trait]
impl Action for FailAfterWrite {
    async fn call(&self, ctx: &mut ActionContext) -> Result<Value, ActionError> {
        ctx.db()?
            .upsert(
                "users",
                &params(&[("email", json!("doomed@x.com"))]),
                &params(&[("name", json!("rollback_probe"))]),
            )
            .await?;
        Err(ActionError::Internal(anyhow::anyhow!("boom")))
    }
}

fn app() -> Router {
    let failing = RouteTable::builder()
        .register(
            Route::new("fail", FailAfterWrite)
                .bearer(SECRET)
                .database(DEFAULT_DATASTORE, true)
                .transactional(),
        )
        .build();

    let registry = Registry::builder()
        .module(example::NAME, example::routes(SECRET))
        .module("txtest", failing)
        .build();
    server::app(Arc::new(registry))
}

fn post(path: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(path)
        .header(header::AUTHORIZATION, format!("Bearer {}", SECRET))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
#[ignore = "requires a running Postgres reachable via DATABASE_URL"]
async fn bar_commits_the_upsert_and_returns_the_written_row() -> Result<()> {
    let pool = pool().await?;
    clear_user(&pool, "bar_user").await?;

    // Insert path: the response must already contain the new row
    let res = app()
        .oneshot(post(
            "/example/bar",
            json!({"name": "bar_user", "email": "bar@x.com"}),
        ))
        .await?;

    assert_eq!(res.status(), StatusCode::OK);
    let bytes = to_bytes(res.into_body(), usize::MAX).await?;
    let body: Value = serde_json::from_slice(&bytes)?;
    assert_eq!(body, json!([{"name": "bar_user", "email": "bar@x.com"}]));

    // The scope committed after the handler returned
    assert_eq!(
        user_email(&pool, "bar_user").await?,
        Some("bar@x.com".to_string())
    );

    // Update path: the response reflects the new email, not the old one
    let res = app()
        .oneshot(post(
            "/example/bar",
            json!({"name": "bar_user", "email": "new@x.com"}),
        ))
        .await?;

    assert_eq!(res.status(), StatusCode::OK);
    let bytes = to_bytes(res.into_body(), usize::MAX).await?;
    let body: Value = serde_json::from_slice(&bytes)?;
    assert_eq!(body, json!([{"name": "bar_user", "email": "new@x.com"}]));
    assert_eq!(
        user_email(&pool, "bar_user").await?,
        Some("new@x.com".to_string())
    );

    clear_user(&pool, "bar_user").await?;
    Ok(())
}

#[tokio::test]
#[ignore = "requires a running Postgres reachable via DATABASE_URL"]
async fn failing_handler_rolls_the_write_back() -> Result<()> {
    let pool = pool().await?;
    clear_user(&pool, "rollback_probe").await?;

    let res = app()
        .oneshot(post("/txtest/fail", json!({})))
        .await?;

    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(user_email(&pool, "rollback_probe").await?, None);
    Ok(())
}

#[tokio::test]
#[ignore = "requires a running Postgres reachable via DATABASE_URL"]
async fn view_upsert_then_named_fetch_round_trips() -> Result<()> {
    let pool = pool().await?;
    clear_user(&pool, "view_user").await?;

    let mut session = DatastoreProvider::acquire(DEFAULT_DATASTORE, true, true).await?;
    let mut db = Db::new(&mut session);

    // Insert path
    db.upsert(
        "users",
        &params(&[("email", json!("v1@x.com"))]),
        &params(&[("name", json!("view_user"))]),
    )
    .await?;

    // Update path
    db.upsert(
        "users",
        &params(&[("email", json!("v2@x.com"))]),
        &params(&[("name", json!("view_user"))]),
    )
    .await?;

    let rows = db
        .fetch_all(
            "SELECT name, email FROM users WHERE name = :name",
            &params(&[("name", json!("view_user"))]),
        )
        .await?;
    assert_eq!(rows, vec![json!({"name": "view_user", "email": "v2@x.com"})]);

    clear_user(&pool, "view_user").await?;
    Ok(())
}
