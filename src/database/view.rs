//! Query/command view over a live session, in the spirit of a thin DBAPI
//! wrapper: fetch rows as JSON, upsert by key. SQL construction beyond
//! these two operations belongs to the caller.

use serde_json::{Map, Value};
use sqlx::Row;
use thiserror::Error;

use crate::database::provider::Session;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("session was not acquired with named parameter support")]
    NamedParamsUnsupported,

    #[error("missing named parameter: {0}")]
    MissingParam(String),

    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("upsert requires at least one key column and one value column")]
    EmptyUpsert,

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// Database view bound to one session. Obtained from
/// [`ActionContext::db`](crate::dispatch::ActionContext::db) for injected
/// sessions, or via [`Db::new`] for sessions acquired by hand.
pub struct Db<'a> {
    session: &'a mut Session,
}

impl<'a> Db<'a> {
    pub fn new(session: &'a mut Session) -> Self {
        Self { session }
    }

    /// Run a SELECT and return each row as a JSON object.
    ///
    /// When the session was acquired with named parameter support, `sql`
    /// may use `:name` placeholders resolved from `params`; `::` casts are
    /// left untouched. Sessions without that capability only accept an
    /// empty parameter map.
    pub async fn fetch_all(
        &mut self,
        sql: &str,
        params: &Map<String, Value>,
    ) -> Result<Vec<Value>, DbError> {
        let (text, binds) = if self.session.named() {
            rewrite_named(sql, params)?
        } else {
            if !params.is_empty() {
                return Err(DbError::NamedParamsUnsupported);
            }
            (sql.to_string(), Vec::new())
        };

        // row_to_json avoids hand-mapping columns per query
        let wrapped = format!("SELECT row_to_json(t) AS row FROM ({}) t", text);
        let mut query = sqlx::query(&wrapped);
        for value in &binds {
            query = bind_param(query, value);
        }
        let rows = query.fetch_all(self.session.connection()).await?;

        let mut results = Vec::with_capacity(rows.len());
        for row in rows {
            let value: Value = row.try_get("row")?;
            results.push(value);
        }
        Ok(results)
    }

    /// Update the row(s) matching `key` with `values`, inserting a fresh
    /// row from `key` + `values` when nothing matched. Returns the number
    /// of rows written.
    pub async fn upsert(
        &mut self,
        table: &str,
        values: &Map<String, Value>,
        key: &Map<String, Value>,
    ) -> Result<u64, DbError> {
        if values.is_empty() || key.is_empty() {
            return Err(DbError::EmptyUpsert);
        }
        let table_ident = quote_identifier(table)?;

        let mut sets = Vec::with_capacity(values.len());
        let mut filters = Vec::with_capacity(key.len());
        let mut binds: Vec<&Value> = Vec::with_capacity(values.len() + key.len());
        let mut slot = 1;
        for (column, value) in values {
            sets.push(format!("{} = ${}", quote_identifier(column)?, slot));
            binds.push(value);
            slot += 1;
        }
        for (column, value) in key {
            filters.push(format!("{} = ${}", quote_identifier(column)?, slot));
            binds.push(value);
            slot += 1;
        }

        let update_sql = format!(
            "UPDATE {} SET {} WHERE {}",
            table_ident,
            sets.join(", "),
            filters.join(" AND ")
        );
        let mut query = sqlx::query(&update_sql);
        for &value in &binds {
            query = bind_param(query, value);
        }
        let affected = query
            .execute(self.session.connection())
            .await?
            .rows_affected();
        if affected > 0 {
            return Ok(affected);
        }

        // Nothing matched: insert key + value columns as a new row
        let mut columns = Vec::new();
        let mut placeholders = Vec::new();
        let mut insert_binds: Vec<&Value> = Vec::new();
        let mut insert_slot = 1;
        // key wins when a column appears in both maps
        let value_cols = values
            .iter()
            .filter(|(column, _)| !key.contains_key(column.as_str()));
        for (column, value) in key.iter().chain(value_cols) {
            columns.push(quote_identifier(column)?);
            placeholders.push(format!("${}", insert_slot));
            insert_binds.push(value);
            insert_slot += 1;
        }

        let insert_sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table_ident,
            columns.join(", "),
            placeholders.join(", ")
        );
        let mut query = sqlx::query(&insert_sql);
        for &value in &insert_binds {
            query = bind_param(query, value);
        }
        Ok(query
            .execute(self.session.connection())
            .await?
            .rows_affected())
    }
}

/// Translate `:name` placeholders to `$n` binds, numbered by first
/// appearance. Repeated names reuse their slot.
fn rewrite_named(
    sql: &str,
    params: &Map<String, Value>,
) -> Result<(String, Vec<Value>), DbError> {
    let mut out = String::with_capacity(sql.len());
    let mut binds: Vec<Value> = Vec::new();
    let mut names: Vec<String> = Vec::new();

    let mut chars = sql.chars().peekable();
    let mut prev: Option<char> = None;
    while let Some(c) = chars.next() {
        if c == ':' && prev != Some(':') && chars.peek() != Some(&':') {
            let starts_ident = matches!(chars.peek(), Some(n) if n.is_ascii_alphabetic() || *n == '_');
            if starts_ident {
                let mut name = String::new();
                while let Some(&n) = chars.peek() {
                    if n.is_ascii_alphanumeric() || n == '_' {
                        name.push(n);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let slot = match names.iter().position(|seen| seen == &name) {
                    Some(slot) => slot,
                    None => {
                        let value = params
                            .get(&name)
                            .cloned()
                            .ok_or_else(|| DbError::MissingParam(name.clone()))?;
                        names.push(name);
                        binds.push(value);
                        names.len() - 1
                    }
                };
                out.push('$');
                out.push_str(&(slot + 1).to_string());
                prev = None;
                continue;
            }
        }
        out.push(c);
        prev = Some(c);
    }
    Ok((out, binds))
}

fn bind_param<'q>(
    q: sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>,
    v: &'q Value,
) -> sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments> {
    match v {
        Value::Null => {
            let none: Option<String> = None;
            q.bind(none)
        }
        Value::Bool(b) => q.bind(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                q.bind(i)
            } else {
                q.bind(n.as_f64().unwrap_or(0.0))
            }
        }
        Value::String(s) => q.bind(s.as_str()),
        // arrays and objects go over the wire as JSONB
        other => q.bind(other.clone()),
    }
}

/// Quote a SQL identifier, rejecting anything that is not a plain
/// [A-Za-z_][A-Za-z0-9_]* name to prevent injection.
fn quote_identifier(name: &str) -> Result<String, DbError> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };
    if !valid {
        return Err(DbError::InvalidIdentifier(name.to_string()));
    }
    Ok(format!("\"{}\"", name))
}
