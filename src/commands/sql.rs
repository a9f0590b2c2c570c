use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::json;
use std::io::{IsTerminal, Read};

use super::Runtime;
use crate::config::ProfileStore;
use crate::credentials::resolve_secret;
use crate::error::Error;
use crate::progress::with_spinner;
use crate::shape::{DeclaredSplit, Record, Render};
use crate::warehouse::Warehouse;

/// Rows returned by one statement plus where they came from.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    pub connection: String,
    pub statement: String,
    pub row_count: usize,
    pub rows: Vec<Record>,
}

impl Render for QueryResult {
    fn declared_split(&self) -> Option<DeclaredSplit> {
        let mut metadata = Record::new();
        metadata.insert("connection".to_string(), json!(self.connection));
        metadata.insert("statement".to_string(), json!(self.statement));
        metadata.insert("rowCount".to_string(), json!(self.row_count));
        Some(DeclaredSplit {
            metadata,
            rows: self.rows.clone(),
        })
    }
}

/// Statement from `--query`, else from piped stdin.
fn read_statement(query: Option<&str>) -> Result<String> {
    let stdin = std::io::stdin();
    if query.is_none() && !stdin.is_terminal() {
        return statement_from(None, Some(&mut stdin.lock()));
    }
    statement_from(query, None)
}

fn statement_from(query: Option<&str>, piped: Option<&mut dyn Read>) -> Result<String> {
    let raw = match (query, piped) {
        (Some(q), _) => q.to_string(),
        (None, Some(reader)) => {
            let mut buf = String::new();
            reader
                .read_to_string(&mut buf)
                .context("read SQL from stdin")?;
            buf
        }
        (None, None) => String::new(),
    };
    validate_statement(&raw)
}

fn validate_statement(raw: &str) -> Result<String> {
    let statement = raw.trim();
    if statement.is_empty() {
        return Err(
            Error::Validation("query is required. Use --query \"SELECT ...\"".to_string()).into(),
        );
    }
    Ok(statement.to_string())
}

/// Run one statement against the active connection.
pub async fn sql(rt: &Runtime, warehouse: &dyn Warehouse, query: Option<&str>) -> Result<()> {
    let statement = read_statement(query)?;
    let result = run_statement(rt, warehouse, statement).await?;
    rt.output.print(&result)?;
    Ok(())
}

async fn run_statement(
    rt: &Runtime,
    warehouse: &dyn Warehouse,
    statement: String,
) -> Result<QueryResult> {
    let store = ProfileStore::load(&rt.paths)?;
    let profile = store.require_active(rt.connection.as_deref())?;
    let (secret, source) = resolve_secret(&profile, rt.env)?;
    rt.output.verbose(&format!(
        "Running on {} as {} (secret from {})",
        profile.name, profile.user, source
    ));

    let rows = with_spinner(
        "Running query...",
        rt.show_progress(),
        warehouse.run_query(&profile, &secret, &statement),
    )
    .await
    .with_context(|| format!("query failed on connection {:?}", profile.name))?;
    tracing::debug!(connection = %profile.name, rows = rows.len(), "query finished");

    Ok(QueryResult {
        connection: profile.name,
        statement,
        row_count: rows.len(),
        rows,
    })
}
