//! `show account`: the active user's profile and recent activity, read
//! from the `snowflake.account_usage` views.

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;

use super::Runtime;
use crate::config::{Profile, ProfileStore};
use crate::credentials::{resolve_secret, Secret};
use crate::error::Error;
use crate::progress::with_spinner;
use crate::shape::{DeclaredSplit, Record, Render};
use crate::warehouse::{Warehouse, WarehouseError};

pub const DEFAULT_WINDOW_DAYS: i64 = 7;

/// How many warehouses the usage ranking keeps.
const TOP_WAREHOUSES: usize = 5;

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextSummary {
    pub connection: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub account: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub account_url: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub user: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub role: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub warehouse: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub database: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub schema: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
}

impl From<&Profile> for ContextSummary {
    fn from(p: &Profile) -> Self {
        Self {
            connection: p.name.clone(),
            account: p.account.clone(),
            account_url: p.account_url.clone(),
            user: p.user.clone(),
            role: p.role.clone(),
            warehouse: p.warehouse.clone(),
            database: p.database.clone(),
            schema: p.schema.clone(),
            description: p.description.clone(),
        }
    }
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    pub name: String,
    pub login_name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub display_name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub email: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub created_on: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub last_success_login: String,
    pub disabled: bool,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginStats {
    pub logins_in_window: i64,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub last_login: String,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryStats {
    pub queries: i64,
    pub total_seconds: f64,
    pub bytes_scanned: i64,
}

/// One warehouse in the ranking. Credits when the account exposes them,
/// otherwise a query count.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WarehouseUsage {
    pub warehouse: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credits_used: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queries: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountSummary {
    pub context: ContextSummary,
    pub window_days: i64,
    pub user: UserInfo,
    pub login_activity: LoginStats,
    pub query_activity: QueryStats,
    pub warehouse_usage: Vec<WarehouseUsage>,
}

/// Tabular output: everything but the warehouse ranking is metadata.
impl Render for AccountSummary {
    fn declared_split(&self) -> Option<DeclaredSplit> {
        let mut metadata = Record::new();
        metadata.insert("context".into(), serde_json::to_value(&self.context).ok()?);
        metadata.insert("windowDays".into(), self.window_days.into());
        metadata.insert("user".into(), serde_json::to_value(&self.user).ok()?);
        metadata.insert(
            "loginActivity".into(),
            serde_json::to_value(&self.login_activity).ok()?,
        );
        metadata.insert(
            "queryActivity".into(),
            serde_json::to_value(&self.query_activity).ok()?,
        );
        let rows = self
            .warehouse_usage
            .iter()
            .map(|usage| match serde_json::to_value(usage) {
                Ok(Value::Object(row)) => Some(row),
                _ => None,
            })
            .collect::<Option<Vec<_>>>()?;
        Some(DeclaredSplit { metadata, rows })
    }
}

/// Summarize the active connection's user (or `--user`) over the last
/// `window_days` days.
pub async fn show_account(
    rt: &Runtime,
    warehouse: &dyn Warehouse,
    user: Option<&str>,
    window_days: i64,
) -> Result<()> {
    let summary = summarize_account(rt, warehouse, user, window_days).await?;
    rt.output.print(&summary)?;
    Ok(())
}

/// Runs statements for one summary and keeps the spinner up while each is
/// in flight.
struct Session<'a> {
    rt: &'a Runtime,
    warehouse: &'a dyn Warehouse,
    profile: &'a Profile,
    secret: &'a Secret,
}

impl Session<'_> {
    async fn query(&self, message: &str, statement: &str) -> Result<Vec<Record>, WarehouseError> {
        tracing::debug!(connection = %self.profile.name, statement, "account summary query");
        with_spinner(
            message,
            self.rt.show_progress(),
            self.warehouse.run_query(self.profile, self.secret, statement),
        )
        .await
    }
}

async fn summarize_account(
    rt: &Runtime,
    warehouse: &dyn Warehouse,
    user: Option<&str>,
    window_days: i64,
) -> Result<AccountSummary> {
    let window_days = if window_days > 0 {
        window_days
    } else {
        DEFAULT_WINDOW_DAYS
    };

    let store = ProfileStore::load(&rt.paths)?;
    let profile = store.require_active(rt.connection.as_deref())?;
    let target = match user.map(str::trim).filter(|u| !u.is_empty()) {
        Some(u) => u.to_string(),
        None if !profile.user.trim().is_empty() => profile.user.trim().to_string(),
        None => {
            return Err(Error::Validation(format!(
                "no user given and connection {:?} has none; pass --user",
                profile.name
            ))
            .into())
        }
    }
    .to_uppercase();
    let (secret, _) = resolve_secret(&profile, rt.env)?;

    let session = Session {
        rt,
        warehouse,
        profile: &profile,
        secret: &secret,
    };
    let literal = quote_literal(&target);

    let rows = session
        .query("Fetching user info...", &user_statement(&literal))
        .await
        .context("fetch user info")?;
    let user = rows.first().map(user_info).unwrap_or_else(|| UserInfo {
        name: target.clone(),
        ..UserInfo::default()
    });

    let rows = session
        .query(
            "Fetching login history...",
            &login_statement(&literal, window_days),
        )
        .await
        .context("fetch login info")?;
    let login_activity = rows
        .first()
        .map(|row| LoginStats {
            logins_in_window: cell_i64(row, "LOGIN_COUNT"),
            last_login: cell_text(row, "LAST_LOGIN"),
        })
        .unwrap_or_default();

    let rows = session
        .query(
            "Collecting query statistics...",
            &query_stats_statement(&literal, window_days),
        )
        .await
        .context("fetch query stats")?;
    let query_activity = rows
        .first()
        .map(|row| QueryStats {
            queries: cell_i64(row, "QUERY_COUNT"),
            total_seconds: cell_f64(row, "TOTAL_ELAPSED_TIME") / 1000.0,
            bytes_scanned: cell_i64(row, "BYTES_SCANNED"),
        })
        .unwrap_or_default();

    let warehouse_usage = warehouse_usage(&session, &literal, window_days)
        .await
        .context("fetch warehouse usage")?;

    Ok(AccountSummary {
        context: ContextSummary::from(&profile),
        window_days,
        user,
        login_activity,
        query_activity,
        warehouse_usage,
    })
}

/// Credits per warehouse, or query counts on accounts whose history view
/// has no `credits_used` column.
async fn warehouse_usage(
    session: &Session<'_>,
    literal: &str,
    window_days: i64,
) -> Result<Vec<WarehouseUsage>, WarehouseError> {
    let message = "Summarizing warehouse usage...";
    match session
        .query(message, &credits_statement(literal, window_days))
        .await
    {
        Ok(rows) => Ok(rows
            .iter()
            .map(|row| WarehouseUsage {
                warehouse: cell_text(row, "WAREHOUSE_NAME"),
                credits_used: Some(cell_f64(row, "CREDITS")),
                queries: None,
            })
            .collect()),
        Err(err) if is_missing_credits_column(&err) => {
            tracing::info!("credits_used unavailable; ranking warehouses by query count");
            let rows = session
                .query(message, &query_count_statement(literal, window_days))
                .await?;
            Ok(rows
                .iter()
                .map(|row| WarehouseUsage {
                    warehouse: cell_text(row, "WAREHOUSE_NAME"),
                    credits_used: None,
                    queries: Some(cell_i64(row, "QUERIES")),
                })
                .collect())
        }
        Err(err) => Err(err),
    }
}

fn is_missing_credits_column(err: &WarehouseError) -> bool {
    err.to_string()
        .to_lowercase()
        .contains("invalid identifier 'credits_used'")
}

fn user_info(row: &Record) -> UserInfo {
    UserInfo {
        name: cell_text(row, "NAME"),
        login_name: cell_text(row, "LOGIN_NAME"),
        display_name: cell_text(row, "DISPLAY_NAME"),
        email: cell_text(row, "EMAIL"),
        created_on: cell_text(row, "CREATED_ON"),
        last_success_login: cell_text(row, "LAST_SUCCESS_LOGIN"),
        disabled: cell_text(row, "DISABLED").eq_ignore_ascii_case("true"),
    }
}

fn user_statement(user: &str) -> String {
    format!(
        "select name, login_name, display_name, email, created_on, last_success_login, disabled
from snowflake.account_usage.users
where name = {user}
order by created_on desc
limit 1"
    )
}

fn login_statement(user: &str, days: i64) -> String {
    format!(
        "select count(*) as login_count, max(event_timestamp) as last_login
from snowflake.account_usage.login_history
where user_name = {user}
  and event_timestamp >= dateadd(day, -{days}, current_timestamp())"
    )
}

fn query_stats_statement(user: &str, days: i64) -> String {
    format!(
        "select
  count(*) as query_count,
  coalesce(sum(total_elapsed_time), 0) as total_elapsed_time,
  coalesce(sum(bytes_scanned), 0) as bytes_scanned
from snowflake.account_usage.query_history
where user_name = {user}
  and start_time >= dateadd(day, -{days}, current_timestamp())"
    )
}

fn credits_statement(user: &str, days: i64) -> String {
    format!(
        "select warehouse_name, coalesce(sum(credits_used), 0) as credits
from snowflake.account_usage.query_history
where user_name = {user}
  and warehouse_name is not null
  and start_time >= dateadd(day, -{days}, current_timestamp())
group by 1
order by credits desc
limit {TOP_WAREHOUSES}"
    )
}

fn query_count_statement(user: &str, days: i64) -> String {
    format!(
        "select warehouse_name, count(*) as queries
from snowflake.account_usage.query_history
where user_name = {user}
  and warehouse_name is not null
  and start_time >= dateadd(day, -{days}, current_timestamp())
group by 1
order by queries desc
limit {TOP_WAREHOUSES}"
    )
}

/// SQL string literal with embedded quotes doubled.
fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Cell by column name, ignoring case. Null and missing read as "".
fn cell_text(row: &Record, column: &str) -> String {
    let value = row
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(column))
        .map(|(_, value)| value);
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn cell_f64(row: &Record, column: &str) -> f64 {
    cell_text(row, column).trim().parse().unwrap_or(0.0)
}

/// Integer cell; the server may send "12" or "12.000".
fn cell_i64(row: &Record, column: &str) -> i64 {
    let text = cell_text(row, column);
    let text = text.trim();
    text.parse()
        .unwrap_or_else(|_| text.parse::<f64>().map(|f| f as i64).unwrap_or(0))
}
