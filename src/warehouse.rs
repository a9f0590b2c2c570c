//! Warehouse access for snowctl.
//!
//! Commands talk to Snowflake through the [`Warehouse`] trait so the store
//! and renderer never depend on the transport. [`SnowflakeClient`] is the
//! production implementation: it logs in through the session REST endpoint
//! and submits statements synchronously, with bounded timeouts:
//! - Connect timeout (fast fail on unreachable hosts)
//! - Request timeout (bounded login and statement runtime)
//! - Ctrl+C exits immediately with the interrupted exit code

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::config::{AuthMethod, Profile};
use crate::credentials::Secret;
use crate::shape::Record;

/// Default timeout values for warehouse calls.
pub mod defaults {
    use std::time::Duration;

    /// Connection timeout: fail fast on unreachable hosts
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

    /// Request timeout: bound login and statement runtime
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
}

/// Statement used to check a connection and report the server clock.
pub const SERVER_TIME_SQL: &str = "select to_varchar(current_timestamp())";

const CLIENT_APP_ID: &str = "snowctl";

/// Timeout configuration for warehouse calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeoutConfig {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_timeout: defaults::CONNECT_TIMEOUT,
            request_timeout: defaults::REQUEST_TIMEOUT,
        }
    }
}

impl TimeoutConfig {
    /// `--timeout` bounds each request; connect stays at its default unless
    /// the request timeout is shorter.
    pub fn new(request_timeout: Option<Duration>) -> Self {
        let request_timeout = request_timeout.unwrap_or(defaults::REQUEST_TIMEOUT);
        Self {
            connect_timeout: defaults::CONNECT_TIMEOUT.min(request_timeout),
            request_timeout,
        }
    }
}

/// Failures reported by the warehouse or its transport.
#[derive(Error, Debug)]
pub enum WarehouseError {
    #[error("login failed: {0}")]
    Login(String),

    #[error("statement failed: {0}")]
    Query(String),

    #[error("unexpected response: {0}")]
    Protocol(String),

    #[error("invalid account: {0}")]
    Account(String),

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

/// Operations the CLI needs from the warehouse.
#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Run one statement and return its rows as records.
    async fn run_query(
        &self,
        profile: &Profile,
        secret: &Secret,
        statement: &str,
    ) -> Result<Vec<Record>, WarehouseError>;

    /// Connect and return the server's current timestamp.
    async fn test_connection(
        &self,
        profile: &Profile,
        secret: &Secret,
    ) -> Result<String, WarehouseError> {
        let rows = self.run_query(profile, secret, SERVER_TIME_SQL).await?;
        rows.first()
            .and_then(|row| row.values().next())
            .and_then(|value| value.as_str())
            .map(str::to_string)
            .ok_or_else(|| WarehouseError::Protocol("server time query returned no rows".into()))
    }
}

/// Snowflake client over the session REST endpoints.
pub struct SnowflakeClient {
    http: reqwest::Client,
}

impl SnowflakeClient {
    pub fn new(timeouts: &TimeoutConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(timeouts.connect_timeout)
            .timeout(timeouts.request_timeout)
            .user_agent(concat!("snowctl/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("build HTTP client")?;
        Ok(Self { http })
    }

    async fn login(
        &self,
        base: &Url,
        profile: &Profile,
        secret: &Secret,
    ) -> Result<String, WarehouseError> {
        let mut url = endpoint(base, "session/v1/login-request")?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("request_id", &uuid::Uuid::new_v4().to_string());
            for (key, value) in [
                ("databaseName", &profile.database),
                ("schemaName", &profile.schema),
                ("warehouse", &profile.warehouse),
                ("roleName", &profile.role),
            ] {
                if !value.is_empty() {
                    query.append_pair(key, value);
                }
            }
        }

        tracing::debug!(url = %url, user = %profile.user, auth = %profile.auth_method, "login request");
        let body = login_body(profile, secret);
        let response: ApiResponse<LoginData> = self
            .http
            .post(url)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        match response.into_data() {
            Ok(data) => Ok(data.token),
            Err(message) => Err(WarehouseError::Login(message)),
        }
    }

    async fn execute(
        &self,
        base: &Url,
        token: &str,
        statement: &str,
    ) -> Result<QueryData, WarehouseError> {
        let mut url = endpoint(base, "queries/v1/query-request")?;
        url.query_pairs_mut()
            .append_pair("requestId", &uuid::Uuid::new_v4().to_string());

        tracing::debug!(url = %url, bytes = statement.len(), "query request");
        let response: ApiResponse<QueryData> = self
            .http
            .post(url)
            .header(reqwest::header::ACCEPT, "application/json")
            .header(
                reqwest::header::AUTHORIZATION,
                format!("Snowflake Token=\"{}\"", token),
            )
            .json(&json!({
                "sqlText": statement,
                "asyncExec": false,
                "sequenceId": 1,
            }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        response.into_data().map_err(WarehouseError::Query)
    }
}

#[async_trait]
impl Warehouse for SnowflakeClient {
    async fn run_query(
        &self,
        profile: &Profile,
        secret: &Secret,
        statement: &str,
    ) -> Result<Vec<Record>, WarehouseError> {
        let base = base_url(profile)?;
        let token = self.login(&base, profile, secret).await?;
        let data = self.execute(&base, &token, statement).await?;
        data.into_records()
    }
}

/// Profile account URL when set, otherwise derived from the account locator.
pub fn base_url(profile: &Profile) -> Result<Url, WarehouseError> {
    let raw = if profile.account_url.trim().is_empty() {
        let account = profile.account.trim();
        if account.is_empty() {
            return Err(WarehouseError::Account(
                "connection has neither an account nor an account URL".into(),
            ));
        }
        format!("https://{}.snowflakecomputing.com", account)
    } else if profile.account_url.contains("://") {
        profile.account_url.trim().to_string()
    } else {
        format!("https://{}", profile.account_url.trim())
    };
    Url::parse(&raw).map_err(|e| WarehouseError::Account(format!("{}: {}", raw, e)))
}

/// Account name expected by login: the locator without region or cloud.
pub fn account_name(account: &str) -> &str {
    account.split('.').next().unwrap_or(account)
}

fn endpoint(base: &Url, path: &str) -> Result<Url, WarehouseError> {
    base.join(path)
        .map_err(|e| WarehouseError::Account(format!("{}: {}", base, e)))
}

fn login_body(profile: &Profile, secret: &Secret) -> Value {
    let mut data = json!({
        "CLIENT_APP_ID": CLIENT_APP_ID,
        "CLIENT_APP_VERSION": env!("CARGO_PKG_VERSION"),
        "ACCOUNT_NAME": account_name(&profile.account).to_uppercase(),
        "LOGIN_NAME": profile.user,
        "SESSION_PARAMETERS": { "QUERY_RESULT_FORMAT": "JSON" },
    });
    match profile.auth_method {
        AuthMethod::Password => {
            data["PASSWORD"] = json!(secret.expose());
        }
        AuthMethod::Pat => {
            data["AUTHENTICATOR"] = json!("PROGRAMMATIC_ACCESS_TOKEN");
            data["TOKEN"] = json!(secret.expose());
        }
    }
    json!({ "data": data })
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    code: Option<String>,
    data: Option<T>,
}

impl<T> ApiResponse<T> {
    fn into_data(self) -> Result<T, String> {
        let describe = |message: Option<String>, code: Option<String>| {
            let message = message.unwrap_or_else(|| "no message from server".to_string());
            match code {
                Some(code) => format!("{} (code {})", message, code),
                None => message,
            }
        };
        match (self.success, self.data) {
            (true, Some(data)) => Ok(data),
            (true, None) => Err("response carried no data".to_string()),
            (false, _) => Err(describe(self.message, self.code)),
        }
    }
}

#[derive(Debug, Deserialize)]
struct LoginData {
    token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryData {
    #[serde(default)]
    rowtype: Vec<Column>,
    #[serde(default)]
    rowset: Vec<Vec<Value>>,
    #[serde(default)]
    query_result_format: Option<String>,
    #[serde(default)]
    chunks: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct Column {
    name: String,
}

impl QueryData {
    /// Map `rowset` positions to `rowtype` names. Cells stay as the server
    /// sent them (strings or null).
    fn into_records(self) -> Result<Vec<Record>, WarehouseError> {
        if let Some(format) = self.query_result_format.as_deref() {
            if !format.eq_ignore_ascii_case("json") {
                return Err(WarehouseError::Protocol(format!(
                    "unsupported result format {:?}",
                    format
                )));
            }
        }
        if !self.chunks.is_empty() {
            tracing::warn!(
                chunks = self.chunks.len(),
                inline_rows = self.rowset.len(),
                "result spilled into chunks; only inline rows are returned"
            );
        }

        let names = unique_column_names(self.rowtype.into_iter().map(|c| c.name));
        self.rowset
            .into_iter()
            .map(|cells| {
                if cells.len() != names.len() {
                    return Err(WarehouseError::Protocol(format!(
                        "row has {} cells but {} columns were described",
                        cells.len(),
                        names.len()
                    )));
                }
                Ok(names.iter().cloned().zip(cells).collect())
            })
            .collect()
    }
}

/// Records are keyed by column name, so repeated names (`select 1 as a, 2 as a`)
/// get a numeric suffix: `a`, `a_2`, `a_3`.
fn unique_column_names(names: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    names
        .into_iter()
        .map(|name| {
            let mut candidate = name.clone();
            let mut n = 1;
            while !seen.insert(candidate.clone()) {
                n += 1;
                candidate = format!("{name}_{n}");
            }
            candidate
        })
        .collect()
}

/// Parse a `--timeout` value such as "500ms", "10s" or "2m". A bare number
/// counts as seconds.
pub fn parse_duration(s: &str) -> Result<Duration, crate::error::Error> {
    use crate::error::Error;

    // "ms" must be tried before "s".
    const UNITS: &[(&str, u64)] = &[("ms", 1), ("s", 1_000), ("m", 60_000)];

    let s = s.trim();
    let (digits, millis_per_unit) = UNITS
        .iter()
        .find_map(|(suffix, millis)| s.strip_suffix(suffix).map(|rest| (rest, *millis)))
        .unwrap_or((s, 1_000));

    let count: u64 = digits.trim().parse().map_err(|_| {
        Error::Validation(format!("{s:?} is not a duration (try 500ms, 10s or 2m)"))
    })?;
    count
        .checked_mul(millis_per_unit)
        .map(Duration::from_millis)
        .ok_or_else(|| Error::Validation(format!("duration {s:?} is too large")))
}

/// Exit on Ctrl+C with the interrupted code. In-flight HTTP requests are
/// dropped with the process.
pub fn setup_ctrlc_handler() {
    use crate::exit_codes;

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("failed to listen for Ctrl+C: {}", e);
            return;
        }
        eprintln!("\nInterrupted (Ctrl+C).");
        std::process::exit(exit_codes::INTERRUPTED);
    });
}
