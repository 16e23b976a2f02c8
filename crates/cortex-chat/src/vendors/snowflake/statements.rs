use std::collections::BTreeMap;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::backend::{QueryResult, Statement, StatementExecutor};
use crate::errors::CortexError;

use super::{SnowflakeClient, request_id, transport_error};

pub const STATEMENTS_PATH: &str = "/api/v2/statements";

static IDENTIFIER: Lazy<Result<Regex, regex::Error>> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_$]*(\.[A-Za-z_][A-Za-z0-9_$]*){0,2}$"));

/// Accepts plain, optionally `db.schema.`-qualified, unquoted identifiers.
pub fn validate_identifier(name: &str) -> Result<(), CortexError> {
    let pattern = IDENTIFIER
        .as_ref()
        .map_err(|e| CortexError::Config(format!("identifier pattern: {e}")))?;
    if pattern.is_match(name) {
        Ok(())
    } else {
        Err(CortexError::Validation(format!("invalid identifier: {name:?}")))
    }
}

#[derive(Serialize)]
struct StatementBody<'a> {
    statement: &'a str,
    timeout: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    database: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    schema: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warehouse: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    bindings: BTreeMap<String, Binding<'a>>,
}

#[derive(Serialize)]
struct Binding<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    value: &'a str,
}

#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatementResponse {
    #[serde(default)]
    result_set_meta_data: Option<ResultSetMetaData>,
    #[serde(default)]
    data: Vec<Vec<serde_json::Value>>,
    #[serde(default)]
    statement_handle: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResultSetMetaData {
    #[serde(default)]
    row_type: Vec<RowType>,
}

#[derive(Deserialize)]
struct RowType {
    name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatementFailure {
    #[serde(default)]
    code: Option<String>,
    message: String,
    #[serde(default)]
    sql_state: Option<String>,
}

fn body<'a>(client: &'a SnowflakeClient, statement: &'a Statement) -> StatementBody<'a> {
    let config = &client.config;
    StatementBody {
        statement: statement.normalized_sql(),
        timeout: timeout_secs(config.statement_timeout),
        database: config.database.as_deref(),
        schema: config.schema.as_deref(),
        warehouse: config.warehouse.as_deref(),
        role: config.role.as_deref(),
        bindings: statement
            .bindings
            .iter()
            .enumerate()
            .map(|(i, value)| {
                (
                    (i + 1).to_string(),
                    Binding {
                        kind: "TEXT",
                        value,
                    },
                )
            })
            .collect(),
    }
}

/// Whole seconds for the SQL API, rounded up. The API reads `0` as "no limit".
fn timeout_secs(timeout: Duration) -> u64 {
    let secs = timeout.as_secs() + u64::from(timeout.subsec_nanos() > 0);
    secs.max(1)
}

fn cell(value: serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

impl SnowflakeClient {
    /// Runs one statement synchronously and returns its first result partition.
    pub async fn execute_statement(
        &self,
        statement: &Statement,
    ) -> Result<QueryResult, CortexError> {
        let payload = body(self, statement);
        if payload.statement.is_empty() {
            return Err(CortexError::Validation("statement must not be empty".into()));
        }
        debug!(bindings = statement.bindings.len(), "executing statement");

        let response = self
            .post(STATEMENTS_PATH, "application/json")
            .timeout(self.config.statement_timeout)
            .json(&payload)
            .send()
            .await
            .map_err(|e| transport_error(STATEMENTS_PATH, e))?;

        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            return Err(statement_failure(response).await);
        }

        let raw = response
            .text()
            .await
            .map_err(|e| transport_error(STATEMENTS_PATH, e))?;
        let parsed: StatementResponse = serde_json::from_str(&raw)
            .map_err(|e| CortexError::malformed(format!("invalid statement response: {e}"), &raw))?;

        if status == reqwest::StatusCode::ACCEPTED {
            return Err(CortexError::statement(format!(
                "statement {} is still running: {}",
                parsed.statement_handle.as_deref().unwrap_or("unknown"),
                parsed.message.as_deref().unwrap_or("asynchronous execution in progress")
            )));
        }

        let columns = parsed
            .result_set_meta_data
            .map(|meta| meta.row_type.into_iter().map(|r| r.name).collect())
            .unwrap_or_default();
        let rows = parsed
            .data
            .into_iter()
            .map(|row| row.into_iter().map(cell).collect())
            .collect();
        Ok(QueryResult { columns, rows })
    }
}

/// Maps an SQL error body to `Statement`; anything else stays an HTTP error.
async fn statement_failure(response: reqwest::Response) -> CortexError {
    let status = response.status().as_u16();
    let request_id = request_id(&response);
    let raw = match response.text().await {
        Ok(raw) => raw,
        Err(e) => return transport_error(STATEMENTS_PATH, e),
    };
    match serde_json::from_str::<StatementFailure>(&raw) {
        Ok(failure) if failure.sql_state.is_some() || failure.code.is_some() => {
            CortexError::Statement {
                message: match failure.code {
                    Some(code) => format!("{code}: {}", failure.message),
                    None => failure.message,
                },
                sql_state: failure.sql_state,
            }
        }
        _ => CortexError::Http {
            endpoint: STATEMENTS_PATH.to_string(),
            status,
            message: raw,
            request_id,
        },
    }
}

#[async_trait::async_trait]
impl StatementExecutor for SnowflakeClient {
    async fn execute(&self, statement: &Statement) -> Result<QueryResult, CortexError> {
        self.execute_statement(statement).await
    }
}
