//! REST client for the warehouse's Cortex and SQL endpoints.
//!
//! One `SnowflakeClient` implements every backend contract so the assistant
//! can share a single connection pool and token.
mod agent;
mod analyst;
mod columns;
mod config;
mod statements;

pub use agent::{AGENT_RUN_PATH, AgentEventStream};
pub use analyst::ANALYST_MESSAGE_PATH;
pub use columns::{ColumnDefinition, describe_view, split_column_type};
pub use config::{AgentTools, CitationLookup, SnowflakeConfig, TokenKind};
pub use statements::{STATEMENTS_PATH, validate_identifier};

use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, USER_AGENT};

use crate::errors::CortexError;

/// Header carrying the service-side request id.
pub const REQUEST_ID_HEADER: &str = "X-Snowflake-Request-Id";
const TOKEN_TYPE_HEADER: &str = "X-Snowflake-Authorization-Token-Type";
const CLIENT_USER_AGENT: &str = concat!("cortex-chat/", env!("CARGO_PKG_VERSION"));

/// HTTP client bound to one account and token.
#[derive(Clone)]
pub struct SnowflakeClient {
    client: reqwest::Client,
    config: SnowflakeConfig,
}

impl SnowflakeClient {
    pub fn new(config: SnowflakeConfig) -> Result<Self, CortexError> {
        if config.token.trim().is_empty() {
            return Err(CortexError::Config("token must not be empty".into()));
        }
        if config.base_url.trim().is_empty() {
            return Err(CortexError::Config("base_url must not be empty".into()));
        }
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| CortexError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    pub fn from_env() -> Result<Self, CortexError> {
        Self::new(SnowflakeConfig::from_env()?)
    }

    pub fn config(&self) -> &SnowflakeConfig {
        &self.config
    }

    fn post(&self, path: &str, accept: &str) -> reqwest::RequestBuilder {
        let request = self
            .client
            .post(self.config.url(path))
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, accept)
            .header(USER_AGENT, CLIENT_USER_AGENT);
        match self.config.token_kind {
            Some(TokenKind::Session) => request.header(
                AUTHORIZATION,
                format!("Snowflake Token=\"{}\"", self.config.token),
            ),
            kind => {
                let request = request.bearer_auth(&self.config.token);
                match kind.and_then(TokenKind::header_value) {
                    Some(value) => request.header(TOKEN_TYPE_HEADER, value),
                    None => request,
                }
            }
        }
    }
}

fn request_id(response: &reqwest::Response) -> Option<String> {
    response
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(ToOwned::to_owned)
}

fn content_type(response: &reqwest::Response) -> Option<String> {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(ToOwned::to_owned)
}

/// Converts a non-success response into `CortexError::Http`.
async fn http_error(endpoint: &str, response: reqwest::Response) -> CortexError {
    let status = response.status();
    let request_id = request_id(&response);
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<unreadable body>".to_string());
    let message = match status.canonical_reason() {
        Some(reason) if body.trim().is_empty() => reason.to_string(),
        _ => body,
    };
    CortexError::Http {
        endpoint: endpoint.to_string(),
        status: status.as_u16(),
        message,
        request_id,
    }
}

fn transport_error(endpoint: &str, err: reqwest::Error) -> CortexError {
    if err.is_timeout() {
        CortexError::Transport(format!("request to {endpoint} timed out: {err}"))
    } else {
        CortexError::Transport(format!("request to {endpoint} failed: {err}"))
    }
}
