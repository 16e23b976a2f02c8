use std::time::Duration;

use crate::backend::Statement;
use crate::errors::CortexError;
use crate::model::{AgentRequest, DEFAULT_AGENT_MODEL};

use super::statements::validate_identifier;

/// How the bearer token was issued; sent as `X-Snowflake-Authorization-Token-Type`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenKind {
    Oauth,
    KeypairJwt,
    ProgrammaticAccessToken,
    /// Session token from a connector login, sent as `Snowflake Token="..."`.
    Session,
}

impl TokenKind {
    pub fn parse(value: &str) -> Result<Self, CortexError> {
        match value.trim().to_ascii_uppercase().as_str() {
            "OAUTH" => Ok(Self::Oauth),
            "KEYPAIR_JWT" | "JWT" => Ok(Self::KeypairJwt),
            "PROGRAMMATIC_ACCESS_TOKEN" | "PAT" => Ok(Self::ProgrammaticAccessToken),
            "SESSION" => Ok(Self::Session),
            other => Err(CortexError::Config(format!(
                "unsupported SNOWFLAKE_TOKEN_TYPE: {other}"
            ))),
        }
    }

    pub(crate) fn header_value(self) -> Option<&'static str> {
        match self {
            Self::Oauth => Some("OAUTH"),
            Self::KeypairJwt => Some("KEYPAIR_JWT"),
            Self::ProgrammaticAccessToken => Some("PROGRAMMATIC_ACCESS_TOKEN"),
            Self::Session => None,
        }
    }
}

/// Connection settings for the REST endpoints.
#[derive(Clone, Debug)]
pub struct SnowflakeConfig {
    /// Account URL, for example `https://myorg-myaccount.snowflakecomputing.com`.
    pub base_url: String,
    pub token: String,
    /// `None` lets the service infer the token type.
    pub token_kind: Option<TokenKind>,
    pub agent_timeout: Duration,
    pub analyst_timeout: Duration,
    pub statement_timeout: Duration,
    pub database: Option<String>,
    pub schema: Option<String>,
    pub warehouse: Option<String>,
    pub role: Option<String>,
}

impl SnowflakeConfig {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: token.into(),
            token_kind: None,
            agent_timeout: Duration::from_millis(50_000),
            analyst_timeout: Duration::from_millis(30_000),
            statement_timeout: Duration::from_secs(60),
            database: None,
            schema: None,
            warehouse: None,
            role: None,
        }
    }

    /// Builds a config from `SNOWFLAKE_*` environment variables.
    pub fn from_env() -> Result<Self, CortexError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from any key lookup (environment, `.env` map, tests).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, CortexError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let base_url = match (get("SNOWFLAKE_HOST_URL"), get("SNOWFLAKE_ACCOUNT")) {
            (Some(host), _) if host.contains("://") => host,
            (Some(host), _) => format!("https://{host}"),
            (None, Some(account)) => format!("https://{account}.snowflakecomputing.com"),
            (None, None) => {
                return Err(CortexError::Config(
                    "missing SNOWFLAKE_HOST_URL or SNOWFLAKE_ACCOUNT".into(),
                ));
            }
        };
        let token = get("SNOWFLAKE_TOKEN")
            .ok_or_else(|| CortexError::Config("missing SNOWFLAKE_TOKEN".into()))?;

        let mut config = Self::new(base_url, token);
        config.token_kind = get("SNOWFLAKE_TOKEN_TYPE")
            .map(|v| TokenKind::parse(&v))
            .transpose()?;
        config.database = get("SNOWFLAKE_DATABASE");
        config.schema = get("SNOWFLAKE_SCHEMA");
        config.warehouse = get("SNOWFLAKE_WAREHOUSE");
        config.role = get("SNOWFLAKE_ROLE");
        if let Some(ms) = get("CORTEX_AGENT_TIMEOUT_MS") {
            let ms = parse_number(&ms, "CORTEX_AGENT_TIMEOUT_MS")?;
            config.agent_timeout = Duration::from_millis(ms);
        }
        Ok(config)
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.agent_timeout = timeout;
        self.analyst_timeout = timeout;
        self.statement_timeout = timeout;
        self
    }

    pub fn token_kind(mut self, kind: TokenKind) -> Self {
        self.token_kind = Some(kind);
        self
    }

    pub fn warehouse(mut self, warehouse: impl Into<String>) -> Self {
        self.warehouse = Some(warehouse.into());
        self
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}

/// Which tools the agent may use and how they are wired.
#[derive(Clone, Debug, PartialEq)]
pub struct AgentTools {
    pub model: String,
    /// Staged semantic model for text-to-SQL, e.g. `@db.schema.stage/model.yml`.
    pub semantic_model_file: Option<String>,
    /// Fully qualified search service name.
    pub search_service: Option<String>,
    pub max_results: u32,
    pub id_column: String,
    pub analyst_tool_name: String,
    pub search_tool_name: String,
}

impl Default for AgentTools {
    fn default() -> Self {
        Self {
            model: DEFAULT_AGENT_MODEL.to_string(),
            semantic_model_file: None,
            search_service: None,
            max_results: 10,
            id_column: "conversation_id".to_string(),
            analyst_tool_name: "analyst1".to_string(),
            search_tool_name: "search1".to_string(),
        }
    }
}

impl AgentTools {
    pub fn from_env() -> Result<Self, CortexError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, CortexError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut tools = Self::default();
        if let Some(model) = get("CORTEX_AGENT_MODEL") {
            tools.model = model;
        }
        tools.semantic_model_file = get("CORTEX_SEMANTIC_MODEL_FILE");
        tools.search_service = get("CORTEX_SEARCH_SERVICE");
        if let Some(max) = get("CORTEX_SEARCH_MAX_RESULTS") {
            tools.max_results = parse_number(&max, "CORTEX_SEARCH_MAX_RESULTS")?;
        }
        if let Some(column) = get("CORTEX_SEARCH_ID_COLUMN") {
            tools.id_column = column;
        }
        Ok(tools)
    }

    pub fn max_results(mut self, max_results: u32) -> Self {
        self.max_results = max_results;
        self
    }

    /// Builds a single-question agent request with every configured tool.
    pub fn request(&self, question: &str) -> AgentRequest {
        let mut request = AgentRequest::new(&self.model).user_text(question);
        if let Some(file) = &self.semantic_model_file {
            request = request.analyst_tool(&self.analyst_tool_name, file);
        }
        if let Some(service) = &self.search_service {
            request = request.search_tool(
                &self.search_tool_name,
                service,
                self.max_results,
                &self.id_column,
            );
        }
        request
    }
}

/// Where the full text behind a citation's `doc_id` lives.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CitationLookup {
    pub table: String,
    pub text_column: String,
    pub id_column: String,
}

impl Default for CitationLookup {
    fn default() -> Self {
        Self {
            table: "sales_conversations".to_string(),
            text_column: "transcript_text".to_string(),
            id_column: "conversation_id".to_string(),
        }
    }
}

impl CitationLookup {
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut citations = Self::default();
        if let Some(table) = get("CORTEX_CITATION_TABLE") {
            citations.table = table;
        }
        if let Some(column) = get("CORTEX_CITATION_TEXT_COLUMN") {
            citations.text_column = column;
        }
        if let Some(column) = get("CORTEX_SEARCH_ID_COLUMN") {
            citations.id_column = column;
        }
        citations
    }

    /// Builds the lookup query for one document, with the id bound, not spliced.
    pub fn statement(&self, doc_id: &str) -> Result<Statement, CortexError> {
        validate_identifier(&self.table)?;
        validate_identifier(&self.text_column)?;
        validate_identifier(&self.id_column)?;
        Ok(Statement::new(format!(
            "SELECT {} FROM {} WHERE {} = ?",
            self.text_column, self.table, self.id_column
        ))
        .bind(doc_id))
    }
}

fn parse_number<T: std::str::FromStr>(value: &str, key: &str) -> Result<T, CortexError> {
    value
        .trim()
        .parse()
        .map_err(|_| CortexError::Config(format!("{key} must be a number, got {value:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn config_prefers_host_url_and_reads_context() {
        let config = SnowflakeConfig::from_lookup(lookup(&[
            ("SNOWFLAKE_HOST_URL", "org-acct.snowflakecomputing.com"),
            ("SNOWFLAKE_ACCOUNT", "ignored"),
            ("SNOWFLAKE_TOKEN", "t"),
            ("SNOWFLAKE_TOKEN_TYPE", "keypair_jwt"),
            ("SNOWFLAKE_WAREHOUSE", "wh"),
        ]))
        .expect("config");
        assert_eq!(config.base_url, "https://org-acct.snowflakecomputing.com");
        assert_eq!(config.token_kind, Some(TokenKind::KeypairJwt));
        assert_eq!(config.warehouse.as_deref(), Some("wh"));
        assert_eq!(config.database, None);
        assert_eq!(config.agent_timeout, Duration::from_millis(50_000));
        assert_eq!(
            config.url("/api/v2/statements"),
            "https://org-acct.snowflakecomputing.com/api/v2/statements"
        );
    }

    #[test]
    fn config_from_account_and_missing_token() {
        let err = SnowflakeConfig::from_lookup(lookup(&[("SNOWFLAKE_ACCOUNT", "acct")]))
            .expect_err("token required");
        assert!(matches!(err, CortexError::Config(msg) if msg.contains("SNOWFLAKE_TOKEN")));

        let config = SnowflakeConfig::from_lookup(lookup(&[
            ("SNOWFLAKE_ACCOUNT", "acct"),
            ("SNOWFLAKE_TOKEN", "t"),
        ]))
        .expect("config");
        assert_eq!(config.base_url, "https://acct.snowflakecomputing.com");

        let err = SnowflakeConfig::from_lookup(lookup(&[("SNOWFLAKE_TOKEN", "t")]))
            .expect_err("host required");
        assert!(matches!(err, CortexError::Config(_)));
    }

    #[test]
    fn agent_tools_only_include_configured_tools() {
        let tools = AgentTools::from_lookup(lookup(&[
            ("CORTEX_SEARCH_SERVICE", "db.s.search"),
            ("CORTEX_SEARCH_MAX_RESULTS", "3"),
        ]))
        .expect("tools");
        let request = tools.request("who called?");
        assert_eq!(request.model, DEFAULT_AGENT_MODEL);
        assert_eq!(request.tools.len(), 1);
        assert_eq!(request.tools[0].tool_spec.name, "search1");
        request.validate().expect("valid");

        let err = AgentTools::from_lookup(lookup(&[("CORTEX_SEARCH_MAX_RESULTS", "many")]))
            .expect_err("not a number");
        assert!(matches!(
            err,
            CortexError::Config(msg) if msg.contains("CORTEX_SEARCH_MAX_RESULTS")
        ));
    }

    #[test]
    fn citation_lookup_binds_doc_id() {
        let statement = CitationLookup::default()
            .statement("abc' OR '1'='1")
            .expect("statement");
        assert_eq!(
            statement.sql,
            "SELECT transcript_text FROM sales_conversations WHERE conversation_id = ?"
        );
        assert_eq!(statement.bindings, vec!["abc' OR '1'='1".to_string()]);

        let bad = CitationLookup {
            table: "t; DROP TABLE x".into(),
            ..CitationLookup::default()
        };
        assert!(matches!(bad.statement("d"), Err(CortexError::Validation(_))));
    }

    #[test]
    fn token_kind_parsing() {
        assert_eq!(TokenKind::parse("pat").expect("pat"), TokenKind::ProgrammaticAccessToken);
        assert_eq!(TokenKind::Session.header_value(), None);
        assert!(TokenKind::parse("basic").is_err());
    }
}
