//! Contracts for the remote collaborators the assistant talks to.
//!
//! `vendors::snowflake::SnowflakeClient` implements all three; tests use fakes.

use crate::errors::CortexError;
use crate::model::{AgentRequest, AnalystRequest, AnalystResponse};

/// Produces the raw event payload of one agent run.
#[async_trait::async_trait]
pub trait AgentBackend: Send + Sync {
    /// Sends the request and returns the parsed transport payload.
    ///
    /// Malformed payloads must be reported as `CortexError::MalformedResponse`.
    async fn run_agent(&self, request: &AgentRequest) -> Result<serde_json::Value, CortexError>;
}

/// Answers analyst (text-to-SQL) questions.
#[async_trait::async_trait]
pub trait AnalystBackend: Send + Sync {
    async fn send_analyst(&self, request: &AnalystRequest)
    -> Result<AnalystResponse, CortexError>;
}

/// Executes SQL and returns tabular results.
#[async_trait::async_trait]
pub trait StatementExecutor: Send + Sync {
    async fn execute(&self, statement: &Statement) -> Result<QueryResult, CortexError>;
}

/// A SQL statement with positional (`?`) text bindings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Statement {
    pub sql: String,
    pub bindings: Vec<String>,
}

impl Statement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            bindings: Vec::new(),
        }
    }

    /// Binds the next `?` placeholder to a text value.
    pub fn bind(mut self, value: impl Into<String>) -> Self {
        self.bindings.push(value.into());
        self
    }

    /// SQL as submitted: trimmed, without trailing semicolons.
    pub fn normalized_sql(&self) -> &str {
        self.sql.trim().trim_end_matches(|c: char| c == ';' || c.is_whitespace())
    }
}

/// Tabular query output. Cells are strings as returned by the service.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl QueryResult {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// First column of the first row, if present and not null.
    pub fn first_cell(&self) -> Option<&str> {
        self.rows.first()?.first()?.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalized_sql_strips_trailing_semicolons_only() {
        let statement = Statement::new("  SELECT ';' AS x;; \n");
        assert_eq!(statement.normalized_sql(), "SELECT ';' AS x");
    }

    #[test]
    fn first_cell_skips_nulls_and_empty_results() {
        assert_eq!(QueryResult::default().first_cell(), None);
        let result = QueryResult {
            columns: vec!["A".into()],
            rows: vec![vec![None]],
        };
        assert_eq!(result.first_cell(), None);
        let result = QueryResult {
            columns: vec!["A".into()],
            rows: vec![vec![Some("x".into())]],
        };
        assert_eq!(result.first_cell(), Some("x"));
        assert_eq!(result.len(), 1);
    }
}
