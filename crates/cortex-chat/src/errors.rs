/// Number of raw payload characters kept in `MalformedResponse` snippets.
const SNIPPET_CHARS: usize = 200;

/// Top-level error type for the public client API.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CortexError {
    /// Invalid client or tool configuration.
    #[error("config error: {0}")]
    Config(String),
    /// Invalid caller input (empty question, bad identifier, etc.).
    #[error("validation error: {0}")]
    Validation(String),
    /// Endpoint answered with a non-success HTTP status.
    #[error(
        "failed request (id: {}) to {endpoint} with status {status}: {message}",
        .request_id.as_deref().unwrap_or("unknown")
    )]
    Http {
        endpoint: String,
        status: u16,
        message: String,
        request_id: Option<String>,
    },
    /// Network or body I/O failed.
    #[error("transport error: {0}")]
    Transport(String),
    /// The transport payload could not be parsed into its structured form.
    ///
    /// Callers must not treat any partially gathered text as valid.
    #[error("malformed response: {message} (raw: {snippet})")]
    MalformedResponse { message: String, snippet: String },
    /// SQL statement execution failed or did not finish synchronously.
    #[error("statement error: {message}")]
    Statement {
        message: String,
        sql_state: Option<String>,
    },
}

impl CortexError {
    /// Creates a `MalformedResponse` error, keeping a short prefix of the raw payload.
    pub fn malformed(message: impl Into<String>, raw: &str) -> Self {
        Self::MalformedResponse {
            message: message.into(),
            snippet: snippet(raw),
        }
    }

    pub(crate) fn statement(message: impl Into<String>) -> Self {
        Self::Statement {
            message: message.into(),
            sql_state: None,
        }
    }

    /// Returns true when the error came from the transport layer and the
    /// whole operation must be aborted.
    pub fn is_transport_level(&self) -> bool {
        matches!(
            self,
            Self::Http { .. } | Self::Transport(_) | Self::MalformedResponse { .. }
        )
    }
}

fn snippet(raw: &str) -> String {
    let mut out: String = raw.chars().take(SNIPPET_CHARS).collect();
    if raw.chars().nth(SNIPPET_CHARS).is_some() {
        out.push_str("...");
    }
    out
}

/// A unit (event or content item) the reducer could not apply.
///
/// Warnings never abort a reduction; the unit contributes nothing and the
/// reducer moves on to the next one.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, serde::Serialize)]
#[error("{}: {message}", location(.event_index, .item_index))]
pub struct ReductionWarning {
    /// Zero-based position of the event in the stream.
    pub event_index: usize,
    /// Zero-based position of the content item inside the event's delta.
    pub item_index: Option<usize>,
    pub message: String,
}

impl ReductionWarning {
    pub(crate) fn event(event_index: usize, message: impl Into<String>) -> Self {
        Self {
            event_index,
            item_index: None,
            message: message.into(),
        }
    }

    pub(crate) fn item(event_index: usize, item_index: usize, message: impl Into<String>) -> Self {
        Self {
            event_index,
            item_index: Some(item_index),
            message: message.into(),
        }
    }
}

fn location(event_index: &usize, item_index: &Option<usize>) -> String {
    match item_index {
        Some(item) => format!("event #{event_index} item #{item}"),
        None => format!("event #{event_index}"),
    }
}
