//! Typed model of the agent's server-sent events.
//!
//! Every field is optional on the wire. Defaults are documented per field;
//! anything beyond these fields is ignored rather than rejected.

use serde::{Deserialize, Deserializer, Serialize};

/// The only event kind that carries content.
pub const MESSAGE_DELTA: &str = "message.delta";

/// Outer event record: `{ "event": "...", "data": { ... } }`.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct EventEnvelope {
    /// Event kind; missing means "unknown" and the event is skipped.
    #[serde(default)]
    pub event: Option<String>,
    /// Raw payload, decoded lazily once the kind is known.
    #[serde(default)]
    pub data: serde_json::Value,
}

impl EventEnvelope {
    pub fn is_message_delta(&self) -> bool {
        self.event.as_deref() == Some(MESSAGE_DELTA)
    }
}

/// Payload of a `message.delta` event.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct DeltaData {
    /// Defaults to an empty delta.
    #[serde(default, deserialize_with = "null_as_default")]
    pub delta: Delta,
}

/// Incremental content attached to one event.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct Delta {
    /// Items are kept raw so each one can be decoded (and fail) on its own.
    #[serde(default, deserialize_with = "null_as_default")]
    pub content: Vec<serde_json::Value>,
}

/// One entry of a delta's content list.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentItem {
    /// Plain text fragment; missing text is the empty string.
    Text {
        #[serde(default)]
        text: Option<String>,
    },
    /// Results produced by a tool (text-to-SQL, search).
    ToolResults {
        #[serde(default, deserialize_with = "null_as_default")]
        tool_results: ToolResults,
    },
    /// Any other content kind; tolerated and ignored.
    #[serde(other)]
    Unknown,
}

/// Wrapper around the entries of a `tool_results` item.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct ToolResults {
    #[serde(default, deserialize_with = "null_as_default")]
    pub content: Vec<serde_json::Value>,
}

/// One entry of `tool_results.content`.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolResultEntry {
    Json {
        #[serde(default, deserialize_with = "null_as_default")]
        json: ToolJson,
    },
    #[serde(other)]
    Other,
}

/// Free-form JSON result of a tool call.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct ToolJson {
    /// Incremental answer text; defaults to empty.
    #[serde(default)]
    pub text: Option<String>,
    /// Search hits to cite; defaults to none.
    #[serde(default, rename = "searchResults", deserialize_with = "null_as_default")]
    pub search_results: Vec<SearchResultCitation>,
    /// Generated query; empty or missing leaves the previous query in place.
    #[serde(default)]
    pub sql: Option<String>,
}

/// Reference from displayed text back to an indexed record.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SearchResultCitation {
    /// Label shown to the user (for example `1`).
    #[serde(default, deserialize_with = "lenient_string")]
    pub source_id: String,
    /// Identifier of the underlying record.
    #[serde(default, deserialize_with = "lenient_string")]
    pub doc_id: String,
}

impl SearchResultCitation {
    pub fn new(source_id: impl Into<String>, doc_id: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            doc_id: doc_id.into(),
        }
    }
}

/// Returns the `type` tag of a raw item, if it has a string one.
pub(crate) fn type_tag(value: &serde_json::Value) -> Option<&str> {
    value.get("type").and_then(serde_json::Value::as_str)
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// Search services return numeric ids for some indexes.
fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error as _;

    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Null => Ok(String::new()),
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        serde_json::Value::Bool(b) => Ok(b.to_string()),
        other => Err(D::Error::custom(format!(
            "expected string or number, found {other}"
        ))),
    }
}
