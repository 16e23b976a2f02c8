//! Single-pass reducer that folds agent events into text, SQL and citations.

use serde::Deserialize as _;
use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::errors::ReductionWarning;
use crate::events::{
    ContentItem, DeltaData, EventEnvelope, SearchResultCitation, ToolJson, ToolResultEntry,
    type_tag,
};

/// Accumulated result of reducing one response.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize)]
pub struct Reduction {
    /// Every text fragment, in encounter order.
    pub text: String,
    /// Last non-empty generated query, or empty.
    pub sql: String,
    /// Every search result, in encounter order, duplicates kept.
    pub citations: Vec<SearchResultCitation>,
    /// Units that could not be applied.
    pub warnings: Vec<ReductionWarning>,
}

impl Reduction {
    /// Returns the generated query, if any.
    pub fn sql(&self) -> Option<&str> {
        Some(self.sql.as_str()).filter(|sql| !sql.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty() && self.sql.is_empty() && self.citations.is_empty()
    }
}

/// Reduces a parsed transport payload.
///
/// Anything other than an array of events (null, a bare string, an object)
/// is degenerate input and yields an empty reduction.
pub fn reduce(payload: &Value) -> Reduction {
    match payload {
        Value::Array(events) => reduce_events(events),
        Value::Null => Reduction::default(),
        other => {
            debug!(kind = value_kind(other), "response is not an event sequence");
            Reduction::default()
        }
    }
}

/// Reduces an already split sequence of events.
pub fn reduce_events(events: &[Value]) -> Reduction {
    let mut reducer = StreamReducer::new();
    for event in events {
        reducer.push_event(event);
    }
    reducer.finish()
}

/// Incremental reducer; one instance per response.
#[derive(Debug, Default)]
pub struct StreamReducer {
    acc: Reduction,
    next_event: usize,
}

impl StreamReducer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one event and records a warning instead of failing.
    ///
    /// Returns the number of text bytes appended by this event.
    pub fn push_event(&mut self, event: &Value) -> usize {
        let before = self.acc.text.len();
        if let Err(warning) = self.apply_event(event) {
            self.record(warning);
        }
        self.acc.text.len() - before
    }

    /// Applies one event.
    ///
    /// Only envelope-level failures are returned; failing content items are
    /// recorded as warnings and the remaining items are still applied.
    pub fn apply_event(&mut self, event: &Value) -> Result<(), ReductionWarning> {
        let index = self.next_event;
        self.next_event += 1;

        if !event.is_object() {
            return Err(ReductionWarning::event(
                index,
                format!("expected an event object, found {}", value_kind(event)),
            ));
        }
        let envelope = EventEnvelope::deserialize(event)
            .map_err(|e| ReductionWarning::event(index, format!("invalid event: {e}")))?;
        if !envelope.is_message_delta() {
            trace!(event_index = index, kind = ?envelope.event, "skipping event");
            return Ok(());
        }
        let data = if envelope.data.is_null() {
            DeltaData::default()
        } else {
            DeltaData::deserialize(&envelope.data)
                .map_err(|e| ReductionWarning::event(index, format!("invalid delta: {e}")))?
        };

        for (item_index, item) in data.delta.content.iter().enumerate() {
            if let Err(warning) = self.apply_item_at(index, item_index, item) {
                self.record(warning);
            }
        }
        Ok(())
    }

    /// Applies a single content item as if it belonged to the most recent event.
    pub fn apply_content_item(&mut self, item: &Value) -> Result<(), ReductionWarning> {
        let event_index = self.next_event.saturating_sub(1);
        self.apply_item_at(event_index, 0, item)
    }

    fn apply_item_at(
        &mut self,
        event_index: usize,
        item_index: usize,
        item: &Value,
    ) -> Result<(), ReductionWarning> {
        let fail = |message: String| ReductionWarning::item(event_index, item_index, message);

        if type_tag(item).is_none() {
            if !item.is_object() {
                return Err(fail(format!(
                    "expected a content object, found {}",
                    value_kind(item)
                )));
            }
            return Ok(());
        }
        let decoded: ContentItem = serde_json::from_value(item.clone())
            .map_err(|e| fail(format!("invalid content item: {e}")))?;

        match decoded {
            ContentItem::Text { text } => {
                self.acc.text.push_str(text.as_deref().unwrap_or_default());
            }
            ContentItem::ToolResults { tool_results } => {
                // Decode every entry before touching the accumulators.
                let mut payloads = Vec::new();
                for entry in &tool_results.content {
                    if type_tag(entry).is_none() {
                        continue;
                    }
                    let entry: ToolResultEntry = serde_json::from_value(entry.clone())
                        .map_err(|e| fail(format!("invalid tool result: {e}")))?;
                    if let ToolResultEntry::Json { json } = entry {
                        payloads.push(json);
                    }
                }
                for json in payloads {
                    self.apply_tool_json(json);
                }
            }
            ContentItem::Unknown => {
                trace!(event_index, item_index, kind = ?type_tag(item), "skipping content item");
            }
        }
        Ok(())
    }

    fn apply_tool_json(&mut self, json: ToolJson) {
        if let Some(text) = json.text {
            self.acc.text.push_str(&text);
        }
        self.acc.citations.extend(json.search_results);
        if let Some(sql) = json.sql.filter(|sql| !sql.is_empty()) {
            if !self.acc.sql.is_empty() && self.acc.sql != sql {
                debug!("replacing previously generated SQL with a later tool result");
            }
            self.acc.sql = sql;
        }
    }

    fn record(&mut self, warning: ReductionWarning) {
        warn!(%warning, "skipping unreadable response unit");
        self.acc.warnings.push(warning);
    }

    /// Borrowed view of what has been accumulated so far.
    pub fn snapshot(&self) -> &Reduction {
        &self.acc
    }

    /// Number of events seen so far.
    pub fn events_seen(&self) -> usize {
        self.next_event
    }

    pub fn finish(self) -> Reduction {
        self.acc
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn delta(content: Value) -> Value {
        json!({"event": "message.delta", "data": {"delta": {"content": content}}})
    }

    fn tool_json(json: Value) -> Value {
        json!({"type": "tool_results", "tool_results": {"content": [
            {"type": "json", "json": json}
        ]}})
    }

    #[test]
    fn reduces_text_and_tool_results_in_order() {
        let payload = json!([
            delta(json!([{"type": "text", "text": "Hello "}])),
            delta(json!([tool_json(json!({
                "text": "world",
                "sql": "SELECT 1",
                "searchResults": [{"source_id": "s1", "doc_id": "d1"}]
            }))])),
        ]);
        let out = reduce(&payload);
        assert_eq!(out.text, "Hello world");
        assert_eq!(out.sql, "SELECT 1");
        assert_eq!(out.citations, vec![SearchResultCitation::new("s1", "d1")]);
        assert!(out.warnings.is_empty());
    }

    #[test]
    fn degenerate_inputs_reduce_to_empty() {
        for payload in [json!([]), Value::Null, json!("plain string"), json!({"event": "x"})] {
            let out = reduce(&payload);
            assert_eq!(out, Reduction::default(), "payload: {payload}");
        }
    }

    #[test]
    fn sql_is_last_write_wins_across_events() {
        let payload = json!([
            delta(json!([tool_json(json!({"sql": "SELECT 1"}))])),
            delta(json!([tool_json(json!({"sql": ""}))])),
            delta(json!([tool_json(json!({"sql": "SELECT 2"}))])),
            delta(json!([tool_json(json!({"text": "done"}))])),
        ]);
        let out = reduce(&payload);
        assert_eq!(out.sql(), Some("SELECT 2"));
        assert_eq!(out.text, "done");
    }

    #[test]
    fn citations_keep_duplicates_and_order() {
        let payload = json!([
            delta(json!([tool_json(json!({"searchResults": [
                {"source_id": "1", "doc_id": "a"},
                {"source_id": "1", "doc_id": "a"}
            ]}))])),
            delta(json!([tool_json(json!({"searchResults": [{"doc_id": "b"}]}))])),
        ]);
        let out = reduce(&payload);
        assert_eq!(
            out.citations,
            vec![
                SearchResultCitation::new("1", "a"),
                SearchResultCitation::new("1", "a"),
                SearchResultCitation::new("", "b"),
            ]
        );
    }

    #[test]
    fn other_event_kinds_and_item_types_contribute_nothing() {
        let payload = json!([
            {"event": "response.status", "data": {"delta": {"content": [
                {"type": "text", "text": "no"}
            ]}}},
            {"data": {"delta": {"content": [{"type": "text", "text": "no"}]}}},
            delta(json!([
                {"type": "chart", "text": "no"},
                {"text": "untyped"},
                {"type": "tool_results", "tool_results": {"content": [
                    {"type": "search", "json": {"text": "no"}}
                ]}},
                {"type": "text", "text": "yes"}
            ])),
        ]);
        let out = reduce(&payload);
        assert_eq!(out.text, "yes");
        assert!(out.citations.is_empty());
        assert!(out.warnings.is_empty());
    }

    #[test]
    fn malformed_item_is_skipped_and_reduction_continues() {
        let payload = json!([
            delta(json!([
                {"type": "text", "text": "a"},
                {"type": "text", "text": 42},
                {"type": "text", "text": "b"}
            ])),
            "not an event",
            delta(json!([{"type": "text", "text": "c"}])),
        ]);
        let out = reduce(&payload);
        assert_eq!(out.text, "abc");
        assert_eq!(out.warnings.len(), 2);
        assert_eq!(out.warnings[0].event_index, 0);
        assert_eq!(out.warnings[0].item_index, Some(1));
        assert_eq!(out.warnings[1].event_index, 1);
        assert_eq!(out.warnings[1].item_index, None);
    }

    #[test]
    fn failing_tool_result_item_contributes_nothing() {
        let payload = json!([delta(json!([
            {"type": "tool_results", "tool_results": {"content": [
                {"type": "json", "json": {"text": "partial", "sql": "SELECT 1"}},
                {"type": "json", "json": {"searchResults": "oops"}}
            ]}}
        ]))]);
        let out = reduce(&payload);
        assert_eq!(out.text, "");
        assert_eq!(out.sql, "");
        assert_eq!(out.warnings.len(), 1);
    }

    #[test]
    fn invalid_delta_shape_is_an_event_warning() {
        let mut reducer = StreamReducer::new();
        let err = reducer
            .apply_event(&json!({"event": "message.delta", "data": {"delta": {"content": "x"}}}))
            .expect_err("content must be a list");
        assert_eq!(err.event_index, 0);
        assert_eq!(reducer.events_seen(), 1);
        assert!(reducer.snapshot().is_empty());
    }

    #[test]
    fn incremental_push_reports_appended_text() {
        let mut reducer = StreamReducer::new();
        assert_eq!(reducer.push_event(&delta(json!([{"type": "text", "text": "Hi"}]))), 2);
        assert_eq!(reducer.push_event(&json!({"event": "done"})), 0);
        reducer
            .apply_content_item(&json!({"type": "text", "text": "!"}))
            .expect("apply");
        assert_eq!(reducer.snapshot().text, "Hi!");
        assert_eq!(reducer.finish().text, "Hi!");
    }

    #[test]
    fn missing_fields_default_to_empty() {
        let payload = json!([
            {"event": "message.delta"},
            {"event": "message.delta", "data": {"delta": null}},
            delta(json!([
                {"type": "text"},
                {"type": "tool_results"},
                {"type": "tool_results", "tool_results": {"content": [{"type": "json"}]}}
            ])),
        ]);
        let out = reduce(&payload);
        assert!(out.is_empty());
        assert!(out.warnings.is_empty());
    }
}
