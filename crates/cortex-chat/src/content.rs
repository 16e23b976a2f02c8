use crate::backend::QueryResult;
use crate::errors::CortexError;
use crate::events::SearchResultCitation;
use crate::model::AnalystContent;
use crate::reduce::Reduction;

const CITATION_OPEN: &str = "【†";
const CITATION_CLOSE: &str = "†】";
const BULLET: &str = "•";

/// Rewrites the model's inline citation markers `【†n†】` as `[n]`.
pub fn normalize_citation_markers(text: &str) -> String {
    text.replace(CITATION_OPEN, "[").replace(CITATION_CLOSE, "]")
}

/// Turns bullet separators into paragraph breaks.
pub fn paragraph_breaks(text: &str) -> String {
    text.replace(BULLET, "\n\n")
}

/// Applies every display substitution.
pub fn display_text(text: &str) -> String {
    paragraph_breaks(&normalize_citation_markers(text))
}

/// Applies `display_text` to text that arrives in fragments.
///
/// A trailing `【` or `†` that could still start a marker is held back until
/// the next fragment, so the concatenated output equals `display_text` of the
/// whole text.
#[derive(Debug, Default)]
pub struct StreamingDisplay {
    held: String,
}

impl StreamingDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the display text that is safe to print after `fragment`.
    pub fn push(&mut self, fragment: &str) -> String {
        self.held.push_str(fragment);
        let keep = held_suffix_len(&self.held);
        let ready: String = self.held.drain(..self.held.len() - keep).collect();
        display_text(&ready)
    }

    /// Returns whatever is still held back.
    pub fn finish(&mut self) -> String {
        display_text(&std::mem::take(&mut self.held))
    }
}

fn held_suffix_len(text: &str) -> usize {
    let open = first_char(CITATION_OPEN);
    let close = first_char(CITATION_CLOSE);
    let mut chars = text.chars().rev();
    match (chars.next(), chars.next()) {
        (Some(last), _) if last == open => last.len_utf8(),
        // `【†` is complete; the `†` belongs to it.
        (Some(last), Some(prev)) if last == close && prev == open => 0,
        (Some(last), _) if last == close => last.len_utf8(),
        _ => 0,
    }
}

fn first_char(marker: &str) -> char {
    marker.chars().next().unwrap_or_default()
}

/// A citation together with the supporting record it points at.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedCitation {
    pub citation: SearchResultCitation,
    /// `None` when the record was missing or the lookup failed.
    pub transcript: Option<String>,
}

impl ResolvedCitation {
    /// Transcript text, or the placeholder shown when none is available.
    pub fn transcript_or_placeholder(&self) -> &str {
        self.transcript
            .as_deref()
            .unwrap_or("No transcript available")
    }
}

/// Outcome of one agent question.
#[derive(Debug)]
pub struct AgentTurn {
    /// Raw reduction; `text` keeps the model's original markers.
    pub reduction: Reduction,
    /// Text with citation markers normalized, as stored in the session.
    pub text: String,
    pub citations: Vec<ResolvedCitation>,
    /// Result of running the generated SQL, when there was any and it was run.
    pub sql_result: Option<Result<QueryResult, CortexError>>,
}

impl AgentTurn {
    /// Text ready for display (markers normalized, bullets expanded).
    pub fn display_text(&self) -> String {
        paragraph_breaks(&self.text)
    }

    pub fn sql(&self) -> Option<&str> {
        self.reduction.sql()
    }
}

/// Outcome of one analyst question.
#[derive(Debug)]
pub struct AnalystTurn {
    pub request_id: Option<String>,
    pub content: Vec<AnalystContent>,
    /// One entry per `sql` content item, in order, when execution was requested.
    pub sql_results: Vec<(String, Result<QueryResult, CortexError>)>,
}

impl AnalystTurn {
    /// Concatenated text parts.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for part in &self.content {
            if let AnalystContent::Text { text } = part {
                if !out.is_empty() {
                    out.push('\n');
                }
                out.push_str(text);
            }
        }
        out
    }

    /// Suggested follow-up questions, in order.
    pub fn suggestions(&self) -> Vec<String> {
        self.content
            .iter()
            .filter_map(|part| match part {
                AnalystContent::Suggestions { suggestions } => Some(suggestions.clone()),
                _ => None,
            })
            .flatten()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_substitutions_apply_globally() {
        assert_eq!(display_text("A【†1†】B•C"), "A[1]B\n\nC");
        assert_eq!(
            display_text("x【†1†】【†2†】•y•z"),
            "x[1][2]\n\ny\n\nz"
        );
    }

    #[test]
    fn marker_normalization_leaves_bullets() {
        assert_eq!(normalize_citation_markers("a•【†3†】"), "a•[3]");
        assert_eq!(paragraph_breaks("plain"), "plain");
    }

    #[test]
    fn streamed_markers_split_across_fragments() {
        let mut display = StreamingDisplay::new();
        let mut out = display.push("Deals closed 【");
        out += &display.push("†1†");
        out += &display.push("】 today•done");
        out += &display.finish();
        assert_eq!(out, "Deals closed [1] today\n\ndone");
    }

    #[test]
    fn streamed_output_matches_whole_text_at_every_split() {
        let text = "A【†1†】【†】†x【B•【††】†";
        let expected = display_text(text);
        let bounds: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
        for &a in &bounds {
            for &b in bounds.iter().filter(|&&b| b >= a) {
                let mut display = StreamingDisplay::new();
                let mut out = display.push(&text[..a]);
                out += &display.push(&text[a..b]);
                out += &display.push(&text[b..]);
                out += &display.finish();
                assert_eq!(out, expected, "split at {a} and {b}");
            }
        }
    }

    #[test]
    fn trailing_marker_start_is_flushed_on_finish() {
        let mut display = StreamingDisplay::new();
        assert_eq!(display.push("cost †"), "cost ");
        assert_eq!(display.finish(), "†");
    }

    #[test]
    fn analyst_turn_collects_text_and_suggestions() {
        let turn = AnalystTurn {
            request_id: None,
            content: vec![
                AnalystContent::Text { text: "first".into() },
                AnalystContent::Suggestions {
                    suggestions: vec!["a".into(), "b".into()],
                },
                AnalystContent::Text { text: "second".into() },
            ],
            sql_results: Vec::new(),
        };
        assert_eq!(turn.text(), "first\nsecond");
        assert_eq!(turn.suggestions(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn missing_transcript_uses_placeholder() {
        let resolved = ResolvedCitation {
            citation: SearchResultCitation::new("1", "d"),
            transcript: None,
        };
        assert_eq!(resolved.transcript_or_placeholder(), "No transcript available");
    }
}
