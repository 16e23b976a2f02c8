use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::model::Role;

/// One entry of a conversation history.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct ChatMessage {
    pub role: Role,
    /// Stored with citation markers normalized; bullets are expanded at display time.
    pub content: String,
    pub request_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Conversation state owned by the caller of the reducer.
///
/// The reducer never sees this type; the assistant records turns into it.
#[derive(Clone, Debug)]
pub struct ChatSession {
    id: uuid::Uuid,
    name: String,
    created_at: DateTime<Utc>,
    messages: Vec<ChatMessage>,
    suggestions: Vec<String>,
    active_suggestion: Option<String>,
}

impl ChatSession {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            name: name.into(),
            created_at: Utc::now(),
            messages: Vec::new(),
            suggestions: Vec::new(),
            active_suggestion: None,
        }
    }

    pub fn id(&self) -> uuid::Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn push(&mut self, role: Role, content: impl Into<String>, request_id: Option<String>) {
        self.messages.push(ChatMessage {
            role,
            content: content.into(),
            request_id,
            created_at: Utc::now(),
        });
    }

    /// Suggestions offered by the most recent analyst reply.
    pub fn suggestions(&self) -> &[String] {
        &self.suggestions
    }

    pub(crate) fn set_suggestions(&mut self, suggestions: Vec<String>) {
        self.suggestions = suggestions;
    }

    /// Marks the suggestion at `index` as the next question to ask.
    pub fn select_suggestion(&mut self, index: usize) -> Option<&str> {
        let suggestion = self.suggestions.get(index)?.clone();
        self.active_suggestion = Some(suggestion);
        self.active_suggestion.as_deref()
    }

    /// Takes the selected suggestion, clearing it.
    pub fn take_active_suggestion(&mut self) -> Option<String> {
        self.active_suggestion.take()
    }

    /// Clears history and suggestions; identity is kept.
    pub fn reset(&mut self) {
        self.messages.clear();
        self.suggestions.clear();
        self.active_suggestion = None;
    }
}

/// Named sessions, created on first use.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<String, ChatSession>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `f` against the named session, creating it if needed.
    pub fn with_session<R>(&self, name: &str, f: impl FnOnce(&mut ChatSession) -> R) -> R {
        let mut entry = self
            .sessions
            .entry(name.to_string())
            .or_insert_with(|| ChatSession::new(name));
        f(entry.value_mut())
    }

    /// Resets the named session; returns false when it does not exist yet.
    pub fn reset(&self, name: &str) -> bool {
        match self.sessions.get_mut(name) {
            Some(mut session) => {
                session.reset();
                true
            }
            None => false,
        }
    }

    /// Removes the named session and returns it.
    pub fn remove(&self, name: &str) -> Option<ChatSession> {
        self.sessions.remove(name).map(|(_, session)| session)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
