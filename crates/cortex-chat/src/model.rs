use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::errors::CortexError;

/// Default LLM used by the agent when none is configured.
pub const DEFAULT_AGENT_MODEL: &str = "llama3.1-70b";
/// Tool type for text-to-SQL over a semantic model.
pub const ANALYST_TOOL_TYPE: &str = "cortex_analyst_text_to_sql";
/// Tool type for search over an indexed corpus.
pub const SEARCH_TOOL_TYPE: &str = "cortex_search";

/// Chat role on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    /// Role the analyst endpoint uses for its own replies.
    Analyst,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Analyst => "analyst",
        }
    }
}

/// Content part of a request message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessagePart {
    Text { text: String },
}

/// A request message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: Vec<MessagePart>,
}

impl Message {
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: vec![MessagePart::Text { text: text.into() }],
        }
    }
}

/// `{"tool_spec": {"type": ..., "name": ...}}`
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Tool {
    pub tool_spec: ToolSpec,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ToolSpec {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
}

/// Per-tool configuration, keyed by tool name in `tool_resources`.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ToolResource {
    Analyst {
        semantic_model_file: String,
    },
    Search {
        name: String,
        max_results: u32,
        id_column: String,
    },
}

/// Body of an agent run request.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AgentRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<Tool>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub tool_resources: BTreeMap<String, ToolResource>,
}

impl AgentRequest {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            messages: Vec::new(),
            tools: Vec::new(),
            tool_resources: BTreeMap::new(),
        }
    }

    /// Appends a user message with one text part.
    pub fn user_text(mut self, text: impl Into<String>) -> Self {
        self.messages.push(Message::user_text(text));
        self
    }

    pub fn message(mut self, message: Message) -> Self {
        self.messages.push(message);
        self
    }

    /// Adds a text-to-SQL tool backed by a staged semantic model file.
    pub fn analyst_tool(
        mut self,
        name: impl Into<String>,
        semantic_model_file: impl Into<String>,
    ) -> Self {
        let name = name.into();
        self.tools.push(Tool {
            tool_spec: ToolSpec {
                kind: ANALYST_TOOL_TYPE.to_string(),
                name: name.clone(),
            },
        });
        self.tool_resources.insert(
            name,
            ToolResource::Analyst {
                semantic_model_file: semantic_model_file.into(),
            },
        );
        self
    }

    /// Adds a search tool backed by a search service.
    pub fn search_tool(
        mut self,
        name: impl Into<String>,
        service: impl Into<String>,
        max_results: u32,
        id_column: impl Into<String>,
    ) -> Self {
        let name = name.into();
        self.tools.push(Tool {
            tool_spec: ToolSpec {
                kind: SEARCH_TOOL_TYPE.to_string(),
                name: name.clone(),
            },
        });
        self.tool_resources.insert(
            name,
            ToolResource::Search {
                name: service.into(),
                max_results,
                id_column: id_column.into(),
            },
        );
        self
    }

    /// Checks the request before it is sent.
    pub fn validate(&self) -> Result<(), CortexError> {
        if self.model.trim().is_empty() {
            return Err(CortexError::Validation("model must not be empty".into()));
        }
        if self.messages.is_empty() {
            return Err(CortexError::Validation(
                "at least one message is required".into(),
            ));
        }
        for message in &self.messages {
            for MessagePart::Text { text } in &message.content {
                if text.trim().is_empty() {
                    return Err(CortexError::Validation(
                        "message text must not be empty".into(),
                    ));
                }
            }
        }
        let mut seen = HashSet::new();
        for tool in &self.tools {
            if !seen.insert(tool.tool_spec.name.as_str()) {
                return Err(CortexError::Validation(format!(
                    "duplicate tool name: {}",
                    tool.tool_spec.name
                )));
            }
            if !self.tool_resources.contains_key(&tool.tool_spec.name) {
                return Err(CortexError::Validation(format!(
                    "tool {} has no tool_resources entry",
                    tool.tool_spec.name
                )));
            }
        }
        Ok(())
    }
}

/// Body of an analyst message request.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AnalystRequest {
    pub messages: Vec<Message>,
    pub semantic_model_file: String,
}

impl AnalystRequest {
    pub fn new(semantic_model_file: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::user_text(prompt)],
            semantic_model_file: semantic_model_file.into(),
        }
    }

    pub fn validate(&self) -> Result<(), CortexError> {
        if self.semantic_model_file.trim().is_empty() {
            return Err(CortexError::Config(
                "semantic_model_file must not be empty".into(),
            ));
        }
        let has_text = self.messages.iter().any(|m| {
            m.content
                .iter()
                .any(|MessagePart::Text { text }| !text.trim().is_empty())
        });
        if !has_text {
            return Err(CortexError::Validation("prompt must not be empty".into()));
        }
        Ok(())
    }
}

/// Content part of an analyst reply.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnalystContent {
    Text {
        #[serde(default)]
        text: String,
    },
    Suggestions {
        #[serde(default)]
        suggestions: Vec<String>,
    },
    Sql {
        statement: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct AnalystMessage {
    pub role: Role,
    #[serde(default)]
    pub content: Vec<AnalystContent>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct AnalystWarning {
    #[serde(default)]
    pub message: String,
}

/// Reply of the analyst endpoint.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct AnalystResponse {
    pub message: AnalystMessage,
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(default)]
    pub warnings: Vec<AnalystWarning>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn agent_request_serializes_tools_and_resources() {
        let req = AgentRequest::new(DEFAULT_AGENT_MODEL)
            .user_text("top deals?")
            .analyst_tool("analyst1", "@db.schema.models/sales.yml")
            .search_tool("search1", "db.schema.sales_search", 1, "conversation_id");
        req.validate().expect("valid");

        let body = serde_json::to_value(&req).expect("serialize");
        assert_eq!(
            body,
            json!({
                "model": "llama3.1-70b",
                "messages": [{"role": "user", "content": [{"type": "text", "text": "top deals?"}]}],
                "tools": [
                    {"tool_spec": {"type": "cortex_analyst_text_to_sql", "name": "analyst1"}},
                    {"tool_spec": {"type": "cortex_search", "name": "search1"}}
                ],
                "tool_resources": {
                    "analyst1": {"semantic_model_file": "@db.schema.models/sales.yml"},
                    "search1": {
                        "name": "db.schema.sales_search",
                        "max_results": 1,
                        "id_column": "conversation_id"
                    }
                }
            })
        );
    }

    #[test]
    fn agent_request_validation() {
        let err = AgentRequest::new("m").validate().expect_err("no messages");
        assert!(matches!(err, CortexError::Validation(msg) if msg.contains("at least one")));

        let err = AgentRequest::new("m")
            .user_text("   ")
            .validate()
            .expect_err("blank text");
        assert!(matches!(err, CortexError::Validation(msg) if msg.contains("text")));

        let err = AgentRequest::new("m")
            .user_text("q")
            .search_tool("t", "svc", 1, "id")
            .analyst_tool("t", "@f")
            .validate()
            .expect_err("duplicate");
        assert!(matches!(err, CortexError::Validation(msg) if msg.contains("duplicate")));
    }

    #[test]
    fn analyst_response_decodes_known_and_unknown_parts() {
        let response: AnalystResponse = serde_json::from_value(json!({
            "message": {
                "role": "analyst",
                "content": [
                    {"type": "text", "text": "Here you go"},
                    {"type": "sql", "statement": "SELECT 1", "confidence": {}},
                    {"type": "suggestions", "suggestions": ["a"]},
                    {"type": "chart", "spec": {}}
                ]
            },
            "request_id": "r-1"
        }))
        .expect("decode");
        assert_eq!(response.message.role, Role::Analyst);
        assert_eq!(response.message.content.len(), 4);
        assert_eq!(response.message.content[3], AnalystContent::Other);
        assert_eq!(response.request_id.as_deref(), Some("r-1"));
    }
}
