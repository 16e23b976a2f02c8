//! Client for Cortex agent and analyst replies, built around a single-pass
//! reducer that turns a stream of `message.delta` events into text, the
//! generated SQL and search citations.
//!
//! The reducer (`reduce`, `StreamReducer`) is pure and synchronous. The
//! REST client lives under `vendors::snowflake`; `CortexAssistant` ties the
//! two together and records turns into a `ChatSession`.
//!
//! # Reducing a saved reply
//!
//! ```
//! use cortex_chat::reduce;
//! use serde_json::json;
//!
//! let payload = json!([
//!     {"event": "message.delta", "data": {"delta": {"content": [
//!         {"type": "text", "text": "Hello "},
//!         {"type": "tool_results", "tool_results": {"content": [
//!             {"type": "json", "json": {"text": "world", "sql": "SELECT 1"}}
//!         ]}}
//!     ]}}}
//! ]);
//! let out = reduce(&payload);
//! assert_eq!(out.text, "Hello world");
//! assert_eq!(out.sql(), Some("SELECT 1"));
//! ```
//!
//! # Asking a question
//!
//! ```no_run
//! use cortex_chat::prelude::*;
//! use cortex_chat::vendors::snowflake::{AgentTools, CitationLookup, SnowflakeClient};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), CortexError> {
//! let assistant = CortexAssistant::from_client(
//!     SnowflakeClient::from_env()?,
//!     AgentTools::from_env()?,
//!     CitationLookup::default(),
//! )?;
//! let mut session = ChatSession::new("demo");
//! let turn = assistant
//!     .ask(&mut session, "Which deals closed last week?", &TurnOptions::default())
//!     .await?;
//! println!("{}", turn.display_text());
//! # Ok(())
//! # }
//! ```

/// Question/answer orchestration over the backends.
pub mod assistant;
/// Backend contracts and SQL statement types.
pub mod backend;
/// Display post-processing and turn results.
pub mod content;
/// Public error and warning types.
pub mod errors;
/// Wire shapes of agent events.
pub mod events;
/// Request and response bodies.
pub mod model;
/// Common imports for typical usage.
pub mod prelude;
/// The event-stream reducer.
pub mod reduce;
/// Conversation history.
pub mod session;
/// Response body parsing and SSE decoding.
pub mod transport;
/// Vendor-specific integrations.
pub mod vendors;

pub use assistant::{AssistantBuilder, CortexAssistant, TurnOptions};
pub use backend::{AgentBackend, AnalystBackend, QueryResult, Statement, StatementExecutor};
pub use content::{AgentTurn, AnalystTurn, ResolvedCitation, StreamingDisplay, display_text};
pub use errors::{CortexError, ReductionWarning};
pub use events::SearchResultCitation;
pub use model::{AgentRequest, AnalystRequest, AnalystResponse, Role};
pub use reduce::{Reduction, StreamReducer, reduce, reduce_events};
pub use session::{ChatMessage, ChatSession, SessionRegistry};
pub use transport::{SseDecoder, parse_agent_body};
