//! Common imports for typical usage.
pub use crate::{
    AgentTurn, AnalystTurn, ChatSession, CortexAssistant, CortexError, Reduction, StreamReducer,
    StreamingDisplay, TurnOptions, reduce,
};
