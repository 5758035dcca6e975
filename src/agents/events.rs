use serde::{Deserialize, Serialize};

use crate::agents::session::TurnPhase;
use crate::models::{Message, TurnResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    // Lifecycle events
    Started {
        request_id: String,
        session_id: String,
        agent_id: String,
        timestamp: i64,
    },

    // Orchestration progress
    Phase {
        request_id: String,
        phase: TurnPhase,
    },

    // Content generation events
    TextChunk {
        request_id: String,
        chunk: String,
    },

    // Completion events
    Completed {
        request_id: String,
        result: TurnResult,
        message: Message,
        timestamp: i64,
    },

    // Error events
    Error {
        request_id: String,
        error: String,
        /// The degraded message recorded in history.
        message: Message,
        recoverable: bool,
    },
}

impl StreamEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Error { .. })
    }
}
