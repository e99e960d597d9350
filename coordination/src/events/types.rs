//! Event types pushed to subscribers of a deliberation.
//!
//! The JSON shape (`{"type": "token", ...}`) is what clients consume, so the
//! tag names are part of the wire contract.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Everything a deliberation run publishes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeliberationEvent {
    /// One fragment of an agent's reply, forwarded as soon as it is produced.
    Token {
        agent: String,
        content: String,
        round: u32,
    },

    /// An agent's complete contribution.
    Message {
        agent: String,
        content: String,
        round: u32,
    },

    /// A full debater pass finished; `round` is the new round number.
    RoundUpdate { round: u32 },

    /// The arbiter's final answer. Emitted exactly once per run.
    Final { result: String },

    /// The run failed outside any single agent.
    Error { message: String },
}

impl DeliberationEvent {
    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Token { .. } => "token",
            Self::Message { .. } => "message",
            Self::RoundUpdate { .. } => "round_update",
            Self::Final { .. } => "final",
            Self::Error { .. } => "error",
        }
    }

    /// Whether no further events follow this one.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Final { .. } | Self::Error { .. })
    }

    /// Speaking agent, for agent-scoped events.
    pub fn agent(&self) -> Option<&str> {
        match self {
            Self::Token { agent, .. } | Self::Message { agent, .. } => Some(agent),
            _ => None,
        }
    }

    /// Round tag, where the event carries one.
    pub fn round(&self) -> Option<u32> {
        match self {
            Self::Token { round, .. }
            | Self::Message { round, .. }
            | Self::RoundUpdate { round } => Some(*round),
            _ => None,
        }
    }
}

/// An event addressed to one conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub conversation_id: String,
    pub event: DeliberationEvent,
    pub timestamp: DateTime<Utc>,
}

impl EventEnvelope {
    pub fn new(conversation_id: &str, event: DeliberationEvent) -> Self {
        Self {
            conversation_id: conversation_id.to_string(),
            event,
            timestamp: Utc::now(),
        }
    }

    /// Subscriber channel name for this envelope's conversation.
    pub fn channel(&self) -> String {
        channel_name(&self.conversation_id)
    }
}

/// Channel name clients subscribe to for one conversation.
pub fn channel_name(conversation_id: &str) -> String {
    format!("conversation_{}", conversation_id)
}
