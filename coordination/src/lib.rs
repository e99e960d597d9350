//! Tribunal coordination engine
//!
//! This library provides:
//! - A fixed three-debater deliberation loop with an arbiter
//! - Role binding from per-conversation credential availability, with local fallbacks
//! - Live event publication (tokens, messages, round updates, final answers)
//! - Message persistence contracts
//!
//! The engine is transport-agnostic: models, credentials, events, and
//! storage are all reached through traits the runtime crate implements.
//!
//! # Usage
//!
//! ```ignore
//! let orchestrator = Orchestrator::new(RoleTable::standard(), collaborators);
//! let outcome = orchestrator.run("Why is the sky blue?", &conversation_id, 3).await?;
//! println!("{}", outcome.final_answer);
//! ```

#![allow(clippy::uninlined_format_args)]

pub mod credentials;
pub mod deliberation;
pub mod events;
pub mod model;
pub mod store;

// Re-export key deliberation types
pub use deliberation::{
    AgentExecutor, Arbiter, ArbiterTier, Collaborators, DebaterSlot, DeliberationOutcome,
    DeliberationState, EntryStatus, Orchestrator, Phase, RoleTable, RoundController,
    RoundDecision, RunError, Speaker, TranscriptEntry,
};

// Re-export collaborator contracts
pub use credentials::{CredentialAvailability, CredentialResolver, StaticCredentials};
pub use model::{
    ChatTurn, FragmentStream, InvocationError, InvocationRequest, ModelInvoker, ModelReply,
    ModelSpec, Provider, TurnRole,
};
pub use store::{InMemoryMessageStore, MessageRecord, MessageStore, StoreError};

// Re-export key event types
pub use events::{
    channel_name, DeliberationEvent, EventBus, EventBusExt, EventEnvelope, EventFilter,
    EventPublisher, FilteredReceiver, PublishError, SharedEventBus,
};
