//! Deliberation: three debaters, a round counter, and an arbiter.
//!
//! A fixed-sequence state machine. Debaters speak in seat order, one
//! invocation at a time; after each full pass the round counter is bumped
//! and the round controller decides whether to go again or hand the
//! transcript to the arbiter.
//!
//! # Run Flow
//!
//! ```text
//! Debater1 → Debater2 → Debater3 → RoundCheck ─┬─ round ≤ max → Debater1
//!                                              └─ round > max → Arbiter → Terminal
//! ```
//!
//! Every seat binds its cloud model when the provider has a credential and
//! its local fallback otherwise, re-resolved before every invocation.

pub mod arbiter;
pub mod executor;
pub mod orchestrator;
pub mod prompts;
pub mod roles;
pub mod round;
pub mod state;

pub use arbiter::{Arbiter, ArbiterVerdict, ARBITER_ROUND};
pub use executor::{AgentExecutor, Collaborators};
pub use orchestrator::{DeliberationOutcome, Orchestrator, RunError};
pub use roles::{
    ArbiterRole, ArbiterTier, BindingChoice, DebaterRole, RoleBinding, RoleTable, RoleTableError,
    ARBITER_LABEL,
};
pub use round::{RoundController, RoundDecision};
pub use state::{
    DebaterSlot, DeliberationState, EntryStatus, Phase, PhaseTransition, Speaker, StateError,
    TranscriptDelta, TranscriptEntry,
};
