//! Event-driven delivery of deliberation progress
//!
//! Subscribers see a run as a stream of events: `token` fragments while an
//! agent is speaking, one `message` per finished turn, a `round_update`
//! after every full debater pass, and exactly one `final` (or an `error`
//! when the run itself fails).
//!
//! # Event Flow
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//! │ Orchestrator │────▶│EventPublisher│────▶│  Subscribers │
//! │  (publish)   │     │  (broadcast) │     │   (recv)     │
//! └──────────────┘     └──────────────┘     └──────────────┘
//! ```

pub mod bus;
pub mod types;

pub use bus::{
    EventBus, EventBusExt, EventBusResult, EventFilter, EventPublisher, FilteredReceiver,
    PublishError, SharedEventBus,
};
pub use types::{channel_name, DeliberationEvent, EventEnvelope};
