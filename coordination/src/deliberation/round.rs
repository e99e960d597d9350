//! Round controller: the single continue/terminate decision.

use serde::{Deserialize, Serialize};

/// What happens after a full debater pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundDecision {
    /// Another pass, starting with the first debater.
    Continue,
    /// Hand the transcript to the arbiter.
    Terminate,
}

/// Owns the loop-termination rule.
#[derive(Debug, Clone, Copy, Default)]
pub struct RoundController;

impl RoundController {
    /// Terminate iff `round > max_rounds`. `round` is the already
    /// incremented counter.
    pub fn decide(round: u32, max_rounds: u32) -> RoundDecision {
        if round > max_rounds {
            RoundDecision::Terminate
        } else {
            RoundDecision::Continue
        }
    }
}
