//! Deliberation orchestrator: drives debaters, rounds, and the arbiter.
//!
//! Owns the [`DeliberationState`] for one run. Executors see it read-only
//! and hand back deltas; the orchestrator folds them in, applies the round
//! decision, and publishes the round bookkeeping events.

use std::sync::Arc;

use thiserror::Error;
use tracing::{error, info, warn};

use super::arbiter::Arbiter;
use super::executor::{AgentExecutor, Collaborators};
use super::roles::RoleTable;
use super::round::{RoundController, RoundDecision};
use super::state::{DebaterSlot, DeliberationState, Phase, StateError, TranscriptDelta};
use crate::events::{DeliberationEvent, PublishError};

/// Failures that abort a run.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("max_rounds must be at least 1")]
    InvalidMaxRounds,

    #[error("question must not be empty")]
    EmptyQuestion,

    #[error("event transport failed: {0}")]
    Transport(#[from] PublishError),

    #[error("state error: {0}")]
    State(#[from] StateError),
}

/// Result of a finished run.
#[derive(Debug, Clone)]
pub struct DeliberationOutcome {
    pub final_answer: String,
    pub state: DeliberationState,
}

pub struct Orchestrator {
    table: Arc<RoleTable>,
    deps: Collaborators,
    debaters: [AgentExecutor; 3],
    arbiter: Arbiter,
}

impl Orchestrator {
    pub fn new(table: RoleTable, deps: Collaborators) -> Self {
        let table = Arc::new(table);
        let debaters = DebaterSlot::ALL.map(|slot| AgentExecutor::new(slot, table.clone()));
        let arbiter = Arbiter::new(table.clone());
        Self {
            table,
            deps,
            debaters,
            arbiter,
        }
    }

    /// Run one deliberation to completion.
    ///
    /// On any failure a best-effort `error` event is published before the
    /// error is returned.
    pub async fn run(
        &self,
        question: &str,
        conversation_id: &str,
        max_rounds: u32,
    ) -> Result<DeliberationOutcome, RunError> {
        match self.drive(question, conversation_id, max_rounds).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                error!(conversation_id, error = %e, "Deliberation failed");
                let notice = DeliberationEvent::Error {
                    message: e.to_string(),
                };
                if let Err(publish_err) = self.deps.publisher.publish(conversation_id, notice).await {
                    error!(conversation_id, error = %publish_err, "Could not publish error event");
                }
                Err(e)
            }
        }
    }

    async fn drive(
        &self,
        question: &str,
        conversation_id: &str,
        max_rounds: u32,
    ) -> Result<DeliberationOutcome, RunError> {
        if max_rounds == 0 {
            return Err(RunError::InvalidMaxRounds);
        }
        if question.trim().is_empty() {
            return Err(RunError::EmptyQuestion);
        }

        let mut state =
            DeliberationState::new(conversation_id, question, max_rounds, self.table.participants());
        info!(conversation_id, max_rounds, "Deliberation started");

        loop {
            match state.phase {
                Phase::Debater1 => self.turn(&mut state, DebaterSlot::First, Phase::Debater2).await?,
                Phase::Debater2 => self.turn(&mut state, DebaterSlot::Second, Phase::Debater3).await?,
                Phase::Debater3 => {
                    self.turn(&mut state, DebaterSlot::Third, Phase::RoundCheck)
                        .await?
                }
                Phase::RoundCheck => {
                    let round = state.advance_round();
                    self.deps
                        .publisher
                        .publish(conversation_id, DeliberationEvent::RoundUpdate { round })
                        .await?;
                    let decision = RoundController::decide(round, max_rounds);
                    info!(conversation_id, round, decision = ?decision, "Round complete");
                    match decision {
                        RoundDecision::Continue => state.transition(Phase::Debater1)?,
                        RoundDecision::Terminate => state.transition(Phase::Arbiter)?,
                    }
                }
                Phase::Arbiter => {
                    let verdict = self.arbiter.adjudicate(&state, &self.deps).await?;
                    if !verdict.succeeded() {
                        warn!(
                            conversation_id,
                            tier = ?verdict.tier,
                            "Arbiter failed; its error stands as the final answer"
                        );
                    }
                    state.apply(TranscriptDelta {
                        entry: verdict.entry,
                    })?;
                    state.complete(verdict.final_answer)?;
                }
                Phase::Terminal => break,
            }
        }

        let final_answer = state.final_answer.clone().unwrap_or_default();
        info!(
            conversation_id,
            entries = state.transcript.len(),
            status = %state.status_line(),
            "Deliberation finished"
        );
        Ok(DeliberationOutcome {
            final_answer,
            state,
        })
    }

    async fn turn(
        &self,
        state: &mut DeliberationState,
        slot: DebaterSlot,
        next: Phase,
    ) -> Result<(), RunError> {
        let delta = self.debaters[slot.index()]
            .take_turn(state, &self.deps)
            .await?;
        state.apply(delta)?;
        state.transition(next)?;
        Ok(())
    }
}
