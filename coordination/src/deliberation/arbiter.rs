//! Arbiter: synthesizes the transcript into the run's final answer.

use std::sync::Arc;

use tracing::info;

use super::executor::{record, render_turns, speak, Collaborators, EmissionTag};
use super::prompts;
use super::roles::{ArbiterTier, RoleTable, ARBITER_LABEL};
use super::state::{DeliberationState, EntryStatus, Speaker, TranscriptEntry};
use crate::events::{DeliberationEvent, PublishError};
use crate::model::InvocationRequest;

/// Round tag for the arbiter's entry and events.
pub const ARBITER_ROUND: u32 = 0;

/// What the arbiter settled on.
#[derive(Debug, Clone, PartialEq)]
pub struct ArbiterVerdict {
    pub entry: TranscriptEntry,
    pub final_answer: String,
    pub tier: ArbiterTier,
}

impl ArbiterVerdict {
    pub fn succeeded(&self) -> bool {
        self.entry.status != EntryStatus::Failed
    }
}

pub struct Arbiter {
    table: Arc<RoleTable>,
}

impl Arbiter {
    pub fn new(table: Arc<RoleTable>) -> Self {
        Self { table }
    }

    /// Read the whole transcript and produce the final answer.
    ///
    /// Emits tokens, persists one record, publishes one `message` and then
    /// exactly one `final`. A failed model call still yields a verdict
    /// whose text is the labeled error.
    pub async fn adjudicate(
        &self,
        state: &DeliberationState,
        deps: &Collaborators,
    ) -> Result<ArbiterVerdict, PublishError> {
        let credentials = deps.credentials.resolve(&state.conversation_id).await;
        let (tier, model) = self.table.arbiter.select(&credentials);
        let model = model.clone();
        let speakers = self.table.display_names(&credentials);

        info!(
            conversation_id = %state.conversation_id,
            tier = ?tier,
            model = %model.model,
            entries = state.transcript.len(),
            "Arbiter synthesizing"
        );

        let request = InvocationRequest {
            conversation_id: state.conversation_id.clone(),
            model: model.clone(),
            system_instruction: prompts::arbiter_instruction(&speakers, &state.question),
            turns: render_turns(&state.transcript),
        };
        let tag = EmissionTag {
            conversation_id: &state.conversation_id,
            agent: ARBITER_LABEL,
            round: ARBITER_ROUND,
        };

        let utterance = speak(deps, request, tag, prompts::ARBITER_PLACEHOLDER).await?;
        record(deps, tag, &utterance.text).await?;
        deps.publisher
            .publish(
                &state.conversation_id,
                DeliberationEvent::Final {
                    result: utterance.text.clone(),
                },
            )
            .await?;

        Ok(ArbiterVerdict {
            final_answer: utterance.text.clone(),
            entry: TranscriptEntry {
                speaker: Speaker::Arbiter,
                display_name: ARBITER_LABEL.to_string(),
                model: model.model,
                text: utterance.text,
                round: ARBITER_ROUND,
                status: utterance.status,
            },
            tier,
        })
    }
}
