//! Agent executor: one generic turn runner parameterized by the role table.
//!
//! A turn resolves credentials, binds a model, invokes it, relays every
//! fragment to subscribers as it arrives, and settles on exactly one
//! transcript entry. Model failures and empty replies become entries too;
//! only a broken event transport escapes as an error.

use std::sync::Arc;

use futures::StreamExt;
use tracing::{debug, info, warn};

use super::prompts;
use super::roles::RoleTable;
use super::state::{
    DebaterSlot, DeliberationState, EntryStatus, Speaker, TranscriptDelta, TranscriptEntry,
};
use crate::credentials::CredentialResolver;
use crate::events::{DeliberationEvent, EventPublisher, PublishError};
use crate::model::{ChatTurn, InvocationError, InvocationRequest, ModelInvoker, ModelReply, ModelSpec};
use crate::store::{MessageRecord, MessageStore};

/// External services a run talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub credentials: Arc<dyn CredentialResolver>,
    pub invoker: Arc<dyn ModelInvoker>,
    pub publisher: Arc<dyn EventPublisher>,
    pub store: Arc<dyn MessageStore>,
}

/// Addressing for everything one turn emits.
#[derive(Debug, Clone, Copy)]
pub(crate) struct EmissionTag<'a> {
    pub conversation_id: &'a str,
    pub agent: &'a str,
    pub round: u32,
}

/// Settled text of one turn.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Utterance {
    pub text: String,
    pub status: EntryStatus,
}

/// Render the transcript as alternating turns, in original order.
pub(crate) fn render_turns(transcript: &[TranscriptEntry]) -> Vec<ChatTurn> {
    transcript
        .iter()
        .map(|entry| match entry.speaker {
            Speaker::User => ChatTurn::user(&entry.text),
            Speaker::Debater(_) | Speaker::Arbiter => {
                ChatTurn::assistant(&entry.display_name, &entry.text)
            }
        })
        .collect()
}

async fn emit_token(
    tag: EmissionTag<'_>,
    content: &str,
    publisher: &dyn EventPublisher,
) -> Result<(), PublishError> {
    publisher
        .publish(
            tag.conversation_id,
            DeliberationEvent::Token {
                agent: tag.agent.to_string(),
                content: content.to_string(),
                round: tag.round,
            },
        )
        .await
}

/// Invoke the model and forward its output, fragment by fragment.
///
/// Each fragment is published before the next one is polled. A complete
/// (non-streamed) reply is forwarded as a single token so that concatenated
/// tokens always equal the settled text. Empty output is replaced by
/// `placeholder`; a failure appends a labeled error line after whatever
/// already streamed.
pub(crate) async fn speak(
    deps: &Collaborators,
    request: InvocationRequest,
    tag: EmissionTag<'_>,
    placeholder: &str,
) -> Result<Utterance, PublishError> {
    let publisher = deps.publisher.as_ref();
    let mut text = String::new();
    let mut failure: Option<InvocationError> = None;

    match deps.invoker.invoke(request).await {
        Ok(ModelReply::Complete(full)) => {
            if !full.is_empty() {
                emit_token(tag, &full, publisher).await?;
            }
            text = full;
        }
        Ok(ModelReply::Streaming(mut fragments)) => {
            let mut count = 0usize;
            while let Some(fragment) = fragments.next().await {
                match fragment {
                    Ok(piece) => {
                        if piece.is_empty() {
                            continue;
                        }
                        emit_token(tag, &piece, publisher).await?;
                        text.push_str(&piece);
                        count += 1;
                    }
                    Err(e) => {
                        failure = Some(e);
                        break;
                    }
                }
            }
            debug!(agent = tag.agent, round = tag.round, fragments = count, "Stream drained");
        }
        Err(e) => failure = Some(e),
    }

    if let Some(error) = failure {
        warn!(
            agent = tag.agent,
            round = tag.round,
            error = %error,
            streamed_chars = text.len(),
            "Model invocation failed"
        );
        let line = prompts::error_line(tag.agent, &error.to_string());
        let suffix = if text.is_empty() {
            line
        } else {
            format!("\n\n{}", line)
        };
        emit_token(tag, &suffix, publisher).await?;
        text.push_str(&suffix);
        return Ok(Utterance {
            text,
            status: EntryStatus::Failed,
        });
    }

    if text.trim().is_empty() {
        warn!(agent = tag.agent, round = tag.round, "Empty model output, using placeholder");
        emit_token(tag, placeholder, publisher).await?;
        text.push_str(placeholder);
        return Ok(Utterance {
            text,
            status: EntryStatus::Placeholder,
        });
    }

    Ok(Utterance {
        text,
        status: EntryStatus::Completed,
    })
}

/// Persist the settled text and announce it as a `message`.
///
/// A failed write is logged and dropped; a failed publish is not.
pub(crate) async fn record(
    deps: &Collaborators,
    tag: EmissionTag<'_>,
    text: &str,
) -> Result<(), PublishError> {
    let record = MessageRecord::new(tag.conversation_id, tag.agent, text, tag.round);
    if let Err(e) = deps.store.persist(record).await {
        warn!(
            conversation_id = tag.conversation_id,
            agent = tag.agent,
            error = %e,
            "Failed to persist message"
        );
    }

    deps.publisher
        .publish(
            tag.conversation_id,
            DeliberationEvent::Message {
                agent: tag.agent.to_string(),
                content: text.to_string(),
                round: tag.round,
            },
        )
        .await
}

/// Runs one debater seat.
pub struct AgentExecutor {
    slot: DebaterSlot,
    table: Arc<RoleTable>,
}

impl AgentExecutor {
    pub fn new(slot: DebaterSlot, table: Arc<RoleTable>) -> Self {
        Self { slot, table }
    }

    pub fn slot(&self) -> DebaterSlot {
        self.slot
    }

    /// Take this seat's turn against a read-only view of the run.
    ///
    /// Always yields exactly one entry tagged with the current round.
    pub async fn take_turn(
        &self,
        state: &DeliberationState,
        deps: &Collaborators,
    ) -> Result<TranscriptDelta, PublishError> {
        let credentials = deps.credentials.resolve(&state.conversation_id).await;
        let binding = self.table.debater(self.slot).bind(self.slot, &credentials);
        let model: ModelSpec = binding.active().clone();
        let agent = binding.display_name().to_string();

        info!(
            conversation_id = %state.conversation_id,
            seat = %self.slot,
            agent = %agent,
            model = %model.model,
            fallback = binding.used_fallback(),
            round = state.round,
            "Debater turn"
        );

        let peers = self.table.peers(self.slot, &credentials);
        let system_instruction = prompts::debater_instruction(
            &agent,
            &peers,
            &state.question,
            state.round,
            state.max_rounds,
        );

        let request = InvocationRequest {
            conversation_id: state.conversation_id.clone(),
            model: model.clone(),
            system_instruction,
            turns: render_turns(&state.transcript),
        };
        let tag = EmissionTag {
            conversation_id: &state.conversation_id,
            agent: &agent,
            round: state.round,
        };

        let placeholder = prompts::debater_placeholder(&agent);
        let utterance = speak(deps, request, tag, &placeholder).await?;
        record(deps, tag, &utterance.text).await?;

        Ok(TranscriptDelta {
            entry: TranscriptEntry {
                speaker: Speaker::Debater(self.slot),
                display_name: agent,
                model: model.model,
                text: utterance.text,
                round: state.round,
                status: utterance.status,
            },
        })
    }
}
