//! Deliberation state: phases, transcript, and the run accumulator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Positional debater seat. Speaking order is fixed: first, second, third.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebaterSlot {
    First,
    Second,
    Third,
}

impl DebaterSlot {
    /// All seats in speaking order.
    pub const ALL: [DebaterSlot; 3] = [Self::First, Self::Second, Self::Third];

    /// Zero-based position.
    pub fn index(self) -> usize {
        match self {
            Self::First => 0,
            Self::Second => 1,
            Self::Third => 2,
        }
    }

    /// One-based seat number used in labels.
    pub fn number(self) -> u8 {
        self.index() as u8 + 1
    }

    /// The phase in which this seat speaks.
    pub fn phase(self) -> Phase {
        match self {
            Self::First => Phase::Debater1,
            Self::Second => Phase::Debater2,
            Self::Third => Phase::Debater3,
        }
    }
}

impl std::fmt::Display for DebaterSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "debater_{}", self.number())
    }
}

/// Who produced a transcript entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    User,
    Debater(DebaterSlot),
    Arbiter,
}

impl std::fmt::Display for Speaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Debater(slot) => write!(f, "{}", slot),
            Self::Arbiter => write!(f, "arbiter"),
        }
    }
}

/// How an entry's text came about.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    /// The model produced non-empty text.
    #[default]
    Completed,
    /// The model produced nothing; a fixed placeholder stands in.
    Placeholder,
    /// The invocation failed; the text carries the labeled error.
    Failed,
}

/// A single contribution. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub speaker: Speaker,
    /// Label the entry was published under.
    pub display_name: String,
    /// Model that produced the entry (empty for the user).
    #[serde(default)]
    pub model: String,
    pub text: String,
    /// Round the entry was produced in; 0 for the question and the arbiter.
    pub round: u32,
    #[serde(default)]
    pub status: EntryStatus,
}

impl TranscriptEntry {
    /// The user's question, round 0.
    pub fn question(text: &str) -> Self {
        Self {
            speaker: Speaker::User,
            display_name: "User".to_string(),
            model: String::new(),
            text: text.to_string(),
            round: 0,
            status: EntryStatus::Completed,
        }
    }
}

/// The only thing an executor hands back to the orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptDelta {
    pub entry: TranscriptEntry,
}

/// Phase of a deliberation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Debater1,
    Debater2,
    Debater3,
    /// Round bookkeeping and the continue/terminate decision.
    RoundCheck,
    Arbiter,
    /// Final answer recorded: run complete.
    Terminal,
}

impl Phase {
    /// Whether this is a terminal phase.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Terminal)
    }

    /// Seat speaking in this phase, if any.
    pub fn debater(self) -> Option<DebaterSlot> {
        match self {
            Self::Debater1 => Some(DebaterSlot::First),
            Self::Debater2 => Some(DebaterSlot::Second),
            Self::Debater3 => Some(DebaterSlot::Third),
            _ => None,
        }
    }

    /// Valid transitions from this phase.
    pub fn valid_transitions(self) -> &'static [Phase] {
        match self {
            Self::Debater1 => &[Self::Debater2],
            Self::Debater2 => &[Self::Debater3],
            Self::Debater3 => &[Self::RoundCheck],
            Self::RoundCheck => &[Self::Debater1, Self::Arbiter],
            Self::Arbiter => &[Self::Terminal],
            Self::Terminal => &[],
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Debater1 => write!(f, "debater_1"),
            Self::Debater2 => write!(f, "debater_2"),
            Self::Debater3 => write!(f, "debater_3"),
            Self::RoundCheck => write!(f, "round_check"),
            Self::Arbiter => write!(f, "arbiter"),
            Self::Terminal => write!(f, "terminal"),
        }
    }
}

/// A phase transition record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseTransition {
    pub from: Phase,
    pub to: Phase,
    /// Round in effect when the transition happened.
    pub round: u32,
    pub timestamp: DateTime<Utc>,
}

/// Violations of the run's state invariants.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    #[error("invalid transition {from} → {to}")]
    IllegalTransition { from: Phase, to: Phase },

    #[error("final answer already recorded")]
    FinalAnswerAlreadySet,

    #[error("empty transcript entry from {0}")]
    EmptyEntry(Speaker),
}

/// Accumulator for one run. Owned exclusively by the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliberationState {
    pub conversation_id: String,
    pub question: String,
    /// Current round, starting at 1. Never decreases.
    pub round: u32,
    pub max_rounds: u32,
    /// Role labels of the debaters, in seat order.
    pub participants: Vec<String>,
    pub transcript: Vec<TranscriptEntry>,
    pub final_answer: Option<String>,
    pub phase: Phase,
    pub transitions: Vec<PhaseTransition>,
    pub started_at: DateTime<Utc>,
}

impl DeliberationState {
    /// Fresh state: question in the transcript, round 1, first debater up.
    pub fn new(
        conversation_id: &str,
        question: &str,
        max_rounds: u32,
        participants: Vec<String>,
    ) -> Self {
        Self {
            conversation_id: conversation_id.to_string(),
            question: question.to_string(),
            round: 1,
            max_rounds,
            participants,
            transcript: vec![TranscriptEntry::question(question)],
            final_answer: None,
            phase: Phase::Debater1,
            transitions: Vec::new(),
            started_at: Utc::now(),
        }
    }

    /// Move to a new phase, rejecting edges outside the fixed sequence.
    pub fn transition(&mut self, to: Phase) -> Result<(), StateError> {
        if !self.phase.valid_transitions().contains(&to) {
            return Err(StateError::IllegalTransition {
                from: self.phase,
                to,
            });
        }

        self.transitions.push(PhaseTransition {
            from: self.phase,
            to,
            round: self.round,
            timestamp: Utc::now(),
        });
        self.phase = to;
        Ok(())
    }

    /// Fold an executor's delta into the transcript.
    pub fn apply(&mut self, delta: TranscriptDelta) -> Result<(), StateError> {
        if delta.entry.text.trim().is_empty() {
            return Err(StateError::EmptyEntry(delta.entry.speaker));
        }
        self.transcript.push(delta.entry);
        Ok(())
    }

    /// Bump the round counter, returning the new round.
    pub fn advance_round(&mut self) -> u32 {
        self.round += 1;
        self.round
    }

    /// Record the final answer and enter `Terminal`. Allowed once, from
    /// the `Arbiter` phase only.
    pub fn complete(&mut self, final_answer: String) -> Result<(), StateError> {
        if self.final_answer.is_some() {
            return Err(StateError::FinalAnswerAlreadySet);
        }
        self.transition(Phase::Terminal)?;
        self.final_answer = Some(final_answer);
        Ok(())
    }

    /// Whether the run has finished.
    pub fn is_complete(&self) -> bool {
        self.phase.is_terminal()
    }

    /// Entries contributed by agents (everything but the question).
    pub fn agent_entries(&self) -> impl Iterator<Item = &TranscriptEntry> {
        self.transcript
            .iter()
            .filter(|e| e.speaker != Speaker::User)
    }

    /// Entries contributed by one speaker, in order.
    pub fn entries_for(&self, speaker: Speaker) -> impl Iterator<Item = &TranscriptEntry> {
        self.transcript.iter().filter(move |e| e.speaker == speaker)
    }

    /// Number of debater passes that have fully completed.
    pub fn completed_rounds(&self) -> u32 {
        self.entries_for(Speaker::Debater(DebaterSlot::Third)).count() as u32
    }

    /// Compact status line.
    pub fn status_line(&self) -> String {
        format!(
            "[{}] round {}/{} | {} entries | conversation={}",
            self.phase,
            self.round,
            self.max_rounds,
            self.transcript.len(),
            self.conversation_id
        )
    }
}
