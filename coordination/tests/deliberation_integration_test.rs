//! Scripted deliberation integration test: drives the full orchestrator
//! with in-process collaborators (no network, no disk).
//!
//! Covers: round counting, role binding and fallbacks, token relay,
//! placeholder and error substitution, arbiter priority, and transport
//! failures.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::StreamExt;

use coordination::deliberation::prompts;
use coordination::{
    ArbiterTier, Collaborators, CredentialAvailability, CredentialResolver, DebaterSlot,
    DeliberationEvent, EntryStatus, EventPublisher, InMemoryMessageStore, InvocationError,
    InvocationRequest, ModelInvoker, ModelReply, Orchestrator, Phase, Provider, PublishError,
    RoleTable, RunError, Speaker,
};

// ── Scripted collaborators ─────────────────────────────────────────

#[derive(Clone)]
enum Script {
    Text(&'static str),
    Stream(Vec<&'static str>),
    Empty,
    Fail(&'static str),
    StreamThenFail(Vec<&'static str>, &'static str),
}

/// Replies per display name from a queue; unscripted calls answer with
/// `"<name> says <n>"`.
#[derive(Default)]
struct ScriptedInvoker {
    scripts: Mutex<HashMap<String, VecDeque<Script>>>,
    calls: Mutex<Vec<InvocationRequest>>,
}

impl ScriptedInvoker {
    fn with(self, display_name: &str, script: Script) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .entry(display_name.to_string())
            .or_default()
            .push_back(script);
        self
    }

    fn calls(&self) -> Vec<InvocationRequest> {
        self.calls.lock().unwrap().clone()
    }
}

fn fragments(pieces: Vec<Result<String, InvocationError>>) -> ModelReply {
    ModelReply::Streaming(futures::stream::iter(pieces).boxed())
}

#[async_trait]
impl ModelInvoker for ScriptedInvoker {
    async fn invoke(&self, request: InvocationRequest) -> Result<ModelReply, InvocationError> {
        let name = request.model.display_name.clone();
        let n = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(request);
            calls.len()
        };
        let script = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&name)
            .and_then(|q| q.pop_front());

        match script {
            None => Ok(ModelReply::Complete(format!("{} says {}", name, n))),
            Some(Script::Text(text)) => Ok(ModelReply::Complete(text.to_string())),
            Some(Script::Stream(pieces)) => Ok(fragments(
                pieces.into_iter().map(|p| Ok(p.to_string())).collect(),
            )),
            Some(Script::Empty) => Ok(ModelReply::Complete(String::new())),
            Some(Script::Fail(cause)) => Err(InvocationError::Request(cause.to_string())),
            Some(Script::StreamThenFail(pieces, cause)) => {
                let mut items: Vec<Result<String, InvocationError>> =
                    pieces.into_iter().map(|p| Ok(p.to_string())).collect();
                items.push(Err(InvocationError::Stream(cause.to_string())));
                Ok(fragments(items))
            }
        }
    }
}

/// Records every event; optionally refuses everything after `fail_after`.
#[derive(Default)]
struct RecordingPublisher {
    events: Mutex<Vec<(String, DeliberationEvent)>>,
    fail_after: Option<usize>,
    attempts: AtomicUsize,
}

impl RecordingPublisher {
    fn failing_after(n: usize) -> Self {
        Self {
            fail_after: Some(n),
            ..Default::default()
        }
    }

    fn events(&self) -> Vec<DeliberationEvent> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|(_, e)| e.clone())
            .collect()
    }

    fn count(&self, event_type: &str) -> usize {
        self.events()
            .iter()
            .filter(|e| e.event_type() == event_type)
            .count()
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(
        &self,
        conversation_id: &str,
        event: DeliberationEvent,
    ) -> Result<(), PublishError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(limit) = self.fail_after {
            if attempt >= limit {
                return Err(PublishError::ChannelClosed);
            }
        }
        self.events
            .lock()
            .unwrap()
            .push((conversation_id.to_string(), event));
        Ok(())
    }
}

/// Starts from a fixed answer and drops `revoke` once `after` lookups
/// have been served.
struct RevocableCredentials {
    initial: CredentialAvailability,
    revoke: Option<(usize, Provider)>,
    lookups: AtomicUsize,
}

impl RevocableCredentials {
    fn fixed(initial: CredentialAvailability) -> Self {
        Self {
            initial,
            revoke: None,
            lookups: AtomicUsize::new(0),
        }
    }

    fn revoking(initial: CredentialAvailability, after: usize, provider: Provider) -> Self {
        Self {
            initial,
            revoke: Some((after, provider)),
            lookups: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl CredentialResolver for RevocableCredentials {
    async fn resolve(&self, _conversation_id: &str) -> CredentialAvailability {
        let seen = self.lookups.fetch_add(1, Ordering::SeqCst);
        match self.revoke {
            Some((after, provider)) if seen >= after => self.initial.clone().without(provider),
            _ => self.initial.clone(),
        }
    }
}

struct Harness {
    orchestrator: Orchestrator,
    invoker: Arc<ScriptedInvoker>,
    publisher: Arc<RecordingPublisher>,
    store: Arc<InMemoryMessageStore>,
}

fn harness(
    credentials: RevocableCredentials,
    invoker: ScriptedInvoker,
    publisher: RecordingPublisher,
) -> Harness {
    let invoker = Arc::new(invoker);
    let publisher = Arc::new(publisher);
    let store = Arc::new(InMemoryMessageStore::new());
    let deps = Collaborators {
        credentials: Arc::new(credentials),
        invoker: invoker.clone(),
        publisher: publisher.clone(),
        store: store.clone(),
    };
    Harness {
        orchestrator: Orchestrator::new(RoleTable::standard(), deps),
        invoker,
        publisher,
        store,
    }
}

fn all_cloud() -> RevocableCredentials {
    RevocableCredentials::fixed(CredentialAvailability::all_cloud())
}

/// Concatenate tokens per (agent, round), in emission order.
fn tokens_by_turn(events: &[DeliberationEvent]) -> BTreeMap<(String, u32), String> {
    let mut out: BTreeMap<(String, u32), String> = BTreeMap::new();
    for event in events {
        if let DeliberationEvent::Token {
            agent,
            content,
            round,
        } = event
        {
            out.entry((agent.clone(), *round))
                .or_default()
                .push_str(content);
        }
    }
    out
}

// ── Scenario A: one round, every credential present ────────────────

#[tokio::test]
async fn test_single_round_with_all_credentials() {
    let h = harness(
        all_cloud(),
        ScriptedInvoker::default()
            .with("OpenAI", Script::Text("Four."))
            .with("Gemini", Script::Text("Agree, four."))
            .with("DeepSeek", Script::Text("Four, confirmed."))
            .with("Arbiter", Script::Text("## Final Answer\nFour.")),
        RecordingPublisher::default(),
    );

    let outcome = h.orchestrator.run("What is 2+2?", "conv-a", 1).await.unwrap();
    let state = &outcome.state;

    assert!(state.is_complete());
    assert_eq!(state.phase, Phase::Terminal);
    assert_eq!(outcome.final_answer, "## Final Answer\nFour.");

    let agents: Vec<(&str, u32)> = state
        .agent_entries()
        .map(|e| (e.display_name.as_str(), e.round))
        .collect();
    assert_eq!(
        agents,
        vec![("OpenAI", 1), ("Gemini", 1), ("DeepSeek", 1), ("Arbiter", 0)]
    );

    let events = h.publisher.events();
    let round_updates: Vec<u32> = events
        .iter()
        .filter_map(|e| match e {
            DeliberationEvent::RoundUpdate { round } => Some(*round),
            _ => None,
        })
        .collect();
    assert_eq!(round_updates, vec![2]);
    assert_eq!(h.publisher.count("final"), 1);
    assert_eq!(h.publisher.count("error"), 0);
    assert!(matches!(events.last(), Some(DeliberationEvent::Final { .. })));

    let arbiter_call = h.invoker.calls().pop().unwrap();
    assert_eq!(arbiter_call.model.model, "gpt-4o");
    assert_eq!(arbiter_call.model.temperature, 0.2);
}

// ── Scenario B: no credentials at all ──────────────────────────────

#[tokio::test]
async fn test_no_credentials_uses_local_models() {
    let h = harness(
        RevocableCredentials::fixed(CredentialAvailability::none()),
        ScriptedInvoker::default(),
        RecordingPublisher::default(),
    );

    let outcome = h.orchestrator.run("Explain TCP.", "conv-b", 2).await.unwrap();

    assert!(!outcome.final_answer.is_empty());
    for call in h.invoker.calls() {
        assert_eq!(call.model.provider, Provider::Ollama);
    }
    let names: Vec<&str> = outcome
        .state
        .agent_entries()
        .map(|e| e.display_name.as_str())
        .collect();
    assert_eq!(
        names,
        vec!["Llama 3.2", "Qwen 2.5", "Phi 3", "Llama 3.2", "Qwen 2.5", "Phi 3", "Arbiter"]
    );
    let arbiter = h.invoker.calls().pop().unwrap();
    assert_eq!(arbiter.model.model, "llama3.2:3b");
    assert!(arbiter
        .system_instruction
        .contains("deliberation between Llama 3.2, Qwen 2.5, Phi 3."));
    assert!(!arbiter.system_instruction.contains("DeepSeek"));
}

// ── Round counting ─────────────────────────────────────────────────

#[tokio::test]
async fn test_n_rounds_produce_n_passes() {
    for n in 1..=4u32 {
        let h = harness(
            all_cloud(),
            ScriptedInvoker::default(),
            RecordingPublisher::default(),
        );
        let outcome = h.orchestrator.run("q", "conv-n", n).await.unwrap();
        let state = &outcome.state;

        assert_eq!(h.publisher.count("round_update"), n as usize);
        assert_eq!(state.agent_entries().count(), (3 * n + 1) as usize);
        assert_eq!(state.completed_rounds(), n);

        for slot in DebaterSlot::ALL {
            let rounds: Vec<u32> = state
                .entries_for(Speaker::Debater(slot))
                .map(|e| e.round)
                .collect();
            assert_eq!(rounds, (1..=n).collect::<Vec<_>>());
        }
        let arbiter: Vec<_> = state.entries_for(Speaker::Arbiter).collect();
        assert_eq!(arbiter.len(), 1);
        assert_eq!(arbiter[0].round, 0);
        assert_eq!(h.store.history("conv-n").len(), (3 * n + 1) as usize);
    }
}

#[tokio::test]
async fn test_later_rounds_see_full_transcript() {
    let h = harness(
        all_cloud(),
        ScriptedInvoker::default(),
        RecordingPublisher::default(),
    );
    h.orchestrator.run("q", "conv-t", 2).await.unwrap();

    let calls = h.invoker.calls();
    // Question plus every earlier turn, in order.
    for (i, call) in calls.iter().enumerate() {
        assert_eq!(call.turns.len(), i + 1);
    }
    assert!(calls[0].system_instruction.contains(prompts::INITIAL_ANALYSIS));
    assert!(calls[3].system_instruction.contains(prompts::REVIEW_AND_UPDATE));
}

// ── Streaming relay ────────────────────────────────────────────────

#[tokio::test]
async fn test_tokens_concatenate_to_persisted_text() {
    let h = harness(
        all_cloud(),
        ScriptedInvoker::default()
            .with("OpenAI", Script::Stream(vec!["The ", "answer ", "is 4."]))
            .with("Gemini", Script::Empty)
            .with("DeepSeek", Script::StreamThenFail(vec!["Par", "tial"], "reset"))
            .with("Arbiter", Script::Stream(vec!["## Final", " Answer\n4"])),
        RecordingPublisher::default(),
    );
    let outcome = h.orchestrator.run("q", "conv-s", 1).await.unwrap();

    let tokens = tokens_by_turn(&h.publisher.events());
    for entry in outcome.state.agent_entries() {
        let key = (entry.display_name.clone(), entry.round);
        assert_eq!(tokens.get(&key), Some(&entry.text), "turn {:?}", key);
    }
    for record in h.store.history("conv-s") {
        assert!(outcome
            .state
            .agent_entries()
            .any(|e| e.text == record.content && e.round == record.round));
    }
}

// ── Substitution policies ──────────────────────────────────────────

#[tokio::test]
async fn test_empty_output_and_failures_become_entries() {
    let h = harness(
        all_cloud(),
        ScriptedInvoker::default()
            .with("OpenAI", Script::Empty)
            .with("Gemini", Script::Fail("connection refused"))
            .with("DeepSeek", Script::StreamThenFail(vec!["Half an"], "eof")),
        RecordingPublisher::default(),
    );
    let outcome = h.orchestrator.run("q", "conv-f", 1).await.unwrap();
    let entries: Vec<_> = outcome.state.agent_entries().collect();

    assert_eq!(entries[0].status, EntryStatus::Placeholder);
    assert_eq!(entries[0].text, prompts::debater_placeholder("OpenAI"));

    assert_eq!(entries[1].status, EntryStatus::Failed);
    assert_eq!(
        entries[1].text,
        "Gemini Error: request failed: connection refused"
    );

    assert_eq!(entries[2].status, EntryStatus::Failed);
    assert_eq!(
        entries[2].text,
        "Half an\n\nDeepSeek Error: stream interrupted: eof"
    );

    for entry in outcome.state.transcript.iter() {
        assert!(!entry.text.trim().is_empty());
    }
    // The run carries on to the arbiter regardless.
    assert_eq!(h.publisher.count("final"), 1);
}

#[tokio::test]
async fn test_arbiter_failure_still_finalizes() {
    let h = harness(
        RevocableCredentials::fixed(CredentialAvailability::none().with(Provider::Gemini)),
        ScriptedInvoker::default().with("Arbiter", Script::Fail("quota exceeded")),
        RecordingPublisher::default(),
    );
    let outcome = h.orchestrator.run("q", "conv-af", 1).await.unwrap();

    assert_eq!(
        outcome.final_answer,
        "Arbiter Error: request failed: quota exceeded"
    );
    let arbiter_call = h.invoker.calls().pop().unwrap();
    assert_eq!(arbiter_call.model.provider, Provider::Gemini);

    let finals: Vec<String> = h
        .publisher
        .events()
        .into_iter()
        .filter_map(|e| match e {
            DeliberationEvent::Final { result } => Some(result),
            _ => None,
        })
        .collect();
    assert_eq!(finals, vec![outcome.final_answer.clone()]);
    assert_eq!(h.publisher.count("error"), 0);
}

// ── Credential changes ─────────────────────────────────────────────

#[tokio::test]
async fn test_missing_credential_is_consistent_for_whole_run() {
    let h = harness(
        RevocableCredentials::fixed(CredentialAvailability::all_cloud().without(Provider::DeepSeek)),
        ScriptedInvoker::default(),
        RecordingPublisher::default(),
    );
    let outcome = h.orchestrator.run("q", "conv-c", 3).await.unwrap();

    let third: Vec<_> = outcome
        .state
        .entries_for(Speaker::Debater(DebaterSlot::Third))
        .collect();
    assert_eq!(third.len(), 3);
    for entry in third {
        assert_eq!(entry.display_name, "Phi 3");
        assert_eq!(entry.model, "phi3:mini");
    }
    let first_call = &h.invoker.calls()[0];
    assert!(first_call
        .system_instruction
        .contains("Collaborators: Gemini, Phi 3."));
}

#[tokio::test]
async fn test_revocation_switches_to_fallback_next_turn() {
    // Round 1 resolves three times; OpenAI disappears from round 2 on.
    let h = harness(
        RevocableCredentials::revoking(CredentialAvailability::all_cloud(), 3, Provider::OpenAi),
        ScriptedInvoker::default(),
        RecordingPublisher::default(),
    );
    let outcome = h.orchestrator.run("q", "conv-r", 2).await.unwrap();

    let first: Vec<&str> = outcome
        .state
        .entries_for(Speaker::Debater(DebaterSlot::First))
        .map(|e| e.display_name.as_str())
        .collect();
    assert_eq!(first, vec!["OpenAI", "Llama 3.2"]);

    // Arbiter falls to the second provider.
    let arbiter = h.invoker.calls().pop().unwrap();
    assert_eq!(arbiter.model.provider, Provider::Gemini);
    assert_eq!(
        RoleTable::standard()
            .arbiter
            .select(&CredentialAvailability::all_cloud().without(Provider::OpenAi))
            .0,
        ArbiterTier::SecondDebaterProvider
    );
}

// ── Run failures ───────────────────────────────────────────────────

#[tokio::test]
async fn test_publish_failure_aborts_run() {
    let h = harness(
        all_cloud(),
        ScriptedInvoker::default(),
        RecordingPublisher::failing_after(2),
    );
    let err = h.orchestrator.run("q", "conv-p", 2).await.unwrap_err();

    assert!(matches!(err, RunError::Transport(PublishError::ChannelClosed)));
    // Token and message went out, then the transport died; the error
    // event attempt is refused too.
    assert_eq!(h.publisher.events().len(), 2);
    assert_eq!(h.publisher.attempts.load(Ordering::SeqCst), 4);
    assert_eq!(h.invoker.calls().len(), 2);
}

#[tokio::test]
async fn test_zero_rounds_rejected_before_any_turn() {
    let h = harness(
        all_cloud(),
        ScriptedInvoker::default(),
        RecordingPublisher::default(),
    );
    let err = h.orchestrator.run("q", "conv-z", 0).await.unwrap_err();

    assert!(matches!(err, RunError::InvalidMaxRounds));
    assert!(h.invoker.calls().is_empty());
    let events = h.publisher.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type(), "error");
}
