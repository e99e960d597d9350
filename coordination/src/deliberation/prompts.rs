//! System instructions for debaters and the arbiter.

/// Turn instruction for the first pass.
pub const INITIAL_ANALYSIS: &str = "This is the opening round. Give your independent initial analysis \
of the question. No peer has spoken yet, so do not reference their positions.";

/// Turn instruction for every later pass.
pub const REVIEW_AND_UPDATE: &str = "Review the latest arguments from your peers in the conversation \
so far. State where you agree or disagree and why, then give your updated position.";

/// Arbiter stand-in when the model returns nothing.
pub const ARBITER_PLACEHOLDER: &str =
    "The Arbiter returned no synthesis for this deliberation; no final answer could be derived.";

/// Pick the turn instruction for a round.
pub fn turn_instruction(round: u32) -> &'static str {
    if round <= 1 {
        INITIAL_ANALYSIS
    } else {
        REVIEW_AND_UPDATE
    }
}

/// Build a debater's system instruction.
pub fn debater_instruction(
    agent_name: &str,
    peers: &[String],
    question: &str,
    round: u32,
    max_rounds: u32,
) -> String {
    let peers = peers.join(", ");
    format!(
        r#"You are {agent_name} in a multi-agent debate.
Collaborators: {peers}.

User Question: "{question}"

Current Phase: Round {round}/{max_rounds}.
{turn}

Instructions:
1. ONLY speak as {agent_name}.
2. DO NOT simulate or roleplay other agents ({peers}).
3. AGREE or DISAGREE with peer evidence (if any exists yet).
4. Provide your updated, definitive answer.
No filler. Be direct and technical."#,
        turn = turn_instruction(round),
    )
}

/// Build the arbiter's system instruction.
pub fn arbiter_instruction(participants: &[String], question: &str) -> String {
    let participants = participants.join(", ");
    format!(
        r#"You are the Arbiter. Your task is to review the deliberation between {participants}.

User Question: "{question}"

Review the entire discussion history provided below.
1. Identify the consensus view.
2. Resolve any conflicts based on the strongest evidence provided.
3. Discard hallucinations or unverified claims.
4. Synthesize a FINAL, single answer.

Output Format:
Your final response MUST be structured as follows:
## Final Answer
[Clear, direct answer]

## Key Assumptions & Evidence
- [Point 1]
- [Point 2]

## Confidence Score
[0-100]%

## Reasoning Summary (Brief)
[Explain why you chose this answer over alternatives]

DO NOT include the raw deliberation process in the final output."#
    )
}

/// Debater stand-in when the model returns nothing.
pub fn debater_placeholder(agent_name: &str) -> String {
    format!(
        "{} did not produce a response this turn and has no new position to add.",
        agent_name
    )
}

/// Transcript text for a failed invocation.
pub fn error_line(agent_name: &str, cause: &str) -> String {
    format!("{} Error: {}", agent_name, cause)
}
