//! Terminal rendering of a live deliberation.

use std::io::Write;

use coordination::{DeliberationEvent, EventEnvelope, FilteredReceiver};
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

/// Writes events as readable text, or as raw JSON lines.
pub struct Console<W: Write> {
    out: W,
    json: bool,
    speaking: Option<(String, u32)>,
}

impl<W: Write> Console<W> {
    pub fn new(out: W, json: bool) -> Self {
        Self {
            out,
            json,
            speaking: None,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    pub fn render(&mut self, envelope: &EventEnvelope) -> std::io::Result<()> {
        if self.json {
            let line = serde_json::to_string(envelope).map_err(std::io::Error::other)?;
            writeln!(self.out, "{}", line)?;
            return self.out.flush();
        }

        match &envelope.event {
            DeliberationEvent::Token {
                agent,
                content,
                round,
            } => {
                let turn = (agent.clone(), *round);
                if self.speaking.as_ref() != Some(&turn) {
                    if *round == 0 {
                        write!(self.out, "\n── {} ──\n", agent)?;
                    } else {
                        write!(self.out, "\n── {} (round {}) ──\n", agent, round)?;
                    }
                    self.speaking = Some(turn);
                }
                write!(self.out, "{}", content)?;
            }
            DeliberationEvent::Message { .. } => {
                writeln!(self.out)?;
                self.speaking = None;
            }
            DeliberationEvent::RoundUpdate { round } => {
                writeln!(self.out, "\n═══ Round {} complete ═══", round.saturating_sub(1))?;
            }
            DeliberationEvent::Final { result } => {
                writeln!(self.out, "\n═══ Final Answer ═══\n{}", result)?;
            }
            DeliberationEvent::Error { message } => {
                writeln!(self.out, "\n[error] {}", message)?;
            }
        }
        self.out.flush()
    }

    /// Render until the run's terminal event. Returns it, or `None` if the
    /// bus closed first.
    pub async fn follow(
        &mut self,
        receiver: &mut FilteredReceiver,
    ) -> std::io::Result<Option<DeliberationEvent>> {
        loop {
            match receiver.recv().await {
                Ok(envelope) => {
                    self.render(&envelope)?;
                    if envelope.event.is_terminal() {
                        return Ok(Some(envelope.event));
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Console fell behind; some tokens were dropped");
                }
                Err(RecvError::Closed) => return Ok(None),
            }
        }
    }
}
