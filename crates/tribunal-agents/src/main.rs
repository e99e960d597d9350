//! `tribunal`: ask three models to debate a question and an arbiter to
//! settle it.
//!
//! # Usage
//!
//! ```bash
//! # Cloud keys are optional; missing ones fall back to local Ollama models
//! OPENAI_API_KEY=... GEMINI_API_KEY=... tribunal ask "Is Rust memory safe?" --max-rounds 2
//!
//! # Raw event stream
//! tribunal ask "Explain CAP" --json
//!
//! # Replay a stored transcript
//! tribunal history 6f0c1c9e-...
//! ```

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use coordination::{EventBus, EventFilter, FilteredReceiver, Provider};
use tracing::{info, warn};
use tribunal_agents::config::check_endpoint;
use tribunal_agents::{Console, Dispatcher, JsonlMessageStore, TribunalConfig};

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(name = "tribunal", author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a deliberation and stream it to the terminal
    Ask {
        /// The question to deliberate
        question: String,

        /// Debater rounds before the arbiter (overrides TRIBUNAL_MAX_ROUNDS)
        #[arg(long)]
        max_rounds: Option<u32>,

        /// TOML config overlay
        #[arg(long)]
        config: Option<PathBuf>,

        /// Transcript directory (overrides TRIBUNAL_STORE_DIR)
        #[arg(long)]
        store_dir: Option<PathBuf>,

        /// Print raw event JSON lines instead of rendered text
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Print a stored transcript
    History {
        conversation_id: String,

        /// TOML config overlay
        #[arg(long)]
        config: Option<PathBuf>,

        /// Transcript directory (overrides TRIBUNAL_STORE_DIR)
        #[arg(long)]
        store_dir: Option<PathBuf>,

        /// Print records as JSON lines
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

fn load_config(path: Option<&PathBuf>, store_dir: Option<PathBuf>) -> Result<TribunalConfig> {
    let mut config = match path {
        Some(path) => TribunalConfig::load(path)?,
        None => TribunalConfig::default(),
    };
    if let Some(dir) = store_dir {
        config.store_dir = dir;
    }
    Ok(config)
}

fn keys_from_env() -> HashMap<Provider, String> {
    [
        (Provider::OpenAi, "OPENAI_API_KEY"),
        (Provider::Gemini, "GEMINI_API_KEY"),
        (Provider::DeepSeek, "DEEPSEEK_API_KEY"),
    ]
    .into_iter()
    .filter_map(|(provider, var)| std::env::var(var).ok().map(|key| (provider, key)))
    .collect()
}

async fn ask(
    question: String,
    max_rounds: Option<u32>,
    mut config: TribunalConfig,
    json: bool,
) -> Result<()> {
    if let Some(rounds) = max_rounds {
        config.max_rounds = rounds;
    }
    let keys = keys_from_env();
    let missing: Vec<String> = Provider::CLOUD
        .iter()
        .filter(|p| !keys.contains_key(*p))
        .map(|p| p.to_string())
        .collect();
    if !missing.is_empty() && !check_endpoint(&config.endpoints.ollama_url).await {
        warn!(
            missing = %missing.join(", "),
            ollama = %config.endpoints.ollama_url,
            "Some roles will fall back to Ollama, which is not reachable"
        );
    }

    let bus = EventBus::new().shared();
    let dispatcher = Dispatcher::from_config(&config, bus.clone())?;

    // Subscribe before the run is spawned so no event is missed.
    let raw = bus.subscribe();
    let (conversation_id, handle) = dispatcher.start(&question, keys, None).await;
    info!(conversation_id = %conversation_id, "Deliberation started");

    let mut receiver =
        FilteredReceiver::new(raw, EventFilter::new().conversation(&conversation_id));
    let mut console = Console::new(std::io::stdout(), json);
    let last = console
        .follow(&mut receiver)
        .await
        .context("Failed to write to stdout")?;

    if last.is_none() {
        warn!(conversation_id = %conversation_id, "Event stream closed before the run finished");
    }

    let outcome = handle
        .await
        .context("Deliberation task panicked")?
        .with_context(|| format!("Deliberation {} failed", conversation_id))?;
    info!(
        conversation_id = %conversation_id,
        entries = outcome.state.transcript.len(),
        "Done"
    );
    Ok(())
}

async fn history(conversation_id: String, config: TribunalConfig, json: bool) -> Result<()> {
    let store = JsonlMessageStore::new(config.store_dir.clone());
    let records = store
        .history(&conversation_id)
        .await
        .with_context(|| format!("Failed to read history for {}", conversation_id))?;
    if records.is_empty() {
        anyhow::bail!("No transcript found for {}", conversation_id);
    }

    for record in &records {
        if json {
            println!("{}", serde_json::to_string(record)?);
        } else {
            println!(
                "[{}] round {} · {}\n{}\n",
                record.timestamp.format("%H:%M:%S"),
                record.round,
                record.agent,
                record.content
            );
        }
    }
    if !json {
        let status = if store.is_completed(&conversation_id).await {
            "completed"
        } else {
            "incomplete"
        };
        println!("({} records, {})", records.len(), status);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    match args.command {
        Command::Ask {
            question,
            max_rounds,
            config,
            store_dir,
            json,
        } => {
            let config = load_config(config.as_ref(), store_dir)?;
            ask(question, max_rounds, config, json).await
        }
        Command::History {
            conversation_id,
            config,
            store_dir,
            json,
        } => {
            let config = load_config(config.as_ref(), store_dir)?;
            history(conversation_id, config, json).await
        }
    }
}
