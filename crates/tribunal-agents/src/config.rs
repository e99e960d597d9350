use anyhow::{Context, Result};
use coordination::{Provider, RoleTable};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Base URLs for every provider the role table can bind.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderEndpoints {
    /// OpenAI-compatible API root (`.../v1`).
    pub openai_url: String,
    /// DeepSeek's OpenAI-compatible API root.
    pub deepseek_url: String,
    /// Gemini API root (`.../v1beta`).
    pub gemini_url: String,
    /// Local Ollama server.
    pub ollama_url: String,
}

impl Default for ProviderEndpoints {
    fn default() -> Self {
        Self {
            openai_url: std::env::var("TRIBUNAL_OPENAI_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".into()),
            deepseek_url: std::env::var("TRIBUNAL_DEEPSEEK_URL")
                .unwrap_or_else(|_| "https://api.deepseek.com/v1".into()),
            gemini_url: std::env::var("TRIBUNAL_GEMINI_URL")
                .unwrap_or_else(|_| "https://generativelanguage.googleapis.com/v1beta".into()),
            ollama_url: std::env::var("TRIBUNAL_OLLAMA_URL")
                .unwrap_or_else(|_| "http://host.docker.internal:11434".into()),
        }
    }
}

impl ProviderEndpoints {
    /// Base URL for a provider, without a trailing slash.
    pub fn base_url(&self, provider: Provider) -> &str {
        let url = match provider {
            Provider::OpenAi => &self.openai_url,
            Provider::DeepSeek => &self.deepseek_url,
            Provider::Gemini => &self.gemini_url,
            Provider::Ollama => &self.ollama_url,
        };
        url.trim_end_matches('/')
    }
}

/// Problems found by [`TribunalConfig::validate`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("max_rounds must be at least 1")]
    ZeroRounds,

    #[error("endpoint URL for {0} is empty")]
    EmptyUrl(Provider),

    #[error("key TTL must be positive")]
    ZeroTtl,

    #[error("invalid role table: {0}")]
    Roles(#[from] coordination::deliberation::RoleTableError),
}

/// Top-level tribunal configuration.
#[derive(Debug, Clone)]
pub struct TribunalConfig {
    pub endpoints: ProviderEndpoints,
    /// Rounds per deliberation when the caller does not say.
    pub max_rounds: u32,
    /// How long API keys stay in the vault.
    pub key_ttl: Duration,
    /// Where the JSONL transcripts go.
    pub store_dir: PathBuf,
    /// Bound on connection establishment only; model calls are not timed out.
    pub connect_timeout: Duration,
    pub roles: RoleTable,
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

impl Default for TribunalConfig {
    fn default() -> Self {
        Self {
            endpoints: ProviderEndpoints::default(),
            max_rounds: env_parse("TRIBUNAL_MAX_ROUNDS", 3),
            key_ttl: Duration::from_secs(env_parse("TRIBUNAL_KEY_TTL_SECS", 3600)),
            store_dir: std::env::var("TRIBUNAL_STORE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(".tribunal/conversations")),
            connect_timeout: Duration::from_secs(env_parse("TRIBUNAL_CONNECT_TIMEOUT_SECS", 10)),
            roles: RoleTable::standard(),
        }
    }
}

/// Optional overrides read from a TOML file. Anything absent keeps the
/// environment-derived default.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    max_rounds: Option<u32>,
    key_ttl_secs: Option<u64>,
    store_dir: Option<PathBuf>,
    connect_timeout_secs: Option<u64>,
    endpoints: Option<EndpointOverrides>,
    roles: Option<RoleTable>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct EndpointOverrides {
    openai_url: Option<String>,
    deepseek_url: Option<String>,
    gemini_url: Option<String>,
    ollama_url: Option<String>,
}

impl TribunalConfig {
    /// Defaults overlaid with a TOML document.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(raw).context("Failed to parse tribunal config")?;
        let mut config = Self::default();

        if let Some(rounds) = file.max_rounds {
            config.max_rounds = rounds;
        }
        if let Some(secs) = file.key_ttl_secs {
            config.key_ttl = Duration::from_secs(secs);
        }
        if let Some(dir) = file.store_dir {
            config.store_dir = dir;
        }
        if let Some(secs) = file.connect_timeout_secs {
            config.connect_timeout = Duration::from_secs(secs);
        }
        if let Some(ep) = file.endpoints {
            let target = &mut config.endpoints;
            for (slot, value) in [
                (&mut target.openai_url, ep.openai_url),
                (&mut target.deepseek_url, ep.deepseek_url),
                (&mut target.gemini_url, ep.gemini_url),
                (&mut target.ollama_url, ep.ollama_url),
            ] {
                if let Some(v) = value {
                    *slot = v;
                }
            }
        }
        if let Some(roles) = file.roles {
            config.roles = roles;
        }

        config.validate()?;
        Ok(config)
    }

    /// Defaults overlaid with the TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml_str(&raw).with_context(|| format!("Invalid config {}", path.display()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_rounds == 0 {
            return Err(ConfigError::ZeroRounds);
        }
        if self.key_ttl.is_zero() {
            return Err(ConfigError::ZeroTtl);
        }
        for provider in [
            Provider::OpenAi,
            Provider::Gemini,
            Provider::DeepSeek,
            Provider::Ollama,
        ] {
            if self.endpoints.base_url(provider).trim().is_empty() {
                return Err(ConfigError::EmptyUrl(provider));
            }
        }
        self.roles.validate()?;
        Ok(())
    }
}

/// Check if the local model server is reachable (GET /api/tags).
pub async fn check_endpoint(url: &str) -> bool {
    let tags_url = format!("{}/api/tags", url.trim_end_matches('/'));
    match reqwest::Client::new()
        .get(&tags_url)
        .timeout(Duration::from_secs(5))
        .send()
        .await
    {
        Ok(resp) => resp.status().is_success(),
        Err(_) => false,
    }
}
