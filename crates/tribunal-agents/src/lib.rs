//! Tribunal runtime: HTTP model providers, the credential vault, the JSONL
//! message store, and the dispatcher that runs deliberations on tokio tasks.

#![allow(clippy::uninlined_format_args)]

pub mod config;
pub mod console;
pub mod dispatch;
pub mod providers;
pub mod store;
pub mod vault;

pub use config::{ConfigError, ProviderEndpoints, TribunalConfig};
pub use console::Console;
pub use dispatch::{Dispatcher, RunHandle};
pub use providers::HttpModelInvoker;
pub use store::JsonlMessageStore;
pub use vault::{fingerprint, CredentialVault, KeySource};
