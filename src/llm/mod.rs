//! LLM integration.
//!
//! The reply generator talks to the Anthropic Messages API directly over
//! `reqwest`; callers only see the `LlmProvider` trait.

pub mod anthropic;
pub mod provider;

pub use anthropic::AnthropicProvider;
pub use provider::*;

use std::sync::Arc;
use std::time::Duration;

use crate::error::{ConfigError, LlmError};

/// Model used when `OPSBRIDGE_MODEL` is unset.
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

/// Default upper bound on one generation call.
pub const DEFAULT_GENERATION_TIMEOUT: Duration = Duration::from_secs(120);

/// Configuration for creating an LLM provider.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: secrecy::SecretString,
    pub model: String,
    pub timeout: Duration,
    /// Messages endpoint override.
    pub base_url: Option<String>,
}

impl LlmConfig {
    /// Read `ANTHROPIC_API_KEY`, `OPSBRIDGE_MODEL`, `OPSBRIDGE_GENERATION_TIMEOUT_SECS`
    /// and `OPSBRIDGE_ANTHROPIC_BASE_URL`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = std::env::var("ANTHROPIC_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingRequired {
                key: "ANTHROPIC_API_KEY".into(),
                hint: "Set it to an Anthropic API key used for reply generation".into(),
            })?;

        let model = std::env::var("OPSBRIDGE_MODEL")
            .ok()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let timeout = match std::env::var("OPSBRIDGE_GENERATION_TIMEOUT_SECS") {
            Ok(raw) => Duration::from_secs(raw.trim().parse().map_err(|_| {
                ConfigError::InvalidValue {
                    key: "OPSBRIDGE_GENERATION_TIMEOUT_SECS".into(),
                    message: format!("expected whole seconds, got {raw:?}"),
                }
            })?),
            Err(_) => DEFAULT_GENERATION_TIMEOUT,
        };

        Ok(Self {
            api_key: secrecy::SecretString::from(api_key),
            model,
            timeout,
            base_url: std::env::var("OPSBRIDGE_ANTHROPIC_BASE_URL").ok(),
        })
    }
}

/// Create an LLM provider from configuration.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    let mut provider = AnthropicProvider::new(&config.api_key, &config.model, config.timeout)?;
    if let Some(url) = &config.base_url {
        provider = provider.with_base_url(url.clone());
    }
    tracing::info!(model = %config.model, "Using Anthropic");
    Ok(Arc::new(provider))
}
