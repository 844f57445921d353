//! LLM — provider adapter for the code review endpoint.
//!
//! DESIGN
//! ======
//! Configuration comes from environment variables. The `LlmClient` struct
//! dispatches to Gemini or Anthropic based on `LLM_PROVIDER`; routes only see
//! the [`LlmChat`] trait.

pub mod anthropic;
pub mod config;
pub mod gemini;
pub mod types;

use config::{LlmConfig, LlmProviderKind};
pub use types::LlmChat;
use types::LlmError;

// =============================================================================
// CLIENT DISPATCH
// =============================================================================

/// Concrete LLM client that dispatches to either Gemini or Anthropic.
///
/// Configured from environment variables by [`LlmClient::from_env`].
pub struct LlmClient {
    inner: LlmProvider,
    model: String,
}

enum LlmProvider {
    Gemini(gemini::GeminiClient),
    Anthropic(anthropic::AnthropicClient),
}

impl LlmClient {
    /// Build an LLM client from environment variables. See
    /// [`LlmConfig::from_env`] for the recognized variables.
    ///
    /// # Errors
    ///
    /// Returns an error if the API key is missing or the HTTP client fails.
    pub fn from_env() -> Result<Self, LlmError> {
        let config = LlmConfig::from_env()?;
        Self::from_config(config)
    }

    /// Build an LLM client from a parsed typed config.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider HTTP client fails to build.
    pub fn from_config(config: LlmConfig) -> Result<Self, LlmError> {
        let model = config.model.clone();
        let inner = match config.provider {
            LlmProviderKind::Gemini => LlmProvider::Gemini(gemini::GeminiClient::new(config.api_key, config.timeouts)?),
            LlmProviderKind::Anthropic => {
                LlmProvider::Anthropic(anthropic::AnthropicClient::new(config.api_key, config.timeouts)?)
            }
        };
        Ok(Self { inner, model })
    }

    /// Return the configured model name.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait::async_trait]
impl LlmChat for LlmClient {
    async fn complete(&self, max_tokens: u32, prompt: &str) -> Result<String, LlmError> {
        match &self.inner {
            LlmProvider::Gemini(c) => c.complete(&self.model, max_tokens, prompt).await,
            LlmProvider::Anthropic(c) => c.complete(&self.model, max_tokens, prompt).await,
        }
    }
}
