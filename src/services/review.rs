//! Review service — code snippet in, model-written review or rewrite out.
//!
//! DESIGN
//! ======
//! One prompt per action, one round-trip through [`LlmChat`]. Nothing here
//! touches board state; failures go back to the single HTTP caller.

use std::sync::OnceLock;

use crate::llm::LlmChat;
use crate::llm::types::LlmError;
use crate::services::persistence::env_parse;

const DEFAULT_AI_MAX_TOKENS: u32 = 4096;

fn ai_max_tokens() -> u32 {
    static VALUE: OnceLock<u32> = OnceLock::new();
    *VALUE.get_or_init(|| env_parse("AI_MAX_TOKENS", DEFAULT_AI_MAX_TOKENS))
}

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ReviewError {
    #[error("Invalid AI action: {0}")]
    UnknownAction(String),
    #[error("AI features are disabled. No API key configured on the server.")]
    NotConfigured,
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewAction {
    Analyze,
    Refactor,
    AddComments,
}

impl ReviewAction {
    /// Parse the wire name used by the editor toolbar.
    ///
    /// # Errors
    ///
    /// Returns [`ReviewError::UnknownAction`] for anything else.
    pub fn parse(raw: &str) -> Result<Self, ReviewError> {
        match raw {
            "analyze" => Ok(Self::Analyze),
            "refactor" => Ok(Self::Refactor),
            "add_comments" => Ok(Self::AddComments),
            other => Err(ReviewError::UnknownAction(other.to_string())),
        }
    }
}

// =============================================================================
// PROMPTS
// =============================================================================

#[must_use]
pub fn build_prompt(action: ReviewAction, code: &str, lang: &str) -> String {
    let instructions = match action {
        ReviewAction::Analyze => format!(
            "You are an expert code reviewer. Analyze the following {lang} code snippet. \
             Provide a comprehensive review covering these three areas, using markdown headings for each:\n\n\
             ### Correctness\n\
             - Point out any potential bugs, logical errors, or unhandled edge cases.\n\n\
             ### Suggestions\n\
             - Suggest improvements for readability, performance, or idiomatic style.\n\n\
             ### Solidity\n\
             - Give a rating from 1-10 on how robust and production-ready the code is, and briefly justify your rating."
        ),
        ReviewAction::Refactor => format!(
            "You are an expert software engineer. Refactor the following {lang} code snippet to improve its \
             quality, readability, and performance. Provide ONLY the refactored code inside a single markdown \
             code block, with no additional explanation before or after the code block."
        ),
        ReviewAction::AddComments => format!(
            "You are an expert software engineer. Add clear, concise, and helpful comments to the following \
             {lang} code snippet. Explain the intent behind the code, not just what it does. Provide ONLY the \
             commented code inside a single markdown code block, with no additional explanation before or after \
             the code block."
        ),
    };
    format!("{instructions}\n\n```{lang}\n{code}\n```")
}

// =============================================================================
// REVIEW
// =============================================================================

/// Run one review round-trip.
///
/// # Errors
///
/// Returns [`ReviewError::Llm`] when the provider call fails or replies with
/// nothing but whitespace.
pub async fn review(llm: &dyn LlmChat, code: &str, lang: &str, action: ReviewAction) -> Result<String, ReviewError> {
    let prompt = build_prompt(action, code, lang);
    let started = std::time::Instant::now();

    let reply = llm.complete(ai_max_tokens(), &prompt).await?;

    tracing::info!(
        ?action,
        lang,
        code_len = code.len(),
        reply_len = reply.len(),
        elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        "ai review complete"
    );

    if reply.trim().is_empty() {
        return Err(LlmError::ApiParse("empty reply".into()).into());
    }
    Ok(reply)
}

#[cfg(test)]
#[path = "review_test.rs"]
mod tests;
