mod base;
pub mod openai;

pub use base::{
    ChatMessage, ChatRole, LLMConfig, LLMError, LLMResult, TokenSource, TokenStream,
};
pub use openai::{OPENAI_BASE_URL, OpenAIChatStream};

use std::sync::Arc;

pub const SUPPORTED_PROVIDERS: &[&str] = &["openai"];

/// Create a streaming token source.
///
/// # Supported Providers
///
/// - `"openai"` - OpenAI chat completions; set `base_url` to target any
///   OpenAI-compatible server (Groq, vLLM, Ollama, ...)
pub fn create_token_source(
    provider_type: &str,
    config: LLMConfig,
) -> LLMResult<Arc<dyn TokenSource>> {
    match provider_type.trim().to_lowercase().as_str() {
        "openai" | "openai-compatible" => Ok(Arc::new(OpenAIChatStream::new(config)?)),
        other => Err(LLMError::InvalidConfiguration(format!(
            "Unsupported LLM provider: {other}. Supported providers: {}",
            SUPPORTED_PROVIDERS.join(", ")
        ))),
    }
}
