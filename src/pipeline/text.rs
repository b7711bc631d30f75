//! Text completion: one prompt in, one page of text out.
//!
//! [`TextBackend`] is the seam the page generator talks to. The production
//! implementation, [`LlmTextBackend`], wraps any `edgequake_llm` provider
//! (OpenAI, Anthropic, Gemini, Ollama, ...) and sends the page prompt as a
//! single user message. No retries and no streaming: a failure is reported
//! once and the generator turns it into an error page.

use crate::config::BookConfig;
use crate::error::BackendError;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider};
use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{timeout, Duration};
use tracing::debug;

/// Produces the text of a page from a prompt.
pub trait TextBackend: Send + Sync {
    /// Complete `prompt`; the caller has already appended the page suffix.
    fn complete<'a>(&'a self, prompt: &'a str) -> BoxFuture<'a, Result<String, BackendError>>;
}

/// [`TextBackend`] over an `edgequake_llm` provider.
pub struct LlmTextBackend {
    provider: Arc<dyn LLMProvider>,
    temperature: f32,
    max_tokens: usize,
    timeout_secs: u64,
}

impl LlmTextBackend {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &BookConfig) -> Self {
        Self {
            provider,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout_secs: config.api_timeout_secs,
        }
    }

    fn options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
            ..Default::default()
        }
    }
}

impl TextBackend for LlmTextBackend {
    fn complete<'a>(&'a self, prompt: &'a str) -> BoxFuture<'a, Result<String, BackendError>> {
        Box::pin(async move {
            let start = Instant::now();
            let messages = vec![ChatMessage::user(prompt)];
            let options = self.options();

            let response = timeout(
                Duration::from_secs(self.timeout_secs),
                self.provider.chat(&messages, Some(&options)),
            )
            .await
            .map_err(|_| BackendError::Timeout {
                secs: self.timeout_secs,
            })?
            .map_err(|e| BackendError::from_provider_message(e.to_string()))?;

            debug!(
                "Text completion: {} input tokens, {} output tokens, {:?}",
                response.prompt_tokens,
                response.completion_tokens,
                start.elapsed()
            );
            Ok(response.content)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    impl TextBackend for Echo {
        fn complete<'a>(&'a self, prompt: &'a str) -> BoxFuture<'a, Result<String, BackendError>> {
            Box::pin(async move { Ok(format!("echo: {prompt}")) })
        }
    }

    #[tokio::test]
    async fn trait_objects_are_callable() {
        let backend: Arc<dyn TextBackend> = Arc::new(Echo);
        let out = backend.complete("hi (Page 1)").await.unwrap();
        assert_eq!(out, "echo: hi (Page 1)");
    }
}
