//! Conversational replies from a generative backend that may time out, fail or
//! answer with nothing.

use crate::error::BackendError;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Default budget for one backend call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// A text-completion service.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, BackendError>;
}

/// [`Backend`] calling Ollama's `/api/generate` endpoint without streaming.
#[derive(Clone, Debug)]
pub struct OllamaBackend {
    http: Client,
    base_url: String,
    model: String,
}

#[derive(Deserialize)]
struct Generation {
    #[serde(default)]
    response: String,
}

impl OllamaBackend {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl Backend for OllamaBackend {
    async fn complete(&self, prompt: &str) -> Result<String, BackendError> {
        let url = format!("{}/api/generate", self.base_url);
        let body = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false
        });
        trace!(target = "llm", %url, body = %body, "Ollama prompt");
        let resp = self.http.post(url).json(&body).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(BackendError::Status(status.as_u16()));
        }
        let generation: Generation = resp.json().await?;
        debug!(target = "llm", response = %generation.response, "Ollama response");
        Ok(generation.response)
    }
}

/// Canned situations the bot can ask for a remark about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Context {
    /// The user went quiet.
    NoResponse,
    Generic,
}

/// Wraps a [`Backend`] with a timeout and exactly one fallback attempt.
#[derive(Clone)]
pub struct ReplyGenerator {
    backend: Arc<dyn Backend>,
    persona: String,
    timeout: Duration,
}

impl ReplyGenerator {
    pub fn new(backend: Arc<dyn Backend>, persona: impl Into<String>) -> Self {
        Self {
            backend,
            persona: persona.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Reply used when both the first call and the fallback fail.
    pub fn last_resort(&self) -> String {
        format!("{} short-circuited mid-roast. Try again later.", self.persona)
    }

    fn fallback_prompt(&self, prompt: &str) -> String {
        format!(
            "Hey {}, you glitched while responding to: '{prompt}'. Roast yourself for being broken.",
            self.persona
        )
    }

    /// One bounded backend call. Blank completions count as failures.
    async fn call(&self, prompt: &str) -> Result<String, BackendError> {
        let text = tokio::time::timeout(self.timeout, self.backend.complete(prompt))
            .await
            .map_err(|_| {
                BackendError::Transport(format!("timed out after {:?}", self.timeout))
            })??;
        let text = text.trim();
        if text.is_empty() {
            return Err(BackendError::Empty);
        }
        Ok(text.to_string())
    }

    /// Produces a reply to `prompt`. Never fails: after one fallback attempt
    /// it answers with [`ReplyGenerator::last_resort`].
    pub async fn generate(&self, prompt: &str) -> String {
        match self.call(prompt).await {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "reply failed, asking for a fallback");
                match self.call(&self.fallback_prompt(prompt)).await {
                    Ok(text) => text,
                    Err(e) => {
                        warn!(error = %e, "fallback reply failed");
                        self.last_resort()
                    }
                }
            }
        }
    }

    /// Produces a remark for a canned situation with a single call.
    ///
    /// Failures are reported as a short literal rather than retried.
    pub async fn generate_contextual(&self, context: Context) -> String {
        let prompt = match context {
            Context::NoResponse => format!(
                "Insult the user for ignoring {} for an hour.",
                self.persona
            ),
            Context::Generic => "Roast the user in a witty and mildly teasing way.".to_string(),
        };
        match self.call(&prompt).await {
            Ok(text) => text,
            Err(BackendError::Status(status)) => {
                format!("Ollama mood: {status}. Feeling grumpy.")
            }
            Err(e) => {
                debug!(error = %e, ?context, "contextual reply failed");
                format!("{} fell asleep again.", self.persona)
            }
        }
    }
}
