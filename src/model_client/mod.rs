//! Model Client: streams chat completions from a local model server on
//! loopback, applies per-category sampling defaults, and strips reasoning
//! traces from the final text.
//!
//! Streams NDJSON deltas via `FramedRead` + `LinesCodec` over a `reqwest`
//! byte stream.

pub mod think_strip;
pub mod wire;

use crate::config::{ModelCategory, ModelSpec, Role, Size};
use crate::error::EngineError;
use futures_util::{Stream, StreamExt};
use reqwest::Client;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::codec::{FramedRead, LinesCodec};
use wire::{ChatMessage, ChatOptions, ChatRequest, ChatResponseDelta, PullProgress, PullRequest, TagsResponse};

pub use wire::ChatMessage as Message;

/// Cooperative cancellation handle shared between a caller and an in-flight
/// model call. Cloning shares the same underlying flag.
#[derive(Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Result of a completed (possibly interrupted) model call.
#[derive(Debug, Clone)]
pub struct CallOutcome {
    /// Final text with reasoning-trace spans stripped if the model's
    /// ModelSpec declares `supports_reasoning_trace`.
    pub text: String,
    /// True if the call was cancelled before the model finished streaming.
    /// Cancellation still delivers whatever partial text was accumulated —
    /// never an empty string when any tokens arrived.
    pub interrupted: bool,
}

#[derive(Clone)]
pub struct ModelClient {
    http: Client,
    base_url: String,
}

/// Per-category sampling temperature.
pub fn sampling_temperature(category: ModelCategory) -> f32 {
    match category {
        ModelCategory::Reasoning => 0.4,
        ModelCategory::Coding => 0.15,
        // "reviewer" isn't a model category but a role; Reviewer calls route
        // through a coding or general model, so the 0.3 reviewer default is
        // applied by role in `resolve_options`, not here.
        ModelCategory::Agentic | ModelCategory::General => 0.6,
        ModelCategory::Summarizer => 0.3,
        ModelCategory::Embedding => 0.0,
    }
}

/// Role-level override: the Reviewer role always samples at 0.3 regardless
/// of which model category ends up serving it.
fn temperature_for(role: Role, category: ModelCategory) -> f32 {
    if role == Role::Reviewer {
        0.3
    } else {
        sampling_temperature(category)
    }
}

/// Context window scaling by workspace/project size.
pub fn context_window_for(spec: &ModelSpec, size: Size) -> usize {
    let multiplier = match size {
        Size::Small => 1.0,
        Size::Medium => 1.5,
        Size::Large => 2.0,
    };
    ((spec.default_context_window as f64) * multiplier) as usize
}

impl ModelClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Streaming chat: `Stream<Item = Result<String, EngineError>>` of
    /// incremental text tokens in the order produced by the model.
    async fn chat_stream(
        &self,
        model: &str,
        messages: &[ChatMessage],
        options: ChatOptions,
    ) -> Result<impl Stream<Item = Result<String, EngineError>>, EngineError> {
        let url = format!("{}/api/chat", self.base_url);
        let req = ChatRequest {
            model: model.to_string(),
            messages: messages.to_vec(),
            stream: true,
            options,
        };

        let resp = self
            .http
            .post(url)
            .json(&req)
            .send()
            .await
            .map_err(|e| EngineError::TransportError(e.to_string()))?;

        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(EngineError::ModelMissing(model.to_string()));
        }
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(EngineError::TransportError(format!("{status}: {text}")));
        }

        let stream = resp
            .bytes_stream()
            .map(|item| item.map_err(std::io::Error::other));
        let reader = tokio_util::io::StreamReader::new(stream);
        let lines = FramedRead::new(reader, LinesCodec::new());

        let tokens = lines.map(|line_result| {
            let line = line_result.map_err(|e| EngineError::TransportError(e.to_string()))?;
            if line.trim().is_empty() {
                return Ok(String::new());
            }
            let delta: ChatResponseDelta = serde_json::from_str(&line)
                .map_err(|e| EngineError::TransportError(format!("malformed delta: {e}")))?;
            Ok(delta.message.map(|m| m.content).unwrap_or_default())
        });

        Ok(tokens)
    }

    /// Drain a streaming call to completion, honoring `cancel`. Retries the
    /// initial connection with exponential backoff (up to 3 attempts
    /// starting at 250ms) before surfacing a `TransportError`.
    pub async fn call(
        &self,
        role: Role,
        messages: Vec<ChatMessage>,
        spec: &ModelSpec,
        size: Size,
        cancel: &CancelFlag,
    ) -> Result<CallOutcome, EngineError> {
        let options = ChatOptions {
            temperature: temperature_for(role, spec.category),
            num_ctx: context_window_for(spec, size),
        };

        let mut attempt = 0;
        let mut backoff = Duration::from_millis(250);
        let mut stream = loop {
            match self.chat_stream(&spec.name, &messages, options.clone()).await {
                Ok(s) => break s,
                Err(EngineError::ModelMissing(m)) => return Err(EngineError::ModelMissing(m)),
                Err(e) if attempt < 2 => {
                    attempt += 1;
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                    tracing::warn!(attempt, error = %e, "retrying model call after transport error");
                }
                Err(e) => return Err(e),
            }
        };

        let mut accumulated = String::new();
        let mut interrupted = false;
        while let Some(next) = stream.next().await {
            if cancel.is_cancelled() {
                interrupted = true;
                break;
            }
            match next {
                Ok(token) => accumulated.push_str(&token),
                Err(e) => {
                    if accumulated.is_empty() {
                        return Err(e);
                    }
                    interrupted = true;
                    break;
                }
            }
        }

        let text = if spec.supports_reasoning_trace {
            think_strip::strip_think_spans(&accumulated)
        } else {
            accumulated
        };

        Ok(CallOutcome { text, interrupted })
    }

    /// `GET /api/tags` — installed-model enumeration, exact name match
    /// required by the Router.
    pub async fn list_installed(&self) -> Result<Vec<String>, EngineError> {
        let url = format!("{}/api/tags", self.base_url);
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| EngineError::TransportError(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(EngineError::TransportError(format!(
                "tags request failed: {}",
                resp.status()
            )));
        }
        let payload: TagsResponse = resp
            .json()
            .await
            .map_err(|e| EngineError::TransportError(e.to_string()))?;
        Ok(payload.models.into_iter().map(|m| m.name).collect())
    }

    /// `POST /api/pull` with streamed progress deltas.
    pub async fn pull(
        &self,
        name: &str,
        mut on_progress: impl FnMut(PullProgress),
    ) -> Result<(), EngineError> {
        let url = format!("{}/api/pull", self.base_url);
        let resp = self
            .http
            .post(url)
            .json(&PullRequest {
                name: name.to_string(),
                stream: true,
            })
            .send()
            .await
            .map_err(|e| EngineError::TransportError(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(EngineError::TransportError(format!(
                "pull request failed: {}",
                resp.status()
            )));
        }
        let stream = resp
            .bytes_stream()
            .map(|item| item.map_err(std::io::Error::other));
        let reader = tokio_util::io::StreamReader::new(stream);
        let mut lines = FramedRead::new(reader, LinesCodec::new());
        while let Some(line) = lines.next().await {
            let line = line.map_err(|e| EngineError::TransportError(e.to_string()))?;
            if line.trim().is_empty() {
                continue;
            }
            if let Ok(progress) = serde_json::from_str::<PullProgress>(&line) {
                on_progress(progress);
            }
        }
        Ok(())
    }
}
