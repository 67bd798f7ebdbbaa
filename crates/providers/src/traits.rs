use std::pin::Pin;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use tw_domain::error::Result;

/// A boxed async stream, used for streaming completions.
pub type BoxStream<'a, T> = Pin<Box<dyn futures_core::Stream<Item = T> + Send + 'a>>;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request / Response types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A provider-agnostic single-turn completion request.
///
/// The narrative engine sends one composed prompt per call; conversation
/// history lives inside the prompt, not in a message list.
#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    /// System instruction, when the provider supports a separate slot.
    pub system: Option<String>,
    /// The composed user prompt.
    pub prompt: String,
    /// Model identifier (provider-native spelling).
    pub model: String,
    /// Sampling temperature. `None` lets the provider choose.
    pub temperature: Option<f32>,
    /// Maximum tokens in the response. `None` lets the adapter choose.
    pub max_tokens: Option<u32>,
    /// When `true`, ask the provider to emit valid JSON only (adapters
    /// that lack a native JSON mode rely on the prompt's format contract).
    pub json_mode: bool,
}

/// A provider-agnostic completion response.
#[derive(Debug, Clone)]
pub struct Completion {
    pub content: String,
    /// Normalized token usage, when the provider reported any.
    pub usage: Option<Usage>,
    /// The model that actually produced the response.
    pub model: String,
}

/// Normalized token usage for one call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Events emitted during streaming delivery.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// A text token chunk.
    Token { text: String },
    /// Stream finished; carries usage when the provider reported it.
    Done { usage: Option<Usage> },
    /// The provider signalled an error mid-stream.
    Error { message: String },
}

/// Token-level delivery sink for streaming requests.
///
/// `on_token` is called per chunk; `on_complete` once with the full text.
pub trait StreamSink: Send + Sync {
    fn on_token(&self, text: &str);
    fn on_complete(&self, full: &str);
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Core provider trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Trait every model adapter implements.
///
/// Adapters translate between the engine's request shape and each
/// provider's HTTP wire format. Every call takes a [`CancellationToken`];
/// a cancelled token must resolve to `Error::Cancelled` without side
/// effects.
#[async_trait::async_trait]
pub trait ProviderClient: Send + Sync {
    /// Send a completion request and wait for the full response.
    async fn complete(
        &self,
        req: &CompletionRequest,
        cancel: CancellationToken,
    ) -> Result<Completion>;

    /// Send a completion request and return a stream of events.
    async fn complete_stream(
        &self,
        req: &CompletionRequest,
        cancel: CancellationToken,
    ) -> Result<BoxStream<'static, Result<StreamEvent>>>;

    /// A stable identifier for this provider ("anthropic", "openai", ...).
    fn provider_id(&self) -> &str;
}
