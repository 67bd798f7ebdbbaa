//! The model gateway the engine talks to.
//!
//! Owns the configured provider adapter, a root cancellation token for
//! `cancel_all`, and the metrics sink. Request helpers normalize usage
//! (estimating from character counts when the provider reports nothing)
//! and record one metrics entry per call, success or failure.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use tw_domain::config::{GatewayConfig, ProviderKind};
use tw_domain::error::{Error, Result};

use crate::anthropic::AnthropicClient;
use crate::google::GoogleClient;
use crate::jsonx;
use crate::metrics::{CallMetrics, MetricsSink, NullMetrics};
use crate::openai::OpenAiCompatClient;
use crate::pricing;
use crate::traits::{
    CompletionRequest, ProviderClient, StreamEvent, StreamSink, Usage,
};
use crate::usage::estimate_usage;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request options and responses
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Per-request knobs.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Route to the cheap model instead of the director model.
    pub use_cost_model: bool,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    /// Optional system instruction.
    pub system: Option<String>,
}

/// A plain-text completion.
#[derive(Debug, Clone)]
pub struct TextResponse {
    pub content: String,
    /// Always populated; estimated from character counts when the provider
    /// reported nothing.
    pub usage: Usage,
}

/// A schema-constrained completion.
#[derive(Debug, Clone)]
pub struct Structured<T> {
    pub data: T,
    pub usage: Usage,
}

struct Configured {
    client: Arc<dyn ProviderClient>,
    config: GatewayConfig,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ModelGateway
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Gateway wrapping the configured provider adapter.
pub struct ModelGateway {
    configured: RwLock<Option<Configured>>,
    root_cancel: Mutex<CancellationToken>,
    metrics: RwLock<Arc<dyn MetricsSink>>,
}

impl Default for ModelGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelGateway {
    pub fn new() -> Self {
        Self {
            configured: RwLock::new(None),
            root_cancel: Mutex::new(CancellationToken::new()),
            metrics: RwLock::new(Arc::new(NullMetrics)),
        }
    }

    /// Configure the gateway from persisted settings.
    ///
    /// The director model and (when set) the cost model must both appear
    /// in the price table; an unknown model clears any prior configuration
    /// so stale credentials never serve requests.
    pub fn configure(&self, config: GatewayConfig) -> Result<()> {
        if !pricing::known_model(&config.model) {
            *self.configured.write() = None;
            return Err(Error::Config(format!(
                "unknown model '{}': no pricing entry",
                config.model
            )));
        }
        if let Some(cost_model) = &config.cost_model {
            if !pricing::known_model(cost_model) {
                *self.configured.write() = None;
                return Err(Error::Config(format!(
                    "unknown cost model '{cost_model}': no pricing entry"
                )));
            }
        }

        let api_key = config.resolve_api_key()?;
        let client: Arc<dyn ProviderClient> = match config.provider {
            ProviderKind::Anthropic => Arc::new(AnthropicClient::new(api_key)?),
            ProviderKind::Openai => Arc::new(OpenAiCompatClient::new(api_key)?),
            ProviderKind::Google => Arc::new(GoogleClient::new(api_key)?),
        };

        tracing::info!(
            provider = config.provider.label(),
            model = %config.model,
            cost_model = %config.cost_model(),
            "model gateway configured"
        );

        *self.configured.write() = Some(Configured { client, config });
        Ok(())
    }

    /// Install a custom provider client (tests, local endpoints). Skips
    /// price-table validation; the caller owns the model ids.
    pub fn configure_with_client(&self, client: Arc<dyn ProviderClient>, config: GatewayConfig) {
        *self.configured.write() = Some(Configured { client, config });
    }

    pub fn is_configured(&self) -> bool {
        self.configured.read().is_some()
    }

    /// The director model id, when configured.
    pub fn configured_model(&self) -> Option<String> {
        self.configured.read().as_ref().map(|c| c.config.model.clone())
    }

    /// Replace the metrics sink.
    pub fn set_metrics_sink(&self, sink: Arc<dyn MetricsSink>) {
        *self.metrics.write() = sink;
    }

    /// Abort all in-flight requests and reset for new ones.
    ///
    /// Invoked on story reload and save-load; calls already in flight
    /// resolve to `Error::Cancelled`.
    pub fn cancel_all(&self) {
        let mut guard = self.root_cancel.lock();
        guard.cancel();
        *guard = CancellationToken::new();
        tracing::debug!("gateway cancelled all in-flight requests");
    }

    // ── Request surface ────────────────────────────────────────────

    /// Free-text completion.
    pub async fn text_request(&self, prompt: &str, opts: &RequestOptions) -> Result<TextResponse> {
        let completion = self.run(prompt, opts, false).await?;
        let usage = completion
            .usage
            .unwrap_or_else(|| estimate_usage(prompt, &completion.content));
        Ok(TextResponse {
            content: completion.content,
            usage,
        })
    }

    /// Schema-constrained completion. The prompt must describe the output
    /// contract; this method requests JSON mode where the provider has one
    /// and repairs prose-wrapped output via balanced-brace extraction.
    pub async fn structured_request<T: DeserializeOwned>(
        &self,
        prompt: &str,
        opts: &RequestOptions,
    ) -> Result<Structured<T>> {
        let completion = self.run(prompt, opts, true).await?;
        let usage = completion
            .usage
            .unwrap_or_else(|| estimate_usage(prompt, &completion.content));
        let data = jsonx::parse_lenient::<T>(&completion.content)?;
        Ok(Structured { data, usage })
    }

    /// Streaming text completion: tokens are delivered to `sink.on_token`
    /// as they arrive and the full text to `sink.on_complete` at the end.
    pub async fn stream_request(
        &self,
        prompt: &str,
        opts: &RequestOptions,
        sink: &dyn StreamSink,
    ) -> Result<TextResponse> {
        use futures_util::StreamExt;

        let (client, model, provider_label) = self.resolve(opts)?;
        let req = self.build_request(prompt, opts, model, false);
        let cancel = self.root_cancel.lock().child_token();

        let start = Instant::now();
        let mut stream = match client.complete_stream(&req, cancel).await {
            Ok(s) => s,
            Err(e) => {
                self.record(&req, &provider_label, None, start.elapsed().as_millis() as u64, Some(&e));
                return Err(e);
            }
        };

        let mut full = String::new();
        let mut usage = None;
        while let Some(event) = stream.next().await {
            match event {
                Ok(StreamEvent::Token { text }) => {
                    sink.on_token(&text);
                    full.push_str(&text);
                }
                Ok(StreamEvent::Done { usage: u }) => usage = u,
                Ok(StreamEvent::Error { message }) => {
                    let err = Error::Provider {
                        provider: provider_label.clone(),
                        message,
                    };
                    self.record(&req, &provider_label, None, start.elapsed().as_millis() as u64, Some(&err));
                    return Err(err);
                }
                Err(e) => {
                    self.record(&req, &provider_label, None, start.elapsed().as_millis() as u64, Some(&e));
                    return Err(e);
                }
            }
        }

        sink.on_complete(&full);
        let usage = usage.unwrap_or_else(|| estimate_usage(prompt, &full));
        self.record(&req, &provider_label, Some(usage), start.elapsed().as_millis() as u64, None);
        Ok(TextResponse {
            content: full,
            usage,
        })
    }

    // ── Internals ──────────────────────────────────────────────────

    fn resolve(&self, opts: &RequestOptions) -> Result<(Arc<dyn ProviderClient>, String, String)> {
        let guard = self.configured.read();
        let configured = guard.as_ref().ok_or_else(|| {
            Error::ProviderUnconfigured("configure a provider and model first".into())
        })?;
        let model = if opts.use_cost_model {
            configured.config.cost_model().to_owned()
        } else {
            configured.config.model.clone()
        };
        Ok((
            configured.client.clone(),
            model,
            configured.client.provider_id().to_owned(),
        ))
    }

    fn build_request(
        &self,
        prompt: &str,
        opts: &RequestOptions,
        model: String,
        json_mode: bool,
    ) -> CompletionRequest {
        CompletionRequest {
            system: opts.system.clone(),
            prompt: prompt.to_owned(),
            model,
            temperature: opts.temperature,
            max_tokens: opts.max_tokens,
            json_mode,
        }
    }

    async fn run(
        &self,
        prompt: &str,
        opts: &RequestOptions,
        json_mode: bool,
    ) -> Result<crate::traits::Completion> {
        let (client, model, provider_label) = self.resolve(opts)?;
        let req = self.build_request(prompt, opts, model, json_mode);
        let cancel = self.root_cancel.lock().child_token();

        let start = Instant::now();
        let result = client.complete(&req, cancel).await;
        let latency_ms = start.elapsed().as_millis() as u64;

        match &result {
            Ok(completion) => {
                let usage = completion
                    .usage
                    .unwrap_or_else(|| estimate_usage(prompt, &completion.content));
                self.record(&req, &provider_label, Some(usage), latency_ms, None);
            }
            Err(e) => self.record(&req, &provider_label, None, latency_ms, Some(e)),
        }

        result
    }

    fn record(
        &self,
        req: &CompletionRequest,
        provider: &str,
        usage: Option<Usage>,
        latency_ms: u64,
        error: Option<&Error>,
    ) {
        let usage = usage.unwrap_or_default();
        let cost = pricing::pricing_for(&req.model)
            .map(|p| p.estimate_cost(usage.prompt_tokens, usage.completion_tokens))
            .unwrap_or(0.0);

        self.metrics.read().record(CallMetrics {
            provider: provider.to_owned(),
            model: req.model.clone(),
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            latency_ms,
            success: error.is_none(),
            error_kind: error.map(|e| e.kind().to_owned()),
            estimated_cost_usd: cost,
            timestamp: Utc::now(),
        });
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
