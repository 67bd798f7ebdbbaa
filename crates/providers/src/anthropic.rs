//! Anthropic Messages API adapter.
//!
//! Anthropic puts the system instruction in a top-level `system` field,
//! requires `max_tokens`, and has no native JSON mode, so structured calls
//! rely on the prompt's output contract plus the caller's JSON recovery.

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use tw_domain::error::{Error, Result};

use crate::sse::into_event_stream;
use crate::traits::{BoxStream, Completion, CompletionRequest, ProviderClient, StreamEvent, Usage};
use crate::usage::{classify_http_error, from_reqwest, normalize_usage};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_MAX_TOKENS: u32 = 4096;
const REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(120);

/// Adapter for the Anthropic Messages API.
pub struct AnthropicClient {
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl AnthropicClient {
    pub fn new(api_key: String) -> Result<Self> {
        Self::with_base_url(api_key, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(api_key: String, base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(from_reqwest)?;
        Ok(Self {
            api_key,
            base_url: base_url.trim_end_matches('/').to_owned(),
            client,
        })
    }

    fn build_body(&self, req: &CompletionRequest, stream: bool) -> Value {
        let mut body = serde_json::json!({
            "model": req.model,
            "max_tokens": req.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            "messages": [{"role": "user", "content": req.prompt}],
            "stream": stream,
        });
        if let Some(system) = &req.system {
            body["system"] = Value::String(system.clone());
        }
        if let Some(temp) = req.temperature {
            body["temperature"] = serde_json::json!(temp);
        }
        body
    }

    async fn post(
        &self,
        body: &Value,
        cancel: &CancellationToken,
    ) -> Result<reqwest::Response> {
        let url = format!("{}/v1/messages", self.base_url);
        let fut = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .json(body)
            .send();

        let resp = tokio::select! {
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            r = fut => r.map_err(from_reqwest)?,
        };
        Ok(resp)
    }
}

fn parse_response(body: &Value) -> Completion {
    let content = body
        .get("content")
        .and_then(Value::as_array)
        .map(|blocks| {
            blocks
                .iter()
                .filter_map(|b| b.get("text").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default();

    let model = body
        .get("model")
        .and_then(Value::as_str)
        .unwrap_or("unknown")
        .to_owned();

    Completion {
        content,
        usage: body.get("usage").and_then(normalize_usage),
        model,
    }
}

/// Parse one Anthropic SSE payload into stream events.
///
/// `prompt_usage` carries input-token counts from `message_start` until the
/// closing `message_delta` arrives with the output count.
fn parse_sse(data: &str, prompt_usage: &mut Option<Usage>) -> Vec<Result<StreamEvent>> {
    let v: Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(e) => return vec![Err(Error::Json(e))],
    };

    match v.get("type").and_then(Value::as_str).unwrap_or("") {
        "message_start" => {
            *prompt_usage = v
                .get("message")
                .and_then(|m| m.get("usage"))
                .and_then(normalize_usage);
            Vec::new()
        }
        "content_block_delta" => {
            let text = v
                .get("delta")
                .and_then(|d| d.get("text"))
                .and_then(Value::as_str)
                .unwrap_or("");
            if text.is_empty() {
                Vec::new()
            } else {
                vec![Ok(StreamEvent::Token {
                    text: text.to_owned(),
                })]
            }
        }
        "message_delta" => {
            if let Some(output) = v
                .get("usage")
                .and_then(|u| u.get("output_tokens"))
                .and_then(Value::as_u64)
            {
                let mut usage = prompt_usage.unwrap_or_default();
                usage.completion_tokens = output as u32;
                usage.total_tokens = usage.prompt_tokens + usage.completion_tokens;
                *prompt_usage = Some(usage);
            }
            Vec::new()
        }
        "message_stop" => vec![Ok(StreamEvent::Done {
            usage: *prompt_usage,
        })],
        "error" => {
            let message = v
                .get("error")
                .and_then(|e| e.get("message"))
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_owned();
            vec![Ok(StreamEvent::Error { message })]
        }
        _ => Vec::new(),
    }
}

#[async_trait::async_trait]
impl ProviderClient for AnthropicClient {
    async fn complete(
        &self,
        req: &CompletionRequest,
        cancel: CancellationToken,
    ) -> Result<Completion> {
        tracing::debug!(model = %req.model, "anthropic completion request");
        let body = self.build_body(req, false);
        let resp = self.post(&body, &cancel).await?;

        let status = resp.status();
        let text = tokio::select! {
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            t = resp.text() => t.map_err(from_reqwest)?,
        };

        if !status.is_success() {
            return Err(classify_http_error("anthropic", status.as_u16(), &text));
        }

        let json: Value = serde_json::from_str(&text)?;
        Ok(parse_response(&json))
    }

    async fn complete_stream(
        &self,
        req: &CompletionRequest,
        cancel: CancellationToken,
    ) -> Result<BoxStream<'static, Result<StreamEvent>>> {
        let body = self.build_body(req, true);
        let resp = self.post(&body, &cancel).await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.map_err(from_reqwest)?;
            return Err(classify_http_error("anthropic", status.as_u16(), &text));
        }

        let mut prompt_usage: Option<Usage> = None;
        Ok(into_event_stream(resp, cancel, move |data| {
            parse_sse(data, &mut prompt_usage)
        }))
    }

    fn provider_id(&self) -> &str {
        "anthropic"
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
