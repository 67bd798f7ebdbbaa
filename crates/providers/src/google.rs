//! Google Gemini adapter (generativelanguage API).
//!
//! Gemini takes the model in the URL path, the system instruction in
//! `systemInstruction`, and sampling knobs in `generationConfig`. JSON
//! mode maps to `responseMimeType: application/json`.

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use tw_domain::error::{Error, Result};

use crate::sse::into_event_stream;
use crate::traits::{BoxStream, Completion, CompletionRequest, ProviderClient, StreamEvent, Usage};
use crate::usage::{classify_http_error, from_reqwest, normalize_usage};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(120);

/// Adapter for the Google Gemini API.
pub struct GoogleClient {
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl GoogleClient {
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

    fn build_body(&self, req: &CompletionRequest) -> Value {
        let mut generation_config = serde_json::json!({});
        if let Some(temp) = req.temperature {
            generation_config["temperature"] = serde_json::json!(temp);
        }
        if let Some(max) = req.max_tokens {
            generation_config["maxOutputTokens"] = serde_json::json!(max);
        }
        if req.json_mode {
            generation_config["responseMimeType"] = serde_json::json!("application/json");
        }

        let mut body = serde_json::json!({
            "contents": [{"role": "user", "parts": [{"text": req.prompt}]}],
            "generationConfig": generation_config,
        });
        if let Some(system) = &req.system {
            body["systemInstruction"] = serde_json::json!({"parts": [{"text": system}]});
        }
        body
    }

    async fn post(
        &self,
        req: &CompletionRequest,
        method: &str,
        query: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<reqwest::Response> {
        let mut url = format!("{}/models/{}:{method}", self.base_url, req.model);
        if let Some(q) = query {
            url.push('?');
            url.push_str(q);
        }

        let fut = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&self.build_body(req))
            .send();

        let resp = tokio::select! {
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            r = fut => r.map_err(from_reqwest)?,
        };
        Ok(resp)
    }
}

fn candidate_text(body: &Value) -> String {
    body.get("candidates")
        .and_then(Value::as_array)
        .and_then(|c| c.first())
        .and_then(|c| c.get("content"))
        .and_then(|c| c.get("parts"))
        .and_then(Value::as_array)
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p.get("text").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default()
}

fn parse_response(body: &Value, requested_model: &str) -> Completion {
    Completion {
        content: candidate_text(body),
        usage: body.get("usageMetadata").and_then(normalize_usage),
        model: body
            .get("modelVersion")
            .and_then(Value::as_str)
            .unwrap_or(requested_model)
            .to_owned(),
    }
}

/// Parse one Gemini SSE payload: each chunk is a full response object with
/// partial candidate text; the last one carries usage metadata.
fn parse_sse(data: &str, pending_usage: &mut Option<Usage>) -> Vec<Result<StreamEvent>> {
    let v: Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(e) => return vec![Err(Error::Json(e))],
    };

    if let Some(usage) = v.get("usageMetadata") {
        *pending_usage = normalize_usage(usage);
    }

    let text = candidate_text(&v);
    let finished = v
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|c| c.first())
        .and_then(|c| c.get("finishReason"))
        .and_then(Value::as_str)
        .is_some();

    let mut events = Vec::new();
    if !text.is_empty() {
        events.push(Ok(StreamEvent::Token { text }));
    }
    if finished {
        events.push(Ok(StreamEvent::Done {
            usage: *pending_usage,
        }));
    }
    events
}

#[async_trait::async_trait]
impl ProviderClient for GoogleClient {
    async fn complete(
        &self,
        req: &CompletionRequest,
        cancel: CancellationToken,
    ) -> Result<Completion> {
        tracing::debug!(model = %req.model, json_mode = req.json_mode, "google completion request");
        let resp = self.post(req, "generateContent", None, &cancel).await?;

        let status = resp.status();
        let text = tokio::select! {
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            t = resp.text() => t.map_err(from_reqwest)?,
        };

        if !status.is_success() {
            return Err(classify_http_error("google", status.as_u16(), &text));
        }

        let json: Value = serde_json::from_str(&text)?;
        Ok(parse_response(&json, &req.model))
    }

    async fn complete_stream(
        &self,
        req: &CompletionRequest,
        cancel: CancellationToken,
    ) -> Result<BoxStream<'static, Result<StreamEvent>>> {
        let resp = self
            .post(req, "streamGenerateContent", Some("alt=sse"), &cancel)
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.map_err(from_reqwest)?;
            return Err(classify_http_error("google", status.as_u16(), &text));
        }

        let mut pending_usage: Option<Usage> = None;
        Ok(into_event_stream(resp, cancel, move |data| {
            parse_sse(data, &mut pending_usage)
        }))
    }

    fn provider_id(&self) -> &str {
        "google"
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
