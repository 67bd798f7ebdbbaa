//! OpenAI-compatible chat completions adapter.
//!
//! Works against api.openai.com and any endpoint speaking the same
//! protocol. Supports native JSON mode via `response_format` and the
//! `[DONE]` SSE sentinel.

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use tw_domain::error::{Error, Result};

use crate::sse::into_event_stream;
use crate::traits::{BoxStream, Completion, CompletionRequest, ProviderClient, StreamEvent, Usage};
use crate::usage::{classify_http_error, from_reqwest, normalize_usage};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(120);

/// Adapter for OpenAI-compatible chat completion endpoints.
pub struct OpenAiCompatClient {
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl OpenAiCompatClient {
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
        let mut messages = Vec::new();
        if let Some(system) = &req.system {
            messages.push(serde_json::json!({"role": "system", "content": system}));
        }
        messages.push(serde_json::json!({"role": "user", "content": req.prompt}));

        let mut body = serde_json::json!({
            "model": req.model,
            "messages": messages,
            "stream": stream,
        });
        if stream {
            // Ask for a usage chunk at the end of the stream.
            body["stream_options"] = serde_json::json!({"include_usage": true});
        }
        if let Some(temp) = req.temperature {
            body["temperature"] = serde_json::json!(temp);
        }
        if let Some(max) = req.max_tokens {
            body["max_tokens"] = serde_json::json!(max);
        }
        if req.json_mode {
            body["response_format"] = serde_json::json!({"type": "json_object"});
        }
        body
    }

    async fn post(
        &self,
        body: &Value,
        cancel: &CancellationToken,
    ) -> Result<reqwest::Response> {
        let url = format!("{}/chat/completions", self.base_url);
        let fut = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
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
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|c| c.first())
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_owned();

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

/// Parse one OpenAI SSE payload. The `[DONE]` sentinel closes the stream;
/// a final content-less chunk may carry usage.
fn parse_sse(data: &str, pending_usage: &mut Option<Usage>) -> Vec<Result<StreamEvent>> {
    if data == "[DONE]" {
        return vec![Ok(StreamEvent::Done {
            usage: *pending_usage,
        })];
    }

    let v: Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(e) => return vec![Err(Error::Json(e))],
    };

    if let Some(usage) = v.get("usage").filter(|u| !u.is_null()) {
        *pending_usage = normalize_usage(usage);
    }

    let text = v
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|c| c.first())
        .and_then(|c| c.get("delta"))
        .and_then(|d| d.get("content"))
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

#[async_trait::async_trait]
impl ProviderClient for OpenAiCompatClient {
    async fn complete(
        &self,
        req: &CompletionRequest,
        cancel: CancellationToken,
    ) -> Result<Completion> {
        tracing::debug!(model = %req.model, json_mode = req.json_mode, "openai completion request");
        let body = self.build_body(req, false);
        let resp = self.post(&body, &cancel).await?;

        let status = resp.status();
        let text = tokio::select! {
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            t = resp.text() => t.map_err(from_reqwest)?,
        };

        if !status.is_success() {
            return Err(classify_http_error("openai", status.as_u16(), &text));
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
            return Err(classify_http_error("openai", status.as_u16(), &text));
        }

        let mut pending_usage: Option<Usage> = None;
        Ok(into_event_stream(resp, cancel, move |data| {
            parse_sse(data, &mut pending_usage)
        }))
    }

    fn provider_id(&self) -> &str {
        "openai"
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn req(json_mode: bool) -> CompletionRequest {
        CompletionRequest {
            system: Some("sys".into()),
            prompt: "hello".into(),
            model: "gpt-4o".into(),
            temperature: Some(0.1),
            max_tokens: Some(256),
            json_mode,
        }
    }

    #[test]
    fn body_includes_system_message_and_json_mode() {
        let client = OpenAiCompatClient::new("k".into()).unwrap();
        let body = client.build_body(&req(true), false);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(body["response_format"]["type"], "json_object");
        assert_eq!(body["max_tokens"], 256);
        assert!(body.get("stream_options").is_none());
    }

    #[test]
    fn stream_body_requests_usage_chunk() {
        let client = OpenAiCompatClient::new("k".into()).unwrap();
        let body = client.build_body(&req(false), true);
        assert_eq!(body["stream_options"]["include_usage"], true);
        assert!(body.get("response_format").is_none());
    }

    #[test]
    fn parse_response_extracts_first_choice() {
        let body = json!({
            "model": "gpt-4o-2024-08-06",
            "choices": [{"message": {"role": "assistant", "content": "Hi there."}}],
            "usage": {"prompt_tokens": 9, "completion_tokens": 3, "total_tokens": 12}
        });
        let c = parse_response(&body);
        assert_eq!(c.content, "Hi there.");
        assert_eq!(c.usage.unwrap().total_tokens, 12);
        assert_eq!(c.model, "gpt-4o-2024-08-06");
    }

    #[test]
    fn sse_deltas_then_done_with_usage() {
        let mut usage = None;

        let events = parse_sse(
            r#"{"choices":[{"delta":{"content":"Wor"}}]}"#,
            &mut usage,
        );
        assert!(matches!(&events[0], Ok(StreamEvent::Token { text }) if text == "Wor"));

        // Final content-less chunk carrying usage.
        let events = parse_sse(
            r#"{"choices":[],"usage":{"prompt_tokens":5,"completion_tokens":2,"total_tokens":7}}"#,
            &mut usage,
        );
        assert!(events.is_empty());

        let events = parse_sse("[DONE]", &mut usage);
        match &events[0] {
            Ok(StreamEvent::Done { usage: Some(u) }) => assert_eq!(u.total_tokens, 7),
            other => panic!("expected Done with usage, got {other:?}"),
        }
    }

    #[test]
    fn sse_null_usage_field_ignored() {
        let mut usage = None;
        parse_sse(r#"{"choices":[{"delta":{"content":"x"}}],"usage":null}"#, &mut usage);
        assert!(usage.is_none());
    }
}
