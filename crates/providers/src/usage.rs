//! Token-usage normalization and provider error classification.
//!
//! Providers spell usage fields differently (`input_tokens`,
//! `prompt_tokens`, `promptTokenCount`, ...). Everything upstream of the
//! adapters consumes only the normalized [`Usage`] shape produced here.

use serde_json::Value;

use tw_domain::error::Error;

use crate::traits::Usage;

/// Approximate chars-per-token multiplier used when a provider reports no
/// usage at all.
pub(crate) const CHARS_PER_TOKEN: usize = 4;

const PROMPT_KEYS: &[&str] = &[
    "input_tokens",
    "prompt_tokens",
    "promptTokens",
    "promptTokenCount",
];
const COMPLETION_KEYS: &[&str] = &[
    "output_tokens",
    "completion_tokens",
    "completionTokens",
    "candidatesTokenCount",
];
const TOTAL_KEYS: &[&str] = &["total_tokens", "totalTokens", "totalTokenCount"];

fn first_u32(v: &Value, keys: &[&str]) -> Option<u32> {
    keys.iter()
        .find_map(|k| v.get(*k))
        .and_then(Value::as_u64)
        .map(|n| n as u32)
}

/// Normalize a provider usage object into [`Usage`].
///
/// The total is derived from prompt + completion when the provider omits
/// it. Returns `None` when no recognized field is present.
pub fn normalize_usage(v: &Value) -> Option<Usage> {
    let prompt = first_u32(v, PROMPT_KEYS);
    let completion = first_u32(v, COMPLETION_KEYS);
    let total = first_u32(v, TOTAL_KEYS);

    if prompt.is_none() && completion.is_none() && total.is_none() {
        return None;
    }

    let prompt_tokens = prompt.unwrap_or(0);
    let completion_tokens = completion.unwrap_or(0);
    Some(Usage {
        prompt_tokens,
        completion_tokens,
        total_tokens: total.unwrap_or(prompt_tokens + completion_tokens),
    })
}

/// Estimate usage from character counts when the provider reports nothing.
pub fn estimate_usage(prompt: &str, completion: &str) -> Usage {
    let prompt_tokens = (prompt.len() / CHARS_PER_TOKEN) as u32;
    let completion_tokens = (completion.len() / CHARS_PER_TOKEN) as u32;
    Usage {
        prompt_tokens,
        completion_tokens,
        total_tokens: prompt_tokens + completion_tokens,
    }
}

/// Classify a non-success HTTP response into the error taxonomy.
pub fn classify_http_error(provider: &str, status: u16, body: &str) -> Error {
    match status {
        401 | 403 => Error::InvalidKey(format!("{provider} rejected the key (HTTP {status})")),
        402 => Error::QuotaExceeded(format!("{provider} HTTP 402: {}", snippet(body))),
        429 => {
            let lowered = body.to_lowercase();
            if lowered.contains("quota") || lowered.contains("billing") {
                Error::QuotaExceeded(format!("{provider}: {}", snippet(body)))
            } else {
                Error::RateLimited(format!("{provider}: {}", snippet(body)))
            }
        }
        408 => Error::Timeout(format!("{provider} HTTP 408")),
        _ => Error::Provider {
            provider: provider.to_owned(),
            message: format!("HTTP {status} - {}", snippet(body)),
        },
    }
}

/// Convert a transport-level [`reqwest::Error`] into the domain error.
pub(crate) fn from_reqwest(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout(e.to_string())
    } else if e.is_connect() || e.is_request() {
        Error::Network(e.to_string())
    } else {
        Error::Http(e.to_string())
    }
}

fn snippet(body: &str) -> &str {
    let end = body
        .char_indices()
        .nth(200)
        .map(|(i, _)| i)
        .unwrap_or(body.len());
    body[..end].trim()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
