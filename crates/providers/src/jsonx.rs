//! Two-phase JSON recovery for structured model output.
//!
//! Models routinely wrap their JSON in explanatory prose or markdown
//! fences. Phase one is a strict parse of the whole text; phase two
//! extracts the first balanced `{...}` substring (string- and
//! escape-aware) and parses that. No further heuristics: anything that
//! survives neither phase is a [`Error::Parse`].

use serde::de::DeserializeOwned;

use tw_domain::error::{Error, Result};

/// Extract the first balanced top-level JSON object from `text`.
///
/// Tracks string literals and escapes so braces inside strings do not
/// confuse the depth count. Returns `None` when no balanced object exists.
pub fn extract_balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Parse structured output: strict first, balanced-brace recovery second.
pub fn parse_lenient<T: DeserializeOwned>(text: &str) -> Result<T> {
    match serde_json::from_str::<T>(text.trim()) {
        Ok(v) => Ok(v),
        Err(strict_err) => {
            if let Some(candidate) = extract_balanced_object(text) {
                if let Ok(v) = serde_json::from_str::<T>(candidate) {
                    tracing::debug!("structured output recovered via balanced-brace extraction");
                    return Ok(v);
                }
            }
            Err(Error::Parse(format!(
                "structured output is not valid JSON: {strict_err}"
            )))
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
