//! Shared SSE plumbing for the streaming adapters.
//!
//! Every provider streams the same way at the transport level: chunks
//! arrive, events are delimited by a blank line, and only `data:` lines
//! matter. Each adapter supplies a closure that turns one `data:` payload
//! into zero or more [`StreamEvent`]s.

use tokio_util::sync::CancellationToken;

use tw_domain::error::{Error, Result};

use crate::traits::{BoxStream, StreamEvent};
use crate::usage::from_reqwest;

/// Pull complete `data:` payloads out of an SSE buffer, leaving any
/// trailing partial event in place for the next chunk.
pub(crate) fn take_data_payloads(buffer: &mut String) -> Vec<String> {
    let mut payloads = Vec::new();

    while let Some(sep) = buffer.find("\n\n") {
        let event: String = buffer.drain(..sep + 2).collect();
        for line in event.lines() {
            if let Some(data) = line.trim_start().strip_prefix("data:") {
                let data = data.trim();
                if !data.is_empty() {
                    payloads.push(data.to_owned());
                }
            }
        }
    }

    payloads
}

/// Turn an SSE `reqwest::Response` into a stream of [`StreamEvent`]s.
///
/// The parser closure is `FnMut` so adapters can keep assembly state
/// across payloads. The stream checks the cancellation token between
/// chunks, and a fallback `Done` event is emitted if the parser never
/// produced one.
pub(crate) fn into_event_stream<F>(
    response: reqwest::Response,
    cancel: CancellationToken,
    mut parse: F,
) -> BoxStream<'static, Result<StreamEvent>>
where
    F: FnMut(&str) -> Vec<Result<StreamEvent>> + Send + 'static,
{
    Box::pin(async_stream::stream! {
        let mut response = response;
        let mut buffer = String::new();
        let mut done_seen = false;

        loop {
            let chunk = tokio::select! {
                _ = cancel.cancelled() => {
                    yield Err(Error::Cancelled);
                    return;
                }
                c = response.chunk() => c,
            };

            let body_closed = match chunk {
                Ok(Some(bytes)) => {
                    buffer.push_str(&String::from_utf8_lossy(&bytes));
                    false
                }
                Ok(None) => {
                    // Body closed: force-flush any trailing partial event.
                    if !buffer.trim().is_empty() {
                        buffer.push_str("\n\n");
                    }
                    true
                }
                Err(e) => {
                    yield Err(from_reqwest(e));
                    return;
                }
            };

            for payload in take_data_payloads(&mut buffer) {
                for event in parse(&payload) {
                    if matches!(event, Ok(StreamEvent::Done { .. })) {
                        done_seen = true;
                    }
                    yield event;
                }
            }

            if body_closed {
                break;
            }
        }

        if !done_seen {
            yield Ok(StreamEvent::Done { usage: None });
        }
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
