//! Expensive-model narrator.
//!
//! Composes the director prompt, requests the structured envelope, and
//! degrades gracefully: output that survives neither strict parsing nor
//! balanced-brace recovery becomes a typed fallback response with the
//! reason tucked into `signals.error`, so raw JSON never reaches the
//! player.

use std::sync::Arc;
use std::time::Instant;

use tw_domain::error::{Error, Result};
use tw_domain::state::SessionState;
use tw_domain::story::Story;
use tw_domain::trace::TraceEvent;
use tw_domain::wire::DirectorResponse;
use tw_memory::MemoryContext;
use tw_providers::{ModelGateway, RequestOptions};

use crate::prompt::{PromptComposer, TransitionOption};

const DIRECTOR_TEMPERATURE: f32 = 0.8;
const CONCLUSION_TEMPERATURE: f32 = 0.9;

/// Everything one director call needs.
pub struct DirectorContext<'a> {
    pub story: &'a Story,
    pub state: &'a SessionState,
    pub memory: &'a MemoryContext,
    /// The transition the classifier fired, whose sketch is mandatory
    /// weaving material.
    pub preselected: Option<&'a TransitionOption>,
    /// Validator issues from the rejected first attempt, on the retry.
    pub retry_feedback: Option<&'a str>,
    /// Post-ending turns: epilogue register, no state changes.
    pub reflective: bool,
    pub player_input: &'a str,
}

/// The narrator component.
pub struct Director {
    gateway: Arc<ModelGateway>,
}

impl Director {
    pub fn new(gateway: Arc<ModelGateway>) -> Self {
        Self { gateway }
    }

    /// Produce one narrative turn.
    ///
    /// Parse failures return the typed fallback; provider errors
    /// propagate so the turn loop can refuse without touching state.
    pub async fn direct(&self, ctx: &DirectorContext<'_>) -> Result<DirectorResponse> {
        let prompt = PromptComposer::director_prompt(
            ctx.story,
            ctx.state,
            ctx.memory,
            ctx.preselected,
            ctx.retry_feedback,
            ctx.reflective,
            ctx.player_input,
        );
        let opts = RequestOptions {
            temperature: Some(DIRECTOR_TEMPERATURE),
            ..RequestOptions::default()
        };

        let start = Instant::now();
        let result = self
            .gateway
            .structured_request::<DirectorResponse>(&prompt, &opts)
            .await;

        TraceEvent::DirectorCall {
            scene: ctx.state.current_scene_id.clone(),
            preselected: ctx.preselected.map(|t| t.target_id.clone()),
            retry: ctx.retry_feedback.is_some(),
            duration_ms: start.elapsed().as_millis() as u64,
        }
        .emit();

        match result {
            Ok(structured) => {
                let mut response = structured.data;
                if response.narrative.trim().is_empty() {
                    tracing::warn!("director returned an empty narrative, using fallback");
                    return Ok(DirectorResponse::parse_fallback("empty narrative"));
                }
                response.importance = response.clamped_importance();
                Ok(response)
            }
            Err(Error::Parse(reason)) => {
                tracing::warn!(%reason, "director output unparseable, using fallback");
                Ok(DirectorResponse::parse_fallback(&reason))
            }
            Err(e) => Err(e),
        }
    }

    /// Generate a conclusion for an ending with no authored sketch.
    /// Plain-text call; runs on a spawned task, not the turn path.
    pub async fn generate_conclusion(
        &self,
        story: &Story,
        state: &SessionState,
        ending_id: &str,
    ) -> Result<String> {
        let prompt = PromptComposer::conclusion_prompt(story, state, ending_id);
        let opts = RequestOptions {
            temperature: Some(CONCLUSION_TEMPERATURE),
            ..RequestOptions::default()
        };
        let response = self.gateway.text_request(&prompt, &opts).await?;
        Ok(response.content)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use tokio_util::sync::CancellationToken;
    use tw_domain::config::{GatewayConfig, ProviderKind};
    use tw_memory::MemoryStats;
    use tw_providers::{BoxStream, Completion, CompletionRequest, ProviderClient, StreamEvent};

    struct Scripted {
        responses: Mutex<VecDeque<String>>,
    }

    impl Scripted {
        fn new(responses: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.iter().map(|s| s.to_string()).collect()),
            })
        }
    }

    #[async_trait::async_trait]
    impl ProviderClient for Scripted {
        async fn complete(
            &self,
            req: &CompletionRequest,
            _cancel: CancellationToken,
        ) -> Result<Completion> {
            let content = self
                .responses
                .lock()
                .pop_front()
                .ok_or_else(|| Error::Other("script exhausted".into()))?;
            Ok(Completion {
                content,
                usage: None,
                model: req.model.clone(),
            })
        }

        async fn complete_stream(
            &self,
            _req: &CompletionRequest,
            _cancel: CancellationToken,
        ) -> Result<BoxStream<'static, Result<StreamEvent>>> {
            Ok(Box::pin(futures_util::stream::empty()))
        }

        fn provider_id(&self) -> &str {
            "scripted"
        }
    }

    fn gateway(script: Arc<Scripted>) -> Arc<ModelGateway> {
        let gw = Arc::new(ModelGateway::new());
        gw.configure_with_client(
            script,
            GatewayConfig {
                provider: ProviderKind::Anthropic,
                model: "mock".into(),
                api_key: "k".into(),
                cost_model: None,
            },
        );
        gw
    }

    fn story() -> Story {
        Story::from_yaml_str(
            "id: s\ntitle: S\nscenes:\n  hall:\n    sketch: \"A hall.\"\n",
        )
        .unwrap()
    }

    fn memory() -> MemoryContext {
        MemoryContext {
            recent_formatted: String::new(),
            significant_formatted: String::new(),
            stats: MemoryStats {
                recent: 0,
                significant: 0,
                since_extraction: 0,
                processing: false,
            },
        }
    }

    fn ctx<'a>(
        story: &'a Story,
        state: &'a SessionState,
        memory: &'a MemoryContext,
    ) -> DirectorContext<'a> {
        DirectorContext {
            story,
            state,
            memory,
            preselected: None,
            retry_feedback: None,
            reflective: false,
            player_input: "look around",
        }
    }

    #[tokio::test]
    async fn well_formed_response_passes_through() {
        let script = Scripted::new(&[
            r#"{"narrative":"Dust motes hang in the light.","importance":4,
                "signals":{"setFlags":["looked_around"]}}"#,
        ]);
        let director = Director::new(gateway(script));
        let s = story();
        let state = SessionState::at_start(&s);
        let mem = memory();

        let resp = director.direct(&ctx(&s, &state, &mem)).await.unwrap();
        assert_eq!(resp.narrative, "Dust motes hang in the light.");
        assert_eq!(resp.importance, 4);
        assert_eq!(resp.signals.unwrap().set_flags, vec!["looked_around"]);
    }

    #[tokio::test]
    async fn prose_wrapped_json_recovers() {
        let script = Scripted::new(&[
            "Here's the scene:\n{\"narrative\":\"The hall waits.\",\"importance\":3}\nEnjoy!",
        ]);
        let director = Director::new(gateway(script));
        let s = story();
        let state = SessionState::at_start(&s);
        let mem = memory();

        let resp = director.direct(&ctx(&s, &state, &mem)).await.unwrap();
        assert_eq!(resp.narrative, "The hall waits.");
    }

    #[tokio::test]
    async fn garbage_output_becomes_typed_fallback() {
        let script = Scripted::new(&["I refuse to answer in JSON today."]);
        let director = Director::new(gateway(script));
        let s = story();
        let state = SessionState::at_start(&s);
        let mem = memory();

        let resp = director.direct(&ctx(&s, &state, &mem)).await.unwrap();
        assert!(resp.narrative.contains("trouble understanding"));
        assert!(resp.signals.unwrap().error.is_some());
        // Raw model output never surfaces.
        assert!(!resp.narrative.contains("JSON"));
    }

    #[tokio::test]
    async fn empty_narrative_becomes_fallback() {
        let script = Scripted::new(&[r#"{"narrative":"   ","importance":5}"#]);
        let director = Director::new(gateway(script));
        let s = story();
        let state = SessionState::at_start(&s);
        let mem = memory();

        let resp = director.direct(&ctx(&s, &state, &mem)).await.unwrap();
        assert!(resp.narrative.contains("trouble understanding"));
    }

    #[tokio::test]
    async fn out_of_range_importance_is_clamped() {
        let script = Scripted::new(&[r#"{"narrative":"Fine.","importance":99}"#]);
        let director = Director::new(gateway(script));
        let s = story();
        let state = SessionState::at_start(&s);
        let mem = memory();

        let resp = director.direct(&ctx(&s, &state, &mem)).await.unwrap();
        assert_eq!(resp.importance, 10);
    }

    #[tokio::test]
    async fn provider_errors_propagate() {
        let director = Director::new(Arc::new(ModelGateway::new()));
        let s = story();
        let state = SessionState::at_start(&s);
        let mem = memory();

        let err = director.direct(&ctx(&s, &state, &mem)).await.unwrap_err();
        assert_eq!(err.kind(), "provider_unconfigured");
    }

    #[tokio::test]
    async fn conclusion_is_plain_text() {
        let script = Scripted::new(&["The lamp burns on, long after you are gone."]);
        let director = Director::new(gateway(script));
        let s = story();
        let state = SessionState::at_start(&s);

        let text = director
            .generate_conclusion(&s, &state, "solitude")
            .await
            .unwrap();
        assert!(text.contains("lamp burns on"));
    }
}
