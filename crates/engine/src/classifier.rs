//! Cheap-model gatekeeper: player action → `continue` or a numbered
//! transition, under strict prerequisite logic.
//!
//! The model's answer is post-validated against the menu; an out-of-range
//! or malformed target is retried with notes appended, and the final
//! fallback is always `continue` at low confidence.

use std::sync::Arc;

use tw_domain::error::{Error, Result};
use tw_domain::state::SessionState;
use tw_domain::story::Story;
use tw_domain::trace::TraceEvent;
use tw_domain::wire::ClassifierVerdict;
use tw_memory::MemoryContext;
use tw_providers::{ModelGateway, RequestOptions};

use crate::prompt::{transition_menu, PromptComposer, TransitionOption};

/// Classification attempts before falling back to `continue`.
const MAX_RETRIES: u32 = 3;

/// Low, near-deterministic sampling for prerequisite evaluation.
const CLASSIFIER_TEMPERATURE: f32 = 0.1;

const FALLBACK_CONFIDENCE: f32 = 0.2;

/// The engine-facing classification result.
#[derive(Debug, Clone)]
pub struct ClassifyOutcome {
    /// The fired transition, or `None` for `continue`.
    pub target: Option<TransitionOption>,
    pub reasoning: String,
    /// 1.0 for a clean verdict, low when the fallback kicked in.
    pub confidence: f32,
}

impl ClassifyOutcome {
    fn continue_with(reasoning: String, confidence: f32) -> Self {
        Self {
            target: None,
            reasoning,
            confidence,
        }
    }
}

/// Classifies player actions against the scene's transition menu.
pub struct ActionClassifier {
    gateway: Arc<ModelGateway>,
}

impl ActionClassifier {
    pub fn new(gateway: Arc<ModelGateway>) -> Self {
        Self { gateway }
    }

    /// Classify one player action.
    ///
    /// An unconfigured provider degrades to `continue` (the director call
    /// will surface the configuration problem); other provider errors
    /// propagate so the turn can fail without state changes.
    pub async fn classify(
        &self,
        story: &Story,
        state: &SessionState,
        memory: &MemoryContext,
        player_action: &str,
    ) -> Result<ClassifyOutcome> {
        let menu = transition_menu(story, &state.current_scene_id);
        if menu.is_empty() {
            return Ok(ClassifyOutcome::continue_with(
                "no transitions available".into(),
                1.0,
            ));
        }

        let opts = RequestOptions {
            use_cost_model: true,
            temperature: Some(CLASSIFIER_TEMPERATURE),
            ..RequestOptions::default()
        };

        let mut retry_notes: Vec<String> = Vec::new();

        for attempt in 1..=MAX_RETRIES {
            let prompt = PromptComposer::classifier_prompt(
                story,
                state,
                &menu,
                memory,
                &retry_notes,
                player_action,
            );

            let verdict = match self
                .gateway
                .structured_request::<ClassifierVerdict>(&prompt, &opts)
                .await
            {
                Ok(structured) => structured.data,
                Err(Error::ProviderUnconfigured(_)) => {
                    return Ok(ClassifyOutcome::continue_with(
                        "classifier unavailable: provider not configured".into(),
                        FALLBACK_CONFIDENCE,
                    ));
                }
                Err(Error::Parse(reason)) => {
                    tracing::debug!(attempt, %reason, "classifier output unparseable, retrying");
                    retry_notes.push(
                        "your previous answer was not valid JSON; respond with the JSON \
                         object only"
                            .into(),
                    );
                    continue;
                }
                Err(e) => return Err(e),
            };

            if verdict.is_continue() {
                TraceEvent::ClassifierDecision {
                    result: "continue".into(),
                    attempts: attempt,
                    confidence: 1.0,
                }
                .emit();
                return Ok(ClassifyOutcome {
                    target: None,
                    reasoning: verdict.reasoning,
                    confidence: 1.0,
                });
            }

            match verdict.transition_index().and_then(|i| menu.get(i)) {
                Some(option) => {
                    TraceEvent::ClassifierDecision {
                        result: verdict.result.clone(),
                        attempts: attempt,
                        confidence: 1.0,
                    }
                    .emit();
                    return Ok(ClassifyOutcome {
                        target: Some(option.clone()),
                        reasoning: verdict.reasoning,
                        confidence: 1.0,
                    });
                }
                None => {
                    tracing::debug!(
                        attempt,
                        result = %verdict.result,
                        "classifier chose an unknown transition, retrying"
                    );
                    retry_notes.push(format!(
                        "'{}' is not a listed transition; valid answers are \"continue\" \
                         or T0..T{}",
                        verdict.result,
                        menu.len() - 1
                    ));
                }
            }
        }

        TraceEvent::ClassifierDecision {
            result: "continue".into(),
            attempts: MAX_RETRIES,
            confidence: FALLBACK_CONFIDENCE,
        }
        .emit();
        Ok(ClassifyOutcome::continue_with(
            "classification failed repeatedly; defaulting to continue".into(),
            FALLBACK_CONFIDENCE,
        ))
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
        prompts: Mutex<Vec<String>>,
    }

    impl Scripted {
        fn new(responses: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.iter().map(|s| s.to_string()).collect()),
                prompts: Mutex::new(Vec::new()),
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
            self.prompts.lock().push(req.prompt.clone());
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
                cost_model: Some("mock-cheap".into()),
            },
        );
        gw
    }

    fn story() -> Story {
        Story::from_yaml_str(
            r#"
id: kitchen-story
title: Kitchen
scenes:
  kitchen:
    sketch: "A cramped kitchen."
    transitions:
      - condition: "player opens the fridge"
        target: pantry
  pantry:
    sketch: "Cold shelves."
"#,
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

    #[tokio::test]
    async fn continue_verdict_passes_through() {
        let script = Scripted::new(&[r#"{"result":"continue","reasoning":"nothing matched"}"#]);
        let classifier = ActionClassifier::new(gateway(script));
        let s = story();
        let state = SessionState::at_start(&s);

        let outcome = classifier
            .classify(&s, &state, &memory(), "look around the kitchen")
            .await
            .unwrap();
        assert!(outcome.target.is_none());
        assert_eq!(outcome.reasoning, "nothing matched");
        assert!((outcome.confidence - 1.0).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn transition_verdict_resolves_menu_entry() {
        let script = Scripted::new(&[r#"{"result":"T0","reasoning":"fridge opened"}"#]);
        let classifier = ActionClassifier::new(gateway(script));
        let s = story();
        let state = SessionState::at_start(&s);

        let outcome = classifier
            .classify(&s, &state, &memory(), "open the fridge")
            .await
            .unwrap();
        let target = outcome.target.unwrap();
        assert_eq!(target.target_id, "pantry");
        assert_eq!(target.index, 0);
    }

    #[tokio::test]
    async fn out_of_range_target_retries_with_notes_then_succeeds() {
        let script = Scripted::new(&[
            r#"{"result":"T7","reasoning":"confused"}"#,
            r#"{"result":"T0","reasoning":"fridge opened"}"#,
        ]);
        let classifier = ActionClassifier::new(gateway(script.clone()));
        let s = story();
        let state = SessionState::at_start(&s);

        let outcome = classifier
            .classify(&s, &state, &memory(), "open the fridge")
            .await
            .unwrap();
        assert!(outcome.target.is_some());

        let prompts = script.prompts.lock();
        assert_eq!(prompts.len(), 2);
        assert!(!prompts[0].contains("previous attempts"));
        assert!(prompts[1].contains("'T7' is not a listed transition"));
    }

    #[tokio::test]
    async fn exhausted_retries_fall_back_to_continue() {
        let script = Scripted::new(&[
            r#"{"result":"T9","reasoning":"no"}"#,
            r#"{"result":"T9","reasoning":"still no"}"#,
            r#"{"result":"T9","reasoning":"stubborn"}"#,
        ]);
        let classifier = ActionClassifier::new(gateway(script));
        let s = story();
        let state = SessionState::at_start(&s);

        let outcome = classifier
            .classify(&s, &state, &memory(), "open the fridge")
            .await
            .unwrap();
        assert!(outcome.target.is_none());
        assert!(outcome.confidence < 0.5);
    }

    #[tokio::test]
    async fn unparseable_output_retries_then_falls_back() {
        let script = Scripted::new(&["not json", "still not json", "nope"]);
        let classifier = ActionClassifier::new(gateway(script));
        let s = story();
        let state = SessionState::at_start(&s);

        let outcome = classifier
            .classify(&s, &state, &memory(), "open the fridge")
            .await
            .unwrap();
        assert!(outcome.target.is_none());
        assert!(outcome.confidence < 0.5);
    }

    #[tokio::test]
    async fn unconfigured_provider_degrades_to_continue() {
        let classifier = ActionClassifier::new(Arc::new(ModelGateway::new()));
        let s = story();
        let state = SessionState::at_start(&s);

        let outcome = classifier
            .classify(&s, &state, &memory(), "open the fridge")
            .await
            .unwrap();
        assert!(outcome.target.is_none());
        assert!(outcome.confidence < 0.5);
    }

    #[tokio::test]
    async fn provider_errors_propagate() {
        struct Failing;

        #[async_trait::async_trait]
        impl ProviderClient for Failing {
            async fn complete(
                &self,
                _req: &CompletionRequest,
                _cancel: CancellationToken,
            ) -> Result<Completion> {
                Err(Error::RateLimited("slow down".into()))
            }
            async fn complete_stream(
                &self,
                _req: &CompletionRequest,
                _cancel: CancellationToken,
            ) -> Result<BoxStream<'static, Result<StreamEvent>>> {
                Ok(Box::pin(futures_util::stream::empty()))
            }
            fn provider_id(&self) -> &str {
                "failing"
            }
        }

        let gw = Arc::new(ModelGateway::new());
        gw.configure_with_client(
            Arc::new(Failing),
            GatewayConfig {
                provider: ProviderKind::Anthropic,
                model: "mock".into(),
                api_key: "k".into(),
                cost_model: None,
            },
        );
        let classifier = ActionClassifier::new(gw);
        let s = story();
        let state = SessionState::at_start(&s);

        let err = classifier
            .classify(&s, &state, &memory(), "open the fridge")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "rate_limited");
    }

    #[tokio::test]
    async fn classifier_uses_cost_model() {
        struct ModelRecorder {
            models: Mutex<Vec<String>>,
        }

        #[async_trait::async_trait]
        impl ProviderClient for ModelRecorder {
            async fn complete(
                &self,
                req: &CompletionRequest,
                _cancel: CancellationToken,
            ) -> Result<Completion> {
                self.models.lock().push(req.model.clone());
                Ok(Completion {
                    content: r#"{"result":"continue","reasoning":"ok"}"#.into(),
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
                "recorder"
            }
        }

        let recorder = Arc::new(ModelRecorder {
            models: Mutex::new(Vec::new()),
        });
        let gw = Arc::new(ModelGateway::new());
        gw.configure_with_client(
            recorder.clone(),
            GatewayConfig {
                provider: ProviderKind::Anthropic,
                model: "expensive".into(),
                api_key: "k".into(),
                cost_model: Some("cheap".into()),
            },
        );
        let classifier = ActionClassifier::new(gw);
        let s = story();
        let state = SessionState::at_start(&s);

        classifier
            .classify(&s, &state, &memory(), "wait")
            .await
            .unwrap();
        assert_eq!(recorder.models.lock()[0], "cheap");
    }
}
