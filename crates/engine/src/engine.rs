//! The turn loop: classify, direct, validate, apply, remember, emit.
//!
//! A turn is a linearizable unit guarded by `is_processing`; the engine
//! refuses concurrent input instead of queueing it. Errors never cross
//! the turn boundary: every path collapses into a [`GameResponse`], and
//! failed turns leave the session state untouched (signals are applied
//! only after every model call has succeeded).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use tw_domain::error::Result;
use tw_domain::events::{EngineEvent, EventSink};
use tw_domain::state::SessionState;
use tw_domain::story::{FlagValue, Story};
use tw_domain::trace::TraceEvent;
use tw_domain::wire::{DirectorResponse, Signals};
use tw_memory::{Interaction, MemoryStore};
use tw_providers::ModelGateway;

use crate::classifier::ActionClassifier;
use crate::director::{Director, DirectorContext};
use crate::prompt::{TransitionMode, TransitionOption};
use crate::save::SaveData;
use crate::validate::Validator;

/// What the player sees after a turn.
#[derive(Debug, Clone)]
pub struct GameResponse {
    pub text: String,
    /// Error kind label when the turn degraded or failed.
    pub error: Option<String>,
}

impl GameResponse {
    fn ok(text: String) -> Self {
        Self { text, error: None }
    }
}

/// Result of applying signals: which ending was entered, if any, and
/// whether it has authored prose.
struct ApplyReport {
    entered_ending: Option<(String, bool)>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Engine
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Orchestrates turns over one loaded story.
pub struct Engine {
    story: Arc<Story>,
    state: Mutex<SessionState>,
    memory: Arc<MemoryStore>,
    classifier: ActionClassifier,
    director: Director,
    gateway: Arc<ModelGateway>,
    validator: Validator,
    sink: Arc<dyn EventSink>,
    is_processing: AtomicBool,
    /// Set when the owning session is disposed; late async completions
    /// (ending generation) check it before emitting.
    retired: AtomicBool,
}

impl Engine {
    pub fn new(
        story: Arc<Story>,
        gateway: Arc<ModelGateway>,
        memory: Arc<MemoryStore>,
        sink: Arc<dyn EventSink>,
    ) -> Arc<Self> {
        let state = SessionState::at_start(&story);
        Arc::new(Self {
            story,
            state: Mutex::new(state),
            memory,
            classifier: ActionClassifier::new(gateway.clone()),
            director: Director::new(gateway.clone()),
            gateway,
            validator: Validator::new(),
            sink,
            is_processing: AtomicBool::new(false),
            retired: AtomicBool::new(false),
        })
    }

    pub fn story(&self) -> &Arc<Story> {
        &self.story
    }

    pub fn state_snapshot(&self) -> SessionState {
        self.state.lock().clone()
    }

    pub fn memory(&self) -> &Arc<MemoryStore> {
        &self.memory
    }

    /// Mark the engine dead for late async completions and abort
    /// anything still in flight.
    pub fn retire(&self) {
        self.retired.store(true, Ordering::Release);
        self.gateway.cancel_all();
    }

    // ── Turn entry ─────────────────────────────────────────────────

    /// Run one player turn. Never returns an error: failures collapse
    /// into the response and leave state untouched.
    pub async fn process_input(self: &Arc<Self>, input: &str) -> GameResponse {
        if self.is_processing.swap(true, Ordering::AcqRel) {
            return GameResponse {
                text: "The story is still resolving your last action.".into(),
                error: Some("busy".into()),
            };
        }

        self.sink.emit(EngineEvent::TypingStarted);
        let result = self.run_turn(input).await;
        self.sink.emit(EngineEvent::TypingEnded);
        self.is_processing.store(false, Ordering::Release);

        match result {
            Ok(response) => response,
            Err(e) => {
                let text = e.player_message();
                if !matches!(e, tw_domain::Error::Cancelled) {
                    self.sink.emit(EngineEvent::Error {
                        message: text.clone(),
                    });
                }
                GameResponse {
                    text,
                    error: Some(e.kind().to_owned()),
                }
            }
        }
    }

    async fn run_turn(self: &Arc<Self>, input: &str) -> Result<GameResponse> {
        let state = self.state_snapshot();
        let memory_ctx = self.memory.get(Some(input), Some(&state));

        // Post-ending turns are reflective: narrative only, no state.
        if state.is_ended {
            let response = self
                .director
                .direct(&DirectorContext {
                    story: &self.story,
                    state: &state,
                    memory: &memory_ctx,
                    preselected: None,
                    retry_feedback: None,
                    reflective: true,
                    player_input: input,
                })
                .await?;
            self.memory
                .add(input, &response.narrative, &state, Some(response.importance));
            self.sink.emit(EngineEvent::NarrativeEmitted {
                text: response.narrative.clone(),
            });
            return Ok(GameResponse::ok(response.narrative));
        }

        // Classify against the scene + ending transition menu.
        let outcome = self
            .classifier
            .classify(&self.story, &state, &memory_ctx, input)
            .await?;
        let preselected = outcome.target;

        // Direct, validate, retry once on validation failure.
        let (response, signals, degraded) = self
            .direct_validated(&state, &memory_ctx, preselected.as_ref(), input)
            .await?;

        // Apply the (validated) signals in deterministic order.
        let report = self.apply_signals(&signals, preselected.as_ref());

        let post_state = self.state_snapshot();
        self.memory
            .add(input, &response.narrative, &post_state, Some(response.importance));

        // Endings without authored prose get an async conclusion.
        if let Some((ending_id, has_sketch)) = report.entered_ending {
            if !has_sketch {
                self.spawn_conclusion(ending_id);
            }
        }

        self.sink.emit(EngineEvent::NarrativeEmitted {
            text: response.narrative.clone(),
        });
        Ok(GameResponse {
            text: response.narrative,
            error: degraded.then(|| "validation".to_owned()),
        })
    }

    /// Director call plus validation discipline: at most one
    /// validator-feedback retry; a second failure applies only the
    /// validated subset. Returns `(response, signals_to_apply, degraded)`.
    async fn direct_validated(
        &self,
        state: &SessionState,
        memory_ctx: &tw_memory::MemoryContext,
        preselected: Option<&TransitionOption>,
        input: &str,
    ) -> Result<(DirectorResponse, Signals, bool)> {
        let recent_inputs = self.recent_inputs_with(input);

        let response = self
            .director
            .direct(&DirectorContext {
                story: &self.story,
                state,
                memory: memory_ctx,
                preselected,
                retry_feedback: None,
                reflective: false,
                player_input: input,
            })
            .await?;

        let signals = response.signals.clone().unwrap_or_default();
        let issues = self.validator.validate(
            &self.story,
            state,
            input,
            &recent_inputs,
            &response.narrative,
            &signals,
        );
        if issues.is_empty() {
            return Ok((response, signals, false));
        }

        let feedback = issues
            .iter()
            .map(|i| format!("- {}", i.message))
            .collect::<Vec<_>>()
            .join("\n");
        tracing::debug!(%feedback, "director response rejected, retrying with feedback");

        let mut retry = self
            .director
            .direct(&DirectorContext {
                story: &self.story,
                state,
                memory: memory_ctx,
                preselected,
                retry_feedback: Some(&feedback),
                reflective: false,
                player_input: input,
            })
            .await?;

        let retry_signals = retry.signals.clone().unwrap_or_default();
        let retry_issues = self.validator.validate(
            &self.story,
            state,
            input,
            &recent_inputs,
            &retry.narrative,
            &retry_signals,
        );
        if retry_issues.is_empty() {
            return Ok((retry, retry_signals, false));
        }

        tracing::warn!(
            issues = retry_issues.len(),
            "retry still invalid, applying validated subset"
        );
        let subset = self.validator.validated_subset(
            &self.story,
            state,
            input,
            &recent_inputs,
            &retry_signals,
        );
        if retry.narrative.trim().is_empty() {
            retry.narrative = retry_issues
                .first()
                .map(|i| i.message.clone())
                .unwrap_or_else(|| "That doesn't work here.".into());
        }
        Ok((retry, subset, true))
    }

    // ── Signal application ─────────────────────────────────────────

    /// Apply validated signals in the documented order: removals, then
    /// additions/discoveries, then flag unsets, then sets, then the scene
    /// transition, then the ending. The preselected transition outranks a
    /// conflicting scene/ending signal.
    fn apply_signals(
        &self,
        signals: &Signals,
        preselected: Option<&TransitionOption>,
    ) -> ApplyReport {
        let mut state = self.state.lock();

        for item in &signals.remove {
            state.remove_item(item);
        }
        for item in &signals.add {
            state.add_item(item);
        }
        if let Some(item) = &signals.discover {
            state.add_item(item);
        }
        for name in &signals.unset_flags {
            state.unset_flag(name);
        }
        for name in &signals.set_flags {
            state.set_flag(name, FlagValue::Bool(true));
        }

        let scene_target = match preselected {
            Some(t) if t.mode == TransitionMode::Scene => Some(t.target_id.clone()),
            _ => signals.scene.clone(),
        };
        let mut scene_change = false;
        if let Some(target) = scene_target {
            if self.story.scene(&target).is_some() {
                state.enter_scene(&self.story, &target);
                scene_change = true;
            }
        }

        let ending = match preselected {
            Some(t) if t.mode == TransitionMode::Ending => {
                Some((t.target_id.clone(), t.sketch.is_some()))
            }
            _ => signals.ending.as_ref().map(|id| {
                let has_sketch = self
                    .story
                    .ending(id)
                    .map(|v| v.sketch.is_some())
                    .unwrap_or(false);
                (id.clone(), has_sketch)
            }),
        };
        let entered_ending = match ending {
            Some((id, has_sketch)) if !state.is_ended => {
                state.end(&id);
                Some((id, has_sketch))
            }
            _ => None,
        };

        TraceEvent::SignalsApplied {
            added: signals.add.len() + usize::from(signals.discover.is_some()),
            removed: signals.remove.len(),
            flags_set: signals.set_flags.len(),
            flags_unset: signals.unset_flags.len(),
            scene_change,
            ended: entered_ending.is_some(),
        }
        .emit();

        ApplyReport { entered_ending }
    }

    // ── Async ending conclusion ────────────────────────────────────

    /// Emit a placeholder immediately and generate the conclusion on a
    /// spawned task. A completion arriving after the session is retired
    /// is discarded.
    fn spawn_conclusion(self: &Arc<Self>, ending_id: String) {
        self.sink.emit(EngineEvent::SystemEmitted {
            text: "Generating conclusion...".into(),
        });
        TraceEvent::EndingGenerationStarted {
            ending_id: ending_id.clone(),
        }
        .emit();

        let engine = Arc::clone(self);
        tokio::spawn(async move {
            if engine.retired.load(Ordering::Acquire) {
                return;
            }
            let state = engine.state_snapshot();
            match engine
                .director
                .generate_conclusion(&engine.story, &state, &ending_id)
                .await
            {
                Ok(text) => {
                    if engine.retired.load(Ordering::Acquire) {
                        tracing::debug!("discarding conclusion for retired session");
                        return;
                    }
                    engine.sink.emit(EngineEvent::EndingGenerated { text });
                }
                Err(e) => {
                    tracing::warn!(error = %e, "ending conclusion generation failed");
                }
            }
        });
    }

    // ── Save / load ────────────────────────────────────────────────

    /// Capture the full session into a save record.
    pub fn save(&self) -> SaveData {
        let state = self.state.lock();
        let memory = self.memory.export();
        TraceEvent::SaveWritten {
            story_id: self.story.id.clone(),
            recent: memory.recent.len(),
            significant: memory.significant.len(),
        }
        .emit();
        SaveData::capture(&self.story, &state, memory)
    }

    /// Restore a save: validates it against the loaded story, aborts
    /// in-flight requests, restores state and memory, and returns the
    /// recent interactions so the caller can rebuild its transcript.
    pub fn load(&self, save: SaveData) -> Result<Vec<Interaction>> {
        let (state, memory) = save.restore_for(&self.story)?;

        self.gateway.cancel_all();
        self.memory.import(memory)?;
        let scene = state.current_scene_id.clone();
        *self.state.lock() = state;

        TraceEvent::SaveLoaded {
            story_id: self.story.id.clone(),
            scene,
        }
        .emit();
        self.sink.emit(EngineEvent::SystemEmitted {
            text: "Save loaded.".into(),
        });
        Ok(self.memory.recent())
    }

    // ── Helpers ────────────────────────────────────────────────────

    /// Player inputs from the recent ring plus the current one, oldest
    /// first. Backs the discovery-object examination check.
    fn recent_inputs_with(&self, current: &str) -> Vec<String> {
        let mut inputs: Vec<String> = self
            .memory
            .recent()
            .into_iter()
            .map(|i| i.player_input)
            .collect();
        inputs.push(current.to_owned());
        inputs
    }
}
