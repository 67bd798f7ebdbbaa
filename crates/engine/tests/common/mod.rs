//! Shared test fixtures: a scripted provider, a collecting event sink,
//! and small stories exercising transitions, discovery gating, and
//! endings.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use tw_domain::config::{GatewayConfig, ProviderKind};
use tw_domain::error::{Error, Result};
use tw_domain::events::{EngineEvent, EventSink};
use tw_domain::story::Story;
use tw_engine::Session;
use tw_memory::MemoryConfig;
use tw_providers::{
    BoxStream, Completion, CompletionRequest, ModelGateway, ProviderClient, StreamEvent,
};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scripted provider
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Pops canned responses in order and records every prompt it saw.
/// A `BLOCK` entry parks the call until it is cancelled.
pub struct ScriptedClient {
    responses: Mutex<VecDeque<String>>,
    pub prompts: Mutex<Vec<String>>,
}

pub const BLOCK: &str = "<<block-until-cancelled>>";

impl ScriptedClient {
    pub fn new(responses: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.iter().map(|s| s.to_string()).collect()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn push(&self, response: &str) {
        self.responses.lock().push_back(response.to_owned());
    }

    pub fn remaining(&self) -> usize {
        self.responses.lock().len()
    }
}

#[async_trait::async_trait]
impl ProviderClient for ScriptedClient {
    async fn complete(
        &self,
        req: &CompletionRequest,
        cancel: CancellationToken,
    ) -> Result<Completion> {
        self.prompts.lock().push(req.prompt.clone());
        let content = self
            .responses
            .lock()
            .pop_front()
            .ok_or_else(|| Error::Other("script exhausted".into()))?;
        if content == BLOCK {
            cancel.cancelled().await;
            return Err(Error::Cancelled);
        }
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

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Collecting sink
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Default)]
pub struct CollectSink {
    pub events: Mutex<Vec<EngineEvent>>,
}

impl CollectSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn narratives(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                EngineEvent::NarrativeEmitted { text } => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, pred: impl Fn(&EngineEvent) -> bool) -> usize {
        self.events.lock().iter().filter(|e| pred(e)).count()
    }
}

impl EventSink for CollectSink {
    fn emit(&self, event: EngineEvent) {
        self.events.lock().push(event);
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Stories
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One scene with one scene-transition: the continue/transition baseline.
pub fn kitchen_story() -> Story {
    Story::from_yaml_str(
        r#"
id: kitchen-story
title: The Kitchen
scenes:
  kitchen:
    sketch: "A cramped kitchen. The fridge hums in the corner."
    transitions:
      - condition: "player opens the fridge"
        target: fridge_interior
        sketch: "Cold blue light washes over the tiles."
  fridge_interior:
    sketch: "Shelves of forgotten leftovers."
"#,
    )
    .unwrap()
}

/// Discovery gating: a key visible only after examining the desk.
pub fn study_story() -> Story {
    Story::from_yaml_str(
        r#"
id: study-story
title: The Study
scenes:
  study:
    sketch: "A book-lined study with a heavy desk."
items:
  - id: brass_key
    name: brass key
    discoverable_in: study
    discovery_objects: [desk]
"#,
    )
    .unwrap()
}

/// One ending variation with no authored sketch.
pub fn lighthouse_story() -> Story {
    Story::from_yaml_str(
        r#"
id: lighthouse-story
title: The Last Light
scenes:
  gallery:
    sketch: "The lamp room at the top of the tower."
endings:
  global_conditions: ["the lamp is lit"]
  variations:
    - id: beacon
      conditions: ["the ship turns toward the harbor"]
"#,
    )
    .unwrap()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Wiring
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub fn scripted_session(
    story: Story,
    responses: &[&str],
) -> (Arc<Session>, Arc<ScriptedClient>, Arc<CollectSink>) {
    let client = ScriptedClient::new(responses);
    let gateway = Arc::new(ModelGateway::new());
    gateway.configure_with_client(
        client.clone(),
        GatewayConfig {
            provider: ProviderKind::Anthropic,
            model: "mock-director".into(),
            api_key: "k".into(),
            cost_model: Some("mock-cheap".into()),
        },
    );

    let sink = CollectSink::new();
    let session = Session::with_gateway(story, gateway, sink.clone(), MemoryConfig::default());
    (session, client, sink)
}

// Canned model outputs.

pub fn classifier_continue() -> String {
    r#"{"result":"continue","reasoning":"no prerequisite satisfied"}"#.to_owned()
}

pub fn classifier_transition(index: usize) -> String {
    format!(r#"{{"result":"T{index}","reasoning":"prerequisites satisfied"}}"#)
}

pub fn director_narrative(text: &str) -> String {
    serde_json::json!({ "narrative": text, "importance": 4 }).to_string()
}

pub fn director_with_signals(text: &str, signals: serde_json::Value) -> String {
    serde_json::json!({ "narrative": text, "importance": 5, "signals": signals }).to_string()
}
