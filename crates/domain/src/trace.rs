use serde::Serialize;

/// Structured trace events emitted across all taleweave crates.
///
/// Emitted as JSON inside a tracing field so log pipelines can filter on
/// `tw_event` without parsing free text.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    ClassifierDecision {
        result: String,
        attempts: u32,
        confidence: f32,
    },
    DirectorCall {
        scene: String,
        preselected: Option<String>,
        retry: bool,
        duration_ms: u64,
    },
    SignalsApplied {
        added: usize,
        removed: usize,
        flags_set: usize,
        flags_unset: usize,
        scene_change: bool,
        ended: bool,
    },
    MemoryExtraction {
        batch: usize,
        extracted: usize,
    },
    MemoryCompaction {
        before: usize,
        after: usize,
        llm_assisted: bool,
    },
    SaveWritten {
        story_id: String,
        recent: usize,
        significant: usize,
    },
    SaveLoaded {
        story_id: String,
        scene: String,
    },
    EndingGenerationStarted {
        ending_id: String,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(tw_event = %json, "tw_event");
    }
}
