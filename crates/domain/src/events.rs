//! Engine-to-renderer event channel.
//!
//! The engine pushes tagged events into a single [`EventSink`]; any
//! renderer (CLI, web view, test harness) consumes them. This replaces
//! per-concern callback setters with one narrow surface.

use serde::Serialize;

/// Everything the engine tells the outside world.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    /// A player-facing narrative message (markup allowed).
    NarrativeEmitted { text: String },
    /// A system/status message (plain text).
    SystemEmitted { text: String },
    /// A model call has started; renderers may show a typing indicator.
    TypingStarted,
    /// The model call finished (success or failure).
    TypingEnded,
    /// An asynchronously generated ending narrative is ready.
    EndingGenerated { text: String },
    /// A turn-level error, already phrased for the player.
    Error { message: String },
}

/// Consumer of engine events. Implementations must be cheap and
/// non-blocking; the engine calls them inline on the turn path.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: EngineEvent);
}

/// Sink that drops everything. Used where no renderer is attached.
#[derive(Debug, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: EngineEvent) {}
}
