//! The memory store: recent ring + significant set + extraction trigger.
//!
//! All mutation happens under one mutex; `add` finishes its ring append
//! and trigger-touch pass synchronously before any async work is
//! scheduled. Extraction is fire-and-forget and single-flight: a second
//! trigger while one is processing is skipped, not queued.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;

use tw_domain::error::Result;
use tw_domain::state::SessionState;
use tw_domain::trace::TraceEvent;
use tw_providers::ModelGateway;

use crate::extraction;
use crate::relevance;
use crate::types::{Importance, Interaction, MemorySnapshot, SignificantMemory};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Configuration & views
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Capacity knobs. Defaults match the documented engine behavior.
#[derive(Debug, Clone, Copy)]
pub struct MemoryConfig {
    /// Recent-interaction ring capacity (R).
    pub recent_cap: usize,
    /// Significant-memory cap (S); exceeding it triggers compaction.
    pub significant_cap: usize,
    /// Interactions between extraction runs.
    pub extraction_interval: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            recent_cap: 15,
            significant_cap: 50,
            extraction_interval: 5,
        }
    }
}

/// Counters exposed alongside prompt-ready strings.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct MemoryStats {
    pub recent: usize,
    pub significant: usize,
    pub since_extraction: usize,
    pub processing: bool,
}

/// Prompt-ready view of memory for one turn.
#[derive(Debug, Clone)]
pub struct MemoryContext {
    /// Recent interactions, oldest first, formatted for the prompt.
    pub recent_formatted: String,
    /// Relevance-ranked significant memories, formatted for the prompt.
    pub significant_formatted: String,
    pub stats: MemoryStats,
}

pub(crate) struct MemoryState {
    pub(crate) recent: VecDeque<Interaction>,
    pub(crate) significant: Vec<SignificantMemory>,
    pub(crate) since_extraction: usize,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// MemoryStore
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Bounded memory of prior interactions plus significant-memory lifecycle.
pub struct MemoryStore {
    config: MemoryConfig,
    gateway: Arc<ModelGateway>,
    inner: Mutex<MemoryState>,
    processing: AtomicBool,
}

impl MemoryStore {
    pub fn new(gateway: Arc<ModelGateway>, config: MemoryConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            gateway,
            inner: Mutex::new(MemoryState {
                recent: VecDeque::new(),
                significant: Vec::new(),
                since_extraction: 0,
            }),
            processing: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> MemoryConfig {
        self.config
    }

    /// Record one interaction. Synchronous with respect to the ring; the
    /// extraction task (if triggered) is spawned, never awaited.
    ///
    /// `director_importance` is the director's 1..10 advisory score; the
    /// stored importance is the max of it and the keyword heuristic.
    pub fn add(
        self: &Arc<Self>,
        player_input: &str,
        director_response: &str,
        _state: &SessionState,
        director_importance: Option<u8>,
    ) {
        let now = Utc::now();
        let combined = format!("{player_input}\n{director_response}");
        let heuristic = Importance::from_text(&combined);
        let importance = match director_importance {
            Some(score) => heuristic.max(Importance::from_score(score)),
            None => heuristic,
        };

        let should_extract = {
            let mut inner = self.inner.lock();

            inner.recent.push_back(Interaction {
                player_input: player_input.to_owned(),
                director_response: director_response.to_owned(),
                timestamp: now,
                importance,
            });
            while inner.recent.len() > self.config.recent_cap {
                inner.recent.pop_front();
            }

            // Touch pass: significant memories referenced by this
            // interaction become fresher and slightly more important.
            for memory in &mut inner.significant {
                if memory.triggered_by(&combined) {
                    memory.touch(now);
                }
            }

            inner.since_extraction += 1;
            inner.since_extraction >= self.config.extraction_interval
        };

        if should_extract && self.gateway.is_configured() {
            self.trigger_extraction();
        }
    }

    /// Spawn the extraction task unless one is already in flight.
    fn trigger_extraction(self: &Arc<Self>) {
        if self.processing.swap(true, Ordering::AcqRel) {
            tracing::debug!("memory extraction already in flight, skipping trigger");
            return;
        }
        self.inner.lock().since_extraction = 0;

        let store = Arc::clone(self);
        tokio::spawn(async move {
            extraction::run(&store).await;
            store.processing.store(false, Ordering::Release);
        });
    }

    /// Prompt-ready memory view for the current turn.
    pub fn get(&self, current_input: Option<&str>, state: Option<&SessionState>) -> MemoryContext {
        let now = Utc::now();
        let inner = self.inner.lock();

        let recent_formatted = inner
            .recent
            .iter()
            .map(|i| format!("Player: {}\nStory: {}", i.player_input, i.director_response))
            .collect::<Vec<_>>()
            .join("\n\n");

        let selected =
            relevance::select_relevant(&inner.significant, current_input, state, now);
        let significant_formatted = selected
            .iter()
            .map(|m| {
                format!(
                    "- [{}] {} (importance {:.1})",
                    m.kind.label(),
                    m.summary,
                    m.importance
                )
            })
            .collect::<Vec<_>>()
            .join("\n");

        MemoryContext {
            recent_formatted,
            significant_formatted,
            stats: MemoryStats {
                recent: inner.recent.len(),
                significant: inner.significant.len(),
                since_extraction: inner.since_extraction,
                processing: self.processing.load(Ordering::Acquire),
            },
        }
    }

    /// The recent ring, oldest first.
    pub fn recent(&self) -> Vec<Interaction> {
        self.inner.lock().recent.iter().cloned().collect()
    }

    /// Current statistics snapshot.
    pub fn stats(&self) -> MemoryStats {
        let inner = self.inner.lock();
        MemoryStats {
            recent: inner.recent.len(),
            significant: inner.significant.len(),
            since_extraction: inner.since_extraction,
            processing: self.processing.load(Ordering::Acquire),
        }
    }

    /// Drop everything (story reload).
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.recent.clear();
        inner.significant.clear();
        inner.since_extraction = 0;
    }

    /// Serializable snapshot for save files.
    pub fn export(&self) -> MemorySnapshot {
        let inner = self.inner.lock();
        MemorySnapshot {
            recent: inner.recent.iter().cloned().collect(),
            significant: inner.significant.clone(),
            since_extraction: inner.since_extraction,
        }
    }

    /// Restore from a snapshot, trimming to the configured caps.
    pub fn import(&self, snapshot: MemorySnapshot) -> Result<()> {
        let mut inner = self.inner.lock();
        let mut recent: VecDeque<Interaction> = snapshot.recent.into();
        while recent.len() > self.config.recent_cap {
            recent.pop_front();
        }
        let mut significant = snapshot.significant;
        if significant.len() > self.config.significant_cap {
            significant.truncate(self.config.significant_cap);
        }
        inner.recent = recent;
        inner.significant = significant;
        inner.since_extraction = snapshot.since_extraction;
        Ok(())
    }

    // ── Extraction support (crate-internal) ────────────────────────

    pub(crate) fn gateway(&self) -> &Arc<ModelGateway> {
        &self.gateway
    }

    /// Snapshot of the newest `batch` interactions for extraction.
    pub(crate) fn extraction_batch(&self) -> Vec<Interaction> {
        let inner = self.inner.lock();
        let batch = self.config.extraction_interval.min(inner.recent.len());
        inner
            .recent
            .iter()
            .skip(inner.recent.len() - batch)
            .cloned()
            .collect()
    }

    /// Install freshly extracted memories; returns the new significant count.
    pub(crate) fn absorb_extracted(&self, memories: Vec<SignificantMemory>) -> usize {
        let mut inner = self.inner.lock();
        inner.significant.extend(memories);
        inner.significant.len()
    }

    pub(crate) fn significant_snapshot(&self) -> Vec<SignificantMemory> {
        self.inner.lock().significant.clone()
    }

    /// Replace the significant set after compaction or pruning.
    pub(crate) fn replace_significant(&self, memories: Vec<SignificantMemory>, llm_assisted: bool) {
        let mut inner = self.inner.lock();
        TraceEvent::MemoryCompaction {
            before: inner.significant.len(),
            after: memories.len(),
            llm_assisted,
        }
        .emit();
        inner.significant = memories;
    }

    pub(crate) fn over_significant_cap(&self) -> bool {
        self.inner.lock().significant.len() > self.config.significant_cap
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
