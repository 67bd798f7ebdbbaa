//! Significant-memory compaction.
//!
//! When the significant set outgrows its cap the cheap model is asked to
//! merge related memories into compact replacements. If that call fails
//! or returns nothing usable, a deterministic score-based prune keeps the
//! strongest memories instead. The set never stays over cap.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use tw_domain::wire::CompactionOutput;
use tw_providers::RequestOptions;

use crate::relevance::recency_score;
use crate::store::MemoryStore;
use crate::types::SignificantMemory;

const COMPACTION_TEMPERATURE: f32 = 0.3;

/// Run one compaction pass over the current significant set.
pub(crate) async fn run(store: &MemoryStore) {
    let memories = store.significant_snapshot();
    let cap = store.config().significant_cap;
    if memories.len() <= cap {
        return;
    }

    let prompt = build_prompt(&memories);
    let opts = RequestOptions {
        use_cost_model: true,
        temperature: Some(COMPACTION_TEMPERATURE),
        ..RequestOptions::default()
    };

    let compacted = match store
        .gateway()
        .structured_request::<CompactionOutput>(&prompt, &opts)
        .await
    {
        Ok(structured) => assemble(&memories, structured.data, Utc::now()),
        Err(e) => {
            tracing::warn!(error = %e, "compaction call failed, falling back to score pruning");
            None
        }
    };

    match compacted {
        Some(mut set) => {
            // The model may still leave the set over cap; pruning is the
            // backstop either way.
            if set.len() > cap {
                set = prune_by_score(set, cap, Utc::now());
            }
            store.replace_significant(set, true);
        }
        None => {
            let pruned = prune_by_score(memories, cap, Utc::now());
            store.replace_significant(pruned, false);
        }
    }
}

/// Assemble the post-compaction set from the model's grouping.
///
/// Unknown ids are ignored; memories referenced by neither a group nor
/// `keepIndividual` are dropped (the model judged them disposable).
/// Returns `None` when the output references nothing real, so the caller
/// then falls back to pruning.
fn assemble(
    memories: &[SignificantMemory],
    output: CompactionOutput,
    now: DateTime<Utc>,
) -> Option<Vec<SignificantMemory>> {
    let by_id: BTreeMap<&str, &SignificantMemory> =
        memories.iter().map(|m| (m.id.as_str(), m)).collect();

    let mut result: Vec<SignificantMemory> = Vec::new();
    let mut referenced = 0usize;

    for group in output.compaction_groups {
        let members: Vec<&SignificantMemory> = group
            .memory_ids
            .iter()
            .filter_map(|id| by_id.get(id.as_str()).copied())
            .collect();
        if members.is_empty() {
            continue;
        }
        referenced += members.len();

        let mut merged = SignificantMemory::from_extracted(group.compacted_memory, now);
        // A merge inherits the strongest provenance of its members.
        merged.importance = members
            .iter()
            .map(|m| m.importance)
            .fold(merged.importance, f32::max);
        merged.last_accessed = members
            .iter()
            .map(|m| m.last_accessed)
            .max()
            .unwrap_or(now);
        result.push(merged);
    }

    for id in &output.keep_individual {
        if let Some(memory) = by_id.get(id.as_str()) {
            referenced += 1;
            result.push((*memory).clone());
        }
    }

    if referenced == 0 {
        return None;
    }
    Some(result)
}

/// Deterministic fallback: keep the top `cap` by composite score.
fn prune_by_score(
    mut memories: Vec<SignificantMemory>,
    cap: usize,
    now: DateTime<Utc>,
) -> Vec<SignificantMemory> {
    memories.sort_by(|a, b| {
        let score_a = f64::from(a.importance) * 1.5 + recency_score(a.last_accessed, now) * 2.5;
        let score_b = f64::from(b.importance) * 1.5 + recency_score(b.last_accessed, now) * 2.5;
        score_b
            .partial_cmp(&score_a)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    memories.truncate(cap);
    memories
}

/// The compaction prompt: the numbered memory roster plus the contract.
fn build_prompt(memories: &[SignificantMemory]) -> String {
    let mut prompt = String::from(
        "The memory set below has grown too large. Merge redundant or related \
         memories into compact replacements and name the memories worth keeping \
         as-is.\n\
         Rules:\n\
         - Merge only memories that genuinely describe the same thread.\n\
         - A compacted memory must preserve every load-bearing fact of its group.\n\
         - Memories you list nowhere will be forgotten.\n\n\
         Memories:\n",
    );

    for memory in memories {
        prompt.push_str(&format!(
            "- id: {} | kind: {} | importance: {:.1} | {}\n",
            memory.id,
            memory.kind.label(),
            memory.importance,
            memory.summary
        ));
    }

    prompt.push_str(
        "\nRespond with JSON only, in exactly this shape:\n\
         {\"compactionGroups\": [{\"memoryIds\": [\"...\"], \"compactedMemory\": \
         {\"kind\": \"...\", \"summary\": \"...\", \"importance\": 1-10, \
         \"participants\": [], \"relatedItems\": [], \"relatedLocations\": [], \
         \"contextTriggers\": []}}], \"keepIndividual\": [\"...\"]}\n",
    );

    prompt
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
