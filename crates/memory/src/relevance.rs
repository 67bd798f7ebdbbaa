//! Relevance ranking for significant memories.
//!
//! With turn context the score rewards trigger hits, location overlap,
//! and item overlap; without context it degrades to importance plus
//! recency so retrieval still works on the first turn after a load.

use chrono::{DateTime, Utc};

use tw_domain::state::SessionState;

use crate::types::SignificantMemory;

/// Maximum number of memories handed to a prompt.
pub const MAX_SELECTED: usize = 10;

/// Minimum score for a memory to be included at all.
pub const INCLUDE_THRESHOLD: f64 = 2.0;

/// Recency component: starts at 2.0 and decays 0.1 per day since last
/// access, floored at zero.
pub fn recency_score(last_accessed: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let days = (now - last_accessed).num_seconds().max(0) as f64 / 86_400.0;
    (2.0 - 0.1 * days).max(0.0)
}

/// Score one memory against the current turn.
pub fn relevance_score(
    memory: &SignificantMemory,
    current_input: Option<&str>,
    state: Option<&SessionState>,
    now: DateTime<Utc>,
) -> f64 {
    let recency = recency_score(memory.last_accessed, now);

    // No turn context: importance + recency only.
    if current_input.is_none() && state.is_none() {
        return f64::from(memory.importance) + recency;
    }

    let mut score = 0.0;

    if let Some(input) = current_input {
        let lowered = input.to_lowercase();
        for trigger in &memory.context_triggers {
            if !trigger.is_empty() && lowered.contains(&trigger.to_lowercase()) {
                score += 3.0;
            }
        }
    }

    if let Some(state) = state {
        if memory
            .related_locations
            .iter()
            .any(|loc| *loc == state.current_scene_id)
        {
            score += 2.0;
        }

        let input_lowered = current_input.map(str::to_lowercase).unwrap_or_default();
        let item_overlap = memory.related_items.iter().any(|item| {
            state.has_item(item) || (!item.is_empty() && input_lowered.contains(&item.to_lowercase()))
        });
        if item_overlap {
            score += 1.5;
        }
    }

    score + recency + 0.5 * f64::from(memory.importance)
}

/// Rank and filter: descending score, threshold applied, capped.
pub fn select_relevant<'a>(
    memories: &'a [SignificantMemory],
    current_input: Option<&str>,
    state: Option<&SessionState>,
    now: DateTime<Utc>,
) -> Vec<&'a SignificantMemory> {
    let mut scored: Vec<(f64, &SignificantMemory)> = memories
        .iter()
        .map(|m| (relevance_score(m, current_input, state, now), m))
        .filter(|(score, _)| *score > INCLUDE_THRESHOLD)
        .collect();

    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    scored.into_iter().take(MAX_SELECTED).map(|(_, m)| m).collect()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use tw_domain::story::Story;
    use tw_domain::wire::MemoryKind;

    fn memory(id: &str, importance: f32) -> SignificantMemory {
        SignificantMemory {
            id: id.into(),
            kind: MemoryKind::Discovery,
            summary: format!("memory {id}"),
            importance,
            last_accessed: Utc::now(),
            participants: vec![],
            related_items: vec![],
            related_locations: vec![],
            context_triggers: vec![],
        }
    }

    fn state() -> SessionState {
        let story = Story::from_yaml_str(
            "id: s\ntitle: S\nscenes:\n  study:\n    sketch: \"A study.\"\n",
        )
        .unwrap();
        SessionState::at_start(&story)
    }

    #[test]
    fn recency_decays_tenth_per_day() {
        let now = Utc::now();
        assert!((recency_score(now, now) - 2.0).abs() < 1e-9);
        let five_days = now - chrono::Duration::days(5);
        assert!((recency_score(five_days, now) - 1.5).abs() < 1e-3);
        let month = now - chrono::Duration::days(40);
        assert_eq!(recency_score(month, now), 0.0);
    }

    #[test]
    fn no_context_uses_importance_plus_recency() {
        let mem = memory("a", 6.0);
        let now = Utc::now();
        let score = relevance_score(&mem, None, None, now);
        assert!((score - 8.0).abs() < 1e-6, "got {score}");
    }

    #[test]
    fn trigger_hits_add_three_each() {
        let mut mem = memory("a", 2.0);
        mem.context_triggers = vec!["key".into(), "desk".into()];
        let now = Utc::now();
        let st = state();

        let score = relevance_score(&mem, Some("I check the desk for the key"), Some(&st), now);
        // 3 + 3 (triggers) + 2 (recency) + 1 (0.5 * importance)
        assert!((score - 9.0).abs() < 1e-6, "got {score}");
    }

    #[test]
    fn location_match_adds_two() {
        let mut mem = memory("a", 2.0);
        mem.related_locations = vec!["study".into()];
        let now = Utc::now();
        let st = state();

        let score = relevance_score(&mem, Some("wait quietly"), Some(&st), now);
        // 2 (location) + 2 (recency) + 1 (importance)
        assert!((score - 5.0).abs() < 1e-6, "got {score}");
    }

    #[test]
    fn item_in_inventory_or_input_adds_one_and_a_half() {
        let mut mem = memory("a", 2.0);
        mem.related_items = vec!["brass_key".into()];
        let now = Utc::now();
        let mut st = state();

        // Mentioned in the input.
        let score = relevance_score(&mem, Some("use the brass_key"), Some(&st), now);
        assert!((score - 4.5).abs() < 1e-6, "got {score}");

        // Held in inventory, not mentioned.
        st.add_item("brass_key");
        let score = relevance_score(&mem, Some("look around"), Some(&st), now);
        assert!((score - 4.5).abs() < 1e-6, "got {score}");
    }

    #[test]
    fn selection_applies_threshold_and_cap() {
        let now = Utc::now();
        let st = state();
        let mut memories = Vec::new();

        // Twelve strong memories (trigger hit) and one weak one.
        for i in 0..12 {
            let mut m = memory(&format!("strong{i}"), 4.0);
            m.context_triggers = vec!["lantern".into()];
            memories.push(m);
        }
        let mut weak = memory("weak", 1.0);
        // Old enough that recency + importance stays under the threshold.
        weak.last_accessed = now - chrono::Duration::days(30);
        memories.push(weak);

        let selected = select_relevant(&memories, Some("light the lantern"), Some(&st), now);
        assert_eq!(selected.len(), MAX_SELECTED);
        assert!(selected.iter().all(|m| m.id.starts_with("strong")));
    }

    #[test]
    fn selection_orders_by_score_descending() {
        let now = Utc::now();
        let st = state();

        let mut high = memory("high", 8.0);
        high.context_triggers = vec!["door".into()];
        let low = memory("low", 8.0);

        let candidates = [low.clone(), high.clone()];
        let selected = select_relevant(
            &candidates,
            Some("open the door"),
            Some(&st),
            now,
        );
        assert_eq!(selected[0].id, "high");
        assert_eq!(selected[1].id, "low");
    }
}
