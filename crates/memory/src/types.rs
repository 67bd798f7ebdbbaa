//! Memory records: recent interactions and significant memories.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tw_domain::wire::{ExtractedMemory, MemoryKind};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Importance
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Advisory importance of a single interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Importance {
    Low,
    Medium,
    High,
}

/// Keywords whose presence marks an interaction as high importance.
const HIGH_KEYWORDS: &[&str] = &[
    "promise", "secret", "love", "death", "die", "kill", "betray", "reveal", "truth", "vow",
    "swear", "never forget",
];

/// Keywords whose presence marks an interaction as medium importance.
const MEDIUM_KEYWORDS: &[&str] = &[
    "friend", "trust", "gift", "remember", "important", "discover", "found", "learned", "name",
];

impl Importance {
    /// Keyword heuristic over the combined interaction text. Advisory,
    /// not authoritative.
    pub fn from_text(text: &str) -> Self {
        let lowered = text.to_lowercase();
        if HIGH_KEYWORDS.iter().any(|k| lowered.contains(k)) {
            Importance::High
        } else if MEDIUM_KEYWORDS.iter().any(|k| lowered.contains(k)) {
            Importance::Medium
        } else {
            Importance::Low
        }
    }

    /// Bucket a director-reported 1..10 score.
    pub fn from_score(score: u8) -> Self {
        match score {
            0..=3 => Importance::Low,
            4..=7 => Importance::Medium,
            _ => Importance::High,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Records
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One `(player input, director response)` pair in the recent ring.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Interaction {
    pub player_input: String,
    pub director_response: String,
    pub timestamp: DateTime<Utc>,
    pub importance: Importance,
}

impl Interaction {
    /// Combined text used by trigger matching and the importance heuristic.
    pub fn combined_text(&self) -> String {
        format!("{}\n{}", self.player_input, self.director_response)
    }
}

/// A compressed, long-lived memory distilled from a batch of interactions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SignificantMemory {
    pub id: String,
    pub kind: MemoryKind,
    pub summary: String,
    /// 1.0..=10.0; trigger touches bump it by 0.1 up to the cap.
    pub importance: f32,
    pub last_accessed: DateTime<Utc>,
    pub participants: Vec<String>,
    pub related_items: Vec<String>,
    pub related_locations: Vec<String>,
    pub context_triggers: Vec<String>,
}

impl SignificantMemory {
    /// Materialize an extracted memory with a fresh id.
    pub fn from_extracted(extracted: ExtractedMemory, now: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind: extracted.kind,
            summary: extracted.summary,
            importance: f32::from(extracted.importance.clamp(1, 10)),
            last_accessed: now,
            participants: extracted.participants,
            related_items: extracted.related_items,
            related_locations: extracted.related_locations,
            context_triggers: extracted.context_triggers,
        }
    }

    /// Register a trigger hit: refresh recency and nudge importance.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_accessed = now;
        self.importance = (self.importance + 0.1).min(10.0);
    }

    /// Whether any context trigger appears in `text` (case-insensitive).
    pub fn triggered_by(&self, text: &str) -> bool {
        let lowered = text.to_lowercase();
        self.context_triggers
            .iter()
            .any(|t| !t.is_empty() && lowered.contains(&t.to_lowercase()))
    }
}

/// Serializable snapshot of the whole memory state (save files).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MemorySnapshot {
    #[serde(default)]
    pub recent: Vec<Interaction>,
    #[serde(default)]
    pub significant: Vec<SignificantMemory>,
    #[serde(default)]
    pub since_extraction: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tw_domain::wire::MemoryKind;

    #[test]
    fn importance_heuristic_tiers() {
        assert_eq!(
            Importance::from_text("I promise to return the locket."),
            Importance::High
        );
        assert_eq!(
            Importance::from_text("We found a dusty map in the chest."),
            Importance::Medium
        );
        assert_eq!(Importance::from_text("You walk north."), Importance::Low);
    }

    #[test]
    fn importance_heuristic_is_case_insensitive() {
        assert_eq!(Importance::from_text("A TERRIBLE SECRET"), Importance::High);
    }

    #[test]
    fn director_score_buckets() {
        assert_eq!(Importance::from_score(2), Importance::Low);
        assert_eq!(Importance::from_score(5), Importance::Medium);
        assert_eq!(Importance::from_score(9), Importance::High);
    }

    #[test]
    fn touch_bumps_importance_capped_at_ten() {
        let mut mem = SignificantMemory {
            id: "m1".into(),
            kind: MemoryKind::Promise,
            summary: "Swore to protect the lighthouse keeper.".into(),
            importance: 9.95,
            last_accessed: Utc::now() - chrono::Duration::days(3),
            participants: vec!["keeper".into()],
            related_items: vec![],
            related_locations: vec![],
            context_triggers: vec!["lighthouse".into()],
        };
        let now = Utc::now();
        mem.touch(now);
        assert_eq!(mem.last_accessed, now);
        assert!((mem.importance - 10.0).abs() < 1e-6);
        mem.touch(now);
        assert!(mem.importance <= 10.0);
    }

    #[test]
    fn trigger_matching_is_substring_and_case_insensitive() {
        let mem = SignificantMemory {
            id: "m1".into(),
            kind: MemoryKind::Discovery,
            summary: "".into(),
            importance: 5.0,
            last_accessed: Utc::now(),
            participants: vec![],
            related_items: vec![],
            related_locations: vec![],
            context_triggers: vec!["brass key".into(), String::new()],
        };
        assert!(mem.triggered_by("I pick up the Brass Key from the desk"));
        assert!(!mem.triggered_by("nothing relevant here"));
    }

    #[test]
    fn from_extracted_clamps_importance_and_assigns_id() {
        let extracted = tw_domain::wire::ExtractedMemory {
            kind: MemoryKind::Goal,
            summary: "Escape before dawn.".into(),
            importance: 14,
            participants: vec![],
            related_items: vec![],
            related_locations: vec![],
            context_triggers: vec![],
        };
        let mem = SignificantMemory::from_extracted(extracted, Utc::now());
        assert!(!mem.id.is_empty());
        assert!((mem.importance - 10.0).abs() < 1e-6);
    }

    #[test]
    fn snapshot_roundtrip_is_byte_identical() {
        let snapshot = MemorySnapshot {
            recent: vec![Interaction {
                player_input: "look".into(),
                director_response: "A dim hall.".into(),
                timestamp: "2026-03-01T12:00:00Z".parse().unwrap(),
                importance: Importance::Low,
            }],
            significant: vec![],
            since_extraction: 3,
        };
        let first = serde_json::to_string(&snapshot).unwrap();
        let back: MemorySnapshot = serde_json::from_str(&first).unwrap();
        let second = serde_json::to_string(&back).unwrap();
        assert_eq!(first, second);
    }
}
