//! Structured-output envelopes exchanged with the models.
//!
//! These shapes are wire contracts: field names and value spellings match
//! what the prompts ask the models to produce. Unknown fields are ignored
//! everywhere (models love to add commentary fields).

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Classifier
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Raw classifier output: `{ "result": "continue" | "T0" | ..., "reasoning": "..." }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierVerdict {
    pub result: String,
    #[serde(default)]
    pub reasoning: String,
}

impl ClassifierVerdict {
    /// Parse a `T<k>` result into its index. `continue` and anything
    /// malformed return `None`.
    pub fn transition_index(&self) -> Option<usize> {
        self.result.strip_prefix('T')?.parse().ok()
    }

    pub fn is_continue(&self) -> bool {
        self.result == "continue"
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Director
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// State-change instructions inside a director response.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Signals {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scene: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ending: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discover: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub add: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub remove: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty", rename = "setFlags")]
    pub set_flags: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty", rename = "unsetFlags")]
    pub unset_flags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Signals {
    pub fn is_empty(&self) -> bool {
        self.scene.is_none()
            && self.ending.is_none()
            && self.discover.is_none()
            && self.add.is_empty()
            && self.remove.is_empty()
            && self.set_flags.is_empty()
            && self.unset_flags.is_empty()
            && self.error.is_none()
    }

    /// Whether the signals change inventory at all.
    pub fn touches_inventory(&self) -> bool {
        self.discover.is_some() || !self.add.is_empty() || !self.remove.is_empty()
    }
}

fn default_importance() -> u8 {
    5
}

/// Director output envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectorResponse {
    pub narrative: String,
    #[serde(default = "default_importance")]
    pub importance: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signals: Option<Signals>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub memories: Vec<String>,
}

impl DirectorResponse {
    /// The typed fallback used when the model's output cannot be parsed.
    /// Never surfaces raw JSON to the player.
    pub fn parse_fallback(reason: &str) -> Self {
        Self {
            narrative: "The story stumbles for a moment, having trouble understanding \
                        what just happened. Try rephrasing your action."
                .into(),
            importance: 1,
            signals: Some(Signals {
                error: Some(reason.to_owned()),
                ..Signals::default()
            }),
            memories: Vec::new(),
        }
    }

    /// Importance clamped to the documented 1..10 range.
    pub fn clamped_importance(&self) -> u8 {
        self.importance.clamp(1, 10)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Memory extraction & compaction
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Kind of a significant memory. The wire spelling for bonds is
/// `character_bond`; the shorter `bond` is accepted on input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryKind {
    #[serde(rename = "character_bond", alias = "bond")]
    Bond,
    Discovery,
    Revelation,
    Promise,
    Goal,
}

impl MemoryKind {
    /// The wire spelling, also used when memories are printed into prompts.
    pub fn label(&self) -> &'static str {
        match self {
            MemoryKind::Bond => "character_bond",
            MemoryKind::Discovery => "discovery",
            MemoryKind::Revelation => "revelation",
            MemoryKind::Promise => "promise",
            MemoryKind::Goal => "goal",
        }
    }
}

/// One memory produced by batch extraction (no id yet; the store assigns one).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedMemory {
    pub kind: MemoryKind,
    pub summary: String,
    #[serde(default = "default_importance")]
    pub importance: u8,
    #[serde(default)]
    pub participants: Vec<String>,
    #[serde(default, rename = "relatedItems")]
    pub related_items: Vec<String>,
    #[serde(default, rename = "relatedLocations")]
    pub related_locations: Vec<String>,
    #[serde(default, rename = "contextTriggers")]
    pub context_triggers: Vec<String>,
}

/// Batch extraction output: `{ "memories": [...] }`. Empty is legal and common.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionOutput {
    #[serde(default)]
    pub memories: Vec<ExtractedMemory>,
}

/// One compaction group: the ids being merged and their replacement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompactionGroup {
    #[serde(rename = "memoryIds")]
    pub memory_ids: Vec<String>,
    #[serde(rename = "compactedMemory")]
    pub compacted_memory: ExtractedMemory,
}

/// Compaction output.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompactionOutput {
    #[serde(default, rename = "compactionGroups")]
    pub compaction_groups: Vec<CompactionGroup>,
    #[serde(default, rename = "keepIndividual")]
    pub keep_individual: Vec<String>,
}
