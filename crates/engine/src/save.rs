//! Save-file format, version 1.
//!
//! One UTF-8 JSON object with camelCase keys. Loading validates the
//! story identity and version before anything is mutated; a mismatch is
//! an `InvalidSave` and the current session is left exactly as it was.

use serde::{Deserialize, Serialize};

use tw_domain::error::{Error, Result};
use tw_domain::state::SessionState;
use tw_domain::story::{FlagValue, Story};
use tw_memory::MemorySnapshot;

pub const SAVE_VERSION: u32 = 1;

/// One flag in the save file. Flags are stored as an ordered array
/// rather than an object so the layout is stable across serializers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FlagEntry {
    pub name: String,
    pub value: FlagValue,
}

/// Session-state portion of a save.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveState {
    pub current_scene_id: String,
    pub flags: Vec<FlagEntry>,
    pub inventory: Vec<String>,
    pub is_ended: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ending_id: Option<String>,
}

/// The complete persisted save.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveData {
    pub story_id: String,
    pub story_title: String,
    pub state: SaveState,
    pub memory: MemorySnapshot,
    pub version: u32,
}

impl SaveData {
    /// Capture the current session into a save record.
    pub fn capture(story: &Story, state: &SessionState, memory: MemorySnapshot) -> Self {
        Self {
            story_id: story.id.clone(),
            story_title: story.title.clone(),
            state: SaveState {
                current_scene_id: state.current_scene_id.clone(),
                flags: state
                    .flags
                    .iter()
                    .map(|(name, value)| FlagEntry {
                        name: name.clone(),
                        value: value.clone(),
                    })
                    .collect(),
                inventory: state.inventory.clone(),
                is_ended: state.is_ended,
                ending_id: state.ending_id.clone(),
            },
            memory,
            version: SAVE_VERSION,
        }
    }

    /// Validate against the loaded story and convert back into live
    /// state. Nothing is mutated on failure.
    pub fn restore_for(self, story: &Story) -> Result<(SessionState, MemorySnapshot)> {
        if self.version != SAVE_VERSION {
            return Err(Error::InvalidSave(format!(
                "unsupported save version {} (expected {SAVE_VERSION})",
                self.version
            )));
        }
        if self.story_id != story.id || self.story_title != story.title {
            return Err(Error::InvalidSave(format!(
                "save belongs to '{}' ({}), not the loaded story '{}' ({})",
                self.story_title, self.story_id, story.title, story.id
            )));
        }
        if !self.state.is_ended && story.scene(&self.state.current_scene_id).is_none() {
            return Err(Error::InvalidSave(format!(
                "save references unknown scene '{}'",
                self.state.current_scene_id
            )));
        }

        let state = SessionState {
            current_scene_id: self.state.current_scene_id,
            flags: self
                .state
                .flags
                .into_iter()
                .map(|entry| (entry.name, entry.value))
                .collect(),
            inventory: self.state.inventory,
            is_ended: self.state.is_ended,
            ending_id: self.state.ending_id,
        };
        Ok((state, self.memory))
    }

    /// Serialize to the persisted JSON layout.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse a persisted save. Malformed JSON or missing fields are
    /// reported as `InvalidSave`, not raw serde errors.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| Error::InvalidSave(format!("malformed save file: {e}")))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
