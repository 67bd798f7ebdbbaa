//! Mutable per-session game state, owned exclusively by the engine.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::story::{FlagValue, ItemId, SceneId, Story};

/// The engine-owned session state.
///
/// Invariant: `current_scene_id` refers to a real scene unless `is_ended`.
/// `inventory` is an ordered, deduplicated list of item ids.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionState {
    pub current_scene_id: SceneId,
    pub flags: BTreeMap<String, FlagValue>,
    pub inventory: Vec<ItemId>,
    pub is_ended: bool,
    #[serde(default)]
    pub ending_id: Option<String>,
}

impl SessionState {
    /// Fresh state at the story's start scene, with that scene's initial
    /// flags applied.
    pub fn at_start(story: &Story) -> Self {
        let mut state = Self {
            current_scene_id: story.start.clone(),
            flags: BTreeMap::new(),
            inventory: Vec::new(),
            is_ended: false,
            ending_id: None,
        };
        if let Some(scene) = story.scene(&story.start) {
            for (name, value) in &scene.initial_flags {
                state.flags.insert(name.clone(), value.clone());
            }
        }
        state
    }

    pub fn has_item(&self, id: &str) -> bool {
        self.inventory.iter().any(|i| i == id)
    }

    /// Append an item, preserving order and uniqueness.
    pub fn add_item(&mut self, id: &str) {
        if !self.has_item(id) {
            self.inventory.push(id.to_owned());
        }
    }

    pub fn remove_item(&mut self, id: &str) {
        self.inventory.retain(|i| i != id);
    }

    pub fn set_flag(&mut self, name: &str, value: FlagValue) {
        self.flags.insert(name.to_owned(), value);
    }

    pub fn unset_flag(&mut self, name: &str) {
        self.flags.remove(name);
    }

    pub fn flag_is_set(&self, name: &str) -> bool {
        self.flags.get(name).map(FlagValue::is_truthy).unwrap_or(false)
    }

    /// Enter a scene: update the current scene and apply its initial flags.
    /// Initial flags do not overwrite flags the playthrough already set.
    pub fn enter_scene(&mut self, story: &Story, scene_id: &str) {
        self.current_scene_id = scene_id.to_owned();
        if let Some(scene) = story.scene(scene_id) {
            for (name, value) in &scene.initial_flags {
                self.flags.entry(name.clone()).or_insert_with(|| value.clone());
            }
        }
    }

    /// Mark the session ended with the given ending. Terminal: once ended,
    /// the ending never changes.
    pub fn end(&mut self, ending_id: &str) {
        if !self.is_ended {
            self.is_ended = true;
            self.ending_id = Some(ending_id.to_owned());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn story() -> Story {
        Story::from_yaml_str(
            r#"
id: s
title: S
scenes:
  hall:
    sketch: "A hall."
    initial_flags:
      visited_hall: true
    transitions:
      - condition: "go east"
        target: vault
  vault:
    sketch: "A vault."
    initial_flags:
      vault_sealed: true
"#,
        )
        .unwrap()
    }

    #[test]
    fn at_start_applies_initial_flags() {
        let state = SessionState::at_start(&story());
        assert_eq!(state.current_scene_id, "hall");
        assert!(state.flag_is_set("visited_hall"));
        assert!(!state.is_ended);
    }

    #[test]
    fn inventory_is_ordered_and_deduped() {
        let mut state = SessionState::at_start(&story());
        state.add_item("rope");
        state.add_item("torch");
        state.add_item("rope");
        assert_eq!(state.inventory, vec!["rope", "torch"]);

        state.remove_item("rope");
        assert_eq!(state.inventory, vec!["torch"]);
    }

    #[test]
    fn enter_scene_does_not_clobber_existing_flags() {
        let s = story();
        let mut state = SessionState::at_start(&s);
        state.set_flag("vault_sealed", FlagValue::Bool(false));
        state.enter_scene(&s, "vault");
        assert_eq!(state.current_scene_id, "vault");
        // The playthrough already unsealed the vault; entry must not reseal it.
        assert!(!state.flag_is_set("vault_sealed"));
    }

    #[test]
    fn ending_is_terminal() {
        let mut state = SessionState::at_start(&story());
        state.end("escape");
        state.end("death");
        assert!(state.is_ended);
        assert_eq!(state.ending_id.as_deref(), Some("escape"));
    }

    #[test]
    fn serde_roundtrip_preserves_inventory_order() {
        let mut state = SessionState::at_start(&story());
        state.add_item("b");
        state.add_item("a");
        let json = serde_json::to_string(&state).unwrap();
        let back: SessionState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
        assert_eq!(back.inventory, vec!["b", "a"]);
    }
}
