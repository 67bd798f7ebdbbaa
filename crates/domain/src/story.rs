//! The typed story record: the immutable input the engine plays.
//!
//! Authoring-format quirks stay outside the core; this module only
//! deserializes a well-formed YAML document into typed structs and
//! validates cross-references (transition targets, discovery scenes).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A scene identifier (authored, human-readable).
pub type SceneId = String;

/// An item identifier (authored, human-readable).
pub type ItemId = String;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Flag values
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A flag value: authored content uses booleans, numbers, and strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FlagValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl FlagValue {
    /// Truthiness used when a flag is tested for mere presence.
    pub fn is_truthy(&self) -> bool {
        match self {
            FlagValue::Bool(b) => *b,
            FlagValue::Number(n) => *n != 0.0,
            FlagValue::Text(s) => !s.is_empty(),
        }
    }

    /// Render the value the way prompts show it.
    pub fn render(&self) -> String {
        match self {
            FlagValue::Bool(b) => b.to_string(),
            FlagValue::Number(n) => {
                if n.fract() == 0.0 {
                    format!("{}", *n as i64)
                } else {
                    n.to_string()
                }
            }
            FlagValue::Text(s) => s.clone(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Story structs
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A transition out of a scene. The `id` is positional (`T0`, `T1`, ...)
/// within the owning scene.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneTransition {
    #[serde(default)]
    pub id: String,
    /// Prerequisite clause(s), authored prose. Conjunctive.
    pub condition: String,
    /// Optional prose woven into the narrative when the transition fires.
    #[serde(default)]
    pub sketch: Option<String>,
    /// Destination scene.
    pub target: SceneId,
}

/// One scene of the story.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scene {
    /// Author-written prose describing the scene's static situation.
    pub sketch: String,
    /// Flags set when the scene is entered.
    #[serde(default)]
    pub initial_flags: BTreeMap<String, FlagValue>,
    #[serde(default)]
    pub transitions: Vec<SceneTransition>,
    /// When true the director is asked to expand the sketch rather than
    /// deliver it verbatim.
    #[serde(default)]
    pub process_sketch: bool,
}

/// One possible ending of the story.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndingVariation {
    pub id: String,
    #[serde(default)]
    pub conditions: Vec<String>,
    #[serde(default)]
    pub sketch: Option<String>,
}

/// Ending block: conditions shared by every variation plus the variations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Endings {
    #[serde(default)]
    pub global_conditions: Vec<String>,
    #[serde(default)]
    pub variations: Vec<EndingVariation>,
}

/// An item the player can hold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    /// Item id this one can transform into.
    #[serde(default)]
    pub can_become: Option<ItemId>,
    /// Item id this one was created from.
    #[serde(default)]
    pub created_from: Option<ItemId>,
    /// Scene the item can be discovered in. None = no location constraint.
    #[serde(default)]
    pub discoverable_in: Option<SceneId>,
    /// Objects the player must have examined before the item can be taken.
    #[serde(default)]
    pub discovery_objects: Vec<String>,
}

/// Optional authoring documentation for a flag.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlagDefinition {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub examples: Vec<String>,
    #[serde(default)]
    pub triggers: Vec<String>,
}

/// The immutable story input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Story {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub blurb: String,
    /// Scene the session starts in. Filled from document order when the
    /// author omits it.
    #[serde(default)]
    pub start: SceneId,
    pub scenes: BTreeMap<SceneId, Scene>,
    #[serde(default)]
    pub endings: Endings,
    #[serde(default)]
    pub items: Vec<Item>,
    /// Free-form authoring notes forwarded to the director.
    #[serde(default)]
    pub guidance: Option<String>,
    #[serde(default)]
    pub flag_definitions: BTreeMap<String, FlagDefinition>,
    /// Authoring opt-in: the director may invent items not listed above.
    #[serde(default)]
    pub emergent_items: bool,
}

impl Story {
    /// Deserialize a story from YAML, assign positional transition ids,
    /// resolve the start scene, and validate cross-references.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        // Parse through a Value first so the start scene can be taken from
        // document order when `start` is absent (BTreeMap loses it).
        let doc: serde_yaml::Value = serde_yaml::from_str(yaml)?;
        let first_scene = doc
            .get("scenes")
            .and_then(|s| s.as_mapping())
            .and_then(|m| m.keys().next())
            .and_then(|k| k.as_str())
            .map(str::to_owned);

        let mut story: Story = serde_yaml::from_value(doc)?;

        if story.start.is_empty() {
            story.start = first_scene.ok_or_else(|| {
                Error::Config(format!("story '{}' has no scenes", story.id))
            })?;
        }

        for scene in story.scenes.values_mut() {
            for (idx, t) in scene.transitions.iter_mut().enumerate() {
                t.id = format!("T{idx}");
            }
        }

        story.validate()?;
        Ok(story)
    }

    /// Cross-reference validation: the start scene and every transition
    /// target and discovery scene must exist; ids must be unique.
    pub fn validate(&self) -> Result<()> {
        if !self.scenes.contains_key(&self.start) {
            return Err(Error::Config(format!(
                "start scene '{}' does not exist",
                self.start
            )));
        }

        for (scene_id, scene) in &self.scenes {
            for t in &scene.transitions {
                if !self.scenes.contains_key(&t.target) {
                    return Err(Error::Config(format!(
                        "scene '{scene_id}' transition '{}' targets unknown scene '{}'",
                        t.id, t.target
                    )));
                }
            }
        }

        let mut seen_items = std::collections::BTreeSet::new();
        for item in &self.items {
            if !seen_items.insert(item.id.as_str()) {
                return Err(Error::Config(format!("duplicate item id '{}'", item.id)));
            }
            if let Some(scene) = &item.discoverable_in {
                if !self.scenes.contains_key(scene) {
                    return Err(Error::Config(format!(
                        "item '{}' is discoverable in unknown scene '{scene}'",
                        item.id
                    )));
                }
            }
        }

        let mut seen_endings = std::collections::BTreeSet::new();
        for v in &self.endings.variations {
            if !seen_endings.insert(v.id.as_str()) {
                return Err(Error::Config(format!("duplicate ending id '{}'", v.id)));
            }
        }

        Ok(())
    }

    pub fn scene(&self, id: &str) -> Option<&Scene> {
        self.scenes.get(id)
    }

    pub fn item(&self, id: &str) -> Option<&Item> {
        self.items.iter().find(|i| i.id == id)
    }

    /// Resolve an item by id, name, or alias (case-insensitive).
    pub fn item_by_any_name(&self, name: &str) -> Option<&Item> {
        let lowered = name.to_lowercase();
        self.items.iter().find(|i| {
            i.id.to_lowercase() == lowered
                || i.name.to_lowercase() == lowered
                || i.aliases.iter().any(|a| a.to_lowercase() == lowered)
        })
    }

    pub fn known_item(&self, id: &str) -> bool {
        self.item(id).is_some()
    }

    pub fn ending(&self, id: &str) -> Option<&EndingVariation> {
        self.endings.variations.iter().find(|v| v.id == id)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
