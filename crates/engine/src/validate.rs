//! Pre-apply validation of director signals.
//!
//! Signals are checked before any state mutation: item acquisitions
//! against the story's item set and discovery gating, scene/ending ids
//! against the story, and discovery-verb inputs against inventory changes
//! and "taking language" in the narrative. Issues feed the single
//! validator retry; a second failure applies only the validated subset.

use regex::Regex;

use tw_domain::state::SessionState;
use tw_domain::story::Story;
use tw_domain::wire::Signals;

/// Verbs that observe without acquiring. An input built from these must
/// leave the inventory untouched.
pub const DISCOVERY_VERBS: &[&str] = &[
    "check", "examine", "inspect", "search", "look", "rummage", "explore",
];

/// One rejected aspect of a director response.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationIssue {
    pub message: String,
}

impl ValidationIssue {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Signal validator. Owns its compiled regexes.
pub struct Validator {
    taking_language: Regex,
}

impl Default for Validator {
    fn default() -> Self {
        Self::new()
    }
}

impl Validator {
    pub fn new() -> Self {
        // "you grab", "you pick up", bare gerunds like "grabbing" etc.
        let taking_language = Regex::new(
            r"(?i)\byou\s+(grab|take|pick\s+up|scoop(\s+up)?|collect|clutch|seize|snatch|pocket)\b|\b(grabbing|snatching|seizing|pocketing)\b",
        )
        .expect("taking-language pattern is valid");
        Self { taking_language }
    }

    /// Whether the input is a pure observation: contains a discovery verb
    /// and no acquisitive phrasing of its own.
    pub fn is_discovery_input(&self, input: &str) -> bool {
        let lowered = input.to_lowercase();
        let has_discovery_verb = lowered
            .split(|c: char| !c.is_alphanumeric())
            .any(|word| DISCOVERY_VERBS.contains(&word));
        has_discovery_verb && !self.mentions_taking(input)
    }

    /// Whether prose contains taking language.
    pub fn mentions_taking(&self, text: &str) -> bool {
        self.taking_language.is_match(text)
    }

    /// Validate a director response against the story and current state.
    ///
    /// `recent_inputs` (oldest first, current input last) back the
    /// discovery-object check: an item gated on examining an object can
    /// only be acquired after that object was mentioned.
    pub fn validate(
        &self,
        story: &Story,
        state: &SessionState,
        player_input: &str,
        recent_inputs: &[String],
        narrative: &str,
        signals: &Signals,
    ) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();

        // Discovery-verb discipline: observation must not acquire.
        if self.is_discovery_input(player_input) {
            if signals.touches_inventory() {
                issues.push(ValidationIssue::new(format!(
                    "the player action '{player_input}' only examines; inventory \
                     changes are not allowed on this turn"
                )));
            }
            if self.mentions_taking(narrative) {
                issues.push(ValidationIssue::new(
                    "the narrative describes taking or grabbing, but the player only \
                     examined; describe what is seen instead",
                ));
            }
        }

        // Item acquisitions.
        for item_id in signals.add.iter().chain(signals.discover.iter()) {
            issues.extend(self.check_acquisition(story, state, item_id, recent_inputs));
        }

        // Scene / ending ids must exist.
        if let Some(scene_id) = &signals.scene {
            if story.scene(scene_id).is_none() {
                issues.push(ValidationIssue::new(format!(
                    "signal references unknown scene '{scene_id}'"
                )));
            }
        }
        if let Some(ending_id) = &signals.ending {
            if story.ending(ending_id).is_none() {
                issues.push(ValidationIssue::new(format!(
                    "signal references unknown ending '{ending_id}'"
                )));
            }
        }

        issues
    }

    /// Item acquisition rules: the item exists (or emergent content is
    /// enabled), the scene matches any location constraint, and gated
    /// discovery objects were examined first.
    fn check_acquisition(
        &self,
        story: &Story,
        state: &SessionState,
        item_id: &str,
        recent_inputs: &[String],
    ) -> Vec<ValidationIssue> {
        let Some(item) = story.item(item_id) else {
            if story.emergent_items {
                return Vec::new();
            }
            return vec![ValidationIssue::new(format!(
                "'{item_id}' is not an item in this story and emergent items are \
                 disabled"
            ))];
        };

        let mut issues = Vec::new();

        if let Some(scene) = &item.discoverable_in {
            if *scene != state.current_scene_id {
                issues.push(ValidationIssue::new(format!(
                    "'{item_id}' can only be acquired in scene '{scene}', not \
                     '{}'",
                    state.current_scene_id
                )));
            }
        }

        if !item.discovery_objects.is_empty() {
            let examined = item.discovery_objects.iter().any(|object| {
                let lowered = object.to_lowercase();
                recent_inputs
                    .iter()
                    .any(|input| input.to_lowercase().contains(&lowered))
            });
            if !examined {
                issues.push(ValidationIssue::new(format!(
                    "'{item_id}' is hidden until the player examines {}; it cannot \
                     be acquired yet",
                    item.discovery_objects.join(" or ")
                )));
            }
        }

        issues
    }

    /// Strip the offending parts of a failed response, keeping what
    /// passed. Used when the validator retry also fails.
    pub fn validated_subset(
        &self,
        story: &Story,
        state: &SessionState,
        player_input: &str,
        recent_inputs: &[String],
        signals: &Signals,
    ) -> Signals {
        let discovery_turn = self.is_discovery_input(player_input);

        let keep_item = |item_id: &str| {
            !discovery_turn
                && self
                    .check_acquisition(story, state, item_id, recent_inputs)
                    .is_empty()
        };

        Signals {
            scene: signals
                .scene
                .clone()
                .filter(|id| story.scene(id).is_some()),
            ending: signals
                .ending
                .clone()
                .filter(|id| story.ending(id).is_some()),
            discover: signals.discover.clone().filter(|i| keep_item(i)),
            add: signals
                .add
                .iter()
                .filter(|i| keep_item(i.as_str()))
                .cloned()
                .collect(),
            remove: if discovery_turn {
                Vec::new()
            } else {
                signals.remove.clone()
            },
            set_flags: signals.set_flags.clone(),
            unset_flags: signals.unset_flags.clone(),
            error: signals.error.clone(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
