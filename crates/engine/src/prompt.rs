//! Deterministic prompt assembly.
//!
//! Sections are concatenated in a fixed order so the stable material
//! (task rules, story invariants, scene sketch) forms a cache-friendly
//! prefix and the churny material (recent dialogue, retry notes, player
//! action) lands at the end. Identical inputs must produce identical
//! prompts: flags iterate in `BTreeMap` order and the transition menu
//! order is fixed by the story.

use tw_domain::state::SessionState;
use tw_domain::story::{SceneId, Story};
use tw_memory::MemoryContext;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Transition menu
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// What firing a transition does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionMode {
    /// Move to another scene.
    Scene,
    /// Finish the story with an ending variation.
    Ending,
}

/// One entry of the numbered menu shown to the classifier.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionOption {
    /// Index in the menu; the classifier answers `T<index>`.
    pub index: usize,
    pub mode: TransitionMode,
    /// Target scene id (`Scene`) or ending id (`Ending`).
    pub target_id: String,
    /// Prerequisite clauses, each one conjunctive.
    pub clauses: Vec<String>,
    pub sketch: Option<String>,
}

/// Build the ordered transition menu for the current scene: all scene
/// transitions in story order, then all ending variations in story
/// order. Ending prerequisites are the union of the story's global
/// conditions and the variation's own, one clause per entry.
pub fn transition_menu(story: &Story, current_scene_id: &SceneId) -> Vec<TransitionOption> {
    let mut menu = Vec::new();

    if let Some(scene) = story.scene(current_scene_id) {
        for t in &scene.transitions {
            menu.push(TransitionOption {
                index: menu.len(),
                mode: TransitionMode::Scene,
                target_id: t.target.clone(),
                clauses: vec![t.condition.clone()],
                sketch: t.sketch.clone(),
            });
        }
    }

    for variation in &story.endings.variations {
        let mut clauses = story.endings.global_conditions.clone();
        clauses.extend(variation.conditions.iter().cloned());
        menu.push(TransitionOption {
            index: menu.len(),
            mode: TransitionMode::Ending,
            target_id: variation.id.clone(),
            clauses,
            sketch: variation.sketch.clone(),
        });
    }

    menu
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Composer
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

const CLASSIFIER_RULES: &str = "\
You are a strict evaluator deciding whether the player's action completes \
one of the listed transitions.
Rules:
1. Every prerequisite clause of a transition must be explicitly satisfied.
2. Clauses combine with AND. There is no OR and no fuzzy matching.
3. Judge only what explicitly happened. Never infer intent.
4. When in doubt, answer \"continue\".";

const CLASSIFIER_CONTRACT: &str = "\
Respond with JSON only, in exactly this shape:
{\"result\": \"continue\" | \"T0\" | \"T1\" | ..., \"reasoning\": \"one short sentence\"}";

const DIRECTOR_TASK: &str = "\
You are the director of an interactive story. Continue the story from the \
player's action, in second person present tense, staying inside the current \
scene's situation.
Rules:
- Emit signals only for state changes that actually occur in your narrative. \
Never emit inferred or anticipated state.
- The player character is you-the-reader. Never address or puppet them as \
though they were another character.
- Keep the narrative grounded in what the scene sketch establishes.";

const MARKUP_GUIDE: &str = "\
Markup available in the narrative: [Name](character:id), [Name](item:id), \
**bold**, *italic*, callout lines starting with [!warning], [!discovery] or \
[!danger], and # / ### headings. There is no location markup.";

const DIRECTOR_CONTRACT: &str = "\
Respond with JSON only, in exactly this shape:
{\"narrative\": \"the prose shown to the player, non-empty\",
 \"importance\": 1-10,
 \"signals\": {\"scene\": \"sceneId\", \"ending\": \"endingId\", \"discover\": \"itemId\",
              \"add\": [\"itemId\"], \"remove\": [\"itemId\"],
              \"setFlags\": [\"name\"], \"unsetFlags\": [\"name\"]},
 \"memories\": [\"short summary of anything worth remembering\"]}
Omit signals and memories entirely when there is nothing to report.";

/// Assembles classifier and director prompts from story + state.
pub struct PromptComposer;

impl PromptComposer {
    /// Section 3: current scene sketch.
    fn scene_section(story: &Story, state: &SessionState) -> String {
        let scene = story.scene(&state.current_scene_id);
        let sketch = scene.map(|s| s.sketch.as_str()).unwrap_or("");
        let mut out = format!("## Current scene\n{sketch}");
        if scene.map(|s| s.process_sketch).unwrap_or(false) {
            out.push_str(
                "\n(The sketch above is raw material; expand and dramatize it rather \
                 than delivering it as written.)",
            );
        }
        out
    }

    /// Section 4: flags and inventory snapshot, deterministic order.
    fn state_section(state: &SessionState) -> String {
        let flags = if state.flags.is_empty() {
            "(none)".to_owned()
        } else {
            state
                .flags
                .iter()
                .map(|(name, value)| format!("- {name} = {}", value.render()))
                .collect::<Vec<_>>()
                .join("\n")
        };
        let inventory = if state.inventory.is_empty() {
            "(empty)".to_owned()
        } else {
            state
                .inventory
                .iter()
                .map(|i| format!("- {i}"))
                .collect::<Vec<_>>()
                .join("\n")
        };
        format!("## Story flags\n{flags}\n\n## Inventory\n{inventory}")
    }

    /// Section 5 (classifier flavor): the numbered transition table.
    fn menu_section(menu: &[TransitionOption]) -> String {
        if menu.is_empty() {
            return "## Transitions\n(none; always answer \"continue\")".to_owned();
        }
        let mut out = String::from("## Transitions\n");
        for option in menu {
            let target = match option.mode {
                TransitionMode::Scene => format!("scene '{}'", option.target_id),
                TransitionMode::Ending => format!("ending '{}'", option.target_id),
            };
            out.push_str(&format!("T{} -> {target}\n  requires:\n", option.index));
            for clause in &option.clauses {
                out.push_str(&format!("  - {clause}\n"));
            }
        }
        out.trim_end().to_owned()
    }

    fn memory_sections(memory: &MemoryContext) -> String {
        let mut out = String::new();
        if !memory.significant_formatted.is_empty() {
            out.push_str("## Significant memories\n");
            out.push_str(&memory.significant_formatted);
            out.push_str("\n\n");
        }
        if !memory.recent_formatted.is_empty() {
            out.push_str("## Recent dialogue\n");
            out.push_str(&memory.recent_formatted);
            out.push_str("\n\n");
        }
        out
    }

    /// Compose the classifier prompt. Static prefix (rules, sketch, menu)
    /// first; memories, recent dialogue, retry notes and the action last.
    pub fn classifier_prompt(
        story: &Story,
        state: &SessionState,
        menu: &[TransitionOption],
        memory: &MemoryContext,
        retry_notes: &[String],
        player_action: &str,
    ) -> String {
        let mut prompt = String::new();
        prompt.push_str(CLASSIFIER_RULES);
        prompt.push_str("\n\n");
        prompt.push_str(&Self::scene_section(story, state));
        prompt.push_str("\n\n");
        prompt.push_str(&Self::menu_section(menu));
        prompt.push_str("\n\n");
        prompt.push_str(&Self::memory_sections(memory));
        if !retry_notes.is_empty() {
            prompt.push_str("## Notes from previous attempts\n");
            for note in retry_notes {
                prompt.push_str(&format!("- {note}\n"));
            }
            prompt.push('\n');
        }
        prompt.push_str(&format!("## Player action\n{player_action}\n\n"));
        prompt.push_str(CLASSIFIER_CONTRACT);
        prompt
    }

    /// Compose the director prompt.
    ///
    /// `preselected` is the transition the classifier fired, if any;
    /// `retry_feedback` carries validator issues on the single retry;
    /// `reflective` marks post-ending turns where no state may change.
    #[allow(clippy::too_many_arguments)]
    pub fn director_prompt(
        story: &Story,
        state: &SessionState,
        memory: &MemoryContext,
        preselected: Option<&TransitionOption>,
        retry_feedback: Option<&str>,
        reflective: bool,
        player_action: &str,
    ) -> String {
        let mut prompt = String::new();
        prompt.push_str(DIRECTOR_TASK);
        prompt.push_str("\n\n");

        // Story invariants: title, guidance, markup.
        prompt.push_str(&format!("## Story\n{}", story.title));
        if !story.blurb.is_empty() {
            prompt.push_str(&format!(": {}", story.blurb));
        }
        prompt.push('\n');
        if let Some(guidance) = &story.guidance {
            prompt.push_str(&format!("\n## Author guidance\n{guidance}\n"));
        }
        if !story.flag_definitions.is_empty() {
            prompt.push_str("\n## Flag vocabulary\n");
            for (name, def) in &story.flag_definitions {
                prompt.push_str(&format!("- {name}: {}\n", def.description));
            }
        }
        prompt.push('\n');
        prompt.push_str(MARKUP_GUIDE);
        prompt.push_str("\n\n");

        prompt.push_str(&Self::scene_section(story, state));
        prompt.push_str("\n\n");
        prompt.push_str(&Self::state_section(state));
        prompt.push_str("\n\n");

        if let Some(option) = preselected {
            let destination = match option.mode {
                TransitionMode::Scene => {
                    format!("the story now moves to scene '{}'", option.target_id)
                }
                TransitionMode::Ending => {
                    format!("the story now reaches its ending '{}'", option.target_id)
                }
            };
            prompt.push_str(&format!(
                "## Transition firing\nThe player's action completes a transition: \
                 {destination}. Weave the sketch below into your response as its \
                 natural consequence (do not paste it verbatim) and conclude the \
                 turn with the story settled at the new situation.\n"
            ));
            if let Some(sketch) = &option.sketch {
                prompt.push_str(&format!("Sketch:\n{sketch}\n"));
            }
            prompt.push('\n');
        }

        if reflective {
            prompt.push_str(
                "## Story complete\nThe story has already ended. Respond in a \
                 reflective, epilogue register. Do not emit any signals.\n\n",
            );
        }

        prompt.push_str(&Self::memory_sections(memory));

        if let Some(feedback) = retry_feedback {
            prompt.push_str(&format!(
                "## Correction required\nYour previous response was rejected:\n{feedback}\n\
                 Produce a corrected response.\n\n"
            ));
        }

        prompt.push_str(&format!("## Player action\n{player_action}\n\n"));
        prompt.push_str(DIRECTOR_CONTRACT);
        prompt
    }

    /// Prompt for asynchronously generating a conclusion when an ending
    /// has no authored sketch.
    pub fn conclusion_prompt(story: &Story, state: &SessionState, ending_id: &str) -> String {
        let mut prompt = String::new();
        prompt.push_str(
            "Write the concluding passage of an interactive story. The player has \
             reached an ending that has no authored text; compose a satisfying \
             conclusion from the state of the story below. Respond with prose only, \
             no JSON.\n\n",
        );
        prompt.push_str(&format!("## Story\n{}\n\n", story.title));
        prompt.push_str(&format!("## Ending reached\n{ending_id}\n\n"));
        prompt.push_str(&Self::scene_section(story, state));
        prompt.push_str("\n\n");
        prompt.push_str(&Self::state_section(state));
        prompt
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
