//! Turn-loop behavior: the continue baseline, transition firing,
//! discovery-verb enforcement, and error collapse.

mod common;

use common::*;
use tw_domain::events::EngineEvent;

#[tokio::test]
async fn continue_baseline_leaves_state_untouched() {
    let (session, client, sink) = scripted_session(
        kitchen_story(),
        &[
            &classifier_continue(),
            &director_narrative("Pots and pans hang in silence. Nothing stirs."),
        ],
    );
    let engine = session.engine();

    let response = engine.process_input("look around the kitchen").await;

    assert!(response.error.is_none());
    assert!(response.text.contains("Nothing stirs"));
    let state = engine.state_snapshot();
    assert_eq!(state.current_scene_id, "kitchen");
    assert!(state.inventory.is_empty());
    assert!(state.flags.is_empty());
    assert_eq!(client.remaining(), 0);

    // Exactly one narrative per accepted turn, typing bracketed around it.
    assert_eq!(sink.narratives().len(), 1);
    assert_eq!(
        sink.count(|e| matches!(e, EngineEvent::TypingStarted)),
        1
    );
    assert_eq!(sink.count(|e| matches!(e, EngineEvent::TypingEnded)), 1);
}

#[tokio::test]
async fn transition_fires_and_enters_target_scene() {
    let (session, client, sink) = scripted_session(
        kitchen_story(),
        &[
            &classifier_transition(0),
            &director_narrative(
                "You swing the fridge door wide. Cold blue light washes over you as \
                 the shelves of forgotten leftovers come into view.",
            ),
        ],
    );
    let engine = session.engine();

    let response = engine.process_input("open the fridge").await;

    assert!(response.error.is_none());
    let state = engine.state_snapshot();
    assert_eq!(state.current_scene_id, "fridge_interior");

    // The director prompt carried the transition sketch as weaving material.
    let prompts = client.prompts.lock();
    let director_prompt = &prompts[1];
    assert!(director_prompt.contains("Cold blue light washes over the tiles."));
    assert!(director_prompt.contains("do not paste it verbatim"));

    assert_eq!(sink.narratives().len(), 1);
}

#[tokio::test]
async fn discovery_input_with_sneaky_add_is_rejected_then_retried() {
    let (session, client, _sink) = scripted_session(
        study_story(),
        &[
            &classifier_continue(),
            // Malicious first attempt: examining must not acquire.
            &director_with_signals(
                "You grab the brass key from the desk drawer.",
                serde_json::json!({ "add": ["brass_key"] }),
            ),
            // Corrected retry.
            &director_narrative(
                "Among the papers you spot a brass key resting in the drawer, \
                 within easy reach.",
            ),
        ],
    );
    let engine = session.engine();

    let response = engine.process_input("examine the desk").await;

    assert!(response.error.is_none(), "retry should have cleared issues");
    assert!(response.text.contains("brass key"));
    // Inventory unchanged: the discovery-verb invariant held.
    assert!(engine.state_snapshot().inventory.is_empty());

    // The retry prompt carried validator feedback.
    let prompts = client.prompts.lock();
    assert_eq!(prompts.len(), 3);
    assert!(prompts[2].contains("Correction required"));
    assert!(prompts[2].contains("inventory"));
}

#[tokio::test]
async fn failed_retry_applies_only_validated_subset() {
    let (session, _client, _sink) = scripted_session(
        study_story(),
        &[
            &classifier_continue(),
            &director_with_signals(
                "You grab the key.",
                serde_json::json!({ "add": ["brass_key"], "setFlags": ["saw_desk"] }),
            ),
            // Retry doubles down.
            &director_with_signals(
                "You still grab the key.",
                serde_json::json!({ "add": ["brass_key"], "setFlags": ["saw_desk"] }),
            ),
        ],
    );
    let engine = session.engine();

    let response = engine.process_input("examine the desk").await;

    // Turn degrades rather than fails; valid flag applies, bad add does not.
    assert_eq!(response.error.as_deref(), Some("validation"));
    let state = engine.state_snapshot();
    assert!(state.inventory.is_empty());
    assert!(state.flag_is_set("saw_desk"));
}

#[tokio::test]
async fn acquisition_after_examination_is_allowed() {
    let (session, _client, _sink) = scripted_session(
        study_story(),
        &[
            // Turn 1: examine the desk.
            &classifier_continue(),
            &director_narrative("The desk drawer slides open; a brass key glints inside."),
            // Turn 2: take the key.
            &classifier_continue(),
            &director_with_signals(
                "You take the brass key.",
                serde_json::json!({ "add": ["brass_key"] }),
            ),
        ],
    );
    let engine = session.engine();

    engine.process_input("examine the desk").await;
    let response = engine.process_input("take the key").await;

    assert!(response.error.is_none());
    assert_eq!(engine.state_snapshot().inventory, vec!["brass_key"]);
}

#[tokio::test]
async fn provider_failure_surfaces_without_state_change() {
    // Script exhausted immediately -> classifier call errors.
    let (session, _client, sink) = scripted_session(kitchen_story(), &[]);
    let engine = session.engine();

    let response = engine.process_input("open the fridge").await;

    assert!(response.error.is_some());
    assert_eq!(engine.state_snapshot().current_scene_id, "kitchen");
    assert_eq!(sink.narratives().len(), 0);
    assert_eq!(sink.count(|e| matches!(e, EngineEvent::Error { .. })), 1);
    // Memory untouched: failed turns are not remembered.
    assert!(engine.memory().recent().is_empty());
}

#[tokio::test]
async fn cancelled_turn_is_benign() {
    let (session, _client, sink) = scripted_session(kitchen_story(), &[BLOCK]);
    let engine = session.engine().clone();
    let gateway = session.gateway().clone();

    let turn = tokio::spawn({
        let engine = engine.clone();
        async move { engine.process_input("open the fridge").await }
    });
    tokio::task::yield_now().await;
    gateway.cancel_all();

    let response = turn.await.unwrap();
    assert_eq!(response.error.as_deref(), Some("cancelled"));
    assert_eq!(response.text, "(cancelled)");
    // No state change, no error event for a cancellation.
    assert_eq!(engine.state_snapshot().current_scene_id, "kitchen");
    assert_eq!(sink.count(|e| matches!(e, EngineEvent::Error { .. })), 0);
}

#[tokio::test]
async fn turns_are_remembered_in_order() {
    let (session, _client, _sink) = scripted_session(
        kitchen_story(),
        &[
            &classifier_continue(),
            &director_narrative("First reply."),
            &classifier_continue(),
            &director_narrative("Second reply."),
        ],
    );
    let engine = session.engine();

    engine.process_input("first action").await;
    engine.process_input("second action").await;

    let recent = engine.memory().recent();
    assert_eq!(recent.len(), 2);
    assert_eq!(recent[0].player_input, "first action");
    assert_eq!(recent[0].director_response, "First reply.");
    assert_eq!(recent[1].player_input, "second action");
}

#[tokio::test]
async fn unparseable_director_output_becomes_fallback_not_raw_json() {
    let (session, _client, _sink) = scripted_session(
        kitchen_story(),
        &[
            &classifier_continue(),
            "narrative: the model forgot the braces entirely",
        ],
    );
    let engine = session.engine();

    let response = engine.process_input("look").await;

    assert!(response.error.is_none());
    assert!(response.text.contains("trouble understanding"));
    assert!(!response.text.contains('{'));
}
