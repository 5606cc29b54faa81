//! QA tests for walking conversations end to end.
//!
//! These run entirely in memory with pacing disabled, except the timing
//! tests which use tokio's paused clock to measure virtual elapsed time.

use chatnovel_core::testing::{
    assert_choices, assert_last_message, assert_not_waiting, assert_variable,
    assert_waiting_for_choice, TestHarness,
};
use chatnovel_core::{
    ChoiceOutcome, Cue, EngineConfig, EngineEvent, Halt, Indicator, ScriptId, Sender,
    StaticScriptSource, StoryValue, ThresholdInterrupt, WalkOutcome,
};
use std::time::Duration;

fn harness_with(scripts: &[(ScriptId, &str)]) -> TestHarness {
    let source = scripts
        .iter()
        .fold(StaticScriptSource::new(), |source, (id, json)| {
            source.with_json(id.clone(), *json)
        });
    TestHarness::new(source)
}

const GREETING: &str = r#"{
    "title": "First Contact",
    "nodes": [
        { "id": "start", "sender": "valeria", "content": "Hi {{name}}", "nextId": "c1" },
        { "id": "c1", "type": "choice", "choices": [
            { "text": "Hey, nice to meet you", "nextId": "warm", "impact": { "valeria_affection": 10 } },
            { "text": "Who gave you my number?", "nextId": "cold", "impact": { "valeria_affection": -10 } }
        ]},
        { "id": "warm", "sender": "valeria", "content": "Likewise!" },
        { "id": "cold", "sender": "valeria", "content": "Rude." }
    ]
}"#;

// =============================================================================
// Greeting scenario
// =============================================================================

#[tokio::test]
async fn test_greeting_scenario_with_player_name() {
    let mut harness = harness_with(&[(ScriptId::part(1, 1), GREETING)]);
    harness.engine.store_mut().set_player_name("Ava").await.unwrap();
    harness
        .engine
        .store_mut()
        .update_variable("valeria_affection", StoryValue::Number(50.0));

    let outcome = harness.start(1, 1).await.unwrap();

    assert_eq!(outcome, WalkOutcome::Halted(Halt::AwaitingChoice));
    assert_eq!(harness.transcript(), ["Hi Ava"]);
    assert_waiting_for_choice(&harness);
    assert!(!harness.engine.is_processing());
    assert_choices(&harness, &["Hey, nice to meet you", "Who gave you my number?"]);

    harness.choose(0).await;

    assert_eq!(harness.transcript(), ["Hi Ava", "Hey, nice to meet you", "Likewise!"]);
    assert_eq!(harness.engine.store().chat_history()[1].sender, Sender::Player);
    assert_variable(&harness, "valeria_affection", 60.0);
    assert_not_waiting(&harness);
}

#[tokio::test]
async fn test_part_title_visible_after_load() {
    let mut harness = harness_with(&[(ScriptId::part(1, 1), GREETING)]);
    harness.start(1, 1).await.unwrap();
    assert_eq!(harness.engine.store().part_title(), Some("First Contact"));
}

// =============================================================================
// Branching
// =============================================================================

const QUIZ: &str = r#"{
    "nodes": [
        { "id": "start", "sender": "system", "content": "Results are in.",
          "conditions": [
            { "variable": "quiz_points", "operator": ">=", "value": 10, "nextId": "A" },
            { "variable": "quiz_points", "operator": ">=", "value": 5, "nextId": "C" }
          ],
          "nextId": "B" },
        { "id": "A", "sender": "valeria", "content": "Top marks" },
        { "id": "B", "sender": "valeria", "content": "Try again" },
        { "id": "C", "sender": "valeria", "content": "Not bad" }
    ]
}"#;

#[tokio::test]
async fn test_condition_at_boundary_beats_next_id() {
    let mut harness = harness_with(&[(ScriptId::part(1, 1), QUIZ)]);
    harness
        .engine
        .store_mut()
        .update_variable("quiz_points", StoryValue::Number(10.0));

    harness.start(1, 1).await.unwrap();

    assert_eq!(harness.message_ids(), ["start", "A"]);
}

#[tokio::test]
async fn test_condition_order_first_match_wins() {
    let mut harness = harness_with(&[(ScriptId::part(1, 1), QUIZ)]);
    harness
        .engine
        .store_mut()
        .update_variable("quiz_points", StoryValue::Number(7.0));

    harness.start(1, 1).await.unwrap();
    assert_last_message(&harness, "Not bad");
}

#[tokio::test]
async fn test_no_condition_falls_back_to_next_id() {
    let mut harness = harness_with(&[(ScriptId::part(1, 1), QUIZ)]);
    harness.start(1, 1).await.unwrap();
    assert_last_message(&harness, "Try again");
}

#[tokio::test]
async fn test_set_action_feeds_later_conditions() {
    let script = r#"{
        "nodes": [
            { "id": "start", "sender": "system", "content": "...",
              "actions": [
                { "type": "set", "variable": "is_liar", "value": true },
                { "type": "teleport", "where": "nowhere" }
              ],
              "nextId": "check" },
            { "id": "check", "sender": "system", "content": "Verdict",
              "conditions": [ { "variable": "is_liar", "operator": "==", "value": true, "nextId": "liar" } ],
              "nextId": "honest" },
            { "id": "liar", "sender": "valeria", "content": "Liar" },
            { "id": "honest", "sender": "valeria", "content": "Honest" }
        ]
    }"#;
    let mut harness = harness_with(&[(ScriptId::part(1, 1), script)]);

    harness.start(1, 1).await.unwrap();

    assert_eq!(harness.engine.store().variables().flag("is_liar"), Some(true));
    assert_last_message(&harness, "Liar");
}

// =============================================================================
// Bounded variables
// =============================================================================

#[tokio::test]
async fn test_meters_stay_bounded_through_choices_and_actions() {
    let script = r#"{
        "nodes": [
            { "id": "start", "sender": "system", "content": "Go",
              "actions": [ { "type": "set", "variable": "tension", "value": 250 } ],
              "nextId": "c1" },
            { "id": "c1", "type": "choice", "choices": [
                { "text": "Push", "nextId": "c1", "impact": { "tension": 40, "valeria_affection": -70, "quiz_points": -3 } }
            ]}
        ]
    }"#;
    let mut harness = harness_with(&[(ScriptId::part(1, 1), script)]);
    harness.start(1, 1).await.unwrap();
    assert_variable(&harness, "tension", 100.0);

    for _ in 0..3 {
        harness.choose(0).await;
        let vars = harness.engine.store().variables();
        for meter in ["valeria_affection", "mistery_level", "tension"] {
            let value = vars.number(meter).unwrap();
            assert!((0.0..=100.0).contains(&value), "{meter} = {value}");
        }
    }

    assert_variable(&harness, "valeria_affection", 0.0);
    // Counters are unbounded
    assert_variable(&harness, "quiz_points", -9.0);
}

// =============================================================================
// Part boundaries
// =============================================================================

const PART_ONE: &str = r#"{
    "nodes": [
        { "id": "start", "sender": "valeria", "content": "Gotta go", "nextId": "end" },
        { "id": "end", "type": "part_end", "nextPart": 2 }
    ]
}"#;

const PART_TWO: &str = r#"{
    "title": "Later That Night",
    "nodes": [
        { "id": "start", "sender": "valeria", "content": "I'm back" }
    ]
}"#;

#[tokio::test]
async fn test_part_end_halts_without_message() {
    let mut harness = harness_with(&[
        (ScriptId::part(1, 1), PART_ONE),
        (ScriptId::part(1, 2), PART_TWO),
    ]);

    let outcome = harness.start(1, 1).await.unwrap();

    assert_eq!(outcome, WalkOutcome::Halted(Halt::PartEnd { next_part: Some(2) }));
    assert_eq!(harness.transcript(), ["Gotta go"]);
    assert_eq!(harness.engine.store().current_node(), None);
    assert!(!harness.engine.is_processing());
    assert!(harness.engine.store().part_intro_pending());

    let events = harness.drain_events();
    assert!(events.contains(&EngineEvent::PartEnded {
        next_part: Some(2),
        title: Some("Later That Night".to_string()),
    }));

    harness.engine.begin_pending_part().await;
    assert_last_message(&harness, "I'm back");
}

#[tokio::test]
async fn test_part_end_with_missing_next_part_does_not_set_intro() {
    let mut harness = harness_with(&[(ScriptId::part(1, 1), PART_ONE)]);

    harness.start(1, 1).await.unwrap();

    assert_eq!(harness.engine.store().part(), 2);
    assert!(!harness.engine.store().part_intro_pending());
    assert_eq!(harness.engine.begin_pending_part().await, None);
}

// =============================================================================
// Missing content
// =============================================================================

#[tokio::test]
async fn test_missing_chapter_leaves_graph_and_walk_untouched() {
    let mut harness = harness_with(&[(ScriptId::part(1, 1), GREETING)]);
    harness.start(1, 1).await.unwrap();
    let before = harness.transcript();

    assert!(harness.start(4, 2).await.is_err());

    assert!(harness.engine.graph().is_some_and(|g| g.contains("c1")));
    assert_eq!(harness.transcript(), before);
    assert_waiting_for_choice(&harness);
}

#[tokio::test]
async fn test_dangling_successor_halts_with_missing_node() {
    let script = r#"{ "nodes": [ { "id": "start", "sender": "valeria", "content": "hm", "nextId": "nowhere" } ] }"#;
    let mut harness = harness_with(&[(ScriptId::part(1, 1), script)]);

    let outcome = harness.start(1, 1).await.unwrap();

    assert_eq!(outcome, WalkOutcome::Halted(Halt::MissingNode("nowhere".to_string())));
    assert!(!harness.engine.is_processing());
    assert_eq!(
        harness.saved_progress().and_then(|p| p.current_node_id).as_deref(),
        Some("nowhere")
    );
}

#[tokio::test]
async fn test_entry_falls_back_to_first_node() {
    let script = r#"{ "nodes": [ { "id": "intro", "sender": "valeria", "content": "First" } ] }"#;
    let mut harness = harness_with(&[(ScriptId::part(1, 1), script)]);
    harness.start(1, 1).await.unwrap();
    assert_last_message(&harness, "First");
}

// =============================================================================
// Choices
// =============================================================================

#[tokio::test]
async fn test_out_of_range_choice_changes_nothing() {
    let mut harness = harness_with(&[(ScriptId::part(1, 1), GREETING)]);
    harness.start(1, 1).await.unwrap();
    let snapshot = harness.engine.store().snapshot();

    assert_eq!(harness.choose(2).await, ChoiceOutcome::InvalidIndex(2));

    assert_eq!(harness.engine.store().snapshot(), snapshot);
    assert_waiting_for_choice(&harness);
    assert_eq!(harness.choice_texts().len(), 2);
}

#[tokio::test]
async fn test_choice_without_successor_ends_walk() {
    let script = r#"{
        "nodes": [
            { "id": "start", "type": "choice", "choices": [ { "text": "Goodbye" } ] }
        ]
    }"#;
    let mut harness = harness_with(&[(ScriptId::part(1, 1), script)]);
    harness.start(1, 1).await.unwrap();

    assert_eq!(harness.choose(0).await, ChoiceOutcome::Accepted { walk: None });
    assert_eq!(harness.transcript(), ["Goodbye"]);
    assert_not_waiting(&harness);
}

#[tokio::test]
async fn test_player_message_marked_read_before_reply() {
    let mut harness = harness_with(&[(ScriptId::part(1, 1), GREETING)]);
    harness.start(1, 1).await.unwrap();
    harness.drain_events();

    harness.choose(1).await;

    let events = harness.drain_events();
    let read_at = events
        .iter()
        .position(|e| matches!(e, EngineEvent::MessageRead { .. }))
        .expect("player message marked read");
    let reading_at = events
        .iter()
        .position(|e| *e == EngineEvent::Indicator(Indicator::Reading))
        .expect("reading indicator shown");
    let reply_at = events
        .iter()
        .position(|e| matches!(e, EngineEvent::MessageDelivered(m) if m.content == "Rude."))
        .expect("reply delivered");

    assert!(reading_at < read_at && read_at < reply_at);
    assert!(harness.engine.store().chat_history()[1].read);
}

// =============================================================================
// Interrupts
// =============================================================================

const BLOCKED: &str = r#"{
    "nodes": [
        { "id": "start", "sender": "system", "content": "Valeria blocked you.",
          "actions": [ { "type": "setBlocked", "value": true }, { "type": "setNPCStatus", "value": false } ] }
    ]
}"#;

#[tokio::test]
async fn test_interrupt_fires_once_on_crossing() {
    let mut harness = harness_with(&[
        (ScriptId::part(1, 1), GREETING),
        (ScriptId::named("blocked"), BLOCKED),
    ])
    .with_interrupt(ThresholdInterrupt::new("valeria_affection", 0.0, "blocked"));
    harness
        .engine
        .store_mut()
        .update_variable("valeria_affection", StoryValue::Number(5.0));

    harness.start(1, 1).await.unwrap();
    let outcome = harness.choose(1).await;

    assert!(matches!(outcome, ChoiceOutcome::Interrupted { ref script, .. } if script == "blocked"));
    assert_last_message(&harness, "Valeria blocked you.");
    assert!(!harness.transcript().contains(&"Rude.".to_string()));
    assert!(harness.engine.store().blocked());
    assert!(!harness.engine.store().npc_connected());
}

#[tokio::test]
async fn test_interrupt_does_not_fire_when_already_at_threshold() {
    let mut harness = harness_with(&[
        (ScriptId::part(1, 1), GREETING),
        (ScriptId::named("blocked"), BLOCKED),
    ])
    .with_interrupt(ThresholdInterrupt::new("valeria_affection", 0.0, "blocked"));

    harness.start(1, 1).await.unwrap();
    let outcome = harness.choose(1).await;

    assert!(matches!(outcome, ChoiceOutcome::Accepted { .. }));
    assert_last_message(&harness, "Rude.");
    assert!(!harness.engine.store().blocked());
}

// =============================================================================
// Cues and fake typing
// =============================================================================

#[tokio::test]
async fn test_fake_typing_then_message() {
    let script = r#"{
        "nodes": [
            { "id": "start", "type": "typing_fake", "sender": "valeria", "nextId": "n2" },
            { "id": "n2", "sender": "valeria", "content": "Forget it" }
        ]
    }"#;
    let mut harness = harness_with(&[(ScriptId::part(1, 1), script)]);

    harness.start(1, 1).await.unwrap();

    assert_eq!(harness.transcript(), ["Forget it"]);
    // Three default bursts plus the real message
    assert_eq!(harness.cues.count(Cue::Typing), 4);
    assert_eq!(harness.cues.count(Cue::Receive), 1);
}

#[tokio::test]
async fn test_zero_typing_cycles_uses_default() {
    let script = r#"{
        "nodes": [
            { "id": "start", "type": "typing_fake", "sender": "valeria", "typingCycles": 0 }
        ]
    }"#;
    let mut harness = harness_with(&[(ScriptId::part(1, 1), script)]);

    harness.start(1, 1).await.unwrap();

    assert_eq!(harness.cues.count(Cue::Typing), 3);
    assert!(harness.transcript().is_empty());
}

#[tokio::test]
async fn test_audio_node_shows_recording_indicator() {
    let script = r#"{
        "nodes": [
            { "id": "start", "type": "audio", "sender": "valeria", "content": "voice_01.mp3" }
        ]
    }"#;
    let mut harness = harness_with(&[(ScriptId::part(1, 1), script)]);

    harness.start(1, 1).await.unwrap();

    let indicators: Vec<Indicator> = harness
        .drain_events()
        .into_iter()
        .filter_map(|event| match event {
            EngineEvent::Indicator(indicator) => Some(indicator),
            _ => None,
        })
        .collect();
    assert_eq!(
        indicators,
        [Indicator::Recording(Sender::from("valeria")), Indicator::Idle]
    );
    assert_eq!(harness.cues.count(Cue::Typing), 1);
    assert_eq!(harness.transcript(), ["voice_01.mp3"]);
}

#[tokio::test]
async fn test_system_and_player_nodes_skip_typing() {
    let script = r#"{
        "nodes": [
            { "id": "start", "sender": "system", "content": "Connected", "nextId": "p1" },
            { "id": "p1", "sender": "player", "content": "hello?" }
        ]
    }"#;
    let mut harness = harness_with(&[(ScriptId::part(1, 1), script)]);

    harness.start(1, 1).await.unwrap();

    assert_eq!(harness.cues.played(), [Cue::Receive]);
    assert!(!harness
        .drain_events()
        .iter()
        .any(|e| matches!(e, EngineEvent::Indicator(Indicator::Typing(_)))));
}

// =============================================================================
// Timing (paused clock)
// =============================================================================

const TIMED: &str = r#"{
    "nodes": [
        { "id": "start", "sender": "valeria", "content": "hi", "delay": 2000, "nextId": "n2" },
        { "id": "n2", "sender": "valeria", "content": "you there?", "delay": 1000, "nextId": "c1" },
        { "id": "c1", "type": "choice", "choices": [ { "text": "yes", "nextId": "n3" } ] },
        { "id": "n3", "sender": "valeria", "content": "good", "delay": 1000 }
    ]
}"#;

#[tokio::test(start_paused = true)]
async fn test_walk_elapsed_time_matches_pacing() {
    let mut harness = TestHarness::with_config(
        StaticScriptSource::new().with_json(ScriptId::part(1, 1), TIMED),
        EngineConfig::new(),
    );

    let started = tokio::time::Instant::now();
    harness.start(1, 1).await.unwrap();
    let elapsed = started.elapsed();

    // typing 2000 + read "hi" 1500..2000 + typing 1000 + read "you there?" 1500..2000
    assert!(elapsed >= Duration::from_millis(6000), "{elapsed:?}");
    assert!(elapsed < Duration::from_millis(7000), "{elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn test_reply_after_choice_includes_reading_pause() {
    let mut harness = TestHarness::with_config(
        StaticScriptSource::new().with_json(ScriptId::part(1, 1), TIMED),
        EngineConfig::new(),
    );
    harness.start(1, 1).await.unwrap();

    let started = tokio::time::Instant::now();
    harness.choose(0).await;
    let elapsed = started.elapsed();

    // reading 1000..3500 + thinking 500..2000 + typing 1000, no read wait at the end
    assert!(elapsed >= Duration::from_millis(2500), "{elapsed:?}");
    assert!(elapsed < Duration::from_millis(6500), "{elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn test_time_scale_shrinks_pauses() {
    let mut harness = TestHarness::with_config(
        StaticScriptSource::new().with_json(ScriptId::part(1, 1), TIMED),
        EngineConfig::new().with_time_scale(0.5),
    );

    let started = tokio::time::Instant::now();
    harness.start(1, 1).await.unwrap();
    let elapsed = started.elapsed();

    assert!(elapsed >= Duration::from_millis(3000), "{elapsed:?}");
    assert!(elapsed < Duration::from_millis(3500), "{elapsed:?}");
}
