//! Testing utilities for the dialogue engine.
//!
//! This module provides tools for integration testing:
//! - `RecordingCues` to observe which sound cues fired
//! - `TestHarness` for scripted conversation scenarios over in-memory
//!   scripts and saves, with pacing disabled
//! - Assertion helpers for verifying narrative state

use crate::config::EngineConfig;
use crate::cues::{Cue, CuePlayer};
use crate::engine::{DialogueEngine, EngineError};
use crate::events::{ChoiceOutcome, EngineEvent, WalkOutcome};
use crate::interrupt::InterruptHook;
use crate::loader::StaticScriptSource;
use crate::pacing::PacingConfig;
use crate::persist::{MemorySaveStore, SavedProgress};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// A cue player that remembers every cue it was asked to play.
#[derive(Debug, Default)]
pub struct RecordingCues {
    played: Mutex<Vec<Cue>>,
}

impl RecordingCues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cues played so far, in order.
    pub fn played(&self) -> Vec<Cue> {
        self.played.lock().map(|p| p.clone()).unwrap_or_default()
    }

    pub fn count(&self, cue: Cue) -> usize {
        self.played().into_iter().filter(|c| *c == cue).count()
    }
}

impl CuePlayer for RecordingCues {
    fn play(&self, cue: Cue) {
        if let Ok(mut played) = self.played.lock() {
            played.push(cue);
        }
    }
}

/// Test harness for running conversation scenarios.
pub struct TestHarness {
    /// The engine under test.
    pub engine: DialogueEngine,
    /// Save slots shared with the engine.
    pub saves: Arc<MemorySaveStore>,
    /// Cues the engine played.
    pub cues: Arc<RecordingCues>,
    scripts: Arc<StaticScriptSource>,
    config: EngineConfig,
    events: mpsc::UnboundedReceiver<EngineEvent>,
}

impl TestHarness {
    /// Create a harness over `scripts` with pacing disabled.
    pub fn new(scripts: StaticScriptSource) -> Self {
        Self::with_config(
            scripts,
            EngineConfig::new().with_pacing(PacingConfig::instant()),
        )
    }

    /// Create a harness with a custom configuration.
    pub fn with_config(scripts: StaticScriptSource, config: EngineConfig) -> Self {
        Self::assemble(
            Arc::new(scripts),
            Arc::new(MemorySaveStore::new()),
            config,
        )
    }

    fn assemble(
        scripts: Arc<StaticScriptSource>,
        saves: Arc<MemorySaveStore>,
        config: EngineConfig,
    ) -> Self {
        let cues = Arc::new(RecordingCues::new());
        let mut engine = DialogueEngine::new(config.clone(), scripts.clone(), saves.clone())
            .with_cues(cues.clone());
        let events = engine.subscribe();

        Self {
            engine,
            saves,
            cues,
            scripts,
            config,
            events,
        }
    }

    /// Register an interrupt hook.
    pub fn with_interrupt(mut self, hook: impl InterruptHook + 'static) -> Self {
        self.engine = self.engine.with_interrupt(hook);
        self
    }

    /// A fresh engine over the same scripts and save slots, as after an app
    /// restart. Interrupt hooks are not carried over.
    pub fn reopen(&self) -> Self {
        Self::assemble(self.scripts.clone(), self.saves.clone(), self.config.clone())
    }

    /// Start a chapter part.
    pub async fn start(&mut self, chapter: u32, part: u32) -> Result<WalkOutcome, EngineError> {
        self.engine.start_chapter(chapter, part).await
    }

    /// Select the choice at `index`.
    pub async fn choose(&mut self, index: usize) -> ChoiceOutcome {
        self.engine.submit_choice(index).await
    }

    /// Events emitted since the last call.
    pub fn drain_events(&mut self) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }

    /// Content of every chat message, in order.
    pub fn transcript(&self) -> Vec<String> {
        self.engine
            .store()
            .chat_history()
            .iter()
            .map(|m| m.content.clone())
            .collect()
    }

    /// Ids of every chat message, in order.
    pub fn message_ids(&self) -> Vec<String> {
        self.engine
            .store()
            .chat_history()
            .iter()
            .map(|m| m.id.clone())
            .collect()
    }

    /// Content of the last chat message.
    pub fn last_message(&self) -> Option<&str> {
        self.engine
            .store()
            .chat_history()
            .last()
            .map(|m| m.content.as_str())
    }

    /// Text of the pending choices.
    pub fn choice_texts(&self) -> Vec<String> {
        self.engine
            .choices()
            .iter()
            .map(|c| c.text.clone())
            .collect()
    }

    pub fn variable(&self, name: &str) -> Option<f64> {
        self.engine.store().variables().number(name)
    }

    /// The persisted progress record, if one was written.
    pub fn saved_progress(&self) -> Option<SavedProgress> {
        let json = self.saves.slot(&self.config.save_keys.progress)?;
        SavedProgress::from_json(&json).ok()
    }
}

// ============================================================================
// Assertion Helpers
// ============================================================================

/// Assert the engine is waiting for a choice.
#[track_caller]
pub fn assert_waiting_for_choice(harness: &TestHarness) {
    assert!(
        harness.engine.is_waiting_for_choice(),
        "Expected the engine to wait for a choice"
    );
}

/// Assert the engine is NOT waiting for a choice.
#[track_caller]
pub fn assert_not_waiting(harness: &TestHarness) {
    assert!(
        !harness.engine.is_waiting_for_choice(),
        "Expected no pending choice, got {:?}",
        harness.choice_texts()
    );
}

/// Assert the pending choices have exactly these texts.
#[track_caller]
pub fn assert_choices(harness: &TestHarness, expected: &[&str]) {
    let actual = harness.choice_texts();
    assert_eq!(actual, expected, "Expected choices {expected:?}, got {actual:?}");
}

/// Assert the last chat message has this content.
#[track_caller]
pub fn assert_last_message(harness: &TestHarness, content: &str) {
    let last = harness.last_message();
    assert_eq!(
        last,
        Some(content),
        "Expected last message '{content}', got {last:?}"
    );
}

/// Assert a numeric story variable has this value.
#[track_caller]
pub fn assert_variable(harness: &TestHarness, name: &str, value: f64) {
    let actual = harness.variable(name);
    assert_eq!(
        actual,
        Some(value),
        "Expected {name} = {value}, got {actual:?}"
    );
}
