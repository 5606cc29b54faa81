//! DialogueEngine - walks a script graph and drives the conversation.
//!
//! The engine owns the [`NarrativeStore`] and the currently loaded
//! [`ScriptGraph`]. A walk starts at a node and processes successors until
//! it reaches a choice, a part end, a missing node or the end of the script.
//! Each delivered message is preceded by a simulated typing/recording pause
//! and followed by a reading pause. A node's actions run after that pause,
//! and the saved position always names the next node still to be processed.

use crate::config::EngineConfig;
use crate::cues::{Cue, CuePlayer, SilentCues};
use crate::events::{ChoiceOutcome, EngineEvent, Halt, WalkOutcome};
use crate::interrupt::InterruptHook;
use crate::loader::{LoadError, ScriptId, ScriptSource};
use crate::pacing::Pacer;
use crate::persist::{PersistError, SaveStore};
use crate::script::{substitute_name, Action, MessageKind, NodeKind, ScriptGraph, ScriptNode, Sender};
use crate::state::{ChatMessage, Indicator, NarrativeStore, PendingChoice};
use crate::variables::StoryVariables;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Errors from engine operations.
///
/// Walks themselves never fail: a missing node or a failed save is logged and
/// reported through [`Halt`] instead.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Script load failed: {0}")]
    Load(#[from] LoadError),

    #[error("Persistence failed: {0}")]
    Persist(#[from] PersistError),
}

/// The dialogue engine.
pub struct DialogueEngine {
    config: EngineConfig,
    pacer: Pacer,
    store: NarrativeStore,
    scripts: Arc<dyn ScriptSource>,
    cues: Arc<dyn CuePlayer>,
    interrupts: Vec<Box<dyn InterruptHook>>,
    graph: Option<ScriptGraph>,
    events: Option<mpsc::UnboundedSender<EngineEvent>>,
}

impl DialogueEngine {
    /// Create an engine reading scripts from `scripts` and saving to `saves`.
    pub fn new(
        config: EngineConfig,
        scripts: Arc<dyn ScriptSource>,
        saves: Arc<dyn SaveStore>,
    ) -> Self {
        let store = NarrativeStore::new(config.variables.clone(), saves)
            .with_keys(config.save_keys.clone());

        Self {
            pacer: Pacer::new(config.pacing.clone()),
            config,
            store,
            scripts,
            cues: Arc::new(SilentCues),
            interrupts: Vec::new(),
            graph: None,
            events: None,
        }
    }

    /// Play sound cues through `cues`.
    pub fn with_cues(mut self, cues: Arc<dyn CuePlayer>) -> Self {
        self.cues = cues;
        self
    }

    /// Register an interrupt evaluated after every choice impact.
    pub fn with_interrupt(mut self, hook: impl InterruptHook + 'static) -> Self {
        self.interrupts.push(Box::new(hook));
        self
    }

    /// Receive engine events. Replaces any previous subscriber.
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<EngineEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.events = Some(tx);
        rx
    }

    // =========================================================================
    // Observers
    // =========================================================================

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &NarrativeStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut NarrativeStore {
        &mut self.store
    }

    /// The currently loaded graph, if any.
    pub fn graph(&self) -> Option<&ScriptGraph> {
        self.graph.as_ref()
    }

    pub fn is_processing(&self) -> bool {
        self.store.is_processing()
    }

    pub fn is_waiting_for_choice(&self) -> bool {
        self.store.is_waiting_for_choice()
    }

    pub fn choices(&self) -> &[PendingChoice] {
        self.store.choices()
    }

    /// Replace the name token in `text` with the player's name.
    pub fn personalize(&self, text: &str) -> String {
        substitute_name(text, &self.config.name_token, self.store.player_name())
    }

    // =========================================================================
    // Loading and entry points
    // =========================================================================

    /// Load a chapter part as the active graph.
    ///
    /// On failure the active graph and position are left untouched.
    pub async fn load_part(&mut self, chapter: u32, part: u32) -> Result<(), EngineError> {
        let id = ScriptId::part(chapter, part);
        let graph = self.fetch(&id).await?;
        self.install_part(graph);
        info!(%id, "part loaded");
        Ok(())
    }

    /// Load a named script, e.g. the one an interrupt jumps into.
    pub async fn load_named(&mut self, name: &str) -> Result<(), EngineError> {
        let id = ScriptId::named(name);
        let graph = self.fetch(&id).await?;
        self.graph = Some(graph);
        self.store.set_active_script(Some(name.to_string()));
        info!(%id, "script loaded");
        Ok(())
    }

    /// Load a chapter part and walk it from its entry node.
    pub async fn start_chapter(&mut self, chapter: u32, part: u32) -> Result<WalkOutcome, EngineError> {
        if self.store.is_processing() {
            return Ok(WalkOutcome::AlreadyRunning);
        }
        self.load_part(chapter, part).await?;
        self.store.set_position(chapter, part);
        self.store.set_part_intro_pending(false);
        self.store.set_game_started(true);

        let entry = self.entry_id();
        info!(chapter, part, entry = %entry, "starting chapter");
        Ok(self.advance(&entry, false).await)
    }

    /// Load a chapter part and continue from `node`, if given.
    pub async fn resume_from_node(
        &mut self,
        chapter: u32,
        part: u32,
        node: Option<&str>,
    ) -> Result<Option<WalkOutcome>, EngineError> {
        if self.store.is_processing() {
            return Ok(Some(WalkOutcome::AlreadyRunning));
        }
        self.load_part(chapter, part).await?;
        self.store.set_position(chapter, part);

        let Some(node) = node else {
            debug!(chapter, part, "resumed without a node");
            return Ok(None);
        };
        info!(chapter, part, node, "resuming");
        Ok(Some(self.advance(node, false).await))
    }

    /// Restore the player name and saved progress, then continue the walk.
    ///
    /// Returns `Ok(None)` when there was nothing to continue: no save, a save
    /// without a position, or a part waiting to be entered with
    /// [`begin_pending_part`](Self::begin_pending_part). A malformed save is
    /// logged and treated as no save.
    pub async fn resume_saved(&mut self) -> Result<Option<WalkOutcome>, EngineError> {
        if self.store.is_processing() {
            return Ok(Some(WalkOutcome::AlreadyRunning));
        }
        if let Err(e) = self.store.load_player_name().await {
            warn!(error = %e, "failed to load player name");
        }

        match self.store.load_progress().await {
            Ok(true) => {}
            Ok(false) => return Ok(None),
            Err(e) => {
                warn!(error = %e, "ignoring unreadable save");
                return Ok(None);
            }
        }

        let node = self.store.current_node().map(str::to_string);
        if let Some(script) = self.store.active_script().map(str::to_string) {
            self.load_named(&script).await?;
            return Ok(match node {
                Some(node) => Some(self.advance(&node, false).await),
                None => None,
            });
        }

        let (chapter, part) = (self.store.chapter(), self.store.part());
        self.resume_from_node(chapter, part, node.as_deref()).await
    }

    /// Enter the part a part-end node announced.
    ///
    /// Returns `None` if no part is waiting to be entered.
    pub async fn begin_pending_part(&mut self) -> Option<WalkOutcome> {
        if !self.store.part_intro_pending() {
            return None;
        }
        if self.store.is_processing() {
            return Some(WalkOutcome::AlreadyRunning);
        }
        self.store.set_part_intro_pending(false);

        let entry = self.entry_id();
        info!(chapter = self.store.chapter(), part = self.store.part(), "entering part");
        Some(self.advance(&entry, false).await)
    }

    /// Clear the transient engine flags, keeping durable state.
    pub fn reset_engine(&mut self) {
        self.store.clear_engine_flags();
    }

    /// Wipe all state and both save slots, and unload the graph.
    pub async fn reset_game(&mut self) -> Result<(), EngineError> {
        self.graph = None;
        self.store.reset().await?;
        Ok(())
    }

    // =========================================================================
    // Walking
    // =========================================================================

    /// Walk from `start` until the script halts.
    ///
    /// If a walk is already in progress this is a no-op unless `force` is
    /// set, in which case pending choices and indicators are cleared first.
    pub async fn advance(&mut self, start: &str, force: bool) -> WalkOutcome {
        if self.store.is_processing() && !force {
            debug!(node = start, "walk in progress, ignoring advance");
            return WalkOutcome::AlreadyRunning;
        }
        if force {
            self.store.clear_choices();
            self.set_indicator(Indicator::Idle);
        }

        let mut guard = WalkGuard::begin(self);
        let halt = guard.walk(start.to_string()).await;
        drop(guard);

        debug!(?halt, "walk halted");
        self.emit(EngineEvent::WalkHalted(halt.clone()));
        WalkOutcome::Halted(halt)
    }

    async fn walk(&mut self, start: String) -> Halt {
        let mut next = Some(start);

        while let Some(id) = next.take() {
            let Some(node) = self.graph.as_ref().and_then(|g| g.get(&id)) else {
                warn!(node = %id, "node not found, stopping walk");
                return Halt::MissingNode(id);
            };
            self.store.set_current_node(Some(id));

            next = match node.kind {
                NodeKind::PartEnd => return self.end_part(&node).await,
                NodeKind::Choice => {
                    self.present_choices(&node);
                    return Halt::AwaitingChoice;
                }
                NodeKind::TypingFake => self.fake_typing(&node).await,
                _ => self.deliver(&node).await,
            };
        }

        Halt::EndOfScript
    }

    async fn end_part(&mut self, node: &ScriptNode) -> Halt {
        self.store.set_current_node(None);

        let mut title = None;
        if let Some(next_part) = node.next_part {
            let chapter = self.store.chapter();
            self.store.set_part(next_part);

            match self.fetch(&ScriptId::part(chapter, next_part)).await {
                Ok(graph) => {
                    self.install_part(graph);
                    self.store.set_part_intro_pending(true);
                    title = self.store.part_title().map(str::to_string);
                }
                Err(e) => warn!(chapter, part = next_part, error = %e, "failed to load next part"),
            }
        }

        self.persist().await;
        info!(next_part = ?node.next_part, "part ended");
        self.emit(EngineEvent::PartEnded {
            next_part: node.next_part,
            title,
        });
        Halt::PartEnd {
            next_part: node.next_part,
        }
    }

    fn present_choices(&mut self, node: &ScriptNode) {
        let choices: Vec<PendingChoice> = node
            .choices
            .iter()
            .map(|choice| PendingChoice {
                text: self.personalize(&choice.text),
                ..choice.clone()
            })
            .collect();

        debug!(node = %node.id, count = choices.len(), "presenting choices");
        self.store.present_choices(choices.clone());
        self.emit(EngineEvent::ChoicesPresented(choices));
    }

    async fn fake_typing(&mut self, node: &ScriptNode) -> Option<String> {
        let cycles = node
            .typing_cycles
            .filter(|&n| n > 0)
            .unwrap_or(self.config.default_typing_cycles);

        for cycle in 0..cycles {
            self.set_indicator(Indicator::Typing(node.sender.clone()));
            self.cues.play(Cue::Typing);
            self.pause(self.pacer.fake_typing()).await;
            self.set_indicator(Indicator::Idle);

            if cycle + 1 < cycles {
                self.pause(self.pacer.fake_typing_pause()).await;
            }
        }

        self.execute_actions(&node.actions);
        let next = node.next_id.clone();
        self.store.set_current_node(next.clone());
        self.persist().await;
        next
    }

    async fn deliver(&mut self, node: &ScriptNode) -> Option<String> {
        if self.store.last_was_player_choice() && node.sender.is_npc() {
            self.simulate_reading().await;
        }

        match &node.sender {
            Sender::Npc(_) => {
                let delay = self.pacer.smart_delay(node);
                if !delay.is_zero() {
                    let indicator = if node.kind == NodeKind::Audio {
                        Indicator::Recording(node.sender.clone())
                    } else {
                        Indicator::Typing(node.sender.clone())
                    };
                    self.set_indicator(indicator);
                    self.cues.play(Cue::Typing);
                    self.pause(delay).await;
                    self.set_indicator(Indicator::Idle);
                }
            }
            Sender::System => self.pause(self.pacer.system_pause(node)).await,
            Sender::Player => {}
        }

        let message = ChatMessage::new(
            node.id.clone(),
            node.sender.clone(),
            node.kind.message_kind(),
            self.personalize(&node.content),
        );
        self.store.append_message(message.clone());
        self.emit(EngineEvent::MessageDelivered(message));
        if node.sender != Sender::Player {
            self.cues.play(Cue::Receive);
        }

        // Until the save below, the last save still names this node, so a
        // walk cut short during the read wait replays it on resume.
        if node.has_successor() {
            self.pause(self.pacer.auto_read(node)).await;
        }

        self.execute_actions(&node.actions);
        let next = node.resolve_next(self.store.variables());
        self.store.set_current_node(next.clone());
        self.persist().await;
        next
    }

    async fn simulate_reading(&mut self) {
        self.set_indicator(Indicator::Reading);
        self.pause(self.pacer.reading()).await;

        if let Some(id) = self.store.mark_last_player_message_read() {
            self.emit(EngineEvent::MessageRead { id });
        }
        self.set_indicator(Indicator::Idle);

        self.pause(self.pacer.thinking()).await;
        self.store.set_last_was_player_choice(false);
    }

    fn execute_actions(&mut self, actions: &[Action]) {
        for action in actions {
            match action {
                Action::Set { variable, value } => {
                    if !self.store.update_variable(variable, value.clone()) {
                        debug!(variable = %variable, %value, "ignoring set of undeclared or mistyped variable");
                    }
                }
                Action::SetNpcStatus { value } => self.store.set_npc_connected(*value),
                Action::SetBlocked { value } => self.store.set_blocked(*value),
                Action::Unknown => debug!("skipping unknown action"),
            }
        }
    }

    // =========================================================================
    // Choices
    // =========================================================================

    /// Select the pending option at `index` and continue the story.
    pub async fn submit_choice(&mut self, index: usize) -> ChoiceOutcome {
        if !self.store.is_waiting_for_choice() {
            debug!(index, "no choice pending");
            return ChoiceOutcome::NotWaiting;
        }
        let Some(choice) = self.store.choices().get(index).cloned() else {
            debug!(index, available = self.store.choices().len(), "choice index out of range");
            return ChoiceOutcome::InvalidIndex(index);
        };
        self.store.set_waiting_for_choice(false);

        let message = ChatMessage::new(
            format!("player_{}", Uuid::new_v4().simple()),
            Sender::Player,
            MessageKind::Text,
            choice.text.clone(),
        );
        self.store.append_message(message.clone());
        self.emit(EngineEvent::MessageDelivered(message));
        self.cues.play(Cue::Send);

        let before = self.store.variables().clone();
        self.store.apply_impact(&choice.impact);
        self.store.set_last_was_player_choice(true);
        self.store.clear_choices();
        info!(index, text = %choice.text, "choice submitted");

        if let Some(script) = self.check_interrupts(&before) {
            if let Some(walk) = self.enter_interrupt(&script).await {
                return ChoiceOutcome::Interrupted { script, walk };
            }
        }

        self.store.set_current_node(choice.next_id.clone());
        self.persist().await;

        let walk = match &choice.next_id {
            Some(next) => Some(self.advance(next, true).await),
            None => None,
        };
        ChoiceOutcome::Accepted { walk }
    }

    fn check_interrupts(&self, before: &StoryVariables) -> Option<String> {
        let after = self.store.variables();
        self.interrupts
            .iter()
            .find_map(|hook| hook.check(before, after))
    }

    /// Jump into a named script. `None` if it could not be loaded.
    async fn enter_interrupt(&mut self, script: &str) -> Option<WalkOutcome> {
        if let Err(e) = self.load_named(script).await {
            warn!(script, error = %e, "failed to load interrupt script, continuing");
            return None;
        }
        info!(script, "interrupt triggered");

        let entry = self.entry_id();
        self.store.set_current_node(Some(entry.clone()));
        self.persist().await;
        Some(self.advance(&entry, true).await)
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    async fn fetch(&self, id: &ScriptId) -> Result<ScriptGraph, LoadError> {
        let document = self.scripts.load(id).await.map_err(|e| {
            warn!(%id, error = %e, "script load failed");
            e
        })?;
        Ok(ScriptGraph::from_document(document))
    }

    fn install_part(&mut self, graph: ScriptGraph) {
        self.store.set_part_title(graph.title().map(str::to_string));
        self.store.set_active_script(None);
        self.graph = Some(graph);
    }

    fn entry_id(&self) -> String {
        let preferred = self.config.entry_node.as_str();
        self.graph
            .as_ref()
            .and_then(|g| g.entry_id(preferred))
            .unwrap_or(preferred)
            .to_string()
    }

    fn set_indicator(&mut self, indicator: Indicator) {
        if self.store.indicator() == &indicator {
            return;
        }
        self.store.set_indicator(indicator.clone());
        self.emit(EngineEvent::Indicator(indicator));
    }

    fn emit(&self, event: EngineEvent) {
        if let Some(tx) = &self.events {
            // A dropped receiver only means nobody is watching
            let _ = tx.send(event);
        }
    }

    async fn pause(&self, duration: Duration) {
        let scaled = self.pacer.scale(duration);
        if !scaled.is_zero() {
            tokio::time::sleep(scaled).await;
        }
    }

    /// Save progress. Failures are logged and the walk continues.
    async fn persist(&self) {
        if let Err(e) = self.store.save_progress().await {
            warn!(error = %e, "failed to save progress");
        }
    }
}

/// Holds the processing flag for the duration of a walk.
///
/// Dropping the guard, including when the walk future itself is dropped
/// mid-pause, clears the flag and hides any indicator.
struct WalkGuard<'a> {
    engine: &'a mut DialogueEngine,
}

impl<'a> WalkGuard<'a> {
    fn begin(engine: &'a mut DialogueEngine) -> Self {
        engine.store.set_processing(true);
        Self { engine }
    }
}

impl Deref for WalkGuard<'_> {
    type Target = DialogueEngine;

    fn deref(&self) -> &DialogueEngine {
        self.engine
    }
}

impl DerefMut for WalkGuard<'_> {
    fn deref_mut(&mut self) -> &mut DialogueEngine {
        self.engine
    }
}

impl Drop for WalkGuard<'_> {
    fn drop(&mut self) {
        self.engine.store.set_processing(false);
        self.engine.set_indicator(Indicator::Idle);
    }
}
