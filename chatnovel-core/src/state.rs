//! Narrative state store.
//!
//! The store is the single owner of story variables, chat history, the
//! player's identity, the saved position and the engine's transient flags.
//! Fields are private; every mutation goes through a named method so that
//! clamping and persistence rules are enforced at the boundary.

use crate::persist::{default_view, PersistError, SaveKeys, SaveStore, SavedProgress};
use crate::script::{Choice, MessageKind, Sender};
use crate::variables::{StoryValue, StoryVariables, VariableSchema};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// A delivered chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub sender: Sender,
    #[serde(rename = "type", default)]
    pub kind: MessageKind,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub read: bool,
}

impl ChatMessage {
    /// A new unread message stamped with the current time.
    pub fn new(
        id: impl Into<String>,
        sender: Sender,
        kind: MessageKind,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            sender,
            kind,
            content: content.into(),
            timestamp: Utc::now(),
            read: false,
        }
    }
}

/// A choice option as presented to the player, with the name substituted.
pub type PendingChoice = Choice;

/// Presence indicator shown next to the conversation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Indicator {
    #[default]
    Idle,
    Typing(Sender),
    Recording(Sender),
    Reading,
}

/// Transient engine flags. Never persisted.
#[derive(Debug, Clone, Default)]
struct EngineFlags {
    processing: bool,
    waiting_for_choice: bool,
    choices: Vec<PendingChoice>,
    last_was_player_choice: bool,
    indicator: Indicator,
}

/// The narrative state store.
pub struct NarrativeStore {
    saves: Arc<dyn SaveStore>,
    keys: SaveKeys,

    player_name: String,
    game_started: bool,
    variables: StoryVariables,
    chat_history: Vec<ChatMessage>,

    current_node: Option<String>,
    current_view: String,
    chapter: u32,
    part: u32,
    part_title: Option<String>,
    active_script: Option<String>,
    part_intro_pending: bool,

    npc_connected: bool,
    blocked: bool,

    flags: EngineFlags,
}

impl NarrativeStore {
    /// Create a store at its defaults, persisting through `saves`.
    pub fn new(schema: VariableSchema, saves: Arc<dyn SaveStore>) -> Self {
        Self {
            saves,
            keys: SaveKeys::default(),
            player_name: String::new(),
            game_started: false,
            variables: StoryVariables::new(schema),
            chat_history: Vec::new(),
            current_node: None,
            current_view: default_view(),
            chapter: 1,
            part: 1,
            part_title: None,
            active_script: None,
            part_intro_pending: false,
            npc_connected: true,
            blocked: false,
            flags: EngineFlags::default(),
        }
    }

    /// Use custom slot names.
    pub fn with_keys(mut self, keys: SaveKeys) -> Self {
        self.keys = keys;
        self
    }

    // =========================================================================
    // Player
    // =========================================================================

    pub fn player_name(&self) -> &str {
        &self.player_name
    }

    /// Set the player's name (trimmed) and persist it to its own slot.
    pub async fn set_player_name(&mut self, name: &str) -> Result<(), PersistError> {
        self.player_name = name.trim().to_string();
        self.saves
            .set(&self.keys.player_name, &self.player_name)
            .await
    }

    /// Load the player's name. A stored name means a game was started.
    pub async fn load_player_name(&mut self) -> Result<bool, PersistError> {
        match self.saves.get(&self.keys.player_name).await? {
            Some(name) if !name.is_empty() => {
                self.player_name = name;
                self.game_started = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    pub fn game_started(&self) -> bool {
        self.game_started
    }

    pub fn set_game_started(&mut self, started: bool) {
        self.game_started = started;
    }

    // =========================================================================
    // Story variables
    // =========================================================================

    pub fn variables(&self) -> &StoryVariables {
        &self.variables
    }

    /// Set a declared variable. Meters are clamped to `[0, 100]`.
    pub fn update_variable(&mut self, name: &str, value: StoryValue) -> bool {
        self.variables.set(name, value)
    }

    /// Apply choice deltas. Meters clamp, counters add, flags are skipped.
    pub fn apply_impact(&mut self, impact: &BTreeMap<String, f64>) {
        for (name, delta) in impact {
            self.variables.add(name, *delta);
        }
    }

    // =========================================================================
    // Chat history
    // =========================================================================

    pub fn chat_history(&self) -> &[ChatMessage] {
        &self.chat_history
    }

    pub fn append_message(&mut self, message: ChatMessage) {
        self.chat_history.push(message);
    }

    /// Mark the most recent player message as read, returning its id.
    pub fn mark_last_player_message_read(&mut self) -> Option<String> {
        let message = self
            .chat_history
            .iter_mut()
            .rev()
            .find(|m| m.sender == Sender::Player)?;
        message.read = true;
        Some(message.id.clone())
    }

    // =========================================================================
    // Position
    // =========================================================================

    pub fn current_node(&self) -> Option<&str> {
        self.current_node.as_deref()
    }

    pub fn set_current_node(&mut self, node: Option<String>) {
        self.current_node = node;
    }

    pub fn chapter(&self) -> u32 {
        self.chapter
    }

    pub fn part(&self) -> u32 {
        self.part
    }

    pub fn set_position(&mut self, chapter: u32, part: u32) {
        self.chapter = chapter;
        self.part = part;
    }

    pub fn set_part(&mut self, part: u32) {
        self.part = part;
    }

    pub fn current_view(&self) -> &str {
        &self.current_view
    }

    pub fn set_current_view(&mut self, view: impl Into<String>) {
        self.current_view = view.into();
    }

    /// Title of the currently loaded script segment.
    pub fn part_title(&self) -> Option<&str> {
        self.part_title.as_deref()
    }

    pub fn set_part_title(&mut self, title: Option<String>) {
        self.part_title = title;
    }

    /// Named script the position refers to, if not the current part.
    pub fn active_script(&self) -> Option<&str> {
        self.active_script.as_deref()
    }

    pub fn set_active_script(&mut self, script: Option<String>) {
        self.active_script = script;
    }

    /// A part ended and the next one has not been entered yet.
    pub fn part_intro_pending(&self) -> bool {
        self.part_intro_pending
    }

    pub fn set_part_intro_pending(&mut self, pending: bool) {
        self.part_intro_pending = pending;
    }

    // =========================================================================
    // NPC status
    // =========================================================================

    pub fn npc_connected(&self) -> bool {
        self.npc_connected
    }

    pub fn set_npc_connected(&mut self, connected: bool) {
        self.npc_connected = connected;
    }

    pub fn blocked(&self) -> bool {
        self.blocked
    }

    pub fn set_blocked(&mut self, blocked: bool) {
        self.blocked = blocked;
    }

    // =========================================================================
    // Engine flags
    // =========================================================================

    pub fn is_processing(&self) -> bool {
        self.flags.processing
    }

    pub fn set_processing(&mut self, processing: bool) {
        self.flags.processing = processing;
    }

    pub fn is_waiting_for_choice(&self) -> bool {
        self.flags.waiting_for_choice
    }

    pub fn set_waiting_for_choice(&mut self, waiting: bool) {
        self.flags.waiting_for_choice = waiting;
    }

    pub fn choices(&self) -> &[PendingChoice] {
        &self.flags.choices
    }

    /// Present choices and start waiting for a selection.
    pub fn present_choices(&mut self, choices: Vec<PendingChoice>) {
        self.flags.choices = choices;
        self.flags.waiting_for_choice = true;
    }

    pub fn clear_choices(&mut self) {
        self.flags.choices.clear();
        self.flags.waiting_for_choice = false;
    }

    pub fn last_was_player_choice(&self) -> bool {
        self.flags.last_was_player_choice
    }

    pub fn set_last_was_player_choice(&mut self, value: bool) {
        self.flags.last_was_player_choice = value;
    }

    pub fn indicator(&self) -> &Indicator {
        &self.flags.indicator
    }

    pub fn is_typing(&self) -> bool {
        matches!(self.flags.indicator, Indicator::Typing(_))
    }

    pub fn is_recording(&self) -> bool {
        matches!(self.flags.indicator, Indicator::Recording(_))
    }

    pub fn is_reading(&self) -> bool {
        self.flags.indicator == Indicator::Reading
    }

    /// The participant the current typing/recording indicator belongs to.
    pub fn indicator_sender(&self) -> Option<&Sender> {
        match &self.flags.indicator {
            Indicator::Typing(s) | Indicator::Recording(s) => Some(s),
            _ => None,
        }
    }

    pub fn set_indicator(&mut self, indicator: Indicator) {
        self.flags.indicator = indicator;
    }

    /// Clear every transient flag.
    pub fn clear_engine_flags(&mut self) {
        self.flags = EngineFlags::default();
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    /// The record [`save_progress`](Self::save_progress) would write.
    pub fn snapshot(&self) -> SavedProgress {
        SavedProgress {
            version: crate::persist::SAVE_VERSION,
            variables: self.variables.values().clone(),
            chat_history: self.chat_history.clone(),
            current_node_id: self.current_node.clone(),
            game_started: self.game_started,
            current_view: self.current_view.clone(),
            current_chapter: self.chapter,
            current_part: self.part,
            npc_connected: self.npc_connected,
            blocked: self.blocked,
            part_intro_pending: self.part_intro_pending,
            active_script: self.active_script.clone(),
        }
    }

    /// Persist the progress record.
    pub async fn save_progress(&self) -> Result<(), PersistError> {
        let json = self.snapshot().to_json()?;
        self.saves.set(&self.keys.progress, &json).await?;
        debug!(node = ?self.current_node, messages = self.chat_history.len(), "progress saved");
        Ok(())
    }

    /// Load the progress record.
    ///
    /// Returns `Ok(false)` when there is no save. A malformed record is an
    /// error and leaves the in-memory state untouched.
    pub async fn load_progress(&mut self) -> Result<bool, PersistError> {
        let Some(json) = self.saves.get(&self.keys.progress).await? else {
            return Ok(false);
        };
        let saved = SavedProgress::from_json(&json)?;
        self.restore(saved);
        info!(
            chapter = self.chapter,
            part = self.part,
            node = ?self.current_node,
            "progress loaded"
        );
        Ok(true)
    }

    /// Replace the durable state with a saved record.
    pub fn restore(&mut self, saved: SavedProgress) {
        self.variables.restore(&saved.variables);
        self.chat_history = saved.chat_history;
        self.current_node = saved.current_node_id;
        self.game_started = saved.game_started;
        self.current_view = saved.current_view;
        self.chapter = saved.current_chapter;
        self.part = saved.current_part;
        self.npc_connected = saved.npc_connected;
        self.blocked = saved.blocked;
        self.part_intro_pending = saved.part_intro_pending;
        self.active_script = saved.active_script;
    }

    /// Wipe everything back to defaults and delete both save slots.
    ///
    /// The in-memory reset always happens; the first slot removal error is
    /// returned.
    pub async fn reset(&mut self) -> Result<(), PersistError> {
        self.player_name.clear();
        self.game_started = false;
        self.variables.reset();
        self.chat_history.clear();
        self.current_node = None;
        self.current_view = default_view();
        self.chapter = 1;
        self.part = 1;
        self.part_title = None;
        self.active_script = None;
        self.part_intro_pending = false;
        self.npc_connected = true;
        self.blocked = false;
        self.flags = EngineFlags::default();

        let progress = self.saves.remove(&self.keys.progress).await;
        let name = self.saves.remove(&self.keys.player_name).await;
        info!("game reset");
        progress.and(name)
    }
}
