//! Dialogue engine for chat-based interactive fiction.
//!
//! This crate provides:
//! - A script graph of authored message, choice and control nodes
//! - A narrative state store for variables, chat history and position
//! - A dialogue engine that walks the graph with human-like pacing
//! - Save slot persistence that survives restarts mid-conversation
//!
//! # Quick Start
//!
//! ```ignore
//! use chatnovel_core::{DialogueEngine, DirectoryScriptSource, EngineConfig, FileSaveStore};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut engine = DialogueEngine::new(
//!         EngineConfig::new(),
//!         Arc::new(DirectoryScriptSource::new("scripts")),
//!         Arc::new(FileSaveStore::new("saves")),
//!     );
//!
//!     engine.store_mut().set_player_name("Ava").await?;
//!     engine.start_chapter(1, 1).await?;
//!     for choice in engine.choices() {
//!         println!("> {}", choice.text);
//!     }
//!     engine.submit_choice(0).await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod cues;
pub mod engine;
pub mod events;
pub mod interrupt;
pub mod loader;
pub mod pacing;
pub mod persist;
pub mod script;
pub mod state;
pub mod testing;
pub mod variables;

// Primary public API
pub use config::EngineConfig;
pub use cues::{Cue, CuePlayer, SilentCues, TracingCues};
pub use engine::{DialogueEngine, EngineError};
pub use events::{ChoiceOutcome, EngineEvent, Halt, WalkOutcome};
pub use interrupt::{InterruptHook, ThresholdInterrupt};
pub use loader::{DirectoryScriptSource, LoadError, ScriptId, ScriptSource, StaticScriptSource};
pub use pacing::{PacingConfig, Pacer};
pub use persist::{FileSaveStore, MemorySaveStore, PersistError, SaveKeys, SaveStore, SavedProgress};
pub use script::{Action, Choice, NodeKind, ScriptDocument, ScriptGraph, ScriptNode, Sender};
pub use state::{ChatMessage, Indicator, NarrativeStore};
pub use testing::{RecordingCues, TestHarness};
pub use variables::{StoryValue, StoryVariables, VariableSchema, VariableSpec};
