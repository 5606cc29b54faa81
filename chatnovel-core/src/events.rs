//! Events emitted while the engine walks a script.
//!
//! A walk holds `&mut` access to the engine for its whole duration, so a UI
//! observes progress through these events instead of polling the store.

use crate::state::{ChatMessage, Indicator, PendingChoice};

/// Why a walk stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Halt {
    /// A choice node was reached; the engine waits for `submit_choice`.
    AwaitingChoice,
    /// A part-end node was reached.
    PartEnd { next_part: Option<u32> },
    /// The walk referenced a node absent from the loaded graph.
    MissingNode(String),
    /// The last node had no successor.
    EndOfScript,
}

/// Result of an `advance` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalkOutcome {
    /// Another walk was in progress and `force` was not set.
    AlreadyRunning,
    Halted(Halt),
}

impl WalkOutcome {
    pub fn halt(&self) -> Option<&Halt> {
        match self {
            WalkOutcome::Halted(halt) => Some(halt),
            WalkOutcome::AlreadyRunning => None,
        }
    }
}

/// Result of a `submit_choice` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChoiceOutcome {
    /// No choice was pending.
    NotWaiting,
    /// The index did not name a pending option. Nothing changed.
    InvalidIndex(usize),
    /// The choice was applied. `walk` is `None` when the option had no
    /// successor.
    Accepted { walk: Option<WalkOutcome> },
    /// An interrupt hook diverted the story into a named script.
    Interrupted { script: String, walk: WalkOutcome },
}

/// Something observable happened during a walk.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// The presence indicator changed.
    Indicator(Indicator),
    /// A message was appended to the chat history.
    MessageDelivered(ChatMessage),
    /// A player message was marked as read by the NPC.
    MessageRead { id: String },
    /// Choices are waiting for the player.
    ChoicesPresented(Vec<PendingChoice>),
    /// A part finished. `title` is the next part's title when it loaded.
    PartEnded {
        next_part: Option<u32>,
        title: Option<String>,
    },
    /// A walk stopped.
    WalkHalted(Halt),
}
