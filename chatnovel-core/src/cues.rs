//! Fire-and-forget sound cues.

use std::fmt;
use tracing::debug;

/// A sound cue the engine can trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cue {
    Typing,
    Send,
    Receive,
}

impl Cue {
    pub fn name(self) -> &'static str {
        match self {
            Cue::Typing => "typing",
            Cue::Send => "send",
            Cue::Receive => "receive",
        }
    }
}

impl fmt::Display for Cue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Plays cues. Implementations must not block and swallow their own
/// failures; the engine never waits on a cue.
pub trait CuePlayer: Send + Sync {
    fn play(&self, cue: Cue);
}

/// Discards every cue.
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentCues;

impl CuePlayer for SilentCues {
    fn play(&self, _cue: Cue) {}
}

/// Logs every cue at debug level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingCues;

impl CuePlayer for TracingCues {
    fn play(&self, cue: Cue) {
        debug!(%cue, "cue");
    }
}
