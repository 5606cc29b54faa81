//! Engine configuration.

use crate::pacing::PacingConfig;
use crate::persist::SaveKeys;
use crate::variables::VariableSchema;

/// Default id of the node a script is entered at.
pub const DEFAULT_ENTRY_NODE: &str = "start";

/// Default player name placeholder in script text.
pub const DEFAULT_NAME_TOKEN: &str = "{{name}}";

/// Fake typing cycles when a `typing_fake` node does not say.
pub const DEFAULT_TYPING_CYCLES: u32 = 3;

/// Configuration for a [`DialogueEngine`](crate::DialogueEngine).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Pause windows and time scale.
    pub pacing: PacingConfig,

    /// Declared story variables.
    pub variables: VariableSchema,

    /// Save slot names.
    pub save_keys: SaveKeys,

    /// Node id a script is entered at, falling back to its first node.
    pub entry_node: String,

    /// Token replaced with the player's name.
    pub name_token: String,

    /// Fake typing cycles when a node does not specify them.
    pub default_typing_cycles: u32,
}

impl EngineConfig {
    /// Default configuration with real-time pacing.
    pub fn new() -> Self {
        Self {
            pacing: PacingConfig::default(),
            variables: VariableSchema::default(),
            save_keys: SaveKeys::default(),
            entry_node: DEFAULT_ENTRY_NODE.to_string(),
            name_token: DEFAULT_NAME_TOKEN.to_string(),
            default_typing_cycles: DEFAULT_TYPING_CYCLES,
        }
    }

    /// Set the pacing configuration.
    pub fn with_pacing(mut self, pacing: PacingConfig) -> Self {
        self.pacing = pacing;
        self
    }

    /// Scale every pause (`0.0` disables pacing).
    pub fn with_time_scale(mut self, scale: f64) -> Self {
        self.pacing = self.pacing.with_time_scale(scale);
        self
    }

    /// Set the declared story variables.
    pub fn with_variables(mut self, variables: VariableSchema) -> Self {
        self.variables = variables;
        self
    }

    /// Set the save slot names.
    pub fn with_save_keys(mut self, keys: SaveKeys) -> Self {
        self.save_keys = keys;
        self
    }

    /// Set the entry node id.
    pub fn with_entry_node(mut self, id: impl Into<String>) -> Self {
        self.entry_node = id.into();
        self
    }

    /// Set the player name placeholder.
    pub fn with_name_token(mut self, token: impl Into<String>) -> Self {
        self.name_token = token.into();
        self
    }

    /// Set the fallback number of fake typing cycles.
    pub fn with_default_typing_cycles(mut self, cycles: u32) -> Self {
        self.default_typing_cycles = cycles;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}
