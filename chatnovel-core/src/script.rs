//! Script documents and the in-memory node graph.
//!
//! A script document is authored as JSON:
//!
//! ```json
//! {
//!   "title": "Part 1: Unknown number",
//!   "nodes": [
//!     { "id": "start", "sender": "valeria", "content": "Hi {{name}}", "nextId": "c1" },
//!     { "id": "c1", "type": "choice", "choices": [
//!         { "text": "Who is this?", "nextId": "n2", "impact": { "mistery_level": 5 } }
//!     ] }
//!   ]
//! }
//! ```
//!
//! Loading builds a [`ScriptGraph`] with an id index. The graph is never
//! merged: loading a new part replaces it wholesale.

use crate::variables::{StoryValue, StoryVariables};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// Who authored a node or chat message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Sender {
    Player,
    #[default]
    System,
    /// Any other participant, by identifier.
    Npc(String),
}

impl Sender {
    /// Whether this sender is a real participant who types and reads.
    pub fn is_npc(&self) -> bool {
        matches!(self, Sender::Npc(_))
    }

    pub fn as_str(&self) -> &str {
        match self {
            Sender::Player => "player",
            Sender::System => "system",
            Sender::Npc(name) => name,
        }
    }
}

impl From<String> for Sender {
    fn from(s: String) -> Self {
        match s.as_str() {
            "player" => Sender::Player,
            "system" => Sender::System,
            _ => Sender::Npc(s),
        }
    }
}

impl From<&str> for Sender {
    fn from(s: &str) -> Self {
        Sender::from(s.to_string())
    }
}

impl From<Sender> for String {
    fn from(sender: Sender) -> Self {
        match sender {
            Sender::Player => "player".to_string(),
            Sender::System => "system".to_string(),
            Sender::Npc(name) => name,
        }
    }
}

impl fmt::Display for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Processing branch selected by a node's `type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    #[default]
    Message,
    Text,
    Audio,
    Image,
    Choice,
    TypingFake,
    PartEnd,
    /// Unrecognized type, processed as a message.
    #[serde(other)]
    Other,
}

/// Media kind of a delivered chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    #[default]
    Text,
    Audio,
    Image,
}

impl NodeKind {
    /// The chat message kind a message-path node produces.
    pub fn message_kind(self) -> MessageKind {
        match self {
            NodeKind::Audio => MessageKind::Audio,
            NodeKind::Image => MessageKind::Image,
            _ => MessageKind::Text,
        }
    }
}

/// A state-mutation command attached to a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Action {
    /// Set a story variable to a literal.
    #[serde(rename = "set")]
    Set { variable: String, value: StoryValue },

    /// Mark the NPC as online or offline.
    #[serde(rename = "setNPCStatus")]
    SetNpcStatus { value: bool },

    /// Mark the player as blocked or unblocked by the NPC.
    #[serde(rename = "setBlocked")]
    SetBlocked { value: bool },

    /// Unrecognized action tag.
    #[serde(other)]
    Unknown,
}

/// Comparison used by a [`Condition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    /// Unrecognized operator, never satisfied.
    #[serde(other)]
    Unknown,
}

impl Operator {
    /// Compare a variable's current value (if any) against a literal.
    ///
    /// Ordering is only defined between numbers. Values of different types
    /// are unequal, and a missing value only satisfies `!=`.
    pub fn evaluate(self, current: Option<&StoryValue>, literal: &StoryValue) -> bool {
        let Some(current) = current else {
            return self == Operator::Ne;
        };

        match self {
            Operator::Eq => current == literal,
            Operator::Ne => current != literal,
            Operator::Unknown => false,
            ordered => match (current.as_number(), literal.as_number()) {
                (Some(a), Some(b)) => match ordered {
                    Operator::Ge => a >= b,
                    Operator::Le => a <= b,
                    Operator::Gt => a > b,
                    Operator::Lt => a < b,
                    _ => false,
                },
                _ => false,
            },
        }
    }
}

/// A conditional jump evaluated after a node is delivered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    pub variable: String,
    pub operator: Operator,
    pub value: StoryValue,
    pub next_id: String,
}

impl Condition {
    pub fn is_satisfied(&self, variables: &StoryVariables) -> bool {
        self.operator
            .evaluate(variables.get(&self.variable), &self.value)
    }
}

/// One selectable option of a choice node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Choice {
    pub text: String,
    #[serde(default)]
    pub next_id: Option<String>,
    /// Story-variable deltas applied when selected.
    #[serde(default)]
    pub impact: BTreeMap<String, f64>,
}

/// One authored step of the script.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptNode {
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: NodeKind,
    #[serde(default)]
    pub sender: Sender,
    #[serde(default)]
    pub content: String,
    /// Explicit pacing override in milliseconds. Non-positive values fall
    /// back to the heuristic.
    #[serde(default)]
    pub delay: Option<f64>,
    #[serde(default)]
    pub actions: Vec<Action>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub next_id: Option<String>,
    #[serde(default)]
    pub next_part: Option<u32>,
    #[serde(default)]
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub typing_cycles: Option<u32>,
}

impl ScriptNode {
    /// A plain message node.
    pub fn message(id: impl Into<String>, sender: impl Into<Sender>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            sender: sender.into(),
            content: content.into(),
            ..Self::default()
        }
    }

    pub fn then(mut self, next_id: impl Into<String>) -> Self {
        self.next_id = Some(next_id.into());
        self
    }

    /// Whether the walk would continue after this node.
    pub fn has_successor(&self) -> bool {
        self.next_id.is_some() || !self.conditions.is_empty()
    }

    /// Resolve the successor: first satisfied condition, else `next_id`.
    pub fn resolve_next(&self, variables: &StoryVariables) -> Option<String> {
        self.conditions
            .iter()
            .find(|c| c.is_satisfied(variables))
            .map(|c| c.next_id.clone())
            .or_else(|| self.next_id.clone())
    }

    /// Content length in characters, used by the pacing heuristics.
    pub fn content_len(&self) -> usize {
        self.content.chars().count()
    }
}

/// A script document as authored.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ScriptDocument {
    #[serde(default)]
    pub title: Option<String>,
    pub nodes: Vec<ScriptNode>,
}

impl ScriptDocument {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Read-only node graph with O(1) lookup by id.
#[derive(Debug, Clone)]
pub struct ScriptGraph {
    title: Option<String>,
    nodes: Vec<Arc<ScriptNode>>,
    index: HashMap<String, usize>,
}

impl ScriptGraph {
    /// Build the graph and its id index.
    ///
    /// Duplicate ids are not rejected; the later node wins the index slot.
    pub fn from_document(document: ScriptDocument) -> Self {
        let mut index = HashMap::with_capacity(document.nodes.len());
        let mut nodes = Vec::with_capacity(document.nodes.len());

        for (position, node) in document.nodes.into_iter().enumerate() {
            if index.insert(node.id.clone(), position).is_some() {
                warn!(node = %node.id, "duplicate node id in script, later node wins");
            }
            nodes.push(Arc::new(node));
        }

        Self {
            title: document.title,
            nodes,
            index,
        }
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    /// Look up a node by id.
    pub fn get(&self, id: &str) -> Option<Arc<ScriptNode>> {
        self.index.get(id).map(|&i| Arc::clone(&self.nodes[i]))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Nodes in document order.
    pub fn nodes(&self) -> impl Iterator<Item = &ScriptNode> {
        self.nodes.iter().map(|n| n.as_ref())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The node a walk starts from: `preferred` if present, otherwise the
    /// first node in document order.
    pub fn entry_id(&self, preferred: &str) -> Option<&str> {
        if self.contains(preferred) {
            return self.index.get_key_value(preferred).map(|(k, _)| k.as_str());
        }
        self.nodes.first().map(|n| n.id.as_str())
    }
}

/// Replace every occurrence of `token` with the player's name.
pub fn substitute_name(text: &str, token: &str, player_name: &str) -> String {
    if token.is_empty() {
        return text.to_string();
    }
    text.replace(token, player_name)
}
