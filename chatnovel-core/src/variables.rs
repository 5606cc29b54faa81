//! Story variables: relationship meters, counters and flags.
//!
//! Every variable is declared up front in a [`VariableSchema`]. Mutations
//! that name an undeclared variable are ignored, and meters are clamped to
//! `[METER_MIN, METER_MAX]` on every write.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

/// Lower bound of a meter.
pub const METER_MIN: f64 = 0.0;

/// Upper bound of a meter.
pub const METER_MAX: f64 = 100.0;

/// A literal value held by a story variable or used in a condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StoryValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl StoryValue {
    /// The numeric value, if this is a number.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            StoryValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// The boolean value, if this is a flag.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            StoryValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl From<f64> for StoryValue {
    fn from(n: f64) -> Self {
        StoryValue::Number(n)
    }
}

impl From<i32> for StoryValue {
    fn from(n: i32) -> Self {
        StoryValue::Number(f64::from(n))
    }
}

impl From<bool> for StoryValue {
    fn from(b: bool) -> Self {
        StoryValue::Bool(b)
    }
}

impl From<&str> for StoryValue {
    fn from(s: &str) -> Self {
        StoryValue::Text(s.to_string())
    }
}

impl fmt::Display for StoryValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoryValue::Bool(b) => write!(f, "{b}"),
            StoryValue::Number(n) => write!(f, "{n}"),
            StoryValue::Text(s) => write!(f, "{s}"),
        }
    }
}

/// How a variable behaves under mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariableKind {
    /// Numeric, clamped to `[0, 100]` (affection, tension).
    Meter,
    /// Numeric, unbounded (quiz points).
    Counter,
    /// Boolean (is liar).
    Flag,
}

/// Declaration of a single story variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableSpec {
    pub name: String,
    pub kind: VariableKind,
    pub default: StoryValue,
}

impl VariableSpec {
    /// Declare a meter with a starting value.
    pub fn meter(name: impl Into<String>, default: f64) -> Self {
        Self {
            name: name.into(),
            kind: VariableKind::Meter,
            default: StoryValue::Number(default.clamp(METER_MIN, METER_MAX)),
        }
    }

    /// Declare an unbounded counter.
    pub fn counter(name: impl Into<String>, default: f64) -> Self {
        Self {
            name: name.into(),
            kind: VariableKind::Counter,
            default: StoryValue::Number(default),
        }
    }

    /// Declare a boolean flag.
    pub fn flag(name: impl Into<String>, default: bool) -> Self {
        Self {
            name: name.into(),
            kind: VariableKind::Flag,
            default: StoryValue::Bool(default),
        }
    }
}

/// The set of variables a story declares.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableSchema {
    specs: Vec<VariableSpec>,
}

impl VariableSchema {
    /// An empty schema.
    pub fn empty() -> Self {
        Self { specs: Vec::new() }
    }

    /// Add a declaration. A later declaration with the same name replaces
    /// the earlier one.
    pub fn with(mut self, spec: VariableSpec) -> Self {
        self.specs.retain(|s| s.name != spec.name);
        self.specs.push(spec);
        self
    }

    pub fn specs(&self) -> &[VariableSpec] {
        &self.specs
    }

    /// Look up a declaration by name.
    pub fn get(&self, name: &str) -> Option<&VariableSpec> {
        self.specs.iter().find(|s| s.name == name)
    }
}

impl Default for VariableSchema {
    fn default() -> Self {
        Self::empty()
            .with(VariableSpec::meter("valeria_affection", 0.0))
            .with(VariableSpec::meter("mistery_level", 0.0))
            .with(VariableSpec::meter("tension", 0.0))
            .with(VariableSpec::flag("is_liar", false))
            .with(VariableSpec::counter("quiz_points", 0.0))
    }
}

/// Current values of the declared story variables.
#[derive(Debug, Clone, PartialEq)]
pub struct StoryVariables {
    schema: VariableSchema,
    values: BTreeMap<String, StoryValue>,
}

impl StoryVariables {
    /// Create variables at their declared defaults.
    pub fn new(schema: VariableSchema) -> Self {
        let values = schema
            .specs()
            .iter()
            .map(|s| (s.name.clone(), s.default.clone()))
            .collect();
        Self { schema, values }
    }

    pub fn schema(&self) -> &VariableSchema {
        &self.schema
    }

    /// Get a variable's current value.
    pub fn get(&self, name: &str) -> Option<&StoryValue> {
        self.values.get(name)
    }

    /// Get a numeric variable's current value.
    pub fn number(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(StoryValue::as_number)
    }

    /// Get a flag's current value.
    pub fn flag(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(StoryValue::as_bool)
    }

    /// All values, ordered by name.
    pub fn values(&self) -> &BTreeMap<String, StoryValue> {
        &self.values
    }

    /// Set a declared variable. Meters are clamped.
    ///
    /// Returns false when the variable is undeclared or the value does not
    /// fit the variable's kind.
    pub fn set(&mut self, name: &str, value: StoryValue) -> bool {
        let Some(spec) = self.schema.get(name) else {
            debug!(variable = name, "ignoring write to undeclared variable");
            return false;
        };

        let value = match (spec.kind, value) {
            (VariableKind::Meter, StoryValue::Number(n)) => {
                StoryValue::Number(n.clamp(METER_MIN, METER_MAX))
            }
            (VariableKind::Counter, v @ StoryValue::Number(_)) => v,
            (VariableKind::Flag, v @ StoryValue::Bool(_)) => v,
            (kind, value) => {
                debug!(variable = name, ?kind, %value, "ignoring write of mismatched type");
                return false;
            }
        };

        self.values.insert(name.to_string(), value);
        true
    }

    /// Add a delta to a numeric variable. Meters clamp, flags are left alone.
    pub fn add(&mut self, name: &str, delta: f64) -> bool {
        let Some(spec) = self.schema.get(name) else {
            debug!(variable = name, "ignoring impact on undeclared variable");
            return false;
        };
        if spec.kind == VariableKind::Flag {
            return false;
        }

        let current = self.number(name).unwrap_or(0.0);
        self.set(name, StoryValue::Number(current + delta))
    }

    /// Restore every variable to its declared default.
    pub fn reset(&mut self) {
        *self = Self::new(self.schema.clone());
    }

    /// Overlay saved values onto the declared defaults.
    ///
    /// Undeclared names are dropped and meters are re-clamped.
    pub fn restore(&mut self, saved: &BTreeMap<String, StoryValue>) {
        self.reset();
        for (name, value) in saved {
            self.set(name, value.clone());
        }
    }
}

impl Default for StoryVariables {
    fn default() -> Self {
        Self::new(VariableSchema::default())
    }
}
