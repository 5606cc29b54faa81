//! Global interrupts evaluated after a player choice.
//!
//! An interrupt pre-empts the chosen option's successor and force-advances
//! into a named script instead, e.g. the NPC blocking the player when
//! affection drops to zero. Hooks are evaluated at exactly one point: right
//! after a choice's impact is applied.

use crate::variables::StoryVariables;

/// Decides whether a choice's impact should divert into a named script.
pub trait InterruptHook: Send + Sync {
    /// Return the script to load, given the variables before and after the
    /// impact was applied.
    fn check(&self, before: &StoryVariables, after: &StoryVariables) -> Option<String>;
}

/// Fires when a numeric variable falls to `threshold` or below.
///
/// Only the crossing fires: if the variable was already at or below the
/// threshold before the choice, nothing happens.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdInterrupt {
    pub variable: String,
    pub threshold: f64,
    pub script: String,
}

impl ThresholdInterrupt {
    pub fn new(variable: impl Into<String>, threshold: f64, script: impl Into<String>) -> Self {
        Self {
            variable: variable.into(),
            threshold,
            script: script.into(),
        }
    }
}

impl InterruptHook for ThresholdInterrupt {
    fn check(&self, before: &StoryVariables, after: &StoryVariables) -> Option<String> {
        let was_above = before
            .number(&self.variable)
            .is_some_and(|v| v > self.threshold);
        let now_at_or_below = after
            .number(&self.variable)
            .is_some_and(|v| v <= self.threshold);

        (was_above && now_at_or_below).then(|| self.script.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variables::StoryValue;

    fn with_affection(value: f64) -> StoryVariables {
        let mut vars = StoryVariables::default();
        vars.set("valeria_affection", StoryValue::Number(value));
        vars
    }

    #[test]
    fn test_fires_on_crossing() {
        let hook = ThresholdInterrupt::new("valeria_affection", 0.0, "blocked");
        assert_eq!(
            hook.check(&with_affection(5.0), &with_affection(0.0)).as_deref(),
            Some("blocked")
        );
    }

    #[test]
    fn test_does_not_refire_below_threshold() {
        let hook = ThresholdInterrupt::new("valeria_affection", 0.0, "blocked");
        assert_eq!(hook.check(&with_affection(0.0), &with_affection(0.0)), None);
        assert_eq!(hook.check(&with_affection(20.0), &with_affection(10.0)), None);
    }

    #[test]
    fn test_missing_variable_never_fires() {
        let hook = ThresholdInterrupt::new("ghost", 0.0, "blocked");
        assert_eq!(hook.check(&with_affection(5.0), &with_affection(0.0)), None);
    }
}
