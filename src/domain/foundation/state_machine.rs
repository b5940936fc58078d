//! State machine trait for lifecycle status enums.
//!
//! Status enums declare their legal edges once; callers get a checked
//! `transition_to` and terminal-state detection for free.

use std::fmt;

use thiserror::Error;

/// Rejected transition between two states of `S`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Cannot transition from {from} to {to}")]
pub struct InvalidTransition<S: fmt::Display + fmt::Debug> {
    pub from: S,
    pub to: S,
}

/// Trait for status enums that represent state machines.
///
/// # Example
///
/// ```ignore
/// impl StateMachine for ReservationState {
///     fn valid_transitions(&self) -> Vec<Self> {
///         match self {
///             Pending => vec![Committed, Releasing, Released],
///             Releasing => vec![Released],
///             Committed | Released => vec![],
///         }
///     }
/// }
///
/// let settled = ReservationState::Pending.transition_to(ReservationState::Released)?;
/// ```
pub trait StateMachine: Sized + Copy + PartialEq + fmt::Debug + fmt::Display {
    /// Returns all valid target states from current state.
    fn valid_transitions(&self) -> Vec<Self>;

    /// Returns true if transition from self to target is valid.
    fn can_transition_to(&self, target: &Self) -> bool {
        self.valid_transitions().contains(target)
    }

    /// Performs transition with validation, returning error if invalid.
    fn transition_to(&self, target: Self) -> Result<Self, InvalidTransition<Self>> {
        if self.can_transition_to(&target) {
            Ok(target)
        } else {
            Err(InvalidTransition {
                from: *self,
                to: target,
            })
        }
    }

    /// Checks if current state is terminal (no valid outgoing transitions).
    fn is_terminal(&self) -> bool {
        self.valid_transitions().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Light {
        Off,
        On,
        Broken,
    }

    impl fmt::Display for Light {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{:?}", self)
        }
    }

    impl StateMachine for Light {
        fn valid_transitions(&self) -> Vec<Self> {
            match self {
                Light::Off => vec![Light::On, Light::Broken],
                Light::On => vec![Light::Off, Light::Broken],
                Light::Broken => vec![],
            }
        }
    }

    #[test]
    fn default_can_transition_follows_valid_transitions() {
        assert!(Light::Off.can_transition_to(&Light::On));
        assert!(!Light::Broken.can_transition_to(&Light::On));
    }

    #[test]
    fn transition_to_reports_both_ends_on_failure() {
        let err = Light::Broken.transition_to(Light::On).unwrap_err();
        assert_eq!(err.from, Light::Broken);
        assert_eq!(err.to, Light::On);
        assert_eq!(err.to_string(), "Cannot transition from Broken to On");
    }

    #[test]
    fn terminal_state_has_no_exits() {
        assert!(Light::Broken.is_terminal());
        assert!(!Light::Off.is_terminal());
    }
}
