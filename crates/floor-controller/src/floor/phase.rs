//! Floor phase state machine.
//!
//! | From | To |
//! |------|----|
//! | idle | preparing |
//! | preparing | thinking, speaking, cooldown, idle (grant revoked before speaking) |
//! | thinking | speaking, cooldown, idle (grant revoked before speaking) |
//! | speaking | thinking, cooldown |
//! | cooldown | idle |

use serde::{Deserialize, Serialize};
use std::fmt;

/// Phase of the floor in one room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FloorPhase {
    /// Nobody holds the floor.
    Idle,
    /// Holder (typically an AI participant) is composing a response.
    Thinking,
    /// Floor granted, holder has not started transmitting.
    Preparing,
    /// Holder is transmitting.
    Speaking,
    /// Floor released, short grace interval before the next grant.
    Cooldown,
}

impl FloorPhase {
    /// Returns the phase as a string for logs and metric labels.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            FloorPhase::Idle => "idle",
            FloorPhase::Thinking => "thinking",
            FloorPhase::Preparing => "preparing",
            FloorPhase::Speaking => "speaking",
            FloorPhase::Cooldown => "cooldown",
        }
    }

    /// Whether a holder exists in this phase.
    #[must_use]
    pub const fn is_held(&self) -> bool {
        matches!(
            self,
            FloorPhase::Preparing | FloorPhase::Thinking | FloorPhase::Speaking
        )
    }

    /// Whether `next` is a legal successor of this phase.
    #[must_use]
    pub const fn can_transition_to(&self, next: FloorPhase) -> bool {
        matches!(
            (self, next),
            (FloorPhase::Idle, FloorPhase::Preparing)
                | (
                    FloorPhase::Preparing,
                    FloorPhase::Thinking
                        | FloorPhase::Speaking
                        | FloorPhase::Cooldown
                        | FloorPhase::Idle
                )
                | (
                    FloorPhase::Thinking,
                    FloorPhase::Speaking | FloorPhase::Cooldown | FloorPhase::Idle
                )
                | (
                    FloorPhase::Speaking,
                    FloorPhase::Thinking | FloorPhase::Cooldown
                )
                | (FloorPhase::Cooldown, FloorPhase::Idle)
        )
    }
}

impl fmt::Display for FloorPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
