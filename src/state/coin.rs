use std::{f64::consts::PI, fmt};

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// One of the two faces a coin can land on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum CoinSide {
    /// Obverse face, shown while `cos θ >= 0`.
    Heads,
    /// Reverse face, shown while `cos θ < 0`.
    Tails,
}

impl CoinSide {
    /// Rotation angle at which this face points straight at the viewer.
    pub fn base_angle(self) -> f64 {
        match self {
            CoinSide::Heads => 0.0,
            CoinSide::Tails => PI,
        }
    }

    /// Face visible for a given rotation angle.
    pub fn from_phase(phase: f64) -> Self {
        if phase.cos() >= 0.0 {
            CoinSide::Heads
        } else {
            CoinSide::Tails
        }
    }

    /// Capitalised label used in user-facing text.
    pub fn label(self) -> &'static str {
        match self {
            CoinSide::Heads => "Heads",
            CoinSide::Tails => "Tails",
        }
    }
}

impl fmt::Display for CoinSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoinSide::Heads => write!(f, "heads"),
            CoinSide::Tails => write!(f, "tails"),
        }
    }
}

/// Result of a round from the player's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// The coin landed on the side the player picked.
    Win,
    /// The coin landed on the other side.
    Lose,
}

impl Outcome {
    /// Compare the player's pick against the side the coin landed on.
    pub fn of(choice: CoinSide, result: CoinSide) -> Self {
        if choice == result {
            Outcome::Win
        } else {
            Outcome::Lose
        }
    }
}
