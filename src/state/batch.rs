use serde::Serialize;

use crate::state::coin::CoinSide;

/// Queue of automatically chained rounds that all bet on the same side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BatchRun {
    /// Whether rounds are still being chained.
    pub running: bool,
    /// Side every round of the batch bets on.
    pub choice: CoinSide,
    /// Rounds still to be started after the current one.
    pub remaining: u32,
}

impl Default for BatchRun {
    fn default() -> Self {
        Self {
            running: false,
            choice: CoinSide::Heads,
            remaining: 0,
        }
    }
}

impl BatchRun {
    /// Arm a batch of `count` rounds, clamped to `1..=max`.
    ///
    /// The caller starts the first round itself, so `remaining` already excludes it.
    pub fn begin(&mut self, choice: CoinSide, count: u32, max: u32) -> u32 {
        let count = count.clamp(1, max.max(1));
        self.running = true;
        self.choice = choice;
        self.remaining = count - 1;
        count
    }

    /// Consume one pending round if the batch should keep going.
    ///
    /// Returns the side for the next round, or `None` once the batch is exhausted or
    /// stopped (in which case the batch is left stopped).
    pub fn next_round(&mut self) -> Option<CoinSide> {
        if !self.running {
            return None;
        }
        if self.remaining == 0 {
            self.stop();
            return None;
        }

        self.remaining -= 1;
        Some(self.choice)
    }

    /// Prevent any further auto-started rounds.
    pub fn stop(&mut self) {
        self.running = false;
        self.remaining = 0;
    }
}
