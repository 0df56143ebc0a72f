use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

use crate::state::{
    coin::{CoinSide, Outcome},
    history::HistoryEntry,
};

/// Persisted form of a history entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntryEntity {
    /// Unique identifier of the record.
    pub id: String,
    /// Settle time in milliseconds since the Unix epoch.
    pub ts: u64,
    /// Round that produced the record.
    pub round_id: u64,
    /// Side the player picked.
    pub choice: CoinSide,
    /// Side the coin landed on.
    pub result: CoinSide,
    /// Win or lose.
    pub outcome: Outcome,
}

impl HistoryEntryEntity {
    /// Decode every well-formed entry of a stored document, skipping the rest.
    ///
    /// Entries whose timestamp cannot be represented as a calendar date are rejected too.
    /// Returns the number of rejected elements alongside the kept entries.
    pub fn decode_all(values: Vec<Value>) -> (Vec<Self>, usize) {
        let total = values.len();
        let kept: Vec<Self> = values
            .into_iter()
            .filter_map(|value| serde_json::from_value::<Self>(value).ok())
            .filter(Self::has_valid_timestamp)
            .collect();
        let rejected = total - kept.len();
        (kept, rejected)
    }

    fn has_valid_timestamp(&self) -> bool {
        OffsetDateTime::from_unix_timestamp_nanos(self.ts as i128 * 1_000_000).is_ok()
    }
}

impl From<HistoryEntry> for HistoryEntryEntity {
    fn from(value: HistoryEntry) -> Self {
        let ts = value
            .timestamp
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis() as u64)
            .unwrap_or_default();

        Self {
            id: value.id,
            ts,
            round_id: value.round_id,
            choice: value.choice,
            result: value.result,
            outcome: value.outcome,
        }
    }
}

impl From<HistoryEntryEntity> for HistoryEntry {
    fn from(value: HistoryEntryEntity) -> Self {
        Self {
            id: value.id,
            timestamp: SystemTime::UNIX_EPOCH + Duration::from_millis(value.ts),
            round_id: value.round_id,
            choice: value.choice,
            result: value.result,
            outcome: value.outcome,
        }
    }
}
