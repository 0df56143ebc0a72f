use std::{collections::VecDeque, time::SystemTime};

use uuid::Uuid;

use crate::state::{
    coin::{CoinSide, Outcome},
    round::{RoundId, SettledRound},
};

/// Default number of entries kept in the log.
pub const DEFAULT_CAPACITY: usize = 50;

/// Immutable record of a settled round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    /// Unique identifier of the record.
    pub id: String,
    /// When the round settled.
    pub timestamp: SystemTime,
    /// Round that produced the record.
    pub round_id: RoundId,
    /// Side the player picked.
    pub choice: CoinSide,
    /// Side the coin landed on.
    pub result: CoinSide,
    /// Win or lose.
    pub outcome: Outcome,
}

impl HistoryEntry {
    /// Build a fresh record for a round that just settled.
    pub fn from_settled(settled: &SettledRound) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: SystemTime::now(),
            round_id: settled.round_id,
            choice: settled.choice,
            result: settled.result,
            outcome: settled.outcome,
        }
    }
}

/// One page of the history log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryPage {
    /// Entries on this page, most recent first.
    pub entries: Vec<HistoryEntry>,
    /// Zero-based page index actually served (clamped to the last page).
    pub page: usize,
    /// Total number of pages (at least one).
    pub page_count: usize,
    /// Total number of entries in the log.
    pub total: usize,
}

/// Capped, most-recent-first log of settled rounds.
#[derive(Debug, Clone)]
pub struct HistoryLog {
    entries: VecDeque<HistoryEntry>,
    capacity: usize,
}

impl HistoryLog {
    /// Create an empty log holding at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// Seed the log with previously persisted entries (most recent first), dropping overflow.
    pub fn from_entries(entries: Vec<HistoryEntry>, capacity: usize) -> Self {
        let mut log = Self::new(capacity);
        log.entries.extend(entries.into_iter().take(log.capacity));
        log
    }

    /// Prepend `entry`, evicting the oldest records beyond capacity.
    pub fn push(&mut self, entry: HistoryEntry) {
        self.entries.push_front(entry);
        self.entries.truncate(self.capacity);
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the log is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum number of entries kept.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Copy of all entries, most recent first.
    pub fn to_vec(&self) -> Vec<HistoryEntry> {
        self.entries.iter().cloned().collect()
    }
}

/// Slice `entries` into pages of `page_size`, clamping `page` to the last one.
pub fn paginate(entries: &[HistoryEntry], page: usize, page_size: usize) -> HistoryPage {
    let page_size = page_size.max(1);
    let total = entries.len();
    let page_count = total.div_ceil(page_size).max(1);
    let page = page.min(page_count - 1);

    let entries = entries
        .iter()
        .skip(page * page_size)
        .take(page_size)
        .cloned()
        .collect();

    HistoryPage {
        entries,
        page,
        page_count,
        total,
    }
}
