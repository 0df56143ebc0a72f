//! DTO definitions for the toss history endpoint.

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::{
    dto::format_system_time,
    state::{
        coin::{CoinSide, Outcome},
        history::{HistoryEntry, HistoryPage},
    },
};

/// Paging parameters for `GET /history`.
#[derive(Debug, Default, Deserialize, IntoParams, Validate)]
#[into_params(parameter_in = Query)]
pub struct HistoryQuery {
    /// Zero-based page index; pages past the end are clamped to the last one.
    pub page: Option<usize>,
    /// Entries per page; defaults to the configured page size.
    #[validate(range(min = 1, max = 100))]
    pub page_size: Option<usize>,
}

/// A settled round as exposed to clients.
#[derive(Debug, Serialize, ToSchema, Clone)]
pub struct HistoryEntryDto {
    pub id: String,
    /// RFC 3339 settle time.
    pub timestamp: String,
    pub round_id: u64,
    pub choice: CoinSide,
    pub result: CoinSide,
    pub outcome: Outcome,
}

impl From<&HistoryEntry> for HistoryEntryDto {
    fn from(entry: &HistoryEntry) -> Self {
        Self {
            id: entry.id.clone(),
            timestamp: format_system_time(entry.timestamp),
            round_id: entry.round_id,
            choice: entry.choice,
            result: entry.result,
            outcome: entry.outcome,
        }
    }
}

/// One page of history, most recent first.
#[derive(Debug, Serialize, ToSchema)]
pub struct HistoryPageResponse {
    pub entries: Vec<HistoryEntryDto>,
    pub page: usize,
    pub page_count: usize,
    pub total: usize,
}

impl From<HistoryPage> for HistoryPageResponse {
    fn from(page: HistoryPage) -> Self {
        Self {
            entries: page.entries.iter().map(HistoryEntryDto::from).collect(),
            page: page.page,
            page_count: page.page_count,
            total: page.total,
        }
    }
}
