use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use surrealdb::sql::Datetime;
use surrealdb::RecordId;

use crate::shard::Shard;

/// Repository metadata as observed during one harvest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryRecord {
    /// Provider-assigned node id, stable across renames
    pub id: String,
    pub full_name: String,
    pub stars: u64,
    pub url: String,
    pub created_at: DateTime<Utc>,
    pub last_scraped: DateTime<Utc>,
}

/// Repository row as stored in SurrealDB
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRepository {
    pub id: RecordId, // repository:<node id>
    pub full_name: String,
    pub stars: u64,
    pub url: String,
    pub created_at: Datetime,
    pub last_scraped: Datetime,
}

/// Pagination position within one shard
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageCursor {
    pub end_cursor: Option<String>,
    pub has_more: bool,
}

impl PageCursor {
    pub fn resume_at(end_cursor: impl Into<String>) -> Self {
        Self {
            end_cursor: Some(end_cursor.into()),
            has_more: true,
        }
    }

    pub fn is_start(&self) -> bool {
        self.end_cursor.is_none()
    }
}

/// One page of search results
#[derive(Debug, Clone)]
pub struct Page {
    pub records: Vec<RepositoryRecord>,
    pub next: PageCursor,
    /// Total matches reported by the API for the whole query
    pub total_count: u64,
    pub rate_limit: Option<RateLimitState>,
}

/// Rate limit state reported alongside a response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitState {
    pub remaining: u32,
    pub limit: u32,
    pub reset_time: DateTime<Utc>,
    pub is_limited: bool,
}

impl Default for RateLimitState {
    fn default() -> Self {
        Self {
            remaining: 5000,
            limit: 5000,
            reset_time: Utc::now() + chrono::Duration::hours(1),
            is_limited: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ShardState {
    Start,
    Fetching,
    Advancing,
    Done,
    Failed,
    Cancelled,
}

impl ShardState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ShardState::Done | ShardState::Failed | ShardState::Cancelled)
    }

    /// Failed and cancelled shards can be picked up again from their cursor.
    pub fn is_resumable(self) -> bool {
        matches!(self, ShardState::Failed | ShardState::Cancelled)
    }
}

/// A shard to run, optionally continuing from an earlier run
#[derive(Debug, Clone)]
pub struct ShardTask {
    pub shard: Shard,
    pub resume_from: Option<PageCursor>,
}

impl ShardTask {
    pub fn fresh(shard: Shard) -> Self {
        Self {
            shard,
            resume_from: None,
        }
    }
}

impl From<Shard> for ShardTask {
    fn from(shard: Shard) -> Self {
        Self::fresh(shard)
    }
}

/// Outcome of driving one shard
#[derive(Debug, Clone)]
pub struct ShardReport {
    pub shard: Shard,
    pub state: ShardState,
    pub records_fetched: usize,
    pub pages_fetched: u32,
    /// Last cursor whose page was fully stored; `None` means the first page.
    pub last_cursor: Option<String>,
    pub error: Option<String>,
}

/// Outcome of a whole harvest
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub shards: Vec<ShardReport>,
}

impl RunReport {
    pub fn total_records(&self) -> usize {
        self.shards.iter().map(|s| s.records_fetched).sum()
    }

    pub fn count_in(&self, state: ShardState) -> usize {
        self.shards.iter().filter(|s| s.state == state).count()
    }

    pub fn report_for(&self, label: &str) -> Option<&ShardReport> {
        self.shards.iter().find(|s| s.shard.label() == label)
    }

    pub fn is_complete(&self) -> bool {
        self.shards.iter().all(|s| s.state == ShardState::Done)
    }
}

/// Persisted shard outcome used to resume later runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShardCheckpoint {
    pub label: String,
    pub state: ShardState,
    pub records_fetched: u64,
    pub last_cursor: Option<String>,
    pub last_error: Option<String>,
}

impl From<&ShardReport> for ShardCheckpoint {
    fn from(report: &ShardReport) -> Self {
        Self {
            label: report.shard.label(),
            state: report.state,
            records_fetched: report.records_fetched as u64,
            last_cursor: report.last_cursor.clone(),
            last_error: report.error.clone(),
        }
    }
}
