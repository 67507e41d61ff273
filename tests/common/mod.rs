#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use repo_harvester::error::{HarvestError, Result};
use repo_harvester::github::PageFetcher;
use repo_harvester::models::{Page, PageCursor, RepositoryRecord};
use repo_harvester::pool::SurrealConnectionConfig;
use repo_harvester::query::SearchQuery;
use repo_harvester::retry::Sleeper;
use repo_harvester::sink::{MemorySink, RepositorySink};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Notify;

/// Fetcher that replays scripted outcomes per shard filter and records
/// every query it receives.
#[derive(Default)]
pub struct ScriptedFetcher {
    scripts: Mutex<Vec<(String, VecDeque<Result<Page>>)>>,
    calls: Mutex<Vec<SearchQuery>>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue outcomes for queries whose search string contains `filter`.
    pub fn script(self, filter: &str, outcomes: Vec<Result<Page>>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .push((filter.to_string(), outcomes.into_iter().collect()));
        self
    }

    pub fn calls(&self) -> Vec<SearchQuery> {
        self.calls.lock().unwrap().clone()
    }

    /// Cursors passed for queries matching `filter`, in request order
    pub fn cursors_for(&self, filter: &str) -> Vec<Option<String>> {
        self.calls()
            .into_iter()
            .filter(|q| q.search.contains(filter))
            .map(|q| q.after)
            .collect()
    }
}

#[async_trait]
impl PageFetcher for ScriptedFetcher {
    async fn fetch_page(&self, query: &SearchQuery) -> Result<Page> {
        self.calls.lock().unwrap().push(query.clone());

        let mut scripts = self.scripts.lock().unwrap();
        let outcome = scripts
            .iter_mut()
            .find(|(filter, _)| query.search.contains(filter.as_str()))
            .and_then(|(_, outcomes)| outcomes.pop_front());

        outcome.unwrap_or_else(|| {
            Err(HarvestError::MalformedResponse(format!(
                "no scripted page for '{}'",
                query.search
            )))
        })
    }
}

/// Fake clock that records requested sleeps without waiting
#[derive(Default)]
pub struct RecordingSleeper {
    sleeps: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }

    pub fn total(&self) -> Duration {
        self.sleeps().iter().sum()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
    }
}

/// Sink whose writes always fail
pub struct FailingSink;

#[async_trait]
impl RepositorySink for FailingSink {
    async fn upsert(&self, _records: &[RepositoryRecord]) -> Result<usize> {
        Err(HarvestError::StoreError("connection reset".to_string()))
    }
}

/// Sink that signals `entered` and then holds each write until `release`
#[derive(Default)]
pub struct GatedSink {
    pub entered: Notify,
    pub release: Notify,
    pub rows: MemorySink,
}

#[async_trait]
impl RepositorySink for GatedSink {
    async fn upsert(&self, records: &[RepositoryRecord]) -> Result<usize> {
        self.entered.notify_one();
        self.release.notified().await;
        self.rows.upsert(records).await
    }
}

/// Sleeper whose backoff never ends; signals `entered` when a wait starts
#[derive(Default)]
pub struct StalledSleeper {
    pub entered: Notify,
}

#[async_trait]
impl Sleeper for StalledSleeper {
    async fn sleep(&self, _duration: Duration) {
        self.entered.notify_one();
        std::future::pending::<()>().await;
    }
}

pub fn record(id: &str, stars: u64) -> RepositoryRecord {
    RepositoryRecord {
        id: id.to_string(),
        full_name: format!("owner/{}", id.to_lowercase()),
        stars,
        url: format!("https://github.com/owner/{}", id.to_lowercase()),
        created_at: Utc.with_ymd_and_hms(2012, 5, 1, 12, 0, 0).unwrap(),
        last_scraped: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
    }
}

pub fn page(records: Vec<RepositoryRecord>, end_cursor: Option<&str>, has_more: bool) -> Page {
    Page {
        total_count: records.len() as u64,
        records,
        next: PageCursor {
            end_cursor: end_cursor.map(str::to_string),
            has_more,
        },
        rate_limit: None,
    }
}

pub fn rate_limited() -> HarvestError {
    HarvestError::RateLimitExceeded("secondary rate limit".to_string())
}

pub fn memory_store_config() -> SurrealConnectionConfig {
    SurrealConnectionConfig {
        url: "mem://".to_string(),
        username: String::new(),
        password: String::new(),
        namespace: "harvest".to_string(),
        database: "test".to_string(),
    }
}
