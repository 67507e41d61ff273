//! Drives shards through fetch → store → advance until each is exhausted.
//!
//! Per shard the driver walks `Start → Fetching ⇄ Advancing → Done`, leaving
//! for `Failed` on a page-fatal error and `Cancelled` when the run stops.
//! Shards run independently with bounded concurrency; only a run-fatal error
//! (bad credentials) stops the others.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::HarvestError;
use crate::github::PageFetcher;
use crate::models::{PageCursor, RunReport, ShardCheckpoint, ShardReport, ShardState, ShardTask};
use crate::query::{QuerySettings, SearchQuery};
use crate::retry::{fetch_with_retry, RetryPolicy, Sleeper, TokioSleeper};
use crate::shard::Shard;
use crate::sink::RepositorySink;

/// GitHub search stops returning results past this many matches.
pub const SEARCH_RESULT_CEILING: u64 = 1000;

#[derive(Debug, Clone)]
pub struct DriverConfig {
    pub query: QuerySettings,
    pub retry: RetryPolicy,
    /// Shards in flight at once
    pub concurrency: usize,
    /// Stop issuing fetches once this many records have been stored
    pub record_limit: Option<usize>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            query: QuerySettings::default(),
            retry: RetryPolicy::default(),
            concurrency: 1,
            record_limit: None,
        }
    }
}

/// A run stopped by a run-fatal error. `report` holds every shard as it
/// stood when the run stopped, so its progress can still be checkpointed.
#[derive(Error, Debug)]
#[error("Run halted: {error}")]
pub struct RunHalted {
    pub error: HarvestError,
    pub report: RunReport,
}

impl From<RunHalted> for HarvestError {
    fn from(halted: RunHalted) -> Self {
        halted.error
    }
}

/// State shared by all shards of one run
struct RunContext {
    cancel: CancellationToken,
    stored: AtomicUsize,
    record_limit: Option<usize>,
}

impl RunContext {
    fn new(cancel: CancellationToken, record_limit: Option<usize>) -> Self {
        Self {
            cancel,
            stored: AtomicUsize::new(0),
            record_limit,
        }
    }

    fn record_stored(&self, count: usize) {
        let total = self.stored.fetch_add(count, Ordering::SeqCst) + count;
        if let Some(limit) = self.record_limit {
            if total >= limit && !self.cancel.is_cancelled() {
                info!(total, limit, "Record limit reached, stopping further fetches");
                self.cancel.cancel();
            }
        }
    }
}

pub struct ShardDriver {
    fetcher: Arc<dyn PageFetcher>,
    sink: Arc<dyn RepositorySink>,
    sleeper: Arc<dyn Sleeper>,
    config: DriverConfig,
}

impl ShardDriver {
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        sink: Arc<dyn RepositorySink>,
        config: DriverConfig,
    ) -> Self {
        Self {
            fetcher,
            sink,
            sleeper: Arc::new(TokioSleeper),
            config,
        }
    }

    /// Replace the backoff clock, e.g. with a recording fake in tests.
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Run every task and report per shard, in task order.
    ///
    /// Page-fatal errors are recorded in the failing shard's report. A
    /// run-fatal error cancels the remaining shards, lets in-flight writes
    /// finish, and is returned together with the report gathered so far.
    pub async fn run(
        &self,
        tasks: Vec<ShardTask>,
        cancel: CancellationToken,
    ) -> Result<RunReport, RunHalted> {
        let ctx = RunContext::new(cancel.child_token(), self.config.record_limit);
        let ctx = &ctx;
        let total = tasks.len();

        info!(
            shards = total,
            concurrency = self.config.concurrency,
            "Starting harvest run"
        );

        let mut results = stream::iter(tasks.into_iter().enumerate())
            .map(|(index, task)| async move { (index, self.drive(task, ctx).await) })
            .buffer_unordered(self.config.concurrency.max(1));

        let mut reports = Vec::with_capacity(total);
        let mut fatal: Option<HarvestError> = None;

        while let Some((index, (report, shard_fatal))) = results.next().await {
            if let Some(e) = shard_fatal {
                if fatal.is_none() {
                    error!(error = %e, "Run-fatal error, cancelling remaining shards");
                    ctx.cancel.cancel();
                    fatal = Some(e);
                }
            }
            reports.push((index, report));
        }

        reports.sort_by_key(|(index, _)| *index);
        let report = RunReport {
            shards: reports.into_iter().map(|(_, report)| report).collect(),
        };

        info!(
            records = report.total_records(),
            done = report.count_in(ShardState::Done),
            failed = report.count_in(ShardState::Failed),
            cancelled = report.count_in(ShardState::Cancelled),
            "Harvest run finished"
        );

        match fatal {
            Some(error) => Err(RunHalted { error, report }),
            None => Ok(report),
        }
    }

    /// Drive a single shard to a terminal state. A run-fatal error leaves the
    /// shard `Failed` and is returned alongside its report.
    pub async fn run_shard(
        &self,
        task: ShardTask,
        cancel: &CancellationToken,
    ) -> (ShardReport, Option<HarvestError>) {
        let ctx = RunContext::new(cancel.clone(), None);
        self.drive(task, &ctx).await
    }

    async fn drive(&self, task: ShardTask, ctx: &RunContext) -> (ShardReport, Option<HarvestError>) {
        let ShardTask { shard, resume_from } = task;
        let cursor = resume_from.unwrap_or_default();
        let mut progress = ShardProgress {
            label: shard.label(),
            report: ShardReport {
                shard,
                state: ShardState::Start,
                records_fetched: 0,
                pages_fetched: 0,
                last_cursor: cursor.end_cursor.clone(),
                error: None,
            },
            cursor,
            warned_ceiling: false,
            fatal: None,
        };

        if progress.cursor.is_start() {
            info!(shard = %progress.label, "Starting shard");
        } else {
            info!(shard = %progress.label, cursor = ?progress.cursor.end_cursor, "Resuming shard");
        }

        let mut state = ShardState::Start;
        while !state.is_terminal() {
            let next = match state {
                ShardState::Start => ShardState::Fetching,
                ShardState::Fetching => self.fetch_next(&mut progress, ctx).await,
                ShardState::Advancing => {
                    if progress.cursor.has_more {
                        ShardState::Fetching
                    } else {
                        ShardState::Done
                    }
                }
                terminal => terminal,
            };

            debug!(shard = %progress.label, from = ?state, to = ?next, "Shard transition");
            state = next;
        }

        let ShardProgress {
            label,
            mut report,
            fatal,
            ..
        } = progress;
        match state {
            ShardState::Cancelled => {
                report.error.get_or_insert_with(|| HarvestError::Cancelled.to_string());
                info!(shard = %label, cursor = ?report.last_cursor, "Shard cancelled");
            }
            ShardState::Done => {
                info!(
                    shard = %label,
                    records = report.records_fetched,
                    pages = report.pages_fetched,
                    "Shard complete"
                );
            }
            _ => {}
        }

        report.state = state;
        (report, fatal)
    }

    /// One `Fetching` step: fetch the page at the current cursor, store it,
    /// and advance. A run-fatal error is parked in `progress.fatal`.
    async fn fetch_next(&self, progress: &mut ShardProgress, ctx: &RunContext) -> ShardState {
        if ctx.cancel.is_cancelled() {
            return ShardState::Cancelled;
        }

        let query = SearchQuery::for_shard(&progress.report.shard, &self.config.query, &progress.cursor);
        let fetched = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => Err(HarvestError::Cancelled),
            result = fetch_with_retry(
                self.fetcher.as_ref(),
                self.sleeper.as_ref(),
                &self.config.retry,
                &query,
            ) => result,
        };

        let page = match fetched {
            Ok(page) => page,
            Err(HarvestError::Cancelled) => return ShardState::Cancelled,
            Err(e) if e.is_run_fatal() => {
                let state = progress.fail(&e);
                progress.fatal = Some(e);
                return state;
            }
            Err(e) => return progress.fail(&e),
        };

        if page.total_count > SEARCH_RESULT_CEILING && !progress.warned_ceiling {
            warn!(
                shard = %progress.label,
                total = page.total_count,
                "Shard matches more repositories than search returns; split it"
            );
            progress.warned_ceiling = true;
        }

        if page.next.has_more && page.next.end_cursor == progress.cursor.end_cursor {
            return progress.fail(&HarvestError::MalformedResponse(format!(
                "cursor {:?} did not advance",
                progress.cursor.end_cursor
            )));
        }

        // Not raced against cancellation: a started write always completes.
        if let Err(e) = self.sink.upsert(&page.records).await {
            return progress.fail(&e);
        }

        let count = page.records.len();
        progress.report.pages_fetched += 1;
        progress.report.records_fetched += count;
        ctx.record_stored(count);

        info!(
            shard = %progress.label,
            page = progress.report.pages_fetched,
            records = count,
            total = progress.report.records_fetched,
            "Stored page"
        );

        progress.cursor = page.next;
        progress.report.last_cursor = progress.cursor.end_cursor.clone();
        ShardState::Advancing
    }
}

/// Mutable bookkeeping for one shard while it is being driven
struct ShardProgress {
    label: String,
    cursor: PageCursor,
    warned_ceiling: bool,
    report: ShardReport,
    /// Run-fatal error that ended this shard
    fatal: Option<HarvestError>,
}

impl ShardProgress {
    fn fail(&mut self, e: &HarvestError) -> ShardState {
        error!(shard = %self.label, cursor = ?self.cursor.end_cursor, error = %e, "Shard failed");
        self.report.error = Some(e.to_string());
        ShardState::Failed
    }
}

/// Build the task list against checkpoints from an earlier run.
///
/// Shards recorded as done are skipped, failed or cancelled ones continue
/// from their recorded cursor, and unknown shards start fresh.
pub fn plan_tasks(shards: Vec<Shard>, checkpoints: &[ShardCheckpoint]) -> Vec<ShardTask> {
    let by_label: HashMap<&str, &ShardCheckpoint> =
        checkpoints.iter().map(|c| (c.label.as_str(), c)).collect();

    shards
        .into_iter()
        .filter_map(|shard| match by_label.get(shard.label().as_str()) {
            Some(checkpoint) if checkpoint.state == ShardState::Done => {
                debug!(shard = %shard, "Skipping completed shard");
                None
            }
            Some(checkpoint) if checkpoint.state.is_resumable() => Some(ShardTask {
                resume_from: checkpoint.last_cursor.clone().map(PageCursor::resume_at),
                shard,
            }),
            _ => Some(ShardTask::fresh(shard)),
        })
        .collect()
}
