use chrono::Utc;
use repo_harvester::models::{
    PageCursor,
    RateLimitState,
    RunReport,
    ShardCheckpoint,
    ShardReport,
    ShardState,
    StoredRepository,
};
use repo_harvester::shard::Shard;
use surrealdb::sql::Datetime;
use surrealdb::RecordId;

fn report(min: u64, max: u64, state: ShardState, records: usize) -> ShardReport {
    ShardReport {
        shard: Shard::stars(min, Some(max)).unwrap(),
        state,
        records_fetched: records,
        pages_fetched: 1,
        last_cursor: Some("c1".to_string()),
        error: None,
    }
}

#[test]
fn test_stored_repository_creation() {
    let now = Datetime::from(Utc::now());
    let repo = StoredRepository {
        id: RecordId::from(("repository", "MDEwOlJlcG9zaXRvcnkx")),
        full_name: "owner/test-repo".to_string(),
        stars: 100,
        url: "https://github.com/owner/test-repo".to_string(),
        created_at: now.clone(),
        last_scraped: now.clone(),
    };

    assert_eq!(repo.id.table(), "repository");
    assert_eq!(repo.full_name, "owner/test-repo");
    assert_eq!(repo.stars, 100);
}

#[test]
fn test_page_cursor() {
    let start = PageCursor::default();
    assert!(start.is_start());
    assert!(!start.has_more);

    let resumed = PageCursor::resume_at("c1");
    assert!(!resumed.is_start());
    assert!(resumed.has_more);
    assert_eq!(resumed.end_cursor.as_deref(), Some("c1"));
}

#[test]
fn test_rate_limit_state_default() {
    let state = RateLimitState::default();
    assert_eq!(state.remaining, 5000);
    assert_eq!(state.limit, 5000);
    assert!(!state.is_limited);
    assert!(state.reset_time > Utc::now());
}

#[test]
fn test_shard_state_serialization() {
    assert_eq!(serde_json::to_string(&ShardState::Done).unwrap(), "\"done\"");
    assert_eq!(serde_json::to_string(&ShardState::Cancelled).unwrap(), "\"cancelled\"");

    let state: ShardState = serde_json::from_str("\"failed\"").unwrap();
    assert_eq!(state, ShardState::Failed);
}

#[test]
fn test_shard_state_kinds() {
    for state in [ShardState::Start, ShardState::Fetching, ShardState::Advancing] {
        assert!(!state.is_terminal());
        assert!(!state.is_resumable());
    }
    assert!(ShardState::Done.is_terminal());
    assert!(!ShardState::Done.is_resumable());
    assert!(ShardState::Failed.is_resumable());
    assert!(ShardState::Cancelled.is_resumable());
}

#[test]
fn test_run_report_totals() {
    let run = RunReport {
        shards: vec![
            report(0, 10, ShardState::Done, 40),
            report(10, 20, ShardState::Failed, 7),
            report(20, 30, ShardState::Done, 3)
        ],
    };

    assert_eq!(run.total_records(), 50);
    assert_eq!(run.count_in(ShardState::Done), 2);
    assert_eq!(run.count_in(ShardState::Cancelled), 0);
    assert!(!run.is_complete());
    assert_eq!(run.report_for("stars:10..20").unwrap().records_fetched, 7);
    assert!(run.report_for("stars:30..40").is_none());

    assert!(RunReport::default().is_complete());
}

#[test]
fn test_checkpoint_from_report() {
    let mut failed = report(10, 20, ShardState::Failed, 7);
    failed.error = Some("Malformed response: missing data".to_string());

    let checkpoint = ShardCheckpoint::from(&failed);

    assert_eq!(checkpoint.label, "stars:10..20");
    assert_eq!(checkpoint.state, ShardState::Failed);
    assert_eq!(checkpoint.records_fetched, 7);
    assert_eq!(checkpoint.last_cursor.as_deref(), Some("c1"));
    assert_eq!(checkpoint.last_error.as_deref(), Some("Malformed response: missing data"));
}
