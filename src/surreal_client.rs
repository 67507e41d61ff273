use anyhow::{ Context, Result };
use serde::Deserialize;
use surrealdb::engine::any::Any;
use surrealdb::opt::auth::Root;
use surrealdb::sql::Datetime;
use surrealdb::{ RecordId, Surreal };
use tracing::{ debug, info, warn };

use crate::models::{ RepositoryRecord, RunReport, ShardCheckpoint, StoredRepository };
use crate::pool::SurrealConnectionConfig;

pub const REPOSITORY_TABLE: &str = "repository";
pub const SHARD_PROGRESS_TABLE: &str = "shard_progress";

#[derive(Clone, Debug)]
pub struct SurrealClient {
    pub db: Surreal<Any>,
}

impl SurrealClient {
    /// Connect, sign in when the engine needs it, and select namespace/database
    pub async fn connect(config: &SurrealConnectionConfig) -> Result<Self> {
        info!("Connecting to SurrealDB at {}", config.url);

        let db = surrealdb::engine::any
            ::connect(config.url.as_str()).await
            .context("Failed to connect to SurrealDB")?;

        if config.requires_signin() {
            db
                .signin(Root {
                    username: &config.username,
                    password: &config.password,
                }).await
                .context("Failed to authenticate with SurrealDB")?;
        }

        db
            .use_ns(config.namespace.as_str())
            .use_db(config.database.as_str()).await
            .context("Failed to select namespace and database")?;

        debug!("Successfully connected to SurrealDB");
        Ok(Self { db })
    }

    /// Define the harvest tables if they do not exist yet
    pub async fn ensure_schema(&self) -> Result<()> {
        let query =
            r#"
            DEFINE TABLE IF NOT EXISTS repository SCHEMALESS;
            DEFINE FIELD IF NOT EXISTS full_name ON repository TYPE string;
            DEFINE FIELD IF NOT EXISTS stars ON repository TYPE int;
            DEFINE FIELD IF NOT EXISTS url ON repository TYPE string;
            DEFINE FIELD IF NOT EXISTS created_at ON repository TYPE datetime;
            DEFINE FIELD IF NOT EXISTS last_scraped ON repository TYPE datetime;

            DEFINE TABLE IF NOT EXISTS shard_progress SCHEMALESS;
        "#;

        self.db.query(query).await?.check().context("Failed to define harvest schema")?;
        Ok(())
    }

    /// Insert or overwrite repositories keyed by their provider id.
    /// Each record is its own statement, so a failure leaves earlier rows intact.
    pub async fn upsert_repositories(&self, records: &[RepositoryRecord]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let query =
            r#"
            UPSERT $id SET
                full_name = $full_name,
                stars = $stars,
                url = $url,
                created_at = $created_at,
                last_scraped = $last_scraped
        "#;

        let mut written = 0;
        for record in records {
            let record_id = RecordId::from((REPOSITORY_TABLE, record.id.clone()));

            let mut result = self.db
                .query(query)
                .bind(("id", record_id.clone()))
                .bind(("full_name", record.full_name.clone()))
                .bind(("stars", record.stars))
                .bind(("url", record.url.clone()))
                .bind(("created_at", Datetime::from(record.created_at)))
                .bind(("last_scraped", Datetime::from(record.last_scraped))).await
                .with_context(|| format!("Failed to upsert repository {}", record.full_name))?;

            let upserted: Vec<StoredRepository> = result
                .take(0)
                .with_context(|| format!("Failed to upsert repository {}", record.full_name))?;
            if upserted.is_empty() {
                warn!("No result returned for repository upsert: {}", record_id.key());
            }
            written += 1;
        }

        debug!("Upserted {} repositories", written);
        Ok(written)
    }

    pub async fn get_repository(&self, id: &str) -> Result<Option<StoredRepository>> {
        let row: Option<StoredRepository> = self.db
            .select(RecordId::from((REPOSITORY_TABLE, id))).await
            .with_context(|| format!("Failed to load repository {}", id))?;
        Ok(row)
    }

    pub async fn count_repositories(&self) -> Result<u64> {
        #[derive(Debug, Deserialize)]
        struct CountRow {
            count: u64,
        }

        let mut result = self.db.query("SELECT count() AS count FROM repository GROUP ALL").await?;
        let row: Option<CountRow> = result.take(0)?;
        Ok(row.map_or(0, |r| r.count))
    }

    /// Most-starred repositories first
    pub async fn top_repositories(&self, limit: usize) -> Result<Vec<StoredRepository>> {
        let mut result = self.db
            .query("SELECT * FROM repository ORDER BY stars DESC LIMIT $limit")
            .bind(("limit", limit)).await?;
        let rows: Vec<StoredRepository> = result.take(0)?;
        Ok(rows)
    }

    pub async fn save_checkpoint(&self, checkpoint: &ShardCheckpoint) -> Result<()> {
        let query =
            r#"
            UPSERT $id SET
                label = $label,
                state = $state,
                records_fetched = $records_fetched,
                last_cursor = $last_cursor,
                last_error = $last_error,
                updated_at = time::now()
        "#;

        self.db
            .query(query)
            .bind(("id", RecordId::from((SHARD_PROGRESS_TABLE, checkpoint.label.clone()))))
            .bind(("label", checkpoint.label.clone()))
            .bind(("state", checkpoint.state))
            .bind(("records_fetched", checkpoint.records_fetched))
            .bind(("last_cursor", checkpoint.last_cursor.clone()))
            .bind(("last_error", checkpoint.last_error.clone())).await?
            .check()
            .with_context(|| format!("Failed to save checkpoint for {}", checkpoint.label))?;

        Ok(())
    }

    /// Record every shard outcome of a run
    pub async fn save_checkpoints(&self, report: &RunReport) -> Result<()> {
        for shard in &report.shards {
            self.save_checkpoint(&ShardCheckpoint::from(shard)).await?;
        }
        info!("Saved {} shard checkpoints", report.shards.len());
        Ok(())
    }

    pub async fn load_checkpoints(&self) -> Result<Vec<ShardCheckpoint>> {
        let query =
            r#"
            SELECT label, state, records_fetched, last_cursor, last_error
            FROM shard_progress
        "#;

        let mut result = self.db.query(query).await?;
        let checkpoints: Vec<ShardCheckpoint> = result
            .take(0)
            .context("Failed to load shard checkpoints")?;
        Ok(checkpoints)
    }
}
