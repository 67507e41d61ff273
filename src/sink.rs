//! Destinations for harvested repository records.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::debug;

use crate::error::{HarvestError, Result};
use crate::models::RepositoryRecord;
use crate::pool::SurrealPool;

/// Insert-or-update keyed by repository id.
///
/// Writing the same record twice must leave the store as a single write
/// would; batches may overlap or repeat.
#[async_trait]
pub trait RepositorySink: Send + Sync {
    /// Returns the number of records written.
    async fn upsert(&self, records: &[RepositoryRecord]) -> Result<usize>;
}

fn check_record(record: &RepositoryRecord) -> Result<()> {
    if record.id.trim().is_empty() {
        return Err(HarvestError::StoreError(format!(
            "refusing to store {} without an id",
            record.full_name
        )));
    }
    Ok(())
}

/// Sink backed by the SurrealDB pool
#[derive(Clone)]
pub struct SurrealSink {
    pool: Arc<SurrealPool>,
}

impl SurrealSink {
    pub fn new(pool: Arc<SurrealPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RepositorySink for SurrealSink {
    async fn upsert(&self, records: &[RepositoryRecord]) -> Result<usize> {
        records.iter().try_for_each(check_record)?;

        let db_conn = self
            .pool
            .get()
            .await
            .map_err(|e| HarvestError::StoreError(format!("Failed to get DB connection: {}", e)))?;

        db_conn
            .upsert_repositories(records)
            .await
            .map_err(|e| HarvestError::StoreError(format!("{:#}", e)))
    }
}

/// In-process sink with the same upsert semantics, for dry runs
#[derive(Debug, Default)]
pub struct MemorySink {
    rows: Mutex<BTreeMap<String, RepositoryRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, id: &str) -> Option<RepositoryRecord> {
        self.rows
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .cloned()
    }

    /// All rows ordered by id
    pub fn rows(&self) -> Vec<RepositoryRecord> {
        self.rows
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect()
    }
}

#[async_trait]
impl RepositorySink for MemorySink {
    async fn upsert(&self, records: &[RepositoryRecord]) -> Result<usize> {
        records.iter().try_for_each(check_record)?;

        let mut rows = self.rows.lock().unwrap_or_else(|e| e.into_inner());
        for record in records {
            rows.insert(record.id.clone(), record.clone());
        }
        debug!(count = records.len(), total = rows.len(), "Stored records in memory");
        Ok(records.len())
    }
}
