//! Runtime configuration assembled from the command line and environment.

use std::time::Duration;

use tracing::warn;
use url::Url;

use crate::cli::Cli;
use crate::driver::DriverConfig;
use crate::error::{HarvestError, Result};
use crate::pool::{PoolConfig, SurrealConnectionConfig};
use crate::query::{QuerySettings, MAX_PAGE_SIZE};
use crate::retry::RetryPolicy;
use crate::shard::{self, Shard};

const LOCAL_DB_URL: &str = "ws://localhost:8000";

#[derive(Debug, Clone)]
pub struct HarvestConfig {
    pub token: String,
    pub endpoint: Url,
    pub shards: Vec<Shard>,
    pub driver: DriverConfig,
    pub store: SurrealConnectionConfig,
    pub pool: PoolConfig,
    pub dry_run: bool,
    pub resume: bool,
}

impl HarvestConfig {
    pub fn from_cli(cli: Cli) -> Result<Self> {
        let token = cli
            .github_token
            .clone()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| HarvestError::ConfigError("GITHUB_TOKEN is not set".to_string()))?;

        let endpoint = Url::parse(&cli.api_url)
            .map_err(|e| HarvestError::ConfigError(format!("invalid API URL {}: {}", cli.api_url, e)))?;

        if cli.page_size == 0 || cli.page_size > MAX_PAGE_SIZE {
            return Err(HarvestError::ConfigError(format!(
                "page size must be between 1 and {}, got {}",
                MAX_PAGE_SIZE, cli.page_size
            )));
        }
        if cli.max_attempts == 0 {
            return Err(HarvestError::ConfigError("max attempts must be at least 1".to_string()));
        }
        if cli.concurrency == 0 {
            return Err(HarvestError::ConfigError("concurrency must be at least 1".to_string()));
        }
        if cli.backoff_base_ms > cli.backoff_cap_ms {
            return Err(HarvestError::ConfigError(format!(
                "backoff base {}ms exceeds cap {}ms",
                cli.backoff_base_ms, cli.backoff_cap_ms
            )));
        }

        let shards = shards_from_cli(&cli)?;
        for (i, j) in shard::find_overlaps(&shards) {
            warn!(
                dimension = ?shards[i].dimension(),
            first = %shards[i],
                second = %shards[j],
                "Shards overlap; repositories in both will be written twice"
            );
        }

        let driver = DriverConfig {
            query: QuerySettings {
                base_filter: cli.base_filter.clone(),
                sort: cli.sort.clone(),
                page_size: cli.page_size,
            },
            retry: RetryPolicy::new(
                cli.max_attempts,
                Duration::from_millis(cli.backoff_base_ms),
                Duration::from_millis(cli.backoff_cap_ms),
            ),
            concurrency: cli.concurrency,
            record_limit: cli.record_limit,
        };

        let store = SurrealConnectionConfig {
            url: if cli.local {
                LOCAL_DB_URL.to_string()
            } else {
                cli.db_url.clone()
            },
            username: cli.db_user.clone(),
            password: cli.db_pass.clone(),
            namespace: cli.db_namespace.clone(),
            database: cli.db_database.clone(),
        };

        let pool = PoolConfig {
            max_size: cli.db_pool_max_size.max(1),
            connection_timeout: Duration::from_secs(cli.db_connection_timeout),
            ..PoolConfig::default()
        };

        Ok(Self {
            token,
            endpoint,
            shards,
            driver,
            store,
            pool,
            dry_run: cli.dry_run,
            resume: cli.resume,
        })
    }
}

/// Explicit `--shard` specs win over `--star-boundaries`, which win over
/// yearly creation-date windows.
fn shards_from_cli(cli: &Cli) -> Result<Vec<Shard>> {
    if !cli.shards.is_empty() {
        return cli.shards.iter().map(|spec| spec.parse::<Shard>()).collect();
    }
    if let Some(boundaries) = &cli.star_boundaries {
        return shard::star_bands(boundaries);
    }
    shard::yearly_date_windows(cli.start_year, cli.end_year, cli.window_days)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["repo-harvester", "--github-token", "ghp_test"];
        argv.extend_from_slice(args);
        Cli::parse_from(argv)
    }

    #[test]
    fn test_default_shards_are_thirty_day_windows() {
        let config = HarvestConfig::from_cli(parse(&["--start-year", "2010", "--end-year", "2010"]))
            .unwrap();
        assert_eq!(config.shards.len(), 13);
        assert_eq!(config.shards[0].label(), "created:2010-01-01..2010-01-31");
        assert_eq!(config.shards[12].label(), "created:2010-12-27..2011-01-01");
    }

    #[test]
    fn test_explicit_shards_take_precedence() {
        let config = HarvestConfig::from_cli(parse(&[
            "--shard",
            "stars:100..200",
            "--star-boundaries",
            "0,10",
        ]))
        .unwrap();
        assert_eq!(config.shards.len(), 1);
        assert_eq!(config.shards[0].filter(), "stars:100..199");
    }

    #[test]
    fn test_star_boundaries() {
        let config = HarvestConfig::from_cli(parse(&["--star-boundaries", "0,10,100"])).unwrap();
        let labels: Vec<String> = config.shards.iter().map(|s| s.label()).collect();
        assert_eq!(labels, vec!["stars:0..10", "stars:10..100", "stars:100.."]);
    }

    #[test]
    fn test_rejects_oversized_page() {
        let err = HarvestConfig::from_cli(parse(&["--page-size", "101"])).unwrap_err();
        assert!(matches!(err, HarvestError::ConfigError(_)));
    }

    #[test]
    fn test_local_overrides_db_url() {
        let config = HarvestConfig::from_cli(parse(&["--local", "--db-url", "ws://db:8000"])).unwrap();
        assert_eq!(config.store.url, LOCAL_DB_URL);
    }

    #[test]
    fn test_missing_token_is_run_fatal() {
        let cli = Cli::parse_from(["repo-harvester", "--github-token", ""]);
        let err = HarvestConfig::from_cli(cli).unwrap_err();
        assert!(err.is_run_fatal());
    }
}
