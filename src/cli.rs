use clap::Parser;

use crate::github::GRAPHQL_URL;

#[derive(Parser, Debug, Clone)]
#[command(name = "repo-harvester")]
#[command(about = "Repo Harvester - Collects GitHub repository metadata into SurrealDB")]
#[command(version = "0.1.0")]
pub struct Cli {
    /// GitHub token used for the GraphQL API
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub github_token: Option<String>,

    /// GraphQL endpoint
    #[arg(long, env = "GITHUB_GRAPHQL_URL", default_value = GRAPHQL_URL)]
    pub api_url: String,

    /// Explicit shard, e.g. `stars:100..200`, `stars:1000..` or
    /// `created:2010-01-01..2010-02-01` (repeatable)
    #[arg(long = "shard")]
    pub shards: Vec<String>,

    /// Split by star count at these boundaries, e.g. `0,10,100,1000`
    #[arg(long, value_delimiter = ',')]
    pub star_boundaries: Option<Vec<u64>>,

    /// First creation year to harvest when sharding by date
    #[arg(long, env = "START_YEAR", default_value_t = 2010)]
    pub start_year: i32,

    /// Last creation year to harvest when sharding by date
    #[arg(long, env = "END_YEAR", default_value_t = 2014)]
    pub end_year: i32,

    /// Length of each creation-date window in days
    #[arg(long, default_value_t = 30)]
    pub window_days: u32,

    /// Repositories per request (at most 100)
    #[arg(long, env = "PAGE_SIZE", default_value_t = 100)]
    pub page_size: u32,

    /// Qualifiers added to every search
    #[arg(long, default_value = "is:public")]
    pub base_filter: String,

    /// Sort qualifier keeping pagination deterministic
    #[arg(long, default_value = "sort:stars-desc")]
    pub sort: String,

    /// Attempts per page before giving up on transient errors
    #[arg(long, default_value_t = 5)]
    pub max_attempts: u32,

    /// First backoff delay in milliseconds
    #[arg(long, default_value_t = 1000)]
    pub backoff_base_ms: u64,

    /// Largest backoff delay in milliseconds
    #[arg(long, default_value_t = 60_000)]
    pub backoff_cap_ms: u64,

    /// Shards harvested concurrently
    #[arg(long, default_value_t = 1)]
    pub concurrency: usize,

    /// Stop after this many repositories have been stored
    #[arg(long, env = "REPOS_TO_FETCH")]
    pub record_limit: Option<usize>,

    /// SurrealDB connection URL
    #[arg(long, env = "DB_URL", default_value = "ws://localhost:8000")]
    pub db_url: String,

    /// SurrealDB username
    #[arg(long, env = "DB_USER", default_value = "root")]
    pub db_user: String,

    /// SurrealDB password
    #[arg(long, env = "DB_PASS", default_value = "root", hide_env_values = true)]
    pub db_pass: String,

    /// SurrealDB namespace
    #[arg(long, env = "DB_NAMESPACE", default_value = "harvest")]
    pub db_namespace: String,

    /// SurrealDB database
    #[arg(long, env = "DB_DATABASE", default_value = "repositories")]
    pub db_database: String,

    /// Maximum pooled database connections
    #[arg(long, default_value_t = 10)]
    pub db_pool_max_size: usize,

    /// Seconds to wait when opening a database connection
    #[arg(long, default_value_t = 30)]
    pub db_connection_timeout: u64,

    /// Use a SurrealDB instance on localhost
    #[arg(long)]
    pub local: bool,

    /// Keep results in memory instead of writing to the database
    #[arg(long)]
    pub dry_run: bool,

    /// Skip shards completed by earlier runs and continue failed ones
    #[arg(long)]
    pub resume: bool,
}
