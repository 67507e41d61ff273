pub mod cli;
pub mod config;
pub mod driver;
pub mod error;
pub mod github;
pub mod models;
pub mod pool;
pub mod query;
pub mod retry;
pub mod shard;
pub mod sink;
pub mod surreal_client;
pub mod types;

pub use driver::{DriverConfig, ShardDriver};
pub use error::{ErrorClass, HarvestError, Result};
