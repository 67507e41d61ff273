use thiserror::Error;

/// How far an error reaches: absorbed by backoff, fatal for the current
/// shard, or fatal for the whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Transient,
    FatalPage,
    FatalRun,
}

#[derive(Error, Debug)]
pub enum HarvestError {
    #[error("GitHub API error: {0}")]
    ApiError(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    #[error("Upstream returned {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Search timed out: {0}")]
    SearchTimeout(String),

    #[error("Authentication error: {0}")]
    AuthError(String),

    #[error("Gave up after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: Box<HarvestError>,
    },

    #[error("Store error: {0}")]
    StoreError(String),

    #[error("Invalid shard: {0}")]
    InvalidShard(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Cancelled")]
    Cancelled,
}

impl HarvestError {
    pub fn class(&self) -> ErrorClass {
        match self {
            HarvestError::RateLimitExceeded(_)
            | HarvestError::Upstream { .. }
            | HarvestError::NetworkError(_)
            | HarvestError::SearchTimeout(_) => ErrorClass::Transient,
            HarvestError::AuthError(_) | HarvestError::ConfigError(_) => ErrorClass::FatalRun,
            HarvestError::ApiError(_)
            | HarvestError::MalformedResponse(_)
            | HarvestError::RetriesExhausted { .. }
            | HarvestError::StoreError(_)
            | HarvestError::InvalidShard(_)
            | HarvestError::Cancelled => ErrorClass::FatalPage,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.class() == ErrorClass::Transient
    }

    pub fn is_run_fatal(&self) -> bool {
        self.class() == ErrorClass::FatalRun
    }
}

pub type Result<T> = std::result::Result<T, HarvestError>;
