use crate::error::{HarvestError, Result};
use crate::models::{Page, PageCursor, RateLimitState, RepositoryRecord};
use crate::query::SearchQuery;
use crate::types::{GraphQlResponse, RepositoryNode};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, AUTHORIZATION};
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

pub const GRAPHQL_URL: &str = "https://api.github.com/graphql";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const LOW_RATE_LIMIT: u32 = 10;

/// Source of search result pages.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Issue exactly one request. Implementations must not retry; failures
    /// are classified through [`HarvestError::class`].
    async fn fetch_page(&self, query: &SearchQuery) -> Result<Page>;
}

pub struct GitHubClient {
    client: Client,
    token: String,
    endpoint: Url,
}

impl GitHubClient {
    pub fn new(token: String) -> Result<Self> {
        let endpoint = Url::parse(GRAPHQL_URL)
            .map_err(|e| HarvestError::ConfigError(format!("Invalid endpoint: {}", e)))?;
        Self::with_endpoint(token, endpoint)
    }

    pub fn with_endpoint(token: String, endpoint: Url) -> Result<Self> {
        let client = Client::builder()
            .user_agent("repo-harvester/0.1.0")
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(GitHubClient {
            client,
            token,
            endpoint,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl PageFetcher for GitHubClient {
    async fn fetch_page(&self, query: &SearchQuery) -> Result<Page> {
        debug!(search = %query.search, after = ?query.after, "Requesting search page");

        let response = self
            .client
            .post(self.endpoint.clone())
            .header(AUTHORIZATION, format!("bearer {}", self.token))
            .json(&query.to_request())
            .send()
            .await?;

        let status = response.status();
        let header_rate_limit = rate_limit_from_headers(response.headers());

        if !status.is_success() {
            let remaining = header_rate_limit.as_ref().map(|r| r.remaining);
            let error_text = response.text().await.unwrap_or_default();
            return Err(classify_status(status, remaining, &error_text));
        }

        let body = response.text().await?;
        let mut page = parse_page(&body, Utc::now())?;
        if page.rate_limit.is_none() {
            page.rate_limit = header_rate_limit;
        }

        if let Some(rate_limit) = &page.rate_limit {
            if rate_limit.remaining < LOW_RATE_LIMIT {
                warn!(
                    remaining = rate_limit.remaining,
                    reset_time = %rate_limit.reset_time,
                    "Rate limit low"
                );
            }
        }

        Ok(page)
    }
}

/// Map a non-success HTTP status onto the error taxonomy.
pub fn classify_status(status: StatusCode, rate_limit_remaining: Option<u32>, body: &str) -> HarvestError {
    let message = if body.trim().is_empty() {
        status.to_string()
    } else {
        body.trim().to_string()
    };

    match status {
        StatusCode::UNAUTHORIZED => HarvestError::AuthError(message),
        StatusCode::TOO_MANY_REQUESTS => HarvestError::RateLimitExceeded(message),
        StatusCode::FORBIDDEN => {
            if rate_limit_remaining == Some(0) || mentions_rate_limit(body) {
                HarvestError::RateLimitExceeded(message)
            } else {
                HarvestError::AuthError(format!("Forbidden: {}", message))
            }
        }
        StatusCode::REQUEST_TIMEOUT => HarvestError::Upstream {
            status: status.as_u16(),
            message,
        },
        status if status.is_server_error() => HarvestError::Upstream {
            status: status.as_u16(),
            message,
        },
        status => HarvestError::ApiError(format!(
            "API request failed with status {}: {}",
            status, message
        )),
    }
}

fn mentions_rate_limit(body: &str) -> bool {
    body.to_ascii_lowercase().contains("rate limit")
}

/// GitHub reports search timeouts as a 200 with an `errors` entry.
fn mentions_timeout(message: &str) -> bool {
    message.to_ascii_lowercase().contains("timeout")
}

/// Decode a GraphQL search response body into a page.
pub fn parse_page(body: &str, observed_at: DateTime<Utc>) -> Result<Page> {
    let response: GraphQlResponse = serde_json::from_str(body)
        .map_err(|e| HarvestError::MalformedResponse(format!("undecodable body: {}", e)))?;

    if !response.errors.is_empty() {
        if response
            .errors
            .iter()
            .any(|e| e.kind.as_deref() == Some("RATE_LIMITED"))
        {
            return Err(HarvestError::RateLimitExceeded(
                "GraphQL rate limit exceeded".to_string(),
            ));
        }
        if let Some(timeout) = response.errors.iter().find(|e| mentions_timeout(&e.message)) {
            return Err(HarvestError::SearchTimeout(timeout.message.clone()));
        }
        let messages = response
            .errors
            .iter()
            .map(|e| e.message.as_str())
            .collect::<Vec<_>>()
            .join("; ");
        return Err(HarvestError::ApiError(messages));
    }

    let data = response
        .data
        .ok_or_else(|| HarvestError::MalformedResponse("missing data".to_string()))?;
    let search = data
        .search
        .ok_or_else(|| HarvestError::MalformedResponse("missing data.search".to_string()))?;

    let mut records = Vec::with_capacity(search.nodes.len());
    for node in search.nodes.into_iter().flatten() {
        if node.as_object().is_some_and(|fields| fields.is_empty()) {
            continue;
        }
        let node: RepositoryNode = serde_json::from_value(node)
            .map_err(|e| HarvestError::MalformedResponse(format!("bad repository node: {}", e)))?;
        if node.id.trim().is_empty() {
            return Err(HarvestError::MalformedResponse(format!(
                "repository {} has an empty id",
                node.name_with_owner
            )));
        }
        records.push(RepositoryRecord {
            id: node.id,
            full_name: node.name_with_owner,
            stars: node.stargazer_count,
            url: node.url,
            created_at: node.created_at,
            last_scraped: observed_at,
        });
    }

    let page_info = search.page_info;
    if page_info.has_next_page && page_info.end_cursor.is_none() {
        return Err(HarvestError::MalformedResponse(
            "hasNextPage without an endCursor".to_string(),
        ));
    }

    let rate_limit = data.rate_limit.map(|r| RateLimitState {
        remaining: r.remaining,
        limit: r.limit,
        reset_time: r.reset_at,
        is_limited: r.remaining == 0,
    });

    Ok(Page {
        records,
        next: PageCursor {
            end_cursor: page_info.end_cursor,
            has_more: page_info.has_next_page,
        },
        total_count: search.repository_count,
        rate_limit,
    })
}

/// Rate limit state from the `x-ratelimit-*` response headers, if present.
pub fn rate_limit_from_headers(headers: &HeaderMap) -> Option<RateLimitState> {
    let header_value = |name: &str| headers.get(name).and_then(|h| h.to_str().ok());

    let remaining = header_value("x-ratelimit-remaining")?.parse::<u32>().ok()?;

    let limit = header_value("x-ratelimit-limit")
        .and_then(|s| s.parse::<u32>().ok())
        .unwrap_or(5000);

    let reset_time = header_value("x-ratelimit-reset")
        .and_then(|s| s.parse::<i64>().ok())
        .and_then(|timestamp| DateTime::from_timestamp(timestamp, 0))
        .unwrap_or_else(|| Utc::now() + chrono::Duration::hours(1));

    Some(RateLimitState {
        remaining,
        limit,
        reset_time,
        is_limited: remaining == 0,
    })
}
