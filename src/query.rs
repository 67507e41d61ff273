//! Search query construction.

use crate::models::PageCursor;
use crate::shard::Shard;
use crate::types::{GraphQlRequest, SearchVariables};

/// GitHub caps `first` on search connections at 100.
pub const MAX_PAGE_SIZE: u32 = 100;

pub const SEARCH_QUERY: &str = r#"
query($q: String!, $first: Int!, $after: String) {
  rateLimit { limit remaining resetAt }
  search(query: $q, type: REPOSITORY, first: $first, after: $after) {
    repositoryCount
    pageInfo { hasNextPage endCursor }
    nodes {
      ... on Repository {
        id
        nameWithOwner
        stargazerCount
        url
        createdAt
      }
    }
  }
}
"#;

/// Parts of the search string shared by every shard
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuerySettings {
    pub base_filter: String,
    /// Sort qualifier that keeps pagination deterministic
    pub sort: String,
    pub page_size: u32,
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            base_filter: "is:public".to_string(),
            sort: "sort:stars-desc".to_string(),
            page_size: MAX_PAGE_SIZE,
        }
    }
}

/// A fully specified request for one page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub search: String,
    pub first: u32,
    pub after: Option<String>,
}

impl SearchQuery {
    pub fn for_shard(shard: &Shard, settings: &QuerySettings, cursor: &PageCursor) -> Self {
        let filter = shard.filter();
        let search = [settings.base_filter.as_str(), filter.as_str(), settings.sort.as_str()]
            .iter()
            .map(|part| part.trim())
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ");

        Self {
            search,
            first: settings.page_size.clamp(1, MAX_PAGE_SIZE),
            after: cursor.end_cursor.clone(),
        }
    }

    pub fn to_request(&self) -> GraphQlRequest<'_> {
        GraphQlRequest {
            query: SEARCH_QUERY,
            variables: SearchVariables {
                q: &self.search,
                first: self.first,
                after: self.after.as_deref(),
            },
        }
    }
}
