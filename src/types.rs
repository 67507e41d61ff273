use serde::{Deserialize, Serialize};

// GitHub GraphQL response structures
#[derive(Debug, Deserialize)]
pub struct GraphQlResponse {
    pub data: Option<SearchData>,
    #[serde(default)]
    pub errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchData {
    pub search: Option<SearchConnection>,
    pub rate_limit: Option<RateLimitNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchConnection {
    pub repository_count: u64,
    pub page_info: PageInfo,
    /// Non-repository hits come back as `null` or as empty objects.
    pub nodes: Vec<Option<serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub has_next_page: bool,
    pub end_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryNode {
    pub id: String,
    pub name_with_owner: String,
    pub stargazer_count: u64,
    pub url: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitNode {
    pub limit: u32,
    pub remaining: u32,
    pub reset_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GraphQlError {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub message: String,
}

// GraphQL request payload
#[derive(Debug, Serialize)]
pub struct GraphQlRequest<'a> {
    pub query: &'static str,
    pub variables: SearchVariables<'a>,
}

#[derive(Debug, Serialize)]
pub struct SearchVariables<'a> {
    pub q: &'a str,
    pub first: u32,
    pub after: Option<&'a str>,
}
