use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{timestamp, SourceType};

/// One retrieved passage backing an assistant answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub name: String,
    pub source_type: SourceType,
    pub snippet: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceItem {
    pub name: String,
    pub source_type: SourceType,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
}

impl SourceItem {
    pub fn display_key(&self) -> (&str, DateTime<Utc>) {
        (self.name.as_str(), self.created_at)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    pub source_type: Option<SourceType>,
    pub top_k: i64,
    pub enable_mcp: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub answer: String,
    #[serde(default)]
    pub sources: Vec<Citation>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestUrlsRequest {
    pub urls: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestResponse {
    pub inserted: u64,
    pub source_type: SourceType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}
