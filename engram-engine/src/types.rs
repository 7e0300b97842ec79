//! Request and response shapes of the engine surface.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use engram_core::memory::{MemoryKind, MemoryRecord, TagInfo};
use engram_storage::aux::PromptRow;

/// Input for `add_memory`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMemory {
    pub content: String,
    pub container_tag: String,
    #[serde(rename = "type")]
    pub kind: Option<MemoryKind>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub display_name: Option<String>,
    pub user_name: Option<String>,
    pub user_email: Option<String>,
    pub project_path: Option<String>,
    pub project_name: Option<String>,
    pub git_repo_url: Option<String>,
    /// Raw JSON blob, stored opaquely.
    pub metadata: Option<serde_json::Value>,
}

/// Input for `update_memory`; omitted fields keep their stored value.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMemory {
    pub content: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<MemoryKind>,
    pub tags: Option<Vec<String>>,
}

/// One entry in the paged timeline.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TimelineItem {
    Memory(MemoryRecord),
    Prompt(PromptRow),
}

/// A page of the timeline.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListedPage {
    pub items: Vec<TimelineItem>,
    /// Total memory count before paging.
    pub total: u64,
    pub page: usize,
    pub page_size: usize,
}

/// Distinct container tags split by scope.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TagListing {
    pub user: Vec<TagInfo>,
    pub project: Vec<TagInfo>,
}

/// Store-wide totals.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsReport {
    pub total: u64,
    pub user: u64,
    pub project: u64,
    pub by_type: BTreeMap<String, u64>,
    pub shard_count: u64,
}
