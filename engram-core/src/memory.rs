//! The universal memory record and its supporting enums.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Routing scope of a container tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    User,
    Project,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::User => "user",
            Scope::Project => "project",
        }
    }

    /// Parse a scope segment. Anything unrecognized is `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Scope::User),
            "project" => Some(Scope::Project),
            _ => None,
        }
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification tag for a memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MemoryKind {
    Preference,
    Architecture,
    BugFix,
    Feature,
    Configuration,
    Discussion,
    Other,
}

impl MemoryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryKind::Preference => "preference",
            MemoryKind::Architecture => "architecture",
            MemoryKind::BugFix => "bug-fix",
            MemoryKind::Feature => "feature",
            MemoryKind::Configuration => "configuration",
            MemoryKind::Discussion => "discussion",
            MemoryKind::Other => "other",
        }
    }

    /// Parse a stored kind string, mapping anything unknown to `Other`.
    pub fn parse(s: &str) -> Self {
        match s {
            "preference" => MemoryKind::Preference,
            "architecture" => MemoryKind::Architecture,
            "bug-fix" => MemoryKind::BugFix,
            "feature" => MemoryKind::Feature,
            "configuration" => MemoryKind::Configuration,
            "discussion" => MemoryKind::Discussion,
            _ => MemoryKind::Other,
        }
    }
}

/// One persisted memory. Identity is immutable; `content` mutates only
/// through delete-then-insert, which preserves `id` and `created_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryRecord {
    /// Opaque identifier, `mem_<uuid>`.
    pub id: String,
    /// UTF-8 memory text.
    pub content: String,
    /// Routing key `{prefix}_{scope}_{hash}`. Never changes after insert.
    pub container_tag: String,
    /// Optional classification.
    #[serde(rename = "type")]
    pub kind: Option<MemoryKind>,
    /// Ordered short lowercase labels.
    pub tags: Vec<String>,
    /// Unit-normalized content embedding.
    pub vector: Vec<f32>,
    /// Optional embedding over the joined tag string.
    pub tags_vector: Option<Vec<f32>>,
    /// Human-context display fields.
    pub display_name: Option<String>,
    pub user_name: Option<String>,
    pub user_email: Option<String>,
    pub project_path: Option<String>,
    pub project_name: Option<String>,
    pub git_repo_url: Option<String>,
    /// Free-form JSON blob, stored raw and parsed only by typed accessors.
    pub metadata: Option<String>,
    /// Millisecond epochs.
    pub created_at: i64,
    pub updated_at: i64,
    /// Pinned memories are exempt from retention eviction.
    pub is_pinned: bool,
}

impl MemoryRecord {
    /// Generate a fresh opaque memory id.
    pub fn new_id() -> String {
        format!("mem_{}", Uuid::new_v4().simple())
    }

    /// Read a well-known metadata key without materializing the whole blob.
    pub fn metadata_str(&self, key: &str) -> Option<String> {
        let raw = self.metadata.as_deref()?;
        let value: serde_json::Value = serde_json::from_str(raw).ok()?;
        value.get(key)?.as_str().map(str::to_string)
    }

    /// The `promptId` metadata link, if any.
    pub fn prompt_id(&self) -> Option<String> {
        self.metadata_str("promptId")
    }

    /// The `source` metadata key, if any.
    pub fn source(&self) -> Option<String> {
        self.metadata_str("source")
    }
}

/// A distinct container tag with denormalized display fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagInfo {
    pub container_tag: String,
    pub scope: Scope,
    pub display_name: Option<String>,
    pub project_name: Option<String>,
    /// Number of memories stored under this tag.
    pub count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_round_trips_kebab_case() {
        let json = serde_json::to_string(&MemoryKind::BugFix).unwrap();
        assert_eq!(json, "\"bug-fix\"");
        let back: MemoryKind = serde_json::from_str(&json).unwrap();
        assert_eq!(back, MemoryKind::BugFix);
    }

    #[test]
    fn kind_parse_unknown_is_other() {
        assert_eq!(MemoryKind::parse("nonsense"), MemoryKind::Other);
    }

    #[test]
    fn new_ids_are_unique_and_prefixed() {
        let a = MemoryRecord::new_id();
        let b = MemoryRecord::new_id();
        assert!(a.starts_with("mem_"));
        assert_ne!(a, b);
    }

    #[test]
    fn metadata_accessors() {
        let record = MemoryRecord {
            id: MemoryRecord::new_id(),
            content: "x".to_string(),
            container_tag: "opencode_user_abc".to_string(),
            kind: None,
            tags: vec![],
            vector: vec![],
            tags_vector: None,
            display_name: None,
            user_name: None,
            user_email: None,
            project_path: None,
            project_name: None,
            git_repo_url: None,
            metadata: Some(r#"{"source":"auto-capture","promptId":"p1"}"#.to_string()),
            created_at: 0,
            updated_at: 0,
            is_pinned: false,
        };
        assert_eq!(record.source().as_deref(), Some("auto-capture"));
        assert_eq!(record.prompt_id().as_deref(), Some("p1"));
        assert_eq!(record.metadata_str("missing"), None);
    }
}
