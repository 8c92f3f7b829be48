use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Output fields a field table can resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldName {
    Title,
    Thumbnail,
    Link,
    ViewCount,
    Age,
    Duration,
    Likes,
    Creator,
    CommentsCount,
    Summary,
}

impl FieldName {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldName::Title => "title",
            FieldName::Thumbnail => "thumbnail",
            FieldName::Link => "link",
            FieldName::ViewCount => "view_count",
            FieldName::Age => "age",
            FieldName::Duration => "duration",
            FieldName::Likes => "likes",
            FieldName::Creator => "creator",
            FieldName::CommentsCount => "comments_count",
            FieldName::Summary => "summary",
        }
    }
}

impl fmt::Display for FieldName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which crawl phase a page visit belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Phase {
    List,
    Detail,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::List => write!(f, "LIST"),
            Phase::Detail => write!(f, "DETAIL"),
        }
    }
}

/// A pending page visit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlItem {
    pub canonical_url: String,
    pub phase: Phase,
}

impl CrawlItem {
    pub fn list(canonical_url: impl Into<String>) -> Self {
        Self {
            canonical_url: canonical_url.into(),
            phase: Phase::List,
        }
    }

    pub fn detail(canonical_url: impl Into<String>) -> Self {
        Self {
            canonical_url: canonical_url.into(),
            phase: Phase::Detail,
        }
    }
}

/// Result of resolving one field: the value and which candidate produced it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractionOutcome {
    pub value: Option<String>,
    pub matched_candidate: Option<usize>,
}

impl ExtractionOutcome {
    pub fn matched(value: String, index: usize) -> Self {
        Self {
            value: Some(value),
            matched_candidate: Some(index),
        }
    }

    pub fn missing() -> Self {
        Self::default()
    }
}

/// Per-field outcomes keyed by field name.
pub type FieldValues = BTreeMap<FieldName, ExtractionOutcome>;

/// One output record, identified by its canonical URL.
///
/// Starts with listing fields (or empty for detail-only seeds) and is
/// enriched with detail fields before it is persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    canonical_url: String,
    pub title: Option<String>,
    pub thumbnail_url: Option<String>,
    pub link: Option<String>,
    pub view_count_text: Option<String>,
    pub age_text: Option<String>,
    pub duration_text: Option<String>,
    pub likes_text: Option<String>,
    pub creator_name: Option<String>,
    pub comments_count_text: Option<String>,
    pub summary_text: Option<String>,
}

impl Record {
    pub fn new(canonical_url: impl Into<String>) -> Self {
        Self {
            canonical_url: canonical_url.into(),
            ..Self::default()
        }
    }

    pub fn canonical_url(&self) -> &str {
        &self.canonical_url
    }

    pub fn get(&self, field: FieldName) -> Option<&str> {
        match field {
            FieldName::Title => self.title.as_deref(),
            FieldName::Thumbnail => self.thumbnail_url.as_deref(),
            FieldName::Link => self.link.as_deref(),
            FieldName::ViewCount => self.view_count_text.as_deref(),
            FieldName::Age => self.age_text.as_deref(),
            FieldName::Duration => self.duration_text.as_deref(),
            FieldName::Likes => self.likes_text.as_deref(),
            FieldName::Creator => self.creator_name.as_deref(),
            FieldName::CommentsCount => self.comments_count_text.as_deref(),
            FieldName::Summary => self.summary_text.as_deref(),
        }
    }

    fn slot_mut(&mut self, field: FieldName) -> &mut Option<String> {
        match field {
            FieldName::Title => &mut self.title,
            FieldName::Thumbnail => &mut self.thumbnail_url,
            FieldName::Link => &mut self.link,
            FieldName::ViewCount => &mut self.view_count_text,
            FieldName::Age => &mut self.age_text,
            FieldName::Duration => &mut self.duration_text,
            FieldName::Likes => &mut self.likes_text,
            FieldName::Creator => &mut self.creator_name,
            FieldName::CommentsCount => &mut self.comments_count_text,
            FieldName::Summary => &mut self.summary_text,
        }
    }

    pub fn set(&mut self, field: FieldName, value: Option<String>) {
        *self.slot_mut(field) = value;
    }

    /// Merges resolved values into this record. Resolved values win over
    /// existing ones; unresolved fields leave the existing value in place.
    pub fn merge(&mut self, values: &FieldValues) {
        for (field, outcome) in values {
            if let Some(value) = &outcome.value {
                self.set(*field, Some(value.clone()));
            }
        }
    }

    /// Number of non-null fields, excluding the canonical URL.
    pub fn resolved_count(&self) -> usize {
        ALL_FIELDS.iter().filter(|f| self.get(**f).is_some()).count()
    }
}

const ALL_FIELDS: [FieldName; 10] = [
    FieldName::Title,
    FieldName::Thumbnail,
    FieldName::Link,
    FieldName::ViewCount,
    FieldName::Age,
    FieldName::Duration,
    FieldName::Likes,
    FieldName::Creator,
    FieldName::CommentsCount,
    FieldName::Summary,
];

/// Compute a SHA-256 hash of a string, returned as 64-char hex.
pub fn compute_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}
