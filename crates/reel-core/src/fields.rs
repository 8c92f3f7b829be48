//! Declarative field tables.
//!
//! Every output field is resolved from an ordered list of candidate
//! locators. The tables are plain data: the built-in defaults describe the
//! current video-platform markup, and a JSON file with the same shape can
//! replace them without touching code.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::FieldName;
use crate::normalize::Transform;

/// A CSS selector, optionally narrowed to elements whose rendered text
/// contains a substring (case-insensitive).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Locator {
    pub selector: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contains: Option<String>,
}

impl Locator {
    pub fn css(selector: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
            contains: None,
        }
    }

    pub fn containing(mut self, text: impl Into<String>) -> Self {
        self.contains = Some(text.into());
        self
    }

    /// Applies the `contains` filter to an element's text.
    pub fn accepts_text(&self, text: &str) -> bool {
        match &self.contains {
            Some(needle) => text.to_lowercase().contains(&needle.to_lowercase()),
            None => true,
        }
    }
}

impl std::fmt::Display for Locator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.contains {
            Some(text) => write!(f, "{} (contains {text:?})", self.selector),
            None => write!(f, "{}", self.selector),
        }
    }
}

/// How a value is read from a located element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ExtractionMode {
    /// Rendered text content.
    Text,
    /// A named attribute.
    Attribute { name: String },
    /// The `content` attribute of a `<meta>` tag.
    MetaContent,
}

/// One locator + extraction mode pair tried for a field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    #[serde(flatten)]
    pub locator: Locator,
    #[serde(flatten)]
    pub mode: ExtractionMode,
}

impl Candidate {
    pub fn text(selector: impl Into<String>) -> Self {
        Self {
            locator: Locator::css(selector),
            mode: ExtractionMode::Text,
        }
    }

    pub fn attribute(selector: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            locator: Locator::css(selector),
            mode: ExtractionMode::Attribute { name: name.into() },
        }
    }

    pub fn meta(selector: impl Into<String>) -> Self {
        Self {
            locator: Locator::css(selector),
            mode: ExtractionMode::MetaContent,
        }
    }

    pub fn containing(mut self, text: impl Into<String>) -> Self {
        self.locator = self.locator.containing(text);
        self
    }
}

/// A named field with its ordered fallback candidates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: FieldName,
    pub candidates: Vec<Candidate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<Transform>,
}

impl FieldSpec {
    pub fn new(name: FieldName, candidates: Vec<Candidate>) -> Self {
        Self {
            name,
            candidates,
            transform: None,
        }
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = Some(transform);
        self
    }

    /// Applies the field's transform to a trimmed, non-empty raw value.
    /// `None` means the value was rejected.
    pub fn normalize(&self, raw: &str) -> Option<String> {
        match self.transform {
            Some(transform) => transform.apply(raw),
            None => Some(raw.to_string()),
        }
    }
}

/// Best-effort step run on a detail page before extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum PageAction {
    /// Scroll down by a fraction of the document height.
    Scroll { fraction: f64 },
    /// Click the first element matching the selector, if any.
    Click { selector: String },
    /// Poll until the selector matches, up to the timeout.
    WaitFor {
        selector: String,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },
}

/// The fields extracted in one phase, plus the page hooks around them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldTable {
    /// Structural anchor the page-ready gate waits for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anchor: Option<String>,
    /// Item container selectors for list pages, tried in order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub item_selectors: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub prepare: Vec<PageAction>,
    pub fields: Vec<FieldSpec>,
}

impl FieldTable {
    pub fn field(&self, name: FieldName) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    fn validate(&self, label: &str) -> Result<(), AppError> {
        if self.fields.is_empty() {
            return Err(AppError::ConfigError(format!(
                "{label} table has no fields"
            )));
        }

        let mut seen = HashSet::new();
        for spec in &self.fields {
            if !seen.insert(spec.name) {
                return Err(AppError::ConfigError(format!(
                    "{label} table declares field '{}' twice",
                    spec.name
                )));
            }
            if spec.candidates.is_empty() {
                return Err(AppError::ConfigError(format!(
                    "{label} field '{}' has no candidates",
                    spec.name
                )));
            }
            for candidate in &spec.candidates {
                if candidate.locator.selector.trim().is_empty() {
                    return Err(AppError::ConfigError(format!(
                        "{label} field '{}' has an empty selector",
                        spec.name
                    )));
                }
                if let ExtractionMode::Attribute { name } = &candidate.mode
                    && name.trim().is_empty()
                {
                    return Err(AppError::ConfigError(format!(
                        "{label} field '{}' reads an attribute without a name",
                        spec.name
                    )));
                }
            }
        }

        for action in &self.prepare {
            let selector = match action {
                PageAction::Scroll { fraction } => {
                    if !(0.0..=1.0).contains(fraction) {
                        return Err(AppError::ConfigError(format!(
                            "{label} scroll fraction {fraction} is outside 0..=1"
                        )));
                    }
                    continue;
                }
                PageAction::Click { selector } | PageAction::WaitFor { selector, .. } => selector,
            };
            if selector.trim().is_empty() {
                return Err(AppError::ConfigError(format!(
                    "{label} page action has an empty selector"
                )));
            }
        }

        Ok(())
    }
}

/// Listing and detail tables for one run. Built once, immutable afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldTables {
    pub listing: FieldTable,
    pub detail: FieldTable,
}

impl FieldTables {
    /// Load tables from a JSON file and validate them.
    pub fn load(path: &Path) -> Result<Self, AppError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            AppError::ConfigError(format!(
                "Failed to read field table file {}: {e}",
                path.display()
            ))
        })?;
        let tables: FieldTables = serde_json::from_str(&raw).map_err(|e| {
            AppError::ConfigError(format!(
                "Invalid field table file {}: {e}",
                path.display()
            ))
        })?;
        tables.validate()?;
        Ok(tables)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        self.listing.validate("listing")?;
        self.detail.validate("detail")?;
        if self
            .listing
            .item_selectors
            .iter()
            .all(|s| s.trim().is_empty())
        {
            return Err(AppError::ConfigError(
                "listing table needs at least one item selector".into(),
            ));
        }
        Ok(())
    }
}

impl Default for FieldTables {
    fn default() -> Self {
        Self {
            listing: default_listing_table(),
            detail: default_detail_table(),
        }
    }
}

fn default_listing_table() -> FieldTable {
    FieldTable {
        anchor: Some("ytd-rich-grid-renderer".into()),
        item_selectors: vec![
            "ytd-two-column-browse-results-renderer div#primary ytd-rich-grid-renderer div#contents ytd-rich-item-renderer".into(),
            "ytd-rich-grid-renderer ytd-rich-item-renderer".into(),
            "ytd-grid-video-renderer".into(),
        ],
        prepare: Vec::new(),
        fields: vec![
            FieldSpec::new(
                FieldName::Title,
                vec![
                    Candidate::attribute("a#video-title-link", "title"),
                    Candidate::text("#video-title"),
                    Candidate::attribute("a#video-title-link", "aria-label"),
                    Candidate::text("a#video-title-link"),
                ],
            ),
            FieldSpec::new(
                FieldName::Thumbnail,
                vec![
                    Candidate::attribute("yt-image img", "src"),
                    Candidate::attribute("img", "src"),
                ],
            ),
            FieldSpec::new(
                FieldName::Link,
                vec![
                    Candidate::attribute("a#video-title-link", "href"),
                    Candidate::attribute("a#thumbnail", "href"),
                    Candidate::attribute("a[href*=\"/watch\"]", "href"),
                ],
            ),
            FieldSpec::new(
                FieldName::ViewCount,
                vec![
                    Candidate::text("#metadata-line span").containing("views"),
                    Candidate::text("span").containing("views"),
                ],
            )
            .with_transform(Transform::Magnitude),
            FieldSpec::new(
                FieldName::Age,
                vec![
                    Candidate::text("#metadata-line span").containing("ago"),
                    Candidate::text("span").containing("ago"),
                ],
            ),
            FieldSpec::new(
                FieldName::Duration,
                vec![
                    Candidate::text("ytd-thumbnail-overlay-time-status-renderer #text"),
                    Candidate::text("badge-shape .badge-shape-wiz__text"),
                ],
            )
            .with_transform(Transform::Duration),
        ],
    }
}

fn default_detail_table() -> FieldTable {
    FieldTable {
        anchor: Some("ytd-watch-metadata".into()),
        item_selectors: Vec::new(),
        prepare: vec![
            PageAction::Scroll { fraction: 0.5 },
            PageAction::Click {
                selector: "tp-yt-paper-button#expand".into(),
            },
            PageAction::WaitFor {
                selector: "ytd-comments-header-renderer #count".into(),
                timeout_ms: None,
            },
        ],
        fields: vec![
            FieldSpec::new(
                FieldName::Title,
                vec![
                    Candidate::text("#title h1.style-scope.ytd-watch-metadata yt-formatted-string"),
                    Candidate::text("h1.ytd-watch-metadata yt-formatted-string"),
                    Candidate::text("h1.ytd-watch-metadata"),
                    Candidate::text("h1[class*=\"watch\"]"),
                    Candidate::meta("meta[property=\"og:title\"]"),
                    Candidate::text("title"),
                ],
            ),
            FieldSpec::new(
                FieldName::Thumbnail,
                vec![
                    Candidate::meta("meta[property=\"og:image\"]"),
                    Candidate::attribute("link[itemprop=\"thumbnailUrl\"]", "href"),
                ],
            ),
            FieldSpec::new(
                FieldName::Duration,
                vec![
                    Candidate::meta("meta[itemprop=\"duration\"]"),
                    Candidate::text(".ytp-time-duration"),
                    Candidate::text("span.ytp-time-duration"),
                    Candidate::text("[class*=\"duration\"]"),
                ],
            )
            .with_transform(Transform::Duration),
            FieldSpec::new(
                FieldName::Likes,
                vec![
                    Candidate::attribute("like-button-view-model button", "aria-label"),
                    Candidate::attribute("button[aria-label*=\"along with\"]", "aria-label"),
                    Candidate::text(
                        "segmented-like-dislike-button-view-model button .yt-spec-button-shape-next__button-text-content",
                    ),
                    Candidate::text("button[aria-label*=\"like\"] span"),
                    Candidate::text("yt-formatted-string#text").containing("likes"),
                    Candidate::text("button[aria-label*=\"Like\"]"),
                ],
            )
            .with_transform(Transform::Magnitude),
            FieldSpec::new(
                FieldName::Creator,
                vec![
                    Candidate::text("ytd-channel-name a"),
                    Candidate::text("ytd-channel-name #text"),
                    Candidate::text("ytd-channel-name yt-formatted-string a"),
                    Candidate::text("a[class*=\"channel\"]"),
                    Candidate::attribute("span[itemprop=\"author\"] link[itemprop=\"name\"]", "content"),
                    Candidate::meta("meta[itemprop=\"author\"]"),
                ],
            ),
            FieldSpec::new(
                FieldName::CommentsCount,
                vec![
                    Candidate::text("ytd-comments-header-renderer #count"),
                    Candidate::text("ytd-comments-header-renderer .count-text"),
                    Candidate::text("ytd-comments-header-renderer #title #count"),
                    Candidate::text("yt-formatted-string.count-text"),
                ],
            )
            .with_transform(Transform::Magnitude),
            FieldSpec::new(
                FieldName::Summary,
                vec![
                    Candidate::text("ytd-text-inline-expander #expanded"),
                    Candidate::text("ytd-expander #content"),
                    Candidate::text("ytd-expander #description"),
                    Candidate::text("#description"),
                    Candidate::meta("meta[property=\"og:description\"]"),
                    Candidate::meta("meta[name=\"description\"]"),
                ],
            ),
        ],
    }
}
