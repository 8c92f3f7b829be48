//! Run input and the crawl plan derived from it.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::canonical::{canonicalize, is_item_url};
use crate::error::AppError;
use crate::models::CrawlItem;

pub const DEFAULT_START_URL: &str = "https://www.youtube.com";
pub const DEFAULT_MAX_VIDEOS: usize = 30;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartUrl {
    pub url: String,
}

/// The input document a run is started with.
///
/// `start_urls` distinguishes "absent" from "explicitly empty": an absent
/// list falls back to the platform homepage (unless a channel is given),
/// while an explicitly empty list with no channel is a configuration error.
///
/// Keys are accepted in both the runtime's camelCase (`startUrls`,
/// `maxVideos`) and snake_case. Unknown keys are rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunInput {
    #[serde(alias = "startUrls", skip_serializing_if = "Option::is_none")]
    pub start_urls: Option<Vec<StartUrl>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    #[serde(alias = "maxVideos", alias = "max_items", alias = "maxItems")]
    pub max_videos: usize,
}

impl Default for RunInput {
    fn default() -> Self {
        Self {
            start_urls: None,
            channel: None,
            max_videos: DEFAULT_MAX_VIDEOS,
        }
    }
}

impl RunInput {
    /// Reads a JSON input document.
    pub fn from_file(path: &Path) -> Result<Self, AppError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            AppError::ConfigError(format!("Failed to read input file {}: {e}", path.display()))
        })?;
        serde_json::from_str(&raw).map_err(|e| {
            AppError::ConfigError(format!("Invalid input file {}: {e}", path.display()))
        })
    }

    pub fn with_start_urls<I, S>(mut self, urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.start_urls = Some(urls.into_iter().map(|u| StartUrl { url: u.into() }).collect());
        self
    }

    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = Some(channel.into());
        self
    }

    pub fn with_max_videos(mut self, max_videos: usize) -> Self {
        self.max_videos = max_videos;
        self
    }

    /// Channel handle with spaces and `@` removed, if anything is left.
    pub fn channel_handle(&self) -> Option<String> {
        let handle: String = self
            .channel
            .as_deref()?
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '@')
            .collect();
        (!handle.is_empty()).then_some(handle)
    }

    /// Raw seed URLs in visiting order: the channel page first, then the
    /// explicit start URLs.
    pub fn seed_urls(&self) -> Vec<String> {
        let mut seeds = Vec::new();
        let channel = self.channel_handle();
        if let Some(handle) = &channel {
            seeds.push(format!("{DEFAULT_START_URL}/@{handle}/videos"));
        }
        match &self.start_urls {
            Some(urls) => seeds.extend(
                urls.iter()
                    .map(|u| u.url.trim().to_string())
                    .filter(|u| !u.is_empty()),
            ),
            None if channel.is_none() => seeds.push(DEFAULT_START_URL.to_string()),
            None => {}
        }
        seeds
    }

    /// Resolves seeds into a plan. Seeds that already address a single
    /// item become DETAIL items; everything else is listed first.
    pub fn into_plan(self) -> Result<CrawlPlan, AppError> {
        let mut seen = HashSet::new();
        let mut seeds = Vec::new();
        for raw in self.seed_urls() {
            let url = canonicalize(&raw)
                .map_err(|e| AppError::ConfigError(format!("Invalid seed URL: {e}")))?;
            if !seen.insert(url.clone()) {
                continue;
            }
            seeds.push(if is_item_url(&url) {
                CrawlItem::detail(url)
            } else {
                CrawlItem::list(url)
            });
        }

        let plan = CrawlPlan::new(seeds, self.max_videos);
        plan.validate()?;
        Ok(plan)
    }
}

/// Resolved seeds and quota for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CrawlPlan {
    pub seeds: Vec<CrawlItem>,
    pub max_items: usize,
}

impl CrawlPlan {
    pub fn new(seeds: Vec<CrawlItem>, max_items: usize) -> Self {
        Self { seeds, max_items }
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.seeds.is_empty() {
            return Err(AppError::ConfigError("seed list is empty".into()));
        }
        Ok(())
    }
}
