use std::future::Future;

use crate::error::AppError;
use crate::fields::Locator;
use crate::models::Record;

/// Read access to a region of a rendered page: the whole document or a
/// single item element within a list.
///
/// Reads never wait for elements to appear. A locator with no match
/// returns `Ok(false)` / `Ok(None)` rather than blocking.
pub trait PageScope: Send + Sync {
    /// Returns true if at least one element matches the locator.
    fn exists(&self, locator: &Locator) -> impl Future<Output = Result<bool, AppError>> + Send;

    /// Rendered text of the first matching element.
    fn read_text(
        &self,
        locator: &Locator,
    ) -> impl Future<Output = Result<Option<String>, AppError>> + Send;

    /// Attribute value of the first matching element.
    fn read_attribute(
        &self,
        locator: &Locator,
        name: &str,
    ) -> impl Future<Output = Result<Option<String>, AppError>> + Send;
}

/// Coarse document load milestone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    Loading,
    Interactive,
    Complete,
}

impl LoadState {
    /// Parses `document.readyState`.
    pub fn from_ready_state(state: &str) -> Self {
        match state {
            "complete" => LoadState::Complete,
            "interactive" => LoadState::Interactive,
            _ => LoadState::Loading,
        }
    }
}

/// The single browser tab a crawl run drives.
pub trait PageHandle: PageScope {
    /// Scope type for one item element of a list page.
    type Item: PageScope;

    fn navigate(&self, url: &str) -> impl Future<Output = Result<(), AppError>> + Send;

    fn current_url(&self) -> impl Future<Output = Result<String, AppError>> + Send;

    /// All elements matching `selector`, in document order.
    fn items(
        &self,
        selector: &str,
    ) -> impl Future<Output = Result<Vec<Self::Item>, AppError>> + Send;

    /// Returns true if the first element matching `selector` is rendered
    /// with a non-empty box.
    fn is_visible(&self, selector: &str) -> impl Future<Output = Result<bool, AppError>> + Send;

    fn load_state(&self) -> impl Future<Output = Result<LoadState, AppError>> + Send;

    /// Length of the trimmed body text.
    fn body_text_len(&self) -> impl Future<Output = Result<usize, AppError>> + Send;

    /// Scrolls down by a fraction of the document height.
    fn scroll_by(&self, fraction: f64) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Clicks the first matching element. Returns false when nothing matched.
    fn click(&self, locator: &Locator) -> impl Future<Output = Result<bool, AppError>> + Send;

    /// Replaces a closed or unreachable tab with a fresh one.
    fn recover(&self) -> impl Future<Output = Result<(), AppError>> + Send;
}

/// Append-only persistence for finished records and whole-run blobs.
pub trait Sink: Send + Sync + Clone {
    /// Persist one finished record.
    fn append(&self, record: &Record) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Store a keyed blob (used for the end-of-run snapshot).
    fn put_blob(
        &self,
        key: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> impl Future<Output = Result<(), AppError>> + Send;
}

/// A no-op Sink for use when persistence is not needed.
#[derive(Debug, Clone)]
pub struct NullSink;

impl Sink for NullSink {
    async fn append(&self, _record: &Record) -> Result<(), AppError> {
        Ok(())
    }

    async fn put_blob(&self, _key: &str, _bytes: &[u8], _content_type: &str) -> Result<(), AppError> {
        Ok(())
    }
}

/// An absent sink accepts everything.
impl<S: Sink> Sink for Option<S> {
    async fn append(&self, record: &Record) -> Result<(), AppError> {
        match self {
            Some(sink) => sink.append(record).await,
            None => Ok(()),
        }
    }

    async fn put_blob(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<(), AppError> {
        match self {
            Some(sink) => sink.put_blob(key, bytes, content_type).await,
            None => Ok(()),
        }
    }
}

/// Writes to both sinks in order. The second sink is still attempted when
/// the first fails; the first error is returned.
impl<A: Sink, B: Sink> Sink for (A, B) {
    async fn append(&self, record: &Record) -> Result<(), AppError> {
        let first = self.0.append(record).await;
        let second = self.1.append(record).await;
        first.and(second)
    }

    async fn put_blob(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<(), AppError> {
        let first = self.0.put_blob(key, bytes, content_type).await;
        let second = self.1.put_blob(key, bytes, content_type).await;
        first.and(second)
    }
}
