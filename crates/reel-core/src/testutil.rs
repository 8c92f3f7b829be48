//! Test utilities: mock implementations of the page and sink traits.
//!
//! Handwritten mocks for dependency injection in unit tests.
//! Recorded calls live behind `Arc<Mutex<_>>` so clones handed to the
//! code under test share them with the test's assertions.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::AppError;
use crate::fields::Locator;
use crate::models::Record;
use crate::traits::{LoadState, PageHandle, PageScope, Sink};

// ---------------------------------------------------------------------------
// MockFault
// ---------------------------------------------------------------------------

/// Failure injected into a mock read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFault {
    /// Fails with `CandidateNotFound`.
    Transient,
    /// Fails with `PageTerminal` (closed target).
    Terminal,
    /// Fails with an unclassified `PageError`.
    Unknown,
    /// Never completes; only a guard timeout ends it.
    Hang,
}

impl MockFault {
    async fn raise(self, context: &str) -> AppError {
        match self {
            MockFault::Transient => AppError::CandidateNotFound(format!("{context} (mock)")),
            MockFault::Terminal => AppError::PageTerminal(format!("{context}: target closed")),
            MockFault::Unknown => AppError::PageError(format!("{context}: protocol error")),
            MockFault::Hang => std::future::pending::<AppError>().await,
        }
    }
}

// ---------------------------------------------------------------------------
// MockScope
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
struct MockElement {
    text: Option<String>,
    attrs: HashMap<String, String>,
}

/// An element tree reduced to a selector lookup table.
#[derive(Debug, Clone, Default)]
pub struct MockScope {
    elements: HashMap<String, Vec<MockElement>>,
    faults: HashMap<String, MockFault>,
}

impl MockScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the text of the first element matching `selector`.
    pub fn with_text(mut self, selector: &str, text: &str) -> Self {
        self.first_mut(selector).text = Some(text.to_string());
        self
    }

    /// Replaces the matches for `selector` with one element per text.
    pub fn with_text_list(mut self, selector: &str, texts: &[&str]) -> Self {
        let elements = texts
            .iter()
            .map(|t| MockElement {
                text: Some(t.to_string()),
                attrs: HashMap::new(),
            })
            .collect();
        self.elements.insert(selector.to_string(), elements);
        self
    }

    /// Sets an attribute on the first element matching `selector`.
    pub fn with_attr(mut self, selector: &str, name: &str, value: &str) -> Self {
        self.first_mut(selector)
            .attrs
            .insert(name.to_string(), value.to_string());
        self
    }

    /// Every read touching `selector` fails with `fault`.
    pub fn with_fault(mut self, selector: &str, fault: MockFault) -> Self {
        self.faults.insert(selector.to_string(), fault);
        self
    }

    fn first_mut(&mut self, selector: &str) -> &mut MockElement {
        let elements = self.elements.entry(selector.to_string()).or_default();
        if elements.is_empty() {
            elements.push(MockElement::default());
        }
        &mut elements[0]
    }

    async fn check(&self, locator: &Locator) -> Result<(), AppError> {
        match self.faults.get(&locator.selector) {
            Some(fault) => Err(fault.raise(&locator.selector).await),
            None => Ok(()),
        }
    }

    fn first_match(&self, locator: &Locator) -> Option<&MockElement> {
        self.elements
            .get(&locator.selector)?
            .iter()
            .find(|el| locator.accepts_text(el.text.as_deref().unwrap_or_default()))
    }
}

impl PageScope for MockScope {
    async fn exists(&self, locator: &Locator) -> Result<bool, AppError> {
        self.check(locator).await?;
        Ok(self.first_match(locator).is_some())
    }

    async fn read_text(&self, locator: &Locator) -> Result<Option<String>, AppError> {
        self.check(locator).await?;
        Ok(self.first_match(locator).and_then(|el| el.text.clone()))
    }

    async fn read_attribute(&self, locator: &Locator, name: &str) -> Result<Option<String>, AppError> {
        self.check(locator).await?;
        Ok(self
            .first_match(locator)
            .and_then(|el| el.attrs.get(name).cloned()))
    }
}

// ---------------------------------------------------------------------------
// MockDocument
// ---------------------------------------------------------------------------

/// What the mock page shows after navigating to one URL.
#[derive(Debug, Clone)]
pub struct MockDocument {
    scope: MockScope,
    items: HashMap<String, Vec<MockScope>>,
    visible: HashSet<String>,
    load_state: LoadState,
    body_text: String,
    navigation_delay: Option<Duration>,
    navigation_fault: Option<MockFault>,
    page_fault: Option<MockFault>,
}

impl Default for MockDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDocument {
    /// A fully loaded, empty document.
    pub fn new() -> Self {
        Self {
            scope: MockScope::new(),
            items: HashMap::new(),
            visible: HashSet::new(),
            load_state: LoadState::Complete,
            body_text: String::new(),
            navigation_delay: None,
            navigation_fault: None,
            page_fault: None,
        }
    }

    pub fn loading(mut self) -> Self {
        self.load_state = LoadState::Loading;
        self
    }

    pub fn with_visible(mut self, selector: &str) -> Self {
        self.visible.insert(selector.to_string());
        self
    }

    pub fn with_body_text(mut self, text: &str) -> Self {
        self.body_text = text.to_string();
        self
    }

    pub fn with_text(mut self, selector: &str, text: &str) -> Self {
        self.scope = self.scope.with_text(selector, text);
        self
    }

    pub fn with_attr(mut self, selector: &str, name: &str, value: &str) -> Self {
        self.scope = self.scope.with_attr(selector, name, value);
        self
    }

    pub fn with_fault(mut self, selector: &str, fault: MockFault) -> Self {
        self.scope = self.scope.with_fault(selector, fault);
        self
    }

    /// Item elements returned for a listing selector.
    pub fn with_items(mut self, selector: &str, items: Vec<MockScope>) -> Self {
        self.items.insert(selector.to_string(), items);
        self
    }

    pub fn with_navigation_delay(mut self, delay: Duration) -> Self {
        self.navigation_delay = Some(delay);
        self
    }

    pub fn with_navigation_fault(mut self, fault: MockFault) -> Self {
        self.navigation_fault = Some(fault);
        self
    }

    /// Every operation on the loaded page fails with `fault`.
    pub fn with_page_fault(mut self, fault: MockFault) -> Self {
        self.page_fault = Some(fault);
        self
    }

    async fn check_page(&self, operation: &str) -> Result<(), AppError> {
        match self.page_fault {
            Some(fault) => Err(fault.raise(operation).await),
            None => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// MockPage
// ---------------------------------------------------------------------------

/// Mock tab that serves registered documents by URL and records calls.
#[derive(Debug, Clone, Default)]
pub struct MockPage {
    documents: Arc<Mutex<HashMap<String, MockDocument>>>,
    current: Arc<Mutex<Option<(String, MockDocument)>>>,
    navigations: Arc<Mutex<Vec<String>>>,
    scrolls: Arc<Mutex<Vec<f64>>>,
    clicks: Arc<Mutex<Vec<String>>>,
    recoveries: Arc<Mutex<usize>>,
}

impl MockPage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the document served for `url`. Unregistered URLs load as
    /// empty documents.
    pub fn with_document(self, url: &str, document: MockDocument) -> Self {
        self.documents
            .lock()
            .unwrap()
            .insert(url.to_string(), document);
        self
    }

    pub fn navigations(&self) -> Vec<String> {
        self.navigations.lock().unwrap().clone()
    }

    pub fn scrolls(&self) -> Vec<f64> {
        self.scrolls.lock().unwrap().clone()
    }

    pub fn clicks(&self) -> Vec<String> {
        self.clicks.lock().unwrap().clone()
    }

    pub fn recoveries(&self) -> usize {
        *self.recoveries.lock().unwrap()
    }

    fn document(&self) -> MockDocument {
        self.current
            .lock()
            .unwrap()
            .as_ref()
            .map(|(_, doc)| doc.clone())
            .unwrap_or_default()
    }
}

impl PageScope for MockPage {
    async fn exists(&self, locator: &Locator) -> Result<bool, AppError> {
        let doc = self.document();
        doc.check_page("exists").await?;
        doc.scope.exists(locator).await
    }

    async fn read_text(&self, locator: &Locator) -> Result<Option<String>, AppError> {
        let doc = self.document();
        doc.check_page("read_text").await?;
        doc.scope.read_text(locator).await
    }

    async fn read_attribute(&self, locator: &Locator, name: &str) -> Result<Option<String>, AppError> {
        let doc = self.document();
        doc.check_page("read_attribute").await?;
        doc.scope.read_attribute(locator, name).await
    }
}

impl PageHandle for MockPage {
    type Item = MockScope;

    async fn navigate(&self, url: &str) -> Result<(), AppError> {
        self.navigations.lock().unwrap().push(url.to_string());
        let doc = self
            .documents
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .unwrap_or_default();

        if let Some(delay) = doc.navigation_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(fault) = doc.navigation_fault {
            return Err(fault.raise(url).await);
        }
        *self.current.lock().unwrap() = Some((url.to_string(), doc));
        Ok(())
    }

    async fn current_url(&self) -> Result<String, AppError> {
        let url = self
            .current
            .lock()
            .unwrap()
            .as_ref()
            .map(|(url, _)| url.clone());
        Ok(url.unwrap_or_else(|| "about:blank".to_string()))
    }

    async fn items(&self, selector: &str) -> Result<Vec<MockScope>, AppError> {
        let doc = self.document();
        doc.check_page("items").await?;
        Ok(doc.items.get(selector).cloned().unwrap_or_default())
    }

    async fn is_visible(&self, selector: &str) -> Result<bool, AppError> {
        let doc = self.document();
        doc.check_page("is_visible").await?;
        Ok(doc.visible.contains(selector))
    }

    async fn load_state(&self) -> Result<LoadState, AppError> {
        let doc = self.document();
        doc.check_page("load_state").await?;
        Ok(doc.load_state)
    }

    async fn body_text_len(&self) -> Result<usize, AppError> {
        let doc = self.document();
        doc.check_page("body_text_len").await?;
        Ok(doc.body_text.trim().len())
    }

    async fn scroll_by(&self, fraction: f64) -> Result<(), AppError> {
        self.document().check_page("scroll_by").await?;
        self.scrolls.lock().unwrap().push(fraction);
        Ok(())
    }

    async fn click(&self, locator: &Locator) -> Result<bool, AppError> {
        let doc = self.document();
        doc.check_page("click").await?;
        let found = doc.scope.exists(locator).await?;
        if found {
            self.clicks.lock().unwrap().push(locator.selector.clone());
        }
        Ok(found)
    }

    async fn recover(&self) -> Result<(), AppError> {
        *self.recoveries.lock().unwrap() += 1;
        *self.current.lock().unwrap() = None;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MockSink
// ---------------------------------------------------------------------------

/// Mock sink that records appended records and stored blobs.
#[derive(Debug, Clone, Default)]
pub struct MockSink {
    pub appended: Arc<Mutex<Vec<Record>>>,
    pub blobs: Arc<Mutex<Vec<(String, Vec<u8>, String)>>>,
    append_error: Arc<Mutex<Option<AppError>>>,
}

impl MockSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next append fails with `error`; later appends succeed.
    pub fn with_append_error(error: AppError) -> Self {
        Self {
            append_error: Arc::new(Mutex::new(Some(error))),
            ..Self::default()
        }
    }

    pub fn records(&self) -> Vec<Record> {
        self.appended.lock().unwrap().clone()
    }

    pub fn blob(&self, key: &str) -> Option<(Vec<u8>, String)> {
        self.blobs
            .lock()
            .unwrap()
            .iter()
            .find(|(k, _, _)| k == key)
            .map(|(_, body, content_type)| (body.clone(), content_type.clone()))
    }
}

impl Sink for MockSink {
    async fn append(&self, record: &Record) -> Result<(), AppError> {
        if let Some(e) = self.append_error.lock().unwrap().take() {
            return Err(e);
        }
        self.appended.lock().unwrap().push(record.clone());
        Ok(())
    }

    async fn put_blob(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<(), AppError> {
        self.blobs
            .lock()
            .unwrap()
            .push((key.to_string(), bytes.to_vec(), content_type.to_string()));
        Ok(())
    }
}
