use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chromiumoxide::error::CdpError;
use chromiumoxide::{Browser, BrowserConfig, Element, Page};
use futures::StreamExt;
use reel_core::error::AppError;
use reel_core::fields::Locator;
use reel_core::traits::{LoadState, PageHandle, PageScope};
use tokio::sync::RwLock;

/// Launch options for [`BrowserPage`].
#[derive(Debug, Clone)]
pub struct BrowserOptions {
    pub headless: bool,
    /// Explicit Chrome/Chromium binary. Falls back to `CHROME_BIN` and
    /// well-known install paths.
    pub chrome_bin: Option<PathBuf>,
    /// Upper bound for a single DevTools request.
    pub request_timeout: Duration,
}

impl Default for BrowserOptions {
    fn default() -> Self {
        Self {
            headless: true,
            chrome_bin: None,
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl BrowserOptions {
    pub fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    pub fn with_chrome_bin(mut self, path: impl Into<PathBuf>) -> Self {
        self.chrome_bin = Some(path.into());
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// The single Chromium tab a crawl run drives, over the Chrome DevTools
/// Protocol.
///
/// One browser process and one tab are kept for the whole run. When the tab
/// dies, [`PageHandle::recover`] swaps in a fresh one; clones share it.
///
/// # Example
///
/// ```rust,no_run
/// use reel_client::{BrowserOptions, BrowserPage};
/// use reel_core::traits::PageHandle;
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let page = BrowserPage::launch(BrowserOptions::default()).await?;
/// page.navigate("https://www.youtube.com/@chan/videos").await?;
/// let items = page.items("ytd-rich-item-renderer").await?;
/// println!("{} items", items.len());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct BrowserPage {
    browser: Arc<Browser>,
    page: Arc<RwLock<Page>>,
    request_timeout_ms: u64,
}

impl BrowserPage {
    /// Launches Chromium and opens the run's tab on `about:blank`.
    pub async fn launch(options: BrowserOptions) -> Result<Self, AppError> {
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .disable_default_args()
            .request_timeout(options.request_timeout);

        if let Some(bin) = options.chrome_bin.clone().or_else(find_chrome_binary) {
            tracing::info!("Using Chrome binary: {}", bin.display());
            builder = builder.chrome_executable(bin);
        }

        if options.headless {
            builder = builder.arg("--headless=new");
        } else {
            builder = builder.with_head();
        }

        let config = builder
            .arg("--disable-gpu")
            .arg("--lang=en-US")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--disable-popup-blocking")
            .arg("--disable-translate")
            .arg("--no-first-run")
            .build()
            .map_err(|e| AppError::ConfigError(format!("Browser config error: {e}")))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| AppError::Generic(format!("Failed to launch browser: {e}")))?;

        // The CDP handler must be polled continuously for the connection to work.
        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    tracing::warn!("Browser CDP handler error: {event:?}");
                    break;
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| AppError::Generic(format!("Failed to open tab: {e}")))?;

        Ok(Self {
            browser: Arc::new(browser),
            page: Arc::new(RwLock::new(page)),
            request_timeout_ms: options.request_timeout.as_millis() as u64,
        })
    }

    async fn tab(&self) -> Page {
        self.page.read().await.clone()
    }

    fn fault(&self, context: &str, err: CdpError) -> AppError {
        map_cdp_error(context, err, self.request_timeout_ms)
    }

    async fn evaluate<T: serde::de::DeserializeOwned>(&self, context: &str, expression: String) -> Result<T, AppError> {
        let result = self
            .tab()
            .await
            .evaluate(expression)
            .await
            .map_err(|e| self.fault(context, e))?;
        Ok(result.into_value::<T>()?)
    }
}

/// Tries to locate the real Chrome/Chromium binary.
///
/// On systems where Chromium is installed via **snap**, the wrapper at
/// `/snap/bin/chromium` strips unknown CLI flags, breaking headless mode, so
/// the binary inside the snap is preferred. If nothing is found `chromiumoxide`
/// does its own lookup.
fn find_chrome_binary() -> Option<PathBuf> {
    const CANDIDATES: &[&str] = &[
        "/snap/chromium/current/usr/lib/chromium-browser/chrome",
        "/var/lib/flatpak/exports/bin/org.chromium.Chromium",
        "/usr/bin/google-chrome-stable",
        "/usr/bin/google-chrome",
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
    ];

    if let Ok(p) = std::env::var("CHROME_BIN") {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }

    CANDIDATES.iter().map(PathBuf::from).find(|p| p.exists())
}

/// One element of a list page, used as the read scope for listing fields.
#[derive(Clone)]
pub struct BrowserElement {
    element: Arc<Element>,
    request_timeout_ms: u64,
}

impl BrowserElement {
    fn fault(&self, context: &str, err: CdpError) -> AppError {
        map_cdp_error(context, err, self.request_timeout_ms)
    }

    async fn first_match(&self, locator: &Locator) -> Result<Option<Element>, AppError> {
        let elements = self
            .element
            .find_elements(locator.selector.as_str())
            .await
            .or_else(empty_on_not_found)
            .map_err(|e| self.fault(&locator.selector, e))?;
        filter_first(elements, locator)
            .await
            .map_err(|e| self.fault(&locator.selector, e))
    }
}

impl PageScope for BrowserElement {
    async fn exists(&self, locator: &Locator) -> Result<bool, AppError> {
        Ok(self.first_match(locator).await?.is_some())
    }

    async fn read_text(&self, locator: &Locator) -> Result<Option<String>, AppError> {
        match self.first_match(locator).await? {
            Some(el) => el.inner_text().await.map_err(|e| self.fault(&locator.selector, e)),
            None => Ok(None),
        }
    }

    async fn read_attribute(&self, locator: &Locator, name: &str) -> Result<Option<String>, AppError> {
        match self.first_match(locator).await? {
            Some(el) => el
                .attribute(name)
                .await
                .map_err(|e| self.fault(&locator.selector, e)),
            None => Ok(None),
        }
    }
}

impl BrowserPage {
    async fn first_match(&self, locator: &Locator) -> Result<Option<Element>, AppError> {
        let elements = self
            .tab()
            .await
            .find_elements(locator.selector.as_str())
            .await
            .or_else(empty_on_not_found)
            .map_err(|e| self.fault(&locator.selector, e))?;
        filter_first(elements, locator)
            .await
            .map_err(|e| self.fault(&locator.selector, e))
    }
}

impl PageScope for BrowserPage {
    async fn exists(&self, locator: &Locator) -> Result<bool, AppError> {
        Ok(self.first_match(locator).await?.is_some())
    }

    async fn read_text(&self, locator: &Locator) -> Result<Option<String>, AppError> {
        match self.first_match(locator).await? {
            Some(el) => el.inner_text().await.map_err(|e| self.fault(&locator.selector, e)),
            None => Ok(None),
        }
    }

    async fn read_attribute(&self, locator: &Locator, name: &str) -> Result<Option<String>, AppError> {
        match self.first_match(locator).await? {
            Some(el) => el
                .attribute(name)
                .await
                .map_err(|e| self.fault(&locator.selector, e)),
            None => Ok(None),
        }
    }
}

impl PageHandle for BrowserPage {
    type Item = BrowserElement;

    async fn navigate(&self, url: &str) -> Result<(), AppError> {
        self.tab()
            .await
            .goto(url)
            .await
            .map_err(|e| self.fault(url, e))?;
        Ok(())
    }

    async fn current_url(&self) -> Result<String, AppError> {
        let url = self
            .tab()
            .await
            .url()
            .await
            .map_err(|e| self.fault("current_url", e))?;
        Ok(url.unwrap_or_else(|| "about:blank".to_string()))
    }

    async fn items(&self, selector: &str) -> Result<Vec<BrowserElement>, AppError> {
        let elements = self
            .tab()
            .await
            .find_elements(selector)
            .await
            .or_else(empty_on_not_found)
            .map_err(|e| self.fault(selector, e))?;
        Ok(elements
            .into_iter()
            .map(|element| BrowserElement {
                element: Arc::new(element),
                request_timeout_ms: self.request_timeout_ms,
            })
            .collect())
    }

    async fn is_visible(&self, selector: &str) -> Result<bool, AppError> {
        let selector = serde_json::to_string(selector)?;
        self.evaluate(
            "is_visible",
            format!(
                "(() => {{ const el = document.querySelector({selector}); \
                 if (!el) return false; const r = el.getBoundingClientRect(); \
                 return r.width > 0 && r.height > 0; }})()"
            ),
        )
        .await
    }

    async fn load_state(&self) -> Result<LoadState, AppError> {
        let state: String = self
            .evaluate("load_state", "document.readyState".to_string())
            .await?;
        Ok(LoadState::from_ready_state(&state))
    }

    async fn body_text_len(&self) -> Result<usize, AppError> {
        self.evaluate(
            "body_text_len",
            "((document.body && document.body.innerText) || '').trim().length".to_string(),
        )
        .await
    }

    async fn scroll_by(&self, fraction: f64) -> Result<(), AppError> {
        let _: bool = self
            .evaluate(
                "scroll_by",
                format!(
                    "(() => {{ window.scrollBy(0, document.documentElement.scrollHeight * {fraction}); \
                     return true; }})()"
                ),
            )
            .await?;
        Ok(())
    }

    async fn click(&self, locator: &Locator) -> Result<bool, AppError> {
        match self.first_match(locator).await? {
            Some(el) => {
                el.click().await.map_err(|e| self.fault(&locator.selector, e))?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn recover(&self) -> Result<(), AppError> {
        let fresh = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| self.fault("recover", e))?;
        let stale = std::mem::replace(&mut *self.page.write().await, fresh);
        // The old tab is usually gone already; closing is best-effort.
        if let Err(e) = stale.close().await {
            tracing::debug!(error = %e, "Stale tab did not close cleanly");
        }
        tracing::info!("Opened a fresh tab");
        Ok(())
    }
}

/// Keeps the first element whose text passes the locator's `contains`
/// filter. Text is only read when a filter is set.
async fn filter_first(elements: Vec<Element>, locator: &Locator) -> Result<Option<Element>, CdpError> {
    if locator.contains.is_none() {
        return Ok(elements.into_iter().next());
    }
    for element in elements {
        let text = element.inner_text().await?.unwrap_or_default();
        if locator.accepts_text(&text) {
            return Ok(Some(element));
        }
    }
    Ok(None)
}

fn empty_on_not_found(err: CdpError) -> Result<Vec<Element>, CdpError> {
    match err {
        CdpError::NotFound => Ok(Vec::new()),
        other => Err(other),
    }
}

/// Chrome error messages meaning the tab, its session, or the connection is gone.
const TERMINAL_MARKERS: &[&str] = &[
    "target closed",
    "session closed",
    "session with given id not found",
    "no target with given id",
    "cannot find context with specified id",
    "execution context was destroyed",
    "inspected target navigated or closed",
    "frame not found",
    "connection closed",
    "channel closed",
    "websocket",
    "browser has disconnected",
];

/// Chrome error messages meaning one node is gone while the page is fine.
const NOT_FOUND_MARKERS: &[&str] = &[
    "no node with given id",
    "could not find node with given id",
    "node is detached",
    "node not found",
];

/// Maps a DevTools error onto the fault taxonomy.
fn map_cdp_error(context: &str, err: CdpError, request_timeout_ms: u64) -> AppError {
    match err {
        CdpError::NotFound => AppError::CandidateNotFound(context.to_string()),
        CdpError::Timeout => AppError::OperationTimeout {
            operation: context.to_string(),
            millis: request_timeout_ms,
        },
        CdpError::FrameNotFound(_) => AppError::PageTerminal(format!("{context}: frame not found")),
        other => classify_message(context, &other.to_string()),
    }
}

fn classify_message(context: &str, message: &str) -> AppError {
    let lower = message.to_lowercase();
    if TERMINAL_MARKERS.iter().any(|m| lower.contains(m)) {
        AppError::PageTerminal(format!("{context}: {message}"))
    } else if NOT_FOUND_MARKERS.iter().any(|m| lower.contains(m)) {
        AppError::CandidateNotFound(format!("{context}: {message}"))
    } else {
        AppError::PageError(format!("{context}: {message}"))
    }
}
