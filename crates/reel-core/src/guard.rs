//! Page lifecycle guard.
//!
//! Every page operation goes through [`PageGuard`], which bounds it with a
//! timeout and classifies failures:
//!
//! ```text
//! CandidateNotFound, OperationTimeout   -> Transient  (try next candidate)
//! PageTerminal, NavigationTimeout       -> Terminal   (stop current item)
//! anything else                         -> Unknown    (logged, as Terminal)
//! ```
//!
//! A fault never escapes the item it happened on: the orchestrator keeps the
//! partial record and moves to the next frontier item.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use crate::error::{AppError, FaultKind};
use crate::fields::{Locator, PageAction};
use crate::traits::{LoadState, PageHandle, PageScope};

/// Timing limits for guarded page operations.
#[derive(Debug, Clone)]
pub struct GuardConfig {
    /// Upper bound for one navigation.
    pub navigation_timeout: Duration,
    /// Upper bound for the page-ready gate.
    pub ready_timeout: Duration,
    /// While this long has not elapsed, only the structural anchor counts
    /// as ready. Zero accepts any readiness signal immediately.
    pub anchor_grace: Duration,
    /// Delay between readiness polls.
    pub poll_interval: Duration,
    /// Upper bound for one existence check or element read.
    pub probe_timeout: Duration,
    /// Upper bound for one preparation action.
    pub action_timeout: Duration,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            navigation_timeout: Duration::from_secs(60),
            ready_timeout: Duration::from_secs(10),
            anchor_grace: Duration::ZERO,
            poll_interval: Duration::from_millis(250),
            probe_timeout: Duration::from_millis(750),
            action_timeout: Duration::from_secs(3),
        }
    }
}

impl GuardConfig {
    pub fn with_navigation_timeout(mut self, timeout: Duration) -> Self {
        self.navigation_timeout = timeout;
        self
    }

    pub fn with_ready_timeout(mut self, timeout: Duration) -> Self {
        self.ready_timeout = timeout;
        self.anchor_grace = self.anchor_grace.min(timeout);
        self
    }

    pub fn with_anchor_grace(mut self, grace: Duration) -> Self {
        self.anchor_grace = grace;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    pub fn with_action_timeout(mut self, timeout: Duration) -> Self {
        self.action_timeout = timeout;
        self
    }
}

/// Which signal opened the page-ready gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    AnchorVisible,
    Loaded,
    BodyText,
    /// Nothing fired before the timeout; extraction runs best-effort.
    Degraded,
}

impl Readiness {
    pub fn is_degraded(&self) -> bool {
        matches!(self, Readiness::Degraded)
    }
}

impl std::fmt::Display for Readiness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Readiness::AnchorVisible => write!(f, "anchor-visible"),
            Readiness::Loaded => write!(f, "loaded"),
            Readiness::BodyText => write!(f, "body-text"),
            Readiness::Degraded => write!(f, "degraded"),
        }
    }
}

/// Wraps page operations with timeouts and fault classification.
#[derive(Debug, Clone, Default)]
pub struct PageGuard {
    config: GuardConfig,
}

impl PageGuard {
    pub fn new(config: GuardConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    /// Runs `fut` with an upper bound. Elapsing the bound is a transient
    /// `OperationTimeout`.
    pub async fn bounded<T, Fut>(&self, operation: &str, limit: Duration, fut: Fut) -> Result<T, AppError>
    where
        Fut: Future<Output = Result<T, AppError>>,
    {
        let result = match tokio::time::timeout(limit, fut).await {
            Ok(inner) => inner,
            Err(_) => Err(AppError::OperationTimeout {
                operation: operation.to_string(),
                millis: limit.as_millis() as u64,
            }),
        };
        if let Err(e) = &result {
            observe(operation, e);
        }
        result
    }

    /// A short existence check or element read.
    pub async fn probe<T, Fut>(&self, operation: &str, fut: Fut) -> Result<T, AppError>
    where
        Fut: Future<Output = Result<T, AppError>>,
    {
        self.bounded(operation, self.config.probe_timeout, fut).await
    }

    /// Navigates the shared page. Elapsing the bound is a terminal
    /// `NavigationTimeout` for the current item.
    pub async fn navigate<P: PageHandle>(&self, page: &P, url: &str) -> Result<(), AppError> {
        let limit = self.config.navigation_timeout;
        let result = match tokio::time::timeout(limit, page.navigate(url)).await {
            Ok(inner) => inner,
            Err(_) => Err(AppError::NavigationTimeout {
                url: url.to_string(),
                secs: limit.as_secs(),
            }),
        };
        if let Err(e) = &result {
            observe("navigate", e);
        }
        result
    }

    /// Waits for the first readiness signal: the anchor is visible, the
    /// document finished loading, or the body has text. Returns
    /// [`Readiness::Degraded`] instead of failing when nothing fires in time.
    ///
    /// Only terminal and unknown faults are returned as errors.
    pub async fn wait_until_ready<P: PageHandle>(
        &self,
        page: &P,
        anchor: Option<&str>,
    ) -> Result<Readiness, AppError> {
        let started = Instant::now();
        let deadline = started + self.config.ready_timeout;
        let grace_until = started + self.config.anchor_grace;

        loop {
            if let Some(anchor) = anchor
                && tolerate(self.probe("anchor", page.is_visible(anchor)).await)?.unwrap_or(false)
            {
                return Ok(Readiness::AnchorVisible);
            }

            if anchor.is_none() || Instant::now() >= grace_until {
                let state = tolerate(self.probe("load_state", page.load_state()).await)?;
                if state == Some(LoadState::Complete) {
                    return Ok(Readiness::Loaded);
                }
                let body = tolerate(self.probe("body_text", page.body_text_len()).await)?;
                if body.is_some_and(|len| len > 0) {
                    return Ok(Readiness::BodyText);
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(Readiness::Degraded);
            }
            tokio::time::sleep(self.config.poll_interval.min(deadline - now)).await;
        }
    }

    /// Runs best-effort preparation actions. Transient failures are skipped;
    /// terminal and unknown faults stop preparation and are returned.
    pub async fn prepare<P: PageHandle>(&self, page: &P, actions: &[PageAction]) -> Result<(), AppError> {
        for action in actions {
            let outcome = match action {
                PageAction::Scroll { fraction } => {
                    self.bounded("scroll", self.config.action_timeout, page.scroll_by(*fraction))
                        .await
                }
                PageAction::Click { selector } => {
                    let locator = Locator::css(selector.as_str());
                    self.bounded("click", self.config.action_timeout, page.click(&locator))
                        .await
                        .map(|clicked| {
                            if !clicked {
                                tracing::debug!(%selector, "Nothing to click");
                            }
                        })
                }
                PageAction::WaitFor {
                    selector,
                    timeout_ms,
                } => {
                    let limit = timeout_ms
                        .map(Duration::from_millis)
                        .unwrap_or(self.config.action_timeout);
                    let locator = Locator::css(selector.as_str());
                    self.wait_for(page, &locator, limit).await.map(|found| {
                        if !found {
                            tracing::debug!(%selector, "Wait target did not appear");
                        }
                    })
                }
            };
            tolerate(outcome)?;
        }
        Ok(())
    }

    /// Polls until the locator matches or `limit` elapses.
    pub async fn wait_for<S: PageScope>(
        &self,
        scope: &S,
        locator: &Locator,
        limit: Duration,
    ) -> Result<bool, AppError> {
        let deadline = Instant::now() + limit;
        loop {
            if tolerate(self.probe("wait_for", scope.exists(locator)).await)?.unwrap_or(false) {
                return Ok(true);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(self.config.poll_interval.min(deadline - now)).await;
        }
    }
}

/// Downgrades transient faults to `None`; terminal and unknown faults pass.
fn tolerate<T>(result: Result<T, AppError>) -> Result<Option<T>, AppError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.fault_kind() == FaultKind::Transient => Ok(None),
        Err(e) => Err(e),
    }
}

fn observe(operation: &str, error: &AppError) {
    match error.fault_kind() {
        FaultKind::Transient => tracing::trace!(%operation, %error, "Transient page fault"),
        FaultKind::Terminal => tracing::warn!(%operation, %error, "Terminal page fault"),
        FaultKind::Unknown => {
            tracing::error!(%operation, %error, "Unclassified page fault, treating as terminal")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{MockDocument, MockFault, MockPage};

    fn fast_config() -> GuardConfig {
        GuardConfig::default()
            .with_navigation_timeout(Duration::from_millis(200))
            .with_ready_timeout(Duration::from_millis(60))
            .with_anchor_grace(Duration::ZERO)
            .with_poll_interval(Duration::from_millis(5))
            .with_probe_timeout(Duration::from_millis(50))
            .with_action_timeout(Duration::from_millis(50))
    }

    #[tokio::test]
    async fn bounded_converts_elapsed_to_transient_timeout() {
        let guard = PageGuard::new(fast_config());
        let err = guard
            .bounded("slow", Duration::from_millis(10), async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok::<_, AppError>(())
            })
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::OperationTimeout { .. }));
        assert_eq!(err.fault_kind(), FaultKind::Transient);
    }

    #[tokio::test]
    async fn navigation_timeout_is_terminal() {
        let page = MockPage::new().with_document(
            "https://a.test/slow",
            MockDocument::new().with_navigation_delay(Duration::from_millis(500)),
        );
        let guard = PageGuard::new(fast_config());

        let err = guard.navigate(&page, "https://a.test/slow").await.unwrap_err();

        assert!(matches!(err, AppError::NavigationTimeout { .. }));
        assert_eq!(err.fault_kind(), FaultKind::Terminal);
    }

    #[tokio::test]
    async fn ready_gate_prefers_visible_anchor() {
        let page = MockPage::new().with_document(
            "https://a.test/",
            MockDocument::new().with_visible("#grid").loading(),
        );
        let guard = PageGuard::new(fast_config());
        page.navigate("https://a.test/").await.unwrap();

        let readiness = guard.wait_until_ready(&page, Some("#grid")).await.unwrap();
        assert_eq!(readiness, Readiness::AnchorVisible);
    }

    #[tokio::test]
    async fn ready_gate_accepts_load_milestone() {
        let page = MockPage::new().with_document("https://a.test/", MockDocument::new());
        let guard = PageGuard::new(fast_config());
        page.navigate("https://a.test/").await.unwrap();

        let readiness = guard.wait_until_ready(&page, Some("#grid")).await.unwrap();
        assert_eq!(readiness, Readiness::Loaded);
    }

    #[tokio::test]
    async fn ready_gate_accepts_body_text() {
        let page = MockPage::new().with_document(
            "https://a.test/",
            MockDocument::new().loading().with_body_text("hello"),
        );
        let guard = PageGuard::new(fast_config());
        page.navigate("https://a.test/").await.unwrap();

        let readiness = guard.wait_until_ready(&page, None).await.unwrap();
        assert_eq!(readiness, Readiness::BodyText);
    }

    #[tokio::test]
    async fn ready_gate_degrades_instead_of_failing() {
        let page = MockPage::new().with_document("https://a.test/", MockDocument::new().loading());
        let guard = PageGuard::new(fast_config());
        page.navigate("https://a.test/").await.unwrap();

        let started = std::time::Instant::now();
        let readiness = guard.wait_until_ready(&page, Some("#grid")).await.unwrap();

        assert_eq!(readiness, Readiness::Degraded);
        assert!(started.elapsed() >= Duration::from_millis(60));
    }

    #[tokio::test]
    async fn ready_gate_holds_for_anchor_during_grace() {
        let page = MockPage::new().with_document("https://a.test/", MockDocument::new());
        let guard = PageGuard::new(fast_config().with_anchor_grace(Duration::from_millis(30)));
        page.navigate("https://a.test/").await.unwrap();

        let started = std::time::Instant::now();
        let readiness = guard.wait_until_ready(&page, Some("#grid")).await.unwrap();

        assert_eq!(readiness, Readiness::Loaded);
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[tokio::test(start_paused = true)]
    async fn default_gate_does_not_wait_for_missing_anchor() {
        let page = MockPage::new().with_document(
            "https://a.test/",
            MockDocument::new().with_body_text("hello"),
        );
        let guard = PageGuard::default();
        page.navigate("https://a.test/").await.unwrap();

        let started = tokio::time::Instant::now();
        let readiness = guard.wait_until_ready(&page, Some("#grid")).await.unwrap();

        assert_eq!(readiness, Readiness::Loaded);
        assert!(started.elapsed() < guard.config().poll_interval);
    }

    #[tokio::test]
    async fn ready_gate_surfaces_terminal_faults() {
        let page = MockPage::new().with_document(
            "https://a.test/",
            MockDocument::new().with_page_fault(MockFault::Terminal),
        );
        let guard = PageGuard::new(fast_config());
        page.navigate("https://a.test/").await.unwrap();

        let err = guard.wait_until_ready(&page, Some("#grid")).await.unwrap_err();
        assert!(matches!(err, AppError::PageTerminal(_)));
    }

    #[tokio::test]
    async fn prepare_skips_missing_targets() {
        let page = MockPage::new().with_document("https://a.test/", MockDocument::new());
        let guard = PageGuard::new(fast_config());
        page.navigate("https://a.test/").await.unwrap();

        let actions = vec![
            PageAction::Scroll { fraction: 0.5 },
            PageAction::Click {
                selector: "#expand".into(),
            },
            PageAction::WaitFor {
                selector: "#comments".into(),
                timeout_ms: Some(20),
            },
        ];
        guard.prepare(&page, &actions).await.unwrap();

        assert_eq!(page.scrolls(), vec![0.5]);
        assert!(page.clicks().is_empty());
    }

    #[tokio::test]
    async fn wait_for_finds_present_locator() {
        let page = MockPage::new().with_document(
            "https://a.test/",
            MockDocument::new().with_text("#comments", "12 Comments"),
        );
        let guard = PageGuard::new(fast_config());
        page.navigate("https://a.test/").await.unwrap();

        let found = guard
            .wait_for(&page, &Locator::css("#comments"), Duration::from_millis(20))
            .await
            .unwrap();
        assert!(found);
    }
}
