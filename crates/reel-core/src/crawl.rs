use std::collections::HashMap;
use std::fmt;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::canonical::{canonicalize_link, resolve_link};
use crate::config::CrawlPlan;
use crate::error::{AppError, FaultKind};
use crate::extractor::extract_fields;
use crate::fields::FieldTables;
use crate::frontier::{Admission, Frontier, Quota};
use crate::guard::{GuardConfig, PageGuard, Readiness};
use crate::models::{CrawlItem, FieldName, Phase, Record};
use crate::traits::{PageHandle, Sink};

/// Blob key of the end-of-run snapshot.
pub const SNAPSHOT_KEY: &str = "video_information.json";
pub const SNAPSHOT_CONTENT_TYPE: &str = "application/json";

/// Orchestrator states, in the only order they are entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlState {
    Init,
    ListEnumerate,
    DetailDrain,
    Done,
}

impl fmt::Display for CrawlState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CrawlState::Init => write!(f, "INIT"),
            CrawlState::ListEnumerate => write!(f, "LIST_ENUMERATE"),
            CrawlState::DetailDrain => write!(f, "DETAIL_DRAIN"),
            CrawlState::Done => write!(f, "DONE"),
        }
    }
}

/// Why pending work was dropped without a visit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    QuotaReached,
    Cancelled,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::QuotaReached => write!(f, "quota reached"),
            StopReason::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Totals for one run, plus every finished record in completion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CrawlSummary {
    /// Records the sink acknowledged.
    pub persisted: usize,
    /// DETAIL items admitted to the frontier.
    pub enqueued: usize,
    /// Pages navigated to, list and detail.
    pub visited: usize,
    pub duplicates: usize,
    /// Seeds and frontier items dropped without a visit.
    pub discarded: usize,
    /// Items cut short by a terminal or unknown fault.
    pub faults: usize,
    pub degraded_pages: usize,
    pub cancelled: bool,
    pub records: Vec<Record>,
}

/// Events emitted during a crawl run.
#[derive(Debug)]
pub enum CrawlEvent<'a> {
    StateChanged {
        state: CrawlState,
    },
    PageReady {
        phase: Phase,
        url: &'a str,
        readiness: Readiness,
    },
    ItemsFound {
        url: &'a str,
        selector: Option<&'a str>,
        count: usize,
    },
    Enqueued {
        url: &'a str,
    },
    Duplicate {
        url: &'a str,
    },
    ItemFault {
        phase: Phase,
        url: &'a str,
        error: &'a AppError,
    },
    Persisted {
        url: &'a str,
        fields: usize,
    },
    PersistFailed {
        url: &'a str,
        error: &'a AppError,
    },
    Discarded {
        count: usize,
        reason: StopReason,
    },
    SnapshotWritten {
        key: &'a str,
        records: usize,
    },
    Finished {
        summary: &'a CrawlSummary,
    },
}

/// Trait for receiving crawl events (decoupled logging).
pub trait CrawlReporter: Send + Sync {
    fn report(&self, event: CrawlEvent<'_>) {
        let _ = event;
    }
}

/// Reporter that uses the `tracing` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingCrawlReporter;

impl CrawlReporter for TracingCrawlReporter {
    fn report(&self, event: CrawlEvent<'_>) {
        match event {
            CrawlEvent::StateChanged { state } => {
                tracing::debug!(%state, "Crawl state changed");
            }
            CrawlEvent::PageReady {
                phase,
                url,
                readiness,
            } => {
                if readiness.is_degraded() {
                    tracing::warn!(%phase, %url, "Page not ready before timeout, extracting anyway");
                } else {
                    tracing::info!(%phase, %url, %readiness, "Page ready");
                }
            }
            CrawlEvent::ItemsFound {
                url,
                selector,
                count,
            } => {
                tracing::info!(%url, ?selector, %count, "Listing items found");
            }
            CrawlEvent::Enqueued { url } => {
                tracing::debug!(%url, "Detail page queued");
            }
            CrawlEvent::Duplicate { url } => {
                tracing::debug!(%url, "Duplicate item skipped");
            }
            CrawlEvent::ItemFault { phase, url, error } => {
                tracing::warn!(%phase, %url, %error, kind = %error.fault_kind(), "Item cut short");
            }
            CrawlEvent::Persisted { url, fields } => {
                tracing::info!(%url, %fields, "Record persisted");
            }
            CrawlEvent::PersistFailed { url, error } => {
                tracing::error!(%url, %error, "Failed to persist record");
            }
            CrawlEvent::Discarded { count, reason } => {
                tracing::info!(%count, %reason, "Pending items discarded");
            }
            CrawlEvent::SnapshotWritten { key, records } => {
                tracing::info!(%key, %records, "Snapshot written");
            }
            CrawlEvent::Finished { summary } => {
                tracing::info!(
                    persisted = summary.persisted,
                    visited = summary.visited,
                    faults = summary.faults,
                    degraded = summary.degraded_pages,
                    "Crawl finished"
                );
            }
        }
    }
}

/// Mutable state owned by one `run` call.
struct RunState {
    frontier: Frontier,
    quota: Quota,
    /// Listing summaries waiting for their detail visit, by canonical URL.
    pending: HashMap<String, Record>,
    summary: CrawlSummary,
}

impl RunState {
    fn new(max_items: usize) -> Self {
        Self {
            frontier: Frontier::new(),
            quota: Quota::new(max_items),
            pending: HashMap::new(),
            summary: CrawlSummary::default(),
        }
    }

    /// True once every remaining quota slot is claimed by queued work.
    fn quota_claimed(&self) -> bool {
        self.quota.remaining() <= self.frontier.len()
    }

    fn admit<R: CrawlReporter>(&mut self, record: Record, reporter: &R) {
        let url = record.canonical_url().to_string();
        match self.frontier.push(CrawlItem::detail(url.clone()), &self.quota) {
            Admission::Queued => {
                self.summary.enqueued += 1;
                reporter.report(CrawlEvent::Enqueued { url: &url });
                self.pending.insert(url, record);
            }
            Admission::Duplicate => {
                self.summary.duplicates += 1;
                reporter.report(CrawlEvent::Duplicate { url: &url });
            }
            Admission::QuotaReached => {
                self.summary.discarded += 1;
            }
        }
    }

    fn discard<R: CrawlReporter>(&mut self, count: usize, reason: StopReason, reporter: &R) {
        self.summary.discarded += count;
        if reason == StopReason::Cancelled {
            self.summary.cancelled = true;
        }
        reporter.report(CrawlEvent::Discarded { count, reason });
    }
}

/// Drives one crawl: list pages are enumerated into detail visits, each
/// detail page is merged into its listing summary and persisted.
///
/// Everything runs on one task against one shared tab. Faults are contained
/// to the item they happen on; only configuration errors fail a run.
pub struct CrawlService<P, S>
where
    P: PageHandle,
    S: Sink,
{
    page: P,
    sink: S,
    tables: FieldTables,
    guard: PageGuard,
    snapshot_key: Option<String>,
}

impl<P, S> CrawlService<P, S>
where
    P: PageHandle,
    S: Sink,
{
    pub fn new(page: P, sink: S, tables: FieldTables) -> Self {
        Self {
            page,
            sink,
            tables,
            guard: PageGuard::default(),
            snapshot_key: Some(SNAPSHOT_KEY.to_string()),
        }
    }

    pub fn with_guard(mut self, config: GuardConfig) -> Self {
        self.guard = PageGuard::new(config);
        self
    }

    /// Skip the end-of-run snapshot blob.
    pub fn without_snapshot(mut self) -> Self {
        self.snapshot_key = None;
        self
    }

    pub fn page(&self) -> &P {
        &self.page
    }

    /// Runs the plan to completion.
    ///
    /// Cancellation is soft: it is honoured before each navigation, pending
    /// work is discarded and the run still finishes with its snapshot.
    pub async fn run<R: CrawlReporter>(
        &self,
        plan: &CrawlPlan,
        cancel: &CancellationToken,
        reporter: &R,
    ) -> Result<CrawlSummary, AppError> {
        reporter.report(CrawlEvent::StateChanged {
            state: CrawlState::Init,
        });
        plan.validate()?;
        self.tables.validate()?;

        let mut run = RunState::new(plan.max_items);
        let mut list_seeds = Vec::new();
        for seed in &plan.seeds {
            match seed.phase {
                Phase::List => list_seeds.push(seed),
                Phase::Detail => run.admit(Record::new(seed.canonical_url.clone()), reporter),
            }
        }

        reporter.report(CrawlEvent::StateChanged {
            state: CrawlState::ListEnumerate,
        });
        for (index, seed) in list_seeds.iter().enumerate() {
            let stop = if cancel.is_cancelled() {
                Some(StopReason::Cancelled)
            } else if run.quota_claimed() {
                Some(StopReason::QuotaReached)
            } else {
                None
            };
            if let Some(reason) = stop {
                run.discard(list_seeds.len() - index, reason, reporter);
                break;
            }
            self.enumerate(seed, &mut run, reporter).await;
        }

        reporter.report(CrawlEvent::StateChanged {
            state: CrawlState::DetailDrain,
        });
        while !run.frontier.is_empty() {
            let stop = if cancel.is_cancelled() {
                Some(StopReason::Cancelled)
            } else if run.quota.is_exhausted() {
                Some(StopReason::QuotaReached)
            } else {
                None
            };
            if let Some(reason) = stop {
                let count = run.frontier.discard_remaining();
                run.discard(count, reason, reporter);
                break;
            }

            let Some(item) = run.frontier.pop() else {
                break;
            };
            if !run.frontier.mark_visited(&item.canonical_url) {
                run.summary.duplicates += 1;
                reporter.report(CrawlEvent::Duplicate {
                    url: &item.canonical_url,
                });
                continue;
            }

            let mut record = run
                .pending
                .remove(&item.canonical_url)
                .unwrap_or_else(|| Record::new(item.canonical_url.clone()));
            self.visit_detail(&item.canonical_url, &mut record, &mut run, reporter)
                .await;
            self.finalize(record, &mut run, reporter).await;
        }

        reporter.report(CrawlEvent::StateChanged {
            state: CrawlState::Done,
        });
        self.write_snapshot(&run.summary, reporter).await;
        reporter.report(CrawlEvent::Finished {
            summary: &run.summary,
        });

        Ok(run.summary)
    }

    /// LIST phase for one seed: builds summaries for up to the remaining
    /// quota of item elements and queues their detail pages.
    async fn enumerate<R: CrawlReporter>(&self, seed: &CrawlItem, run: &mut RunState, reporter: &R) {
        let url = seed.canonical_url.as_str();
        if let Err(e) = self
            .open(Phase::List, url, self.tables.listing.anchor.as_deref(), run, reporter)
            .await
        {
            self.item_fault(Phase::List, url, &e, run, reporter).await;
            return;
        }

        let base = match self.guard.probe("current_url", self.page.current_url()).await {
            Ok(current) if current.starts_with("http") => current,
            _ => url.to_string(),
        };

        let (selector, items) = match self.find_items().await {
            Ok(Some(found)) => found,
            Ok(None) => {
                reporter.report(CrawlEvent::ItemsFound {
                    url,
                    selector: None,
                    count: 0,
                });
                return;
            }
            Err(e) => {
                self.item_fault(Phase::List, url, &e, run, reporter).await;
                return;
            }
        };
        reporter.report(CrawlEvent::ItemsFound {
            url,
            selector: Some(selector),
            count: items.len(),
        });

        for (position, item) in items.iter().enumerate() {
            if run.quota_claimed() {
                break;
            }

            let extraction =
                extract_fields(&self.guard, item, Phase::List, &self.tables.listing.fields).await;

            let link = extraction.value(FieldName::Link).and_then(|href| {
                match (resolve_link(&base, href), canonicalize_link(&base, href)) {
                    (Ok(absolute), Ok(canonical)) => Some((absolute, canonical)),
                    (Err(e), _) | (_, Err(e)) => {
                        tracing::debug!(%href, error = %e, "Unusable item link");
                        None
                    }
                }
            });

            match link {
                Some((absolute, canonical)) => {
                    let mut record = Record::new(canonical);
                    record.merge(&extraction.values);
                    record.link = Some(absolute);
                    run.admit(record, reporter);
                }
                None => {
                    // No item URL to key on; the listing position keeps
                    // link-less records apart.
                    let mut record = Record::new(format!("{url}#item-{}", position + 1));
                    record.merge(&extraction.values);
                    self.finalize(record, run, reporter).await;
                }
            }

            if let Some(e) = &extraction.fault {
                self.item_fault(Phase::List, url, e, run, reporter).await;
                break;
            }
        }
    }

    /// DETAIL phase for one item. Whatever was resolved before a fault
    /// stays merged into `record`.
    async fn visit_detail<R: CrawlReporter>(
        &self,
        url: &str,
        record: &mut Record,
        run: &mut RunState,
        reporter: &R,
    ) {
        let detail = &self.tables.detail;
        let fault = match self
            .open(Phase::Detail, url, detail.anchor.as_deref(), run, reporter)
            .await
        {
            Err(e) => Some(e),
            Ok(()) => match self.guard.prepare(&self.page, &detail.prepare).await {
                Err(e) => Some(e),
                Ok(()) => {
                    let extraction =
                        extract_fields(&self.guard, &self.page, Phase::Detail, &detail.fields).await;
                    record.merge(&extraction.values);
                    extraction.fault
                }
            },
        };

        if let Some(e) = fault {
            self.item_fault(Phase::Detail, url, &e, run, reporter).await;
        }
    }

    async fn open<R: CrawlReporter>(
        &self,
        phase: Phase,
        url: &str,
        anchor: Option<&str>,
        run: &mut RunState,
        reporter: &R,
    ) -> Result<(), AppError> {
        run.summary.visited += 1;
        self.guard.navigate(&self.page, url).await?;
        let readiness = self.guard.wait_until_ready(&self.page, anchor).await?;
        if readiness.is_degraded() {
            run.summary.degraded_pages += 1;
        }
        reporter.report(CrawlEvent::PageReady {
            phase,
            url,
            readiness,
        });
        Ok(())
    }

    /// First item selector that yields elements, with those elements.
    async fn find_items(&self) -> Result<Option<(&str, Vec<P::Item>)>, AppError> {
        let limit = self.guard.config().action_timeout;
        for selector in &self.tables.listing.item_selectors {
            match self.guard.bounded("items", limit, self.page.items(selector)).await {
                Ok(items) if !items.is_empty() => return Ok(Some((selector.as_str(), items))),
                Ok(_) => {}
                Err(e) if e.fault_kind() == FaultKind::Transient => {}
                Err(e) => return Err(e),
            }
        }
        Ok(None)
    }

    async fn item_fault<R: CrawlReporter>(
        &self,
        phase: Phase,
        url: &str,
        error: &AppError,
        run: &mut RunState,
        reporter: &R,
    ) {
        run.summary.faults += 1;
        reporter.report(CrawlEvent::ItemFault { phase, url, error });

        if error.needs_recovery() {
            let limit = self.guard.config().navigation_timeout;
            if let Err(e) = self.guard.bounded("recover", limit, self.page.recover()).await {
                tracing::error!(error = %e, "Failed to reopen page");
            }
        }
    }

    /// Persists a finished record. A sink failure is reported but the record
    /// still counts against the quota and appears in the snapshot.
    async fn finalize<R: CrawlReporter>(&self, record: Record, run: &mut RunState, reporter: &R) {
        if !run.quota.consume() {
            run.summary.discarded += 1;
            return;
        }

        match self.sink.append(&record).await {
            Ok(()) => {
                run.summary.persisted += 1;
                reporter.report(CrawlEvent::Persisted {
                    url: record.canonical_url(),
                    fields: record.resolved_count(),
                });
            }
            Err(e) => {
                reporter.report(CrawlEvent::PersistFailed {
                    url: record.canonical_url(),
                    error: &e,
                });
            }
        }
        run.summary.records.push(record);
    }

    async fn write_snapshot<R: CrawlReporter>(&self, summary: &CrawlSummary, reporter: &R) {
        let Some(key) = &self.snapshot_key else {
            return;
        };

        let bytes = match serde_json::to_vec_pretty(&summary.records) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize snapshot");
                return;
            }
        };

        match self.sink.put_blob(key, &bytes, SNAPSHOT_CONTENT_TYPE).await {
            Ok(()) => reporter.report(CrawlEvent::SnapshotWritten {
                key,
                records: summary.records.len(),
            }),
            Err(e) => tracing::warn!(%key, error = %e, "Failed to write snapshot"),
        }
    }
}
