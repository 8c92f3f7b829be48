//! Deduplicated, quota-bounded work queue.

use std::collections::{HashSet, VecDeque};

use crate::models::CrawlItem;

/// Outcome of offering an item to the frontier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Queued,
    /// The canonical URL was already admitted once during this run.
    Duplicate,
    /// Every remaining quota slot is already claimed by a queued item.
    QuotaReached,
}

/// Maximum number of records a run may produce.
///
/// Owned by the orchestrator and passed by reference to whatever needs to
/// check it; the count only ever grows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quota {
    max: usize,
    used: usize,
}

impl Quota {
    pub fn new(max: usize) -> Self {
        Self { max, used: 0 }
    }

    /// Claims one slot. Returns false, without counting, once exhausted.
    pub fn consume(&mut self) -> bool {
        if self.is_exhausted() {
            return false;
        }
        self.used += 1;
        true
    }

    pub fn remaining(&self) -> usize {
        self.max - self.used
    }

    pub fn is_exhausted(&self) -> bool {
        self.used >= self.max
    }

    pub fn used(&self) -> usize {
        self.used
    }

    pub fn max(&self) -> usize {
        self.max
    }
}

/// FIFO of pending crawl items with a dedup set keyed by canonical URL.
///
/// A URL admitted once is never admitted again, even after it has been
/// popped, so one canonical URL yields at most one live item per run.
#[derive(Debug, Default)]
pub struct Frontier {
    queue: VecDeque<CrawlItem>,
    seen: HashSet<String>,
    visited: HashSet<String>,
}

impl Frontier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offers an item. Duplicates are detected before the quota so a
    /// rediscovered URL is never reported as a quota rejection.
    pub fn push(&mut self, item: CrawlItem, quota: &Quota) -> Admission {
        if self.seen.contains(&item.canonical_url) {
            return Admission::Duplicate;
        }
        if self.queue.len() >= quota.remaining() {
            return Admission::QuotaReached;
        }
        self.seen.insert(item.canonical_url.clone());
        self.queue.push_back(item);
        Admission::Queued
    }

    pub fn pop(&mut self) -> Option<CrawlItem> {
        self.queue.pop_front()
    }

    /// Records a visit. Returns false if the URL was already visited.
    pub fn mark_visited(&mut self, canonical_url: &str) -> bool {
        self.visited.insert(canonical_url.to_string())
    }

    pub fn is_visited(&self, canonical_url: &str) -> bool {
        self.visited.contains(canonical_url)
    }

    /// Drops every pending item without visiting it. Returns how many were
    /// dropped.
    pub fn discard_remaining(&mut self) -> usize {
        let count = self.queue.len();
        self.queue.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
