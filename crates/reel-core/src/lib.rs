pub mod canonical;
pub mod config;
pub mod crawl;
pub mod error;
pub mod extractor;
pub mod fields;
pub mod frontier;
pub mod guard;
pub mod models;
pub mod normalize;
pub mod resolver;
pub mod traits;

#[cfg(test)]
mod testutil;

pub use config::{CrawlPlan, RunInput};
pub use crawl::{CrawlReporter, CrawlService, CrawlSummary, TracingCrawlReporter};
pub use error::{AppError, FaultKind};
pub use fields::FieldTables;
pub use guard::{GuardConfig, PageGuard};
pub use models::{CrawlItem, FieldName, Phase, Record, compute_hash};
pub use traits::{LoadState, NullSink, PageHandle, PageScope, Sink};
