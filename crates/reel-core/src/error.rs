use thiserror::Error;

/// Application-wide error types for Reel.
#[derive(Error, Debug)]
pub enum AppError {
    /// A locator matched nothing on the page or item.
    #[error("Candidate not found: {0}")]
    CandidateNotFound(String),

    /// A short, bounded page operation (probe, read, action) ran out of time.
    #[error("{operation} timed out after {millis} ms")]
    OperationTimeout { operation: String, millis: u64 },

    /// Navigation did not complete within the navigation timeout.
    #[error("Navigation to {url} timed out after {secs} seconds")]
    NavigationTimeout { url: String, secs: u64 },

    /// The page or its browsing context is closed or unreachable.
    #[error("Page terminal: {0}")]
    PageTerminal(String),

    /// Browser fault that could not be classified.
    #[error("Page error: {0}")]
    PageError(String),

    /// A URL could not be parsed or canonicalized.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Run configuration is unusable. The only fatal error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Persistence collaborator rejected a write.
    #[error("Sink error: {0}")]
    SinkError(String),

    /// Database operation failed.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// JSON serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Generic error.
    #[error("{0}")]
    Generic(String),
}

/// How a page fault affects the work in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// Only the current candidate failed; the chain continues.
    Transient,
    /// Extraction for the current item stops; the run continues.
    Terminal,
    /// Unclassified. Logged and handled like `Terminal`.
    Unknown,
}

impl std::fmt::Display for FaultKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FaultKind::Transient => write!(f, "transient"),
            FaultKind::Terminal => write!(f, "terminal"),
            FaultKind::Unknown => write!(f, "unknown"),
        }
    }
}

impl AppError {
    /// Classifies this error for the page lifecycle guard.
    pub fn fault_kind(&self) -> FaultKind {
        match self {
            AppError::CandidateNotFound(_) | AppError::OperationTimeout { .. } => {
                FaultKind::Transient
            }
            AppError::PageTerminal(_) | AppError::NavigationTimeout { .. } => FaultKind::Terminal,
            _ => FaultKind::Unknown,
        }
    }

    /// Returns true if the shared page handle must be reopened before reuse.
    pub fn needs_recovery(&self) -> bool {
        matches!(self, AppError::PageTerminal(_))
    }

    /// Returns true if this error must abort the whole run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, AppError::ConfigError(_))
    }
}
