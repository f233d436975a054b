//! Centralized error types for pdfharvest.

use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the pdfharvest library.
#[derive(Error, Debug)]
pub enum HarvestError {
    /// A required key (message ID, content hash, filename) was empty.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A ledger lookup missed.
    #[error("{kind} not found: {key}")]
    NotFound { kind: &'static str, key: String },

    /// I/O error with the associated file path.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The ledger could not be serialized.
    #[error("Failed to encode ledger '{path}': {source}")]
    Encode {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// The ledger file (or a value stored in it) could not be decoded.
    #[error("Failed to decode ledger '{path}': {reason}")]
    Decode { path: PathBuf, reason: String },

    /// The mail provider call failed.
    #[error("Mail provider error: {0}")]
    Remote(String),

    /// A desktop notification could not be delivered.
    #[error("Notification failed: {0}")]
    Notification(String),

    /// Configuration could not be resolved.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Per-item failures accumulated over a batch pass.
    #[error("{phase}: {count} item(s) failed ({kinds})")]
    Batch {
        phase: &'static str,
        count: usize,
        kinds: String,
    },
}

/// Convenience alias for `Result<T, HarvestError>`.
pub type Result<T> = std::result::Result<T, HarvestError>;

impl HarvestError {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a `NotFound` variant.
    pub fn not_found(kind: &'static str, key: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            key: key.into(),
        }
    }

    /// Short, stable name of the error kind, used in batch summaries.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "invalid-argument",
            Self::NotFound { .. } => "not-found",
            Self::Io { .. } => "io",
            Self::Encode { .. } => "encode",
            Self::Decode { .. } => "decode",
            Self::Remote(_) => "remote",
            Self::Notification(_) => "notification",
            Self::Config(_) => "config",
            Self::Batch { .. } => "batch",
        }
    }
}

/// One failed item of a batch pass.
#[derive(Debug)]
pub struct ItemFailure {
    /// Operation that failed (e.g. `"download_attachment"`).
    pub op: &'static str,
    /// Identifier of the item (message ID, filename, ...).
    pub item: String,
    pub error: HarvestError,
}

impl ItemFailure {
    pub fn new(op: &'static str, item: impl Into<String>, error: HarvestError) -> Self {
        Self {
            op,
            item: item.into(),
            error,
        }
    }
}

impl std::fmt::Display for ItemFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} [{}]: {}", self.op, self.item, self.error)
    }
}

/// Collapse accumulated failures into a single [`HarvestError::Batch`].
///
/// Returns `None` when there is nothing to report. Kinds are listed with
/// their counts, e.g. `"remote x2, io x1"`.
pub fn aggregate<'a>(
    phase: &'static str,
    failures: impl IntoIterator<Item = &'a ItemFailure>,
) -> Option<HarvestError> {
    let mut count = 0;
    let mut counts: Vec<(&'static str, usize)> = Vec::new();
    for failure in failures {
        count += 1;
        let kind = failure.error.kind();
        match counts.iter_mut().find(|(k, _)| *k == kind) {
            Some((_, n)) => *n += 1,
            None => counts.push((kind, 1)),
        }
    }
    if count == 0 {
        return None;
    }
    let kinds = counts
        .iter()
        .map(|(k, n)| format!("{k} x{n}"))
        .collect::<Vec<_>>()
        .join(", ");
    Some(HarvestError::Batch {
        phase,
        count,
        kinds,
    })
}
