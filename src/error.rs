//! Error types.
//!
//! Domain failures of the search (no rule matched, depth exceeded, ...) are
//! never errors: they are recorded on the solution itself as a
//! [`SolutionError`](crate::SolutionError). The types here cover the few
//! things that do abort a request or a catalog load.

use crate::{EntryId, RuleId};
use thiserror::Error;

pub type Result<T, E = AnalysisError> = std::result::Result<T, E>;

/// Errors that abort an analysis request.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// The request's cancellation token fired. Any partial tree is discarded.
    #[error("analysis cancelled")]
    Cancelled,

    #[error("invalid request: {reason}")]
    InvalidRequest { reason: String },

    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("no dictionary entry with id {id}")]
    UnknownEntry { id: EntryId },

    #[error("analysis worker panicked")]
    WorkerPanicked,
}

/// Errors raised while building an in-memory catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to parse catalog: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("entry {id} ('{entry}'): {reason}")]
    InvalidEntry { id: EntryId, entry: String, reason: String },

    #[error("duplicate entry id {id}")]
    DuplicateEntry { id: EntryId },

    #[error("entry {id} references unknown {side} part {part}")]
    UnknownPart { id: EntryId, side: &'static str, part: EntryId },

    #[error("compound parts of entry {id} form a cycle")]
    CyclicEntry { id: EntryId },

    #[error("rule {id}: invalid pattern: {source}")]
    InvalidPattern {
        id: RuleId,
        #[source]
        source: regex::Error,
    },

    #[error("rule {id}: template '{template}' references capture group '{group}' which the pattern does not define")]
    MissingCapture { id: RuleId, template: String, group: String },

    #[error("sandhi pattern '{surface}' -> '{underlying}' has an empty group")]
    EmptySandhiGroup { surface: String, underlying: String },

    #[error("frequency of '{entry}' must be within [0, 1], got {rating}")]
    InvalidFrequency { entry: String, rating: f64 },
}
