//! Collaborator contracts and the in-memory catalog.
//!
//! The search engine never owns linguistic data. It queries four read-only
//! collaborators, each behind a trait so that hosts can plug in their own
//! storage:
//!
//! ```text
//!                 ┌──────────────────────┐
//!  search.rs ───▶ │ Dictionary           │  entries by constraints / by id
//!            ───▶ │ RuleSource           │  rules by label, sandhi matches
//!            ───▶ │ CombinationValidator │  legal parameter vectors
//!  rating.rs ───▶ │ FrequencySource      │  per-layer lexical frequency
//!                 └──────────────────────┘
//! ```
//!
//! All collaborators must be `Send + Sync`: wide rule sets and sibling lists
//! are processed on the rayon pool and query them concurrently.
//!
//! `MemoryCatalog` (in `catalog/memory.rs`) implements every contract on top
//! of plain vectors and maps. It is what the CLI and the tests use; it can be
//! built programmatically or loaded from TOML (`catalog/file.rs`). Sandhi
//! scanning lives in `catalog/sandhi.rs`.

#[path = "catalog/file.rs"]
mod file;
#[path = "catalog/memory.rs"]
mod memory;
#[path = "catalog/sandhi.rs"]
mod sandhi;

pub use memory::MemoryCatalog;
pub use sandhi::SandhiPattern;

use crate::{EntryId, MorphBase, MorphEntry, MorphRule, Parameters, SandhiMatch};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Constraints for a dictionary probe.
#[derive(Debug, Clone, Copy)]
pub struct EntryQuery<'a> {
    pub entry: &'a str,
    pub parameters: Parameters,
    pub base: MorphBase,
    pub is_virtual: Option<bool>,
    /// Required id of the entry's left part, if any.
    pub left: Option<EntryId>,
    /// Required id of the entry's right part, if any.
    pub right: Option<EntryId>,
}

impl EntryQuery<'_> {
    /// Whether `candidate` satisfies every constraint of the query.
    pub fn accepts(&self, candidate: &MorphEntry) -> bool {
        if candidate.entry != self.entry {
            return false;
        }
        if !candidate.parameters.is_compatible(&self.parameters) || !self.base.accepts(candidate.base) {
            return false;
        }
        if let (Some(wanted), Some(actual)) = (self.is_virtual, candidate.is_virtual) {
            if wanted != actual {
                return false;
            }
        }
        let part_matches = |wanted: Option<EntryId>, part: &Option<Arc<MorphEntry>>| match wanted {
            Some(id) => part.as_ref().is_some_and(|p| p.id == id),
            None => true,
        };
        part_matches(self.left, &candidate.left) && part_matches(self.right, &candidate.right)
    }
}

/// Dictionary lookup.
pub trait Dictionary: Send + Sync {
    /// All entries satisfying `query`.
    fn find(&self, query: &EntryQuery<'_>) -> Vec<Arc<MorphEntry>>;

    /// The entry stored under `id`.
    fn get(&self, id: EntryId) -> Option<Arc<MorphEntry>>;
}

/// Rule lookup. Implementations are expected to cache both queries; the
/// engine calls them once per expanded node.
pub trait RuleSource: Send + Sync {
    /// Ordered candidate rules of `label` applicable to `parameters`.
    fn rules(&self, label: &str, parameters: &Parameters) -> Arc<[Arc<MorphRule>]>;

    /// Candidate sandhi matches of `entry` under `rule`. Empty when the rule
    /// cannot apply to the entry.
    fn sandhi_matches(&self, entry: &str, rule: &MorphRule) -> Arc<[SandhiMatch]>;
}

/// Validation of parameter vectors against the legal combinations.
pub trait CombinationValidator: Send + Sync {
    /// `None` when no legal combination is compatible with `parameters`;
    /// otherwise the legal vector with previously unset slots filled in.
    fn complete(&self, parameters: &Parameters) -> Option<Parameters>;
}

/// Historical period bucket selecting which frequency statistics apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Layer(pub u8);

/// Lexical frequency ratings.
pub trait FrequencySource: Send + Sync {
    /// Pick the layer that best fits `entry`.
    fn detect_layer(&self, entry: &str) -> Layer;

    /// Frequency rating of `entry` within `layer`, in `[0, 1]`.
    fn rating(&self, layer: Layer, entry: &str) -> f64;
}
