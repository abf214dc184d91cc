//! Engine run metrics.
//!
//! A small set of structs used to observe and debug one analysis request:
//!
//! - `Analyzer::analyze` for normal operation.
//! - `Analyzer::analyze_verbose` for profiling, debugging regressions, and
//!   inspecting what each stage did to the tree.
//!
//! Solution counts are taken over the whole tree (every nested form), so a
//! pass that drops one deep solution shows up as a difference of one.

use serde::Serialize;
use std::time::Duration;

// --- Metrics -----------------------------------------------------------------

#[derive(Debug, Default, Clone, Serialize)]
pub struct RunMetrics {
    /// Total elapsed time for the request.
    pub total: Duration,
    /// The recursive solution search.
    pub search: SearchMetrics,
    /// Depth pruning pass.
    pub prune: PassMetrics,
    /// Derivative validity filter.
    pub filter: PassMetrics,
    /// Registered optional passes, in the order they ran.
    pub passes: Vec<PassMetrics>,
    /// Rating and ordering.
    pub rating: Duration,
}

/// Counters for the search phase.
#[derive(Debug, Default, Clone, Serialize)]
pub struct SearchMetrics {
    pub duration: Duration,
    /// Deepest rule application depth reached.
    pub depth_watermark: usize,
    pub memo_hits: usize,
    pub memo_misses: usize,
    /// Rule applications that were actually computed (memo misses within the
    /// depth bound).
    pub rule_applications: usize,
    /// Solutions in the produced tree.
    pub solutions: usize,
}

/// Timing and solution counts for a single pass.
#[derive(Debug, Default, Clone, Serialize)]
pub struct PassMetrics {
    pub name: String,
    pub duration: Duration,
    pub solutions_before: usize,
    pub solutions_after: usize,
}

impl PassMetrics {
    pub fn new(name: impl Into<String>) -> Self {
        PassMetrics { name: name.into(), ..Default::default() }
    }

    /// Solutions the pass removed.
    pub fn removed(&self) -> usize {
        self.solutions_before.saturating_sub(self.solutions_after)
    }
}
