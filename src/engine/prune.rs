//! Depth pruning.
//!
//! The search truncates at the depth bound by inserting `DepthIsExceeded`
//! sentinels, and memoized subtrees computed for one position may be attached
//! at a deeper one. This pass re-walks the finished tree with the real depth
//! of every node and drops what lies beyond the bound:
//!
//! - every `DepthIsExceeded` sentinel
//! - id-less solutions (nothing matched them to the dictionary) deeper than
//!   the bound
//! - any solution whose sub-form lost all of its solutions
//!
//! Collapsed rules do not count toward depth, mirroring the search.

use super::CancellationToken;
use super::rebuild::{Rebuild, rebuild_form, rebuild_solution, visit_side, visit_solutions};
use crate::error::Result;
use crate::{Solution, SolutionError, WordForm};
use std::sync::Arc;

#[derive(Debug, Clone, Copy)]
pub struct Pruner {
    max_depth: usize,
    fanout_threshold: usize,
}

impl Pruner {
    pub const DEFAULT_FANOUT_THRESHOLD: usize = 20;

    pub fn new(max_depth: usize) -> Self {
        Pruner { max_depth, fanout_threshold: Self::DEFAULT_FANOUT_THRESHOLD }
    }

    /// Sibling lists longer than `threshold` are pruned on the rayon pool.
    pub fn with_fanout_threshold(mut self, threshold: usize) -> Self {
        self.fanout_threshold = threshold;
        self
    }

    /// Prune `form`. `None` when nothing survives.
    pub fn run(&self, form: &Arc<WordForm>, cancel: &CancellationToken) -> Result<Option<Arc<WordForm>>> {
        Ok(self.form(form, 0, cancel)?.into_option(form))
    }

    fn form(&self, form: &Arc<WordForm>, depth: usize, cancel: &CancellationToken) -> Result<Rebuild<WordForm>> {
        cancel.check()?;
        if form.is_empty() {
            return Ok(Rebuild::Removed);
        }

        let outcomes = visit_solutions(&form.solutions, self.fanout_threshold, |s| self.solution(s, depth, cancel))?;
        Ok(rebuild_form(form, outcomes))
    }

    fn solution(&self, solution: &Arc<Solution>, depth: usize, cancel: &CancellationToken) -> Result<Rebuild<Solution>> {
        let collapsed = solution.first_rule().is_some_and(|rule| rule.is_collapsed);
        let depth = if collapsed { depth } else { depth + 1 };

        if solution.content.error == SolutionError::DepthIsExceeded
            || (solution.content.id == 0 && depth > self.max_depth)
        {
            return Ok(Rebuild::Removed);
        }

        let left = visit_side(solution.left.as_ref(), |form| self.form(form, depth, cancel))?;
        if matches!(left, Rebuild::Removed) {
            return Ok(Rebuild::Removed);
        }
        let right = visit_side(solution.right.as_ref(), |form| self.form(form, depth, cancel))?;
        Ok(rebuild_solution(solution, left, right))
    }
}
