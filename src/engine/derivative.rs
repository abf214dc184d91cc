//! Derivative validity filter.
//!
//! The direct-id search attaches rule-derived solutions next to the stored
//! entry they were derived from. A derivative may only fill in what the
//! original left open; it is dropped when it contradicts anything the
//! original already fixes.

use super::CancellationToken;
use super::rebuild::{Rebuild, rebuild_form, rebuild_solution, visit_side, visit_solutions};
use crate::error::Result;
use crate::{MorphBase, Solution, WordForm};
use std::sync::Arc;

#[derive(Debug, Clone, Copy)]
pub struct DerivativeFilter {
    fanout_threshold: usize,
}

impl Default for DerivativeFilter {
    fn default() -> Self {
        DerivativeFilter { fanout_threshold: super::Pruner::DEFAULT_FANOUT_THRESHOLD }
    }
}

impl DerivativeFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fanout_threshold(mut self, threshold: usize) -> Self {
        self.fanout_threshold = threshold;
        self
    }

    pub fn run(&self, form: &Arc<WordForm>, cancel: &CancellationToken) -> Result<Arc<WordForm>> {
        Ok(self.form(form, cancel)?.into_option(form).unwrap_or_else(|| Arc::new(WordForm::empty(form.entry.clone()))))
    }

    fn form(&self, form: &Arc<WordForm>, cancel: &CancellationToken) -> Result<Rebuild<WordForm>> {
        cancel.check()?;

        let outcomes = visit_solutions(&form.solutions, self.fanout_threshold, |solution| {
            let Some(sid) = solution.original else {
                let left = visit_side(solution.left.as_ref(), |f| self.form(f, cancel))?;
                let right = visit_side(solution.right.as_ref(), |f| self.form(f, cancel))?;
                return Ok(rebuild_solution(solution, left, right));
            };
            // an original that is gone can no longer contradict anything
            match form.solutions.iter().find(|s| s.sid == sid) {
                Some(original) if !is_consistent(original, solution) => Ok(Rebuild::Removed),
                _ => Ok(Rebuild::Unchanged),
            }
        })?;
        Ok(rebuild_form(form, outcomes))
    }
}

fn is_consistent(original: &Solution, derived: &Solution) -> bool {
    if original.content.base != MorphBase::Unknown && original.content.base != derived.content.base {
        return false;
    }
    if !same_part(original.left.as_deref(), derived.left.as_deref())
        || !same_part(original.right.as_deref(), derived.right.as_deref())
    {
        return false;
    }

    let fixed = original.content.parameters;
    let derived = derived.content.parameters;
    fixed.slots().iter().zip(derived.slots()).all(|(&o, &d)| o == 0 || o == d)
}

fn same_part(original: Option<&WordForm>, derived: Option<&WordForm>) -> bool {
    let Some(original) = original else {
        return true;
    };
    let Some(derived) = derived else {
        return false;
    };
    if original.entry != derived.entry {
        return false;
    }

    let first_id = |form: &WordForm| form.best().map_or(0, |s| s.content.id);
    let id = first_id(original);
    id == 0 || first_id(derived) == id
}
