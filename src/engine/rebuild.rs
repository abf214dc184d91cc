//! Rebuild-on-change helpers for tree passes.
//!
//! Trees are immutable `Arc` graphs. A pass walks a tree and reports, per
//! node, whether it is kept as-is, dropped, or replaced. Parents are rebuilt
//! only when a child actually changed, so untouched subtrees stay shared with
//! the input (`Arc::ptr_eq` holds for them).

use crate::error::Result;
use crate::{Solution, WordForm};
use rayon::prelude::*;
use std::sync::Arc;

#[derive(Debug)]
pub(crate) enum Rebuild<T> {
    Unchanged,
    Removed,
    Rebuilt(Arc<T>),
}

impl<T> Rebuild<T> {
    /// Resolve against the node that was visited.
    pub(crate) fn into_option(self, visited: &Arc<T>) -> Option<Arc<T>> {
        match self {
            Rebuild::Unchanged => Some(visited.clone()),
            Rebuild::Removed => None,
            Rebuild::Rebuilt(node) => Some(node),
        }
    }
}

/// Visit every solution of a sibling list, on the rayon pool when the list is
/// longer than `threshold`. Outcomes are returned in list order.
pub(crate) fn visit_solutions<F>(solutions: &[Arc<Solution>], threshold: usize, visit: F) -> Result<Vec<Rebuild<Solution>>>
where
    F: Fn(&Arc<Solution>) -> Result<Rebuild<Solution>> + Sync + Send,
{
    if solutions.len() > threshold {
        solutions.par_iter().map(&visit).collect()
    } else {
        solutions.iter().map(&visit).collect()
    }
}

/// Visit an optional sub-form; an absent side is unchanged.
pub(crate) fn visit_side<F>(form: Option<&Arc<WordForm>>, visit: F) -> Result<Rebuild<WordForm>>
where
    F: FnOnce(&Arc<WordForm>) -> Result<Rebuild<WordForm>>,
{
    match form {
        Some(form) => visit(form),
        None => Ok(Rebuild::Unchanged),
    }
}

/// Assemble a form from per-solution outcomes. A form whose solutions were
/// all removed is itself removed.
pub(crate) fn rebuild_form(form: &WordForm, outcomes: Vec<Rebuild<Solution>>) -> Rebuild<WordForm> {
    if outcomes.iter().all(|o| matches!(o, Rebuild::Unchanged)) {
        return Rebuild::Unchanged;
    }

    let solutions: Vec<Arc<Solution>> =
        form.solutions.iter().zip(outcomes).filter_map(|(solution, outcome)| outcome.into_option(solution)).collect();
    if solutions.is_empty() {
        Rebuild::Removed
    } else {
        Rebuild::Rebuilt(Arc::new(WordForm::new(form.entry.clone(), solutions)))
    }
}

/// Rebuild a solution around changed sub-forms. A removed sub-form removes
/// the solution.
pub(crate) fn rebuild_solution(
    solution: &Arc<Solution>,
    left: Rebuild<WordForm>,
    right: Rebuild<WordForm>,
) -> Rebuild<Solution> {
    match (left, right) {
        (Rebuild::Removed, _) | (_, Rebuild::Removed) => Rebuild::Removed,
        (Rebuild::Unchanged, Rebuild::Unchanged) => Rebuild::Unchanged,
        (left, right) => {
            let mut rebuilt = Solution::clone(solution);
            if let Rebuild::Rebuilt(form) = left {
                rebuilt.left = Some(form);
            }
            if let Rebuild::Rebuilt(form) = right {
                rebuilt.right = Some(form);
            }
            Rebuild::Rebuilt(Arc::new(rebuilt))
        }
    }
}
