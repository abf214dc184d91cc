//! Memoization of rule applications.
//!
//! The same (draft, rule, sandhi match, proposed split) tuple is reached
//! repeatedly while searching: different rules propose the same sides, and
//! sibling sub-searches revisit the same text. Without a memo the search
//! re-derives whole subtrees and, for cyclic rule sets, only the depth bound
//! stops it.
//!
//! ## What counts as "the same application"
//!
//! `SolutionKey` combines:
//!
//! - the draft's id, parameters, base and applied rule ids
//! - the text and first-solution id of each pre-resolved draft part
//! - the rule id
//! - the proposed left/right texts and the sandhi match
//! - the level at which the rule applies: depth and collapsed steps
//!
//! The level is part of the key so that a result computed close to either
//! bound (and truncated by it) is never reused further from it.
//!
//! Inserts are insert-if-absent: when two workers race on one key, both
//! return the value stored first, so callers always observe a single
//! `Arc<Solution>` per key.

use crate::{EntryId, MorphBase, MorphRule, Parameters, RuleId, SandhiMatch, Solution, WordForm};
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct SolutionKey {
    pub(crate) draft_id: EntryId,
    pub(crate) draft_parameters: Parameters,
    pub(crate) draft_base: MorphBase,
    pub(crate) draft_rules: Vec<RuleId>,
    pub(crate) draft_left: Option<PartKey>,
    pub(crate) draft_right: Option<PartKey>,
    pub(crate) rule: RuleId,
    pub(crate) left: Option<String>,
    pub(crate) right: Option<String>,
    pub(crate) sandhi: SandhiMatch,
    pub(crate) level: Level,
}

/// Position of a rule application along its branch.
///
/// Collapsed rules leave `depth` alone and count toward `collapsed` instead,
/// so a chain of collapsed rules is bounded on its own.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub(crate) struct Level {
    pub(crate) depth: usize,
    pub(crate) collapsed: usize,
}

impl Level {
    pub(crate) fn after(self, rule: &MorphRule) -> Level {
        if rule.is_collapsed {
            Level { collapsed: self.collapsed + 1, ..self }
        } else {
            Level { depth: self.depth + 1, ..self }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct PartKey {
    entry: String,
    id: EntryId,
}

impl PartKey {
    fn of(form: &WordForm) -> Self {
        PartKey { entry: form.entry.clone(), id: form.best().map_or(0, |s| s.content.id) }
    }
}

impl SolutionKey {
    pub(crate) fn new(
        draft: &Solution,
        rule: &MorphRule,
        sandhi: &SandhiMatch,
        left: &Option<String>,
        right: &Option<String>,
        level: Level,
    ) -> Self {
        SolutionKey {
            draft_id: draft.content.id,
            draft_parameters: draft.content.parameters,
            draft_base: draft.content.base,
            draft_rules: draft.rules.iter().flatten().map(|r| r.id).collect(),
            draft_left: draft.left.as_deref().map(PartKey::of),
            draft_right: draft.right.as_deref().map(PartKey::of),
            rule: rule.id,
            left: left.clone(),
            right: right.clone(),
            sandhi: sandhi.clone(),
            level,
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct SolutionMemo {
    cache: DashMap<SolutionKey, Arc<Solution>>,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl SolutionMemo {
    pub(crate) fn get(&self, key: &SolutionKey) -> Option<Arc<Solution>> {
        let hit = self.cache.get(key).map(|entry| entry.value().clone());
        let counter = if hit.is_some() { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
        hit
    }

    /// Store `solution` unless the key is already present; return whichever
    /// value ends up stored.
    pub(crate) fn insert(&self, key: SolutionKey, solution: Arc<Solution>) -> Arc<Solution> {
        self.cache.entry(key).or_insert(solution).value().clone()
    }

    pub(crate) fn hits(&self) -> usize {
        self.hits.load(Ordering::Relaxed)
    }

    pub(crate) fn misses(&self) -> usize {
        self.misses.load(Ordering::Relaxed)
    }
}
