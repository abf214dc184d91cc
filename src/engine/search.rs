//! Depth-bounded, memoized solution search.
//!
//! The search is one family of mutually recursive methods parameterized by
//! the current level (depth plus collapsed steps):
//!
//! ```text
//! search(request, level)
//!   ├─ dictionary probe ──────────────▶ dictionary solutions
//!   └─ expand(draft, entry, label, level)
//!        └─ per rule: apply_rule
//!             └─ per sandhi match: from_sandhi(level after rule)
//!                  ├─ memo hit ───────▶ cached solution
//!                  ├─ level > max ────▶ DepthIsExceeded sentinel
//!                  └─ resolve_parts
//!                       └─ search(side, level) for each side
//! ```
//!
//! Plain rules raise the depth, collapsed rules raise the collapsed count.
//! Both are bounded (`max_depth_level`, `max_collapsed_steps`), so every
//! branch ends in a sentinel at the latest.
//!
//! Every domain failure is recorded on the produced solution. The only error
//! that leaves this module is `AnalysisError::Cancelled`.

use super::CancellationToken;
use super::memo::{Level, SolutionKey, SolutionMemo};
use super::metrics::SearchMetrics;
use crate::error::Result;
use crate::{
    Context, DICTIONARY_LABEL, EntryQuery, MorphBase, MorphEntry, MorphRule, Options, Parameters, RuleType,
    SandhiGroup, SandhiMatch, SearchRequest, Solution, SolutionContent, SolutionError, SolutionId, WordForm,
};
use rayon::prelude::*;
use regex::Captures;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tracing::{debug, trace};

/// State of one search request: collaborators, bounds, memo and counters.
///
/// A `SolutionSearch` is meant to serve a single request; its memo assumes
/// the catalog does not change underneath it.
pub struct SolutionSearch<'a> {
    context: &'a Context,
    options: &'a Options,
    cancel: &'a CancellationToken,
    memo: SolutionMemo,
    next_sid: AtomicU64,
    watermark: AtomicUsize,
    rule_applications: AtomicUsize,
}

/// Outcome of resolving one side of a proposed split.
enum Side {
    Absent,
    Resolved(Arc<WordForm>),
    EmptyText,
    NotFound,
}

impl<'a> SolutionSearch<'a> {
    pub fn new(context: &'a Context, options: &'a Options, cancel: &'a CancellationToken) -> Self {
        SolutionSearch {
            context,
            options,
            cancel,
            memo: SolutionMemo::default(),
            next_sid: AtomicU64::new(1),
            watermark: AtomicUsize::new(0),
            rule_applications: AtomicUsize::new(0),
        }
    }

    /// Continue with the memo of an interrupted search under a new token.
    ///
    /// Only finished applications are memoized, so entries written before a
    /// cancellation are reused as-is.
    pub fn resume_with(self, cancel: &'a CancellationToken) -> Self {
        SolutionSearch { cancel, ..self }
    }

    /// Parameter-search path: analyze `request.entry` under the request's
    /// constraints.
    pub fn search(&self, request: &SearchRequest) -> Result<WordForm> {
        self.search_at(request, Level::default())
    }

    /// Direct-id path: start from a stored entry and, when it is incomplete,
    /// derive the missing information by rule expansion.
    ///
    /// Derived solutions are returned next to the direct one, each pointing
    /// back at it through `original`.
    pub fn search_by_id(&self, entry: &MorphEntry) -> Result<WordForm> {
        self.cancel.check()?;
        let direct = self.entry_solution(entry);
        let mut solutions = vec![direct.clone()];

        if !direct.is_complete() {
            for derived in self.expand(&direct, &entry.entry, "", Level::default())? {
                let mut tagged = Solution::clone(&derived);
                tagged.sid = self.fresh_sid();
                tagged.original = Some(direct.sid);
                solutions.push(Arc::new(tagged));
            }
        }

        debug!(id = entry.id, entry = %entry.entry, solutions = solutions.len(), "direct-id search finished");
        Ok(WordForm::new(entry.entry.clone(), solutions))
    }

    /// Counters collected so far. `duration` and `solutions` are left for the
    /// caller to fill in.
    pub fn metrics(&self) -> SearchMetrics {
        SearchMetrics {
            depth_watermark: self.watermark.load(Ordering::Relaxed),
            memo_hits: self.memo.hits(),
            memo_misses: self.memo.misses(),
            rule_applications: self.rule_applications.load(Ordering::Relaxed),
            ..Default::default()
        }
    }

    fn search_at(&self, request: &SearchRequest, level: Level) -> Result<WordForm> {
        self.cancel.check()?;

        let query = EntryQuery {
            entry: &request.entry,
            parameters: request.parameters,
            base: request.base,
            is_virtual: request.is_virtual,
            left: request.left.as_ref().map(|e| e.id).filter(|&id| id != 0),
            right: request.right.as_ref().map(|e| e.id).filter(|&id| id != 0),
        };
        let found: Vec<Arc<Solution>> =
            self.context.dictionary.find(&query).iter().map(|entry| self.entry_solution(entry)).collect();
        trace!(entry = %request.entry, depth = level.depth, found = found.len(), "dictionary probe");

        if found.iter().any(|s| s.is_success()) || request.label == DICTIONARY_LABEL {
            return Ok(WordForm::new(request.entry.clone(), found));
        }

        let draft = Solution {
            sid: SolutionId(0),
            content: SolutionContent {
                id: 0,
                parameters: request.parameters,
                base: request.base,
                is_virtual: request.is_virtual,
                error: SolutionError::Success,
            },
            left: request.left.as_deref().map(|e| self.entry_form(e)),
            right: request.right.as_deref().map(|e| self.entry_form(e)),
            rules: None,
            sandhi: None,
            original: None,
            rating: Solution::UNRATED,
            collapse_rating: 1.0,
        };
        let solutions = self.expand(&draft, &request.entry, &request.label, level)?;
        Ok(WordForm::new(request.entry.clone(), solutions))
    }

    /// Apply every rule of `label` to `entry`, starting from `draft`.
    fn expand(&self, draft: &Solution, entry: &str, label: &str, level: Level) -> Result<Vec<Arc<Solution>>> {
        self.cancel.check()?;

        let rules = self.context.rules.rules(label, &draft.content.parameters);
        if rules.is_empty() {
            return Ok(vec![self.failure(draft, None, None, draft.content.parameters, SolutionError::NoRuleMatches)]);
        }

        let apply = |rule: &Arc<MorphRule>| self.apply_rule(draft, entry, rule, level);
        let per_rule: Vec<Vec<Arc<Solution>>> = if rules.len() > self.options.rule_fanout_threshold {
            rules.par_iter().map(apply).collect::<Result<_>>()?
        } else {
            rules.iter().map(apply).collect::<Result<_>>()?
        };
        Ok(per_rule.into_iter().flatten().collect())
    }

    fn apply_rule(&self, draft: &Solution, entry: &str, rule: &Arc<MorphRule>, level: Level) -> Result<Vec<Arc<Solution>>> {
        self.cancel.check()?;

        let matches = self.context.rules.sandhi_matches(entry, rule);
        let mut solutions = Vec::new();
        for sandhi in matches.iter() {
            self.cancel.check()?;
            if let Some((left, right)) = propose(entry, rule, sandhi) {
                solutions.push(self.from_sandhi(draft, rule, sandhi, left, right, level)?);
            }
        }

        if solutions.is_empty() {
            trace!(rule = rule.id, entry, "no sandhi matches");
            solutions.push(self.failure(draft, Some(rule), None, draft.content.parameters, SolutionError::NoSandhiMatches));
        }
        Ok(solutions)
    }

    fn from_sandhi(
        &self,
        draft: &Solution,
        rule: &Arc<MorphRule>,
        sandhi: &SandhiMatch,
        left: Option<String>,
        right: Option<String>,
        level: Level,
    ) -> Result<Arc<Solution>> {
        self.cancel.check()?;

        let level = level.after(rule);
        let depth = level.depth;
        let key = SolutionKey::new(draft, rule, sandhi, &left, &right, level);
        if let Some(hit) = self.memo.get(&key) {
            trace!(rule = rule.id, expression = %sandhi.expression, depth, "memo hit");
            return Ok(hit);
        }

        if depth > self.options.max_depth_level || level.collapsed > self.options.max_collapsed_steps {
            let sentinel =
                self.failure(draft, Some(rule), Some(sandhi), draft.content.parameters, SolutionError::DepthIsExceeded);
            return Ok(self.memo.insert(key, sentinel));
        }

        let previous = self.watermark.fetch_max(depth, Ordering::Relaxed);
        if depth > previous {
            debug!(depth, "depth watermark raised");
        }
        self.rule_applications.fetch_add(1, Ordering::Relaxed);
        trace!(rule = rule.id, expression = %sandhi.expression, ?left, ?right, depth, "applying rule");

        let solution = self.resolve_parts(draft, rule, sandhi, left, right, level)?;
        Ok(self.memo.insert(key, solution))
    }

    fn resolve_parts(
        &self,
        draft: &Solution,
        rule: &Arc<MorphRule>,
        sandhi: &SandhiMatch,
        left: Option<String>,
        right: Option<String>,
        level: Level,
    ) -> Result<Arc<Solution>> {
        let mut parameters = draft.content.parameters.overridden_by(&rule.parameters);
        if rule.need_to_check {
            match self.context.combinations.complete(&parameters) {
                Some(completed) => parameters = completed,
                None => {
                    let error = SolutionError::NoMorphCombinationMatches;
                    return Ok(self.failure(draft, Some(rule), Some(sandhi), parameters, error));
                }
            }
        }

        let left_parameters = side_parameters(rule.left_type, &parameters, &rule.left_parameters);
        let left = match self.resolve_side(left, draft.left.as_ref(), left_parameters, &rule.left_label, level)? {
            Side::Absent => None,
            Side::Resolved(form) => Some(form),
            Side::EmptyText => {
                return Ok(self.failure(draft, Some(rule), Some(sandhi), parameters, SolutionError::NoLeftMatches));
            }
            Side::NotFound => {
                let error = SolutionError::NotFoundLeftByParameters;
                return Ok(self.failure(draft, Some(rule), Some(sandhi), parameters, error));
            }
        };

        let right_parameters = side_parameters(rule.right_type, &parameters, &rule.right_parameters);
        let right = match self.resolve_side(right, draft.right.as_ref(), right_parameters, &rule.right_label, level)? {
            Side::Absent => None,
            Side::Resolved(form) => Some(form),
            Side::EmptyText => {
                return Ok(self.failure(draft, Some(rule), Some(sandhi), parameters, SolutionError::NoRightMatches));
            }
            Side::NotFound => {
                let error = SolutionError::NotFoundRightByParameters;
                return Ok(self.failure(draft, Some(rule), Some(sandhi), parameters, error));
            }
        };

        let mut id = draft.content.id;
        if id == 0 && right.is_none() {
            id = left
                .as_ref()
                .and_then(|form| form.successes().map(|s| s.content.id).find(|&id| id > 0))
                .unwrap_or(0);
        }
        let base = if rule.base == MorphBase::Unknown { draft.content.base } else { rule.base };
        let collapse_rating =
            if rule.is_collapsed { draft.collapse_rating * self.options.collapse_penalty } else { draft.collapse_rating };

        Ok(Arc::new(Solution {
            sid: self.fresh_sid(),
            content: SolutionContent { id, parameters, base, is_virtual: draft.content.is_virtual, error: SolutionError::Success },
            left,
            right,
            rules: Some(applied_rules(draft, Some(rule))),
            sandhi: Some(sandhi.clone()),
            original: None,
            rating: Solution::UNRATED,
            collapse_rating,
        }))
    }

    fn resolve_side(
        &self,
        text: Option<String>,
        prepared: Option<&Arc<WordForm>>,
        parameters: Parameters,
        label: &str,
        level: Level,
    ) -> Result<Side> {
        let Some(text) = text else {
            return Ok(Side::Absent);
        };
        if text.is_empty() {
            return Ok(Side::EmptyText);
        }
        if let Some(form) = prepared.filter(|form| form.entry == text) {
            return Ok(Side::Resolved(form.clone()));
        }

        let request = SearchRequest::new(text).with_parameters(parameters).with_label(label);
        let form = self.search_at(&request, level)?;
        if form.has_success() { Ok(Side::Resolved(Arc::new(form))) } else { Ok(Side::NotFound) }
    }

    /// A failed application. Failures carry no sub-forms and never an id.
    fn failure(
        &self,
        draft: &Solution,
        rule: Option<&Arc<MorphRule>>,
        sandhi: Option<&SandhiMatch>,
        parameters: Parameters,
        error: SolutionError,
    ) -> Arc<Solution> {
        let rules = applied_rules(draft, rule);
        Arc::new(Solution {
            sid: self.fresh_sid(),
            content: SolutionContent { id: 0, parameters, base: draft.content.base, is_virtual: draft.content.is_virtual, error },
            left: None,
            right: None,
            rules: (!rules.is_empty()).then_some(rules),
            sandhi: sandhi.cloned(),
            original: None,
            rating: Solution::UNRATED,
            collapse_rating: draft.collapse_rating,
        })
    }

    /// Wrap a stored entry (and, recursively, its parts) as a solution.
    fn entry_solution(&self, entry: &MorphEntry) -> Arc<Solution> {
        Arc::new(Solution {
            sid: self.fresh_sid(),
            content: SolutionContent {
                id: entry.id,
                parameters: entry.parameters,
                base: entry.base,
                is_virtual: entry.is_virtual,
                error: SolutionError::Success,
            },
            left: entry.left.as_deref().map(|e| self.entry_form(e)),
            right: entry.right.as_deref().map(|e| self.entry_form(e)),
            rules: None,
            sandhi: None,
            original: None,
            rating: Solution::UNRATED,
            collapse_rating: 1.0,
        })
    }

    fn entry_form(&self, entry: &MorphEntry) -> Arc<WordForm> {
        Arc::new(WordForm::new(entry.entry.clone(), vec![self.entry_solution(entry)]))
    }

    fn fresh_sid(&self) -> SolutionId {
        SolutionId(self.next_sid.fetch_add(1, Ordering::Relaxed))
    }
}

fn applied_rules(draft: &Solution, rule: Option<&Arc<MorphRule>>) -> Vec<Arc<MorphRule>> {
    draft.rules.iter().flatten().chain(rule).cloned().collect()
}

fn side_parameters(kind: RuleType, current: &Parameters, side: &Parameters) -> Parameters {
    match kind {
        RuleType::New => *side,
        RuleType::Copy => current.overridden_by(side),
    }
}

/// The left/right texts a rule proposes for one sandhi match, or `None` when
/// the rule's pattern does not match the restored expression.
fn propose(entry: &str, rule: &MorphRule, sandhi: &SandhiMatch) -> Option<(Option<String>, Option<String>)> {
    let expression = sandhi.expression.as_str();
    let Some(pattern) = &rule.entry else {
        return Some((Some(format!("{expression}{}", rule.left.as_deref().unwrap_or(""))), None));
    };

    let restored = pattern.captures(expression)?;
    let raw = pattern.captures(entry);
    let expand = |template: &Option<String>, side: SandhiGroup| {
        template.as_deref().map(|template| {
            let captures: &Captures<'_> =
                if rule.sandhi_group.contains(side) { &restored } else { raw.as_ref().unwrap_or(&restored) };
            let mut out = String::new();
            captures.expand(template, &mut out);
            out
        })
    };
    Some((expand(&rule.left, SandhiGroup::LEFT), expand(&rule.right, SandhiGroup::RIGHT)))
}
