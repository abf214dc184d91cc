//! Rating and ordering.
//!
//! Ratings are computed bottom-up: a solution's rating depends on the best
//! rating of each of its sub-forms, so sub-forms are rated (and sorted)
//! first.
//!
//! ```text
//! rating = leftRating · rightRating · ruleRating · collapseRating · ruleRatio
//!        + freqRatio · leftFreq · rightFreq
//!        + dictBonus
//! ```
//!
//! - `leftRating`: best rating in the left sub-form, capped at 1 (1 without a
//!   left side); `rightRating` likewise
//! - `leftFreq`: frequency of the left sub-form's text in the request's layer
//!   (1 without a left side); `rightFreq` likewise
//! - `ruleRating`: highest intrinsic rating among the applied rules
//! - `dictBonus`: 1 when the solution resolved to a dictionary id
//!
//! Failed solutions rate 0 and exact dictionary solutions (no rules, nothing
//! collapsed) rate 2, which keeps them ahead of any derivation.

use super::CancellationToken;
use crate::error::Result;
use crate::{FrequencySource, Layer, Solution, WordForm};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

/// Exact dictionary hits.
const DICTIONARY_RATING: f64 = 2.0;

/// Weights of the two rating terms.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RatingRatios {
    pub freq: f64,
    pub rule: f64,
}

impl RatingRatios {
    /// `rule = 1 - freq`.
    pub fn from_freq(freq: f64) -> Self {
        RatingRatios { freq, rule: 1.0 - freq }
    }
}

pub struct Rater<'a> {
    frequencies: &'a dyn FrequencySource,
    ratios: RatingRatios,
    layer: Layer,
    debug_order: bool,
}

impl<'a> Rater<'a> {
    pub fn new(frequencies: &'a dyn FrequencySource, ratios: RatingRatios, layer: Layer) -> Self {
        Rater { frequencies, ratios, layer, debug_order: false }
    }

    /// Lead with dictionary-sourced derivations in rule-id order, for
    /// inspecting rule sets.
    pub fn with_debug_order(mut self, debug_order: bool) -> Self {
        self.debug_order = debug_order;
        self
    }

    /// Rate and sort every form of the tree. Forms shared within the input
    /// are rated once and stay shared in the output.
    pub fn run(&self, form: &Arc<WordForm>, cancel: &CancellationToken) -> Result<Arc<WordForm>> {
        let mut rated = HashMap::new();
        self.rate_form(form, &mut rated, cancel)
    }

    fn rate_form(
        &self,
        form: &Arc<WordForm>,
        rated: &mut HashMap<*const WordForm, Arc<WordForm>>,
        cancel: &CancellationToken,
    ) -> Result<Arc<WordForm>> {
        if let Some(done) = rated.get(&Arc::as_ptr(form)) {
            return Ok(done.clone());
        }
        cancel.check()?;

        let mut solutions = Vec::with_capacity(form.solutions.len());
        for solution in &form.solutions {
            solutions.push(self.rate_solution(solution, rated, cancel)?);
        }
        self.order(&mut solutions);

        let unchanged = solutions.iter().zip(&form.solutions).all(|(a, b)| Arc::ptr_eq(a, b));
        let result = if unchanged { form.clone() } else { Arc::new(WordForm::new(form.entry.clone(), solutions)) };
        rated.insert(Arc::as_ptr(form), result.clone());
        Ok(result)
    }

    fn rate_solution(
        &self,
        solution: &Arc<Solution>,
        rated: &mut HashMap<*const WordForm, Arc<WordForm>>,
        cancel: &CancellationToken,
    ) -> Result<Arc<Solution>> {
        if solution.is_rated() {
            return Ok(solution.clone());
        }

        let mut result = Solution::clone(solution);
        if let Some(left) = &solution.left {
            result.left = Some(self.rate_form(left, rated, cancel)?);
        }
        if let Some(right) = &solution.right {
            result.right = Some(self.rate_form(right, rated, cancel)?);
        }
        result.rating = self.score(&result);
        Ok(Arc::new(result))
    }

    /// Rating of a solution whose sub-forms are already rated.
    fn score(&self, solution: &Solution) -> f64 {
        if !solution.is_success() {
            return 0.0;
        }
        if !solution.has_rules() && solution.collapse_rating == 1.0 {
            return DICTIONARY_RATING;
        }

        let (left_rating, left_freq) = self.side(solution.left.as_deref());
        let (right_rating, right_freq) = self.side(solution.right.as_deref());
        let rule_rating = solution.rules.iter().flatten().map(|rule| rule.rating).reduce(f64::max).unwrap_or(1.0);
        let dict_bonus = if solution.content.id > 0 { 1.0 } else { 0.0 };

        left_rating * right_rating * rule_rating * solution.collapse_rating * self.ratios.rule
            + self.ratios.freq * left_freq * right_freq
            + dict_bonus
    }

    /// `(capped best rating, frequency)` of one side.
    fn side(&self, form: Option<&WordForm>) -> (f64, f64) {
        match form {
            Some(form) => {
                let best = form.solutions.iter().map(|s| s.rating).fold(0.0, f64::max);
                (best.min(1.0), self.frequencies.rating(self.layer, &form.entry))
            }
            None => (1.0, 1.0),
        }
    }

    fn order(&self, solutions: &mut [Arc<Solution>]) {
        if solutions.len() < 2 {
            return;
        }
        if self.debug_order {
            // dictionary-sourced derivations lead, in rule order
            let led = |s: &Arc<Solution>| s.first_rule().filter(|_| s.content.id > 0).map(|rule| rule.id);
            solutions.sort_by(|a, b| match (led(a), led(b)) {
                (Some(x), Some(y)) => x.cmp(&y),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => b.rating.total_cmp(&a.rating),
            });
        } else {
            solutions.sort_by(|a, b| b.rating.total_cmp(&a.rating));
        }
    }
}
