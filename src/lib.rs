extern crate self as morphosearch;

use regex::Regex;
use serde::{Deserialize, Serialize, Serializer};
use std::sync::Arc;

#[macro_use]
mod macros;
mod api;
mod catalog;
mod engine;
mod error;

pub use api::{
    Analysis, AnalysisHandle, AnalysisVerbose, Analyzer, Context, LayerSelection, Options, SearchRequest, analyze,
    analyze_with,
};
pub use catalog::{
    CombinationValidator, Dictionary, EntryQuery, FrequencySource, Layer, MemoryCatalog, RuleSource, SandhiPattern,
};
pub use engine::{
    CancellationToken, DerivativeFilter, PassMetrics, Pruner, Rater, RatingRatios, RunMetrics, SearchMetrics,
    SolutionSearch, TreePass,
};
pub use error::{AnalysisError, CatalogError};

// --- Identifiers -------------------------------------------------------------

/// Dictionary identifier of a [`MorphEntry`]. `0` means "not persisted".
pub type EntryId = u32;

/// Identifier of a [`MorphRule`] inside its rule source.
pub type RuleId = u32;

/// Request-unique identifier of a [`Solution`].
///
/// Derived solutions point back at the solution they were derived from with
/// this id instead of holding a reference to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SolutionId(pub u64);

/// Label that restricts a search to dictionary lookups only.
pub const DICTIONARY_LABEL: &str = "dict";

// --- Parameter vectors -------------------------------------------------------

/// Number of morphological categories carried by a [`Parameters`] vector.
pub const PARAMETER_COUNT: usize = 8;

/// Fixed-width vector of morphological category codes.
///
/// Each slot holds a small code for one category; `0` means the category is
/// unset (matches anything).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Parameters([u8; PARAMETER_COUNT]);

impl Parameters {
    pub const PART_OF_SPEECH: usize = 0;
    pub const GENDER: usize = 1;
    pub const CASE: usize = 2;
    pub const NUMBER: usize = 3;
    pub const PERSON: usize = 4;
    pub const TENSE: usize = 5;
    pub const MOOD: usize = 6;
    pub const VOICE: usize = 7;

    pub const fn new(slots: [u8; PARAMETER_COUNT]) -> Self {
        Parameters(slots)
    }

    /// A vector with every slot unset.
    pub const fn any() -> Self {
        Parameters([0; PARAMETER_COUNT])
    }

    pub fn get(&self, slot: usize) -> u8 {
        self.0.get(slot).copied().unwrap_or(0)
    }

    /// Return a copy with `slot` set to `value`. Out-of-range slots are ignored.
    pub fn with(mut self, slot: usize, value: u8) -> Self {
        if let Some(s) = self.0.get_mut(slot) {
            *s = value;
        }
        self
    }

    pub fn slots(&self) -> &[u8; PARAMETER_COUNT] {
        &self.0
    }

    /// True when no slot is unset.
    pub fn is_complete(&self) -> bool {
        self.0.iter().all(|&v| v != 0)
    }

    /// True when every slot is unset.
    pub fn is_any(&self) -> bool {
        self.0.iter().all(|&v| v == 0)
    }

    /// Two vectors are compatible when each slot pair is equal or at least
    /// one side leaves the slot unset.
    pub fn is_compatible(&self, other: &Parameters) -> bool {
        self.0.iter().zip(other.0.iter()).all(|(&a, &b)| a == 0 || b == 0 || a == b)
    }

    /// Overlay the nonzero slots of `overrides` onto `self`.
    ///
    /// ```text
    /// self      [1, 2, 0, 0, ...]
    /// overrides [0, 5, 3, 0, ...]
    /// result    [1, 5, 3, 0, ...]
    /// ```
    pub fn overridden_by(&self, overrides: &Parameters) -> Parameters {
        let mut merged = self.0;
        for (slot, &value) in merged.iter_mut().zip(overrides.0.iter()) {
            if value != 0 {
                *slot = value;
            }
        }
        Parameters(merged)
    }
}

impl From<[u8; PARAMETER_COUNT]> for Parameters {
    fn from(slots: [u8; PARAMETER_COUNT]) -> Self {
        Parameters(slots)
    }
}

// --- Dictionary entries ------------------------------------------------------

/// Compounding mode of a word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MorphBase {
    /// Not a compound.
    None,
    /// Left-headed compound.
    Left,
    /// Right-headed compound.
    Right,
    /// Both parts are heads.
    Both,
    /// Not yet known (used while searching).
    Unknown,
}

impl MorphBase {
    /// `Unknown` on either side accepts anything.
    pub fn accepts(self, other: MorphBase) -> bool {
        self == MorphBase::Unknown || other == MorphBase::Unknown || self == other
    }
}

/// A dictionary-resident word.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MorphEntry {
    pub id: EntryId,
    pub entry: String,
    pub parameters: Parameters,
    pub base: MorphBase,
    pub is_virtual: Option<bool>,
    pub left: Option<Arc<MorphEntry>>,
    pub right: Option<Arc<MorphEntry>>,
}

impl MorphEntry {
    /// A simple (non-compound) entry.
    pub fn new(id: EntryId, entry: impl Into<String>, parameters: Parameters) -> Self {
        MorphEntry {
            id,
            entry: entry.into(),
            parameters,
            base: MorphBase::None,
            is_virtual: Some(false),
            left: None,
            right: None,
        }
    }

    /// A compound entry with its parts.
    pub fn compound(
        id: EntryId,
        entry: impl Into<String>,
        parameters: Parameters,
        base: MorphBase,
        left: Option<Arc<MorphEntry>>,
        right: Option<Arc<MorphEntry>>,
    ) -> Self {
        MorphEntry { id, entry: entry.into(), parameters, base, is_virtual: Some(false), left, right }
    }

    pub fn with_base(mut self, base: MorphBase) -> Self {
        self.base = base;
        self
    }

    pub fn with_virtual(mut self, is_virtual: Option<bool>) -> Self {
        self.is_virtual = is_virtual;
        self
    }

    /// Check the compound invariant: a non-compound entry has no parts.
    pub fn validate(&self) -> Result<(), CatalogError> {
        if self.base == MorphBase::None && (self.left.is_some() || self.right.is_some()) {
            return Err(CatalogError::InvalidEntry {
                id: self.id,
                entry: self.entry.clone(),
                reason: "entry with base 'none' cannot have compound parts".to_string(),
            });
        }
        if self.entry.is_empty() {
            return Err(CatalogError::InvalidEntry {
                id: self.id,
                entry: String::new(),
                reason: "entry text is empty".to_string(),
            });
        }
        Ok(())
    }
}

// --- Rules -------------------------------------------------------------------

/// How a rule builds the parameter vector of a compound side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleType {
    /// Replace the vector wholesale with the side vector.
    New,
    /// Start from the parent vector and override the side vector's nonzero slots.
    #[default]
    Copy,
}

bitflags::bitflags! {
    /// Which side(s) of a split absorb the phonetic junction.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct SandhiGroup: u8 {
        const LEFT  = 1 << 0;
        const RIGHT = 1 << 1;
        const BOTH  = Self::LEFT.bits() | Self::RIGHT.bits();
    }
}

/// A transformation template that derives a surface form from one or two
/// underlying parts.
///
/// Regex-less rules append `left` to the sandhi expression and have no right
/// side. Rules with an `entry` regex expand `left`/`right` as replacement
/// templates (`$1`, `${name}`) over the regex captures.
#[derive(Debug, Clone, Serialize)]
pub struct MorphRule {
    pub id: RuleId,
    /// Group this rule belongs to; searches ask for rules by label.
    pub label: String,
    #[serde(serialize_with = "serialize_pattern")]
    pub entry: Option<Regex>,
    pub left: Option<String>,
    pub right: Option<String>,
    pub left_type: RuleType,
    pub right_type: RuleType,
    pub left_parameters: Parameters,
    pub right_parameters: Parameters,
    /// Merged into the current solution's vector.
    pub parameters: Parameters,
    pub sandhi_group: SandhiGroup,
    /// Validate (and complete) the merged vector against legal combinations.
    pub need_to_check: bool,
    /// Synthetic rule that does not count toward search depth.
    pub is_collapsed: bool,
    pub base: MorphBase,
    /// Intrinsic quality weight.
    pub rating: f64,
    /// Label used when searching the left part.
    pub left_label: String,
    /// Label used when searching the right part.
    pub right_label: String,
}

impl MorphRule {
    pub fn new(id: RuleId, label: impl Into<String>) -> Self {
        MorphRule {
            id,
            label: label.into(),
            entry: None,
            left: None,
            right: None,
            left_type: RuleType::Copy,
            right_type: RuleType::Copy,
            left_parameters: Parameters::any(),
            right_parameters: Parameters::any(),
            parameters: Parameters::any(),
            sandhi_group: SandhiGroup::LEFT,
            need_to_check: false,
            is_collapsed: false,
            base: MorphBase::Unknown,
            rating: 1.0,
            left_label: String::new(),
            right_label: String::new(),
        }
    }
}

fn serialize_pattern<S: Serializer>(pattern: &Option<Regex>, serializer: S) -> Result<S::Ok, S::Error> {
    match pattern {
        Some(re) => serializer.serialize_some(re.as_str()),
        None => serializer.serialize_none(),
    }
}

/// One phonetic-junction candidate found in an entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct SandhiMatch {
    /// Entry text with the junction restored to its underlying form. May
    /// contain the compound boundary marker `+`.
    pub expression: String,
    /// Surface junction text matched in the entry.
    pub surface: String,
    /// Underlying form the junction was restored to.
    pub underlying: String,
    /// Byte offset of the junction in the entry.
    pub position: usize,
}

impl SandhiMatch {
    /// The match that leaves the entry untouched.
    pub fn identity(entry: &str) -> Self {
        SandhiMatch { expression: entry.to_string(), surface: String::new(), underlying: String::new(), position: entry.len() }
    }
}

// --- Parse tree --------------------------------------------------------------

/// Outcome tag of a [`Solution`]. Every failure of the search is recorded
/// here rather than returned as an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SolutionError {
    Success,
    NoRuleMatches,
    NoSandhiMatches,
    NoMorphCombinationMatches,
    NotFoundLeftByParameters,
    NotFoundRightByParameters,
    NoLeftMatches,
    NoRightMatches,
    DepthIsExceeded,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SolutionContent {
    pub id: EntryId,
    pub parameters: Parameters,
    pub base: MorphBase,
    pub is_virtual: Option<bool>,
    pub error: SolutionError,
}

/// One candidate parse of a [`WordForm`].
#[derive(Debug, Clone, Serialize)]
pub struct Solution {
    pub sid: SolutionId,
    pub content: SolutionContent,
    pub left: Option<Arc<WordForm>>,
    pub right: Option<Arc<WordForm>>,
    /// Rules applied to reach this solution; `None` for dictionary solutions.
    pub rules: Option<Vec<Arc<MorphRule>>>,
    pub sandhi: Option<SandhiMatch>,
    /// Sibling this solution was derived from.
    pub original: Option<SolutionId>,
    /// `-1` until the rating pass runs.
    pub rating: f64,
    pub collapse_rating: f64,
}

impl Solution {
    pub const UNRATED: f64 = -1.0;

    pub fn is_success(&self) -> bool {
        self.content.error == SolutionError::Success
    }

    pub fn is_rated(&self) -> bool {
        self.rating >= 0.0
    }

    pub fn has_rules(&self) -> bool {
        self.rules.as_ref().is_some_and(|rules| !rules.is_empty())
    }

    pub fn first_rule(&self) -> Option<&MorphRule> {
        self.rules.as_ref().and_then(|rules| rules.first()).map(|rule| rule.as_ref())
    }

    /// Complete means every parameter slot is set and the base is known.
    pub fn is_complete(&self) -> bool {
        self.content.parameters.is_complete() && self.content.base != MorphBase::Unknown
    }
}

/// The analysis of one surface string: a list of alternative solutions.
#[derive(Debug, Clone, Serialize)]
pub struct WordForm {
    pub entry: String,
    pub solutions: Vec<Arc<Solution>>,
}

impl WordForm {
    pub fn new(entry: impl Into<String>, solutions: Vec<Arc<Solution>>) -> Self {
        WordForm { entry: entry.into(), solutions }
    }

    pub fn empty(entry: impl Into<String>) -> Self {
        WordForm { entry: entry.into(), solutions: Vec::new() }
    }

    pub fn is_empty(&self) -> bool {
        self.solutions.is_empty()
    }

    pub fn has_success(&self) -> bool {
        self.solutions.iter().any(|s| s.is_success())
    }

    /// First solution in list order; the best one once the list is rated.
    pub fn best(&self) -> Option<&Arc<Solution>> {
        self.solutions.first()
    }

    pub fn successes(&self) -> impl Iterator<Item = &Arc<Solution>> {
        self.solutions.iter().filter(|s| s.is_success())
    }

    /// Number of solutions in this form and all nested forms.
    pub fn count_solutions(&self) -> usize {
        self.solutions
            .iter()
            .map(|s| {
                1 + s.left.as_ref().map_or(0, |f| f.count_solutions())
                    + s.right.as_ref().map_or(0, |f| f.count_solutions())
            })
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parameters_merge_and_compatibility() {
        let base = Parameters::new([1, 2, 0, 0, 0, 0, 0, 0]);
        let overrides = Parameters::new([0, 5, 3, 0, 0, 0, 0, 0]);

        assert_eq!(base.overridden_by(&overrides), Parameters::new([1, 5, 3, 0, 0, 0, 0, 0]));
        assert!(base.is_compatible(&Parameters::new([1, 0, 7, 0, 0, 0, 0, 0])));
        assert!(!base.is_compatible(&overrides));
        assert!(Parameters::any().is_any());
        assert!(!base.is_complete());
        assert!(Parameters::new([1; PARAMETER_COUNT]).is_complete());
        assert_eq!(base.with(Parameters::CASE, 4).get(Parameters::CASE), 4);
        assert_eq!(base.with(PARAMETER_COUNT, 4), base);
    }

    #[test]
    fn non_compound_entry_with_parts_is_rejected() {
        let part = Arc::new(MorphEntry::new(1, "deva", Parameters::any()));
        let entry = MorphEntry::compound(2, "devadeva", Parameters::any(), MorphBase::None, Some(part), None);

        assert!(matches!(entry.validate(), Err(CatalogError::InvalidEntry { id: 2, .. })));
        assert!(entry.with_base(MorphBase::Left).validate().is_ok());
    }

    #[test]
    fn unknown_base_accepts_everything() {
        assert!(MorphBase::Unknown.accepts(MorphBase::Left));
        assert!(MorphBase::Both.accepts(MorphBase::Unknown));
        assert!(!MorphBase::None.accepts(MorphBase::Left));
    }
}
