//! In-memory implementation of every collaborator contract.
//!
//! Lookups are linear or hash-based over plain collections. The two rule
//! queries the engine repeats most often (`rules` per label/vector and
//! `sandhi_matches` per entry/group) are cached in `DashMap`s so that
//! concurrent searches share them; any mutation of the catalog clears the
//! caches.

use super::sandhi::{self, SandhiPattern};
use super::{CombinationValidator, Dictionary, EntryQuery, FrequencySource, Layer, RuleSource};
use crate::{CatalogError, EntryId, MorphEntry, MorphRule, Parameters, SandhiGroup, SandhiMatch};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct MemoryCatalog {
    by_id: HashMap<EntryId, Arc<MorphEntry>>,
    by_text: HashMap<String, Vec<Arc<MorphEntry>>>,
    rules: Vec<Arc<MorphRule>>,
    sandhi: Vec<SandhiPattern>,
    combinations: Vec<Parameters>,
    frequencies: HashMap<String, Vec<(Layer, f64)>>,
    rule_cache: DashMap<(String, Parameters), Arc<[Arc<MorphRule>]>>,
    sandhi_cache: DashMap<(String, SandhiGroup), Arc<[SandhiMatch]>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a dictionary entry. Entries with id `0` are searchable but cannot
    /// be fetched by id.
    pub fn add_entry(&mut self, entry: MorphEntry) -> Result<Arc<MorphEntry>, CatalogError> {
        entry.validate()?;
        if entry.id != 0 && self.by_id.contains_key(&entry.id) {
            return Err(CatalogError::DuplicateEntry { id: entry.id });
        }

        let entry = Arc::new(entry);
        if entry.id != 0 {
            self.by_id.insert(entry.id, entry.clone());
        }
        self.by_text.entry(entry.entry.clone()).or_default().push(entry.clone());
        self.invalidate();
        Ok(entry)
    }

    pub fn add_rule(&mut self, rule: MorphRule) -> Arc<MorphRule> {
        let rule = Arc::new(rule);
        self.rules.push(rule.clone());
        self.invalidate();
        rule
    }

    pub fn add_sandhi(&mut self, pattern: SandhiPattern) {
        self.sandhi.push(pattern);
        self.invalidate();
    }

    /// Register a legal parameter combination. While none are registered,
    /// every vector is accepted as-is.
    pub fn add_combination(&mut self, parameters: Parameters) {
        self.combinations.push(parameters);
    }

    pub fn set_frequency(&mut self, layer: Layer, entry: impl Into<String>, rating: f64) -> Result<(), CatalogError> {
        let entry = entry.into();
        if !(0.0..=1.0).contains(&rating) {
            return Err(CatalogError::InvalidFrequency { entry, rating });
        }

        let layers = self.frequencies.entry(entry).or_default();
        match layers.iter_mut().find(|(l, _)| *l == layer) {
            Some(slot) => slot.1 = rating,
            None => layers.push((layer, rating)),
        }
        Ok(())
    }

    pub fn entry_count(&self) -> usize {
        self.by_text.values().map(Vec::len).sum()
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    fn invalidate(&mut self) {
        self.rule_cache.clear();
        self.sandhi_cache.clear();
    }
}

impl Dictionary for MemoryCatalog {
    fn find(&self, query: &EntryQuery<'_>) -> Vec<Arc<MorphEntry>> {
        self.by_text
            .get(query.entry)
            .map(|entries| entries.iter().filter(|e| query.accepts(e)).cloned().collect())
            .unwrap_or_default()
    }

    fn get(&self, id: EntryId) -> Option<Arc<MorphEntry>> {
        self.by_id.get(&id).cloned()
    }
}

impl RuleSource for MemoryCatalog {
    fn rules(&self, label: &str, parameters: &Parameters) -> Arc<[Arc<MorphRule>]> {
        let key = (label.to_string(), *parameters);
        if let Some(hit) = self.rule_cache.get(&key) {
            return hit.value().clone();
        }

        let rules: Arc<[Arc<MorphRule>]> = self
            .rules
            .iter()
            .filter(|r| r.label == label && r.parameters.is_compatible(parameters))
            .cloned()
            .collect();
        self.rule_cache.entry(key).or_insert(rules).value().clone()
    }

    fn sandhi_matches(&self, entry: &str, rule: &MorphRule) -> Arc<[SandhiMatch]> {
        let key = (entry.to_string(), rule.sandhi_group);
        if let Some(hit) = self.sandhi_cache.get(&key) {
            return hit.value().clone();
        }

        let matches: Arc<[SandhiMatch]> = sandhi::scan(entry, rule.sandhi_group, &self.sandhi).into();
        self.sandhi_cache.entry(key).or_insert(matches).value().clone()
    }
}

impl CombinationValidator for MemoryCatalog {
    fn complete(&self, parameters: &Parameters) -> Option<Parameters> {
        if self.combinations.is_empty() {
            return Some(*parameters);
        }
        self.combinations.iter().find(|legal| legal.is_compatible(parameters)).map(|legal| parameters.overridden_by(legal))
    }
}

impl FrequencySource for MemoryCatalog {
    /// The layer in which `entry` is most frequent; layer 0 when unknown.
    fn detect_layer(&self, entry: &str) -> Layer {
        self.frequencies
            .get(entry)
            .and_then(|layers| layers.iter().max_by(|a, b| a.1.total_cmp(&b.1).then(b.0.cmp(&a.0))))
            .map(|(layer, _)| *layer)
            .unwrap_or_default()
    }

    fn rating(&self, layer: Layer, entry: &str) -> f64 {
        self.frequencies
            .get(entry)
            .and_then(|layers| layers.iter().find(|(l, _)| *l == layer))
            .map(|(_, rating)| *rating)
            .unwrap_or(0.0)
    }
}
