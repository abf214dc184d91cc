//! TOML catalog files.
//!
//! ```toml
//! [[entry]]
//! id = 1
//! entry = "deva"
//! parameters = [1, 1, 1, 1, 1, 1, 1, 1]
//!
//! [[rule]]
//! id = 2
//! entry = '^(.+)\+(.+)$'
//! left = "$1"
//! right = "$2"
//! sandhi_group = "LEFT | RIGHT"
//! base = "both"
//! rating = 0.8
//!
//! [[sandhi]]
//! surface = "e"
//! underlying = "a+i"
//! group = "LEFT | RIGHT"
//!
//! [[combination]]
//! parameters = [1, 1, 1, 1, 1, 1, 1, 1]
//!
//! [[frequency]]
//! entry = "deva"
//! layer = 0
//! rating = 0.5
//! ```
//!
//! Compound entries name their parts by id (`left = 1`, `right = 2`); parts
//! may be declared in any order. Rule templates are checked against the
//! capture groups of their pattern when the file is loaded.

use super::memory::MemoryCatalog;
use super::sandhi::SandhiPattern;
use super::Layer;
use crate::{CatalogError, EntryId, MorphBase, MorphEntry, MorphRule, Parameters, RuleId, RuleType, SandhiGroup};
use regex::Regex;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CatalogFile {
    #[serde(default, rename = "entry")]
    entries: Vec<EntryRecord>,
    #[serde(default, rename = "rule")]
    rules: Vec<RuleRecord>,
    #[serde(default)]
    sandhi: Vec<SandhiPattern>,
    #[serde(default, rename = "combination")]
    combinations: Vec<CombinationRecord>,
    #[serde(default, rename = "frequency")]
    frequencies: Vec<FrequencyRecord>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct EntryRecord {
    id: EntryId,
    entry: String,
    #[serde(default)]
    parameters: Parameters,
    #[serde(default = "base_none")]
    base: MorphBase,
    #[serde(default, rename = "virtual")]
    is_virtual: Option<bool>,
    #[serde(default)]
    left: Option<EntryId>,
    #[serde(default)]
    right: Option<EntryId>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RuleRecord {
    id: RuleId,
    #[serde(default)]
    label: String,
    #[serde(default)]
    entry: Option<String>,
    #[serde(default)]
    left: Option<String>,
    #[serde(default)]
    right: Option<String>,
    #[serde(default)]
    left_type: RuleType,
    #[serde(default)]
    right_type: RuleType,
    #[serde(default)]
    left_parameters: Parameters,
    #[serde(default)]
    right_parameters: Parameters,
    #[serde(default)]
    parameters: Parameters,
    #[serde(default = "group_left")]
    sandhi_group: SandhiGroup,
    #[serde(default)]
    need_to_check: bool,
    #[serde(default)]
    collapsed: bool,
    #[serde(default = "base_unknown")]
    base: MorphBase,
    #[serde(default = "rating_one")]
    rating: f64,
    #[serde(default)]
    left_label: String,
    #[serde(default)]
    right_label: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CombinationRecord {
    parameters: Parameters,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FrequencyRecord {
    entry: String,
    #[serde(default)]
    layer: Layer,
    rating: f64,
}

fn base_none() -> MorphBase {
    MorphBase::None
}

fn base_unknown() -> MorphBase {
    MorphBase::Unknown
}

fn group_left() -> SandhiGroup {
    SandhiGroup::LEFT
}

fn rating_one() -> f64 {
    1.0
}

impl MemoryCatalog {
    /// Build a catalog from the TOML catalog format.
    pub fn from_toml_str(source: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile = toml::from_str(source)?;
        let mut catalog = MemoryCatalog::new();

        let records: HashMap<EntryId, &EntryRecord> = file.entries.iter().map(|r| (r.id, r)).collect();
        let mut resolved: HashMap<EntryId, Arc<MorphEntry>> = HashMap::new();
        for record in &file.entries {
            let entry = resolve_entry(record, &records, &mut resolved, &mut HashSet::new())?;
            catalog.add_entry(MorphEntry::clone(&entry))?;
        }

        for record in file.rules {
            catalog.add_rule(build_rule(record)?);
        }
        for pattern in file.sandhi {
            if pattern.group.is_empty() {
                return Err(CatalogError::EmptySandhiGroup { surface: pattern.surface, underlying: pattern.underlying });
            }
            catalog.add_sandhi(pattern);
        }
        for combination in file.combinations {
            catalog.add_combination(combination.parameters);
        }
        for frequency in file.frequencies {
            catalog.set_frequency(frequency.layer, frequency.entry, frequency.rating)?;
        }

        tracing::debug!(entries = catalog.entry_count(), rules = catalog.rule_count(), "catalog loaded");
        Ok(catalog)
    }
}

/// Resolve an entry record and, recursively, its compound parts.
fn resolve_entry(
    record: &EntryRecord,
    records: &HashMap<EntryId, &EntryRecord>,
    resolved: &mut HashMap<EntryId, Arc<MorphEntry>>,
    visiting: &mut HashSet<EntryId>,
) -> Result<Arc<MorphEntry>, CatalogError> {
    if let Some(done) = resolved.get(&record.id) {
        return Ok(done.clone());
    }
    if !visiting.insert(record.id) {
        return Err(CatalogError::CyclicEntry { id: record.id });
    }

    let mut part = |side: &'static str, id: Option<EntryId>| -> Result<Option<Arc<MorphEntry>>, CatalogError> {
        let Some(id) = id else {
            return Ok(None);
        };
        let child = records.get(&id).ok_or(CatalogError::UnknownPart { id: record.id, side, part: id })?;
        resolve_entry(child, records, resolved, visiting).map(Some)
    };
    let left = part("left", record.left)?;
    let right = part("right", record.right)?;

    let entry = MorphEntry {
        id: record.id,
        entry: record.entry.clone(),
        parameters: record.parameters,
        base: record.base,
        is_virtual: record.is_virtual,
        left,
        right,
    };
    entry.validate()?;

    let entry = Arc::new(entry);
    visiting.remove(&record.id);
    if record.id != 0 {
        resolved.insert(record.id, entry.clone());
    }
    Ok(entry)
}

fn build_rule(record: RuleRecord) -> Result<MorphRule, CatalogError> {
    let pattern = match &record.entry {
        Some(source) => Some(Regex::new(source).map_err(|source| CatalogError::InvalidPattern { id: record.id, source })?),
        None => None,
    };
    for template in [&record.left, &record.right].into_iter().flatten() {
        check_template(record.id, template, pattern.as_ref())?;
    }

    Ok(MorphRule {
        id: record.id,
        label: record.label,
        entry: pattern,
        left: record.left,
        right: record.right,
        left_type: record.left_type,
        right_type: record.right_type,
        left_parameters: record.left_parameters,
        right_parameters: record.right_parameters,
        parameters: record.parameters,
        sandhi_group: record.sandhi_group,
        need_to_check: record.need_to_check,
        is_collapsed: record.collapsed,
        base: record.base,
        rating: record.rating,
        left_label: record.left_label,
        right_label: record.right_label,
    })
}

/// Every `$n` / `${name}` reference in `template` must name a capture group
/// of `pattern`. Regex-less rules append their template literally, so they
/// may not reference groups at all.
fn check_template(id: RuleId, template: &str, pattern: Option<&Regex>) -> Result<(), CatalogError> {
    let reference = regex!(r"\$(?:\{(\w+)\}|(\d+))");

    for caps in reference.captures_iter(template) {
        let Some(group) = caps.get(1).or_else(|| caps.get(2)).map(|m| m.as_str()) else {
            continue;
        };
        let defined = match (pattern, group.parse::<usize>()) {
            (Some(re), Ok(index)) => index < re.captures_len(),
            (Some(re), Err(_)) => re.capture_names().flatten().any(|name| name == group),
            (None, _) => false,
        };
        if !defined {
            return Err(CatalogError::MissingCapture { id, template: template.to_string(), group: group.to_string() });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Dictionary, FrequencySource, RuleSource};

    const CATALOG: &str = r#"
        [[entry]]
        id = 3
        entry = "devendra"
        parameters = [1, 1, 1, 1, 1, 1, 1, 1]
        base = "both"
        left = 1
        right = 2

        [[entry]]
        id = 1
        entry = "deva"
        parameters = [1, 1, 1, 1, 1, 1, 1, 1]

        [[entry]]
        id = 2
        entry = "indra"
        parameters = [1, 1, 1, 1, 1, 1, 1, 1]

        [[rule]]
        id = 2
        entry = '^(.+)\+(.+)$'
        left = "$1"
        right = "$2"
        sandhi_group = "LEFT | RIGHT"
        base = "both"
        rating = 0.8

        [[sandhi]]
        surface = "e"
        underlying = "a+i"
        group = "LEFT | RIGHT"

        [[frequency]]
        entry = "deva"
        layer = 1
        rating = 0.5
    "#;

    #[test]
    fn loads_entries_rules_and_frequencies() {
        let catalog = MemoryCatalog::from_toml_str(CATALOG).unwrap();

        let compound = catalog.get(3).unwrap();
        assert_eq!(compound.left.as_ref().map(|e| e.id), Some(1));
        assert_eq!(compound.right.as_ref().map(|e| e.entry.as_str()), Some("indra"));

        let rules = catalog.rules("", &Parameters::any());
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].sandhi_group, SandhiGroup::BOTH);
        assert_eq!(rules[0].base, MorphBase::Both);
        assert_eq!(catalog.sandhi_matches("devendra", &rules[0])[1].expression, "deva+indra");
        assert_eq!(catalog.rating(Layer(1), "deva"), 0.5);
    }

    #[test]
    fn unknown_parts_and_cycles_are_rejected() {
        let missing = r#"
            [[entry]]
            id = 1
            entry = "devendra"
            base = "both"
            left = 9
        "#;
        assert!(matches!(
            MemoryCatalog::from_toml_str(missing),
            Err(CatalogError::UnknownPart { id: 1, side: "left", part: 9 })
        ));

        let cyclic = r#"
            [[entry]]
            id = 1
            entry = "a"
            base = "left"
            left = 2

            [[entry]]
            id = 2
            entry = "b"
            base = "left"
            left = 1
        "#;
        assert!(matches!(MemoryCatalog::from_toml_str(cyclic), Err(CatalogError::CyclicEntry { .. })));
    }

    #[test]
    fn templates_must_reference_defined_groups() {
        let rule = r#"
            [[rule]]
            id = 4
            entry = '^(.+)$'
            left = "$2"
        "#;
        assert!(matches!(
            MemoryCatalog::from_toml_str(rule),
            Err(CatalogError::MissingCapture { id: 4, ref group, .. }) if group == "2"
        ));

        let named = r#"
            [[rule]]
            id = 5
            entry = '^(?P<stem>.+)a$'
            left = "${stem}a"
        "#;
        assert!(MemoryCatalog::from_toml_str(named).is_ok());

        let literal = r#"
            [[rule]]
            id = 6
            left = "$1"
        "#;
        assert!(matches!(MemoryCatalog::from_toml_str(literal), Err(CatalogError::MissingCapture { id: 6, .. })));
    }

    #[test]
    fn sandhi_patterns_need_a_group() {
        let ungrouped = r#"
            [[sandhi]]
            surface = "o"
            underlying = "a"
            group = ""
        "#;
        assert!(matches!(
            MemoryCatalog::from_toml_str(ungrouped),
            Err(CatalogError::EmptySandhiGroup { ref surface, .. }) if surface == "o"
        ));
    }

    #[test]
    fn malformed_input_is_a_parse_error() {
        assert!(matches!(MemoryCatalog::from_toml_str("[[entry]]\nid = 1\nentry = \"x\"\nparameters = [1, 2]"), Err(CatalogError::Parse(_))));
        assert!(matches!(
            MemoryCatalog::from_toml_str("[[rule]]\nid = 1\nentry = '('"),
            Err(CatalogError::InvalidPattern { id: 1, .. })
        ));
    }
}
