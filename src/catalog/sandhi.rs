//! Sandhi scanning.
//!
//! A sandhi pattern maps a surface junction (what is written) back to its
//! underlying form (what the parts looked like before they merged). Scanning
//! an entry produces one [`SandhiMatch`] per place a pattern applies, with the
//! junction restored in `expression`:
//!
//! ```text
//! entry "devendro", pattern e → a+i (internal)
//!   position 1 -> "da+ivendro"
//!   position 3 -> "deva+indro"
//! entry "devendro", pattern o → a (final)
//!   position 7 -> "devendra"
//! ```
//!
//! Where a pattern may apply is given by its group:
//!
//! - `LEFT`: word-final junction (at the end of the entry)
//! - `RIGHT`: word-initial junction (at the start of the entry)
//! - `BOTH`: compound-internal junction (strictly inside the entry)
//!
//! A pattern with an empty surface is the identity: it yields the entry as-is.
//!
//! A rule only sees the patterns whose group is contained in its own
//! `sandhi_group`, so a `BOTH` rule sees every pattern and a `LEFT` rule only
//! final ones.

use crate::{SandhiGroup, SandhiMatch};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SandhiPattern {
    pub surface: String,
    pub underlying: String,
    pub group: SandhiGroup,
}

impl SandhiPattern {
    pub fn new(surface: impl Into<String>, underlying: impl Into<String>, group: SandhiGroup) -> Self {
        SandhiPattern { surface: surface.into(), underlying: underlying.into(), group }
    }

    /// Whether a junction at `position..end` of an entry of length `len` sits
    /// where this pattern's group allows.
    fn placed(&self, position: usize, end: usize, len: usize) -> bool {
        if self.group == SandhiGroup::LEFT {
            end == len
        } else if self.group == SandhiGroup::RIGHT {
            position == 0
        } else {
            position > 0 && end < len
        }
    }
}

/// Scan `entry` for every pattern visible to a rule of sandhi group `group`.
///
/// Matches are returned in pattern order, then position order, without
/// duplicate expressions.
pub(crate) fn scan(entry: &str, group: SandhiGroup, patterns: &[SandhiPattern]) -> Vec<SandhiMatch> {
    let mut matches: Vec<SandhiMatch> = Vec::new();

    for pattern in patterns.iter().filter(|p| group.contains(p.group)) {
        if pattern.surface.is_empty() {
            push_unique(&mut matches, SandhiMatch::identity(entry));
            continue;
        }

        for (position, surface) in entry.match_indices(pattern.surface.as_str()) {
            let end = position + surface.len();
            if !pattern.placed(position, end, entry.len()) {
                continue;
            }
            let expression = format!("{}{}{}", &entry[..position], pattern.underlying, &entry[end..]);
            push_unique(
                &mut matches,
                SandhiMatch {
                    expression,
                    surface: pattern.surface.clone(),
                    underlying: pattern.underlying.clone(),
                    position,
                },
            );
        }
    }

    matches
}

fn push_unique(matches: &mut Vec<SandhiMatch>, candidate: SandhiMatch) {
    if !matches.iter().any(|m| m.expression == candidate.expression) {
        matches.push(candidate);
    }
}
