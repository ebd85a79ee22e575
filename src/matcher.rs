//! Scoring profiles against a parsed file. A match run is a pure function
//! of the profile and the file data; nothing is cached on the profile.

use regex::Regex;
use serde::Serialize;
use tracing::{debug, instrument, trace, warn};

use crate::{
    model::FileData,
    profile::{Identifier, IdentifierTarget, Profile},
};

/// What one identifier captured.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchResult {
    pub value: String,
    pub table_index: Option<usize>,
    /// 1-based header line, given or derived.
    pub line_number: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct MatchRecord<'p> {
    pub identifier: &'p Identifier,
    pub result: MatchResult,
}

/// A profile that accepted a file, with its successful matches in
/// declaration order.
#[derive(Debug, Clone)]
pub struct ProfileMatch<'p> {
    pub profile: &'p Profile,
    pub matches: Vec<MatchRecord<'p>>,
}

impl ProfileMatch<'_> {
    pub fn score(&self) -> usize {
        self.matches.len()
    }
}

/// Compare `candidate` with the identifier's value. Regex identifiers
/// yield their first capture group (or the whole match), trimmed.
pub fn match_value(identifier: &Identifier, candidate: &str) -> Option<String> {
    if !identifier.is_regex {
        return (candidate == identifier.value).then(|| candidate.to_string());
    }

    let re = match Regex::new(&identifier.value) {
        Ok(re) => re,
        Err(e) => {
            warn!(pattern = %identifier.value, "invalid identifier pattern: {}", e);
            return None;
        }
    };
    let caps = re.captures(candidate)?;
    let found = caps.get(1).or_else(|| caps.get(0))?;
    trace!(pattern = %identifier.value, value = found.as_str(), "pattern matched");
    Some(found.as_str().trim().to_string())
}

/// Resolve the identifier's candidate text in `data` and compare it.
pub fn match_identifier(identifier: &Identifier, data: &FileData) -> Option<MatchResult> {
    match &identifier.target {
        IdentifierTarget::FileMetadata { key } => {
            let candidate = data.metadata.get(key).filter(|v| !v.is_empty())?;
            Some(MatchResult {
                value: match_value(identifier, candidate)?,
                table_index: None,
                line_number: None,
            })
        }
        IdentifierTarget::TableMetadata { table_index, key } => {
            let candidate = data.table(*table_index)?.metadata.get(key)?;
            Some(MatchResult {
                value: match_value(identifier, candidate)?,
                table_index: Some(*table_index),
                line_number: None,
            })
        }
        IdentifierTarget::TableHeader {
            table_index,
            line_number,
        } => {
            let table = data.table(*table_index)?;
            let candidate = match line_number {
                Some(line) => table.header.get(line.checked_sub(1)?)?.clone(),
                None => table.header_text(),
            };
            let value = match_value(identifier, &candidate)?;
            let line_number = line_number.or_else(|| {
                table
                    .header
                    .iter()
                    .position(|line| line.contains(value.as_str()))
                    .map(|idx| idx + 1)
            });
            Some(MatchResult {
                value,
                table_index: Some(*table_index),
                line_number,
            })
        }
    }
}

/// Evaluate every identifier in order. A failing required identifier
/// rejects the profile; failing optional ones are just not recorded.
#[instrument(level = "debug", skip(profile, data), fields(profile_id = %profile.id()))]
pub fn match_profile<'p>(profile: &'p Profile, data: &FileData) -> Option<ProfileMatch<'p>> {
    let mut matches = Vec::new();
    for (idx, identifier) in profile.identifiers.iter().enumerate() {
        match match_identifier(identifier, data) {
            Some(result) => matches.push(MatchRecord { identifier, result }),
            None if identifier.optional => {
                trace!(identifier = idx, "optional identifier did not match");
            }
            None => {
                debug!(identifier = idx, "required identifier did not match");
                return None;
            }
        }
    }
    Some(ProfileMatch { profile, matches })
}

/// The candidate with the highest score, first seen on ties. A winner
/// needs at least one successful match.
#[instrument(level = "debug", skip_all, fields(candidates = profiles.len()))]
pub fn select_best<'p>(profiles: &'p [Profile], data: &FileData) -> Option<ProfileMatch<'p>> {
    let mut best: Option<ProfileMatch<'p>> = None;
    for profile in profiles {
        let Some(candidate) = match_profile(profile, data) else {
            continue;
        };
        let best_score = best.as_ref().map_or(0, |b| b.score());
        debug!(profile_id = %profile.id(), score = candidate.score(), best_score, "scored profile");
        if candidate.score() > best_score {
            best = Some(candidate);
        }
    }
    best
}
