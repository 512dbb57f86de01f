//! Employee detection against the roster
//!
//! Each roster member is scored by how well their name tokens appear in the
//! filename tokens:
//!
//! | Tier        | Rule                                                        |
//! |-------------|-------------------------------------------------------------|
//! | `Full`      | every significant name token, contiguous and in order       |
//! | `AllTokens` | every significant name token, anywhere                      |
//! | `Partial`   | at least one significant name token of 3+ characters        |
//!
//! Only the best tier is considered. Inside it, a candidate whose matched
//! tokens are a strict subset of another's is dropped ("Ana López" inside
//! "Ana López Ruiz"). Two or more survivors is an ambiguous match: no
//! employee is assigned and the candidates are reported for manual
//! selection.

use std::collections::BTreeSet;

use wfm_common::api::Employee;

use super::normalize::tokenize;

/// Name particles ignored when matching ("María de la Cruz")
const PARTICLES: &[&str] = &["de", "del", "la", "las", "los", "y", "da", "van", "von"];

const MIN_PARTIAL_TOKEN_LEN: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MatchTier {
    Partial,
    AllTokens,
    Full,
}

#[derive(Debug, Clone)]
struct Candidate<'a> {
    employee: &'a Employee,
    tier: MatchTier,
    consumed: BTreeSet<usize>,
}

/// Outcome of matching one filename against the roster
#[derive(Debug, Clone, PartialEq)]
pub enum EmployeeMatch {
    /// Unique best match
    Found {
        employee: Employee,
        tier: MatchTier,
        /// Filename token positions covered by the name
        consumed: BTreeSet<usize>,
    },
    /// Several members share the best score
    Ambiguous { candidates: Vec<Employee> },
    None,
}

impl EmployeeMatch {
    pub fn employee(&self) -> Option<&Employee> {
        match self {
            EmployeeMatch::Found { employee, .. } => Some(employee),
            _ => None,
        }
    }

    /// A unique match built only from partial name tokens is a guess
    pub fn is_inferred(&self) -> bool {
        matches!(
            self,
            EmployeeMatch::Found {
                tier: MatchTier::Partial,
                ..
            }
        )
    }

    /// Token positions that belong to the employee name
    pub fn consumed(&self) -> BTreeSet<usize> {
        match self {
            EmployeeMatch::Found { consumed, .. } => consumed.clone(),
            _ => BTreeSet::new(),
        }
    }
}

fn significant_tokens(name: &str) -> Vec<String> {
    tokenize(name)
        .into_iter()
        .filter(|t| !PARTICLES.contains(&t.as_str()))
        .collect()
}

/// Positions of `needle` as a contiguous run inside `haystack`
fn find_run(haystack: &[String], needle: &[String]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn score_employee<'a>(employee: &'a Employee, tokens: &[String]) -> Option<Candidate<'a>> {
    let name = significant_tokens(&employee.full_name);
    if name.is_empty() {
        return None;
    }

    // Filename tokens with particles removed, remembering original positions
    let (positions, filtered): (Vec<usize>, Vec<String>) = tokens
        .iter()
        .enumerate()
        .filter(|(_, t)| !PARTICLES.contains(&t.as_str()))
        .map(|(i, t)| (i, t.clone()))
        .unzip();

    if let Some(start) = find_run(&filtered, &name) {
        let consumed = positions[start..start + name.len()].iter().copied().collect();
        return Some(Candidate {
            employee,
            tier: MatchTier::Full,
            consumed,
        });
    }

    let matched: Vec<(usize, &String)> = name
        .iter()
        .filter_map(|part| tokens.iter().position(|t| t == part).map(|idx| (idx, part)))
        .collect();

    if matched.len() == name.len() {
        return Some(Candidate {
            employee,
            tier: MatchTier::AllTokens,
            consumed: matched.iter().map(|(idx, _)| *idx).collect(),
        });
    }

    // Partial: only tokens long enough to be distinctive count
    let consumed: BTreeSet<usize> = matched
        .iter()
        .filter(|(_, part)| part.chars().count() >= MIN_PARTIAL_TOKEN_LEN)
        .map(|(idx, _)| *idx)
        .collect();
    if consumed.is_empty() {
        return None;
    }
    Some(Candidate {
        employee,
        tier: MatchTier::Partial,
        consumed,
    })
}

/// Match filename tokens against the roster
///
/// Inactive members are skipped.
pub fn detect_employee(tokens: &[String], roster: &[Employee]) -> EmployeeMatch {
    let candidates: Vec<Candidate<'_>> = roster
        .iter()
        .filter(|e| e.is_active)
        .filter_map(|e| score_employee(e, tokens))
        .collect();

    let best = match candidates.iter().map(|c| c.tier).max() {
        Some(best) => best,
        None => return EmployeeMatch::None,
    };
    let top: Vec<&Candidate<'_>> = candidates.iter().filter(|c| c.tier == best).collect();

    // Drop names nested inside a longer matched name
    let mut top: Vec<&Candidate<'_>> = top
        .iter()
        .filter(|c| {
            !top.iter().any(|other| {
                other.consumed.len() > c.consumed.len() && c.consumed.is_subset(&other.consumed)
            })
        })
        .copied()
        .collect();

    if top.len() == 1 {
        let winner = top.remove(0);
        return EmployeeMatch::Found {
            employee: winner.employee.clone(),
            tier: winner.tier,
            consumed: winner.consumed.clone(),
        };
    }

    EmployeeMatch::Ambiguous {
        candidates: top.into_iter().map(|c| c.employee.clone()).collect(),
    }
}
