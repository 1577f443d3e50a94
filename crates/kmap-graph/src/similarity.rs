//! Matching signals for entity reconciliation.
//!
//! Pure functions with no state and no I/O:
//! - embedding cosine similarity
//! - acronym extraction and generation
//! - alias matching over normalized names
//! - lexical near-duplicate scoring

use difflib::sequencematcher::SequenceMatcher;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;

/// Default lexical similarity required for a fuzzy alias match.
pub const DEFAULT_LEXICAL_MATCH_THRESHOLD: f32 = 0.9;

/// Normalized strings shorter than this never fuzzy-match.
const MIN_FUZZY_LEN: usize = 3;

/// Words skipped when building the secondary acronym candidate.
const STOP_WORDS: &[&str] = &[
    "the", "of", "and", "or", "in", "on", "at", "to", "for", "with", "by",
];

static ACRONYM: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b[A-Z]{2,}\b").unwrap());
static PARENTHETICAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"\(([^)]+)\)").unwrap());
static WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b[A-Za-z]+\b").unwrap());

/// Calculate cosine similarity between two vectors.
///
/// Returns 0.0 when either vector is empty, the lengths differ, or either
/// has zero magnitude. Negative similarity is reported as 0.0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || b.is_empty() || a.len() != b.len() {
        return 0.0;
    }

    let dot: f64 = a.iter().zip(b.iter()).map(|(x, y)| *x as f64 * *y as f64).sum();
    let norm_a: f64 = a.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();

    if norm_a <= f64::EPSILON || norm_b <= f64::EPSILON {
        return 0.0;
    }

    let similarity = dot / (norm_a * norm_b);
    if similarity.is_finite() {
        similarity.clamp(0.0, 1.0) as f32
    } else {
        0.0
    }
}

/// Lowercase, trim and strip punctuation.
pub fn normalize(text: &str) -> String {
    text.trim()
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || c.is_whitespace())
        .collect()
}

/// Lexical similarity of two strings in [0, 1].
///
/// Ratio of matching characters `2 * M / T`, where `M` counts characters in
/// the longest matching blocks and `T` is the combined length.
pub fn lexical_similarity(a: &str, b: &str) -> f32 {
    if a == b {
        return 1.0;
    }
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    SequenceMatcher::new(&a, &b).ratio()
}

/// Extract acronyms written in `text`.
///
/// Standalone all-caps tokens of two or more letters, plus all-caps tokens
/// found inside parentheses, e.g. `"Natural Language Processing (NLP)"`.
pub fn extract_acronyms(text: &str) -> BTreeSet<String> {
    let mut acronyms: BTreeSet<String> = ACRONYM
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .collect();

    for caps in PARENTHETICAL.captures_iter(text) {
        if let Some(inner) = caps.get(1) {
            acronyms.extend(
                ACRONYM
                    .find_iter(inner.as_str().trim())
                    .map(|m| m.as_str().to_string()),
            );
        }
    }

    acronyms
}

/// Generate acronyms a multi-word name could be abbreviated to.
///
/// `"Bureau of Labor Statistics"` yields `BOLS` and, with stop words
/// removed, `BLS`. Single-word names yield nothing.
pub fn generate_acronym_candidates(name: &str) -> BTreeSet<String> {
    let mut candidates = BTreeSet::new();
    let words: Vec<&str> = WORD.find_iter(name).map(|m| m.as_str()).collect();
    if words.len() < 2 {
        return candidates;
    }

    candidates.insert(initials(&words));

    let important: Vec<&str> = words
        .iter()
        .copied()
        .filter(|w| !STOP_WORDS.contains(&w.to_lowercase().as_str()))
        .collect();
    if important.len() >= 2 && important.len() != words.len() {
        candidates.insert(initials(&important));
    }

    candidates
}

fn initials(words: &[&str]) -> String {
    words
        .iter()
        .filter_map(|w| w.chars().next())
        .flat_map(|c| c.to_uppercase())
        .collect()
}

/// Check whether two entities name the same thing, using the default
/// lexical threshold.
pub fn is_alias_match(name1: &str, aliases1: &[String], name2: &str, aliases2: &[String]) -> bool {
    is_alias_match_with_threshold(
        name1,
        aliases1,
        name2,
        aliases2,
        DEFAULT_LEXICAL_MATCH_THRESHOLD,
    )
}

/// Check whether two entities name the same thing.
///
/// Matches when the normalized name/alias sets intersect, when an acronym
/// of one side equals a name or alias of the other (or both sides share an
/// acronym), or when any pair of normalized strings of length >= 3 is at
/// least `lexical_threshold` similar.
pub fn is_alias_match_with_threshold(
    name1: &str,
    aliases1: &[String],
    name2: &str,
    aliases2: &[String],
    lexical_threshold: f32,
) -> bool {
    let names1 = normalized_names(name1, aliases1);
    let names2 = normalized_names(name2, aliases2);

    if !names1.is_disjoint(&names2) {
        return true;
    }

    let acronyms1 = acronym_set(name1, aliases1);
    let acronyms2 = acronym_set(name2, aliases2);

    if !acronyms1.is_disjoint(&names2) || !acronyms2.is_disjoint(&names1) {
        return true;
    }
    if !acronyms1.is_disjoint(&acronyms2) {
        return true;
    }

    names1.iter().any(|n1| {
        n1.chars().count() >= MIN_FUZZY_LEN
            && names2.iter().any(|n2| {
                n2.chars().count() >= MIN_FUZZY_LEN
                    && lexical_similarity(n1, n2) >= lexical_threshold
            })
    })
}

fn normalized_names(name: &str, aliases: &[String]) -> BTreeSet<String> {
    std::iter::once(name)
        .chain(aliases.iter().map(String::as_str))
        .map(normalize)
        .filter(|n| !n.is_empty())
        .collect()
}

fn acronym_set(name: &str, aliases: &[String]) -> BTreeSet<String> {
    std::iter::once(name)
        .chain(aliases.iter().map(String::as_str))
        .flat_map(|text| {
            extract_acronyms(text)
                .into_iter()
                .chain(generate_acronym_candidates(text))
        })
        .map(|a| normalize(&a))
        .filter(|a| !a.is_empty())
        .collect()
}
