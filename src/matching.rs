//! Fuzzy matching between scraped titles, library items, and lookup results
//!
//! Scoring combines normalized Levenshtein similarity with a token-overlap
//! ratio; whichever is higher wins. Containment (one normalized title inside
//! the other) short-circuits to a match, which is what makes
//! "Foundation (Book 1)" line up with "Foundation".

use std::collections::HashSet;

use crate::normalize::{normalize_author, normalize_title};

/// Default similarity threshold for title matching
pub const DEFAULT_THRESHOLD: f64 = 0.6;

/// Title weight when scoring an enrichment candidate (author gets the rest)
const TITLE_WEIGHT: f64 = 0.7;
const AUTHOR_WEIGHT: f64 = 0.3;

/// Confidence bucket for an enrichment candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum Confidence {
    /// Score >= 0.9: apply every fetched field
    High,
    /// Score >= threshold: fill empty fields only
    Medium,
    /// Below threshold: report, never write
    Low,
}

impl Confidence {
    pub fn bucket(score: f64, threshold: f64) -> Self {
        if score >= 0.9 {
            Confidence::High
        } else if score >= threshold {
            Confidence::Medium
        } else {
            Confidence::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::High => "high",
            Confidence::Medium => "medium",
            Confidence::Low => "low",
        }
    }
}

/// A library entry reduced to the fields matching cares about.
#[derive(Debug, Clone)]
pub struct LibraryEntry {
    pub title: String,
    pub author: String,
}

/// Similarity between two raw strings after normalization (0.0 - 1.0).
pub fn similarity(a: &str, b: &str) -> f64 {
    let na = normalize_title(a);
    let nb = normalize_title(b);
    normalized_similarity(&na, &nb)
}

/// Similarity between two already-normalized strings.
fn normalized_similarity(na: &str, nb: &str) -> f64 {
    if na.is_empty() || nb.is_empty() {
        return 0.0;
    }
    if na == nb {
        return 1.0;
    }

    let lev = strsim::normalized_levenshtein(na, nb);
    let tokens = token_overlap(na, nb);
    lev.max(tokens)
}

/// Fraction of tokens shared between two normalized strings.
///
/// Uses the smaller token set as the denominator so a title embedded in a
/// longer release name still scores well.
fn token_overlap(a: &str, b: &str) -> f64 {
    let ta: HashSet<&str> = a.split_whitespace().collect();
    let tb: HashSet<&str> = b.split_whitespace().collect();
    if ta.is_empty() || tb.is_empty() {
        return 0.0;
    }
    let shared = ta.intersection(&tb).count();
    shared as f64 / ta.len().min(tb.len()) as f64
}

/// Do two titles refer to the same book?
///
/// Normalizes both sides, then accepts containment or a similarity ratio
/// above `threshold`.
pub fn is_match(a: &str, b: &str, threshold: f64) -> bool {
    let na = normalize_title(a);
    let nb = normalize_title(b);

    if na.is_empty() || nb.is_empty() {
        return false;
    }
    if na == nb {
        return true;
    }
    // Containment only counts for reasonably long keys; "it" is inside
    // plenty of unrelated titles.
    if na.len() >= 4 && nb.len() >= 4 && (na.contains(&nb) || nb.contains(&na)) {
        return true;
    }

    normalized_similarity(&na, &nb) >= threshold
}

/// Do two author names refer to the same person?
pub fn author_matches(a: &str, b: &str) -> bool {
    let na = normalize_author(a);
    let nb = normalize_author(b);
    if na.is_empty() || nb.is_empty() {
        return false;
    }
    if na == nb || na.contains(&nb) || nb.contains(&na) {
        return true;
    }
    // "J R R Tolkien" vs "Tolkien" style partials: compare last tokens too
    let last_a = na.split_whitespace().last().unwrap_or("");
    let last_b = nb.split_whitespace().last().unwrap_or("");
    if !last_a.is_empty() && last_a == last_b {
        return strsim::normalized_levenshtein(&na, &nb) >= 0.5;
    }
    strsim::normalized_levenshtein(&na, &nb) >= 0.85
}

/// Weighted score of a lookup candidate against a library item.
pub fn score_candidate(
    item_title: &str,
    item_author: &str,
    candidate_title: &str,
    candidate_authors: &[String],
) -> f64 {
    let title_sim = similarity(item_title, candidate_title);

    let author_sim = candidate_authors
        .iter()
        .map(|a| {
            let na = normalize_author(item_author);
            let nb = normalize_author(a);
            if author_matches(item_author, a) {
                1.0
            } else {
                strsim::normalized_levenshtein(&na, &nb)
            }
        })
        .fold(0.0_f64, f64::max);

    // Missing author info on either side: score on title alone
    if item_author.trim().is_empty() || candidate_authors.is_empty() {
        return title_sim;
    }

    title_sim * TITLE_WEIGHT + author_sim * AUTHOR_WEIGHT
}

/// Which wanted titles are absent from the library?
///
/// A wanted title counts as present when some library item by a matching
/// author fuzzy-matches its title. Duplicate wanted titles are deduped by
/// normalized title; an empty library means everything is missing.
pub fn identify_missing_titles<'a, T>(
    wanted: &'a [T],
    library: &[LibraryEntry],
    threshold: f64,
) -> Vec<&'a T>
where
    T: AsLibraryEntry,
{
    let mut seen: HashSet<String> = HashSet::new();
    let mut missing = Vec::new();

    for item in wanted {
        let key = normalize_title(item.title());
        if key.is_empty() || !seen.insert(key) {
            continue;
        }

        let in_library = library.iter().any(|entry| {
            is_match(item.title(), &entry.title, threshold)
                && (item.author().trim().is_empty()
                    || entry.author.trim().is_empty()
                    || author_matches(item.author(), &entry.author))
        });

        if !in_library {
            missing.push(item);
        }
    }

    missing
}

/// Anything with a title and author that can be checked against the library.
pub trait AsLibraryEntry {
    fn title(&self) -> &str;
    fn author(&self) -> &str;
}

impl AsLibraryEntry for LibraryEntry {
    fn title(&self) -> &str {
        &self.title
    }
    fn author(&self) -> &str {
        &self.author
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_match_literal_pairs() {
        assert!(is_match("Foundation", "Foundation (Book 1)", DEFAULT_THRESHOLD));
        assert!(!is_match("Dune", "Neuromancer", DEFAULT_THRESHOLD));
        assert!(is_match("The Hobbit", "The Hobbit (Unabridged) [M4B]", DEFAULT_THRESHOLD));
        assert!(is_match(
            "the eye of the world",
            "The Eye of the World (Wheel of Time #1)",
            DEFAULT_THRESHOLD
        ));
    }

    #[test]
    fn test_is_match_short_titles_need_exact() {
        // "It" must not match inside "The Shining" just by containment
        assert!(!is_match("It", "The Institute", DEFAULT_THRESHOLD));
        assert!(is_match("It", "IT", DEFAULT_THRESHOLD));
    }

    #[test]
    fn test_similarity_bounds() {
        assert_eq!(similarity("", "Dune"), 0.0);
        assert_eq!(similarity("Dune", "Dune"), 1.0);
        let s = similarity("Project Hail Mary", "Project Hail Mary: A Novel");
        assert!(s > 0.6, "got {}", s);
    }

    #[test]
    fn test_author_matches() {
        assert!(author_matches("Brandon Sanderson", "Sanderson, Brandon"));
        assert!(author_matches("J.R.R. Tolkien", "J. R. R. Tolkien"));
        assert!(author_matches("Tolkien", "J.R.R. Tolkien"));
        assert!(!author_matches("Stephen King", "Stephen Fry"));
    }

    #[test]
    fn test_confidence_buckets() {
        assert_eq!(Confidence::bucket(0.95, 0.6), Confidence::High);
        assert_eq!(Confidence::bucket(0.7, 0.6), Confidence::Medium);
        assert_eq!(Confidence::bucket(0.4, 0.6), Confidence::Low);
    }

    #[test]
    fn test_score_candidate_weighs_author() {
        let same = score_candidate(
            "The Final Empire",
            "Brandon Sanderson",
            "The Final Empire",
            &["Brandon Sanderson".to_string()],
        );
        let wrong_author = score_candidate(
            "The Final Empire",
            "Brandon Sanderson",
            "The Final Empire",
            &["Someone Else".to_string()],
        );
        assert!(same > wrong_author);
        assert!((same - 1.0).abs() < 1e-9);
    }

    fn lib(entries: &[(&str, &str)]) -> Vec<LibraryEntry> {
        entries
            .iter()
            .map(|(t, a)| LibraryEntry {
                title: t.to_string(),
                author: a.to_string(),
            })
            .collect()
    }

    #[test]
    fn test_identify_missing_titles() {
        let library = lib(&[
            ("The Final Empire", "Brandon Sanderson"),
            ("The Well of Ascension", "Brandon Sanderson"),
        ]);
        let wanted = lib(&[
            ("The Final Empire (Mistborn #1)", "Brandon Sanderson"),
            ("The Hero of Ages", "Brandon Sanderson"),
            ("The Hero of Ages", "Brandon Sanderson"), // duplicate
        ]);

        let missing = identify_missing_titles(&wanted, &library, DEFAULT_THRESHOLD);
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].title, "The Hero of Ages");
    }

    #[test]
    fn test_identify_missing_titles_empty_library() {
        let wanted = lib(&[("Dune", "Frank Herbert")]);
        let missing = identify_missing_titles(&wanted, &[], DEFAULT_THRESHOLD);
        assert_eq!(missing.len(), 1);
    }
}
