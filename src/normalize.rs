//! Text normalization for audiobook titles and author names
//!
//! Everything that compares titles across sources (tracker, Goodreads,
//! Audiobookshelf, Google Books) goes through `normalize_title` first.
//! The normalized form is a comparison key, not a display string.

use once_cell::sync::Lazy;
use regex::Regex;

/// Common junk suffixes found in tracker release titles
const JUNK_SUFFIXES: &[&str] = &[
    "(unabridged)",
    "[unabridged]",
    "(abridged)",
    "[abridged]",
    "(audiobook)",
    "[audiobook]",
    "- audiobook",
    "- unabridged",
    "(retail)",
    "[retail]",
    "(mp3)",
    "[mp3]",
    "(m4b)",
    "[m4b]",
    "320kbps",
    "256kbps",
    "128kbps",
    "64kbps",
    "(hq)",
    "[hq]",
    "(complete)",
    "[complete]",
    "(full cast)",
    "[full cast]",
];

// Parenthesized or bracketed series annotation: "(Wheel of Time #1)",
// "[Foundation, Book 3]", "(The Expanse, Vol. 2)"
static PAREN_SERIES_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\s*[\(\[][^\)\]]*(?:#\d+|book\s*\d+|vol(?:ume)?\.?\s*\d+)[^\)\]]*[\)\]]")
        .unwrap()
});

// Trailing bare annotation: "Title, Book 2", "Title Book 2", "Title #4"
static TRAILING_BOOK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(?:,?\s*book\s*\d+|\s*#\d+)\s*$").unwrap());

// Any remaining bracketed chunk (format notes, narrator credits, years)
static BRACKETED_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*[\(\[][^\)\]]*[\)\]]").unwrap());

static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

// "Title (Series #3)" / "Title [Foundation, Book 3]" -> title, series, sequence.
// The opening bracket anchors the title/series split.
static PAREN_EXTRACT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(.*?)\s*[\(\[]\s*([^\(\)\[\]]*?)[,\s]*(?:#|book\s*|vol(?:ume)?\.?\s*)(\d+(?:\.\d+)?|one|two|three|four|five)\s*[\)\]]\s*$")
        .unwrap()
});

// "Title, Book 2" / "Title - Volume 4" / "Title #4": no separate series
// name, the whole prefix is the title.
static BARE_EXTRACT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(.+?)(?:\s*[,:–-])?\s*(?:#|book\s+|vol(?:ume)?\.?\s+)(\d+(?:\.\d+)?|one|two|three|four|five)\s*$")
        .unwrap()
});

/// Normalize a title into its comparison key.
///
/// Lowercases, strips junk release suffixes and series/volume annotations,
/// drops remaining bracketed chunks and punctuation, collapses whitespace.
/// Idempotent: normalizing an already-normalized title is a no-op.
pub fn normalize_title(title: &str) -> String {
    let mut result = title.to_lowercase();

    for suffix in JUNK_SUFFIXES {
        while let Some(pos) = result.find(suffix) {
            result.replace_range(pos..pos + suffix.len(), " ");
        }
    }

    result = PAREN_SERIES_RE.replace_all(&result, " ").into_owned();
    result = TRAILING_BOOK_RE.replace(&result, "").into_owned();
    result = BRACKETED_RE.replace_all(&result, " ").into_owned();

    // Keep letters, digits and spaces; punctuation differs too much
    // between sources to be useful in a comparison key.
    result = result
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();

    result = WHITESPACE_RE.replace_all(&result, " ").trim().to_string();

    // Punctuation can shield a trailing annotation from the first pass
    // ("Dune: Book 2!"); strip again now that punctuation is gone.
    TRAILING_BOOK_RE.replace(&result, "").trim().to_string()
}

fn word_sequence(raw: &str) -> String {
    match raw.to_lowercase().as_str() {
        "one" => "1",
        "two" => "2",
        "three" => "3",
        "four" => "4",
        "five" => "5",
        other => other,
    }
    .to_string()
}

/// Extract series name and sequence number from an annotated title.
///
/// Returns `(clean_title, series, sequence)`. When no annotation is
/// recognized the original title comes back with both options empty.
pub fn extract_series(title: &str) -> (String, Option<String>, Option<String>) {
    if let Some(caps) = PAREN_EXTRACT_RE.captures(title) {
        let clean = caps.get(1).map(|m| m.as_str().trim()).unwrap_or_default();
        let series = caps
            .get(2)
            .map(|m| m.as_str().trim().trim_end_matches([',', '-']).trim())
            .unwrap_or_default();
        let sequence = word_sequence(caps.get(3).map(|m| m.as_str()).unwrap_or_default());

        if !clean.is_empty() {
            let series = if series.is_empty() {
                // "Title (Book 2)" carries no series name; reuse the title
                Some(clean.to_string())
            } else {
                Some(series.to_string())
            };
            return (clean.to_string(), series, Some(sequence));
        }
    }

    if let Some(caps) = BARE_EXTRACT_RE.captures(title) {
        let clean = caps.get(1).map(|m| m.as_str().trim()).unwrap_or_default();
        let sequence = word_sequence(caps.get(2).map(|m| m.as_str()).unwrap_or_default());

        if !clean.is_empty() {
            return (clean.to_string(), Some(clean.to_string()), Some(sequence));
        }
    }

    (title.trim().to_string(), None, None)
}

/// Clean an author name for display and queries.
///
/// Strips "by"-style prefixes and surrounding quotes, and flips
/// "Last, First" into "First Last" (unless the comma introduces a
/// generational suffix).
pub fn clean_author(author: &str) -> String {
    let mut result = author.trim().to_string();

    for prefix in ["by ", "written by ", "author: "] {
        if result.to_lowercase().starts_with(prefix) {
            result = result[prefix.len()..].trim().to_string();
        }
    }

    result = result
        .trim_matches('"')
        .trim_matches('\'')
        .trim()
        .to_string();

    if let Some(comma_pos) = result.find(',') {
        let last = result[..comma_pos].trim().to_string();
        let first = result[comma_pos + 1..].trim().to_string();

        let suffixes = ["jr", "jr.", "sr", "sr.", "ii", "iii", "iv", "phd", "md"];
        if !suffixes.contains(&first.to_lowercase().as_str()) {
            result = format!("{} {}", first, last);
        }
    }

    result
}

/// Comparison key for an author name: cleaned, lowercased, no punctuation.
pub fn normalize_author(author: &str) -> String {
    let cleaned = clean_author(author).to_lowercase();
    let cleaned: String = cleaned
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    WHITESPACE_RE.replace_all(&cleaned, " ").trim().to_string()
}

/// Clean a title for use in an external search query.
///
/// Keeps case (some APIs are case-sensitive in ranking) but drops series
/// annotations and release junk, and caps the length.
pub fn clean_search_term(input: &str) -> String {
    let mut cleaned = PAREN_SERIES_RE.replace_all(input, " ").into_owned();
    cleaned = TRAILING_BOOK_RE.replace(&cleaned, "").into_owned();
    for suffix in JUNK_SUFFIXES {
        loop {
            let lower = cleaned.to_lowercase();
            match lower.find(suffix) {
                Some(pos) => cleaned.replace_range(pos..pos + suffix.len(), " "),
                None => break,
            }
        }
    }

    let collapsed = WHITESPACE_RE.replace_all(&cleaned, " ").trim().to_string();
    if collapsed.len() > 100 {
        collapsed.chars().take(100).collect()
    } else {
        collapsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_title_basic() {
        assert_eq!(normalize_title("The Hobbit (Unabridged)"), "the hobbit");
        assert_eq!(normalize_title("1984 [Audiobook] 320kbps"), "1984");
        assert_eq!(
            normalize_title("The Eye of the World (Wheel of Time #1)"),
            "the eye of the world"
        );
        assert_eq!(normalize_title("Foundation (Book 1)"), "foundation");
        assert_eq!(normalize_title("A Game of Thrones, Book 1"), "a game of thrones");
    }

    #[test]
    fn test_normalize_title_idempotent() {
        let inputs = [
            "The Eye of the World (Wheel of Time #1)",
            "Dune: The Desert Planet [M4B]",
            "Project Hail Mary (Unabridged) - Audiobook",
            "Dune: Book 2!",
            "Foundation Book 2 [M4B extra]",
            "plain title",
        ];
        for input in inputs {
            let once = normalize_title(input);
            assert_eq!(normalize_title(&once), once, "not idempotent for {:?}", input);
        }
    }

    #[test]
    fn test_normalize_title_case_insensitive() {
        assert_eq!(normalize_title("DUNE"), normalize_title("dune"));
        assert_eq!(
            normalize_title("The Hobbit (UNABRIDGED)"),
            normalize_title("the hobbit")
        );
    }

    #[test]
    fn test_normalize_title_annotation_behind_punctuation() {
        // The trailing annotation only surfaces once punctuation is gone
        assert_eq!(normalize_title("Dune: Book 2!"), "dune");
        assert_eq!(normalize_title("Foundation Book 2 [M4B extra]"), "foundation");
    }

    #[test]
    fn test_normalize_strips_punctuation() {
        assert_eq!(normalize_title("Harry Potter & the Goblet"), "harry potter the goblet");
        assert_eq!(normalize_title("Don't Panic!"), "don t panic");
    }

    #[test]
    fn test_extract_series() {
        let (title, series, seq) = extract_series("The Eye of the World (Wheel of Time #1)");
        assert_eq!(title, "The Eye of the World");
        assert_eq!(series.as_deref(), Some("Wheel of Time"));
        assert_eq!(seq.as_deref(), Some("1"));

        let (title, series, seq) = extract_series("A Game of Thrones, Book One");
        assert_eq!(title, "A Game of Thrones");
        assert_eq!(series.as_deref(), Some("A Game of Thrones"));
        assert_eq!(seq.as_deref(), Some("1"));

        // Goodreads annotation style
        let (title, series, seq) = extract_series("The Final Empire (Mistborn, #1)");
        assert_eq!(title, "The Final Empire");
        assert_eq!(series.as_deref(), Some("Mistborn"));
        assert_eq!(seq.as_deref(), Some("1"));

        // Multi-word title before a bare annotation stays intact
        let (title, series, seq) = extract_series("The Wise Man's Fear, Book 2");
        assert_eq!(title, "The Wise Man's Fear");
        assert_eq!(series.as_deref(), Some("The Wise Man's Fear"));
        assert_eq!(seq.as_deref(), Some("2"));

        let (title, series, seq) = extract_series("Standalone Novel");
        assert_eq!(title, "Standalone Novel");
        assert!(series.is_none());
        assert!(seq.is_none());
    }

    #[test]
    fn test_clean_author() {
        assert_eq!(clean_author("by Brandon Sanderson"), "Brandon Sanderson");
        assert_eq!(clean_author("Sanderson, Brandon"), "Brandon Sanderson");
        assert_eq!(clean_author("Martin Luther King, Jr."), "Martin Luther King, Jr.");
        assert_eq!(clean_author("\"Ursula K. Le Guin\""), "Ursula K. Le Guin");
    }

    #[test]
    fn test_normalize_author() {
        assert_eq!(normalize_author("Tolkien, J.R.R."), "j r r tolkien");
        assert_eq!(normalize_author("by STEPHEN KING"), "stephen king");
    }

    #[test]
    fn test_clean_search_term_caps_length() {
        let long = "word ".repeat(50);
        assert!(clean_search_term(&long).len() <= 100);
    }
}
