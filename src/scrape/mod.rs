//! HTML scraping of search-result pages.
//!
//! Page fetching is async; parsing is plain functions over the body text so
//! no `scraper::Html` (not `Send`) ever lives across an await point, and so
//! the parsers can be tested on embedded fixtures.

pub mod goodreads;
pub mod mam;

use crate::matching::AsLibraryEntry;

/// A title pulled off a search-result or author page.
#[derive(Debug, Clone, PartialEq)]
pub struct ScrapedTitle {
    pub title: String,
    pub author: String,
    /// Tracker torrent id when the row came from MAM
    pub torrent_id: Option<String>,
    pub series: Option<String>,
    pub sequence: Option<String>,
    /// Where the row came from: "mam" or "goodreads"
    pub source: &'static str,
}

impl AsLibraryEntry for ScrapedTitle {
    fn title(&self) -> &str {
        &self.title
    }
    fn author(&self) -> &str {
        &self.author
    }
}

/// Collapse the text content of an HTML element into a single line.
pub(crate) fn element_text(element: &scraper::ElementRef) -> String {
    element
        .text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
