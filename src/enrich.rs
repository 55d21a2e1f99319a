//! Metadata enrichment: fill gaps in Audiobookshelf items from Google Books.
//!
//! For each library item with missing fields the service looks up candidate
//! volumes (cache first), scores the best candidate against the item's
//! title and author, and writes back according to the confidence bucket:
//! High applies every fetched field, Medium only fills blanks, Low is
//! reported and never written.

use anyhow::Result;
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;

use crate::cache::LookupCache;
use crate::clients::abs::{AbsClient, AbsItem, MetadataPatch};
use crate::clients::google_books::{BookMetadata, GoogleBooksClient};
use crate::history::History;
use crate::matching::{score_candidate, Confidence};

#[derive(Debug, Serialize)]
pub struct EnrichmentOutcome {
    pub item_id: String,
    pub title: String,
    pub author: String,
    pub matched_title: Option<String>,
    pub confidence: Option<Confidence>,
    pub score: f64,
    pub applied: bool,
    pub failed: bool,
    pub fields_written: Vec<&'static str>,
    pub note: Option<String>,
}

#[derive(Debug, Default, Serialize)]
pub struct EnrichmentSummary {
    pub scanned: usize,
    pub eligible: usize,
    pub applied: usize,
    pub low_confidence: usize,
    pub no_candidates: usize,
    pub failed: usize,
    pub outcomes: Vec<EnrichmentOutcome>,
}

pub struct EnrichmentService<'a> {
    pub abs: &'a AbsClient,
    pub books: &'a GoogleBooksClient,
    pub cache: &'a LookupCache,
    pub history: &'a History,
    pub threshold: f64,
    pub workers: usize,
}

impl<'a> EnrichmentService<'a> {
    pub async fn run(&self, limit: Option<usize>, dry_run: bool) -> Result<EnrichmentSummary> {
        let items = self.abs.fetch_library_items().await?;
        let scanned = items.len();

        let already_done = self.history.enriched_item_ids()?;
        let mut eligible: Vec<AbsItem> = items
            .into_iter()
            .filter(|item| item.has_missing_fields() && !already_done.contains(&item.id))
            .collect();
        if let Some(limit) = limit {
            eligible.truncate(limit);
        }

        log::info!(
            "enrich: {} of {} items have gaps ({} already enriched)",
            eligible.len(),
            scanned,
            already_done.len()
        );

        let bar = ProgressBar::new(eligible.len() as u64);
        bar.set_style(
            ProgressStyle::with_template("{spinner} enrich [{bar:30}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );

        let mut summary = EnrichmentSummary {
            scanned,
            eligible: eligible.len(),
            ..Default::default()
        };

        let outcomes: Vec<EnrichmentOutcome> = stream::iter(eligible)
            .map(|item| {
                let bar = bar.clone();
                async move {
                    let outcome = self.enrich_item(&item, dry_run).await;
                    bar.set_message(item.title.clone());
                    bar.inc(1);
                    outcome
                }
            })
            .buffer_unordered(self.workers.max(1))
            .collect()
            .await;
        bar.finish_and_clear();

        tally(outcomes, &mut summary);

        Ok(summary)
    }

    /// Enrich a single item. Errors never propagate; they land in the
    /// outcome's note so one bad item does not stop a run.
    async fn enrich_item(&self, item: &AbsItem, dry_run: bool) -> EnrichmentOutcome {
        let mut outcome = EnrichmentOutcome {
            item_id: item.id.clone(),
            title: item.title.clone(),
            author: item.author.clone(),
            matched_title: None,
            confidence: None,
            score: 0.0,
            applied: false,
            failed: false,
            fields_written: Vec::new(),
            note: None,
        };

        let candidate = match self.lookup(item).await {
            Ok(Some(candidate)) => candidate,
            Ok(None) => return outcome,
            Err(err) => {
                log::warn!("enrich lookup failed for '{}': {}", item.title, err);
                outcome.failed = true;
                outcome.note = Some(err.to_string());
                return outcome;
            }
        };

        let score = score_candidate(
            &item.title,
            &item.author,
            candidate.title.as_deref().unwrap_or(""),
            &candidate.authors,
        );
        let confidence = Confidence::bucket(score, self.threshold);

        outcome.matched_title = candidate.title.clone();
        outcome.score = score;
        outcome.confidence = Some(confidence);

        if confidence == Confidence::Low {
            log::debug!(
                "enrich: low confidence {:.2} for '{}' vs '{}'",
                score,
                item.title,
                candidate.title.as_deref().unwrap_or("")
            );
            if !dry_run {
                if let Err(err) =
                    self.history
                        .record_enrichment(&item.id, &item.title, confidence, score, false)
                {
                    log::warn!("history write failed: {}", err);
                }
            }
            return outcome;
        }

        let (patch, fields) = build_patch(item, &candidate, confidence);
        if patch.is_empty() {
            outcome.note = Some("nothing to write".to_string());
            return outcome;
        }
        outcome.fields_written = fields;

        if dry_run {
            outcome.note = Some("dry-run".to_string());
            return outcome;
        }

        match self.abs.update_item_metadata(&item.id, &patch).await {
            Ok(updated) => {
                outcome.applied = updated;
                if let Err(err) =
                    self.history
                        .record_enrichment(&item.id, &item.title, confidence, score, updated)
                {
                    log::warn!("history write failed: {}", err);
                }
            }
            Err(err) => {
                log::warn!("enrich write failed for '{}': {}", item.title, err);
                outcome.failed = true;
                outcome.note = Some(err.to_string());
            }
        }

        outcome
    }

    /// Best candidate for an item, via cache then Google Books.
    async fn lookup(&self, item: &AbsItem) -> Result<Option<BookMetadata>> {
        if let Some(cached) = self.cache.get(&item.title, &item.author) {
            log::debug!("enrich: cache hit for '{}'", item.title);
            return Ok(cached.metadata);
        }

        let candidates = self.books.search_volumes(&item.title, &item.author).await?;

        let best = candidates.into_iter().max_by(|a, b| {
            let sa = score_candidate(
                &item.title,
                &item.author,
                a.title.as_deref().unwrap_or(""),
                &a.authors,
            );
            let sb = score_candidate(
                &item.title,
                &item.author,
                b.title.as_deref().unwrap_or(""),
                &b.authors,
            );
            sa.partial_cmp(&sb).unwrap_or(std::cmp::Ordering::Equal)
        });

        self.cache.set(&item.title, &item.author, best.clone())?;
        Ok(best)
    }
}

/// Fold per-item outcomes into the summary counters. Failures count
/// whether the error hit during lookup or during the metadata write.
fn tally(outcomes: Vec<EnrichmentOutcome>, summary: &mut EnrichmentSummary) {
    for outcome in outcomes {
        if outcome.failed {
            summary.failed += 1;
        } else if outcome.confidence.is_none() {
            summary.no_candidates += 1;
        } else if outcome.applied {
            summary.applied += 1;
        } else if outcome.confidence == Some(Confidence::Low) {
            summary.low_confidence += 1;
        }
        summary.outcomes.push(outcome);
    }
}

fn blank(field: &Option<String>) -> bool {
    field.as_deref().map(str::trim).unwrap_or("").is_empty()
}

/// Decide which fields to write for a candidate at a given confidence.
fn build_patch(
    item: &AbsItem,
    candidate: &BookMetadata,
    confidence: Confidence,
) -> (MetadataPatch, Vec<&'static str>) {
    let overwrite = confidence == Confidence::High;
    let mut patch = MetadataPatch::default();
    let mut fields = Vec::new();

    let want = |current: &Option<String>, incoming: &Option<String>| -> Option<String> {
        let incoming = incoming.as_deref().map(str::trim).filter(|s| !s.is_empty())?;
        if overwrite || blank(current) {
            // Writing the identical value back is a wasted PATCH
            if current.as_deref().map(str::trim) == Some(incoming) {
                return None;
            }
            Some(incoming.to_string())
        } else {
            None
        }
    };

    if let Some(value) = want(&item.description, &candidate.description) {
        patch.description = Some(value);
        fields.push("description");
    }
    if let Some(value) = want(&item.publisher, &candidate.publisher) {
        patch.publisher = Some(value);
        fields.push("publisher");
    }
    if let Some(value) = want(&item.published_year, &candidate.published_year()) {
        patch.published_year = Some(value);
        fields.push("publishedYear");
    }
    if let Some(value) = want(&item.isbn, &candidate.isbn) {
        patch.isbn = Some(value);
        fields.push("isbn");
    }
    if overwrite {
        if let Some(value) = want(&None, &candidate.subtitle) {
            patch.subtitle = Some(value);
            fields.push("subtitle");
        }
        if let Some(value) = want(&None, &candidate.language) {
            patch.language = Some(value);
            fields.push("language");
        }
        if !candidate.genres.is_empty() {
            patch.genres = candidate.genres.clone();
            fields.push("genres");
        }
    }

    (patch, fields)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item_with_gaps() -> AbsItem {
        AbsItem {
            id: "li_1".to_string(),
            path: String::new(),
            title: "Dune".to_string(),
            author: "Frank Herbert".to_string(),
            series: None,
            sequence: None,
            description: None,
            publisher: Some("Ace".to_string()),
            published_year: None,
            isbn: None,
            asin: None,
        }
    }

    fn candidate() -> BookMetadata {
        BookMetadata {
            title: Some("Dune".to_string()),
            authors: vec!["Frank Herbert".to_string()],
            description: Some("Arrakis.".to_string()),
            publisher: Some("Chilton Books".to_string()),
            publish_date: Some("1965-08-01".to_string()),
            isbn: Some("9780441013593".to_string()),
            genres: vec!["Science Fiction".to_string()],
            ..Default::default()
        }
    }

    #[test]
    fn test_medium_confidence_fills_blanks_only() {
        let (patch, fields) = build_patch(&item_with_gaps(), &candidate(), Confidence::Medium);
        assert_eq!(patch.description.as_deref(), Some("Arrakis."));
        assert_eq!(patch.published_year.as_deref(), Some("1965"));
        assert_eq!(patch.isbn.as_deref(), Some("9780441013593"));
        // Publisher already set on the item; Medium must not touch it
        assert!(patch.publisher.is_none());
        assert!(patch.genres.is_empty());
        assert!(!fields.contains(&"publisher"));
    }

    #[test]
    fn test_high_confidence_overwrites() {
        let (patch, fields) = build_patch(&item_with_gaps(), &candidate(), Confidence::High);
        assert_eq!(patch.publisher.as_deref(), Some("Chilton Books"));
        assert_eq!(patch.genres, vec!["Science Fiction".to_string()]);
        assert!(fields.contains(&"publisher"));
        assert!(fields.contains(&"genres"));
    }

    #[test]
    fn test_identical_value_not_rewritten() {
        let mut item = item_with_gaps();
        item.publisher = Some("Chilton Books".to_string());
        let (patch, _) = build_patch(&item, &candidate(), Confidence::High);
        assert!(patch.publisher.is_none());
    }

    #[test]
    fn test_empty_candidate_produces_empty_patch() {
        let (patch, fields) =
            build_patch(&item_with_gaps(), &BookMetadata::default(), Confidence::High);
        assert!(patch.is_empty());
        assert!(fields.is_empty());
    }

    fn outcome(confidence: Option<Confidence>, applied: bool, failed: bool) -> EnrichmentOutcome {
        EnrichmentOutcome {
            item_id: "li_1".to_string(),
            title: "Dune".to_string(),
            author: "Frank Herbert".to_string(),
            matched_title: None,
            confidence,
            score: 0.0,
            applied,
            failed,
            fields_written: Vec::new(),
            note: None,
        }
    }

    #[test]
    fn test_tally_counts_write_failures() {
        let mut summary = EnrichmentSummary::default();
        tally(
            vec![
                // Confident match whose PATCH errored out
                outcome(Some(Confidence::High), false, true),
                outcome(Some(Confidence::High), true, false),
                outcome(Some(Confidence::Low), false, false),
                outcome(None, false, false),
            ],
            &mut summary,
        );
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.applied, 1);
        assert_eq!(summary.low_confidence, 1);
        assert_eq!(summary.no_candidates, 1);
        assert_eq!(summary.outcomes.len(), 4);
    }
}
