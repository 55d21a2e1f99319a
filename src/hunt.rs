//! The hunt pipeline: search -> compare -> queue -> report.
//!
//! For each favorite author, gather candidate titles from MAM (and
//! optionally Goodreads), diff them against the Audiobookshelf library,
//! and queue missing titles to qBittorrent. Every title gets a disposition
//! row in the run report.

use std::time::Duration;

use anyhow::{bail, Result};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;

use crate::clients::abs::AbsClient;
use crate::clients::prowlarr::{ProwlarrClient, Release, CATEGORY_AUDIOBOOK};
use crate::clients::qbittorrent::QbittorrentClient;
use crate::config::Config;
use crate::history::History;
use crate::matching::{self, identify_missing_titles, is_match, LibraryEntry};
use crate::scrape::goodreads::GoodreadsScraper;
use crate::scrape::mam::MamScraper;
use crate::scrape::ScrapedTitle;

/// Delay between author searches, to stay polite with the tracker.
const AUTHOR_DELAY: Duration = Duration::from_secs(2);

/// Minimum score for accepting a Prowlarr release title.
const RELEASE_MATCH_THRESHOLD: f64 = 0.5;

#[derive(Debug, Default, Clone)]
pub struct HuntOptions {
    /// Override the configured favorite authors
    pub authors: Option<Vec<String>>,
    pub dry_run: bool,
    pub skip_goodreads: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct Disposition {
    pub title: String,
    pub author: String,
    pub source: String,
    pub action: &'static str,
    pub detail: Option<String>,
}

#[derive(Debug, Default, Serialize)]
pub struct HuntReport {
    pub authors_searched: usize,
    pub wanted: usize,
    pub missing: usize,
    pub queued: usize,
    pub dispositions: Vec<Disposition>,
}

pub struct HuntPipeline<'a> {
    pub config: &'a Config,
    pub abs: &'a AbsClient,
    pub mam: &'a MamScraper,
    pub goodreads: &'a GoodreadsScraper,
    pub qbit: &'a QbittorrentClient,
    pub prowlarr: Option<&'a ProwlarrClient>,
    pub history: &'a History,
}

impl<'a> HuntPipeline<'a> {
    pub async fn run(&self, options: &HuntOptions) -> Result<HuntReport> {
        let authors = options
            .authors
            .clone()
            .unwrap_or_else(|| self.config.favorite_authors.clone());
        if authors.is_empty() {
            bail!("no favorite authors configured; set favorite_authors or pass --authors");
        }

        let library: Vec<LibraryEntry> = self
            .abs
            .fetch_library_items()
            .await?
            .into_iter()
            .map(|item| LibraryEntry {
                title: item.title,
                author: item.author,
            })
            .collect();

        let active_downloads = self.active_download_names().await;

        let wanted = self.gather_wanted(&authors, options.skip_goodreads).await;
        let missing = identify_missing_titles(&wanted, &library, self.config.match_threshold);
        log::info!(
            "hunt: {} wanted titles, {} missing from library",
            wanted.len(),
            missing.len()
        );

        let mut report = HuntReport {
            authors_searched: authors.len(),
            wanted: wanted.len(),
            missing: missing.len(),
            ..Default::default()
        };

        let bar = ProgressBar::new(missing.len() as u64);
        bar.set_style(
            ProgressStyle::with_template("{spinner} hunt [{bar:30}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );

        for title in missing {
            bar.set_message(title.title.clone());

            if report.queued >= self.config.max_snatches_per_run {
                report.dispositions.push(disposition(title, "deferred", Some("snatch limit reached".into())));
                bar.inc(1);
                continue;
            }

            let action = self
                .process_missing_title(title, &active_downloads, options.dry_run)
                .await;
            if action.action == "queued" {
                report.queued += 1;
            }
            report.dispositions.push(action);
            bar.inc(1);
        }
        bar.finish_and_clear();

        if should_trigger_scan(&report, options.dry_run) {
            // New torrents will land in the library folder; kick off a
            // rescan so ABS picks them up without waiting for its watcher.
            match self.abs.trigger_scan().await {
                Ok(()) => log::info!("triggered library scan"),
                Err(err) => log::warn!("library scan trigger failed: {}", err),
            }
        }

        log::info!(
            "hunt done: {} queued of {} missing",
            report.queued,
            report.missing
        );
        Ok(report)
    }

    /// Scrape candidate titles for every author, MAM first, Goodreads as a
    /// supplement. Scrape failures are logged and skipped so one author
    /// cannot sink the run.
    pub(crate) async fn gather_wanted(
        &self,
        authors: &[String],
        skip_goodreads: bool,
    ) -> Vec<ScrapedTitle> {
        let mut wanted = Vec::new();

        for (i, author) in authors.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(AUTHOR_DELAY).await;
            }

            match self.mam.search_author(author).await {
                Ok(titles) => wanted.extend(titles),
                Err(err) => log::warn!("mam search failed for '{}': {}", author, err),
            }

            if skip_goodreads {
                continue;
            }
            let goodreads_id = self
                .config
                .goodreads_author_ids
                .iter()
                .find(|entry| matching::author_matches(&entry.name, author))
                .map(|entry| entry.author_id.clone());
            if let Some(id) = goodreads_id {
                match self.goodreads.author_books(&id).await {
                    Ok(mut books) => {
                        // Some list rows omit the author cell
                        for book in &mut books {
                            if book.author.is_empty() {
                                book.author = author.clone();
                            }
                        }
                        wanted.extend(books);
                    }
                    Err(err) => log::warn!("goodreads scrape failed for '{}': {}", author, err),
                }
            }
        }

        wanted
    }

    /// Names of torrents already in the configured category.
    async fn active_download_names(&self) -> Vec<String> {
        match self
            .qbit
            .list_torrents(self.config.qbittorrent_category.as_deref())
            .await
        {
            Ok(torrents) => torrents.into_iter().map(|t| t.name).collect(),
            Err(err) => {
                log::warn!("could not list active torrents: {}", err);
                Vec::new()
            }
        }
    }

    async fn process_missing_title(
        &self,
        title: &ScrapedTitle,
        active_downloads: &[String],
        dry_run: bool,
    ) -> Disposition {
        match self.history.is_snatched(&title.title, &title.author) {
            Ok(true) => {
                return disposition(title, "skipped", Some("already in snatch history".into()))
            }
            Ok(false) => {}
            Err(err) => log::warn!("history lookup failed: {}", err),
        }

        if active_downloads
            .iter()
            .any(|name| is_match(&title.title, name, self.config.match_threshold))
        {
            return disposition(title, "skipped", Some("already downloading".into()));
        }

        if dry_run {
            return disposition(title, "dry-run", None);
        }

        let result = match &title.torrent_id {
            Some(torrent_id) => self.queue_from_mam(title, torrent_id).await,
            None => self.queue_from_prowlarr(title).await,
        };

        match result {
            Ok(Some(detail)) => {
                if let Err(err) = self.history.record_snatch(
                    &title.title,
                    &title.author,
                    title.source,
                    title.torrent_id.as_deref(),
                ) {
                    log::warn!("history write failed: {}", err);
                }
                disposition(title, "queued", Some(detail))
            }
            Ok(None) => disposition(title, "no-release", None),
            Err(err) => {
                log::warn!("queueing '{}' failed: {}", title.title, err);
                disposition(title, "failed", Some(err.to_string()))
            }
        }
    }

    /// Queue a direct MAM hit: download the .torrent with the session
    /// cookie, hand the bytes to qBittorrent.
    async fn queue_from_mam(&self, title: &ScrapedTitle, torrent_id: &str) -> Result<Option<String>> {
        let bytes = self.mam.download_torrent(torrent_id).await?;
        self.qbit
            .add_torrent_bytes(
                bytes,
                &title.title,
                self.config.qbittorrent_category.as_deref(),
            )
            .await?;
        Ok(Some(format!("mam torrent {}", torrent_id)))
    }

    /// No direct tracker hit (Goodreads-sourced title): ask Prowlarr.
    async fn queue_from_prowlarr(&self, title: &ScrapedTitle) -> Result<Option<String>> {
        let Some(prowlarr) = self.prowlarr else {
            log::debug!("no prowlarr configured; cannot resolve '{}'", title.title);
            return Ok(None);
        };

        let query = format!("{} {}", title.title, title.author);
        let releases = prowlarr.search(&query, &[CATEGORY_AUDIOBOOK]).await?;

        let Some(release) = pick_release(&title.title, &releases) else {
            return Ok(None);
        };

        let detail = format!(
            "prowlarr release '{}' ({} seeders)",
            release.title,
            release.seeders.unwrap_or(0)
        );

        match release.best_link() {
            Some(link) if link.starts_with("magnet:") => {
                self.qbit
                    .add_torrent_url(link, self.config.qbittorrent_category.as_deref())
                    .await?;
            }
            Some(link) => {
                let bytes = prowlarr.download_torrent(link).await?;
                self.qbit
                    .add_torrent_bytes(
                        bytes,
                        &title.title,
                        self.config.qbittorrent_category.as_deref(),
                    )
                    .await?;
            }
            None => return Ok(None),
        }

        Ok(Some(detail))
    }
}

/// Best release whose title actually matches the wanted book.
/// `releases` arrive seeder-sorted, so the first acceptable one wins.
fn pick_release<'r>(wanted_title: &str, releases: &'r [Release]) -> Option<&'r Release> {
    releases.iter().find(|release| {
        release.best_link().is_some()
            && matching::similarity(wanted_title, &release.title) >= RELEASE_MATCH_THRESHOLD
    })
}

/// A rescan only makes sense when something was actually queued.
fn should_trigger_scan(report: &HuntReport, dry_run: bool) -> bool {
    !dry_run && report.queued > 0
}

fn disposition(title: &ScrapedTitle, action: &'static str, detail: Option<String>) -> Disposition {
    Disposition {
        title: title.title.clone(),
        author: title.author.clone(),
        source: title.source.to_string(),
        action,
        detail,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn release(title: &str, seeders: u32, link: Option<&str>) -> Release {
        Release {
            title: title.to_string(),
            size: 0,
            seeders: Some(seeders),
            indexer_id: None,
            indexer: None,
            download_url: link.map(String::from),
            magnet_url: None,
        }
    }

    #[test]
    fn test_pick_release_skips_mismatches() {
        let releases = vec![
            release("Completely Different Book", 100, Some("http://x/1")),
            release("The Hobbit (Unabridged) [M4B]", 5, Some("http://x/2")),
        ];
        let picked = pick_release("The Hobbit", &releases).unwrap();
        assert_eq!(picked.download_url.as_deref(), Some("http://x/2"));
    }

    #[test]
    fn test_pick_release_requires_link() {
        let releases = vec![release("The Hobbit", 10, None)];
        assert!(pick_release("The Hobbit", &releases).is_none());
    }

    #[test]
    fn test_pick_release_empty() {
        assert!(pick_release("Anything", &[]).is_none());
    }

    #[test]
    fn test_scan_only_after_real_queueing() {
        let mut report = HuntReport::default();
        assert!(!should_trigger_scan(&report, false));

        report.queued = 2;
        assert!(should_trigger_scan(&report, false));
        assert!(!should_trigger_scan(&report, true));
    }
}
