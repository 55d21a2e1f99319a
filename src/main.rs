mod cache;
mod clients;
mod config;
mod enrich;
mod history;
mod hunt;
mod matching;
mod normalize;
mod report;
mod scrape;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::cache::LookupCache;
use crate::clients::abs::AbsClient;
use crate::clients::google_books::GoogleBooksClient;
use crate::clients::prowlarr::{ProwlarrClient, CATEGORY_AUDIOBOOK};
use crate::clients::qbittorrent::QbittorrentClient;
use crate::config::Config;
use crate::enrich::EnrichmentService;
use crate::history::History;
use crate::hunt::{HuntOptions, HuntPipeline};
use crate::matching::{identify_missing_titles, LibraryEntry};
use crate::scrape::goodreads::GoodreadsScraper;
use crate::scrape::mam::MamScraper;

#[derive(Parser)]
#[command(
    name = "bookhound",
    about = "Audiobook library automation: tracker search, missing-title hunting, metadata enrichment",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose logging (repeat for trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Search tracker + Goodreads, compare against the library, queue
    /// missing titles to qBittorrent.
    Hunt {
        /// Authors to hunt (defaults to favorite_authors from config)
        #[arg(long, action = clap::ArgAction::Append)]
        authors: Vec<String>,
        /// Report what would be queued without queueing anything
        #[arg(long)]
        dry_run: bool,
        /// Skip the Goodreads scrape, use MAM results only
        #[arg(long)]
        skip_goodreads: bool,
        /// Write the per-title report to a CSV file
        #[arg(long)]
        csv: Option<PathBuf>,
    },

    /// Search + compare only: list titles missing from the library.
    Missing {
        #[arg(long, action = clap::ArgAction::Append)]
        authors: Vec<String>,
        #[arg(long)]
        skip_goodreads: bool,
        #[arg(long)]
        csv: Option<PathBuf>,
    },

    /// Enrich Audiobookshelf metadata from Google Books.
    Enrich {
        /// Maximum number of items to process this run
        #[arg(long)]
        limit: Option<usize>,
        /// Score and report without writing anything back
        #[arg(long)]
        dry_run: bool,
    },

    /// Manual search against MAM and Prowlarr.
    Search { query: String },

    /// Check connectivity to the configured services.
    Status,

    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Snatch history.
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write a default config file if none exists
    Init,
    /// Print the config with secrets redacted
    Show,
    /// Print the config file path
    Path,
}

#[derive(Subcommand)]
enum HistoryAction {
    List {
        #[arg(long, default_value = "50")]
        limit: usize,
    },
    /// Delete all snatch and enrichment history
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).init();

    match cli.command {
        Commands::Hunt {
            authors,
            dry_run,
            skip_goodreads,
            csv,
        } => {
            let config = Config::load()?;
            let services = Services::build(&config)?;
            let pipeline = HuntPipeline {
                config: &config,
                abs: &services.abs,
                mam: &services.mam,
                goodreads: &services.goodreads,
                qbit: &services.qbit,
                prowlarr: services.prowlarr.as_ref(),
                history: &services.history,
            };
            let options = HuntOptions {
                authors: non_empty(authors),
                dry_run,
                skip_goodreads,
            };
            let report = pipeline.run(&options).await?;
            report::print_hunt_summary(&report);
            if let Some(path) = csv {
                report::write_hunt_csv(&path, &report)?;
            }
        }

        Commands::Missing {
            authors,
            skip_goodreads,
            csv,
        } => {
            let config = Config::load()?;
            let services = Services::build(&config)?;
            run_missing(&config, &services, non_empty(authors), skip_goodreads, csv).await?;
        }

        Commands::Enrich { limit, dry_run } => {
            let config = Config::load()?;
            let services = Services::build(&config)?;
            let enricher = EnrichmentService {
                abs: &services.abs,
                books: &services.books,
                cache: &services.cache,
                history: &services.history,
                threshold: config.match_threshold,
                workers: config.enrich_workers,
            };
            let summary = enricher.run(limit, dry_run).await?;
            report::print_enrichment_summary(&summary);
        }

        Commands::Search { query } => {
            let config = Config::load()?;
            let services = Services::build(&config)?;
            run_search(&services, &query).await?;
        }

        Commands::Status => {
            let config = Config::load()?;
            let services = Services::build(&config)?;
            run_status(&services).await?;
        }

        Commands::Config { action } => match action {
            ConfigAction::Init => {
                let path = Config::config_path()?;
                if path.exists() {
                    println!("config already exists at {}", path.display());
                } else {
                    Config::default().save()?;
                    println!("wrote default config to {}", path.display());
                }
            }
            ConfigAction::Show => {
                let config = Config::load()?;
                println!("{}", serde_json::to_string_pretty(&config.redacted())?);
            }
            ConfigAction::Path => {
                println!("{}", Config::config_path()?.display());
            }
        },

        Commands::History { action } => {
            let history = History::open(&Config::data_dir()?)?;
            match action {
                HistoryAction::List { limit } => {
                    for row in history.list_snatches(limit)? {
                        println!(
                            "{}  {} — {} [{}]{}",
                            row.queued_at,
                            row.title,
                            row.author,
                            row.source,
                            row.torrent_id
                                .map(|id| format!(" torrent {}", id))
                                .unwrap_or_default()
                        );
                    }
                }
                HistoryAction::Clear => {
                    history.clear()?;
                    println!("history cleared");
                }
            }
        }
    }

    Ok(())
}

/// Every service the subcommands share, built from one HTTP client.
struct Services {
    abs: AbsClient,
    qbit: QbittorrentClient,
    prowlarr: Option<ProwlarrClient>,
    books: GoogleBooksClient,
    mam: MamScraper,
    goodreads: GoodreadsScraper,
    cache: LookupCache,
    history: History,
}

impl Services {
    fn build(config: &Config) -> Result<Self> {
        let http = clients::build_http_client()?;
        let data_dir = Config::data_dir()?;
        Ok(Self {
            abs: AbsClient::new(http.clone(), config),
            qbit: QbittorrentClient::new(http.clone(), config),
            prowlarr: ProwlarrClient::from_config(http.clone(), config),
            books: GoogleBooksClient::new(http.clone(), config.google_books_api_key.clone()),
            mam: MamScraper::new(http.clone(), config),
            goodreads: GoodreadsScraper::new(http, config),
            cache: LookupCache::open(&data_dir)?,
            history: History::open(&data_dir)?,
        })
    }
}

fn non_empty(values: Vec<String>) -> Option<Vec<String>> {
    if values.is_empty() {
        None
    } else {
        Some(values)
    }
}

async fn run_missing(
    config: &Config,
    services: &Services,
    authors: Option<Vec<String>>,
    skip_goodreads: bool,
    csv: Option<PathBuf>,
) -> Result<()> {
    let pipeline = HuntPipeline {
        config,
        abs: &services.abs,
        mam: &services.mam,
        goodreads: &services.goodreads,
        qbit: &services.qbit,
        prowlarr: services.prowlarr.as_ref(),
        history: &services.history,
    };

    let authors = authors.unwrap_or_else(|| config.favorite_authors.clone());
    if authors.is_empty() {
        anyhow::bail!("no favorite authors configured; set favorite_authors or pass --authors");
    }

    let library: Vec<LibraryEntry> = services
        .abs
        .fetch_library_items()
        .await?
        .into_iter()
        .map(|item| LibraryEntry {
            title: item.title,
            author: item.author,
        })
        .collect();

    let wanted = pipeline.gather_wanted(&authors, skip_goodreads).await;
    let missing = identify_missing_titles(&wanted, &library, config.match_threshold);

    println!("{} wanted, {} missing:", wanted.len(), missing.len());
    for title in &missing {
        println!("  {} — {} [{}]", title.title, title.author, title.source);
    }
    if let Some(path) = csv {
        report::write_missing_csv(&path, &missing)?;
    }
    Ok(())
}

async fn run_search(services: &Services, query: &str) -> Result<()> {
    match services.mam.search_author(query).await {
        Ok(results) => {
            println!("mam: {} results", results.len());
            for r in results {
                println!(
                    "  {} — {}{}",
                    r.title,
                    r.author,
                    r.torrent_id
                        .map(|id| format!(" (torrent {})", id))
                        .unwrap_or_default()
                );
            }
        }
        Err(err) => log::warn!("mam search failed: {}", err),
    }

    if let Some(prowlarr) = &services.prowlarr {
        let releases = prowlarr.search(query, &[CATEGORY_AUDIOBOOK]).await?;
        println!("prowlarr: {} releases", releases.len());
        for release in releases.iter().take(20) {
            println!(
                "  {} ({} seeders, {} MB) [{}]",
                release.title,
                release.seeders.unwrap_or(0),
                release.size / 1_000_000,
                release.indexer.as_deref().unwrap_or("?")
            );
        }
    }
    Ok(())
}

async fn run_status(services: &Services) -> Result<()> {
    match services.abs.ping().await {
        Ok(true) => println!("audiobookshelf: ok"),
        Ok(false) => println!("audiobookshelf: unreachable"),
        Err(err) => println!("audiobookshelf: error ({})", err),
    }

    match services.qbit.version().await {
        Ok(version) => println!("qbittorrent: {}", version),
        Err(err) => println!("qbittorrent: error ({})", err),
    }

    match &services.prowlarr {
        Some(_) => println!("prowlarr: configured"),
        None => println!("prowlarr: not configured"),
    }

    let (snatches, enrichments) = services.history.counts()?;
    println!(
        "history: {} snatches, {} enrichment rows, {} cached lookups",
        snatches,
        enrichments,
        services.cache.len()
    );
    Ok(())
}
