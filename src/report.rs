//! Run reports: console summaries and CSV exports.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::enrich::EnrichmentSummary;
use crate::hunt::HuntReport;
use crate::scrape::ScrapedTitle;

#[derive(Debug, Serialize)]
struct MissingRow<'a> {
    title: &'a str,
    author: &'a str,
    source: &'a str,
    series: &'a str,
    sequence: &'a str,
    torrent_id: &'a str,
}

pub fn write_missing_csv(path: &Path, missing: &[&ScrapedTitle]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;

    for item in missing {
        writer.serialize(MissingRow {
            title: &item.title,
            author: &item.author,
            source: item.source,
            series: item.series.as_deref().unwrap_or(""),
            sequence: item.sequence.as_deref().unwrap_or(""),
            torrent_id: item.torrent_id.as_deref().unwrap_or(""),
        })?;
    }

    writer.flush()?;
    log::info!("wrote {} missing titles to {}", missing.len(), path.display());
    Ok(())
}

pub fn write_hunt_csv(path: &Path, report: &HuntReport) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;

    for row in &report.dispositions {
        writer.serialize(row)?;
    }

    writer.flush()?;
    log::info!("wrote hunt report to {}", path.display());
    Ok(())
}

pub fn print_hunt_summary(report: &HuntReport) {
    println!(
        "hunt: {} authors, {} wanted, {} missing, {} queued",
        report.authors_searched, report.wanted, report.missing, report.queued
    );
    for row in &report.dispositions {
        match &row.detail {
            Some(detail) => println!(
                "  [{}] {} — {} ({})",
                row.action, row.title, row.author, detail
            ),
            None => println!("  [{}] {} — {}", row.action, row.title, row.author),
        }
    }
}

pub fn print_enrichment_summary(summary: &EnrichmentSummary) {
    println!(
        "enrich: {} scanned, {} eligible, {} applied, {} low-confidence, {} without candidates, {} failed",
        summary.scanned,
        summary.eligible,
        summary.applied,
        summary.low_confidence,
        summary.no_candidates,
        summary.failed
    );
    for outcome in &summary.outcomes {
        let confidence = outcome
            .confidence
            .map(|c| c.as_str())
            .unwrap_or("none");
        println!(
            "  {} [{} {:.2}] fields: {}{}",
            outcome.title,
            confidence,
            outcome.score,
            if outcome.fields_written.is_empty() {
                "-".to_string()
            } else {
                outcome.fields_written.join(",")
            },
            outcome
                .note
                .as_deref()
                .map(|n| format!(" ({})", n))
                .unwrap_or_default()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_missing_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.csv");

        let title = ScrapedTitle {
            title: "The Hero of Ages".to_string(),
            author: "Brandon Sanderson".to_string(),
            torrent_id: Some("812400".to_string()),
            series: Some("Mistborn".to_string()),
            sequence: Some("3".to_string()),
            source: "mam",
        };
        write_missing_csv(&path, &[&title]).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("The Hero of Ages"));
        assert!(contents.contains("812400"));
        assert!(contents.lines().count() >= 2); // header + row
    }
}
