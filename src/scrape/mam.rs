//! MyAnonamouse search scraping.
//!
//! MAM has no public API; searching means fetching the browse page with a
//! session cookie and picking titles, authors and torrent ids out of the
//! result table. Selectors are kept loose (`a[href*="/t/"]`) because the
//! markup shifts between site updates.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};

use super::{element_text, ScrapedTitle};
use crate::clients::{error_for_status, with_retry, ClientError, ClientResult};
use crate::config::Config;
use crate::normalize::extract_series;

static TORRENT_ID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"/t/(\d+)").unwrap());

pub struct MamScraper {
    client: reqwest::Client,
    base_url: String,
    session_cookie: String,
}

impl MamScraper {
    pub fn new(client: reqwest::Client, config: &Config) -> Self {
        Self {
            client,
            base_url: config.mam_base_url.trim_end_matches('/').to_string(),
            session_cookie: config.mam_session_cookie.clone(),
        }
    }

    /// Search the audiobook category for an author's releases.
    pub async fn search_author(&self, author: &str) -> ClientResult<Vec<ScrapedTitle>> {
        if self.session_cookie.is_empty() {
            return Err(ClientError::NotConfigured(
                "mam_session_cookie is empty".to_string(),
            ));
        }

        let url = format!(
            "{}/tor/browse.php?tor%5Btext%5D={}&tor%5BsrchIn%5D%5Bauthor%5D=true&tor%5Bcat%5D%5B%5D=m13",
            self.base_url,
            urlencoding::encode(author)
        );

        let body = with_retry("mam search", || {
            let client = self.client.clone();
            let url = url.clone();
            let cookie = format!("mam_id={}", self.session_cookie);
            async move {
                let response = client.get(&url).header("Cookie", cookie).send().await?;
                let response = error_for_status(response).await?;
                Ok(response.text().await?)
            }
        })
        .await?;

        if looks_logged_out(&body) {
            return Err(ClientError::Auth(
                "MAM session cookie expired or invalid".to_string(),
            ));
        }

        let titles = parse_search_results(&body);
        log::info!("mam: {} results for author '{}'", titles.len(), author);
        Ok(titles)
    }

    /// Download URL for a torrent id. qBittorrent cannot fetch this itself
    /// (it lacks the session cookie), so the hunt pipeline downloads the
    /// bytes via `download_torrent` and hands them over.
    pub fn torrent_url(&self, torrent_id: &str) -> String {
        format!("{}/tor/download.php/{}", self.base_url, torrent_id)
    }

    /// Fetch .torrent bytes using the session cookie.
    pub async fn download_torrent(&self, torrent_id: &str) -> ClientResult<Vec<u8>> {
        let url = self.torrent_url(torrent_id);
        let response = self
            .client
            .get(&url)
            .header("Cookie", format!("mam_id={}", self.session_cookie))
            .send()
            .await?;
        let response = error_for_status(response).await?;
        let bytes = response.bytes().await?;
        // An expired session serves the login page instead of bencode
        if bytes.starts_with(b"<!DOCTYPE") || bytes.starts_with(b"<html") {
            return Err(ClientError::Auth(
                "MAM served HTML instead of a torrent file".to_string(),
            ));
        }
        Ok(bytes.to_vec())
    }
}

/// Did MAM bounce us to the login page?
fn looks_logged_out(body: &str) -> bool {
    body.contains("name=\"password\"") || body.contains("Please log in")
}

/// Pull rows out of the browse-result table.
pub(crate) fn parse_search_results(body: &str) -> Vec<ScrapedTitle> {
    let document = Html::parse_document(body);
    let row_sel = Selector::parse("tr").unwrap();
    let title_sel = Selector::parse("a[href*=\"/t/\"]").unwrap();
    let author_sel = Selector::parse("a[href*=\"author\"]").unwrap();

    let mut results = Vec::new();

    for row in document.select(&row_sel) {
        let Some(title_link) = row.select(&title_sel).next() else {
            continue;
        };
        let raw_title = element_text(&title_link);
        if raw_title.is_empty() {
            continue;
        }

        let torrent_id = title_link
            .value()
            .attr("href")
            .and_then(|href| TORRENT_ID_RE.captures(href))
            .map(|caps| caps[1].to_string());

        let author = row
            .select(&author_sel)
            .next()
            .map(|a| element_text(&a))
            .unwrap_or_default();

        let (title, series, sequence) = extract_series(&raw_title);

        results.push(ScrapedTitle {
            title,
            author,
            torrent_id,
            series,
            sequence,
            source: "mam",
        });
    }

    results
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = r#"
        <html><body><table class="newTorTable">
          <tr><th>Title</th><th>Author</th></tr>
          <tr>
            <td><a href="/t/812345">The Final Empire (Mistborn #1)</a></td>
            <td><a href="/tor/browse.php?author=4412">Brandon Sanderson</a></td>
          </tr>
          <tr>
            <td><a href="/t/812399">The Well of Ascension</a></td>
            <td><a href="/tor/browse.php?author=4412">Brandon Sanderson</a></td>
          </tr>
          <tr><td>no link here</td><td>still no link</td></tr>
        </table></body></html>"#;

    #[test]
    fn test_parse_search_results() {
        let results = parse_search_results(FIXTURE);
        assert_eq!(results.len(), 2);

        assert_eq!(results[0].title, "The Final Empire");
        assert_eq!(results[0].series.as_deref(), Some("Mistborn"));
        assert_eq!(results[0].sequence.as_deref(), Some("1"));
        assert_eq!(results[0].torrent_id.as_deref(), Some("812345"));
        assert_eq!(results[0].author, "Brandon Sanderson");

        assert_eq!(results[1].title, "The Well of Ascension");
        assert!(results[1].series.is_none());
    }

    #[test]
    fn test_parse_empty_page() {
        assert!(parse_search_results("<html><body></body></html>").is_empty());
    }

    #[test]
    fn test_looks_logged_out() {
        assert!(looks_logged_out(
            r#"<form><input name="password" type="password"></form>"#
        ));
        assert!(!looks_logged_out(FIXTURE));
    }
}
