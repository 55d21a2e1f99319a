//! Goodreads author-page scraping.
//!
//! Walks `/author/list/<id>` pages and collects book titles. Goodreads
//! titles carry the series annotation inline ("The Final Empire
//! (Mistborn, #1)"), which `extract_series` splits off.

use std::time::Duration;

use scraper::{Html, Selector};

use super::{element_text, ScrapedTitle};
use crate::clients::{error_for_status, with_retry, ClientResult};
use crate::config::Config;
use crate::normalize::extract_series;

/// Delay between page fetches; Goodreads rate-limits anonymous traffic.
const PAGE_DELAY: Duration = Duration::from_secs(2);

// Safety bound against pagination loops on markup changes; at 30 books
// per page this covers even the most prolific authors.
const MAX_PAGES: usize = 50;

pub struct GoodreadsScraper {
    client: reqwest::Client,
    base_url: String,
}

impl GoodreadsScraper {
    pub fn new(client: reqwest::Client, config: &Config) -> Self {
        Self {
            client,
            base_url: config.goodreads_base_url.trim_end_matches('/').to_string(),
        }
    }

    /// All books listed for an author id, paginating until a page comes
    /// back empty.
    pub async fn author_books(&self, author_id: &str) -> ClientResult<Vec<ScrapedTitle>> {
        let mut books = Vec::new();

        for page in 1..=MAX_PAGES {
            let url = format!(
                "{}/author/list/{}?page={}&per_page=30",
                self.base_url, author_id, page
            );

            let body = with_retry("goodreads author page", || {
                let client = self.client.clone();
                let url = url.clone();
                async move {
                    let response = client.get(&url).send().await?;
                    let response = error_for_status(response).await?;
                    Ok(response.text().await?)
                }
            })
            .await?;

            let page_books = parse_author_list(&body);
            if page_books.is_empty() {
                break;
            }
            log::debug!("goodreads author {} page {}: {} books", author_id, page, page_books.len());
            books.extend(page_books);

            if page == MAX_PAGES {
                log::warn!(
                    "goodreads author {} has more than {} pages; list truncated",
                    author_id,
                    MAX_PAGES
                );
            }

            tokio::time::sleep(PAGE_DELAY).await;
        }

        log::info!("goodreads: {} books for author {}", books.len(), author_id);
        Ok(books)
    }
}

/// Parse one author-list page into titles.
pub(crate) fn parse_author_list(body: &str) -> Vec<ScrapedTitle> {
    let document = Html::parse_document(body);
    let row_sel = Selector::parse(r#"tr[itemtype="http://schema.org/Book"]"#).unwrap();
    let title_sel = Selector::parse("a.bookTitle").unwrap();
    let author_sel = Selector::parse("a.authorName").unwrap();

    let mut results = Vec::new();

    for row in document.select(&row_sel) {
        let Some(title_el) = row.select(&title_sel).next() else {
            continue;
        };
        let raw_title = element_text(&title_el);
        if raw_title.is_empty() {
            continue;
        }

        let author = row
            .select(&author_sel)
            .next()
            .map(|a| element_text(&a))
            .unwrap_or_default();

        let (title, series, sequence) = extract_series(&raw_title);

        results.push(ScrapedTitle {
            title,
            author,
            torrent_id: None,
            series,
            sequence,
            source: "goodreads",
        });
    }

    results
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = r#"
        <html><body><table class="tableList">
          <tr itemscope itemtype="http://schema.org/Book">
            <td>
              <a class="bookTitle" href="/book/show/68428">
                <span itemprop="name">The Final Empire (Mistborn, #1)</span>
              </a>
              <a class="authorName" href="/author/show/38550">
                <span itemprop="name">Brandon Sanderson</span>
              </a>
            </td>
          </tr>
          <tr itemscope itemtype="http://schema.org/Book">
            <td>
              <a class="bookTitle" href="/book/show/7235533">
                <span itemprop="name">The Way of Kings</span>
              </a>
              <a class="authorName" href="/author/show/38550">
                <span itemprop="name">Brandon Sanderson</span>
              </a>
            </td>
          </tr>
        </table></body></html>"#;

    #[test]
    fn test_parse_author_list() {
        let books = parse_author_list(FIXTURE);
        assert_eq!(books.len(), 2);

        assert_eq!(books[0].title, "The Final Empire");
        assert_eq!(books[0].series.as_deref(), Some("Mistborn"));
        assert_eq!(books[0].sequence.as_deref(), Some("1"));
        assert_eq!(books[0].author, "Brandon Sanderson");
        assert_eq!(books[0].source, "goodreads");

        assert_eq!(books[1].title, "The Way of Kings");
        assert!(books[1].series.is_none());
    }

    #[test]
    fn test_parse_page_without_books() {
        assert!(parse_author_list("<html><body><p>No books.</p></body></html>").is_empty());
    }
}
