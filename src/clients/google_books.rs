//! Google Books volumes client, used by the enrichment pass.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::{error_for_status, with_retry, ClientResult};
use crate::normalize::clean_search_term;

const VOLUMES_URL: &str = "https://www.googleapis.com/books/v1/volumes";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BookMetadata {
    pub title: Option<String>,
    pub subtitle: Option<String>,
    pub authors: Vec<String>,
    pub genres: Vec<String>,
    pub publisher: Option<String>,
    pub publish_date: Option<String>,
    pub description: Option<String>,
    pub isbn: Option<String>,
    pub language: Option<String>,
    pub cover_url: Option<String>,
}

impl BookMetadata {
    /// Four-digit year from the published date, when present.
    pub fn published_year(&self) -> Option<String> {
        let date = self.publish_date.as_deref()?;
        let year: String = date.chars().take_while(|c| c.is_ascii_digit()).collect();
        if year.len() == 4 {
            Some(year)
        } else {
            None
        }
    }
}

#[derive(Debug, Deserialize)]
struct VolumesResponse {
    #[serde(default)]
    items: Vec<VolumeItem>,
}

#[derive(Debug, Deserialize)]
struct VolumeItem {
    #[serde(rename = "volumeInfo")]
    volume_info: VolumeInfo,
}

#[derive(Debug, Deserialize)]
struct VolumeInfo {
    title: Option<String>,
    subtitle: Option<String>,
    authors: Option<Vec<String>>,
    publisher: Option<String>,
    #[serde(rename = "publishedDate")]
    published_date: Option<String>,
    description: Option<String>,
    #[serde(rename = "industryIdentifiers", default)]
    industry_identifiers: Vec<IndustryId>,
    categories: Option<Vec<String>>,
    language: Option<String>,
    #[serde(rename = "imageLinks")]
    image_links: Option<HashMap<String, String>>,
}

#[derive(Debug, Deserialize)]
struct IndustryId {
    #[serde(rename = "type")]
    id_type: String,
    identifier: String,
}

pub struct GoogleBooksClient {
    client: reqwest::Client,
    api_key: Option<String>,
}

impl GoogleBooksClient {
    pub fn new(client: reqwest::Client, api_key: Option<String>) -> Self {
        Self { client, api_key }
    }

    /// Search volumes by title and author; returns candidates in API order.
    pub async fn search_volumes(
        &self,
        title: &str,
        author: &str,
    ) -> ClientResult<Vec<BookMetadata>> {
        let query = format!(
            "intitle:{} inauthor:{}",
            clean_search_term(title),
            clean_search_term(author)
        );
        let mut url = format!("{}?q={}", VOLUMES_URL, urlencoding::encode(&query));
        if let Some(key) = &self.api_key {
            url.push_str(&format!("&key={}", key));
        }

        let payload: VolumesResponse = with_retry("google books search", || {
            let client = self.client.clone();
            let url = url.clone();
            async move {
                let response = client.get(&url).send().await?;
                let response = error_for_status(response).await?;
                Ok(response.json().await?)
            }
        })
        .await?;

        log::debug!(
            "google books: {} candidates for '{}' / '{}'",
            payload.items.len(),
            title,
            author
        );
        Ok(payload.items.into_iter().map(map_volume).collect())
    }
}

fn map_volume(item: VolumeItem) -> BookMetadata {
    let vi = item.volume_info;

    // Prefer ISBN-13, fall back to ISBN-10
    let isbn = vi
        .industry_identifiers
        .iter()
        .find(|id| id.id_type == "ISBN_13")
        .or_else(|| {
            vi.industry_identifiers
                .iter()
                .find(|id| id.id_type == "ISBN_10")
        })
        .map(|id| id.identifier.clone());

    let cover_url = vi.image_links.as_ref().and_then(|links| {
        ["extraLarge", "large", "medium", "small", "thumbnail"]
            .iter()
            .find_map(|size| links.get(*size))
            .cloned()
    });

    BookMetadata {
        title: vi.title,
        subtitle: vi.subtitle,
        authors: vi.authors.unwrap_or_default(),
        genres: vi.categories.unwrap_or_default(),
        publisher: vi.publisher,
        publish_date: vi.published_date,
        description: vi.description,
        isbn,
        language: vi.language,
        cover_url,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_volume_prefers_isbn13() {
        let item: VolumeItem = serde_json::from_value(serde_json::json!({
            "volumeInfo": {
                "title": "Dune",
                "authors": ["Frank Herbert"],
                "publishedDate": "1965-08-01",
                "industryIdentifiers": [
                    { "type": "ISBN_10", "identifier": "0441013597" },
                    { "type": "ISBN_13", "identifier": "9780441013593" }
                ],
                "imageLinks": { "thumbnail": "http://img/small", "large": "http://img/large" }
            }
        }))
        .unwrap();

        let meta = map_volume(item);
        assert_eq!(meta.isbn.as_deref(), Some("9780441013593"));
        assert_eq!(meta.cover_url.as_deref(), Some("http://img/large"));
        assert_eq!(meta.published_year().as_deref(), Some("1965"));
    }

    #[test]
    fn test_published_year_rejects_partial_dates() {
        let meta = BookMetadata {
            publish_date: Some("19".to_string()),
            ..Default::default()
        };
        assert!(meta.published_year().is_none());
    }

    #[test]
    fn test_empty_response_parses() {
        let payload: VolumesResponse = serde_json::from_str(r#"{"totalItems": 0}"#).unwrap();
        assert!(payload.items.is_empty());
    }
}
