//! Audiobookshelf REST client.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{error_for_status, with_retry, ClientResult};
use crate::config::Config;

/// Library responses are cached in-process for five minutes; the enrich and
/// hunt pipelines both walk the full library.
const LIBRARY_CACHE_TTL: Duration = Duration::from_secs(300);

const PAGE_LIMIT: usize = 200;

/// A library item reduced to the metadata bookhound reads and writes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AbsItem {
    pub id: String,
    pub path: String,
    pub title: String,
    pub author: String,
    pub series: Option<String>,
    pub sequence: Option<String>,
    pub description: Option<String>,
    pub publisher: Option<String>,
    pub published_year: Option<String>,
    pub isbn: Option<String>,
    pub asin: Option<String>,
}

impl AbsItem {
    /// Does this item have gaps worth enriching?
    pub fn has_missing_fields(&self) -> bool {
        fn blank(field: &Option<String>) -> bool {
            field.as_deref().map(str::trim).unwrap_or("").is_empty()
        }
        blank(&self.description)
            || blank(&self.publisher)
            || blank(&self.published_year)
            || blank(&self.isbn)
    }
}

/// Fields an enrichment run may write back. Only populated fields are sent.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MetadataPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,
    #[serde(rename = "publishedYear", skip_serializing_if = "Option::is_none")]
    pub published_year: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub isbn: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub genres: Vec<String>,
}

impl MetadataPatch {
    pub fn is_empty(&self) -> bool {
        self.description.is_none()
            && self.publisher.is_none()
            && self.published_year.is_none()
            && self.isbn.is_none()
            && self.subtitle.is_none()
            && self.language.is_none()
            && self.genres.is_empty()
    }
}

#[derive(Debug, Deserialize)]
struct ItemsResponse {
    results: Vec<RawItem>,
}

#[derive(Debug, Deserialize)]
struct RawItem {
    id: String,
    #[serde(default)]
    path: String,
    media: RawMedia,
}

#[derive(Debug, Deserialize)]
struct RawMedia {
    metadata: RawMetadata,
}

// Minified metadata shape from GET /api/libraries/{id}/items
#[derive(Debug, Deserialize)]
struct RawMetadata {
    title: Option<String>,
    #[serde(rename = "authorName")]
    author_name: Option<String>,
    #[serde(rename = "seriesName")]
    series_name: Option<String>,
    description: Option<String>,
    publisher: Option<String>,
    #[serde(rename = "publishedYear")]
    published_year: Option<String>,
    isbn: Option<String>,
    asin: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UpdateMediaResponse {
    #[serde(default)]
    updated: bool,
}

pub struct AbsClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
    library_id: String,
    library_cache: Mutex<Option<(Instant, Vec<AbsItem>)>>,
}

impl AbsClient {
    pub fn new(client: reqwest::Client, config: &Config) -> Self {
        Self {
            client,
            base_url: config.abs_base_url.trim_end_matches('/').to_string(),
            token: config.abs_api_token.clone(),
            library_id: config.abs_library_id.clone(),
            library_cache: Mutex::new(None),
        }
    }

    pub async fn ping(&self) -> ClientResult<bool> {
        let url = format!("{}/ping", self.base_url);
        let response = self.client.get(&url).send().await?;
        Ok(response.status().is_success())
    }

    /// Fetch every item in the configured library, paginating until a short
    /// page comes back.
    pub async fn fetch_library_items(&self) -> ClientResult<Vec<AbsItem>> {
        {
            let cache = self.library_cache.lock().unwrap();
            if let Some((fetched_at, items)) = &*cache {
                if fetched_at.elapsed() < LIBRARY_CACHE_TTL {
                    log::debug!("using cached library ({} items)", items.len());
                    return Ok(items.clone());
                }
            }
        }

        let mut items = Vec::new();
        let mut page = 0;

        loop {
            let url = format!(
                "{}/api/libraries/{}/items?limit={}&page={}",
                self.base_url, self.library_id, PAGE_LIMIT, page
            );
            let payload: ItemsResponse = with_retry("abs items page", || {
                let client = self.client.clone();
                let url = url.clone();
                let token = self.token.clone();
                async move {
                    let response = client.get(&url).bearer_auth(&token).send().await?;
                    let response = error_for_status(response).await?;
                    Ok(response.json().await?)
                }
            })
            .await?;

            let count = payload.results.len();
            items.extend(payload.results.into_iter().map(flatten_item));
            log::debug!("library page {}: {} items", page, count);

            if count < PAGE_LIMIT {
                break;
            }
            page += 1;
        }

        log::info!("library loaded: {} items", items.len());
        let mut cache = self.library_cache.lock().unwrap();
        *cache = Some((Instant::now(), items.clone()));
        Ok(items)
    }

    /// PATCH corrected fields onto an item. Returns whether ABS reported a
    /// change.
    pub async fn update_item_metadata(
        &self,
        item_id: &str,
        patch: &MetadataPatch,
    ) -> ClientResult<bool> {
        let url = format!("{}/api/items/{}/media", self.base_url, item_id);
        let payload = json!({ "metadata": patch });

        let response = self
            .client
            .patch(&url)
            .bearer_auth(&self.token)
            .json(&payload)
            .send()
            .await?;
        let response = error_for_status(response).await?;

        let body: UpdateMediaResponse = response
            .json()
            .await
            .map_err(|e| super::ClientError::Parse(e.to_string()))?;
        Ok(body.updated)
    }

    pub async fn trigger_scan(&self) -> ClientResult<()> {
        let url = format!("{}/api/libraries/{}/scan", self.base_url, self.library_id);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .send()
            .await?;
        error_for_status(response).await?;
        Ok(())
    }
}

fn flatten_item(raw: RawItem) -> AbsItem {
    let meta = raw.media.metadata;
    let (series, sequence) = match meta.series_name {
        // "Mistborn #2" style combined field
        Some(name) => match name.rsplit_once('#') {
            Some((series, seq)) if seq.trim().parse::<f64>().is_ok() => {
                (Some(series.trim().to_string()), Some(seq.trim().to_string()))
            }
            _ => (Some(name.trim().to_string()), None),
        },
        None => (None, None),
    };

    AbsItem {
        id: raw.id,
        path: raw.path,
        title: meta.title.unwrap_or_default(),
        author: meta.author_name.unwrap_or_default(),
        series,
        sequence,
        description: meta.description,
        publisher: meta.publisher,
        published_year: meta.published_year,
        isbn: meta.isbn,
        asin: meta.asin,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flatten_splits_series_sequence() {
        let raw: RawItem = serde_json::from_value(json!({
            "id": "li_1",
            "path": "/books/Sanderson/The Well of Ascension",
            "media": { "metadata": {
                "title": "The Well of Ascension",
                "authorName": "Brandon Sanderson",
                "seriesName": "Mistborn #2"
            }}
        }))
        .unwrap();

        let item = flatten_item(raw);
        assert_eq!(item.series.as_deref(), Some("Mistborn"));
        assert_eq!(item.sequence.as_deref(), Some("2"));
        assert!(item.has_missing_fields());
    }

    #[test]
    fn test_has_missing_fields_false_when_complete() {
        let item = AbsItem {
            id: "li_2".to_string(),
            path: String::new(),
            title: "Dune".to_string(),
            author: "Frank Herbert".to_string(),
            series: None,
            sequence: None,
            description: Some("desc".to_string()),
            publisher: Some("Ace".to_string()),
            published_year: Some("1965".to_string()),
            isbn: Some("9780441013593".to_string()),
            asin: None,
        };
        assert!(!item.has_missing_fields());
    }

    #[test]
    fn test_patch_serializes_only_set_fields() {
        let patch = MetadataPatch {
            publisher: Some("Tor".to_string()),
            ..Default::default()
        };
        let value = serde_json::to_value(&patch).unwrap();
        assert_eq!(value, json!({ "publisher": "Tor" }));
        assert!(!patch.is_empty());
        assert!(MetadataPatch::default().is_empty());
    }
}
