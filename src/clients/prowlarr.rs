//! Prowlarr search client, used as the release source when a title has no
//! direct MAM hit.

use serde::Deserialize;

use super::{error_for_status, with_retry, ClientError, ClientResult};
use crate::config::Config;

/// Torznab audiobook category
pub const CATEGORY_AUDIOBOOK: u32 = 3030;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Release {
    pub title: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub seeders: Option<u32>,
    #[serde(default)]
    pub indexer_id: Option<u32>,
    #[serde(default)]
    pub indexer: Option<String>,
    #[serde(default)]
    pub download_url: Option<String>,
    #[serde(default)]
    pub magnet_url: Option<String>,
}

impl Release {
    /// Magnet first; no extra fetch and no auth involved.
    pub fn best_link(&self) -> Option<&str> {
        self.magnet_url
            .as_deref()
            .filter(|u| !u.is_empty())
            .or(self.download_url.as_deref())
    }
}

pub struct ProwlarrClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl ProwlarrClient {
    /// Returns None when Prowlarr is not configured; the hunt pipeline then
    /// falls back to MAM-only snatching.
    pub fn from_config(client: reqwest::Client, config: &Config) -> Option<Self> {
        let base_url = config.prowlarr_url.as_deref()?.trim_end_matches('/').to_string();
        let api_key = config.prowlarr_api_key.clone()?;
        Some(Self {
            client,
            base_url,
            api_key,
        })
    }

    /// Search all configured indexers, sorted by seeders descending.
    pub async fn search(&self, query: &str, categories: &[u32]) -> ClientResult<Vec<Release>> {
        let cats = categories
            .iter()
            .map(|c| c.to_string())
            .collect::<Vec<_>>()
            .join(",");
        let url = format!(
            "{}/api/v1/search?query={}&categories={}&type=search",
            self.base_url,
            urlencoding::encode(query),
            cats
        );

        let mut releases: Vec<Release> = with_retry("prowlarr search", || {
            let client = self.client.clone();
            let url = url.clone();
            let api_key = self.api_key.clone();
            async move {
                let response = client
                    .get(&url)
                    .header("X-Api-Key", api_key)
                    .send()
                    .await?;
                let response = error_for_status(response).await?;
                Ok(response.json().await?)
            }
        })
        .await?;

        releases.sort_by(|a, b| b.seeders.unwrap_or(0).cmp(&a.seeders.unwrap_or(0)));
        log::debug!("prowlarr: {} releases for '{}'", releases.len(), query);
        Ok(releases)
    }

    /// Download a .torrent file through Prowlarr (which holds the tracker
    /// credentials).
    pub async fn download_torrent(&self, url: &str) -> ClientResult<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .header("X-Api-Key", &self.api_key)
            .send()
            .await?;
        let response = error_for_status(response).await?;
        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Err(ClientError::Parse("empty torrent file".to_string()));
        }
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_release_parses_prowlarr_shape() {
        let releases: Vec<Release> = serde_json::from_str(
            r#"[{
                "title": "The Hobbit (Unabridged) [M4B]",
                "size": 412000000,
                "seeders": 14,
                "indexerId": 2,
                "indexer": "MyAnonamouse",
                "downloadUrl": "http://prowlarr/dl/2?file=x"
            }]"#,
        )
        .unwrap();
        assert_eq!(releases[0].seeders, Some(14));
        assert_eq!(releases[0].best_link(), Some("http://prowlarr/dl/2?file=x"));
    }

    #[test]
    fn test_best_link_prefers_magnet() {
        let release = Release {
            title: String::new(),
            size: 0,
            seeders: None,
            indexer_id: None,
            indexer: None,
            download_url: Some("http://x/file.torrent".to_string()),
            magnet_url: Some("magnet:?xt=urn:btih:abc".to_string()),
        };
        assert_eq!(release.best_link(), Some("magnet:?xt=urn:btih:abc"));
    }
}
