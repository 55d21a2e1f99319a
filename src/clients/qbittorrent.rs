//! qBittorrent WebUI v2 client.
//!
//! Auth is cookie-based: a successful login sets a SID cookie on the shared
//! cookie store, which later calls reuse. The login endpoint answers 200
//! with a literal "Ok." body on success and "Fails." on bad credentials.

use serde::Deserialize;
use tokio::sync::OnceCell;

use super::{error_for_status, ClientError, ClientResult};
use crate::config::Config;

#[derive(Debug, Clone, Deserialize)]
pub struct TorrentInfo {
    pub hash: String,
    pub name: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub progress: f64,
    pub state: String,
}

pub struct QbittorrentClient {
    client: reqwest::Client,
    base_url: String,
    username: String,
    password: String,
    logged_in: OnceCell<()>,
}

impl QbittorrentClient {
    pub fn new(client: reqwest::Client, config: &Config) -> Self {
        Self {
            client,
            base_url: config.qbittorrent_url.trim_end_matches('/').to_string(),
            username: config.qbittorrent_username.clone(),
            password: config.qbittorrent_password.clone(),
            logged_in: OnceCell::new(),
        }
    }

    async fn ensure_login(&self) -> ClientResult<()> {
        self.logged_in
            .get_or_try_init(|| async {
                let url = format!("{}/api/v2/auth/login", self.base_url);
                let response = self
                    .client
                    .post(&url)
                    .form(&[
                        ("username", self.username.as_str()),
                        ("password", self.password.as_str()),
                    ])
                    .send()
                    .await?;
                let response = error_for_status(response).await?;
                let body = response.text().await?;
                if body.trim() != "Ok." {
                    return Err(ClientError::Auth(format!(
                        "qBittorrent login rejected: {}",
                        body.trim()
                    )));
                }
                log::debug!("qbittorrent login ok");
                Ok(())
            })
            .await
            .map(|_| ())
    }

    pub async fn version(&self) -> ClientResult<String> {
        self.ensure_login().await?;
        let url = format!("{}/api/v2/app/version", self.base_url);
        let response = self.client.get(&url).send().await?;
        let response = error_for_status(response).await?;
        Ok(response.text().await?.trim().to_string())
    }

    /// Add a torrent by its download URL (magnet or http).
    pub async fn add_torrent_url(&self, url: &str, category: Option<&str>) -> ClientResult<()> {
        self.ensure_login().await?;

        let mut form = reqwest::multipart::Form::new()
            .text("urls", url.to_string())
            .text("paused", "false");
        if let Some(category) = category {
            form = form.text("category", category.to_string());
        }

        self.post_add(form).await
    }

    /// Add a torrent from raw .torrent bytes (private-tracker downloads go
    /// through the indexer first).
    pub async fn add_torrent_bytes(
        &self,
        bytes: Vec<u8>,
        name: &str,
        category: Option<&str>,
    ) -> ClientResult<()> {
        self.ensure_login().await?;

        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(format!("{}.torrent", name))
            .mime_str("application/x-bittorrent")
            .map_err(|e| ClientError::Parse(e.to_string()))?;
        let mut form = reqwest::multipart::Form::new()
            .part("torrents", part)
            .text("paused", "false");
        if let Some(category) = category {
            form = form.text("category", category.to_string());
        }

        self.post_add(form).await
    }

    async fn post_add(&self, form: reqwest::multipart::Form) -> ClientResult<()> {
        let url = format!("{}/api/v2/torrents/add", self.base_url);
        let response = self.client.post(&url).multipart(form).send().await?;
        let response = error_for_status(response).await?;

        let body = response.text().await?;
        if body.to_lowercase().contains("fail") {
            return Err(ClientError::Api {
                status: 200,
                message: body,
            });
        }
        Ok(())
    }

    /// Torrents currently known to qBittorrent, optionally filtered by
    /// category. Used to skip titles already downloading.
    pub async fn list_torrents(&self, category: Option<&str>) -> ClientResult<Vec<TorrentInfo>> {
        self.ensure_login().await?;

        let mut url = format!("{}/api/v2/torrents/info", self.base_url);
        if let Some(category) = category {
            url.push_str(&format!("?category={}", urlencoding::encode(category)));
        }

        let response = self.client.get(&url).send().await?;
        let response = error_for_status(response).await?;
        Ok(response.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_torrent_info_parses_qbittorrent_shape() {
        let torrents: Vec<TorrentInfo> = serde_json::from_str(
            r#"[{"hash":"abc123","name":"The Hobbit [M4B]","category":"audiobooks",
                 "progress":0.42,"state":"downloading","extra_field":1}]"#,
        )
        .unwrap();
        assert_eq!(torrents.len(), 1);
        assert_eq!(torrents[0].category, "audiobooks");
        assert!(torrents[0].progress > 0.4);
    }
}
