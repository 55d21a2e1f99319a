use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub abs_base_url: String,
    pub abs_api_token: String,
    pub abs_library_id: String,

    pub qbittorrent_url: String,
    pub qbittorrent_username: String,
    pub qbittorrent_password: String,
    pub qbittorrent_category: Option<String>,

    pub prowlarr_url: Option<String>,
    pub prowlarr_api_key: Option<String>,

    pub mam_base_url: String,
    /// Long-lived mam_id session cookie; pasted from a browser session
    pub mam_session_cookie: String,

    pub goodreads_base_url: String,
    /// Goodreads numeric author ids, keyed by display name
    pub goodreads_author_ids: Vec<GoodreadsAuthor>,

    pub google_books_api_key: Option<String>,

    /// Authors whose catalogs get hunted
    pub favorite_authors: Vec<String>,

    pub match_threshold: f64,
    pub max_snatches_per_run: usize,
    pub enrich_workers: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoodreadsAuthor {
    pub name: String,
    pub author_id: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            abs_base_url: "http://localhost:13378".to_string(),
            abs_api_token: String::new(),
            abs_library_id: String::new(),
            qbittorrent_url: "http://localhost:8080".to_string(),
            qbittorrent_username: "admin".to_string(),
            qbittorrent_password: String::new(),
            qbittorrent_category: Some("audiobooks".to_string()),
            prowlarr_url: None,
            prowlarr_api_key: None,
            mam_base_url: "https://www.myanonamouse.net".to_string(),
            mam_session_cookie: String::new(),
            goodreads_base_url: "https://www.goodreads.com".to_string(),
            goodreads_author_ids: Vec::new(),
            google_books_api_key: None,
            favorite_authors: Vec::new(),
            match_threshold: crate::matching::DEFAULT_THRESHOLD,
            max_snatches_per_run: 20,
            enrich_workers: 8,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path)
                .with_context(|| format!("reading {}", config_path.display()))?;
            let config: Config = serde_json::from_str(&contents)
                .with_context(|| format!("parsing {}", config_path.display()))?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&config_path, json)
            .with_context(|| format!("writing {}", config_path.display()))?;

        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let base = dirs::config_dir().context("could not determine config directory")?;
        Ok(base.join("bookhound").join("config.json"))
    }

    /// Data directory for the history database and sled cache.
    pub fn data_dir() -> Result<PathBuf> {
        let base = dirs::data_dir().context("could not determine data directory")?;
        Ok(base.join("bookhound"))
    }

    /// Copy with secrets blanked, for `config show`.
    pub fn redacted(&self) -> Config {
        let mut copy = self.clone();
        let redact = |s: &mut String| {
            if !s.is_empty() {
                *s = "<redacted>".to_string();
            }
        };
        redact(&mut copy.abs_api_token);
        redact(&mut copy.qbittorrent_password);
        redact(&mut copy.mam_session_cookie);
        if copy.prowlarr_api_key.is_some() {
            copy.prowlarr_api_key = Some("<redacted>".to_string());
        }
        if copy.google_books_api_key.is_some() {
            copy.google_books_api_key = Some("<redacted>".to_string());
        }
        copy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_roundtrip() {
        let config = Config::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(back.abs_base_url, config.abs_base_url);
        assert_eq!(back.max_snatches_per_run, 20);
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let back: Config = serde_json::from_str(r#"{"abs_api_token": "tok"}"#).unwrap();
        assert_eq!(back.abs_api_token, "tok");
        assert_eq!(back.match_threshold, crate::matching::DEFAULT_THRESHOLD);
    }

    #[test]
    fn test_redacted_blanks_secrets() {
        let mut config = Config::default();
        config.abs_api_token = "secret".to_string();
        config.google_books_api_key = Some("key".to_string());
        let redacted = config.redacted();
        assert_eq!(redacted.abs_api_token, "<redacted>");
        assert_eq!(redacted.google_books_api_key.as_deref(), Some("<redacted>"));
    }
}
