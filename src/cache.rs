use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::clients::google_books::BookMetadata;

/// Cached Google Books lookup, including misses so they are not retried
/// every run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedLookup {
    pub metadata: Option<BookMetadata>,
    pub fetched_at: i64,
}

#[derive(Clone)]
pub struct LookupCache {
    db: sled::Db,
}

/// Cached misses expire after a week; new editions do show up.
const MISS_TTL_SECS: i64 = 7 * 24 * 3600;

impl LookupCache {
    pub fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let db = sled::open(dir.join("lookup_cache"))?;
        Ok(Self { db })
    }

    pub fn get(&self, title: &str, author: &str) -> Option<CachedLookup> {
        let value = self.db.get(Self::key(title, author)).ok()??;
        let cached: CachedLookup = bincode::deserialize(&value).ok()?;

        if cached.metadata.is_none() {
            let age = chrono::Utc::now().timestamp() - cached.fetched_at;
            if age > MISS_TTL_SECS {
                return None;
            }
        }
        Some(cached)
    }

    pub fn set(&self, title: &str, author: &str, metadata: Option<BookMetadata>) -> Result<()> {
        let cached = CachedLookup {
            metadata,
            fetched_at: chrono::Utc::now().timestamp(),
        };
        let value = bincode::serialize(&cached).map_err(|e| anyhow::anyhow!("{}", e))?;
        self.db.insert(Self::key(title, author), value)?;
        self.db.flush()?;
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        self.db.clear()?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.db.len()
    }

    fn key(title: &str, author: &str) -> String {
        format!(
            "{}:{}",
            crate::normalize::normalize_title(title),
            crate::normalize::normalize_author(author)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> BookMetadata {
        BookMetadata {
            title: Some("Dune".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_set_get_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let cache = LookupCache::open(dir.path()).unwrap();

        assert!(cache.get("Dune", "Frank Herbert").is_none());
        cache.set("Dune", "Frank Herbert", Some(sample())).unwrap();

        let hit = cache.get("Dune", "Frank Herbert").unwrap();
        assert_eq!(hit.metadata.unwrap().title.as_deref(), Some("Dune"));
    }

    #[test]
    fn test_key_is_normalized() {
        let dir = tempfile::tempdir().unwrap();
        let cache = LookupCache::open(dir.path()).unwrap();

        cache.set("Dune (Unabridged)", "Herbert, Frank", Some(sample())).unwrap();
        assert!(cache.get("DUNE", "Frank Herbert").is_some());
    }

    #[test]
    fn test_cached_miss_is_returned() {
        let dir = tempfile::tempdir().unwrap();
        let cache = LookupCache::open(dir.path()).unwrap();

        cache.set("Obscure Title", "Nobody", None).unwrap();
        let hit = cache.get("Obscure Title", "Nobody").unwrap();
        assert!(hit.metadata.is_none());
    }
}
