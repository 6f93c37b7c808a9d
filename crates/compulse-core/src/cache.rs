use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Result;

const ENTRY_EXTENSION: &str = "json";

/// One persisted dataset payload and the time it was fetched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    pub fetched_at: DateTime<Utc>,
    pub payload: T,
}

impl<T> CacheEntry<T> {
    pub fn is_fresh(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.fetched_at) < ttl
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStatus {
    pub key: String,
    /// `None` when the entry could not be read
    pub fetched_at: Option<DateTime<Utc>>,
    pub size_bytes: u64,
}

/// File-backed cache with one JSON document per dataset key.
///
/// Entries expire lazily: a read older than the caller's TTL is a miss, but
/// nothing is deleted. Unreadable or corrupt entries are also misses. Writes
/// go to a temporary file in the same directory and are renamed into place,
/// so readers never observe a partially written entry.
#[derive(Debug, Clone)]
pub struct SourceCache {
    dir: PathBuf,
}

impl SourceCache {
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let safe: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{safe}.{ENTRY_EXTENSION}"))
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str, ttl: Duration) -> Option<T> {
        self.get_at(key, ttl, Utc::now()).await
    }

    pub async fn get_at<T: DeserializeOwned>(
        &self,
        key: &str,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Option<T> {
        self.get_entry_at(key, ttl, now)
            .await
            .map(|entry| entry.payload)
    }

    /// Like [`SourceCache::get_at`], keeping the fetch time alongside the
    /// payload.
    pub async fn get_entry_at<T: DeserializeOwned>(
        &self,
        key: &str,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Option<CacheEntry<T>> {
        let entry: CacheEntry<T> = self.read_entry(key).await?;

        if entry.is_fresh(ttl, now) {
            tracing::debug!("Cache hit for {} (fetched {})", key, entry.fetched_at);
            Some(entry)
        } else {
            tracing::debug!("Cache entry for {} expired (fetched {})", key, entry.fetched_at);
            None
        }
    }

    async fn read_entry<T: DeserializeOwned>(&self, key: &str) -> Option<CacheEntry<T>> {
        let path = self.path_for(key);

        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!("Cache entry {} unreadable, treating as miss: {}", key, e);
                return None;
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!("Cache entry {} is corrupt, treating as miss: {}", key, e);
                None
            }
        }
    }

    pub async fn put<T: Serialize + Sync>(&self, key: &str, payload: &T) -> Result<()> {
        self.put_fetched_at(key, payload, Utc::now()).await
    }

    /// Store `payload` as if it had been fetched at `fetched_at`.
    pub async fn put_fetched_at<T: Serialize + Sync>(
        &self,
        key: &str,
        payload: &T,
        fetched_at: DateTime<Utc>,
    ) -> Result<()> {
        let entry = CacheEntry {
            fetched_at,
            payload,
        };
        let bytes = serde_json::to_vec(&entry)?;

        let path = self.path_for(key);
        let tmp = self.dir.join(format!(".{}.{}.tmp", key_stem(&path), Uuid::new_v4()));

        let stored = match tokio::fs::write(&tmp, &bytes).await {
            Ok(()) => tokio::fs::rename(&tmp, &path).await,
            Err(e) => Err(e),
        };
        if let Err(e) = stored {
            discard_temp(&tmp).await;
            return Err(e.into());
        }

        tracing::debug!("Cached {} ({} bytes)", key, bytes.len());
        Ok(())
    }

    /// Remove one entry. Returns whether anything was removed.
    pub async fn invalidate(&self, key: &str) -> Result<bool> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove every entry. Returns how many were removed.
    pub async fn clear(&self) -> Result<usize> {
        let mut removed = 0;
        for path in self.entry_paths().await? {
            tokio::fs::remove_file(&path).await?;
            removed += 1;
        }
        Ok(removed)
    }

    pub async fn status(&self) -> Result<Vec<CacheStatus>> {
        let mut statuses = Vec::new();

        for path in self.entry_paths().await? {
            let key = key_stem(&path);
            let size_bytes = tokio::fs::metadata(&path).await.map(|m| m.len()).unwrap_or(0);
            let fetched_at = self
                .read_entry::<serde_json::Value>(&key)
                .await
                .map(|entry| entry.fetched_at);

            statuses.push(CacheStatus {
                key,
                fetched_at,
                size_bytes,
            });
        }

        statuses.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(statuses)
    }

    async fn entry_paths(&self) -> Result<Vec<PathBuf>> {
        let mut paths = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_entry = path.extension().is_some_and(|ext| ext == ENTRY_EXTENSION)
                && !key_stem(&path).starts_with('.');
            if path.is_file() && is_entry {
                paths.push(path);
            }
        }

        Ok(paths)
    }
}

/// Best-effort removal of a half-written temp file.
async fn discard_temp(tmp: &Path) {
    if let Err(e) = tokio::fs::remove_file(tmp).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!("Could not remove temp file {}: {}", tmp.display(), e);
        }
    }
}

fn key_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn cache() -> (TempDir, SourceCache) {
        let tmp = TempDir::new().unwrap();
        let cache = SourceCache::open(tmp.path().join("cache")).await.unwrap();
        (tmp, cache)
    }

    #[tokio::test]
    async fn test_missing_entry_is_miss() {
        let (_tmp, cache) = cache().await;
        let hit: Option<Vec<String>> = cache.get("identity_registry", Duration::days(7)).await;
        assert!(hit.is_none());
    }

    #[tokio::test]
    async fn test_fresh_entry_is_hit() {
        let (_tmp, cache) = cache().await;
        let payload = vec!["NVIDIA CORP".to_string()];
        let fetched = Utc::now() - Duration::hours(1);
        cache.put_fetched_at("identity_registry", &payload, fetched).await.unwrap();

        let hit: Option<Vec<String>> = cache.get("identity_registry", Duration::days(7)).await;
        assert_eq!(hit, Some(payload));
    }

    #[tokio::test]
    async fn test_expired_entry_is_miss() {
        let (_tmp, cache) = cache().await;
        let fetched = Utc::now() - Duration::days(8);
        cache.put_fetched_at("identity_registry", &vec![1, 2, 3], fetched).await.unwrap();

        let hit: Option<Vec<i32>> = cache.get("identity_registry", Duration::days(7)).await;
        assert!(hit.is_none());
    }

    #[tokio::test]
    async fn test_ttl_boundary_is_miss() {
        let (_tmp, cache) = cache().await;
        let now = Utc::now();
        cache.put_fetched_at("k", &1, now - Duration::days(7)).await.unwrap();

        assert_eq!(cache.get_at::<i32>("k", Duration::days(7), now).await, None);
        assert_eq!(
            cache.get_at::<i32>("k", Duration::days(7), now - Duration::seconds(1)).await,
            Some(1)
        );
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_miss() {
        let (_tmp, cache) = cache().await;
        tokio::fs::write(cache.path_for("identity_registry"), b"{\"fetched_at\": \"not")
            .await
            .unwrap();

        let hit: Option<serde_json::Value> = cache.get("identity_registry", Duration::days(7)).await;
        assert!(hit.is_none());
    }

    #[tokio::test]
    async fn test_wrong_payload_shape_is_miss() {
        let (_tmp, cache) = cache().await;
        cache.put("k", &"a string").await.unwrap();

        let hit: Option<Vec<u32>> = cache.get("k", Duration::days(1)).await;
        assert!(hit.is_none());
    }

    #[tokio::test]
    async fn test_put_leaves_no_temp_files() {
        let (_tmp, cache) = cache().await;
        cache.put("a", &1).await.unwrap();
        cache.put("a", &2).await.unwrap();

        let mut names = Vec::new();
        let mut entries = tokio::fs::read_dir(cache.dir()).await.unwrap();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        assert_eq!(names, vec!["a.json".to_string()]);
        assert_eq!(cache.get::<i32>("a", Duration::days(1)).await, Some(2));
    }

    #[tokio::test]
    async fn test_keys_are_sanitized() {
        let (_tmp, cache) = cache().await;
        cache.put("../escape/attempt", &1).await.unwrap();

        assert!(cache.path_for("../escape/attempt").starts_with(cache.dir()));
        assert_eq!(cache.get::<i32>("../escape/attempt", Duration::days(1)).await, Some(1));
    }

    #[tokio::test]
    async fn test_status_invalidate_and_clear() {
        let (_tmp, cache) = cache().await;
        cache.put("b", &"two").await.unwrap();
        cache.put("a", &"one").await.unwrap();
        tokio::fs::write(cache.path_for("broken"), b"garbage").await.unwrap();

        let status = cache.status().await.unwrap();
        let keys: Vec<&str> = status.iter().map(|s| s.key.as_str()).collect();
        assert_eq!(keys, vec!["a", "b", "broken"]);
        assert!(status[0].fetched_at.is_some());
        assert!(status[2].fetched_at.is_none());

        assert!(cache.invalidate("a").await.unwrap());
        assert!(!cache.invalidate("a").await.unwrap());
        assert_eq!(cache.clear().await.unwrap(), 2);
        assert!(cache.status().await.unwrap().is_empty());
    }

    fn leftover_temp_files(dir: &Path) -> Vec<String> {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name.ends_with(".tmp"))
            .collect()
    }

    #[tokio::test]
    async fn test_failed_store_leaves_no_temp_file() {
        let (_tmp, cache) = cache().await;
        // a non-empty directory where the entry file should go makes the rename fail
        let blocked = cache.dir().join("identity_registry.json");
        std::fs::create_dir_all(blocked.join("inner")).unwrap();

        let result = cache.put("identity_registry", &vec![1, 2, 3]).await;

        assert!(result.is_err());
        assert!(leftover_temp_files(cache.dir()).is_empty());
    }

    #[tokio::test]
    async fn test_failed_write_leaves_no_temp_file() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("cache");
        let cache = SourceCache::open(&dir).await.unwrap();
        std::fs::remove_dir(&dir).unwrap();

        let result = cache.put("identity_registry", &vec![1, 2, 3]).await;

        assert!(result.is_err());
        assert!(!dir.exists());
        assert!(leftover_temp_files(tmp.path()).is_empty());
    }
}
