//! Two-tier caching for auxiliary lookups
//!
//! Read-through cache used while assembling publish candidates (rewritten
//! bodies, classification data). Two tiers:
//! - Memory: fastest, bounded item count, short TTL
//! - File: persistent across invocations, longer TTL
//!
//! A file-tier hit is promoted into memory with the shorter memory TTL.
//! Expired entries are evicted lazily on read; [`Cache::sweep`] walks the
//! file tier explicitly for periodic cleanup.
//!
//! # Example
//!
//! ```rust,ignore
//! use yoyaku::cache::{Cache, CacheConfig};
//!
//! let cache = Cache::open(CacheConfig::default())?;
//! cache.set("rewrite", "d_590748", &body, chrono::Duration::hours(24), now)?;
//! let cached: Option<String> = cache.get("rewrite", "d_590748", now);
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use chrono::{DateTime, Duration, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::utils::fs::atomic_write_json;

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Directory for the file tier
    pub dir: PathBuf,

    /// Maximum entries held in the memory tier
    pub max_memory_items: usize,

    /// Memory-tier TTL cap in minutes
    pub memory_ttl_minutes: i64,

    /// Default file-tier TTL in hours (used by callers)
    pub file_ttl_hours: i64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("data/cache"),
            max_memory_items: 1000,
            memory_ttl_minutes: 30,
            file_ttl_hours: 24,
        }
    }
}

impl CacheConfig {
    /// Memory TTL cap as a chrono duration
    pub fn memory_ttl(&self) -> Duration {
        Duration::minutes(self.memory_ttl_minutes)
    }

    /// Default file TTL as a chrono duration
    pub fn file_ttl(&self) -> Duration {
        Duration::hours(self.file_ttl_hours)
    }
}

/// Memory-tier entry
struct MemoryEntry {
    value: serde_json::Value,
    expires_at: DateTime<Utc>,
}

/// File-tier entry as persisted on disk
#[derive(Debug, Serialize, Deserialize)]
struct FileEntry {
    data: serde_json::Value,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

/// Cache statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    /// Memory-tier hits
    pub memory_hits: u64,
    /// File-tier hits (promoted to memory)
    pub file_hits: u64,
    /// Misses in both tiers
    pub misses: u64,
    /// Total writes
    pub sets: u64,
}

impl CacheStats {
    /// Calculate hit rate
    pub fn hit_rate(&self) -> f64 {
        let total = self.memory_hits + self.file_hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.memory_hits + self.file_hits) as f64 / total as f64
        }
    }
}

/// Two-tier (memory + file) cache
pub struct Cache {
    config: CacheConfig,
    memory: RwLock<HashMap<String, MemoryEntry>>,
    memory_hits: AtomicU64,
    file_hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
}

impl Cache {
    /// Open the cache, creating the file-tier directory if needed
    pub fn open(config: CacheConfig) -> Result<Self> {
        fs::create_dir_all(&config.dir)?;

        tracing::debug!(dir = %config.dir.display(), "cache opened");
        Ok(Self {
            config,
            memory: RwLock::new(HashMap::new()),
            memory_hits: AtomicU64::new(0),
            file_hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            sets: AtomicU64::new(0),
        })
    }

    /// Get a value, checking memory first, then the file tier.
    ///
    /// A file hit is promoted into memory with the shorter memory TTL.
    pub fn get<T: DeserializeOwned>(
        &self,
        namespace: &str,
        key: &str,
        now: DateTime<Utc>,
    ) -> Option<T> {
        let cache_key = Self::cache_key(namespace, key);

        if let Some(value) = self.get_from_memory(&cache_key, now) {
            self.memory_hits.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(key = %cache_key, "memory cache hit");
            return serde_json::from_value(value).ok();
        }

        if let Some(entry) = self.get_from_file(namespace, key, now) {
            self.file_hits.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(key = %cache_key, "file cache hit");

            // Promote, but never past the file entry's own deadline
            let memory_deadline =
                (now + self.config.memory_ttl()).min(entry.expires_at);
            self.set_memory(&cache_key, entry.data.clone(), memory_deadline);

            return serde_json::from_value(entry.data).ok();
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(key = %cache_key, "cache miss");
        None
    }

    /// Set a value in both tiers. The memory TTL is capped below the file
    /// TTL by the configured memory cap.
    pub fn set<T: Serialize>(
        &self,
        namespace: &str,
        key: &str,
        value: &T,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let cache_key = Self::cache_key(namespace, key);
        let data = serde_json::to_value(value)?;

        self.sets.fetch_add(1, Ordering::Relaxed);

        let memory_deadline = now + ttl.min(self.config.memory_ttl());
        self.set_memory(&cache_key, data.clone(), memory_deadline);

        let entry = FileEntry {
            data,
            created_at: now,
            expires_at: now + ttl,
        };
        atomic_write_json(&self.file_path(namespace, key), &entry)?;

        tracing::trace!(key = %cache_key, ttl_secs = ttl.num_seconds(), "cache set");
        Ok(())
    }

    /// Delete a key from both tiers
    pub fn delete(&self, namespace: &str, key: &str) -> bool {
        let cache_key = Self::cache_key(namespace, key);
        let mut deleted = false;

        if let Ok(mut memory) = self.memory.write() {
            deleted |= memory.remove(&cache_key).is_some();
        }

        let path = self.file_path(namespace, key);
        if path.exists() && fs::remove_file(&path).is_ok() {
            deleted = true;
        }

        deleted
    }

    /// Clear every entry in a namespace; returns the number removed
    pub fn clear_namespace(&self, namespace: &str) -> usize {
        let mut removed = 0;
        let memory_prefix = format!("{namespace}:");
        let file_prefix = format!("{namespace}_");

        if let Ok(mut memory) = self.memory.write() {
            let keys: Vec<String> = memory
                .keys()
                .filter(|k| k.starts_with(&memory_prefix))
                .cloned()
                .collect();
            for key in keys {
                memory.remove(&key);
                removed += 1;
            }
        }

        if let Ok(entries) = fs::read_dir(&self.config.dir) {
            for entry in entries.flatten() {
                let name = entry.file_name();
                let Some(name) = name.to_str() else { continue };
                if name.starts_with(&file_prefix)
                    && name.ends_with(".json")
                    && fs::remove_file(entry.path()).is_ok()
                {
                    removed += 1;
                }
            }
        }

        tracing::info!(namespace = %namespace, removed = removed, "namespace cleared");
        removed
    }

    /// Sweep the file tier, removing expired and unreadable entries.
    /// Returns the number of files removed.
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let mut removed = 0;

        let Ok(entries) = fs::read_dir(&self.config.dir) else {
            return 0;
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }

            let expired = match crate::utils::fs::read_json::<FileEntry>(&path) {
                Ok(Some(file_entry)) => now > file_entry.expires_at,
                // Unreadable cache files are discarded
                _ => true,
            };

            if expired && fs::remove_file(&path).is_ok() {
                removed += 1;
            }
        }

        if removed > 0 {
            tracing::info!(removed = removed, "swept expired cache files");
        }
        removed
    }

    /// Get config reference
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Snapshot of hit/miss counters
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            memory_hits: self.memory_hits.load(Ordering::Relaxed),
            file_hits: self.file_hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            sets: self.sets.load(Ordering::Relaxed),
        }
    }

    // =========================================================================
    // Key generation
    // =========================================================================

    fn cache_key(namespace: &str, key: &str) -> String {
        format!("{namespace}:{key}")
    }

    /// Hash a key for a filesystem-safe file name
    pub fn hash_key(key: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    fn file_path(&self, namespace: &str, key: &str) -> PathBuf {
        self.config
            .dir
            .join(format!("{namespace}_{}.json", Self::hash_key(key)))
    }

    // =========================================================================
    // Tier internals
    // =========================================================================

    fn get_from_memory(&self, cache_key: &str, now: DateTime<Utc>) -> Option<serde_json::Value> {
        let mut memory = self.memory.write().ok()?;

        match memory.get(cache_key) {
            Some(entry) if now <= entry.expires_at => Some(entry.value.clone()),
            Some(_) => {
                // Lazy eviction of the expired entry
                memory.remove(cache_key);
                None
            }
            None => None,
        }
    }

    fn set_memory(&self, cache_key: &str, value: serde_json::Value, expires_at: DateTime<Utc>) {
        let Ok(mut memory) = self.memory.write() else {
            return;
        };

        if memory.len() >= self.config.max_memory_items && !memory.contains_key(cache_key) {
            // Evict the entry closest to expiry
            if let Some(evict) = memory
                .iter()
                .min_by_key(|(_, e)| e.expires_at)
                .map(|(k, _)| k.clone())
            {
                memory.remove(&evict);
            }
        }

        memory.insert(cache_key.to_string(), MemoryEntry { value, expires_at });
    }

    fn get_from_file(&self, namespace: &str, key: &str, now: DateTime<Utc>) -> Option<FileEntry> {
        let path = self.file_path(namespace, key);

        match crate::utils::fs::read_json::<FileEntry>(&path) {
            Ok(Some(entry)) if now <= entry.expires_at => Some(entry),
            Ok(Some(_)) => {
                // Expired file is removed lazily
                let _ = fs::remove_file(&path);
                None
            }
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "removing unreadable cache file");
                let _ = fs::remove_file(&path);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_cache() -> (tempfile::TempDir, Cache) {
        let dir = tempfile::tempdir().unwrap();
        let config = CacheConfig {
            dir: dir.path().join("cache"),
            max_memory_items: 4,
            memory_ttl_minutes: 30,
            file_ttl_hours: 24,
        };
        let cache = Cache::open(config).unwrap();
        (dir, cache)
    }

    #[test]
    fn test_set_then_get() {
        let (_dir, cache) = temp_cache();
        let now = Utc::now();

        cache
            .set("rewrite", "d_1", &"body text".to_string(), Duration::hours(1), now)
            .unwrap();

        let value: Option<String> = cache.get("rewrite", "d_1", now);
        assert_eq!(value.as_deref(), Some("body text"));

        let stats = cache.stats();
        assert_eq!(stats.sets, 1);
        assert_eq!(stats.memory_hits, 1);
    }

    #[test]
    fn test_miss_returns_none() {
        let (_dir, cache) = temp_cache();

        let value: Option<String> = cache.get("rewrite", "absent", Utc::now());
        assert!(value.is_none());
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn test_file_hit_promotes_to_memory() {
        let (_dir, cache) = temp_cache();
        let now = Utc::now();

        cache
            .set("genre", "d_2", &vec!["drama".to_string()], Duration::hours(2), now)
            .unwrap();

        // Drop the memory tier, keeping the file tier
        cache.memory.write().unwrap().clear();

        let first: Option<Vec<String>> = cache.get("genre", "d_2", now);
        assert!(first.is_some());
        assert_eq!(cache.stats().file_hits, 1);

        // Second read is served from memory
        let second: Option<Vec<String>> = cache.get("genre", "d_2", now);
        assert!(second.is_some());
        assert_eq!(cache.stats().memory_hits, 1);
    }

    #[test]
    fn test_expired_entry_is_evicted() {
        let (_dir, cache) = temp_cache();
        let now = Utc::now();

        cache
            .set("rewrite", "d_3", &"text".to_string(), Duration::minutes(10), now)
            .unwrap();

        let later = now + Duration::minutes(11);
        let value: Option<String> = cache.get("rewrite", "d_3", later);
        assert!(value.is_none());
    }

    #[test]
    fn test_memory_ttl_capped_below_file_ttl() {
        let (_dir, cache) = temp_cache();
        let now = Utc::now();

        // File TTL 24h, memory cap 30min
        cache
            .set("rewrite", "d_4", &"text".to_string(), Duration::hours(24), now)
            .unwrap();

        // Past the memory cap but before file expiry: served from the file tier
        let later = now + Duration::hours(1);
        let value: Option<String> = cache.get("rewrite", "d_4", later);
        assert!(value.is_some());
        assert_eq!(cache.stats().file_hits, 1);
    }

    #[test]
    fn test_delete() {
        let (_dir, cache) = temp_cache();
        let now = Utc::now();

        cache
            .set("rewrite", "d_5", &"text".to_string(), Duration::hours(1), now)
            .unwrap();
        assert!(cache.delete("rewrite", "d_5"));

        let value: Option<String> = cache.get("rewrite", "d_5", now);
        assert!(value.is_none());
    }

    #[test]
    fn test_clear_namespace() {
        let (_dir, cache) = temp_cache();
        let now = Utc::now();

        cache
            .set("rewrite", "d_6", &"a".to_string(), Duration::hours(1), now)
            .unwrap();
        cache
            .set("genre", "d_6", &"b".to_string(), Duration::hours(1), now)
            .unwrap();

        let removed = cache.clear_namespace("rewrite");
        assert!(removed >= 1);

        let gone: Option<String> = cache.get("rewrite", "d_6", now);
        assert!(gone.is_none());
        let kept: Option<String> = cache.get("genre", "d_6", now);
        assert!(kept.is_some());
    }

    #[test]
    fn test_sweep_removes_expired_files() {
        let (_dir, cache) = temp_cache();
        let now = Utc::now();

        cache
            .set("rewrite", "old", &"a".to_string(), Duration::minutes(5), now)
            .unwrap();
        cache
            .set("rewrite", "fresh", &"b".to_string(), Duration::hours(10), now)
            .unwrap();

        let removed = cache.sweep(now + Duration::hours(1));
        assert_eq!(removed, 1);

        let kept: Option<String> = cache.get("rewrite", "fresh", now + Duration::hours(1));
        assert!(kept.is_some());
    }

    #[test]
    fn test_memory_eviction_respects_capacity() {
        let (_dir, cache) = temp_cache();
        let now = Utc::now();

        for i in 0..10 {
            cache
                .set("ns", &format!("k{i}"), &i, Duration::hours(1), now)
                .unwrap();
        }

        let memory = cache.memory.read().unwrap();
        assert!(memory.len() <= 4);
    }

    #[test]
    fn test_hash_key_is_stable() {
        let h1 = Cache::hash_key("d_590748");
        let h2 = Cache::hash_key("d_590748");
        let h3 = Cache::hash_key("d_590749");

        assert_eq!(h1, h2);
        assert_ne!(h1, h3);
        assert_eq!(h1.len(), 64); // SHA256 hex
    }

    #[test]
    fn test_stats_hit_rate() {
        let stats = CacheStats {
            memory_hits: 60,
            file_hits: 15,
            misses: 25,
            sets: 80,
        };
        assert!((stats.hit_rate() - 0.75).abs() < 0.001);
    }
}
