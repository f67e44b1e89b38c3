//! Local audio cache capability.
//!
//! The cache itself is a separate service (on desktop, a directory the cache
//! agent downloads into); the store only ever asks "is this key present" and
//! "where does it live".  The capability is optional — web/mobile deployments
//! construct the store without one and every cache interaction short-circuits.

use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::warn;

/// Derive the filesystem-safe cache key for a song path: every path separator
/// and every literal ".mp3" becomes an underscore.
///
/// Distinct paths can collide (e.g. after stripping the extension), which is
/// accepted — the key only addresses a local cache of the same corpus.
pub fn derive_cache_key(path: &str) -> String {
    path.replace('/', "_").replace(".mp3", "_")
}

/// Presence/location queries against the local audio cache.
pub trait LocalCache: Send + Sync {
    fn exists(&self, key: &str) -> bool;
    fn path_for(&self, key: &str) -> PathBuf;
}

/// Cache backed by a flat directory of files named by cache key.
pub struct DirCache {
    dir: PathBuf,
}

impl DirCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl LocalCache for DirCache {
    fn exists(&self, key: &str) -> bool {
        self.dir.join(key).is_file()
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(key)
    }
}

/// Fire-and-forget request to cache `url` under `key`.
#[derive(Debug, Clone)]
pub struct CacheRequest {
    pub url: String,
    pub key: String,
}

/// The store's view of the cache capability: presence/path queries plus the
/// side channel to the background caching agent.  Absent entirely on
/// deployments without a local cache.
#[derive(Clone)]
pub struct CacheHandle {
    cache: Arc<dyn LocalCache>,
    request_tx: mpsc::UnboundedSender<CacheRequest>,
}

impl CacheHandle {
    pub fn new(cache: Arc<dyn LocalCache>, request_tx: mpsc::UnboundedSender<CacheRequest>) -> Self {
        Self { cache, request_tx }
    }

    pub fn exists(&self, key: &str) -> bool {
        self.cache.exists(key)
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.cache.path_for(key)
    }

    /// Ask the caching agent to fetch `url` under `key`.  No acknowledgement
    /// is awaited; a dead agent is logged and ignored.
    pub fn request(&self, url: &str, key: &str) {
        let req = CacheRequest {
            url: url.to_string(),
            key: key.to_string(),
        };
        if self.request_tx.send(req).is_err() {
            warn!("cache agent is gone; dropping cache request for {}", key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_key_replaces_separators_and_extension() {
        assert_eq!(
            derive_cache_key("/music/Kind of Blue/03 Blue in Green.mp3"),
            "_music_Kind of Blue_03 Blue in Green_"
        );
    }

    #[test]
    fn cache_key_leaves_other_extensions_alone() {
        assert_eq!(derive_cache_key("/music/a/b.flac"), "_music_a_b.flac");
    }

    #[test]
    fn cache_key_replaces_every_mp3_occurrence() {
        assert_eq!(derive_cache_key("/m.mp3/x.mp3"), "_m__x_");
    }

    #[test]
    fn dir_cache_probes_files() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DirCache::new(dir.path());
        assert!(!cache.exists("_music_a_"));
        std::fs::write(dir.path().join("_music_a_"), b"audio").unwrap();
        assert!(cache.exists("_music_a_"));
        assert_eq!(cache.path_for("_music_a_"), dir.path().join("_music_a_"));
    }
}
