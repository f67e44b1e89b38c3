//! Shared fixtures: a scripted catalog server, an in-memory cache, and
//! builders for songs and stores.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tunedeck_api::models::{SongAdditional, SongTag};
use tunedeck_api::{ApiError, CatalogClient, Criterion, ServerInfo, Song};
use tunedeck_store::{
    CacheHandle, CacheRequest, LocalCache, MemoryKv, PersistentKv, PlaybackStore, PollSettings,
};

/// Catalog server stand-in.  Albums and songs are scripted up front; failures
/// can be injected per endpoint.  Every request is appended to `calls`.
#[derive(Default)]
pub struct MockCatalogClient {
    pub albums: Vec<Criterion>,
    pub songs: HashMap<String, Vec<Song>>,
    pub fail_entry: bool,
    /// Album name whose song fetch should fail.
    pub fail_songs_for: Option<String>,
    /// `None` scripts a rejected login.
    pub login_sid: Option<String>,
    pub note: String,
    pub calls: Mutex<Vec<String>>,
}

impl MockCatalogClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_album(mut self, name: &str, artist: &str, songs: Vec<Song>) -> Self {
        self.albums.push(Criterion {
            name: name.to_string(),
            album_artist: artist.to_string(),
        });
        self.songs.insert(name.to_string(), songs);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait::async_trait]
impl CatalogClient for MockCatalogClient {
    async fn login(&self) -> Result<String, ApiError> {
        self.record("login".to_string());
        self.login_sid.clone().ok_or(ApiError::LoginFailed)
    }

    async fn fetch_entry(&self) -> Result<Vec<Criterion>, ApiError> {
        self.record("entry".to_string());
        if self.fail_entry {
            return Err(ApiError::Status(500));
        }
        Ok(self.albums.clone())
    }

    async fn fetch_songs(&self, album: &str, _artist: &str) -> Result<Vec<Song>, ApiError> {
        self.record(format!("songs:{album}"));
        if self.fail_songs_for.as_deref() == Some(album) {
            return Err(ApiError::Status(500));
        }
        Ok(self.songs.get(album).cloned().unwrap_or_default())
    }

    async fn fetch_note(&self) -> Result<String, ApiError> {
        self.record("note".to_string());
        Ok(self.note.clone())
    }

    async fn server_info(&self) -> Result<ServerInfo, ApiError> {
        self.record("info".to_string());
        Ok(ServerInfo {
            version: "1.0".to_string(),
            serial: "mock".to_string(),
        })
    }

    fn build_download_url(&self, id: &str, sid: Option<&str>) -> String {
        match sid {
            Some(sid) => format!("http://mock:5000/api/download?id={id}&sid={sid}"),
            None => format!("http://mock:5000/api/download?id={id}"),
        }
    }
}

/// In-memory cache whose contents tests flip at will.
#[derive(Default)]
pub struct MockCache {
    present: Mutex<HashSet<String>>,
}

impl MockCache {
    pub fn put(&self, key: &str) {
        self.present.lock().unwrap().insert(key.to_string());
    }
}

impl LocalCache for MockCache {
    fn exists(&self, key: &str) -> bool {
        self.present.lock().unwrap().contains(key)
    }

    fn path_for(&self, key: &str) -> PathBuf {
        PathBuf::from(format!("/cache/{key}"))
    }
}

/// Cache capability wired to a `MockCache`, handing the request receiver back
/// so tests can observe fire-and-forget cache requests.
pub fn mock_cache() -> (
    Arc<MockCache>,
    CacheHandle,
    mpsc::UnboundedReceiver<CacheRequest>,
) {
    let cache = Arc::new(MockCache::default());
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = CacheHandle::new(cache.clone(), tx);
    (cache, handle, rx)
}

pub fn song(n: u32, title: &str, album: &str) -> Song {
    Song {
        id: format!("music_{n}"),
        title: title.to_string(),
        path: format!("/music/{album}/{n:02} {title}.mp3"),
        additional: SongAdditional {
            song_tag: SongTag {
                album: album.to_string(),
            },
        },
        ..Default::default()
    }
}

/// Tight polling so cache tests finish in tens of milliseconds.
pub fn fast_poll() -> PollSettings {
    PollSettings {
        interval: Duration::from_millis(10),
        attempts: 5,
    }
}

pub fn build_store(
    client: Arc<MockCatalogClient>,
    cache: Option<CacheHandle>,
    kv: Arc<dyn PersistentKv>,
) -> PlaybackStore<MockCatalogClient> {
    init_tracing();
    PlaybackStore::new(client, cache, kv, fast_poll())
}

/// RUST_LOG-controlled logging for test debugging; safe to call repeatedly.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

pub fn memory_kv() -> Arc<MemoryKv> {
    Arc::new(MemoryKv::new())
}
