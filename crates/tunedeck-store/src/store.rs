//! The playback store.
//!
//! One `PlaybackStore` per application.  All mutation goes through its
//! methods; the UI reads snapshots and re-renders on broadcast events.  The
//! catalog map is keyed by album name and carries one reserved bucket,
//! `__cached__`, holding the songs confirmed present in the local cache.

use crate::cache::{derive_cache_key, CacheHandle};
use crate::events::StoreEvent;
use crate::persist::{PersistentKv, KEY_CRITERIA, KEY_SONGS};
use chrono::{DateTime, Local};
use rand::Rng;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use tunedeck_api::{ApiError, CatalogClient, Criterion, Song};

/// Reserved catalog key collecting the locally cached songs.
pub const CACHED_BUCKET: &str = "__cached__";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Repeat policy for next/previous navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RepeatMode {
    /// Advance through the navigation queue, wrapping past the end.
    #[default]
    RepeatAll,
    /// Stay on the current track.
    RepeatOne,
    /// Jump to a uniformly random queue position.
    Shuffle,
}

/// Cache-completion polling knobs.
#[derive(Debug, Clone, Copy)]
pub struct PollSettings {
    pub interval: Duration,
    pub attempts: u32,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(1500),
            attempts: 15,
        }
    }
}

impl PollSettings {
    pub fn from_config(cache: &tunedeck_api::config::CacheConfig) -> Self {
        Self {
            interval: Duration::from_millis(cache.poll_interval_ms),
            attempts: cache.poll_attempts,
        }
    }
}

/// Full observable state of the store.  `rev` is a monotonically increasing
/// counter incremented on every mutation; subscribers use it to detect missed
/// updates after a lagged event channel.
#[derive(Debug, Clone, Default)]
pub struct PlayerState {
    pub rev: u64,
    /// Album list, in catalog order.
    pub criteria: Vec<Criterion>,
    /// Name of the album the UI is browsing; `None` after a search.
    pub current_criterion: Option<String>,
    /// Songs per album, plus the reserved `__cached__` bucket.
    pub songs: HashMap<String, Vec<Song>>,
    /// The displayed (toggled or filtered) song list.
    pub current_songs: Vec<Song>,
    /// The navigation queue next/previous walk over.
    pub current_list: Vec<Song>,
    /// The currently selected track.
    pub song: Option<Song>,
    /// Playable URL of the current track (file:// when cached).
    pub url: String,
    /// Free-text note from the server's home screen.
    pub note: String,
    /// Guards the full-catalog fetch path.
    pub loading: bool,
    /// Guards display-queue rebuilds.
    pub listloading: bool,
    /// Session id from login, carried on download URLs.
    pub session_id: Option<String>,
    /// When the last successful full load finished.
    pub loaded_at: Option<DateTime<Local>>,
}

impl PlayerState {
    fn current_song_id(&self) -> Option<String> {
        self.song.as_ref().map(|s| s.id.clone())
    }
}

/// The state container. Generic over the catalog client so tests can script
/// the server; the cache capability and key-value store are injected once at
/// construction and never re-probed.
pub struct PlaybackStore<C: CatalogClient> {
    client: Arc<C>,
    cache: Option<CacheHandle>,
    kv: Arc<dyn PersistentKv>,
    state: Arc<RwLock<PlayerState>>,
    events: broadcast::Sender<StoreEvent>,
    /// One cache poller per song id. A new play for the same song replaces
    /// (and aborts) the stale poller; drop aborts them all.
    pollers: Arc<Mutex<HashMap<String, JoinHandle<()>>>>,
    poll: PollSettings,
}

impl<C: CatalogClient> PlaybackStore<C> {
    /// Build the store, seeding the catalog from the persisted copy.
    pub fn new(
        client: Arc<C>,
        cache: Option<CacheHandle>,
        kv: Arc<dyn PersistentKv>,
        poll: PollSettings,
    ) -> Self {
        let criteria: Vec<Criterion> = kv
            .get(KEY_CRITERIA)
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default();
        let songs: HashMap<String, Vec<Song>> = kv
            .get(KEY_SONGS)
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default();

        let state = PlayerState {
            rev: 1,
            criteria,
            songs,
            loading: true,
            ..Default::default()
        };

        let (events, _) = broadcast::channel(64);
        Self {
            client,
            cache,
            kv,
            state: Arc::new(RwLock::new(state)),
            events,
            pollers: Arc::new(Mutex::new(HashMap::new())),
            poll,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    pub async fn snapshot(&self) -> PlayerState {
        self.state.read().await.clone()
    }

    fn emit(&self, event: StoreEvent) {
        let _ = self.events.send(event);
    }

    fn notify_error(&self, message: String) {
        warn!("{}", message);
        self.emit(StoreEvent::Error { message });
    }

    fn persist_json<T: Serialize>(&self, key: &str, value: &T) {
        match serde_json::to_string(value) {
            Ok(json) => self.kv.set(key, &json),
            Err(e) => warn!("not persisting {}: {}", key, e),
        }
    }

    fn lock_pollers(&self) -> MutexGuard<'_, HashMap<String, JoinHandle<()>>> {
        match self.pollers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Load the catalog.  When both the album list and the song map are
    /// already populated (from the persisted copy), skips the network and
    /// only recomputes cache-derived fields.  Otherwise fetches the album
    /// list, then the songs of every album strictly one at a time in catalog
    /// order; the first failure aborts the remaining albums but keeps what
    /// already arrived in memory.
    ///
    /// Calls are not deduplicated — don't invoke while `loading` is set.
    pub async fn load_catalog(&self) -> Result<(), StoreError> {
        {
            let mut state = self.state.write().await;
            state.loading = true;
            state.rev += 1;
        }

        let result = self.load_catalog_inner().await;

        {
            let mut state = self.state.write().await;
            state.loading = false;
            state.rev += 1;
        }

        match result {
            Ok(()) => {
                self.emit(StoreEvent::CatalogLoaded);
                Ok(())
            }
            Err(e) => {
                self.notify_error(format!("catalog load failed: {}", e));
                Err(e)
            }
        }
    }

    async fn load_catalog_inner(&self) -> Result<(), StoreError> {
        let warm = {
            let state = self.state.read().await;
            !state.criteria.is_empty() && !state.songs.is_empty()
        };
        if warm {
            debug!("catalog already present; recomputing cache status only");
            self.recompute_cache_status().await;
            return Ok(());
        }

        let albums = self.client.fetch_entry().await?;
        if albums.is_empty() {
            info!("server returned an empty album list");
            return Ok(());
        }
        info!("loading catalog: {} albums", albums.len());

        {
            let mut state = self.state.write().await;
            state.criteria = albums.clone();
            state.rev += 1;
        }
        self.persist_json(KEY_CRITERIA, &albums);

        for album in &albums {
            let songs = self
                .client
                .fetch_songs(&album.name, &album.album_artist)
                .await?;
            if !songs.is_empty() {
                let mut state = self.state.write().await;
                state.songs.insert(album.name.clone(), songs);
                state.rev += 1;
            }
        }

        let full_map = {
            let mut state = self.state.write().await;
            state.loaded_at = Some(Local::now());
            state.songs.clone()
        };
        self.persist_json(KEY_SONGS, &full_map);

        self.recompute_cache_status().await;
        Ok(())
    }

    /// Recompute the cache-derived fields of every song: download URL, the
    /// `cached` flag, and the reserved `__cached__` bucket (rebuilt wholesale
    /// from the hits).  `playing` flags are reset.
    pub async fn recompute_cache_status(&self) {
        let mut state = self.state.write().await;
        let mut cached_bucket = Vec::new();

        let buckets: Vec<String> = state
            .songs
            .keys()
            .filter(|k| k.as_str() != CACHED_BUCKET)
            .cloned()
            .collect();

        for bucket in buckets {
            if let Some(songs) = state.songs.get_mut(&bucket) {
                for song in songs.iter_mut() {
                    let key = derive_cache_key(&song.path);
                    let is_cached = self
                        .cache
                        .as_ref()
                        .map(|c| c.exists(&key))
                        .unwrap_or(false);
                    song.url = self.client.build_download_url(&song.id, None);
                    song.playing = false;
                    song.cached = is_cached;
                    if is_cached {
                        cached_bucket.push(song.clone());
                    }
                }
            }
        }

        debug!("cache recompute: {} songs cached", cached_bucket.len());
        state.songs.insert(CACHED_BUCKET.to_string(), cached_bucket);
        state.rev += 1;
    }

    /// Drop the catalog (memory and persisted copy) and re-fetch from the
    /// network.  A fetch failure right after leaves both persisted keys
    /// absent — the previous copy is not restored.
    pub async fn reload(&self) -> Result<(), StoreError> {
        {
            let mut state = self.state.write().await;
            state.loading = true;
            state.criteria.clear();
            state.songs.clear();
            state.rev += 1;
        }
        self.kv.remove(KEY_CRITERIA);
        self.kv.remove(KEY_SONGS);
        self.load_catalog().await
    }

    /// Make `criterion` the browsed album and copy its songs into the display
    /// queue, marking the entry matching the current track.  An unknown
    /// criterion leaves the display queue empty.
    pub async fn toggle(&self, criterion: &str) {
        {
            let mut state = self.state.write().await;
            state.listloading = true;
            state.current_songs.clear();
            state.current_criterion = Some(criterion.to_string());

            let current_id = state.current_song_id();
            if let Some(bucket) = state.songs.get(criterion) {
                let mut queue = bucket.clone();
                for song in &mut queue {
                    song.playing = current_id.as_deref() == Some(song.id.as_str());
                }
                state.current_songs = queue;
            }

            state.listloading = false;
            state.rev += 1;
        }
        self.emit(StoreEvent::QueueChanged);
    }

    /// Select `song` for playback.  When user-initiated (double-click on a
    /// list row), the display queue becomes the navigation queue; automatic
    /// advancement keeps the previous one.  Resolves the playable URL, and
    /// when the track isn't cached yet but a cache capability is present,
    /// requests background caching and starts polling for completion.
    pub async fn play(&self, song: &Song, user_initiated: bool) {
        let session_id = {
            let mut state = self.state.write().await;
            state.song = Some(song.clone());
            if user_initiated {
                state.current_list = state.current_songs.clone();
            }
            for entry in &mut state.current_songs {
                entry.playing = entry.id == song.id;
            }
            state.session_id.clone()
        };

        let key = derive_cache_key(&song.path);
        let url = match &self.cache {
            Some(handle) if handle.exists(&key) => {
                format!("file://{}", handle.path_for(&key).display())
            }
            Some(handle) => {
                let url = self
                    .client
                    .build_download_url(&song.id, session_id.as_deref());
                handle.request(&url, &key);
                self.spawn_cache_poll(song.clone(), key, handle.clone());
                url
            }
            None => self
                .client
                .build_download_url(&song.id, session_id.as_deref()),
        };

        {
            let mut state = self.state.write().await;
            state.url = url;
            state.rev += 1;
        }
        self.emit(StoreEvent::TrackChanged {
            id: song.id.clone(),
        });
    }

    /// Poll the cache until `song` shows up or the attempt budget runs out.
    /// On the first hit the album entry, the display-queue entry and the
    /// reserved bucket are updated together.  Timeout is silent; the song
    /// just stays uncached.
    fn spawn_cache_poll(&self, song: Song, key: String, handle: CacheHandle) {
        let state = Arc::clone(&self.state);
        let events = self.events.clone();
        let poll = self.poll;
        let id = song.id.clone();

        let task = tokio::spawn(async move {
            let mut attempts = 0u32;
            loop {
                tokio::time::sleep(poll.interval).await;
                attempts += 1;

                if handle.exists(&key) {
                    let mut st = state.write().await;
                    let album = song.album().to_string();
                    if let Some(bucket) = st.songs.get_mut(&album) {
                        if let Some(entry) = bucket.iter_mut().find(|s| s.id == song.id) {
                            entry.cached = true;
                        }
                    }
                    for entry in &mut st.current_songs {
                        if entry.id == song.id {
                            entry.cached = true;
                        }
                    }
                    st.songs
                        .entry(CACHED_BUCKET.to_string())
                        .or_default()
                        .push(song.clone());
                    st.rev += 1;
                    drop(st);

                    debug!("cache poll: {} present after {} attempts", song.id, attempts);
                    let _ = events.send(StoreEvent::SongCached {
                        id: song.id.clone(),
                    });
                    break;
                }

                if attempts >= poll.attempts {
                    debug!("cache poll: giving up on {} after {} attempts", song.id, attempts);
                    break;
                }
            }
        });

        let mut pollers = self.lock_pollers();
        pollers.retain(|_, t| !t.is_finished());
        if let Some(stale) = pollers.insert(id, task) {
            stale.abort();
        }
    }

    /// Cache pollers currently tracked.  Finished ones are pruned when the
    /// next poll starts.
    pub fn pending_cache_polls(&self) -> usize {
        self.lock_pollers().len()
    }

    /// Advance the navigation queue.  Wraps past the end back to index 0.
    pub async fn play_next(&self, mode: RepeatMode) {
        let next = {
            let state = self.state.read().await;
            let Some(current_id) = state.current_song_id() else {
                return;
            };
            if state.current_list.is_empty() {
                return;
            }
            match mode {
                RepeatMode::RepeatOne => return,
                RepeatMode::Shuffle => {
                    let idx = rand::thread_rng().gen_range(0..state.current_list.len());
                    state.current_list[idx].clone()
                }
                RepeatMode::RepeatAll => {
                    let found = state
                        .current_list
                        .iter()
                        .position(|s| s.id == current_id)
                        .map(|i| i as isize)
                        .unwrap_or(-1);
                    let mut idx = found + 1;
                    if idx as usize >= state.current_list.len() {
                        idx = 0;
                    }
                    state.current_list[idx as usize].clone()
                }
            }
        };
        self.play(&next, false).await;
    }

    /// Step the navigation queue backwards.  Clamps at index 0 rather than
    /// wrapping, unlike `play_next`.
    pub async fn play_previous(&self, mode: RepeatMode) {
        let previous = {
            let state = self.state.read().await;
            let Some(current_id) = state.current_song_id() else {
                return;
            };
            if state.current_list.is_empty() {
                return;
            }
            match mode {
                RepeatMode::RepeatOne => return,
                RepeatMode::Shuffle => {
                    let idx = rand::thread_rng().gen_range(0..state.current_list.len());
                    state.current_list[idx].clone()
                }
                RepeatMode::RepeatAll => {
                    let found = state
                        .current_list
                        .iter()
                        .position(|s| s.id == current_id)
                        .map(|i| i as isize)
                        .unwrap_or(-1);
                    let idx = (found - 1).max(0);
                    state.current_list[idx as usize].clone()
                }
            }
        };
        self.play(&previous, false).await;
    }

    /// Replace the display queue with every song whose title contains
    /// `keyword` (case-sensitive), searching the whole catalog including the
    /// reserved bucket.  An empty keyword keeps the previous results.
    pub async fn search(&self, keyword: &str) {
        if keyword.is_empty() {
            return;
        }
        {
            let mut state = self.state.write().await;
            state.listloading = true;

            let current_id = state.current_song_id();
            let mut buckets: Vec<String> =
                state.criteria.iter().map(|c| c.name.clone()).collect();
            buckets.push(CACHED_BUCKET.to_string());

            let mut results = Vec::new();
            for bucket in buckets {
                if let Some(songs) = state.songs.get(&bucket) {
                    for song in songs {
                        if song.title.contains(keyword) {
                            let mut hit = song.clone();
                            hit.playing = current_id.as_deref() == Some(hit.id.as_str());
                            results.push(hit);
                        }
                    }
                }
            }

            debug!("search {:?}: {} hits", keyword, results.len());
            state.current_songs = results;
            state.current_criterion = None;
            state.listloading = false;
            state.rev += 1;
        }
        self.emit(StoreEvent::QueueChanged);
    }

    /// Authenticate against the server and remember the session id.
    pub async fn login(&self) -> Result<(), StoreError> {
        {
            let mut state = self.state.write().await;
            state.loading = true;
            state.rev += 1;
        }

        let result = self.client.login().await;

        let mut state = self.state.write().await;
        state.loading = false;
        state.rev += 1;
        match result {
            Ok(sid) => {
                state.session_id = Some(sid);
                drop(state);
                self.emit(StoreEvent::LoggedIn);
                Ok(())
            }
            Err(e) => {
                drop(state);
                self.notify_error(format!("login failed: {}", e));
                Err(e.into())
            }
        }
    }

    /// Fetch the server's home-screen note.
    pub async fn load_note(&self) -> Result<(), StoreError> {
        let note = match self.client.fetch_note().await {
            Ok(note) => note,
            Err(e) => {
                self.notify_error(format!("note fetch failed: {}", e));
                return Err(e.into());
            }
        };
        {
            let mut state = self.state.write().await;
            state.note = note;
            state.rev += 1;
        }
        self.emit(StoreEvent::NoteLoaded);
        Ok(())
    }
}

impl<C: CatalogClient> Drop for PlaybackStore<C> {
    fn drop(&mut self) {
        let mut pollers = self.lock_pollers();
        for (_, task) in pollers.drain() {
            task.abort();
        }
    }
}
