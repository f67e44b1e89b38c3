//! tunedeck-store — the playback state container.
//!
//! Holds the catalog (songs grouped by album), the display and navigation
//! queues, the currently playing track, and local-cache bookkeeping.  A UI
//! layer drives it through its async methods and re-renders on the events it
//! broadcasts; it never talks to the server or the cache directly.

pub mod agent;
pub mod cache;
pub mod events;
pub mod persist;
pub mod store;

pub use agent::spawn_cache_agent;
pub use cache::{derive_cache_key, CacheHandle, CacheRequest, DirCache, LocalCache};
pub use events::StoreEvent;
pub use persist::{JsonFileKv, MemoryKv, PersistentKv, KEY_CRITERIA, KEY_SONGS};
pub use store::{PlaybackStore, PlayerState, PollSettings, RepeatMode, StoreError, CACHED_BUCKET};
