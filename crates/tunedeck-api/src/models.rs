use serde::{Deserialize, Serialize};

/// A browsing bucket the catalog is grouped under — in practice an album.
/// The server may attach more fields; unknown ones are ignored.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Criterion {
    pub name: String,
    #[serde(default)]
    pub album_artist: String,
}

/// Album tag block nested under `Song::additional`.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct SongTag {
    #[serde(default)]
    pub album: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct SongAdditional {
    #[serde(default)]
    pub song_tag: SongTag,
}

/// One catalog entry.  `id` is the stable server-side key; `path` is the
/// server filesystem path the cache key is derived from.
///
/// `playing`, `cached` and `url` are client-side fields the store maintains;
/// they default so raw API payloads (which omit them) still deserialize, and
/// they round-trip through the persisted catalog.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Song {
    pub id: String,
    pub title: String,
    pub path: String,
    #[serde(default)]
    pub additional: SongAdditional,
    #[serde(default)]
    pub playing: bool,
    #[serde(default)]
    pub cached: bool,
    #[serde(default)]
    pub url: String,
}

impl Song {
    /// Album this song belongs to, per its tag block.
    pub fn album(&self) -> &str {
        &self.additional.song_tag.album
    }
}

/// Server identity block returned by `/api/info`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ServerInfo {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub serial: String,
}

/// Every endpoint wraps its payload in this envelope.
#[derive(Debug, Deserialize)]
pub struct ApiEnvelope<T> {
    #[serde(default)]
    pub success: bool,
    pub data: Option<T>,
}

/// Payload of `/api/entry`.
#[derive(Debug, Deserialize)]
pub struct EntryData {
    #[serde(default)]
    pub albums: Vec<Criterion>,
}

/// Payload of `/api/songs`.
#[derive(Debug, Deserialize)]
pub struct SongsData {
    #[serde(default)]
    pub songs: Vec<Song>,
}

/// Payload of `/api/login`.
#[derive(Debug, Deserialize)]
pub struct LoginData {
    pub sid: String,
}
