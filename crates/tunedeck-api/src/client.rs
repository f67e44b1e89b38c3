//! Catalog server client.
//!
//! `CatalogClient` is the boundary the playback store talks through; the
//! trait exists so tests can substitute a scripted server.  The real
//! implementation speaks a small GET-only JSON API where every endpoint
//! wraps its payload in a `{ success, data }` envelope.

use crate::config::ServerConfig;
use crate::error::ApiError;
use crate::models::{
    ApiEnvelope, Criterion, EntryData, LoginData, ServerInfo, Song, SongsData,
};
use serde::de::DeserializeOwned;
use tracing::debug;

/// Async boundary to the music server (allows mocking for tests).
#[async_trait::async_trait]
pub trait CatalogClient: Send + Sync {
    /// Authenticate and return the session id.
    async fn login(&self) -> Result<String, ApiError>;

    /// Fetch the album list.
    async fn fetch_entry(&self) -> Result<Vec<Criterion>, ApiError>;

    /// Fetch the songs of one album.
    async fn fetch_songs(&self, album: &str, artist: &str) -> Result<Vec<Song>, ApiError>;

    /// Fetch the free-text note shown on the home screen.
    async fn fetch_note(&self) -> Result<String, ApiError>;

    /// Fetch server identity (version, serial).
    async fn server_info(&self) -> Result<ServerInfo, ApiError>;

    /// Build the streaming/download URL for a song.  Pure; no request is made.
    fn build_download_url(&self, id: &str, sid: Option<&str>) -> String;
}

/// reqwest-backed client for a real server.
pub struct HttpCatalogClient {
    base_url: String,
    account: String,
    password: String,
    http: reqwest::Client,
}

impl HttpCatalogClient {
    pub fn new(server: &ServerConfig) -> Self {
        Self {
            // Trailing slashes would double up in endpoint paths.
            base_url: server.base_url.trim_end_matches('/').to_string(),
            account: server.account.clone(),
            password: server.password.clone(),
            http: reqwest::Client::new(),
        }
    }

    async fn get_enveloped<T: DeserializeOwned>(
        &self,
        endpoint: &'static str,
        url: String,
    ) -> Result<T, ApiError> {
        debug!("GET {}", url);
        let response = self.http.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(ApiError::Status(response.status().as_u16()));
        }
        let envelope: ApiEnvelope<T> = response.json().await?;
        if !envelope.success {
            return Err(ApiError::Rejected { endpoint });
        }
        envelope.data.ok_or(ApiError::MissingData { endpoint })
    }
}

#[async_trait::async_trait]
impl CatalogClient for HttpCatalogClient {
    async fn login(&self) -> Result<String, ApiError> {
        let url = format!(
            "{}/api/login?account={}&passwd={}",
            self.base_url,
            urlencoding::encode(&self.account),
            urlencoding::encode(&self.password),
        );
        let data: LoginData = self
            .get_enveloped("login", url)
            .await
            .map_err(|e| match e {
                ApiError::Rejected { .. } | ApiError::MissingData { .. } => ApiError::LoginFailed,
                other => other,
            })?;
        Ok(data.sid)
    }

    async fn fetch_entry(&self) -> Result<Vec<Criterion>, ApiError> {
        let url = format!("{}/api/entry", self.base_url);
        let data: EntryData = self.get_enveloped("entry", url).await?;
        Ok(data.albums)
    }

    async fn fetch_songs(&self, album: &str, artist: &str) -> Result<Vec<Song>, ApiError> {
        let url = format!(
            "{}/api/songs?album={}&artist={}",
            self.base_url,
            urlencoding::encode(album),
            urlencoding::encode(artist),
        );
        let data: SongsData = self.get_enveloped("songs", url).await?;
        Ok(data.songs)
    }

    async fn fetch_note(&self) -> Result<String, ApiError> {
        let url = format!("{}/api/note", self.base_url);
        self.get_enveloped("note", url).await
    }

    async fn server_info(&self) -> Result<ServerInfo, ApiError> {
        let url = format!("{}/api/info", self.base_url);
        self.get_enveloped("info", url).await
    }

    fn build_download_url(&self, id: &str, sid: Option<&str>) -> String {
        let mut url = format!(
            "{}/api/download?id={}",
            self.base_url,
            urlencoding::encode(id)
        );
        if let Some(sid) = sid {
            url.push_str("&sid=");
            url.push_str(&urlencoding::encode(sid));
        }
        url
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;

    fn client() -> HttpCatalogClient {
        HttpCatalogClient::new(&ServerConfig {
            base_url: "http://nas.local:5000/".to_string(),
            account: "listener".to_string(),
            password: "hunter 2".to_string(),
        })
    }

    #[test]
    fn download_url_without_session() {
        let url = client().build_download_url("music_42", None);
        assert_eq!(url, "http://nas.local:5000/api/download?id=music_42");
    }

    #[test]
    fn download_url_carries_encoded_session() {
        let url = client().build_download_url("music_42", Some("sid/with=chars"));
        assert_eq!(
            url,
            "http://nas.local:5000/api/download?id=music_42&sid=sid%2Fwith%3Dchars"
        );
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let url = client().build_download_url("a", None);
        assert!(!url.contains("//api"));
    }
}
