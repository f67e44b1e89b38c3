//! Background caching agent.
//!
//! Services the store's fire-and-forget `CacheRequest`s: downloads the song's
//! audio into the cache directory under its cache key.  Requests are handled
//! one at a time, in arrival order; a failed download is logged and dropped —
//! the store's poller simply times out and the song stays uncached.

use crate::cache::{CacheHandle, CacheRequest, DirCache, LocalCache};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Spawn the caching agent over `dir` and return the capability handle the
/// store is constructed with, plus the agent task handle for shutdown.
pub fn spawn_cache_agent(dir: PathBuf) -> (CacheHandle, JoinHandle<()>) {
    let (request_tx, request_rx) = mpsc::unbounded_channel();
    let cache: Arc<dyn LocalCache> = Arc::new(DirCache::new(dir.clone()));
    let handle = CacheHandle::new(cache, request_tx);

    let task = tokio::spawn(run_agent(dir, request_rx));
    (handle, task)
}

async fn run_agent(dir: PathBuf, mut request_rx: mpsc::UnboundedReceiver<CacheRequest>) {
    let http = reqwest::Client::new();

    while let Some(req) = request_rx.recv().await {
        let target = dir.join(&req.key);
        if target.is_file() {
            continue;
        }
        match fetch_to_file(&http, &req.url, &target).await {
            Ok(bytes) => info!("cached {} ({} bytes)", req.key, bytes),
            Err(e) => warn!("caching {} failed: {:#}", req.key, e),
        }
    }
}

/// Download `url` into `target`, going through a `.part` file so a partial
/// download is never visible under the cache key.
async fn fetch_to_file(http: &reqwest::Client, url: &str, target: &Path) -> anyhow::Result<u64> {
    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let response = http.get(url).send().await?;
    if !response.status().is_success() {
        anyhow::bail!("download returned status {}", response.status());
    }
    let body = response.bytes().await?;

    let file_name = target
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("download");
    let part = target.with_file_name(format!("{file_name}.part"));
    tokio::fs::write(&part, &body).await?;
    tokio::fs::rename(&part, target).await?;
    Ok(body.len() as u64)
}
