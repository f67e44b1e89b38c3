//! Notifications the store broadcasts to its subscribers (the UI layer).
//!
//! Delivery is best-effort: a slow subscriber that lags the channel misses
//! intermediate events and should re-read the state snapshot, using `rev` to
//! detect how much it missed.

/// Messages sent from the store to UI subscribers.
#[derive(Debug, Clone)]
pub enum StoreEvent {
    /// Catalog load (or cache recompute) finished; albums and songs changed.
    CatalogLoaded,
    /// The display queue was rebuilt (toggle or search).
    QueueChanged,
    /// A new track was selected for playback.
    TrackChanged { id: String },
    /// A pending background cache completed for this song.
    SongCached { id: String },
    /// A session id was obtained.
    LoggedIn,
    /// The home-screen note was (re)fetched.
    NoteLoaded,
    /// User-visible failure notification.
    Error { message: String },
}
