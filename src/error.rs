//! Error taxonomy for the playback core.
//!
//! Request-triggered failures ([`EnqueueError`], [`FetchError`]) travel back to
//! the command that caused them. [`PlaybackError`] never reaches a caller: the
//! transition engine logs it and advances the queue. [`IndexError`] only shows
//! up while loading or persisting the cache index and is downgraded to a
//! warning on load.

use std::path::PathBuf;
use thiserror::Error;

/// Failure while turning a remote identity into a cached file.
///
/// `Clone` so every requester waiting on the same in-flight fetch gets the
/// same outcome.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FetchError {
    #[error("Video too long (must be below {limit_secs} seconds, got {duration_secs})")]
    TooLong { duration_secs: u64, limit_secs: u64 },

    #[error("Download failed: {0}")]
    Download(String),

    #[error("Could not read media info: {0}")]
    Metadata(String),
}

/// Errors surfaced to the command layer by the enqueue path.
#[derive(Debug, Error)]
pub enum EnqueueError {
    #[error("Invalid URL or unsupported service: {0}")]
    UnsupportedSource(String),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("Playlist `{0}` is empty")]
    EmptyPlaylist(String),
}

/// Sink failed to start or render a file.
#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("No voice connection for session {0}")]
    NotConnected(u64),

    #[error("Could not open {}: {reason}", path.display())]
    Open { path: PathBuf, reason: String },

    #[error("Sink error: {0}")]
    Sink(String),
}

/// Problems reading or writing the persisted cache index.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("Index I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Index file {} is corrupt: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Could not encode index: {0}")]
    Encode(#[from] serde_json::Error),
}
