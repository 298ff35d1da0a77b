use async_trait::async_trait;
use std::{
    fmt,
    path::Path,
    sync::atomic::{AtomicU64, Ordering},
};

use crate::error::PlaybackError;

/// Guild the session belongs to.
pub type SessionId = u64;

/// Tags one `start` call. Completion events carry it back so late events
/// from a track that was already replaced can be told apart.
///
/// The default token is never issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PlaybackToken(u64);

impl PlaybackToken {
    /// Draws a token that `counter` has never handed out before.
    pub fn issue(counter: &AtomicU64) -> Self {
        Self(counter.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

impl fmt::Display for PlaybackToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What the sink reports back to the transition engine.
#[derive(Debug, Clone, PartialEq)]
pub enum SinkEvent {
    /// Emitted once per successful `start`, whether the track ended, was
    /// stopped, or failed while rendering.
    Finished {
        session: SessionId,
        token: PlaybackToken,
        error: Option<String>,
    },
    /// The voice connection went away underneath us.
    Disconnected { session: SessionId },
}

/// Renders audio files for a session.
#[async_trait]
pub trait PlaybackSink: Send + Sync {
    /// Starts rendering `file`, replacing whatever was playing.
    async fn start(
        &self,
        session: SessionId,
        file: &Path,
        token: PlaybackToken,
    ) -> Result<(), PlaybackError>;

    /// Stops the current track; its `Finished` event still fires.
    async fn stop(&self, session: SessionId);

    /// Returns whether something was paused.
    async fn pause(&self, session: SessionId) -> bool;

    /// Returns whether something was resumed.
    async fn resume(&self, session: SessionId) -> bool;

    async fn is_rendering(&self, session: SessionId) -> bool;

    async fn disconnect(&self, session: SessionId);

    /// Shows what is playing wherever listeners can see it. Best effort.
    async fn announce(&self, _session: SessionId, _status: &str) {}
}
