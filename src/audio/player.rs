use chrono::Utc;
use std::{sync::Arc, time::Duration};
use tracing::{debug, info, warn};

use crate::{
    audio::{
        engine::TransitionEngine,
        queue::{SkipOutcome, Track, TrackOrigin, UpcomingSnapshot},
        session::{PlaybackState, SessionRegistry},
        sink::{PlaybackSink, SessionId},
    },
    cache::MediaCache,
    error::{EnqueueError, FetchError},
    sources::{LocalMedia, MediaFetcher, Resolved, SourceRequest, SourceResolver},
};

/// What the command layer shows after an enqueue.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayInfo {
    pub title: String,
    /// Queue position; 0 is the track playing now.
    pub position: usize,
    /// This request started the session.
    pub started: bool,
    pub requester: String,
    pub service: String,
    pub duration_secs: u64,
    /// More than one for playlists.
    pub tracks_added: usize,
}

impl DisplayInfo {
    fn for_track(track: &Track, position: usize, started: bool, tracks_added: usize) -> Self {
        Self {
            title: track.title.clone(),
            position,
            started,
            requester: track.requester.clone(),
            service: track.service.clone(),
            duration_secs: track.duration_secs,
            tracks_added,
        }
    }

    pub fn now_playing(&self) -> bool {
        self.started
    }

    pub fn headline(&self) -> String {
        match (self.started, self.position) {
            (true, _) => "Now Playing".to_string(),
            // Collapsed onto the track that is already on.
            (false, 0) => "Already playing".to_string(),
            (false, position) => format!("Added to queue ({})", position),
        }
    }

    /// "3m 32s", or "unknown" when the source gave no duration.
    pub fn duration_label(&self) -> String {
        if self.duration_secs == 0 {
            "unknown".to_string()
        } else {
            humantime::format_duration(Duration::from_secs(self.duration_secs)).to_string()
        }
    }
}

/// Entry point for the command layer.
///
/// Composes source resolution, the media cache and the session queues, and
/// starts the sink when a session goes from nothing to playing.
#[derive(Clone)]
pub struct AudioPlayer {
    engine: TransitionEngine,
    cache: MediaCache,
    fetcher: Arc<dyn MediaFetcher>,
    resolver: SourceResolver,
}

impl AudioPlayer {
    pub fn new(
        engine: TransitionEngine,
        cache: MediaCache,
        fetcher: Arc<dyn MediaFetcher>,
        resolver: SourceResolver,
    ) -> Self {
        Self {
            engine,
            cache,
            fetcher,
            resolver,
        }
    }

    fn registry(&self) -> &Arc<SessionRegistry> {
        self.engine.registry()
    }

    fn sink(&self) -> &Arc<dyn PlaybackSink> {
        self.engine.sink()
    }

    pub fn has_session(&self, session: SessionId) -> bool {
        self.registry().contains(session)
    }

    pub async fn enqueue(
        &self,
        session: SessionId,
        requester: &str,
        request: &SourceRequest,
        play_immediately: bool,
    ) -> Result<DisplayInfo, EnqueueError> {
        let tracks = self.tracks_for(requester, request).await?;
        let added = tracks.len();
        let Some(lead) = tracks.first().cloned() else {
            return Err(EnqueueError::UnsupportedSource(format!("{request:?}")));
        };

        loop {
            let (handle, _) = self.registry().get_or_create(session);
            let mut guard = handle.lock().await;

            // Drained between the registry lookup and the lock.
            if guard.is_closed() {
                continue;
            }

            guard.queue.extend(tracks);
            guard.queue.dedupe();

            if guard.state == PlaybackState::Idle {
                self.engine.start_current(&mut guard).await;
                info!("🎵 {} inició una sesión con {}", requester, lead.title);
                return Ok(DisplayInfo::for_track(&lead, 0, true, added));
            }

            guard.queue.apply_shuffle_if_enabled();

            if play_immediately && guard.queue.play_next(&lead.file) {
                debug!("⏩ {} se adelanta en la cola", lead.title);
                self.sink().stop(session).await;
            }

            let position = guard.queue.position_of(&lead.file).unwrap_or(0);
            info!("➕ {} encoló {} en la posición {}", requester, lead.title, position);
            return Ok(DisplayInfo::for_track(&lead, position, false, added));
        }
    }

    /// Downloads `link` into the jukebox as `filename`, then queues it.
    ///
    /// The file bypasses the media cache and is never evicted.
    pub async fn create_jukebox_entry(
        &self,
        session: SessionId,
        requester: &str,
        link: &str,
        filename: &str,
    ) -> Result<DisplayInfo, EnqueueError> {
        let identity = match self.resolver.resolve(&SourceRequest::Link(link.to_string())).await? {
            Resolved::Remote(identity) => identity,
            _ => return Err(EnqueueError::UnsupportedSource(link.to_string())),
        };
        let (name, destination) = self.resolver.jukebox_destination(filename)?;

        let fetched = self.fetcher.fetch(&identity, &destination).await?;
        let limit_secs = self.cache.settings().max_track_duration;
        if fetched.duration_secs >= limit_secs {
            if let Err(e) = tokio::fs::remove_file(&fetched.file).await {
                warn!("No se pudo eliminar {}: {}", fetched.file.display(), e);
            }
            return Err(FetchError::TooLong {
                duration_secs: fetched.duration_secs,
                limit_secs,
            }
            .into());
        }

        info!("📥 {} guardó {} en el jukebox como {}", requester, identity, name);
        self.enqueue(session, requester, &SourceRequest::Jukebox(name), false)
            .await
    }

    async fn tracks_for(
        &self,
        requester: &str,
        request: &SourceRequest,
    ) -> Result<Vec<Track>, EnqueueError> {
        let enqueued_at = Utc::now();
        let local = |media: LocalMedia| Track {
            title: media.title,
            origin: TrackOrigin::Local(media.file.clone()),
            file: media.file,
            service: media.service.to_string(),
            duration_secs: 0,
            enqueued_at,
            requester: requester.to_string(),
        };

        match self.resolver.resolve(request).await? {
            Resolved::Remote(identity) => {
                let entry = self.cache.get_or_fetch(&identity, self.fetcher.clone()).await?;
                Ok(vec![Track {
                    file: self.cache.file_path(&entry),
                    title: entry.title,
                    service: identity.service.to_string(),
                    origin: TrackOrigin::Cached(identity),
                    duration_secs: entry.duration,
                    enqueued_at,
                    requester: requester.to_string(),
                }])
            }
            Resolved::Local(media) => Ok(vec![local(media)]),
            Resolved::Playlist { name, tracks } => {
                info!("📂 Encolando {} tracks de la playlist {}", tracks.len(), name);
                Ok(tracks.into_iter().map(local).collect())
            }
        }
    }

    /// New loop state, or `None` without a session.
    pub async fn toggle_loop(&self, session: SessionId) -> Option<bool> {
        let handle = self.registry().get(session)?;
        let mut guard = handle.lock().await;
        Some(guard.queue.toggle_loop())
    }

    pub async fn toggle_shuffle(&self, session: SessionId) -> Option<bool> {
        let handle = self.registry().get(session)?;
        let mut guard = handle.lock().await;
        Some(guard.queue.toggle_shuffle())
    }

    /// Skips `n` tracks; see [`SessionQueue::skip`](super::queue::SessionQueue::skip).
    pub async fn skip(&self, session: SessionId, n: i64) -> Option<SkipOutcome> {
        let handle = self.registry().get(session)?;
        let mut guard = handle.lock().await;
        if guard.is_closed() {
            return None;
        }

        let outcome = guard.queue.skip(n);
        info!("⏭️ Skip {} en guild {}: {:?}", n, session, outcome);
        self.sink().stop(session).await;
        Some(outcome)
    }

    pub async fn upcoming(&self, session: SessionId) -> Option<UpcomingSnapshot> {
        let handle = self.registry().get(session)?;
        let guard = handle.lock().await;
        Some(guard.queue.snapshot())
    }

    pub async fn pause(&self, session: SessionId) -> bool {
        self.sink().pause(session).await
    }

    pub async fn resume(&self, session: SessionId) -> bool {
        self.sink().resume(session).await
    }

    /// Drops the session and leaves voice. Returns whether a session existed.
    pub async fn stop(&self, session: SessionId) -> bool {
        let existed = match self.registry().get(session) {
            Some(handle) => {
                let mut guard = handle.lock().await;
                guard.queue.clear();
                self.registry().remove(&mut guard, &handle);
                true
            }
            None => false,
        };

        self.sink().stop(session).await;
        self.sink().disconnect(session).await;
        info!("⏹️ Reproducción detenida en guild {}", session);
        existed
    }
}
