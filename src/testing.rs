//! In-crate fakes for the fetcher, sink and clock.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::{
    collections::{HashMap, HashSet},
    path::{Path, PathBuf},
    sync::atomic::{AtomicU64, AtomicUsize, Ordering},
    time::Duration,
};
use tokio::sync::mpsc::UnboundedSender;

use crate::{
    audio::{
        queue::{Track, TrackOrigin},
        sink::{PlaybackSink, PlaybackToken, SessionId, SinkEvent},
    },
    cache::Clock,
    error::{FetchError, PlaybackError},
    sources::{FetchedMedia, MediaFetcher, TrackIdentity},
};

pub fn local_track(name: &str) -> Track {
    let file = PathBuf::from(format!("{name}.opus"));
    Track {
        title: name.to_string(),
        origin: TrackOrigin::Local(file.clone()),
        file,
        service: "Jukebox".to_string(),
        duration_secs: 0,
        enqueued_at: Utc::now(),
        requester: "tester".to_string(),
    }
}

pub struct ManualClock(AtomicU64);

impl ManualClock {
    pub fn new(now: u64) -> Self {
        Self(AtomicU64::new(now))
    }

    pub fn set(&self, now: u64) {
        self.0.store(now, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

/// Writes a small file at the destination and reports a fixed duration.
pub struct FakeFetcher {
    duration_secs: u64,
    failure: Option<FetchError>,
    delay: Duration,
    calls: AtomicUsize,
}

impl FakeFetcher {
    pub fn new(duration_secs: u64) -> Self {
        Self {
            duration_secs,
            failure: None,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(error: FetchError) -> Self {
        Self {
            failure: Some(error),
            ..Self::new(0)
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaFetcher for FakeFetcher {
    async fn fetch(
        &self,
        identity: &TrackIdentity,
        destination: &Path,
    ) -> Result<FetchedMedia, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(error) = &self.failure {
            return Err(error.clone());
        }

        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| FetchError::Download(e.to_string()))?;
        }
        tokio::fs::write(destination, b"opus")
            .await
            .map_err(|e| FetchError::Download(e.to_string()))?;

        Ok(FetchedMedia {
            title: format!("Title {}", identity.id),
            canonical_id: identity.id.clone(),
            file: destination.to_path_buf(),
            duration_secs: self.duration_secs,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SinkCall {
    Start(SessionId, PathBuf),
    Stop(SessionId),
    Pause(SessionId),
    Resume(SessionId),
    Disconnect(SessionId),
}

#[derive(Default)]
struct FakeSinkState {
    calls: Vec<SinkCall>,
    active: HashMap<SessionId, PlaybackToken>,
    paused: HashSet<SessionId>,
    failing: HashSet<PathBuf>,
    lingering: HashSet<SessionId>,
    announcements: Vec<(SessionId, String)>,
}

/// Records calls and emits `Finished` like a real voice sink: once per
/// successful start, on `stop` or when the test calls [`finish`](Self::finish).
pub struct FakeSink {
    state: Mutex<FakeSinkState>,
    events: UnboundedSender<SinkEvent>,
}

impl FakeSink {
    pub fn new(events: UnboundedSender<SinkEvent>) -> Self {
        Self {
            state: Mutex::new(FakeSinkState::default()),
            events,
        }
    }

    /// Makes every `start` of `file` fail.
    pub fn fail_on(&self, file: impl Into<PathBuf>) {
        self.state.lock().failing.insert(file.into());
    }

    /// `session` keeps reporting audio after its track finished.
    pub fn keep_rendering(&self, session: SessionId) {
        self.state.lock().lingering.insert(session);
    }

    /// The current track reaches its end.
    pub fn finish(&self, session: SessionId) {
        self.complete(session, None);
    }

    pub fn calls(&self) -> Vec<SinkCall> {
        self.state.lock().calls.clone()
    }

    pub fn starts(&self, session: SessionId) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|c| matches!(c, SinkCall::Start(s, _) if *s == session))
            .count()
    }

    pub fn last_started(&self, session: SessionId) -> Option<PathBuf> {
        self.state.lock().calls.iter().rev().find_map(|c| match c {
            SinkCall::Start(s, file) if *s == session => Some(file.clone()),
            _ => None,
        })
    }

    pub fn announcements(&self, session: SessionId) -> Vec<String> {
        self.state
            .lock()
            .announcements
            .iter()
            .filter(|(s, _)| *s == session)
            .map(|(_, status)| status.clone())
            .collect()
    }

    fn complete(&self, session: SessionId, error: Option<String>) {
        let token = {
            let mut state = self.state.lock();
            state.paused.remove(&session);
            state.active.remove(&session)
        };
        if let Some(token) = token {
            let _ = self.events.send(SinkEvent::Finished {
                session,
                token,
                error,
            });
        }
    }
}

#[async_trait]
impl PlaybackSink for FakeSink {
    async fn start(
        &self,
        session: SessionId,
        file: &Path,
        token: PlaybackToken,
    ) -> Result<(), PlaybackError> {
        let mut state = self.state.lock();
        state.calls.push(SinkCall::Start(session, file.to_path_buf()));
        if state.failing.contains(file) {
            return Err(PlaybackError::Open {
                path: file.to_path_buf(),
                reason: "unreadable".into(),
            });
        }
        state.paused.remove(&session);
        state.active.insert(session, token);
        Ok(())
    }

    async fn stop(&self, session: SessionId) {
        self.state.lock().calls.push(SinkCall::Stop(session));
        self.complete(session, None);
    }

    async fn pause(&self, session: SessionId) -> bool {
        let mut state = self.state.lock();
        state.calls.push(SinkCall::Pause(session));
        state.active.contains_key(&session) && state.paused.insert(session)
    }

    async fn resume(&self, session: SessionId) -> bool {
        let mut state = self.state.lock();
        state.calls.push(SinkCall::Resume(session));
        state.paused.remove(&session)
    }

    async fn is_rendering(&self, session: SessionId) -> bool {
        let state = self.state.lock();
        state.lingering.contains(&session)
            || (state.active.contains_key(&session) && !state.paused.contains(&session))
    }

    async fn disconnect(&self, session: SessionId) {
        let mut state = self.state.lock();
        state.calls.push(SinkCall::Disconnect(session));
        state.active.remove(&session);
        state.paused.remove(&session);
    }

    async fn announce(&self, session: SessionId, status: &str) {
        self.state
            .lock()
            .announcements
            .push((session, status.to_string()));
    }
}
