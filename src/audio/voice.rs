use async_trait::async_trait;
use dashmap::DashMap;
use serenity::{
    http::Http,
    model::id::{ChannelId, GuildId},
};
use songbird::{
    events::CoreEvent,
    input::File,
    tracks::{PlayMode, TrackHandle},
    Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::{
    path::Path,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error, info, warn};

use super::sink::{PlaybackSink, PlaybackToken, SessionId, SinkEvent};
use crate::error::PlaybackError;

/// [`PlaybackSink`] over songbird voice calls; one call per guild.
pub struct VoiceSink {
    manager: Arc<Songbird>,
    http: Arc<Http>,
    tracks: DashMap<SessionId, TrackHandle>,
    /// Guilds we are leaving on purpose; their driver disconnect is expected.
    leaving: Arc<DashMap<SessionId, ()>>,
    events: UnboundedSender<SinkEvent>,
}

impl VoiceSink {
    pub fn new(manager: Arc<Songbird>, http: Arc<Http>, events: UnboundedSender<SinkEvent>) -> Self {
        Self {
            manager,
            http,
            tracks: DashMap::new(),
            leaving: Arc::new(DashMap::new()),
            events,
        }
    }

    /// Whether a call exists and its driver is actually connected.
    pub async fn is_connected(&self, session: SessionId) -> bool {
        self.current_channel(session).await.is_some()
    }

    async fn current_channel(&self, session: SessionId) -> Option<ChannelId> {
        let call = self.manager.get(GuildId::new(session))?;
        let channel = call.lock().await.current_channel()?;
        Some(ChannelId::new(channel.0.get()))
    }

    fn set_channel_status(&self, channel: ChannelId, status: String) {
        let http = self.http.clone();
        tokio::spawn(async move {
            let body = serde_json::json!({ "status": status });
            if let Err(e) = http.edit_voice_status(channel, &body, None).await {
                debug!("No se pudo actualizar el estado de voz de {}: {}", channel, e);
            }
        });
    }

    /// Joins `channel` and reports unexpected disconnects from then on.
    pub async fn join(&self, session: SessionId, channel: ChannelId) -> anyhow::Result<()> {
        let guild_id = GuildId::new(session);
        let call = self
            .manager
            .join(guild_id, channel)
            .await
            .map_err(|e| anyhow::anyhow!("Could not join voice channel {}: {}", channel, e))?;

        self.leaving.remove(&session);

        let mut call = call.lock().await;
        call.remove_all_global_events();
        call.add_global_event(
            Event::Core(CoreEvent::DriverDisconnect),
            DisconnectForwarder {
                session,
                leaving: self.leaving.clone(),
                events: self.events.clone(),
            },
        );

        info!("🔊 Conectado al canal de voz {} en guild {}", channel, guild_id);
        Ok(())
    }
}

#[async_trait]
impl PlaybackSink for VoiceSink {
    async fn start(
        &self,
        session: SessionId,
        file: &Path,
        token: PlaybackToken,
    ) -> Result<(), PlaybackError> {
        let call = self
            .manager
            .get(GuildId::new(session))
            .ok_or(PlaybackError::NotConnected(session))?;

        if let Err(e) = tokio::fs::metadata(file).await {
            return Err(PlaybackError::Open {
                path: file.to_path_buf(),
                reason: e.to_string(),
            });
        }

        let handle = {
            let mut call = call.lock().await;
            call.stop();
            call.play_input(File::new(file.to_path_buf()).into())
        };

        let fired = Arc::new(AtomicBool::new(false));
        for event in [TrackEvent::End, TrackEvent::Error] {
            handle
                .add_event(
                    Event::Track(event),
                    FinishForwarder {
                        session,
                        token,
                        fired: fired.clone(),
                        events: self.events.clone(),
                    },
                )
                .map_err(|e| PlaybackError::Sink(e.to_string()))?;
        }

        debug!("🎧 Reproduciendo {} ({}) en guild {}", file.display(), token, session);
        self.tracks.insert(session, handle);
        Ok(())
    }

    async fn stop(&self, session: SessionId) {
        if let Some(track) = self.tracks.get(&session) {
            if let Err(e) = track.stop() {
                debug!("Stop sobre un track ya terminado en guild {}: {}", session, e);
            }
        }
    }

    async fn pause(&self, session: SessionId) -> bool {
        let Some(track) = self.tracks.get(&session).map(|t| t.clone()) else {
            return false;
        };
        match track.get_info().await {
            Ok(state) if matches!(state.playing, PlayMode::Play) => track.pause().is_ok(),
            _ => false,
        }
    }

    async fn resume(&self, session: SessionId) -> bool {
        let Some(track) = self.tracks.get(&session).map(|t| t.clone()) else {
            return false;
        };
        match track.get_info().await {
            Ok(state) if matches!(state.playing, PlayMode::Pause) => track.play().is_ok(),
            _ => false,
        }
    }

    async fn is_rendering(&self, session: SessionId) -> bool {
        let Some(track) = self.tracks.get(&session).map(|t| t.clone()) else {
            return false;
        };
        matches!(
            track.get_info().await.map(|state| state.playing),
            Ok(PlayMode::Play)
        )
    }

    async fn disconnect(&self, session: SessionId) {
        self.tracks.remove(&session);
        self.leaving.insert(session, ());

        if let Some(channel) = self.current_channel(session).await {
            self.set_channel_status(channel, String::new());
        }

        let guild_id = GuildId::new(session);
        if self.manager.get(guild_id).is_none() {
            return;
        }
        match self.manager.remove(guild_id).await {
            Ok(()) => info!("👋 Desconectado del canal de voz en guild {}", guild_id),
            Err(e) => error!("❌ Error al salir del canal de voz en guild {}: {:?}", guild_id, e),
        }
    }

    async fn announce(&self, session: SessionId, status: &str) {
        if let Some(channel) = self.current_channel(session).await {
            self.set_channel_status(channel, status.to_string());
        }
    }
}

/// Turns the end or failure of one track into a single `Finished` event.
struct FinishForwarder {
    session: SessionId,
    token: PlaybackToken,
    fired: Arc<AtomicBool>,
    events: UnboundedSender<SinkEvent>,
}

#[async_trait]
impl VoiceEventHandler for FinishForwarder {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        if self.fired.swap(true, Ordering::SeqCst) {
            return Some(Event::Cancel);
        }

        let error = match ctx {
            EventContext::Track(tracks) => tracks.iter().find_map(|(state, _)| match &state.playing {
                PlayMode::Errored(e) => Some(format!("{e:?}")),
                _ => None,
            }),
            _ => None,
        };

        let _ = self.events.send(SinkEvent::Finished {
            session: self.session,
            token: self.token,
            error,
        });
        Some(Event::Cancel)
    }
}

struct DisconnectForwarder {
    session: SessionId,
    leaving: Arc<DashMap<SessionId, ()>>,
    events: UnboundedSender<SinkEvent>,
}

#[async_trait]
impl VoiceEventHandler for DisconnectForwarder {
    async fn act(&self, _ctx: &EventContext<'_>) -> Option<Event> {
        if self.leaving.remove(&self.session).is_some() {
            return None;
        }

        warn!("🔌 Driver de voz desconectado en guild {}", self.session);
        let _ = self.events.send(SinkEvent::Disconnected {
            session: self.session,
        });
        None
    }
}
