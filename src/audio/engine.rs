//! Reacts to sink events and decides what plays next.
//!
//! ```text
//!   Idle ──start──▶ Playing ──Finished──▶ Transitioning ──queue left──▶ Playing
//!                                              │
//!                                              └──queue empty──▶ Draining (removed)
//! ```
//!
//! Any state goes straight to removal on `Disconnected`, and the sink drops
//! its connection.

use std::sync::Arc;
use tokio::{
    sync::mpsc::{UnboundedReceiver, UnboundedSender},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{
    session::{PlaybackState, Session, SessionHandle, SessionRegistry},
    sink::{PlaybackSink, PlaybackToken, SessionId, SinkEvent},
};

#[derive(Clone)]
pub struct TransitionEngine {
    registry: Arc<SessionRegistry>,
    sink: Arc<dyn PlaybackSink>,
    events: UnboundedSender<SinkEvent>,
}

impl TransitionEngine {
    /// `events` must feed the receiver later passed to [`run`](Self::run).
    pub fn new(
        registry: Arc<SessionRegistry>,
        sink: Arc<dyn PlaybackSink>,
        events: UnboundedSender<SinkEvent>,
    ) -> Self {
        Self {
            registry,
            sink,
            events,
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn sink(&self) -> &Arc<dyn PlaybackSink> {
        &self.sink
    }

    pub fn spawn(
        self,
        events: UnboundedReceiver<SinkEvent>,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(self.run(events, shutdown))
    }

    /// Consumes events until the channel closes or `shutdown` fires.
    pub async fn run(self, mut events: UnboundedReceiver<SinkEvent>, shutdown: CancellationToken) {
        info!("🎛️ Motor de transiciones iniciado");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                event = events.recv() => match event {
                    Some(event) => self.handle(event).await,
                    None => break,
                },
            }
        }
        info!("🎛️ Motor de transiciones detenido");
    }

    pub async fn handle(&self, event: SinkEvent) {
        match event {
            SinkEvent::Finished {
                session,
                token,
                error,
            } => self.on_finished(session, token, error).await,
            SinkEvent::Disconnected { session } => self.on_disconnected(session).await,
        }
    }

    /// Hands queue[0] to the sink under a fresh token.
    ///
    /// A start failure is reported as a finished track so the queue moves on.
    pub async fn start_current(&self, session: &mut Session) {
        let Some(track) = session.queue.current() else {
            return;
        };
        let file = track.file.clone();
        let title = track.title.clone();
        let status = format!("🎶 {}: {}", track.service, track.title);

        let token = session.next_token();
        session.state = PlaybackState::Playing;

        match self.sink.start(session.id, &file, token).await {
            Ok(()) => {
                info!("▶️ Reproduciendo: {} en guild {}", title, session.id);
                self.sink.announce(session.id, &status).await;
            }
            Err(e) => {
                error!("❌ No se pudo iniciar {}: {}", title, e);
                let _ = self.events.send(SinkEvent::Finished {
                    session: session.id,
                    token,
                    error: Some(e.to_string()),
                });
            }
        }
    }

    async fn on_finished(&self, id: SessionId, token: PlaybackToken, error: Option<String>) {
        let Some(handle) = self.registry.get(id) else {
            debug!("Fin de track para sesión desconocida {}", id);
            return;
        };
        let mut session = handle.lock().await;

        if session.is_closed() || session.token() != token {
            debug!("Ignorando fin obsoleto {} de la sesión {}", token, id);
            return;
        }

        match error {
            Some(e) => warn!("⚠️ Error de reproducción en guild {}: {}", id, e),
            None => debug!("Track terminado en guild {}", id),
        }

        session.state = PlaybackState::Transitioning;
        session.queue.advance();

        if session.queue.is_empty() {
            self.drain(&mut session, &handle).await;
        } else {
            self.start_current(&mut session).await;
        }
    }

    async fn drain(&self, session: &mut Session, handle: &SessionHandle) {
        info!("📭 Cola vacía para guild {}", session.id);
        session.state = PlaybackState::Draining;
        self.registry.remove(session, handle);

        if !self.sink.is_rendering(session.id).await {
            self.sink.disconnect(session.id).await;
        }
    }

    async fn on_disconnected(&self, id: SessionId) {
        if let Some(handle) = self.registry.get(id) {
            let mut session = handle.lock().await;
            info!("🔌 Voz desconectada en guild {}, descartando sesión", id);
            session.queue.clear();
            session.state = PlaybackState::Idle;
            self.registry.remove(&mut session, &handle);
        }

        // The dead call must go, or the next request would play into it
        // instead of joining again.
        self.sink.disconnect(id).await;
    }
}
