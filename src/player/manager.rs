use serenity::model::id::{ChannelId, GuildId};
use serenity::prelude::TypeMapKey;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::events::{DomainEvent, EventKind};
use crate::cache::TrackIdentCache;
use crate::error::SessionError;
use crate::lavalink::model::Track;
use crate::lavalink::{AudioBackend, BackendEvent};
use crate::util::{EventBus, Subscription, Unsubscribe, Waiters};
use crate::voice::{VoiceGateway, VoiceListener, VoiceRegistry};

/// Tunables of a [`SessionManager`].
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Base URL the backend fetches `/file/<ident>` from, without trailing slash.
    pub file_base_url: String,
    /// Added to a track's length to get its cache TTL.
    pub cache_grace: Duration,
    pub auto_leave_delay: Duration,
    /// Per-subscriber queue length of the event bus.
    pub event_capacity: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            file_base_url: "http://localhost:6969".to_string(),
            cache_grace: Duration::from_secs(30),
            auto_leave_delay: Duration::from_secs(5),
            event_capacity: 100,
        }
    }
}

/// Orchestrates per-guild voice sessions.
///
/// The registry is only written by the [`VoiceListener`] obtained from
/// [`voice_listener`](Self::voice_listener); commands read it to decide
/// whether a join is needed and whether a session exists.
pub struct SessionManager {
    bus: EventBus<DomainEvent>,
    registry: Arc<VoiceRegistry>,
    waiters: Arc<Waiters<GuildId>>,
    gateway: Arc<dyn VoiceGateway>,
    backend: Arc<dyn AudioBackend>,
    track_cache: TrackIdentCache,
    settings: SessionSettings,
    _event_log: Unsubscribe,
}

impl SessionManager {
    /// Must be called inside a tokio runtime; the event log subscriber runs on
    /// its own task.
    pub fn new(
        gateway: Arc<dyn VoiceGateway>,
        backend: Arc<dyn AudioBackend>,
        settings: SessionSettings,
    ) -> Self {
        let bus = EventBus::new(settings.event_capacity);
        let event_log = bus.subscribe_fn(|event: DomainEvent| {
            log_event(&event);
        });

        Self {
            bus,
            registry: Arc::new(VoiceRegistry::new()),
            waiters: Arc::new(Waiters::new()),
            gateway,
            backend,
            track_cache: TrackIdentCache::new(),
            settings,
            _event_log: event_log,
        }
    }

    /// Listener that keeps this manager's registry in sync with the gateway.
    /// Run exactly one.
    pub fn voice_listener(&self) -> VoiceListener {
        VoiceListener::new(
            self.registry.clone(),
            self.waiters.clone(),
            self.gateway.clone(),
            self.backend.clone(),
            self.settings.auto_leave_delay,
        )
    }

    pub fn registry(&self) -> &Arc<VoiceRegistry> {
        &self.registry
    }

    pub fn track_cache(&self) -> &TrackIdentCache {
        &self.track_cache
    }

    pub fn events(&self) -> &EventBus<DomainEvent> {
        &self.bus
    }

    pub fn subscribe(&self) -> Subscription<DomainEvent> {
        self.bus.subscribe()
    }

    /// Connects the bot to `channel_id`, returning once the gateway confirms it.
    ///
    /// Returns immediately when already connected there. There is no deadline;
    /// see [`init_timeout`](Self::init_timeout).
    pub async fn init(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<(), SessionError> {
        if self.registry.is_connected_to(guild_id, channel_id) {
            debug!(%guild_id, %channel_id, "Ya conectado al canal, se omite join");
            return Ok(());
        }

        // Si el join falla o el future se cancela, la espera se retira sola
        let mut pending = self.waiters.register_scoped(guild_id);
        self.gateway.join(guild_id, channel_id).await?;
        pending.wait().await;

        info!(%guild_id, %channel_id, "🔊 Conectado al canal de voz");
        Ok(())
    }

    pub async fn init_timeout(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        deadline: Duration,
    ) -> Result<(), SessionError> {
        tokio::time::timeout(deadline, self.init(guild_id, channel_id))
            .await
            .map_err(|_| SessionError::JoinTimeout(guild_id))?
    }

    /// Plays a stored sound through the file endpoint.
    pub async fn play_sound(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        ident: &str,
    ) -> Result<Track, SessionError> {
        let url = format!(
            "{}/file/{}",
            self.settings.file_base_url,
            urlencoding::encode(ident)
        );
        self.play(guild_id, channel_id, &url, ident).await
    }

    /// Starts `url` on the guild's player and remembers which ident it was for.
    ///
    /// An empty `ident` is recorded as the url itself.
    pub async fn play(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        url: &str,
        ident: &str,
    ) -> Result<Track, SessionError> {
        if !self.registry.is_connected_to(guild_id, channel_id) {
            warn!(%guild_id, %channel_id, "Reproduciendo sin estar conectado al canal pedido");
        }

        let track = self.backend.play(guild_id, url).await?;

        if !track.encoded.is_empty() {
            let ident = if ident.is_empty() { url } else { ident };
            let ttl = Duration::from_millis(track.info.length) + self.settings.cache_grace;
            self.track_cache
                .insert(track.canonical_uri().to_string(), ident.to_string(), ttl);
            debug!(%guild_id, ident, uri = track.canonical_uri(), "Track registrado en cache");
        }

        Ok(track)
    }

    pub async fn stop(&self, guild_id: GuildId) -> Result<(), SessionError> {
        self.require_session(guild_id)?;
        self.backend.stop(guild_id).await?;
        Ok(())
    }

    pub async fn set_volume(&self, guild_id: GuildId, volume: u16) -> Result<(), SessionError> {
        self.require_session(guild_id)?;
        self.backend.set_volume(guild_id, volume).await?;
        Ok(())
    }

    /// Requests leaving the guild's channel. The backend player is torn down
    /// once the leave is confirmed by the gateway.
    pub async fn destroy(&self, guild_id: GuildId) -> Result<(), SessionError> {
        self.require_session(guild_id)?;
        self.gateway.leave(guild_id).await?;
        Ok(())
    }

    /// Best-effort shutdown of the backend connection.
    pub async fn close(&self) {
        if let Err(e) = self.backend.close().await {
            warn!(error = %e, "Error cerrando la conexión con Lavalink");
        }
    }

    fn require_session(&self, guild_id: GuildId) -> Result<(), SessionError> {
        if self.registry.contains(guild_id) {
            Ok(())
        } else {
            Err(SessionError::NoActiveSession(guild_id))
        }
    }

    /// Consumes backend push events until the stream ends.
    pub fn spawn_event_translation(
        self: &Arc<Self>,
        mut events: mpsc::UnboundedReceiver<BackendEvent>,
    ) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                this.handle_backend_event(event).await;
            }
            debug!("Stream de eventos de Lavalink cerrado");
        })
    }

    /// Publishes the domain event matching a backend callback, if the track was
    /// started by this process and is still cached.
    pub async fn handle_backend_event(&self, event: BackendEvent) {
        let (guild_id, track_id, kind, error) = match event {
            BackendEvent::TrackStart { guild_id, track_id } => {
                (guild_id, track_id, EventKind::PlayStart, None)
            }
            BackendEvent::TrackEnd {
                guild_id, track_id, ..
            } => (guild_id, track_id, EventKind::PlayEnd, None),
            BackendEvent::TrackStuck {
                guild_id,
                track_id,
                threshold_ms,
            } => (
                guild_id,
                track_id,
                EventKind::PlayStuck,
                Some(format!("stuck for {threshold_ms}ms")),
            ),
            BackendEvent::TrackException {
                guild_id,
                track_id,
                message,
            } => (guild_id, track_id, EventKind::PlayException, Some(message)),
            BackendEvent::VoiceSocketClosed {
                guild_id,
                code,
                reason,
                by_remote,
            } => {
                warn!(%guild_id, code, %reason, by_remote, "Websocket de voz de Lavalink cerrado");
                return;
            }
            BackendEvent::Disconnected { reason } => {
                warn!(%reason, "Conexión con Lavalink perdida, reconectando");
                return;
            }
        };

        let info = match self.backend.decode_track(&track_id).await {
            Ok(info) => info,
            Err(e) => {
                debug!(%guild_id, error = %e, "No se pudo decodificar el track");
                return;
            }
        };

        let Some(ident) = self.track_cache.get(&info.canonical_uri().to_string()) else {
            debug!(%guild_id, uri = info.canonical_uri(), "Track desconocido, evento descartado");
            return;
        };

        let mut domain = DomainEvent::new(kind, ident, guild_id);
        if let Some(error) = error {
            domain = domain.with_error(error);
        }
        self.bus.publish(domain);
    }
}

/// Failed playback is an error; everything else is routine.
fn log_event(event: &DomainEvent) -> tracing::Level {
    match &event.error {
        Some(error) => {
            error!(
                kind = %event.kind,
                ident = %event.ident,
                guild_id = %event.guild_id,
                %error,
                "❌ Error de reproducción"
            );
            tracing::Level::ERROR
        }
        None => {
            debug!(
                kind = %event.kind,
                ident = %event.ident,
                guild_id = %event.guild_id,
                "Evento de reproducción"
            );
            tracing::Level::DEBUG
        }
    }
}

/// Lets the command layer fetch the manager from serenity's client data.
impl TypeMapKey for SessionManager {
    type Value = Arc<SessionManager>;
}
