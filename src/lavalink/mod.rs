//! # Lavalink Module
//!
//! Bridge to the external audio-streaming backend (Lavalink v4).
//!
//! The bridge has two halves:
//!
//! ### [`client`] - REST control channel
//! - Resolves queries into tracks and starts them on a guild's player
//! - Stop, volume, destroy and track-id decoding
//! - Forwards Discord voice-server credentials so the node can join the call
//!
//! ### [`socket`] - Push events
//! - Persistent websocket carrying track lifecycle events
//! - Session resume across short disconnects
//! - Reconnects forever with [`backoff::ReconnectPolicy`] until closed
//!
//! The node's session id is replaced wholesale on every `ready`, so commands
//! always read the current one instead of caching it.

pub mod backoff;
pub mod client;
pub mod model;
pub(crate) mod socket;

use async_trait::async_trait;
use serenity::model::id::{GuildId, UserId};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use self::backoff::ReconnectPolicy;
use self::client::LavalinkRest;
use self::model::{LoadResult, Track, TrackInfo, UpdatePlayer, UpdatePlayerTrack, VoicePayload};
use self::socket::{PushSocket, SocketSettings};
use crate::error::BackendError;

/// Highest volume Lavalink accepts.
pub const MAX_VOLUME: u16 = 1000;

/// Track lifecycle notifications pushed by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendEvent {
    TrackStart {
        guild_id: GuildId,
        track_id: String,
    },
    TrackEnd {
        guild_id: GuildId,
        track_id: String,
        reason: String,
    },
    TrackStuck {
        guild_id: GuildId,
        track_id: String,
        threshold_ms: u64,
    },
    TrackException {
        guild_id: GuildId,
        track_id: String,
        message: String,
    },
    /// The node's own voice websocket to Discord closed.
    VoiceSocketClosed {
        guild_id: GuildId,
        code: u16,
        reason: String,
        by_remote: bool,
    },
    /// The push connection to the node dropped; a reconnect is already scheduled.
    Disconnected { reason: String },
}

/// Credentials from a Discord voice-server update, forwarded verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceServerInfo {
    pub session_id: String,
    pub token: String,
    pub endpoint: String,
}

/// Command surface of the audio backend.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AudioBackend: Send + Sync {
    /// Resolves `query` and plays the first candidate on the guild's player.
    async fn play(&self, guild_id: GuildId, query: &str) -> Result<Track, BackendError>;

    async fn stop(&self, guild_id: GuildId) -> Result<(), BackendError>;

    async fn set_volume(&self, guild_id: GuildId, volume: u16) -> Result<(), BackendError>;

    async fn destroy(&self, guild_id: GuildId) -> Result<(), BackendError>;

    /// Resolves an opaque track id back to its metadata.
    async fn decode_track(&self, track_id: &str) -> Result<TrackInfo, BackendError>;

    async fn update_voice(
        &self,
        guild_id: GuildId,
        voice: VoiceServerInfo,
    ) -> Result<(), BackendError>;

    async fn close(&self) -> Result<(), BackendError>;
}

#[derive(Debug, Clone)]
pub struct LavalinkConfig {
    /// `host:port` of the node.
    pub address: String,
    pub password: String,
    pub secure: bool,
    /// Seconds the node keeps a disconnected session for resuming. `0` disables it.
    pub resume_timeout: u64,
    pub client_name: String,
    pub reconnect: ReconnectPolicy,
}

/// Live connection to one Lavalink node.
pub struct LavalinkBridge {
    rest: LavalinkRest,
    session: watch::Receiver<Option<String>>,
    shutdown: CancellationToken,
}

impl LavalinkBridge {
    /// Opens the push socket and spawns its reconnect loop.
    ///
    /// Returns the bridge plus the stream of pushed [`BackendEvent`]s. Waits up to
    /// ten seconds for the node's `ready` so early commands have a session.
    pub async fn connect(
        config: LavalinkConfig,
        user_id: UserId,
    ) -> Result<(Self, mpsc::UnboundedReceiver<BackendEvent>), BackendError> {
        let rest = LavalinkRest::new(&config.address, &config.password, config.secure)?;
        let scheme = if config.secure { "wss" } else { "ws" };
        let settings = SocketSettings {
            url: format!("{scheme}://{}/v4/websocket", config.address),
            password: config.password.clone(),
            user_id: user_id.get(),
            client_name: config.client_name.clone(),
            resume_timeout: config.resume_timeout,
        };

        info!("Conectando a Lavalink en {}", config.address);
        let ws = socket::open(&settings, None).await?;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (session_tx, mut session_rx) = watch::channel(None);
        let shutdown = CancellationToken::new();

        let push = PushSocket {
            settings,
            rest: rest.clone(),
            session: session_tx,
            events: events_tx,
            policy: config.reconnect,
            shutdown: shutdown.clone(),
        };
        tokio::spawn(push.run(ws));

        let ready = tokio::time::timeout(
            Duration::from_secs(10),
            session_rx.wait_for(|session| session.is_some()),
        )
        .await
        .map(|waited| waited.is_ok())
        .unwrap_or(false);
        if !ready {
            warn!("Lavalink no envió 'ready' a tiempo, los comandos fallarán hasta que llegue");
        }

        Ok((
            Self {
                rest,
                session: session_rx,
                shutdown,
            },
            events_rx,
        ))
    }

    /// Bridge over an existing REST client with a fixed session and no push socket.
    #[cfg(test)]
    pub(crate) fn with_session(rest: LavalinkRest, session_id: &str) -> Self {
        let (_, session) = watch::channel(Some(session_id.to_string()));
        Self {
            rest,
            session,
            shutdown: CancellationToken::new(),
        }
    }

    fn session_id(&self) -> Result<String, BackendError> {
        self.session.borrow().clone().ok_or(BackendError::NoSession)
    }

    async fn update(&self, guild_id: GuildId, body: UpdatePlayer) -> Result<(), BackendError> {
        let session_id = self.session_id()?;
        self.rest.update_player(&session_id, guild_id, &body).await
    }
}

#[async_trait]
impl AudioBackend for LavalinkBridge {
    async fn play(&self, guild_id: GuildId, query: &str) -> Result<Track, BackendError> {
        let track = match self.rest.load_tracks(query).await? {
            LoadResult::Error(e) => return Err(BackendError::LoadFailed(e.describe())),
            loaded => loaded
                .into_tracks()
                .into_iter()
                .next()
                .ok_or_else(|| BackendError::NoTracks(query.to_string()))?,
        };

        self.update(
            guild_id,
            UpdatePlayer {
                track: Some(UpdatePlayerTrack {
                    encoded: Some(track.encoded.clone()),
                }),
                ..Default::default()
            },
        )
        .await?;

        Ok(track)
    }

    async fn stop(&self, guild_id: GuildId) -> Result<(), BackendError> {
        self.update(
            guild_id,
            UpdatePlayer {
                track: Some(UpdatePlayerTrack { encoded: None }),
                ..Default::default()
            },
        )
        .await
    }

    async fn set_volume(&self, guild_id: GuildId, volume: u16) -> Result<(), BackendError> {
        self.update(
            guild_id,
            UpdatePlayer {
                volume: Some(volume.min(MAX_VOLUME)),
                ..Default::default()
            },
        )
        .await
    }

    async fn destroy(&self, guild_id: GuildId) -> Result<(), BackendError> {
        let session_id = self.session_id()?;
        self.rest.destroy_player(&session_id, guild_id).await
    }

    async fn decode_track(&self, track_id: &str) -> Result<TrackInfo, BackendError> {
        Ok(self.rest.decode_track(track_id).await?.info)
    }

    async fn update_voice(
        &self,
        guild_id: GuildId,
        voice: VoiceServerInfo,
    ) -> Result<(), BackendError> {
        self.update(
            guild_id,
            UpdatePlayer {
                voice: Some(VoicePayload {
                    token: voice.token,
                    endpoint: voice.endpoint,
                    session_id: voice.session_id,
                }),
                ..Default::default()
            },
        )
        .await
    }

    async fn close(&self) -> Result<(), BackendError> {
        self.shutdown.cancel();
        Ok(())
    }
}
