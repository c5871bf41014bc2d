//! Typed errors surfaced by the voice session core.
//!
//! Command-layer callers only ever see [`SessionError`]. Connectivity loss on the
//! Lavalink push socket and failed voice-server forwarding never reach a caller;
//! they are logged where they happen.

use serenity::model::id::GuildId;
use thiserror::Error;

/// Errors returned by the session command API.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Usage error: the guild has no confirmed voice connection.
    #[error("no active session for guild {0}")]
    NoActiveSession(GuildId),

    /// The join confirmation did not arrive before the caller's deadline.
    #[error("timed out waiting for voice join in guild {0}")]
    JoinTimeout(GuildId),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

impl SessionError {
    /// Usage errors are caller mistakes and must not be retried.
    pub fn is_usage_error(&self) -> bool {
        matches!(self, SessionError::NoActiveSession(_))
    }
}

/// Errors talking to the audio backend (Lavalink).
#[derive(Debug, Error)]
pub enum BackendError {
    /// The query resolved to zero candidate tracks.
    #[error("no tracks have been loaded for '{0}'")]
    NoTracks(String),

    /// The backend reported a failure while loading the query.
    #[error("track loading failed: {0}")]
    LoadFailed(String),

    /// The push socket has not handed out a session id yet.
    #[error("lavalink session is not ready")]
    NoSession,

    #[error("lavalink responded with status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("invalid lavalink configuration: {0}")]
    Config(String),

    #[error("lavalink request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("lavalink websocket error: {0}")]
    Socket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("invalid lavalink payload: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Errors issuing requests against the Discord gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("joining voice channel failed: {0}")]
    Join(String),

    #[error("leaving voice channel failed: {0}")]
    Leave(String),

    /// Voice-state membership is unknown because the guild is not cached.
    #[error("guild {0} is not cached")]
    GuildNotCached(GuildId),
}
