//! Lavalink v4 wire types.

use serde::{de::IgnoredAny, Deserialize, Serialize};

/// A playable unit resolved by Lavalink. `encoded` is the opaque track id.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Track {
    pub encoded: String,
    pub info: TrackInfo,
}

impl Track {
    /// URI used to map the track back to the ident that started it.
    pub fn canonical_uri(&self) -> &str {
        self.info.canonical_uri()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackInfo {
    pub identifier: String,
    #[serde(default)]
    pub is_seekable: bool,
    #[serde(default)]
    pub author: String,
    /// Length in milliseconds.
    pub length: u64,
    #[serde(default)]
    pub is_stream: bool,
    #[serde(default)]
    pub position: u64,
    #[serde(default)]
    pub title: String,
    pub uri: Option<String>,
    #[serde(default)]
    pub source_name: String,
}

impl TrackInfo {
    pub fn canonical_uri(&self) -> &str {
        self.uri.as_deref().unwrap_or(&self.identifier)
    }
}

/// Response of `GET /v4/loadtracks`.
#[derive(Debug, Deserialize)]
#[serde(tag = "loadType", content = "data", rename_all = "lowercase")]
pub enum LoadResult {
    Track(Track),
    Playlist(PlaylistData),
    Search(Vec<Track>),
    Empty(IgnoredAny),
    Error(Exception),
}

impl LoadResult {
    pub fn into_tracks(self) -> Vec<Track> {
        match self {
            LoadResult::Track(track) => vec![track],
            LoadResult::Playlist(playlist) => playlist.tracks,
            LoadResult::Search(tracks) => tracks,
            LoadResult::Empty(_) | LoadResult::Error(_) => Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PlaylistData {
    pub tracks: Vec<Track>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Exception {
    pub message: Option<String>,
    #[serde(default)]
    pub severity: String,
    #[serde(default)]
    pub cause: String,
}

impl Exception {
    pub fn describe(&self) -> String {
        match &self.message {
            Some(message) => message.clone(),
            None => self.cause.clone(),
        }
    }
}

/// Body of a REST error response.
#[derive(Debug, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub error: String,
}

/// Body of `PATCH /v4/sessions/{sessionId}/players/{guildId}`.
#[derive(Debug, Default, Serialize)]
pub struct UpdatePlayer {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub track: Option<UpdatePlayerTrack>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice: Option<VoicePayload>,
}

/// `encoded: null` stops the current track.
#[derive(Debug, Serialize)]
pub struct UpdatePlayerTrack {
    pub encoded: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoicePayload {
    pub token: String,
    pub endpoint: String,
    pub session_id: String,
}

/// Body of `PATCH /v4/sessions/{sessionId}`.
#[derive(Debug, Serialize)]
pub struct UpdateSession {
    pub resuming: bool,
    pub timeout: u64,
}

/// Messages pushed over the websocket.
#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum IncomingMessage {
    Ready(ReadyOp),
    PlayerUpdate(PlayerUpdateOp),
    Stats(StatsOp),
    Event(EventOp),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadyOp {
    pub resumed: bool,
    pub session_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerUpdateOp {
    pub guild_id: String,
    pub state: PlayerState,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct PlayerState {
    pub time: u64,
    pub position: u64,
    pub connected: bool,
    pub ping: i64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StatsOp {
    pub players: u64,
    pub playing_players: u64,
    pub uptime: u64,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum EventOp {
    TrackStartEvent(TrackStartOp),
    TrackEndEvent(TrackEndOp),
    TrackExceptionEvent(TrackExceptionOp),
    TrackStuckEvent(TrackStuckOp),
    WebSocketClosedEvent(WebSocketClosedOp),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackStartOp {
    pub guild_id: String,
    pub track: Track,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackEndOp {
    pub guild_id: String,
    pub track: Track,
    pub reason: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackExceptionOp {
    pub guild_id: String,
    pub track: Track,
    pub exception: Exception,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackStuckOp {
    pub guild_id: String,
    pub track: Track,
    pub threshold_ms: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebSocketClosedOp {
    pub guild_id: String,
    pub code: u16,
    pub reason: String,
    pub by_remote: bool,
}
