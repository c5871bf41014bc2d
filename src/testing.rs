//! In-memory gateway and backend doubles shared by unit tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId, UserId};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::error::{BackendError, GatewayError};
use crate::lavalink::model::{Track, TrackInfo};
use crate::lavalink::{AudioBackend, VoiceServerInfo};
use crate::voice::{GatewayEvent, VoiceGateway, VoiceStateChange};

pub fn bot() -> UserId {
    UserId::new(1)
}

pub fn self_change(
    guild_id: GuildId,
    before: Option<ChannelId>,
    after: Option<ChannelId>,
) -> GatewayEvent {
    member_change(guild_id, bot(), before, after)
}

pub fn member_change(
    guild_id: GuildId,
    user_id: UserId,
    before: Option<ChannelId>,
    after: Option<ChannelId>,
) -> GatewayEvent {
    GatewayEvent::VoiceState(VoiceStateChange {
        guild_id,
        user_id,
        session_id: format!("session-{user_id}"),
        before,
        after,
    })
}

/// Lets spawned tasks run to completion.
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    tokio::time::sleep(Duration::from_millis(1)).await;
}

#[derive(Default)]
struct GatewayState {
    occupants: HashMap<(GuildId, ChannelId), usize>,
    fail_membership: bool,
    fail_joins: bool,
    joins: Vec<(GuildId, ChannelId)>,
    leaves: Vec<GuildId>,
    current: HashMap<GuildId, ChannelId>,
}

/// Records gateway requests. With an echo channel attached it also plays
/// Discord's part and confirms joins and leaves as self voice-state updates.
#[derive(Default)]
pub struct FakeGateway {
    state: Mutex<GatewayState>,
    echo: Option<mpsc::UnboundedSender<GatewayEvent>>,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_echo(echo: mpsc::UnboundedSender<GatewayEvent>) -> Self {
        Self {
            state: Mutex::default(),
            echo: Some(echo),
        }
    }

    pub fn set_occupants(&self, guild_id: GuildId, channel_id: ChannelId, count: usize) {
        self.state.lock().occupants.insert((guild_id, channel_id), count);
    }

    pub fn fail_membership(&self, fail: bool) {
        self.state.lock().fail_membership = fail;
    }

    pub fn fail_joins(&self, fail: bool) {
        self.state.lock().fail_joins = fail;
    }

    pub fn joins(&self) -> Vec<(GuildId, ChannelId)> {
        self.state.lock().joins.clone()
    }

    pub fn leaves(&self) -> Vec<GuildId> {
        self.state.lock().leaves.clone()
    }

    fn echo(&self, event: GatewayEvent) {
        if let Some(echo) = &self.echo {
            let _ = echo.send(event);
        }
    }
}

#[async_trait]
impl VoiceGateway for FakeGateway {
    fn current_user_id(&self) -> UserId {
        bot()
    }

    async fn join(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<(), GatewayError> {
        let before = {
            let mut state = self.state.lock();
            state.joins.push((guild_id, channel_id));
            if state.fail_joins {
                return Err(GatewayError::Join(format!("guild {guild_id} unavailable")));
            }
            state.current.insert(guild_id, channel_id)
        };
        self.echo(self_change(guild_id, before, Some(channel_id)));
        Ok(())
    }

    async fn leave(&self, guild_id: GuildId) -> Result<(), GatewayError> {
        let before = {
            let mut state = self.state.lock();
            state.leaves.push(guild_id);
            state.current.remove(&guild_id)
        };
        if before.is_some() {
            self.echo(self_change(guild_id, before, None));
        }
        Ok(())
    }

    fn channel_occupants(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<usize, GatewayError> {
        let state = self.state.lock();
        if state.fail_membership {
            return Err(GatewayError::GuildNotCached(guild_id));
        }
        Ok(state
            .occupants
            .get(&(guild_id, channel_id))
            .copied()
            .unwrap_or(0))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
    Play(GuildId, String),
    Stop(GuildId),
    Volume(GuildId, u16),
    Destroy(GuildId),
    UpdateVoice(GuildId, VoiceServerInfo),
    Close,
}

#[derive(Default)]
struct BackendState {
    calls: Vec<BackendCall>,
    tracks: HashMap<String, Track>,
    fail_voice_updates: bool,
    hang_voice_updates: bool,
}

/// Backend double with a fixed query-to-track table.
#[derive(Default)]
pub struct FakeBackend {
    state: Mutex<BackendState>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `query` resolve to a track with the given id and metadata.
    pub fn with_track(self, query: &str, encoded: &str, uri: &str, length_ms: u64) -> Self {
        let track = Track {
            encoded: encoded.to_string(),
            info: TrackInfo {
                identifier: encoded.to_string(),
                is_seekable: true,
                author: "unknown".to_string(),
                length: length_ms,
                is_stream: false,
                position: 0,
                title: "Unknown title".to_string(),
                uri: Some(uri.to_string()),
                source_name: "http".to_string(),
            },
        };
        self.state.lock().tracks.insert(query.to_string(), track);
        self
    }

    pub fn fail_voice_updates(&self, fail: bool) {
        self.state.lock().fail_voice_updates = fail;
    }

    /// Makes voice updates never complete, like a node that stopped answering.
    pub fn hang_voice_updates(&self, hang: bool) {
        self.state.lock().hang_voice_updates = hang;
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.state.lock().calls.clone()
    }

    fn record(&self, call: BackendCall) {
        self.state.lock().calls.push(call);
    }
}

#[async_trait]
impl AudioBackend for FakeBackend {
    async fn play(&self, guild_id: GuildId, query: &str) -> Result<Track, BackendError> {
        self.record(BackendCall::Play(guild_id, query.to_string()));
        self.state
            .lock()
            .tracks
            .get(query)
            .cloned()
            .ok_or_else(|| BackendError::NoTracks(query.to_string()))
    }

    async fn stop(&self, guild_id: GuildId) -> Result<(), BackendError> {
        self.record(BackendCall::Stop(guild_id));
        Ok(())
    }

    async fn set_volume(&self, guild_id: GuildId, volume: u16) -> Result<(), BackendError> {
        self.record(BackendCall::Volume(guild_id, volume));
        Ok(())
    }

    async fn destroy(&self, guild_id: GuildId) -> Result<(), BackendError> {
        self.record(BackendCall::Destroy(guild_id));
        Ok(())
    }

    async fn decode_track(&self, track_id: &str) -> Result<TrackInfo, BackendError> {
        self.state
            .lock()
            .tracks
            .values()
            .find(|t| t.encoded == track_id)
            .map(|t| t.info.clone())
            .ok_or_else(|| BackendError::Status {
                status: 400,
                message: "invalid track".to_string(),
            })
    }

    async fn update_voice(
        &self,
        guild_id: GuildId,
        voice: VoiceServerInfo,
    ) -> Result<(), BackendError> {
        let (fail, hang) = {
            let state = self.state.lock();
            (state.fail_voice_updates, state.hang_voice_updates)
        };
        self.record(BackendCall::UpdateVoice(guild_id, voice));
        if hang {
            std::future::pending::<()>().await;
        }
        if fail {
            return Err(BackendError::NoSession);
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), BackendError> {
        self.record(BackendCall::Close);
        Ok(())
    }
}
