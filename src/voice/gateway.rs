use async_trait::async_trait;
use serenity::{
    cache::Cache,
    model::id::{ChannelId, GuildId, UserId},
};
use songbird::Songbird;
use std::sync::Arc;
use tracing::debug;

use crate::error::GatewayError;

/// Requests the session core issues against the Discord gateway.
#[async_trait]
pub trait VoiceGateway: Send + Sync {
    /// The bot's own user id.
    fn current_user_id(&self) -> UserId;

    /// Requests joining (or moving to) `channel_id`. Confirmation arrives later
    /// as a voice-state update.
    async fn join(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<(), GatewayError>;

    /// Requests leaving the guild's voice channel.
    async fn leave(&self, guild_id: GuildId) -> Result<(), GatewayError>;

    /// Members other than the bot currently in `channel_id`, from live state.
    fn channel_occupants(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<usize, GatewayError>;
}

/// [`VoiceGateway`] backed by songbird's gateway half and serenity's cache.
///
/// Songbird only sends the voice-state updates here; audio never flows through
/// it because Lavalink holds the media connection.
pub struct SerenityGateway {
    songbird: Arc<Songbird>,
    cache: Arc<Cache>,
    user_id: UserId,
}

impl SerenityGateway {
    pub fn new(songbird: Arc<Songbird>, cache: Arc<Cache>, user_id: UserId) -> Self {
        Self {
            songbird,
            cache,
            user_id,
        }
    }
}

#[async_trait]
impl VoiceGateway for SerenityGateway {
    fn current_user_id(&self) -> UserId {
        self.user_id
    }

    async fn join(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<(), GatewayError> {
        debug!(%guild_id, %channel_id, "Solicitando conexión al canal de voz");
        self.songbird
            .join_gateway(guild_id, channel_id)
            .await
            .map(|_| ())
            .map_err(|e| GatewayError::Join(format!("{e:?}")))
    }

    async fn leave(&self, guild_id: GuildId) -> Result<(), GatewayError> {
        debug!(%guild_id, "Solicitando salida del canal de voz");
        self.songbird
            .leave(guild_id)
            .await
            .map_err(|e| GatewayError::Leave(format!("{e:?}")))
    }

    fn channel_occupants(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<usize, GatewayError> {
        let guild = self
            .cache
            .guild(guild_id)
            .ok_or(GatewayError::GuildNotCached(guild_id))?;

        let occupants = guild
            .voice_states
            .values()
            .filter(|vs| vs.channel_id == Some(channel_id))
            .filter(|vs| vs.user_id != self.user_id)
            .filter(|vs| !vs.member.as_ref().is_some_and(|m| m.user.bot))
            .count();

        Ok(occupants)
    }
}
