use dashmap::DashMap;
use serenity::model::id::{ChannelId, GuildId};

/// The channel the bot is confirmed to occupy in a guild.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoiceConnection {
    pub guild_id: GuildId,
    pub channel_id: ChannelId,
}

/// Concurrent map of confirmed voice connections, at most one per guild.
///
/// Written only from gateway confirmations; the command API reads it to decide
/// whether a join is needed and whether a session exists at all.
#[derive(Debug, Default)]
pub struct VoiceRegistry {
    connections: DashMap<GuildId, VoiceConnection>,
}

impl VoiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates or overwrites the guild's connection, returning the previous one.
    pub fn store(&self, guild_id: GuildId, channel_id: ChannelId) -> Option<VoiceConnection> {
        self.connections.insert(
            guild_id,
            VoiceConnection {
                guild_id,
                channel_id,
            },
        )
    }

    pub fn get(&self, guild_id: GuildId) -> Option<VoiceConnection> {
        self.connections.get(&guild_id).map(|c| *c)
    }

    pub fn channel(&self, guild_id: GuildId) -> Option<ChannelId> {
        self.get(guild_id).map(|c| c.channel_id)
    }

    pub fn is_connected_to(&self, guild_id: GuildId, channel_id: ChannelId) -> bool {
        self.channel(guild_id) == Some(channel_id)
    }

    pub fn contains(&self, guild_id: GuildId) -> bool {
        self.connections.contains_key(&guild_id)
    }

    pub fn remove(&self, guild_id: GuildId) -> Option<VoiceConnection> {
        self.connections.remove(&guild_id).map(|(_, c)| c)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_connection_per_guild() {
        let registry = VoiceRegistry::new();
        let guild = GuildId::new(1);

        assert_eq!(registry.store(guild, ChannelId::new(10)), None);
        let previous = registry.store(guild, ChannelId::new(11));

        assert_eq!(previous.map(|c| c.channel_id), Some(ChannelId::new(10)));
        assert_eq!(registry.len(), 1);
        assert!(registry.is_connected_to(guild, ChannelId::new(11)));
        assert!(!registry.is_connected_to(guild, ChannelId::new(10)));
    }

    #[test]
    fn remove_forgets_the_guild() {
        let registry = VoiceRegistry::new();
        let guild = GuildId::new(1);
        registry.store(guild, ChannelId::new(10));

        assert!(registry.remove(guild).is_some());
        assert!(!registry.contains(guild));
        assert_eq!(registry.channel(guild), None);
        assert!(registry.remove(guild).is_none());
    }
}
