//! # Voice Module
//!
//! Discord side of a guild's voice session.
//!
//! - [`registry`]: which channel the bot is confirmed to be in, per guild
//! - [`gateway`]: requests against the Discord gateway (join, leave, membership)
//! - [`listener`]: the per-guild state machine driven by voice-state updates,
//!   including auto-leave timers and voice-server forwarding
//! - [`handler`]: serenity event handler feeding the listener
//!
//! Gateway notifications are funnelled through one channel into one listener
//! task, so all voice events are processed in arrival order.

pub mod gateway;
pub mod handler;
pub mod listener;
pub mod registry;

use serenity::model::id::{ChannelId, GuildId, UserId};

pub use gateway::{SerenityGateway, VoiceGateway};
pub use handler::VoiceEventForwarder;
pub use listener::VoiceListener;
pub use registry::{VoiceConnection, VoiceRegistry};

/// A voice-state update for one member of one guild.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceStateChange {
    pub guild_id: GuildId,
    pub user_id: UserId,
    /// Discord voice session id of the member.
    pub session_id: String,
    pub before: Option<ChannelId>,
    pub after: Option<ChannelId>,
}

/// How a member's voice channel changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Join(ChannelId),
    Move { from: ChannelId, to: ChannelId },
    Leave(ChannelId),
}

impl VoiceStateChange {
    /// `None` for updates that keep the channel (mute, deafen, stream...).
    pub fn transition(&self) -> Option<Transition> {
        match (self.before, self.after) {
            (None, Some(to)) => Some(Transition::Join(to)),
            (Some(from), Some(to)) if from != to => Some(Transition::Move { from, to }),
            (Some(from), None) => Some(Transition::Leave(from)),
            _ => None,
        }
    }
}

/// Voice server credentials Discord hands out after a join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceServerUpdate {
    pub guild_id: GuildId,
    pub token: String,
    pub endpoint: String,
}

/// Gateway notifications consumed by the [`VoiceListener`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayEvent {
    VoiceState(VoiceStateChange),
    VoiceServer(VoiceServerUpdate),
}
