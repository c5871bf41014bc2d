use serenity::{
    all::{Context, EventHandler, Ready, VoiceServerUpdateEvent, VoiceState},
    async_trait,
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::{GatewayEvent, VoiceServerUpdate, VoiceStateChange};

/// Serenity event handler that hands voice notifications to the
/// [`VoiceListener`](super::VoiceListener) task, in the order they are received.
pub struct VoiceEventForwarder {
    events: mpsc::UnboundedSender<GatewayEvent>,
}

impl VoiceEventForwarder {
    pub fn new(events: mpsc::UnboundedSender<GatewayEvent>) -> Self {
        Self { events }
    }

    fn forward(&self, event: GatewayEvent) {
        if self.events.send(event).is_err() {
            warn!("Listener de voz detenido, evento descartado");
        }
    }
}

#[async_trait]
impl EventHandler for VoiceEventForwarder {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!("✅ {} conectado al gateway", ready.user.name);
    }

    async fn voice_state_update(&self, _ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        if let Some(change) = voice_state_change(old.as_ref(), &new) {
            self.forward(GatewayEvent::VoiceState(change));
        }
    }

    async fn voice_server_update(&self, _ctx: Context, event: VoiceServerUpdateEvent) {
        match voice_server_update(event) {
            Some(update) => self.forward(GatewayEvent::VoiceServer(update)),
            None => debug!("Voice server update sin guild o endpoint, ignorado"),
        }
    }
}

/// Maps serenity's before/after voice states onto a [`VoiceStateChange`].
/// Updates outside a guild are ignored.
pub fn voice_state_change(old: Option<&VoiceState>, new: &VoiceState) -> Option<VoiceStateChange> {
    let guild_id = new.guild_id.or_else(|| old.and_then(|o| o.guild_id))?;

    Some(VoiceStateChange {
        guild_id,
        user_id: new.user_id,
        session_id: new.session_id.clone(),
        before: old.and_then(|o| o.channel_id),
        after: new.channel_id,
    })
}

/// A missing endpoint means the voice server is being reallocated; a later
/// update will carry the new one.
pub fn voice_server_update(event: VoiceServerUpdateEvent) -> Option<VoiceServerUpdate> {
    Some(VoiceServerUpdate {
        guild_id: event.guild_id?,
        token: event.token,
        endpoint: event.endpoint?,
    })
}
