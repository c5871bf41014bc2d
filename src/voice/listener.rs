use dashmap::DashMap;
use serenity::model::id::{ChannelId, GuildId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{GatewayEvent, Transition, VoiceGateway, VoiceRegistry, VoiceServerUpdate, VoiceStateChange};
use crate::lavalink::{AudioBackend, VoiceServerInfo};
use crate::util::Waiters;

struct ArmedTimer {
    id: u64,
    cancel: CancellationToken,
}

/// Per-guild idle-disconnect timers.
///
/// A timer is armed when the bot's channel has no other occupants left and
/// cancelled as soon as someone joins again. When it fires it only requests a
/// gateway leave; the backend player is destroyed once the resulting leave is
/// observed by the listener.
pub struct AutoLeave {
    timers: DashMap<GuildId, ArmedTimer>,
    registry: Arc<VoiceRegistry>,
    gateway: Arc<dyn VoiceGateway>,
    delay: Duration,
    next_id: AtomicU64,
}

impl AutoLeave {
    pub fn new(
        registry: Arc<VoiceRegistry>,
        gateway: Arc<dyn VoiceGateway>,
        delay: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            timers: DashMap::new(),
            registry,
            gateway,
            delay,
            next_id: AtomicU64::new(0),
        })
    }

    pub fn is_armed(&self, guild_id: GuildId) -> bool {
        self.timers.contains_key(&guild_id)
    }

    /// Arms the guild's timer if `channel_id` is the bot's channel and nobody
    /// else is left in it. A failed membership query leaves things as they are.
    pub fn arm_if_empty(self: &Arc<Self>, guild_id: GuildId, channel_id: ChannelId) {
        if self.is_armed(guild_id) || !self.registry.is_connected_to(guild_id, channel_id) {
            return;
        }

        match self.gateway.channel_occupants(guild_id, channel_id) {
            Ok(0) => {}
            Ok(_) => return,
            Err(e) => {
                debug!(%guild_id, error = %e, "Consulta de miembros fallida, se omite auto-leave");
                return;
            }
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        self.timers.insert(
            guild_id,
            ArmedTimer {
                id,
                cancel: cancel.clone(),
            },
        );
        debug!(%guild_id, delay_secs = self.delay.as_secs(), "Trigger autoleave timer");

        let this = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(this.delay) => this.fire(guild_id, channel_id, id).await,
                _ = cancel.cancelled() => {}
            }
        });
    }

    /// Cancels the guild's timer if `channel_id` is the bot's channel and it is
    /// occupied again.
    pub fn cancel_if_occupied(&self, guild_id: GuildId, channel_id: ChannelId) {
        if !self.is_armed(guild_id) || !self.registry.is_connected_to(guild_id, channel_id) {
            return;
        }

        match self.gateway.channel_occupants(guild_id, channel_id) {
            Ok(0) => {}
            Ok(_) => {
                if self.disarm(guild_id) {
                    debug!(%guild_id, "Clear autoleave timer");
                }
            }
            Err(e) => {
                debug!(%guild_id, error = %e, "Consulta de miembros fallida, se omite auto-leave");
            }
        }
    }

    pub fn disarm(&self, guild_id: GuildId) -> bool {
        match self.timers.remove(&guild_id) {
            Some((_, timer)) => {
                timer.cancel.cancel();
                true
            }
            None => false,
        }
    }

    async fn fire(&self, guild_id: GuildId, channel_id: ChannelId, id: u64) {
        // Otro timer pudo reemplazar a este
        if self.timers.remove_if(&guild_id, |_, t| t.id == id).is_none() {
            return;
        }
        if !self.registry.is_connected_to(guild_id, channel_id) {
            debug!(%guild_id, "Auto-leave: el bot ya no está en el canal");
            return;
        }

        info!(%guild_id, %channel_id, "🚪 Canal vacío, saliendo automáticamente");
        if let Err(e) = self.gateway.leave(guild_id).await {
            warn!(%guild_id, error = %e, "Auto-leave fallido");
        }
    }
}

#[derive(Debug, Default)]
struct PendingVoice {
    session_id: Option<String>,
    server: Option<VoiceServerUpdate>,
}

/// Per-guild voice state machine.
///
/// Consumes [`GatewayEvent`]s in order. The bot's own transitions maintain the
/// registry, release `init` waiters and tear down backend players; other
/// members' transitions drive auto-leave. Voice-server credentials are paired
/// with the bot's voice session id and forwarded to the backend.
pub struct VoiceListener {
    registry: Arc<VoiceRegistry>,
    waiters: Arc<Waiters<GuildId>>,
    gateway: Arc<dyn VoiceGateway>,
    backend: Arc<dyn AudioBackend>,
    auto_leave: Arc<AutoLeave>,
    voice_sessions: HashMap<GuildId, PendingVoice>,
}

impl VoiceListener {
    pub fn new(
        registry: Arc<VoiceRegistry>,
        waiters: Arc<Waiters<GuildId>>,
        gateway: Arc<dyn VoiceGateway>,
        backend: Arc<dyn AudioBackend>,
        auto_leave_delay: Duration,
    ) -> Self {
        let auto_leave = AutoLeave::new(registry.clone(), gateway.clone(), auto_leave_delay);
        Self {
            registry,
            waiters,
            gateway,
            backend,
            auto_leave,
            voice_sessions: HashMap::new(),
        }
    }

    pub fn auto_leave(&self) -> &Arc<AutoLeave> {
        &self.auto_leave
    }

    pub async fn run(mut self, mut events: mpsc::UnboundedReceiver<GatewayEvent>) {
        info!("🎧 Escuchando eventos de voz");
        while let Some(event) = events.recv().await {
            self.handle(event).await;
        }
        info!("Listener de voz detenido");
    }

    pub async fn handle(&mut self, event: GatewayEvent) {
        match event {
            GatewayEvent::VoiceState(change) => self.on_voice_state(change).await,
            GatewayEvent::VoiceServer(update) => self.on_voice_server(update),
        }
    }

    async fn on_voice_state(&mut self, change: VoiceStateChange) {
        let Some(transition) = change.transition() else {
            return;
        };

        if change.user_id == self.gateway.current_user_id() {
            self.on_self_transition(change, transition).await;
        } else {
            self.on_member_transition(change.guild_id, transition);
        }
    }

    async fn on_self_transition(&mut self, change: VoiceStateChange, transition: Transition) {
        let guild_id = change.guild_id;

        match transition {
            Transition::Join(channel_id) => {
                self.confirm(guild_id, channel_id);
                debug!(%guild_id, %channel_id, "Voice state created");
                self.remember_session(guild_id, change.session_id);
            }
            Transition::Move { to, .. } => {
                self.confirm(guild_id, to);
                debug!(%guild_id, channel_id = %to, "Voice state updated");
                self.auto_leave.disarm(guild_id);
                self.auto_leave.arm_if_empty(guild_id, to);
                self.remember_session(guild_id, change.session_id);
            }
            Transition::Leave(channel_id) => {
                self.registry.remove(guild_id);
                self.auto_leave.disarm(guild_id);
                self.voice_sessions.remove(&guild_id);

                let backend = self.backend.clone();
                tokio::spawn(async move {
                    if let Err(e) = backend.destroy(guild_id).await {
                        warn!(%guild_id, error = %e, "No se pudo destruir el player de Lavalink");
                    }
                });
                debug!(%guild_id, %channel_id, "Voice state removed");
            }
        }
    }

    fn on_member_transition(&self, guild_id: GuildId, transition: Transition) {
        match transition {
            Transition::Join(channel_id) => {
                self.auto_leave.cancel_if_occupied(guild_id, channel_id);
            }
            Transition::Move { from, to } => {
                self.auto_leave.arm_if_empty(guild_id, from);
                self.auto_leave.cancel_if_occupied(guild_id, to);
            }
            Transition::Leave(channel_id) => {
                self.auto_leave.arm_if_empty(guild_id, channel_id);
            }
        }
    }

    fn confirm(&self, guild_id: GuildId, channel_id: ChannelId) {
        self.registry.store(guild_id, channel_id);
        self.waiters.broadcast_and_remove(&guild_id);
    }

    fn remember_session(&mut self, guild_id: GuildId, session_id: String) {
        self.voice_sessions.entry(guild_id).or_default().session_id = Some(session_id);
        self.forward_voice(guild_id);
    }

    fn on_voice_server(&mut self, update: VoiceServerUpdate) {
        let guild_id = update.guild_id;
        self.voice_sessions.entry(guild_id).or_default().server = Some(update);
        self.forward_voice(guild_id);
    }

    /// Forwards the voice-server credentials once both halves are known. The
    /// request runs on its own task so a slow node never stalls gateway events.
    fn forward_voice(&mut self, guild_id: GuildId) {
        let Some(pending) = self.voice_sessions.get_mut(&guild_id) else {
            return;
        };
        let Some(session_id) = pending.session_id.clone() else {
            return;
        };
        let Some(server) = pending.server.take() else {
            return;
        };

        let voice = VoiceServerInfo {
            session_id,
            token: server.token,
            endpoint: server.endpoint,
        };
        let backend = self.backend.clone();
        tokio::spawn(async move {
            match backend.update_voice(guild_id, voice).await {
                Ok(()) => debug!(%guild_id, "Servidor de voz enviado a Lavalink"),
                Err(e) => error!(%guild_id, error = %e, "❌ Error enviando el servidor de voz a Lavalink"),
            }
        });
    }
}
