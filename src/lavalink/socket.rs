use futures::{SinkExt, StreamExt};
use serenity::model::id::GuildId;
use tokio::{net::TcpStream, sync::mpsc, sync::watch};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{client::IntoClientRequest, http::HeaderValue, Message},
    MaybeTlsStream, WebSocketStream,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::backoff::{Backoff, ReconnectPolicy};
use super::client::LavalinkRest;
use super::model::{EventOp, IncomingMessage, ReadyOp};
use super::BackendEvent;
use crate::error::BackendError;

pub(crate) type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Everything needed to (re)open the push socket.
#[derive(Debug, Clone)]
pub(crate) struct SocketSettings {
    pub url: String,
    pub password: String,
    pub user_id: u64,
    pub client_name: String,
    pub resume_timeout: u64,
}

/// Opens the websocket. `resume_key` is the previous session id, which lets the
/// node rehydrate players after a short disconnect.
pub(crate) async fn open(
    settings: &SocketSettings,
    resume_key: Option<&str>,
) -> Result<WsStream, BackendError> {
    let mut request = settings.url.as_str().into_client_request()?;
    let headers = request.headers_mut();
    headers.insert("Authorization", header_value(&settings.password)?);
    headers.insert("User-Id", header_value(&settings.user_id.to_string())?);
    headers.insert("Client-Name", header_value(&settings.client_name)?);
    if let Some(key) = resume_key {
        headers.insert("Session-Id", header_value(key)?);
    }

    let (ws, _) = connect_async(request).await?;
    Ok(ws)
}

fn header_value(value: &str) -> Result<HeaderValue, BackendError> {
    HeaderValue::from_str(value)
        .map_err(|_| BackendError::Config(format!("'{value}' is not a valid header value")))
}

enum Closed {
    Shutdown,
    Lost(String),
}

/// Push-event connection with automatic reconnection.
pub(crate) struct PushSocket {
    pub settings: SocketSettings,
    pub rest: LavalinkRest,
    pub session: watch::Sender<Option<String>>,
    pub events: mpsc::UnboundedSender<BackendEvent>,
    pub policy: ReconnectPolicy,
    pub shutdown: CancellationToken,
}

impl PushSocket {
    /// Reads `initial` until it drops, then reconnects with backoff until the
    /// shutdown token fires. The attempt counter restarts after every success.
    pub(crate) async fn run(self, initial: WsStream) {
        let mut stream = Some(initial);
        let mut backoff = Backoff::new(self.policy);

        loop {
            if let Some(ws) = stream.take() {
                match self.read(ws).await {
                    Closed::Shutdown => {
                        info!("🔌 Conexión de eventos con Lavalink cerrada");
                        return;
                    }
                    Closed::Lost(reason) => {
                        warn!(%reason, "Conexión de eventos con Lavalink perdida, reconectando...");
                        let _ = self.events.send(BackendEvent::Disconnected { reason });
                    }
                }
            }

            let (attempt, delay) = backoff.next_attempt();
            debug!(attempt, delay_ms = delay.as_millis() as u64, "Esperando para reconectar");

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.shutdown.cancelled() => return,
            }

            let resume_key = self.session.borrow().clone();
            let opened = tokio::select! {
                opened = open(&self.settings, resume_key.as_deref()) => opened,
                _ = self.shutdown.cancelled() => return,
            };

            match opened {
                Ok(ws) => {
                    info!(attempt, "✅ Reconectado a Lavalink");
                    backoff.succeeded();
                    stream = Some(ws);
                }
                Err(e) => {
                    warn!(attempt, error = %e, "Reconexión a Lavalink fallida");
                }
            }
        }
    }

    async fn read(&self, ws: WsStream) -> Closed {
        let (mut sink, mut frames) = ws.split();

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    let _ = sink.send(Message::Close(None)).await;
                    return Closed::Shutdown;
                }
                frame = frames.next() => match frame {
                    Some(Ok(Message::Text(text))) => self.dispatch(text.as_str()).await,
                    Some(Ok(Message::Close(frame))) => {
                        let reason = frame
                            .map(|f| format!("{} {}", u16::from(f.code), f.reason.as_str()))
                            .unwrap_or_else(|| "closed by remote".to_string());
                        return Closed::Lost(reason);
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Closed::Lost(e.to_string()),
                    None => return Closed::Lost("stream ended".to_string()),
                },
            }
        }
    }

    async fn dispatch(&self, text: &str) {
        match serde_json::from_str::<IncomingMessage>(text) {
            Ok(IncomingMessage::Ready(ready)) => self.on_ready(ready).await,
            Ok(IncomingMessage::PlayerUpdate(update)) => {
                trace!(
                    guild_id = %update.guild_id,
                    position = update.state.position,
                    connected = update.state.connected,
                    ping = update.state.ping,
                    "Player update"
                );
            }
            Ok(IncomingMessage::Stats(stats)) => {
                trace!(
                    players = stats.players,
                    playing = stats.playing_players,
                    uptime = stats.uptime,
                    "Lavalink stats"
                );
            }
            Ok(IncomingMessage::Event(op)) => {
                if let Some(event) = backend_event(op) {
                    let _ = self.events.send(event);
                }
            }
            Err(e) => debug!(error = %e, "Mensaje de Lavalink no reconocido"),
        }
    }

    async fn on_ready(&self, ready: ReadyOp) {
        if ready.resumed {
            info!(session_id = %ready.session_id, "♻️ Sesión de Lavalink reanudada");
        } else {
            info!(session_id = %ready.session_id, "🎼 Sesión de Lavalink iniciada");
        }
        self.session.send_replace(Some(ready.session_id.clone()));

        if self.settings.resume_timeout > 0 {
            if let Err(e) = self
                .rest
                .enable_resuming(&ready.session_id, self.settings.resume_timeout)
                .await
            {
                warn!(error = %e, "No se pudo habilitar la reanudación de sesión");
            }
        }
    }
}

fn parse_guild_id(raw: &str) -> Option<GuildId> {
    raw.parse::<u64>().ok().filter(|id| *id != 0).map(GuildId::new)
}

/// Maps a pushed event op onto a [`BackendEvent`]. Ops with an unusable guild id
/// are dropped.
pub(crate) fn backend_event(op: EventOp) -> Option<BackendEvent> {
    let event = match op {
        EventOp::TrackStartEvent(e) => BackendEvent::TrackStart {
            guild_id: parse_guild_id(&e.guild_id)?,
            track_id: e.track.encoded,
        },
        EventOp::TrackEndEvent(e) => BackendEvent::TrackEnd {
            guild_id: parse_guild_id(&e.guild_id)?,
            track_id: e.track.encoded,
            reason: e.reason,
        },
        EventOp::TrackExceptionEvent(e) => BackendEvent::TrackException {
            guild_id: parse_guild_id(&e.guild_id)?,
            track_id: e.track.encoded,
            message: e.exception.describe(),
        },
        EventOp::TrackStuckEvent(e) => BackendEvent::TrackStuck {
            guild_id: parse_guild_id(&e.guild_id)?,
            track_id: e.track.encoded,
            threshold_ms: e.threshold_ms,
        },
        EventOp::WebSocketClosedEvent(e) => BackendEvent::VoiceSocketClosed {
            guild_id: parse_guild_id(&e.guild_id)?,
            code: e.code,
            reason: e.reason,
            by_remote: e.by_remote,
        },
    };
    Some(event)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn event(raw: serde_json::Value) -> Option<BackendEvent> {
        match serde_json::from_value::<IncomingMessage>(raw).unwrap() {
            IncomingMessage::Event(op) => backend_event(op),
            other => panic!("not an event: {other:?}"),
        }
    }

    fn track() -> serde_json::Value {
        json!({"encoded": "abc", "info": {"identifier": "x", "length": 2000, "uri": "u1"}})
    }

    #[test]
    fn track_end_keeps_the_opaque_id_and_reason() {
        let parsed = event(json!({
            "op": "event", "type": "TrackEndEvent", "guildId": "99",
            "track": track(), "reason": "finished"
        }));

        assert_eq!(
            parsed,
            Some(BackendEvent::TrackEnd {
                guild_id: GuildId::new(99),
                track_id: "abc".into(),
                reason: "finished".into(),
            })
        );
    }

    #[test]
    fn exception_message_is_carried() {
        let parsed = event(json!({
            "op": "event", "type": "TrackExceptionEvent", "guildId": "5",
            "track": track(),
            "exception": {"message": "decoder died", "severity": "fault", "cause": "x"}
        }));

        assert_eq!(
            parsed,
            Some(BackendEvent::TrackException {
                guild_id: GuildId::new(5),
                track_id: "abc".into(),
                message: "decoder died".into(),
            })
        );
    }

    #[test]
    fn events_for_invalid_guilds_are_dropped() {
        let parsed = event(json!({
            "op": "event", "type": "TrackStartEvent", "guildId": "not-a-snowflake",
            "track": track()
        }));
        assert_eq!(parsed, None);
    }

    #[test]
    fn settings_reject_unsafe_header_values() {
        let err = header_value("line\nbreak").unwrap_err();
        assert!(matches!(err, BackendError::Config(_)));
    }

    #[tokio::test]
    async fn lost_connection_reconnects_with_the_previous_session_id() {
        use std::time::Duration;
        use tokio::net::TcpListener;
        use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
        use tokio_tungstenite::{accept_async, accept_hdr_async};

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let (resumed_tx, mut resumed_rx) = mpsc::unbounded_channel();

        let node = tokio::spawn(async move {
            // Entrega la sesión y cierra
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(tcp).await.unwrap();
            let ready = r#"{"op":"ready","resumed":false,"sessionId":"s1"}"#;
            ws.send(Message::text(ready.to_string())).await.unwrap();
            ws.close(None).await.unwrap();

            // Un intento fallido antes del handshake
            let (tcp, _) = listener.accept().await.unwrap();
            drop(tcp);

            let (tcp, _) = listener.accept().await.unwrap();
            let _ws = accept_hdr_async(tcp, |req: &Request, resp: Response| {
                let key = req
                    .headers()
                    .get("Session-Id")
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                let _ = resumed_tx.send(key);
                Ok::<Response, ErrorResponse>(resp)
            })
            .await
            .unwrap();
            std::future::pending::<()>().await;
        });

        let settings = SocketSettings {
            url: format!("ws://{address}/v4/websocket"),
            password: "pw".into(),
            user_id: 1,
            client_name: "open-soundboard-test".into(),
            resume_timeout: 0,
        };
        let initial = open(&settings, None).await.unwrap();
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let (session_tx, session_rx) = watch::channel(None);
        let shutdown = CancellationToken::new();
        let push = PushSocket {
            rest: LavalinkRest::new(&address, "pw", false).unwrap(),
            settings,
            session: session_tx,
            events: events_tx,
            policy: ReconnectPolicy::new(
                Duration::from_millis(10),
                Duration::ZERO,
                Duration::ZERO,
                Duration::from_millis(50),
            ),
            shutdown: shutdown.clone(),
        };
        let task = tokio::spawn(push.run(initial));

        let resume_key = tokio::time::timeout(Duration::from_secs(5), resumed_rx.recv())
            .await
            .expect("reconnected after the failed attempt")
            .unwrap();
        assert_eq!(resume_key.as_deref(), Some("s1"));
        assert_eq!(session_rx.borrow().as_deref(), Some("s1"));
        assert!(matches!(
            events_rx.try_recv(),
            Ok(BackendEvent::Disconnected { .. })
        ));

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("loop stops on shutdown")
            .unwrap();
        node.abort();
    }
}
