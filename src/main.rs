use anyhow::Result;
use serenity::{model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use open_soundboard::cache;
use open_soundboard::config::Config;
use open_soundboard::lavalink::LavalinkBridge;
use open_soundboard::player::SessionManager;
use open_soundboard::server::FileServer;
use open_soundboard::storage::FileStorage;
use open_soundboard::voice::{SerenityGateway, VoiceEventForwarder};

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("open_soundboard=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🔊 Iniciando Open Soundboard v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::load()?;
    info!("{}", config.summary());

    let storage = Arc::new(FileStorage::new(config.data_dir.clone()).await?);

    // Solo GUILDS y GUILD_VOICE_STATES: la membresía de canales sale del cache
    let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_VOICE_STATES;

    let (gateway_tx, gateway_rx) = mpsc::unbounded_channel();
    let songbird = Songbird::serenity();
    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(VoiceEventForwarder::new(gateway_tx))
        .register_songbird_with(songbird.clone())
        .await?;

    let user_id = client.http.get_current_user().await?.id;

    info!("🎼 Inicializando Lavalink...");
    let (bridge, backend_events) = LavalinkBridge::connect(config.lavalink_config(), user_id).await?;
    info!("✅ Lavalink inicializado");

    let gateway = Arc::new(SerenityGateway::new(songbird, client.cache.clone(), user_id));
    let manager = Arc::new(SessionManager::new(
        gateway,
        Arc::new(bridge),
        config.session_settings()?,
    ));

    tokio::spawn(manager.voice_listener().run(gateway_rx));
    manager.spawn_event_translation(backend_events);

    let shutdown = CancellationToken::new();
    cache::spawn_cleanup(
        manager.track_cache().clone(),
        config.track_cache_cleanup(),
        shutdown.clone(),
    );

    let file_server = FileServer::new(config.file_server_addr(), storage);
    let server_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = file_server.serve(server_shutdown).await {
            error!("❌ Servidor de archivos detenido: {:?}", e);
        }
    });

    {
        let mut data = client.data.write().await;
        data.insert::<SessionManager>(manager.clone());
    }

    // Manejar shutdown graceful
    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Error al registrar Ctrl+C: {:?}", e);
            return;
        }
        info!("⚠️ Señal de shutdown recibida, cerrando...");
        manager.close().await;
        shutdown.cancel();
        shard_manager.shutdown_all().await;
    });

    info!("🚀 Bot iniciado exitosamente");
    if let Err(why) = client.start().await {
        error!("Error al ejecutar cliente: {:?}", why);
    }

    Ok(())
}
