use anyhow::Result;
use serenity::{model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use tracing::{error, info};

mod audio;
mod bot;
mod config;
mod error;
mod sources;
mod ui;
mod voice;

use crate::audio::{inactivity::InactivityMonitor, player::MusicPlayer, registry::SessionRegistry};
use crate::bot::JukeboxBot;
use crate::config::Config;
use crate::sources::YtDlpResolver;
use crate::voice::songbird::SongbirdConnector;

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("jukebox=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Starting Jukebox v{}", env!("CARGO_PKG_VERSION"));

    let config = Arc::new(Config::load()?);
    info!("{}", config.summary());

    let resolver_options = config.resolver_options();
    let resolver = Arc::new(YtDlpResolver::new(resolver_options.clone()));

    if std::env::args().any(|arg| arg == "--health-check") {
        return health_check(&resolver).await;
    }

    // Un solo manager de songbird, compartido entre serenity y las sesiones
    let songbird = Songbird::serenity();
    let connector = Arc::new(SongbirdConnector::new(
        songbird.clone(),
        reqwest::Client::new(),
        &resolver_options,
    ));
    let registry = Arc::new(SessionRegistry::new(connector, config.max_queue_size));
    let player = Arc::new(MusicPlayer::new(registry.clone(), resolver));
    let monitor = InactivityMonitor::new(
        registry,
        config.inactivity_timeout(),
        config.inactivity_check_interval(),
    );

    let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_VOICE_STATES;
    let handler = JukeboxBot::new(config.clone(), player, monitor.clone());

    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird_with(songbird)
        .await?;

    // Manejar shutdown graceful
    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Could not listen for Ctrl+C: {:?}", e);
            return;
        }
        info!("⚠️ Shutdown signal received, closing...");
        monitor.stop();
        shard_manager.shutdown_all().await;
    });

    info!("🚀 Bot started");
    if let Err(why) = client.start().await {
        error!("Client error: {:?}", why);
    }

    Ok(())
}

async fn health_check(resolver: &YtDlpResolver) -> Result<()> {
    let version = resolver.version().await?;
    info!("yt-dlp {}", version);
    println!("OK");
    Ok(())
}
