use anyhow::Context as _;
use riftwatch::commands;
use riftwatch::config::Config;
use riftwatch::discord::{DiscordGateway, Handler};
use riftwatch::monitor::GameMonitor;
use riftwatch::riot::RiotClient;
use riftwatch::store::TrackerStore;
use serenity::all::GatewayIntents;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::Mutex;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    let config = if Path::new("riftwatch.toml").exists() {
        Config::load(Path::new("riftwatch.toml"))?
    } else {
        Config::from_env()
    };

    // Initialize logging
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));
    if config.logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    info!("riftwatch v{} starting", env!("CARGO_PKG_VERSION"));

    if let Err(e) = config.ensure_secrets() {
        error!(error = %e, "refusing to start without required secrets");
        return Err(e.into());
    }

    let store = Arc::new(Mutex::new(TrackerStore::open(&config.tracker.db_file)));
    let riot = Arc::new(RiotClient::new(
        config.riot.api_key.clone(),
        Duration::from_secs(config.riot.request_timeout_secs),
    ));

    // Best effort: placeholders are used when Data Dragon is unreachable.
    let assets = Arc::new(riot.fetch_assets().await);

    let (command_tx, mut command_rx) = commands::channel();

    let mut client = serenity::Client::builder(&config.discord.token, GatewayIntents::empty())
        .event_handler(Handler::new(store.clone(), command_tx))
        .await
        .context("failed to build Discord client")?;

    let gateway = Arc::new(DiscordGateway::new(client.http.clone()));
    let monitor = Arc::new(GameMonitor::new(
        store,
        riot,
        gateway,
        assets,
        Duration::from_secs(config.tracker.new_game_call_pause_secs),
        Duration::from_secs(config.tracker.finished_call_pause_secs),
    ));

    // --- Periodic tasks ---

    // New-match poll over all tracked players
    let monitor_new = monitor.clone();
    let new_game_every = Duration::from_secs(config.tracker.new_game_poll_secs);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(new_game_every);
        loop {
            interval.tick().await;
            monitor_new.run_new_game_cycle().await;
        }
    });

    // Finished-match poll over all in-flight matches
    let monitor_finished = monitor.clone();
    let finished_every = Duration::from_secs(config.tracker.finished_poll_secs);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(finished_every);
        loop {
            interval.tick().await;
            monitor_finished.run_finished_cycle().await;
        }
    });

    // Command drain: one queued command per tick
    let monitor_commands = monitor.clone();
    let drain_every = Duration::from_secs(config.tracker.command_drain_secs);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(drain_every);
        loop {
            interval.tick().await;
            match command_rx.try_recv() {
                Ok(command) => monitor_commands.handle_command(command).await,
                Err(TryRecvError::Empty) => {}
                Err(TryRecvError::Disconnected) => break,
            }
        }
    });

    info!("connecting to Discord gateway");
    client.start().await.context("Discord client error")?;
    Ok(())
}
