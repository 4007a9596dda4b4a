mod core;
mod display;
mod http;
mod mpv;

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tuner_core::HttpMetadataFetcher;
use tuner_proto::config::Config;
use tuner_proto::protocol::DisplayEvent;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Setup file logging
    let data_dir = tuner_proto::platform::data_dir();
    std::fs::create_dir_all(&data_dir)?;
    let log_path = data_dir.join("tuner.log");

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(log_file)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new("info,tuner_daemon=debug,tuner_core=debug")
            }),
        )
        .init();

    info!("Log file: {:?}", log_path);

    let config = Config::load()?;
    info!("Config loaded from: {:?}", Config::config_path());

    let stations = tuner_proto::stations::load_stations(&config.stations.stations_toml)?;
    info!("Loaded {} stations", stations.len());

    if tuner_proto::platform::find_mpv_binary().is_none() {
        error!("mpv not found; stations will fail to play until it is installed");
    }

    let (display_tx, _) = broadcast::channel::<DisplayEvent>(100);
    let display = display::BroadcastSink::new(&stations, display_tx);
    let _logger_handle = display::spawn_display_logger(&display);

    let fetcher = HttpMetadataFetcher::new(
        &config.metadata.user_agent,
        config.metadata.request_timeout(),
    )?;

    // Event channel: all external inputs funnel into DaemonCore
    let (event_tx, event_rx) = tokio::sync::mpsc::channel::<core::DaemonEvent>(256);

    let daemon_core = core::DaemonCore::new(
        &config,
        stations.clone(),
        Box::new(mpv::MpvPlayerFactory::new(config.player.clone())),
        Arc::new(fetcher),
        Arc::new(display.clone()),
    );

    if config.http.enabled {
        let _http_handle = http::start_server(
            config.http.bind_address.clone(),
            config.http.port,
            display.clone(),
            stations,
            event_tx.clone(),
        );
    }

    let shutdown_tx = event_tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received");
            let _ = shutdown_tx.send(core::DaemonEvent::Shutdown).await;
        }
    });

    info!("Daemon initialised, running event loop");
    daemon_core.run(event_rx).await?;

    Ok(())
}
