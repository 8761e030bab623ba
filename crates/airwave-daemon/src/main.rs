mod core;
mod http;
mod hub;
mod metadata;
mod registry;
mod transcoder;

use std::sync::Arc;
use std::time::Duration;

use airwave_proto::catalog::Catalog;
use airwave_proto::config::Config;
use airwave_proto::order::PlaybackOrder;
use airwave_proto::state::StationState;
use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::hub::BroadcastHub;
use crate::metadata::{MetadataResolver, TagResolver};
use crate::transcoder::{FfmpegCommand, TranscoderManager};

fn init_logging(config: &Config) -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,airwave_daemon=debug"));

    let file_layer = match &config.logging.file {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            let log_file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {:?}", path))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(log_file)
                    .with_ansi(false),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .with(filter)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load()?;
    init_logging(&config)?;
    info!("Config loaded from: {:?}", Config::config_path());
    if let Some(log_path) = &config.logging.file {
        info!("Log file: {:?}", log_path);
    }

    let catalog = Catalog::scan(
        &config.library.src_folder,
        &config.library.extensions,
        config.library.recursive,
    )?;
    info!(
        "Catalog: {} tracks under {:?}",
        catalog.len(),
        catalog.root()
    );

    // Event channel: transcoder exits and retries funnel into StationCore
    let (event_tx, event_rx) = tokio::sync::mpsc::channel::<core::StationEvent>(256);

    let hub = Arc::new(BroadcastHub::new(config.http.listener_queue));
    let station = Arc::new(StationState::new());
    let resolver: Arc<dyn MetadataResolver> = Arc::new(TagResolver);

    let ffmpeg = FfmpegCommand::from_config(&config.transcoder);
    info!("Transcoder: {:?}", ffmpeg.binary());
    let transcoder = TranscoderManager::new(Arc::new(ffmpeg), hub.clone(), event_tx.clone());

    let http_state = http::HttpState {
        hub: hub.clone(),
        station: station.clone(),
        resolver: resolver.clone(),
        placeholder_cover: config.library.placeholder_cover.clone(),
    };
    let index = if config.http.show_index_page {
        http::IndexPage::Static(config.http.public_dir.clone())
    } else {
        http::IndexPage::RedirectToStream
    };

    let station_core = core::StationCore::new(
        catalog,
        PlaybackOrder::from_shuffle_flag(config.playback.shuffle),
        transcoder,
        resolver,
        station,
        event_tx,
        Duration::from_secs(config.playback.failure_backoff_secs),
    );

    let _http_handle =
        http::start_server(config.listen_address(), http::router(http_state, index)).await?;

    info!("Station initialised, running event loop");
    tokio::select! {
        result = station_core.run(event_rx) => result?,
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                warn!("Failed to listen for shutdown signal: {}", e);
            }
            // Dropping the controller kills the live transcoder.
            info!("Shutdown requested");
        }
    }

    Ok(())
}
