use color_eyre::{eyre::eyre, Result};
use deckbuttons::config::MonitorConfig;
use deckbuttons::monitor::MonitorCoordinator;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

const DRAIN_INTERVAL: Duration = Duration::from_millis(50);
const STATUS_INTERVAL: Duration = Duration::from_secs(10);
const EVENTS_PER_DRAIN: usize = 10;

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;

    let config_path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(MonitorConfig::default_path);
    info!("Loading configuration from {}", config_path.display());
    let config = MonitorConfig::load(&config_path)?;

    let mut coordinator = MonitorCoordinator::new(&config);
    coordinator
        .try_start()
        .map_err(|e| eyre!("Failed to start button monitoring: {}", e))?;

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Ctrl-C received, shutting down"),
            Err(e) => error!("Unable to listen for Ctrl-C: {}", e),
        }
        signal_token.cancel();
    });

    let mut drain = interval(DRAIN_INTERVAL);
    drain.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut status = interval(STATUS_INTERVAL);
    status.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = drain.tick() => {
                for event in coordinator.get_events(EVENTS_PER_DRAIN) {
                    info!(
                        "{} {} at {}",
                        event.button,
                        if event.pressed { "pressed" } else { "released" },
                        event.captured_at.format("%H:%M:%S%.3f")
                    );
                }
                if let Ok(held) = coordinator.get_button_state() {
                    debug!("Held: {:?}", held);
                }
            }
            _ = status.tick() => {
                let snapshot = coordinator.get_status();
                info!("Status: {:?}", snapshot);
            }
        }
    }

    tokio::task::spawn_blocking(move || coordinator.stop()).await?;
    info!("Shutdown complete");
    Ok(())
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    setup_logging_env();
    Ok(())
}

fn setup_logging_env() {
    FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();
}
