mod blur;
mod cli;
mod config;
mod daemon;
mod ipc;
mod wallpaper;

use std::sync::Arc;

use clap::Parser;
use cli::Cli;
use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use config::OutputConfig;
use daemon::{Backends, DaemonError, Settings};
use wallpaper::{ImageMagick, RetryPolicy, Swaymsg};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    if let Err(e) = start(cli).await {
        tracing::error!(error = %e, "waybl failed");
        eprintln!("waybl: {e}");
        std::process::exit(1);
    }
}

async fn start(cli: Cli) -> Result<(), DaemonError> {
    let cache_dir = config::prepare_cache_dir(cli.cache_dir.as_deref())?;
    tracing::info!(path = %cache_dir.display(), "cache directory");

    let outputs = OutputConfig::from_args(&cli.wallpapers)?;
    tracing::info!(wallpapers = outputs.len(), blur = %cli.blur, "configured");
    let socket = ipc::resolve_socket_path(cli.socket.as_deref())?;

    let settings = Settings {
        outputs: Arc::new(outputs),
        cache_dir,
        socket: socket.clone(),
        retry: RetryPolicy::default(),
    };
    let backends = Backends {
        renderer: Arc::new(ImageMagick::new(cli.blur)),
        setter: Arc::new(Swaymsg::new(Some(socket))),
    };

    let shutdown = CancellationToken::new();
    spawn_signal_watcher(shutdown.clone())?;

    daemon::run(settings, backends, shutdown).await
}

/// Cancel `shutdown` on SIGTERM or SIGINT.
fn spawn_signal_watcher(shutdown: CancellationToken) -> Result<(), DaemonError> {
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    tokio::spawn(async move {
        tokio::select! {
            _ = sigterm.recv() => tracing::info!("received SIGTERM"),
            _ = sigint.recv() => tracing::info!("received SIGINT"),
        }
        shutdown.cancel();
    });
    Ok(())
}
