use std::{net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use clap::Parser;
use newtube_relay::{
    config::{DEFAULT_CONFIG_PATH, load_runtime_config_from},
    logging::init_logging,
    provider::YtDlp,
    server::{AppState, router},
    staging::StagingArea,
};
use tokio::signal;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about = "Relay YouTube renditions as downloadable files.")]
struct Cli {
    #[arg(
        long = "config",
        value_name = "PATH",
        default_value = DEFAULT_CONFIG_PATH,
        help = "KEY=VALUE configuration file"
    )]
    config: PathBuf,
    #[arg(long = "host", value_name = "ADDR", help = "Override RELAY_HOST")]
    host: Option<String>,
    #[arg(long = "port", value_name = "PORT", help = "Override RELAY_PORT")]
    port: Option<u16>,
    #[arg(
        long = "staging-dir",
        value_name = "PATH",
        help = "Override STAGING_DIR"
    )]
    staging_dir: Option<PathBuf>,
    #[arg(long = "yt-dlp", value_name = "PATH", help = "Override YTDLP_PATH")]
    yt_dlp: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging()?;

    let mut config = load_runtime_config_from(&cli.config)
        .with_context(|| format!("loading configuration from {}", cli.config.display()))?;
    if let Some(host) = cli.host {
        config.relay_host = host;
    }
    if let Some(port) = cli.port {
        config.relay_port = port;
    }
    if let Some(dir) = cli.staging_dir {
        config.staging_dir = dir;
    }
    if let Some(program) = cli.yt_dlp {
        config.ytdlp_path = program;
    }

    let provider = YtDlp::new(&config.ytdlp_path)
        .with_cookies(config.cookies_file.clone())
        .with_metadata_timeout(Duration::from_secs(config.provider_timeout_secs));
    provider.ensure_available().await?;

    let staging = StagingArea::new(&config.staging_dir);
    let swept = staging
        .prepare()
        .with_context(|| format!("preparing staging directory {}", staging.dir().display()))?;
    if swept > 0 {
        info!(swept, dir = %staging.dir().display(), "removed leftover staging files");
    }

    let state = AppState::new(Arc::new(provider), staging, config.selection_mode);
    let app = router(state);

    let addr = SocketAddr::new(
        config
            .relay_host
            .parse()
            .with_context(|| format!("parsing relay host {}", config.relay_host))?,
        config.relay_port,
    );
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding to {}", addr))?;
    info!(
        selection_mode = %config.selection_mode,
        "relay listening on http://{}",
        addr
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("running relay server")?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = signal::ctrl_c().await {
        warn!("failed to install Ctrl+C handler: {}", err);
    }
}
