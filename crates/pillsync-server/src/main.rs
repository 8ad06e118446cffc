//! pillsync-server binary.
//!
//! Reads `config.toml` (or the path specified with `--config`), applies
//! `PILLSYNC_*` environment overrides, opens the SQLite store and serves the
//! API over HTTP until interrupted.

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::Context as _;
use clap::Parser;
use pillsync_api::ApiState;
use pillsync_core::service::CareService;
use pillsync_server::{LocalIdentity, ServerConfig};
use pillsync_store_sqlite::SqliteStore;
use tokio::{net::TcpListener, signal};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "PillSync backend API server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Initialise tracing.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  // Load configuration.
  let defaults = ServerConfig::default();
  let settings = config::Config::builder()
    .set_default("host", defaults.host)?
    .set_default("port", i64::from(defaults.port))?
    .set_default("run_mode", defaults.run_mode.as_str())?
    .set_default("cors_origin", defaults.cors_origin)?
    .set_default("public_base_url", defaults.public_base_url)?
    .set_default("store_path", defaults.store_path.to_string_lossy().into_owned())?
    .set_default("token_ttl_secs", defaults.token_ttl_secs)?
    .add_source(config::File::from(cli.config).required(false))
    .add_source(config::Environment::with_prefix("PILLSYNC"))
    .build()
    .context("failed to read config file")?;

  let server_cfg: ServerConfig = settings
    .try_deserialize()
    .context("failed to deserialise ServerConfig")?;

  // Expand `~` in store path.
  let store_path = expand_tilde(&server_cfg.store_path);

  // Open SQLite store.
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;
  let store = Arc::new(store);

  // Build application state.
  let state = ApiState {
    service:         CareService::new(Arc::clone(&store)),
    identity:        Arc::new(LocalIdentity::new(
      store,
      chrono::Duration::seconds(server_cfg.token_ttl_secs),
    )),
    public_base_url: Arc::from(server_cfg.public_base_url.as_str()),
  };

  let app = pillsync_server::router(&server_cfg, state)
    .with_context(|| format!("invalid cors_origin {:?}", server_cfg.cors_origin))?;
  let address = format!("{}:{}", server_cfg.host, server_cfg.port);

  tracing::info!(
    environment = server_cfg.run_mode.as_str(),
    "Listening on http://{address} (health check at /health, API under /api)"
  );
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;

  tracing::info!("server stopped");
  Ok(())
}

/// Resolves on Ctrl+C or, on unix, SIGTERM.
async fn shutdown_signal() {
  let ctrl_c = async {
    if let Err(e) = signal::ctrl_c().await {
      tracing::error!(error = %e, "failed to install Ctrl+C handler");
      std::future::pending::<()>().await;
    }
  };

  #[cfg(unix)]
  let terminate = async {
    match signal::unix::signal(signal::unix::SignalKind::terminate()) {
      Ok(mut term) => {
        term.recv().await;
      }
      Err(e) => {
        tracing::error!(error = %e, "failed to install SIGTERM handler");
        std::future::pending::<()>().await;
      }
    }
  };

  #[cfg(not(unix))]
  let terminate = std::future::pending::<()>();

  tokio::select! {
    _ = ctrl_c => tracing::info!("received Ctrl+C, shutting down"),
    _ = terminate => tracing::info!("received SIGTERM, shutting down"),
  }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
