use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use marque::auth::JwtIdentity;
use marque::bookmarks::BookmarkStore;
use marque::config::{Cli, Config, default_config_dir, default_config_path};
use marque::db::Database;
use marque::handler::{AppState, router};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let args = Cli::parse();

    // With --config, data (the database) lives next to the config file.
    let (config_path, data_dir) = match args.config_path {
        Some(path) => {
            let path = PathBuf::from(path);
            let dir = path
                .parent()
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| PathBuf::from("."));
            (path, dir)
        }
        None => (default_config_path(), default_config_dir()),
    };

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    tracing::info!("marque.svc starting");

    if let Err(e) = std::fs::create_dir_all(&data_dir) {
        tracing::error!(error = %e, path = ?data_dir, "failed to create data directory");
        std::process::exit(1);
    }

    let cfg = Config::new(&config_path.to_string_lossy()).unwrap_or_else(|e| {
        tracing::error!(error = %e, path = ?config_path, "failed to load config file");
        std::process::exit(1);
    });
    let db = Arc::new(Database::new(&cfg, &data_dir).await.unwrap_or_else(|e| {
        tracing::error!(error = %e, "failed to setup database");
        std::process::exit(1);
    }));
    if let Err(e) = db.sync().await {
        tracing::warn!(error = %e, "initial replica sync failed, continuing with local state");
    }

    let cancellation_token = CancellationToken::new();
    let state = AppState {
        store: BookmarkStore::new(db.clone()),
        identity: Arc::new(JwtIdentity::new(&cfg.auth)),
        shutdown: cancellation_token.clone(),
    };
    let app = router(state);

    let address = format!("0.0.0.0:{}", cfg.app.get_port());
    let listener = tokio::net::TcpListener::bind(&address).await.unwrap_or_else(|e| {
        tracing::error!(error = %e, "failed to setup tcp listener");
        std::process::exit(1);
    });

    let shutdown_token = cancellation_token.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            tracing::info!("ctrl+c signal received, preparing to shutdown");
        }
        cancellation_token.cancel();
    });

    tracing::info!("marque.svc running on {}", &address);
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown_token.cancelled().await });
    if let Err(err) = server.await {
        tracing::error!(error = %err, "server error");
        std::process::exit(1);
    }

    if let Err(e) = db.sync().await {
        tracing::warn!(error = %e, "final replica sync failed");
    }
    tracing::info!("marque.svc going off, graceful shutdown complete");
}
