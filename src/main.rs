// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::process::ExitCode;

use photoshare_server::{
    api::router,
    auth::{HttpKeyProvider, KeyRefresher, SigningKey, TokenVerifier},
    config::{self, Config, LogFormat},
    scheduler::spawn_periodic,
    state::AppState,
    storage::Storage,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing(config::log_format_from_env());

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Server failed to start");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env()?;
    info!(?config, "Configuration loaded");

    // The process must not serve without both trust anchors in the ring.
    let signing = SigningKey::from_private_pem(&config.private_key_pem)?;
    let provider = HttpKeyProvider::new(config.key_provider_url.as_str())?;
    let refresher = KeyRefresher::bootstrap(signing, provider).await?;

    let storage = Storage::open(&config.database_path())?;
    let verifier = TokenVerifier::new(refresher.ring(), config.token_policy);
    let state = AppState::new(verifier, storage);

    let shutdown = CancellationToken::new();
    let refresh_task = spawn_periodic(refresher, config.key_refresh_interval, shutdown.clone());

    let app = router(state, config.request_timeout);
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    info!(addr = %config.bind_addr, "Photoshare server listening (docs at /docs)");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    shutdown.cancel();
    let _ = refresh_task.await;
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
