// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::{env, net::SocketAddr, time::Duration};

use axum_server::{tls_rustls::RustlsConfig, Handle};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use renovation_rust_server::{
    api::router,
    config::{AppConfig, LOG_FORMAT_ENV},
    payment_poller::PaymentPoller,
    providers::ProviderRegistry,
    state::{AppState, AuthConfig},
    storage::{DocumentStorage, StoragePaths},
};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match env::var(LOG_FORMAT_ENV).as_deref() {
        Ok("json") => builder.json().init(),
        _ => builder.pretty().init(),
    }
}

#[tokio::main]
async fn main() {
    // Optional .env file.
    let _ = dotenvy::dotenv();
    init_tracing();

    let config = AppConfig::from_env().expect("Invalid configuration");

    let mut storage = DocumentStorage::new(StoragePaths::new(&config.data_dir));
    storage
        .initialize()
        .expect("Failed to initialize data directory");
    info!(data_dir = %config.data_dir.display(), "storage initialized");

    if config.jwt_secret.is_none() {
        if cfg!(feature = "dev") {
            warn!("AUTH_JWT_SECRET not set: bearer tokens are decoded WITHOUT signature verification");
        } else {
            warn!("AUTH_JWT_SECRET not set: authenticated routes will reject every request");
        }
    }

    let state = AppState::new(storage, ProviderRegistry::from_env())
        .with_auth_config(AuthConfig {
            jwt_secret: config.jwt_secret.clone(),
            issuer: config.jwt_issuer.clone(),
        })
        .with_public_base_url(config.public_base_url.clone());

    let shutdown = CancellationToken::new();
    let poller = PaymentPoller::new(state.reconciler.clone()).with_interval(config.poll_interval);
    let poller_task = tokio::spawn(poller.run(shutdown.clone()));

    let app = router(state);
    let handle: Handle<SocketAddr> = Handle::new();
    tokio::spawn(shutdown_signal(handle.clone(), shutdown.clone()));

    let addr = config.bind_addr;
    match &config.tls {
        Some(tls) => {
            // Install the ring crypto provider for rustls (must be done before any TLS operations)
            rustls::crypto::ring::default_provider()
                .install_default()
                .expect("Failed to install rustls crypto provider");
            let tls_config = RustlsConfig::from_pem_file(&tls.cert, &tls.key)
                .await
                .expect("Failed to load TLS certificate or key");

            info!(%addr, "renovation payments server listening on https (docs at /docs)");
            axum_server::bind_rustls(addr, tls_config)
                .handle(handle)
                .serve(app.into_make_service())
                .await
                .expect("HTTPS server failed");
        }
        None => {
            info!(%addr, "renovation payments server listening on http (docs at /docs)");
            axum_server::bind(addr)
                .handle(handle)
                .serve(app.into_make_service())
                .await
                .expect("HTTP server failed");
        }
    }

    shutdown.cancel();
    if let Err(error) = poller_task.await {
        warn!(error = %error, "payment poller task ended abnormally");
    }
}

async fn shutdown_signal(handle: Handle<SocketAddr>, shutdown: CancellationToken) {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!(error = %error, "failed to listen for ctrl-c");
        return;
    }
    info!("Received ctrl+C signal, shutting down");
    shutdown.cancel();
    handle.graceful_shutdown(Some(SHUTDOWN_GRACE));
}
