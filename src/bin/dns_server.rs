// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Per-workload-cluster authoritative DNS plane.
//!
//! Runs three cooperating pieces until a shutdown signal arrives:
//!
//! - an endpoint-slice watcher that projects the generated records in the
//!   controller namespace into the in-memory record cache
//! - the authoritative DNS server answering for `clusters.<domain-suffix>`
//!   over UDP and TCP
//! - a readiness endpoint that reports healthy only after the initial
//!   slice listing has been synchronised into the cache

use anyhow::Result;
use axum::{http::StatusCode, routing::get, Router};
use kube::Client;
use std::sync::Arc;
use tracing::{error, info};
use xcdns::config::DnsServerConfig;
use xcdns::dnscache::DnsCache;
use xcdns::dnsserver::{DnsHandler, DnsServer};
use xcdns::reconcilers::run_endpoint_slice_watcher;

fn main() -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .thread_name("xcdns-dns-server")
        .enable_all()
        .build()?;

    runtime.block_on(async_main())
}

fn initialize_logging() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();

    info!("Starting cross-cluster authoritative DNS server");
}

/// Serve `/readyz` and `/livez`.
///
/// Readiness gates on the cache's populated flag so the cluster resolver
/// is never pointed at a server that has not finished its initial sync.
fn start_probe_server(bind_address: String, cache: Arc<DnsCache>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let readiness_cache = cache.clone();
        let app = Router::new()
            .route(
                "/readyz",
                get(move || {
                    let cache = readiness_cache.clone();
                    async move {
                        if cache.is_populated() {
                            (StatusCode::OK, "ok")
                        } else {
                            (StatusCode::SERVICE_UNAVAILABLE, "cache not populated")
                        }
                    }
                }),
            )
            .route("/livez", get(|| async { (StatusCode::OK, "ok") }));

        let listener = match tokio::net::TcpListener::bind(&bind_address).await {
            Ok(listener) => listener,
            Err(e) => {
                error!("Failed to bind probe server to {bind_address}: {e}");
                return;
            }
        };

        info!("Probe server listening on http://{bind_address}");

        if let Err(e) = axum::serve(listener, app).await {
            error!("Probe server error: {e}");
        }
    })
}

async fn async_main() -> Result<()> {
    initialize_logging();

    // Missing required configuration is fatal: exit non-zero before
    // touching the API server.
    let config = DnsServerConfig::from_env()?;

    let client = Client::try_default().await?;
    let cache = Arc::new(DnsCache::new());

    let handler = Arc::new(DnsHandler::new(cache.clone(), &[config.zone()])?);
    let server = DnsServer::new(handler, config.listen_address.clone());

    let _probe_handle = start_probe_server(config.readiness_bind_address.clone(), cache.clone());

    let watcher_cache = cache.clone();
    let watcher_client = client.clone();
    let controller_namespace = config.controller_namespace.clone();

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            info!("Received SIGINT (Ctrl+C), shutting down...");
            result?;
            Ok(())
        }

        result = async {
            #[cfg(unix)]
            {
                use tokio::signal::unix::{signal, SignalKind};
                let mut sigterm = signal(SignalKind::terminate())?;
                sigterm.recv().await;
                Ok::<(), anyhow::Error>(())
            }
            #[cfg(not(unix))]
            {
                std::future::pending::<()>().await;
                Ok::<(), anyhow::Error>(())
            }
        } => {
            info!("Received SIGTERM, shutting down...");
            result
        }

        result = run_endpoint_slice_watcher(watcher_client, &controller_namespace, watcher_cache) => {
            error!("CRITICAL: endpoint slice watcher exited: {:?}", result);
            result
        }

        result = server.run() => {
            error!("CRITICAL: DNS server exited: {:?}", result);
            result
        }
    }
}
