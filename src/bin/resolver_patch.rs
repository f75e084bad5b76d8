// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! One-shot resolver-config patcher.
//!
//! Run as a bootstrap job on each workload cluster: discovers the cluster
//! IP of the authoritative DNS server's fronting service (polling until it
//! exists or the deadline passes), then appends the stub-domain block to
//! the cluster resolver's Corefile so queries for the cross-cluster zone
//! are forwarded there. The edit is idempotent; re-running the job is
//! always safe.

use anyhow::Result;
use clap::Parser;
use kube::Client;
use tracing::info;
use xcdns::config::PatcherConfig;
use xcdns::patcher::{CorefilePatcher, ServiceIpWatcher};

/// Patch the cluster resolver to forward the cross-cluster zone.
#[derive(Parser, Debug)]
#[command(name = "resolver-patch", version, about)]
struct Args {
    /// Skip service discovery and forward to this IP directly
    #[arg(long)]
    forwarding_ip: Option<String>,
}

fn main() -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async_main())
}

async fn async_main() -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();

    // Missing required configuration is fatal: exit non-zero before
    // touching the API server.
    let config = PatcherConfig::from_env()?;

    let client = Client::try_default().await?;

    let forwarding_ip = match args.forwarding_ip {
        Some(ip) => ip,
        None => {
            info!(
                service = %format!("{}/{}", config.dns_service_namespace, config.dns_service_name),
                "Waiting for the DNS service to acquire a cluster IP"
            );
            ServiceIpWatcher::new(
                client.clone(),
                config.dns_service_namespace.clone(),
                config.dns_service_name.clone(),
            )
            .wait_for_cluster_ip(config.service_ip_wait)
            .await?
        }
    };

    CorefilePatcher::new(
        client,
        config.resolver_config_namespace.clone(),
        config.resolver_config_name.clone(),
        config.resolver_config_key.clone(),
        config.zone(),
    )
    .append_stub(&forwarding_ip)
    .await?;

    info!("Resolver configuration is up to date");
    Ok(())
}
