// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

use anyhow::Result;
use axum::{routing::get, Router};
use futures::StreamExt;
use kube::{
    runtime::{controller::Action, finalizer, reflector, watcher, watcher::Config, Controller},
    Api, Client, ResourceExt,
};
use kube_lease_manager::LeaseManagerBuilder;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use xcdns::{
    clients::KubeconfigClientCache,
    config::ControllerConfig,
    constants::{
        DEFAULT_LEASE_DURATION_SECS, DEFAULT_LEASE_RETRY_PERIOD_SECS, ERROR_REQUEUE_DURATION_SECS,
        FINALIZER_GATEWAY_DNS, KIND_GATEWAY_DNS, METRICS_SERVER_PATH, TOKIO_WORKER_THREADS,
    },
    context::{Context, Stores},
    crd::{Cluster, GatewayDNS},
    metrics,
    reconcilers::{delete_gatewaydns, reconcile_gatewaydns},
};

#[derive(Debug, thiserror::Error)]
#[error(transparent)]
struct ReconcileError(#[from] anyhow::Error);

fn main() -> Result<()> {
    // Build Tokio runtime with custom thread names
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(TOKIO_WORKER_THREADS)
        .thread_name("xcdns-operator")
        .enable_all()
        .build()?;

    runtime.block_on(async_main())
}

/// Initialize logging with custom format
///
/// Respects `RUST_LOG` environment variable if set, otherwise defaults to INFO level.
/// Respects `RUST_LOG_FORMAT` environment variable for output format (json or text).
fn initialize_logging() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let log_format = std::env::var("RUST_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    match log_format.to_lowercase().as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .json()
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .with_ansi(true)
                .compact()
                .init();
        }
    }

    info!("Starting cross-cluster gateway DNS operator");
}

/// Initialize reflectors for `GatewayDNS` and `Cluster` and create the
/// shared context.
///
/// Each reflector spawns a background task that watches its resource type
/// and updates the corresponding store. The stores back the cluster-event
/// fan-out without API queries on the event path.
fn initialize_shared_context(client: Client, config: ControllerConfig) -> Arc<Context> {
    info!("Initializing reflectors for GatewayDNS and Cluster");

    let gateway_dns_api = Api::<GatewayDNS>::all(client.clone());
    let clusters_api = Api::<Cluster>::all(client.clone());

    let (gateway_dns_store, gateway_dns_writer) = reflector::store();
    let (clusters_store, clusters_writer) = reflector::store();

    tokio::spawn(async move {
        let stream = watcher(gateway_dns_api, watcher::Config::default());
        reflector(gateway_dns_writer, stream)
            .for_each(|_| futures::future::ready(()))
            .await;
        warn!("GatewayDNS reflector stream ended");
    });

    tokio::spawn(async move {
        let stream = watcher(clusters_api, watcher::Config::default());
        reflector(clusters_writer, stream)
            .for_each(|_| futures::future::ready(()))
            .await;
        warn!("Cluster reflector stream ended");
    });

    let stores = Stores {
        gateway_dns: gateway_dns_store,
        clusters: clusters_store,
    };

    let clients = Arc::new(KubeconfigClientCache::new(client.clone()));

    Arc::new(Context {
        client,
        stores,
        clients,
        config,
    })
}

/// Start the Prometheus metrics HTTP server
///
/// # Returns
/// A `JoinHandle` that can be used to monitor the server task
fn start_metrics_server(bind_address: String) -> tokio::task::JoinHandle<()> {
    info!(bind_address = %bind_address, path = METRICS_SERVER_PATH, "Starting Prometheus metrics HTTP server");

    tokio::spawn(async move {
        async fn metrics_handler() -> String {
            match metrics::gather_metrics() {
                Ok(metrics_text) => metrics_text,
                Err(e) => {
                    error!("Failed to gather metrics: {}", e);
                    String::from("# Error gathering metrics\n")
                }
            }
        }

        let app = Router::new().route(METRICS_SERVER_PATH, get(metrics_handler));

        let listener = match tokio::net::TcpListener::bind(&bind_address).await {
            Ok(listener) => listener,
            Err(e) => {
                error!("Failed to bind metrics server to {bind_address}: {e}");
                return;
            }
        };

        info!("Metrics server listening on http://{bind_address}{METRICS_SERVER_PATH}");

        if let Err(e) = axum::serve(listener, app).await {
            error!("Metrics server error: {e}");
        }
    })
}

/// Reconcile every existing `GatewayDNS` once.
///
/// Runs on start-up (after leadership, when enabled) so state converges
/// even when no watch event is pending, e.g. after the operator was down
/// while workload clusters changed.
async fn perform_startup_sweep(client: Client, context: Arc<Context>) {
    let gateway_dns_api: Api<GatewayDNS> = Api::all(client);
    match gateway_dns_api.list(&kube::api::ListParams::default()).await {
        Ok(declarations) => {
            info!("Found {} GatewayDNS resources", declarations.items.len());
            for gateway_dns in declarations.items {
                let name = gateway_dns.name_any();
                let namespace = gateway_dns.namespace().unwrap_or_default();
                match Box::pin(reconcile_gatewaydns(context.clone(), gateway_dns)).await {
                    Ok(()) => debug!("GatewayDNS {}/{} reconciled successfully", namespace, name),
                    Err(e) => warn!("Failed to reconcile GatewayDNS {}/{}: {}", namespace, name, e),
                }
            }
        }
        Err(e) => warn!("Failed to list GatewayDNS resources: {}", e),
    }
}

async fn async_main() -> Result<()> {
    initialize_logging();

    // Missing required configuration is fatal: exit non-zero before
    // touching the API server.
    let config = ControllerConfig::from_env()?;

    let kube_config = kube::Config::infer().await?;
    let client = Client::try_from(kube_config)?;

    let context = initialize_shared_context(client.clone(), config.clone());

    let _metrics_handle = start_metrics_server(config.metrics_bind_address.clone());

    if config.enable_leader_election {
        let lease_name =
            std::env::var("XCDNS_LEASE_NAME").unwrap_or_else(|_| "xcdns-leader".to_string());
        let lease_namespace = std::env::var("POD_NAMESPACE")
            .unwrap_or_else(|_| config.controller_namespace.clone());
        let identity = std::env::var("POD_NAME")
            .or_else(|_| std::env::var("HOSTNAME"))
            .unwrap_or_else(|_| format!("xcdns-{}", rand::random::<u32>()));

        info!(
            lease_name = %lease_name,
            lease_namespace = %lease_namespace,
            identity = %identity,
            "Leader election enabled, waiting to acquire leadership..."
        );

        let lease_manager = LeaseManagerBuilder::new(client.clone(), &lease_name)
            .with_namespace(&lease_namespace)
            .with_identity(&identity)
            .with_duration(DEFAULT_LEASE_DURATION_SECS)
            .with_grace(DEFAULT_LEASE_RETRY_PERIOD_SECS)
            .build()
            .await?;

        let (leader_rx, _lease_handle) = lease_manager.watch().await;

        let mut rx = leader_rx.clone();
        while !*rx.borrow_and_update() {
            rx.changed().await?;
        }

        info!("Leadership acquired, starting controller...");
        metrics::record_leader_elected(&identity);

        perform_startup_sweep(client.clone(), context.clone()).await;

        let result = run_with_shutdown(context, Some((leader_rx, identity))).await;
        info!("Graceful shutdown completed, leader election lease released");
        return result;
    }

    warn!("Leader election DISABLED - running without high availability");
    perform_startup_sweep(client.clone(), context.clone()).await;
    let result = run_with_shutdown(context, None).await;
    info!("Graceful shutdown completed successfully");
    result
}

/// Monitor leadership status - returns when leadership is lost or an error occurs
async fn monitor_leadership(
    mut leader_rx: tokio::sync::watch::Receiver<bool>,
) -> Result<(), anyhow::Error> {
    loop {
        leader_rx.changed().await?;
        if !*leader_rx.borrow() {
            return Ok(());
        }
    }
}

/// Run the operator with signal handling and, when enabled, leadership
/// monitoring. Returns on SIGINT/SIGTERM (clean) or when leadership is
/// lost (error).
async fn run_with_shutdown(
    context: Arc<Context>,
    leadership: Option<(tokio::sync::watch::Receiver<bool>, String)>,
) -> Result<()> {
    let leadership_monitor = async {
        match leadership {
            Some((leader_rx, identity)) => {
                let result = monitor_leadership(leader_rx).await;
                metrics::record_leader_lost(&identity);
                result
            }
            // No leader election: never resolves.
            None => std::future::pending().await,
        }
    };

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            info!("Received SIGINT (Ctrl+C), initiating graceful shutdown...");
            result.map_err(anyhow::Error::from)
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
            info!("Received SIGTERM (pod termination), initiating graceful shutdown...");
            result
        }

        result = leadership_monitor => {
            match result {
                Ok(()) => {
                    warn!("Leadership lost! Stopping operator...");
                    anyhow::bail!("Leadership lost - stepping down")
                }
                Err(e) => {
                    error!("Leadership monitor error: {:?}", e);
                    anyhow::bail!("Leadership monitoring failed: {e}")
                }
            }
        }

        result = run_gatewaydns_operator(context) => {
            error!("CRITICAL: GatewayDNS operator exited unexpectedly: {:?}", result);
            result?;
            anyhow::bail!("GatewayDNS operator exited unexpectedly without error")
        }
    }
}

/// Run the `GatewayDNS` operator.
///
/// Watches the `GatewayDNS` kind, and fans cluster events out to every
/// declaration in the cluster's namespace whose selector matches the
/// cluster's labels. The fan-out mapper queries the in-memory store and
/// returns a deduplicated set, so a busy cluster cannot starve unrelated
/// declarations.
async fn run_gatewaydns_operator(context: Arc<Context>) -> Result<()> {
    info!("Starting GatewayDNS operator");

    let client = context.client.clone();
    let api = Api::<GatewayDNS>::all(client.clone());
    let cluster_api = Api::<Cluster>::all(client.clone());

    let ctx_for_watch = context.clone();

    Controller::new(api, Config::default())
        .watches(cluster_api, Config::default(), move |cluster| {
            let Some(namespace) = cluster.namespace() else {
                return vec![];
            };
            let labels = cluster.metadata.labels.clone().unwrap_or_default();

            ctx_for_watch
                .stores
                .gateway_dns_selecting_cluster(&labels, &namespace)
                .into_iter()
                .map(|(name, ns)| {
                    kube::runtime::reflector::ObjectRef::new(&name).within(&ns)
                })
                .collect::<Vec<_>>()
        })
        .run(reconcile_gatewaydns_wrapper, error_policy, context)
        .for_each(|_| futures::future::ready(()))
        .await;

    Ok(())
}

/// Reconcile wrapper for `GatewayDNS`
///
/// Handles the finalizer-driven lifecycle: apply events converge the
/// declaration, cleanup events retire everything it owns. Successful
/// reconciles requeue at the polling interval - the backstop that
/// re-converges when workload-cluster state changes without any
/// management-cluster event.
async fn reconcile_gatewaydns_wrapper(
    gateway_dns: Arc<GatewayDNS>,
    ctx: Arc<Context>,
) -> Result<Action, ReconcileError> {
    let start = std::time::Instant::now();

    debug!(
        gateway_dns = %gateway_dns.name_any(),
        namespace = ?gateway_dns.namespace(),
        "Reconcile wrapper called for GatewayDNS"
    );

    let namespace = gateway_dns.namespace().unwrap_or_default();
    let api: Api<GatewayDNS> = Api::namespaced(ctx.client.clone(), &namespace);
    let polling_interval = ctx.config.polling_interval;

    let context = ctx.clone();
    let result = finalizer(&api, FINALIZER_GATEWAY_DNS, gateway_dns.clone(), |event| async {
        match event {
            finalizer::Event::Apply(declaration) => {
                reconcile_gatewaydns(context.clone(), (*declaration).clone())
                    .await
                    .map_err(ReconcileError::from)?;
                info!(
                    "Successfully reconciled GatewayDNS: {}",
                    declaration.name_any()
                );
                Ok(Action::requeue(polling_interval))
            }
            finalizer::Event::Cleanup(declaration) => {
                delete_gatewaydns(context.clone(), (*declaration).clone())
                    .await
                    .map_err(ReconcileError::from)?;
                info!(
                    "Successfully cleaned up GatewayDNS: {}",
                    declaration.name_any()
                );
                Ok(Action::await_change())
            }
        }
    })
    .await;

    let duration = start.elapsed();
    if result.is_ok() {
        metrics::record_reconciliation_success(KIND_GATEWAY_DNS, duration);
    } else {
        metrics::record_reconciliation_error(KIND_GATEWAY_DNS, duration);
        metrics::record_error(KIND_GATEWAY_DNS, "reconcile_error");
    }

    result.map_err(|e: finalizer::Error<ReconcileError>| match e {
        finalizer::Error::ApplyFailed(err) | finalizer::Error::CleanupFailed(err) => err,
        finalizer::Error::AddFinalizer(err) | finalizer::Error::RemoveFinalizer(err) => {
            ReconcileError::from(anyhow::anyhow!("Finalizer error: {err}"))
        }
        finalizer::Error::UnnamedObject => {
            ReconcileError::from(anyhow::anyhow!("GatewayDNS has no name"))
        }
        finalizer::Error::InvalidFinalizer => {
            ReconcileError::from(anyhow::anyhow!("Invalid finalizer name"))
        }
    })
}

/// Error policy for the controller.
///
/// Returns an action to requeue the resource after a delay when reconciliation fails.
#[allow(clippy::needless_pass_by_value)] // Signature required by kube::runtime::Controller
fn error_policy<T, C>(resource: Arc<T>, err: &ReconcileError, _ctx: Arc<C>) -> Action
where
    T: std::fmt::Debug,
{
    error!(
        error = %err,
        resource = ?resource,
        "Reconciliation error - will retry in {}s",
        ERROR_REQUEUE_DURATION_SECS
    );
    Action::requeue(Duration::from_secs(ERROR_REQUEUE_DURATION_SECS))
}
