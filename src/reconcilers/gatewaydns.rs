// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! `GatewayDNS` reconciliation logic.
//!
//! The classic edge-triggered loop: read the declaration, list the
//! clusters it selects, observe their gateway services, and converge the
//! resulting endpoint-slice set onto *every* cluster in the declaration's
//! namespace. Converging onto all clusters (not only selected ones) is
//! what lets clusters removed from the selector have their stale slices
//! cleaned up.
//!
//! Deletion is a convergence with an empty desired set, retiring every
//! slice the group owns on every cluster.

use crate::context::Context;
use crate::crd::{GatewayDNS, GatewayDnsId, ServiceRef};
use crate::reconcilers::collector::GatewayCollector;
use crate::reconcilers::converge::EndpointSliceConverger;
use crate::search::ClusterSearcher;
use anyhow::Result;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Reconcile one `GatewayDNS` declaration.
///
/// # Errors
///
/// Returns an error when the declaration is malformed, the management API
/// cannot be read, or convergence failed on at least one cluster. The
/// caller requeues on error.
pub async fn reconcile_gatewaydns(ctx: Arc<Context>, gateway_dns: GatewayDNS) -> Result<()> {
    let Some(id) = GatewayDnsId::from_gateway_dns(&gateway_dns) else {
        anyhow::bail!("GatewayDNS has no name or namespace");
    };
    let service = ServiceRef::parse(&gateway_dns.spec.service)?;

    let searcher = ClusterSearcher::new(ctx.client.clone());
    let selected = searcher
        .list_matching(&gateway_dns.spec.cluster_selector, &id.namespace)
        .await?;
    let all_clusters = searcher.list_all(&id.namespace).await?;

    debug!(
        gateway_dns = %id,
        selected = selected.len(),
        targets = all_clusters.len(),
        "Collecting gateway endpoints"
    );

    let collector = GatewayCollector::new(
        ctx.clients.clone(),
        ctx.config.controller_namespace.clone(),
        ctx.config.domain_suffix.clone(),
    );
    let desired = collector.collect(&id, &service, &selected).await;

    let converger = EndpointSliceConverger::new(
        ctx.clients.clone(),
        ctx.config.controller_namespace.clone(),
    );
    let errors = converger.converge(&all_clusters, &id, &desired).await;

    if !errors.is_empty() {
        for error in &errors {
            warn!(gateway_dns = %id, error = %error, "Cluster convergence failed");
        }
        anyhow::bail!(
            "convergence failed on {} of {} clusters",
            errors.len(),
            all_clusters.len()
        );
    }

    info!(
        gateway_dns = %id,
        gateways = desired.len(),
        clusters = all_clusters.len(),
        "GatewayDNS converged"
    );
    Ok(())
}

/// Retire everything a deleted `GatewayDNS` owns.
///
/// Every cluster in the declaration's namespace is converged with an
/// empty desired set, so every slice carrying this group's back-reference
/// is deleted.
///
/// # Errors
///
/// Returns an error when cleanup failed on at least one cluster; the
/// finalizer stays until cleanup succeeds everywhere.
pub async fn delete_gatewaydns(ctx: Arc<Context>, gateway_dns: GatewayDNS) -> Result<()> {
    let Some(id) = GatewayDnsId::from_gateway_dns(&gateway_dns) else {
        anyhow::bail!("GatewayDNS has no name or namespace");
    };

    let searcher = ClusterSearcher::new(ctx.client.clone());
    let all_clusters = searcher.list_all(&id.namespace).await?;

    let converger = EndpointSliceConverger::new(
        ctx.clients.clone(),
        ctx.config.controller_namespace.clone(),
    );
    let errors = converger.converge(&all_clusters, &id, &[]).await;

    if !errors.is_empty() {
        for error in &errors {
            warn!(gateway_dns = %id, error = %error, "Cluster cleanup failed");
        }
        anyhow::bail!(
            "cleanup failed on {} of {} clusters",
            errors.len(),
            all_clusters.len()
        );
    }

    info!(gateway_dns = %id, clusters = all_clusters.len(), "GatewayDNS retired");
    Ok(())
}
