// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Gateway service observation across workload clusters.
//!
//! For each selected cluster the collector fetches the group's named
//! service and classifies the cluster into exactly one of three states:
//!
//! - **reachable with endpoints** - the service is a load balancer with at
//!   least one ingress address; a [`ClusterGateway`] with those addresses
//!   is emitted
//! - **absent** - the cluster answered but has no such service (or the
//!   service has no load-balancer address); nothing is emitted, and
//!   records describing this cluster are retired downstream
//! - **unreachable** - the cluster could not be asked; a record with
//!   `unreachable` set is emitted so the converger leaves any existing
//!   records for this cluster alone
//!
//! Conflating "absent" with "unreachable" would make flapping clusters
//! delete their records everywhere, which is the one failure mode this
//! tri-state exists to prevent.

use crate::clients::ClusterClientProvider;
use crate::constants::{CLUSTERS_SUBDOMAIN, GATEWAY_SLICE_NAME_SUFFIX};
use crate::crd::{Cluster, ClusterId, GatewayDnsId, ServiceRef};
use k8s_openapi::api::core::v1::Service;
use kube::{Api, ResourceExt};
use std::sync::Arc;
use tracing::{debug, warn};

/// The observed gateway service of one cluster: its load-balancer ingress
/// addresses in observation order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GatewayService {
    /// Ingress IP addresses; never empty
    pub addresses: Vec<String>,
}

/// One cluster's contribution to a group's desired state.
///
/// Exactly one of `gateway` (with at least one address) or `unreachable`
/// holds; a reachable cluster whose service lacks a load-balancer address
/// contributes nothing and has no record at all.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClusterGateway {
    /// Identity of the observed cluster
    pub cluster: ClusterId,

    /// The group this observation belongs to
    pub gateway_dns: GatewayDnsId,

    /// Reserved namespace on workload clusters where generated records live
    pub controller_namespace: String,

    /// Fixed trailing labels of the generated hostname
    pub domain_suffix: String,

    /// The gateway observation, when the cluster was reachable
    pub gateway: Option<GatewayService>,

    /// Whether the cluster could not be asked at all
    pub unreachable: bool,
}

impl ClusterGateway {
    /// Build a record for a reachable cluster with gateway addresses.
    #[must_use]
    pub fn reachable(
        cluster: ClusterId,
        gateway_dns: GatewayDnsId,
        controller_namespace: &str,
        domain_suffix: &str,
        addresses: Vec<String>,
    ) -> Self {
        Self {
            cluster,
            gateway_dns,
            controller_namespace: controller_namespace.to_string(),
            domain_suffix: domain_suffix.to_string(),
            gateway: Some(GatewayService { addresses }),
            unreachable: false,
        }
    }

    /// Build a record for a cluster that could not be asked.
    #[must_use]
    pub fn unreachable(
        cluster: ClusterId,
        gateway_dns: GatewayDnsId,
        controller_namespace: &str,
        domain_suffix: &str,
    ) -> Self {
        Self {
            cluster,
            gateway_dns,
            controller_namespace: controller_namespace.to_string(),
            domain_suffix: domain_suffix.to_string(),
            gateway: None,
            unreachable: true,
        }
    }

    /// Deterministic name of the endpoint slice describing this cluster:
    /// `<cluster-namespace>-<cluster-name>-gateway`.
    #[must_use]
    pub fn endpoint_slice_name(&self) -> String {
        endpoint_slice_name(&self.cluster)
    }

    /// Wildcard hostname served for this cluster's gateway:
    /// `*.gateway.<cluster-name>.<cluster-namespace>.clusters.<domain-suffix>`.
    #[must_use]
    pub fn dns_hostname(&self) -> String {
        format!(
            "*.{GATEWAY_SLICE_NAME_SUFFIX}.{}.{}.{CLUSTERS_SUBDOMAIN}.{}",
            self.cluster.name, self.cluster.namespace, self.domain_suffix
        )
    }
}

/// Deterministic slice name for a cluster identity.
#[must_use]
pub fn endpoint_slice_name(cluster: &ClusterId) -> String {
    format!(
        "{}-{}-{GATEWAY_SLICE_NAME_SUFFIX}",
        cluster.namespace, cluster.name
    )
}

/// Extract the load-balancer ingress IPs of a service.
///
/// Returns `Some` only for a `LoadBalancer`-typed service whose status
/// carries at least one ingress entry with an `ip`; addresses keep the
/// API server's observation order.
#[must_use]
pub fn load_balancer_ingress_ips(service: &Service) -> Option<Vec<String>> {
    let spec = service.spec.as_ref()?;
    if spec.type_.as_deref() != Some("LoadBalancer") {
        return None;
    }

    let addresses: Vec<String> = service
        .status
        .as_ref()?
        .load_balancer
        .as_ref()?
        .ingress
        .as_ref()?
        .iter()
        .filter_map(|ingress| ingress.ip.clone())
        .collect();

    if addresses.is_empty() {
        return None;
    }
    Some(addresses)
}

/// Observes the group's gateway service on each selected cluster.
pub struct GatewayCollector {
    provider: Arc<dyn ClusterClientProvider>,
    controller_namespace: String,
    domain_suffix: String,
}

impl GatewayCollector {
    /// Create a collector producing records for the given controller
    /// namespace and domain suffix.
    #[must_use]
    pub fn new(
        provider: Arc<dyn ClusterClientProvider>,
        controller_namespace: String,
        domain_suffix: String,
    ) -> Self {
        Self {
            provider,
            controller_namespace,
            domain_suffix,
        }
    }

    /// Observe the named service on every cluster, in order.
    ///
    /// Never fails as a whole: per-cluster problems are folded into the
    /// tri-state classification described at the module level.
    pub async fn collect(
        &self,
        gateway_dns: &GatewayDnsId,
        service: &ServiceRef,
        clusters: &[Cluster],
    ) -> Vec<ClusterGateway> {
        let mut gateways = Vec::with_capacity(clusters.len());

        for cluster in clusters {
            let Some(cluster_id) = ClusterId::from_cluster(cluster) else {
                warn!(cluster = %cluster.name_any(), "Cluster object without name or namespace, skipping");
                continue;
            };

            if let Some(gateway) = self
                .collect_cluster(gateway_dns, service, &cluster_id)
                .await
            {
                gateways.push(gateway);
            }
        }

        gateways
    }

    /// Classify a single cluster.
    async fn collect_cluster(
        &self,
        gateway_dns: &GatewayDnsId,
        service: &ServiceRef,
        cluster_id: &ClusterId,
    ) -> Option<ClusterGateway> {
        let client = match self.provider.get_client(cluster_id).await {
            Ok(client) => client,
            Err(error) => {
                warn!(cluster = %cluster_id, error = %error, "Cluster unreachable, preserving its records");
                return Some(ClusterGateway::unreachable(
                    cluster_id.clone(),
                    gateway_dns.clone(),
                    &self.controller_namespace,
                    &self.domain_suffix,
                ));
            }
        };

        let services: Api<Service> = Api::namespaced(client, &service.namespace);
        match services.get_opt(&service.name).await {
            Ok(Some(observed)) => match load_balancer_ingress_ips(&observed) {
                Some(addresses) => Some(ClusterGateway::reachable(
                    cluster_id.clone(),
                    gateway_dns.clone(),
                    &self.controller_namespace,
                    &self.domain_suffix,
                    addresses,
                )),
                None => {
                    debug!(
                        cluster = %cluster_id,
                        service = %service,
                        "Gateway service has no load-balancer address, not participating"
                    );
                    None
                }
            },
            Ok(None) => {
                debug!(cluster = %cluster_id, service = %service, "Gateway service absent, not participating");
                None
            }
            Err(error) => {
                warn!(cluster = %cluster_id, error = %error, "Gateway service fetch failed, preserving records");
                Some(ClusterGateway::unreachable(
                    cluster_id.clone(),
                    gateway_dns.clone(),
                    &self.controller_namespace,
                    &self.domain_suffix,
                ))
            }
        }
    }
}

#[cfg(test)]
#[path = "collector_tests.rs"]
mod collector_tests;
