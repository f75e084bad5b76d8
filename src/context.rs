// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Shared context for the management-cluster controllers.
//!
//! All controllers receive an `Arc<Context>` that contains:
//! - the management Kubernetes client
//! - reflector stores for `GatewayDNS` and `Cluster` objects
//! - the workload-cluster client provider
//! - process configuration
//!
//! The stores enable O(1) in-memory lookups in watch mappers, eliminating
//! API queries on the event path.

use crate::clients::ClusterClientProvider;
use crate::config::ControllerConfig;
use crate::crd::{Cluster, GatewayDNS};
use crate::selector::matches_selector;
use kube::runtime::reflector::Store;
use kube::{Client, ResourceExt};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Shared context passed to all controllers.
#[derive(Clone)]
pub struct Context {
    /// Management cluster client
    pub client: Client,

    /// Reflector stores for management-cluster resources
    pub stores: Stores,

    /// Provider of workload-cluster clients
    pub clients: Arc<dyn ClusterClientProvider>,

    /// Process configuration
    pub config: ControllerConfig,
}

/// Collection of reflector stores for cross-controller queries.
///
/// Each store is populated by a dedicated reflector task and provides
/// in-memory access to resources without API calls.
#[derive(Clone)]
pub struct Stores {
    /// All `GatewayDNS` declarations
    pub gateway_dns: Store<GatewayDNS>,

    /// All Cluster API cluster objects
    pub clusters: Store<Cluster>,
}

impl Stores {
    /// Find all `GatewayDNS` declarations whose selector matches the given
    /// cluster labels, restricted to the cluster's namespace.
    ///
    /// This is the reverse lookup behind the cluster watch: when a cluster
    /// changes, every declaration that selects it must re-converge. The
    /// result carries no duplicates, so the controller queue is never
    /// flooded on busy clusters.
    ///
    /// # Arguments
    /// * `cluster_labels` - The labels of the changed cluster
    /// * `cluster_namespace` - The namespace of the changed cluster
    ///
    /// # Returns
    /// A vector of (name, namespace) tuples for matching declarations
    #[must_use]
    pub fn gateway_dns_selecting_cluster(
        &self,
        cluster_labels: &BTreeMap<String, String>,
        cluster_namespace: &str,
    ) -> Vec<(String, String)> {
        let mut matching: Vec<(String, String)> = self
            .gateway_dns
            .state()
            .iter()
            .filter(|gateway_dns| {
                gateway_dns.namespace().as_deref() == Some(cluster_namespace)
                    && matches_selector(&gateway_dns.spec.cluster_selector, cluster_labels)
            })
            .map(|gateway_dns| {
                (
                    gateway_dns.name_any(),
                    gateway_dns.namespace().unwrap_or_default(),
                )
            })
            .collect();
        matching.sort();
        matching.dedup();
        matching
    }

    /// Get a specific `GatewayDNS` by name and namespace from the store.
    #[must_use]
    pub fn get_gateway_dns(&self, name: &str, namespace: &str) -> Option<Arc<GatewayDNS>> {
        self.gateway_dns
            .state()
            .iter()
            .find(|gateway_dns| {
                gateway_dns.name_any() == name
                    && gateway_dns.namespace().as_deref() == Some(namespace)
            })
            .cloned()
    }
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod context_tests;
