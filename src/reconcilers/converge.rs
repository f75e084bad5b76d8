// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Endpoint-slice convergence onto workload clusters.
//!
//! Given a group's desired cluster-gateway records, the converger drives
//! every target cluster's slice set in the controller namespace toward the
//! desired subset: missing slices are created, drifted ones rewritten,
//! undesired ones deleted. Failures on one cluster never abort the others;
//! the caller receives the aggregated error list.
//!
//! # Ownership rules
//!
//! A slice belongs to the reconciling group iff it carries both the
//! hostname and back-reference annotations and the back-reference names
//! the group. Un-annotated slices are foreign: they are read back solely
//! to detect name collisions and are never deletion candidates. The single
//! exception is the take-over rule: when creating a desired slice collides
//! with an existing name, the existing object is deterministically
//! rewritten and annotated.
//!
//! # Unreachable clusters
//!
//! A desired record marked unreachable contributes no slice, but its
//! derived name shields any existing slice from deletion: the cluster's
//! real state is simply unknown at the moment.

use crate::clients::ClusterClientProvider;
use crate::constants::{
    ADDRESS_TYPE_IPV4, DNS_HOSTNAME_ANNOTATION, GATEWAY_DNS_REF_ANNOTATION, KIND_ENDPOINT_SLICE,
    SERVICE_NAME_LABEL,
};
use crate::crd::{Cluster, ClusterId, GatewayDnsId};
use crate::metrics;
use crate::reconcilers::collector::ClusterGateway;
use anyhow::{Context as _, Result};
use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::api::discovery::v1::{Endpoint, EndpointSlice};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{DeleteParams, ListParams, PostParams};
use kube::{Api, Client};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Convergence failure on a single cluster.
#[derive(Debug, thiserror::Error)]
#[error("converging cluster {cluster}: {source}")]
pub struct ConvergeError {
    /// The cluster that failed
    pub cluster: ClusterId,
    /// The underlying failure
    #[source]
    pub source: anyhow::Error,
}

/// The writes required to bring one cluster in line with the desired set.
///
/// `preserve` lists owned slices that would be deleted but describe a
/// currently-unreachable cluster; they are left alone.
#[derive(Debug, Default)]
pub struct SlicePlan {
    /// Slices to create, by desired shape
    pub create: Vec<EndpointSlice>,
    /// Slices to rewrite, merged onto the existing object
    pub update: Vec<EndpointSlice>,
    /// Slice names to delete
    pub delete: Vec<String>,
    /// Slice names spared because their cluster is unreachable
    pub preserve: Vec<String>,
}

impl SlicePlan {
    /// Whether the plan performs no writes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.create.is_empty() && self.update.is_empty() && self.delete.is_empty()
    }
}

/// Whether a slice is owned by the given group: both annotations present
/// and the back-reference names the group.
#[must_use]
pub fn is_owned_by(slice: &EndpointSlice, gateway_dns: &GatewayDnsId) -> bool {
    let Some(annotations) = slice.metadata.annotations.as_ref() else {
        return false;
    };
    annotations.contains_key(DNS_HOSTNAME_ANNOTATION)
        && annotations.get(GATEWAY_DNS_REF_ANNOTATION) == Some(&gateway_dns.to_string())
}

/// Build the desired slice shape for one reachable cluster-gateway record.
///
/// The name is derived from the cluster identity, both ownership
/// annotations are set, the platform's service indexer label points at the
/// slice itself, and every ingress address lands in a single endpoint
/// entry with address type IPv4.
#[must_use]
pub fn desired_endpoint_slice(gateway: &ClusterGateway) -> EndpointSlice {
    let name = gateway.endpoint_slice_name();

    let mut annotations = BTreeMap::new();
    annotations.insert(DNS_HOSTNAME_ANNOTATION.to_string(), gateway.dns_hostname());
    annotations.insert(
        GATEWAY_DNS_REF_ANNOTATION.to_string(),
        gateway.gateway_dns.to_string(),
    );

    let mut labels = BTreeMap::new();
    labels.insert(SERVICE_NAME_LABEL.to_string(), name.clone());

    let addresses = gateway
        .gateway
        .as_ref()
        .map(|observed| observed.addresses.clone())
        .unwrap_or_default();

    EndpointSlice {
        metadata: ObjectMeta {
            name: Some(name),
            namespace: Some(gateway.controller_namespace.clone()),
            annotations: Some(annotations),
            labels: Some(labels),
            ..Default::default()
        },
        address_type: ADDRESS_TYPE_IPV4.to_string(),
        endpoints: vec![Endpoint {
            addresses,
            ..Default::default()
        }],
        ports: None,
    }
}

/// Whether an existing slice already carries the desired content: hostname
/// annotation, address type, endpoint addresses, and ports.
#[must_use]
pub fn slice_content_matches(existing: &EndpointSlice, desired: &EndpointSlice) -> bool {
    let hostname = |slice: &EndpointSlice| {
        slice
            .metadata
            .annotations
            .as_ref()
            .and_then(|annotations| annotations.get(DNS_HOSTNAME_ANNOTATION).cloned())
    };
    let addresses = |slice: &EndpointSlice| {
        slice
            .endpoints
            .iter()
            .map(|endpoint| endpoint.addresses.clone())
            .collect::<Vec<_>>()
    };

    hostname(existing) == hostname(desired)
        && existing.address_type == desired.address_type
        && addresses(existing) == addresses(desired)
        && existing.ports == desired.ports
}

/// Rewrite an existing slice with the desired ownership and content,
/// preserving its identity (name, namespace, resource version) so the
/// write is a plain update.
#[must_use]
pub fn merge_desired(existing: &EndpointSlice, desired: &EndpointSlice) -> EndpointSlice {
    let mut merged = existing.clone();

    merged.metadata.annotations = desired.metadata.annotations.clone();
    let labels = merged.metadata.labels.get_or_insert_with(Default::default);
    if let Some(desired_labels) = desired.metadata.labels.as_ref() {
        for (key, value) in desired_labels {
            labels.insert(key.clone(), value.clone());
        }
    }

    merged.address_type = desired.address_type.clone();
    merged.endpoints = desired.endpoints.clone();
    merged.ports = desired.ports.clone();
    merged
}

/// Diff one cluster's existing slices against the group's desired records.
///
/// Only slices owned by the group participate in the update/delete sets;
/// foreign slices are invisible here (collisions surface at create time).
#[must_use]
pub fn plan_for_cluster(
    existing: &[EndpointSlice],
    gateway_dns: &GatewayDnsId,
    desired: &[ClusterGateway],
) -> SlicePlan {
    let owned: HashMap<String, &EndpointSlice> = existing
        .iter()
        .filter(|slice| is_owned_by(slice, gateway_dns))
        .filter_map(|slice| Some((slice.metadata.name.clone()?, slice)))
        .collect();

    let desired_slices: HashMap<String, EndpointSlice> = desired
        .iter()
        .filter(|gateway| !gateway.unreachable)
        .map(|gateway| (gateway.endpoint_slice_name(), desired_endpoint_slice(gateway)))
        .collect();

    let unreachable_names: HashSet<String> = desired
        .iter()
        .filter(|gateway| gateway.unreachable)
        .map(ClusterGateway::endpoint_slice_name)
        .collect();

    let mut plan = SlicePlan::default();

    for (name, desired_slice) in &desired_slices {
        match owned.get(name) {
            None => plan.create.push(desired_slice.clone()),
            Some(existing_slice) if !slice_content_matches(existing_slice, desired_slice) => {
                plan.update.push(merge_desired(existing_slice, desired_slice));
            }
            Some(_) => {}
        }
    }

    for name in owned.keys() {
        if desired_slices.contains_key(name) {
            continue;
        }
        if unreachable_names.contains(name) {
            plan.preserve.push(name.clone());
        } else {
            plan.delete.push(name.clone());
        }
    }

    // Deterministic write order keeps reconcile logs and tests stable.
    plan.create.sort_by(|a, b| a.metadata.name.cmp(&b.metadata.name));
    plan.update.sort_by(|a, b| a.metadata.name.cmp(&b.metadata.name));
    plan.delete.sort();
    plan.preserve.sort();
    plan
}

/// Applies slice plans across the clusters of a group's namespace.
pub struct EndpointSliceConverger {
    provider: Arc<dyn ClusterClientProvider>,
    controller_namespace: String,
}

impl EndpointSliceConverger {
    /// Create a converger writing into the given controller namespace.
    #[must_use]
    pub fn new(provider: Arc<dyn ClusterClientProvider>, controller_namespace: String) -> Self {
        Self {
            provider,
            controller_namespace,
        }
    }

    /// Drive every cluster toward the group's desired slice set.
    ///
    /// Clusters are processed sequentially; an error on one is recorded
    /// and the next still runs. The returned list is empty on full
    /// success.
    pub async fn converge(
        &self,
        clusters: &[Cluster],
        gateway_dns: &GatewayDnsId,
        desired: &[ClusterGateway],
    ) -> Vec<ConvergeError> {
        let mut errors = Vec::new();

        for cluster in clusters {
            let Some(cluster_id) = ClusterId::from_cluster(cluster) else {
                continue;
            };

            if let Err(source) = self
                .converge_cluster(&cluster_id, gateway_dns, desired)
                .await
            {
                metrics::record_error(KIND_ENDPOINT_SLICE, "converge_error");
                errors.push(ConvergeError {
                    cluster: cluster_id,
                    source,
                });
            }
        }

        errors
    }

    /// Converge one cluster: list, diff, then create / update / delete in
    /// that order. The first failed write aborts this cluster.
    async fn converge_cluster(
        &self,
        cluster_id: &ClusterId,
        gateway_dns: &GatewayDnsId,
        desired: &[ClusterGateway],
    ) -> Result<()> {
        let client = self
            .provider
            .get_client(cluster_id)
            .await
            .context("obtaining cluster client")?;

        if !self.namespace_exists(&client).await? {
            debug!(
                cluster = %cluster_id,
                namespace = %self.controller_namespace,
                "Controller namespace absent, cluster not bootstrapped yet"
            );
            return Ok(());
        }

        let slices: Api<EndpointSlice> =
            Api::namespaced(client, &self.controller_namespace);
        let existing = slices
            .list(&ListParams::default())
            .await
            .context("listing endpoint slices")?;

        let plan = plan_for_cluster(&existing.items, gateway_dns, desired);

        for name in &plan.preserve {
            info!(
                cluster = %cluster_id,
                slice = %name,
                "Skipping deletion, the described cluster is unreachable"
            );
        }

        if plan.is_empty() {
            return Ok(());
        }

        self.apply_plan(cluster_id, &slices, plan).await
    }

    /// Whether the controller namespace exists on the workload cluster.
    async fn namespace_exists(&self, client: &Client) -> Result<bool> {
        let namespaces: Api<Namespace> = Api::all(client.clone());
        let namespace = namespaces
            .get_opt(&self.controller_namespace)
            .await
            .context("fetching controller namespace")?;
        Ok(namespace.is_some())
    }

    async fn apply_plan(
        &self,
        cluster_id: &ClusterId,
        slices: &Api<EndpointSlice>,
        plan: SlicePlan,
    ) -> Result<()> {
        for slice in plan.create {
            self.create_slice(cluster_id, slices, slice).await?;
        }

        for slice in plan.update {
            let name = slice.metadata.name.clone().unwrap_or_default();
            slices
                .replace(&name, &PostParams::default(), &slice)
                .await
                .with_context(|| format!("updating endpoint slice {name}"))?;
            metrics::record_slice_write("update");
            info!(cluster = %cluster_id, slice = %name, "Endpoint slice updated");
        }

        for name in plan.delete {
            slices
                .delete(&name, &DeleteParams::default())
                .await
                .with_context(|| format!("deleting endpoint slice {name}"))?;
            metrics::record_slice_write("delete");
            info!(cluster = %cluster_id, slice = %name, "Endpoint slice deleted");
        }

        Ok(())
    }

    /// Create a slice, taking over any existing object on a name conflict.
    ///
    /// The conflicting object may be foreign (no annotations); it is
    /// fetched by name, rewritten with the desired annotations, address
    /// type, endpoints and ports, and updated in place.
    async fn create_slice(
        &self,
        cluster_id: &ClusterId,
        slices: &Api<EndpointSlice>,
        desired: EndpointSlice,
    ) -> Result<()> {
        let name = desired.metadata.name.clone().unwrap_or_default();

        match slices.create(&PostParams::default(), &desired).await {
            Ok(_) => {
                metrics::record_slice_write("create");
                info!(cluster = %cluster_id, slice = %name, "Endpoint slice created");
                Ok(())
            }
            Err(kube::Error::Api(response)) if response.code == 409 => {
                warn!(
                    cluster = %cluster_id,
                    slice = %name,
                    "Name conflict on create, taking over the existing slice"
                );
                let current = slices
                    .get(&name)
                    .await
                    .with_context(|| format!("fetching conflicting endpoint slice {name}"))?;
                let merged = merge_desired(&current, &desired);
                slices
                    .replace(&name, &PostParams::default(), &merged)
                    .await
                    .with_context(|| format!("taking over endpoint slice {name}"))?;
                metrics::record_slice_write("update");
                Ok(())
            }
            Err(error) => {
                Err(anyhow::Error::from(error).context(format!("creating endpoint slice {name}")))
            }
        }
    }
}

#[cfg(test)]
#[path = "converge_tests.rs"]
mod converge_tests;
