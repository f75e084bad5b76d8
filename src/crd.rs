// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Custom Resource Definitions (CRDs) for cross-cluster gateway DNS.
//!
//! This module defines the management-cluster resources xcdns consumes:
//!
//! - [`GatewayDNS`] - a group declaration selecting workload clusters and
//!   naming the gateway service whose load-balancer endpoints are propagated
//! - [`Cluster`] - a minimal typed view of the Cluster API cluster object
//!   (`cluster.x-k8s.io/v1beta1`), enough for label selection and
//!   kubeconfig discovery
//!
//! # Example: Declaring a group
//!
//! ```yaml
//! apiVersion: connectivity.tanzu.vmware.com/v1alpha1
//! kind: GatewayDNS
//! metadata:
//!   name: gateway-dns
//!   namespace: clusters
//! spec:
//!   clusterSelector:
//!     matchLabels:
//!       hasContourGateway: "true"
//!   service: contour-external/envoy
//!   resolutionType: loadBalancer
//! ```
//!
//! Every workload cluster selected by `clusterSelector` whose
//! `contour-external/envoy` service exposes a load-balancer address is then
//! resolvable from every cluster in the namespace as
//! `*.gateway.<cluster-name>.<cluster-namespace>.clusters.<domain-suffix>`.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Label selector to match Kubernetes resources.
///
/// A label selector is a label query over a set of resources. The result of matchLabels and
/// matchExpressions are `ANDed`. An empty label selector matches all objects.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LabelSelector {
    /// Map of {key,value} pairs. A single {key,value} in the matchLabels map is equivalent
    /// to an element of matchExpressions, whose key field is "key", the operator is "In",
    /// and the values array contains only "value". All requirements must be satisfied.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_labels: Option<BTreeMap<String, String>>,

    /// List of label selector requirements. All requirements must be satisfied.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_expressions: Option<Vec<LabelSelectorRequirement>>,
}

impl LabelSelector {
    /// Check whether this selector matches the given label map.
    #[must_use]
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        crate::selector::matches_selector(self, labels)
    }
}

/// A label selector requirement is a selector that contains values, a key, and an operator
/// that relates the key and values.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LabelSelectorRequirement {
    /// The label key that the selector applies to.
    pub key: String,

    /// Operator represents a key's relationship to a set of values.
    /// Valid operators are In, `NotIn`, Exists and `DoesNotExist`.
    pub operator: String,

    /// An array of string values. If the operator is In or `NotIn`,
    /// the values array must be non-empty. If the operator is Exists or `DoesNotExist`,
    /// the values array must be empty.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<String>>,
}

/// How gateway endpoints are resolved from the named service.
///
/// Only load-balancer resolution is defined: the service's
/// `status.loadBalancer.ingress` addresses are the propagated data.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum ResolutionType {
    /// Resolve via the service's load-balancer ingress addresses
    #[default]
    #[serde(rename = "loadBalancer")]
    LoadBalancer,
}

/// `GatewayDNS` declares a group of clusters whose gateway endpoints are
/// propagated to one another.
///
/// For every cluster matched by `clusterSelector`, the controller observes
/// the service named by `service` and converges an endpoint-slice record
/// describing its load-balancer addresses onto every cluster in the
/// declaration's namespace.
///
/// # Example
///
/// ```yaml
/// apiVersion: connectivity.tanzu.vmware.com/v1alpha1
/// kind: GatewayDNS
/// metadata:
///   name: gateway-dns
///   namespace: clusters
/// spec:
///   clusterSelector:
///     matchLabels:
///       hasContourGateway: "true"
///   service: contour-external/envoy
///   resolutionType: loadBalancer
/// ```
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "connectivity.tanzu.vmware.com",
    version = "v1alpha1",
    kind = "GatewayDNS",
    namespaced,
    shortname = "gdns",
    doc = "GatewayDNS selects workload clusters and names a gateway service; the controller propagates the service's load-balancer endpoints to every cluster in the namespace and serves wildcard DNS for them.",
    printcolumn = r#"{"name":"Service","type":"string","jsonPath":".spec.service"}"#,
    printcolumn = r#"{"name":"Resolution","type":"string","jsonPath":".spec.resolutionType"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct GatewayDNSSpec {
    /// Selector for the workload clusters participating in this group.
    ///
    /// Matched against the labels of Cluster API cluster objects in the
    /// `GatewayDNS`'s own namespace.
    pub cluster_selector: LabelSelector,

    /// Qualified reference to the gateway service, as `<namespace>/<name>`.
    ///
    /// The same reference applies on every selected cluster.
    pub service: String,

    /// How endpoints are resolved from the service.
    #[serde(default)]
    pub resolution_type: ResolutionType,
}

/// Minimal typed view of a Cluster API cluster (`cluster.x-k8s.io/v1beta1`).
///
/// xcdns only needs the metadata (labels for selection, name/namespace for
/// identity and kubeconfig discovery); the spec is carried opaquely so the
/// watcher round-trips objects without loss of the fields it understands.
#[derive(CustomResource, Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "cluster.x-k8s.io",
    version = "v1beta1",
    kind = "Cluster",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSpec {
    /// Pause field mirrored from the Cluster API contract; a paused cluster
    /// is still listed and converged onto.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paused: Option<bool>,
}

/// Identity of a workload cluster: the `(namespace, name)` pair of its
/// Cluster API object in the management cluster.
///
/// Used as the key for client caching and for composing generated hostnames
/// and slice names.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClusterId {
    /// Namespace of the cluster object in the management cluster
    pub namespace: String,
    /// Name of the cluster object
    pub name: String,
}

impl ClusterId {
    /// Build an identity from a cluster object's metadata.
    ///
    /// Returns `None` when the object lacks a name or namespace (never the
    /// case for objects read back from the API server).
    #[must_use]
    pub fn from_cluster(cluster: &Cluster) -> Option<Self> {
        Some(Self {
            namespace: cluster.metadata.namespace.clone()?,
            name: cluster.metadata.name.clone()?,
        })
    }
}

impl fmt::Display for ClusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Identity of a `GatewayDNS` declaration, rendered as `<namespace>/<name>`
/// in the back-reference annotation.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct GatewayDnsId {
    /// Namespace of the declaration
    pub namespace: String,
    /// Name of the declaration
    pub name: String,
}

impl GatewayDnsId {
    /// Build an identity from a `GatewayDNS` object's metadata.
    #[must_use]
    pub fn from_gateway_dns(gateway_dns: &GatewayDNS) -> Option<Self> {
        Some(Self {
            namespace: gateway_dns.metadata.namespace.clone()?,
            name: gateway_dns.metadata.name.clone()?,
        })
    }
}

impl fmt::Display for GatewayDnsId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// A parsed `<namespace>/<name>` service reference from a `GatewayDNS` spec.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceRef {
    /// Namespace of the gateway service on each workload cluster
    pub namespace: String,
    /// Name of the gateway service
    pub name: String,
}

impl ServiceRef {
    /// Parse a `<namespace>/<name>` reference.
    ///
    /// # Errors
    ///
    /// Returns an error when the reference is not exactly two non-empty
    /// segments separated by a single slash.
    pub fn parse(service: &str) -> anyhow::Result<Self> {
        match service.split('/').collect::<Vec<_>>().as_slice() {
            [namespace, name] if !namespace.is_empty() && !name.is_empty() => Ok(Self {
                namespace: (*namespace).to_string(),
                name: (*name).to_string(),
            }),
            _ => anyhow::bail!("invalid service reference {service:?}, expected <namespace>/<name>"),
        }
    }
}

impl fmt::Display for ServiceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

#[cfg(test)]
#[path = "crd_tests.rs"]
mod crd_tests;
