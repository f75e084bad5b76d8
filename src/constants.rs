// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Global constants for the xcdns operator.
//!
//! This module contains all numeric and string constants used throughout the codebase.
//! Constants are organized by category for easy maintenance.

// ============================================================================
// API Constants
// ============================================================================

/// API group for the `GatewayDNS` CRD
pub const API_GROUP: &str = "connectivity.tanzu.vmware.com";

/// API version for the `GatewayDNS` CRD
pub const API_VERSION: &str = "v1alpha1";

/// Fully qualified API version (group/version)
pub const API_GROUP_VERSION: &str = "connectivity.tanzu.vmware.com/v1alpha1";

/// Kind name for the `GatewayDNS` resource
pub const KIND_GATEWAY_DNS: &str = "GatewayDNS";

/// Kind name for the Cluster API cluster resource
pub const KIND_CLUSTER: &str = "Cluster";

/// Kind name for the generated endpoint slices (metrics label)
pub const KIND_ENDPOINT_SLICE: &str = "EndpointSlice";

// ============================================================================
// Annotations and Labels (wire format - exact spellings matter)
// ============================================================================

/// Annotation carrying the wildcard DNS hostname served for a generated slice
pub const DNS_HOSTNAME_ANNOTATION: &str = "connectivity.tanzu.vmware.com/dns-hostname";

/// Annotation naming the owning `GatewayDNS` as `<namespace>/<name>`.
///
/// Owner references cannot span namespaces or clusters, so this annotation is
/// the sole ownership authority for generated slices.
pub const GATEWAY_DNS_REF_ANNOTATION: &str = "connectivity.tanzu.vmware.com/gateway-dns-ref";

/// Standard label the platform's service indexer expects on endpoint slices
pub const SERVICE_NAME_LABEL: &str = "kubernetes.io/service-name";

/// Finalizer for `GatewayDNS` resources
pub const FINALIZER_GATEWAY_DNS: &str = "connectivity.tanzu.vmware.com/gateway-dns-finalizer";

/// Suffix appended to `<cluster-namespace>-<cluster-name>` when deriving slice names
pub const GATEWAY_SLICE_NAME_SUFFIX: &str = "gateway";

/// Fixed label between the cluster namespace and the domain suffix in hostnames
pub const CLUSTERS_SUBDOMAIN: &str = "clusters";

// ============================================================================
// Cluster API Conventions
// ============================================================================

/// Suffix of the secret holding a workload cluster's kubeconfig
pub const KUBECONFIG_SECRET_SUFFIX: &str = "kubeconfig";

/// Key inside the kubeconfig secret's data map
pub const KUBECONFIG_SECRET_KEY: &str = "value";

// ============================================================================
// DNS Protocol Constants
// ============================================================================

/// Standard DNS port
pub const DNS_PORT: u16 = 53;

/// TTL for every answer served by the authoritative plane (seconds)
pub const DNS_RECORD_TTL_SECS: u32 = 30;

/// SOA refresh interval (seconds)
pub const SOA_REFRESH_SECS: i32 = 60;

/// SOA retry interval (seconds)
pub const SOA_RETRY_SECS: i32 = 60;

/// SOA expire time (seconds)
pub const SOA_EXPIRE_SECS: i32 = 86400;

/// SOA negative-response TTL (seconds)
pub const SOA_NEGATIVE_TTL_SECS: u32 = 30;

/// Address type accepted for IPv4 endpoint slices
pub const ADDRESS_TYPE_IPV4: &str = "IPv4";

/// Address type accepted for FQDN endpoint slices
pub const ADDRESS_TYPE_FQDN: &str = "FQDN";

// ============================================================================
// Resolver-Config Patcher Constants
// ============================================================================

/// Opening sentinel of the fenced Corefile block owned by xcdns
pub const COREFILE_BLOCK_BEGIN: &str = "### BEGIN CROSS CLUSTER CONNECTIVITY";

/// Closing sentinel of the fenced Corefile block owned by xcdns
pub const COREFILE_BLOCK_END: &str = "### END CROSS CLUSTER CONNECTIVITY";

/// Default namespace of the cluster resolver's config object
pub const DEFAULT_RESOLVER_CONFIG_NAMESPACE: &str = "kube-system";

/// Default name of the cluster resolver's config object
pub const DEFAULT_RESOLVER_CONFIG_NAME: &str = "coredns";

/// Default key of the configuration blob within the config object
pub const DEFAULT_RESOLVER_CONFIG_KEY: &str = "Corefile";

// ============================================================================
// Controller Timing Constants
// ============================================================================

/// Periodic poll interval for re-converging every `GatewayDNS` (seconds).
///
/// Load-balancer address changes on workload clusters are not observable as
/// watch events in the management cluster, so polling runs even while
/// watches are healthy.
pub const DEFAULT_POLLING_INTERVAL_SECS: u64 = 30;

/// Requeue delay after a failed reconciliation (seconds)
pub const ERROR_REQUEUE_DURATION_SECS: u64 = 5;

/// Interval between cluster-IP polls in the service watcher (seconds)
pub const SERVICE_IP_POLL_INTERVAL_SECS: u64 = 2;

/// Default deadline for the service watcher to observe a cluster IP (seconds)
pub const DEFAULT_SERVICE_IP_WAIT_SECS: u64 = 120;

// ============================================================================
// Defaults for Process Configuration
// ============================================================================

/// Default reserved namespace on workload clusters for generated records
pub const DEFAULT_CONTROLLER_NAMESPACE: &str = "xcc-dns";

/// Default bind address of the DNS server (UDP and TCP)
pub const DEFAULT_DNS_LISTEN_ADDRESS: &str = "0.0.0.0:53";

/// Default bind address for the readiness/liveness HTTP endpoints
pub const DEFAULT_READINESS_BIND_ADDRESS: &str = "0.0.0.0:8080";

/// Default bind address of the Prometheus metrics server
pub const DEFAULT_METRICS_BIND_ADDRESS: &str = "0.0.0.0:8081";

/// Path the metrics server responds on
pub const METRICS_SERVER_PATH: &str = "/metrics";

// ============================================================================
// Leader Election Constants
// ============================================================================

/// Default lease duration for leader election (seconds)
pub const DEFAULT_LEASE_DURATION_SECS: u64 = 15;

/// Default grace period before retrying lease acquisition (seconds)
pub const DEFAULT_LEASE_RETRY_PERIOD_SECS: u64 = 2;

// ============================================================================
// Runtime Constants
// ============================================================================

/// Number of tokio worker threads for the controller runtime
pub const TOKIO_WORKER_THREADS: usize = 4;

/// Maximum UDP payload the DNS server reads per datagram
pub const DNS_UDP_BUFFER_SIZE: usize = 4096;
