// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Process configuration loaded from the environment.
//!
//! Each binary assembles its configuration once at start-up. A missing
//! required value is an irrecoverable misconfiguration: `from_env` returns
//! an error and the process exits non-zero.
//!
//! | Variable | Default | Used by |
//! |---|---|---|
//! | `XCDNS_DOMAIN_SUFFIX` | *(required)* | all |
//! | `XCDNS_NAMESPACE` | `xcc-dns` | controller, dns-server |
//! | `XCDNS_POLLING_INTERVAL_SECS` | `30` | controller |
//! | `XCDNS_METRICS_BIND_ADDRESS` | `0.0.0.0:8081` | controller |
//! | `XCDNS_ENABLE_LEADER_ELECTION` | `true` | controller |
//! | `XCDNS_DNS_LISTEN_ADDRESS` | `0.0.0.0:53` | dns-server |
//! | `XCDNS_READINESS_BIND_ADDRESS` | `0.0.0.0:8080` | dns-server |
//! | `XCDNS_RESOLVER_CONFIG_NAMESPACE` | `kube-system` | resolver-patch |
//! | `XCDNS_RESOLVER_CONFIG_NAME` | `coredns` | resolver-patch |
//! | `XCDNS_RESOLVER_CONFIG_KEY` | `Corefile` | resolver-patch |
//! | `XCDNS_DNS_SERVICE_NAME` | `dns-server` | resolver-patch |
//! | `XCDNS_SERVICE_IP_WAIT_SECS` | `120` | resolver-patch |

use crate::constants::{
    CLUSTERS_SUBDOMAIN, DEFAULT_CONTROLLER_NAMESPACE, DEFAULT_DNS_LISTEN_ADDRESS,
    DEFAULT_METRICS_BIND_ADDRESS, DEFAULT_POLLING_INTERVAL_SECS, DEFAULT_READINESS_BIND_ADDRESS,
    DEFAULT_RESOLVER_CONFIG_KEY, DEFAULT_RESOLVER_CONFIG_NAME, DEFAULT_RESOLVER_CONFIG_NAMESPACE,
    DEFAULT_SERVICE_IP_WAIT_SECS,
};
use anyhow::{Context as _, Result};
use std::time::Duration;

/// Read an environment variable, falling back to a default.
fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Read a required environment variable.
fn env_required(key: &str) -> Result<String> {
    let value =
        std::env::var(key).with_context(|| format!("required environment variable {key} is not set"))?;
    if value.trim().is_empty() {
        anyhow::bail!("required environment variable {key} is empty");
    }
    Ok(value)
}

/// Compose the DNS zone served and forwarded for a domain suffix.
///
/// All generated hostnames live under `clusters.<domain-suffix>`; the DNS
/// plane serves that zone and the resolver patcher forwards it.
#[must_use]
pub fn clusters_zone(domain_suffix: &str) -> String {
    format!("{CLUSTERS_SUBDOMAIN}.{domain_suffix}")
}

/// Configuration for the management-cluster controller binary.
#[derive(Clone, Debug)]
pub struct ControllerConfig {
    /// Reserved namespace on every workload cluster where generated
    /// endpoint slices live
    pub controller_namespace: String,

    /// Fixed trailing labels of generated hostnames (e.g. `xcc.test`)
    pub domain_suffix: String,

    /// Interval of the periodic re-convergence sweep
    pub polling_interval: Duration,

    /// Bind address of the Prometheus metrics server
    pub metrics_bind_address: String,

    /// Whether to run leader election before starting controllers
    pub enable_leader_election: bool,
}

impl ControllerConfig {
    /// Load the controller configuration from the environment.
    ///
    /// # Errors
    ///
    /// Returns an error when `XCDNS_DOMAIN_SUFFIX` is unset or empty.
    pub fn from_env() -> Result<Self> {
        let polling_interval_secs = std::env::var("XCDNS_POLLING_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_POLLING_INTERVAL_SECS);

        let enable_leader_election = std::env::var("XCDNS_ENABLE_LEADER_ELECTION")
            .unwrap_or_else(|_| "true".to_string())
            .parse::<bool>()
            .unwrap_or(true);

        Ok(Self {
            controller_namespace: env_or("XCDNS_NAMESPACE", DEFAULT_CONTROLLER_NAMESPACE),
            domain_suffix: env_required("XCDNS_DOMAIN_SUFFIX")?,
            polling_interval: Duration::from_secs(polling_interval_secs),
            metrics_bind_address: env_or("XCDNS_METRICS_BIND_ADDRESS", DEFAULT_METRICS_BIND_ADDRESS),
            enable_leader_election,
        })
    }
}

/// Configuration for the per-workload-cluster DNS plane binary.
#[derive(Clone, Debug)]
pub struct DnsServerConfig {
    /// Namespace whose endpoint slices are projected into the cache
    pub controller_namespace: String,

    /// Fixed trailing labels of served hostnames
    pub domain_suffix: String,

    /// Bind address of the DNS server (UDP and TCP)
    pub listen_address: String,

    /// Bind address of the readiness/liveness HTTP endpoints
    pub readiness_bind_address: String,
}

impl DnsServerConfig {
    /// Load the DNS server configuration from the environment.
    ///
    /// # Errors
    ///
    /// Returns an error when `XCDNS_DOMAIN_SUFFIX` is unset or empty.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            controller_namespace: env_or("XCDNS_NAMESPACE", DEFAULT_CONTROLLER_NAMESPACE),
            domain_suffix: env_required("XCDNS_DOMAIN_SUFFIX")?,
            listen_address: env_or("XCDNS_DNS_LISTEN_ADDRESS", DEFAULT_DNS_LISTEN_ADDRESS),
            readiness_bind_address: env_or(
                "XCDNS_READINESS_BIND_ADDRESS",
                DEFAULT_READINESS_BIND_ADDRESS,
            ),
        })
    }

    /// The single authoritative zone this server answers for.
    #[must_use]
    pub fn zone(&self) -> String {
        clusters_zone(&self.domain_suffix)
    }
}

/// Configuration for the one-shot resolver-config patcher.
#[derive(Clone, Debug)]
pub struct PatcherConfig {
    /// Namespace of the resolver's config object
    pub resolver_config_namespace: String,

    /// Name of the resolver's config object
    pub resolver_config_name: String,

    /// Key of the configuration blob within the config object's data map
    pub resolver_config_key: String,

    /// Fixed trailing labels of the forwarded zone
    pub domain_suffix: String,

    /// Namespace of the service fronting the authoritative DNS server
    pub dns_service_namespace: String,

    /// Name of the service fronting the authoritative DNS server
    pub dns_service_name: String,

    /// Deadline for the fronting service to acquire a cluster IP
    pub service_ip_wait: Duration,
}

impl PatcherConfig {
    /// Load the patcher configuration from the environment.
    ///
    /// # Errors
    ///
    /// Returns an error when `XCDNS_DOMAIN_SUFFIX` is unset or empty.
    pub fn from_env() -> Result<Self> {
        let wait_secs = std::env::var("XCDNS_SERVICE_IP_WAIT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_SERVICE_IP_WAIT_SECS);

        Ok(Self {
            resolver_config_namespace: env_or(
                "XCDNS_RESOLVER_CONFIG_NAMESPACE",
                DEFAULT_RESOLVER_CONFIG_NAMESPACE,
            ),
            resolver_config_name: env_or(
                "XCDNS_RESOLVER_CONFIG_NAME",
                DEFAULT_RESOLVER_CONFIG_NAME,
            ),
            resolver_config_key: env_or("XCDNS_RESOLVER_CONFIG_KEY", DEFAULT_RESOLVER_CONFIG_KEY),
            domain_suffix: env_required("XCDNS_DOMAIN_SUFFIX")?,
            dns_service_namespace: env_or("XCDNS_NAMESPACE", DEFAULT_CONTROLLER_NAMESPACE),
            dns_service_name: env_or("XCDNS_DNS_SERVICE_NAME", "dns-server"),
            service_ip_wait: Duration::from_secs(wait_secs),
        })
    }

    /// The zone the patcher forwards to the authoritative server.
    #[must_use]
    pub fn zone(&self) -> String {
        clusters_zone(&self.domain_suffix)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod config_tests;
