// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Resolver-config patching for the workload cluster.
//!
//! At bootstrap, a one-shot job grafts the cluster resolver onto the
//! authoritative DNS plane: it appends a stub-domain block to the
//! resolver's Corefile so queries for the cross-cluster zone are forwarded
//! to the DNS server's cluster IP. The edit is idempotent and touches only
//! the fenced region between the two sentinels; everything outside is
//! preserved byte-for-byte.

use crate::constants::{COREFILE_BLOCK_BEGIN, COREFILE_BLOCK_END, SERVICE_IP_POLL_INTERVAL_SECS};
use anyhow::{Context as _, Result};
use k8s_openapi::api::core::v1::{ConfigMap, Service};
use kube::api::PostParams;
use kube::{Api, Client};
use std::time::Duration;
use tracing::{debug, info};

/// Remove any fenced block from a configuration blob, sentinels included.
///
/// An unterminated block (opening sentinel without a closing one) is
/// stripped through the end of the blob.
#[must_use]
pub fn strip_connectivity_block(blob: &str) -> String {
    let mut output = String::with_capacity(blob.len());
    let mut in_block = false;

    for line in blob.split_inclusive('\n') {
        let trimmed = line.strip_suffix('\n').unwrap_or(line).trim_end_matches('\r');
        if in_block {
            if trimmed == COREFILE_BLOCK_END {
                in_block = false;
            }
            continue;
        }
        if trimmed == COREFILE_BLOCK_BEGIN {
            in_block = true;
            continue;
        }
        output.push_str(line);
    }

    output
}

/// Produce the blob with a fresh fenced block forwarding `zone` to
/// `forwarding_ip`, replacing any previous block regardless of its shape.
#[must_use]
pub fn append_connectivity_block(blob: &str, zone: &str, forwarding_ip: &str) -> String {
    let mut output = strip_connectivity_block(blob);
    if !output.is_empty() && !output.ends_with('\n') {
        output.push('\n');
    }

    output.push_str(COREFILE_BLOCK_BEGIN);
    output.push('\n');
    output.push_str(&format!(
        "{zone}:53 {{\n    forward . {forwarding_ip}\n}}\n"
    ));
    output.push_str(COREFILE_BLOCK_END);
    output.push('\n');

    output
}

/// One-shot editor of the cluster resolver's configuration object.
pub struct CorefilePatcher {
    client: Client,
    namespace: String,
    name: String,
    key: String,
    zone: String,
}

impl CorefilePatcher {
    /// Create a patcher targeting `namespace/name`, editing the blob under
    /// `key` and forwarding `zone`.
    #[must_use]
    pub fn new(client: Client, namespace: String, name: String, key: String, zone: String) -> Self {
        Self {
            client,
            namespace,
            name,
            key,
            zone,
        }
    }

    /// Append (or refresh) the stub-domain block forwarding the configured
    /// zone to `forwarding_ip`. No write happens when the blob is already
    /// in the desired shape.
    ///
    /// # Errors
    ///
    /// Returns an error when the config object is missing, lacks the
    /// configured key, or the update fails.
    pub async fn append_stub(&self, forwarding_ip: &str) -> Result<()> {
        let config_maps: Api<ConfigMap> = Api::namespaced(self.client.clone(), &self.namespace);

        let mut config_map = config_maps
            .get(&self.name)
            .await
            .with_context(|| format!("fetching resolver config {}/{}", self.namespace, self.name))?;

        let data = config_map.data.get_or_insert_with(Default::default);
        let original = data
            .get(&self.key)
            .cloned()
            .with_context(|| {
                format!(
                    "resolver config {}/{} has no {:?} key",
                    self.namespace, self.name, self.key
                )
            })?;

        let updated = append_connectivity_block(&original, &self.zone, forwarding_ip);
        if updated == original {
            debug!(
                config = %format!("{}/{}", self.namespace, self.name),
                "Resolver config already forwards the zone, nothing to do"
            );
            return Ok(());
        }

        data.insert(self.key.clone(), updated);
        config_maps
            .replace(&self.name, &PostParams::default(), &config_map)
            .await
            .with_context(|| format!("updating resolver config {}/{}", self.namespace, self.name))?;

        info!(
            zone = %self.zone,
            forward_to = forwarding_ip,
            "Resolver config patched to forward the cross-cluster zone"
        );
        Ok(())
    }
}

/// Polls the DNS plane's fronting service until it has a cluster IP.
pub struct ServiceIpWatcher {
    client: Client,
    namespace: String,
    name: String,
}

impl ServiceIpWatcher {
    /// Create a watcher for `namespace/name`.
    #[must_use]
    pub fn new(client: Client, namespace: String, name: String) -> Self {
        Self {
            client,
            namespace,
            name,
        }
    }

    /// Wait until the service exposes a cluster IP, or until the deadline
    /// elapses.
    ///
    /// # Errors
    ///
    /// Returns an error when the deadline passes without the service
    /// acquiring a cluster IP.
    pub async fn wait_for_cluster_ip(&self, deadline: Duration) -> Result<String> {
        let services: Api<Service> = Api::namespaced(self.client.clone(), &self.namespace);

        let poll = async {
            let mut interval =
                tokio::time::interval(Duration::from_secs(SERVICE_IP_POLL_INTERVAL_SECS));
            loop {
                interval.tick().await;
                match services.get_opt(&self.name).await {
                    Ok(Some(service)) => {
                        let cluster_ip = service
                            .spec
                            .as_ref()
                            .and_then(|spec| spec.cluster_ip.clone())
                            .filter(|ip| !ip.is_empty() && ip != "None");
                        if let Some(ip) = cluster_ip {
                            return ip;
                        }
                        debug!(
                            service = %format!("{}/{}", self.namespace, self.name),
                            "Service has no cluster IP yet"
                        );
                    }
                    Ok(None) => debug!(
                        service = %format!("{}/{}", self.namespace, self.name),
                        "Service not found yet"
                    ),
                    Err(error) => debug!(
                        service = %format!("{}/{}", self.namespace, self.name),
                        error = %error,
                        "Service poll failed, retrying"
                    ),
                }
            }
        };

        tokio::time::timeout(deadline, poll).await.with_context(|| {
            format!(
                "service {}/{} did not acquire a cluster IP within {deadline:?}",
                self.namespace, self.name
            )
        })
    }
}

#[cfg(test)]
#[path = "patcher_tests.rs"]
mod patcher_tests;
