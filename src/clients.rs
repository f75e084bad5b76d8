// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Workload-cluster API client provisioning.
//!
//! The controller talks to many workload clusters; each needs its own
//! authenticated [`Client`]. This module provides the
//! [`ClusterClientProvider`] seam plus the default implementation that
//! loads credentials from the cluster's kubeconfig secret and caches the
//! resulting client for reuse across reconciles.
//!
//! # Credential convention
//!
//! Cluster API publishes each workload cluster's admin kubeconfig as a
//! secret named `<cluster-name>-kubeconfig` in the cluster object's own
//! namespace, under the data key `value`. That is the only credential
//! source this provider understands.

use crate::constants::{KUBECONFIG_SECRET_KEY, KUBECONFIG_SECRET_SUFFIX};
use crate::crd::ClusterId;
use anyhow::{Context as _, Result};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Api, Client, Config};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

/// Source of API clients for workload clusters.
///
/// Implementations must be safe to share across concurrent reconciles.
#[async_trait]
pub trait ClusterClientProvider: Send + Sync {
    /// Return an API client for the given workload cluster, creating and
    /// caching one on first use.
    ///
    /// # Errors
    ///
    /// Returns an error when the cluster's credentials cannot be loaded or
    /// a client cannot be constructed from them. Callers treat this as the
    /// cluster being unreachable.
    async fn get_client(&self, cluster: &ClusterId) -> Result<Client>;
}

/// Default [`ClusterClientProvider`] backed by kubeconfig secrets in the
/// management cluster.
///
/// Clients are created lazily and kept for the lifetime of the process; no
/// eviction is performed. Reads take a shared lock so concurrent reconciles
/// do not contend once a client exists.
pub struct KubeconfigClientCache {
    management: Client,
    clients: RwLock<HashMap<ClusterId, Client>>,
}

impl KubeconfigClientCache {
    /// Create a provider reading credentials through the given management
    /// cluster client.
    #[must_use]
    pub fn new(management: Client) -> Self {
        Self {
            management,
            clients: RwLock::new(HashMap::new()),
        }
    }

    /// Fetch and parse the cluster's kubeconfig secret, then build a client.
    async fn build_client(&self, cluster: &ClusterId) -> Result<Client> {
        let secret_name = format!("{}-{KUBECONFIG_SECRET_SUFFIX}", cluster.name);
        let secrets: Api<Secret> = Api::namespaced(self.management.clone(), &cluster.namespace);

        let secret = secrets
            .get(&secret_name)
            .await
            .with_context(|| format!("fetching kubeconfig secret {}/{secret_name}", cluster.namespace))?;

        let data = secret
            .data
            .as_ref()
            .and_then(|data| data.get(KUBECONFIG_SECRET_KEY))
            .with_context(|| {
                format!("kubeconfig secret {}/{secret_name} has no {KUBECONFIG_SECRET_KEY:?} key", cluster.namespace)
            })?;

        let kubeconfig: Kubeconfig = serde_yaml::from_slice(&data.0)
            .with_context(|| format!("parsing kubeconfig for cluster {cluster}"))?;

        let config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
            .await
            .with_context(|| format!("building client config for cluster {cluster}"))?;

        let client = Client::try_from(config)
            .with_context(|| format!("building client for cluster {cluster}"))?;

        Ok(client)
    }
}

#[async_trait]
impl ClusterClientProvider for KubeconfigClientCache {
    async fn get_client(&self, cluster: &ClusterId) -> Result<Client> {
        if let Some(client) = self.clients.read().await.get(cluster) {
            return Ok(client.clone());
        }

        let client = self.build_client(cluster).await?;

        let mut clients = self.clients.write().await;
        // Another task may have raced the same first encounter; keep the
        // client that landed first so every caller shares one connection pool.
        let client = clients.entry(cluster.clone()).or_insert(client).clone();
        debug!(cluster = %cluster, "Workload cluster client cached");

        Ok(client)
    }
}
