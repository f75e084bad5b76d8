// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Cluster lookup against the management API.
//!
//! The searcher answers two questions for the `GatewayDNS` reconciler:
//! which clusters a declaration selects, and which clusters share its
//! namespace (the convergence targets). Label filtering happens client-side
//! with [`matches_selector`] so `matchExpressions` behave identically here
//! and in the watch mappers.

use crate::crd::{Cluster, LabelSelector};
use crate::selector::matches_selector;
use anyhow::{Context as _, Result};
use kube::api::ListParams;
use kube::{Api, Client};
use std::collections::BTreeMap;

/// Lists cluster objects in the management cluster.
#[derive(Clone)]
pub struct ClusterSearcher {
    client: Client,
}

impl ClusterSearcher {
    /// Create a searcher over the given management cluster client.
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// List every cluster in a namespace.
    ///
    /// # Errors
    ///
    /// Returns an error when the list call fails.
    pub async fn list_all(&self, namespace: &str) -> Result<Vec<Cluster>> {
        let clusters: Api<Cluster> = Api::namespaced(self.client.clone(), namespace);
        let list = clusters
            .list(&ListParams::default())
            .await
            .with_context(|| format!("listing clusters in namespace {namespace}"))?;
        Ok(list.items)
    }

    /// List the clusters in a namespace whose labels match the selector.
    ///
    /// Ordering is whatever the API server returns; callers do not rely
    /// on it.
    ///
    /// # Errors
    ///
    /// Returns an error when the list call fails.
    pub async fn list_matching(
        &self,
        selector: &LabelSelector,
        namespace: &str,
    ) -> Result<Vec<Cluster>> {
        Ok(filter_matching(self.list_all(namespace).await?, selector))
    }
}

/// Keep only the clusters whose labels match the selector.
#[must_use]
pub fn filter_matching(clusters: Vec<Cluster>, selector: &LabelSelector) -> Vec<Cluster> {
    clusters
        .into_iter()
        .filter(|cluster| {
            static EMPTY: BTreeMap<String, String> = BTreeMap::new();
            let labels = cluster.metadata.labels.as_ref().unwrap_or(&EMPTY);
            matches_selector(selector, labels)
        })
        .collect()
}

#[cfg(test)]
#[path = "search_tests.rs"]
mod search_tests;
