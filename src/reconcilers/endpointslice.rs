// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Endpoint-slice to DNS-cache synchronisation.
//!
//! On each workload cluster, every endpoint slice in the controller
//! namespace is observed and projected into the in-memory [`DnsCache`].
//! Slices without the hostname annotation are not ours and are ignored;
//! slice deletion retracts exactly that slice's cache entry.
//!
//! A raw watcher stream drives the projection rather than a controller:
//! delete events must clear the cache by resource key, and the stream's
//! `InitDone` marker is what flips the cache's populated flag for
//! readiness. A single consumer task keeps per-key ordering trivially.

use crate::constants::{ADDRESS_TYPE_FQDN, ADDRESS_TYPE_IPV4, DNS_HOSTNAME_ANNOTATION};
use crate::dnscache::{AddressSet, DnsCache, DnsCacheEntry};
use anyhow::{Context as _, Result};
use futures::TryStreamExt;
use k8s_openapi::api::discovery::v1::EndpointSlice;
use kube::runtime::watcher;
use kube::{Api, Client, ResourceExt};
use std::net::Ipv4Addr;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// `<namespace>/<name>` cache key of a slice.
#[must_use]
pub fn resource_key(slice: &EndpointSlice) -> Option<String> {
    Some(format!(
        "{}/{}",
        slice.metadata.namespace.as_ref()?,
        slice.metadata.name.as_ref()?
    ))
}

/// Project one slice event into the cache.
///
/// `None` means the slice was deleted. Addresses that do not parse for
/// their declared type are logged and skipped individually; an address
/// type other than IPv4 or FQDN leaves the cache untouched.
pub fn apply_endpoint_slice(cache: &DnsCache, key: &str, slice: Option<&EndpointSlice>) {
    let Some(slice) = slice else {
        debug!(slice = %key, "Endpoint slice deleted, retracting cache entry");
        cache.delete_by_resource_key(key);
        return;
    };

    let Some(hostname) = slice
        .metadata
        .annotations
        .as_ref()
        .and_then(|annotations| annotations.get(DNS_HOSTNAME_ANNOTATION))
    else {
        // Not a generated slice; leave it to whoever owns it.
        return;
    };

    let raw_addresses: Vec<&String> = slice
        .endpoints
        .iter()
        .flat_map(|endpoint| endpoint.addresses.iter())
        .collect();

    let addresses = match slice.address_type.as_str() {
        ADDRESS_TYPE_IPV4 => AddressSet::Ipv4(
            raw_addresses
                .iter()
                .filter_map(|address| match address.parse::<Ipv4Addr>() {
                    Ok(parsed) => Some(parsed),
                    Err(_) => {
                        warn!(slice = %key, address = %address, "Skipping unparseable IPv4 address");
                        None
                    }
                })
                .collect(),
        ),
        ADDRESS_TYPE_FQDN => {
            AddressSet::Fqdn(raw_addresses.iter().map(|address| (*address).clone()).collect())
        }
        other => {
            warn!(slice = %key, address_type = %other, "Unhandled address type, ignoring slice");
            return;
        }
    };

    cache.upsert(DnsCacheEntry {
        resource_key: key.to_string(),
        fqdn: hostname.clone(),
        addresses,
    });

    if !cache.is_valid(hostname) {
        warn!(
            slice = %key,
            fqdn = %hostname,
            "FQDN has conflicting record types (mixed A/CNAME or multiple CNAMEs); \
             queries for it will not resolve consistently"
        );
    }
}

/// Watch the controller namespace and keep the cache synchronised.
///
/// Runs until the watch stream fails irrecoverably. The populated flag is
/// set once the initial listing completes.
///
/// # Errors
///
/// Returns an error when the watch stream terminates with one.
pub async fn run_endpoint_slice_watcher(
    client: Client,
    namespace: &str,
    cache: Arc<DnsCache>,
) -> Result<()> {
    let slices: Api<EndpointSlice> = Api::namespaced(client, namespace);
    let mut stream = Box::pin(watcher(slices, watcher::Config::default()));

    info!(namespace = %namespace, "Watching endpoint slices");

    while let Some(event) = stream
        .try_next()
        .await
        .context("endpoint slice watch stream failed")?
    {
        match event {
            watcher::Event::Apply(slice) | watcher::Event::InitApply(slice) => {
                if let Some(key) = resource_key(&slice) {
                    apply_endpoint_slice(&cache, &key, Some(&slice));
                }
            }
            watcher::Event::Delete(slice) => {
                if let Some(key) = resource_key(&slice) {
                    apply_endpoint_slice(&cache, &key, None);
                } else {
                    warn!(slice = %slice.name_any(), "Deleted slice without namespace/name");
                }
            }
            watcher::Event::Init => {}
            watcher::Event::InitDone => {
                if !cache.is_populated() {
                    info!("Initial endpoint slice sync complete, cache populated");
                    cache.set_populated();
                }
            }
        }
    }

    anyhow::bail!("endpoint slice watch stream ended")
}

#[cfg(test)]
#[path = "endpointslice_tests.rs"]
mod endpointslice_tests;
