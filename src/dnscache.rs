// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! In-memory authoritative record cache for the DNS plane.
//!
//! The cache maps canonicalised, wildcard-capable FQDNs to the address
//! records projected from endpoint slices. Entries are additionally keyed
//! by the originating slice's `<namespace>/<name>` so a slice deletion can
//! retract exactly its own contribution while siblings under the same FQDN
//! survive.
//!
//! Wildcards are stored verbatim (the literal `*` as leftmost label) and
//! expanded at lookup time by ascending the domain tree, which keeps
//! upsert/delete trivial at the cost of a small constant per query.
//!
//! # Thread safety
//!
//! One writer (the endpoint-slice controller) and many readers (the DNS
//! handler) share the cache through an interior `RwLock`; reads never block
//! each other and every critical section is short and never held across an
//! await point.

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

/// Canonicalise an FQDN: lowercase with exactly one trailing dot.
#[must_use]
pub fn canonical_fqdn(name: &str) -> String {
    let lowered = name.trim_end_matches('.').to_ascii_lowercase();
    format!("{lowered}.")
}

/// The homogeneous address set of one cache entry.
///
/// An endpoint slice carries a single address type, so an entry's addresses
/// are either all IPv4 literals (contributing A records) or all FQDNs
/// (contributing a CNAME to the first target).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AddressSet {
    /// IPv4 literals, stored verbatim in observation order
    Ipv4(Vec<Ipv4Addr>),
    /// FQDN targets, canonicalised to lowercase with a trailing dot
    Fqdn(Vec<String>),
}

impl AddressSet {
    /// Whether this set contributes A records.
    #[must_use]
    pub fn is_ipv4(&self) -> bool {
        matches!(self, AddressSet::Ipv4(_))
    }
}

/// One cached record set: the slice that produced it, the FQDN it answers
/// for, and its addresses.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DnsCacheEntry {
    /// `<namespace>/<name>` of the originating endpoint slice; unique
    pub resource_key: String,

    /// Canonicalised FQDN, possibly with a leading `*.` label
    pub fqdn: String,

    /// The entry's addresses
    pub addresses: AddressSet,
}

impl DnsCacheEntry {
    fn canonicalised(mut self) -> Self {
        self.fqdn = canonical_fqdn(&self.fqdn);
        if let AddressSet::Fqdn(ref mut targets) = self.addresses {
            for target in targets.iter_mut() {
                *target = canonical_fqdn(target);
            }
        }
        self
    }
}

#[derive(Default)]
struct Inner {
    /// Entries bucketed by canonical FQDN; each bucket is unique per
    /// resource key
    entries_by_fqdn: HashMap<String, Vec<DnsCacheEntry>>,

    /// Reverse index: resource key to the canonical FQDN it lives under
    fqdn_by_key: HashMap<String, String>,
}

/// Thread-safe record cache shared between the endpoint-slice controller
/// and the DNS handler.
#[derive(Default)]
pub struct DnsCache {
    inner: RwLock<Inner>,
    populated: AtomicBool,
}

impl DnsCache {
    /// Create an empty, not-yet-populated cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the entry for its resource key.
    ///
    /// The entry is canonicalised on the way in. If the key previously
    /// mapped to a different FQDN, the stale record is removed from that
    /// FQDN's bucket first.
    pub fn upsert(&self, entry: DnsCacheEntry) {
        let entry = entry.canonicalised();
        let mut inner = self.inner.write().expect("dns cache lock poisoned");

        if let Some(old_fqdn) = inner.fqdn_by_key.get(&entry.resource_key).cloned() {
            if old_fqdn != entry.fqdn {
                remove_from_bucket(&mut inner, &old_fqdn, &entry.resource_key);
            }
        }

        inner
            .fqdn_by_key
            .insert(entry.resource_key.clone(), entry.fqdn.clone());

        let bucket = inner.entries_by_fqdn.entry(entry.fqdn.clone()).or_default();
        match bucket
            .iter_mut()
            .find(|existing| existing.resource_key == entry.resource_key)
        {
            Some(existing) => *existing = entry,
            None => bucket.push(entry),
        }
    }

    /// Remove all entries under an FQDN and drop their key mappings.
    pub fn delete(&self, fqdn: &str) {
        let fqdn = canonical_fqdn(fqdn);
        let mut inner = self.inner.write().expect("dns cache lock poisoned");
        if let Some(bucket) = inner.entries_by_fqdn.remove(&fqdn) {
            for entry in bucket {
                inner.fqdn_by_key.remove(&entry.resource_key);
            }
        }
    }

    /// Remove only the entry with the given resource key, leaving siblings
    /// under the same FQDN untouched.
    pub fn delete_by_resource_key(&self, resource_key: &str) {
        let mut inner = self.inner.write().expect("dns cache lock poisoned");
        if let Some(fqdn) = inner.fqdn_by_key.remove(resource_key) {
            remove_from_bucket(&mut inner, &fqdn, resource_key);
        }
    }

    /// Look up a name, expanding wildcards.
    ///
    /// The query is canonicalised (case- and trailing-dot-insensitive).
    /// An exact bucket wins; otherwise the leading label is stripped and
    /// replaced with `*.`, ascending until a bucket matches or the labels
    /// are exhausted.
    #[must_use]
    pub fn lookup(&self, fqdn: &str) -> Vec<DnsCacheEntry> {
        let query = canonical_fqdn(fqdn);
        let inner = self.inner.read().expect("dns cache lock poisoned");

        if let Some(bucket) = inner.entries_by_fqdn.get(&query) {
            return bucket.clone();
        }

        let mut remainder = query.as_str();
        while let Some((_, rest)) = remainder.split_once('.') {
            if rest.is_empty() {
                break;
            }
            let candidate = format!("*.{rest}");
            if let Some(bucket) = inner.entries_by_fqdn.get(&candidate) {
                return bucket.clone();
            }
            remainder = rest;
        }

        Vec::new()
    }

    /// Look up the single entry for a resource key.
    #[must_use]
    pub fn lookup_by_resource_key(&self, resource_key: &str) -> Option<DnsCacheEntry> {
        let inner = self.inner.read().expect("dns cache lock poisoned");
        let fqdn = inner.fqdn_by_key.get(resource_key)?;
        inner
            .entries_by_fqdn
            .get(fqdn)?
            .iter()
            .find(|entry| entry.resource_key == resource_key)
            .cloned()
    }

    /// Whether the entries stored directly under an FQDN form a servable
    /// record set: at least one entry, and either all A-contributing or a
    /// single CNAME-contributing entry.
    ///
    /// Invalid states (mixed types, multiple CNAMEs) are still stored for
    /// observability; this predicate is how they surface.
    #[must_use]
    pub fn is_valid(&self, fqdn: &str) -> bool {
        let fqdn = canonical_fqdn(fqdn);
        let inner = self.inner.read().expect("dns cache lock poisoned");
        match inner.entries_by_fqdn.get(&fqdn) {
            None => false,
            Some(bucket) if bucket.is_empty() => false,
            Some(bucket) => {
                bucket.iter().all(|entry| entry.addresses.is_ipv4())
                    || (bucket.len() == 1 && !bucket[0].addresses.is_ipv4())
            }
        }
    }

    /// Whether initial synchronisation has completed.
    ///
    /// Readiness probes gate on this so the server never answers from an
    /// empty cache that merely has not caught up yet.
    #[must_use]
    pub fn is_populated(&self) -> bool {
        self.populated.load(Ordering::Acquire)
    }

    /// Mark initial synchronisation as complete. One-shot; never unset.
    pub fn set_populated(&self) {
        self.populated.store(true, Ordering::Release);
    }
}

fn remove_from_bucket(inner: &mut Inner, fqdn: &str, resource_key: &str) {
    if let Some(bucket) = inner.entries_by_fqdn.get_mut(fqdn) {
        bucket.retain(|entry| entry.resource_key != resource_key);
        if bucket.is_empty() {
            inner.entries_by_fqdn.remove(fqdn);
        }
    }
}

#[cfg(test)]
#[path = "dnscache_tests.rs"]
mod dnscache_tests;
