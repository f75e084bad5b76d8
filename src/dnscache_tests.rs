// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `dnscache.rs`

use crate::dnscache::{canonical_fqdn, AddressSet, DnsCache, DnsCacheEntry};
use std::net::Ipv4Addr;

fn ipv4_entry(key: &str, fqdn: &str, addresses: &[[u8; 4]]) -> DnsCacheEntry {
    DnsCacheEntry {
        resource_key: key.to_string(),
        fqdn: fqdn.to_string(),
        addresses: AddressSet::Ipv4(
            addresses
                .iter()
                .map(|octets| Ipv4Addr::from(*octets))
                .collect(),
        ),
    }
}

fn fqdn_entry(key: &str, fqdn: &str, targets: &[&str]) -> DnsCacheEntry {
    DnsCacheEntry {
        resource_key: key.to_string(),
        fqdn: fqdn.to_string(),
        addresses: AddressSet::Fqdn(targets.iter().map(ToString::to_string).collect()),
    }
}

#[test]
fn test_canonical_fqdn_lowercases_and_dot_terminates() {
    assert_eq!(canonical_fqdn("Foo.Example.COM"), "foo.example.com.");
    assert_eq!(canonical_fqdn("foo.example.com."), "foo.example.com.");
    assert_eq!(canonical_fqdn("*.B.C"), "*.b.c.");
}

#[test]
fn test_upsert_then_lookup_by_resource_key_is_canonical() {
    let cache = DnsCache::new();
    cache.upsert(fqdn_entry("xcc-dns/alias", "*.Gateway.C-0.NS-A.clusters.XCC.test", &["Target.XCC.Test"]));

    let entry = cache
        .lookup_by_resource_key("xcc-dns/alias")
        .expect("entry present");
    assert_eq!(entry.fqdn, "*.gateway.c-0.ns-a.clusters.xcc.test.");
    assert_eq!(
        entry.addresses,
        AddressSet::Fqdn(vec!["target.xcc.test.".to_string()])
    );
}

#[test]
fn test_upsert_is_idempotent() {
    let cache = DnsCache::new();
    let entry = ipv4_entry("xcc-dns/k1", "*.b.c", &[[1, 2, 3, 4]]);

    cache.upsert(entry.clone());
    cache.upsert(entry);

    assert_eq!(cache.lookup("foo.b.c").len(), 1);
}

#[test]
fn test_upsert_replaces_addresses_for_same_key() {
    let cache = DnsCache::new();
    cache.upsert(ipv4_entry("xcc-dns/k1", "*.b.c", &[[1, 2, 3, 4]]));
    cache.upsert(ipv4_entry("xcc-dns/k1", "*.b.c", &[[5, 6, 7, 8]]));

    let entries = cache.lookup("foo.b.c");
    assert_eq!(entries.len(), 1);
    assert_eq!(
        entries[0].addresses,
        AddressSet::Ipv4(vec![Ipv4Addr::new(5, 6, 7, 8)])
    );
}

#[test]
fn test_upsert_moves_entry_when_fqdn_changes() {
    let cache = DnsCache::new();
    cache.upsert(ipv4_entry("xcc-dns/k1", "*.old.b.c", &[[1, 2, 3, 4]]));
    cache.upsert(ipv4_entry("xcc-dns/k1", "*.new.b.c", &[[1, 2, 3, 4]]));

    assert!(cache.lookup("foo.old.b.c").is_empty());
    assert_eq!(cache.lookup("foo.new.b.c").len(), 1);
}

#[test]
fn test_wildcard_lookup_matches_one_or_more_labels() {
    // Scenario: upsert {k1, "*.b.c", ["1.2.3.4"]}; both foo.b.c and
    // foo.bar.b.c resolve to it; the bare b.c does not.
    let cache = DnsCache::new();
    cache.upsert(ipv4_entry("xcc-dns/k1", "*.b.c", &[[1, 2, 3, 4]]));

    assert_eq!(cache.lookup("foo.b.c").len(), 1);
    assert_eq!(cache.lookup("foo.bar.b.c").len(), 1);
    assert!(cache.lookup("b.c").is_empty());
}

#[test]
fn test_exact_match_wins_over_wildcard() {
    let cache = DnsCache::new();
    cache.upsert(ipv4_entry("xcc-dns/wild", "*.b.c", &[[1, 1, 1, 1]]));
    cache.upsert(ipv4_entry("xcc-dns/exact", "foo.b.c", &[[2, 2, 2, 2]]));

    let entries = cache.lookup("foo.b.c");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].resource_key, "xcc-dns/exact");
}

#[test]
fn test_lookup_is_case_and_trailing_dot_insensitive() {
    let cache = DnsCache::new();
    cache.upsert(ipv4_entry("xcc-dns/k1", "*.b.c", &[[1, 2, 3, 4]]));

    assert_eq!(cache.lookup("FOO.B.C").len(), 1);
    assert_eq!(cache.lookup("foo.b.c.").len(), 1);
    assert_eq!(cache.lookup("Foo.B.c.").len(), 1);
}

#[test]
fn test_delete_removes_all_entries_under_fqdn() {
    let cache = DnsCache::new();
    cache.upsert(ipv4_entry("xcc-dns/k1", "*.b.c", &[[1, 2, 3, 4]]));
    cache.upsert(ipv4_entry("xcc-dns/k2", "*.b.c", &[[5, 6, 7, 8]]));

    cache.delete("*.b.c");

    assert!(cache.lookup("foo.b.c").is_empty());
    assert!(cache.lookup_by_resource_key("xcc-dns/k1").is_none());
    assert!(cache.lookup_by_resource_key("xcc-dns/k2").is_none());
}

#[test]
fn test_delete_by_resource_key_leaves_siblings() {
    let cache = DnsCache::new();
    cache.upsert(ipv4_entry("xcc-dns/k1", "*.b.c", &[[1, 2, 3, 4]]));
    cache.upsert(ipv4_entry("xcc-dns/k2", "*.b.c", &[[5, 6, 7, 8]]));

    cache.delete_by_resource_key("xcc-dns/k1");

    let entries = cache.lookup("foo.b.c");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].resource_key, "xcc-dns/k2");
}

#[test]
fn test_is_valid_all_ipv4() {
    let cache = DnsCache::new();
    cache.upsert(ipv4_entry("xcc-dns/k1", "*.b.c", &[[1, 2, 3, 4]]));
    cache.upsert(ipv4_entry("xcc-dns/k2", "*.b.c", &[[5, 6, 7, 8]]));

    assert!(cache.is_valid("*.b.c"));
}

#[test]
fn test_is_valid_single_cname() {
    let cache = DnsCache::new();
    cache.upsert(fqdn_entry("xcc-dns/k1", "*.b.c", &["target.b.c"]));

    assert!(cache.is_valid("*.b.c"));
}

#[test]
fn test_is_valid_rejects_mixed_and_multiple_cnames() {
    let cache = DnsCache::new();
    cache.upsert(ipv4_entry("xcc-dns/k1", "*.b.c", &[[1, 2, 3, 4]]));
    cache.upsert(fqdn_entry("xcc-dns/k2", "*.b.c", &["target.b.c"]));
    // Mixed A and CNAME under one FQDN is stored but reported invalid.
    assert!(!cache.is_valid("*.b.c"));
    assert_eq!(cache.lookup("foo.b.c").len(), 2);

    let cache = DnsCache::new();
    cache.upsert(fqdn_entry("xcc-dns/k1", "*.b.c", &["one.b.c"]));
    cache.upsert(fqdn_entry("xcc-dns/k2", "*.b.c", &["two.b.c"]));
    assert!(!cache.is_valid("*.b.c"));
}

#[test]
fn test_is_valid_false_for_unknown_fqdn() {
    let cache = DnsCache::new();
    assert!(!cache.is_valid("nope.b.c"));
}

#[test]
fn test_populated_flag_is_one_shot() {
    let cache = DnsCache::new();
    assert!(!cache.is_populated());
    cache.set_populated();
    assert!(cache.is_populated());
    cache.set_populated();
    assert!(cache.is_populated());
}

#[test]
fn test_concurrent_readers_with_writer() {
    use std::sync::Arc;

    let cache = Arc::new(DnsCache::new());
    cache.upsert(ipv4_entry("xcc-dns/k1", "*.b.c", &[[1, 2, 3, 4]]));

    let mut handles = Vec::new();
    for _ in 0..4 {
        let cache = cache.clone();
        handles.push(std::thread::spawn(move || {
            for _ in 0..1000 {
                let _ = cache.lookup("foo.b.c");
            }
        }));
    }

    let writer = cache.clone();
    handles.push(std::thread::spawn(move || {
        for i in 0..1000u16 {
            let octet = u8::try_from(i % 250).unwrap();
            writer.upsert(ipv4_entry("xcc-dns/k1", "*.b.c", &[[1, 2, 3, octet]]));
        }
    }));

    for handle in handles {
        handle.join().expect("thread panicked");
    }

    assert_eq!(cache.lookup("foo.b.c").len(), 1);
}
