// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `config.rs`

use crate::config::{clusters_zone, ControllerConfig, DnsServerConfig, PatcherConfig};
use std::time::Duration;

#[test]
fn test_clusters_zone_composition() {
    assert_eq!(clusters_zone("xcc.test"), "clusters.xcc.test");
    assert_eq!(clusters_zone("corp.example.com"), "clusters.corp.example.com");
}

// Environment-derived configuration is exercised in a single test because
// the process environment is shared between test threads.
#[test]
fn test_configs_from_env() {
    // Missing domain suffix is an irrecoverable misconfiguration.
    std::env::remove_var("XCDNS_DOMAIN_SUFFIX");
    assert!(ControllerConfig::from_env().is_err());
    assert!(DnsServerConfig::from_env().is_err());
    assert!(PatcherConfig::from_env().is_err());

    // An empty value is just as fatal as a missing one.
    std::env::set_var("XCDNS_DOMAIN_SUFFIX", "  ");
    assert!(ControllerConfig::from_env().is_err());

    // With the suffix set, everything else falls back to defaults.
    std::env::set_var("XCDNS_DOMAIN_SUFFIX", "xcc.test");

    let controller = ControllerConfig::from_env().expect("controller config");
    assert_eq!(controller.domain_suffix, "xcc.test");
    assert_eq!(controller.controller_namespace, "xcc-dns");
    assert_eq!(controller.polling_interval, Duration::from_secs(30));
    assert!(controller.enable_leader_election);

    let dns_server = DnsServerConfig::from_env().expect("dns server config");
    assert_eq!(dns_server.zone(), "clusters.xcc.test");
    assert_eq!(dns_server.listen_address, "0.0.0.0:53");

    let patcher = PatcherConfig::from_env().expect("patcher config");
    assert_eq!(patcher.resolver_config_namespace, "kube-system");
    assert_eq!(patcher.resolver_config_name, "coredns");
    assert_eq!(patcher.resolver_config_key, "Corefile");
    assert_eq!(patcher.zone(), "clusters.xcc.test");
    assert_eq!(patcher.service_ip_wait, Duration::from_secs(120));

    // Overrides are honoured.
    std::env::set_var("XCDNS_NAMESPACE", "cross-dns");
    std::env::set_var("XCDNS_POLLING_INTERVAL_SECS", "7");
    std::env::set_var("XCDNS_ENABLE_LEADER_ELECTION", "false");

    let controller = ControllerConfig::from_env().expect("controller config");
    assert_eq!(controller.controller_namespace, "cross-dns");
    assert_eq!(controller.polling_interval, Duration::from_secs(7));
    assert!(!controller.enable_leader_election);

    // A garbled interval falls back to the default rather than failing.
    std::env::set_var("XCDNS_POLLING_INTERVAL_SECS", "soon");
    let controller = ControllerConfig::from_env().expect("controller config");
    assert_eq!(controller.polling_interval, Duration::from_secs(30));

    std::env::remove_var("XCDNS_NAMESPACE");
    std::env::remove_var("XCDNS_POLLING_INTERVAL_SECS");
    std::env::remove_var("XCDNS_ENABLE_LEADER_ELECTION");
    std::env::remove_var("XCDNS_DOMAIN_SUFFIX");
}
