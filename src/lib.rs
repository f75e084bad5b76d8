// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

#![allow(unexpected_cfgs)]

//! # xcdns - Cross-Cluster Gateway DNS for Kubernetes
//!
//! xcdns propagates the externally routable endpoints of a designated
//! per-cluster gateway service from a management cluster out to every
//! workload cluster in a selected group, and serves DNS answers for
//! wildcard hostnames derived from those endpoints on each workload
//! cluster.
//!
//! ## Overview
//!
//! A [`crd::GatewayDNS`] declaration names a gateway service and selects
//! workload clusters by label. The controller observes the service's
//! load-balancer addresses on every selected cluster and converges a set
//! of annotated `EndpointSlice` records onto every cluster in the group's
//! namespace, so every cluster sees the same set. On each workload
//! cluster, a DNS plane projects those records into an in-memory cache and
//! answers queries of the form
//! `*.gateway.<cluster>.<cluster-namespace>.clusters.<suffix>` with the
//! target cluster's gateway IPs.
//!
//! ## Modules
//!
//! - [`crd`] - the `GatewayDNS` declaration and cluster identities
//! - [`reconcilers`] - the management and workload control loops
//! - [`dnscache`] - the authoritative record cache
//! - [`dnsserver`] - the authoritative DNS server
//! - [`patcher`] - the one-shot cluster resolver patcher
//!
//! ## Example
//!
//! ```rust,no_run
//! use xcdns::crd::{GatewayDNSSpec, LabelSelector, ResolutionType};
//! use std::collections::BTreeMap;
//!
//! let spec = GatewayDNSSpec {
//!     cluster_selector: LabelSelector {
//!         match_labels: Some(BTreeMap::from([(
//!             "hasContourGateway".to_string(),
//!             "true".to_string(),
//!         )])),
//!         match_expressions: None,
//!     },
//!     service: "contour-external/envoy".to_string(),
//!     resolution_type: ResolutionType::LoadBalancer,
//! };
//! ```

pub mod clients;
pub mod config;
pub mod constants;
pub mod context;
pub mod crd;
pub mod dnscache;
pub mod dnsserver;
pub mod metrics;
pub mod patcher;
pub mod reconcilers;
pub mod search;
pub mod selector;
