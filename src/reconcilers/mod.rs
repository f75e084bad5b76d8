// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Reconciliation logic for cross-cluster gateway DNS.
//!
//! Two control loops live here, plus the pieces the first one is built
//! from:
//!
//! 1. **Management side** - [`reconcile_gatewaydns`] ties selector →
//!    [`collector`] → [`converge`] together: observe the gateway service
//!    on every selected cluster, then drive the generated endpoint-slice
//!    records on every cluster of the namespace toward the observed state.
//!    [`delete_gatewaydns`] is the same convergence with an empty desired
//!    set.
//! 2. **Workload side** - [`endpointslice`] projects the generated slices
//!    into the DNS cache the authoritative server answers from.
//!
//! # Reconciliation Architecture
//!
//! The management loop follows the standard Kubernetes controller pattern:
//!
//! 1. **Watch** - `GatewayDNS` changes, plus cluster changes fanned out to
//!    the declarations selecting them
//! 2. **Collect** - observe gateway services across the selected clusters
//! 3. **Converge** - create/update/delete generated slices per cluster
//! 4. **Poll** - a periodic requeue re-converges even without events,
//!    because workload-cluster state changes invisibly

pub mod collector;
pub mod converge;
pub mod endpointslice;
pub mod gatewaydns;

pub use collector::{ClusterGateway, GatewayCollector};
pub use converge::{EndpointSliceConverger, SlicePlan};
pub use endpointslice::{apply_endpoint_slice, run_endpoint_slice_watcher};
pub use gatewaydns::{delete_gatewaydns, reconcile_gatewaydns};
