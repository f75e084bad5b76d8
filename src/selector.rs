// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Label selector matching utilities for cluster selection.
//!
//! This module implements Kubernetes label-selector semantics over the
//! hand-rolled [`LabelSelector`] type, enabling the `GatewayDNS` controller
//! to select workload clusters and to map cluster events back to the
//! declarations that select them.
//!
//! # Architecture
//!
//! The cluster watch pattern uses kube-rs's reflector/store to maintain an
//! in-memory cache of all `GatewayDNS` resources. When a cluster changes,
//! the watch mapper synchronously queries this cache to find all
//! declarations that select the cluster.

use crate::crd::{LabelSelector, LabelSelectorRequirement};
use std::collections::BTreeMap;

/// Check whether a label selector matches a label map.
///
/// `matchLabels` and `matchExpressions` are ANDed; an empty selector matches
/// everything, which mirrors the Kubernetes apimachinery behaviour.
///
/// # Arguments
///
/// * `selector` - The label selector to evaluate
/// * `labels` - The labels of the candidate resource
#[must_use]
pub fn matches_selector(selector: &LabelSelector, labels: &BTreeMap<String, String>) -> bool {
    if let Some(ref match_labels) = selector.match_labels {
        for (key, value) in match_labels {
            if labels.get(key) != Some(value) {
                return false;
            }
        }
    }

    if let Some(ref match_expressions) = selector.match_expressions {
        for requirement in match_expressions {
            if !matches_requirement(requirement, labels) {
                return false;
            }
        }
    }

    true
}

/// Evaluate a single `matchExpressions` requirement.
///
/// Operators follow Kubernetes semantics: `NotIn` and `DoesNotExist` are
/// satisfied by resources that do not carry the key at all. An unknown
/// operator never matches.
fn matches_requirement(
    requirement: &LabelSelectorRequirement,
    labels: &BTreeMap<String, String>,
) -> bool {
    let value = labels.get(&requirement.key);
    let values = requirement.values.as_deref().unwrap_or(&[]);

    match requirement.operator.as_str() {
        "In" => value.is_some_and(|v| values.contains(v)),
        "NotIn" => value.is_none_or(|v| !values.contains(v)),
        "Exists" => value.is_some(),
        "DoesNotExist" => value.is_none(),
        other => {
            tracing::warn!(operator = other, "Unknown label selector operator");
            false
        }
    }
}

#[cfg(test)]
#[path = "selector_tests.rs"]
mod selector_tests;
