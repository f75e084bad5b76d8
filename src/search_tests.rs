// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `search.rs`

use crate::crd::{Cluster, ClusterSpec, LabelSelector, LabelSelectorRequirement};
use crate::search::filter_matching;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::ResourceExt;
use std::collections::BTreeMap;

fn cluster(name: &str, labels: &[(&str, &str)]) -> Cluster {
    Cluster {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some("clusters".to_string()),
            labels: Some(
                labels
                    .iter()
                    .map(|(key, value)| ((*key).to_string(), (*value).to_string()))
                    .collect(),
            ),
            ..Default::default()
        },
        spec: ClusterSpec::default(),
    }
}

#[test]
fn test_filter_matching_by_labels() {
    let clusters = vec![
        cluster("c-0", &[("hasContourGateway", "true")]),
        cluster("c-1", &[("hasContourGateway", "false")]),
        cluster("c-2", &[]),
    ];
    let selector = LabelSelector {
        match_labels: Some(BTreeMap::from([(
            "hasContourGateway".to_string(),
            "true".to_string(),
        )])),
        match_expressions: None,
    };

    let matched = filter_matching(clusters, &selector);
    let names: Vec<String> = matched.iter().map(ResourceExt::name_any).collect();
    assert_eq!(names, vec!["c-0".to_string()]);
}

#[test]
fn test_empty_selector_matches_unlabelled_clusters() {
    let clusters = vec![cluster("c-0", &[]), cluster("c-1", &[("any", "label")])];

    let matched = filter_matching(clusters, &LabelSelector::default());
    assert_eq!(matched.len(), 2);
}

#[test]
fn test_filter_matching_with_expressions() {
    let clusters = vec![
        cluster("prod-a", &[("env", "prod")]),
        cluster("dev-a", &[("env", "dev")]),
        cluster("unlabelled", &[]),
    ];
    let selector = LabelSelector {
        match_labels: None,
        match_expressions: Some(vec![LabelSelectorRequirement {
            key: "env".to_string(),
            operator: "In".to_string(),
            values: Some(vec!["prod".to_string()]),
        }]),
    };

    let matched = filter_matching(clusters, &selector);
    let names: Vec<String> = matched.iter().map(ResourceExt::name_any).collect();
    assert_eq!(names, vec!["prod-a".to_string()]);
}
