// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Integration tests for the cross-cluster gateway DNS operator.
//!
//! These tests verify behaviour against a live Kubernetes cluster with the
//! `GatewayDNS` CRD installed. They are skipped automatically when no
//! cluster is reachable.
//!
//! Run with: cargo test --test gatewaydns_integration -- --ignored

mod common;

use common::{cleanup_test_namespace, create_test_namespace, get_kube_client_or_skip};
use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, DeleteParams, PostParams};
use std::collections::BTreeMap;
use xcdns::crd::{GatewayDNS, GatewayDNSSpec, LabelSelector, ResolutionType};
use xcdns::patcher::CorefilePatcher;

const TEST_NAMESPACE: &str = "xcdns-integration-test";

fn test_gateway_dns(name: &str) -> GatewayDNS {
    GatewayDNS {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(TEST_NAMESPACE.to_string()),
            ..Default::default()
        },
        spec: GatewayDNSSpec {
            cluster_selector: LabelSelector {
                match_labels: Some(BTreeMap::from([(
                    "hasContourGateway".to_string(),
                    "true".to_string(),
                )])),
                match_expressions: None,
            },
            service: "contour-external/envoy".to_string(),
            resolution_type: ResolutionType::LoadBalancer,
        },
    }
}

#[tokio::test]
#[ignore = "requires a cluster with the GatewayDNS CRD installed"]
async fn test_gatewaydns_crud() {
    let Some(client) = get_kube_client_or_skip().await else {
        return;
    };

    create_test_namespace(&client, TEST_NAMESPACE)
        .await
        .expect("namespace created");

    let api: Api<GatewayDNS> = Api::namespaced(client.clone(), TEST_NAMESPACE);
    let declaration = test_gateway_dns("it-gateway-dns");

    api.create(&PostParams::default(), &declaration)
        .await
        .expect("GatewayDNS created");

    let fetched = api.get("it-gateway-dns").await.expect("GatewayDNS fetched");
    assert_eq!(fetched.spec.service, "contour-external/envoy");
    assert_eq!(fetched.spec.resolution_type, ResolutionType::LoadBalancer);

    api.delete("it-gateway-dns", &DeleteParams::default())
        .await
        .expect("GatewayDNS deleted");

    cleanup_test_namespace(&client, TEST_NAMESPACE)
        .await
        .expect("namespace cleaned up");
}

#[tokio::test]
#[ignore = "requires a cluster"]
async fn test_corefile_patcher_is_idempotent_against_cluster() {
    let Some(client) = get_kube_client_or_skip().await else {
        return;
    };

    create_test_namespace(&client, TEST_NAMESPACE)
        .await
        .expect("namespace created");

    let config_maps: Api<ConfigMap> = Api::namespaced(client.clone(), TEST_NAMESPACE);
    let base_corefile = ".:53 {\n    forward . /etc/resolv.conf\n}\n";
    let config_map = ConfigMap {
        metadata: ObjectMeta {
            name: Some("it-coredns".to_string()),
            namespace: Some(TEST_NAMESPACE.to_string()),
            ..Default::default()
        },
        data: Some(BTreeMap::from([(
            "Corefile".to_string(),
            base_corefile.to_string(),
        )])),
        ..Default::default()
    };

    match config_maps.create(&PostParams::default(), &config_map).await {
        Ok(_) => {}
        Err(kube::Error::Api(ae)) if ae.code == 409 => {}
        Err(e) => panic!("creating test config map: {e}"),
    }

    let patcher = CorefilePatcher::new(
        client.clone(),
        TEST_NAMESPACE.to_string(),
        "it-coredns".to_string(),
        "Corefile".to_string(),
        "clusters.xcc.test".to_string(),
    );

    patcher.append_stub("1.2.3.4").await.expect("first patch");
    let once = config_maps
        .get("it-coredns")
        .await
        .expect("config map fetched")
        .data
        .unwrap()["Corefile"]
        .clone();
    assert!(once.starts_with(base_corefile));
    assert!(once.contains("clusters.xcc.test:53"));
    assert!(once.contains("forward . 1.2.3.4"));

    patcher.append_stub("1.2.3.4").await.expect("second patch");
    let twice = config_maps
        .get("it-coredns")
        .await
        .expect("config map fetched")
        .data
        .unwrap()["Corefile"]
        .clone();
    assert_eq!(once, twice);

    config_maps
        .delete("it-coredns", &DeleteParams::default())
        .await
        .expect("config map deleted");
    cleanup_test_namespace(&client, TEST_NAMESPACE)
        .await
        .expect("namespace cleaned up");
}
