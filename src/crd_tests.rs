// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `crd.rs`

use crate::crd::{
    Cluster, ClusterId, ClusterSpec, GatewayDNS, GatewayDNSSpec, GatewayDnsId, LabelSelector,
    ResolutionType, ServiceRef,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

#[test]
fn test_service_ref_parses_namespace_and_name() {
    let service = ServiceRef::parse("contour-external/envoy").expect("valid reference");
    assert_eq!(service.namespace, "contour-external");
    assert_eq!(service.name, "envoy");
    assert_eq!(service.to_string(), "contour-external/envoy");
}

#[test]
fn test_service_ref_rejects_malformed_references() {
    assert!(ServiceRef::parse("envoy").is_err());
    assert!(ServiceRef::parse("/envoy").is_err());
    assert!(ServiceRef::parse("ns/").is_err());
    assert!(ServiceRef::parse("a/b/c").is_err());
    assert!(ServiceRef::parse("").is_err());
}

#[test]
fn test_cluster_id_display_and_extraction() {
    let cluster = Cluster {
        metadata: ObjectMeta {
            name: Some("c-0".to_string()),
            namespace: Some("ns-a".to_string()),
            ..Default::default()
        },
        spec: ClusterSpec::default(),
    };

    let id = ClusterId::from_cluster(&cluster).expect("identity present");
    assert_eq!(id.to_string(), "ns-a/c-0");

    let nameless = Cluster {
        metadata: ObjectMeta::default(),
        spec: ClusterSpec::default(),
    };
    assert!(ClusterId::from_cluster(&nameless).is_none());
}

#[test]
fn test_gateway_dns_id_matches_back_reference_format() {
    let gateway_dns = GatewayDNS {
        metadata: ObjectMeta {
            name: Some("gateway-dns".to_string()),
            namespace: Some("clusters".to_string()),
            ..Default::default()
        },
        spec: GatewayDNSSpec {
            cluster_selector: LabelSelector::default(),
            service: "contour-external/envoy".to_string(),
            resolution_type: ResolutionType::LoadBalancer,
        },
    };

    let id = GatewayDnsId::from_gateway_dns(&gateway_dns).expect("identity present");
    assert_eq!(id.to_string(), "clusters/gateway-dns");
}

#[test]
fn test_resolution_type_serialises_as_load_balancer() {
    let json = serde_json::to_string(&ResolutionType::LoadBalancer).unwrap();
    assert_eq!(json, "\"loadBalancer\"");

    let parsed: ResolutionType = serde_json::from_str("\"loadBalancer\"").unwrap();
    assert_eq!(parsed, ResolutionType::LoadBalancer);
}

#[test]
fn test_gateway_dns_spec_deserialises_from_manifest() {
    let yaml = r"
clusterSelector:
  matchLabels:
    hasContourGateway: 'true'
  matchExpressions:
    - key: env
      operator: In
      values: [prod]
service: contour-external/envoy
resolutionType: loadBalancer
";
    let spec: GatewayDNSSpec = serde_yaml::from_str(yaml).expect("valid manifest");
    assert_eq!(spec.service, "contour-external/envoy");
    assert_eq!(spec.resolution_type, ResolutionType::LoadBalancer);

    let match_labels = spec.cluster_selector.match_labels.expect("matchLabels");
    assert_eq!(match_labels.get("hasContourGateway").map(String::as_str), Some("true"));
    let expressions = spec.cluster_selector.match_expressions.expect("matchExpressions");
    assert_eq!(expressions.len(), 1);
    assert_eq!(expressions[0].operator, "In");
}

#[test]
fn test_resolution_type_defaults_to_load_balancer() {
    let yaml = r"
clusterSelector: {}
service: contour-external/envoy
";
    let spec: GatewayDNSSpec = serde_yaml::from_str(yaml).expect("valid manifest");
    assert_eq!(spec.resolution_type, ResolutionType::LoadBalancer);
}

#[test]
fn test_gateway_dns_crd_metadata() {
    use kube::core::CustomResourceExt;

    let crd = GatewayDNS::crd();
    assert_eq!(crd.spec.group, "connectivity.tanzu.vmware.com");
    assert_eq!(crd.spec.names.kind, "GatewayDNS");
    assert_eq!(crd.spec.names.plural, "gatewaydnses");
}
