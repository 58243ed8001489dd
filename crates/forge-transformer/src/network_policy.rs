use std::collections::BTreeMap;

use k8s_openapi::{
    api::networking::v1::{
        NetworkPolicy, NetworkPolicyIngressRule, NetworkPolicyPeer, NetworkPolicySpec,
    },
    apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta},
};

use crate::naming::{format_resource_name, network_label};

/// Allow ingress between pods attached to `network`.
pub fn network_policy(network: &str) -> NetworkPolicy {
    let selector = LabelSelector {
        match_labels: Some(BTreeMap::from([(network_label(network), "true".to_string())])),
        ..Default::default()
    };

    NetworkPolicy {
        metadata: ObjectMeta {
            name: Some(format!("{}-network-policy", format_resource_name(network))),
            ..Default::default()
        },
        spec: Some(NetworkPolicySpec {
            pod_selector: selector.clone().into(),
            ingress: Some(vec![NetworkPolicyIngressRule {
                from: Some(vec![NetworkPolicyPeer {
                    pod_selector: Some(selector),
                    ..Default::default()
                }]),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}
