//! Horizontal pod autoscalers from `kubeforge.hpa.*` labels.

use std::collections::BTreeMap;

use forge_common::warn;
use k8s_openapi::{
    api::autoscaling::v2::{
        CrossVersionObjectReference, HorizontalPodAutoscaler, HorizontalPodAutoscalerSpec,
        MetricSpec, MetricTarget, ResourceMetricSource,
    },
    apimachinery::pkg::apis::meta::v1::ObjectMeta,
};

use crate::naming::config_labels;

pub const LABEL_HPA_MIN_REPLICAS: &str = "kubeforge.hpa.replicas.min";
pub const LABEL_HPA_MAX_REPLICAS: &str = "kubeforge.hpa.replicas.max";
pub const LABEL_HPA_CPU: &str = "kubeforge.hpa.cpu";
pub const LABEL_HPA_MEMORY: &str = "kubeforge.hpa.memory";

pub const DEFAULT_MIN_REPLICAS: i32 = 1;
pub const DEFAULT_MAX_REPLICAS: i32 = 3;
pub const DEFAULT_CPU_UTILIZATION: i32 = 50;
pub const DEFAULT_MEMORY_UTILIZATION: i32 = 70;

const LABEL_KEYS: [&str; 4] = [
    LABEL_HPA_MIN_REPLICAS,
    LABEL_HPA_MAX_REPLICAS,
    LABEL_HPA_CPU,
    LABEL_HPA_MEMORY,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HpaValues {
    pub min_replicas: i32,
    pub max_replicas: i32,
    pub cpu_utilization: i32,
    pub memory_utilization: i32,
}

/// Whether any autoscaler label is present.
pub fn has_hpa_labels(labels: &BTreeMap<String, String>) -> bool {
    LABEL_KEYS.iter().any(|key| labels.contains_key(*key))
}

pub fn hpa_values(labels: &BTreeMap<String, String>) -> HpaValues {
    let min_replicas = label_value(labels, LABEL_HPA_MIN_REPLICAS, DEFAULT_MIN_REPLICAS);
    let mut max_replicas = label_value(labels, LABEL_HPA_MAX_REPLICAS, DEFAULT_MAX_REPLICAS);
    if max_replicas < min_replicas {
        warn!(
            "maxReplicas {max_replicas} is less than minReplicas {min_replicas}. Using minReplicas value {min_replicas}"
        );
        max_replicas = min_replicas;
    }

    HpaValues {
        min_replicas,
        max_replicas,
        cpu_utilization: percentage(labels, LABEL_HPA_CPU, DEFAULT_CPU_UTILIZATION),
        memory_utilization: percentage(labels, LABEL_HPA_MEMORY, DEFAULT_MEMORY_UTILIZATION),
    }
}

fn label_value(labels: &BTreeMap<String, String>, key: &str, default: i32) -> i32 {
    match labels.get(key).map(|v| v.trim().parse::<i32>()) {
        Some(Ok(value)) if value >= 0 => value,
        None => default,
        Some(_) => {
            warn!("Error converting label {key}. Using default value {default}");
            default
        }
    }
}

fn percentage(labels: &BTreeMap<String, String>, key: &str, default: i32) -> i32 {
    let value = label_value(labels, key, default);
    if !(1..=100).contains(&value) {
        warn!("Metric value {value} is not within the acceptable range [1, 100]. Using default value {default}");
        return default;
    }
    value
}

fn utilization_metric(resource: &str, utilization: i32) -> Option<MetricSpec> {
    (utilization > 0).then(|| MetricSpec {
        type_: "Resource".to_string(),
        resource: Some(ResourceMetricSource {
            name: resource.to_string(),
            target: MetricTarget {
                type_: "Utilization".to_string(),
                average_utilization: Some(utilization),
                ..Default::default()
            },
        }),
        ..Default::default()
    })
}

/// Autoscaler for the workload `name` of the given kind and apiVersion.
pub fn create_hpa(
    name: &str,
    target_kind: &str,
    target_api_version: &str,
    labels: &BTreeMap<String, String>,
) -> HorizontalPodAutoscaler {
    let values = hpa_values(labels);
    let metrics: Vec<MetricSpec> = [
        utilization_metric("cpu", values.cpu_utilization),
        utilization_metric("memory", values.memory_utilization),
    ]
    .into_iter()
    .flatten()
    .collect();

    HorizontalPodAutoscaler {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: Some(config_labels(name)),
            ..Default::default()
        },
        spec: Some(HorizontalPodAutoscalerSpec {
            scale_target_ref: CrossVersionObjectReference {
                api_version: Some(target_api_version.to_string()),
                kind: target_kind.to_string(),
                name: name.to_string(),
            },
            min_replicas: Some(values.min_replicas),
            max_replicas: values.max_replicas,
            metrics: (!metrics.is_empty()).then_some(metrics),
            ..Default::default()
        }),
        ..Default::default()
    }
}
