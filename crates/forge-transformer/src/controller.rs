//! Workload controllers: choosing the variant, creating it, and filling its
//! pod template and metadata uniformly across variants.

use std::{collections::BTreeMap, fmt};

use forge_common::warn;
use k8s_openapi::{
    api::{
        apps::v1::{
            DaemonSet, DaemonSetSpec, Deployment, DeploymentSpec, StatefulSet, StatefulSetSpec,
        },
        core::v1::{Container, Pod, PodSpec, PodTemplateSpec},
    },
    apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta},
};

use crate::{
    error::TransformResult,
    model::{ControllerKind, ConvertOptions, Provider, ServiceConfig},
    naming::{config_labels, container_name},
    objects::{
        DeploymentConfig, DeploymentConfigSpec, DeploymentTriggerPolicy, K8sObject, WorkloadParts,
    },
};

const LABEL_PREFIX: &str = "kubeforge.";

/// The workload variant generated for a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkloadKind {
    Deployment,
    DaemonSet,
    StatefulSet,
    Pod,
    DeploymentConfig,
}

impl WorkloadKind {
    /// Variants that replace their pods and must not fight over restart policy.
    pub fn is_controller(self) -> bool {
        self != WorkloadKind::Pod
    }

    /// Variants an autoscaler can target.
    pub fn is_scalable(self) -> bool {
        !matches!(self, WorkloadKind::DaemonSet | WorkloadKind::Pod)
    }
}

impl fmt::Display for WorkloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkloadKind::Deployment => "Deployment",
            WorkloadKind::DaemonSet => "DaemonSet",
            WorkloadKind::StatefulSet => "StatefulSet",
            WorkloadKind::Pod => "Pod",
            WorkloadKind::DeploymentConfig => "DeploymentConfig",
        };
        f.write_str(s)
    }
}

fn pod_like_restart(restart: &str) -> bool {
    matches!(restart, "no" | "none" | "on-failure")
}

/// An explicit controller wins; otherwise a lone service that is not meant to
/// be restarted runs as a bare pod.
pub fn choose_workload(service: &ServiceConfig, opt: &ConvertOptions) -> WorkloadKind {
    let deployment = match opt.provider {
        Provider::Kubernetes => WorkloadKind::Deployment,
        Provider::OpenShift => WorkloadKind::DeploymentConfig,
    };
    match opt.controller {
        Some(ControllerKind::Deployment) => deployment,
        Some(ControllerKind::DaemonSet) => WorkloadKind::DaemonSet,
        Some(ControllerKind::StatefulSet) => WorkloadKind::StatefulSet,
        None if !service.in_group && pod_like_restart(&service.restart) => WorkloadKind::Pod,
        None => deployment,
    }
}

/// Controllers always restart their pods.
pub fn normalize_restart(service: &mut ServiceConfig, kind: WorkloadKind) {
    if kind.is_controller() && pod_like_restart(&service.restart) {
        warn!(
            "Restart policy {:?} in service {:?} is not supported by {kind}, using \"always\"",
            service.restart, service.name
        );
        service.restart = "always".to_string();
    }
}

/// Object labels: the selector label plus the user's own labels.
pub fn workload_labels(name: &str, service: &ServiceConfig) -> BTreeMap<String, String> {
    let mut labels = config_labels(name);
    labels.extend(
        service
            .labels
            .iter()
            .filter(|(key, _)| !key.starts_with(LABEL_PREFIX))
            .map(|(k, v)| (k.clone(), v.clone())),
    );
    labels
}

fn placeholder_template(name: &str, service: &ServiceConfig) -> PodTemplateSpec {
    let container = container_name(service);
    let image = if service.image.is_empty() {
        container.clone()
    } else {
        service.image.clone()
    };
    PodTemplateSpec {
        metadata: Some(ObjectMeta {
            labels: Some(config_labels(name)),
            ..Default::default()
        }),
        spec: Some(PodSpec {
            containers: vec![Container {
                name: container,
                image: Some(image),
                ..Default::default()
            }],
            ..Default::default()
        }),
    }
}

/// Create the bare workload object. `replicas` of `Some(0)` means an
/// autoscaler owns the count and the field is left out.
pub fn init_workload(
    kind: WorkloadKind,
    name: &str,
    service: &ServiceConfig,
    replicas: Option<i32>,
    opt: &ConvertOptions,
) -> K8sObject {
    let metadata = ObjectMeta {
        name: Some(name.to_string()),
        namespace: opt.namespace.clone(),
        labels: Some(workload_labels(name, service)),
        ..Default::default()
    };
    let selector = LabelSelector {
        match_labels: Some(config_labels(name)),
        ..Default::default()
    };
    let replicas = match replicas {
        Some(0) => None,
        Some(n) => Some(n),
        None => Some(1),
    };
    let template = placeholder_template(name, service);

    match kind {
        WorkloadKind::Deployment => Deployment {
            metadata,
            spec: Some(DeploymentSpec {
                replicas,
                selector,
                template,
                ..Default::default()
            }),
            ..Default::default()
        }
        .into(),
        WorkloadKind::StatefulSet => StatefulSet {
            metadata,
            spec: Some(StatefulSetSpec {
                replicas,
                selector,
                service_name: name.to_string().into(),
                template,
                ..Default::default()
            }),
            ..Default::default()
        }
        .into(),
        WorkloadKind::DaemonSet => DaemonSet {
            metadata,
            spec: Some(DaemonSetSpec {
                selector,
                template,
                ..Default::default()
            }),
            ..Default::default()
        }
        .into(),
        WorkloadKind::Pod => Pod {
            metadata,
            spec: template.spec,
            ..Default::default()
        }
        .into(),
        WorkloadKind::DeploymentConfig => DeploymentConfig {
            metadata,
            spec: DeploymentConfigSpec {
                replicas,
                selector: config_labels(name),
                template: Some(template),
                triggers: vec![DeploymentTriggerPolicy {
                    type_: "ConfigChange".to_string(),
                }],
                ..Default::default()
            },
            ..Default::default()
        }
        .into(),
    }
}

/// Fill the pod template and the object metadata of any workload variant.
///
/// A bare pod has no template: a temporary one is built from the pod's own
/// metadata and spec, filled, and written back.
pub fn update_controller<T, M>(
    object: &mut K8sObject,
    template_filler: T,
    metadata_filler: M,
) -> TransformResult
where
    T: FnOnce(&mut PodTemplateSpec) -> TransformResult,
    M: FnOnce(&mut ObjectMeta),
{
    match object.workload_parts()? {
        WorkloadParts::Templated { metadata, template } => {
            template_filler(template)?;
            metadata_filler(metadata);
        }
        WorkloadParts::Bare(pod) => {
            let mut template = PodTemplateSpec {
                metadata: Some(pod.metadata.clone()),
                spec: pod.spec.take(),
            };
            template_filler(&mut template)?;
            pod.metadata = template.metadata.unwrap_or_default();
            pod.spec = template.spec;
            metadata_filler(&mut pod.metadata);
        }
    }
    Ok(())
}
