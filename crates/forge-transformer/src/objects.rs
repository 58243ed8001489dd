//! The closed set of objects the transformer emits.

use std::collections::BTreeMap;

use k8s_openapi::{
    api::{
        apps::v1::{DaemonSet, Deployment, StatefulSet},
        autoscaling::v2::HorizontalPodAutoscaler,
        core::v1::{ConfigMap, PersistentVolumeClaim, Pod, PodTemplateSpec, Service},
        networking::v1::NetworkPolicy,
    },
    apimachinery::pkg::apis::meta::v1::ObjectMeta,
    NamespaceResourceScope,
};
use kube::{Resource, ResourceExt};
use serde::{Deserialize, Serialize};

use crate::error::{TransformError, TransformResult};

/// An OpenShift `DeploymentConfig`. k8s-openapi does not ship OpenShift
/// types, so the subset we emit is modelled here.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentConfig {
    pub api_version: String,
    pub kind: String,
    pub metadata: ObjectMeta,
    pub spec: DeploymentConfigSpec,
}

impl Default for DeploymentConfig {
    fn default() -> Self {
        Self {
            api_version: <Self as k8s_openapi::Resource>::API_VERSION.to_string(),
            kind: <Self as k8s_openapi::Resource>::KIND.to_string(),
            metadata: ObjectMeta::default(),
            spec: DeploymentConfigSpec::default(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentConfigSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub selector: BTreeMap<String, String>,
    pub strategy: DeploymentConfigStrategy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<PodTemplateSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub triggers: Vec<DeploymentTriggerPolicy>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeploymentConfigStrategy {
    #[serde(rename = "type")]
    pub type_: String,
}

impl Default for DeploymentConfigStrategy {
    fn default() -> Self {
        Self {
            type_: "Rolling".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeploymentTriggerPolicy {
    #[serde(rename = "type")]
    pub type_: String,
}

impl k8s_openapi::Resource for DeploymentConfig {
    const API_VERSION: &'static str = "apps.openshift.io/v1";
    const GROUP: &'static str = "apps.openshift.io";
    const KIND: &'static str = "DeploymentConfig";
    const VERSION: &'static str = "v1";
    const URL_PATH_SEGMENT: &'static str = "deploymentconfigs";
    type Scope = NamespaceResourceScope;
}

impl k8s_openapi::Metadata for DeploymentConfig {
    type Ty = ObjectMeta;

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}

/// Every object kind the transformer can emit.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum K8sObject {
    Deployment(Deployment),
    StatefulSet(StatefulSet),
    DaemonSet(DaemonSet),
    Pod(Pod),
    DeploymentConfig(DeploymentConfig),
    Service(Service),
    PersistentVolumeClaim(PersistentVolumeClaim),
    ConfigMap(ConfigMap),
    HorizontalPodAutoscaler(HorizontalPodAutoscaler),
    NetworkPolicy(NetworkPolicy),
}

macro_rules! each_object {
    ($object:expr, $inner:ident => $body:expr) => {
        match $object {
            K8sObject::Deployment($inner) => $body,
            K8sObject::StatefulSet($inner) => $body,
            K8sObject::DaemonSet($inner) => $body,
            K8sObject::Pod($inner) => $body,
            K8sObject::DeploymentConfig($inner) => $body,
            K8sObject::Service($inner) => $body,
            K8sObject::PersistentVolumeClaim($inner) => $body,
            K8sObject::ConfigMap($inner) => $body,
            K8sObject::HorizontalPodAutoscaler($inner) => $body,
            K8sObject::NetworkPolicy($inner) => $body,
        }
    };
}

/// Identity used for deduplication and removal.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectKey {
    pub kind: &'static str,
    pub namespace: Option<String>,
    pub name: String,
}

/// Mutable access to the pod-bearing parts of a workload.
pub enum WorkloadParts<'a> {
    Templated {
        metadata: &'a mut ObjectMeta,
        template: &'a mut PodTemplateSpec,
    },
    Bare(&'a mut Pod),
}

fn kind_of<K: k8s_openapi::Resource>(_: &K) -> &'static str {
    K::KIND
}

fn api_version_of<K: k8s_openapi::Resource>(_: &K) -> &'static str {
    K::API_VERSION
}

impl K8sObject {
    pub fn kind(&self) -> &'static str {
        each_object!(self, o => kind_of(o))
    }

    pub fn api_version(&self) -> &'static str {
        each_object!(self, o => api_version_of(o))
    }

    pub fn metadata(&self) -> &ObjectMeta {
        each_object!(self, o => o.meta())
    }

    pub fn metadata_mut(&mut self) -> &mut ObjectMeta {
        each_object!(self, o => o.meta_mut())
    }

    pub fn name(&self) -> String {
        each_object!(self, o => o.name_any())
    }

    pub fn key(&self) -> ObjectKey {
        ObjectKey {
            kind: self.kind(),
            namespace: each_object!(self, o => o.namespace()),
            name: self.name(),
        }
    }

    pub fn is_service(&self) -> bool {
        matches!(self, K8sObject::Service(_))
    }

    pub fn is_workload(&self) -> bool {
        matches!(
            self,
            K8sObject::Deployment(_)
                | K8sObject::StatefulSet(_)
                | K8sObject::DaemonSet(_)
                | K8sObject::Pod(_)
                | K8sObject::DeploymentConfig(_)
        )
    }

    /// Dispatch table from workload variant to its template and metadata.
    pub fn workload_parts(&mut self) -> TransformResult<WorkloadParts<'_>> {
        match self {
            K8sObject::Deployment(Deployment { metadata, spec, .. }) => {
                Ok(WorkloadParts::Templated {
                    metadata,
                    template: &mut spec.get_or_insert_with(Default::default).template,
                })
            }
            K8sObject::StatefulSet(StatefulSet { metadata, spec, .. }) => {
                Ok(WorkloadParts::Templated {
                    metadata,
                    template: &mut spec.get_or_insert_with(Default::default).template,
                })
            }
            K8sObject::DaemonSet(DaemonSet { metadata, spec, .. }) => {
                Ok(WorkloadParts::Templated {
                    metadata,
                    template: &mut spec.get_or_insert_with(Default::default).template,
                })
            }
            K8sObject::DeploymentConfig(DeploymentConfig { metadata, spec, .. }) => {
                Ok(WorkloadParts::Templated {
                    metadata,
                    template: spec.template.get_or_insert_with(Default::default),
                })
            }
            K8sObject::Pod(pod) => Ok(WorkloadParts::Bare(pod)),
            other => Err(TransformError::UnsupportedVariant(other.kind().to_string())),
        }
    }
}

impl From<Deployment> for K8sObject {
    fn from(o: Deployment) -> Self {
        K8sObject::Deployment(o)
    }
}

impl From<StatefulSet> for K8sObject {
    fn from(o: StatefulSet) -> Self {
        K8sObject::StatefulSet(o)
    }
}

impl From<DaemonSet> for K8sObject {
    fn from(o: DaemonSet) -> Self {
        K8sObject::DaemonSet(o)
    }
}

impl From<Pod> for K8sObject {
    fn from(o: Pod) -> Self {
        K8sObject::Pod(o)
    }
}

impl From<DeploymentConfig> for K8sObject {
    fn from(o: DeploymentConfig) -> Self {
        K8sObject::DeploymentConfig(o)
    }
}

impl From<Service> for K8sObject {
    fn from(o: Service) -> Self {
        K8sObject::Service(o)
    }
}

impl From<PersistentVolumeClaim> for K8sObject {
    fn from(o: PersistentVolumeClaim) -> Self {
        K8sObject::PersistentVolumeClaim(o)
    }
}

impl From<ConfigMap> for K8sObject {
    fn from(o: ConfigMap) -> Self {
        K8sObject::ConfigMap(o)
    }
}

impl From<HorizontalPodAutoscaler> for K8sObject {
    fn from(o: HorizontalPodAutoscaler) -> Self {
        K8sObject::HorizontalPodAutoscaler(o)
    }
}

impl From<NetworkPolicy> for K8sObject {
    fn from(o: NetworkPolicy) -> Self {
        K8sObject::NetworkPolicy(o)
    }
}
