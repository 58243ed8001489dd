//! The service model consumed by the transformer.
//!
//! Everything here is plain data: the loader fills it in (including the
//! contents of env files and config files), the transformer reads it.

use std::{collections::BTreeMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// Normalized description of one service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    pub container_name: Option<String>,
    pub image: String,
    pub command: Vec<String>,
    pub args: Vec<String>,
    pub working_dir: Option<String>,

    /// Literal environment variables.
    pub environment: BTreeMap<String, String>,
    /// Env files, already read by the loader.
    pub env_files: Vec<EnvFile>,
    /// Names of existing config maps exposed through `envFrom`.
    pub env_from: Vec<String>,

    pub ports: Vec<PortSpec>,
    pub health_checks: HealthChecks,

    /// Millicores.
    pub cpu_limit: i64,
    /// Bytes.
    pub mem_limit: i64,
    pub cpu_reservation: i64,
    pub mem_reservation: i64,
    pub ephemeral_storage_limit: Option<String>,
    pub ephemeral_storage_request: Option<String>,

    pub privileged: bool,
    /// `UID` or `UID:GID`.
    pub user: Option<String>,
    pub group_add: Vec<i64>,
    pub fs_group: Option<i64>,
    pub read_only: bool,
    pub cap_add: Vec<String>,
    pub cap_drop: Vec<String>,
    pub pid: Option<String>,

    pub volumes: Vec<VolumeSpec>,
    pub tmpfs: Vec<String>,

    pub restart: String,
    pub network_mode: String,
    pub networks: Vec<String>,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
    pub replicas: Option<i32>,
    /// Set by the grouping pass.
    pub in_group: bool,

    pub image_pull_policy: String,
    pub image_pull_secret: Option<String>,
    pub hostname: Option<String>,
    pub domainname: Option<String>,
    pub stop_grace_period: Option<String>,
    pub stdin: bool,
    pub tty: bool,
    pub service_type: String,
    pub placement: Placement,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct EnvFile {
    pub path: String,
    pub values: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct PortSpec {
    pub host_port: Option<i32>,
    pub container_port: i32,
    pub protocol: Option<String>,
    pub host_ip: Option<String>,
}

impl PortSpec {
    pub fn protocol(&self) -> String {
        self.protocol
            .as_deref()
            .filter(|p| !p.is_empty())
            .unwrap_or("TCP")
            .to_uppercase()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthChecks {
    pub liveness: HealthCheck,
    pub readiness: HealthCheck,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthCheck {
    pub test: Vec<String>,
    pub http_path: Option<String>,
    pub http_port: Option<i32>,
    pub tcp_port: Option<i32>,
    pub timeout: Option<i32>,
    pub interval: Option<i32>,
    pub retries: Option<i32>,
    pub start_period: Option<i32>,
    pub disable: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct VolumeSpec {
    pub volume_name: Option<String>,
    /// Host path for bind mounts.
    pub host: Option<String>,
    pub container: String,
    /// `ro`, `rw`, or an access-mode token (`rox`, `rwx`, `rwop`, `rwo`).
    pub mode: Option<String>,
    pub pvc_size: Option<String>,
    pub storage_class: Option<String>,
    pub selector_value: Option<String>,
    /// Present when the host path was detected as a config file or directory.
    pub config: Option<ConfigContent>,
}

impl VolumeSpec {
    /// Identifier of the mount as it was declared, used as a grouping fingerprint.
    pub fn mount_id(&self) -> String {
        let source = self
            .volume_name
            .as_deref()
            .or(self.host.as_deref())
            .unwrap_or_default();
        match self.mode.as_deref() {
            Some(mode) if !mode.is_empty() => format!("{source}:{}:{mode}", self.container),
            _ => format!("{source}:{}", self.container),
        }
    }

    pub fn read_only(&self) -> bool {
        matches!(self.mode.as_deref(), Some("ro") | Some("rox"))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ConfigContent {
    /// File name -> content.
    pub files: BTreeMap<String, String>,
    pub is_dir: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Placement {
    /// e.g. `node.labels.disk == ssd`
    pub constraints: Vec<String>,
    /// e.g. `spread=node.labels.zone`
    pub preferences: Vec<String>,
}

/// Workload controller requested by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ControllerKind {
    Deployment,
    DaemonSet,
    StatefulSet,
}

impl FromStr for ControllerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "deployment" => Ok(ControllerKind::Deployment),
            "daemonset" => Ok(ControllerKind::DaemonSet),
            "statefulset" => Ok(ControllerKind::StatefulSet),
            other => Err(format!("unknown controller {other:?}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    Kubernetes,
    OpenShift,
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "kubernetes" | "k8s" => Ok(Provider::Kubernetes),
            "openshift" => Ok(Provider::OpenShift),
            other => Err(format!("unknown provider {other:?}")),
        }
    }
}

/// How declared volumes are materialized.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
pub enum VolumeMode {
    #[default]
    #[serde(rename = "persistentVolumeClaim")]
    PersistentVolumeClaim,
    #[serde(rename = "emptyDir")]
    EmptyDir,
    #[serde(rename = "hostPath")]
    HostPath,
    #[serde(rename = "configMap")]
    ConfigMap,
}

impl FromStr for VolumeMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "persistentVolumeClaim" => Ok(VolumeMode::PersistentVolumeClaim),
            "emptyDir" => Ok(VolumeMode::EmptyDir),
            "hostPath" => Ok(VolumeMode::HostPath),
            "configMap" => Ok(VolumeMode::ConfigMap),
            other => Err(format!("unknown volume type {other:?}")),
        }
    }
}

impl fmt::Display for VolumeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            VolumeMode::PersistentVolumeClaim => "persistentVolumeClaim",
            VolumeMode::EmptyDir => "emptyDir",
            VolumeMode::HostPath => "hostPath",
            VolumeMode::ConfigMap => "configMap",
        };
        f.write_str(s)
    }
}

/// Options for one conversion run.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ConvertOptions {
    pub controller: Option<ControllerKind>,
    pub provider: Provider,
    /// `label`, `volume`, or anything else for no grouping.
    pub service_group_mode: Option<String>,
    pub volumes: VolumeMode,
    pub generate_network_policies: bool,
    pub pvc_request_size: String,
    pub namespace: Option<String>,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            controller: None,
            provider: Provider::default(),
            service_group_mode: None,
            volumes: VolumeMode::default(),
            generate_network_policies: false,
            pvc_request_size: "100Mi".to_string(),
            namespace: None,
        }
    }
}
