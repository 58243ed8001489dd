//! Pod spec assembly.
//!
//! A pod spec is built by folding a list of [`PodSpecOption`]s over an empty
//! [`PodSpec`]. Every option writes only its own concern, so callers pick the
//! subset they need and the order only matters between steps that touch the
//! same container.

use std::collections::{BTreeMap, HashSet};

use forge_common::{debug, warn};
use k8s_openapi::{
    api::core::v1::{
        Affinity, Capabilities, Container, ContainerPort, ExecAction, HTTPGetAction,
        LocalObjectReference, NodeAffinity, NodeSelector, NodeSelectorRequirement,
        NodeSelectorTerm, PodSecurityContext, PodSpec, Probe, ResourceRequirements,
        SecurityContext, TCPSocketAction, TopologySpreadConstraint, Volume, VolumeMount,
    },
    apimachinery::pkg::{
        api::resource::Quantity, apis::meta::v1::LabelSelector, util::intstr::IntOrString,
    },
};
use lazy_static::lazy_static;
use regex::Regex;

use crate::{
    env::config_envs,
    error::{TransformError, TransformResult},
    model::{ConvertOptions, HealthCheck, ServiceConfig},
    naming::{
        config_labels, container_args, container_name, duration_to_seconds,
        LABEL_INIT_CONTAINER_COMMAND, LABEL_INIT_CONTAINER_IMAGE, LABEL_INIT_CONTAINER_NAME,
    },
};

pub const DEFAULT_INIT_CONTAINER_NAME: &str = "init-service";

lazy_static! {
    static ref QUANTITY: Regex =
        Regex::new(r"^[0-9]+(\.[0-9]+)?(Ki|Mi|Gi|Ti|Pi|Ei|k|M|G|T|P|E|m)?$").unwrap();
}

/// What a step may read besides the pod spec itself.
#[derive(Debug, Clone, Copy)]
pub struct StepContext<'a> {
    pub service: &'a ServiceConfig,
    pub opt: &'a ConvertOptions,
    /// Name of the workload the pod spec ends up in.
    pub workload_name: &'a str,
}

impl<'a> StepContext<'a> {
    pub fn new(service: &'a ServiceConfig, opt: &'a ConvertOptions, workload_name: &'a str) -> Self {
        Self {
            service,
            opt,
            workload_name,
        }
    }
}

/// The catalogue of pod spec mutations.
#[derive(Debug, Clone, PartialEq)]
pub enum PodSpecOption {
    AddContainer,
    ResourcesLimits,
    ResourcesRequests,
    SecurityContext,
    Volumes(Vec<Volume>),
    VolumeMounts(Vec<VolumeMount>),
    Ports,
    ImagePullPolicy,
    RestartPolicy,
    HostName,
    DomainName,
    TerminationGracePeriodSeconds,
    ServiceAccountName(String),
    TopologySpreadConstraints,
    Affinity,
    InitContainers,
}

impl PodSpecOption {
    pub fn apply(&self, mut spec: PodSpec, ctx: &StepContext<'_>) -> TransformResult<PodSpec> {
        let service = ctx.service;
        match self {
            PodSpecOption::AddContainer => {
                spec.containers.push(build_container(service)?);
                if let Some(secret) = service.image_pull_secret.as_deref().filter(|s| !s.is_empty()) {
                    let secrets = spec.image_pull_secrets.get_or_insert_with(Vec::new);
                    let reference = LocalObjectReference {
                        name: secret.to_string().into(),
                    };
                    if !secrets.contains(&reference) {
                        secrets.push(reference);
                    }
                }
            }
            PodSpecOption::ResourcesLimits => {
                let limits = resource_list(
                    service.mem_limit,
                    service.cpu_limit,
                    service.ephemeral_storage_limit.as_deref(),
                    &service.name,
                );
                if let Some(limits) = limits {
                    with_container(&mut spec, service, |c| {
                        c.resources.get_or_insert_with(ResourceRequirements::default).limits = Some(limits);
                    });
                }
            }
            PodSpecOption::ResourcesRequests => {
                let requests = resource_list(
                    service.mem_reservation,
                    service.cpu_reservation,
                    service.ephemeral_storage_request.as_deref(),
                    &service.name,
                );
                if let Some(requests) = requests {
                    with_container(&mut spec, service, |c| {
                        c.resources.get_or_insert_with(ResourceRequirements::default).requests =
                            Some(requests);
                    });
                }
            }
            PodSpecOption::SecurityContext => {
                if let Some(context) = container_security_context(service) {
                    with_container(&mut spec, service, |c| c.security_context = Some(context));
                }
                if let Some(context) = pod_security_context(service) {
                    spec.security_context = Some(context);
                }
                match service.pid.as_deref() {
                    None | Some("") => {}
                    Some("host") => spec.host_pid = Some(true),
                    Some(other) => warn!(
                        "Ignoring PID key for service {:?}. Invalid value {:?}",
                        service.name, other
                    ),
                }
            }
            PodSpecOption::Volumes(volumes) => {
                union_volumes(spec.volumes.get_or_insert_with(Vec::new), volumes);
                if spec.volumes.as_ref().is_some_and(Vec::is_empty) {
                    spec.volumes = None;
                }
            }
            PodSpecOption::VolumeMounts(mounts) => {
                with_container(&mut spec, service, |c| {
                    union_mounts(c.volume_mounts.get_or_insert_with(Vec::new), mounts);
                    if c.volume_mounts.as_ref().is_some_and(Vec::is_empty) {
                        c.volume_mounts = None;
                    }
                });
            }
            PodSpecOption::Ports => {
                let ports = config_ports(service);
                if !ports.is_empty() {
                    with_container(&mut spec, service, |c| c.ports = Some(ports));
                }
            }
            PodSpecOption::ImagePullPolicy => {
                let policy = image_pull_policy(&service.name, &service.image_pull_policy)?;
                with_container(&mut spec, service, |c| c.image_pull_policy = policy);
            }
            PodSpecOption::RestartPolicy => {
                spec.restart_policy = Some(restart_policy(&service.name, &service.restart)?);
            }
            PodSpecOption::HostName => {
                if let Some(hostname) = service.hostname.as_deref().filter(|h| !h.is_empty()) {
                    spec.hostname = Some(hostname.to_string());
                }
            }
            PodSpecOption::DomainName => {
                if let Some(domain) = service.domainname.as_deref().filter(|d| !d.is_empty()) {
                    spec.subdomain = Some(domain.to_string());
                }
            }
            PodSpecOption::TerminationGracePeriodSeconds => {
                if let Some(period) = service.stop_grace_period.as_deref().filter(|p| !p.is_empty()) {
                    match duration_to_seconds(period) {
                        Ok(seconds) => spec.termination_grace_period_seconds = Some(seconds),
                        Err(_) => warn!(
                            "Failed to parse duration {:?} for service {:?}",
                            period, service.name
                        ),
                    }
                }
            }
            PodSpecOption::ServiceAccountName(name) => {
                spec.service_account_name = Some(name.clone());
            }
            PodSpecOption::TopologySpreadConstraints => {
                let constraints = topology_spread_constraints(service, ctx.workload_name);
                if !constraints.is_empty() {
                    spec.topology_spread_constraints = Some(constraints);
                }
            }
            PodSpecOption::Affinity => {
                if let Some(affinity) = config_affinity(service) {
                    spec.affinity = Some(affinity);
                }
            }
            PodSpecOption::InitContainers => {
                if let Some(container) = init_container(service) {
                    spec.init_containers.get_or_insert_with(Vec::new).push(container);
                }
            }
        }
        Ok(spec)
    }
}

/// Applies options in order over an owned pod spec.
#[derive(Debug, Default, Clone)]
pub struct PodSpecBuilder {
    spec: PodSpec,
}

impl PodSpecBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(mut self, ctx: &StepContext<'_>, options: &[PodSpecOption]) -> TransformResult<Self> {
        for option in options {
            self.spec = option.apply(self.spec, ctx)?;
        }
        Ok(self)
    }

    pub fn build(self) -> PodSpec {
        self.spec
    }
}

/// Add volumes whose names are not present yet.
pub fn union_volumes(existing: &mut Vec<Volume>, incoming: &[Volume]) {
    let mut names: HashSet<String> = existing.iter().map(|v| v.name.clone()).collect();
    for volume in incoming {
        if names.insert(volume.name.clone()) {
            existing.push(volume.clone());
        }
    }
}

/// Add mounts whose paths are not present yet.
pub fn union_mounts(existing: &mut Vec<VolumeMount>, incoming: &[VolumeMount]) {
    let mut paths: HashSet<String> = existing.iter().map(|m| m.mount_path.clone()).collect();
    for mount in incoming {
        if paths.insert(mount.mount_path.clone()) {
            existing.push(mount.clone());
        }
    }
}

fn with_container(spec: &mut PodSpec, service: &ServiceConfig, f: impl FnOnce(&mut Container)) {
    let name = container_name(service);
    match spec.containers.iter_mut().find(|c| c.name == name) {
        Some(container) => f(container),
        None => debug!("No container {name} in pod spec, skipping step"),
    }
}

fn build_container(service: &ServiceConfig) -> TransformResult<Container> {
    let name = container_name(service);
    let image = if service.image.is_empty() {
        name.clone()
    } else {
        service.image.clone()
    };
    let (envs, env_from) = config_envs(service);
    let args = container_args(service);

    Ok(Container {
        name,
        image: Some(image),
        env: (!envs.is_empty()).then_some(envs),
        env_from: (!env_from.is_empty()).then_some(env_from),
        command: (!service.command.is_empty()).then(|| service.command.clone()),
        args: (!args.is_empty()).then_some(args),
        working_dir: service.working_dir.clone().filter(|w| !w.is_empty()),
        stdin: service.stdin.then_some(true),
        tty: service.tty.then_some(true),
        liveness_probe: config_probe(&service.health_checks.liveness, &service.name)?,
        readiness_probe: config_probe(&service.health_checks.readiness, &service.name)?,
        ..Default::default()
    })
}

/// Translate a health check. Disabled or unset checks produce no probe;
/// otherwise exactly one handler is set, preferring exec over HTTP over TCP.
pub fn config_probe(check: &HealthCheck, service: &str) -> TransformResult<Option<Probe>> {
    if check.disable || *check == HealthCheck::default() {
        return Ok(None);
    }

    let mut probe = Probe::default();
    let http_port = check.http_port.filter(|p| *p != 0);
    let http_path = check.http_path.as_deref().filter(|p| !p.is_empty());
    if !check.test.is_empty() {
        probe.exec = Some(ExecAction {
            command: Some(check.test.clone()),
        });
    } else if let (Some(path), Some(port)) = (http_path, http_port) {
        probe.http_get = Some(HTTPGetAction {
            path: Some(path.to_string()),
            port: IntOrString::Int(port),
            ..Default::default()
        });
    } else if let Some(port) = check.tcp_port.filter(|p| *p != 0) {
        probe.tcp_socket = Some(TCPSocketAction {
            port: IntOrString::Int(port),
            ..Default::default()
        });
    } else {
        return Err(TransformError::MalformedHealthCheck {
            service: service.to_string(),
        });
    }

    let non_zero = |v: Option<i32>| v.filter(|v| *v != 0);
    probe.timeout_seconds = non_zero(check.timeout);
    probe.period_seconds = non_zero(check.interval);
    probe.failure_threshold = non_zero(check.retries);
    probe.initial_delay_seconds = non_zero(check.start_period);
    Ok(Some(probe))
}

/// Container ports, one per (port, protocol).
pub fn config_ports(service: &ServiceConfig) -> Vec<ContainerPort> {
    let mut seen = HashSet::new();
    service
        .ports
        .iter()
        .filter(|port| seen.insert((port.container_port, port.protocol())))
        .map(|port| ContainerPort {
            container_port: port.container_port,
            host_ip: port.host_ip.clone().filter(|ip| !ip.is_empty()),
            protocol: Some(port.protocol()),
            ..Default::default()
        })
        .collect()
}

pub fn memory_quantity(bytes: i64) -> Quantity {
    Quantity(bytes.to_string())
}

pub fn cpu_quantity(millicores: i64) -> Quantity {
    if millicores % 1000 == 0 {
        Quantity((millicores / 1000).to_string())
    } else {
        Quantity(format!("{millicores}m"))
    }
}

fn resource_list(
    memory: i64,
    cpu: i64,
    ephemeral_storage: Option<&str>,
    service: &str,
) -> Option<BTreeMap<String, Quantity>> {
    let mut resources = BTreeMap::new();
    if memory != 0 {
        resources.insert("memory".to_string(), memory_quantity(memory));
    }
    if cpu != 0 {
        resources.insert("cpu".to_string(), cpu_quantity(cpu));
    }
    if let Some(value) = ephemeral_storage.filter(|v| !v.is_empty()) {
        if QUANTITY.is_match(value) {
            resources.insert("ephemeral-storage".to_string(), Quantity(value.to_string()));
        } else {
            warn!("Ignoring ephemeral storage {value:?} for service {service:?}: not a quantity");
        }
    }
    (!resources.is_empty()).then_some(resources)
}

/// Parse a `UID` or `UID:GID` directive. Segments that are not non-negative
/// integers are dropped.
pub fn parse_user(user: &str) -> (Option<i64>, Option<i64>) {
    let parse = |segment: &str, what: &str| match segment.parse::<i64>() {
        Ok(id) if id >= 0 => Some(id),
        _ => {
            warn!("Ignoring {what} in user directive {user:?}: must be a non-negative number");
            None
        }
    };

    let parts: Vec<&str> = user.split(':').collect();
    match parts[..] {
        [uid] => (parse(uid, "user"), None),
        [uid, gid] => (parse(uid, "user"), parse(gid, "group")),
        _ => {
            warn!("Ignoring ill-formed user directive {user:?}. Must be in format UID or UID:GID");
            (None, None)
        }
    }
}

fn container_security_context(service: &ServiceConfig) -> Option<SecurityContext> {
    let mut context = SecurityContext::default();
    if service.privileged {
        context.privileged = Some(true);
    }
    if let Some(user) = service.user.as_deref().filter(|u| !u.is_empty()) {
        let (uid, gid) = parse_user(user);
        context.run_as_user = uid;
        context.run_as_group = gid;
    }
    if !service.cap_add.is_empty() || !service.cap_drop.is_empty() {
        context.capabilities = Some(Capabilities {
            add: (!service.cap_add.is_empty()).then(|| service.cap_add.clone()),
            drop: (!service.cap_drop.is_empty()).then(|| service.cap_drop.clone()),
        });
    }
    if service.read_only {
        context.read_only_root_filesystem = Some(true);
    }

    (context != SecurityContext::default()).then_some(context)
}

fn pod_security_context(service: &ServiceConfig) -> Option<PodSecurityContext> {
    let mut context = PodSecurityContext::default();
    if !service.group_add.is_empty() {
        context.supplemental_groups = Some(service.group_add.clone());
    }
    if let Some(group) = service.fs_group.filter(|g| *g != 0) {
        context.fs_group = Some(group);
    }

    (context != PodSecurityContext::default()).then_some(context)
}

pub fn image_pull_policy(service: &str, policy: &str) -> TransformResult<Option<String>> {
    match policy {
        "" => Ok(None),
        "Always" | "Never" | "IfNotPresent" => Ok(Some(policy.to_string())),
        other => Err(TransformError::UnknownImagePullPolicy {
            service: service.to_string(),
            policy: other.to_string(),
        }),
    }
}

pub fn restart_policy(service: &str, restart: &str) -> TransformResult<String> {
    let policy = match restart {
        "" | "always" | "any" => "Always",
        "no" | "none" => "Never",
        "on-failure" => "OnFailure",
        other => {
            return Err(TransformError::UnknownRestartPolicy {
                service: service.to_string(),
                policy: other.to_string(),
            })
        }
    };
    Ok(policy.to_string())
}

/// Map a placement key onto a node label key.
fn placement_key(key: &str) -> Option<String> {
    match key {
        "node.hostname" => Some("kubernetes.io/hostname".to_string()),
        "node.role" => Some("node-role.kubernetes.io/role".to_string()),
        "engine.labels.operatingsystem" | "node.platform.os" => Some("kubernetes.io/os".to_string()),
        "node.platform.arch" => Some("kubernetes.io/arch".to_string()),
        other => other.strip_prefix("node.labels.").map(str::to_string),
    }
}

fn config_affinity(service: &ServiceConfig) -> Option<Affinity> {
    let mut positive = Vec::new();
    let mut negative = Vec::new();
    for constraint in &service.placement.constraints {
        let (key, value, operator, bucket) = if let Some((k, v)) = constraint.split_once("!=") {
            (k, v, "NotIn", &mut negative)
        } else if let Some((k, v)) = constraint.split_once("==") {
            (k, v, "In", &mut positive)
        } else {
            warn!("Ignoring placement constraint {constraint:?} for service {:?}", service.name);
            continue;
        };
        let Some(key) = placement_key(key.trim()) else {
            warn!("Ignoring unsupported placement constraint {constraint:?} for service {:?}", service.name);
            continue;
        };
        bucket.push(NodeSelectorRequirement {
            key,
            operator: operator.to_string(),
            values: Some(vec![value.trim().to_string()]),
        });
    }

    if positive.is_empty() && negative.is_empty() {
        return None;
    }
    positive.extend(negative);
    Some(Affinity {
        node_affinity: Some(NodeAffinity {
            required_during_scheduling_ignored_during_execution: Some(NodeSelector {
                node_selector_terms: vec![NodeSelectorTerm {
                    match_expressions: Some(positive),
                    ..Default::default()
                }],
            }),
            ..Default::default()
        }),
        ..Default::default()
    })
}

/// One constraint per `spread=<key>` preference, earlier preferences weighing more.
fn topology_spread_constraints(service: &ServiceConfig, workload: &str) -> Vec<TopologySpreadConstraint> {
    let keys: Vec<String> = service
        .placement
        .preferences
        .iter()
        .filter_map(|preference| {
            let key = preference.strip_prefix("spread=").and_then(|k| placement_key(k.trim()));
            if key.is_none() {
                warn!("Ignoring placement preference {preference:?} for service {:?}", service.name);
            }
            key
        })
        .collect();

    let count = keys.len() as i32;
    keys.into_iter()
        .enumerate()
        .map(|(i, topology_key)| TopologySpreadConstraint {
            max_skew: count - i as i32,
            topology_key,
            when_unsatisfiable: "ScheduleAnyway".to_string(),
            label_selector: Some(LabelSelector {
                match_labels: Some(config_labels(workload)),
                ..Default::default()
            }),
            ..Default::default()
        })
        .collect()
}

fn init_container(service: &ServiceConfig) -> Option<Container> {
    let image = service
        .labels
        .get(LABEL_INIT_CONTAINER_IMAGE)
        .filter(|i| !i.is_empty())?;
    let name = service
        .labels
        .get(LABEL_INIT_CONTAINER_NAME)
        .filter(|n| !n.is_empty())
        .map_or(DEFAULT_INIT_CONTAINER_NAME, String::as_str);
    let command = service
        .labels
        .get(LABEL_INIT_CONTAINER_COMMAND)
        .map(|line| parse_command(line))
        .unwrap_or_default();

    Some(Container {
        name: name.to_string(),
        image: Some(image.clone()),
        command: (!command.is_empty()).then_some(command),
        ..Default::default()
    })
}

/// `[a, "b", 'c']` becomes three arguments; anything without a comma is one.
pub fn parse_command(line: &str) -> Vec<String> {
    if line.is_empty() {
        return Vec::new();
    }
    if !line.contains(',') {
        return vec![line.to_string()];
    }
    line.trim_matches(|c| c == '[' || c == ']')
        .trim()
        .split(',')
        .map(|part| part.trim().trim_matches(|c| c == '"' || c == '\'' || c == ' ').to_string())
        .collect()
}
