//! Network-facing `Service` objects.

use std::collections::HashSet;

use forge_common::warn;
use k8s_openapi::{
    api::core::v1::{Service, ServicePort, ServiceSpec},
    apimachinery::pkg::{apis::meta::v1::ObjectMeta, util::intstr::IntOrString},
};

use crate::{
    model::ServiceConfig,
    naming::{config_labels, format_resource_name},
};

/// Placeholder port of headless services; a service without ports is rejected.
pub const HEADLESS_PORT: i32 = 55555;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceType {
    ClusterIp,
    NodePort,
    LoadBalancer,
    Headless,
}

impl ServiceType {
    pub fn of(service: &ServiceConfig) -> Self {
        match service.service_type.to_lowercase().as_str() {
            "" | "clusterip" => ServiceType::ClusterIp,
            "nodeport" => ServiceType::NodePort,
            "loadbalancer" => ServiceType::LoadBalancer,
            "headless" => ServiceType::Headless,
            other => {
                warn!(
                    "Unknown service type {other:?} for service {:?}, using ClusterIP",
                    service.name
                );
                ServiceType::ClusterIp
            }
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            ServiceType::ClusterIp | ServiceType::Headless => "ClusterIP",
            ServiceType::NodePort => "NodePort",
            ServiceType::LoadBalancer => "LoadBalancer",
        }
    }
}

/// Services exposing `service`, selecting the pods of `workload`.
///
/// Load balancers are split per protocol; a headless service without ports
/// gets a placeholder port; any other service without ports gets nothing.
pub fn config_services(workload: &str, service: &ServiceConfig) -> Vec<Service> {
    let name = format_resource_name(&service.name);
    let kind = ServiceType::of(service);

    if service.ports.is_empty() {
        if kind != ServiceType::Headless {
            return Vec::new();
        }
        let mut svc = init_service(&name, workload, service);
        let spec = svc.spec.get_or_insert_with(ServiceSpec::default);
        spec.ports = Some(vec![ServicePort {
            name: Some("headless".to_string()),
            port: HEADLESS_PORT,
            ..Default::default()
        }]);
        spec.cluster_ip = Some("None".to_string());
        return vec![svc];
    }

    let ports = config_service_ports(service);
    if kind == ServiceType::LoadBalancer {
        let (tcp, udp): (Vec<ServicePort>, Vec<ServicePort>) = ports
            .into_iter()
            .partition(|p| p.protocol.as_deref().unwrap_or("TCP") != "UDP");
        return [("tcp", tcp), ("udp", udp)]
            .into_iter()
            .filter(|(_, ports)| !ports.is_empty())
            .map(|(suffix, ports)| {
                let mut svc = init_service(&format!("{name}-{suffix}"), workload, service);
                let spec = svc.spec.get_or_insert_with(ServiceSpec::default);
                spec.ports = Some(ports);
                spec.type_ = Some(kind.as_str().to_string());
                svc
            })
            .collect();
    }

    let mut svc = init_service(&name, workload, service);
    let spec = svc.spec.get_or_insert_with(ServiceSpec::default);
    spec.ports = Some(ports);
    spec.type_ = Some(kind.as_str().to_string());
    if kind == ServiceType::Headless {
        spec.cluster_ip = Some("None".to_string());
    }
    vec![svc]
}

fn init_service(name: &str, workload: &str, service: &ServiceConfig) -> Service {
    Service {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: Some(config_labels(name)),
            annotations: (!service.annotations.is_empty()).then(|| service.annotations.clone()),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            selector: Some(config_labels(&format_resource_name(workload))),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Service ports named after the exposed port, `-udp` suffixed for UDP.
pub fn config_service_ports(service: &ServiceConfig) -> Vec<ServicePort> {
    let mut seen = HashSet::new();
    let mut ports = Vec::new();
    for declared in &service.ports {
        let port = declared
            .host_port
            .filter(|p| *p != 0)
            .unwrap_or(declared.container_port);
        let protocol = declared.protocol();
        if !seen.insert((port, protocol.clone())) {
            continue;
        }

        let name = if protocol == "UDP" {
            format!("{port}-udp")
        } else {
            port.to_string()
        };
        ports.push(ServicePort {
            name: Some(name),
            port,
            target_port: Some(IntOrString::Int(declared.container_port)),
            protocol: (protocol != "TCP").then_some(protocol),
            ..Default::default()
        });
    }
    ports
}
