//! Partitioning of services into shared workloads.

use std::collections::BTreeMap;

use forge_common::info;

use crate::{
    model::ServiceConfig,
    naming::{format_resource_name, LABEL_SERVICE_GROUP},
};

pub const GROUP_MODE_LABEL: &str = "label";
pub const GROUP_MODE_VOLUME: &str = "volume";

/// Services sharing one workload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceGroup {
    pub id: String,
    /// Name of the workload generated for the group.
    pub name: String,
    /// Members in service-name order.
    pub members: Vec<ServiceConfig>,
}

/// Group identifier of a service; empty means the service stays alone.
pub fn group_id(service: &ServiceConfig, mode: Option<&str>) -> String {
    match mode {
        Some(GROUP_MODE_LABEL) => service
            .labels
            .get(LABEL_SERVICE_GROUP)
            .cloned()
            .unwrap_or_default(),
        Some(GROUP_MODE_VOLUME) => service.volumes.iter().map(|v| v.mount_id()).collect(),
        _ => String::new(),
    }
}

/// Flag grouped services in place and collect them by group id.
pub fn group_services(
    services: &mut BTreeMap<String, ServiceConfig>,
    mode: Option<&str>,
) -> Vec<ServiceGroup> {
    let mut groups: BTreeMap<String, Vec<ServiceConfig>> = BTreeMap::new();
    for (name, service) in services.iter_mut() {
        let id = group_id(service, mode);
        if id.is_empty() {
            continue;
        }
        service.name = name.clone();
        service.in_group = true;
        groups.entry(id).or_default().push(service.clone());
    }

    groups
        .into_iter()
        .map(|(id, members)| {
            let name = if mode == Some(GROUP_MODE_VOLUME) {
                let first = members.first().map(|m| m.name.as_str()).unwrap_or(id.as_str());
                info!("Services grouped by volume are deployed as workload {first:?}");
                format_resource_name(first)
            } else {
                format_resource_name(&id)
            };
            ServiceGroup { id, name, members }
        })
        .collect()
}
