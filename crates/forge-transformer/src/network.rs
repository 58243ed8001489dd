//! Folding services that join another service's network namespace into the
//! target's workload.

use std::collections::BTreeMap;

use forge_common::{debug, warn};
use k8s_openapi::api::core::v1::{Container, PodSpec, Volume};

use crate::{
    error::{TransformError, TransformResult},
    model::ServiceConfig,
    naming::format_resource_name,
    objects::{K8sObject, ObjectKey},
    podspec::union_volumes,
};

const NETWORK_MODE_SERVICE: &str = "service:";

/// One service whose containers move into another service's workload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentMapping {
    pub source: String,
    pub target: String,
}

/// Services whose network mode reads `service:<target>` (or `join-service:<target>`).
pub fn network_mode_mappings(services: &BTreeMap<String, ServiceConfig>) -> Vec<DeploymentMapping> {
    services
        .iter()
        .filter(|(_, service)| service.network_mode.contains(NETWORK_MODE_SERVICE))
        .filter_map(|(name, service)| {
            let target = service.network_mode.split(':').nth(1)?.trim();
            (!target.is_empty()).then(|| DeploymentMapping {
                source: format_resource_name(name),
                target: format_resource_name(target),
            })
        })
        .collect()
}

fn find_workload<'a>(objects: &'a [K8sObject], name: &str) -> Option<&'a K8sObject> {
    objects.iter().find(|o| o.is_workload() && o.name() == name)
}

fn unsupported(source: &K8sObject, target: &K8sObject) -> TransformError {
    TransformError::UnsupportedMerge {
        source_name: source.name(),
        source_kind: source.kind().to_string(),
        target_name: target.name(),
        target_kind: target.kind().to_string(),
    }
}

fn unsupported_join(objects: &[K8sObject], source: &str, target: &str) -> TransformError {
    let kind = |name: &str| {
        find_workload(objects, name)
            .map_or("Deployment", K8sObject::kind)
            .to_string()
    };
    TransformError::UnsupportedMerge {
        source_name: source.to_string(),
        source_kind: kind(source),
        target_name: target.to_string(),
        target_kind: kind(target),
    }
}

fn pod_spec(object: &K8sObject) -> Option<&PodSpec> {
    match object {
        K8sObject::Deployment(d) => d.spec.as_ref().and_then(|s| s.template.spec.as_ref()),
        _ => None,
    }
}

/// Point every mapping at the workload that survives the merge, following
/// joins of joins. Self joins and join cycles are rejected.
fn resolve_targets(
    objects: &[K8sObject],
    mappings: &[DeploymentMapping],
) -> TransformResult<Vec<DeploymentMapping>> {
    let joins: BTreeMap<&str, &str> = mappings
        .iter()
        .map(|m| (m.source.as_str(), m.target.as_str()))
        .collect();

    mappings
        .iter()
        .map(|mapping| {
            let mut visited = vec![mapping.source.as_str()];
            let mut target = mapping.target.as_str();
            while let Some(&next) = joins.get(target) {
                if visited.contains(&target) {
                    break;
                }
                visited.push(target);
                target = next;
            }
            if visited.contains(&target) {
                return Err(unsupported_join(objects, &mapping.source, target));
            }
            Ok(DeploymentMapping {
                source: mapping.source.clone(),
                target: target.to_string(),
            })
        })
        .collect()
}

/// Move each mapping's source containers into its final target deployment
/// and remove the source deployments by identity key.
pub fn merge_network_modes(
    objects: &mut Vec<K8sObject>,
    services: &BTreeMap<String, ServiceConfig>,
) -> TransformResult {
    let mappings = network_mode_mappings(services);
    if mappings.is_empty() {
        return Ok(());
    }
    let mappings = resolve_targets(objects, &mappings)?;

    let mut removed: Vec<ObjectKey> = Vec::new();
    for mapping in &mappings {
        let Some(source) = find_workload(objects, &mapping.source) else {
            warn!(
                "Service {} joins the network of {}, but has no workload of its own",
                mapping.source, mapping.target
            );
            continue;
        };
        let Some(target) = find_workload(objects, &mapping.target) else {
            return Err(TransformError::MergeTargetMissing {
                source_name: mapping.source.clone(),
                target_name: mapping.target.clone(),
            });
        };
        if !matches!(source, K8sObject::Deployment(_)) || !matches!(target, K8sObject::Deployment(_)) {
            return Err(unsupported(source, target));
        }

        let (containers, volumes): (Vec<Container>, Vec<Volume>) = match pod_spec(source) {
            Some(spec) => (spec.containers.clone(), spec.volumes.clone().unwrap_or_default()),
            None => Default::default(),
        };
        let source_key = source.key();

        let Some(K8sObject::Deployment(target)) = objects
            .iter_mut()
            .find(|o| matches!(o, K8sObject::Deployment(_)) && o.name() == mapping.target)
        else {
            continue;
        };
        let spec = target
            .spec
            .get_or_insert_with(Default::default)
            .template
            .spec
            .get_or_insert_with(PodSpec::default);
        debug!(
            "Moving {} container(s) of {} into {}",
            containers.len(),
            mapping.source,
            mapping.target
        );
        spec.containers.extend(containers);
        if !volumes.is_empty() {
            union_volumes(spec.volumes.get_or_insert_with(Vec::new), &volumes);
        }
        removed.push(source_key);
    }

    objects.retain(|object| !removed.contains(&object.key()));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::{
        api::{
            apps::v1::{Deployment, DeploymentSpec, StatefulSet},
            core::v1::{EmptyDirVolumeSource, PodTemplateSpec},
        },
        apimachinery::pkg::apis::meta::v1::ObjectMeta,
    };

    fn service(name: &str, network_mode: &str) -> (String, ServiceConfig) {
        (
            name.to_string(),
            ServiceConfig {
                name: name.to_string(),
                network_mode: network_mode.to_string(),
                ..Default::default()
            },
        )
    }

    fn deployment(name: &str, containers: &[&str], volume: Option<&str>) -> K8sObject {
        Deployment {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            spec: Some(DeploymentSpec {
                template: PodTemplateSpec {
                    spec: Some(PodSpec {
                        containers: containers
                            .iter()
                            .map(|c| Container {
                                name: c.to_string(),
                                ..Default::default()
                            })
                            .collect(),
                        volumes: volume.map(|v| {
                            vec![Volume {
                                name: v.to_string(),
                                empty_dir: Some(EmptyDirVolumeSource::default()),
                                ..Default::default()
                            }]
                        }),
                        ..Default::default()
                    }),
                    ..Default::default()
                },
                ..Default::default()
            }),
            ..Default::default()
        }
        .into()
    }

    fn container_names(object: &K8sObject) -> Vec<String> {
        pod_spec(object)
            .unwrap()
            .containers
            .iter()
            .map(|c| c.name.clone())
            .collect()
    }

    #[test]
    fn mappings_from_network_modes() {
        let services = BTreeMap::from([
            service("cache", "join-service:web"),
            service("sidecar", "service:Web_App"),
            service("web", "bridge"),
            service("broken", "service:"),
        ]);
        assert_eq!(
            network_mode_mappings(&services),
            vec![
                DeploymentMapping {
                    source: "cache".to_string(),
                    target: "web".to_string()
                },
                DeploymentMapping {
                    source: "sidecar".to_string(),
                    target: "web-app".to_string()
                },
            ]
        );
    }

    #[test]
    fn merges_containers_into_target() {
        let services = BTreeMap::from([service("web", ""), service("cache", "join-service:web")]);
        let mut objects = vec![
            deployment("cache", &["cache"], Some("cache-tmpfs0")),
            deployment("web", &["web"], None),
        ];
        merge_network_modes(&mut objects, &services).unwrap();

        assert_eq!(objects.len(), 1);
        assert_eq!(objects[0].name(), "web");
        assert_eq!(container_names(&objects[0]), vec!["web", "cache"]);
        let volumes = pod_spec(&objects[0]).unwrap().volumes.clone().unwrap();
        assert_eq!(volumes[0].name, "cache-tmpfs0");
    }

    #[test]
    fn missing_target_is_an_error() {
        let services = BTreeMap::from([service("cache", "service:web")]);
        let mut objects = vec![deployment("cache", &["cache"], None)];
        assert!(matches!(
            merge_network_modes(&mut objects, &services),
            Err(TransformError::MergeTargetMissing { .. })
        ));
    }

    #[test]
    fn other_variants_are_rejected() {
        let services = BTreeMap::from([service("cache", "service:web")]);
        let web: K8sObject = StatefulSet {
            metadata: ObjectMeta {
                name: Some("web".to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
        .into();
        let mut objects = vec![deployment("cache", &["cache"], None), web];
        assert!(matches!(
            merge_network_modes(&mut objects, &services),
            Err(TransformError::UnsupportedMerge { target_kind, .. }) if target_kind == "StatefulSet"
        ));
    }

    #[test]
    fn missing_source_is_skipped() {
        let services = BTreeMap::from([service("web", ""), service("cache", "service:web")]);
        let mut objects = vec![deployment("web", &["web"], None)];
        merge_network_modes(&mut objects, &services).unwrap();
        assert_eq!(container_names(&objects[0]), vec!["web"]);
    }

    #[test]
    fn chained_joins_land_in_the_last_target() {
        let services = BTreeMap::from([
            service("a", "service:b"),
            service("b", ""),
            service("z", "service:a"),
        ]);
        let mut objects = vec![
            deployment("a", &["a"], None),
            deployment("b", &["b"], Some("b-tmpfs0")),
            deployment("z", &["z"], Some("z-tmpfs0")),
        ];
        merge_network_modes(&mut objects, &services).unwrap();

        assert_eq!(objects.len(), 1);
        assert_eq!(objects[0].name(), "b");
        assert_eq!(container_names(&objects[0]), vec!["b", "a", "z"]);
        let volumes: Vec<_> = pod_spec(&objects[0])
            .unwrap()
            .volumes
            .iter()
            .flatten()
            .map(|v| v.name.clone())
            .collect();
        assert_eq!(volumes, vec!["b-tmpfs0", "z-tmpfs0"]);
    }

    #[test]
    fn self_join_is_rejected() {
        let services = BTreeMap::from([service("web", "service:web")]);
        let mut objects = vec![deployment("web", &["web"], None)];
        assert!(matches!(
            merge_network_modes(&mut objects, &services),
            Err(TransformError::UnsupportedMerge { source_name, target_name, .. })
                if source_name == "web" && target_name == "web"
        ));
        assert_eq!(container_names(&objects[0]), vec!["web"]);
    }

    #[test]
    fn join_cycles_are_rejected() {
        let services = BTreeMap::from([
            service("a", "service:b"),
            service("b", "service:c"),
            service("c", "service:a"),
        ]);
        let mut objects = vec![
            deployment("a", &["a"], None),
            deployment("b", &["b"], None),
            deployment("c", &["c"], None),
        ];
        assert!(matches!(
            merge_network_modes(&mut objects, &services),
            Err(TransformError::UnsupportedMerge { .. })
        ));
        assert_eq!(objects.len(), 3);
    }
}
