//! List-level passes over the generated objects.

use std::collections::HashSet;

use forge_common::debug;
use k8s_openapi::api::apps::v1::DeploymentStrategy;

use crate::objects::K8sObject;

/// Stable partition: services first, everything else after, relative order kept.
pub fn sort_services_first(objects: &mut Vec<K8sObject>) {
    let (services, others): (Vec<_>, Vec<_>) = objects.drain(..).partition(K8sObject::is_service);
    objects.extend(services);
    objects.extend(others);
}

/// Drop later objects sharing a (kind, namespace, name) identity with an earlier one.
pub fn remove_dup_objects(objects: &mut Vec<K8sObject>) {
    let mut seen = HashSet::new();
    objects.retain(|object| {
        let key = object.key();
        if seen.contains(&key) {
            debug!("Remove duplicate resource: {}/{}", key.kind, key.name);
            false
        } else {
            seen.insert(key);
            true
        }
    });
}

/// Set the namespace of every object.
pub fn set_namespace(objects: &mut [K8sObject], namespace: &str) {
    for object in objects {
        object.metadata_mut().namespace = Some(namespace.to_string());
    }
}

/// Volumes cannot be shared across an overlapping rolling update, so
/// deployments and deployment configs owning volumes are recreated instead.
pub fn recreate_strategy(object: &mut K8sObject) {
    match object {
        K8sObject::Deployment(deployment) => {
            deployment.spec.get_or_insert_with(Default::default).strategy = Some(DeploymentStrategy {
                type_: Some("Recreate".to_string()),
                rolling_update: None,
            });
        }
        K8sObject::DeploymentConfig(config) => {
            config.spec.strategy.type_ = "Recreate".to_string();
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::DeploymentConfig;
    use k8s_openapi::{
        api::{
            apps::v1::Deployment,
            core::v1::{ConfigMap, Service},
        },
        apimachinery::pkg::apis::meta::v1::ObjectMeta,
    };

    fn meta(name: &str) -> ObjectMeta {
        ObjectMeta {
            name: Some(name.to_string()),
            ..Default::default()
        }
    }

    fn service(name: &str) -> K8sObject {
        Service {
            metadata: meta(name),
            ..Default::default()
        }
        .into()
    }

    fn config_map(name: &str, data: &str) -> K8sObject {
        ConfigMap {
            metadata: meta(name),
            data: Some([("k".to_string(), data.to_string())].into()),
            ..Default::default()
        }
        .into()
    }

    fn deployment(name: &str) -> K8sObject {
        Deployment {
            metadata: meta(name),
            ..Default::default()
        }
        .into()
    }

    fn names(objects: &[K8sObject]) -> Vec<String> {
        objects.iter().map(|o| format!("{}/{}", o.kind(), o.name())).collect()
    }

    #[test]
    fn services_come_first_in_stable_order() {
        let mut objects = vec![
            deployment("web"),
            service("web"),
            config_map("env", "a"),
            service("db"),
            deployment("db"),
        ];
        sort_services_first(&mut objects);
        assert_eq!(
            names(&objects),
            vec!["Service/web", "Service/db", "Deployment/web", "ConfigMap/env", "Deployment/db"]
        );

        let once = objects.clone();
        sort_services_first(&mut objects);
        assert_eq!(objects, once);
    }

    #[test]
    fn first_duplicate_wins() {
        let mut objects = vec![
            config_map("env", "first"),
            deployment("env"),
            config_map("env", "second"),
            service("web"),
        ];
        remove_dup_objects(&mut objects);
        assert_eq!(names(&objects), vec!["ConfigMap/env", "Deployment/env", "Service/web"]);
        let K8sObject::ConfigMap(kept) = &objects[0] else {
            panic!("expected a config map");
        };
        assert_eq!(kept.data.as_ref().unwrap()["k"], "first");

        let once = objects.clone();
        remove_dup_objects(&mut objects);
        assert_eq!(objects, once);
    }

    #[test]
    fn namespaces_separate_identities() {
        let mut objects = vec![config_map("env", "a"), config_map("env", "b")];
        objects[1].metadata_mut().namespace = Some("other".to_string());
        remove_dup_objects(&mut objects);
        assert_eq!(objects.len(), 2);

        set_namespace(&mut objects, "apps");
        remove_dup_objects(&mut objects);
        assert_eq!(objects.len(), 1);
    }

    #[test]
    fn recreate_only_for_deployments() {
        let mut objects = vec![
            deployment("web"),
            K8sObject::from(DeploymentConfig {
                metadata: meta("web"),
                ..Default::default()
            }),
            config_map("env", "a"),
        ];
        let before = objects[2].clone();
        for object in &mut objects {
            recreate_strategy(object);
        }

        let K8sObject::Deployment(deployment) = &objects[0] else {
            panic!("expected a deployment");
        };
        let strategy = deployment.spec.as_ref().unwrap().strategy.as_ref().unwrap();
        assert_eq!(strategy.type_.as_deref(), Some("Recreate"));
        let K8sObject::DeploymentConfig(config) = &objects[1] else {
            panic!("expected a deployment config");
        };
        assert_eq!(config.spec.strategy.type_, "Recreate");
        assert_eq!(objects[2], before);
    }
}
