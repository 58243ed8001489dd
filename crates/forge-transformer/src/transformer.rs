//! The conversion driver.
//!
//! Passes run in a fixed order: grouping, per-unit synthesis, network-mode
//! merge, then deduplication and the services-first sort.

use std::collections::BTreeMap;

use forge_common::{debug, info, warn};
use k8s_openapi::api::core::v1::PodTemplateSpec;

use crate::{
    controller::{choose_workload, init_workload, normalize_restart, update_controller, WorkloadKind},
    env::env_config_maps,
    error::TransformResult,
    grouping::group_services,
    hpa::{create_hpa, has_hpa_labels},
    model::{ConvertOptions, ServiceConfig, VolumeMode},
    naming::{config_labels_with_network, format_resource_name, LABEL_SERVICE_ACCOUNT_NAME},
    network::merge_network_modes,
    network_policy::network_policy,
    objects::K8sObject,
    podspec::{PodSpecBuilder, PodSpecOption, StepContext},
    postprocess::{recreate_strategy, remove_dup_objects, set_namespace, sort_services_first},
    service::config_services,
    volumes::{config_tmpfs, config_volumes},
};

/// Convert a service map into an ordered list of objects.
pub fn transform(
    mut services: BTreeMap<String, ServiceConfig>,
    opt: &ConvertOptions,
) -> TransformResult<Vec<K8sObject>> {
    for (name, service) in services.iter_mut() {
        service.name = name.clone();
    }

    let groups = group_services(&mut services, opt.service_group_mode.as_deref());
    let mut objects = Vec::new();

    for group in &groups {
        debug!("Converting group {} ({} services)", group.name, group.members.len());
        objects.extend(convert_unit(&group.name, &group.members, opt)?);
    }
    for service in services.values().filter(|s| !s.in_group) {
        let name = format_resource_name(&service.name);
        objects.extend(convert_unit(&name, std::slice::from_ref(service), opt)?);
    }

    merge_network_modes(&mut objects, &services)?;
    if let Some(namespace) = opt.namespace.as_deref().filter(|n| !n.is_empty()) {
        set_namespace(&mut objects, namespace);
    }
    remove_dup_objects(&mut objects);
    sort_services_first(&mut objects);

    info!("Generated {} objects from {} services", objects.len(), services.len());
    Ok(objects)
}

fn pod_options(
    service: &ServiceConfig,
    volumes: PodSpecOption,
    mounts: PodSpecOption,
    tmpfs: (PodSpecOption, PodSpecOption),
) -> Vec<PodSpecOption> {
    let mut options = vec![
        PodSpecOption::AddContainer,
        PodSpecOption::ResourcesLimits,
        PodSpecOption::ResourcesRequests,
        PodSpecOption::SecurityContext,
        PodSpecOption::Ports,
        PodSpecOption::ImagePullPolicy,
        PodSpecOption::RestartPolicy,
        PodSpecOption::HostName,
        PodSpecOption::DomainName,
        PodSpecOption::TerminationGracePeriodSeconds,
        PodSpecOption::Affinity,
        PodSpecOption::TopologySpreadConstraints,
        PodSpecOption::InitContainers,
        volumes,
        mounts,
        tmpfs.0,
        tmpfs.1,
    ];
    if let Some(account) = service
        .labels
        .get(LABEL_SERVICE_ACCOUNT_NAME)
        .filter(|a| !a.is_empty())
    {
        options.push(PodSpecOption::ServiceAccountName(account.clone()));
    }
    options
}

/// One workload and its siblings for a single service or a group.
fn convert_unit(
    name: &str,
    members: &[ServiceConfig],
    opt: &ConvertOptions,
) -> TransformResult<Vec<K8sObject>> {
    let Some(primary) = members.first() else {
        return Ok(Vec::new());
    };
    let kind = choose_workload(primary, opt);
    let embed_claims = kind == WorkloadKind::StatefulSet && opt.volumes != VolumeMode::ConfigMap;

    let mut builder = PodSpecBuilder::new();
    let mut siblings: Vec<K8sObject> = Vec::new();
    let mut claims = Vec::new();
    let mut networks: Vec<String> = Vec::new();
    let mut annotations = BTreeMap::new();
    let mut has_volumes = false;

    for member in members {
        let mut service = member.clone();
        normalize_restart(&mut service, kind);

        let declared = config_volumes(name, &service, opt);
        let (tmpfs_mounts, tmpfs_volumes) = config_tmpfs(name, &service);
        let pod_volumes: Vec<_> = if embed_claims {
            declared
                .volumes
                .into_iter()
                .filter(|v| v.persistent_volume_claim.is_none())
                .collect()
        } else {
            declared.volumes
        };

        let options = pod_options(
            &service,
            PodSpecOption::Volumes(pod_volumes),
            PodSpecOption::VolumeMounts(declared.mounts),
            (
                PodSpecOption::Volumes(tmpfs_volumes),
                PodSpecOption::VolumeMounts(tmpfs_mounts),
            ),
        );
        let ctx = StepContext::new(&service, opt, name);
        builder = builder
            .append(&ctx, &options)
            .map_err(|e| e.in_service(&service.name))?;

        siblings.extend(config_services(name, &service).into_iter().map(K8sObject::from));
        siblings.extend(env_config_maps(&service).into_iter().map(K8sObject::from));
        siblings.extend(declared.config_maps.into_iter().map(K8sObject::from));
        if embed_claims {
            claims.extend(declared.claims);
        } else {
            siblings.extend(declared.claims.into_iter().map(K8sObject::from));
        }
        if opt.generate_network_policies {
            siblings.extend(service.networks.iter().map(|n| K8sObject::from(network_policy(n))));
        }

        has_volumes |= !service.volumes.is_empty();
        for network in &service.networks {
            if !networks.contains(network) {
                networks.push(network.clone());
            }
        }
        annotations.extend(service.annotations.clone());
    }

    let autoscaled = members.iter().find(|s| has_hpa_labels(&s.labels));
    let mut replicas = primary.replicas;
    if autoscaled.is_some() {
        if kind.is_scalable() {
            replicas = Some(0);
        } else {
            warn!("Autoscaler labels on {name} are ignored: a {kind} cannot be autoscaled");
        }
    }

    let mut workload = init_workload(kind, name, primary, replicas, opt);
    let pod_spec = builder.build();
    let labels = config_labels_with_network(name, &networks, opt);
    update_controller(
        &mut workload,
        |template: &mut PodTemplateSpec| {
            template
                .metadata
                .get_or_insert_with(Default::default)
                .labels
                .get_or_insert_with(BTreeMap::new)
                .extend(labels);
            template.spec = Some(pod_spec);
            Ok(())
        },
        |meta| {
            if !annotations.is_empty() {
                meta.annotations = Some(annotations);
            }
        },
    )
    .map_err(|e| e.in_service(&primary.name))?;

    if has_volumes {
        recreate_strategy(&mut workload);
        if let K8sObject::StatefulSet(stateful) = &mut workload {
            if !claims.is_empty() {
                stateful.spec.get_or_insert_with(Default::default).volume_claim_templates = Some(claims);
            }
        }
    }

    if let Some(service) = autoscaled.filter(|_| kind.is_scalable()) {
        let hpa = create_hpa(name, workload.kind(), workload.api_version(), &service.labels);
        siblings.push(hpa.into());
    }

    let mut objects = Vec::with_capacity(siblings.len() + 1);
    objects.push(workload);
    objects.extend(siblings);
    Ok(objects)
}
