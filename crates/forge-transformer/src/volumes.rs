//! Declared volumes to pod volumes, mounts, claims and config maps.

use std::{
    collections::BTreeMap,
    fs, io,
    path::{Path, PathBuf},
};

use forge_common::{debug, warn};
use k8s_openapi::{
    api::core::v1::{
        ConfigMap, ConfigMapVolumeSource, EmptyDirVolumeSource, HostPathVolumeSource, KeyToPath,
        PersistentVolumeClaim, PersistentVolumeClaimSpec, PersistentVolumeClaimVolumeSource,
        Volume, VolumeMount, VolumeResourceRequirements,
    },
    apimachinery::pkg::{
        api::resource::Quantity,
        apis::meta::v1::{LabelSelector, ObjectMeta},
    },
};

use crate::{
    model::{ConfigContent, ConvertOptions, ServiceConfig, VolumeMode, VolumeSpec},
    naming::{config_labels, format_file_name, format_resource_name, LABEL_VOLUME_SELECTOR},
};

/// Everything a service's declared volumes turn into.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServiceVolumes {
    pub mounts: Vec<VolumeMount>,
    pub volumes: Vec<Volume>,
    pub claims: Vec<PersistentVolumeClaim>,
    pub config_maps: Vec<ConfigMap>,
}

/// Prefix of generated volume names: the service's own name, so members of
/// one group never share a volume name.
fn volume_prefix(workload: &str, service: &ServiceConfig) -> String {
    if service.name.is_empty() {
        format_resource_name(workload)
    } else {
        format_resource_name(&service.name)
    }
}

/// Translate the declared volumes of `service`, deployed as part of `workload`.
pub fn config_volumes(workload: &str, service: &ServiceConfig, opt: &ConvertOptions) -> ServiceVolumes {
    let mut out = ServiceVolumes::default();
    let prefix = volume_prefix(workload, service);
    let workload = format_resource_name(workload);

    for (i, declared) in service.volumes.iter().enumerate() {
        if declared.host.as_deref().is_some_and(|h| h.ends_with(".sock")) {
            warn!("Skip file in path {:?}", declared.host.as_deref().unwrap_or_default());
            continue;
        }

        let mode = if declared.config.is_some() && opt.volumes == VolumeMode::PersistentVolumeClaim {
            VolumeMode::ConfigMap
        } else {
            opt.volumes
        };
        let name = match declared.volume_name.as_deref().filter(|n| !n.is_empty()) {
            Some(name) => format_resource_name(name),
            None => format!("{prefix}-{}{i}", generated_suffix(mode)),
        };

        let mut mount = VolumeMount {
            name: name.clone(),
            mount_path: declared.container.clone(),
            read_only: declared.read_only().then_some(true),
            ..Default::default()
        };

        let volume = match mode {
            VolumeMode::EmptyDir => empty_dir_volume(&name, None),
            VolumeMode::HostPath => match declared.host.as_deref().filter(|h| !h.is_empty()) {
                Some(host) => Volume {
                    name: name.clone(),
                    host_path: Some(HostPathVolumeSource {
                        path: host.to_string(),
                        ..Default::default()
                    }),
                    ..Default::default()
                },
                None => {
                    warn!(
                        "Volume {:?} of service {:?} has no host path, using emptyDir",
                        declared.container, service.name
                    );
                    empty_dir_volume(&name, None)
                }
            },
            VolumeMode::ConfigMap => {
                debug!("Use configmap volume {name}");
                let content = declared.config.clone().unwrap_or_default();
                let config_map = config_map_from_content(&name, &workload, &content);
                let sub_path = single_file_key(&content).map(|key| (key, file_base_name(&declared.container)));
                if let Some((_, path)) = &sub_path {
                    mount.sub_path = Some(path.clone());
                }
                if declared.config.is_some() {
                    mount.read_only = Some(true);
                }
                out.config_maps.push(config_map);
                Volume {
                    name: name.clone(),
                    config_map: Some(ConfigMapVolumeSource {
                        name: name.clone().into(),
                        items: sub_path.map(|(key, path)| vec![KeyToPath { key, path, mode: None }]),
                        ..Default::default()
                    }),
                    ..Default::default()
                }
            }
            VolumeMode::PersistentVolumeClaim => {
                out.claims.push(create_claim(&name, declared, service, opt));
                Volume {
                    name: name.clone(),
                    persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                        claim_name: name.clone(),
                        read_only: declared.read_only().then_some(true),
                    }),
                    ..Default::default()
                }
            }
        };

        out.mounts.push(mount);
        out.volumes.push(volume);
    }
    out
}

fn generated_suffix(mode: VolumeMode) -> &'static str {
    match mode {
        VolumeMode::PersistentVolumeClaim => "claim",
        VolumeMode::EmptyDir => "empty",
        VolumeMode::HostPath => "hostpath",
        VolumeMode::ConfigMap => "cm",
    }
}

fn empty_dir_volume(name: &str, medium: Option<&str>) -> Volume {
    Volume {
        name: name.to_string(),
        empty_dir: Some(EmptyDirVolumeSource {
            medium: medium.map(str::to_string),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Memory-backed volumes for `tmpfs` entries, mounted at the path before the first `:`.
pub fn config_tmpfs(workload: &str, service: &ServiceConfig) -> (Vec<VolumeMount>, Vec<Volume>) {
    let prefix = volume_prefix(workload, service);
    service
        .tmpfs
        .iter()
        .enumerate()
        .map(|(i, entry)| {
            let name = format!("{prefix}-tmpfs{i}");
            let path = entry.split(':').next().unwrap_or_default();
            (
                VolumeMount {
                    name: name.clone(),
                    mount_path: path.to_string(),
                    ..Default::default()
                },
                empty_dir_volume(&name, Some("Memory")),
            )
        })
        .unzip()
}

/// `ro`/`rox` → ReadOnlyMany, `rwx` → ReadWriteMany, `rwop` → ReadWriteOncePod,
/// anything else → ReadWriteOnce.
pub fn access_mode(mode: Option<&str>) -> &'static str {
    match mode.unwrap_or_default() {
        "ro" | "rox" => "ReadOnlyMany",
        "rwx" => "ReadWriteMany",
        "rwop" => "ReadWriteOncePod",
        _ => "ReadWriteOnce",
    }
}

fn create_claim(
    name: &str,
    declared: &VolumeSpec,
    service: &ServiceConfig,
    opt: &ConvertOptions,
) -> PersistentVolumeClaim {
    let size = declared
        .pvc_size
        .as_deref()
        .filter(|s| !s.is_empty())
        .unwrap_or(&opt.pvc_request_size);
    debug!("Claim {name} for service {} requests {size}", service.name);

    PersistentVolumeClaim {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: Some(config_labels(name)),
            ..Default::default()
        },
        spec: Some(PersistentVolumeClaimSpec {
            access_modes: Some(vec![access_mode(declared.mode.as_deref()).to_string()]),
            resources: Some(VolumeResourceRequirements {
                requests: Some(BTreeMap::from([(
                    "storage".to_string(),
                    Quantity(size.to_string()),
                )])),
                ..Default::default()
            }),
            selector: declared
                .selector_value
                .as_ref()
                .filter(|v| !v.is_empty())
                .map(|value| LabelSelector {
                    match_labels: Some(BTreeMap::from([(
                        LABEL_VOLUME_SELECTOR.to_string(),
                        value.clone(),
                    )])),
                    ..Default::default()
                }),
            storage_class_name: declared.storage_class.clone().filter(|s| !s.is_empty()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn config_map_from_content(name: &str, workload: &str, content: &ConfigContent) -> ConfigMap {
    let data: BTreeMap<String, String> = content
        .files
        .iter()
        .map(|(file, body)| (format_file_name(file), body.clone()))
        .collect();
    ConfigMap {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: Some(config_labels(workload)),
            ..Default::default()
        },
        data: (!data.is_empty()).then_some(data),
        ..Default::default()
    }
}

/// Key of the only file when the content came from a single file.
fn single_file_key(content: &ConfigContent) -> Option<String> {
    if content.is_dir || content.files.len() != 1 {
        return None;
    }
    content.files.keys().next().map(|file| format_file_name(file))
}

fn file_base_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string())
}

/// What a volume's host path is, as far as config-map translation goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFileCheck {
    /// Drop the volume altogether.
    Skip,
    /// Not a config file; translate with the selected volume mode.
    NotConfig,
    /// Regular file or non-empty directory; translate to a read-only config map.
    ConfigMap,
}

pub fn detect_config_file(path: &Path) -> ConfigFileCheck {
    let raw = path.to_string_lossy();
    if raw.is_empty() || raw.ends_with(".sock") {
        return ConfigFileCheck::Skip;
    }

    let metadata = match fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(e) => {
            debug!("{} is not a config file: {e}", path.display());
            return ConfigFileCheck::NotConfig;
        }
    };
    if !metadata.is_dir() {
        return ConfigFileCheck::ConfigMap;
    }

    match holds_files(path) {
        Ok(true) => ConfigFileCheck::ConfigMap,
        Ok(false) => ConfigFileCheck::NotConfig,
        Err(e) => {
            warn!("Failed to check if the directory {} is empty: {e}", path.display());
            ConfigFileCheck::Skip
        }
    }
}

/// True when a regular file exists anywhere below `dir`.
fn holds_files(dir: &Path) -> io::Result<bool> {
    let mut pending: Vec<PathBuf> = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        for entry in fs::read_dir(&current)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                pending.push(entry.path());
            } else {
                return Ok(true);
            }
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(volumes: Vec<VolumeSpec>) -> ServiceConfig {
        ServiceConfig {
            name: "db".to_string(),
            volumes,
            ..Default::default()
        }
    }

    fn volume(host: Option<&str>, container: &str, mode: Option<&str>) -> VolumeSpec {
        VolumeSpec {
            host: host.map(str::to_string),
            container: container.to_string(),
            mode: mode.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn claims_by_default() {
        let svc = service(vec![
            volume(None, "/var/lib/db", None),
            VolumeSpec {
                volume_name: Some("shared_data".to_string()),
                pvc_size: Some("5Gi".to_string()),
                selector_value: Some("fast".to_string()),
                ..volume(None, "/shared", Some("rwx"))
            },
        ]);
        let out = config_volumes("db", &svc, &ConvertOptions::default());
        assert_eq!(out.claims.len(), 2);
        assert!(out.config_maps.is_empty());

        let first = &out.claims[0];
        assert_eq!(first.metadata.name.as_deref(), Some("db-claim0"));
        let spec = first.spec.as_ref().unwrap();
        assert_eq!(spec.access_modes, Some(vec!["ReadWriteOnce".to_string()]));
        assert_eq!(
            spec.resources.as_ref().unwrap().requests.as_ref().unwrap()["storage"],
            Quantity("100Mi".to_string())
        );

        let second = out.claims[1].spec.as_ref().unwrap();
        assert_eq!(out.claims[1].metadata.name.as_deref(), Some("shared-data"));
        assert_eq!(second.access_modes, Some(vec!["ReadWriteMany".to_string()]));
        assert_eq!(
            second.selector.as_ref().unwrap().match_labels.as_ref().unwrap()[LABEL_VOLUME_SELECTOR],
            "fast"
        );

        assert_eq!(out.mounts[1].mount_path, "/shared");
        assert_eq!(
            out.volumes[0].persistent_volume_claim.as_ref().unwrap().claim_name,
            "db-claim0"
        );
    }

    #[test]
    fn access_modes() {
        assert_eq!(access_mode(Some("ro")), "ReadOnlyMany");
        assert_eq!(access_mode(Some("rox")), "ReadOnlyMany");
        assert_eq!(access_mode(Some("rwop")), "ReadWriteOncePod");
        assert_eq!(access_mode(Some("rw")), "ReadWriteOnce");
        assert_eq!(access_mode(None), "ReadWriteOnce");
    }

    #[test]
    fn other_modes_emit_no_claims() {
        let svc = service(vec![volume(Some("/srv/data"), "/data", Some("ro")), volume(None, "/tmp/x", None)]);

        let opt = ConvertOptions {
            volumes: VolumeMode::EmptyDir,
            ..Default::default()
        };
        let out = config_volumes("db", &svc, &opt);
        assert!(out.claims.is_empty());
        assert_eq!(out.volumes[0].name, "db-empty0");
        assert!(out.volumes[0].empty_dir.is_some());
        assert_eq!(out.mounts[0].read_only, Some(true));

        let opt = ConvertOptions {
            volumes: VolumeMode::HostPath,
            ..Default::default()
        };
        let out = config_volumes("db", &svc, &opt);
        assert_eq!(out.volumes[0].host_path.as_ref().unwrap().path, "/srv/data");
        assert!(out.volumes[1].empty_dir.is_some());
    }

    #[test]
    fn detected_config_file_becomes_config_map() {
        let svc = service(vec![VolumeSpec {
            config: Some(ConfigContent {
                files: BTreeMap::from([("my_app.conf".to_string(), "key=value".to_string())]),
                is_dir: false,
            }),
            ..volume(Some("./my_app.conf"), "/etc/app/app.conf", None)
        }]);
        let out = config_volumes("db", &svc, &ConvertOptions::default());
        assert!(out.claims.is_empty());
        assert_eq!(out.config_maps.len(), 1);
        assert_eq!(out.config_maps[0].metadata.name.as_deref(), Some("db-cm0"));
        assert_eq!(out.config_maps[0].data.as_ref().unwrap()["my-app.conf"], "key=value");

        let mount = &out.mounts[0];
        assert_eq!(mount.sub_path.as_deref(), Some("app.conf"));
        assert_eq!(mount.read_only, Some(true));
        let items = out.volumes[0].config_map.as_ref().unwrap().items.clone().unwrap();
        assert_eq!(items[0].key, "my-app.conf");
        assert_eq!(items[0].path, "app.conf");
    }

    #[test]
    fn sockets_are_skipped() {
        let svc = service(vec![volume(Some("/var/run/docker.sock"), "/var/run/docker.sock", None)]);
        let out = config_volumes("db", &svc, &ConvertOptions::default());
        assert_eq!(out, ServiceVolumes::default());
    }

    #[test]
    fn tmpfs_volumes_use_memory() {
        let svc = ServiceConfig {
            name: "web".to_string(),
            tmpfs: vec!["/run:size=64k".to_string(), "/tmp".to_string()],
            ..Default::default()
        };
        let (mounts, volumes) = config_tmpfs("web", &svc);
        assert_eq!(mounts[0].mount_path, "/run");
        assert_eq!(volumes[1].name, "web-tmpfs1");
        assert_eq!(volumes[1].empty_dir.as_ref().unwrap().medium.as_deref(), Some("Memory"));
    }

    #[test]
    fn group_members_get_their_own_volume_names() {
        let member = |name: &str, container: &str| ServiceConfig {
            name: name.to_string(),
            volumes: vec![volume(None, container, None)],
            tmpfs: vec!["/run".to_string()],
            ..Default::default()
        };
        let api = config_volumes("backend", &member("api", "/api-data"), &ConvertOptions::default());
        let worker = config_volumes("backend", &member("worker", "/worker-data"), &ConvertOptions::default());

        assert_eq!(api.claims[0].metadata.name.as_deref(), Some("api-claim0"));
        assert_eq!(worker.claims[0].metadata.name.as_deref(), Some("worker-claim0"));
        assert_eq!(worker.mounts[0].name, "worker-claim0");
        assert_eq!(
            worker.volumes[0].persistent_volume_claim.as_ref().unwrap().claim_name,
            "worker-claim0"
        );

        let (_, api_tmpfs) = config_tmpfs("backend", &member("api", "/api-data"));
        let (_, worker_tmpfs) = config_tmpfs("backend", &member("worker", "/worker-data"));
        assert_eq!(api_tmpfs[0].name, "api-tmpfs0");
        assert_eq!(worker_tmpfs[0].name, "worker-tmpfs0");
    }

    #[test]
    fn config_file_detection() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(detect_config_file(Path::new("")), ConfigFileCheck::Skip);
        assert_eq!(detect_config_file(Path::new("/run/app.sock")), ConfigFileCheck::Skip);
        assert_eq!(
            detect_config_file(&dir.path().join("missing")),
            ConfigFileCheck::NotConfig
        );

        let nested = dir.path().join("empty/inner");
        fs::create_dir_all(&nested).unwrap();
        assert_eq!(detect_config_file(&dir.path().join("empty")), ConfigFileCheck::NotConfig);

        fs::write(nested.join("app.conf"), "x").unwrap();
        assert_eq!(detect_config_file(&dir.path().join("empty")), ConfigFileCheck::ConfigMap);
        assert_eq!(detect_config_file(&nested.join("app.conf")), ConfigFileCheck::ConfigMap);
    }
}
