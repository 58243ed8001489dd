//! Reads the service model file and everything it points at.
//!
//! Env files and config-file volumes are resolved relative to the model file
//! and their contents are stored on the model, so the transformer never
//! touches the filesystem.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use forge_common::{debug, warn};
use forge_transformer::{
    model::{ConfigContent, EnvFile},
    naming::format_file_name,
    volumes::{detect_config_file, ConfigFileCheck},
    ServiceConfig,
};
use serde::Deserialize;

use crate::error::{ForgeCliError, ForgeCliResult};

#[derive(Debug, Default, Deserialize)]
struct ServiceModel {
    #[serde(default)]
    services: BTreeMap<String, ServiceConfig>,
}

pub fn load_services(path: &Path) -> ForgeCliResult<BTreeMap<String, ServiceConfig>> {
    let content = fs::read_to_string(path).map_err(|e| ForgeCliError::load(path, e))?;
    let model: ServiceModel =
        serde_yaml::from_str(&content).map_err(|e| ForgeCliError::load(path, e))?;

    let base = path.parent().unwrap_or_else(|| Path::new("."));
    let mut services = model.services;
    for (name, service) in services.iter_mut() {
        service.name = name.clone();
        load_env_files(base, &mut service.env_files)?;
        load_config_volumes(base, service)?;
    }
    Ok(services)
}

fn resolve(base: &Path, path: &str) -> PathBuf {
    let path = Path::new(path);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

/// Inline values win; otherwise the file is parsed with dotenv syntax.
fn load_env_files(base: &Path, env_files: &mut [EnvFile]) -> ForgeCliResult {
    for env_file in env_files.iter_mut().filter(|f| f.values.is_empty()) {
        env_file.values = read_env_file(&resolve(base, &env_file.path))?;
    }
    Ok(())
}

#[allow(deprecated)]
pub fn read_env_file(path: &Path) -> ForgeCliResult<BTreeMap<String, String>> {
    let entries = dotenv::from_path_iter(path).map_err(|e| ForgeCliError::load(path, e))?;
    entries
        .map(|entry| entry.map_err(|e| ForgeCliError::load(path, e)))
        .collect()
}

fn load_config_volumes(base: &Path, service: &mut ServiceConfig) -> ForgeCliResult {
    let mut volumes = Vec::with_capacity(service.volumes.len());
    for mut volume in std::mem::take(&mut service.volumes) {
        let Some(host) = volume.host.as_deref().filter(|h| !h.is_empty()) else {
            volumes.push(volume);
            continue;
        };
        let path = resolve(base, host);
        match detect_config_file(&path) {
            ConfigFileCheck::Skip => {
                warn!("Skip volume {:?} of service {:?}", host, service.name);
                continue;
            }
            ConfigFileCheck::NotConfig => {}
            ConfigFileCheck::ConfigMap if volume.config.is_none() => {
                debug!("Reading config volume {}", path.display());
                volume.config = Some(read_config(&path)?);
            }
            ConfigFileCheck::ConfigMap => {}
        }
        volumes.push(volume);
    }
    service.volumes = volumes;
    Ok(())
}

/// Contents of a config file, or of the regular files directly inside a directory.
pub fn read_config(path: &Path) -> ForgeCliResult<ConfigContent> {
    let read = |file: &Path| fs::read_to_string(file).map_err(|e| ForgeCliError::load(file, e));

    if !path.is_dir() {
        let key = format_file_name(&path.to_string_lossy());
        return Ok(ConfigContent {
            files: BTreeMap::from([(key, read(path)?)]),
            is_dir: false,
        });
    }

    let mut files = BTreeMap::new();
    for entry in fs::read_dir(path).map_err(|e| ForgeCliError::load(path, e))? {
        let entry = entry.map_err(|e| ForgeCliError::load(path, e))?;
        let file = entry.path();
        if file.is_file() {
            files.insert(entry.file_name().to_string_lossy().into_owned(), read(&file)?);
        }
    }
    Ok(ConfigContent { files, is_dir: true })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn reads_env_files_next_to_the_model() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "web.env", "# comment\nMODE=prod\nTOKEN=\"abc def\"\n");
        let model = write(
            dir.path(),
            "services.yaml",
            r"
services:
  web:
    image: nginx
    env_files:
      - path: ./web.env
      - path: ./inline.env
        values: { A: b }
",
        );

        let services = load_services(&model).unwrap();
        let web = &services["web"];
        assert_eq!(web.name, "web");
        assert_eq!(web.env_files[0].values["MODE"], "prod");
        assert_eq!(web.env_files[0].values["TOKEN"], "abc def");
        assert_eq!(web.env_files[1].values["A"], "b");
    }

    #[test]
    fn missing_env_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let model = write(
            dir.path(),
            "services.yaml",
            "services:\n  web:\n    env_files:\n      - path: missing.env\n",
        );
        assert!(matches!(
            load_services(&model),
            Err(ForgeCliError::Load { path, .. }) if path.ends_with("missing.env")
        ));
    }

    #[test]
    fn detects_config_volumes() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "conf/nginx_main.conf", "worker_processes 1;");
        write(dir.path(), "site/index.html", "<h1>hi</h1>");
        write(dir.path(), "site/css/main.css", "body {}");
        fs::create_dir_all(dir.path().join("data")).unwrap();
        let model = write(
            dir.path(),
            "services.yaml",
            r"
services:
  web:
    volumes:
      - host: ./conf/nginx_main.conf
        container: /etc/nginx/nginx.conf
      - host: ./site
        container: /usr/share/nginx/html
      - host: ./data
        container: /data
      - host: /var/run/docker.sock
        container: /var/run/docker.sock
      - volume_name: cache
        container: /cache
",
        );

        let services = load_services(&model).unwrap();
        let volumes = &services["web"].volumes;
        assert_eq!(volumes.len(), 4);

        let file = volumes[0].config.as_ref().unwrap();
        assert!(!file.is_dir);
        assert_eq!(file.files["nginx-main.conf"], "worker_processes 1;");

        let site = volumes[1].config.as_ref().unwrap();
        assert!(site.is_dir);
        assert_eq!(site.files.keys().collect::<Vec<_>>(), vec!["index.html"]);

        assert!(volumes[2].config.is_none());
        assert!(volumes[3].config.is_none());
    }

    #[test]
    fn rejects_malformed_models() {
        let dir = tempfile::tempdir().unwrap();
        let model = write(dir.path(), "services.yaml", "services: [web]\n");
        assert!(matches!(load_services(&model), Err(ForgeCliError::Load { .. })));
    }
}
