use std::{env, path::PathBuf, sync::OnceLock};

use anyhow::Context;
use config::File;
use log::LevelFilter;
use serde::{Deserialize, Serialize};
use std::fs::canonicalize;

pub static CONFIG_INSTANCE: OnceLock<Settings> = OnceLock::new();

use crate::error::{ForgeError, ForgeResult};

/// Defaults for `kf convert`; every field can be overridden on the command line.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ConvertSettings {
    #[serde(default)]
    pub controller: Option<String>,

    #[serde(default = "default_provider")]
    pub provider: String,

    #[serde(default)]
    pub service_group_mode: Option<String>,

    #[serde(default = "default_volumes")]
    pub volumes: String,

    #[serde(default)]
    pub generate_network_policies: bool,

    #[serde(default = "default_pvc_request_size")]
    pub pvc_request_size: String,

    #[serde(default)]
    pub namespace: Option<String>,

    #[serde(default)]
    pub json: bool,
}

impl Default for ConvertSettings {
    fn default() -> Self {
        Self {
            controller: None,
            provider: default_provider(),
            service_group_mode: None,
            volumes: default_volumes(),
            generate_network_policies: false,
            pvc_request_size: default_pvc_request_size(),
            namespace: None,
            json: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct Settings {
    #[serde(default = "default_log_level")]
    pub log_level: LevelFilter,

    #[serde(default = "ConvertSettings::default")]
    pub convert: ConvertSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            convert: ConvertSettings::default(),
        }
    }
}

pub fn get_config() -> ForgeResult<&'static Settings> {
    CONFIG_INSTANCE
        .get()
        .ok_or_else(|| ForgeError::Cli("Config not initialized".to_string()))
}

impl Settings {
    pub fn from_root(root: Option<PathBuf>) -> ForgeResult<Self> {
        let curr_dir = std::env::current_dir().context("unable to get working directory")?;
        let root = root.unwrap_or(curr_dir);
        let root = canonicalize(root).context("unable to canonicalize root directory")?;

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let mut s = config::Config::builder();
        if root.is_file() {
            s = s.add_source(File::from(root.as_path()));
        }
        let s = s
            .add_source(File::with_name("config").required(false))
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config.{}", run_mode)).required(false))
            .add_source(File::with_name(&root.join("config").to_string_lossy()).required(false))
            .build()?;

        let cfg = s.try_deserialize()?;
        Ok(cfg)
    }
}

fn default_log_level() -> LevelFilter {
    LevelFilter::Info
}

fn default_provider() -> String {
    "kubernetes".to_string()
}

fn default_volumes() -> String {
    "persistentVolumeClaim".to_string()
}

fn default_pvc_request_size() -> String {
    "100Mi".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default() {
        let settings = Settings::default();
        assert_eq!(settings.log_level, LevelFilter::Info);
        assert_eq!(settings.convert.volumes, "persistentVolumeClaim");
        assert_eq!(settings.convert.pvc_request_size, "100Mi");
    }

    #[test]
    fn loads_settings_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kubeforge.yaml");
        std::fs::write(
            &path,
            "log_level: debug\nconvert:\n  controller: statefulset\n  generate_network_policies: true\n",
        )
        .unwrap();

        let settings = Settings::from_root(Some(path)).unwrap();
        assert_eq!(settings.log_level, LevelFilter::Debug);
        assert_eq!(settings.convert.controller.as_deref(), Some("statefulset"));
        assert!(settings.convert.generate_network_policies);
        assert_eq!(settings.convert.provider, "kubernetes");
    }
}
