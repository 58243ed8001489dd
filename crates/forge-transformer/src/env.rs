use std::collections::BTreeMap;

use k8s_openapi::{
    api::core::v1::{
        ConfigMap, ConfigMapEnvSource, ConfigMapKeySelector, EnvFromSource, EnvVar, EnvVarSource,
    },
    apimachinery::pkg::apis::meta::v1::ObjectMeta,
};

use crate::{
    model::ServiceConfig,
    naming::{config_labels, format_env_name},
};

/// Environment of a service's container.
///
/// Env-file keys are referenced from the env file's config map, later files
/// win over earlier ones and literal values win over both.
pub fn config_envs(service: &ServiceConfig) -> (Vec<EnvVar>, Vec<EnvFromSource>) {
    let mut from_files: BTreeMap<&str, String> = BTreeMap::new();
    for file in &service.env_files {
        let config_map = format_env_name(&file.path, &service.name);
        for key in file.values.keys() {
            from_files.insert(key, config_map.clone());
        }
    }

    let mut envs: Vec<EnvVar> = from_files
        .into_iter()
        .filter(|(key, _)| !service.environment.contains_key(*key))
        .map(|(key, config_map)| EnvVar {
            name: key.to_string(),
            value_from: Some(EnvVarSource {
                config_map_key_ref: Some(ConfigMapKeySelector {
                    key: key.to_string(),
                    name: config_map.into(),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        })
        .collect();

    envs.extend(service.environment.iter().map(|(name, value)| EnvVar {
        name: name.clone(),
        value: Some(value.clone()),
        ..Default::default()
    }));
    envs.sort_by(|a, b| a.name.cmp(&b.name));

    let env_from = service
        .env_from
        .iter()
        .map(|name| EnvFromSource {
            config_map_ref: Some(ConfigMapEnvSource {
                name: name.clone().into(),
                ..Default::default()
            }),
            ..Default::default()
        })
        .collect();

    (envs, env_from)
}

/// One config map per env file. Two services sharing an env file produce the
/// same config map twice; dedup collapses them.
pub fn env_config_maps(service: &ServiceConfig) -> Vec<ConfigMap> {
    service
        .env_files
        .iter()
        .map(|file| ConfigMap {
            metadata: ObjectMeta {
                name: Some(format_env_name(&file.path, &service.name)),
                labels: Some(config_labels(&service.name)),
                ..Default::default()
            },
            data: Some(file.values.clone()),
            ..Default::default()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EnvFile;

    fn service() -> ServiceConfig {
        ServiceConfig {
            name: "web".to_string(),
            environment: BTreeMap::from([
                ("MODE".to_string(), "prod".to_string()),
                ("PORT".to_string(), "8080".to_string()),
            ]),
            env_files: vec![
                EnvFile {
                    path: "./common.env".to_string(),
                    values: BTreeMap::from([
                        ("DB_HOST".to_string(), "db".to_string()),
                        ("MODE".to_string(), "dev".to_string()),
                    ]),
                },
                EnvFile {
                    path: "./web.env".to_string(),
                    values: BTreeMap::from([("DB_HOST".to_string(), "replica".to_string())]),
                },
            ],
            env_from: vec!["shared".to_string()],
            ..Default::default()
        }
    }

    #[test]
    fn literal_values_override_env_files() {
        let (envs, env_from) = config_envs(&service());
        let names: Vec<&str> = envs.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["DB_HOST", "MODE", "PORT"]);

        let mode = envs.iter().find(|e| e.name == "MODE").unwrap();
        assert_eq!(mode.value.as_deref(), Some("prod"));
        assert!(mode.value_from.is_none());

        let db_host = envs.iter().find(|e| e.name == "DB_HOST").unwrap();
        let key_ref = db_host
            .value_from
            .as_ref()
            .and_then(|source| source.config_map_key_ref.as_ref())
            .unwrap();
        assert_eq!(key_ref.key, "DB_HOST");
        assert_eq!(serde_json::to_value(key_ref).unwrap()["name"], "web-env");

        assert_eq!(env_from.len(), 1);
    }

    #[test]
    fn one_config_map_per_env_file() {
        let config_maps = env_config_maps(&service());
        let names: Vec<_> = config_maps
            .iter()
            .map(|cm| cm.metadata.name.clone().unwrap())
            .collect();
        assert_eq!(names, vec!["common-env", "web-env"]);
        assert_eq!(
            config_maps[0].data.as_ref().unwrap()["DB_HOST"],
            "db".to_string()
        );
    }
}
