use std::{path::PathBuf, str::FromStr};

use clap::Parser;
use forge_common::{info, settings::Settings};
use forge_transformer::{transform, ControllerKind, ConvertOptions, Provider, VolumeMode};

use crate::{
    error::{ForgeCliError, ForgeCliResult},
    loader::load_services,
    printer::{write_objects, Format, OutputTarget},
};

#[derive(Parser, Debug, Clone, Default)]
pub struct ConvertArgs {
    /// Service model file
    #[arg(short, long, value_name = "FILE")]
    pub file: PathBuf,

    /// Output file, or a directory for one file per object
    #[arg(short, long, value_name = "PATH")]
    pub out: Option<PathBuf>,

    /// Print all objects to stdout
    #[arg(long, default_value_t = false)]
    pub stdout: bool,

    /// Render JSON instead of YAML
    #[arg(short, long, default_value_t = false)]
    pub json: bool,

    /// deployment, daemonset or statefulset
    #[arg(long)]
    pub controller: Option<ControllerKind>,

    /// kubernetes or openshift
    #[arg(long)]
    pub provider: Option<Provider>,

    /// Put services into one pod: label or volume
    #[arg(long)]
    pub service_group_mode: Option<String>,

    /// persistentVolumeClaim, emptyDir, hostPath or configMap
    #[arg(long)]
    pub volumes: Option<VolumeMode>,

    #[arg(long, default_value_t = false)]
    pub generate_network_policies: bool,

    #[arg(long)]
    pub namespace: Option<String>,

    /// Default size of generated claims
    #[arg(long, value_name = "SIZE")]
    pub pvc_request_size: Option<String>,
}

fn parse_setting<T: FromStr<Err = String>>(value: &str) -> ForgeCliResult<T> {
    value.parse().map_err(ForgeCliError::InvalidArgument)
}

impl ConvertArgs {
    pub fn validate(&self) -> ForgeCliResult {
        if self.stdout && self.out.is_some() {
            return Err(ForgeCliError::InvalidArgument(
                "--out and --stdout can't be set at the same time".to_string(),
            ));
        }
        if let Some(mode) = self.service_group_mode.as_deref() {
            if !matches!(mode, "label" | "volume") {
                return Err(ForgeCliError::InvalidArgument(format!(
                    "unknown service group mode {mode:?}"
                )));
            }
        }
        Ok(())
    }

    /// Flags win over the `convert` section of the settings.
    pub fn merge_with_config(&self, config: &Settings) -> ForgeCliResult<ConvertOptions> {
        let defaults = &config.convert;

        let controller = match self.controller {
            Some(controller) => Some(controller),
            None => defaults
                .controller
                .as_deref()
                .filter(|c| !c.is_empty())
                .map(parse_setting)
                .transpose()?,
        };
        let provider = match self.provider {
            Some(provider) => provider,
            None => parse_setting(&defaults.provider)?,
        };
        let volumes = match self.volumes {
            Some(volumes) => volumes,
            None => parse_setting(&defaults.volumes)?,
        };

        Ok(ConvertOptions {
            controller,
            provider,
            service_group_mode: self
                .service_group_mode
                .clone()
                .or_else(|| defaults.service_group_mode.clone()),
            volumes,
            generate_network_policies: self.generate_network_policies
                || defaults.generate_network_policies,
            pvc_request_size: self
                .pvc_request_size
                .clone()
                .unwrap_or_else(|| defaults.pvc_request_size.clone()),
            namespace: self.namespace.clone().or_else(|| defaults.namespace.clone()),
        })
    }

    pub fn format(&self, config: &Settings) -> Format {
        if self.json || config.convert.json {
            Format::Json
        } else {
            Format::Yaml
        }
    }
}

pub async fn run(args: ConvertArgs, config: &Settings) -> ForgeCliResult<()> {
    args.validate()?;
    let opt = args.merge_with_config(config)?;
    let format = args.format(config);
    let target = OutputTarget::resolve(args.stdout, args.out.as_deref())?;

    let services = load_services(&args.file)?;
    info!("Loaded {} services from {}", services.len(), args.file.display());

    let objects = transform(services, &opt)?;
    let written = write_objects(&objects, format, &target)?;
    for path in written {
        info!("Kubernetes file {:?} created", path.display().to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use forge_common::settings::ConvertSettings;

    fn args() -> ConvertArgs {
        ConvertArgs {
            file: PathBuf::from("services.yaml"),
            ..Default::default()
        }
    }

    #[test]
    fn settings_fill_missing_flags() {
        let config = Settings {
            convert: ConvertSettings {
                controller: Some("daemonset".to_string()),
                provider: "openshift".to_string(),
                namespace: Some("apps".to_string()),
                pvc_request_size: "1Gi".to_string(),
                ..Default::default()
            },
            ..Default::default()
        };
        let opt = args().merge_with_config(&config).unwrap();
        assert_eq!(opt.controller, Some(ControllerKind::DaemonSet));
        assert_eq!(opt.provider, Provider::OpenShift);
        assert_eq!(opt.namespace.as_deref(), Some("apps"));
        assert_eq!(opt.pvc_request_size, "1Gi");
        assert_eq!(opt.volumes, VolumeMode::PersistentVolumeClaim);
    }

    #[test]
    fn flags_win() {
        let config = Settings {
            convert: ConvertSettings {
                controller: Some("daemonset".to_string()),
                json: true,
                ..Default::default()
            },
            ..Default::default()
        };
        let args = ConvertArgs {
            controller: Some(ControllerKind::StatefulSet),
            volumes: Some(VolumeMode::EmptyDir),
            namespace: Some("dev".to_string()),
            ..args()
        };
        let opt = args.merge_with_config(&config).unwrap();
        assert_eq!(opt.controller, Some(ControllerKind::StatefulSet));
        assert_eq!(opt.volumes, VolumeMode::EmptyDir);
        assert_eq!(opt.namespace.as_deref(), Some("dev"));
        assert_eq!(args.format(&config), Format::Json);
    }

    #[test]
    fn bad_settings_are_reported() {
        let config = Settings {
            convert: ConvertSettings {
                volumes: "nfs".to_string(),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(matches!(
            args().merge_with_config(&config),
            Err(ForgeCliError::InvalidArgument(_))
        ));
    }

    #[test]
    fn validation() {
        let both = ConvertArgs {
            stdout: true,
            out: Some(PathBuf::from("out.yaml")),
            ..args()
        };
        assert!(both.validate().is_err());

        let grouping = ConvertArgs {
            service_group_mode: Some("pod".to_string()),
            ..args()
        };
        assert!(grouping.validate().is_err());
        assert!(args().validate().is_ok());
    }
}
