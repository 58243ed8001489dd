//! Name normalization and small string encodings shared by every synthesizer.

use std::{collections::BTreeMap, path::Path};

use lazy_static::lazy_static;
use regex::Regex;

use crate::{
    error::{TransformError, TransformResult},
    model::{ConvertOptions, ServiceConfig},
};

pub const LABEL_SERVICE: &str = "kubeforge.service";
pub const LABEL_NETWORK_PREFIX: &str = "kubeforge.network/";
pub const LABEL_VOLUME_SELECTOR: &str = "kubeforge.volume";
pub const LABEL_SERVICE_GROUP: &str = "kubeforge.service.group";
pub const LABEL_SERVICE_ACCOUNT_NAME: &str = "kubeforge.serviceaccount-name";
pub const LABEL_INIT_CONTAINER_IMAGE: &str = "kubeforge.init.containers.image";
pub const LABEL_INIT_CONTAINER_NAME: &str = "kubeforge.init.containers.name";
pub const LABEL_INIT_CONTAINER_COMMAND: &str = "kubeforge.init.containers.command";

/// Kubernetes limit for label values and most object names.
pub const MAX_NAME_LENGTH: usize = 63;

lazy_static! {
    static ref NON_ALPHANUMERIC: Regex = Regex::new("[^a-zA-Z0-9]").unwrap();
    static ref SHELL_VARIABLE: Regex =
        Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}|\$([A-Za-z_][A-Za-z0-9_]*)").unwrap();
    static ref DURATION_PART: Regex = Regex::new(r"^([0-9]*\.?[0-9]*)(ns|us|µs|ms|s|m|h)").unwrap();
}

/// DNS-1123 friendly resource name.
pub fn format_resource_name(name: &str) -> String {
    name.replace('_', "-").to_lowercase()
}

pub fn format_container_name(name: &str) -> String {
    format_resource_name(name)
}

/// Container name of a service: explicit container name first, service name otherwise.
pub fn container_name(service: &ServiceConfig) -> String {
    match service.container_name.as_deref() {
        Some(name) if !name.is_empty() => format_container_name(name),
        _ => format_container_name(&service.name),
    }
}

/// Config map name for an env file, unique per file path.
pub fn format_env_name(path: &str, service_name: &str) -> String {
    let trimmed = path.trim_matches(|c| c == '.' || c == '/');
    let name = NON_ALPHANUMERIC.replace_all(trimmed, "-");
    usable_artifact_name(&name, service_name)
}

/// Repair a leading hyphen with the service name and enforce the length limit.
pub fn usable_artifact_name(name: &str, service_name: &str) -> String {
    let name = if name.is_empty() || name.starts_with('-') {
        format!("{}{}", format_resource_name(service_name), name)
    } else {
        name.to_string()
    };
    name.chars().take(MAX_NAME_LENGTH).collect::<String>().to_lowercase()
}

/// Config map key for a mounted file: the base name with `_` replaced.
pub fn format_file_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string())
        .replace('_', "-")
}

/// Rewrite shell interpolation into the kubelet's `$(VAR)` syntax.
///
/// `[curl, $PROTOCOL://${DOMAIN}]` becomes `[curl, $(PROTOCOL)://$(DOMAIN)]`.
pub fn container_args(service: &ServiceConfig) -> Vec<String> {
    service
        .args
        .iter()
        .map(|arg| {
            SHELL_VARIABLE
                .replace_all(arg, |caps: &regex::Captures<'_>| {
                    let var = caps.get(1).or_else(|| caps.get(2)).map_or("", |m| m.as_str());
                    format!("$({var})")
                })
                .into_owned()
        })
        .collect()
}

/// Parse a Go-style duration (`90s`, `1m30s`, `1.5h`) into whole seconds.
pub fn duration_to_seconds(input: &str) -> TransformResult<i64> {
    let invalid = || TransformError::InvalidDuration(input.to_string());
    let mut rest = input.trim();
    let negative = rest.starts_with('-');
    rest = rest.trim_start_matches(['-', '+']);
    if rest == "0" {
        return Ok(0);
    }
    if rest.is_empty() {
        return Err(invalid());
    }

    let mut nanos = 0f64;
    while !rest.is_empty() {
        let caps = DURATION_PART.captures(rest).ok_or_else(invalid)?;
        let value: f64 = caps[1].parse().map_err(|_| invalid())?;
        let unit = match &caps[2] {
            "ns" => 1.0,
            "us" | "µs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            _ => return Err(invalid()),
        };
        nanos += value * unit;
        rest = &rest[caps[0].len()..];
    }

    let seconds = (nanos / 1e9) as i64;
    Ok(if negative { -seconds } else { seconds })
}

/// Pod selector labels of a workload.
pub fn config_labels(name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([(LABEL_SERVICE.to_string(), name.to_string())])
}

/// Pod labels, including network membership when network policies are generated.
pub fn config_labels_with_network(
    name: &str,
    networks: &[String],
    opt: &ConvertOptions,
) -> BTreeMap<String, String> {
    let mut labels = config_labels(name);
    if opt.generate_network_policies {
        for network in networks {
            labels.insert(network_label(network), "true".to_string());
        }
    }
    labels
}

pub fn network_label(network: &str) -> String {
    format!("{LABEL_NETWORK_PREFIX}{}", format_resource_name(network))
}
