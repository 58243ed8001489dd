use std::{
    fs,
    io::Write,
    path::{Path, PathBuf, MAIN_SEPARATOR},
};

use forge_common::debug;
use forge_transformer::K8sObject;

use crate::error::{ForgeCliError, ForgeCliResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Yaml,
    Json,
}

impl Format {
    pub fn extension(self) -> &'static str {
        match self {
            Format::Yaml => "yaml",
            Format::Json => "json",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputTarget {
    Stdout,
    File(PathBuf),
    Dir(PathBuf),
}

impl OutputTarget {
    /// A path ending in a separator is created as a directory; an existing
    /// directory gets one file per object; anything else is a single file.
    /// Without a path the objects are written to the working directory.
    pub fn resolve(stdout: bool, out: Option<&Path>) -> ForgeCliResult<Self> {
        if stdout {
            return Ok(OutputTarget::Stdout);
        }
        let Some(path) = out.filter(|p| !p.as_os_str().is_empty()) else {
            return Ok(OutputTarget::Dir(PathBuf::from(".")));
        };

        let raw = path.to_string_lossy();
        if !path.exists() && (raw.ends_with('/') || raw.ends_with(MAIN_SEPARATOR)) {
            fs::create_dir_all(path)
                .map_err(|e| ForgeCliError::Output(format!("failed to create a directory: {e}")))?;
        }
        if path.is_dir() {
            Ok(OutputTarget::Dir(path.to_path_buf()))
        } else {
            Ok(OutputTarget::File(path.to_path_buf()))
        }
    }
}

pub fn render(object: &K8sObject, format: Format) -> ForgeCliResult<String> {
    match format {
        Format::Yaml => Ok(serde_yaml::to_string(object)?),
        Format::Json => Ok(format!("{}\n", serde_json::to_string_pretty(object)?)),
    }
}

/// All objects as one YAML stream, each document introduced by `---`.
pub fn render_stream(objects: &[K8sObject]) -> ForgeCliResult<String> {
    let mut out = String::new();
    for object in objects {
        out.push_str("---\n");
        out.push_str(&render(object, Format::Yaml)?);
    }
    Ok(out)
}

pub fn object_file_name(object: &K8sObject, format: Format) -> String {
    format!(
        "{}-{}.{}",
        object.name(),
        object.kind().to_lowercase(),
        format.extension()
    )
}

/// Write `objects` to `target` and return the files created.
pub fn write_objects(
    objects: &[K8sObject],
    format: Format,
    target: &OutputTarget,
) -> ForgeCliResult<Vec<PathBuf>> {
    if format == Format::Json && !matches!(target, OutputTarget::Dir(_)) {
        return Err(ForgeCliError::InvalidArgument(
            "cannot convert to one file while specifying a json output file or stdout option"
                .to_string(),
        ));
    }

    match target {
        OutputTarget::Stdout => {
            let stream = render_stream(objects)?;
            std::io::stdout().lock().write_all(stream.as_bytes())?;
            Ok(Vec::new())
        }
        OutputTarget::File(path) => {
            fs::write(path, render_stream(objects)?)?;
            Ok(vec![path.clone()])
        }
        OutputTarget::Dir(dir) => {
            fs::create_dir_all(dir)?;
            let mut written = Vec::with_capacity(objects.len());
            for object in objects {
                let path = dir.join(object_file_name(object, format));
                debug!("Writing {}", path.display());
                fs::write(&path, render(object, format)?)?;
                written.push(path);
            }
            Ok(written)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forge_transformer::{transform, ConvertOptions, ServiceConfig};
    use std::collections::BTreeMap;

    fn objects() -> Vec<K8sObject> {
        let services: BTreeMap<String, ServiceConfig> = serde_yaml::from_str(
            r"
web:
  image: nginx
  ports: [{ container_port: 80 }]
",
        )
        .unwrap();
        transform(services, &ConvertOptions::default()).unwrap()
    }

    #[test]
    fn yaml_stream() {
        let stream = render_stream(&objects()).unwrap();
        assert!(stream.starts_with("---\napiVersion: v1\nkind: Service\n"));
        assert_eq!(stream.matches("---\n").count(), 2);
        assert!(stream.contains("kind: Deployment"));
    }

    #[test]
    fn one_file_per_object() {
        let dir = tempfile::tempdir().unwrap();
        let out = format!("{}/manifests/", dir.path().display());
        let target = OutputTarget::resolve(false, Some(Path::new(&out))).unwrap();
        assert!(matches!(target, OutputTarget::Dir(_)));

        let written = write_objects(&objects(), Format::Json, &target).unwrap();
        let names: Vec<_> = written
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["web-service.json", "web-deployment.json"]);

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&written[1]).unwrap()).unwrap();
        assert_eq!(json["kind"], "Deployment");
        assert_eq!(json["metadata"]["name"], "web");
    }

    #[test]
    fn single_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("all.yaml");
        let target = OutputTarget::resolve(false, Some(&path)).unwrap();
        assert_eq!(target, OutputTarget::File(path.clone()));

        write_objects(&objects(), Format::Yaml, &target).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("kind: Service"));
        assert!(content.contains("kind: Deployment"));

        assert!(matches!(
            write_objects(&objects(), Format::Json, &target),
            Err(ForgeCliError::InvalidArgument(_))
        ));
        assert!(write_objects(&objects(), Format::Json, &OutputTarget::Stdout).is_err());
    }
}
