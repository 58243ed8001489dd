use forge_common::error::ForgeError;
use thiserror::Error;

pub type TransformResult<T = (), E = TransformError> = Result<T, E>;

/// Failures that abort a conversion. Recoverable input problems are logged
/// and defaulted where they occur and never surface here.
#[derive(Debug, Error)]
pub enum TransformError {
    #[error("Unknown restart policy {policy} for service {service}")]
    UnknownRestartPolicy { service: String, policy: String },

    #[error("Unknown image-pull-policy {policy} for service {service}")]
    UnknownImagePullPolicy { service: String, policy: String },

    #[error("Health check for service {service} must contain a command, an HTTP target or a TCP port")]
    MalformedHealthCheck { service: String },

    #[error("Unsupported workload variant: {0}")]
    UnsupportedVariant(String),

    #[error("Cannot merge {source_kind} {source_name} into {target_kind} {target_name}: only Deployments can share a network namespace")]
    UnsupportedMerge {
        source_name: String,
        source_kind: String,
        target_name: String,
        target_kind: String,
    },

    #[error("Service {source_name} joins the network of {target_name}, but no workload named {target_name} was generated")]
    MergeTargetMissing {
        source_name: String,
        target_name: String,
    },

    #[error("Invalid duration {0:?}")]
    InvalidDuration(String),

    #[error("Failed to convert service {service}: {source}")]
    Service {
        service: String,
        #[source]
        source: Box<TransformError>,
    },
}

impl TransformError {
    /// Attach the originating service name, once.
    pub fn in_service(self, service: &str) -> Self {
        match self {
            err @ TransformError::Service { .. } => err,
            err => TransformError::Service {
                service: service.to_string(),
                source: Box::new(err),
            },
        }
    }
}

impl From<TransformError> for ForgeError {
    fn from(error: TransformError) -> Self {
        ForgeError::Conversion(error.to_string())
    }
}
