use forge_common::error::ForgeError;
use forge_transformer::TransformError;
use thiserror::Error;

pub type ForgeCliResult<T = (), E = ForgeCliError> = Result<T, E>;

#[derive(Debug, Error)]
pub enum ForgeCliError {
    #[error("Unable to initialize config: {0}")]
    InitConfig(String),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Unable to run command: {0}")]
    Command(#[from] clap::error::Error),
    #[error("Unable to load {path}: {reason}")]
    Load { path: String, reason: String },
    #[error(transparent)]
    Transform(#[from] TransformError),
    #[error("Unable to write output: {0}")]
    Output(String),
    #[error("Runtime error: {0}")]
    Runtime(String),
}

impl ForgeCliError {
    pub fn load(path: impl AsRef<std::path::Path>, reason: impl ToString) -> Self {
        ForgeCliError::Load {
            path: path.as_ref().display().to_string(),
            reason: reason.to_string(),
        }
    }
}

impl From<ForgeCliError> for ForgeError {
    fn from(error: ForgeCliError) -> Self {
        match error {
            ForgeCliError::Transform(e) => e.into(),
            other => ForgeError::Cli(other.to_string()),
        }
    }
}

impl From<ForgeError> for ForgeCliError {
    fn from(error: ForgeError) -> Self {
        match error {
            ForgeError::Config(e) => ForgeCliError::InitConfig(e.to_string()),
            other => ForgeCliError::Runtime(other.to_string()),
        }
    }
}

impl From<anyhow::Error> for ForgeCliError {
    fn from(error: anyhow::Error) -> Self {
        ForgeCliError::Runtime(error.to_string())
    }
}

impl From<std::io::Error> for ForgeCliError {
    fn from(error: std::io::Error) -> Self {
        ForgeCliError::Output(error.to_string())
    }
}

impl From<serde_yaml::Error> for ForgeCliError {
    fn from(error: serde_yaml::Error) -> Self {
        ForgeCliError::Output(error.to_string())
    }
}

impl From<serde_json::Error> for ForgeCliError {
    fn from(error: serde_json::Error) -> Self {
        ForgeCliError::Output(error.to_string())
    }
}
