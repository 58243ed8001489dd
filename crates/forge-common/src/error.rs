pub type ForgeResult<T = (), E = ForgeError> = Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum ForgeError {
    #[error("CLI error: {0}")]
    Cli(String),
    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("Runtime error: {0}")]
    Runtime(#[from] anyhow::Error),
    #[error("IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("File not found: {0}")]
    FileNotFound(String),
    #[error("Tracing setup failed: {0}")]
    Tracing(String),

    #[error("Invalid Json: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },

    #[error("Invalid Yaml: {source}")]
    Yaml {
        #[from]
        source: serde_yaml::Error,
    },

    /// Input that cannot be mapped onto any valid manifest.
    #[error("Conversion failed: {0}")]
    Conversion(String),
}

impl From<Box<dyn std::error::Error>> for ForgeError {
    fn from(err: Box<dyn std::error::Error>) -> Self {
        ForgeError::Runtime(anyhow::anyhow!("{:#?}", err))
    }
}
