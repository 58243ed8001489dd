use tracing::metadata::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::error::{ForgeError, ForgeResult};

/// Install the global subscriber. `RUST_LOG` wins over `level` when set.
pub fn setup_tracing(level: Option<LevelFilter>) -> ForgeResult {
    let level = level.unwrap_or(LevelFilter::INFO);
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|e| ForgeError::Tracing(e.to_string()))
}
