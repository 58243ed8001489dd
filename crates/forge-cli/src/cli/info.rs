use clap::Parser;
use colored::Colorize;
use forge_common::settings::Settings;

use crate::error::ForgeCliResult;

#[derive(Parser, Debug, Clone)]
pub struct InfoArgs {}

pub async fn run(_args: InfoArgs, config: &Settings) -> ForgeCliResult<()> {
    println!(
        "{} {} (provider: {}, volumes: {})",
        "kubeforge".bold(),
        env!("CARGO_PKG_VERSION").green(),
        config.convert.provider,
        config.convert.volumes
    );
    Ok(())
}
