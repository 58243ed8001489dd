use std::path::PathBuf;

use clap::Parser;
use forge_common::{metadata::LevelFilter, util::tracing::setup_tracing};

use crate::{error::ForgeCliResult, init::init_config};

mod convert;
mod info;

pub use convert::ConvertArgs;

#[derive(Debug, Parser)]
#[command(name = "kf", version, about, long_about = None)]
#[command(propagate_version = true)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    #[arg(short, long)]
    pub root: Option<PathBuf>,

    /// Overrides the level from the settings file
    #[clap(short('l'), long, value_name("LEVEL"))]
    pub log_level: Option<LevelFilter>,

    #[arg(short, long)]
    pub settings: Option<PathBuf>,

    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Debug, Parser, Clone)]
pub enum Command {
    #[command(about = "Show information about kubeforge")]
    Info(info::InfoArgs),
    #[command(about = "Convert a service model into Kubernetes manifests", alias = "c")]
    Convert(Box<ConvertArgs>),
}

fn tracing_level(level: log::LevelFilter) -> LevelFilter {
    match level {
        log::LevelFilter::Off => LevelFilter::OFF,
        log::LevelFilter::Error => LevelFilter::ERROR,
        log::LevelFilter::Warn => LevelFilter::WARN,
        log::LevelFilter::Info => LevelFilter::INFO,
        log::LevelFilter::Debug => LevelFilter::DEBUG,
        log::LevelFilter::Trace => LevelFilter::TRACE,
    }
}

pub async fn exec() -> ForgeCliResult {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    let cfg = init_config(&cli)?;
    setup_tracing(Some(cli.log_level.unwrap_or_else(|| tracing_level(cfg.log_level))))?;

    match cli.cmd {
        Command::Info(args) => info::run(args, cfg).await?,
        Command::Convert(args) => convert::run(*args, cfg).await?,
    }
    Ok(())
}
