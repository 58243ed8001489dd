use forge_common::{
    debug,
    settings::{get_config, Settings, CONFIG_INSTANCE},
};

use crate::{error::ForgeCliResult, Cli};

pub fn init_config(cli: &Cli) -> ForgeCliResult<&'static Settings> {
    let settings = match &cli.settings {
        None => Settings::from_root(cli.root.clone())?,
        Some(settings) => Settings::from_root(Some(settings.clone()))?,
    };
    if CONFIG_INSTANCE.set(settings).is_err() {
        debug!("Config already initialized");
    }
    Ok(get_config()?)
}
