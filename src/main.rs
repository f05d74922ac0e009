use std::{fs::File, path::Path, sync::Arc};

use env_logger::Env;
use rcache::{
    cli::parse_cli,
    cmds,
    config::{Config, ConfigProperties},
    error::AddContext,
    Result,
};

const CONFIG_PATH: &str = ".config/rcache/config";
const CACHE_PATH: &str = ".cache/rcache";

fn main() -> Result<()> {
    let option_args = parse_cli();
    let cli_args = option_args.cli_args;
    if cli_args.verbose {
        let env = Env::default().default_filter_or("rcache=debug");
        env_logger::init_from_env(env);
    }
    let home_dir = std::env::var("HOME").err_context("HOME is not set")?;
    let config_file = cli_args
        .config
        .unwrap_or_else(|| Path::new(&home_dir).join(CONFIG_PATH));
    let config = match File::open(&config_file) {
        Ok(f) => Config::new(f, &cli_args.profile)?,
        // No config file yet, run with the defaults.
        Err(_) => Config::default(),
    };
    let config = if config.cache_location().is_none() {
        let cache_location = Path::new(&home_dir).join(CACHE_PATH);
        std::fs::create_dir_all(&cache_location).err_context(format!(
            "Could not create cache directory {}",
            cache_location.display()
        ))?;
        config.with_cache_location(cache_location.to_string_lossy())
    } else {
        config
    };
    cmds::cache::execute(option_args.cli_options, Arc::new(config))
}
