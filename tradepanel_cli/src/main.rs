mod cli;
mod display;
mod error;

use std::path::Path;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, RunCommand};
use log::debug;
use tradepanel::config::Config;

fn main() -> Result<()> {
    let args = Cli::parse();
    let config = read_config_from_toml(args.config.as_deref());
    // Set RUST_LOG to the configured verbosity if not set
    let _ = std::env::var("RUST_LOG")
        .map_err(|_| std::env::set_var("RUST_LOG", &config.log_level));
    pretty_env_logger::init_timed();
    debug!("args: {args:?}");
    debug!("config: {config:?}");

    if let Some(command) = args.command {
        command.run(config)?;
    }
    Ok(())
}

fn read_config_from_toml(explicit: Option<&Path>) -> Config {
    // Linux: ~/.config/tradepanel/config.toml
    let file_path = match explicit {
        Some(path) => path.to_path_buf(),
        None => dirs::config_dir()
            .unwrap()
            .join("tradepanel")
            .join("config.toml"),
    };
    match std::fs::read_to_string(&file_path) {
        Ok(contents) => toml::from_str(&contents).expect("Invalid TOML in config file"),
        Err(e) => {
            if e.kind() == std::io::ErrorKind::NotFound && explicit.is_none() {
                Config::default()
            } else {
                panic!("Error reading config file {}: {:#?}", file_path.display(), e);
            }
        }
    }
}
