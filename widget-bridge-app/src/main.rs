use anyhow::{bail, Result};
use std::path::PathBuf;
use widget_bridge_app::bootstrap;
use widget_bridge_app::commands;
use widget_bridge_app::config::{BridgeConfig, DEFAULT_CONFIG_PATH};

const USAGE: &str = "Usage:
  widget-bridge [--config <path>] check <manifest>
  widget-bridge default-config";

fn main() -> Result<()> {
    let mut args: Vec<String> = std::env::args().skip(1).collect();

    let config_path = match args.iter().position(|a| a == "--config") {
        Some(i) => {
            if i + 1 >= args.len() {
                bail!("--config requires a path\n{}", USAGE);
            }
            let path = PathBuf::from(args.remove(i + 1));
            args.remove(i);
            path
        }
        None => PathBuf::from(DEFAULT_CONFIG_PATH),
    };

    let config = if BridgeConfig::exists(&config_path) {
        BridgeConfig::load(&config_path)?
    } else {
        BridgeConfig::default()
    };
    bootstrap::init_logging(&config)?;

    match args.first().map(String::as_str) {
        Some("check") => match args.get(1) {
            Some(manifest) => commands::check::run(&PathBuf::from(manifest)),
            None => bail!("check requires a manifest path\n{}", USAGE),
        },
        Some("default-config") => commands::default_config::run(),
        _ => {
            eprintln!("{}", USAGE);
            bail!("unknown or missing command")
        }
    }
}
