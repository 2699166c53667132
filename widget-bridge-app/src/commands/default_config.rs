use crate::config::BridgeConfig;
use anyhow::Result;

pub fn run() -> Result<()> {
    print!("{}", BridgeConfig::default().to_yaml()?);
    Ok(())
}
