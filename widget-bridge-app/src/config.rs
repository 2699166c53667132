use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use widget_bridge_audit::DEFAULT_CHANNEL_CAPACITY;
use widget_bridge_policy::DEFAULT_MAX_QUEUE_DEPTH;
use widget_bridge_core::WidgetTimeouts;

pub const DEFAULT_CONFIG_PATH: &str = "./data/bridge.yaml";

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub log_level: String,
    pub audit_log: Option<PathBuf>,
    pub max_queue_depth: usize,
    pub audit_channel_capacity: usize,
    pub timeouts: WidgetTimeouts,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            audit_log: None,
            max_queue_depth: DEFAULT_MAX_QUEUE_DEPTH,
            audit_channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            timeouts: WidgetTimeouts::default(),
        }
    }
}

impl BridgeConfig {
    pub fn exists(path: &Path) -> bool {
        path.exists()
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_yaml(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_yaml()?)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if !LOG_LEVELS.contains(&self.log_level.to_lowercase().as_str()) {
            bail!(
                "log_level must be one of {}, got '{}'",
                LOG_LEVELS.join(", "),
                self.log_level
            );
        }
        if self.max_queue_depth == 0 {
            bail!("max_queue_depth must be positive");
        }
        if self.audit_channel_capacity == 0 {
            bail!("audit_channel_capacity must be positive");
        }
        let zero = self.timeouts.zero_fields();
        if !zero.is_empty() {
            bail!("timeouts must be positive: {}", zero.join(", "));
        }
        Ok(())
    }
}
