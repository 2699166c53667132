use crate::config::BridgeConfig;
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, Level};
use widget_bridge::{Bridge, ConfirmationPresenter, TransportRouter};
use widget_bridge_audit::{AuditBus, AuditWriter, JsonlAuditSink};

/// Installs the fmt subscriber at the configured level.
///
/// Safe to call more than once; later calls are ignored.
pub fn init_logging(config: &BridgeConfig) -> Result<()> {
    let level: Level = config
        .log_level
        .parse()
        .with_context(|| format!("Invalid log level '{}'", config.log_level))?;
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .try_init();
    Ok(())
}

/// A bridge wired from config, plus the audit file writer if any.
pub struct Runtime {
    pub bridge: Bridge,
    pub audit_file: Option<AuditWriter>,
}

impl Runtime {
    /// Flushes the audit log. Queued events are written before this returns.
    pub fn shutdown(self) {
        if let Some(writer) = self.audit_file {
            writer.close();
        }
    }
}

pub fn build_bridge(
    config: &BridgeConfig,
    presenter: Arc<dyn ConfirmationPresenter>,
    transports: TransportRouter,
) -> Result<Runtime> {
    config.validate()?;

    let bus = AuditBus::new(config.audit_channel_capacity);
    let audit_file = match &config.audit_log {
        Some(path) => {
            let sink = JsonlAuditSink::new(path)
                .with_context(|| format!("Failed to open audit log {}", path.display()))?;
            info!("Writing audit events to {}", path.display());
            let writer = Arc::new(sink)
                .attach(&bus)
                .context("Failed to start audit writer")?;
            Some(writer)
        }
        None => None,
    };

    let bridge = Bridge::builder()
        .timeouts(config.timeouts.clone())
        .max_queue_depth(config.max_queue_depth)
        .audit(bus)
        .presenter(presenter)
        .transports(transports)
        .build();

    Ok(Runtime { bridge, audit_file })
}
