use crate::bus::{AuditBus, Subscription};
use crate::event::{AuditEvent, EventSelector};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Appends every audit event to a file, one JSON document per line.
pub struct JsonlAuditSink {
    log_path: PathBuf,
    file: Mutex<File>,
}

impl JsonlAuditSink {
    pub fn new<P: AsRef<Path>>(log_path: P) -> Result<Self, SinkError> {
        let log_path = log_path.as_ref().to_path_buf();

        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)?;

        Ok(Self {
            log_path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.log_path
    }

    /// Writes and syncs one event. Blocking; keep it off async tasks.
    pub fn log(&self, event: &AuditEvent) -> Result<(), SinkError> {
        let json = serde_json::to_string(event)?;
        let mut file = self.file.lock();
        writeln!(file, "{}", json)?;
        file.sync_all()?;
        Ok(())
    }

    /// Subscribes the sink to every event on the bus.
    ///
    /// The bus handler only queues the event; a dedicated writer thread
    /// drains the queue in publish order and does the file I/O.
    pub fn attach(self: Arc<Self>, bus: &AuditBus) -> Result<AuditWriter, SinkError> {
        let (tx, mut rx) = mpsc::unbounded_channel::<AuditEvent>();
        let sink = self;
        let worker = std::thread::Builder::new()
            .name("audit-writer".to_string())
            .spawn(move || {
                while let Some(event) = rx.blocking_recv() {
                    if let Err(e) = sink.log(&event) {
                        warn!("Failed to write audit event {}: {}", event.name(), e);
                    }
                }
                debug!("Audit writer for {} stopped", sink.path().display());
            })?;

        let subscription = bus.on(EventSelector::All, move |event| {
            tx.send(event.clone())
                .map_err(|_| "audit writer has stopped".into())
        });

        Ok(AuditWriter {
            subscription,
            worker,
        })
    }
}

/// A sink attached to a bus, together with its writer thread.
pub struct AuditWriter {
    subscription: Subscription,
    worker: JoinHandle<()>,
}

impl AuditWriter {
    pub fn subscription(&self) -> &Subscription {
        &self.subscription
    }

    /// Detaches from the bus and waits until every queued event is on disk.
    pub fn close(self) {
        self.subscription.unsubscribe();
        if self.worker.join().is_err() {
            warn!("Audit writer thread panicked");
        }
    }
}
