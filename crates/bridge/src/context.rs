use serde::{Deserialize, Serialize};
use std::time::Duration;
use widget_bridge_core::{RequestId, WidgetId};

/// Per-call context handed to the backend transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallContext {
    pub request_id: RequestId,
    pub widget_id: WidgetId,
    pub timeout_ms: u64,
}

impl CallContext {
    pub fn new(request_id: RequestId, widget_id: WidgetId, timeout: Duration) -> Self {
        Self {
            request_id,
            widget_id,
            timeout_ms: timeout.as_millis().try_into().unwrap_or(u64::MAX),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
