use crate::category::Category;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Host-configurable timeouts, in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WidgetTimeouts {
    pub initialize_ms: u64,
    pub destroy_ms: u64,
    pub refresh_ms: u64,
    /// How long a confirmation prompt may stay unanswered.
    pub confirmation_ms: u64,
    /// Delay a widget should wait before retrying after a confirmation expired.
    pub confirmation_retry_delay_ms: u64,
    pub tool_call_ms: u64,
    pub resource_read_ms: u64,
    pub prompt_get_ms: u64,
    pub sampling_ms: u64,
    pub network_ms: u64,
    pub storage_ms: u64,
    pub messaging_ms: u64,
}

impl Default for WidgetTimeouts {
    fn default() -> Self {
        Self {
            initialize_ms: 30_000,
            destroy_ms: 3_000,
            refresh_ms: 10_000,
            confirmation_ms: 30_000,
            confirmation_retry_delay_ms: 5_000,
            tool_call_ms: 30_000,
            resource_read_ms: 10_000,
            prompt_get_ms: 10_000,
            sampling_ms: 60_000,
            network_ms: 30_000,
            storage_ms: 5_000,
            messaging_ms: 5_000,
        }
    }
}

impl WidgetTimeouts {
    /// Default bound on a backend call for the category.
    pub fn transport(&self, category: Category) -> Duration {
        Duration::from_millis(match category {
            Category::Tool => self.tool_call_ms,
            Category::Resource => self.resource_read_ms,
            Category::Prompt => self.prompt_get_ms,
            Category::Sampling => self.sampling_ms,
            Category::Network => self.network_ms,
            Category::Storage => self.storage_ms,
            Category::CrossWidgetMessaging => self.messaging_ms,
        })
    }

    pub fn confirmation(&self) -> Duration {
        Duration::from_millis(self.confirmation_ms)
    }

    pub fn confirmation_retry_delay(&self) -> Duration {
        Duration::from_millis(self.confirmation_retry_delay_ms)
    }

    pub fn initialize(&self) -> Duration {
        Duration::from_millis(self.initialize_ms)
    }

    pub fn destroy(&self) -> Duration {
        Duration::from_millis(self.destroy_ms)
    }

    pub fn refresh(&self) -> Duration {
        Duration::from_millis(self.refresh_ms)
    }

    /// Names of fields set to zero. A zero timeout would expire every call.
    pub fn zero_fields(&self) -> Vec<&'static str> {
        [
            ("initialize_ms", self.initialize_ms),
            ("destroy_ms", self.destroy_ms),
            ("refresh_ms", self.refresh_ms),
            ("confirmation_ms", self.confirmation_ms),
            ("tool_call_ms", self.tool_call_ms),
            ("resource_read_ms", self.resource_read_ms),
            ("prompt_get_ms", self.prompt_get_ms),
            ("sampling_ms", self.sampling_ms),
            ("network_ms", self.network_ms),
            ("storage_ms", self.storage_ms),
            ("messaging_ms", self.messaging_ms),
        ]
        .into_iter()
        .filter(|(_, v)| *v == 0)
        .map(|(name, _)| name)
        .collect()
    }
}
