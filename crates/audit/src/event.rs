//! Typed audit events.
//!
//! The event name is derived from the category and the outcome variant, so
//! an event can never be published under a name that disagrees with its
//! payload shape.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use widget_bridge_core::{Category, ErrorInfo, Operation, OperationKind, RequestId, WidgetId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    InvokeRequested,
    Invoked,
    Error,
}

impl Phase {
    pub const ALL: [Phase; 3] = [Phase::InvokeRequested, Phase::Invoked, Phase::Error];

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::InvokeRequested => "invoke-requested",
            Phase::Invoked => "invoked",
            Phase::Error => "error",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "kebab-case")]
pub enum AuditOutcome {
    InvokeRequested {
        arguments: Value,
    },
    #[serde(rename_all = "camelCase")]
    Invoked {
        result: Value,
        duration_ms: u64,
    },
    Error {
        error: ErrorInfo,
    },
}

impl AuditOutcome {
    pub fn phase(&self) -> Phase {
        match self {
            AuditOutcome::InvokeRequested { .. } => Phase::InvokeRequested,
            AuditOutcome::Invoked { .. } => Phase::Invoked,
            AuditOutcome::Error { .. } => Phase::Error,
        }
    }
}

/// Immutable record of one phase of a mediated call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    request_id: RequestId,
    widget_id: WidgetId,
    category: Category,
    operation: OperationKind,
    target: String,
    timestamp: DateTime<Utc>,
    outcome: AuditOutcome,
}

impl AuditEvent {
    pub fn new(
        request_id: RequestId,
        widget_id: &WidgetId,
        operation: &Operation,
        outcome: AuditOutcome,
    ) -> Self {
        Self {
            request_id,
            widget_id: widget_id.clone(),
            category: operation.category,
            operation: operation.kind,
            target: operation.target.clone(),
            timestamp: Utc::now(),
            outcome,
        }
    }

    pub fn invoke_requested(request_id: RequestId, widget_id: &WidgetId, operation: &Operation) -> Self {
        let outcome = AuditOutcome::InvokeRequested {
            arguments: operation.arguments.clone(),
        };
        Self::new(request_id, widget_id, operation, outcome)
    }

    pub fn invoked(
        request_id: RequestId,
        widget_id: &WidgetId,
        operation: &Operation,
        result: Value,
        duration: Duration,
    ) -> Self {
        let outcome = AuditOutcome::Invoked {
            result,
            duration_ms: u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
        };
        Self::new(request_id, widget_id, operation, outcome)
    }

    pub fn error(
        request_id: RequestId,
        widget_id: &WidgetId,
        operation: &Operation,
        error: ErrorInfo,
    ) -> Self {
        Self::new(request_id, widget_id, operation, AuditOutcome::Error { error })
    }

    /// `<category>:<phase>`, e.g. `tool:invoke-requested`.
    pub fn name(&self) -> String {
        format!("{}:{}", self.category, self.phase())
    }

    pub fn phase(&self) -> Phase {
        self.outcome.phase()
    }

    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    pub fn widget_id(&self) -> &WidgetId {
        &self.widget_id
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn operation(&self) -> OperationKind {
        self.operation
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn outcome(&self) -> &AuditOutcome {
        &self.outcome
    }

    pub fn error_info(&self) -> Option<&ErrorInfo> {
        match &self.outcome {
            AuditOutcome::Error { error } => Some(error),
            _ => None,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid event selector: {0}")]
pub struct InvalidSelector(pub String);

/// Which events a subscriber receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventSelector {
    /// `*`
    All,
    /// `<category>:*`
    Category(Category),
    /// `<category>:<phase>`
    Exact(Category, Phase),
}

impl EventSelector {
    pub fn matches(&self, event: &AuditEvent) -> bool {
        match self {
            EventSelector::All => true,
            EventSelector::Category(c) => *c == event.category(),
            EventSelector::Exact(c, p) => *c == event.category() && *p == event.phase(),
        }
    }
}

impl FromStr for EventSelector {
    type Err = InvalidSelector;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "*" {
            return Ok(EventSelector::All);
        }

        let (category, phase) = s
            .split_once(':')
            .ok_or_else(|| InvalidSelector(s.to_string()))?;
        let category: Category = category
            .parse()
            .map_err(|_| InvalidSelector(s.to_string()))?;

        if phase == "*" {
            return Ok(EventSelector::Category(category));
        }

        Phase::ALL
            .into_iter()
            .find(|p| p.as_str() == phase)
            .map(|p| EventSelector::Exact(category, p))
            .ok_or_else(|| InvalidSelector(s.to_string()))
    }
}

impl fmt::Display for EventSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventSelector::All => f.write_str("*"),
            EventSelector::Category(c) => write!(f, "{}:*", c),
            EventSelector::Exact(c, p) => write!(f, "{}:{}", c, p),
        }
    }
}
