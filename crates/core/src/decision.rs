use crate::error::{ErrorCode, ErrorInfo};
use crate::permission::OnExceeded;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionReason {
    Allowed,
    ScopeDenied,
    RateLimitExceeded,
    ConstraintViolation,
    UserRejected,
    UserTimeout,
}

impl DecisionReason {
    pub fn error_code(&self) -> Option<ErrorCode> {
        match self {
            DecisionReason::Allowed => None,
            DecisionReason::ScopeDenied => Some(ErrorCode::ScopeDenied),
            DecisionReason::RateLimitExceeded => Some(ErrorCode::RateLimitExceeded),
            DecisionReason::ConstraintViolation => Some(ErrorCode::ConstraintViolation),
            DecisionReason::UserRejected => Some(ErrorCode::UserRejected),
            DecisionReason::UserTimeout => Some(ErrorCode::UserTimeout),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionReason::Allowed => "ALLOWED",
            DecisionReason::ScopeDenied => "SCOPE_DENIED",
            DecisionReason::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            DecisionReason::ConstraintViolation => "CONSTRAINT_VIOLATION",
            DecisionReason::UserRejected => "USER_REJECTED",
            DecisionReason::UserTimeout => "USER_TIMEOUT",
        }
    }
}

/// Verdict for one evaluated call. Built once, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionDecision {
    allowed: bool,
    reason: DecisionReason,
    can_retry: bool,
    message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    retry_after_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    rate_limit_mode: Option<OnExceeded>,
}

impl PermissionDecision {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            reason: DecisionReason::Allowed,
            can_retry: false,
            message: String::new(),
            retry_after_ms: None,
            rate_limit_mode: None,
        }
    }

    pub fn scope_denied(message: impl Into<String>) -> Self {
        Self::deny(DecisionReason::ScopeDenied, false, message)
    }

    pub fn constraint_violation(message: impl Into<String>) -> Self {
        Self::deny(DecisionReason::ConstraintViolation, false, message)
    }

    pub fn rate_limited(mode: OnExceeded, retry_after: Duration) -> Self {
        let mut decision = Self::deny(
            DecisionReason::RateLimitExceeded,
            true,
            format!("rate limit exceeded ({})", mode.as_str()),
        );
        decision.retry_after_ms = Some(duration_ms(retry_after));
        decision.rate_limit_mode = Some(mode);
        decision
    }

    pub fn user_rejected() -> Self {
        Self::deny(DecisionReason::UserRejected, true, "user rejected the operation")
    }

    pub fn user_timeout(retry_after: Duration) -> Self {
        let mut decision = Self::deny(
            DecisionReason::UserTimeout,
            true,
            "confirmation timed out",
        );
        decision.retry_after_ms = Some(duration_ms(retry_after));
        decision
    }

    fn deny(reason: DecisionReason, can_retry: bool, message: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason,
            can_retry,
            message: message.into(),
            retry_after_ms: None,
            rate_limit_mode: None,
        }
    }

    pub fn is_allowed(&self) -> bool {
        self.allowed
    }

    pub fn reason(&self) -> DecisionReason {
        self.reason
    }

    pub fn can_retry(&self) -> bool {
        self.can_retry
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn retry_after(&self) -> Option<Duration> {
        self.retry_after_ms.map(Duration::from_millis)
    }

    /// Set only for rate-limit denials; tells `block` and `error` apart.
    pub fn rate_limit_mode(&self) -> Option<OnExceeded> {
        self.rate_limit_mode
    }

    /// Normalized error for a denial; `None` when the call is allowed.
    pub fn error_info(&self) -> Option<ErrorInfo> {
        let code = self.reason.error_code()?;
        Some(ErrorInfo {
            code,
            message: self.message.clone(),
            retryable: self.can_retry,
            retry_after_ms: self.retry_after_ms,
        })
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allow_has_no_error() {
        let d = PermissionDecision::allow();
        assert!(d.is_allowed());
        assert!(d.error_info().is_none());
    }

    #[test]
    fn test_scope_denied_is_permanent() {
        let d = PermissionDecision::scope_denied("nope");
        assert!(!d.is_allowed());
        assert!(!d.can_retry());
        let info = d.error_info().unwrap();
        assert_eq!(info.code, ErrorCode::ScopeDenied);
        assert!(!info.retryable);
    }

    #[test]
    fn test_rate_limited_records_mode_and_delay() {
        let d = PermissionDecision::rate_limited(OnExceeded::Error, Duration::from_millis(1500));
        assert_eq!(d.reason(), DecisionReason::RateLimitExceeded);
        assert_eq!(d.rate_limit_mode(), Some(OnExceeded::Error));
        assert_eq!(d.retry_after(), Some(Duration::from_millis(1500)));
        assert!(d.can_retry());
    }

    #[test]
    fn test_user_outcomes_are_retryable() {
        assert!(PermissionDecision::user_rejected().can_retry());
        assert!(PermissionDecision::user_timeout(Duration::from_secs(5)).can_retry());
    }
}
