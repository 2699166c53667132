//! Combines scope, patterns, rate limits and constraints into one decision.

use crate::rate_limiter::{RateLimitError, RateLimitKey, RateLimiter};
use std::sync::Arc;
use tracing::debug;
use widget_bridge_core::{
    CategoryPermission, Operation, OperationKind, PermissionDecision, PermissionScope, WidgetId,
};

pub struct PermissionEvaluator {
    limiter: Arc<RateLimiter>,
}

impl PermissionEvaluator {
    pub fn new(limiter: Arc<RateLimiter>) -> Self {
        Self { limiter }
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Stateless scope and pattern check. Returns the denial, if any.
    ///
    /// Listings carry no target; they only need the category to be open.
    /// The mediator filters listing results through the pattern policy.
    pub fn check_scope(
        permission: &CategoryPermission,
        operation: &Operation,
    ) -> Option<PermissionDecision> {
        if permission.scope() == PermissionScope::None {
            return Some(PermissionDecision::scope_denied(format!(
                "{} operations are not permitted",
                operation.category
            )));
        }

        if operation.kind == OperationKind::List || permission.admits(&operation.target) {
            return None;
        }

        let message = match permission.scope() {
            PermissionScope::Denylist => {
                let pattern = permission
                    .patterns()
                    .first_match(&operation.target)
                    .map(|p| p.as_str().to_string())
                    .unwrap_or_default();
                format!(
                    "{} '{}' is denied by pattern '{}'",
                    operation.category, operation.target, pattern
                )
            }
            _ => format!(
                "{} '{}' is not in the allowlist",
                operation.category, operation.target
            ),
        };
        Some(PermissionDecision::scope_denied(message))
    }

    /// Full decision for one call.
    ///
    /// Scope and patterns are checked before the rate limit so a forbidden
    /// call never consumes quota. Calls with a `queue` limit may suspend here
    /// until the next window opens.
    pub async fn evaluate(
        &self,
        widget_id: &WidgetId,
        permission: &CategoryPermission,
        operation: &Operation,
    ) -> PermissionDecision {
        if let Some(denied) = Self::check_scope(permission, operation) {
            debug!("{} {}: {}", widget_id, operation.name(), denied.message());
            return denied;
        }

        if let Some(limit) = permission.rate_limit() {
            let key = RateLimitKey::new(widget_id.clone(), operation.category);
            match self.limiter.acquire(&key, limit).await {
                Ok(admission) if !admission.waited.is_zero() => {
                    debug!("{} admitted after queueing {:?}", key, admission.waited);
                }
                Ok(_) => {}
                Err(err) => {
                    debug!("{}", err);
                    return rate_limited(&err);
                }
            }
        }

        if let Some(violation) = permission.constraints().violation(operation) {
            return PermissionDecision::constraint_violation(violation);
        }

        PermissionDecision::allow()
    }
}

fn rate_limited(err: &RateLimitError) -> PermissionDecision {
    PermissionDecision::rate_limited(err.mode(), err.retry_after())
}
