//! The bridge mediator: every widget request flows through here.
//!
//! Order per call: `invoke-requested` event, permission evaluation, optional
//! user confirmation, backend transport, then exactly one terminal event
//! (`invoked` or `error`).

use crate::confirmation::{AutoReject, ConfirmationGate, ConfirmationPresenter, ConfirmationState};
use crate::context::CallContext;
use crate::error::{InvokeFailure, RegistryError, TransportError};
use crate::metrics;
use crate::registry::WidgetRegistry;
use crate::transport::{BackendTransport, TransportRouter};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout, Instant};
use tracing::{debug, error, info, warn};
use widget_bridge_audit::{AuditBus, AuditEvent};
use widget_bridge_core::{
    Category, CategoryPermission, DecisionReason, ErrorCode, ErrorInfo, Operation, OperationKind,
    PermissionDecision, PermissionDeclaration, RequestId, WidgetId, WidgetPermissionSet,
    WidgetTimeouts,
};
use widget_bridge_policy::{PermissionEvaluator, RateLimiter, DEFAULT_MAX_QUEUE_DEPTH};

/// Successful mediated call.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub request_id: RequestId,
    pub result: Value,
    pub duration: Duration,
}

pub type Outcome = Result<Invocation, InvokeFailure>;

pub struct BridgeBuilder {
    timeouts: WidgetTimeouts,
    max_queue_depth: usize,
    audit: Option<AuditBus>,
    presenter: Option<Arc<dyn ConfirmationPresenter>>,
    transports: TransportRouter,
}

impl Default for BridgeBuilder {
    fn default() -> Self {
        Self {
            timeouts: WidgetTimeouts::default(),
            max_queue_depth: DEFAULT_MAX_QUEUE_DEPTH,
            audit: None,
            presenter: None,
            transports: TransportRouter::new(),
        }
    }
}

impl BridgeBuilder {
    pub fn timeouts(mut self, timeouts: WidgetTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn max_queue_depth(mut self, depth: usize) -> Self {
        self.max_queue_depth = depth;
        self
    }

    pub fn audit(mut self, bus: AuditBus) -> Self {
        self.audit = Some(bus);
        self
    }

    pub fn presenter(mut self, presenter: Arc<dyn ConfirmationPresenter>) -> Self {
        self.presenter = Some(presenter);
        self
    }

    pub fn transport(mut self, category: Category, transport: Arc<dyn BackendTransport>) -> Self {
        self.transports.register(category, transport);
        self
    }

    pub fn transports(mut self, router: TransportRouter) -> Self {
        self.transports = router;
        self
    }

    /// Without a presenter every confirmation is rejected.
    pub fn build(self) -> Bridge {
        let presenter = self.presenter.unwrap_or_else(|| Arc::new(AutoReject));
        let limiter = Arc::new(RateLimiter::with_max_queue_depth(self.max_queue_depth));

        Bridge {
            registry: WidgetRegistry::new(),
            evaluator: PermissionEvaluator::new(limiter),
            gate: ConfirmationGate::new(presenter, self.timeouts.confirmation()),
            transports: self.transports,
            audit: self.audit.unwrap_or_default(),
            timeouts: self.timeouts,
        }
    }
}

pub struct Bridge {
    registry: WidgetRegistry,
    evaluator: PermissionEvaluator,
    gate: ConfirmationGate,
    transports: TransportRouter,
    audit: AuditBus,
    timeouts: WidgetTimeouts,
}

impl Bridge {
    pub fn builder() -> BridgeBuilder {
        BridgeBuilder::default()
    }

    pub fn audit(&self) -> &AuditBus {
        &self.audit
    }

    pub fn confirmations(&self) -> &ConfirmationGate {
        &self.gate
    }

    pub fn timeouts(&self) -> &WidgetTimeouts {
        &self.timeouts
    }

    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        self.evaluator.limiter()
    }

    /// Validates the declaration and registers the widget.
    pub fn register_widget(
        &self,
        widget_id: WidgetId,
        declaration: &PermissionDeclaration,
    ) -> Result<Arc<WidgetPermissionSet>, RegistryError> {
        let permissions = declaration.validate()?;
        self.register_permissions(widget_id, permissions)
    }

    pub fn register_permissions(
        &self,
        widget_id: WidgetId,
        permissions: WidgetPermissionSet,
    ) -> Result<Arc<WidgetPermissionSet>, RegistryError> {
        info!(
            "Registering widget {} with {} declared categories",
            widget_id,
            permissions.len()
        );
        self.registry.register(widget_id, permissions)
    }

    /// Drops the widget's permissions and rate-limit state.
    pub fn unregister_widget(&self, widget_id: &WidgetId) -> bool {
        let removed = self.registry.unregister(widget_id);
        if removed {
            self.evaluator.limiter().forget_widget(widget_id);
            info!("Unregistered widget {}", widget_id);
        }
        removed
    }

    pub fn permissions(&self, widget_id: &WidgetId) -> Option<Arc<WidgetPermissionSet>> {
        self.registry.get(widget_id)
    }

    pub fn widgets(&self) -> Vec<WidgetId> {
        self.registry.list()
    }

    /// Replaces the permission for one category. Calls already being
    /// evaluated finish under the previous set.
    pub fn grant(
        &self,
        widget_id: &WidgetId,
        category: Category,
        permission: CategoryPermission,
    ) -> Result<(), RegistryError> {
        info!(
            "Granting {} scope '{}' to widget {}",
            category,
            permission.scope().as_str(),
            widget_id
        );
        self.registry.grant(widget_id, category, permission)?;
        Ok(())
    }

    pub fn revoke(&self, widget_id: &WidgetId, category: Category) -> Result<(), RegistryError> {
        info!("Revoking {} from widget {}", category, widget_id);
        self.registry.revoke(widget_id, category)?;
        Ok(())
    }

    pub async fn call_tool(&self, widget_id: &WidgetId, name: &str, arguments: Value) -> Outcome {
        self.invoke(widget_id, Operation::call_tool(name, arguments)).await
    }

    pub async fn read_resource(&self, widget_id: &WidgetId, uri: &str) -> Outcome {
        self.invoke(widget_id, Operation::read_resource(uri)).await
    }

    pub async fn get_prompt(&self, widget_id: &WidgetId, name: &str, arguments: Value) -> Outcome {
        self.invoke(widget_id, Operation::get_prompt(name, arguments)).await
    }

    /// Lists a category. Entries the widget may not address are removed.
    pub async fn list(&self, widget_id: &WidgetId, category: Category) -> Outcome {
        self.invoke(widget_id, Operation::list(category)).await
    }

    /// Mediates one widget request end to end.
    pub async fn invoke(&self, widget_id: &WidgetId, operation: Operation) -> Outcome {
        let request_id = RequestId::new();
        let category = operation.category;
        debug!(
            "Request {}: {} '{}' from widget {}",
            request_id,
            operation.name(),
            operation.target,
            widget_id
        );

        self.audit
            .emit(AuditEvent::invoke_requested(request_id, widget_id, &operation));

        let Some(permissions) = self.registry.get(widget_id) else {
            let decision =
                PermissionDecision::scope_denied(format!("widget '{}' is not registered", widget_id));
            return self.deny(request_id, widget_id, &operation, decision);
        };
        let permission = permissions.get(category);

        let decision = self.evaluator.evaluate(widget_id, permission, &operation).await;
        if !decision.is_allowed() {
            return self.deny(request_id, widget_id, &operation, decision);
        }

        if operation.is_confirmable() && permission.confirmation().requires(&operation.target) {
            let state = self.gate.confirm(request_id, widget_id, &operation).await;
            metrics::record_confirmation(state);
            match state {
                ConfirmationState::Approved => {}
                ConfirmationState::Rejected => {
                    return self.deny(
                        request_id,
                        widget_id,
                        &operation,
                        PermissionDecision::user_rejected(),
                    );
                }
                ConfirmationState::Expired | ConfirmationState::Pending => {
                    let decision =
                        PermissionDecision::user_timeout(self.timeouts.confirmation_retry_delay());
                    return self.deny(request_id, widget_id, &operation, decision);
                }
            }
        }
        metrics::record_decision(category, DecisionReason::Allowed);

        let limit = permission
            .constraints()
            .max_execution_time
            .unwrap_or_else(|| self.timeouts.transport(category));
        let started = Instant::now();
        let result = self
            .execute_with_protection(request_id, widget_id, &operation, limit)
            .await;
        let duration = started.elapsed();

        match result {
            Ok(value) => {
                let value = if operation.kind == OperationKind::List {
                    filter_listing(permission, value)
                } else {
                    value
                };
                self.audit.emit(AuditEvent::invoked(
                    request_id,
                    widget_id,
                    &operation,
                    value.clone(),
                    duration,
                ));
                Ok(Invocation {
                    request_id,
                    result: value,
                    duration,
                })
            }
            Err(error) => {
                warn!("Request {} failed: {}", request_id, error);
                self.audit
                    .emit(AuditEvent::error(request_id, widget_id, &operation, error.clone()));
                Err(InvokeFailure::Failed { request_id, error })
            }
        }
    }

    async fn execute_with_protection(
        &self,
        request_id: RequestId,
        widget_id: &WidgetId,
        operation: &Operation,
        limit: Duration,
    ) -> Result<Value, ErrorInfo> {
        let Some(transport) = self.transports.get(operation.category) else {
            return Err(ErrorInfo::from(&TransportError::ServerDisconnected));
        };

        let ctx = CallContext::new(request_id, widget_id.clone(), limit);
        let operation = operation.clone();
        let _timer = metrics::MetricTimer::new(operation.category);

        // Spawned so a panicking transport cannot take the caller down
        let handle = tokio::spawn(async move { transport.execute(ctx, operation).await });

        match timeout(limit, handle).await {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(err))) => Err(ErrorInfo::from(&err)),
            Ok(Err(join_err)) => {
                if join_err.is_panic() {
                    error!("Transport panicked on request {}", request_id);
                } else {
                    error!("Transport task cancelled on request {}", request_id);
                }
                Err(ErrorInfo::new(ErrorCode::ServerError, "transport failed unexpectedly"))
            }
            Err(_) => {
                warn!(
                    "Request {} timed out after {}ms",
                    request_id,
                    limit.as_millis()
                );
                Err(ErrorInfo::from(&TransportError::Timeout))
            }
        }
    }

    fn deny(
        &self,
        request_id: RequestId,
        widget_id: &WidgetId,
        operation: &Operation,
        decision: PermissionDecision,
    ) -> Outcome {
        metrics::record_decision(operation.category, decision.reason());
        if let Some(mode) = decision.rate_limit_mode() {
            metrics::record_rate_limited(operation.category, mode);
        }
        info!(
            "Request {} denied ({}): {}",
            request_id,
            decision.reason().as_str(),
            decision.message()
        );

        let error = decision.error_info().unwrap_or_else(|| {
            ErrorInfo::new(ErrorCode::ScopeDenied, decision.message().to_string())
        });
        self.audit
            .emit(AuditEvent::error(request_id, widget_id, operation, error));
        Err(InvokeFailure::Denied {
            request_id,
            decision,
        })
    }
}

/// Drops listing entries whose name or uri the permission does not admit.
///
/// Accepts a bare array or an object whose array members hold the entries,
/// e.g. `{"tools": [...], "nextCursor": "..."}`.
fn filter_listing(permission: &CategoryPermission, listing: Value) -> Value {
    match listing {
        Value::Array(items) => Value::Array(filter_items(permission, items)),
        Value::Object(mut map) => {
            for value in map.values_mut() {
                if let Value::Array(items) = value {
                    *items = filter_items(permission, std::mem::take(items));
                }
            }
            Value::Object(map)
        }
        other => other,
    }
}

fn filter_items(permission: &CategoryPermission, items: Vec<Value>) -> Vec<Value> {
    items
        .into_iter()
        .filter(|item| {
            let id = item
                .get("name")
                .or_else(|| item.get("uri"))
                .and_then(Value::as_str)
                .unwrap_or("");
            permission.admits(id)
        })
        .collect()
}
