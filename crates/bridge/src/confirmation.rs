//! User confirmation for side-effecting tool calls.
//!
//! Every confirmation is a one-shot state machine that starts `Pending` and
//! moves exactly once to `Approved`, `Rejected` or `Expired`. Responses that
//! arrive after the first transition are ignored.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use widget_bridge_core::{Operation, RequestId, WidgetId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfirmationState {
    Pending,
    Approved,
    Rejected,
    Expired,
}

impl ConfirmationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfirmationState::Pending => "pending",
            ConfirmationState::Approved => "approved",
            ConfirmationState::Rejected => "rejected",
            ConfirmationState::Expired => "expired",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ConfirmationState::Pending)
    }
}

impl fmt::Display for ConfirmationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the user is asked to approve.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmationRequest {
    pub request_id: RequestId,
    pub widget_id: WidgetId,
    pub operation: String,
    pub target: String,
    pub arguments: Value,
    pub timeout_ms: u64,
}

impl ConfirmationRequest {
    pub fn new(request_id: RequestId, widget_id: &WidgetId, operation: &Operation, timeout: Duration) -> Self {
        Self {
            request_id,
            widget_id: widget_id.clone(),
            operation: operation.name(),
            target: operation.target.clone(),
            arguments: operation.arguments.clone(),
            timeout_ms: timeout.as_millis().try_into().unwrap_or(u64::MAX),
        }
    }
}

struct SlotState {
    state: ConfirmationState,
    notify: Option<oneshot::Sender<ConfirmationState>>,
}

struct Slot {
    inner: Mutex<SlotState>,
}

impl Slot {
    fn new(notify: oneshot::Sender<ConfirmationState>) -> Self {
        Self {
            inner: Mutex::new(SlotState {
                state: ConfirmationState::Pending,
                notify: Some(notify),
            }),
        }
    }

    /// Compare-and-set out of `Pending`. Only the winning caller notifies.
    fn resolve(&self, to: ConfirmationState) -> bool {
        let mut inner = self.inner.lock();
        if inner.state.is_terminal() || !to.is_terminal() {
            return false;
        }
        inner.state = to;
        if let Some(notify) = inner.notify.take() {
            // The waiter may already be gone
            let _ = notify.send(to);
        }
        true
    }

    fn state(&self) -> ConfirmationState {
        self.inner.lock().state
    }
}

/// Handle given to the presenter to answer one request.
///
/// Cloneable so several UI surfaces can race; the first answer wins.
#[derive(Clone)]
pub struct ConfirmationResponder {
    request_id: RequestId,
    slot: Arc<Slot>,
}

impl ConfirmationResponder {
    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Returns `false` if the request was already resolved.
    pub fn approve(&self) -> bool {
        self.respond(true)
    }

    /// Returns `false` if the request was already resolved.
    pub fn reject(&self) -> bool {
        self.respond(false)
    }

    pub fn respond(&self, approved: bool) -> bool {
        let to = if approved {
            ConfirmationState::Approved
        } else {
            ConfirmationState::Rejected
        };
        let won = self.slot.resolve(to);
        if !won {
            debug!("Ignoring late {} for confirmation {}", to, self.request_id);
        }
        won
    }

    pub fn state(&self) -> ConfirmationState {
        self.slot.state()
    }
}

impl fmt::Debug for ConfirmationResponder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfirmationResponder")
            .field("request_id", &self.request_id)
            .field("state", &self.state())
            .finish()
    }
}

/// Host UI that shows confirmation prompts.
///
/// `present` must return promptly; the answer arrives later through the
/// responder, from any thread.
pub trait ConfirmationPresenter: Send + Sync {
    fn present(&self, request: ConfirmationRequest, responder: ConfirmationResponder);
}

/// Approves every prompt. For trusted hosts and tests.
pub struct AutoApprove;

impl ConfirmationPresenter for AutoApprove {
    fn present(&self, _request: ConfirmationRequest, responder: ConfirmationResponder) {
        responder.approve();
    }
}

/// Rejects every prompt. Used when no UI is attached.
pub struct AutoReject;

impl ConfirmationPresenter for AutoReject {
    fn present(&self, _request: ConfirmationRequest, responder: ConfirmationResponder) {
        responder.reject();
    }
}

struct PendingEntry {
    request: ConfirmationRequest,
    slot: Arc<Slot>,
}

pub struct ConfirmationGate {
    presenter: Arc<dyn ConfirmationPresenter>,
    timeout: Duration,
    pending: Mutex<HashMap<RequestId, PendingEntry>>,
}

impl ConfirmationGate {
    pub fn new(presenter: Arc<dyn ConfirmationPresenter>, timeout: Duration) -> Self {
        Self {
            presenter,
            timeout,
            pending: Mutex::new(HashMap::new()),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Presents the request and waits for a terminal state.
    ///
    /// Never returns `Pending`. If the future is dropped before an answer
    /// arrives the request expires.
    pub async fn confirm(
        &self,
        request_id: RequestId,
        widget_id: &WidgetId,
        operation: &Operation,
    ) -> ConfirmationState {
        let request = ConfirmationRequest::new(request_id, widget_id, operation, self.timeout);
        let (notify, answer) = oneshot::channel();
        let slot = Arc::new(Slot::new(notify));

        self.pending.lock().insert(
            request_id,
            PendingEntry {
                request: request.clone(),
                slot: Arc::clone(&slot),
            },
        );
        let _guard = PendingGuard {
            gate: self,
            request_id,
            slot: Arc::clone(&slot),
        };

        info!(
            "Confirmation required for {} '{}' from widget {}",
            request.operation, request.target, widget_id
        );
        self.presenter.present(
            request,
            ConfirmationResponder {
                request_id,
                slot: Arc::clone(&slot),
            },
        );

        match tokio::time::timeout(self.timeout, answer).await {
            Ok(Ok(state)) => state,
            // Sender dropped without a send: fall through to expiry
            Ok(Err(_)) | Err(_) => {
                if slot.resolve(ConfirmationState::Expired) {
                    warn!(
                        "Confirmation {} expired after {}ms",
                        request_id,
                        self.timeout.as_millis()
                    );
                    ConfirmationState::Expired
                } else {
                    // An answer raced the timer and won
                    slot.state()
                }
            }
        }
    }

    /// Answers a pending request by id. Returns `false` for unknown or
    /// already resolved requests.
    pub fn resolve(&self, request_id: RequestId, approved: bool) -> bool {
        let slot = match self.pending.lock().get(&request_id) {
            Some(entry) => Arc::clone(&entry.slot),
            None => return false,
        };
        ConfirmationResponder { request_id, slot }.respond(approved)
    }

    /// Requests currently awaiting an answer.
    pub fn pending(&self) -> Vec<ConfirmationRequest> {
        self.pending
            .lock()
            .values()
            .filter(|entry| !entry.slot.state().is_terminal())
            .map(|entry| entry.request.clone())
            .collect()
    }
}

struct PendingGuard<'a> {
    gate: &'a ConfirmationGate,
    request_id: RequestId,
    slot: Arc<Slot>,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.slot.resolve(ConfirmationState::Expired);
        self.gate.pending.lock().remove(&self.request_id);
    }
}
