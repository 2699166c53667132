//! Permission-enforcing bridge between embedded widgets and a tool backend.

pub mod confirmation;
pub mod context;
pub mod error;
pub mod mediator;
pub mod metrics;
pub mod registry;
pub mod transport;

pub use confirmation::{
    AutoApprove, AutoReject, ConfirmationGate, ConfirmationPresenter, ConfirmationRequest,
    ConfirmationResponder, ConfirmationState,
};
pub use context::CallContext;
pub use error::{InvokeFailure, RegistryError, TransportError};
pub use mediator::{Bridge, BridgeBuilder, Invocation, Outcome};
pub use registry::WidgetRegistry;
pub use transport::{BackendTransport, TransportRouter};
