//! Seam between the bridge and the protocol client that reaches the backend.

use crate::context::CallContext;
use crate::error::TransportError;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use widget_bridge_core::{Category, Operation};

/// Executes an already-authorized operation against the backend.
///
/// Implementations own cancellation of in-flight work. The bridge stops
/// waiting once `ctx.timeout()` has elapsed but does not abort the call.
#[async_trait]
pub trait BackendTransport: Send + Sync {
    async fn execute(&self, ctx: CallContext, operation: Operation) -> Result<Value, TransportError>;
}

/// Maps each category to the transport that serves it.
#[derive(Clone, Default)]
pub struct TransportRouter {
    transports: HashMap<Category, Arc<dyn BackendTransport>>,
}

impl TransportRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, category: Category, transport: Arc<dyn BackendTransport>) -> &mut Self {
        self.transports.insert(category, transport);
        self
    }

    /// Routes every category to the same transport.
    pub fn register_all(&mut self, transport: Arc<dyn BackendTransport>) -> &mut Self {
        for category in Category::ALL {
            self.transports.insert(category, Arc::clone(&transport));
        }
        self
    }

    pub fn get(&self, category: Category) -> Option<Arc<dyn BackendTransport>> {
        self.transports.get(&category).cloned()
    }

    pub fn categories(&self) -> Vec<Category> {
        let mut categories: Vec<Category> = self.transports.keys().copied().collect();
        categories.sort();
        categories
    }

    pub fn count(&self) -> usize {
        self.transports.len()
    }
}
