use crate::error::RegistryError;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use widget_bridge_core::{Category, CategoryPermission, WidgetId, WidgetPermissionSet};

/// Validated permission sets of every live widget.
///
/// Sets are immutable once published. Grants and revocations build a new set
/// and swap it in, so an evaluation in flight keeps the set it started with.
#[derive(Default)]
pub struct WidgetRegistry {
    widgets: RwLock<HashMap<WidgetId, Arc<WidgetPermissionSet>>>,
}

impl WidgetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &self,
        widget_id: WidgetId,
        permissions: WidgetPermissionSet,
    ) -> Result<Arc<WidgetPermissionSet>, RegistryError> {
        let mut widgets = self.widgets.write();
        if widgets.contains_key(&widget_id) {
            return Err(RegistryError::AlreadyRegistered(widget_id));
        }
        let permissions = Arc::new(permissions);
        widgets.insert(widget_id, Arc::clone(&permissions));
        Ok(permissions)
    }

    pub fn unregister(&self, widget_id: &WidgetId) -> bool {
        self.widgets.write().remove(widget_id).is_some()
    }

    pub fn get(&self, widget_id: &WidgetId) -> Option<Arc<WidgetPermissionSet>> {
        self.widgets.read().get(widget_id).cloned()
    }

    pub fn contains(&self, widget_id: &WidgetId) -> bool {
        self.widgets.read().contains_key(widget_id)
    }

    pub fn grant(
        &self,
        widget_id: &WidgetId,
        category: Category,
        permission: CategoryPermission,
    ) -> Result<Arc<WidgetPermissionSet>, RegistryError> {
        self.update(widget_id, |set| set.with_grant(category, permission))
    }

    pub fn revoke(
        &self,
        widget_id: &WidgetId,
        category: Category,
    ) -> Result<Arc<WidgetPermissionSet>, RegistryError> {
        self.update(widget_id, |set| set.with_revoked(category))
    }

    pub fn list(&self) -> Vec<WidgetId> {
        let mut ids: Vec<WidgetId> = self.widgets.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn count(&self) -> usize {
        self.widgets.read().len()
    }

    fn update<F>(&self, widget_id: &WidgetId, f: F) -> Result<Arc<WidgetPermissionSet>, RegistryError>
    where
        F: FnOnce(&WidgetPermissionSet) -> WidgetPermissionSet,
    {
        let mut widgets = self.widgets.write();
        let current = widgets
            .get(widget_id)
            .ok_or_else(|| RegistryError::UnknownWidget(widget_id.clone()))?;
        let next = Arc::new(f(current));
        widgets.insert(widget_id.clone(), Arc::clone(&next));
        Ok(next)
    }
}
