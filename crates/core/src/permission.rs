//! Validated, immutable permission model.
//!
//! Values here are only built through [`crate::declaration`] or the typed
//! constructors below, so every invariant (positive rate limits, compiled
//! patterns) holds for the lifetime of the value.

use crate::category::Category;
use crate::operation::Operation;
use crate::pattern::{PatternError, PatternSet};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionScope {
    All,
    Allowlist,
    Denylist,
    None,
}

impl PermissionScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionScope::All => "all",
            PermissionScope::Allowlist => "allowlist",
            PermissionScope::Denylist => "denylist",
            PermissionScope::None => "none",
        }
    }
}

/// Caller-visible behavior once a rate limit window is exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnExceeded {
    #[default]
    Block,
    Queue,
    Error,
}

impl OnExceeded {
    pub fn as_str(&self) -> &'static str {
        match self {
            OnExceeded::Block => "block",
            OnExceeded::Queue => "queue",
            OnExceeded::Error => "error",
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvalidRateLimit {
    #[error("maxRequests must be a positive integer")]
    ZeroRequests,

    #[error("windowMs must be a positive integer")]
    ZeroWindow,

    #[error("maxRequests {0} exceeds the largest supported limit")]
    TooManyRequests(u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    max_requests: u32,
    window: Duration,
    on_exceeded: OnExceeded,
}

impl RateLimit {
    pub fn new(
        max_requests: u32,
        window: Duration,
        on_exceeded: OnExceeded,
    ) -> Result<Self, InvalidRateLimit> {
        if max_requests == 0 {
            return Err(InvalidRateLimit::ZeroRequests);
        }
        if window.is_zero() {
            return Err(InvalidRateLimit::ZeroWindow);
        }
        Ok(Self {
            max_requests,
            window,
            on_exceeded,
        })
    }

    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn on_exceeded(&self) -> OnExceeded {
        self.on_exceeded
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Constraints {
    pub max_execution_time: Option<Duration>,
    pub max_argument_bytes: Option<usize>,
    pub disallowed_annotations: Vec<String>,
}

impl Constraints {
    pub const fn none() -> Self {
        Self {
            max_execution_time: None,
            max_argument_bytes: None,
            disallowed_annotations: Vec::new(),
        }
    }

    /// Describes the first constraint the operation breaks, if any.
    pub fn violation(&self, operation: &Operation) -> Option<String> {
        if let Some(tag) = operation
            .annotations
            .iter()
            .find(|tag| self.disallowed_annotations.contains(tag))
        {
            return Some(format!("annotation '{}' is not allowed", tag));
        }

        if let Some(max) = self.max_argument_bytes {
            let size = operation.argument_bytes();
            if size > max {
                return Some(format!(
                    "arguments are {} bytes, limit is {} bytes",
                    size, max
                ));
            }
        }

        None
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConfirmationRequirement {
    #[default]
    Never,
    Always,
    /// Exact target names that need confirmation.
    Targets(Vec<String>),
}

impl ConfirmationRequirement {
    pub fn requires(&self, target: &str) -> bool {
        match self {
            ConfirmationRequirement::Never => false,
            ConfirmationRequirement::Always => true,
            ConfirmationRequirement::Targets(names) => names.iter().any(|n| n == target),
        }
    }
}

static DENIED: CategoryPermission = CategoryPermission {
    scope: PermissionScope::None,
    patterns: PatternSet::empty(),
    rate_limit: None,
    constraints: Constraints::none(),
    confirmation: ConfirmationRequirement::Never,
};

/// Permission for one category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryPermission {
    scope: PermissionScope,
    patterns: PatternSet,
    rate_limit: Option<RateLimit>,
    constraints: Constraints,
    confirmation: ConfirmationRequirement,
}

impl CategoryPermission {
    pub fn new(scope: PermissionScope, patterns: PatternSet) -> Self {
        Self {
            scope,
            patterns,
            rate_limit: None,
            constraints: Constraints::default(),
            confirmation: ConfirmationRequirement::Never,
        }
    }

    pub fn all() -> Self {
        Self::new(PermissionScope::All, PatternSet::empty())
    }

    pub fn none() -> Self {
        DENIED.clone()
    }

    pub fn allowlist<I, S>(patterns: I) -> Result<Self, PatternError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Ok(Self::new(PermissionScope::Allowlist, PatternSet::compile(patterns)?))
    }

    pub fn denylist<I, S>(patterns: I) -> Result<Self, PatternError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Ok(Self::new(PermissionScope::Denylist, PatternSet::compile(patterns)?))
    }

    pub fn with_rate_limit(mut self, rate_limit: RateLimit) -> Self {
        self.rate_limit = Some(rate_limit);
        self
    }

    pub fn with_constraints(mut self, constraints: Constraints) -> Self {
        self.constraints = constraints;
        self
    }

    pub fn with_confirmation(mut self, confirmation: ConfirmationRequirement) -> Self {
        self.confirmation = confirmation;
        self
    }

    pub fn scope(&self) -> PermissionScope {
        self.scope
    }

    pub fn patterns(&self) -> &PatternSet {
        &self.patterns
    }

    pub fn rate_limit(&self) -> Option<&RateLimit> {
        self.rate_limit.as_ref()
    }

    pub fn constraints(&self) -> &Constraints {
        &self.constraints
    }

    pub fn confirmation(&self) -> &ConfirmationRequirement {
        &self.confirmation
    }

    /// Scope and pattern check. Patterns are only consulted for allowlist and
    /// denylist scopes.
    pub fn admits(&self, target: &str) -> bool {
        match self.scope {
            PermissionScope::None => false,
            PermissionScope::All => true,
            PermissionScope::Allowlist => self.patterns.matches_any(target),
            PermissionScope::Denylist => !self.patterns.matches_any(target),
        }
    }
}

/// Per-widget permission contract.
///
/// Categories that were never declared resolve to a scope-`none` permission.
/// The set is immutable; grants and revocations build a new set.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WidgetPermissionSet {
    categories: BTreeMap<Category, Arc<CategoryPermission>>,
}

impl WidgetPermissionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, category: Category) -> &CategoryPermission {
        self.categories
            .get(&category)
            .map(|p| p.as_ref())
            .unwrap_or(&DENIED)
    }

    pub fn is_declared(&self, category: Category) -> bool {
        self.categories.contains_key(&category)
    }

    pub fn with_grant(&self, category: Category, permission: CategoryPermission) -> Self {
        let mut categories = self.categories.clone();
        categories.insert(category, Arc::new(permission));
        Self { categories }
    }

    pub fn with_revoked(&self, category: Category) -> Self {
        let mut categories = self.categories.clone();
        categories.remove(&category);
        Self { categories }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Category, &CategoryPermission)> {
        self.categories.iter().map(|(c, p)| (*c, p.as_ref()))
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_none_scope_ignores_patterns() {
        let perm = CategoryPermission::new(
            PermissionScope::None,
            PatternSet::compile(["**"]).unwrap(),
        );
        assert!(!perm.admits("anything"));
    }

    #[test]
    fn test_all_scope_ignores_patterns() {
        let perm = CategoryPermission::new(
            PermissionScope::All,
            PatternSet::compile(["only_this"]).unwrap(),
        );
        assert!(perm.admits("something_else"));
    }

    #[test]
    fn test_empty_allowlist_denies_everything() {
        let perm = CategoryPermission::allowlist(Vec::<String>::new()).unwrap();
        assert!(!perm.admits("read_file"));
    }

    #[test]
    fn test_empty_denylist_allows_everything() {
        let perm = CategoryPermission::denylist(Vec::<String>::new()).unwrap();
        assert!(perm.admits("read_file"));
    }

    #[test]
    fn test_denylist_blocks_matches() {
        let perm = CategoryPermission::denylist(["delete_*"]).unwrap();
        assert!(!perm.admits("delete_repo"));
        assert!(perm.admits("create_repo"));
    }

    #[test]
    fn test_rate_limit_rejects_zero_values() {
        assert_eq!(
            RateLimit::new(0, Duration::from_secs(1), OnExceeded::Block).unwrap_err(),
            InvalidRateLimit::ZeroRequests
        );
        assert_eq!(
            RateLimit::new(1, Duration::ZERO, OnExceeded::Block).unwrap_err(),
            InvalidRateLimit::ZeroWindow
        );
    }

    #[test]
    fn test_confirmation_targets_are_exact() {
        let req = ConfirmationRequirement::Targets(vec!["delete_repo".to_string()]);
        assert!(req.requires("delete_repo"));
        assert!(!req.requires("delete_repo_2"));
        assert!(ConfirmationRequirement::Always.requires("x"));
        assert!(!ConfirmationRequirement::Never.requires("x"));
    }

    #[test]
    fn test_constraint_annotation_violation() {
        let constraints = Constraints {
            disallowed_annotations: vec!["destructive".to_string()],
            ..Constraints::default()
        };
        let op = Operation::call_tool("drop_table", json!({})).with_annotations(["destructive"]);
        assert!(constraints.violation(&op).is_some());

        let ok = Operation::call_tool("select", json!({})).with_annotations(["read-only"]);
        assert!(constraints.violation(&ok).is_none());
    }

    #[test]
    fn test_constraint_argument_size() {
        let constraints = Constraints {
            max_argument_bytes: Some(8),
            ..Constraints::default()
        };
        let big = Operation::call_tool("t", json!({"payload": "0123456789"}));
        assert!(constraints.violation(&big).is_some());
        let small = Operation::call_tool("t", json!({}));
        assert!(constraints.violation(&small).is_none());
    }

    #[test]
    fn test_undeclared_category_is_denied() {
        let set = WidgetPermissionSet::new().with_grant(Category::Tool, CategoryPermission::all());
        assert_eq!(set.get(Category::Resource).scope(), PermissionScope::None);
        assert!(!set.is_declared(Category::Resource));
    }

    #[test]
    fn test_grant_and_revoke_leave_original_untouched() {
        let original = WidgetPermissionSet::new();
        let granted = original.with_grant(Category::Tool, CategoryPermission::all());
        assert!(original.is_empty());
        assert_eq!(granted.get(Category::Tool).scope(), PermissionScope::All);

        let revoked = granted.with_revoked(Category::Tool);
        assert_eq!(revoked.get(Category::Tool).scope(), PermissionScope::None);
        assert_eq!(granted.get(Category::Tool).scope(), PermissionScope::All);
    }
}
