//! Serializable permission declarations supplied at widget registration.
//!
//! A declaration is the loosely-typed shape a host receives from a widget.
//! [`PermissionDeclaration::validate`] is the single boundary where it is
//! checked and turned into an immutable [`WidgetPermissionSet`].

use crate::category::Category;
use crate::pattern::{PatternError, PatternSet};
use crate::permission::{
    CategoryPermission, ConfirmationRequirement, Constraints, InvalidRateLimit, OnExceeded,
    PermissionScope, RateLimit, WidgetPermissionSet,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeclarationError {
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("{category}: scope is required")]
    MissingScope { category: Category },

    #[error("{category}: invalid pattern: {source}")]
    InvalidPattern {
        category: Category,
        #[source]
        source: PatternError,
    },

    #[error("{category}: invalid rate limit: {source}")]
    InvalidRateLimit {
        category: Category,
        #[source]
        source: InvalidRateLimit,
    },

    #[error("{category}: invalid constraint: {reason}")]
    InvalidConstraint { category: Category, reason: String },

    #[error("{category}: invalid confirmation requirement: {reason}")]
    InvalidConfirmation { category: Category, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionDeclaration {
    pub categories: BTreeMap<Category, CategoryDeclaration>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CategoryDeclaration {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<PermissionScope>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub patterns: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<RateLimitDeclaration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraints: Option<ConstraintsDeclaration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub require_confirmation: Option<ConfirmationDeclaration>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RateLimitDeclaration {
    pub max_requests: u64,
    pub window_ms: u64,
    #[serde(default)]
    pub on_exceeded: OnExceeded,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ConstraintsDeclaration {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_execution_time_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_argument_bytes: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub disallowed_annotations: Vec<String>,
}

/// `true`/`false`, or the exact target names that need confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfirmationDeclaration {
    Flag(bool),
    Targets(Vec<String>),
}

impl PermissionDeclaration {
    pub fn from_json(input: &str) -> Result<Self, DeclarationError> {
        serde_json::from_str(input).map_err(|e| DeclarationError::Parse(e.to_string()))
    }

    pub fn from_yaml(input: &str) -> Result<Self, DeclarationError> {
        serde_yaml::from_str(input).map_err(|e| DeclarationError::Parse(e.to_string()))
    }

    pub fn with(mut self, category: Category, declaration: CategoryDeclaration) -> Self {
        self.categories.insert(category, declaration);
        self
    }

    pub fn validate(&self) -> Result<WidgetPermissionSet, DeclarationError> {
        self.categories
            .iter()
            .try_fold(WidgetPermissionSet::new(), |set, (category, decl)| {
                Ok(set.with_grant(*category, decl.validate(*category)?))
            })
    }

    /// Inverse of [`validate`](Self::validate), used to display or persist a
    /// permission set.
    pub fn from_permission_set(set: &WidgetPermissionSet) -> Self {
        let categories = set
            .iter()
            .map(|(category, perm)| (category, CategoryDeclaration::from_permission(perm)))
            .collect();
        Self { categories }
    }
}

impl CategoryDeclaration {
    pub fn scoped(scope: PermissionScope) -> Self {
        Self {
            scope: Some(scope),
            ..Self::default()
        }
    }

    pub fn validate(&self, category: Category) -> Result<CategoryPermission, DeclarationError> {
        let scope = self
            .scope
            .ok_or(DeclarationError::MissingScope { category })?;

        let patterns = match scope {
            PermissionScope::Allowlist | PermissionScope::Denylist => {
                PatternSet::compile(&self.patterns)
                    .map_err(|source| DeclarationError::InvalidPattern { category, source })?
            }
            PermissionScope::All | PermissionScope::None => {
                if !self.patterns.is_empty() {
                    warn!(
                        "{}: patterns are ignored for scope '{}'",
                        category,
                        scope.as_str()
                    );
                }
                PatternSet::empty()
            }
        };

        let mut permission = CategoryPermission::new(scope, patterns);

        if let Some(limit) = &self.rate_limit {
            permission = permission.with_rate_limit(limit.validate(category)?);
        }

        if let Some(constraints) = &self.constraints {
            permission = permission.with_constraints(constraints.validate(category)?);
        }

        if let Some(confirmation) = &self.require_confirmation {
            permission = permission.with_confirmation(confirmation.validate(category)?);
        }

        Ok(permission)
    }

    fn from_permission(perm: &CategoryPermission) -> Self {
        let constraints = perm.constraints();
        let constraints = (*constraints != Constraints::default()).then(|| ConstraintsDeclaration {
            max_execution_time_ms: constraints.max_execution_time.map(millis),
            max_argument_bytes: constraints.max_argument_bytes.map(|b| b as u64),
            disallowed_annotations: constraints.disallowed_annotations.clone(),
        });

        let require_confirmation = match perm.confirmation() {
            ConfirmationRequirement::Never => None,
            ConfirmationRequirement::Always => Some(ConfirmationDeclaration::Flag(true)),
            ConfirmationRequirement::Targets(names) => {
                Some(ConfirmationDeclaration::Targets(names.clone()))
            }
        };

        Self {
            scope: Some(perm.scope()),
            patterns: perm.patterns().sources(),
            rate_limit: perm.rate_limit().map(|limit| RateLimitDeclaration {
                max_requests: u64::from(limit.max_requests()),
                window_ms: millis(limit.window()),
                on_exceeded: limit.on_exceeded(),
            }),
            constraints,
            require_confirmation,
        }
    }
}

impl RateLimitDeclaration {
    fn validate(&self, category: Category) -> Result<RateLimit, DeclarationError> {
        let max_requests = u32::try_from(self.max_requests).map_err(|_| {
            DeclarationError::InvalidRateLimit {
                category,
                source: InvalidRateLimit::TooManyRequests(self.max_requests),
            }
        })?;

        RateLimit::new(
            max_requests,
            Duration::from_millis(self.window_ms),
            self.on_exceeded,
        )
        .map_err(|source| DeclarationError::InvalidRateLimit { category, source })
    }
}

impl ConstraintsDeclaration {
    fn validate(&self, category: Category) -> Result<Constraints, DeclarationError> {
        if self.max_execution_time_ms == Some(0) {
            return Err(DeclarationError::InvalidConstraint {
                category,
                reason: "maxExecutionTimeMs must be positive".to_string(),
            });
        }
        if self.max_argument_bytes == Some(0) {
            return Err(DeclarationError::InvalidConstraint {
                category,
                reason: "maxArgumentBytes must be positive".to_string(),
            });
        }
        if self.disallowed_annotations.iter().any(|a| a.is_empty()) {
            return Err(DeclarationError::InvalidConstraint {
                category,
                reason: "disallowedAnnotations contains an empty tag".to_string(),
            });
        }

        let max_argument_bytes = self
            .max_argument_bytes
            .map(usize::try_from)
            .transpose()
            .map_err(|_| DeclarationError::InvalidConstraint {
                category,
                reason: "maxArgumentBytes is too large".to_string(),
            })?;

        Ok(Constraints {
            max_execution_time: self.max_execution_time_ms.map(Duration::from_millis),
            max_argument_bytes,
            disallowed_annotations: self.disallowed_annotations.clone(),
        })
    }
}

impl ConfirmationDeclaration {
    fn validate(&self, category: Category) -> Result<ConfirmationRequirement, DeclarationError> {
        match self {
            ConfirmationDeclaration::Flag(false) => Ok(ConfirmationRequirement::Never),
            ConfirmationDeclaration::Flag(true) => Ok(ConfirmationRequirement::Always),
            ConfirmationDeclaration::Targets(names) => {
                if names.iter().any(|n| n.is_empty()) {
                    return Err(DeclarationError::InvalidConfirmation {
                        category,
                        reason: "target names must not be empty".to_string(),
                    });
                }
                Ok(ConfirmationRequirement::Targets(names.clone()))
            }
        }
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"{
        "tool": {
            "scope": "allowlist",
            "patterns": ["create_*", "github:**"],
            "rateLimit": {"maxRequests": 10, "windowMs": 60000, "onExceeded": "queue"},
            "constraints": {
                "maxExecutionTimeMs": 5000,
                "maxArgumentBytes": 4096,
                "disallowedAnnotations": ["destructive"]
            },
            "requireConfirmation": ["create_issue"]
        },
        "resource": {"scope": "all"},
        "cross-widget-messaging": {"scope": "none"}
    }"#;

    #[test]
    fn test_full_declaration_validates() {
        let set = PermissionDeclaration::from_json(FULL).unwrap().validate().unwrap();

        let tool = set.get(Category::Tool);
        assert_eq!(tool.scope(), PermissionScope::Allowlist);
        assert_eq!(tool.patterns().len(), 2);
        let limit = tool.rate_limit().unwrap();
        assert_eq!(limit.max_requests(), 10);
        assert_eq!(limit.window(), Duration::from_secs(60));
        assert_eq!(limit.on_exceeded(), OnExceeded::Queue);
        assert_eq!(tool.constraints().max_execution_time, Some(Duration::from_secs(5)));
        assert_eq!(tool.constraints().max_argument_bytes, Some(4096));
        assert!(tool.confirmation().requires("create_issue"));
        assert!(!tool.confirmation().requires("create_pr"));

        assert_eq!(set.get(Category::Resource).scope(), PermissionScope::All);
        assert_eq!(
            set.get(Category::CrossWidgetMessaging).scope(),
            PermissionScope::None
        );
        assert!(!set.is_declared(Category::Sampling));
    }

    #[test]
    fn test_missing_scope_rejected() {
        let err = PermissionDeclaration::from_json(r#"{"tool": {"patterns": ["a"]}}"#)
            .unwrap()
            .validate()
            .unwrap_err();
        assert_eq!(err, DeclarationError::MissingScope { category: Category::Tool });
    }

    #[test]
    fn test_unknown_category_rejected() {
        let err = PermissionDeclaration::from_json(r#"{"tools": {"scope": "all"}}"#).unwrap_err();
        assert!(matches!(err, DeclarationError::Parse(_)));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err =
            PermissionDeclaration::from_json(r#"{"tool": {"scope": "all", "extra": 1}}"#)
                .unwrap_err();
        assert!(matches!(err, DeclarationError::Parse(_)));
    }

    #[test]
    fn test_zero_rate_limit_rejected() {
        let json = r#"{"tool": {"scope": "all", "rateLimit": {"maxRequests": 0, "windowMs": 10}}}"#;
        let err = PermissionDeclaration::from_json(json)
            .unwrap()
            .validate()
            .unwrap_err();
        assert!(matches!(
            err,
            DeclarationError::InvalidRateLimit {
                source: InvalidRateLimit::ZeroRequests,
                ..
            }
        ));
    }

    #[test]
    fn test_oversized_rate_limit_rejected() {
        let json = r#"{"tool": {"scope": "all", "rateLimit": {"maxRequests": 4294967296, "windowMs": 10}}}"#;
        let err = PermissionDeclaration::from_json(json)
            .unwrap()
            .validate()
            .unwrap_err();
        assert_eq!(
            err,
            DeclarationError::InvalidRateLimit {
                category: Category::Tool,
                source: InvalidRateLimit::TooManyRequests(4_294_967_296),
            }
        );
    }

    #[test]
    fn test_empty_pattern_rejected() {
        let json = r#"{"prompt": {"scope": "denylist", "patterns": [""]}}"#;
        let err = PermissionDeclaration::from_json(json)
            .unwrap()
            .validate()
            .unwrap_err();
        assert!(matches!(err, DeclarationError::InvalidPattern { .. }));
    }

    #[test]
    fn test_patterns_ignored_for_scope_all() {
        let json = r#"{"tool": {"scope": "all", "patterns": ["only_this"]}}"#;
        let set = PermissionDeclaration::from_json(json).unwrap().validate().unwrap();
        assert!(set.get(Category::Tool).admits("anything"));
    }

    #[test]
    fn test_boolean_confirmation() {
        let json = r#"{"tool": {"scope": "all", "requireConfirmation": true}}"#;
        let set = PermissionDeclaration::from_json(json).unwrap().validate().unwrap();
        assert_eq!(
            set.get(Category::Tool).confirmation(),
            &ConfirmationRequirement::Always
        );
    }

    #[test]
    fn test_yaml_declaration() {
        let yaml = r#"
tool:
  scope: denylist
  patterns: ["delete_*"]
  rateLimit:
    maxRequests: 3
    windowMs: 1000
storage:
  scope: all
"#;
        let set = PermissionDeclaration::from_yaml(yaml).unwrap().validate().unwrap();
        assert!(!set.get(Category::Tool).admits("delete_repo"));
        assert_eq!(
            set.get(Category::Tool).rate_limit().unwrap().on_exceeded(),
            OnExceeded::Block
        );
        assert_eq!(set.get(Category::Storage).scope(), PermissionScope::All);
    }

    #[test]
    fn test_permission_set_converts_back_to_declaration() {
        let declaration = PermissionDeclaration::from_json(FULL).unwrap();
        let set = declaration.validate().unwrap();
        let back = PermissionDeclaration::from_permission_set(&set);
        assert_eq!(back.validate().unwrap(), set);
    }
}
