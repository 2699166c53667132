//! Widget Bridge core vocabulary.
//!
//! Leaf types shared by every other crate: categories, identifiers, the
//! wildcard pattern matcher, the validated permission model, decisions and the
//! normalized error taxonomy.

pub mod category;
pub mod declaration;
pub mod decision;
pub mod error;
pub mod ids;
pub mod operation;
pub mod pattern;
pub mod permission;
pub mod timeouts;

pub use category::{Category, UnknownCategory};
pub use declaration::{
    CategoryDeclaration, ConfirmationDeclaration, ConstraintsDeclaration, DeclarationError,
    PermissionDeclaration, RateLimitDeclaration,
};
pub use decision::{DecisionReason, PermissionDecision};
pub use error::{ErrorCode, ErrorInfo};
pub use ids::{RequestId, WidgetId};
pub use operation::{Operation, OperationKind};
pub use pattern::{matches, matches_any, Pattern, PatternError, PatternSet};
pub use permission::{
    CategoryPermission, ConfirmationRequirement, Constraints, InvalidRateLimit, OnExceeded,
    PermissionScope, RateLimit, WidgetPermissionSet,
};
pub use timeouts::WidgetTimeouts;
