//! `widget-bridge check <manifest>`: validate a permission declaration offline.

use anyhow::{Context, Result};
use std::path::Path;
use widget_bridge_core::{
    Category, CategoryPermission, ConfirmationRequirement, PermissionDeclaration, PermissionScope,
    WidgetPermissionSet,
};

/// Parses JSON, or YAML for `.yaml`/`.yml` files.
pub fn load_manifest(path: &Path) -> Result<PermissionDeclaration> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let is_yaml = matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    );
    let declaration = if is_yaml {
        PermissionDeclaration::from_yaml(&content)
    } else {
        PermissionDeclaration::from_json(&content)
    };
    declaration.with_context(|| format!("Failed to parse {}", path.display()))
}

pub fn check(path: &Path) -> Result<WidgetPermissionSet> {
    let declaration = load_manifest(path)?;
    let set = declaration
        .validate()
        .with_context(|| format!("Invalid declaration in {}", path.display()))?;
    Ok(set)
}

/// One line per category, undeclared ones included.
pub fn summarize(set: &WidgetPermissionSet) -> Vec<String> {
    Category::ALL
        .iter()
        .map(|&category| {
            if set.is_declared(category) {
                format!("{}: {}", category, describe(set.get(category)))
            } else {
                format!("{}: none (undeclared)", category)
            }
        })
        .collect()
}

fn describe(permission: &CategoryPermission) -> String {
    let mut parts = vec![permission.scope().as_str().to_string()];

    if matches!(
        permission.scope(),
        PermissionScope::Allowlist | PermissionScope::Denylist
    ) {
        parts.push(format!("[{}]", permission.patterns().sources().join(", ")));
    }

    if let Some(limit) = permission.rate_limit() {
        parts.push(format!(
            "rate {}/{}ms {}",
            limit.max_requests(),
            limit.window().as_millis(),
            limit.on_exceeded().as_str()
        ));
    }

    let constraints = permission.constraints();
    if let Some(limit) = constraints.max_execution_time {
        parts.push(format!("max-time {}ms", limit.as_millis()));
    }
    if let Some(bytes) = constraints.max_argument_bytes {
        parts.push(format!("max-args {}B", bytes));
    }
    if !constraints.disallowed_annotations.is_empty() {
        parts.push(format!(
            "deny-annotations [{}]",
            constraints.disallowed_annotations.join(", ")
        ));
    }

    match permission.confirmation() {
        ConfirmationRequirement::Never => {}
        ConfirmationRequirement::Always => parts.push("confirm all".to_string()),
        ConfirmationRequirement::Targets(names) => {
            parts.push(format!("confirm [{}]", names.join(", ")))
        }
    }

    parts.join(" ")
}

pub fn run(path: &Path) -> Result<()> {
    let set = check(path)?;
    println!("✓ {} is valid", path.display());
    for line in summarize(&set) {
        println!("  {}", line);
    }
    Ok(())
}
