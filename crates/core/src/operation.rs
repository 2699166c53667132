use crate::category::Category;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// What a widget asks the backend to do within a category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperationKind {
    /// Side-effecting invocation (tool call, sampling request, message send).
    Call,
    /// Read of a single named item (resource read, prompt fetch).
    Read,
    /// Enumeration of the items available in the category.
    List,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Call => "call",
            OperationKind::Read => "read",
            OperationKind::List => "list",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single operation requested by a widget.
///
/// `target` is the tool name, resource URI, prompt name, and so on. Listing
/// operations have an empty target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub category: Category,
    pub kind: OperationKind,
    pub target: String,
    #[serde(default)]
    pub arguments: Value,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub annotations: Vec<String>,
}

impl Operation {
    pub fn new(category: Category, kind: OperationKind, target: impl Into<String>) -> Self {
        Self {
            category,
            kind,
            target: target.into(),
            arguments: Value::Null,
            annotations: Vec::new(),
        }
    }

    pub fn call_tool(name: impl Into<String>, arguments: Value) -> Self {
        Self::new(Category::Tool, OperationKind::Call, name).with_arguments(arguments)
    }

    pub fn read_resource(uri: impl Into<String>) -> Self {
        Self::new(Category::Resource, OperationKind::Read, uri)
    }

    pub fn get_prompt(name: impl Into<String>, arguments: Value) -> Self {
        Self::new(Category::Prompt, OperationKind::Read, name).with_arguments(arguments)
    }

    pub fn list(category: Category) -> Self {
        Self::new(category, OperationKind::List, "")
    }

    pub fn with_arguments(mut self, arguments: Value) -> Self {
        self.arguments = arguments;
        self
    }

    pub fn with_annotations<I, S>(mut self, annotations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.annotations = annotations.into_iter().map(Into::into).collect();
        self
    }

    /// Display name such as `tool/call`.
    pub fn name(&self) -> String {
        format!("{}/{}", self.category, self.kind)
    }

    /// Only tool invocations are ever confirmation-gated; reads and listings
    /// in every category are exempt.
    pub fn is_confirmable(&self) -> bool {
        self.category == Category::Tool && self.kind == OperationKind::Call
    }

    /// Serialized size of the arguments in bytes.
    pub fn argument_bytes(&self) -> usize {
        match &self.arguments {
            Value::Null => 0,
            other => serde_json::to_vec(other).map(|v| v.len()).unwrap_or(usize::MAX),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_only_tool_calls_are_confirmable() {
        assert!(Operation::call_tool("create_issue", json!({})).is_confirmable());
        assert!(!Operation::list(Category::Tool).is_confirmable());
        assert!(!Operation::read_resource("file:///a").is_confirmable());
        assert!(!Operation::new(Category::Sampling, OperationKind::Call, "model").is_confirmable());
    }

    #[test]
    fn test_name() {
        assert_eq!(Operation::read_resource("x").name(), "resource/read");
    }

    #[test]
    fn test_argument_bytes() {
        assert_eq!(Operation::read_resource("x").argument_bytes(), 0);
        let op = Operation::call_tool("t", json!({"a": 1}));
        assert_eq!(op.argument_bytes(), r#"{"a":1}"#.len());
    }
}
