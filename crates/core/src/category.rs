use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown category: {0}")]
pub struct UnknownCategory(pub String);

/// Axis along which widget permissions are declared independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    Tool,
    Resource,
    Prompt,
    Sampling,
    Network,
    Storage,
    CrossWidgetMessaging,
}

impl Category {
    pub const ALL: [Category; 7] = [
        Category::Tool,
        Category::Resource,
        Category::Prompt,
        Category::Sampling,
        Category::Network,
        Category::Storage,
        Category::CrossWidgetMessaging,
    ];

    /// Wire name, also the `<category>` prefix of audit event names.
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Tool => "tool",
            Category::Resource => "resource",
            Category::Prompt => "prompt",
            Category::Sampling => "sampling",
            Category::Network => "network",
            Category::Storage => "storage",
            Category::CrossWidgetMessaging => "cross-widget-messaging",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| UnknownCategory(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_names_round_trip_through_from_str() {
        for category in Category::ALL {
            assert_eq!(category.as_str().parse::<Category>().unwrap(), category);
        }
    }

    #[test]
    fn test_serde_matches_wire_name() {
        let json = serde_json::to_string(&Category::CrossWidgetMessaging).unwrap();
        assert_eq!(json, "\"cross-widget-messaging\"");
    }

    #[test]
    fn test_unknown_category() {
        let err = "tools".parse::<Category>().unwrap_err();
        assert_eq!(err, UnknownCategory("tools".to_string()));
    }
}
