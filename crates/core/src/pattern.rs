//! Wildcard matching used by every scope decision.
//!
//! `**` matches any sequence including `/`, `*` matches any sequence that
//! does not contain `/`, and every other character (including `.`) matches
//! itself. Matching is anchored to the whole target.

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PatternError {
    #[error("Pattern is empty")]
    Empty,

    #[error("Pattern {pattern:?} could not be compiled: {reason}")]
    Invalid { pattern: String, reason: String },
}

/// A compiled wildcard pattern.
#[derive(Debug, Clone)]
pub struct Pattern {
    source: String,
    regex: Regex,
}

impl Pattern {
    pub fn new(source: &str) -> Result<Self, PatternError> {
        if source.is_empty() {
            return Err(PatternError::Empty);
        }

        let regex = Regex::new(&translate(source)).map_err(|e| PatternError::Invalid {
            pattern: source.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            source: source.to_string(),
            regex,
        })
    }

    pub fn matches(&self, target: &str) -> bool {
        self.regex.is_match(target)
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for Pattern {}

fn translate(source: &str) -> String {
    let mut out = String::with_capacity(source.len() * 2 + 8);
    out.push_str("(?s)^");

    let mut chars = source.chars().peekable();
    let mut buf = [0u8; 4];
    while let Some(c) = chars.next() {
        if c == '*' {
            if chars.peek() == Some(&'*') {
                chars.next();
                out.push_str(".*");
            } else {
                out.push_str("[^/]*");
            }
        } else {
            out.push_str(&regex::escape(c.encode_utf8(&mut buf)));
        }
    }

    out.push('$');
    out
}

/// Ordered list of compiled patterns.
///
/// The boolean result of [`PatternSet::matches_any`] does not depend on the
/// order; the order only decides which pattern [`PatternSet::first_match`]
/// reports.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PatternSet {
    patterns: Vec<Pattern>,
}

impl PatternSet {
    pub const fn empty() -> Self {
        Self {
            patterns: Vec::new(),
        }
    }

    pub fn compile<I, S>(sources: I) -> Result<Self, PatternError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = sources
            .into_iter()
            .map(|s| Pattern::new(s.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    pub fn matches_any(&self, target: &str) -> bool {
        self.patterns.iter().any(|p| p.matches(target))
    }

    pub fn first_match(&self, target: &str) -> Option<&Pattern> {
        self.patterns.iter().find(|p| p.matches(target))
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Pattern> {
        self.patterns.iter()
    }

    pub fn sources(&self) -> Vec<String> {
        self.patterns.iter().map(|p| p.source.clone()).collect()
    }
}

impl Serialize for PatternSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.patterns.iter().map(|p| p.as_str()))
    }
}

impl<'de> Deserialize<'de> for PatternSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let sources = Vec::<String>::deserialize(deserializer)?;
        PatternSet::compile(&sources).map_err(serde::de::Error::custom)
    }
}

/// One-shot match. A pattern that fails to compile matches nothing.
pub fn matches(pattern: &str, target: &str) -> bool {
    Pattern::new(pattern).map(|p| p.matches(target)).unwrap_or(false)
}

/// One-shot set match over uncompiled patterns.
pub fn matches_any<S: AsRef<str>>(patterns: &[S], target: &str) -> bool {
    patterns.iter().any(|p| matches(p.as_ref(), target))
}
