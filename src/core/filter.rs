//! Tag-based test selection

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    #[error("invalid test tag '{0}': tags must be identifiers")]
    InvalidTag(String),

    #[error("unsupported marker expression '{0}': only `not <tag>` terms joined by `and` are supported")]
    Unsupported(String),
}

fn tag_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("static regex"))
}

/// Deselects tests carrying any of the excluded tags
///
/// Excluded tests are never run and never counted as failures.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestFilter {
    exclude_tags: Vec<String>,
}

impl TestFilter {
    pub fn excluding<I, S>(tags: I) -> Result<Self, FilterError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut exclude_tags: Vec<String> = Vec::new();
        for tag in tags {
            let tag = tag.into();
            if !tag_pattern().is_match(&tag) {
                return Err(FilterError::InvalidTag(tag));
            }
            if !exclude_tags.contains(&tag) {
                exclude_tags.push(tag);
            }
        }
        Ok(Self { exclude_tags })
    }

    /// Parse a marker expression such as `not bug and not slow`
    pub fn parse(expression: &str) -> Result<Self, FilterError> {
        let expression = expression.trim();
        if expression.is_empty() {
            return Ok(Self::default());
        }

        let mut tags = Vec::new();
        for term in expression.split(" and ") {
            let tag = term
                .trim()
                .strip_prefix("not ")
                .map(str::trim)
                .ok_or_else(|| FilterError::Unsupported(expression.to_string()))?;
            tags.push(tag.to_string());
        }

        Self::excluding(tags).map_err(|_| FilterError::Unsupported(expression.to_string()))
    }

    pub fn exclude_tags(&self) -> &[String] {
        &self.exclude_tags
    }

    /// Render as a test-runner marker expression; `None` selects everything
    pub fn marker_expression(&self) -> Option<String> {
        if self.exclude_tags.is_empty() {
            return None;
        }
        Some(
            self.exclude_tags
                .iter()
                .map(|tag| format!("not {}", tag))
                .collect::<Vec<_>>()
                .join(" and "),
        )
    }

    /// Whether a test with the given tags would run
    pub fn selects<S: AsRef<str>>(&self, tags: &[S]) -> bool {
        !tags
            .iter()
            .any(|tag| self.exclude_tags.iter().any(|ex| ex == tag.as_ref()))
    }
}
