//! Build matrix expansion

use serde::{Deserialize, Serialize};
use std::fmt;

/// One axis of the build matrix (e.g. `python-version: [3.7, 3.8]`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatrixAxis {
    pub name: String,
    pub values: Vec<String>,
}

impl MatrixAxis {
    pub fn new<S: Into<String>>(name: S, values: Vec<String>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }
}

/// A partial assignment of axis values; plans matching all of its pairs are dropped
pub type ExcludeRule = Vec<(String, String)>;

/// One concrete combination of axis values, executed as an isolated pipeline run
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunPlan {
    axis_values: Vec<(String, String)>,
}

impl RunPlan {
    pub fn new(axis_values: Vec<(String, String)>) -> Self {
        Self { axis_values }
    }

    /// Axis values in axis declaration order
    pub fn axis_values(&self) -> &[(String, String)] {
        &self.axis_values
    }

    /// Look up the value of an axis
    pub fn get(&self, axis: &str) -> Option<&str> {
        self.axis_values
            .iter()
            .find(|(name, _)| name == axis)
            .map(|(_, value)| value.as_str())
    }

    /// Human-readable label, e.g. `python-version=3.8`
    pub fn label(&self) -> String {
        self.axis_values
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Filesystem-safe identifier, e.g. `python-version-3-8`
    pub fn slug(&self) -> String {
        let raw = self
            .axis_values
            .iter()
            .map(|(name, value)| format!("{}-{}", name, value))
            .collect::<Vec<_>>()
            .join("-");

        let mut slug = String::with_capacity(raw.len());
        for ch in raw.chars() {
            if ch.is_ascii_alphanumeric() {
                slug.push(ch.to_ascii_lowercase());
            } else if !slug.ends_with('-') {
                slug.push('-');
            }
        }
        let slug = slug.trim_matches('-').to_string();
        if slug.is_empty() {
            "default".to_string()
        } else {
            slug
        }
    }

    fn matches(&self, rule: &ExcludeRule) -> bool {
        rule.iter()
            .all(|(axis, value)| self.get(axis) == Some(value.as_str()))
    }
}

impl fmt::Display for RunPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Expands declared axes into independent run plans
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatrixExpander {
    axes: Vec<MatrixAxis>,
    exclude: Vec<ExcludeRule>,
}

impl MatrixExpander {
    pub fn new(axes: Vec<MatrixAxis>) -> Self {
        Self {
            axes,
            exclude: Vec::new(),
        }
    }

    pub fn with_exclusions(mut self, exclude: Vec<ExcludeRule>) -> Self {
        self.exclude = exclude;
        self
    }

    pub fn axes(&self) -> &[MatrixAxis] {
        &self.axes
    }

    /// Cartesian product of all axes, in declaration order.
    ///
    /// No axes, or any axis without values, yields zero plans.
    pub fn expand(&self) -> Vec<RunPlan> {
        if self.axes.is_empty() {
            return Vec::new();
        }

        let mut combinations: Vec<Vec<(String, String)>> = vec![Vec::new()];
        for axis in &self.axes {
            let mut next = Vec::with_capacity(combinations.len() * axis.values.len());
            for combination in &combinations {
                for value in &axis.values {
                    let mut extended = combination.clone();
                    extended.push((axis.name.clone(), value.clone()));
                    next.push(extended);
                }
            }
            combinations = next;
        }

        combinations
            .into_iter()
            .map(RunPlan::new)
            .filter(|plan| !self.exclude.iter().any(|rule| plan.matches(rule)))
            .collect()
    }
}
