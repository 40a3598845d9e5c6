//! Label dictionaries.
//!
//! A [`LabelSet`] maps label names to voxel values. Its order fixes the
//! column order of every report row.

use std::path::Path;

use serde_json::Value;

use crate::error::{Error, Result};
use crate::volume::StorageWidth;

/// Row and column names that the report reserves for aggregate values.
pub const RESERVED_NAMES: &[&str] = &["Mean", "Weighted mean", "Union dice", "Cases"];

/// A single named label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Label {
    /// Column name in the report.
    pub name: String,
    /// Voxel value that marks this label.
    pub value: i64,
}

/// Ordered mapping from label name to voxel value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelSet {
    labels: Vec<Label>,
}

impl LabelSet {
    /// Build a label set from `(name, value)` pairs.
    ///
    /// Fails on an empty set, duplicate names, or reserved names.
    pub fn new<I, S>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, i64)>,
        S: Into<String>,
    {
        let mut labels: Vec<Label> = Vec::new();
        for (name, value) in pairs {
            let name = name.into();
            if RESERVED_NAMES.contains(&name.as_str()) {
                return Err(Error::InputValidation(format!(
                    "Label name '{}' is reserved for report aggregates",
                    name
                )));
            }
            if labels.iter().any(|l| l.name == name) {
                return Err(Error::InputValidation(format!("Duplicate label name '{}'", name)));
            }
            labels.push(Label { name, value });
        }
        if labels.is_empty() {
            return Err(Error::InputValidation("Label set is empty".to_string()));
        }
        Ok(Self { labels })
    }

    /// Parse a JSON object of `name -> integer` pairs.
    ///
    /// Single quotes are accepted in place of double quotes, so shell-friendly
    /// strings like `{'lung': 1}` parse.
    pub fn from_json_str(text: &str) -> Result<Self> {
        let normalized = text.replace('\'', "\"");
        let value: Value = serde_json::from_str(&normalized)?;
        let Value::Object(map) = value else {
            return Err(Error::InputValidation(format!(
                "Indices must be a JSON object, found {}",
                text
            )));
        };

        let non_integers: Vec<String> = map
            .iter()
            .filter(|(_, v)| v.as_i64().is_none())
            .map(|(k, v)| format!("{}: {}", k, v))
            .collect();
        if !non_integers.is_empty() {
            return Err(Error::InputValidation(format!(
                "Indices must be integers, found {}",
                non_integers.join(", ")
            )));
        }

        Self::new(map.iter().filter_map(|(k, v)| v.as_i64().map(|v| (k.clone(), v))))
    }

    /// Parse a label set given either as a path to a JSON file or as inline JSON.
    pub fn parse(input: &str) -> Result<Self> {
        let path = Path::new(input);
        if path.is_file() {
            let content = std::fs::read_to_string(path)?;
            Self::from_json_str(&content)
        } else {
            Self::from_json_str(input)
        }
    }

    /// Number of labels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Whether the set has no labels. Never true for a constructed set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Iterate labels in column order.
    pub fn iter(&self) -> impl Iterator<Item = &Label> {
        self.labels.iter()
    }

    /// Label names in column order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.labels.iter().map(|l| l.name.clone()).collect()
    }

    /// Voxel values in column order.
    #[must_use]
    pub fn values(&self) -> Vec<i64> {
        self.labels.iter().map(|l| l.value).collect()
    }

    /// Narrowest storage width that can hold every label value.
    #[must_use]
    pub fn storage_width(&self) -> StorageWidth {
        let max = self.labels.iter().map(|l| l.value).max().unwrap_or(0);
        StorageWidth::for_max_label(max)
    }
}
