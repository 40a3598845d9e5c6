//! Matching ground-truth files with prediction files.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::labels::RESERVED_NAMES;

/// Filename filter applied when both inputs are directories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFilter {
    /// Required file name prefix.
    pub prefix: String,
    /// Required file name suffix.
    pub suffix: String,
}

impl Default for FileFilter {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            suffix: ".nii.gz".to_string(),
        }
    }
}

impl FileFilter {
    /// Whether `name` passes the filter.
    #[must_use]
    pub fn matches(&self, name: &str) -> bool {
        name.starts_with(&self.prefix) && name.ends_with(&self.suffix)
    }
}

/// A ground-truth volume and the prediction it is scored against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumePair {
    /// Ground-truth volume path.
    pub ground_truth: PathBuf,
    /// Prediction volume path.
    pub prediction: PathBuf,
}

impl VolumePair {
    /// Pair two paths.
    pub fn new(ground_truth: impl Into<PathBuf>, prediction: impl Into<PathBuf>) -> Self {
        Self {
            ground_truth: ground_truth.into(),
            prediction: prediction.into(),
        }
    }

    /// Report row name: the prediction's file name.
    #[must_use]
    pub fn case_name(&self) -> String {
        self.prediction
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.prediction.display().to_string())
    }
}

/// Resolve the pairs to evaluate.
///
/// Two files form a single pair. Two directories are listed (not
/// recursively), filtered with `filter`, and must contain exactly the same
/// file names; pairs come out sorted by name.
pub fn resolve_pairs(ground_truths: &Path, predictions: &Path, filter: &FileFilter) -> Result<Vec<VolumePair>> {
    let pairs = if ground_truths.is_file() && predictions.is_file() {
        vec![VolumePair::new(ground_truths, predictions)]
    } else if ground_truths.is_dir() && predictions.is_dir() {
        let gt_names = list_files(ground_truths, filter)?;
        let pred_names = list_files(predictions, filter)?;
        if gt_names != pred_names {
            let gt_only: Vec<&String> = gt_names.difference(&pred_names).collect();
            let pred_only: Vec<&String> = pred_names.difference(&gt_names).collect();
            return Err(Error::InputValidation(format!(
                "GT files not found in predictions: {:?}. Prediction files not found in GT: {:?}",
                gt_only, pred_only
            )));
        }
        gt_names
            .iter()
            .map(|name| VolumePair::new(ground_truths.join(name), predictions.join(name)))
            .collect()
    } else {
        return Err(Error::InputValidation(format!(
            "Prediction path and GT path must both be a single file or a folder: {} vs {}",
            ground_truths.display(),
            predictions.display()
        )));
    };

    validate_pairs(&pairs)?;
    Ok(pairs)
}

/// Reject empty pair lists and case names that collide with aggregate rows.
pub fn validate_pairs(pairs: &[VolumePair]) -> Result<()> {
    if pairs.is_empty() {
        return Err(Error::InputValidation("No volume pairs to evaluate".to_string()));
    }
    let mut seen = BTreeSet::new();
    for pair in pairs {
        let name = pair.case_name();
        if RESERVED_NAMES.contains(&name.as_str()) {
            return Err(Error::InputValidation(format!(
                "Prediction file name '{}' is reserved for report aggregates",
                name
            )));
        }
        if !seen.insert(name.clone()) {
            return Err(Error::InputValidation(format!("Duplicate case name '{}'", name)));
        }
    }
    Ok(())
}

fn list_files(dir: &Path, filter: &FileFilter) -> Result<BTreeSet<String>> {
    let entries = fs::read_dir(dir).map_err(|e| {
        Error::InputValidation(format!("Failed to read directory {}: {}", dir.display(), e))
    })?;

    let mut names = BTreeSet::new();
    for entry in entries {
        let entry = entry?;
        if !entry.path().is_file() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            if filter.matches(name) {
                names.insert(name.to_string());
            }
        }
    }
    Ok(names)
}
