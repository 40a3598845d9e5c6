//! Dataset report: per-case rows followed by the aggregate rows.
//!
//! The report serializes to JSON as a nested object and to CSV as a flat
//! table with the header `Cases,<labels...>,Mean,Weighted mean`.

use std::fmt;
use std::io::Write;
use std::path::Path;

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use serde_json::Value;

use crate::error::{Error, Result};

/// Key of the per-row mean across labels.
pub const MEAN_KEY: &str = "Mean";
/// Key of the per-row weighted mean across labels.
pub const WEIGHTED_MEAN_KEY: &str = "Weighted mean";
/// Key of the pooled-voxel aggregate row.
pub const UNION_DICE_KEY: &str = "Union dice";

/// What a report row describes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RowKind {
    /// A single evaluated pair, named after the prediction file.
    Case(String),
    /// Per-label mean across cases.
    Mean,
    /// Per-label mean across cases weighted by each case's ground-truth size.
    WeightedMean,
    /// Dice over voxels pooled from every case.
    UnionDice,
}

impl RowKind {
    /// Key used in serialized reports.
    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Self::Case(name) => name,
            Self::Mean => MEAN_KEY,
            Self::WeightedMean => WEIGHTED_MEAN_KEY,
            Self::UnionDice => UNION_DICE_KEY,
        }
    }

    /// Inverse of [`RowKind::key`].
    #[must_use]
    pub fn from_key(key: &str) -> Self {
        match key {
            MEAN_KEY => Self::Mean,
            WEIGHTED_MEAN_KEY => Self::WeightedMean,
            UNION_DICE_KEY => Self::UnionDice,
            name => Self::Case(name.to_string()),
        }
    }

    /// Whether this is an aggregate row.
    #[must_use]
    pub fn is_aggregate(&self) -> bool {
        !matches!(self, Self::Case(_))
    }
}

impl fmt::Display for RowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// One row: a score per label plus the row's own means.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportRow {
    /// Row identity.
    pub kind: RowKind,
    /// Score per label, in label order.
    pub scores: Vec<f64>,
    /// Arithmetic mean of `scores`.
    pub mean: f64,
    /// Weighted mean of `scores`.
    pub weighted_mean: f64,
}

/// Output encodings, chosen by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    /// Flat table (`.csv`).
    Csv,
    /// Nested object (`.json`).
    Json,
}

impl ReportFormat {
    /// Pick the format from the output path's extension.
    pub fn from_path(path: &Path) -> Result<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("csv") => Ok(Self::Csv),
            Some("json") => Ok(Self::Json),
            _ => Err(Error::InputValidation(format!(
                "Output path must be either .csv or .json, is {}",
                path.display()
            ))),
        }
    }
}

/// Report for a whole dataset.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DatasetReport {
    labels: Vec<String>,
    rows: Vec<ReportRow>,
}

impl DatasetReport {
    /// Create an empty report for the given label columns.
    #[must_use]
    pub fn new(labels: Vec<String>) -> Self {
        Self { labels, rows: Vec::new() }
    }

    /// Append a row.
    ///
    /// # Panics
    ///
    /// Panics if the row does not have one score per label.
    pub fn push(&mut self, row: ReportRow) {
        assert_eq!(row.scores.len(), self.labels.len(), "row {} has wrong width", row.kind);
        self.rows.push(row);
    }

    /// Label column names.
    #[must_use]
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// All rows in report order.
    #[must_use]
    pub fn rows(&self) -> &[ReportRow] {
        &self.rows
    }

    /// Per-case rows in input order.
    pub fn cases(&self) -> impl Iterator<Item = &ReportRow> {
        self.rows.iter().filter(|r| !r.kind.is_aggregate())
    }

    /// Look up a row by its serialized key.
    #[must_use]
    pub fn row(&self, key: &str) -> Option<&ReportRow> {
        self.rows.iter().find(|r| r.kind.key() == key)
    }

    /// Score of `label` in the row named `key`.
    #[must_use]
    pub fn score(&self, key: &str, label: &str) -> Option<f64> {
        let column = self.labels.iter().position(|l| l == label)?;
        self.row(key).map(|r| r.scores[column])
    }

    /// Pretty-printed JSON document.
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse a JSON document produced by [`DatasetReport::to_json_string`].
    pub fn from_json(text: &str) -> Result<Self> {
        let invalid = |msg: String| Error::InputValidation(format!("Malformed report: {}", msg));

        let Value::Object(rows) = serde_json::from_str::<Value>(text)? else {
            return Err(invalid("top level is not an object".to_string()));
        };

        let mut report: Option<Self> = None;
        for (key, value) in &rows {
            let Value::Object(entries) = value else {
                return Err(invalid(format!("row '{}' is not an object", key)));
            };
            let number = |name: &str| {
                entries
                    .get(name)
                    .and_then(Value::as_f64)
                    .ok_or_else(|| invalid(format!("row '{}' has no numeric '{}'", key, name)))
            };

            let labels: Vec<String> = entries
                .keys()
                .filter(|k| *k != MEAN_KEY && *k != WEIGHTED_MEAN_KEY)
                .cloned()
                .collect();
            let report = report.get_or_insert_with(|| Self::new(labels.clone()));
            if report.labels != labels {
                return Err(invalid(format!("row '{}' has different labels", key)));
            }

            let scores = labels.iter().map(|l| number(l)).collect::<Result<Vec<f64>>>()?;
            report.push(ReportRow {
                kind: RowKind::from_key(key),
                scores,
                mean: number(MEAN_KEY)?,
                weighted_mean: number(WEIGHTED_MEAN_KEY)?,
            });
        }

        report.ok_or_else(|| invalid("no rows".to_string()))
    }

    /// Write the flat table form.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut wtr = csv::Writer::from_writer(writer);

        let mut header = vec!["Cases"];
        header.extend(self.labels.iter().map(String::as_str));
        header.extend([MEAN_KEY, WEIGHTED_MEAN_KEY]);
        wtr.write_record(&header)?;

        for row in &self.rows {
            let mut record = vec![row.kind.key().to_string()];
            record.extend(row.scores.iter().map(|s| format!("{:?}", s)));
            record.push(format!("{:?}", row.mean));
            record.push(format!("{:?}", row.weighted_mean));
            wtr.write_record(&record)?;
        }

        wtr.flush()?;
        Ok(())
    }

    /// Write the report to `path`, choosing the format from its extension.
    pub fn write(&self, path: &Path) -> Result<()> {
        match ReportFormat::from_path(path)? {
            ReportFormat::Json => std::fs::write(path, self.to_json_string()?)?,
            ReportFormat::Csv => self.write_csv(std::fs::File::create(path)?)?,
        }
        Ok(())
    }
}

struct RowEntries<'a> {
    labels: &'a [String],
    row: &'a ReportRow,
}

impl Serialize for RowEntries<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.labels.len() + 2))?;
        for (label, score) in self.labels.iter().zip(&self.row.scores) {
            map.serialize_entry(label, score)?;
        }
        map.serialize_entry(MEAN_KEY, &self.row.mean)?;
        map.serialize_entry(WEIGHTED_MEAN_KEY, &self.row.weighted_mean)?;
        map.end()
    }
}

impl Serialize for DatasetReport {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.rows.len()))?;
        for row in &self.rows {
            map.serialize_entry(row.kind.key(), &RowEntries { labels: &self.labels, row })?;
        }
        map.end()
    }
}
