//! Domain generalization hierarchies.
//!
//! A hierarchy maps `(value, level)` to the value's parent at `level + 1`.
//! The CSV format stores one leaf-to-root path per line, e.g.
//!
//! ```text
//! 45000,40000-49999,*
//! 48000,40000-49999,*
//! 85000,80000-99999,*
//! ```
//!
//! Column 0 holds raw dataset values; every later column is a "generic"
//! (already-generalized) value. The ordered set of generic values feeds the
//! I-T seed filter and the interactive constraint builder.

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use thiserror::Error;

/// Error raised by hierarchy loading or lookups.
#[derive(Debug, Error)]
pub enum HierarchyError {
    /// Hierarchy file could not be read or parsed.
    #[error("cannot read hierarchy file '{path}': {source}")]
    Read {
        /// Offending file path.
        path: String,
        /// Underlying CSV/IO error.
        source: csv::Error,
    },
    /// A value being generalized has no entry at the requested level. This is
    /// a malformed-hierarchy condition: it aborts the owning bucket's
    /// anonymization, not the whole run.
    #[error("value '{value}' has no level-{level} entry in the hierarchy")]
    UnknownValue {
        /// The value with no mapping.
        value: String,
        /// Level at which the lookup failed.
        level: usize,
    },
}

/// Generalization lookup for one attribute.
pub trait Hierarchy {
    /// Parent of `value` one level above `level`, or `None` when `value` is
    /// already a root at that level. `Err` means the hierarchy has no entry
    /// for the value at all (malformed hierarchy).
    fn generalize(&self, value: &str, level: usize) -> Result<Option<String>, HierarchyError>;

    /// Height of the hierarchy: the number of generalization steps from a
    /// leaf to its root. Generalization levels never exceed this bound.
    fn height(&self) -> usize;
}

/// A hierarchy backed by a CSV file of leaf-to-root paths.
#[derive(Debug, Clone)]
pub struct CsvDgh {
    // One map per level: value at that level → parent (None for roots).
    levels: Vec<HashMap<String, Option<String>>>,
    generic_values: Vec<String>,
}

impl CsvDgh {
    /// Load a hierarchy from a CSV file.
    pub fn from_path(path: &Path) -> Result<Self, HierarchyError> {
        let file = File::open(path).map_err(|e| HierarchyError::Read {
            path: path.display().to_string(),
            source: csv::Error::from(e),
        })?;
        Self::from_reader(file).map_err(|e| match e {
            HierarchyError::Read { source, .. } => HierarchyError::Read {
                path: path.display().to_string(),
                source,
            },
            other => other,
        })
    }

    /// Load a hierarchy from any reader of CSV text.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, HierarchyError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(reader);

        let mut levels: Vec<HashMap<String, Option<String>>> = Vec::new();
        let mut generic_values: Vec<String> = Vec::new();

        for row in csv_reader.records() {
            let row = row.map_err(|e| HierarchyError::Read {
                path: String::new(),
                source: e,
            })?;
            let cells: Vec<&str> = row.iter().collect();
            for (level, cell) in cells.iter().enumerate() {
                if levels.len() <= level {
                    levels.push(HashMap::new());
                }
                let parent = cells.get(level + 1).map(|p| p.to_string());
                // First line mentioning a value at a level wins.
                levels[level]
                    .entry(cell.to_string())
                    .or_insert(parent);
                if level > 0 && !generic_values.iter().any(|v| v == cell) {
                    generic_values.push(cell.to_string());
                }
            }
        }

        Ok(Self {
            levels,
            generic_values,
        })
    }

    /// All generalized values of this hierarchy (columns ≥ 1), in first-seen
    /// order. These are the attribute's "generic" values.
    pub fn generic_values(&self) -> &[String] {
        &self.generic_values
    }
}

impl Hierarchy for CsvDgh {
    fn generalize(&self, value: &str, level: usize) -> Result<Option<String>, HierarchyError> {
        self.levels
            .get(level)
            .and_then(|m| m.get(value))
            .cloned()
            .ok_or_else(|| HierarchyError::UnknownValue {
                value: value.to_string(),
                level,
            })
    }

    fn height(&self) -> usize {
        self.levels.len().saturating_sub(1)
    }
}
