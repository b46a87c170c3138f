//! Tabular dataset reading and release-set writing.
//!
//! The header row defines attribute names and order; every following row is
//! one record. Column types are decided by the first data row: a column
//! whose first value is neither an integer nor a real is string-valued, and
//! its value domain is collected in the same pass.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use thiserror::Error;

use crate::domain::StringDomains;
use crate::types::{Record, Schema, Value};

/// Error raised by dataset IO. All variants are structural.
#[derive(Debug, Error)]
pub enum DatasetError {
    /// Input could not be read or parsed.
    #[error("cannot read dataset '{path}': {source}")]
    Read {
        /// Offending file path (or label for in-memory sources).
        path: String,
        /// Underlying CSV/IO error.
        source: csv::Error,
    },
    /// The input has no header row.
    #[error("dataset '{path}' has no header row")]
    Empty {
        /// Offending file path.
        path: String,
    },
    /// Output could not be written.
    #[error("cannot write release dataset '{path}': {source}")]
    Write {
        /// Offending file path.
        path: String,
        /// Underlying CSV/IO error.
        source: csv::Error,
    },
}

/// A loaded dataset: schema, typed records, and discovered string domains.
#[derive(Debug, Clone)]
pub struct Dataset {
    /// The header.
    pub schema: Schema,
    /// All records in file order.
    pub records: Vec<Record>,
    /// Value domains of the string-valued attributes.
    pub domains: StringDomains,
}

impl Dataset {
    /// Read a dataset from a CSV file.
    pub fn from_path(path: &Path) -> Result<Self, DatasetError> {
        let label = path.display().to_string();
        let file = File::open(path).map_err(|e| DatasetError::Read {
            path: label.clone(),
            source: csv::Error::from(e),
        })?;
        Self::from_reader(file, &label)
    }

    /// Read a dataset from any CSV reader. `label` names the source in
    /// errors.
    pub fn from_reader<R: Read>(reader: R, label: &str) -> Result<Self, DatasetError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(reader);

        let headers = csv_reader
            .headers()
            .map_err(|source| DatasetError::Read {
                path: label.to_string(),
                source,
            })?
            .clone();
        if headers.is_empty() {
            return Err(DatasetError::Empty {
                path: label.to_string(),
            });
        }
        let schema = Schema::new(headers.iter().map(str::to_string).collect());

        let mut records = Vec::new();
        let mut domains = StringDomains::new();
        // Columns found string-valued in the first data row.
        let mut string_columns: Vec<usize> = Vec::new();

        for (row_idx, row) in csv_reader.records().enumerate() {
            let row = row.map_err(|source| DatasetError::Read {
                path: label.to_string(),
                source,
            })?;
            let values: Vec<Value> = row.iter().map(Value::parse).collect();

            if row_idx == 0 {
                for (i, value) in values.iter().enumerate() {
                    if value.is_str() {
                        string_columns.push(i);
                    }
                }
            }
            for &i in &string_columns {
                domains.observe(&schema.names()[i], &values[i].to_string());
            }

            records.push(Record::new(values));
        }

        Ok(Self {
            schema,
            records,
            domains,
        })
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the dataset has no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Write the release dataset: the input header, then one row per release
/// record in processing order.
pub fn write_release(
    path: &Path,
    schema: &Schema,
    records: &[Record],
) -> Result<(), DatasetError> {
    let label = path.display().to_string();
    let file = File::create(path).map_err(|e| DatasetError::Write {
        path: label.clone(),
        source: csv::Error::from(e),
    })?;
    write_release_to(file, schema, records).map_err(|source| DatasetError::Write {
        path: label,
        source,
    })
}

/// Write the release dataset to any writer.
pub fn write_release_to<W: Write>(
    writer: W,
    schema: &Schema,
    records: &[Record],
) -> Result<(), csv::Error> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record(schema.names())?;
    for record in records {
        csv_writer.write_record(record.values().iter().map(|v| v.to_string()))?;
    }
    csv_writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &str = "\
age,zip_code,disease
30,45000,Cancer
35,48000,Cancer
50,85000,Alzheimer's disease
";

    #[test]
    fn header_defines_schema_and_rows_are_typed() {
        let d = Dataset::from_reader(TABLE.as_bytes(), "test").unwrap();
        assert_eq!(d.schema.names(), &["age", "zip_code", "disease"]);
        assert_eq!(d.len(), 3);
        assert_eq!(d.records[0].value_at(0), &Value::Int(30));
        assert_eq!(d.records[2].value_at(2), &Value::from("Alzheimer's disease"));
    }

    #[test]
    fn string_domains_are_collected_in_one_pass() {
        let d = Dataset::from_reader(TABLE.as_bytes(), "test").unwrap();
        assert!(d.domains.is_string("disease"));
        assert!(!d.domains.is_string("age"));
        assert_eq!(d.domains.index_of("disease", "Cancer"), Some(0));
        assert_eq!(
            d.domains.index_of("disease", "Alzheimer's disease"),
            Some(1)
        );
        assert_eq!(d.domains.size("disease"), Some(2));
    }

    #[test]
    fn release_roundtrip_preserves_header_and_order() {
        let d = Dataset::from_reader(TABLE.as_bytes(), "test").unwrap();
        let mut out = Vec::new();
        write_release_to(&mut out, &d.schema, &d.records).unwrap();
        let text = String::from_utf8(out).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("age,zip_code,disease"));
        assert_eq!(lines.next(), Some("30,45000,Cancer"));
    }

    #[test]
    fn missing_file_reports_its_path() {
        let err = Dataset::from_path(Path::new("/nonexistent/input.csv")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/input.csv"));
    }
}
