//! CSV ingestion for the two studies.
//!
//! Loading is strict: a missing required column, a ragged row, an empty or
//! non-numeric field in a numeric column are all fatal.

use crate::config::{CorruptionColumns, GrowthColumns};
use crate::table::{TableError, WorkingTable};
use csv::{ReaderBuilder, StringRecord};
use ndarray::Array1;
use std::io::Read;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DataError {
    #[error("failed to open csv '{path}': {source}")]
    Open {
        path: String,
        #[source]
        source: csv::Error,
    },

    #[error("failed to read csv headers: {0}")]
    Headers(#[source] csv::Error),

    #[error("failed reading csv row {row}: {source}")]
    Row {
        row: usize,
        #[source]
        source: csv::Error,
    },

    #[error("csv has no headers")]
    NoHeaders,

    #[error("csv has no rows")]
    NoRows,

    #[error("required column '{0}' not found in csv header")]
    MissingColumn(String),

    #[error("csv row width mismatch at row {row}: got {found} fields, expected {expected}")]
    RowWidth {
        row: usize,
        found: usize,
        expected: usize,
    },

    #[error("empty field at row {row}, column '{column}'")]
    EmptyField { row: usize, column: String },

    #[error("non-numeric value '{value}' at row {row}, column '{column}'")]
    NotNumeric {
        row: usize,
        column: String,
        value: String,
    },

    #[error("non-finite value at row {row}, column '{column}'")]
    NonFinite { row: usize, column: String },

    #[error("value {value} at row {row}, column '{column}' is outside [{min}, {max}]")]
    OutOfRange {
        row: usize,
        column: String,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("unknown category '{value}' at row {row}, column '{column}'")]
    UnknownCategory {
        row: usize,
        column: String,
        value: String,
    },

    #[error(transparent)]
    Table(#[from] TableError),
}

/// Raw CSV contents with trimmed headers.
#[derive(Debug, Clone)]
pub struct RawCsv {
    pub headers: Vec<String>,
    pub records: Vec<StringRecord>,
}

impl RawCsv {
    fn column_index(&self, name: &str) -> Result<usize, DataError> {
        self.headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| DataError::MissingColumn(name.to_string()))
    }

    fn field<'a>(&'a self, row: usize, col: usize) -> Result<&'a str, DataError> {
        let raw = self.records[row].get(col).unwrap_or_default().trim();
        if raw.is_empty() {
            return Err(DataError::EmptyField {
                row: row + 1,
                column: self.headers[col].clone(),
            });
        }
        Ok(raw)
    }

    pub fn numeric_column(&self, name: &str) -> Result<Array1<f64>, DataError> {
        let col = self.column_index(name)?;
        let mut out = Array1::<f64>::zeros(self.records.len());
        for row in 0..self.records.len() {
            let raw = self.field(row, col)?;
            let value = raw.parse::<f64>().map_err(|_| DataError::NotNumeric {
                row: row + 1,
                column: name.to_string(),
                value: raw.to_string(),
            })?;
            if !value.is_finite() {
                return Err(DataError::NonFinite {
                    row: row + 1,
                    column: name.to_string(),
                });
            }
            out[row] = value;
        }
        Ok(out)
    }

    pub fn categorical_column(&self, name: &str) -> Result<Vec<String>, DataError> {
        let col = self.column_index(name)?;
        (0..self.records.len())
            .map(|row| self.field(row, col).map(str::to_string))
            .collect()
    }
}

pub fn read_csv<R: Read>(reader: R) -> Result<RawCsv, DataError> {
    let mut rdr = ReaderBuilder::new().has_headers(true).from_reader(reader);
    collect_records(&mut rdr)
}

pub fn read_csv_path(path: &Path) -> Result<RawCsv, DataError> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .map_err(|source| DataError::Open {
            path: path.display().to_string(),
            source,
        })?;
    collect_records(&mut rdr)
}

fn collect_records<R: Read>(rdr: &mut csv::Reader<R>) -> Result<RawCsv, DataError> {
    let headers = rdr
        .headers()
        .map_err(DataError::Headers)?
        .iter()
        .map(|s| s.trim().trim_start_matches('\u{feff}').to_string())
        .collect::<Vec<_>>();

    if headers.is_empty() || headers.iter().all(|h| h.is_empty()) {
        return Err(DataError::NoHeaders);
    }

    let mut records = Vec::<StringRecord>::new();
    for (i, rec) in rdr.records().enumerate() {
        let record = rec.map_err(|source| DataError::Row { row: i + 1, source })?;
        if record.len() != headers.len() {
            return Err(DataError::RowWidth {
                row: i + 1,
                found: record.len(),
                expected: headers.len(),
            });
        }
        records.push(record);
    }

    if records.is_empty() {
        return Err(DataError::NoRows);
    }

    Ok(RawCsv { headers, records })
}

/// Lowest and highest admissible perception-index values.
pub const CPI_RANGE: (f64, f64) = (0.0, 10.0);

/// Builds the corruption table: `country` and `region` as categorical
/// columns, the index as numeric. When `known_regions` is non-empty every
/// region label must belong to it.
pub fn corruption_table(
    raw: &RawCsv,
    columns: &CorruptionColumns,
    known_regions: &[String],
) -> Result<WorkingTable, DataError> {
    let countries = raw.categorical_column(&columns.country)?;
    let regions = raw.categorical_column(&columns.region)?;
    let index = raw.numeric_column(&columns.index)?;

    if !known_regions.is_empty()
        && let Some((row, value)) = regions
            .iter()
            .enumerate()
            .find(|(_, r)| !known_regions.contains(r))
    {
        return Err(DataError::UnknownCategory {
            row: row + 1,
            column: columns.region.clone(),
            value: value.clone(),
        });
    }

    let (min, max) = CPI_RANGE;
    if let Some((row, &value)) = index
        .iter()
        .enumerate()
        .find(|(_, v)| **v < min || **v > max)
    {
        return Err(DataError::OutOfRange {
            row: row + 1,
            column: columns.index.clone(),
            value,
            min,
            max,
        });
    }

    let mut distinct = regions.iter().collect::<Vec<_>>();
    distinct.sort();
    distinct.dedup();
    log::info!(
        "[Data] corruption table loaded: {} rows, {} distinct regions",
        regions.len(),
        distinct.len()
    );

    let table = WorkingTable::new(index.len())
        .with_categorical_column(&columns.country, countries)?
        .with_categorical_column(&columns.region, regions)?
        .with_numeric_column(&columns.index, index)?;
    Ok(table)
}

/// Builds the growth table. Ages must be non-negative; length positivity is
/// left to the power transform, which owns that domain check.
pub fn growth_table(raw: &RawCsv, columns: &GrowthColumns) -> Result<WorkingTable, DataError> {
    let age = raw.numeric_column(&columns.age)?;
    let length = raw.numeric_column(&columns.length)?;

    if let Some((row, &value)) = age.iter().enumerate().find(|(_, v)| **v < 0.0) {
        return Err(DataError::OutOfRange {
            row: row + 1,
            column: columns.age.clone(),
            value,
            min: 0.0,
            max: f64::INFINITY,
        });
    }

    log::info!("[Data] growth table loaded: {} rows", age.len());

    let table = WorkingTable::new(age.len())
        .with_numeric_column(&columns.age, age)?
        .with_numeric_column(&columns.length, length)?;
    Ok(table)
}

pub fn load_corruption_table(
    path: &Path,
    columns: &CorruptionColumns,
    known_regions: &[String],
) -> Result<WorkingTable, DataError> {
    corruption_table(&read_csv_path(path)?, columns, known_regions)
}

pub fn load_growth_table(path: &Path, columns: &GrowthColumns) -> Result<WorkingTable, DataError> {
    growth_table(&read_csv_path(path)?, columns)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CPI_CSV: &str = "pais,cpi,regiao\nArgentina,3.9,America_do_sul\nAlemanha,8.0,Europa\n";

    #[test]
    fn loads_corruption_columns_by_name() {
        let raw = read_csv(CPI_CSV.as_bytes()).expect("csv parses");
        let table = corruption_table(&raw, &CorruptionColumns::default(), &[])
            .expect("table builds");
        assert_eq!(table.n_rows(), 2);
        assert_eq!(table.categorical("regiao").expect("region")[1], "Europa");
        assert_eq!(table.numeric("cpi").expect("cpi")[0], 3.9);
    }

    #[test]
    fn missing_required_column_is_fatal() {
        let raw = read_csv("pais,score,regiao\nA,1.0,X\n".as_bytes()).expect("csv parses");
        let err = corruption_table(&raw, &CorruptionColumns::default(), &[])
            .expect_err("cpi column is required");
        assert!(matches!(err, DataError::MissingColumn(ref c) if c == "cpi"));
    }

    #[test]
    fn rejects_unknown_region_and_out_of_range_index() {
        let raw = read_csv(CPI_CSV.as_bytes()).expect("csv parses");
        let known = vec!["America_do_sul".to_string()];
        assert!(matches!(
            corruption_table(&raw, &CorruptionColumns::default(), &known),
            Err(DataError::UnknownCategory { row: 2, .. })
        ));

        let raw = read_csv("pais,cpi,regiao\nA,11.5,X\n".as_bytes()).expect("csv parses");
        assert!(matches!(
            corruption_table(&raw, &CorruptionColumns::default(), &[]),
            Err(DataError::OutOfRange { row: 1, .. })
        ));
    }

    #[test]
    fn rejects_ragged_rows_empty_and_non_numeric_fields() {
        assert!(matches!(
            read_csv("a,b\n1\n".as_bytes()),
            Err(DataError::Row { .. }) | Err(DataError::RowWidth { .. })
        ));
        assert!(matches!(read_csv("a,b\n".as_bytes()), Err(DataError::NoRows)));

        let raw = read_csv("comprimento,idade\n50.0,\n".as_bytes()).expect("csv parses");
        assert!(matches!(
            growth_table(&raw, &GrowthColumns::default()),
            Err(DataError::EmptyField { row: 1, .. })
        ));

        let raw = read_csv("comprimento,idade\n50.0,abc\n".as_bytes()).expect("csv parses");
        assert!(matches!(
            growth_table(&raw, &GrowthColumns::default()),
            Err(DataError::NotNumeric { .. })
        ));
    }

    #[test]
    fn growth_table_rejects_negative_age() {
        let raw = read_csv("comprimento,idade\n50.0,-1\n".as_bytes()).expect("csv parses");
        assert!(matches!(
            growth_table(&raw, &GrowthColumns::default()),
            Err(DataError::OutOfRange { .. })
        ));
    }
}
