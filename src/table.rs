use ndarray::{Array1, ArrayView1};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TableError {
    #[error("column '{0}' not found")]
    MissingColumn(String),

    #[error("column '{0}' already exists")]
    DuplicateColumn(String),

    #[error("column '{name}' has {found} rows but the table has {expected}")]
    LengthMismatch {
        name: String,
        expected: usize,
        found: usize,
    },

    #[error("column '{name}' is {found}, expected {expected}")]
    WrongKind {
        name: String,
        expected: &'static str,
        found: &'static str,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum Column {
    Numeric(Array1<f64>),
    Categorical(Vec<String>),
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Column::Numeric(v) => v.len(),
            Column::Categorical(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn kind(&self) -> &'static str {
        match self {
            Column::Numeric(_) => "numeric",
            Column::Categorical(_) => "categorical",
        }
    }
}

/// Column-oriented table threaded through the analysis stages.
///
/// Tables are never mutated in place: deriving a column yields a new table.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct WorkingTable {
    n_rows: usize,
    columns: Vec<(String, Column)>,
}

impl WorkingTable {
    pub fn new(n_rows: usize) -> Self {
        Self {
            n_rows,
            columns: Vec::new(),
        }
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|(n, _)| n == name)
    }

    pub fn column(&self, name: &str) -> Result<&Column, TableError> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, c)| c)
            .ok_or_else(|| TableError::MissingColumn(name.to_string()))
    }

    pub fn numeric(&self, name: &str) -> Result<ArrayView1<'_, f64>, TableError> {
        match self.column(name)? {
            Column::Numeric(v) => Ok(v.view()),
            other => Err(TableError::WrongKind {
                name: name.to_string(),
                expected: "numeric",
                found: other.kind(),
            }),
        }
    }

    pub fn categorical(&self, name: &str) -> Result<&[String], TableError> {
        match self.column(name)? {
            Column::Categorical(v) => Ok(v.as_slice()),
            other => Err(TableError::WrongKind {
                name: name.to_string(),
                expected: "categorical",
                found: other.kind(),
            }),
        }
    }

    pub fn with_column(&self, name: &str, column: Column) -> Result<Self, TableError> {
        if self.has_column(name) {
            return Err(TableError::DuplicateColumn(name.to_string()));
        }
        if column.len() != self.n_rows {
            return Err(TableError::LengthMismatch {
                name: name.to_string(),
                expected: self.n_rows,
                found: column.len(),
            });
        }
        let mut next = self.clone();
        next.columns.push((name.to_string(), column));
        Ok(next)
    }

    pub fn with_numeric_column(&self, name: &str, values: Array1<f64>) -> Result<Self, TableError> {
        self.with_column(name, Column::Numeric(values))
    }

    pub fn with_categorical_column(
        &self,
        name: &str,
        values: Vec<String>,
    ) -> Result<Self, TableError> {
        self.with_column(name, Column::Categorical(values))
    }

    /// First `n` rows rendered as strings, for previews.
    pub fn head_rows(&self, names: &[&str], n: usize) -> Result<Vec<Vec<String>>, TableError> {
        let cols = names
            .iter()
            .map(|name| self.column(name))
            .collect::<Result<Vec<_>, _>>()?;
        Ok((0..self.n_rows.min(n))
            .map(|i| {
                cols.iter()
                    .map(|c| match c {
                        Column::Numeric(v) => format!("{:.6}", v[i]),
                        Column::Categorical(v) => v[i].clone(),
                    })
                    .collect()
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn deriving_a_column_leaves_the_source_untouched() {
        let base = WorkingTable::new(3)
            .with_numeric_column("x", array![1.0, 2.0, 3.0])
            .expect("x fits");
        let derived = base
            .with_numeric_column("y", array![2.0, 4.0, 6.0])
            .expect("y fits");
        assert!(!base.has_column("y"));
        assert!(derived.has_column("y"));
        assert_eq!(derived.numeric("x").expect("x").to_vec(), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn rejects_length_mismatch_duplicates_and_kind_errors() {
        let base = WorkingTable::new(2)
            .with_categorical_column("g", vec!["a".into(), "b".into()])
            .expect("g fits");
        assert!(matches!(
            base.with_numeric_column("x", array![1.0]),
            Err(TableError::LengthMismatch { expected: 2, found: 1, .. })
        ));
        assert!(matches!(
            base.with_categorical_column("g", vec!["c".into(), "d".into()]),
            Err(TableError::DuplicateColumn(_))
        ));
        assert!(matches!(base.numeric("g"), Err(TableError::WrongKind { .. })));
        assert!(matches!(base.numeric("zz"), Err(TableError::MissingColumn(_))));
    }
}
