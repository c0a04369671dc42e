//! Row-oriented attribute-typed tables
//!
//! A [`Table`] is an ordered sequence of typed columns plus rows of `f64`
//! cells, mirroring the attribute/instance layout of row-oriented dataset
//! files. Nominal cells hold an index into the attribute's fixed vocabulary;
//! the missing value is a distinguished sentinel ([`MISSING`]), never a valid
//! category or number. By convention the last column is the label.

use std::fmt;
use std::fs;
use std::path::Path;

use linfa::Dataset;
use ndarray::{Array1, Array2, Ix1};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

mod arff;

/// The missing-value sentinel.
pub const MISSING: f64 = f64::NAN;

/// Returns true if `value` is the missing sentinel.
#[inline]
pub fn is_missing(value: f64) -> bool {
    value.is_nan()
}

/// The type of a column: numeric, or categorical with a fixed vocabulary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributeKind {
    Numeric,
    Nominal(Vec<String>),
}

/// A named, typed column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    name: String,
    kind: AttributeKind,
}

impl Attribute {
    pub fn numeric<S: Into<String>>(name: S) -> Self {
        Attribute {
            name: name.into(),
            kind: AttributeKind::Numeric,
        }
    }

    pub fn nominal<S: Into<String>>(name: S, values: Vec<String>) -> Self {
        Attribute {
            name: name.into(),
            kind: AttributeKind::Nominal(values),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &AttributeKind {
        &self.kind
    }

    /// The vocabulary of a nominal attribute, `None` for numeric ones.
    pub fn values(&self) -> Option<&[String]> {
        match &self.kind {
            AttributeKind::Nominal(values) => Some(values),
            AttributeKind::Numeric => None,
        }
    }
}

/// An ordered sequence of typed columns plus rows sharing that schema.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    relation: String,
    attributes: Vec<Attribute>,
    rows: Vec<Vec<f64>>,
}

impl Table {
    pub fn new<S: Into<String>>(relation: S, attributes: Vec<Attribute>) -> Self {
        Table {
            relation: relation.into(),
            attributes,
            rows: Vec::new(),
        }
    }

    pub fn relation(&self) -> &str {
        &self.relation
    }

    pub fn with_relation<S: Into<String>>(mut self, relation: S) -> Self {
        self.relation = relation.into();
        self
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    pub fn attribute(&self, index: usize) -> &Attribute {
        &self.attributes[index]
    }

    pub fn n_attributes(&self) -> usize {
        self.attributes.len()
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Index of the first column with the given name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.attributes.iter().position(|a| a.name == name)
    }

    /// Index of the label column (last column by convention).
    pub fn label_index(&self) -> usize {
        self.attributes.len() - 1
    }

    /// Vocabulary of the label column.
    pub fn label_values(&self) -> Result<&[String]> {
        let label = &self.attributes[self.label_index()];
        label.values().ok_or_else(|| {
            Error::InvalidTable(format!("label column '{}' is not nominal", label.name))
        })
    }

    pub fn push_row(&mut self, row: Vec<f64>) -> Result<()> {
        if row.len() != self.attributes.len() {
            return Err(Error::InvalidTable(format!(
                "row has {} cells, schema has {} columns",
                row.len(),
                self.attributes.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn row(&self, index: usize) -> &[f64] {
        &self.rows[index]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f64]> {
        self.rows.iter().map(|r| r.as_slice())
    }

    pub fn value(&self, row: usize, column: usize) -> f64 {
        self.rows[row][column]
    }

    /// The cell rendered as a string: the vocabulary entry for nominal columns,
    /// the formatted number for numeric ones, `None` for missing cells.
    pub fn string_value(&self, row: usize, column: usize) -> Option<String> {
        let value = self.rows[row][column];
        if is_missing(value) {
            return None;
        }
        match &self.attributes[column].kind {
            AttributeKind::Nominal(values) => values.get(value as usize).cloned(),
            AttributeKind::Numeric => Some(format!("{}", value)),
        }
    }

    /// A new table holding only the given columns, in the given order.
    pub fn select_columns(&self, indices: &[usize]) -> Table {
        let attributes = indices
            .iter()
            .map(|&i| self.attributes[i].clone())
            .collect();
        let rows = self
            .rows
            .iter()
            .map(|row| indices.iter().map(|&i| row[i]).collect())
            .collect();
        Table {
            relation: self.relation.clone(),
            attributes,
            rows,
        }
    }

    /// A new table holding only the given rows, in the given order.
    pub fn select_rows(&self, indices: &[usize]) -> Table {
        Table {
            relation: self.relation.clone(),
            attributes: self.attributes.clone(),
            rows: indices.iter().map(|&i| self.rows[i].clone()).collect(),
        }
    }

    /// Drops every row for which the predicate returns false.
    pub fn retain_rows<F: FnMut(&[f64]) -> bool>(&mut self, mut keep: F) {
        self.rows.retain(|row| keep(row));
    }

    /// Per-class row counts over the label column, missing labels excluded.
    pub fn class_counts(&self) -> Result<Vec<usize>> {
        let label = self.label_index();
        let n_classes = self.label_values()?.len();
        let mut counts = vec![0; n_classes];
        for row in &self.rows {
            let value = row[label];
            if !is_missing(value) {
                counts[value as usize] += 1;
            }
        }
        Ok(counts)
    }

    /// Converts into a `linfa` dataset: all columns but the last as records,
    /// the last (nominal) column as targets. Fails on missing labels.
    pub fn to_dataset(&self) -> Result<Dataset<f64, usize, Ix1>> {
        if self.rows.is_empty() {
            return Err(Error::EmptyTable(self.relation.clone()));
        }
        self.label_values()?;
        let n_features = self.label_index();

        let mut data = Vec::with_capacity(self.rows.len() * n_features);
        let mut targets = Vec::with_capacity(self.rows.len());
        for row in &self.rows {
            data.extend_from_slice(&row[..n_features]);
            let label = row[n_features];
            if is_missing(label) {
                return Err(Error::InvalidTable(format!(
                    "missing label in relation '{}'",
                    self.relation
                )));
            }
            targets.push(label as usize);
        }

        let records = Array2::from_shape_vec((self.rows.len(), n_features), data)
            .map_err(|e| Error::InvalidTable(e.to_string()))?;
        Ok(Dataset::new(records, Array1::from(targets)))
    }

    /// Loads a table from disk, dispatching on extension: `.csv` via the csv
    /// reader with column-type inference, anything else as ARFF.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Table> {
        let path = path.as_ref();
        if path.extension().map_or(false, |e| e == "csv") {
            Self::load_csv(path)
        } else {
            let content = fs::read_to_string(path)?;
            arff::read(&content)
        }
    }

    /// Saves the table as ARFF.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::write(path, arff::write(self))?;
        Ok(())
    }

    fn load_csv(path: &Path) -> Result<Table> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_path(path)?;
        let headers: Vec<String> = reader.headers()?.iter().map(|h| h.to_string()).collect();
        let records = reader
            .records()
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let relation = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "csv".to_string());

        // A column is numeric if every non-missing cell parses as f64,
        // otherwise nominal with vocabulary in first-appearance order.
        let numeric: Vec<bool> = (0..headers.len())
            .map(|c| {
                records.iter().all(|r| {
                    let cell = r.get(c).unwrap_or("").trim();
                    cell_is_missing(cell) || cell.parse::<f64>().is_ok()
                })
            })
            .collect();

        let mut vocabularies: Vec<Vec<String>> = vec![Vec::new(); headers.len()];
        let mut rows = Vec::with_capacity(records.len());
        for record in &records {
            let mut row = Vec::with_capacity(headers.len());
            for c in 0..headers.len() {
                let cell = record.get(c).unwrap_or("").trim();
                if cell_is_missing(cell) {
                    row.push(MISSING);
                } else if numeric[c] {
                    // parse checked during inference
                    row.push(cell.parse::<f64>().unwrap());
                } else {
                    let vocabulary = &mut vocabularies[c];
                    let index = match vocabulary.iter().position(|v| v == cell) {
                        Some(index) => index,
                        None => {
                            vocabulary.push(cell.to_string());
                            vocabulary.len() - 1
                        }
                    };
                    row.push(index as f64);
                }
            }
            rows.push(row);
        }

        let attributes = headers
            .into_iter()
            .zip(vocabularies)
            .zip(&numeric)
            .map(|((name, vocabulary), &is_numeric)| {
                if is_numeric {
                    Attribute::numeric(name)
                } else {
                    Attribute::nominal(name, vocabulary)
                }
            })
            .collect();

        let mut table = Table::new(relation, attributes);
        for row in rows {
            table.push_row(row)?;
        }
        Ok(table)
    }
}

fn cell_is_missing(cell: &str) -> bool {
    cell.is_empty() || cell == "?"
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} ({} rows, {} columns)",
            self.relation,
            self.rows.len(),
            self.attributes.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_table() -> Table {
        let mut table = Table::new(
            "sample",
            vec![
                Attribute::numeric("x"),
                Attribute::numeric("y"),
                Attribute::nominal("class", vec!["no".into(), "yes".into()]),
            ],
        );
        table.push_row(vec![1.0, 2.0, 0.0]).unwrap();
        table.push_row(vec![3.0, MISSING, 1.0]).unwrap();
        table.push_row(vec![MISSING, 4.0, 1.0]).unwrap();
        table
    }

    #[test]
    fn row_length_is_checked() {
        let mut table = sample_table();
        assert!(table.push_row(vec![1.0]).is_err());
    }

    #[test]
    fn string_values_resolve_vocabulary() {
        let table = sample_table();
        assert_eq!(table.string_value(0, 2).as_deref(), Some("no"));
        assert_eq!(table.string_value(1, 2).as_deref(), Some("yes"));
        assert_eq!(table.string_value(1, 1), None);
        assert_eq!(table.string_value(0, 0).as_deref(), Some("1"));
    }

    #[test]
    fn select_columns_preserves_order() {
        let table = sample_table().select_columns(&[2, 0]);
        assert_eq!(table.attribute(0).name(), "class");
        assert_eq!(table.attribute(1).name(), "x");
        assert_eq!(table.value(0, 1), 1.0);
    }

    #[test]
    fn class_counts_skip_missing() {
        let mut table = sample_table();
        table.push_row(vec![5.0, 6.0, MISSING]).unwrap();
        assert_eq!(table.class_counts().unwrap(), vec![1, 2]);
    }

    #[test]
    fn to_dataset_splits_features_and_labels() {
        let mut table = sample_table();
        table.retain_rows(|row| !is_missing(row[0]) && !is_missing(row[1]));
        let dataset = table.to_dataset().unwrap();
        assert_eq!(dataset.records().dim(), (1, 2));
        assert_eq!(dataset.targets()[0], 0);
    }

    #[test]
    fn to_dataset_rejects_missing_labels() {
        let mut table = sample_table();
        table.push_row(vec![1.0, 1.0, MISSING]).unwrap();
        assert!(table.to_dataset().is_err());
    }

    #[test]
    fn arff_round_trip_keeps_missing_cells() {
        let table = sample_table();
        let text = super::arff::write(&table);
        let back = super::arff::read(&text).unwrap();
        assert_eq!(back.relation(), "sample");
        assert_eq!(back.attributes(), table.attributes());
        assert_eq!(back.n_rows(), 3);
        assert!(is_missing(back.value(1, 1)));
        assert_eq!(back.value(2, 2), 1.0);
    }
}
