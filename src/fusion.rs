//! Dataset fusion
//!
//! Joins per-source feature tables against the ground truth by user id into
//! one merged schema: every source's non-id columns in source order, followed
//! by one mapped label column per target attribute. A user absent from a
//! source contributes exactly that source's column count of missing values,
//! which keeps the global column layout index-stable across rows. Rows with no
//! feature value at all are dropped; the rest are routed to train or test by
//! id membership in the held-out set.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::ops::Range;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::mapper::AttributeMapper;
use crate::table::{is_missing, Table, MISSING};

/// A raw per-source table with its id column resolved and a row lookup by id.
/// Immutable after construction.
#[derive(Debug, Clone)]
pub struct SourceTableInfo {
    name: String,
    table: Table,
    id_index: usize,
    lookup: HashMap<String, usize>,
}

impl SourceTableInfo {
    pub fn new<S: Into<String>>(name: S, table: Table, id_column: &str) -> Result<Self> {
        let id_index = table
            .column_index(id_column)
            .ok_or_else(|| Error::MissingColumn(id_column.to_string()))?;
        let mut lookup = HashMap::with_capacity(table.n_rows());
        for row in 0..table.n_rows() {
            if let Some(id) = table.string_value(row, id_index) {
                lookup.insert(id, row);
            }
        }
        Ok(SourceTableInfo {
            name: name.into(),
            table,
            id_index,
            lookup,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    /// Number of columns this source contributes to the merged schema.
    pub fn n_feature_columns(&self) -> usize {
        self.table.n_attributes() - 1
    }

    fn row_for(&self, id: &str) -> Option<&[f64]> {
        self.lookup.get(id).map(|&row| self.table.row(row))
    }
}

/// The column range one source occupies in the merged feature block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceColumns {
    pub name: String,
    pub start: usize,
    pub len: usize,
}

impl SourceColumns {
    pub fn range(&self) -> Range<usize> {
        self.start..self.start + self.len
    }
}

/// Where each source landed in the merged schema. Persisted alongside the
/// fused tables so later stages can build per-source column filters without
/// reloading the raw sources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FusionLayout {
    pub sources: Vec<SourceColumns>,
    pub n_features: usize,
}

impl FusionLayout {
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// The fused train/test tables sharing one schema, plus the source layout.
#[derive(Debug, Clone)]
pub struct FusionOutput {
    pub train: Table,
    pub test: Table,
    pub layout: FusionLayout,
}

/// Joins the sources against the ground truth.
///
/// The output schema depends only on the source and mapper lists, never on
/// which ground-truth rows are present.
pub fn fuse(
    ground_truth: &Table,
    id_column: &str,
    test_ids: &HashSet<String>,
    sources: &[SourceTableInfo],
    mappers: &[AttributeMapper],
) -> Result<FusionOutput> {
    let id_index = ground_truth
        .column_index(id_column)
        .ok_or_else(|| Error::MissingColumn(id_column.to_string()))?;

    let mut attributes = Vec::new();
    let mut layout_sources = Vec::with_capacity(sources.len());
    for source in sources {
        let start = attributes.len();
        for (i, attribute) in source.table.attributes().iter().enumerate() {
            if i != source.id_index {
                attributes.push(attribute.clone());
            }
        }
        debug!(
            source = source.name.as_str(),
            start,
            end = attributes.len(),
            "merged column range"
        );
        layout_sources.push(SourceColumns {
            name: source.name.clone(),
            start,
            len: attributes.len() - start,
        });
    }
    let n_features = attributes.len();
    for mapper in mappers {
        attributes.push(mapper.output_attribute());
    }

    let layout = FusionLayout {
        sources: layout_sources,
        n_features,
    };
    let mut train = Table::new("fullTrain", attributes.clone());
    let mut test = Table::new("fullTest", attributes);

    for row in 0..ground_truth.n_rows() {
        let id = match ground_truth.string_value(row, id_index) {
            Some(id) => id,
            None => continue,
        };

        let mut values = Vec::with_capacity(n_features + mappers.len());
        for source in sources {
            match source.row_for(&id) {
                Some(source_row) => {
                    for (i, &value) in source_row.iter().enumerate() {
                        if i != source.id_index {
                            values.push(value);
                        }
                    }
                }
                None => values.extend(std::iter::repeat(MISSING).take(source.n_feature_columns())),
            }
        }

        // rows carrying no feature at all would only dilute training
        if values.iter().all(|&v| is_missing(v)) {
            continue;
        }

        for mapper in mappers {
            let raw = ground_truth.value(row, mapper.raw_column());
            values.push(if is_missing(raw) { raw } else { mapper.map(raw) });
        }

        if test_ids.contains(&id) {
            test.push_row(values)?;
        } else {
            train.push_row(values)?;
        }
    }

    Ok(FusionOutput {
        train,
        test,
        layout,
    })
}

/// Restricts a fused table to a single target: keeps the feature block and the
/// given mapper's label column, drops the other label columns and every row
/// whose retained label is missing.
pub fn filter_target(
    fused: &Table,
    n_features: usize,
    mapper_index: usize,
    suffix: &str,
) -> Table {
    let mut indices: Vec<usize> = (0..n_features).collect();
    indices.push(n_features + mapper_index);
    let relation = format!("{}{}", fused.relation(), suffix);
    let mut filtered = fused.select_columns(&indices).with_relation(relation);
    filtered.retain_rows(|row| !is_missing(row[n_features]));
    filtered
}
