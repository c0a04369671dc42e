//! Run configuration
//!
//! Everything the pipeline reads from or writes to disk is named here: the
//! ground-truth table, the held-out id list, the ordered per-source feature
//! tables and the output directories. Loadable from JSON so a run is fully
//! described by one file.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// One distinct origin of user features (check-ins, topics, text, images).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub name: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Ground-truth table; must contain `id_column` and every raw target column.
    pub ground_truth: PathBuf,
    /// Table whose first column lists the held-out (test) user ids.
    pub test_ids: PathBuf,
    /// Name of the user-identifier column shared by all tables.
    pub id_column: String,
    /// Per-source feature tables, in schema order.
    pub sources: Vec<SourceConfig>,

    /// Where fused train/test tables and the layout file are written.
    #[serde(default = "default_dataset_dir")]
    pub dataset_dir: PathBuf,
    /// Where capacity-search results are cached, one file per target.
    #[serde(default = "default_capacity_dir")]
    pub capacity_dir: PathBuf,
    /// Where trained models are persisted.
    #[serde(default = "default_model_dir")]
    pub model_dir: PathBuf,
    /// Where per-target run reports are written.
    #[serde(default = "default_result_dir")]
    pub result_dir: PathBuf,

    /// Cross-validation folds for capacity search and stacking.
    #[serde(default = "default_folds")]
    pub folds: usize,
    /// Seed for every randomized step (folding, bagging, oversampling).
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Candidate ensemble sizes for the capacity search.
    #[serde(default = "default_capacity_grid")]
    pub capacity_grid: Vec<usize>,
}

fn default_dataset_dir() -> PathBuf {
    PathBuf::from("datasets")
}

fn default_capacity_dir() -> PathBuf {
    PathBuf::from("tree-sizes")
}

fn default_model_dir() -> PathBuf {
    PathBuf::from("models")
}

fn default_result_dir() -> PathBuf {
    PathBuf::from("results")
}

fn default_folds() -> usize {
    10
}

fn default_seed() -> u64 {
    42
}

fn default_capacity_grid() -> Vec<usize> {
    (1..=15).map(|i| i * 10).collect()
}

impl RunConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_optional_fields() {
        let config: RunConfig = serde_json::from_str(
            r#"{
                "ground_truth": "gt.csv",
                "test_ids": "test.csv",
                "id_column": "_id",
                "sources": [{ "name": "twitter", "path": "twitter.csv" }]
            }"#,
        )
        .unwrap();
        assert_eq!(config.folds, 10);
        assert_eq!(config.capacity_grid.first(), Some(&10));
        assert_eq!(config.capacity_grid.last(), Some(&150));
        assert_eq!(config.dataset_dir, PathBuf::from("datasets"));
    }
}
