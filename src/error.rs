//! Error types in demolearn
//!
//! Missing cells and vocabulary misses during attribute mapping are expected
//! states handled inline, not errors. Everything here propagates to the top of
//! the run step that triggered it.

use thiserror::Error;

use crate::evaluate::Metric;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// A column the schema layout depends on is absent.
    #[error("required column '{0}' not found")]
    MissingColumn(String),
    #[error("invalid table: {0}")]
    InvalidTable(String),
    /// Nothing left to train on after filtering.
    #[error("empty table: {0}")]
    EmptyTable(String),
    #[error("no capacity entry for source '{source_name}' under {metric}")]
    MissingCapacity { source_name: String, metric: Metric },
    #[error("training failed: {0}")]
    Training(#[from] linfa::error::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Csv(#[from] csv::Error),
}
