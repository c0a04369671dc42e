//! `demolearn` infers demographic attributes (age group, gender, relationship
//! status, education level, occupation) of social-media users from multiple
//! per-source feature tables.
//!
//! The pipeline has three stages:
//!
//! * **Fusion** joins every source table against the ground truth by user id
//!   into one index-stable schema, padding absent users with missing values
//!   and appending one mapped label column per target attribute
//!   ([`fusion`], [`mapper`]).
//! * **Capacity search** picks a per-source random-forest size from a fixed
//!   grid by cross-validated macro score, memoized to disk ([`capacity`]).
//! * **Training** sweeps four ensemble strategies (per-source forests,
//!   boosting, stacking, voting) with and without minority oversampling,
//!   persists every model and reports the best score per kind
//!   ([`ensemble`], [`evaluate`], [`pipeline`]).
//!
//! Base learners are bagged ensembles of [`linfa_trees`] decision trees
//! restricted to one source's column range ([`learner`]). A persisted model
//! can also serve single users through [`classify::UserClassifier`].
//!
//! ```no_run
//! use demolearn::{Pipeline, RunConfig};
//!
//! # fn main() -> demolearn::Result<()> {
//! let config = RunConfig::from_file("run.json")?;
//! Pipeline::new(config).run()?;
//! # Ok(())
//! # }
//! ```

pub mod capacity;
pub mod classify;
pub mod config;
pub mod ensemble;
mod error;
pub mod evaluate;
pub mod fusion;
pub mod learner;
pub mod mapper;
pub mod oversample;
pub mod pipeline;
pub mod store;
pub mod table;

pub use crate::classify::UserClassifier;
pub use crate::config::{RunConfig, SourceConfig};
pub use crate::error::{Error, Result};
pub use crate::evaluate::{EvaluationResult, Metric, ResultKind};
pub use crate::learner::{Classifier, Estimator};
pub use crate::mapper::TargetAttribute;
pub use crate::pipeline::Pipeline;
pub use crate::table::Table;
