//! Capacity search
//!
//! For every (source, metric) pair, picks the forest size from a fixed
//! candidate grid that maximizes k-fold cross-validated macro score on that
//! source's filtered view of the train table. Candidates are evaluated in
//! parallel and recombined in grid order; the winner is the first candidate
//! with a strictly greater score during the ascending scan.
//!
//! Results are memoized to one JSON file per target attribute. The file
//! embeds a fingerprint of the grid, fold count, metric set and source list;
//! a matching file is trusted as-is, a mismatch triggers recomputation.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::evaluate::{Evaluation, Metric};
use crate::fusion::FusionLayout;
use crate::learner::{Classifier, Estimator, FilteredForestParams};
use crate::table::{is_missing, Table};

/// Chosen ensemble size per (source, metric). Immutable once computed for a
/// run; threaded as a value into every component that needs it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacityMap {
    sizes: BTreeMap<String, BTreeMap<Metric, usize>>,
}

impl CapacityMap {
    pub fn insert(&mut self, source: &str, metric: Metric, capacity: usize) {
        self.sizes
            .entry(source.to_string())
            .or_insert_with(BTreeMap::new)
            .insert(metric, capacity);
    }

    pub fn get(&self, source: &str, metric: Metric) -> Option<usize> {
        self.sizes.get(source).and_then(|m| m.get(&metric)).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.sizes.is_empty()
    }
}

/// Cross-validates a filtered learner, accumulating one evaluation across all
/// folds, and returns the macro average of each requested metric.
pub fn cross_validate(
    params: &FilteredForestParams,
    table: &Table,
    folds: usize,
    seed: u64,
    metrics: &[Metric],
) -> Result<Vec<f64>> {
    let classes = table.label_values()?.to_vec();
    let n = table.n_rows();
    if folds < 2 || n < folds {
        return Err(Error::InvalidTable(format!(
            "cannot split {} rows into {} folds",
            n, folds
        )));
    }

    let mut indices: Vec<usize> = (0..n).collect();
    indices.shuffle(&mut SmallRng::seed_from_u64(seed));

    let mut evaluation = Evaluation::new(classes);
    for fold in 0..folds {
        let lo = fold * n / folds;
        let hi = (fold + 1) * n / folds;
        let train_rows: Vec<usize> = indices[..lo]
            .iter()
            .chain(&indices[hi..])
            .copied()
            .collect();

        let model = params.fit(&table.select_rows(&train_rows))?;
        let holdout = table.select_rows(&indices[lo..hi]);
        let predictions = model.predict(&holdout);
        let label = holdout.label_index();
        for (row, &predicted) in predictions.iter().enumerate() {
            let truth = holdout.value(row, label);
            if !is_missing(truth) {
                evaluation.observe(truth as usize, predicted);
            }
        }
    }

    Ok(metrics
        .iter()
        .map(|&metric| evaluation.macro_average(metric))
        .collect())
}

/// Runs the full grid search for one target attribute's train table.
pub fn search_capacities(
    train: &Table,
    layout: &FusionLayout,
    metrics: &[Metric],
    grid: &[usize],
    folds: usize,
    seed: u64,
) -> Result<CapacityMap> {
    let n_classes = train.label_values()?.len();
    let mut map = CapacityMap::default();
    for source in &layout.sources {
        debug!(source = source.name.as_str(), "searching capacity");
        let scores = score_grid(grid, |capacity| {
            let params = FilteredForestParams::new(source, capacity, n_classes, seed);
            cross_validate(&params, train, folds, seed, metrics)
        })?;

        for (index, &metric) in metrics.iter().enumerate() {
            let (capacity, score) = select_best(&scores, index);
            info!(
                source = source.name.as_str(),
                %metric,
                capacity,
                score,
                "best capacity"
            );
            map.insert(&source.name, metric, capacity);
        }
    }
    Ok(map)
}

/// Scores every grid candidate in parallel; the result preserves grid order
/// and any candidate failure aborts the whole batch.
fn score_grid<F>(grid: &[usize], score: F) -> Result<Vec<(usize, Vec<f64>)>>
where
    F: Fn(usize) -> Result<Vec<f64>> + Sync,
{
    grid.par_iter()
        .map(|&capacity| score(capacity).map(|scores| (capacity, scores)))
        .collect()
}

/// First strictly greater score wins, scanning in grid order.
fn select_best(scores: &[(usize, Vec<f64>)], metric_index: usize) -> (usize, f64) {
    let mut best_capacity = 0;
    let mut best_score = -1.0;
    for (capacity, values) in scores {
        if values[metric_index] > best_score {
            best_score = values[metric_index];
            best_capacity = *capacity;
        }
    }
    (best_capacity, best_score)
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheFile {
    fingerprint: String,
    capacities: CapacityMap,
}

/// Fingerprint of everything the cached result depends on.
pub fn fingerprint(
    grid: &[usize],
    folds: usize,
    metrics: &[Metric],
    layout: &FusionLayout,
) -> String {
    let metrics: Vec<&str> = metrics.iter().map(|m| m.as_str()).collect();
    let sources: Vec<&str> = layout.sources.iter().map(|s| s.name.as_str()).collect();
    format!(
        "grid={:?};folds={};metrics={};sources={}",
        grid,
        folds,
        metrics.join(","),
        sources.join(",")
    )
}

/// Returns the cached map when the cache file exists and its fingerprint
/// matches; otherwise runs `search` and persists the result.
pub fn load_or_search<P, F>(path: P, fingerprint: &str, search: F) -> Result<CapacityMap>
where
    P: AsRef<Path>,
    F: FnOnce() -> Result<CapacityMap>,
{
    let path = path.as_ref();
    if path.exists() {
        let cached: CacheFile = serde_json::from_str(&fs::read_to_string(path)?)?;
        if cached.fingerprint == fingerprint {
            debug!(path = %path.display(), "capacity cache hit");
            return Ok(cached.capacities);
        }
        warn!(path = %path.display(), "capacity cache fingerprint mismatch, recomputing");
    }

    let capacities = search()?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = CacheFile {
        fingerprint: fingerprint.to_string(),
        capacities: capacities.clone(),
    };
    fs::write(path, serde_json::to_string_pretty(&file)?)?;
    Ok(capacities)
}
