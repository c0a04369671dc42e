//! Run driver
//!
//! Wires the stages together for every target attribute: fuse the raw
//! sources, search (or load) per-source capacities, then sweep the strategy
//! grid of {plain, oversampled} × {single, boosting, stacking, vote} ×
//! metric, persisting every trained model and reporting the best result per
//! score kind. The training stage reads the fused datasets and the layout
//! back from disk, so fusion and training share no in-memory state. A
//! failing strategy is logged and skipped; the sweep carries on with the
//! remaining combinations.

use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;

use rayon::prelude::*;
use tracing::{error, info};

use crate::capacity::{self, CapacityMap};
use crate::config::RunConfig;
use crate::error::{Error, Result};
use crate::evaluate::{
    best_per_kind, build_and_evaluate, EvaluationResult, Metric,
};
use crate::ensemble::{BoostingParams, StackingParams, VotingParams};
use crate::fusion::{self, FusionLayout, FusionOutput, SourceTableInfo};
use crate::learner::{FilteredForest, FilteredForestParams};
use crate::mapper::{AttributeMapper, TargetAttribute};
use crate::oversample::oversample;
use crate::store::{load_model, save_model};
use crate::table::Table;

pub struct Pipeline {
    config: RunConfig,
}

impl Pipeline {
    pub fn new(config: RunConfig) -> Self {
        Pipeline { config }
    }

    /// Runs fusion and then the full training sweep for every target.
    pub fn run(&self) -> Result<()> {
        self.fuse()?;
        self.train()
    }

    /// Runs the training sweep for every target from the datasets persisted
    /// by [`Pipeline::fuse`].
    pub fn train(&self) -> Result<()> {
        let layout = FusionLayout::load(self.config.dataset_dir.join("layout.json"))?;
        for &target in &TargetAttribute::ALL {
            self.train_target(&layout, target)?;
        }
        Ok(())
    }

    /// Loads the raw tables, fuses them and persists the fused datasets: the
    /// full train/test pair, one filtered pair per target, and the layout.
    pub fn fuse(&self) -> Result<FusionOutput> {
        let ground_truth = Table::load(&self.config.ground_truth)?;
        let test_ids = load_test_ids(&self.config.test_ids)?;

        let mut sources = Vec::with_capacity(self.config.sources.len());
        for source in &self.config.sources {
            let table = Table::load(&source.path)?;
            sources.push(SourceTableInfo::new(
                source.name.clone(),
                table,
                &self.config.id_column,
            )?);
        }

        let mappers = TargetAttribute::ALL
            .iter()
            .map(|&target| AttributeMapper::new(target, &ground_truth))
            .collect::<Result<Vec<_>>>()?;

        let fused = fusion::fuse(
            &ground_truth,
            &self.config.id_column,
            &test_ids,
            &sources,
            &mappers,
        )?;
        info!(
            train_rows = fused.train.n_rows(),
            test_rows = fused.test.n_rows(),
            features = fused.layout.n_features,
            "fusion complete"
        );

        let dir = &self.config.dataset_dir;
        fs::create_dir_all(dir)?;
        fused.train.save(dir.join("fullTrain.arff"))?;
        fused.test.save(dir.join("fullTest.arff"))?;
        fused.layout.save(dir.join("layout.json"))?;
        for (index, target) in TargetAttribute::ALL.iter().enumerate() {
            let n = fused.layout.n_features;
            fusion::filter_target(&fused.train, n, index, target.suffix())
                .save(dir.join(format!("fullTrain{}.arff", target.suffix())))?;
            fusion::filter_target(&fused.test, n, index, target.suffix())
                .save(dir.join(format!("fullTest{}.arff", target.suffix())))?;
        }
        Ok(fused)
    }

    /// Trains and evaluates every strategy for one target, reading the
    /// persisted per-target datasets and writing the target's report.
    pub fn train_target(&self, layout: &FusionLayout, target: TargetAttribute) -> Result<()> {
        let dir = &self.config.dataset_dir;
        let train = Table::load(dir.join(format!("fullTrain{}.arff", target.suffix())))?;
        let test = Table::load(dir.join(format!("fullTest{}.arff", target.suffix())))?;
        if train.is_empty() || test.is_empty() {
            error!(target = target.suffix(), "no labelled rows, skipping target");
            return Ok(());
        }
        info!(
            target = target.suffix(),
            train_rows = train.n_rows(),
            test_rows = test.n_rows(),
            "training target"
        );

        let capacities = self.capacities(&train, layout, target)?;
        let mut results = Vec::new();
        for &oversampled in &[false, true] {
            let train = if oversampled {
                oversample(&train, self.config.seed)?
            } else {
                train.clone()
            };
            for &metric in &Metric::ALL {
                let mut batch = self.sweep(
                    layout,
                    target,
                    &train,
                    &test,
                    &capacities,
                    metric,
                    oversampled,
                )?;
                for result in &mut batch {
                    result.oversampled = oversampled;
                }
                results.extend(batch);
            }
        }

        self.report(target, &results)
    }

    fn capacities(
        &self,
        train: &Table,
        layout: &FusionLayout,
        target: TargetAttribute,
    ) -> Result<CapacityMap> {
        let path = self
            .config
            .capacity_dir
            .join(format!("{}.json", target.suffix()));
        let fingerprint = capacity::fingerprint(
            &self.config.capacity_grid,
            self.config.folds,
            &Metric::ALL,
            layout,
        );
        capacity::load_or_search(path, &fingerprint, || {
            capacity::search_capacities(
                train,
                layout,
                &Metric::ALL,
                &self.config.capacity_grid,
                self.config.folds,
                self.config.seed,
            )
        })
    }

    /// One (metric, oversampling) pass over the four strategies.
    #[allow(clippy::too_many_arguments)]
    fn sweep(
        &self,
        layout: &FusionLayout,
        target: TargetAttribute,
        train: &Table,
        test: &Table,
        capacities: &CapacityMap,
        metric: Metric,
        oversampled: bool,
    ) -> Result<Vec<EvaluationResult>> {
        let n_classes = train.label_values()?.len();
        let mut bases = Vec::with_capacity(layout.sources.len());
        for source in &layout.sources {
            let capacity =
                capacities
                    .get(&source.name, metric)
                    .ok_or_else(|| Error::MissingCapacity {
                        source_name: source.name.clone(),
                        metric,
                    })?;
            bases.push(FilteredForestParams::new(
                source,
                capacity,
                n_classes,
                self.config.seed,
            ));
        }

        let mut results = Vec::new();

        // per-source forests, in parallel; each also feeds the vote below
        let singles: Vec<_> = layout
            .sources
            .par_iter()
            .zip(&bases)
            .map(|(source, params)| {
                let name = format!("single({})", source.name);
                let outcome = build_and_evaluate(params, train, test, &name, metric);
                (source.name.clone(), outcome)
            })
            .collect();
        for (source, outcome) in singles {
            match outcome {
                Ok((model, batch)) => {
                    save_model(
                        &model,
                        self.model_path(target, &source, metric, oversampled),
                    )?;
                    results.extend(batch);
                }
                Err(e) => error!(target = target.suffix(), source = source.as_str(), %metric, "single failed: {}", e),
            }
        }

        let boosting = BoostingParams::new(bases.clone(), self.config.seed);
        match build_and_evaluate(&boosting, train, test, "boosting", metric) {
            Ok((model, batch)) => {
                save_model(
                    &model,
                    self.model_path(target, "boosting", metric, oversampled),
                )?;
                results.extend(batch);
            }
            Err(e) => error!(target = target.suffix(), %metric, "boosting failed: {}", e),
        }

        let stacking = StackingParams::new(bases, self.config.folds, self.config.seed);
        match build_and_evaluate(&stacking, train, test, "stacking", metric) {
            Ok((model, batch)) => {
                save_model(
                    &model,
                    self.model_path(target, "stacking", metric, oversampled),
                )?;
                results.extend(batch);
            }
            Err(e) => error!(target = target.suffix(), %metric, "stacking failed: {}", e),
        }

        // the vote reloads the per-source models persisted above
        match self.load_committee(layout, target, metric, oversampled) {
            Ok(models) => {
                let voting = VotingParams::new(models);
                match build_and_evaluate(&voting, train, test, "vote", metric) {
                    Ok((_, batch)) => results.extend(batch),
                    Err(e) => error!(target = target.suffix(), %metric, "vote failed: {}", e),
                }
            }
            Err(e) => error!(target = target.suffix(), %metric, "vote skipped: {}", e),
        }

        Ok(results)
    }

    fn load_committee(
        &self,
        layout: &FusionLayout,
        target: TargetAttribute,
        metric: Metric,
        oversampled: bool,
    ) -> Result<Vec<FilteredForest>> {
        layout
            .sources
            .iter()
            .map(|source| {
                load_model(self.model_path(target, &source.name, metric, oversampled))
            })
            .collect()
    }

    fn model_path(
        &self,
        target: TargetAttribute,
        name: &str,
        metric: Metric,
        oversampled: bool,
    ) -> PathBuf {
        let file = if oversampled {
            format!("{}-{}-oversampled.json", name, metric)
        } else {
            format!("{}-{}.json", name, metric)
        };
        self.config
            .model_dir
            .join(target.suffix().to_lowercase())
            .join(file)
    }

    /// Writes the best result per score kind to `<result_dir>/<Target>.txt`.
    fn report(&self, target: TargetAttribute, results: &[EvaluationResult]) -> Result<()> {
        fs::create_dir_all(&self.config.result_dir)?;
        let best = best_per_kind(results);
        let mut lines: Vec<String> = best.iter().map(|r| r.to_string()).collect();
        lines.push(String::new());
        let path = self
            .config
            .result_dir
            .join(format!("{}.txt", target.suffix()));
        fs::write(&path, lines.join("\n"))?;
        for result in best {
            info!(target = target.suffix(), "{}", result);
        }
        Ok(())
    }
}

fn load_test_ids(path: &std::path::Path) -> Result<HashSet<String>> {
    let table = Table::load(path)?;
    let mut ids = HashSet::with_capacity(table.n_rows());
    for row in 0..table.n_rows() {
        if let Some(id) = table.string_value(row, 0) {
            ids.insert(id);
        }
    }
    Ok(ids)
}
