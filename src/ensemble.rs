//! Ensemble strategies over per-source base learners
//!
//! Three ways of combining [`FilteredForest`] base learners trained on
//! different source column ranges of the fused table:
//!
//! * [`Boosting`] trains the supplied learners sequentially on weighted
//!   resamples of the train table, one round per learner, and combines their
//!   votes weighted by round quality.
//! * [`Stacking`] trains every base learner on the full table and a meta
//!   forest on out-of-fold base class distributions.
//! * [`Voting`] averages the class distributions of already-trained models.

use linfa::error::Error as LinfaError;
use linfa::traits::Fit;
use linfa::Dataset;
use ndarray::{Array1, Array2};
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::learner::{Classifier, Estimator, FilteredForest, FilteredForestParams, Forest};
use crate::table::Table;

const ERROR_FLOOR: f64 = 1e-10;

fn labels(table: &Table) -> Array1<usize> {
    let label = table.label_index();
    Array1::from(
        (0..table.n_rows())
            .map(|row| table.value(row, label) as usize)
            .collect::<Vec<_>>(),
    )
}

/// Sequential boosting in the multi-class (SAMME) formulation. The round
/// count is fixed by the learner list; each round reweights the rows the
/// previous rounds got wrong.
#[derive(Debug, Clone)]
pub struct BoostingParams {
    learners: Vec<FilteredForestParams>,
    seed: u64,
}

impl BoostingParams {
    pub fn new(learners: Vec<FilteredForestParams>, seed: u64) -> Self {
        BoostingParams { learners, seed }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Boosting {
    rounds: Vec<(FilteredForest, f64)>,
    n_classes: usize,
}

impl Estimator for BoostingParams {
    type Model = Boosting;

    fn fit(&self, table: &Table) -> Result<Boosting> {
        let first = self.learners.first().ok_or_else(|| {
            Error::Training(LinfaError::Parameters(
                "boosting needs at least one learner".into(),
            ))
        })?;
        let n_classes = first.n_classes();
        let n = table.n_rows();
        let truth = labels(table);
        // errors are clamped away from the no-skill bound so every round
        // keeps a positive vote
        let error_cap = 1.0 - 1.0 / n_classes as f64 - ERROR_FLOOR;

        let mut rng = SmallRng::seed_from_u64(self.seed);
        let mut weights = vec![1.0 / n as f64; n];
        let mut rounds = Vec::with_capacity(self.learners.len());

        for (round, params) in self.learners.iter().enumerate() {
            let picker = WeightedIndex::new(&weights)
                .map_err(|e| Error::InvalidTable(format!("degenerate row weights: {}", e)))?;
            let resample: Vec<usize> = (0..n).map(|_| picker.sample(&mut rng)).collect();
            let model = params.fit(&table.select_rows(&resample))?;

            let predictions = model.predict(table);
            let error = weights
                .iter()
                .zip(predictions.iter())
                .zip(truth.iter())
                .filter(|((_, p), t)| p != t)
                .map(|((w, _), _)| w)
                .sum::<f64>()
                .clamp(ERROR_FLOOR, error_cap);
            let alpha = ((1.0 - error) / error).ln() + (n_classes as f64 - 1.0).ln();
            debug!(round, source = model.source(), error, alpha, "boosting round");

            let scale = alpha.exp();
            for (weight, (p, t)) in weights
                .iter_mut()
                .zip(predictions.iter().zip(truth.iter()))
            {
                if p != t {
                    *weight *= scale;
                }
            }
            let total: f64 = weights.iter().sum();
            for weight in &mut weights {
                *weight /= total;
            }

            rounds.push((model, alpha));
        }

        Ok(Boosting { rounds, n_classes })
    }
}

impl Classifier for Boosting {
    fn n_classes(&self) -> usize {
        self.n_classes
    }

    fn predict_proba(&self, table: &Table) -> Array2<f64> {
        let mut scores = Array2::<f64>::zeros((table.n_rows(), self.n_classes));
        let total: f64 = self.rounds.iter().map(|(_, alpha)| alpha).sum();
        for (model, alpha) in &self.rounds {
            for (row, &class) in model.predict(table).iter().enumerate() {
                scores[[row, class]] += alpha;
            }
        }
        scores / total
    }
}

/// Stacked generalization: a meta forest trained on out-of-fold class
/// distributions of the base learners.
#[derive(Debug, Clone)]
pub struct StackingParams {
    bases: Vec<FilteredForestParams>,
    meta_size: usize,
    folds: usize,
    seed: u64,
}

impl StackingParams {
    pub fn new(bases: Vec<FilteredForestParams>, folds: usize, seed: u64) -> Self {
        StackingParams {
            bases,
            meta_size: 100,
            folds,
            seed,
        }
    }

    pub fn meta_size(mut self, size: usize) -> Self {
        self.meta_size = size;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stacking {
    bases: Vec<FilteredForest>,
    meta: Forest,
    n_classes: usize,
}

impl Stacking {
    fn meta_features(&self, table: &Table) -> Array2<f64> {
        let mut features = Array2::zeros((table.n_rows(), self.bases.len() * self.n_classes));
        for (index, base) in self.bases.iter().enumerate() {
            let proba = base.predict_proba(table);
            features
                .slice_mut(ndarray::s![.., index * self.n_classes..(index + 1) * self.n_classes])
                .assign(&proba);
        }
        features
    }
}

impl Estimator for StackingParams {
    type Model = Stacking;

    fn fit(&self, table: &Table) -> Result<Stacking> {
        let first = self.bases.first().ok_or_else(|| {
            Error::Training(LinfaError::Parameters(
                "stacking needs at least one base learner".into(),
            ))
        })?;
        let n_classes = first.n_classes();
        let n = table.n_rows();
        if self.folds < 2 || n < self.folds {
            return Err(Error::InvalidTable(format!(
                "cannot split {} rows into {} stacking folds",
                n, self.folds
            )));
        }

        let mut indices: Vec<usize> = (0..n).collect();
        indices.shuffle(&mut SmallRng::seed_from_u64(self.seed));

        // out-of-fold base distributions become the meta training records
        let mut meta_records = Array2::<f64>::zeros((n, self.bases.len() * n_classes));
        for fold in 0..self.folds {
            let lo = fold * n / self.folds;
            let hi = (fold + 1) * n / self.folds;
            let train_rows: Vec<usize> = indices[..lo]
                .iter()
                .chain(&indices[hi..])
                .copied()
                .collect();
            let fold_train = table.select_rows(&train_rows);
            let holdout = table.select_rows(&indices[lo..hi]);

            for (index, params) in self.bases.iter().enumerate() {
                let proba = params.fit(&fold_train)?.predict_proba(&holdout);
                for (offset, &row) in indices[lo..hi].iter().enumerate() {
                    for class in 0..n_classes {
                        meta_records[[row, index * n_classes + class]] = proba[[offset, class]];
                    }
                }
            }
        }

        let bases: Vec<FilteredForest> = self
            .bases
            .par_iter()
            .map(|params| params.fit(table))
            .collect::<Result<_>>()?;

        let meta = Forest::params(self.meta_size)
            .n_classes(n_classes)
            .seed(self.seed)
            .fit(&Dataset::new(meta_records, labels(table)))?;

        Ok(Stacking {
            bases,
            meta,
            n_classes,
        })
    }
}

impl Classifier for Stacking {
    fn n_classes(&self) -> usize {
        self.n_classes
    }

    fn predict_proba(&self, table: &Table) -> Array2<f64> {
        self.meta.predict_proba(&self.meta_features(table))
    }
}

/// Unweighted average of the class distributions of pre-trained models.
#[derive(Debug, Clone)]
pub struct VotingParams {
    models: Vec<FilteredForest>,
}

impl VotingParams {
    pub fn new(models: Vec<FilteredForest>) -> Self {
        VotingParams { models }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Voting {
    models: Vec<FilteredForest>,
    n_classes: usize,
}

impl Estimator for VotingParams {
    type Model = Voting;

    /// The members arrive already trained, so fitting only validates the
    /// committee.
    fn fit(&self, _table: &Table) -> Result<Voting> {
        let first = self.models.first().ok_or_else(|| {
            Error::Training(LinfaError::Parameters(
                "voting needs at least one model".into(),
            ))
        })?;
        Ok(Voting {
            n_classes: first.n_classes(),
            models: self.models.clone(),
        })
    }
}

impl Classifier for Voting {
    fn n_classes(&self) -> usize {
        self.n_classes
    }

    fn predict_proba(&self, table: &Table) -> Array2<f64> {
        let mut scores = Array2::<f64>::zeros((table.n_rows(), self.n_classes));
        for model in &self.models {
            scores += &model.predict_proba(table);
        }
        scores / self.models.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fusion::SourceColumns;
    use crate::table::{Attribute, MISSING};

    /// Two sources with disjoint column ranges, each predictive on its own.
    fn two_source_table(n: usize) -> (Table, Vec<SourceColumns>) {
        let mut table = Table::new(
            "fused",
            vec![
                Attribute::numeric("a1"),
                Attribute::numeric("b1"),
                Attribute::numeric("b2"),
                Attribute::nominal("class", vec!["low".into(), "high".into()]),
            ],
        );
        for i in 0..n {
            let x = i as f64 / n as f64;
            let label = if x > 0.5 { 1.0 } else { 0.0 };
            table.push_row(vec![x, 1.0 - x, x * 2.0, label]).unwrap();
        }
        let sources = vec![
            SourceColumns { name: "alpha".into(), start: 0, len: 1 },
            SourceColumns { name: "beta".into(), start: 1, len: 2 },
        ];
        (table, sources)
    }

    fn base_params(sources: &[SourceColumns]) -> Vec<FilteredForestParams> {
        sources
            .iter()
            .map(|s| FilteredForestParams::new(s, 10, 2, 7))
            .collect()
    }

    fn accuracy<M: Classifier>(model: &M, table: &Table) -> f64 {
        let label = table.label_index();
        let predictions = model.predict(table);
        let correct = (0..table.n_rows())
            .filter(|&row| predictions[row] == table.value(row, label) as usize)
            .count();
        correct as f64 / table.n_rows() as f64
    }

    #[test]
    fn boosting_learns_and_keeps_one_round_per_learner() {
        let (table, sources) = two_source_table(60);
        let model = BoostingParams::new(base_params(&sources), 11)
            .fit(&table)
            .unwrap();
        assert_eq!(model.rounds.len(), 2);
        assert!(accuracy(&model, &table) > 0.9);
    }

    #[test]
    fn boosting_rejects_an_empty_learner_list() {
        let (table, _) = two_source_table(20);
        assert!(BoostingParams::new(vec![], 11).fit(&table).is_err());
    }

    #[test]
    fn stacking_learns_from_base_distributions() {
        let (table, sources) = two_source_table(60);
        let model = StackingParams::new(base_params(&sources), 5, 11)
            .fit(&table)
            .unwrap();
        assert_eq!(model.bases.len(), 2);
        assert!(accuracy(&model, &table) > 0.9);
    }

    #[test]
    fn stacking_rejects_too_few_rows() {
        let (table, sources) = two_source_table(5);
        let result = StackingParams::new(base_params(&sources), 10, 11).fit(&table);
        assert!(matches!(result, Err(Error::InvalidTable(_))));
    }

    #[test]
    fn voting_averages_member_distributions() {
        let (table, sources) = two_source_table(60);
        let members: Vec<FilteredForest> = base_params(&sources)
            .iter()
            .map(|p| p.fit(&table).unwrap())
            .collect();
        let model = VotingParams::new(members.clone()).fit(&table).unwrap();

        let proba = model.predict_proba(&table);
        let expected =
            (members[0].predict_proba(&table) + members[1].predict_proba(&table)) / 2.0;
        assert_eq!(proba, expected);
        assert!(accuracy(&model, &table) > 0.9);
    }

    #[test]
    fn voting_rejects_an_empty_committee() {
        let (table, _) = two_source_table(20);
        assert!(VotingParams::new(vec![]).fit(&table).is_err());
    }

    #[test]
    fn ensembles_tolerate_missing_source_coverage() {
        let (mut table, sources) = two_source_table(40);
        table.push_row(vec![MISSING, 0.9, 0.2, 0.0]).unwrap();
        table.push_row(vec![0.1, MISSING, MISSING, 0.0]).unwrap();
        let model = BoostingParams::new(base_params(&sources), 11)
            .fit(&table)
            .unwrap();
        assert_eq!(model.predict(&table).len(), table.n_rows());
    }
}
