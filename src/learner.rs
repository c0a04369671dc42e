//! Base learners
//!
//! [`Forest`] is a bagged ensemble of `linfa-trees` decision trees: bootstrap
//! rows, a feature subset per tree, majority vote at prediction. Its size is
//! the "capacity" the capacity search tunes per source.
//!
//! [`FilteredForest`] composes a forest with a column-subset filter selecting
//! one source's range plus the label, and a row filter dropping rows whose
//! first filtered column is missing (a user absent from the source has the
//! whole range missing, so this removes exactly the uncovered users).

use linfa::error::Error as LinfaError;
use linfa::traits::{Fit, Predict};
use linfa::{Dataset, DatasetBase, ParamGuard};
use linfa_trees::DecisionTree;
use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::fusion::SourceColumns;
use crate::table::{is_missing, Table};

/// Fits a model on a [`Table`] whose last column is the label.
pub trait Estimator {
    type Model: Classifier;

    fn fit(&self, table: &Table) -> Result<Self::Model>;
}

/// A trained model predicting over [`Table`] rows.
pub trait Classifier {
    fn n_classes(&self) -> usize;

    /// Per-row class distribution, one column per label-vocabulary entry.
    fn predict_proba(&self, table: &Table) -> Array2<f64>;

    fn predict(&self, table: &Table) -> Array1<usize> {
        argmax_rows(&self.predict_proba(table))
    }
}

/// Row-wise argmax, first maximum wins.
pub(crate) fn argmax_rows(proba: &Array2<f64>) -> Array1<usize> {
    Array1::from(
        proba
            .outer_iter()
            .map(|row| {
                let mut best = 0;
                for (i, &v) in row.iter().enumerate() {
                    if v > row[best] {
                        best = i;
                    }
                }
                best
            })
            .collect::<Vec<_>>(),
    )
}

/// An ensemble of decision trees trained on bootstrapped, feature-subsampled
/// slices of the data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Forest {
    trees: Vec<DecisionTree<f64, usize>>,
    feature_indices: Vec<Vec<usize>>,
    n_classes: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForestValidParams {
    size: usize,
    max_depth: Option<usize>,
    feature_subsample: f32,
    n_classes: Option<usize>,
    seed: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForestParams(ForestValidParams);

impl ForestParams {
    pub fn new(size: usize) -> Self {
        ForestParams(ForestValidParams {
            size,
            max_depth: None,
            feature_subsample: 1.0,
            n_classes: None,
            seed: 42,
        })
    }

    pub fn max_depth(mut self, depth: Option<usize>) -> Self {
        self.0.max_depth = depth;
        self
    }

    pub fn feature_subsample(mut self, ratio: f32) -> Self {
        self.0.feature_subsample = ratio;
        self
    }

    /// Fixes the width of the predicted class distribution; inferred from the
    /// targets when unset.
    pub fn n_classes(mut self, n_classes: usize) -> Self {
        self.0.n_classes = Some(n_classes);
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.0.seed = seed;
        self
    }
}

impl ParamGuard for ForestParams {
    type Checked = ForestValidParams;
    type Error = LinfaError;

    fn check_ref(&self) -> std::result::Result<&Self::Checked, Self::Error> {
        if self.0.size == 0 {
            return Err(LinfaError::Parameters("forest size must be > 0".into()));
        }
        if !(0.0..=1.0).contains(&self.0.feature_subsample) || self.0.feature_subsample == 0.0 {
            return Err(LinfaError::Parameters(
                "feature_subsample must be in (0, 1]".into(),
            ));
        }
        Ok(&self.0)
    }

    fn check(self) -> std::result::Result<Self::Checked, Self::Error> {
        self.check_ref()?;
        Ok(self.0)
    }
}

impl Fit<Array2<f64>, Array1<usize>, LinfaError> for ForestValidParams {
    type Object = Forest;

    fn fit(
        &self,
        dataset: &DatasetBase<Array2<f64>, Array1<usize>>,
    ) -> std::result::Result<Forest, LinfaError> {
        let n_rows = dataset.records.nrows();
        if n_rows == 0 {
            return Err(LinfaError::NotEnoughSamples);
        }
        let n_features = dataset.records.ncols();
        let n_sub = (((n_features as f32) * self.feature_subsample).ceil() as usize).max(1);
        let n_classes = self.n_classes.unwrap_or_else(|| {
            dataset.targets.iter().max().map(|&c| c + 1).unwrap_or(1)
        });

        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut trees = Vec::with_capacity(self.size);
        let mut feature_indices = Vec::with_capacity(self.size);

        for _ in 0..self.size {
            let rows: Vec<usize> = (0..n_rows).map(|_| rng.gen_range(0..n_rows)).collect();
            let features = sample(&mut rng, n_features, n_sub).into_vec();

            let records = dataset
                .records
                .select(Axis(0), &rows)
                .select(Axis(1), &features);
            let targets = dataset.targets.select(Axis(0), &rows);

            let tree = DecisionTree::params().fit(&Dataset::new(records, targets))?;
            trees.push(tree);
            feature_indices.push(features);
        }

        Ok(Forest {
            trees,
            feature_indices,
            n_classes,
        })
    }
}

impl Forest {
    pub fn params(size: usize) -> ForestParams {
        ForestParams::new(size)
    }

    pub fn size(&self) -> usize {
        self.trees.len()
    }

    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    /// Fraction of trees voting for each class, per row.
    pub fn predict_proba(&self, x: &Array2<f64>) -> Array2<f64> {
        let mut votes = Array2::<f64>::zeros((x.nrows(), self.n_classes));
        for (tree, features) in self.trees.iter().zip(&self.feature_indices) {
            let sub = x.select(Axis(1), features);
            for (row, &class) in tree.predict(&sub).iter().enumerate() {
                if class < self.n_classes {
                    votes[[row, class]] += 1.0;
                }
            }
        }
        votes / self.trees.len() as f64
    }

    pub fn predict(&self, x: &Array2<f64>) -> Array1<usize> {
        argmax_rows(&self.predict_proba(x))
    }
}

/// Parameters of a per-source filtered base learner.
#[derive(Debug, Clone, PartialEq)]
pub struct FilteredForestParams {
    source: String,
    columns: Vec<usize>,
    capacity: usize,
    n_classes: usize,
    seed: u64,
}

impl FilteredForestParams {
    pub fn new(source: &SourceColumns, capacity: usize, n_classes: usize, seed: u64) -> Self {
        FilteredForestParams {
            source: source.name.clone(),
            columns: source.range().collect(),
            capacity,
            n_classes,
            seed,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn n_classes(&self) -> usize {
        self.n_classes
    }
}

/// A forest restricted to one source's column range of the fused schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilteredForest {
    source: String,
    columns: Vec<usize>,
    forest: Forest,
}

impl FilteredForest {
    pub fn source(&self) -> &str {
        &self.source
    }

    fn select_features(&self, table: &Table) -> Array2<f64> {
        let mut data = Vec::with_capacity(table.n_rows() * self.columns.len());
        for row in table.rows() {
            for &column in &self.columns {
                data.push(row[column]);
            }
        }
        Array2::from_shape_vec((table.n_rows(), self.columns.len()), data)
            .expect("row length verified by the table schema")
    }
}

impl Estimator for FilteredForestParams {
    type Model = FilteredForest;

    fn fit(&self, table: &Table) -> Result<FilteredForest> {
        let mut indices = self.columns.clone();
        indices.push(table.label_index());
        let mut filtered = table.select_columns(&indices);
        filtered.retain_rows(|row| !is_missing(row[0]));
        if filtered.is_empty() {
            return Err(Error::EmptyTable(format!(
                "source '{}' covers no row of '{}'",
                self.source,
                table.relation()
            )));
        }

        let dataset = filtered.to_dataset()?;
        let n_features = self.columns.len() as f32;
        let forest = Forest::params(self.capacity)
            .feature_subsample(n_features.sqrt() / n_features)
            .n_classes(self.n_classes)
            .seed(self.seed)
            .fit(&dataset)?;
        Ok(FilteredForest {
            source: self.source.clone(),
            columns: self.columns.clone(),
            forest,
        })
    }
}

impl Classifier for FilteredForest {
    fn n_classes(&self) -> usize {
        self.forest.n_classes()
    }

    fn predict_proba(&self, table: &Table) -> Array2<f64> {
        self.forest.predict_proba(&self.select_features(table))
    }
}
