//! Classifier evaluation
//!
//! Builds a confusion matrix over the label vocabulary (so classes absent
//! from the test split still occupy a row and score zero), derives accuracy
//! and per-class recall/f-measure, and macro-averages uniformly across
//! classes, ignoring class support. Results across a run are grouped by kind
//! and only the best per kind is retained.

use std::fmt;

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::Result;
use crate::learner::{Classifier, Estimator};
use crate::table::{is_missing, Table};

/// A per-class scoring family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Metric {
    Recall,
    FMeasure,
}

impl Metric {
    pub const ALL: [Metric; 2] = [Metric::Recall, Metric::FMeasure];

    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Recall => "recall",
            Metric::FMeasure => "f-measure",
        }
    }

    fn result_kind(&self) -> ResultKind {
        match self {
            Metric::Recall => ResultKind::MacroRecall,
            Metric::FMeasure => ResultKind::MacroFMeasure,
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Confusion matrix with truth on rows and prediction on columns.
#[derive(Debug, Clone)]
pub struct Evaluation {
    classes: Vec<String>,
    matrix: Array2<usize>,
}

impl Evaluation {
    pub fn new(classes: Vec<String>) -> Self {
        let n = classes.len();
        Evaluation {
            classes,
            matrix: Array2::zeros((n, n)),
        }
    }

    pub fn observe(&mut self, truth: usize, predicted: usize) {
        self.matrix[[truth, predicted]] += 1;
    }

    pub fn n_classes(&self) -> usize {
        self.classes.len()
    }

    pub fn class_name(&self, class: usize) -> &str {
        &self.classes[class]
    }

    pub fn accuracy(&self) -> f64 {
        let total: usize = self.matrix.sum();
        if total == 0 {
            return 0.0;
        }
        self.matrix.diag().sum() as f64 / total as f64
    }

    pub fn recall(&self, class: usize) -> f64 {
        let support: usize = self.matrix.row(class).sum();
        if support == 0 {
            return 0.0;
        }
        self.matrix[[class, class]] as f64 / support as f64
    }

    pub fn precision(&self, class: usize) -> f64 {
        let predicted: usize = self.matrix.column(class).sum();
        if predicted == 0 {
            return 0.0;
        }
        self.matrix[[class, class]] as f64 / predicted as f64
    }

    pub fn f_measure(&self, class: usize) -> f64 {
        let precision = self.precision(class);
        let recall = self.recall(class);
        if precision + recall == 0.0 {
            return 0.0;
        }
        2.0 * precision * recall / (precision + recall)
    }

    pub fn metric(&self, class: usize, metric: Metric) -> f64 {
        match metric {
            Metric::Recall => self.recall(class),
            Metric::FMeasure => self.f_measure(class),
        }
    }

    /// Unweighted mean of the per-class metric across all classes.
    pub fn macro_average(&self, metric: Metric) -> f64 {
        if self.classes.is_empty() {
            return 0.0;
        }
        (0..self.classes.len())
            .map(|class| self.metric(class, metric))
            .sum::<f64>()
            / self.classes.len() as f64
    }
}

/// The kind of score an [`EvaluationResult`] carries. Results are only
/// compared within the same kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResultKind {
    Accuracy,
    MacroRecall,
    MacroFMeasure,
}

impl ResultKind {
    pub const ALL: [ResultKind; 3] = [
        ResultKind::Accuracy,
        ResultKind::MacroRecall,
        ResultKind::MacroFMeasure,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            ResultKind::Accuracy => "accuracy",
            ResultKind::MacroRecall => "macro recall",
            ResultKind::MacroFMeasure => "macro f-measure",
        }
    }
}

/// One scored (strategy, metric) outcome of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationResult {
    pub kind: ResultKind,
    pub strategy: String,
    pub score: f64,
    pub oversampled: bool,
}

impl EvaluationResult {
    pub fn new(kind: ResultKind, strategy: &str, score: f64) -> Self {
        EvaluationResult {
            kind,
            strategy: strategy.to_string(),
            score,
            oversampled: false,
        }
    }
}

impl fmt::Display for EvaluationResult {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}: {} ({}{})",
            self.kind.label(),
            self.score,
            self.strategy,
            if self.oversampled { "(oversampling)" } else { "" }
        )
    }
}

/// Best result per kind, in kind order. Deterministic under a fixed input
/// order: only a strictly greater score displaces the current best.
pub fn best_per_kind(results: &[EvaluationResult]) -> Vec<&EvaluationResult> {
    ResultKind::ALL
        .iter()
        .filter_map(|&kind| {
            let mut best: Option<&EvaluationResult> = None;
            for result in results.iter().filter(|r| r.kind == kind) {
                if best.map_or(true, |b| result.score > b.score) {
                    best = Some(result);
                }
            }
            best
        })
        .collect()
}

/// Fits the estimator on the train table and scores it on the held-out test
/// table. A fit failure aborts this one unit and is reported to the caller.
pub fn build_and_evaluate<E: Estimator>(
    estimator: &E,
    train: &Table,
    test: &Table,
    name: &str,
    metric: Metric,
) -> Result<(E::Model, Vec<EvaluationResult>)> {
    let model = estimator.fit(train)?;
    let results = evaluate_model(&model, test, name, metric)?;
    Ok((model, results))
}

/// Scores an already-trained model: one accuracy result plus one macro-average
/// result for the requested metric family.
pub fn evaluate_model<M: Classifier>(
    model: &M,
    test: &Table,
    name: &str,
    metric: Metric,
) -> Result<Vec<EvaluationResult>> {
    let mut evaluation = Evaluation::new(test.label_values()?.to_vec());
    let predictions = model.predict(test);
    let label = test.label_index();
    for (row, &predicted) in predictions.iter().enumerate() {
        let truth = test.value(row, label);
        if !is_missing(truth) {
            evaluation.observe(truth as usize, predicted);
        }
    }

    for class in 0..evaluation.n_classes() {
        debug!(
            strategy = name,
            class = evaluation.class_name(class),
            score = evaluation.metric(class, metric),
            "per-class {}",
            metric
        );
    }
    let macro_average = evaluation.macro_average(metric);
    info!(
        strategy = name,
        accuracy = evaluation.accuracy(),
        macro_average,
        %metric,
        "evaluated"
    );

    Ok(vec![
        EvaluationResult::new(ResultKind::Accuracy, name, evaluation.accuracy()),
        EvaluationResult::new(metric.result_kind(), name, macro_average),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn evaluation() -> Evaluation {
        let mut e = Evaluation::new(vec!["a".into(), "b".into(), "c".into()]);
        // truth a: 2 correct, 1 as b
        e.observe(0, 0);
        e.observe(0, 0);
        e.observe(0, 1);
        // truth b: 1 correct, 1 as a
        e.observe(1, 1);
        e.observe(1, 0);
        // class c never occurs
        e
    }

    #[test]
    fn macro_average_ignores_class_support() {
        let e = evaluation();
        assert_abs_diff_eq!(e.recall(0), 2.0 / 3.0);
        assert_abs_diff_eq!(e.recall(1), 0.5);
        assert_abs_diff_eq!(e.recall(2), 0.0);
        // the empty class still counts toward the average
        assert_abs_diff_eq!(
            e.macro_average(Metric::Recall),
            (2.0 / 3.0 + 0.5) / 3.0,
            epsilon = 1e-12
        );
    }

    #[test]
    fn accuracy_counts_the_diagonal() {
        let e = evaluation();
        assert_abs_diff_eq!(e.accuracy(), 3.0 / 5.0);
    }

    #[test]
    fn f_measure_handles_empty_classes() {
        let e = evaluation();
        assert_eq!(e.f_measure(2), 0.0);
        assert!(e.f_measure(0) > 0.0);
    }

    #[test]
    fn best_per_kind_is_stable_and_maximal() {
        let results = vec![
            EvaluationResult::new(ResultKind::Accuracy, "alpha", 0.6),
            EvaluationResult::new(ResultKind::Accuracy, "beta", 0.8),
            EvaluationResult::new(ResultKind::Accuracy, "gamma", 0.8),
            EvaluationResult::new(ResultKind::MacroRecall, "alpha", 0.4),
        ];

        for _ in 0..3 {
            let best = best_per_kind(&results);
            assert_eq!(best.len(), 2);
            // ties keep the first encountered
            assert_eq!(best[0].strategy, "beta");
            assert_eq!(best[1].strategy, "alpha");
            assert!(results
                .iter()
                .filter(|r| r.kind == ResultKind::Accuracy)
                .all(|r| best[0].score >= r.score));
        }
    }

    #[test]
    fn display_marks_oversampled_results() {
        let mut result = EvaluationResult::new(ResultKind::MacroFMeasure, "vote", 0.5);
        result.oversampled = true;
        assert_eq!(result.to_string(), "macro f-measure: 0.5 (vote(oversampling))");
    }
}
