//! Single-user classification
//!
//! Serves one user's feature vector against a persisted model. The vector
//! arrives as strings in fused-schema order; empty and `?` cells, and nominal
//! values outside the attribute vocabulary, become the missing sentinel. A
//! prediction the model gives no weight comes back as an empty label.

use std::path::Path;

use serde::de::DeserializeOwned;

use crate::error::{Error, Result};
use crate::learner::Classifier;
use crate::store;
use crate::table::{Attribute, AttributeKind, Table, MISSING};

/// A trained model paired with the fused schema it was trained on.
pub struct UserClassifier<M> {
    schema: Table,
    model: M,
}

impl<M: Classifier + DeserializeOwned> UserClassifier<M> {
    /// Loads the schema from a persisted fused dataset and the model from
    /// the store.
    pub fn from_files<P: AsRef<Path>, Q: AsRef<Path>>(schema: P, model: Q) -> Result<Self> {
        Ok(UserClassifier {
            schema: Table::load(schema)?,
            model: store::load_model(model)?,
        })
    }
}

impl<M: Classifier> UserClassifier<M> {
    pub fn new(schema: Table, model: M) -> Self {
        UserClassifier { schema, model }
    }

    /// Classifies one feature vector given in fused-schema order, label
    /// column excluded. Returns the predicted label, or an empty string when
    /// the model assigns no class any weight.
    pub fn classify(&self, cells: &[&str]) -> Result<String> {
        let n_features = self.schema.label_index();
        if cells.len() != n_features {
            return Err(Error::InvalidTable(format!(
                "feature vector has {} cells, schema has {} feature columns",
                cells.len(),
                n_features
            )));
        }

        let mut row: Vec<f64> = cells
            .iter()
            .zip(self.schema.attributes())
            .map(|(cell, attribute)| parse_cell(cell, attribute))
            .collect();
        row.push(MISSING);
        let mut query = Table::new("query", self.schema.attributes().to_vec());
        query.push_row(row)?;

        let proba = self.model.predict_proba(&query);
        let mut best = 0;
        for (class, &weight) in proba.row(0).iter().enumerate() {
            if weight > proba[[0, best]] {
                best = class;
            }
        }
        if proba[[0, best]] <= 0.0 {
            return Ok(String::new());
        }
        Ok(self.schema.label_values()?[best].clone())
    }
}

fn parse_cell(cell: &str, attribute: &Attribute) -> f64 {
    let cell = cell.trim();
    if cell.is_empty() || cell == "?" {
        return MISSING;
    }
    match attribute.kind() {
        AttributeKind::Numeric => cell.parse().unwrap_or(MISSING),
        AttributeKind::Nominal(values) => values
            .iter()
            .position(|v| v.as_str() == cell)
            .map(|i| i as f64)
            .unwrap_or(MISSING),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fusion::SourceColumns;
    use crate::learner::{Estimator, FilteredForest, FilteredForestParams};
    use ndarray::Array2;

    fn fixture() -> (Table, FilteredForest) {
        let mut table = Table::new(
            "fullTrainGender",
            vec![
                Attribute::numeric("f1"),
                Attribute::nominal("f2", vec!["x".into(), "y".into()]),
                Attribute::nominal("gender", vec!["low".into(), "high".into()]),
            ],
        );
        for i in 0..40 {
            let x = i as f64 / 40.0;
            let label = if x > 0.5 { 1.0 } else { 0.0 };
            table.push_row(vec![x, (i % 2) as f64, label]).unwrap();
        }
        let source = SourceColumns { name: "alpha".into(), start: 0, len: 2 };
        let model = FilteredForestParams::new(&source, 10, 2, 7)
            .fit(&table)
            .unwrap();
        (table, model)
    }

    #[test]
    fn cells_are_parsed_against_the_schema() {
        let (schema, model) = fixture();
        let classifier = UserClassifier::new(schema, model);
        assert_eq!(classifier.classify(&["0.9", "y"]).unwrap(), "high");
        assert_eq!(classifier.classify(&["0.1", "x"]).unwrap(), "low");
    }

    #[test]
    fn missing_and_unknown_cells_become_missing() {
        let (schema, model) = fixture();
        let classifier = UserClassifier::new(schema, model);
        // "?", empty and out-of-vocabulary cells all degrade to missing
        for cells in [["?", "zebra"], ["", "y"], ["0.9", "?"]] {
            let label = classifier.classify(&cells).unwrap();
            assert!(["low", "high"].contains(&label.as_str()), "got '{}'", label);
        }
    }

    #[test]
    fn vector_length_is_checked() {
        let (schema, model) = fixture();
        let classifier = UserClassifier::new(schema, model);
        assert!(matches!(
            classifier.classify(&["1.0"]),
            Err(Error::InvalidTable(_))
        ));
    }

    #[test]
    fn a_weightless_prediction_yields_an_empty_label() {
        struct Silent;
        impl Classifier for Silent {
            fn n_classes(&self) -> usize {
                2
            }
            fn predict_proba(&self, table: &Table) -> Array2<f64> {
                Array2::zeros((table.n_rows(), 2))
            }
        }

        let (schema, _) = fixture();
        let classifier = UserClassifier::new(schema, Silent);
        assert_eq!(classifier.classify(&["0.9", "y"]).unwrap(), "");
    }

    #[test]
    fn loads_schema_and_model_from_disk() {
        let (schema, model) = fixture();
        let dir = std::env::temp_dir().join(format!("demolearn-serve-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        schema.save(dir.join("fullTrainGender.arff")).unwrap();
        store::save_model(&model, dir.join("alpha-recall.json")).unwrap();

        let classifier = UserClassifier::<FilteredForest>::from_files(
            dir.join("fullTrainGender.arff"),
            dir.join("alpha-recall.json"),
        )
        .unwrap();
        assert_eq!(classifier.classify(&["0.9", "y"]).unwrap(), "high");

        std::fs::remove_dir_all(&dir).ok();
    }
}
