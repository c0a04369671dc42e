//! Model persistence
//!
//! Trained models are serialized to JSON, one file per (strategy, source,
//! metric). A missing or undecodable file is fatal to the caller: the voting
//! strategy in particular must never silently proceed with a partial
//! committee.

use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::error::Result;

pub fn save_model<M: Serialize, P: AsRef<Path>>(model: &M, path: P) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_string(model)?)?;
    debug!(path = %path.display(), "model saved");
    Ok(())
}

pub fn load_model<M: DeserializeOwned, P: AsRef<Path>>(path: P) -> Result<M> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)?;
    debug!(path = %path.display(), "model loaded");
    Ok(serde_json::from_str(&content)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fusion::SourceColumns;
    use crate::learner::{Classifier, Estimator, FilteredForest, FilteredForestParams};
    use crate::table::{Attribute, Table};

    fn trained_model() -> (FilteredForest, Table) {
        let mut table = Table::new(
            "t",
            vec![
                Attribute::numeric("f1"),
                Attribute::nominal("class", vec!["low".into(), "high".into()]),
            ],
        );
        for i in 0..30 {
            let x = i as f64 / 30.0;
            table
                .push_row(vec![x, if x > 0.5 { 1.0 } else { 0.0 }])
                .unwrap();
        }
        let source = SourceColumns { name: "alpha".into(), start: 0, len: 1 };
        let model = FilteredForestParams::new(&source, 5, 2, 7)
            .fit(&table)
            .unwrap();
        (model, table)
    }

    #[test]
    fn models_survive_a_save_and_load() {
        let (model, table) = trained_model();
        let dir = std::env::temp_dir().join(format!("demolearn-store-{}", std::process::id()));
        let path = dir.join("gender").join("alpha-recall.json");

        save_model(&model, &path).unwrap();
        let restored: FilteredForest = load_model(&path).unwrap();
        assert_eq!(restored.predict(&table), model.predict(&table));

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn loading_a_missing_model_is_an_error() {
        let path = std::env::temp_dir().join("demolearn-no-such-model.json");
        assert!(load_model::<FilteredForest, _>(&path).is_err());
    }

    #[test]
    fn loading_a_corrupt_model_is_an_error() {
        let dir = std::env::temp_dir().join(format!("demolearn-corrupt-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("broken.json");
        fs::write(&path, "{not json").unwrap();
        assert!(load_model::<FilteredForest, _>(&path).is_err());
        fs::remove_dir_all(&dir).ok();
    }
}
