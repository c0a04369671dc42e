//! End-to-end run over a small synthetic two-source dataset.

use std::fs;
use std::path::PathBuf;

use demolearn::fusion::FusionLayout;
use demolearn::learner::FilteredForest;
use demolearn::{Pipeline, RunConfig, SourceConfig, TargetAttribute, UserClassifier};

const AGE_GROUPS: [&str; 3] = ["AGE10_20", "AGE20_30", "AGE50_INF"];
const EDUCATION: [&str; 3] = ["high school", "university student", "phd"];
const OCCUPATIONS: [&str; 3] = ["legal", "management", "sales and related"];

fn write_dataset(dir: &PathBuf) -> RunConfig {
    let n = 60;
    let mut ground_truth = String::from("_id,ageGroup,gender,relationship,education_level,occupation\n");
    let mut alpha = String::from("_id,a1,a2\n");
    let mut beta = String::from("_id,b1,b2\n");
    let mut test_ids = String::from("_id\n");

    for i in 0..n {
        let gender = if i < n / 2 { "male" } else { "female" };
        let relationship = if i % 2 == 0 { "single" } else { "married" };
        ground_truth.push_str(&format!(
            "u{},{},{},{},{},{}\n",
            i,
            AGE_GROUPS[i % 3],
            gender,
            relationship,
            EDUCATION[i % 3],
            OCCUPATIONS[i % 3],
        ));

        let x = i as f64 / n as f64;
        alpha.push_str(&format!("u{},{},{}\n", i, x, 1.0 - x));
        // beta misses a couple of users, exercising the missing padding
        if i != 3 && i != 4 {
            beta.push_str(&format!("u{},{},{}\n", i, (i % 3) as f64, x * 2.0));
        }
        if i % 5 == 0 {
            test_ids.push_str(&format!("u{}\n", i));
        }
    }

    fs::write(dir.join("gt.csv"), ground_truth).unwrap();
    fs::write(dir.join("alpha.csv"), alpha).unwrap();
    fs::write(dir.join("beta.csv"), beta).unwrap();
    fs::write(dir.join("test.csv"), test_ids).unwrap();

    RunConfig {
        ground_truth: dir.join("gt.csv"),
        test_ids: dir.join("test.csv"),
        id_column: "_id".to_string(),
        sources: vec![
            SourceConfig { name: "alpha".into(), path: dir.join("alpha.csv") },
            SourceConfig { name: "beta".into(), path: dir.join("beta.csv") },
        ],
        dataset_dir: dir.join("datasets"),
        capacity_dir: dir.join("tree-sizes"),
        model_dir: dir.join("models"),
        result_dir: dir.join("results"),
        folds: 3,
        seed: 42,
        capacity_grid: vec![5, 10],
    }
}

#[test]
fn full_run_produces_datasets_models_and_reports() {
    let dir = std::env::temp_dir().join(format!("demolearn-e2e-{}", std::process::id()));
    fs::create_dir_all(&dir).unwrap();
    let config = write_dataset(&dir);

    // fusion and training communicate only through the persisted datasets
    Pipeline::new(config.clone()).fuse().unwrap();
    Pipeline::new(config.clone()).train().unwrap();

    // fused datasets and the layout
    assert!(config.dataset_dir.join("fullTrain.arff").exists());
    assert!(config.dataset_dir.join("fullTest.arff").exists());
    let layout = FusionLayout::load(config.dataset_dir.join("layout.json")).unwrap();
    assert_eq!(layout.sources.len(), 2);
    assert_eq!(layout.n_features, 4);

    for target in TargetAttribute::ALL {
        let suffix = target.suffix();
        assert!(config
            .dataset_dir
            .join(format!("fullTrain{}.arff", suffix))
            .exists());
        // one capacity cache and one report per target
        assert!(config.capacity_dir.join(format!("{}.json", suffix)).exists());
        let report =
            fs::read_to_string(config.result_dir.join(format!("{}.txt", suffix))).unwrap();
        assert!(report.contains("accuracy: "), "report was: {}", report);
        assert!(report.contains("macro recall: "));
        assert!(report.contains("macro f-measure: "));
    }

    // per-source models exist for the voting committee
    for source in ["alpha", "beta"] {
        for metric in ["recall", "f-measure"] {
            let path = config
                .model_dir
                .join("gender")
                .join(format!("{}-{}.json", source, metric));
            assert!(path.exists(), "missing model {}", path.display());
        }
    }

    // a persisted model serves single users through the stored schema
    let classifier = UserClassifier::<FilteredForest>::from_files(
        config.dataset_dir.join("fullTrainGender.arff"),
        config.model_dir.join("gender").join("alpha-recall.json"),
    )
    .unwrap();
    let label = classifier.classify(&["0.1", "0.9", "2", "0.4"]).unwrap();
    assert!(["male", "female"].contains(&label.as_str()), "got '{}'", label);
    let padded = classifier.classify(&["0.1", "0.9", "?", ""]).unwrap();
    assert!(["male", "female"].contains(&padded.as_str()));

    // a second run reuses the capacity cache and overwrites outputs cleanly
    Pipeline::new(config.clone()).run().unwrap();

    fs::remove_dir_all(&dir).ok();
}
