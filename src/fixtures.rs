//! Shared test data.

use std::collections::HashMap;
use std::path::PathBuf;

use tempfile::TempDir;

use crate::classifier::{DecisionTree, ModelArtifact, RandomForest, SoftmaxRegression};
use crate::features::FeatureEngineer;
use crate::models::StudentRecord;
use crate::pipeline::Pipeline;
use crate::preprocess::{OneHotColumn, Preprocessor, ScaledColumn};
use crate::schema::FormSchema;

pub fn complete_form() -> HashMap<String, String> {
    [
        ("Application_mode", "17 - 2nd phase - general contingent"),
        ("Course", "9119 - Informatics Engineering"),
        ("Previous_qualification", "1 - Secondary education"),
        ("Mother_qualification", "19 - Basic Education 3rd Cycle (9th/10th/11th Year) or Equiv."),
        ("Father_qualification", "1 - Secondary Education - 12th Year of Schooling or Eq."),
        ("Mother_occupation", "5 - Services/Sellers/Security"),
        ("Father_occupation", "9 - Unskilled Workers"),
        ("Application_order", "1"),
        ("Daytime/evening_attendance", "1 - Daytime"),
        ("Displaced", "1 - Yes"),
        ("Debtor", "0 - No"),
        ("Tuition_fees_up_to_date", "1 - Yes"),
        ("Gender", "0 - Female"),
        ("Scholarship_holder", "0 - No"),
        ("Previous_qualification_grade", "132.0"),
        ("Admission_grade", "127.3"),
        ("Age", "19"),
        ("Curricular_units_1st_sem_credited", "0"),
        ("Curricular_units_1st_sem_enrolled", "6"),
        ("Curricular_units_1st_sem_evaluations", "8"),
        ("Curricular_units_1st_sem_approved", "5"),
        ("Curricular_units_1st_sem_grade", "12.4"),
        ("Curricular_units_1st_sem_without_evaluations", "0"),
        ("Curricular_units_2nd_sem_credited", "0"),
        ("Curricular_units_2nd_sem_enrolled", "6"),
        ("Curricular_units_2nd_sem_evaluations", "7"),
        ("Curricular_units_2nd_sem_approved", "5"),
        ("Curricular_units_2nd_sem_grade", "13.1"),
        ("Curricular_units_2nd_sem_without_evaluations", "0"),
        ("Unemployment_rate", "10.8"),
        ("GDP", "1.74"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

pub fn sample_record() -> StudentRecord {
    FormSchema::student_default()
        .parse(&complete_form())
        .expect("fixture form is valid")
}

fn preprocessor() -> Preprocessor {
    let scaled = |column: &str, mean: f64, scale: f64| ScaledColumn {
        column: column.to_string(),
        mean,
        scale,
    };
    Preprocessor {
        numeric: vec![
            scaled("pass_rate_2nd", 0.5, 0.5),
            scaled("Admission_grade", 120.0, 10.0),
            scaled("parent_background_score", 20.0, 10.0),
        ],
        passthrough: vec!["Debtor".to_string(), "Tuition_fees_up_to_date".to_string()],
        one_hot: vec![OneHotColumn {
            column: "age_bin".to_string(),
            categories: vec!["adult".to_string(), "medium".to_string(), "young".to_string()],
            drop_first: true,
        }],
    }
}

/// Two trees over the seven outputs of the sample preprocessor:
/// scaled second-semester pass rate, debtor and tuition flags drive them.
fn sample_forest() -> RandomForest {
    RandomForest {
        n_features: 7,
        classes: vec![0, 1, 2],
        trees: vec![
            DecisionTree {
                feature: vec![0, 3, -2, -2, -2],
                threshold: vec![0.0, 0.5, -2.0, -2.0, -2.0],
                left: vec![1, 3, -1, -1, -1],
                right: vec![2, 4, -1, -1, -1],
                value: vec![
                    vec![16.0, 7.0, 17.0],
                    vec![15.0, 4.0, 1.0],
                    vec![1.0, 3.0, 16.0],
                    vec![6.0, 3.0, 1.0],
                    vec![9.0, 1.0, 0.0],
                ],
            },
            DecisionTree {
                feature: vec![4, -2, 0, -2, -2],
                threshold: vec![0.5, -2.0, 0.5, -2.0, -2.0],
                left: vec![1, -1, 3, -1, -1],
                right: vec![2, -1, 4, -1, -1],
                value: vec![
                    vec![12.0, 7.0, 11.0],
                    vec![8.0, 1.0, 1.0],
                    vec![4.0, 6.0, 10.0],
                    vec![3.0, 4.0, 3.0],
                    vec![1.0, 2.0, 7.0],
                ],
            },
        ],
    }
}

pub fn sample_pipeline() -> Pipeline {
    Pipeline::new(
        "random_forest",
        FeatureEngineer::default(),
        preprocessor(),
        ModelArtifact::RandomForest(sample_forest()),
    )
}

/// Two one-split trees over two features.
pub fn stump_forest() -> RandomForest {
    let stump = |feature: i64, threshold: f64, left: [f64; 3], right: [f64; 3]| {
        let root: Vec<f64> = left.iter().zip(right).map(|(l, r)| l + r).collect();
        DecisionTree {
            feature: vec![feature, -2, -2],
            threshold: vec![threshold, -2.0, -2.0],
            left: vec![1, -1, -1],
            right: vec![2, -1, -1],
            value: vec![root, left.to_vec(), right.to_vec()],
        }
    };
    RandomForest {
        n_features: 2,
        classes: vec![0, 1, 2],
        trees: vec![
            stump(0, 0.5, [8.0, 1.0, 1.0], [1.0, 2.0, 7.0]),
            stump(1, 10.0, [2.0, 2.0, 6.0], [6.0, 2.0, 2.0]),
        ],
    }
}

pub fn two_feature_regression() -> SoftmaxRegression {
    SoftmaxRegression {
        classes: vec![0, 1, 2],
        coefficients: vec![vec![-1.0, 0.0], vec![0.0, 0.0], vec![1.0, 0.5]],
        intercepts: vec![0.0, 0.0, 0.0],
        baseline: vec![1.0, 0.0],
    }
}

/// Writes `contents` to `best_model_<tag>.json` in a fresh temp directory.
/// The directory is removed when the returned guard drops.
pub fn write_temp(tag: &str, contents: &str) -> (TempDir, PathBuf) {
    let dir = TempDir::new().expect("create temp dir");
    let path = dir.path().join(format!("best_model_{tag}.json"));
    std::fs::write(&path, contents).expect("write temp file");
    (dir, path)
}
