//! Offline scoring of fitted artifacts against labeled students.
//!
//! Results are written as a tab-separated table, one row per model, in the
//! same layout the feature-selection experiments use.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use csv::WriterBuilder;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::warn;

use crate::classifier::Classifier;
use crate::error::PredictError;
use crate::input::Form;
use crate::models::{StudentRecord, CLASS_NAMES};
use crate::pipeline::Pipeline;
use crate::predict::classify_record;
use crate::schema::FormSchema;

pub const RESULTS_COLUMNS: [&str; 7] = [
    "Model",
    "Selector",
    "K",
    "F1_macro_mean",
    "F1_macro_std",
    "BalAcc_mean",
    "BalAcc_std",
];
pub const DEFAULT_TARGET_COLUMN: &str = "Target";
pub const DEFAULT_SPLITS: usize = 5;
pub const DEFAULT_SEED: u64 = 42;

#[derive(Debug, Clone)]
pub struct LabeledRecord {
    pub record: StudentRecord,
    pub target: usize,
}

#[derive(Debug, Default)]
pub struct LabeledSet {
    pub records: Vec<LabeledRecord>,
    pub skipped: usize,
}

impl LabeledSet {
    pub fn targets(&self) -> Vec<usize> {
        self.records.iter().map(|r| r.target).collect()
    }
}

/// Accepts outcome names (any case) or their class indices.
pub fn parse_target(raw: &str) -> Option<usize> {
    let raw = raw.trim();
    if let Ok(index) = raw.parse::<usize>() {
        return (index < CLASS_NAMES.len()).then_some(index);
    }
    CLASS_NAMES
        .iter()
        .position(|name| name.eq_ignore_ascii_case(raw))
}

/// Validates each labeled row; rows that fail are skipped and counted.
pub fn prepare(schema: &FormSchema, forms: &[Form], target_column: &str) -> LabeledSet {
    let mut set = LabeledSet::default();
    for (row, form) in forms.iter().enumerate() {
        let Some(target) = form.get(target_column).and_then(|t| parse_target(t)) else {
            warn!(row, column = target_column, "skipping row without a valid target");
            set.skipped += 1;
            continue;
        };
        match schema.parse(form) {
            Ok(record) => set.records.push(LabeledRecord { record, target }),
            Err(e) => {
                warn!(row, error = %e, "skipping invalid row");
                set.skipped += 1;
            }
        }
    }
    set
}

/// Partitions sample indices into `n_splits` folds with per-class
/// proportions preserved. Shuffling is deterministic for a given seed.
pub fn stratified_folds(
    labels: &[usize],
    n_splits: usize,
    seed: u64,
) -> Result<Vec<Vec<usize>>, String> {
    if n_splits < 2 {
        return Err(format!("need at least 2 splits, got {n_splits}"));
    }
    if labels.len() < n_splits {
        return Err(format!(
            "cannot split {} samples into {n_splits} folds",
            labels.len()
        ));
    }

    let mut by_class: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (idx, label) in labels.iter().enumerate() {
        by_class.entry(*label).or_default().push(idx);
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut folds = vec![Vec::new(); n_splits];
    let mut dealt = 0usize;
    for (class, members) in by_class.iter_mut() {
        if members.len() < n_splits {
            warn!(class, members = members.len(), n_splits, "class has fewer members than folds");
        }
        members.shuffle(&mut rng);
        for idx in members.iter() {
            folds[dealt % n_splits].push(*idx);
            dealt += 1;
        }
    }
    Ok(folds)
}

/// Macro-averaged F1 over every label seen in truth or predictions.
/// Predictions outside the known outcomes count as misses.
pub fn macro_f1(truth: &[usize], predicted: &[Option<usize>]) -> f64 {
    let labels: BTreeSet<usize> = truth
        .iter()
        .copied()
        .chain(predicted.iter().flatten().copied())
        .collect();
    if labels.is_empty() {
        return 0.0;
    }

    let total: f64 = labels
        .iter()
        .map(|&label| {
            let (mut tp, mut fp, mut fn_) = (0.0, 0.0, 0.0);
            for (t, p) in truth.iter().zip(predicted) {
                match (*t == label, *p == Some(label)) {
                    (true, true) => tp += 1.0,
                    (false, true) => fp += 1.0,
                    (true, false) => fn_ += 1.0,
                    (false, false) => {}
                }
            }
            let denom = 2.0 * tp + fp + fn_;
            if denom == 0.0 {
                0.0
            } else {
                2.0 * tp / denom
            }
        })
        .sum();
    total / labels.len() as f64
}

/// Mean per-class recall over the classes present in `truth`.
pub fn balanced_accuracy(truth: &[usize], predicted: &[Option<usize>]) -> f64 {
    let mut per_class: BTreeMap<usize, (f64, f64)> = BTreeMap::new();
    for (t, p) in truth.iter().zip(predicted) {
        let entry = per_class.entry(*t).or_insert((0.0, 0.0));
        entry.1 += 1.0;
        if *p == Some(*t) {
            entry.0 += 1.0;
        }
    }
    if per_class.is_empty() {
        return 0.0;
    }
    let recall_sum: f64 = per_class.values().map(|(hit, n)| hit / n).sum();
    recall_sum / per_class.len() as f64
}

/// Mean and population standard deviation.
pub fn mean_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, variance.sqrt())
}

#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationRow {
    pub model: String,
    pub selector: String,
    pub k: usize,
    pub f1_mean: f64,
    pub f1_std: f64,
    pub bal_acc_mean: f64,
    pub bal_acc_std: f64,
}

impl EvaluationRow {
    /// Cells in [`RESULTS_COLUMNS`] order, scores to four decimals.
    pub fn record(&self) -> [String; 7] {
        [
            self.model.clone(),
            self.selector.clone(),
            self.k.to_string(),
            format!("{:.4}", self.f1_mean),
            format!("{:.4}", self.f1_std),
            format!("{:.4}", self.bal_acc_mean),
            format!("{:.4}", self.bal_acc_std),
        ]
    }
}

impl fmt::Display for EvaluationRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.record().join("\t"))
    }
}

/// Scores one artifact fold by fold.
pub fn evaluate_pipeline(
    pipeline: &Pipeline,
    data: &[LabeledRecord],
    folds: &[Vec<usize>],
) -> Result<EvaluationRow, PredictError> {
    let predicted = data
        .iter()
        .map(|row| classify_record(pipeline, &row.record).map(|outcome| outcome.class_index()))
        .collect::<Result<Vec<_>, _>>()?;

    let mut f1_scores = Vec::with_capacity(folds.len());
    let mut bal_scores = Vec::with_capacity(folds.len());
    for fold in folds {
        let truth: Vec<usize> = fold.iter().map(|&i| data[i].target).collect();
        let guesses: Vec<Option<usize>> = fold.iter().map(|&i| predicted[i]).collect();
        f1_scores.push(macro_f1(&truth, &guesses));
        bal_scores.push(balanced_accuracy(&truth, &guesses));
    }

    let (f1_mean, f1_std) = mean_std(&f1_scores);
    let (bal_acc_mean, bal_acc_std) = mean_std(&bal_scores);
    Ok(EvaluationRow {
        model: pipeline.model_name().to_string(),
        selector: "none".to_string(),
        k: pipeline.model_stage().n_features(),
        f1_mean,
        f1_std,
        bal_acc_mean,
        bal_acc_std,
    })
}

/// Tab-separated results table: the header replaces any previous file,
/// rows are appended as they are produced.
pub struct ResultsFile {
    path: PathBuf,
}

fn tsv_writer() -> WriterBuilder {
    let mut builder = WriterBuilder::new();
    builder.delimiter(b'\t').has_headers(false);
    builder
}

impl ResultsFile {
    pub fn create(path: &Path) -> csv::Result<Self> {
        let mut writer = tsv_writer().from_path(path)?;
        writer.write_record(RESULTS_COLUMNS)?;
        writer.flush()?;
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    pub fn append(&self, row: &EvaluationRow) -> csv::Result<()> {
        let file = OpenOptions::new().append(true).open(&self.path)?;
        let mut writer = tsv_writer().from_writer(file);
        writer.write_record(row.record())?;
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{complete_form, sample_pipeline};
    use tempfile::TempDir;

    fn some(values: &[usize]) -> Vec<Option<usize>> {
        values.iter().copied().map(Some).collect()
    }

    #[test]
    fn macro_f1_matches_hand_computation() {
        let truth = [0, 0, 1, 1, 2, 2];
        let predicted = some(&[0, 1, 1, 1, 2, 0]);
        let expected = (0.5 + 0.8 + 2.0 / 3.0) / 3.0;
        assert!((macro_f1(&truth, &predicted) - expected).abs() < 1e-12);
    }

    #[test]
    fn balanced_accuracy_averages_recall() {
        let truth = [0, 0, 1, 1, 2, 2];
        let predicted = some(&[0, 1, 1, 1, 2, 0]);
        assert!((balanced_accuracy(&truth, &predicted) - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn unknown_predictions_count_as_misses() {
        let truth = [0, 1];
        let predicted = vec![None, Some(1)];
        assert_eq!(balanced_accuracy(&truth, &predicted), 0.5);
        assert!((macro_f1(&truth, &predicted) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn mean_std_is_population() {
        let (mean, std) = mean_std(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert_eq!(mean, 5.0);
        assert_eq!(std, 2.0);
        assert_eq!(mean_std(&[]), (0.0, 0.0));
    }

    #[test]
    fn folds_preserve_class_proportions() {
        let labels: Vec<usize> = (0..15).map(|i| if i < 10 { 0 } else { 1 }).collect();
        let folds = stratified_folds(&labels, 5, 42).unwrap();
        assert_eq!(folds.len(), 5);
        for fold in &folds {
            let zeros = fold.iter().filter(|&&i| labels[i] == 0).count();
            assert_eq!(zeros, 2);
            assert_eq!(fold.len(), 3);
        }
        let mut all: Vec<usize> = folds.concat();
        all.sort_unstable();
        assert_eq!(all, (0..15).collect::<Vec<_>>());
        assert_eq!(stratified_folds(&labels, 5, 42).unwrap(), folds);
    }

    #[test]
    fn folds_reject_bad_split_counts() {
        assert!(stratified_folds(&[0, 1, 2], 1, 42).is_err());
        assert!(stratified_folds(&[0, 1], 3, 42).is_err());
    }

    #[test]
    fn targets_accept_names_and_indices() {
        assert_eq!(parse_target("Graduate"), Some(2));
        assert_eq!(parse_target("dropout"), Some(0));
        assert_eq!(parse_target(" 1 "), Some(1));
        assert_eq!(parse_target("3"), None);
        assert_eq!(parse_target("Transferred"), None);
    }

    #[test]
    fn prepare_skips_invalid_rows() {
        let mut good = complete_form();
        good.insert(DEFAULT_TARGET_COLUMN.to_string(), "Graduate".to_string());
        let mut no_target = complete_form();
        no_target.insert(DEFAULT_TARGET_COLUMN.to_string(), "?".to_string());
        let mut bad_field = good.clone();
        bad_field.insert("Debtor".to_string(), "N/A".to_string());

        let set = prepare(
            &FormSchema::student_default(),
            &[good, no_target, bad_field],
            DEFAULT_TARGET_COLUMN,
        );
        assert_eq!(set.records.len(), 1);
        assert_eq!(set.skipped, 2);
        assert_eq!(set.targets(), vec![2]);
    }

    #[test]
    fn evaluates_sample_pipeline_and_writes_table() {
        let schema = FormSchema::student_default();
        let forms: Vec<Form> = [("5", "Graduate"), ("0", "Dropout")]
            .iter()
            .cycle()
            .take(6)
            .map(|(approved, target)| {
                let mut form = complete_form();
                form.insert("Curricular_units_2nd_sem_approved".to_string(), approved.to_string());
                form.insert(DEFAULT_TARGET_COLUMN.to_string(), target.to_string());
                form
            })
            .collect();
        let set = prepare(&schema, &forms, DEFAULT_TARGET_COLUMN);
        let folds = stratified_folds(&set.targets(), 3, DEFAULT_SEED).unwrap();

        let row = evaluate_pipeline(&sample_pipeline(), &set.records, &folds).unwrap();
        assert_eq!(row.k, 7);
        assert_eq!(row.bal_acc_mean, 1.0);
        assert_eq!(row.f1_mean, 1.0);
        assert_eq!(row.f1_std, 0.0);

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("feature_selection_results.txt");
        std::fs::write(&path, "stale contents\n").unwrap();
        let results = ResultsFile::create(&path).unwrap();
        results.append(&row).unwrap();
        results.append(&row).unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = written.lines().collect();
        assert_eq!(
            lines,
            vec![
                "Model\tSelector\tK\tF1_macro_mean\tF1_macro_std\tBalAcc_mean\tBalAcc_std",
                "random_forest\tnone\t7\t1.0000\t0.0000\t1.0000\t0.0000",
                "random_forest\tnone\t7\t1.0000\t0.0000\t1.0000\t0.0000",
            ]
        );
        assert_eq!(row.to_string(), lines[1]);
    }
}
