//! Model stage: classifiers that score a preprocessed feature vector and
//! explain the score per input feature.
//!
//! Trees use the array layout of a fitted scikit-learn tree (`feature`,
//! `threshold`, `left`, `right`, per-node class `value`), so exported
//! estimators can be dumped to JSON without conversion.

use serde::{Deserialize, Serialize};

use crate::error::{PredictError, Result};

pub trait Classifier {
    /// Width of the input vector.
    fn n_features(&self) -> usize;

    /// Label emitted for each probability column.
    fn classes(&self) -> &[i64];

    fn predict_proba(&self, x: &[f64]) -> Result<Vec<f64>>;

    fn predict(&self, x: &[f64]) -> Result<i64> {
        self.label_for(&self.predict_proba(x)?)
    }

    /// Label of the most probable column of an already computed
    /// [`Classifier::predict_proba`] row.
    fn label_for(&self, proba: &[f64]) -> Result<i64> {
        let best = argmax(proba)
            .ok_or_else(|| PredictError::prediction("model returned no probabilities"))?;
        self.classes()
            .get(best)
            .copied()
            .ok_or_else(|| PredictError::prediction(format!("class index {best} has no label")))
    }
}

pub trait Explainer {
    /// One row per class (in [`Classifier::classes`] order), one signed
    /// contribution per input feature.
    fn attributions(&self, x: &[f64]) -> Result<Vec<Vec<f64>>>;
}

fn argmax(values: &[f64]) -> Option<usize> {
    values
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, f64)>, (idx, &v)| match best {
            Some((_, top)) if top >= v => best,
            _ => Some((idx, v)),
        })
        .map(|(idx, _)| idx)
}

fn check_classes(classes: &[i64]) -> std::result::Result<(), String> {
    if classes.is_empty() {
        return Err("model has no classes".into());
    }
    for (idx, label) in classes.iter().enumerate() {
        if classes[..idx].contains(label) {
            return Err(format!("class label {label} appears twice"));
        }
    }
    Ok(())
}

fn check_width(expected: usize, x: &[f64]) -> Result<()> {
    if x.len() != expected {
        return Err(PredictError::prediction(format!(
            "model expects {expected} features, got {}",
            x.len()
        )));
    }
    Ok(())
}

/// Array-backed binary decision tree. Leaves have negative children.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    pub feature: Vec<i64>,
    pub threshold: Vec<f64>,
    pub left: Vec<i64>,
    pub right: Vec<i64>,
    /// Class weights (counts or fractions) reaching each node.
    pub value: Vec<Vec<f64>>,
}

impl DecisionTree {
    fn n_nodes(&self) -> usize {
        self.feature.len()
    }

    fn is_leaf(&self, node: usize) -> bool {
        self.left[node] < 0
    }

    fn distribution(&self, node: usize) -> Vec<f64> {
        let row = &self.value[node];
        let total: f64 = row.iter().sum();
        row.iter().map(|v| v / total).collect()
    }

    fn child(&self, node: usize, x: &[f64]) -> usize {
        let feature = self.feature[node] as usize;
        if x[feature] <= self.threshold[node] {
            self.left[node] as usize
        } else {
            self.right[node] as usize
        }
    }

    /// Nodes visited from the root to the leaf reached by `x`.
    fn decision_path(&self, x: &[f64]) -> Vec<usize> {
        let mut path = vec![0];
        let mut node = 0;
        while !self.is_leaf(node) {
            node = self.child(node, x);
            path.push(node);
        }
        path
    }

    fn validate(&self, n_features: usize, n_classes: usize) -> std::result::Result<(), String> {
        let n = self.n_nodes();
        if n == 0 {
            return Err("tree has no nodes".into());
        }
        if self.threshold.len() != n
            || self.left.len() != n
            || self.right.len() != n
            || self.value.len() != n
        {
            return Err("inconsistent node array lengths".into());
        }

        for node in 0..n {
            let row = &self.value[node];
            if row.len() != n_classes {
                return Err(format!("node {node} has {} class weights", row.len()));
            }
            if row.iter().any(|v| !v.is_finite() || *v < 0.0) || row.iter().sum::<f64>() <= 0.0 {
                return Err(format!("node {node} has invalid class weights"));
            }
            if self.is_leaf(node) {
                continue;
            }
            let feature = self.feature[node];
            if feature < 0 || feature as usize >= n_features {
                return Err(format!("node {node} splits on unknown feature {feature}"));
            }
            // Children always follow their parent, which also rules out cycles.
            for child in [self.left[node], self.right[node]] {
                if child <= node as i64 || child as usize >= n {
                    return Err(format!("node {node} has invalid child {child}"));
                }
            }
        }
        Ok(())
    }
}

/// Averaging ensemble of decision trees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    pub n_features: usize,
    pub classes: Vec<i64>,
    pub trees: Vec<DecisionTree>,
}

impl RandomForest {
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.trees.is_empty() {
            return Err("empty forest".into());
        }
        check_classes(&self.classes)?;
        for (idx, tree) in self.trees.iter().enumerate() {
            tree.validate(self.n_features, self.classes.len())
                .map_err(|e| format!("tree {idx}: {e}"))?;
        }
        Ok(())
    }
}

impl Classifier for RandomForest {
    fn n_features(&self) -> usize {
        self.n_features
    }

    fn classes(&self) -> &[i64] {
        &self.classes
    }

    fn predict_proba(&self, x: &[f64]) -> Result<Vec<f64>> {
        check_width(self.n_features, x)?;
        let mut proba = vec![0.0; self.classes.len()];
        for tree in &self.trees {
            let leaf = *tree.decision_path(x).last().unwrap_or(&0);
            for (acc, p) in proba.iter_mut().zip(tree.distribution(leaf)) {
                *acc += p;
            }
        }
        let n_trees = self.trees.len() as f64;
        Ok(proba.into_iter().map(|p| p / n_trees).collect())
    }
}

impl Explainer for RandomForest {
    /// Decision-path attribution: every split credits its feature with the
    /// change in class distribution between parent and child. Root
    /// distribution plus the row sum equals the predicted probability.
    fn attributions(&self, x: &[f64]) -> Result<Vec<Vec<f64>>> {
        check_width(self.n_features, x)?;
        let n_classes = self.classes.len();
        let mut rows = vec![vec![0.0; self.n_features]; n_classes];

        for tree in &self.trees {
            let path = tree.decision_path(x);
            for step in path.windows(2) {
                let (parent, child) = (step[0], step[1]);
                let feature = tree.feature[parent] as usize;
                let before = tree.distribution(parent);
                let after = tree.distribution(child);
                for class in 0..n_classes {
                    rows[class][feature] += after[class] - before[class];
                }
            }
        }

        let n_trees = self.trees.len() as f64;
        for row in &mut rows {
            for value in row.iter_mut() {
                *value /= n_trees;
            }
        }
        Ok(rows)
    }
}

/// Multinomial logistic regression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoftmaxRegression {
    pub classes: Vec<i64>,
    /// `classes.len()` rows of `n_features` weights.
    pub coefficients: Vec<Vec<f64>>,
    pub intercepts: Vec<f64>,
    /// Expected input used as the attribution reference; zeros when empty.
    #[serde(default)]
    pub baseline: Vec<f64>,
}

impl SoftmaxRegression {
    fn width(&self) -> usize {
        self.coefficients.first().map_or(0, Vec::len)
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        check_classes(&self.classes)?;
        if self.coefficients.len() != self.classes.len() || self.intercepts.len() != self.classes.len() {
            return Err("coefficient rows and intercepts must match the class count".into());
        }
        let width = self.width();
        if self.coefficients.iter().any(|row| row.len() != width) {
            return Err("coefficient rows have different widths".into());
        }
        if !self.baseline.is_empty() && self.baseline.len() != width {
            return Err(format!("baseline has {} entries, expected {width}", self.baseline.len()));
        }
        let all_finite = self
            .coefficients
            .iter()
            .flatten()
            .chain(&self.intercepts)
            .chain(&self.baseline)
            .all(|v| v.is_finite());
        if !all_finite {
            return Err("non-finite weights".into());
        }
        Ok(())
    }
}

impl Classifier for SoftmaxRegression {
    fn n_features(&self) -> usize {
        self.width()
    }

    fn classes(&self) -> &[i64] {
        &self.classes
    }

    fn predict_proba(&self, x: &[f64]) -> Result<Vec<f64>> {
        check_width(self.width(), x)?;
        let logits: Vec<f64> = self
            .coefficients
            .iter()
            .zip(&self.intercepts)
            .map(|(row, b)| row.iter().zip(x).map(|(w, v)| w * v).sum::<f64>() + b)
            .collect();
        let max = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let exp: Vec<f64> = logits.iter().map(|l| (l - max).exp()).collect();
        let total: f64 = exp.iter().sum();
        Ok(exp.into_iter().map(|e| e / total).collect())
    }
}

impl Explainer for SoftmaxRegression {
    fn attributions(&self, x: &[f64]) -> Result<Vec<Vec<f64>>> {
        check_width(self.width(), x)?;
        let rows = self
            .coefficients
            .iter()
            .map(|row| {
                row.iter()
                    .zip(x)
                    .enumerate()
                    .map(|(j, (w, v))| w * (v - self.baseline.get(j).copied().unwrap_or(0.0)))
                    .collect()
            })
            .collect();
        Ok(rows)
    }
}

/// The serialized model stage, tagged by `kind`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelArtifact {
    RandomForest(RandomForest),
    SoftmaxRegression(SoftmaxRegression),
}

impl ModelArtifact {
    pub fn kind(&self) -> &'static str {
        match self {
            ModelArtifact::RandomForest(_) => "random_forest",
            ModelArtifact::SoftmaxRegression(_) => "softmax_regression",
        }
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        match self {
            ModelArtifact::RandomForest(model) => model.validate(),
            ModelArtifact::SoftmaxRegression(model) => model.validate(),
        }
    }

    fn inner(&self) -> &(dyn ClassifierExplainer + '_) {
        match self {
            ModelArtifact::RandomForest(model) => model as &dyn ClassifierExplainer,
            ModelArtifact::SoftmaxRegression(model) => model,
        }
    }
}

trait ClassifierExplainer: Classifier + Explainer {}
impl<T: Classifier + Explainer> ClassifierExplainer for T {}

impl Classifier for ModelArtifact {
    fn n_features(&self) -> usize {
        self.inner().n_features()
    }

    fn classes(&self) -> &[i64] {
        self.inner().classes()
    }

    fn predict_proba(&self, x: &[f64]) -> Result<Vec<f64>> {
        self.inner().predict_proba(x)
    }
}

impl Explainer for ModelArtifact {
    fn attributions(&self, x: &[f64]) -> Result<Vec<Vec<f64>>> {
        self.inner().attributions(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{stump_forest, two_feature_regression};

    #[test]
    fn forest_averages_leaf_distributions() {
        let forest = stump_forest();
        let proba = forest.predict_proba(&[0.0, 5.0]).unwrap();
        // Tree 0 leaf [8,1,1]/10, tree 1 leaf [2,2,6]/10.
        let expected = [0.5, 0.15, 0.35];
        for (p, e) in proba.iter().zip(expected) {
            assert!((p - e).abs() < 1e-12, "{proba:?}");
        }
        assert_eq!(forest.predict(&[0.0, 5.0]).unwrap(), 0);
        assert_eq!(forest.predict(&[1.0, 5.0]).unwrap(), 2);
    }

    #[test]
    fn threshold_ties_go_left() {
        let forest = stump_forest();
        let at = forest.predict_proba(&[0.5, 0.0]).unwrap();
        let below = forest.predict_proba(&[0.4, 0.0]).unwrap();
        assert_eq!(at, below);
    }

    #[test]
    fn path_attribution_is_locally_accurate() {
        let forest = stump_forest();
        let x = [1.0, 5.0];
        let proba = forest.predict_proba(&x).unwrap();
        let rows = forest.attributions(&x).unwrap();

        let bias: Vec<f64> = (0..3)
            .map(|class| {
                forest
                    .trees
                    .iter()
                    .map(|t| t.distribution(0)[class])
                    .sum::<f64>()
                    / 2.0
            })
            .collect();
        for class in 0..3 {
            let total = bias[class] + rows[class].iter().sum::<f64>();
            assert!((total - proba[class]).abs() < 1e-12);
        }
    }

    #[test]
    fn wrong_width_is_a_prediction_error() {
        let forest = stump_forest();
        let err = forest.predict_proba(&[1.0]).unwrap_err();
        assert!(matches!(err, PredictError::Prediction(_)));
        assert!(forest.attributions(&[1.0, 2.0, 3.0]).is_err());
    }

    #[test]
    fn invalid_tree_structure_is_rejected() {
        let mut forest = stump_forest();
        assert!(forest.validate().is_ok());
        forest.trees[0].left[0] = 0;
        assert!(forest.validate().unwrap_err().contains("invalid child"));

        let mut forest = stump_forest();
        forest.trees[1].feature[0] = 9;
        assert!(forest.validate().unwrap_err().contains("unknown feature"));

        let mut forest = stump_forest();
        forest.trees[0].value[1] = vec![0.0, 0.0, 0.0];
        assert!(forest.validate().is_err());
    }

    #[test]
    fn softmax_probabilities_sum_to_one() {
        let model = two_feature_regression();
        let proba = model.predict_proba(&[2.0, -1.0]).unwrap();
        assert_eq!(proba.len(), 3);
        assert!((proba.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert_eq!(model.predict(&[2.0, 0.0]).unwrap(), 2);
        assert_eq!(model.predict(&[-2.0, 0.0]).unwrap(), 0);
    }

    #[test]
    fn softmax_attribution_is_weight_times_offset() {
        let model = two_feature_regression();
        let rows = model.attributions(&[2.0, 3.0]).unwrap();
        assert_eq!(rows[2], vec![1.0 * (2.0 - 1.0), 0.5 * (3.0 - 0.0)]);
    }

    #[test]
    fn predict_uses_class_labels() {
        let mut model = two_feature_regression();
        model.classes = vec![0, 1, 5];
        assert_eq!(model.predict(&[2.0, 0.0]).unwrap(), 5);
    }

    #[test]
    fn label_for_reuses_computed_probabilities() {
        let forest = stump_forest();
        let proba = forest.predict_proba(&[1.0, 5.0]).unwrap();
        assert_eq!(forest.label_for(&proba).unwrap(), forest.predict(&[1.0, 5.0]).unwrap());
        assert!(forest.label_for(&[]).is_err());
    }

    #[test]
    fn duplicate_class_labels_are_rejected() {
        let mut forest = stump_forest();
        forest.classes = vec![0, 2, 2];
        assert!(forest.validate().unwrap_err().contains("appears twice"));

        let mut model = two_feature_regression();
        model.classes = vec![1, 1, 0];
        assert!(model.validate().is_err());
    }

    #[test]
    fn artifact_deserializes_by_kind() {
        let json = r#"{
            "kind": "softmax_regression",
            "classes": [0, 1, 2],
            "coefficients": [[1.0], [0.0], [-1.0]],
            "intercepts": [0.0, 0.0, 0.0]
        }"#;
        let model: ModelArtifact = serde_json::from_str(json).unwrap();
        assert_eq!(model.kind(), "softmax_regression");
        assert_eq!(model.n_features(), 1);
        assert!(model.validate().is_ok());
        assert_eq!(model.predict(&[3.0]).unwrap(), 0);
    }

    #[test]
    fn argmax_prefers_first_maximum() {
        assert_eq!(argmax(&[0.2, 0.4, 0.4]), Some(1));
        assert_eq!(argmax(&[]), None);
    }
}
