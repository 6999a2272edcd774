use std::collections::HashMap;

use tracing::{info, info_span, warn};
use uuid::Uuid;

use crate::classifier::{Classifier, Explainer};
use crate::config::PredictorConfig;
use crate::error::{PredictError, Result};
use crate::models::{
    Attribution, Outcome, PredictionResult, StudentRecord, CLASS_NAMES, MAX_ATTRIBUTIONS,
};
use crate::pipeline::Pipeline;
use crate::schema::FormSchema;

pub const PROBABILITY_TOLERANCE: f64 = 1e-6;

/// Runs one form submission end to end.
///
/// The artifact is read from disk on every call so a replaced model file
/// takes effect on the next submission.
pub fn submit(
    config: &PredictorConfig,
    schema: &FormSchema,
    form: &HashMap<String, String>,
) -> Result<PredictionResult> {
    let request_id = Uuid::new_v4();
    let span = info_span!("submit", %request_id, model = %config.model_name);
    let _guard = span.enter();

    let record = schema.parse(form).inspect_err(|e| warn!(error = %e, "rejected form"))?;
    let pipeline = Pipeline::load(&config.artifact_path())?;
    let result = predict_record(&pipeline, &record, config.top_features)?;

    info!(outcome = %result.outcome, "prediction complete");
    Ok(PredictionResult { request_id, ..result })
}

/// Feature stage, preprocessing stage, then the model and its explanation.
pub fn predict_record(
    pipeline: &Pipeline,
    record: &StudentRecord,
    top_k: usize,
) -> Result<PredictionResult> {
    let x = model_input(pipeline, record)?;
    let model = pipeline.model_stage();

    let proba = model.predict_proba(&x)?;
    let probabilities = checked_probabilities(&outcome_order(model.classes(), &proba))?;
    let label = model.label_for(&proba)?;
    let outcome = Outcome::from_label(label);
    if let Outcome::Unknown(value) = outcome {
        warn!(label = value, "model emitted a label outside the known outcomes");
    }

    let class_position = model.classes().iter().position(|c| *c == label);
    let feature_names = pipeline.preprocessing_stage().feature_names();
    let attributions = match class_position {
        Some(position) => explain(model, &x, position, &feature_names, top_k)?,
        None => Vec::new(),
    };

    Ok(PredictionResult {
        request_id: Uuid::new_v4(),
        model_name: pipeline.model_name().to_string(),
        outcome,
        probabilities,
        attributions,
    })
}

/// Predicted outcome only. Scoring many records skips the explainer.
pub fn classify_record(pipeline: &Pipeline, record: &StudentRecord) -> Result<Outcome> {
    let x = model_input(pipeline, record)?;
    Ok(Outcome::from_label(pipeline.model_stage().predict(&x)?))
}

fn model_input(pipeline: &Pipeline, record: &StudentRecord) -> Result<Vec<f64>> {
    let engineered = pipeline.feature_stage().transform(record)?;
    pipeline.preprocessing_stage().transform(&engineered)
}

/// Moves probability columns into Dropout, Enrolled, Graduate order using
/// the model's class labels. Columns with labels outside the known outcomes
/// fill the remaining slots in their original order.
fn outcome_order(classes: &[i64], proba: &[f64]) -> Vec<f64> {
    if classes.len() != proba.len() || proba.len() != CLASS_NAMES.len() {
        return proba.to_vec();
    }
    let mut slots: Vec<Option<f64>> = vec![None; proba.len()];
    let mut unmapped = Vec::new();
    for (label, p) in classes.iter().zip(proba) {
        match Outcome::from_label(*label).class_index() {
            Some(idx) => slots[idx] = Some(*p),
            None => unmapped.push(*p),
        }
    }
    let mut unmapped = unmapped.into_iter();
    slots
        .into_iter()
        .map(|slot| slot.or_else(|| unmapped.next()).unwrap_or(0.0))
        .collect()
}

/// Ranks features by the magnitude of their contribution to `class`,
/// keeping at most [`MAX_ATTRIBUTIONS`].
pub fn explain(
    explainer: &dyn Explainer,
    x: &[f64],
    class: usize,
    feature_names: &[String],
    top_k: usize,
) -> Result<Vec<Attribution>> {
    let rows = explainer.attributions(x)?;
    let row = rows
        .get(class)
        .ok_or_else(|| PredictError::prediction(format!("no attributions for class {class}")))?;
    if row.len() != feature_names.len() {
        return Err(PredictError::prediction(format!(
            "explainer returned {} attributions for {} features",
            row.len(),
            feature_names.len()
        )));
    }

    let mut ranked: Vec<Attribution> = feature_names
        .iter()
        .zip(row)
        .map(|(feature, value)| Attribution {
            feature: feature.clone(),
            value: *value,
        })
        .collect();
    ranked.sort_by(|a, b| b.value.abs().total_cmp(&a.value.abs()));
    ranked.truncate(top_k.min(MAX_ATTRIBUTIONS));
    Ok(ranked)
}

fn checked_probabilities(proba: &[f64]) -> Result<[f64; 3]> {
    let probabilities: [f64; 3] = proba.try_into().map_err(|_| {
        PredictError::prediction(format!(
            "expected {} class probabilities, got {}",
            CLASS_NAMES.len(),
            proba.len()
        ))
    })?;
    if probabilities.iter().any(|p| !p.is_finite() || *p < 0.0) {
        return Err(PredictError::prediction("probabilities must be finite and non-negative"));
    }
    let total: f64 = probabilities.iter().sum();
    if (total - 1.0).abs() > PROBABILITY_TOLERANCE {
        return Err(PredictError::prediction(format!(
            "probabilities sum to {total}, not 1"
        )));
    }
    Ok(probabilities)
}
