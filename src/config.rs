use std::path::PathBuf;

use clap::Args;

use crate::models::MAX_ATTRIBUTIONS;

pub const DEFAULT_MODELS_DIR: &str = "models_SMOTE";
pub const DEFAULT_MODEL_NAME: &str = "random_forest";
pub const DEFAULT_TOP_FEATURES: usize = MAX_ATTRIBUTIONS;

/// Where model artifacts live and how much explanation to return.
#[derive(Debug, Clone, Args)]
pub struct PredictorConfig {
    /// Directory holding `best_model_<name>.json` artifacts
    #[arg(long, env = "STUDENT_MODELS_DIR", default_value = DEFAULT_MODELS_DIR)]
    pub models_dir: PathBuf,
    /// Model name to load
    #[arg(long = "model", env = "STUDENT_MODEL", default_value = DEFAULT_MODEL_NAME)]
    pub model_name: String,
    /// Number of attribution lines to report
    #[arg(long, default_value_t = DEFAULT_TOP_FEATURES, value_parser = parse_top_features)]
    pub top_features: usize,
}

impl PredictorConfig {
    pub fn new(models_dir: impl Into<PathBuf>, model_name: &str) -> Self {
        Self {
            models_dir: models_dir.into(),
            model_name: model_name.to_string(),
            top_features: DEFAULT_TOP_FEATURES,
        }
    }

    /// Same directory and settings, different model.
    pub fn with_model(&self, model_name: &str) -> Self {
        Self {
            model_name: model_name.to_string(),
            ..self.clone()
        }
    }

    pub fn artifact_path(&self) -> PathBuf {
        self.models_dir
            .join(format!("best_model_{}.json", self.model_name))
    }
}

/// Rejects widths above [`MAX_ATTRIBUTIONS`].
pub fn parse_top_features(raw: &str) -> Result<usize, String> {
    let value: usize = raw
        .trim()
        .parse()
        .map_err(|_| format!("'{raw}' is not a whole number"))?;
    if value > MAX_ATTRIBUTIONS {
        return Err(format!("at most {MAX_ATTRIBUTIONS} features can be reported"));
    }
    Ok(value)
}
