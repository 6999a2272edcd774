use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::classifier::{Classifier, ModelArtifact};
use crate::error::{PredictError, Result};
use crate::features::FeatureEngineer;
use crate::preprocess::Preprocessor;

pub const FORMAT_VERSION: u32 = 1;

/// A fitted prediction pipeline restored from a JSON artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pipeline {
    format_version: u32,
    model_name: String,
    #[serde(default)]
    features: FeatureEngineer,
    preprocessing: Preprocessor,
    model: ModelArtifact,
}

impl Pipeline {
    pub fn new(
        model_name: &str,
        features: FeatureEngineer,
        preprocessing: Preprocessor,
        model: ModelArtifact,
    ) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            model_name: model_name.to_string(),
            features,
            preprocessing,
            model,
        }
    }

    /// Reads and validates an artifact. Every failure is reported as
    /// [`PredictError::ArtifactLoad`] naming the path.
    pub fn load(path: &Path) -> Result<Self> {
        let load_error = |reason: String| PredictError::ArtifactLoad {
            path: path.display().to_string(),
            reason,
        };

        if !path.exists() {
            return Err(load_error("model file not found".to_string()));
        }
        let raw = std::fs::read_to_string(path).map_err(|e| load_error(e.to_string()))?;
        let pipeline = Self::from_json(&raw).map_err(load_error)?;

        debug!(
            path = %path.display(),
            model = %pipeline.model_name,
            kind = pipeline.model.kind(),
            inputs = pipeline.model.n_features(),
            "loaded model artifact"
        );
        Ok(pipeline)
    }

    pub fn from_json(raw: &str) -> std::result::Result<Self, String> {
        let pipeline: Pipeline = serde_json::from_str(raw).map_err(|e| e.to_string())?;
        if pipeline.format_version != FORMAT_VERSION {
            return Err(format!(
                "unsupported artifact format version {} (expected {FORMAT_VERSION})",
                pipeline.format_version
            ));
        }
        pipeline.preprocessing.validate()?;
        pipeline.model.validate()?;
        Ok(pipeline)
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn feature_stage(&self) -> &FeatureEngineer {
        &self.features
    }

    pub fn preprocessing_stage(&self) -> &Preprocessor {
        &self.preprocessing
    }

    pub fn model_stage(&self) -> &ModelArtifact {
        &self.model
    }
}
