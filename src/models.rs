use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use uuid::Uuid;

use crate::error::{PredictError, Result};

/// Outcome names in model class order.
pub const CLASS_NAMES: [&str; 3] = ["Dropout", "Enrolled", "Graduate"];

/// Upper bound on attributions carried by a [`PredictionResult`].
pub const MAX_ATTRIBUTIONS: usize = 5;

/// A single field value as it flows through the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Value {
    Number(f64),
    Code(i64),
    Text(String),
}

impl Value {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(value) => Some(*value),
            Value::Code(code) => Some(*code as f64),
            Value::Text(text) => text.trim().parse().ok(),
        }
    }

    /// Key used to look the value up in a categorical domain.
    pub fn category_key(&self) -> String {
        match self {
            Value::Number(value) if value.fract() == 0.0 && value.is_finite() => {
                format!("{}", *value as i64)
            }
            Value::Number(value) => value.to_string(),
            Value::Code(code) => code.to_string(),
            Value::Text(text) => text.trim().to_string(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(value) => write!(f, "{value}"),
            Value::Code(code) => write!(f, "{code}"),
            Value::Text(text) => write!(f, "{text}"),
        }
    }
}

/// Raw attributes for one student, as validated from the form.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StudentRecord {
    fields: BTreeMap<String, Value>,
}

impl StudentRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, value: Value) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: &str, value: Value) {
        self.fields.insert(name.to_string(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Reads a field that must be numeric.
    pub fn number(&self, name: &str) -> Result<f64> {
        let value = self
            .get(name)
            .ok_or_else(|| PredictError::invalid_input(name, "field is missing"))?;
        value
            .as_f64()
            .filter(|v| v.is_finite())
            .ok_or_else(|| PredictError::invalid_input(name, format!("'{value}' is not a number")))
    }

    pub(crate) fn fields(&self) -> &BTreeMap<String, Value> {
        &self.fields
    }
}

/// A student record after feature engineering. Only the feature stage
/// builds these, so one never exists half-derived.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineeredRecord {
    fields: BTreeMap<String, Value>,
}

impl EngineeredRecord {
    pub(crate) fn from_fields(fields: BTreeMap<String, Value>) -> Self {
        Self { fields }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }
}

#[cfg(test)]
impl EngineeredRecord {
    pub fn number(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(Value::as_f64)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Outcome {
    Dropout,
    Enrolled,
    Graduate,
    Unknown(i64),
}

impl Outcome {
    /// Maps a model label to an outcome. Labels the model should never emit
    /// still produce a value so a stale artifact cannot take the caller down.
    pub fn from_label(label: i64) -> Self {
        match label {
            0 => Outcome::Dropout,
            1 => Outcome::Enrolled,
            2 => Outcome::Graduate,
            other => Outcome::Unknown(other),
        }
    }

    pub fn class_index(&self) -> Option<usize> {
        match self {
            Outcome::Dropout => Some(0),
            Outcome::Enrolled => Some(1),
            Outcome::Graduate => Some(2),
            Outcome::Unknown(_) => None,
        }
    }

    pub fn color(&self) -> &'static str {
        match self {
            Outcome::Dropout => "red",
            Outcome::Enrolled => "orange",
            Outcome::Graduate => "green",
            Outcome::Unknown(_) => "black",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Unknown(label) => write!(f, "Unknown({label})"),
            known => {
                let idx = known.class_index().unwrap_or_default();
                f.write_str(CLASS_NAMES[idx])
            }
        }
    }
}

/// Signed contribution of one model input to the predicted class.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Attribution {
    pub feature: String,
    pub value: f64,
}

impl Attribution {
    pub fn direction(&self) -> &'static str {
        if self.value > 0.0 {
            "↑"
        } else {
            "↓"
        }
    }
}

impl fmt::Display for Attribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} impact ({:.3})",
            self.feature,
            self.direction(),
            self.value
        )
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PredictionResult {
    pub request_id: Uuid,
    pub model_name: String,
    pub outcome: Outcome,
    /// Dropout, Enrolled, Graduate.
    pub probabilities: [f64; 3],
    /// At most five entries, largest magnitude first.
    pub attributions: Vec<Attribution>,
}

impl PredictionResult {
    pub fn labeled_probabilities(&self) -> impl Iterator<Item = (&'static str, f64)> + '_ {
        CLASS_NAMES.iter().copied().zip(self.probabilities.iter().copied())
    }
}
