//! Derived academic and background features.
//!
//! [`FeatureEngineer::transform`] computes every derived column from the raw
//! record before touching the output, so a failure leaves nothing behind.

use serde::{Deserialize, Serialize};

use crate::error::{PredictError, Result};
use crate::models::{EngineeredRecord, StudentRecord, Value};

pub const MOTHER_QUALIFICATION: &str = "Mother_qualification";
pub const FATHER_QUALIFICATION: &str = "Father_qualification";

/// Upper bounds (exclusive, except the last) for the age buckets.
const AGE_BINS: [(f64, &str); 3] = [(20.0, "young"), (25.0, "medium"), (100.0, "adult")];
const MIN_AGE: f64 = 0.0;

/// Raw semester counters for one semester.
struct Semester {
    credited: f64,
    enrolled: f64,
    evaluations: f64,
    approved: f64,
    grade: f64,
    without_evaluations: f64,
}

impl Semester {
    fn read(record: &StudentRecord, ordinal: &str) -> Result<Self> {
        let field = |metric: &str| record.number(&format!("Curricular_units_{ordinal}_sem_{metric}"));
        Ok(Self {
            credited: field("credited")?,
            enrolled: field("enrolled")?,
            evaluations: field("evaluations")?,
            approved: field("approved")?,
            grade: field("grade")?,
            without_evaluations: field("without_evaluations")?,
        })
    }

    fn pass_rate(&self) -> f64 {
        if self.enrolled > 0.0 {
            self.approved / self.enrolled
        } else {
            0.0
        }
    }

    fn eval_completion_rate(&self) -> f64 {
        self.evaluations / (self.evaluations + self.without_evaluations).max(1.0)
    }
}

/// Feature stage of a prediction pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureEngineer {
    /// Remove the parental qualification columns once they are folded into
    /// `parent_background_score`.
    #[serde(default = "default_drop_consumed")]
    pub drop_consumed: bool,
}

fn default_drop_consumed() -> bool {
    true
}

impl Default for FeatureEngineer {
    fn default() -> Self {
        Self {
            drop_consumed: default_drop_consumed(),
        }
    }
}

impl FeatureEngineer {
    pub fn transform(&self, record: &StudentRecord) -> Result<EngineeredRecord> {
        let first = Semester::read(record, "1st")?;
        let second = Semester::read(record, "2nd")?;
        let age_bin = age_bin(record.number("Age")?)?;
        let background = parent_background_score(record)?;

        let approved_total = first.approved + second.approved;
        let weighted_avg_grade = if approved_total > 0.0 {
            (first.grade * first.approved + second.grade * second.approved) / approved_total
        } else {
            0.0
        };
        let pass_rate_1st = first.pass_rate();
        let pass_rate_2nd = second.pass_rate();
        let eval_rate_1st = first.eval_completion_rate();
        let eval_rate_2nd = second.eval_completion_rate();

        let derived = [
            ("avg_grade", (first.grade + second.grade) / 2.0),
            ("weighted_avg_grade", weighted_avg_grade),
            ("pass_rate_1st", pass_rate_1st),
            ("pass_rate_2nd", pass_rate_2nd),
            ("pass_rate_delta", pass_rate_2nd - pass_rate_1st),
            ("grade_delta", second.grade - first.grade),
            ("approved_delta", second.approved - first.approved),
            ("total_enrolled", first.enrolled + second.enrolled),
            ("total_credited", first.credited + second.credited),
            ("eval_completion_rate_1st", eval_rate_1st),
            ("eval_completion_rate_2nd", eval_rate_2nd),
            ("eval_completion_delta", eval_rate_2nd - eval_rate_1st),
            ("parent_background_score", background as f64),
        ];

        let mut fields = record.fields().clone();
        for (name, value) in derived {
            fields.insert(name.to_string(), Value::Number(value));
        }
        fields.insert("age_bin".to_string(), Value::Text(age_bin.to_string()));

        if self.drop_consumed {
            fields.remove(MOTHER_QUALIFICATION);
            fields.remove(FATHER_QUALIFICATION);
        }

        Ok(EngineeredRecord::from_fields(fields))
    }
}

/// Buckets an age into `young` `[0, 20)`, `medium` `[20, 25)` or `adult` `[25, 100]`.
pub fn age_bin(age: f64) -> Result<&'static str> {
    if !(MIN_AGE..=AGE_BINS[AGE_BINS.len() - 1].0).contains(&age) {
        return Err(PredictError::invalid_input(
            "Age",
            format!("{age} is outside the supported range 0-100"),
        ));
    }
    let label = AGE_BINS
        .iter()
        .find(|(upper, _)| age < *upper)
        .map_or("adult", |(_, label)| *label);
    Ok(label)
}

/// Sum of both parents' qualification codes. Values that are not plain
/// non-negative integer codes count as zero.
pub fn parent_background_score(record: &StudentRecord) -> Result<i64> {
    let mut score = 0;
    for name in [MOTHER_QUALIFICATION, FATHER_QUALIFICATION] {
        let value = record
            .get(name)
            .ok_or_else(|| PredictError::invalid_input(name, "field is missing"))?;
        score += qualification_points(value);
    }
    Ok(score)
}

fn qualification_points(value: &Value) -> i64 {
    match value {
        Value::Code(code) if *code >= 0 => *code,
        Value::Text(text) if !text.is_empty() && text.bytes().all(|b| b.is_ascii_digit()) => {
            text.parse().unwrap_or(0)
        }
        _ => 0,
    }
}
