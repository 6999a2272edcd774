//! Pre-fitted column transformer: scaled numerics, passthrough flags and
//! one-hot categoricals, concatenated in that order.

use serde::{Deserialize, Serialize};

use crate::error::{PredictError, Result};
use crate::models::EngineeredRecord;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScaledColumn {
    pub column: String,
    pub mean: f64,
    pub scale: f64,
}

impl ScaledColumn {
    fn apply(&self, value: f64) -> f64 {
        // A zero scale means the column was constant when fitted.
        let scale = if self.scale == 0.0 { 1.0 } else { self.scale };
        (value - self.mean) / scale
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OneHotColumn {
    pub column: String,
    pub categories: Vec<String>,
    #[serde(default)]
    pub drop_first: bool,
}

impl OneHotColumn {
    fn encoded_categories(&self) -> &[String] {
        if self.drop_first {
            self.categories.get(1..).unwrap_or(&[])
        } else {
            &self.categories
        }
    }

    /// Writes the indicator block for `key`; unknown keys leave it all zero.
    fn encode_into(&self, key: &str, out: &mut Vec<f64>) {
        out.extend(
            self.encoded_categories()
                .iter()
                .map(|category| if category == key { 1.0 } else { 0.0 }),
        );
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Preprocessor {
    #[serde(default)]
    pub numeric: Vec<ScaledColumn>,
    #[serde(default)]
    pub passthrough: Vec<String>,
    #[serde(default)]
    pub one_hot: Vec<OneHotColumn>,
}

impl Preprocessor {
    pub fn n_outputs(&self) -> usize {
        self.numeric.len()
            + self.passthrough.len()
            + self
                .one_hot
                .iter()
                .map(|c| c.encoded_categories().len())
                .sum::<usize>()
    }

    /// Output column names, aligned with [`Preprocessor::transform`].
    pub fn feature_names(&self) -> Vec<String> {
        let mut names = Vec::with_capacity(self.n_outputs());
        names.extend(self.numeric.iter().map(|c| format!("num__{}", c.column)));
        names.extend(self.passthrough.iter().map(|c| format!("bin__{c}")));
        for column in &self.one_hot {
            names.extend(
                column
                    .encoded_categories()
                    .iter()
                    .map(|category| format!("oh__{}_{}", column.column, category)),
            );
        }
        names
    }

    pub fn transform(&self, record: &EngineeredRecord) -> Result<Vec<f64>> {
        let mut out = Vec::with_capacity(self.n_outputs());

        for column in &self.numeric {
            out.push(column.apply(numeric_input(record, &column.column)?));
        }
        for column in &self.passthrough {
            out.push(numeric_input(record, column)?);
        }
        for column in &self.one_hot {
            let value = record.get(&column.column).ok_or_else(|| missing(&column.column))?;
            column.encode_into(&value.category_key(), &mut out);
        }

        Ok(out)
    }

    /// Structural checks run when an artifact is loaded.
    pub fn validate(&self) -> std::result::Result<(), String> {
        for column in &self.numeric {
            if !column.mean.is_finite() || !column.scale.is_finite() {
                return Err(format!("non-finite scaling for column '{}'", column.column));
            }
        }
        for column in &self.one_hot {
            if column.categories.is_empty() {
                return Err(format!("no categories for column '{}'", column.column));
            }
        }
        Ok(())
    }
}

fn numeric_input(record: &EngineeredRecord, column: &str) -> Result<f64> {
    let value = record.get(column).ok_or_else(|| missing(column))?;
    value.as_f64().ok_or_else(|| {
        PredictError::prediction(format!("column '{column}' holds non-numeric value '{value}'"))
    })
}

fn missing(column: &str) -> PredictError {
    PredictError::prediction(format!(
        "column '{column}' expected by the preprocessing stage is missing"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Value;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;

    fn record(values: &[(&str, Value)]) -> EngineeredRecord {
        let fields: BTreeMap<String, Value> = values
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        EngineeredRecord::from_fields(fields)
    }

    fn preprocessor() -> Preprocessor {
        Preprocessor {
            numeric: vec![
                ScaledColumn {
                    column: "Age".to_string(),
                    mean: 23.0,
                    scale: 2.0,
                },
                ScaledColumn {
                    column: "GDP".to_string(),
                    mean: 1.0,
                    scale: 0.0,
                },
            ],
            passthrough: vec!["Debtor".to_string()],
            one_hot: vec![OneHotColumn {
                column: "age_bin".to_string(),
                categories: vec!["adult".to_string(), "medium".to_string(), "young".to_string()],
                drop_first: true,
            }],
        }
    }

    #[test]
    fn transforms_in_block_order() {
        let input = record(&[
            ("Age", Value::Number(19.0)),
            ("GDP", Value::Number(1.5)),
            ("Debtor", Value::Code(1)),
            ("age_bin", Value::Text("young".to_string())),
        ]);
        let out = preprocessor().transform(&input).unwrap();
        assert_eq!(out, vec![-2.0, 0.5, 1.0, 0.0, 1.0]);
    }

    #[test]
    fn names_follow_blocks() {
        assert_eq!(
            preprocessor().feature_names(),
            vec![
                "num__Age",
                "num__GDP",
                "bin__Debtor",
                "oh__age_bin_medium",
                "oh__age_bin_young"
            ]
        );
        assert_eq!(preprocessor().n_outputs(), 5);
    }

    #[test]
    fn unknown_and_dropped_categories_encode_to_zero() {
        let mut values = vec![
            ("Age", Value::Number(23.0)),
            ("GDP", Value::Number(1.0)),
            ("Debtor", Value::Code(0)),
            ("age_bin", Value::Text("ancient".to_string())),
        ];
        let out = preprocessor().transform(&record(&values)).unwrap();
        assert_eq!(&out[3..], &[0.0, 0.0]);

        values[3] = ("age_bin", Value::Text("adult".to_string()));
        let out = preprocessor().transform(&record(&values)).unwrap();
        assert_eq!(&out[3..], &[0.0, 0.0]);
    }

    #[test]
    fn integer_codes_match_string_categories() {
        let pre = Preprocessor {
            one_hot: vec![OneHotColumn {
                column: "Course".to_string(),
                categories: vec!["33".to_string(), "9119".to_string()],
                drop_first: false,
            }],
            ..Preprocessor::default()
        };
        let out = pre
            .transform(&record(&[("Course", Value::Code(9119))]))
            .unwrap();
        assert_eq!(out, vec![0.0, 1.0]);
    }

    #[test]
    fn missing_column_is_a_prediction_error() {
        let input = record(&[("Age", Value::Number(19.0))]);
        let err = preprocessor().transform(&input).unwrap_err();
        assert!(matches!(err, PredictError::Prediction(_)));
        assert!(err.to_string().contains("GDP"));
    }

    #[test]
    fn validate_rejects_empty_categories() {
        let mut pre = preprocessor();
        assert!(pre.validate().is_ok());
        pre.one_hot[0].categories.clear();
        assert!(pre.validate().is_err());
    }
}
