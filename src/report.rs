use std::fmt::Write;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::{Outcome, PredictionResult};

fn ansi_code(outcome: &Outcome) -> &'static str {
    match outcome.color() {
        "red" => "31",
        "orange" => "33",
        "green" => "32",
        _ => "0",
    }
}

/// Primary readout line, optionally coloured for a terminal.
pub fn readout(result: &PredictionResult, colored: bool) -> String {
    let text = format!("Predicted outcome: {}", result.outcome);
    if colored {
        format!("\x1b[{}m{text}\x1b[0m", ansi_code(&result.outcome))
    } else {
        text
    }
}

/// Class probabilities followed by the ranked attribution lines.
pub fn details(result: &PredictionResult) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "Prediction details ({})", result.model_name);
    let _ = writeln!(output, "Class probabilities:");
    for (label, probability) in result.labeled_probabilities() {
        let _ = writeln!(output, "  {}: {:.2}%", label, probability * 100.0);
    }

    let _ = writeln!(output);
    if result.attributions.is_empty() {
        let _ = writeln!(output, "No feature attributions available.");
    } else {
        let _ = writeln!(
            output,
            "Top {} influential features:",
            result.attributions.len()
        );
        for attribution in &result.attributions {
            let _ = writeln!(output, "  {attribution}");
        }
    }

    output
}

pub fn build_report(result: &PredictionResult, generated_at: DateTime<Utc>) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Student Outcome Prediction");
    let _ = writeln!(
        output,
        "Generated {} with model `{}` (request {})",
        generated_at.format("%Y-%m-%d %H:%M UTC"),
        result.model_name,
        result.request_id
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Outcome");
    let _ = writeln!(output, "**{}**", result.outcome);
    let _ = writeln!(output);
    let _ = writeln!(output, "## Class Probabilities");
    for (label, probability) in result.labeled_probabilities() {
        let _ = writeln!(output, "- {}: {:.2}%", label, probability * 100.0);
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Top Influential Features");
    if result.attributions.is_empty() {
        let _ = writeln!(output, "No feature attributions available.");
    } else {
        for attribution in &result.attributions {
            let _ = writeln!(output, "- {attribution}");
        }
    }

    output
}

/// One line of `batch` output.
#[derive(Debug, Serialize)]
pub struct BatchRow {
    pub row: usize,
    pub outcome: String,
    pub p_dropout: Option<f64>,
    pub p_enrolled: Option<f64>,
    pub p_graduate: Option<f64>,
    pub error: String,
}

impl BatchRow {
    pub fn success(row: usize, result: &PredictionResult) -> Self {
        let [dropout, enrolled, graduate] = result.probabilities;
        Self {
            row,
            outcome: result.outcome.to_string(),
            p_dropout: Some(dropout),
            p_enrolled: Some(enrolled),
            p_graduate: Some(graduate),
            error: String::new(),
        }
    }

    pub fn failure(row: usize, error: impl ToString) -> Self {
        Self {
            row,
            outcome: String::new(),
            p_dropout: None,
            p_enrolled: None,
            p_graduate: None,
            error: error.to_string(),
        }
    }
}

pub fn write_batch<W: std::io::Write>(writer: W, rows: &[BatchRow]) -> csv::Result<()> {
    let mut writer = csv::Writer::from_writer(writer);
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}
