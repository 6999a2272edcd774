//! Reading form submissions from CSV files and `NAME=VALUE` pairs.

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use anyhow::{bail, Context};

pub type Form = HashMap<String, String>;

/// Reads every data row of a CSV whose header holds field names.
pub fn read_forms(path: &Path) -> anyhow::Result<Vec<Form>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    read_forms_from(file).with_context(|| format!("failed to read {}", path.display()))
}

pub fn read_forms_from<R: Read>(reader: R) -> anyhow::Result<Vec<Form>> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut forms = Vec::new();
    for row in reader.deserialize::<Form>() {
        forms.push(row?);
    }
    Ok(forms)
}

/// Parses a `NAME=VALUE` override. The value may itself contain `=`.
pub fn parse_field(raw: &str) -> anyhow::Result<(String, String)> {
    match raw.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), value.trim().to_string()))
        }
        _ => bail!("expected NAME=VALUE, got '{raw}'"),
    }
}

/// Starts from the first CSV row (if any) and applies overrides in order.
pub fn build_form(base: Option<Form>, overrides: &[(String, String)]) -> Form {
    let mut form = base.unwrap_or_default();
    for (name, value) in overrides {
        form.insert(name.clone(), value.clone());
    }
    form
}
