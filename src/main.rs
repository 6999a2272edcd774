use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{error, info};

mod classifier;
mod config;
mod error;
mod evaluate;
mod features;
mod input;
mod models;
mod pipeline;
mod predict;
mod preprocess;
mod report;
mod schema;

#[cfg(test)]
mod fixtures;

use classifier::Classifier;
use config::PredictorConfig;
use pipeline::Pipeline;
use schema::FormSchema;

#[derive(Parser)]
#[command(name = "student-outcome")]
#[command(about = "Predict whether a student will drop out, stay enrolled, or graduate", long_about = None)]
struct Cli {
    /// Log level used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List form fields and their allowed choices
    Fields,
    /// Show what a model artifact expects and produces
    Inspect {
        #[command(flatten)]
        config: PredictorConfig,
    },
    /// Predict the outcome for one student
    Predict {
        #[command(flatten)]
        config: PredictorConfig,
        /// CSV file whose first data row holds the student's fields
        #[arg(long)]
        input: Option<PathBuf>,
        /// Field value as NAME=VALUE, applied after --input
        #[arg(long = "field", value_parser = input::parse_field)]
        fields: Vec<(String, String)>,
        /// Also write a markdown report here
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Predict every row of a CSV file
    Batch {
        #[command(flatten)]
        config: PredictorConfig,
        #[arg(long)]
        input: PathBuf,
        #[arg(long, default_value = "predictions.csv")]
        out: PathBuf,
    },
    /// Score model artifacts against labeled students
    Evaluate {
        #[command(flatten)]
        config: PredictorConfig,
        /// Labeled CSV with the form fields and a target column
        #[arg(long)]
        input: PathBuf,
        /// Additional model names to score alongside --model
        #[arg(long = "also")]
        extra_models: Vec<String>,
        #[arg(long, default_value = evaluate::DEFAULT_TARGET_COLUMN)]
        target: String,
        #[arg(long, default_value_t = evaluate::DEFAULT_SPLITS)]
        splits: usize,
        #[arg(long, default_value_t = evaluate::DEFAULT_SEED)]
        seed: u64,
        #[arg(long, default_value = "feature_selection_results.txt")]
        out: PathBuf,
    },
}

fn init_logging(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);
    let schema = FormSchema::student_default();

    match cli.command {
        Commands::Fields => {
            for field in &schema.categorical {
                println!("{}:", field.name);
                for choice in &field.choices {
                    println!("  {choice}");
                }
            }
            for name in &schema.numerical {
                println!("{name}: numeric");
            }
            println!("{} fields in total.", schema.field_count());
        }
        Commands::Inspect { config } => {
            let path = config.artifact_path();
            let pipeline = Pipeline::load(&path)?;
            let model = pipeline.model_stage();
            println!("Model: {} ({})", pipeline.model_name(), model.kind());
            println!(
                "Drops consumed columns: {}",
                pipeline.feature_stage().drop_consumed
            );
            println!("Inputs ({}):", model.n_features());
            for name in pipeline.preprocessing_stage().feature_names() {
                println!("  {name}");
            }
        }
        Commands::Predict {
            config,
            input,
            fields,
            out,
        } => {
            let base = match input {
                Some(path) => input::read_forms(&path)?.into_iter().next(),
                None => None,
            };
            let form = input::build_form(base, &fields);

            let result = match predict::submit(&config, &schema, &form) {
                Ok(result) => result,
                Err(e) => {
                    eprintln!("{e}");
                    if let Some(field) = e.field() {
                        eprintln!("Please correct {field} and resubmit.");
                    }
                    return Ok(ExitCode::FAILURE);
                }
            };

            println!("{}", report::readout(&result, std::io::stdout().is_terminal()));
            println!();
            print!("{}", report::details(&result));

            if let Some(out) = out {
                let report = report::build_report(&result, chrono::Utc::now());
                std::fs::write(&out, report)
                    .with_context(|| format!("failed to write {}", out.display()))?;
                println!("Report written to {}.", out.display());
            }
        }
        Commands::Batch { config, input, out } => {
            let forms = input::read_forms(&input)?;
            let rows: Vec<report::BatchRow> = forms
                .iter()
                .enumerate()
                .map(|(row, form)| match predict::submit(&config, &schema, form) {
                    Ok(result) => report::BatchRow::success(row, &result),
                    Err(e) => report::BatchRow::failure(row, e),
                })
                .collect();
            let failed = rows.iter().filter(|r| !r.error.is_empty()).count();

            let file = std::fs::File::create(&out)
                .with_context(|| format!("failed to create {}", out.display()))?;
            report::write_batch(file, &rows)?;
            println!(
                "Wrote {} predictions ({failed} failed) to {}.",
                rows.len(),
                out.display()
            );
        }
        Commands::Evaluate {
            config,
            input,
            extra_models,
            target,
            splits,
            seed,
            out,
        } => {
            let forms = input::read_forms(&input)?;
            let data = evaluate::prepare(&schema, &forms, &target);
            if data.skipped > 0 {
                println!("Skipped {} invalid rows.", data.skipped);
            }
            let folds = evaluate::stratified_folds(&data.targets(), splits, seed)
                .map_err(anyhow::Error::msg)?;

            let results = evaluate::ResultsFile::create(&out)
                .with_context(|| format!("failed to create {}", out.display()))?;
            let model_names = std::iter::once(config.model_name.clone()).chain(extra_models);
            for name in model_names {
                let path = config.with_model(&name).artifact_path();
                let row = Pipeline::load(&path)
                    .and_then(|pipeline| evaluate::evaluate_pipeline(&pipeline, &data.records, &folds));
                match row {
                    Ok(row) => {
                        results.append(&row)?;
                        println!("{row}");
                    }
                    Err(e) => error!(model = %name, error = %e, "evaluation failed"),
                }
            }
            info!(path = %out.display(), "results written");
        }
    }

    Ok(ExitCode::SUCCESS)
}
