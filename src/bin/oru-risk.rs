//! oru-risk CLI - flag out-of-range lab results in ORU batch files
//!
//! Runs the same evaluation as the upload endpoint against a file on disk.

use clap::{Parser, Subcommand};
use std::fs;
use std::io;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use chrono::{Local, NaiveDate};
use tracing_subscriber::EnvFilter;

use oru_risk::{
    write_outcome, write_results, BatchEvaluator, ObservationScope, OutputFormat, ReferenceTable,
    ServiceConfig,
};

#[derive(Parser)]
#[command(name = "oru-risk")]
#[command(version, about = "Flag out-of-range lab results in HL7 ORU batches", long_about = None)]
struct Cli {
    /// YAML configuration file (defaults to $ORU_CONFIG, then built-in defaults)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Diagnostic metrics CSV (overrides configuration)
    #[arg(long, global = true)]
    metrics: Option<PathBuf>,

    /// Conditions CSV (overrides configuration)
    #[arg(long, global = true)]
    conditions: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate an ORU batch file and print the flagged results
    Evaluate {
        /// ORU batch file
        #[arg(short, long)]
        input: PathBuf,

        /// Date ages are computed at, as YYYY-MM-DD (default: today)
        #[arg(long, value_parser = parse_reference_date)]
        reference_date: Option<NaiveDate>,

        /// Which observations of each message to evaluate
        #[arg(long, value_enum)]
        scope: Option<ObservationScope>,

        /// Print the batch report along with the results, as one JSON document
        #[arg(long, conflicts_with = "format")]
        report: bool,

        /// Output format for the results
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,

        /// Indent JSON output (same as --format pretty)
        #[arg(long)]
        pretty: bool,
    },

    /// Load both reference tables and report their sizes
    ValidateTables,
}

fn parse_reference_date(value: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|e| format!("expected YYYY-MM-DD: {}", e))
}

/// `--pretty` upgrades the default single-line array.
fn results_format(format: OutputFormat, pretty: bool) -> OutputFormat {
    match (format, pretty) {
        (OutputFormat::Json, true) => OutputFormat::Pretty,
        (format, _) => format,
    }
}

fn main() {
    dotenv::dotenv().ok();

    // Logs go to stderr so stdout stays parseable
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = ServiceConfig::load(cli.config.as_deref())?;
    if let Some(metrics) = cli.metrics {
        config.metrics_csv = metrics;
    }
    if let Some(conditions) = cli.conditions {
        config.conditions_csv = conditions;
    }

    let table = ReferenceTable::load(&config.table_sources())?;

    match cli.command {
        Commands::Evaluate {
            input,
            reference_date,
            scope,
            report,
            format,
            pretty,
        } => {
            if let Some(scope) = scope {
                config.observation_scope = scope;
            }
            let upload = fs::read(&input)
                .map_err(|e| format!("Failed to read {}: {}", input.display(), e))?;

            let evaluator = config.configure(BatchEvaluator::new(Arc::new(table)));
            let reference = reference_date.unwrap_or_else(|| Local::now().date_naive());
            let outcome = evaluator.run(&upload, reference);

            let stdout = io::stdout().lock();
            if report {
                write_outcome(stdout, &outcome, pretty)?;
            } else {
                write_results(stdout, &outcome.results, results_format(format, pretty))?;
            }
        }
        Commands::ValidateTables => {
            println!(
                "✓ {}: {} metric definitions",
                config.metrics_csv.display(),
                table.metrics().len()
            );
            println!(
                "✓ {}: {} conditions",
                config.conditions_csv.display(),
                table.conditions().len()
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("oru-risk").chain(args.iter().copied()))
    }

    #[test]
    fn test_parse_reference_date() {
        assert_eq!(
            parse_reference_date("2024-01-01"),
            Ok(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap())
        );
        assert!(parse_reference_date("20240101").is_err());
        assert!(parse_reference_date("2024-02-30").is_err());
    }

    #[test]
    fn test_evaluate_arguments() {
        let cli = parse(&[
            "evaluate",
            "--input",
            "batch.oru",
            "--reference-date",
            "2024-01-01",
            "--scope",
            "all",
            "--format",
            "ndjson",
        ])
        .unwrap();

        let Commands::Evaluate {
            input,
            reference_date,
            scope,
            report,
            format,
            ..
        } = cli.command
        else {
            panic!("expected evaluate");
        };
        assert_eq!(input, PathBuf::from("batch.oru"));
        assert_eq!(reference_date, NaiveDate::from_ymd_opt(2024, 1, 1));
        assert_eq!(scope, Some(ObservationScope::All));
        assert!(!report);
        assert_eq!(format, OutputFormat::Ndjson);
    }

    #[test]
    fn test_invalid_reference_date_rejected() {
        let err = parse(&["evaluate", "-i", "batch.oru", "--reference-date", "01/01/2024"])
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::ValueValidation);
    }

    #[test]
    fn test_report_conflicts_with_format() {
        let err = parse(&["evaluate", "-i", "batch.oru", "--report", "--format", "ndjson"])
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::ArgumentConflict);

        assert!(parse(&["evaluate", "-i", "batch.oru", "--report", "--pretty"]).is_ok());
    }

    #[test]
    fn test_results_format() {
        assert_eq!(results_format(OutputFormat::Json, false), OutputFormat::Json);
        assert_eq!(results_format(OutputFormat::Json, true), OutputFormat::Pretty);
        assert_eq!(results_format(OutputFormat::Ndjson, true), OutputFormat::Ndjson);
    }
}
