//! opsight-inspect: Inspect runtime traces from traced program runs
//!
//! Loads a runtime trace (and optionally the graph record generated at
//! export time), correlates runtime events with graph operators, and renders
//! them tabularly. Also converts traces for the Perfetto UI and validates
//! artifact files.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use regex::Regex;
use std::path::PathBuf;

use opsight::inspector::{print_table, Inspector};
use opsight::perfetto;
use opsight::record::GraphRecord;
use opsight::tracer::RunTrace;
use opsight::validate::{cross_validate, validate_record, validate_trace};

#[derive(Parser)]
#[command(name = "opsight-inspect")]
#[command(about = "Inspect runtime traces from traced program runs")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render all runtime events as a table
    Tabular {
        /// Path to the runtime trace file
        #[arg(short, long)]
        trace: PathBuf,

        /// Path to the graph record for operator correlation
        #[arg(short, long)]
        record: Option<PathBuf>,

        /// Only show events whose name matches this regex
        #[arg(short, long)]
        filter: Option<String>,

        /// Output format: table, csv, json
        #[arg(long, default_value = "table")]
        format: String,
    },
    /// Convert a runtime trace into a Perfetto trace file
    Convert {
        /// Path to the runtime trace file
        #[arg(short, long)]
        trace: PathBuf,

        /// Output path for the Perfetto trace
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Validate trace and record files
    Validate {
        /// Path to the runtime trace file
        #[arg(short, long)]
        trace: PathBuf,

        /// Path to the graph record file
        #[arg(short, long)]
        record: Option<PathBuf>,
    },
}

fn run_tabular(
    trace: PathBuf,
    record: Option<PathBuf>,
    filter: Option<String>,
    format: String,
) -> Result<()> {
    let inspector = Inspector::new(&trace, record.as_deref())?;
    let filter = match filter {
        Some(pattern) => Some(
            Regex::new(&pattern).with_context(|| format!("Invalid filter regex '{}'", pattern))?,
        ),
        None => None,
    };

    let headers = inspector.headers();
    let rows = inspector.data_rows(filter.as_ref());

    match format.as_str() {
        "csv" => {
            println!("{}", headers.join(","));
            for row in &rows {
                println!("{}", row.join(","));
            }
        }
        "json" => {
            let json_rows: Vec<serde_json::Value> = rows
                .iter()
                .map(|row| {
                    let obj: serde_json::Map<String, serde_json::Value> = headers
                        .iter()
                        .zip(row.iter())
                        .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
                        .collect();
                    serde_json::Value::Object(obj)
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&json_rows)?);
        }
        _ => {
            print_table(&headers, &rows);
        }
    }

    eprintln!(
        "\n{} events across {} runs of '{}'",
        rows.len(),
        inspector.num_runs(),
        inspector.program_name()
    );
    Ok(())
}

fn run_convert(trace: PathBuf, output: PathBuf) -> Result<()> {
    let run_trace = RunTrace::from_file(&trace)?;
    perfetto::write_trace_file(&run_trace, &output)?;
    println!("Wrote Perfetto trace to {}", output.display());
    Ok(())
}

fn run_validate(trace: PathBuf, record: Option<PathBuf>) -> Result<()> {
    let mut result = validate_trace(&trace)?;
    if let Some(record_path) = &record {
        result.merge(validate_record(record_path)?);
        let run_trace = RunTrace::from_file(&trace)?;
        let graph_record = GraphRecord::from_file(record_path)?;
        result.merge(cross_validate(&run_trace, &graph_record));
    }

    for warning in &result.warnings {
        eprintln!("Warning: {}", warning);
    }
    for error in &result.errors {
        eprintln!("Error: {}", error);
    }
    if result.has_errors() {
        bail!("validation failed with {} errors", result.errors.len());
    }
    println!(
        "OK ({} warnings)",
        result.warnings.len()
    );
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Tabular {
            trace,
            record,
            filter,
            format,
        } => run_tabular(trace, record, filter, format),
        Commands::Convert { trace, output } => run_convert(trace, output),
        Commands::Validate { trace, record } => run_validate(trace, record),
    }
}
