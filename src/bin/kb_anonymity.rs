//! kb-anonymity command line entry point.
//!
//! Reads a sensitive dataset, runs the three-stage pipeline and writes a
//! release dataset:
//! - Bucket records by the decision path the subject program takes
//! - Optionally k-anonymize each bucket's quasi-identifiers
//! - Synthesize fresh release records through the SMT solver
//!
//! ## Usage
//!
//! ```bash
//! kb_anonymity --input data.csv --constraints spec.txt --output release.csv \
//!     --option P-F -k 2
//!
//! kb_anonymity --input data.csv --constraints spec.txt --output release.csv \
//!     --option I-T -k 2 --anonymize \
//!     --quasi-identifier age zip_code --hierarchy age_dgh.csv zip_dgh.csv
//! ```
//!
//! `RUST_LOG` controls the log filter (default: info).

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use kb_anonymity::bucketer::ProgramRegistry;
use kb_anonymity::synth::ConfigOption;
use kb_anonymity::{Pipeline, RunConfig, DEFAULT_K};

#[derive(Parser, Debug)]
#[command(
    name = "kb_anonymity",
    version,
    about = "Synthesize a privacy-preserving release dataset that keeps a program's decision-path coverage"
)]
struct Args {
    /// Input dataset (CSV with a header row)
    #[arg(long)]
    input: PathBuf,

    /// Subject program to bucket records with
    #[arg(long, default_value = "medical-db")]
    program: String,

    /// Static value-constraint file for the release dataset
    #[arg(long)]
    constraints: PathBuf,

    /// Anonymity level: every released quasi-identifier combination appears
    /// at least k times
    #[arg(short, default_value_t = DEFAULT_K)]
    k: usize,

    /// Quasi-identifier attributes, in priority order
    #[arg(long = "quasi-identifier", num_args = 1.., value_name = "ATTRIBUTE")]
    quasi_identifiers: Vec<String>,

    /// Generalization hierarchy file per quasi-identifier, same order
    #[arg(long = "hierarchy", num_args = 1.., value_name = "FILE")]
    hierarchies: Vec<PathBuf>,

    /// Run the k-anonymization stage before synthesis
    #[arg(long)]
    anonymize: bool,

    /// Anti-duplication policy: P-F, P-T or I-T
    #[arg(long, value_parser = parse_option, default_value = "P-F")]
    option: ConfigOption,

    /// Field subset for the P-T policy (default: the first attribute)
    #[arg(long = "tuple-fields", num_args = 1.., value_name = "ATTRIBUTE")]
    tuple_fields: Vec<String>,

    /// Release dataset to write
    #[arg(long)]
    output: PathBuf,

    /// Write the run counters as JSON to this file
    #[arg(long)]
    report: Option<PathBuf>,
}

fn parse_option(s: &str) -> Result<ConfigOption, String> {
    ConfigOption::parse(s).ok_or_else(|| format!("unknown option '{s}', expected P-F, P-T or I-T"))
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn main() -> ExitCode {
    init_tracing();
    let args = Args::parse();

    let registry = ProgramRegistry::with_builtins();
    let Some(program) = registry.resolve(&args.program) else {
        error!(
            program = %args.program,
            available = ?registry.names(),
            "unknown subject program"
        );
        return ExitCode::FAILURE;
    };

    let config = RunConfig {
        k: args.k,
        option: args.option,
        anonymize: args.anonymize,
        quasi_identifiers: args.quasi_identifiers,
        hierarchy_paths: args.hierarchies,
        tuple_fields: if args.tuple_fields.is_empty() {
            None
        } else {
            Some(args.tuple_fields)
        },
    };

    let pipeline = match Pipeline::new(config, program) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            error!(error = %e, "invalid run configuration");
            return ExitCode::FAILURE;
        }
    };

    info!(
        input = %args.input.display(),
        program = %args.program,
        option = %args.option,
        k = args.k,
        "starting run"
    );
    let start = Instant::now();

    match pipeline.run(&args.input, &args.constraints, &args.output) {
        Ok(report) => {
            info!(
                output = %args.output.display(),
                records_read = report.records_read,
                buckets = report.buckets,
                buckets_dropped = report.buckets_dropped,
                rows_suppressed = report.rows_suppressed,
                solver_misses = report.solver_misses,
                released = report.released,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "run complete"
            );
            if let Some(path) = &args.report {
                if let Err(e) = write_report(path, &report) {
                    error!(path = %path.display(), error = %e, "cannot write run report");
                    return ExitCode::FAILURE;
                }
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "run failed");
            ExitCode::FAILURE
        }
    }
}

fn write_report(
    path: &std::path::Path,
    report: &kb_anonymity::RunReport,
) -> Result<(), Box<dyn std::error::Error>> {
    let json = serde_json::to_string_pretty(report)?;
    std::fs::write(path, json)?;
    Ok(())
}
