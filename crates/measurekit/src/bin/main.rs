//! Measure-logic command-line interface

use clap::{Parser, Subcommand};
use measurekit::cli::{evaluate, generate, output, score};
use std::path::PathBuf;

/// Clinical quality measure tools
#[derive(Parser)]
#[command(name = "measurekit")]
#[command(author, version, about = "Clinical quality measure logic tools", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output file (default: stdout)
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    /// Color output (auto, always, never)
    #[arg(long, default_value = "auto", global = true)]
    color: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate a patient record against a measure
    Evaluate {
        /// Measure specification (JSON)
        #[arg(short, long)]
        measure: PathBuf,

        /// Patient record (JSON)
        #[arg(short, long)]
        patient: PathBuf,

        /// Fail hard on measure-configuration defects
        #[arg(short, long)]
        strict: bool,

        /// Output format (pretty, json)
        #[arg(short = 'f', long)]
        format: Option<String>,
    },

    /// Generate executable code from a measure
    Generate {
        /// Measure specification (JSON)
        #[arg(short, long)]
        measure: PathBuf,

        /// Target format (cql, sql)
        #[arg(short, long, default_value = "cql")]
        target: String,
    },

    /// Score a measure's editorial complexity
    Score {
        /// Measure specification (JSON)
        #[arg(short, long)]
        measure: PathBuf,
    },
}

fn main() {
    human_panic::setup_panic!();

    let cli = Cli::parse();
    output::setup_colors(&cli.color);

    let result = match cli.command {
        Commands::Evaluate {
            measure,
            patient,
            strict,
            format,
        } => evaluate::evaluate(evaluate::EvaluateConfig {
            measure,
            patient,
            strict,
            format,
            output: cli.output.clone(),
        }),

        Commands::Generate { measure, target } => generate::generate(generate::GenerateConfig {
            measure,
            target,
            output: cli.output.clone(),
        }),

        Commands::Score { measure } => score::score(score::ScoreConfig {
            measure,
            verbose: cli.verbose,
            output: cli.output.clone(),
        }),
    };

    if let Err(e) = result {
        eprintln!("{}", output::format_error(&e));
        std::process::exit(1);
    }
}
