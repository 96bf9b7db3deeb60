//! Output helpers shared by the CLI commands

use colored::Colorize;
use std::fs;
use std::path::PathBuf;

/// Set up color output based on the --color flag
pub fn setup_colors(mode: &str) {
    match mode {
        "always" => colored::control::set_override(true),
        "never" => colored::control::set_override(false),
        _ => {}
    }
}

/// Format an error chain for terminal display
pub fn format_error(error: &anyhow::Error) -> String {
    let mut out = format!("{} {}", "error:".red().bold(), error);
    for cause in error.chain().skip(1) {
        out.push_str(&format!("\n  {} {}", "caused by:".dimmed(), cause));
    }
    out
}

/// Print non-fatal warnings to stderr
pub fn print_warnings(warnings: &[String]) {
    for warning in warnings {
        eprintln!("{} {}", "warning:".yellow().bold(), warning);
    }
}

/// Write to the output file when given, stdout otherwise
pub fn write_output(output: Option<&PathBuf>, content: &str) -> anyhow::Result<()> {
    match output {
        Some(path) => {
            fs::write(path, content)?;
            Ok(())
        }
        None => {
            println!("{content}");
            Ok(())
        }
    }
}
