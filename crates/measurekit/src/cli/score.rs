//! The `score` command: complexity triage for a measure

use crate::cli::output;
use anyhow::Context;
use colored::Colorize;
use measurekit_complexity::{ComplexityLevel, score_clause};
use measurekit_model::MeasureSpec;
use std::fs;
use std::path::PathBuf;

pub struct ScoreConfig {
    pub measure: PathBuf,
    pub verbose: bool,
    pub output: Option<PathBuf>,
}

pub fn score(config: ScoreConfig) -> anyhow::Result<()> {
    let measure_json = fs::read_to_string(&config.measure)
        .with_context(|| format!("reading measure file {}", config.measure.display()))?;
    let spec: MeasureSpec =
        serde_json::from_str(&measure_json).context("parsing measure specification")?;
    spec.validate().context("validating measure specification")?;

    let mut out = String::new();
    out.push_str(&format!("{} {}\n", "measure:".bold(), spec.title));
    for def in &spec.populations {
        let result = score_clause(&def.criteria);
        let level = match result.level {
            ComplexityLevel::Low => "low".green(),
            ComplexityLevel::Medium => "medium".yellow(),
            ComplexityLevel::High => "high".red(),
        };
        out.push_str(&format!(
            "  {:<24} score {:>3}  {level}\n",
            def.population.to_string(),
            result.score
        ));
        if config.verbose {
            for factor in &result.factors {
                out.push_str(&format!("      {factor}\n"));
            }
        }
    }
    output::write_output(config.output.as_ref(), &out)
}
