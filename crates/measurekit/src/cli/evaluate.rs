//! The `evaluate` command: classify one patient against a measure

use crate::cli::output;
use anyhow::Context;
use colored::Colorize;
use measurekit_eval::{MeasureEvaluator, PatientValidationTrace, ValidationNode, ValidationStatus};
use measurekit_model::{MeasureSpec, TestPatient};
use std::fs;
use std::path::PathBuf;

pub struct EvaluateConfig {
    pub measure: PathBuf,
    pub patient: PathBuf,
    pub strict: bool,
    pub format: Option<String>,
    pub output: Option<PathBuf>,
}

pub fn evaluate(config: EvaluateConfig) -> anyhow::Result<()> {
    let measure_json = fs::read_to_string(&config.measure)
        .with_context(|| format!("reading measure file {}", config.measure.display()))?;
    let spec: MeasureSpec =
        serde_json::from_str(&measure_json).context("parsing measure specification")?;
    spec.validate().context("validating measure specification")?;

    let patient_json = fs::read_to_string(&config.patient)
        .with_context(|| format!("reading patient file {}", config.patient.display()))?;
    let patient: TestPatient =
        serde_json::from_str(&patient_json).context("parsing patient record")?;

    let evaluator = MeasureEvaluator::new();
    let trace = if config.strict {
        evaluator.evaluate_strict(&patient, &spec)?
    } else {
        evaluator.evaluate(&patient, &spec)
    };

    let rendered = match config.format.as_deref() {
        Some("json") => serde_json::to_string_pretty(&trace)?,
        _ => render_trace(&trace),
    };
    output::write_output(config.output.as_ref(), &rendered)
}

fn render_trace(trace: &PatientValidationTrace) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "{} {} against {}\n",
        "evaluated".bold(),
        trace.patient_id,
        trace.measure_id
    ));
    out.push_str(&format!(
        "outcome: {}\n",
        format!("{:?}", trace.final_outcome).bold()
    ));
    for (population, node) in &trace.populations {
        out.push('\n');
        out.push_str(&format!("[{population}]\n"));
        render_node(node, 1, &mut out);
    }
    if !trace.how_close.is_empty() {
        out.push_str(&format!("\n{}\n", "how close:".bold()));
        for gap in &trace.how_close {
            out.push_str(&format!("  - {gap}\n"));
        }
    }
    out
}

fn render_node(node: &ValidationNode, depth: usize, out: &mut String) {
    let indent = "  ".repeat(depth);
    let status = match node.status {
        ValidationStatus::Pass => "pass".green(),
        ValidationStatus::Fail => "fail".red(),
        ValidationStatus::Partial => "partial".yellow(),
        ValidationStatus::NotApplicable => "n/a".dimmed(),
    };
    out.push_str(&format!("{indent}{} {}", status, node.label));
    if !node.facts.is_empty() {
        out.push_str(&format!(" ({} fact(s))", node.facts.len()));
    }
    if let Some(diagnostic) = &node.diagnostic {
        out.push_str(&format!("  {} {diagnostic}", "config:".red()));
    }
    out.push('\n');
    for child in &node.children {
        render_node(child, depth + 1, out);
    }
}
