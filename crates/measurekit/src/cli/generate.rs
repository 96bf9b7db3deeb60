//! The `generate` command: compile a measure to a target format

use crate::cli::output;
use anyhow::Context;
use measurekit_codegen::{Compiler, OverrideStore, TargetFormat};
use measurekit_model::MeasureSpec;
use std::fs;
use std::path::PathBuf;

pub struct GenerateConfig {
    pub measure: PathBuf,
    pub target: String,
    pub output: Option<PathBuf>,
}

pub fn generate(config: GenerateConfig) -> anyhow::Result<()> {
    let measure_json = fs::read_to_string(&config.measure)
        .with_context(|| format!("reading measure file {}", config.measure.display()))?;
    let spec: MeasureSpec =
        serde_json::from_str(&measure_json).context("parsing measure specification")?;
    spec.validate().context("validating measure specification")?;

    let target = match config.target.as_str() {
        "cql" | "clinical-expression" => TargetFormat::ClinicalExpression,
        "sql" | "warehouse-sql" => TargetFormat::WarehouseSql,
        other => anyhow::bail!("unknown target '{other}' (expected 'cql' or 'sql')"),
    };

    // The CLI renders pristine generated code; persisted overrides live in
    // the authoring tool's store, not on disk here
    let overrides = OverrideStore::new();
    let generated = Compiler::new().compile(&spec, target, &overrides)?;

    output::print_warnings(&generated.warnings);
    output::write_output(config.output.as_ref(), &generated.code)
}
