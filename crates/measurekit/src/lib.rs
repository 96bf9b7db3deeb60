//! Clinical quality measure logic engine
//!
//! MeasureKit is the measure-logic core of a clinical-quality-measure
//! authoring tool:
//!
//! - A canonical, typed criteria tree (populations built from boolean
//!   clauses over coded clinical facts, with timing and threshold
//!   constraints)
//! - An **evaluator** that interprets a measure against one patient's
//!   record, producing an auditable pass/fail trace and a final population
//!   classification
//! - A **code generator** compiling the same tree into clinical expression
//!   language or warehouse SQL, with manual per-component overrides
//! - A **complexity scorer** for editorial triage
//!
//! # Example
//!
//! ```ignore
//! use measurekit::{Compiler, MeasureEvaluator, OverrideStore, TargetFormat};
//!
//! let spec: measurekit::MeasureSpec = serde_json::from_str(&measure_json)?;
//! let patient: measurekit::TestPatient = serde_json::from_str(&patient_json)?;
//!
//! let trace = MeasureEvaluator::new().evaluate(&patient, &spec);
//! println!("{:?}", trace.final_outcome);
//!
//! let sql = Compiler::new().compile(&spec, TargetFormat::WarehouseSql, &OverrideStore::new())?;
//! println!("{}", sql.code);
//! ```

// Re-export all public APIs from internal crates
pub use measurekit_codegen as codegen;
pub use measurekit_complexity as complexity;
pub use measurekit_eval as eval;
pub use measurekit_model as model;
pub use measurekit_timing as timing;

// Convenience re-exports
pub use measurekit_codegen::{
    Compiler, GeneratedCode, GenerationError, OverrideKey, OverrideRecord, OverrideStore,
    TargetFormat,
};
pub use measurekit_complexity::{ComplexityLevel, ComplexityScore, score, score_clause};
pub use measurekit_eval::{FinalOutcome, MeasureEvaluator, PatientValidationTrace};
pub use measurekit_model::{CriteriaNode, MeasureSpec, PopulationType, TestPatient};
pub use measurekit_timing::ConfigurationError;

// CLI module (only available with cli feature)
#[cfg(feature = "cli")]
pub mod cli;
