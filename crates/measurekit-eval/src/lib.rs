//! Measure evaluation engine
//!
//! Walks a measure's criteria trees against one patient's clinical facts,
//! producing an auditable [`PatientValidationTrace`] and a final population
//! classification.
//!
//! # Guarantees
//!
//! - **Deterministic**: identical inputs always produce deep-equal traces.
//!   Nothing reads the wall clock; age and "today" are pinned to the
//!   measurement-period end.
//! - **Pure**: the measure tree and patient record are read-only for the
//!   duration of a call; the returned trace is freshly owned. Evaluating N
//!   patients in parallel requires no locking.
//! - **Never throws for missing data**: an absent fact is a normal `fail`.
//!   Only malformed *configuration* (an unresolvable timing anchor, an
//!   inverted window) is surfaced, as a failing node carrying a diagnostic,
//!   and through [`MeasureEvaluator::evaluate_strict`] for callers that
//!   want a hard error instead.
//!
//! # Population state machine
//!
//! Populations evaluate in fixed order: initial population, denominator
//! (defaulting to the initial population when absent), exclusions
//! (OR-combined), numerator, then denominator exceptions for patients that
//! missed the numerator. The resulting [`FinalOutcome`] is one of
//! `in_numerator`, `not_in_numerator`, `excluded`, `not_in_population`.

pub mod element;
pub mod engine;
pub mod error;
pub mod gaps;
pub mod trace;

pub use engine::MeasureEvaluator;
pub use error::{EvalError, EvalResult};
pub use gaps::collect_gaps;
pub use trace::{FinalOutcome, MatchedFact, PatientValidationTrace, ValidationNode, ValidationStatus};
