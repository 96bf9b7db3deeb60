//! Code generation for measure specifications
//!
//! Walks the same criteria tree the evaluator interprets and emits one of
//! two executable artifacts:
//!
//! - **Clinical expression language** ([`TargetFormat::ClinicalExpression`]):
//!   one named definition per data element and per population, with value
//!   set declarations and temporal clauses.
//! - **Warehouse SQL** ([`TargetFormat::WarehouseSql`]): one predicate CTE
//!   per data element, combination CTEs per clause (`AND → INTERSECT`,
//!   `OR → UNION`, `NOT → EXCEPT`), index-event CTEs for event-anchored
//!   timing, and cumulative-days-supply sub-queries for adherence rates.
//!
//! Manual per-component overrides take precedence: a locked override for a
//! `(component, format)` pair is emitted verbatim for that format, and that
//! format only; override state never leaks across formats.
//!
//! A value set with zero codes degrades to a warning (the predicate is
//! still emitted, matching nothing). A reference to an index event the
//! measure never defines is a fatal [`GenerationError`] for the requested
//! target: emitting it would produce an always-false or erroring query.

pub mod compiler;
pub mod cql;
pub mod error;
pub mod overrides;
pub mod sql;
pub mod target;

pub use compiler::{Compiler, GeneratedCode};
pub use error::{GenResult, GenerationError, OverrideError};
pub use overrides::{OverrideKey, OverrideNote, OverrideRecord, OverrideStore};
pub use target::TargetFormat;
