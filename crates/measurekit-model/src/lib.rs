//! Canonical measure-logic data model
//!
//! This crate defines the typed expression tree a clinical quality measure is
//! authored into, together with the patient record it is evaluated against:
//!
//! - **Codes & value sets**: [`CodeReference`], [`ValueSetReference`], and the
//!   [`CodeBinding`] trio (single set, OR-combined sets, direct codes)
//! - **Timing**: [`TimingConstraint`] / [`TimingWindow`] boundaries with an
//!   immutable-original edit layer ([`Edited`])
//! - **Criteria tree**: [`DataElement`] leaves and [`LogicalClause`] interior
//!   nodes, joined as the tagged [`CriteriaNode`] variant
//! - **Populations**: [`PopulationDefinition`] per population type plus the
//!   [`MeasureSpec`] root
//! - **Patient record**: [`TestPatient`] demographics and typed fact arrays
//!
//! The tree is produced by authoring/ingestion collaborators and consumed
//! read-only by the evaluator and the code generator. Everything here is
//! plain data with construction-time validation; there is no I/O.
//!
//! # Serialization
//!
//! All types round-trip through JSON via serde. [`CriteriaNode`] is
//! internally tagged (`"kind": "element" | "clause"`) so the two node shapes
//! are distinguished explicitly rather than by probing for a `children`
//! field.

pub mod clause;
pub mod codes;
pub mod element;
pub mod error;
pub mod patient;
pub mod population;
pub mod timing;

pub use clause::{CriteriaNode, LogicalClause, LogicalOperator, SiblingConnection};
pub use codes::{CodeBinding, CodeReference, Confidence, ReviewStatus, ValueSetReference};
pub use element::{
    Comparator, CumulativeSupply, DataElement, FactCategory, PairedCheck, PairedComponent,
    Threshold,
};
pub use error::{ModelError, ModelResult};
pub use patient::{
    DiagnosisFact, EncounterFact, FactStatus, FactView, Gender, ImmunizationFact, MedicationFact,
    ObservationFact, ProcedureFact, TestPatient,
};
pub use population::{
    IndexEventDefinition, IndexSelection, MeasureSpec, MeasurementPeriod, PopulationDefinition,
    PopulationType,
};
pub use timing::{
    Edited, OffsetDirection, TimeUnit, TimingAnchor, TimingBoundary, TimingConstraint,
    TimingOffset, TimingOperator, TimingRequirement, TimingWindow,
};
