//! Timing resolution
//!
//! Converts the model's anchor + offset descriptions into concrete dates and
//! date windows, relative to the measurement period or a supplied event date
//! (an index event such as IPSD, or a fact-derived anchor like a discharge
//! date). Pure functions, no I/O, no wall-clock reads: "today" is whatever
//! date the caller puts in the [`ResolutionContext`].
//!
//! A malformed timing configuration (an anchor naming an event the context
//! does not carry, or a window that resolves end-before-start) is a
//! [`ConfigurationError`]: a measure-authoring defect, distinct from any
//! property of the patient data.

pub mod error;
pub mod resolver;

pub use error::{ConfigurationError, TimingResult};
pub use resolver::{
    FactDateMode, ResolutionContext, ResolvedTiming, ResolvedWindow, resolve_boundary,
    resolve_requirement,
};
