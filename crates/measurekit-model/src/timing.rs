//! Timing constraints, windows, and the edit layer
//!
//! A timing requirement describes *when* a fact must occur relative to an
//! anchor: the measurement period bounds, a fact-derived date, or a named
//! index event. Requirements are resolved to concrete date windows by the
//! `measurekit-timing` crate; this module only models their shape.
//!
//! Every requirement is wrapped in [`Edited`], which layers manual edits on
//! top of the originally parsed value. The original is immutable; the
//! effective value is `modified ?? original`.

use crate::error::{ModelError, ModelResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Temporal relation between a fact and a resolved window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TimingOperator {
    /// Fact date falls inside the window
    During,
    /// Fact date is on or before the window end
    BeforeEndOf,
    /// Fact date is on or after the window start
    AfterStartOf,
    /// Fact date is within `offset` of the anchor
    Within,
    /// Fact *start* date falls inside the window
    StartsDuring,
    /// Fact *end* date falls inside the window
    EndsDuring,
    /// Fact period overlaps the window
    Overlaps,
}

impl fmt::Display for TimingOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            TimingOperator::During => "during",
            TimingOperator::BeforeEndOf => "before end of",
            TimingOperator::AfterStartOf => "after start of",
            TimingOperator::Within => "within",
            TimingOperator::StartsDuring => "starts during",
            TimingOperator::EndsDuring => "ends during",
            TimingOperator::Overlaps => "overlaps",
        };
        write!(f, "{text}")
    }
}

/// Calendar unit for offsets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Days,
    Weeks,
    Months,
    Years,
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            TimeUnit::Days => "days",
            TimeUnit::Weeks => "weeks",
            TimeUnit::Months => "months",
            TimeUnit::Years => "years",
        };
        write!(f, "{text}")
    }
}

/// Direction an offset is applied in, relative to its anchor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OffsetDirection {
    Before,
    After,
}

/// A complete offset: `value × unit`, `direction` of the anchor
///
/// Partial offsets (a value without a unit, or vice versa) are not
/// representable; loose inputs go through [`TimingOffset::from_parts`],
/// which rejects them at construction time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingOffset {
    pub value: u32,
    pub unit: TimeUnit,
    pub direction: OffsetDirection,
}

impl TimingOffset {
    /// Build an offset from optionally-present parsed parts.
    ///
    /// Returns `Ok(None)` when both value and unit are absent, the offset
    /// when both are present, and `IncompleteOffset` otherwise.
    pub fn from_parts(
        value: Option<u32>,
        unit: Option<TimeUnit>,
        direction: OffsetDirection,
        context: &str,
    ) -> ModelResult<Option<Self>> {
        match (value, unit) {
            (Some(value), Some(unit)) => Ok(Some(Self {
                value,
                unit,
                direction,
            })),
            (None, None) => Ok(None),
            _ => Err(ModelError::incomplete_offset(context)),
        }
    }
}

impl fmt::Display for TimingOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dir = match self.direction {
            OffsetDirection::Before => "before",
            OffsetDirection::After => "after",
        };
        write!(f, "{} {} {}", self.value, self.unit, dir)
    }
}

/// A date source a timing boundary resolves against
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TimingAnchor {
    MeasurementPeriodStart,
    MeasurementPeriodEnd,
    EncounterStart,
    EncounterEnd,
    DiagnosisDate,
    ProcedureDate,
    DischargeDate,
    /// A named, patient-specific index event (e.g. "IPSD")
    IndexEvent(String),
    Today,
}

impl TimingAnchor {
    /// True for anchors that resolve from the per-patient event map rather
    /// than the measurement period
    pub fn is_event_relative(&self) -> bool {
        !matches!(
            self,
            TimingAnchor::MeasurementPeriodStart
                | TimingAnchor::MeasurementPeriodEnd
                | TimingAnchor::Today
        )
    }
}

impl fmt::Display for TimingAnchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimingAnchor::MeasurementPeriodStart => write!(f, "Measurement Period Start"),
            TimingAnchor::MeasurementPeriodEnd => write!(f, "Measurement Period End"),
            TimingAnchor::EncounterStart => write!(f, "Encounter Start"),
            TimingAnchor::EncounterEnd => write!(f, "Encounter End"),
            TimingAnchor::DiagnosisDate => write!(f, "Diagnosis Date"),
            TimingAnchor::ProcedureDate => write!(f, "Procedure Date"),
            TimingAnchor::DischargeDate => write!(f, "Discharge Date"),
            TimingAnchor::IndexEvent(name) => write!(f, "{name}"),
            TimingAnchor::Today => write!(f, "Today"),
        }
    }
}

/// One resolvable point: an anchor plus an optional offset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingBoundary {
    pub anchor: TimingAnchor,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<TimingOffset>,
}

impl TimingBoundary {
    /// Boundary at an anchor with no offset
    pub fn at(anchor: TimingAnchor) -> Self {
        Self {
            anchor,
            offset: None,
        }
    }

    /// Attach an offset
    pub fn with_offset(mut self, offset: TimingOffset) -> Self {
        self.offset = Some(offset);
        self
    }
}

/// A single-boundary timing requirement: `<operator> <anchor> [offset]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingConstraint {
    pub operator: TimingOperator,
    pub anchor: TimingAnchor,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<TimingOffset>,
}

impl TimingConstraint {
    /// Constraint with no offset
    pub fn new(operator: TimingOperator, anchor: TimingAnchor) -> Self {
        Self {
            operator,
            anchor,
            offset: None,
        }
    }

    /// Attach an offset
    pub fn with_offset(mut self, offset: TimingOffset) -> Self {
        self.offset = Some(offset);
        self
    }
}

impl fmt::Display for TimingConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.offset {
            Some(offset) => write!(f, "{} {} {}", self.operator, offset, self.anchor),
            None => write!(f, "{} {}", self.operator, self.anchor),
        }
    }
}

/// A two-boundary requirement for "from X through Y" patterns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingWindow {
    pub start: TimingBoundary,
    pub end: TimingBoundary,
}

impl fmt::Display for TimingWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "from {} through {}", self.start.anchor, self.end.anchor)
    }
}

/// Either form of timing requirement attached to an element
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TimingRequirement {
    Constraint(TimingConstraint),
    Window(TimingWindow),
}

impl fmt::Display for TimingRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimingRequirement::Constraint(c) => c.fmt(f),
            TimingRequirement::Window(w) => w.fmt(f),
        }
    }
}

/// An immutable original value with an optional manual edit layered on top
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct Edited<T> {
    /// As originally parsed; never changed by edits
    pub original: T,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_by: Option<String>,
}

impl<T> Edited<T> {
    /// Wrap an original value with no edit
    pub fn new(original: T) -> Self {
        Self {
            original,
            modified: None,
            modified_at: None,
            modified_by: None,
        }
    }

    /// The effective value: the edit when present, otherwise the original
    pub fn effective(&self) -> &T {
        self.modified.as_ref().unwrap_or(&self.original)
    }

    /// True once an edit has been layered on
    pub fn is_edited(&self) -> bool {
        self.modified.is_some()
    }

    /// Replace the edit layer. The original is untouched.
    pub fn revise(&mut self, value: T, by: impl Into<String>, at: DateTime<Utc>) {
        self.modified = Some(value);
        self.modified_at = Some(at);
        self.modified_by = Some(by.into());
    }

    /// Drop the edit layer, reverting to the original
    pub fn revert(&mut self) {
        self.modified = None;
        self.modified_at = None;
        self.modified_by = None;
    }
}
