//! Leaf criteria: data elements and their checks

use crate::codes::{CodeBinding, Confidence, ReviewStatus};
use crate::error::{ModelError, ModelResult};
use crate::timing::{Edited, TimingRequirement};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which fact list of the patient record an element filters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FactCategory {
    Diagnosis,
    Encounter,
    Procedure,
    Observation,
    Medication,
    Immunization,
    /// Pure demographic check (age, gender); matches no fact list
    Demographic,
}

impl fmt::Display for FactCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            FactCategory::Diagnosis => "diagnosis",
            FactCategory::Encounter => "encounter",
            FactCategory::Procedure => "procedure",
            FactCategory::Observation => "observation",
            FactCategory::Medication => "medication",
            FactCategory::Immunization => "immunization",
            FactCategory::Demographic => "demographic",
        };
        write!(f, "{text}")
    }
}

/// Numeric comparison operator for threshold checks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Comparator {
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
}

impl Comparator {
    /// Apply the comparison: `lhs <cmp> rhs`
    pub fn compare(&self, lhs: Decimal, rhs: Decimal) -> bool {
        match self {
            Comparator::Gt => lhs > rhs,
            Comparator::Ge => lhs >= rhs,
            Comparator::Lt => lhs < rhs,
            Comparator::Le => lhs <= rhs,
            Comparator::Eq => lhs == rhs,
            Comparator::Ne => lhs != rhs,
        }
    }

    /// SQL / expression-language spelling
    pub fn symbol(&self) -> &'static str {
        match self {
            Comparator::Gt => ">",
            Comparator::Ge => ">=",
            Comparator::Lt => "<",
            Comparator::Le => "<=",
            Comparator::Eq => "=",
            Comparator::Ne => "!=",
        }
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

/// A numeric bound an observed value (or age) must satisfy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Threshold {
    pub comparator: Comparator,
    pub value: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

impl Threshold {
    pub fn new(comparator: Comparator, value: Decimal) -> Self {
        Self {
            comparator,
            value,
            unit: None,
        }
    }

    /// True when `observed <cmp> self.value` holds
    pub fn satisfied_by(&self, observed: Decimal) -> bool {
        self.comparator.compare(observed, self.value)
    }
}

impl fmt::Display for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.unit {
            Some(unit) => write!(f, "{} {} {}", self.comparator, self.value, unit),
            None => write!(f, "{} {}", self.comparator, self.value),
        }
    }
}

/// One component of a paired same-day observation check
///
/// A component without a threshold only requires a reading to exist on the
/// qualifying day; with a threshold, that day's reading must also satisfy
/// the comparator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairedComponent {
    /// Short label used in traces and generated code (e.g. "SBP")
    pub label: String,
    #[serde(flatten)]
    pub binding: CodeBinding,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<Threshold>,
}

/// A same-day multi-component observation rule.
///
/// The evaluator picks the most recent date on which every component has a
/// recorded value, then applies each component's threshold to that day's
/// readings. Earlier days are never substituted in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairedCheck {
    pub components: Vec<PairedComponent>,
}

/// Medication-adherence computation: total days supply within a window
/// anchored at a named index event, compared against a required amount.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CumulativeSupply {
    /// Name of the index event the window starts at (e.g. "IPSD")
    pub index_event: String,
    /// Window length in days from the index event
    pub window_days: u32,
    pub comparator: Comparator,
    /// Days-supply total the comparator is applied against
    pub required_days: Decimal,
}

/// A leaf criterion: one filter over the patient's facts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataElement {
    pub id: String,
    /// Human-readable name; also seeds generated definition names
    pub name: String,
    pub category: FactCategory,
    #[serde(flatten)]
    pub binding: CodeBinding,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<Threshold>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paired_check: Option<PairedCheck>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cumulative_supply: Option<CumulativeSupply>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub timing: Vec<Edited<TimingRequirement>>,
    /// When true the element passes iff zero facts match
    #[serde(default)]
    pub negation: bool,
    pub confidence: Confidence,
    pub review_status: ReviewStatus,
}

impl DataElement {
    /// Minimal element over a code binding
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        category: FactCategory,
        binding: CodeBinding,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            category,
            binding,
            threshold: None,
            paired_check: None,
            cumulative_supply: None,
            timing: Vec::new(),
            negation: false,
            confidence: Confidence::High,
            review_status: ReviewStatus::Pending,
        }
    }

    /// Effective timing requirements, honoring the edit layer
    pub fn effective_timing(&self) -> impl Iterator<Item = &TimingRequirement> {
        self.timing.iter().map(Edited::effective)
    }

    /// True when the element carries no threshold-style check at all
    pub fn is_presence_check(&self) -> bool {
        self.threshold.is_none() && self.paired_check.is_none() && self.cumulative_supply.is_none()
    }

    /// Enforce the code-source invariant: every element names codes unless
    /// it is a pure threshold/demographic check or its components carry
    /// their own bindings.
    pub fn validate(&self) -> ModelResult<()> {
        if self.binding.is_unbound()
            && self.category != FactCategory::Demographic
            && self.paired_check.is_none()
        {
            return Err(ModelError::missing_code_source(&self.id));
        }
        Ok(())
    }
}
