//! The evaluation trace: what matched, what failed, and why

use chrono::NaiveDate;
use indexmap::IndexMap;
use measurekit_model::{FactCategory, FactView, PopulationType};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Outcome of one criteria node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    Pass,
    Fail,
    /// Not evaluated because an earlier gate already decided the outcome
    NotApplicable,
    /// Passed, but with a mix of passing and failing children (reported so
    /// the UI can show which branches carried the result)
    Partial,
}

/// A patient fact that matched (or, for failing threshold/negation checks,
/// violated) an element's filter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchedFact {
    pub category: FactCategory,
    pub code: String,
    pub system: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
    pub date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Decimal>,
}

impl MatchedFact {
    /// Capture a fact view into the trace
    pub fn from_view(view: &FactView<'_>) -> Self {
        Self {
            category: view.category,
            code: view.code.to_string(),
            system: view.system.to_string(),
            display: view.display.map(str::to_string),
            date: view.date,
            value: view.value,
        }
    }
}

/// One node of the trace tree, isomorphic to the criteria tree it was
/// evaluated from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationNode {
    /// Id of the criteria node this trace entry was produced from
    pub id: String,
    pub label: String,
    pub status: ValidationStatus,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub facts: Vec<MatchedFact>,
    /// Configuration diagnostic; present only for authoring defects, never
    /// for missing patient data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<String>,
    /// Natural-language description of what the patient is missing, set on
    /// failing leaves
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gap: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ValidationNode>,
}

impl ValidationNode {
    /// A leaf node with the given status and no children
    pub fn leaf(id: impl Into<String>, label: impl Into<String>, status: ValidationStatus) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            status,
            facts: Vec::new(),
            diagnostic: None,
            gap: None,
            children: Vec::new(),
        }
    }

    /// Boolean outcome for combination: `pass` and `partial` both count
    pub fn passed(&self) -> bool {
        matches!(self.status, ValidationStatus::Pass | ValidationStatus::Partial)
    }

    /// Depth-first search for the first configuration diagnostic
    pub fn first_diagnostic(&self) -> Option<(&str, &str)> {
        if let Some(message) = &self.diagnostic {
            return Some((&self.id, message));
        }
        self.children.iter().find_map(ValidationNode::first_diagnostic)
    }
}

/// Final population classification of one patient
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinalOutcome {
    InNumerator,
    NotInNumerator,
    Excluded,
    NotInPopulation,
}

/// The full evaluation result for one patient against one measure.
///
/// Created fresh per evaluation call and never mutated after return; safe
/// to cache by `(measure_id, patient_id, measure_version)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientValidationTrace {
    pub measure_id: String,
    pub patient_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub measure_version: Option<String>,
    /// One trace tree per population, in evaluation order. The exclusion
    /// populations are combined under a single synthetic OR node.
    pub populations: IndexMap<PopulationType, ValidationNode>,
    pub final_outcome: FinalOutcome,
    /// For patients short of the numerator: what they are missing
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub how_close: Vec<String>,
}

impl PatientValidationTrace {
    /// The trace tree for one population, when it was evaluated
    pub fn population(&self, population: PopulationType) -> Option<&ValidationNode> {
        self.populations.get(&population)
    }

    /// First configuration diagnostic anywhere in the trace
    pub fn first_diagnostic(&self) -> Option<(&str, &str)> {
        self.populations
            .values()
            .find_map(ValidationNode::first_diagnostic)
    }
}
