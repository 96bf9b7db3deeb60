//! Clinical codes and value sets
//!
//! Value sets arrive pre-resolved from an external terminology collaborator;
//! this module only models their shape and provenance.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single clinical code with its code system
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CodeReference {
    /// The code itself (e.g. "I10", "8480-6")
    pub code: String,
    /// Code system (e.g. "ICD-10-CM", "LOINC")
    pub system: String,
    /// Human-readable display text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
}

impl CodeReference {
    /// Create a code reference without display text
    pub fn new(code: impl Into<String>, system: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            system: system.into(),
            display: None,
        }
    }

    /// Attach display text
    pub fn with_display(mut self, display: impl Into<String>) -> Self {
        self.display = Some(display.into());
        self
    }
}

/// Confidence attached to an extracted value set or element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Confidence::High => write!(f, "high"),
            Confidence::Medium => write!(f, "medium"),
            Confidence::Low => write!(f, "low"),
        }
    }
}

/// Editorial review state of an element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReviewStatus {
    Pending,
    Accepted,
    NeedsReview,
}

/// A named, optionally versioned collection of clinical codes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueSetReference {
    /// Value set name (e.g. "Essential Hypertension")
    pub name: String,
    /// Registry identifier, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oid: Option<String>,
    /// Value set version, when pinned
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Member codes, supplied pre-resolved
    #[serde(default)]
    pub codes: Vec<CodeReference>,
    /// Extraction confidence
    pub confidence: Confidence,
    /// Whether a human has verified the set
    #[serde(default)]
    pub verified: bool,
}

impl ValueSetReference {
    /// Create a value set with the given member codes
    pub fn new(name: impl Into<String>, codes: Vec<CodeReference>) -> Self {
        Self {
            name: name.into(),
            oid: None,
            version: None,
            codes,
            confidence: Confidence::High,
            verified: false,
        }
    }

    /// True if the set resolved to zero codes
    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}

/// The three ways an element can name its codes: one value set, several
/// OR-combined value sets, or explicit codes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CodeBinding {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_set: Option<ValueSetReference>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub value_sets: Vec<ValueSetReference>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub direct_codes: Vec<CodeReference>,
}

impl CodeBinding {
    /// Binding over a single value set
    pub fn from_value_set(value_set: ValueSetReference) -> Self {
        Self {
            value_set: Some(value_set),
            ..Self::default()
        }
    }

    /// Binding over explicit codes
    pub fn from_codes(codes: Vec<CodeReference>) -> Self {
        Self {
            direct_codes: codes,
            ..Self::default()
        }
    }

    /// True if no value set and no direct codes are attached
    pub fn is_unbound(&self) -> bool {
        self.value_set.is_none() && self.value_sets.is_empty() && self.direct_codes.is_empty()
    }

    /// Iterate every member code across all sources (the union the
    /// evaluator matches against)
    pub fn codes(&self) -> impl Iterator<Item = &CodeReference> {
        self.value_set
            .iter()
            .flat_map(|vs| vs.codes.iter())
            .chain(self.value_sets.iter().flat_map(|vs| vs.codes.iter()))
            .chain(self.direct_codes.iter())
    }

    /// True if the union of all sources contains zero codes
    pub fn is_code_empty(&self) -> bool {
        self.codes().next().is_none()
    }

    /// Membership test by code and system
    pub fn contains(&self, code: &str, system: &str) -> bool {
        self.codes().any(|c| c.code == code && c.system == system)
    }

    /// Names of the referenced value sets, in declaration order
    pub fn value_set_names(&self) -> Vec<&str> {
        self.value_set
            .iter()
            .chain(self.value_sets.iter())
            .map(|vs| vs.name.as_str())
            .collect()
    }
}
