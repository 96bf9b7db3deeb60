//! The patient record: demographics and typed clinical fact lists
//!
//! Produced externally (synthetic generator or manual edit) and treated as
//! immutable for the duration of one evaluation.

use crate::element::FactCategory;
use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Female,
    Male,
    Other,
    Unknown,
}

/// Clinical status of a recorded fact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FactStatus {
    Active,
    Completed,
    Resolved,
    InProgress,
    /// Entered in error or abandoned; never matched by the evaluator
    Cancelled,
}

impl FactStatus {
    /// True for statuses the evaluator is allowed to match
    pub fn is_countable(&self) -> bool {
        !matches!(self, FactStatus::Cancelled)
    }
}

fn default_status() -> FactStatus {
    FactStatus::Active
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosisFact {
    pub code: String,
    pub system: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
    pub onset_date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abatement_date: Option<NaiveDate>,
    #[serde(default = "default_status")]
    pub status: FactStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncounterFact {
    pub code: String,
    pub system: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
    pub start_date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
    #[serde(default = "default_status")]
    pub status: FactStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcedureFact {
    pub code: String,
    pub system: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
    pub performed_date: NaiveDate,
    #[serde(default = "default_status")]
    pub status: FactStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationFact {
    pub code: String,
    pub system: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
    pub effective_date: NaiveDate,
    /// Numeric result, when the observation has one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default = "default_status")]
    pub status: FactStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MedicationFact {
    pub code: String,
    pub system: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
    pub fill_date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub days_supply: Option<u32>,
    #[serde(default = "default_status")]
    pub status: FactStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImmunizationFact {
    pub code: String,
    pub system: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
    pub administered_date: NaiveDate,
    #[serde(default = "default_status")]
    pub status: FactStatus,
}

/// A patient record under evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestPatient {
    pub id: String,
    pub name: String,
    pub birth_date: NaiveDate,
    pub gender: Gender,
    #[serde(default)]
    pub diagnoses: Vec<DiagnosisFact>,
    #[serde(default)]
    pub encounters: Vec<EncounterFact>,
    #[serde(default)]
    pub procedures: Vec<ProcedureFact>,
    #[serde(default)]
    pub observations: Vec<ObservationFact>,
    #[serde(default)]
    pub medications: Vec<MedicationFact>,
    #[serde(default)]
    pub immunizations: Vec<ImmunizationFact>,
}

/// A category-independent projection of one fact, used by the evaluator's
/// matching loop. `index` preserves the fact's position within its source
/// list so ties can be broken deterministically.
#[derive(Debug, Clone, PartialEq)]
pub struct FactView<'a> {
    pub category: FactCategory,
    pub code: &'a str,
    pub system: &'a str,
    pub display: Option<&'a str>,
    /// Primary date: onset, start, performed, effective, fill, administered
    pub date: NaiveDate,
    /// End of the fact's period, when it has one
    pub end_date: Option<NaiveDate>,
    pub value: Option<Decimal>,
    pub days_supply: Option<u32>,
    pub status: FactStatus,
    pub index: usize,
}

impl TestPatient {
    /// Completed age in whole years on the given date
    pub fn age_on(&self, date: NaiveDate) -> i32 {
        let mut age = date.year() - self.birth_date.year();
        if (date.month(), date.day()) < (self.birth_date.month(), self.birth_date.day()) {
            age -= 1;
        }
        age
    }

    /// Project the fact list for one category into uniform views, skipping
    /// cancelled entries
    pub fn facts_in(&self, category: FactCategory) -> Vec<FactView<'_>> {
        let mut views = Vec::new();
        match category {
            FactCategory::Diagnosis => {
                for (index, f) in self.diagnoses.iter().enumerate() {
                    if !f.status.is_countable() {
                        continue;
                    }
                    views.push(FactView {
                        category,
                        code: &f.code,
                        system: &f.system,
                        display: f.display.as_deref(),
                        date: f.onset_date,
                        end_date: f.abatement_date,
                        value: None,
                        days_supply: None,
                        status: f.status,
                        index,
                    });
                }
            }
            FactCategory::Encounter => {
                for (index, f) in self.encounters.iter().enumerate() {
                    if !f.status.is_countable() {
                        continue;
                    }
                    views.push(FactView {
                        category,
                        code: &f.code,
                        system: &f.system,
                        display: f.display.as_deref(),
                        date: f.start_date,
                        end_date: f.end_date,
                        value: None,
                        days_supply: None,
                        status: f.status,
                        index,
                    });
                }
            }
            FactCategory::Procedure => {
                for (index, f) in self.procedures.iter().enumerate() {
                    if !f.status.is_countable() {
                        continue;
                    }
                    views.push(FactView {
                        category,
                        code: &f.code,
                        system: &f.system,
                        display: f.display.as_deref(),
                        date: f.performed_date,
                        end_date: None,
                        value: None,
                        days_supply: None,
                        status: f.status,
                        index,
                    });
                }
            }
            FactCategory::Observation => {
                for (index, f) in self.observations.iter().enumerate() {
                    if !f.status.is_countable() {
                        continue;
                    }
                    views.push(FactView {
                        category,
                        code: &f.code,
                        system: &f.system,
                        display: f.display.as_deref(),
                        date: f.effective_date,
                        end_date: None,
                        value: f.value,
                        days_supply: None,
                        status: f.status,
                        index,
                    });
                }
            }
            FactCategory::Medication => {
                for (index, f) in self.medications.iter().enumerate() {
                    if !f.status.is_countable() {
                        continue;
                    }
                    views.push(FactView {
                        category,
                        code: &f.code,
                        system: &f.system,
                        display: f.display.as_deref(),
                        date: f.fill_date,
                        end_date: None,
                        value: None,
                        days_supply: f.days_supply,
                        status: f.status,
                        index,
                    });
                }
            }
            FactCategory::Immunization => {
                for (index, f) in self.immunizations.iter().enumerate() {
                    if !f.status.is_countable() {
                        continue;
                    }
                    views.push(FactView {
                        category,
                        code: &f.code,
                        system: &f.system,
                        display: f.display.as_deref(),
                        date: f.administered_date,
                        end_date: None,
                        value: None,
                        days_supply: None,
                        status: f.status,
                        index,
                    });
                }
            }
            // Demographic checks read the patient directly, not a fact list
            FactCategory::Demographic => {}
        }
        views
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patient() -> TestPatient {
        TestPatient {
            id: "p1".into(),
            name: "Test Patient".into(),
            birth_date: NaiveDate::from_ymd_opt(1970, 6, 15).unwrap(),
            gender: Gender::Female,
            diagnoses: vec![],
            encounters: vec![],
            procedures: vec![],
            observations: vec![],
            medications: vec![],
            immunizations: vec![],
        }
    }

    #[test]
    fn age_counts_completed_years_only() {
        let p = patient();
        // Day before the birthday
        assert_eq!(p.age_on(NaiveDate::from_ymd_opt(2025, 6, 14).unwrap()), 54);
        // On the birthday
        assert_eq!(p.age_on(NaiveDate::from_ymd_opt(2025, 6, 15).unwrap()), 55);
    }

    #[test]
    fn cancelled_facts_are_not_projected() {
        let mut p = patient();
        p.diagnoses = vec![
            DiagnosisFact {
                code: "I10".into(),
                system: "ICD-10-CM".into(),
                display: None,
                onset_date: NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
                abatement_date: None,
                status: FactStatus::Active,
            },
            DiagnosisFact {
                code: "I10".into(),
                system: "ICD-10-CM".into(),
                display: None,
                onset_date: NaiveDate::from_ymd_opt(2025, 4, 1).unwrap(),
                abatement_date: None,
                status: FactStatus::Cancelled,
            },
        ];
        let views = p.facts_in(FactCategory::Diagnosis);
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].index, 0);
    }
}
