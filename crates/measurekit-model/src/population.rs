//! Populations, index events, and the measure root

use crate::clause::LogicalClause;
use crate::codes::CodeBinding;
use crate::element::FactCategory;
use crate::error::{ModelError, ModelResult};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// The population gates a measure classifies patients into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PopulationType {
    InitialPopulation,
    Denominator,
    DenominatorExclusion,
    DenominatorException,
    Numerator,
    NumeratorExclusion,
}

impl PopulationType {
    /// True for the exclusion-style populations that are OR-combined during
    /// the exclusion step
    pub fn is_exclusion(&self) -> bool {
        matches!(
            self,
            PopulationType::DenominatorExclusion | PopulationType::NumeratorExclusion
        )
    }

    /// Populations that may legitimately be defined more than once
    pub fn allows_multiple(&self) -> bool {
        self.is_exclusion() || matches!(self, PopulationType::DenominatorException)
    }
}

impl fmt::Display for PopulationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            PopulationType::InitialPopulation => "initial-population",
            PopulationType::Denominator => "denominator",
            PopulationType::DenominatorExclusion => "denominator-exclusion",
            PopulationType::DenominatorException => "denominator-exception",
            PopulationType::Numerator => "numerator",
            PopulationType::NumeratorExclusion => "numerator-exclusion",
        };
        write!(f, "{text}")
    }
}

/// One population's criteria tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopulationDefinition {
    pub population: PopulationType,
    pub criteria: LogicalClause,
}

/// The fixed calendar interval the measure evaluates against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeasurementPeriod {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl MeasurementPeriod {
    pub fn new(start: NaiveDate, end: NaiveDate) -> ModelResult<Self> {
        if end < start {
            return Err(ModelError::InvalidPeriod {
                start: start.to_string(),
                end: end.to_string(),
            });
        }
        Ok(Self { start, end })
    }

    /// True when `date` falls inside the period, bounds included
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }
}

/// Which matching fact supplies an index event's date
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexSelection {
    /// Earliest matching fact within the measurement period
    First,
    /// Latest matching fact within the measurement period
    Last,
}

/// Rule deriving a patient-specific index event date (e.g. IPSD, the first
/// fill of a target medication in the period)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEventDefinition {
    /// Name timing anchors refer to (e.g. "IPSD")
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub category: FactCategory,
    #[serde(flatten)]
    pub binding: CodeBinding,
    pub selection: IndexSelection,
}

/// The canonical measure specification: one criteria tree per population
/// plus the shared timing context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasureSpec {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub measurement_period: MeasurementPeriod,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub index_events: Vec<IndexEventDefinition>,
    pub populations: Vec<PopulationDefinition>,
}

impl MeasureSpec {
    /// The single definition of a non-repeatable population type
    pub fn population(&self, population: PopulationType) -> Option<&PopulationDefinition> {
        self.populations
            .iter()
            .find(|p| p.population == population)
    }

    /// Every definition of a (possibly repeated) population type
    pub fn populations_of(
        &self,
        population: PopulationType,
    ) -> impl Iterator<Item = &PopulationDefinition> {
        self.populations
            .iter()
            .filter(move |p| p.population == population)
    }

    /// Look up an index event rule by name
    pub fn index_event(&self, name: &str) -> Option<&IndexEventDefinition> {
        self.index_events.iter().find(|e| e.name == name)
    }

    /// Validate the period, population uniqueness, and every criteria tree
    pub fn validate(&self) -> ModelResult<()> {
        MeasurementPeriod::new(self.measurement_period.start, self.measurement_period.end)?;

        let mut seen: HashSet<PopulationType> = HashSet::new();
        for def in &self.populations {
            if !def.population.allows_multiple() && !seen.insert(def.population) {
                return Err(ModelError::DuplicatePopulation {
                    population: def.population.to_string(),
                });
            }
            def.criteria.validate()?;
        }
        Ok(())
    }
}
