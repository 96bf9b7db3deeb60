//! Shared builders for evaluator tests
#![allow(dead_code)]

use chrono::NaiveDate;
use measurekit_model::{
    CodeBinding, CodeReference, Comparator, CriteriaNode, DataElement, DiagnosisFact, FactCategory,
    FactStatus, Gender, LogicalClause, LogicalOperator, MeasureSpec, MeasurementPeriod,
    MedicationFact, ObservationFact, PairedCheck, PairedComponent, PopulationDefinition,
    PopulationType, TestPatient, Threshold, TimingAnchor, TimingConstraint, TimingOperator,
    TimingRequirement,
};
use measurekit_model::Edited;
use rust_decimal::Decimal;

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn period_2025() -> MeasurementPeriod {
    MeasurementPeriod::new(date(2025, 1, 1), date(2025, 12, 31)).unwrap()
}

pub fn during_mp() -> Edited<TimingRequirement> {
    Edited::new(TimingRequirement::Constraint(TimingConstraint::new(
        TimingOperator::During,
        TimingAnchor::MeasurementPeriodStart,
    )))
}

pub fn diagnosis_element(id: &str, name: &str, code: &str) -> DataElement {
    let mut element = DataElement::new(
        id,
        name,
        FactCategory::Diagnosis,
        CodeBinding::from_codes(vec![CodeReference::new(code, "ICD-10-CM")]),
    );
    element.timing.push(during_mp());
    element
}

pub fn age_element(id: &str, minimum: i64) -> DataElement {
    let mut element = DataElement::new(
        id,
        format!("Age {minimum} or older"),
        FactCategory::Demographic,
        CodeBinding::default(),
    );
    element.threshold = Some(Threshold::new(Comparator::Ge, Decimal::from(minimum)));
    element
}

fn bp_component(label: &str, loinc: &str, limit: Option<i64>) -> PairedComponent {
    PairedComponent {
        label: label.to_string(),
        binding: CodeBinding::from_codes(vec![CodeReference::new(loinc, "LOINC")]),
        threshold: limit.map(|v| Threshold::new(Comparator::Lt, Decimal::from(v))),
    }
}

/// Element requiring SBP and DBP readings on the same day, values ignored
pub fn bp_pair_element(id: &str) -> DataElement {
    let mut element = DataElement::new(
        id,
        "Same-day blood pressure readings",
        FactCategory::Observation,
        CodeBinding::default(),
    );
    element.paired_check = Some(PairedCheck {
        components: vec![
            bp_component("SBP", "8480-6", None),
            bp_component("DBP", "8462-4", None),
        ],
    });
    element.timing.push(during_mp());
    element
}

/// Element requiring the most recent same-day pair to be under 140/90
pub fn bp_threshold_element(id: &str) -> DataElement {
    let mut element = DataElement::new(
        id,
        "Blood pressure below 140/90",
        FactCategory::Observation,
        CodeBinding::default(),
    );
    element.paired_check = Some(PairedCheck {
        components: vec![
            bp_component("SBP", "8480-6", Some(140)),
            bp_component("DBP", "8462-4", Some(90)),
        ],
    });
    element.timing.push(during_mp());
    element
}

pub fn clause(id: &str, operator: LogicalOperator, children: Vec<CriteriaNode>) -> LogicalClause {
    LogicalClause::new(id, id.to_uppercase(), operator, children)
}

pub fn population(population: PopulationType, criteria: LogicalClause) -> PopulationDefinition {
    PopulationDefinition {
        population,
        criteria,
    }
}

/// The controlled-blood-pressure measure the element and population tests
/// run against: hypertensive adults, ESRD excluded, numerator requires the
/// most recent same-day BP pair under 140/90.
pub fn bp_measure() -> MeasureSpec {
    MeasureSpec {
        id: "cbp-001".into(),
        title: "Controlled Blood Pressure".into(),
        version: Some("1.0.0".into()),
        measurement_period: period_2025(),
        index_events: vec![],
        populations: vec![
            population(
                PopulationType::InitialPopulation,
                clause(
                    "ip",
                    LogicalOperator::And,
                    vec![
                        CriteriaNode::Element(diagnosis_element(
                            "ip-htn",
                            "Essential Hypertension",
                            "I10",
                        )),
                        CriteriaNode::Element(age_element("ip-age", 18)),
                    ],
                ),
            ),
            population(
                PopulationType::DenominatorExclusion,
                clause(
                    "excl",
                    LogicalOperator::Or,
                    vec![CriteriaNode::Element(diagnosis_element(
                        "excl-esrd",
                        "End Stage Renal Disease",
                        "N18.6",
                    ))],
                ),
            ),
            population(
                PopulationType::Numerator,
                clause(
                    "num",
                    LogicalOperator::And,
                    vec![
                        CriteriaNode::Element(bp_pair_element("num-pair")),
                        CriteriaNode::Element(bp_threshold_element("num-threshold")),
                    ],
                ),
            ),
        ],
    }
}

pub fn observation(code: &str, day: NaiveDate, value: i64) -> ObservationFact {
    ObservationFact {
        code: code.to_string(),
        system: "LOINC".to_string(),
        display: None,
        effective_date: day,
        value: Some(Decimal::from(value)),
        unit: Some("mm[Hg]".to_string()),
        status: FactStatus::Completed,
    }
}

pub fn diagnosis(code: &str, onset: NaiveDate) -> DiagnosisFact {
    DiagnosisFact {
        code: code.to_string(),
        system: "ICD-10-CM".to_string(),
        display: None,
        onset_date: onset,
        abatement_date: None,
        status: FactStatus::Active,
    }
}

pub fn medication(code: &str, fill: NaiveDate, days_supply: u32) -> MedicationFact {
    MedicationFact {
        code: code.to_string(),
        system: "RxNorm".to_string(),
        display: None,
        fill_date: fill,
        days_supply: Some(days_supply),
        status: FactStatus::Completed,
    }
}

/// A 58-year-old hypertensive patient with one same-day BP pair
pub fn hypertensive_patient(sbp: i64, dbp: i64) -> TestPatient {
    TestPatient {
        id: "p-001".into(),
        name: "Pat Example".into(),
        birth_date: date(1967, 3, 2),
        gender: Gender::Female,
        diagnoses: vec![diagnosis("I10", date(2025, 2, 10))],
        encounters: vec![],
        procedures: vec![],
        observations: vec![
            observation("8480-6", date(2025, 9, 15), sbp),
            observation("8462-4", date(2025, 9, 15), dbp),
        ],
        medications: vec![],
        immunizations: vec![],
    }
}
