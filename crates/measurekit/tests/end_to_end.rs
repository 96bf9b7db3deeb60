//! End-to-end: JSON measure + JSON patient through evaluation, generation,
//! and scoring, exactly as external collaborators drive the engine

use measurekit::{
    Compiler, FinalOutcome, MeasureEvaluator, MeasureSpec, OverrideStore, PopulationType,
    TargetFormat, TestPatient, score_clause,
};
use measurekit::eval::ValidationStatus;
use pretty_assertions::assert_eq;

const MEASURE_JSON: &str = r#"{
  "id": "cbp-001",
  "title": "Controlled Blood Pressure",
  "version": "1.0.0",
  "measurement_period": { "start": "2025-01-01", "end": "2025-12-31" },
  "populations": [
    {
      "population": "initial-population",
      "criteria": {
        "id": "ip",
        "name": "Hypertensive Adults",
        "operator": "AND",
        "children": [
          {
            "kind": "element",
            "id": "ip-htn",
            "name": "Essential Hypertension",
            "category": "diagnosis",
            "value_set": {
              "name": "Essential Hypertension",
              "oid": "2.16.840.1.113883.3.464.1003.104.12.1011",
              "codes": [
                { "code": "I10", "system": "ICD-10-CM", "display": "Essential hypertension" }
              ],
              "confidence": "high",
              "verified": true
            },
            "timing": [
              {
                "original": { "operator": "during", "anchor": "measurement-period-start" }
              }
            ],
            "confidence": "high",
            "review_status": "accepted"
          },
          {
            "kind": "element",
            "id": "ip-age",
            "name": "Age 18 or older",
            "category": "demographic",
            "threshold": { "comparator": ">=", "value": "18" },
            "confidence": "high",
            "review_status": "accepted"
          }
        ]
      }
    },
    {
      "population": "denominator-exclusion",
      "criteria": {
        "id": "excl",
        "name": "ESRD",
        "operator": "OR",
        "children": [
          {
            "kind": "element",
            "id": "excl-esrd",
            "name": "End Stage Renal Disease",
            "category": "diagnosis",
            "direct_codes": [ { "code": "N18.6", "system": "ICD-10-CM" } ],
            "timing": [
              {
                "original": { "operator": "during", "anchor": "measurement-period-start" }
              }
            ],
            "confidence": "medium",
            "review_status": "accepted"
          }
        ]
      }
    },
    {
      "population": "numerator",
      "criteria": {
        "id": "num",
        "name": "Controlled",
        "operator": "AND",
        "children": [
          {
            "kind": "element",
            "id": "num-pair",
            "name": "Same-day blood pressure readings",
            "category": "observation",
            "paired_check": {
              "components": [
                { "label": "SBP", "direct_codes": [ { "code": "8480-6", "system": "LOINC" } ] },
                { "label": "DBP", "direct_codes": [ { "code": "8462-4", "system": "LOINC" } ] }
              ]
            },
            "timing": [
              {
                "original": { "operator": "during", "anchor": "measurement-period-start" }
              }
            ],
            "confidence": "high",
            "review_status": "accepted"
          },
          {
            "kind": "element",
            "id": "num-threshold",
            "name": "Blood pressure below 140/90",
            "category": "observation",
            "paired_check": {
              "components": [
                {
                  "label": "SBP",
                  "direct_codes": [ { "code": "8480-6", "system": "LOINC" } ],
                  "threshold": { "comparator": "<", "value": "140" }
                },
                {
                  "label": "DBP",
                  "direct_codes": [ { "code": "8462-4", "system": "LOINC" } ],
                  "threshold": { "comparator": "<", "value": "90" }
                }
              ]
            },
            "timing": [
              {
                "original": { "operator": "during", "anchor": "measurement-period-start" }
              }
            ],
            "confidence": "high",
            "review_status": "accepted"
          }
        ]
      }
    }
  ]
}"#;

const PATIENT_JSON: &str = r#"{
  "id": "p-042",
  "name": "Jordan Sample",
  "birth_date": "1967-03-02",
  "gender": "female",
  "diagnoses": [
    { "code": "I10", "system": "ICD-10-CM", "onset_date": "2025-02-10", "status": "active" }
  ],
  "observations": [
    {
      "code": "8480-6", "system": "LOINC", "effective_date": "2025-09-15",
      "value": "148", "unit": "mm[Hg]", "status": "completed"
    },
    {
      "code": "8462-4", "system": "LOINC", "effective_date": "2025-09-15",
      "value": "94", "unit": "mm[Hg]", "status": "completed"
    }
  ]
}"#;

fn spec() -> MeasureSpec {
    let spec: MeasureSpec = serde_json::from_str(MEASURE_JSON).expect("measure parses");
    spec.validate().expect("measure validates");
    spec
}

fn patient() -> TestPatient {
    serde_json::from_str(PATIENT_JSON).expect("patient parses")
}

#[test]
fn uncontrolled_patient_misses_the_numerator() {
    let trace = MeasureEvaluator::new().evaluate(&patient(), &spec());

    assert_eq!(trace.final_outcome, FinalOutcome::NotInNumerator);
    assert!(trace
        .population(PopulationType::InitialPopulation)
        .unwrap()
        .passed());

    // Both readings exist on the same day, so the pair element passes;
    // 148/94 misses the 140/90 thresholds, so the threshold element fails
    let numerator = trace.population(PopulationType::Numerator).unwrap();
    let pair = numerator.children.iter().find(|n| n.id == "num-pair").unwrap();
    let threshold = numerator
        .children
        .iter()
        .find(|n| n.id == "num-threshold")
        .unwrap();
    assert_eq!(pair.status, ValidationStatus::Pass);
    assert_eq!(threshold.status, ValidationStatus::Fail);
    assert!(!trace.how_close.is_empty());
}

#[test]
fn trace_round_trips_through_json() {
    let trace = MeasureEvaluator::new().evaluate(&patient(), &spec());
    let json = serde_json::to_string(&trace).unwrap();
    let back: measurekit::PatientValidationTrace = serde_json::from_str(&json).unwrap();
    assert_eq!(trace, back);
}

#[test]
fn both_targets_generate_from_the_same_tree() {
    let spec = spec();
    let overrides = OverrideStore::new();
    let compiler = Compiler::new();

    let cql = compiler
        .compile(&spec, TargetFormat::ClinicalExpression, &overrides)
        .unwrap();
    assert!(cql.code.contains("library ControlledBloodPressure version '1.0.0'"));
    assert!(cql.code.contains("define \"Blood pressure below 140/90\""));
    assert!(cql.code.contains("define \"Denominator\""));

    let sql = compiler
        .compile(&spec, TargetFormat::WarehouseSql, &overrides)
        .unwrap();
    assert!(sql.code.contains("de_blood_pressure_below_140_90"));
    assert!(sql.code.contains("pair_date"));
    assert!(sql.code.contains("pop_denominator_exclusion"));
}

#[test]
fn complexity_ranks_the_numerator_above_the_exclusion() {
    let spec = spec();
    let numerator = score_clause(
        &spec
            .population(PopulationType::Numerator)
            .unwrap()
            .criteria,
    );
    let exclusion = score_clause(
        &spec
            .populations_of(PopulationType::DenominatorExclusion)
            .next()
            .unwrap()
            .criteria,
    );
    assert!(numerator.score > exclusion.score);
}
