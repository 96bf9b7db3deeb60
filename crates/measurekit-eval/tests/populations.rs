//! Population state machine and outcome classification

mod common;

use common::*;
use measurekit_eval::{EvalError, FinalOutcome, MeasureEvaluator, ValidationStatus};
use measurekit_model::{
    CriteriaNode, LogicalOperator, PopulationType, TimingAnchor, TimingConstraint, TimingOperator,
    TimingRequirement,
};
use measurekit_model::Edited;
use pretty_assertions::assert_eq;
use proptest::prelude::*;

#[test]
fn ip_unmet_yields_not_in_population() {
    let mut patient = hypertensive_patient(120, 80);
    patient.diagnoses.clear();

    let trace = MeasureEvaluator::new().evaluate(&patient, &bp_measure());
    assert_eq!(trace.final_outcome, FinalOutcome::NotInPopulation);

    // Later populations are stubbed, not evaluated
    let numerator = trace.population(PopulationType::Numerator).unwrap();
    assert_eq!(numerator.status, ValidationStatus::NotApplicable);
    assert!(numerator.children.is_empty());
}

#[test]
fn exclusion_met_yields_excluded_and_skips_numerator() {
    let mut patient = hypertensive_patient(120, 80);
    patient.diagnoses.push(diagnosis("N18.6", date(2025, 5, 20)));

    let trace = MeasureEvaluator::new().evaluate(&patient, &bp_measure());
    assert_eq!(trace.final_outcome, FinalOutcome::Excluded);
    assert_eq!(
        trace
            .population(PopulationType::Numerator)
            .unwrap()
            .status,
        ValidationStatus::NotApplicable
    );
}

#[test]
fn numerator_unmet_yields_not_in_numerator_with_gaps() {
    let patient = hypertensive_patient(148, 94);

    let trace = MeasureEvaluator::new().evaluate(&patient, &bp_measure());
    assert_eq!(trace.final_outcome, FinalOutcome::NotInNumerator);
    assert!(!trace.how_close.is_empty());
}

#[test]
fn numerator_met_yields_in_numerator() {
    let patient = hypertensive_patient(130, 82);

    let trace = MeasureEvaluator::new().evaluate(&patient, &bp_measure());
    assert_eq!(trace.final_outcome, FinalOutcome::InNumerator);
    assert!(trace.how_close.is_empty());
}

#[test]
fn uncontrolled_bp_scenario_pair_passes_threshold_fails() {
    // SBP 148 / DBP 94 recorded the same day: the pair exists, the
    // threshold does not hold, so the patient misses the numerator
    let patient = hypertensive_patient(148, 94);
    let trace = MeasureEvaluator::new().evaluate(&patient, &bp_measure());

    let numerator = trace.population(PopulationType::Numerator).unwrap();
    assert_eq!(numerator.status, ValidationStatus::Fail);

    let pair = numerator.children.iter().find(|n| n.id == "num-pair").unwrap();
    assert_eq!(pair.status, ValidationStatus::Pass);
    assert_eq!(pair.facts.len(), 2);

    let threshold = numerator
        .children
        .iter()
        .find(|n| n.id == "num-threshold")
        .unwrap();
    assert_eq!(threshold.status, ValidationStatus::Fail);

    assert_eq!(trace.final_outcome, FinalOutcome::NotInNumerator);
}

#[test]
fn denominator_defaults_to_initial_population() {
    let patient = hypertensive_patient(130, 82);
    let trace = MeasureEvaluator::new().evaluate(&patient, &bp_measure());

    let denominator = trace.population(PopulationType::Denominator).unwrap();
    assert!(denominator.passed());
    assert!(denominator.label.contains("Initial Population"));
}

#[test]
fn evaluation_is_deterministic() {
    let patient = hypertensive_patient(148, 94);
    let spec = bp_measure();
    let evaluator = MeasureEvaluator::new();

    let first = evaluator.evaluate(&patient, &spec);
    let second = evaluator.evaluate(&patient, &spec);
    assert_eq!(first, second);
}

#[test]
fn strict_mode_fails_on_configuration_diagnostics() {
    let mut spec = bp_measure();
    // Anchor the numerator threshold element on an index event the
    // measure never defines
    if let Some(def) = spec
        .populations
        .iter_mut()
        .find(|p| p.population == PopulationType::Numerator)
    {
        if let CriteriaNode::Element(element) = &mut def.criteria.children[0] {
            element.timing = vec![Edited::new(TimingRequirement::Constraint(
                TimingConstraint::new(
                    TimingOperator::During,
                    TimingAnchor::IndexEvent("GHOST".into()),
                ),
            ))];
        }
    }

    let patient = hypertensive_patient(130, 82);
    let evaluator = MeasureEvaluator::new();

    // Non-strict: the trace is produced, the node carries the diagnostic
    let trace = evaluator.evaluate(&patient, &spec);
    assert!(trace.first_diagnostic().is_some());

    // Strict: the same defect becomes a hard error
    let error = evaluator.evaluate_strict(&patient, &spec).unwrap_err();
    assert!(matches!(error, EvalError::Configuration { .. }));
}

#[test]
fn multiple_exclusion_definitions_are_or_combined() {
    let mut spec = bp_measure();
    spec.populations.push(population(
        PopulationType::DenominatorExclusion,
        clause(
            "excl2",
            LogicalOperator::Or,
            vec![CriteriaNode::Element(diagnosis_element(
                "excl-preg",
                "Pregnancy",
                "Z33.1",
            ))],
        ),
    ));

    let mut patient = hypertensive_patient(130, 82);
    patient.diagnoses.push(diagnosis("Z33.1", date(2025, 8, 1)));

    let trace = MeasureEvaluator::new().evaluate(&patient, &spec);
    assert_eq!(trace.final_outcome, FinalOutcome::Excluded);

    let exclusions = trace
        .population(PopulationType::DenominatorExclusion)
        .unwrap();
    assert_eq!(exclusions.children.len(), 2);
}

proptest! {
    /// The outcome follows the threshold rule for any same-day BP pair,
    /// and repeated evaluation never disagrees with itself.
    #[test]
    fn outcome_matches_threshold_rule(sbp in 90i64..200, dbp in 50i64..130) {
        let patient = hypertensive_patient(sbp, dbp);
        let spec = bp_measure();
        let evaluator = MeasureEvaluator::new();

        let trace = evaluator.evaluate(&patient, &spec);
        let expected = if sbp < 140 && dbp < 90 {
            FinalOutcome::InNumerator
        } else {
            FinalOutcome::NotInNumerator
        };
        prop_assert_eq!(trace.final_outcome, expected);
        prop_assert_eq!(&evaluator.evaluate(&patient, &spec), &trace);
    }
}
