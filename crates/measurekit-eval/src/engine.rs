//! The measure evaluator: clause combination and the population state machine

use crate::element::eval_element;
use crate::error::{EvalError, EvalResult};
use crate::gaps::collect_gaps;
use crate::trace::{FinalOutcome, PatientValidationTrace, ValidationNode, ValidationStatus};
use chrono::NaiveDate;
use indexmap::IndexMap;
use log::debug;
use measurekit_model::{
    CriteriaNode, FactCategory, LogicalClause, LogicalOperator, MeasureSpec,
    PopulationDefinition, PopulationType, TestPatient, TimingAnchor,
};
use measurekit_timing::ResolutionContext;

/// The measure evaluation engine.
///
/// Stateless; one instance can evaluate any number of patients, from any
/// number of threads, against any number of specs.
#[derive(Debug, Default)]
pub struct MeasureEvaluator;

impl MeasureEvaluator {
    pub fn new() -> Self {
        Self
    }

    /// Evaluate one patient against a measure.
    ///
    /// Never fails: missing facts are normal `fail` statuses, and malformed
    /// timing configuration surfaces as a failing node with a diagnostic
    /// attached.
    pub fn evaluate(&self, patient: &TestPatient, spec: &MeasureSpec) -> PatientValidationTrace {
        let ctx = self.resolution_context(patient, spec);
        let mut populations: IndexMap<PopulationType, ValidationNode> = IndexMap::new();
        let mut how_close = Vec::new();

        // Initial population gates everything else
        let ip_node = match spec.population(PopulationType::InitialPopulation) {
            Some(def) => self.eval_clause(&def.criteria, patient, spec, &ctx),
            None => {
                let mut node = ValidationNode::leaf(
                    "initial-population",
                    "Initial Population",
                    ValidationStatus::Fail,
                );
                node.diagnostic = Some("Measure defines no initial population".to_string());
                node
            }
        };
        let ip_met = ip_node.passed();
        populations.insert(PopulationType::InitialPopulation, ip_node);

        if !ip_met {
            self.mark_unevaluated(spec, &mut populations);
            return self.finish(patient, spec, populations, FinalOutcome::NotInPopulation, how_close);
        }

        // Denominator defaults to the initial population when no distinct
        // criteria are supplied
        let denominator_node = match spec.population(PopulationType::Denominator) {
            Some(def) => self.eval_clause(&def.criteria, patient, spec, &ctx),
            None => {
                let mut node = populations[&PopulationType::InitialPopulation].clone();
                node.label = "Denominator (same as Initial Population)".to_string();
                node
            }
        };
        let denominator_met = denominator_node.passed();
        populations.insert(PopulationType::Denominator, denominator_node);

        if !denominator_met {
            self.mark_unevaluated(spec, &mut populations);
            return self.finish(patient, spec, populations, FinalOutcome::NotInPopulation, how_close);
        }

        // Exclusions are OR-combined across every exclusion definition
        let exclusion_defs: Vec<&PopulationDefinition> = spec
            .populations_of(PopulationType::DenominatorExclusion)
            .chain(spec.populations_of(PopulationType::NumeratorExclusion))
            .collect();
        let mut excluded = false;
        if !exclusion_defs.is_empty() {
            let node = self.eval_combined(
                "exclusions",
                "Exclusions",
                &exclusion_defs,
                patient,
                spec,
                &ctx,
            );
            excluded = node.passed();
            populations.insert(PopulationType::DenominatorExclusion, node);
        }
        if excluded {
            self.mark_unevaluated(spec, &mut populations);
            return self.finish(patient, spec, populations, FinalOutcome::Excluded, how_close);
        }

        let numerator_node = match spec.population(PopulationType::Numerator) {
            Some(def) => self.eval_clause(&def.criteria, patient, spec, &ctx),
            None => {
                let mut node =
                    ValidationNode::leaf("numerator", "Numerator", ValidationStatus::Fail);
                node.diagnostic = Some("Measure defines no numerator".to_string());
                node
            }
        };
        let numerator_met = numerator_node.passed();
        if !numerator_met {
            how_close = collect_gaps(&numerator_node);
        }
        populations.insert(PopulationType::Numerator, numerator_node);

        if numerator_met {
            self.mark_unevaluated(spec, &mut populations);
            return self.finish(patient, spec, populations, FinalOutcome::InNumerator, how_close);
        }

        // Exceptions only apply to patients that missed the numerator
        let exception_defs: Vec<&PopulationDefinition> = spec
            .populations_of(PopulationType::DenominatorException)
            .collect();
        if !exception_defs.is_empty() {
            let node = self.eval_combined(
                "exceptions",
                "Denominator Exceptions",
                &exception_defs,
                patient,
                spec,
                &ctx,
            );
            let excepted = node.passed();
            populations.insert(PopulationType::DenominatorException, node);
            if excepted {
                return self.finish(patient, spec, populations, FinalOutcome::Excluded, Vec::new());
            }
        }

        self.finish(patient, spec, populations, FinalOutcome::NotInNumerator, how_close)
    }

    /// Evaluate, then fail if any node carries a configuration diagnostic.
    ///
    /// Missing patient data still never fails; this only hardens the
    /// handling of measure-authoring defects.
    pub fn evaluate_strict(
        &self,
        patient: &TestPatient,
        spec: &MeasureSpec,
    ) -> EvalResult<PatientValidationTrace> {
        let trace = self.evaluate(patient, spec);
        if let Some((node, message)) = trace.first_diagnostic() {
            return Err(EvalError::configuration(node, message));
        }
        Ok(trace)
    }

    /// Evaluate one criteria node
    pub fn eval_node(
        &self,
        node: &CriteriaNode,
        patient: &TestPatient,
        spec: &MeasureSpec,
        ctx: &ResolutionContext,
    ) -> ValidationNode {
        match node {
            CriteriaNode::Element(element) => eval_element(element, patient, spec, ctx),
            CriteriaNode::Clause(clause) => self.eval_clause(clause, patient, spec, ctx),
        }
    }

    /// Evaluate a clause: every child first, then the pairwise combination
    /// with sibling-connection overrides applied left to right
    pub fn eval_clause(
        &self,
        clause: &LogicalClause,
        patient: &TestPatient,
        spec: &MeasureSpec,
        ctx: &ResolutionContext,
    ) -> ValidationNode {
        let children: Vec<ValidationNode> = clause
            .children
            .iter()
            .map(|child| self.eval_node(child, patient, spec, ctx))
            .collect();

        let passed = match clause.operator {
            LogicalOperator::Not => {
                // Arity is enforced by model validation; fall back to AND
                // over inverted children if a malformed tree slips through
                !children.iter().all(ValidationNode::passed)
            }
            _ => {
                // Left fold over adjacent pairs, honoring per-pair overrides
                let mut accumulated = children.first().is_some_and(ValidationNode::passed);
                for index in 1..children.len() {
                    let operator = clause.operator_between(
                        clause.children[index - 1].id(),
                        clause.children[index].id(),
                    );
                    let next = children[index].passed();
                    accumulated = match operator {
                        LogicalOperator::And => accumulated && next,
                        LogicalOperator::Or => accumulated || next,
                        // A NOT between siblings reads as "and not"
                        LogicalOperator::Not => accumulated && !next,
                    };
                }
                accumulated
            }
        };

        let mixed = children.iter().any(|c| c.passed()) && children.iter().any(|c| !c.passed());
        let status = if passed {
            if mixed {
                ValidationStatus::Partial
            } else {
                ValidationStatus::Pass
            }
        } else {
            ValidationStatus::Fail
        };

        debug!("clause '{}' combined to {:?}", clause.id, status);
        ValidationNode {
            id: clause.id.clone(),
            label: clause.name.clone(),
            status,
            facts: Vec::new(),
            diagnostic: None,
            gap: None,
            children,
        }
    }

    /// OR-combine several population definitions under one synthetic node
    fn eval_combined(
        &self,
        id: &str,
        label: &str,
        defs: &[&PopulationDefinition],
        patient: &TestPatient,
        spec: &MeasureSpec,
        ctx: &ResolutionContext,
    ) -> ValidationNode {
        let children: Vec<ValidationNode> = defs
            .iter()
            .map(|def| self.eval_clause(&def.criteria, patient, spec, ctx))
            .collect();
        let passed = children.iter().any(ValidationNode::passed);
        let mixed = passed && children.iter().any(|c| !c.passed());
        let status = if passed {
            if mixed {
                ValidationStatus::Partial
            } else {
                ValidationStatus::Pass
            }
        } else {
            ValidationStatus::Fail
        };
        ValidationNode {
            id: id.to_string(),
            label: label.to_string(),
            status,
            facts: Vec::new(),
            diagnostic: None,
            gap: None,
            children,
        }
    }

    /// Stub out populations that were never reached, in spec order
    fn mark_unevaluated(
        &self,
        spec: &MeasureSpec,
        populations: &mut IndexMap<PopulationType, ValidationNode>,
    ) {
        let order = [
            (PopulationType::Denominator, "Denominator"),
            (PopulationType::DenominatorExclusion, "Exclusions"),
            (PopulationType::Numerator, "Numerator"),
            (PopulationType::DenominatorException, "Denominator Exceptions"),
        ];
        for (population, label) in order {
            let defined = match population {
                PopulationType::DenominatorExclusion => {
                    spec.populations_of(PopulationType::DenominatorExclusion)
                        .next()
                        .is_some()
                        || spec
                            .populations_of(PopulationType::NumeratorExclusion)
                            .next()
                            .is_some()
                }
                _ => spec.populations_of(population).next().is_some(),
            };
            if defined && !populations.contains_key(&population) {
                populations.insert(
                    population,
                    ValidationNode::leaf(
                        population.to_string(),
                        label,
                        ValidationStatus::NotApplicable,
                    ),
                );
            }
        }
    }

    fn finish(
        &self,
        patient: &TestPatient,
        spec: &MeasureSpec,
        populations: IndexMap<PopulationType, ValidationNode>,
        final_outcome: FinalOutcome,
        how_close: Vec<String>,
    ) -> PatientValidationTrace {
        PatientValidationTrace {
            measure_id: spec.id.clone(),
            patient_id: patient.id.clone(),
            measure_version: spec.version.clone(),
            populations,
            final_outcome,
            how_close,
        }
    }

    /// Build the timing context for one patient: measurement period, index
    /// events derived from their definitions, and fact-derived anchor dates
    fn resolution_context(&self, patient: &TestPatient, spec: &MeasureSpec) -> ResolutionContext {
        let period = spec.measurement_period;
        let mut ctx = ResolutionContext::new(period);

        for def in &spec.index_events {
            let dates = patient
                .facts_in(def.category)
                .into_iter()
                .filter(|view| def.binding.contains(view.code, view.system))
                .filter(|view| period.contains(view.date))
                .map(|view| view.date);
            let date = match def.selection {
                measurekit_model::IndexSelection::First => dates.min(),
                measurekit_model::IndexSelection::Last => dates.max(),
            };
            if let Some(date) = date {
                ctx = ctx.with_index_event(def.name.clone(), date);
            }
        }

        let encounters = patient.facts_in(FactCategory::Encounter);
        if let Some(start) = encounters.iter().map(|e| e.date).min() {
            ctx = ctx.with_event(TimingAnchor::EncounterStart, start);
        }
        if let Some(end) = encounters.iter().filter_map(|e| e.end_date).max() {
            ctx = ctx.with_event(TimingAnchor::EncounterEnd, end);
            ctx = ctx.with_event(TimingAnchor::DischargeDate, end);
        }
        if let Some(onset) = patient
            .facts_in(FactCategory::Diagnosis)
            .iter()
            .map(|d| d.date)
            .min()
        {
            ctx = ctx.with_event(TimingAnchor::DiagnosisDate, onset);
        }
        if let Some(performed) = patient
            .facts_in(FactCategory::Procedure)
            .iter()
            .map(|p| p.date)
            .min()
        {
            ctx = ctx.with_event(TimingAnchor::ProcedureDate, performed);
        }

        ctx
    }

    /// Expose the derived event dates for a patient, in the order index
    /// events are declared. Useful for debugging measure timing.
    pub fn derived_index_events(
        &self,
        patient: &TestPatient,
        spec: &MeasureSpec,
    ) -> Vec<(String, NaiveDate)> {
        let ctx = self.resolution_context(patient, spec);
        spec.index_events
            .iter()
            .filter_map(|def| {
                ctx.events
                    .get(&TimingAnchor::IndexEvent(def.name.clone()))
                    .map(|date| (def.name.clone(), *date))
            })
            .collect()
    }
}
