//! Leaf evaluation: matching one data element against the patient's facts

use crate::trace::{MatchedFact, ValidationNode, ValidationStatus};
use chrono::{Days, NaiveDate};
use log::debug;
use measurekit_model::{
    CumulativeSupply, DataElement, FactCategory, FactView, MeasureSpec, PairedCheck, TestPatient,
    TimingAnchor, TimingRequirement,
};
use measurekit_timing::{
    ConfigurationError, ResolutionContext, ResolvedTiming, resolve_requirement,
};
use rust_decimal::Decimal;
use smallvec::SmallVec;
use std::collections::BTreeSet;

type ResolvedTimings = SmallVec<[ResolvedTiming; 2]>;

/// Evaluate one data element, producing its trace node
pub(crate) fn eval_element(
    element: &DataElement,
    patient: &TestPatient,
    spec: &MeasureSpec,
    ctx: &ResolutionContext,
) -> ValidationNode {
    let mut node = ValidationNode::leaf(&element.id, &element.name, ValidationStatus::Fail);

    // Resolve timing first; a malformed configuration decides the node
    let mut resolved: ResolvedTimings = SmallVec::new();
    for requirement in element.effective_timing() {
        match resolve_requirement(requirement, ctx) {
            Ok(timing) => resolved.push(timing),
            Err(error) => {
                apply_resolution_failure(&mut node, element, requirement, &error, spec);
                return node;
            }
        }
    }

    if element.category == FactCategory::Demographic {
        eval_demographic(element, patient, ctx, &mut node);
    } else if let Some(check) = &element.paired_check {
        eval_paired(element, check, patient, &resolved, &mut node);
    } else if let Some(supply) = &element.cumulative_supply {
        eval_cumulative_supply(element, supply, patient, spec, ctx, &mut node);
    } else {
        eval_presence(element, patient, &resolved, &mut node);
    }

    debug!(
        "element '{}' evaluated {:?} with {} fact(s)",
        element.id,
        node.status,
        node.facts.len()
    );
    node
}

/// Distinguish authoring defects from missing patient data when a timing
/// requirement fails to resolve. An index event the measure never defines
/// is a configuration error; a defined event the patient simply lacks, or
/// a fact-derived anchor with no source fact, is a normal fail.
fn apply_resolution_failure(
    node: &mut ValidationNode,
    element: &DataElement,
    requirement: &TimingRequirement,
    error: &ConfigurationError,
    spec: &MeasureSpec,
) {
    node.status = ValidationStatus::Fail;
    match error {
        ConfigurationError::UnresolvedIndexEvent { name } if spec.index_event(name).is_some() => {
            node.gap = Some(format!(
                "No '{name}' index event occurred for this patient, so '{}' cannot apply",
                element.name
            ));
        }
        ConfigurationError::UnresolvedAnchor { anchor } => {
            node.gap = Some(format!(
                "No {anchor} date available for this patient ({requirement})"
            ));
        }
        _ => {
            node.diagnostic = Some(error.to_string());
        }
    }
}

fn eval_demographic(
    element: &DataElement,
    patient: &TestPatient,
    ctx: &ResolutionContext,
    node: &mut ValidationNode,
) {
    // Age is taken as of the measurement-period end; no wall-clock reads
    let age = Decimal::from(patient.age_on(ctx.today));
    let mut passed = match &element.threshold {
        Some(threshold) => threshold.satisfied_by(age),
        None => true,
    };
    if element.negation {
        passed = !passed;
    }
    node.status = status_of(passed);
    if !passed && let Some(threshold) = &element.threshold {
        node.gap = Some(format!(
            "Patient age {age} does not satisfy {threshold} for '{}'",
            element.name
        ));
    }
}

fn eval_presence(
    element: &DataElement,
    patient: &TestPatient,
    resolved: &ResolvedTimings,
    node: &mut ValidationNode,
) {
    let mut matches = Vec::new();
    for view in patient.facts_in(element.category) {
        if !element.binding.contains(view.code, view.system) {
            continue;
        }
        if !resolved.iter().all(|t| t.matches(view.date, view.end_date)) {
            continue;
        }
        if let Some(threshold) = &element.threshold {
            match view.value {
                Some(value) if threshold.satisfied_by(value) => {}
                _ => continue,
            }
        }
        matches.push(MatchedFact::from_view(&view));
    }

    // Negated elements pass on absence; the offending facts are reported
    // when they fail
    let passed = if element.negation {
        matches.is_empty()
    } else {
        !matches.is_empty()
    };
    node.status = status_of(passed);
    if !passed {
        if element.negation {
            node.gap = Some(format!(
                "'{}' must be absent, but {} matching {}(s) were found",
                element.name,
                matches.len(),
                element.category
            ));
        } else if element.threshold.is_some() {
            node.gap = Some(format!(
                "No {} meeting the required threshold for '{}'",
                element.category, element.name
            ));
        } else {
            node.gap = Some(format!(
                "No qualifying {} found for '{}'",
                element.category, element.name
            ));
        }
    }
    node.facts = matches;
}

/// Same-day paired observations: find the most recent date on which every
/// component has a recorded value, then hold each component's threshold
/// against that day's readings. Earlier matching days are not substitutes.
fn eval_paired(
    element: &DataElement,
    check: &PairedCheck,
    patient: &TestPatient,
    resolved: &ResolvedTimings,
    node: &mut ValidationNode,
) {
    let observations = patient.facts_in(FactCategory::Observation);
    let per_component: Vec<Vec<&FactView<'_>>> = check
        .components
        .iter()
        .map(|component| {
            observations
                .iter()
                .filter(|view| {
                    view.value.is_some()
                        && component.binding.contains(view.code, view.system)
                        && resolved.iter().all(|t| t.matches(view.date, view.end_date))
                })
                .collect()
        })
        .collect();

    // Dates on which every component has at least one reading
    let mut shared_days: Option<BTreeSet<NaiveDate>> = None;
    for views in &per_component {
        let days: BTreeSet<NaiveDate> = views.iter().map(|v| v.date).collect();
        shared_days = Some(match shared_days {
            Some(existing) => existing.intersection(&days).copied().collect(),
            None => days,
        });
    }
    let pair_day = shared_days.and_then(|days| days.last().copied());

    let Some(day) = pair_day else {
        let passed = element.negation;
        node.status = status_of(passed);
        if !passed {
            node.gap = Some(format!(
                "No single day carries all required readings for '{}'",
                element.name
            ));
        }
        return;
    };

    // Latest reading per component on the qualifying day; list position
    // breaks exact date ties
    let mut passed = true;
    let mut facts = Vec::new();
    let mut failed_component: Option<String> = None;
    for (component, views) in check.components.iter().zip(&per_component) {
        let chosen = views
            .iter()
            .filter(|v| v.date == day)
            .max_by_key(|v| v.index)
            .expect("component has a reading on the shared day");
        if let Some(threshold) = &component.threshold {
            let satisfied = chosen.value.is_some_and(|value| threshold.satisfied_by(value));
            if !satisfied && failed_component.is_none() {
                failed_component = Some(format!(
                    "{} {} on {day} did not satisfy {threshold}",
                    component.label,
                    chosen.value.map(|v| v.to_string()).unwrap_or_default(),
                ));
            }
            passed &= satisfied;
        }
        facts.push(MatchedFact::from_view(chosen));
    }

    if element.negation {
        passed = !passed;
    }
    node.status = status_of(passed);
    node.facts = facts;
    if !passed && let Some(reason) = failed_component {
        node.gap = Some(format!("'{}': {reason}", element.name));
    }
}

/// Medication adherence: total days supply within a fixed window from a
/// named index event, compared against the required amount
fn eval_cumulative_supply(
    element: &DataElement,
    supply: &CumulativeSupply,
    patient: &TestPatient,
    spec: &MeasureSpec,
    ctx: &ResolutionContext,
    node: &mut ValidationNode,
) {
    if spec.index_event(&supply.index_event).is_none() {
        node.status = ValidationStatus::Fail;
        node.diagnostic = Some(
            ConfigurationError::unresolved_index_event(&supply.index_event).to_string(),
        );
        return;
    }

    let anchor = TimingAnchor::IndexEvent(supply.index_event.clone());
    let Some(index_date) = ctx.events.get(&anchor).copied() else {
        node.status = status_of(element.negation);
        if !element.negation {
            node.gap = Some(format!(
                "No '{}' index event occurred for this patient, so '{}' cannot apply",
                supply.index_event, element.name
            ));
        }
        return;
    };

    let window_end = index_date
        .checked_add_days(Days::new(u64::from(supply.window_days)))
        .unwrap_or(NaiveDate::MAX);

    let mut total: u64 = 0;
    let mut facts = Vec::new();
    for view in patient.facts_in(FactCategory::Medication) {
        if !element.binding.contains(view.code, view.system) {
            continue;
        }
        if view.date < index_date || view.date > window_end {
            continue;
        }
        total += u64::from(view.days_supply.unwrap_or(0));
        facts.push(MatchedFact::from_view(&view));
    }

    let mut passed = supply
        .comparator
        .compare(Decimal::from(total), supply.required_days);
    if element.negation {
        passed = !passed;
    }
    node.status = status_of(passed);
    node.facts = facts;
    if !passed && !element.negation {
        node.gap = Some(format!(
            "'{}': {total} days supply between {index_date} and {window_end}; requires {} {}",
            element.name,
            supply.comparator.symbol(),
            supply.required_days
        ));
    }
}

fn status_of(passed: bool) -> ValidationStatus {
    if passed {
        ValidationStatus::Pass
    } else {
        ValidationStatus::Fail
    }
}
