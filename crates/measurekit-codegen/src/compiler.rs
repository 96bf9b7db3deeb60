//! Compiler entry point and shared pre-passes

use crate::error::{GenResult, GenerationError};
use crate::overrides::OverrideStore;
use crate::target::TargetFormat;
use crate::{cql, sql};
use log::warn;
use measurekit_model::{CriteriaNode, DataElement, MeasureSpec, TimingAnchor};

/// One generated artifact: the code text plus non-fatal findings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedCode {
    pub code: String,
    pub warnings: Vec<String>,
}

/// The code-generation compiler.
///
/// Stateless and pure over its inputs; the override store is read through
/// its own lock. One instance serves any number of measures and targets.
#[derive(Debug, Default)]
pub struct Compiler;

impl Compiler {
    pub fn new() -> Self {
        Self
    }

    /// Compile a measure for one target format.
    ///
    /// Locked overrides for `(component, format)` are emitted verbatim in
    /// place of generated code, for the requested format only. A reference
    /// to an undefined index event aborts generation for this target; an
    /// empty value set degrades to a warning.
    pub fn compile(
        &self,
        spec: &MeasureSpec,
        target: TargetFormat,
        overrides: &OverrideStore,
    ) -> GenResult<GeneratedCode> {
        verify_index_events(spec)?;
        let warnings = collect_code_warnings(spec);

        let code = match target {
            TargetFormat::ClinicalExpression => cql::generate(spec, overrides),
            TargetFormat::WarehouseSql => sql::generate(spec, overrides),
        };

        Ok(GeneratedCode { code, warnings })
    }
}

/// Visit every data element across all population trees
pub(crate) fn for_each_element<'a>(spec: &'a MeasureSpec, f: &mut impl FnMut(&'a DataElement)) {
    fn walk<'a>(node: &'a CriteriaNode, f: &mut impl FnMut(&'a DataElement)) {
        match node {
            CriteriaNode::Element(element) => f(element),
            CriteriaNode::Clause(clause) => {
                for child in &clause.children {
                    walk(child, f);
                }
            }
        }
    }
    for def in &spec.populations {
        for child in &def.criteria.children {
            walk(child, f);
        }
    }
}

/// Fatal pre-pass: every index event referenced by a timing anchor or an
/// adherence rule must be defined on the measure
fn verify_index_events(spec: &MeasureSpec) -> GenResult<()> {
    let mut error = None;
    for_each_element(spec, &mut |element| {
        if error.is_some() {
            return;
        }
        for requirement in element.effective_timing() {
            for anchor in requirement_anchors(requirement) {
                if let TimingAnchor::IndexEvent(name) = anchor
                    && spec.index_event(name).is_none()
                {
                    error = Some(GenerationError::undefined_index_event(&element.id, name));
                    return;
                }
            }
        }
        if let Some(supply) = &element.cumulative_supply
            && spec.index_event(&supply.index_event).is_none()
        {
            error = Some(GenerationError::undefined_index_event(
                &element.id,
                &supply.index_event,
            ));
        }
    });
    match error {
        Some(error) => Err(error),
        None => Ok(()),
    }
}

fn requirement_anchors(
    requirement: &measurekit_model::TimingRequirement,
) -> Vec<&TimingAnchor> {
    match requirement {
        measurekit_model::TimingRequirement::Constraint(c) => vec![&c.anchor],
        measurekit_model::TimingRequirement::Window(w) => {
            vec![&w.start.anchor, &w.end.anchor]
        }
    }
}

/// Non-fatal pre-pass: flag every code source that resolved to nothing
fn collect_code_warnings(spec: &MeasureSpec) -> Vec<String> {
    let mut warnings = Vec::new();
    for_each_element(spec, &mut |element| {
        if let Some(check) = &element.paired_check {
            for component in &check.components {
                if component.binding.is_code_empty() {
                    warnings.push(format!(
                        "Component '{}' of element '{}' has zero codes; its predicate will match nothing",
                        component.label, element.name
                    ));
                }
            }
        } else if element.category != measurekit_model::FactCategory::Demographic
            && element.binding.is_code_empty()
        {
            warnings.push(format!(
                "Element '{}' has zero codes; its predicate will match nothing",
                element.name
            ));
        }
    });
    for def in &spec.index_events {
        if def.binding.is_code_empty() {
            warnings.push(format!(
                "Index event '{}' has zero codes; it will never produce a date",
                def.name
            ));
        }
    }
    for warning in &warnings {
        warn!("{warning}");
    }
    warnings
}
