//! Clinical-expression-language backend
//!
//! Emits one named `define` per data element and per population, with
//! value set and code declarations up front, a measurement-period
//! parameter, and temporal clauses built from each element's timing
//! requirements. Sibling-operator overrides that deviate from a clause's
//! default operator are grouped into explicit parenthesized
//! sub-expressions.

use crate::overrides::OverrideStore;
use crate::target::{TargetFormat, cql_name, unique_identifier};
use measurekit_model::{
    CodeBinding, CriteriaNode, DataElement, FactCategory, LogicalClause, LogicalOperator,
    MeasureSpec, OffsetDirection, PairedCheck, PopulationType, TimingAnchor, TimingConstraint,
    TimingOffset, TimingOperator, TimingRequirement,
};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

pub(crate) fn generate(spec: &MeasureSpec, overrides: &OverrideStore) -> String {
    CqlGenerator::new(spec, overrides).generate()
}

/// Resource type and primary date expression per fact category
fn category_binding(category: FactCategory) -> (&'static str, &'static str) {
    match category {
        FactCategory::Diagnosis => ("Condition", "onsetDateTime"),
        FactCategory::Encounter => ("Encounter", "period"),
        FactCategory::Procedure => ("Procedure", "performedDateTime"),
        FactCategory::Observation => ("Observation", "effectiveDateTime"),
        FactCategory::Medication => ("MedicationDispense", "whenHandedOver"),
        FactCategory::Immunization => ("Immunization", "occurrenceDateTime"),
        FactCategory::Demographic => ("Patient", "birthDate"),
    }
}

fn population_display(population: PopulationType) -> &'static str {
    match population {
        PopulationType::InitialPopulation => "Initial Population",
        PopulationType::Denominator => "Denominator",
        PopulationType::DenominatorExclusion => "Denominator Exclusions",
        PopulationType::DenominatorException => "Denominator Exceptions",
        PopulationType::Numerator => "Numerator",
        PopulationType::NumeratorExclusion => "Numerator Exclusions",
    }
}

struct CqlGenerator<'a> {
    spec: &'a MeasureSpec,
    overrides: &'a OverrideStore,
    /// Component id → allocated definition name
    names: HashMap<String, String>,
    used_names: HashSet<String>,
    blocks: Vec<String>,
    emitted: HashSet<String>,
}

impl<'a> CqlGenerator<'a> {
    fn new(spec: &'a MeasureSpec, overrides: &'a OverrideStore) -> Self {
        Self {
            spec,
            overrides,
            names: HashMap::new(),
            used_names: HashSet::new(),
            blocks: Vec::new(),
            emitted: HashSet::new(),
        }
    }

    fn generate(mut self) -> String {
        let spec = self.spec;
        let mut head = String::new();
        head.push_str(&format!("// Measure: {} ({})\n", spec.title, spec.id));
        head.push_str("// Generated definitions; manual edits belong in component overrides.\n");
        head.push_str(&format!(
            "library {} version '{}'\n",
            library_name(&spec.title),
            spec.version.as_deref().unwrap_or("0.0.0")
        ));
        self.blocks.push(head.trim_end().to_string());

        self.emit_declarations();

        self.blocks.push(format!(
            "parameter \"Measurement Period\" Interval<Date>\n  default Interval[@{}, @{}]",
            spec.measurement_period.start, spec.measurement_period.end
        ));
        self.blocks.push("context Patient".to_string());

        self.emit_index_events();
        self.emit_fact_anchors();

        for def in &spec.populations {
            self.emit_clause_tree(&def.criteria);
        }
        self.emit_population_defines();

        self.blocks.join("\n\n") + "\n"
    }

    /// Codesystem, valueset, and code declarations, deduplicated across the
    /// whole measure
    fn emit_declarations(&mut self) {
        let mut systems: BTreeSet<String> = BTreeSet::new();
        let mut value_sets: BTreeMap<String, Option<String>> = BTreeMap::new();
        let mut codes: BTreeMap<String, (String, String)> = BTreeMap::new();

        let mut visit_binding = |binding: &CodeBinding| {
            for vs in binding.value_set.iter().chain(binding.value_sets.iter()) {
                value_sets.insert(vs.name.clone(), vs.oid.clone());
            }
            for code in &binding.direct_codes {
                systems.insert(code.system.clone());
                codes.insert(
                    format!("{} {}", code.system, code.code),
                    (code.code.clone(), code.system.clone()),
                );
            }
        };

        crate::compiler::for_each_element(self.spec, &mut |element| {
            visit_binding(&element.binding);
            if let Some(check) = &element.paired_check {
                for component in &check.components {
                    visit_binding(&component.binding);
                }
            }
        });
        for def in &self.spec.index_events {
            visit_binding(&def.binding);
        }

        let mut decls = Vec::new();
        for system in &systems {
            decls.push(format!(
                "codesystem {}: '{system}'",
                cql_name(system)
            ));
        }
        for (name, oid) in &value_sets {
            let id = oid
                .clone()
                .unwrap_or_else(|| format!("urn:valueset:{}", crate::target::sql_identifier(name)));
            decls.push(format!("valueset {}: '{id}'", cql_name(name)));
        }
        for (name, (code, system)) in &codes {
            decls.push(format!(
                "code {}: '{code}' from {}",
                cql_name(name),
                cql_name(system)
            ));
        }
        if !decls.is_empty() {
            self.blocks.push(decls.join("\n"));
        }
    }

    /// One define per index event rule, in declaration order
    fn emit_index_events(&mut self) {
        let spec = self.spec;
        for def in &spec.index_events {
            let (resource, date_expr) = category_binding(def.category);
            let alias = resource.chars().next().unwrap_or('X');
            let aggregate = match def.selection {
                measurekit_model::IndexSelection::First => "Min",
                measurekit_model::IndexSelection::Last => "Max",
            };
            let retrieve = self.retrieve_expr(&def.binding, resource);
            self.blocks.push(format!(
                "define {}:\n  {aggregate}({retrieve} {alias}\n    where {alias}.{date_expr} during \"Measurement Period\"\n    return {alias}.{date_expr})",
                cql_name(&def.name)
            ));
        }
    }

    /// Helper defines for fact-derived anchors actually used by the measure
    fn emit_fact_anchors(&mut self) {
        let mut used: HashSet<&TimingAnchor> = HashSet::new();
        let mut anchors: Vec<&TimingAnchor> = Vec::new();
        crate::compiler::for_each_element(self.spec, &mut |element| {
            for requirement in element.effective_timing() {
                let reqs = match requirement {
                    TimingRequirement::Constraint(c) => vec![&c.anchor],
                    TimingRequirement::Window(w) => vec![&w.start.anchor, &w.end.anchor],
                };
                for anchor in reqs {
                    if matches!(
                        anchor,
                        TimingAnchor::EncounterStart
                            | TimingAnchor::EncounterEnd
                            | TimingAnchor::DiagnosisDate
                            | TimingAnchor::ProcedureDate
                            | TimingAnchor::DischargeDate
                    ) && used.insert(anchor)
                    {
                        anchors.push(anchor);
                    }
                }
            }
        });

        for anchor in anchors {
            let define = match anchor {
                TimingAnchor::EncounterStart => {
                    "define \"First Encounter Start\":\n  Min([Encounter] E return start of E.period)"
                }
                TimingAnchor::EncounterEnd => {
                    "define \"Last Encounter End\":\n  Max([Encounter] E return end of E.period)"
                }
                TimingAnchor::DischargeDate => {
                    "define \"Last Discharge Date\":\n  Max([Encounter] E return end of E.period)"
                }
                TimingAnchor::DiagnosisDate => {
                    "define \"First Diagnosis Date\":\n  Min([Condition] C return C.onsetDateTime)"
                }
                TimingAnchor::ProcedureDate => {
                    "define \"First Procedure Date\":\n  Min([Procedure] P return P.performedDateTime)"
                }
                _ => continue,
            };
            self.blocks.push(define.to_string());
        }
    }

    fn emit_clause_tree(&mut self, clause: &LogicalClause) {
        for child in &clause.children {
            match child {
                CriteriaNode::Element(element) => self.emit_element(element),
                CriteriaNode::Clause(nested) => self.emit_clause_tree(nested),
            }
        }
        self.emit_clause(clause);
    }

    fn allocate_name(&mut self, component_id: &str, preferred: &str) -> String {
        if let Some(existing) = self.names.get(component_id) {
            return existing.clone();
        }
        let name = unique_identifier(preferred, &mut self.used_names);
        self.names.insert(component_id.to_string(), name.clone());
        name
    }

    fn emit_element(&mut self, element: &DataElement) {
        if !self.emitted.insert(element.id.clone()) {
            return;
        }
        let name = self.allocate_name(&element.id, &element.name);

        if let Some(code) = self.overrides.locked_code(
            &self.spec.id,
            &element.id,
            TargetFormat::ClinicalExpression,
        ) {
            self.blocks.push(code);
            return;
        }

        let block = if element.category == FactCategory::Demographic {
            self.demographic_define(element, &name)
        } else if let Some(check) = &element.paired_check {
            self.paired_define(element, check, &name)
        } else if let Some(supply) = &element.cumulative_supply {
            self.cumulative_define(element, supply, &name)
        } else {
            self.presence_define(element, &name)
        };
        self.blocks.push(block);
    }

    fn demographic_define(&self, element: &DataElement, name: &str) -> String {
        let expr = match &element.threshold {
            Some(threshold) => format!(
                "AgeInYearsAt(end of \"Measurement Period\") {} {}",
                threshold.comparator.symbol(),
                threshold.value
            ),
            None => "true".to_string(),
        };
        let expr = if element.negation {
            format!("not ({expr})")
        } else {
            expr
        };
        format!("define {}:\n  {expr}", cql_name(name))
    }

    fn presence_define(&self, element: &DataElement, name: &str) -> String {
        let (resource, date_expr) = category_binding(element.category);
        let alias = resource.chars().next().unwrap_or('X');
        let retrieve = self.retrieve_expr(&element.binding, resource);

        let mut conditions: Vec<String> = element
            .effective_timing()
            .map(|req| self.temporal_phrase(&format!("{alias}.{date_expr}"), req))
            .collect();
        if let Some(threshold) = &element.threshold {
            conditions.push(format!(
                "{alias}.value {} {}",
                threshold.comparator.symbol(),
                threshold.value
            ));
        }

        let exists = if conditions.is_empty() {
            format!("exists {retrieve}")
        } else {
            format!(
                "exists ({retrieve} {alias}\n    where {})",
                conditions.join("\n      and ")
            )
        };
        let expr = if element.negation {
            format!("not ({exists})")
        } else {
            exists
        };
        format!("define {}:\n  {expr}", cql_name(name))
    }

    /// Paired same-day observations: per-component reading defines, a
    /// most-recent-paired-day define, then the element's check against that
    /// day's readings
    fn paired_define(&self, element: &DataElement, check: &PairedCheck, name: &str) -> String {
        let (resource, date_expr) = category_binding(element.category);
        let alias = resource.chars().next().unwrap_or('X');
        let mut blocks = Vec::new();

        let component_defines: Vec<String> = check
            .components
            .iter()
            .map(|component| format!("{name} {} Readings", component.label))
            .collect();

        for (component, def_name) in check.components.iter().zip(&component_defines) {
            let retrieve = self.retrieve_expr(&component.binding, resource);
            let mut conditions = vec![format!("{alias}.value is not null")];
            conditions.extend(
                element
                    .effective_timing()
                    .map(|req| self.temporal_phrase(&format!("{alias}.{date_expr}"), req)),
            );
            blocks.push(format!(
                "define {}:\n  {retrieve} {alias}\n    where {}",
                cql_name(def_name),
                conditions.join("\n      and ")
            ));
        }

        let day_name = format!("{name} Paired Day");
        let first = cql_name(&component_defines[0]);
        let others: Vec<String> = component_defines[1..]
            .iter()
            .map(|def_name| {
                format!(
                    "exists ({} O where O.{date_expr} same day as R.{date_expr})",
                    cql_name(def_name)
                )
            })
            .collect();
        let day_body = if others.is_empty() {
            format!("Max({first} R return R.{date_expr})")
        } else {
            format!(
                "Max({first} R\n    where {}\n    return R.{date_expr})",
                others.join("\n      and ")
            )
        };
        blocks.push(format!("define {}:\n  {day_body}", cql_name(&day_name)));

        let checks: Vec<String> = check
            .components
            .iter()
            .zip(&component_defines)
            .map(|(component, def_name)| {
                let value_check = match &component.threshold {
                    Some(threshold) => format!(
                        " and R.value {} {}",
                        threshold.comparator.symbol(),
                        threshold.value
                    ),
                    None => String::new(),
                };
                format!(
                    "exists ({} R where R.{date_expr} same day as {}{value_check})",
                    cql_name(def_name),
                    cql_name(&day_name)
                )
            })
            .collect();
        let expr = checks.join("\n    and ");
        let expr = if element.negation {
            format!("not ({expr})")
        } else {
            expr
        };
        blocks.push(format!("define {}:\n  {expr}", cql_name(name)));

        blocks.join("\n\n")
    }

    fn cumulative_define(
        &self,
        element: &DataElement,
        supply: &measurekit_model::CumulativeSupply,
        name: &str,
    ) -> String {
        let (resource, date_expr) = category_binding(element.category);
        let alias = resource.chars().next().unwrap_or('X');
        let retrieve = self.retrieve_expr(&element.binding, resource);
        let index = cql_name(&supply.index_event);
        let supply_name = format!("{name} Days Supply");

        let sum = format!(
            "define {}:\n  Sum({retrieve} {alias}\n    where {alias}.{date_expr} during Interval[{index}, ({index} + {} days)]\n    return Coalesce({alias}.daysSupply, 0))",
            cql_name(&supply_name),
            supply.window_days
        );
        let compare = format!(
            "define {}:\n  {} {} {}",
            cql_name(name),
            cql_name(&supply_name),
            supply.comparator.symbol(),
            supply.required_days
        );
        format!("{sum}\n\n{compare}")
    }

    fn emit_clause(&mut self, clause: &LogicalClause) {
        if !self.emitted.insert(clause.id.clone()) {
            return;
        }
        let name = self.allocate_name(&clause.id, &clause.name);

        if let Some(code) = self.overrides.locked_code(
            &self.spec.id,
            &clause.id,
            TargetFormat::ClinicalExpression,
        ) {
            self.blocks.push(code);
            return;
        }

        let child_refs: Vec<String> = clause
            .children
            .iter()
            .map(|child| cql_name(&self.names[child.id()]))
            .collect();

        let expr = if clause.operator == LogicalOperator::Not {
            format!("not {}", child_refs[0])
        } else {
            // Left fold; a run under a different operator than the next
            // pair gets wrapped so grouping stays explicit
            let mut expr = child_refs[0].clone();
            let mut previous: Option<LogicalOperator> = None;
            for index in 1..clause.children.len() {
                let operator = clause.operator_between(
                    clause.children[index - 1].id(),
                    clause.children[index].id(),
                );
                if previous.is_some_and(|p| p != operator) {
                    expr = format!("({expr})");
                }
                let connective = match operator {
                    LogicalOperator::And => "and",
                    LogicalOperator::Or => "or",
                    LogicalOperator::Not => "and not",
                };
                expr = format!("{expr}\n    {connective} {}", child_refs[index]);
                previous = Some(operator);
            }
            expr
        };
        self.blocks.push(format!("define {}:\n  {expr}", cql_name(&name)));
    }

    fn emit_population_defines(&mut self) {
        let mut defines: Vec<String> = Vec::new();

        for population in [
            PopulationType::InitialPopulation,
            PopulationType::Denominator,
            PopulationType::DenominatorExclusion,
            PopulationType::DenominatorException,
            PopulationType::Numerator,
            PopulationType::NumeratorExclusion,
        ] {
            let display = population_display(population);
            let refs: Vec<String> = self
                .spec
                .populations_of(population)
                .map(|def| cql_name(&self.names[def.criteria.id.as_str()]))
                .collect();
            if refs.is_empty() {
                // Denominator defaults to the initial population
                if population == PopulationType::Denominator
                    && self
                        .spec
                        .population(PopulationType::InitialPopulation)
                        .is_some()
                {
                    defines.push(format!(
                        "define {}:\n  {}",
                        cql_name(display),
                        cql_name(population_display(PopulationType::InitialPopulation))
                    ));
                }
                continue;
            }
            // Skip the alias when the clause already carries the name
            if refs.len() == 1 && refs[0] == cql_name(display) {
                continue;
            }
            defines.push(format!(
                "define {}:\n  {}",
                cql_name(display),
                refs.join("\n    or ")
            ));
        }

        if !defines.is_empty() {
            self.blocks.push(defines.join("\n\n"));
        }
    }

    /// Retrieve expression over a code binding: value sets and direct codes
    /// are OR-combined by unioning retrieves
    fn retrieve_expr(&self, binding: &CodeBinding, resource: &str) -> String {
        let mut parts: Vec<String> = Vec::new();
        for vs in binding.value_set.iter().chain(binding.value_sets.iter()) {
            parts.push(format!("[{resource}: {}]", cql_name(&vs.name)));
        }
        for code in &binding.direct_codes {
            parts.push(format!(
                "[{resource}: {}]",
                cql_name(&format!("{} {}", code.system, code.code))
            ));
        }
        match parts.len() {
            // Zero codes already warned about by the compiler pre-pass
            0 => format!("[{resource}]"),
            1 => parts.remove(0),
            _ => format!("({})", parts.join("\n    union ")),
        }
    }

    /// Temporal condition for one timing requirement applied to `date_expr`
    fn temporal_phrase(&self, date_expr: &str, requirement: &TimingRequirement) -> String {
        match requirement {
            TimingRequirement::Constraint(constraint) => {
                self.constraint_phrase(date_expr, constraint)
            }
            TimingRequirement::Window(window) => {
                let start = self.boundary_expr(&window.start.anchor, window.start.offset.as_ref());
                let end = self.boundary_expr(&window.end.anchor, window.end.offset.as_ref());
                format!("{date_expr} during Interval[{start}, {end}]")
            }
        }
    }

    fn constraint_phrase(&self, date_expr: &str, constraint: &TimingConstraint) -> String {
        let span = self.span_expr(&constraint.anchor, constraint.offset.as_ref());
        match constraint.operator {
            TimingOperator::During => format!("{date_expr} during {span}"),
            TimingOperator::StartsDuring => format!("{date_expr} starts during {span}"),
            TimingOperator::EndsDuring => format!("{date_expr} ends during {span}"),
            TimingOperator::Overlaps => format!("{date_expr} overlaps {span}"),
            TimingOperator::BeforeEndOf => {
                let point = self.boundary_expr(&constraint.anchor, constraint.offset.as_ref());
                format!("{date_expr} on or before {point}")
            }
            TimingOperator::AfterStartOf => {
                let point = self.boundary_expr(&constraint.anchor, constraint.offset.as_ref());
                format!("{date_expr} on or after {point}")
            }
            TimingOperator::Within => {
                let anchor = self.anchor_expr(&constraint.anchor);
                match &constraint.offset {
                    Some(offset) => {
                        let shifted = offset_expr(&anchor, offset);
                        match offset.direction {
                            OffsetDirection::Before => {
                                format!("{date_expr} during Interval[{shifted}, {anchor}]")
                            }
                            OffsetDirection::After => {
                                format!("{date_expr} during Interval[{anchor}, {shifted}]")
                            }
                        }
                    }
                    None => format!("{date_expr} same day as {anchor}"),
                }
            }
        }
    }

    /// What an anchor spans when used with a containment operator
    fn span_expr(&self, anchor: &TimingAnchor, offset: Option<&TimingOffset>) -> String {
        match anchor {
            TimingAnchor::MeasurementPeriodStart | TimingAnchor::MeasurementPeriodEnd
                if offset.is_none() =>
            {
                "\"Measurement Period\"".to_string()
            }
            _ => {
                let point = self.boundary_expr(anchor, offset);
                format!("Interval[{point}, {point}]")
            }
        }
    }

    fn boundary_expr(&self, anchor: &TimingAnchor, offset: Option<&TimingOffset>) -> String {
        let base = self.anchor_expr(anchor);
        match offset {
            Some(offset) => offset_expr(&base, offset),
            None => base,
        }
    }

    fn anchor_expr(&self, anchor: &TimingAnchor) -> String {
        match anchor {
            TimingAnchor::MeasurementPeriodStart => "start of \"Measurement Period\"".to_string(),
            TimingAnchor::MeasurementPeriodEnd => "end of \"Measurement Period\"".to_string(),
            TimingAnchor::Today => "Today()".to_string(),
            TimingAnchor::IndexEvent(name) => cql_name(name),
            TimingAnchor::EncounterStart => cql_name("First Encounter Start"),
            TimingAnchor::EncounterEnd => cql_name("Last Encounter End"),
            TimingAnchor::DischargeDate => cql_name("Last Discharge Date"),
            TimingAnchor::DiagnosisDate => cql_name("First Diagnosis Date"),
            TimingAnchor::ProcedureDate => cql_name("First Procedure Date"),
        }
    }
}

fn offset_expr(base: &str, offset: &TimingOffset) -> String {
    let sign = match offset.direction {
        OffsetDirection::Before => '-',
        OffsetDirection::After => '+',
    };
    format!("({base} {sign} {} {})", offset.value, offset.unit)
}

/// PascalCase library name from the measure title
fn library_name(title: &str) -> String {
    let mut name = String::new();
    for word in title.split(|c: char| !c.is_alphanumeric()) {
        let mut chars = word.chars();
        if let Some(first) = chars.next() {
            name.extend(first.to_uppercase());
            name.push_str(chars.as_str());
        }
    }
    if name.is_empty() {
        "Measure".to_string()
    } else {
        name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn library_name_is_pascal_case() {
        assert_eq!(library_name("Controlled Blood Pressure"), "ControlledBloodPressure");
        assert_eq!(library_name("statin-adherence 2025"), "StatinAdherence2025");
        assert_eq!(library_name("!!!"), "Measure");
    }

    #[test]
    fn offset_expr_signs_follow_direction() {
        let offset = TimingOffset {
            value: 30,
            unit: measurekit_model::TimeUnit::Days,
            direction: OffsetDirection::Before,
        };
        assert_eq!(offset_expr("\"IPSD\"", &offset), "(\"IPSD\" - 30 days)");
    }
}
