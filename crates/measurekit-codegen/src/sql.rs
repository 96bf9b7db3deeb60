//! Warehouse-SQL backend
//!
//! Emits a single `WITH` query: one predicate CTE per data element, an
//! index-event CTE per index event definition (plus derived-anchor CTEs for
//! fact-relative anchors), combination CTEs per clause using set operators
//! (`AND → INTERSECT`, `OR → UNION`, `NOT → EXCEPT`), population CTEs
//! mirroring the evaluator's state machine, and a final labelled SELECT.
//!
//! Assumed warehouse schema: `patients(patient_id, birth_date, ...)` plus
//! one fact table per category (`diagnoses(onset_date, abatement_date)`,
//! `encounters(start_date, end_date)`, `procedures(performed_date)`,
//! `observations(effective_date, value)`, `medications(fill_date,
//! days_supply)`, `immunizations(administered_date)`), each carrying
//! `patient_id`, `code`, and `system` columns.

use crate::overrides::OverrideStore;
use crate::target::{TargetFormat, WAREHOUSE_SQL_SYNTAX, sql_identifier, unique_identifier};
use measurekit_model::{
    CodeBinding, CriteriaNode, DataElement, FactCategory, IndexEventDefinition, LogicalClause,
    LogicalOperator, MeasureSpec, OffsetDirection, PairedCheck, PopulationType, TimingAnchor,
    TimingOffset, TimingRequirement,
};
use measurekit_timing::{FactDateMode, ResolutionContext, resolve_requirement};
use std::collections::{HashMap, HashSet};

pub(crate) fn generate(spec: &MeasureSpec, overrides: &OverrideStore) -> String {
    SqlGenerator::new(spec, overrides).generate()
}

/// Fact table, primary date column, and period-end column per category
fn category_table(category: FactCategory) -> (&'static str, &'static str, Option<&'static str>) {
    match category {
        FactCategory::Diagnosis => ("diagnoses", "onset_date", Some("abatement_date")),
        FactCategory::Encounter => ("encounters", "start_date", Some("end_date")),
        FactCategory::Procedure => ("procedures", "performed_date", None),
        FactCategory::Observation => ("observations", "effective_date", None),
        FactCategory::Medication => ("medications", "fill_date", None),
        FactCategory::Immunization => ("immunizations", "administered_date", None),
        FactCategory::Demographic => ("patients", "birth_date", None),
    }
}

struct SqlGenerator<'a> {
    spec: &'a MeasureSpec,
    overrides: &'a OverrideStore,
    ctes: Vec<String>,
    names: HashMap<String, String>,
    used: HashSet<String>,
    emitted: HashSet<String>,
    /// Anchor → emitted CTE name providing `(patient_id, index_date)`
    anchor_ctes: HashMap<TimingAnchor, String>,
}

impl<'a> SqlGenerator<'a> {
    fn new(spec: &'a MeasureSpec, overrides: &'a OverrideStore) -> Self {
        Self {
            spec,
            overrides,
            ctes: Vec::new(),
            names: HashMap::new(),
            used: HashSet::new(),
            emitted: HashSet::new(),
            anchor_ctes: HashMap::new(),
        }
    }

    fn generate(mut self) -> String {
        let spec = self.spec;
        let syntax = &WAREHOUSE_SQL_SYNTAX;
        let mut out = String::new();
        out.push_str(&syntax.comment(&format!("Measure: {} ({})", spec.title, spec.id)));
        out.push('\n');
        if let Some(version) = &spec.version {
            out.push_str(&syntax.comment(&format!("Version: {version}")));
            out.push('\n');
        }
        out.push_str(&syntax.comment(&format!(
            "Measurement period: {} through {}",
            spec.measurement_period.start, spec.measurement_period.end
        )));
        out.push('\n');
        out.push_str(
            &syntax.comment("Generated query; manual edits belong in component overrides."),
        );
        out.push_str("\n\n");

        for def in &spec.index_events {
            self.emit_index_event_cte(def);
        }
        for def in &spec.populations {
            self.emit_clause_tree(&def.criteria);
        }
        let final_select = self.emit_population_ctes();

        if self.ctes.is_empty() {
            out.push_str(&syntax.comment("Measure defines no populations; nothing to query."));
            out.push('\n');
            return out;
        }
        out.push_str("WITH ");
        out.push_str(&self.ctes.join(",\n"));
        out.push('\n');
        out.push_str(&final_select);
        out.push('\n');
        out
    }

    // === index events and anchors ===

    fn emit_index_event_cte(&mut self, def: &IndexEventDefinition) {
        let (table, date_col, _) = category_table(def.category);
        let alias = table.chars().next().unwrap_or('t');
        let aggregate = match def.selection {
            measurekit_model::IndexSelection::First => "MIN",
            measurekit_model::IndexSelection::Last => "MAX",
        };
        let name = unique_identifier(&format!("idx_{}", sql_identifier(&def.name)), &mut self.used);
        let period = self.spec.measurement_period;
        let cte = format!(
            "{name} AS (\n    SELECT {alias}.patient_id, {aggregate}({alias}.{date_col}) AS index_date\n    FROM {table} {alias}\n    WHERE {code}\n      AND {alias}.{date_col} BETWEEN DATE '{start}' AND DATE '{end}'\n    GROUP BY {alias}.patient_id\n)",
            code = code_predicate(&def.binding, alias),
            start = period.start,
            end = period.end,
        );
        self.anchor_ctes
            .insert(TimingAnchor::IndexEvent(def.name.clone()), name);
        self.ctes.push(cte);
    }

    /// Lazily emit a derived-anchor CTE for a fact-relative anchor
    fn anchor_cte(&mut self, anchor: &TimingAnchor) -> String {
        if let Some(name) = self.anchor_ctes.get(anchor) {
            return name.clone();
        }
        let (name, body) = match anchor {
            TimingAnchor::EncounterStart => (
                "anchor_encounter_start",
                "SELECT e.patient_id, MIN(e.start_date) AS index_date\n    FROM encounters e\n    GROUP BY e.patient_id",
            ),
            TimingAnchor::EncounterEnd => (
                "anchor_encounter_end",
                "SELECT e.patient_id, MAX(e.end_date) AS index_date\n    FROM encounters e\n    WHERE e.end_date IS NOT NULL\n    GROUP BY e.patient_id",
            ),
            TimingAnchor::DischargeDate => (
                "anchor_discharge",
                "SELECT e.patient_id, MAX(e.end_date) AS index_date\n    FROM encounters e\n    WHERE e.end_date IS NOT NULL\n    GROUP BY e.patient_id",
            ),
            TimingAnchor::DiagnosisDate => (
                "anchor_diagnosis",
                "SELECT d.patient_id, MIN(d.onset_date) AS index_date\n    FROM diagnoses d\n    GROUP BY d.patient_id",
            ),
            TimingAnchor::ProcedureDate => (
                "anchor_procedure",
                "SELECT p.patient_id, MIN(p.performed_date) AS index_date\n    FROM procedures p\n    GROUP BY p.patient_id",
            ),
            // Index events are pre-registered; MP anchors never join
            _ => ("anchor_unknown", "SELECT NULL AS patient_id, NULL AS index_date"),
        };
        let name = unique_identifier(name, &mut self.used);
        self.ctes.push(format!("{name} AS (\n    {body}\n)"));
        self.anchor_ctes.insert(anchor.clone(), name.clone());
        name
    }

    // === criteria tree ===

    fn emit_clause_tree(&mut self, clause: &LogicalClause) {
        for child in &clause.children {
            match child {
                CriteriaNode::Element(element) => self.emit_element(element),
                CriteriaNode::Clause(nested) => self.emit_clause_tree(nested),
            }
        }
        self.emit_clause(clause);
    }

    fn allocate_name(&mut self, component_id: &str, base: &str) -> String {
        if let Some(existing) = self.names.get(component_id) {
            return existing.clone();
        }
        let name = unique_identifier(base, &mut self.used);
        self.names.insert(component_id.to_string(), name.clone());
        name
    }

    fn emit_element(&mut self, element: &DataElement) {
        if !self.emitted.insert(element.id.clone()) {
            return;
        }
        let name = self.allocate_name(&element.id, &format!("de_{}", sql_identifier(&element.name)));

        if let Some(code) =
            self.overrides
                .locked_code(&self.spec.id, &element.id, TargetFormat::WarehouseSql)
        {
            self.ctes.push(code);
            return;
        }

        let cte = if element.category == FactCategory::Demographic {
            self.demographic_cte(element, &name)
        } else if let Some(check) = &element.paired_check {
            self.paired_ctes(element, check, &name)
        } else if let Some(supply) = &element.cumulative_supply {
            self.cumulative_ctes(element, supply, &name)
        } else {
            self.presence_cte(element, &name)
        };
        self.ctes.push(cte);
    }

    fn demographic_cte(&self, element: &DataElement, name: &str) -> String {
        let as_of = self.spec.measurement_period.end;
        let condition = match &element.threshold {
            Some(threshold) => format!(
                "DATE_PART('year', AGE(DATE '{as_of}', p.birth_date)) {} {}",
                threshold.comparator.symbol(),
                threshold.value
            ),
            None => "TRUE".to_string(),
        };
        let condition = if element.negation {
            format!("NOT ({condition})")
        } else {
            condition
        };
        format!(
            "{name} AS (\n    SELECT p.patient_id\n    FROM patients p\n    WHERE {condition}\n)"
        )
    }

    fn presence_cte(&mut self, element: &DataElement, name: &str) -> String {
        let (table, date_col, end_col) = category_table(element.category);
        let alias = table.chars().next().unwrap_or('t');

        let mut joins: Vec<String> = Vec::new();
        let mut conditions = vec![code_predicate(&element.binding, alias)];
        for requirement in element.effective_timing() {
            conditions.extend(self.timing_conditions(
                alias,
                date_col,
                end_col,
                requirement,
                &mut joins,
            ));
        }
        if let Some(threshold) = &element.threshold {
            conditions.push(format!(
                "{alias}.value {} {}",
                threshold.comparator.symbol(),
                threshold.value
            ));
        }

        let join_sql = joins
            .iter()
            .map(|j| format!("\n    {j}"))
            .collect::<String>();
        let body = format!(
            "SELECT DISTINCT {alias}.patient_id\n    FROM {table} {alias}{join_sql}\n    WHERE {}",
            conditions.join("\n      AND ")
        );

        if element.negation {
            format!(
                "{name} AS (\n    SELECT p.patient_id\n    FROM patients p\n    EXCEPT\n    {body}\n)"
            )
        } else {
            format!("{name} AS (\n    {body}\n)")
        }
    }

    /// Paired same-day observations: one CTE per component, a paired-day
    /// CTE picking the most recent complete day, and the final predicate
    /// joining that day's readings against each component's threshold
    fn paired_ctes(&mut self, element: &DataElement, check: &PairedCheck, name: &str) -> String {
        let (table, date_col, end_col) = category_table(element.category);
        let alias = table.chars().next().unwrap_or('t');
        let mut blocks = Vec::new();

        let component_names: Vec<String> = check
            .components
            .iter()
            .map(|component| {
                unique_identifier(
                    &format!("{name}_{}", sql_identifier(&component.label)),
                    &mut self.used,
                )
            })
            .collect();

        for (component, cte_name) in check.components.iter().zip(&component_names) {
            let mut joins: Vec<String> = Vec::new();
            let mut conditions = vec![
                code_predicate(&component.binding, alias),
                format!("{alias}.value IS NOT NULL"),
            ];
            for requirement in element.effective_timing() {
                conditions.extend(self.timing_conditions(
                    alias,
                    date_col,
                    end_col,
                    requirement,
                    &mut joins,
                ));
            }
            let join_sql = joins
                .iter()
                .map(|j| format!("\n    {j}"))
                .collect::<String>();
            blocks.push(format!(
                "{cte_name} AS (\n    SELECT {alias}.patient_id, {alias}.{date_col}, {alias}.value\n    FROM {table} {alias}{join_sql}\n    WHERE {}\n)",
                conditions.join("\n      AND ")
            ));
        }

        // Most recent date on which every component has a reading
        let day_name = unique_identifier(&format!("{name}_paired_day"), &mut self.used);
        let day_joins: String = component_names[1..]
            .iter()
            .enumerate()
            .map(|(i, cte_name)| {
                format!(
                    "\n    JOIN {cte_name} c{n} ON c{n}.patient_id = c0.patient_id AND c{n}.{date_col} = c0.{date_col}",
                    n = i + 1
                )
            })
            .collect();
        blocks.push(format!(
            "{day_name} AS (\n    SELECT c0.patient_id, MAX(c0.{date_col}) AS pair_date\n    FROM {} c0{day_joins}\n    GROUP BY c0.patient_id\n)",
            component_names[0]
        ));

        let threshold_joins: String = check
            .components
            .iter()
            .zip(&component_names)
            .enumerate()
            .map(|(i, (component, cte_name))| {
                let value_cond = match &component.threshold {
                    Some(threshold) => format!(
                        " AND c{i}.value {} {}",
                        threshold.comparator.symbol(),
                        threshold.value
                    ),
                    None => String::new(),
                };
                format!(
                    "\n    JOIN {cte_name} c{i} ON c{i}.patient_id = pd.patient_id AND c{i}.{date_col} = pd.pair_date{value_cond}"
                )
            })
            .collect();
        let final_body =
            format!("SELECT DISTINCT pd.patient_id\n    FROM {day_name} pd{threshold_joins}");

        if element.negation {
            blocks.push(format!(
                "{name} AS (\n    SELECT p.patient_id\n    FROM patients p\n    EXCEPT\n    {final_body}\n)"
            ));
        } else {
            blocks.push(format!("{name} AS (\n    {final_body}\n)"));
        }
        blocks.join(",\n")
    }

    /// Cumulative days supply within a window from an index event, surfaced
    /// as a named rate CTE
    fn cumulative_ctes(
        &mut self,
        element: &DataElement,
        supply: &measurekit_model::CumulativeSupply,
        name: &str,
    ) -> String {
        let (table, date_col, _) = category_table(element.category);
        let alias = table.chars().next().unwrap_or('t');
        let index_cte = self.anchor_cte(&TimingAnchor::IndexEvent(supply.index_event.clone()));
        let cds_name = unique_identifier(
            &format!("cds_{}", sql_identifier(&element.name)),
            &mut self.used,
        );

        let cds = format!(
            "{cds_name} AS (\n    SELECT {alias}.patient_id, SUM(COALESCE({alias}.days_supply, 0)) AS total_days\n    FROM {table} {alias}\n    JOIN {index_cte} i ON i.patient_id = {alias}.patient_id\n    WHERE {code}\n      AND {alias}.{date_col} >= i.index_date\n      AND {alias}.{date_col} <= i.index_date + INTERVAL '{window} days'\n    GROUP BY {alias}.patient_id\n)",
            code = code_predicate(&element.binding, alias),
            window = supply.window_days,
        );
        let rate_body = format!(
            "SELECT c.patient_id\n    FROM {cds_name} c\n    WHERE c.total_days {} {}",
            supply.comparator.symbol(),
            supply.required_days
        );
        let rate = if element.negation {
            format!(
                "{name} AS (\n    SELECT p.patient_id\n    FROM patients p\n    EXCEPT\n    {rate_body}\n)"
            )
        } else {
            format!("{name} AS (\n    {rate_body}\n)")
        };
        format!("{cds},\n{rate}")
    }

    fn emit_clause(&mut self, clause: &LogicalClause) {
        if !self.emitted.insert(clause.id.clone()) {
            return;
        }
        let name = self.allocate_name(&clause.id, &format!("cl_{}", sql_identifier(&clause.name)));

        if let Some(code) =
            self.overrides
                .locked_code(&self.spec.id, &clause.id, TargetFormat::WarehouseSql)
        {
            self.ctes.push(code);
            return;
        }

        let child_names: Vec<String> = clause
            .children
            .iter()
            .map(|child| self.names[child.id()].clone())
            .collect();

        let body = if clause.operator == LogicalOperator::Not {
            format!(
                "SELECT patient_id FROM patients\n    EXCEPT\n    SELECT patient_id FROM {}",
                child_names[0]
            )
        } else {
            // Left fold with set operators; grouped into a derived table
            // whenever the operator changes so precedence stays explicit
            let mut body = format!("SELECT patient_id FROM {}", child_names[0]);
            let mut previous: Option<&str> = None;
            for index in 1..clause.children.len() {
                let operator = clause.operator_between(
                    clause.children[index - 1].id(),
                    clause.children[index].id(),
                );
                let set_op = match operator {
                    LogicalOperator::And => "INTERSECT",
                    LogicalOperator::Or => "UNION",
                    LogicalOperator::Not => "EXCEPT",
                };
                if previous.is_some_and(|p| p != set_op) {
                    body = format!(
                        "SELECT patient_id FROM (\n        {}\n    ) grp_{index}",
                        body.replace('\n', "\n    ")
                    );
                }
                body = format!(
                    "{body}\n    {set_op}\n    SELECT patient_id FROM {}",
                    child_names[index]
                );
                previous = Some(set_op);
            }
            body
        };
        self.ctes.push(format!("{name} AS (\n    {body}\n)"));
    }

    // === populations ===

    /// Emit the population CTEs and return the final labelled SELECT
    fn emit_population_ctes(&mut self) -> String {
        let spec = self.spec;
        let mut selects: Vec<(String, &'static str)> = Vec::new();

        let ip_ref = spec
            .population(PopulationType::InitialPopulation)
            .map(|def| self.names[def.criteria.id.as_str()].clone());
        if let Some(ip) = &ip_ref {
            self.ctes.push(format!(
                "pop_initial_population AS (\n    SELECT patient_id FROM {ip}\n)"
            ));
            selects.push(("pop_initial_population".into(), "initial-population"));
        }

        let denominator_body = match spec.population(PopulationType::Denominator) {
            Some(def) => format!(
                "SELECT patient_id FROM pop_initial_population\n    INTERSECT\n    SELECT patient_id FROM {}",
                self.names[def.criteria.id.as_str()]
            ),
            None => "SELECT patient_id FROM pop_initial_population".to_string(),
        };
        if ip_ref.is_some() {
            self.ctes
                .push(format!("pop_denominator AS (\n    {denominator_body}\n)"));
            selects.push(("pop_denominator".into(), "denominator"));
        }

        let exclusion_refs: Vec<String> = spec
            .populations_of(PopulationType::DenominatorExclusion)
            .chain(spec.populations_of(PopulationType::NumeratorExclusion))
            .map(|def| self.names[def.criteria.id.as_str()].clone())
            .collect();
        let has_exclusions = !exclusion_refs.is_empty();
        if has_exclusions {
            let union = exclusion_refs
                .iter()
                .map(|name| format!("SELECT patient_id FROM {name}"))
                .collect::<Vec<_>>()
                .join("\n        UNION\n        ");
            self.ctes.push(format!(
                "pop_denominator_exclusion AS (\n    SELECT patient_id FROM (\n        {union}\n    ) excluded\n    INTERSECT\n    SELECT patient_id FROM pop_denominator\n)"
            ));
            selects.push(("pop_denominator_exclusion".into(), "denominator-exclusion"));
        }

        let eligible = if has_exclusions {
            "SELECT patient_id FROM (\n        SELECT patient_id FROM pop_denominator\n        EXCEPT\n        SELECT patient_id FROM pop_denominator_exclusion\n    ) eligible"
                .to_string()
        } else {
            "SELECT patient_id FROM pop_denominator".to_string()
        };

        if let Some(def) = spec.population(PopulationType::Numerator) {
            let numerator = &self.names[def.criteria.id.as_str()];
            self.ctes.push(format!(
                "pop_numerator AS (\n    SELECT patient_id FROM {numerator}\n    INTERSECT\n    {eligible}\n)"
            ));
            selects.push(("pop_numerator".into(), "numerator"));
        }

        let exception_refs: Vec<String> = spec
            .populations_of(PopulationType::DenominatorException)
            .map(|def| self.names[def.criteria.id.as_str()].clone())
            .collect();
        if !exception_refs.is_empty() {
            let union = exception_refs
                .iter()
                .map(|name| format!("SELECT patient_id FROM {name}"))
                .collect::<Vec<_>>()
                .join("\n        UNION\n        ");
            let minus_numerator = if spec.population(PopulationType::Numerator).is_some() {
                "\n    EXCEPT\n    SELECT patient_id FROM pop_numerator"
            } else {
                ""
            };
            self.ctes.push(format!(
                "pop_denominator_exception AS (\n    SELECT patient_id FROM (\n        {union}\n    ) excepted\n    INTERSECT\n    {eligible}{minus_numerator}\n)"
            ));
            selects.push(("pop_denominator_exception".into(), "denominator-exception"));
        }

        if selects.is_empty() {
            return "SELECT NULL AS patient_id, NULL AS population WHERE 1 = 0".to_string();
        }
        let rows: Vec<String> = selects
            .iter()
            .map(|(cte, label)| {
                format!("SELECT patient_id, '{label}' AS population FROM {cte}")
            })
            .collect();
        format!("{}\nORDER BY patient_id, population", rows.join("\nUNION ALL\n"))
    }

    // === timing ===

    /// Conditions (and joins) enforcing one timing requirement on the
    /// aliased fact table
    fn timing_conditions(
        &mut self,
        alias: char,
        date_col: &str,
        end_col: Option<&str>,
        requirement: &TimingRequirement,
        joins: &mut Vec<String>,
    ) -> Vec<String> {
        let event_relative = requirement_anchors(requirement)
            .iter()
            .any(|anchor| anchor.is_event_relative());

        if !event_relative {
            return self.period_conditions(alias, date_col, end_col, requirement);
        }

        match requirement {
            TimingRequirement::Constraint(constraint) => {
                let join_alias = format!("i{}", joins.len() + 1);
                let cte = self.anchor_cte(&constraint.anchor);
                joins.push(format!(
                    "JOIN {cte} {join_alias} ON {join_alias}.patient_id = {alias}.patient_id"
                ));
                let base = format!("{join_alias}.index_date");
                let col = |mode: FactDateMode| match mode {
                    FactDateMode::End => end_col.unwrap_or(date_col),
                    _ => date_col,
                };
                use measurekit_model::TimingOperator as Op;
                match constraint.operator {
                    Op::During | Op::StartsDuring => {
                        let point = offset_sql(&base, constraint.offset.as_ref());
                        vec![format!("{alias}.{date_col} = {point}")]
                    }
                    Op::EndsDuring => {
                        let point = offset_sql(&base, constraint.offset.as_ref());
                        vec![format!("{alias}.{} = {point}", col(FactDateMode::End))]
                    }
                    Op::Overlaps => {
                        let point = offset_sql(&base, constraint.offset.as_ref());
                        vec![
                            format!("{alias}.{date_col} <= {point}"),
                            format!(
                                "COALESCE({alias}.{}, {alias}.{date_col}) >= {point}",
                                end_col.unwrap_or(date_col)
                            ),
                        ]
                    }
                    Op::BeforeEndOf => {
                        let point = offset_sql(&base, constraint.offset.as_ref());
                        vec![format!("{alias}.{date_col} <= {point}")]
                    }
                    Op::AfterStartOf => {
                        let point = offset_sql(&base, constraint.offset.as_ref());
                        vec![format!("{alias}.{date_col} >= {point}")]
                    }
                    Op::Within => match &constraint.offset {
                        Some(offset) => {
                            let shifted = offset_sql(&base, Some(offset));
                            match offset.direction {
                                OffsetDirection::Before => vec![
                                    format!("{alias}.{date_col} >= {shifted}"),
                                    format!("{alias}.{date_col} <= {base}"),
                                ],
                                OffsetDirection::After => vec![
                                    format!("{alias}.{date_col} >= {base}"),
                                    format!("{alias}.{date_col} <= {shifted}"),
                                ],
                            }
                        }
                        // Within with no offset is an authoring defect; a
                        // never-true predicate keeps the query honest
                        None => vec![format!("1 = 0 -- 'within' requires an offset")],
                    },
                }
            }
            TimingRequirement::Window(window) => {
                let mut conditions = Vec::new();
                for (boundary, comparison) in [(&window.start, ">="), (&window.end, "<=")] {
                    let expr = if boundary.anchor.is_event_relative() {
                        let join_alias = format!("i{}", joins.len() + 1);
                        let cte = self.anchor_cte(&boundary.anchor);
                        joins.push(format!(
                            "JOIN {cte} {join_alias} ON {join_alias}.patient_id = {alias}.patient_id"
                        ));
                        offset_sql(&format!("{join_alias}.index_date"), boundary.offset.as_ref())
                    } else {
                        match measurekit_timing::resolve_boundary(
                            boundary,
                            &ResolutionContext::new(self.spec.measurement_period),
                        ) {
                            Ok(date) => format!("DATE '{date}'"),
                            Err(error) => format!("DATE '0001-01-01' /* {error} */"),
                        }
                    };
                    conditions.push(format!("{alias}.{date_col} {comparison} {expr}"));
                }
                conditions
            }
        }
    }

    /// Measurement-period-anchored requirements resolve to concrete dates
    fn period_conditions(
        &self,
        alias: char,
        date_col: &str,
        end_col: Option<&str>,
        requirement: &TimingRequirement,
    ) -> Vec<String> {
        let ctx = ResolutionContext::new(self.spec.measurement_period);
        let resolved = match resolve_requirement(requirement, &ctx) {
            Ok(resolved) => resolved,
            // Authoring defect (inverted window, missing offset): emit a
            // never-true predicate with the reason attached
            Err(error) => return vec![format!("1 = 0 -- {error}")],
        };

        let mut conditions = Vec::new();
        match resolved.mode {
            FactDateMode::Start | FactDateMode::End => {
                let col = match resolved.mode {
                    FactDateMode::End => end_col.unwrap_or(date_col),
                    _ => date_col,
                };
                if let Some(start) = resolved.window.start {
                    conditions.push(format!("{alias}.{col} >= DATE '{start}'"));
                }
                if let Some(end) = resolved.window.end {
                    conditions.push(format!("{alias}.{col} <= DATE '{end}'"));
                }
            }
            FactDateMode::Overlap => {
                let end_expr = format!(
                    "COALESCE({alias}.{}, {alias}.{date_col})",
                    end_col.unwrap_or(date_col)
                );
                if let Some(end) = resolved.window.end {
                    conditions.push(format!("{alias}.{date_col} <= DATE '{end}'"));
                }
                if let Some(start) = resolved.window.start {
                    conditions.push(format!("{end_expr} >= DATE '{start}'"));
                }
            }
        }
        conditions
    }
}

fn requirement_anchors(requirement: &TimingRequirement) -> Vec<&TimingAnchor> {
    match requirement {
        TimingRequirement::Constraint(c) => vec![&c.anchor],
        TimingRequirement::Window(w) => vec![&w.start.anchor, &w.end.anchor],
    }
}

/// `code IN (...)` predicate over the binding's full code union. An empty
/// union emits a never-true predicate; the compiler pre-pass has already
/// warned about it.
fn code_predicate(binding: &CodeBinding, alias: char) -> String {
    let codes: Vec<String> = binding
        .codes()
        .map(|code| WAREHOUSE_SQL_SYNTAX.string_literal(&code.code))
        .collect();
    if codes.is_empty() {
        return "1 = 0 -- value set resolved to zero codes".to_string();
    }
    format!("{alias}.code IN ({})", codes.join(", "))
}

fn offset_sql(base: &str, offset: Option<&TimingOffset>) -> String {
    match offset {
        Some(offset) => {
            let sign = match offset.direction {
                OffsetDirection::Before => '-',
                OffsetDirection::After => '+',
            };
            format!("{base} {sign} INTERVAL '{} {}'", offset.value, offset.unit)
        }
        None => base.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use measurekit_model::{CodeReference, TimeUnit};

    #[test]
    fn code_predicate_escapes_quotes() {
        let binding = CodeBinding::from_codes(vec![
            CodeReference::new("I10", "ICD-10-CM"),
            CodeReference::new("O'Code", "TEST"),
        ]);
        assert_eq!(code_predicate(&binding, 'd'), "d.code IN ('I10', 'O''Code')");
    }

    #[test]
    fn empty_binding_yields_never_true_predicate() {
        let binding = CodeBinding::default();
        assert!(code_predicate(&binding, 'd').starts_with("1 = 0"));
    }

    #[test]
    fn offset_sql_renders_interval_arithmetic() {
        let offset = TimingOffset {
            value: 180,
            unit: TimeUnit::Days,
            direction: OffsetDirection::After,
        };
        assert_eq!(
            offset_sql("i.index_date", Some(&offset)),
            "i.index_date + INTERVAL '180 days'"
        );
        assert_eq!(offset_sql("i.index_date", None), "i.index_date");
    }
}
