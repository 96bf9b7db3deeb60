//! End-to-end generation: both targets over a realistic measure

use chrono::NaiveDate;
use measurekit_codegen::{
    Compiler, GenerationError, OverrideKey, OverrideStore, TargetFormat,
};
use measurekit_model::{
    CodeBinding, CodeReference, Comparator, CriteriaNode, CumulativeSupply, DataElement,
    FactCategory, IndexEventDefinition, IndexSelection, LogicalClause, LogicalOperator,
    MeasureSpec, MeasurementPeriod, PopulationDefinition, PopulationType, SiblingConnection,
    Threshold, TimingAnchor, TimingConstraint, TimingOffset, TimingOperator, TimingRequirement,
    ValueSetReference,
};
use measurekit_model::{Edited, OffsetDirection, TimeUnit};
use pretty_assertions::assert_eq;
use rust_decimal::Decimal;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn during_mp() -> Edited<TimingRequirement> {
    Edited::new(TimingRequirement::Constraint(TimingConstraint::new(
        TimingOperator::During,
        TimingAnchor::MeasurementPeriodStart,
    )))
}

fn hypertension_element() -> DataElement {
    let mut element = DataElement::new(
        "de-htn",
        "Essential Hypertension",
        FactCategory::Diagnosis,
        CodeBinding::from_value_set(ValueSetReference::new(
            "Essential Hypertension",
            vec![
                CodeReference::new("I10", "ICD-10-CM"),
                CodeReference::new("59621000", "SNOMED-CT"),
            ],
        )),
    );
    element.timing.push(during_mp());
    element
}

fn age_element() -> DataElement {
    let mut element = DataElement::new(
        "de-age",
        "Age 18 or older",
        FactCategory::Demographic,
        CodeBinding::default(),
    );
    element.threshold = Some(Threshold::new(Comparator::Ge, Decimal::from(18)));
    element
}

fn statin_binding() -> CodeBinding {
    CodeBinding::from_codes(vec![CodeReference::new("617312", "RxNorm")])
}

fn adherence_element() -> DataElement {
    let mut element = DataElement::new(
        "de-adherence",
        "Statin Adherence",
        FactCategory::Medication,
        statin_binding(),
    );
    element.cumulative_supply = Some(CumulativeSupply {
        index_event: "IPSD".into(),
        window_days: 365,
        comparator: Comparator::Ge,
        required_days: Decimal::from(270),
    });
    element
}

fn measure() -> MeasureSpec {
    MeasureSpec {
        id: "adh-001".into(),
        title: "Statin Adherence".into(),
        version: Some("2.1.0".into()),
        measurement_period: MeasurementPeriod::new(date(2025, 1, 1), date(2025, 12, 31)).unwrap(),
        index_events: vec![IndexEventDefinition {
            name: "IPSD".into(),
            description: Some("Index prescription start date".into()),
            category: FactCategory::Medication,
            binding: statin_binding(),
            selection: IndexSelection::First,
        }],
        populations: vec![
            PopulationDefinition {
                population: PopulationType::InitialPopulation,
                criteria: LogicalClause::new(
                    "ip",
                    "In Population",
                    LogicalOperator::And,
                    vec![
                        CriteriaNode::Element(hypertension_element()),
                        CriteriaNode::Element(age_element()),
                    ],
                ),
            },
            PopulationDefinition {
                population: PopulationType::Numerator,
                criteria: LogicalClause::new(
                    "num",
                    "Adherent",
                    LogicalOperator::And,
                    vec![CriteriaNode::Element(adherence_element())],
                ),
            },
        ],
    }
}

#[test]
fn cql_target_names_definitions_and_value_sets() {
    let generated = Compiler::new()
        .compile(&measure(), TargetFormat::ClinicalExpression, &OverrideStore::new())
        .unwrap();

    assert!(generated.code.starts_with("// Measure: Statin Adherence"));
    assert!(generated.code.contains("library StatinAdherence version '2.1.0'"));
    assert!(generated.code.contains("valueset \"Essential Hypertension\""));
    assert!(generated.code.contains("parameter \"Measurement Period\""));
    assert!(generated.code.contains("define \"Essential Hypertension\":"));
    assert!(generated.code.contains("during \"Measurement Period\""));
    assert!(generated.code.contains("define \"IPSD\":"));
    assert!(generated.code.contains("define \"Initial Population\":"));
    assert!(generated.code.contains("define \"Statin Adherence Days Supply\":"));
    assert!(generated.code.contains(">= 270"));
    assert!(generated.warnings.is_empty());
}

#[test]
fn sql_target_builds_predicate_and_combination_ctes() {
    let generated = Compiler::new()
        .compile(&measure(), TargetFormat::WarehouseSql, &OverrideStore::new())
        .unwrap();

    assert!(generated.code.starts_with("-- Measure: Statin Adherence"));
    assert!(generated.code.contains("idx_ipsd AS ("));
    assert!(generated.code.contains("de_essential_hypertension AS ("));
    assert!(generated.code.contains("d.code IN ('I10', '59621000')"));
    assert!(generated.code.contains("INTERSECT"));
    assert!(generated.code.contains("SUM(COALESCE(m.days_supply, 0))"));
    assert!(generated.code.contains("INTERVAL '365 days'"));
    assert!(generated.code.contains("WHERE c.total_days >= 270"));
    assert!(generated.code.contains("pop_numerator AS ("));
    assert!(generated.code.contains("'initial-population' AS population"));
}

#[test]
fn and_or_not_map_to_intersect_union_except() {
    let mut spec = measure();
    // A AND B OR C: the override flips the second pair to OR
    let mut clause = LogicalClause::new(
        "mixed",
        "Mixed Criteria",
        LogicalOperator::And,
        vec![
            CriteriaNode::Element(hypertension_element()),
            CriteriaNode::Element(age_element()),
            CriteriaNode::Element(adherence_element()),
        ],
    );
    clause.sibling_connections = vec![SiblingConnection {
        from_id: "de-age".into(),
        to_id: "de-adherence".into(),
        operator: LogicalOperator::Or,
    }];
    spec.populations[1] = PopulationDefinition {
        population: PopulationType::Numerator,
        criteria: clause,
    };

    let generated = Compiler::new()
        .compile(&spec, TargetFormat::WarehouseSql, &OverrideStore::new())
        .unwrap();
    // The AND run is wrapped before the operator changes to UNION
    assert!(generated.code.contains("INTERSECT"));
    assert!(generated.code.contains("UNION"));
    assert!(generated.code.contains(") grp_2"));

    let cql = Compiler::new()
        .compile(&spec, TargetFormat::ClinicalExpression, &OverrideStore::new())
        .unwrap();
    assert!(cql.code.contains("(\"Essential Hypertension\"\n    and \"Age 18 or older\")\n    or \"Statin Adherence\""));
}

#[test]
fn negated_element_uses_except_in_sql() {
    let mut spec = measure();
    let mut element = hypertension_element();
    element.id = "de-no-htn".into();
    element.name = "No Hypertension Diagnosis".into();
    element.negation = true;
    spec.populations[1] = PopulationDefinition {
        population: PopulationType::Numerator,
        criteria: LogicalClause::new(
            "num",
            "Adherent",
            LogicalOperator::And,
            vec![CriteriaNode::Element(element)],
        ),
    };

    let generated = Compiler::new()
        .compile(&spec, TargetFormat::WarehouseSql, &OverrideStore::new())
        .unwrap();
    assert!(generated.code.contains("de_no_hypertension_diagnosis AS (\n    SELECT p.patient_id\n    FROM patients p\n    EXCEPT"));

    let cql = Compiler::new()
        .compile(&spec, TargetFormat::ClinicalExpression, &OverrideStore::new())
        .unwrap();
    assert!(cql.code.contains("not (exists"));
}

#[test]
fn empty_value_set_warns_but_still_generates() {
    let mut spec = measure();
    let mut element = hypertension_element();
    element.binding = CodeBinding::from_value_set(ValueSetReference::new("Ghost Set", vec![]));
    spec.populations[0].criteria.children[0] = CriteriaNode::Element(element);

    for target in [TargetFormat::ClinicalExpression, TargetFormat::WarehouseSql] {
        let generated = Compiler::new()
            .compile(&spec, target, &OverrideStore::new())
            .unwrap();
        assert!(!generated.code.is_empty());
        assert_eq!(generated.warnings.len(), 1);
        assert!(generated.warnings[0].contains("zero codes"));
    }

    let sql = Compiler::new()
        .compile(&spec, TargetFormat::WarehouseSql, &OverrideStore::new())
        .unwrap();
    assert!(sql.code.contains("1 = 0 -- value set resolved to zero codes"));
}

#[test]
fn undefined_index_event_is_fatal_for_the_target() {
    let mut spec = measure();
    spec.index_events.clear();

    for target in [TargetFormat::ClinicalExpression, TargetFormat::WarehouseSql] {
        let error = Compiler::new()
            .compile(&spec, target, &OverrideStore::new())
            .unwrap_err();
        assert_eq!(
            error,
            GenerationError::UndefinedIndexEvent {
                component: "de-adherence".into(),
                name: "IPSD".into(),
            }
        );
    }
}

#[test]
fn index_event_referenced_from_timing_is_checked_too() {
    let mut spec = measure();
    let mut element = hypertension_element();
    element.timing = vec![Edited::new(TimingRequirement::Constraint(
        TimingConstraint::new(
            TimingOperator::Within,
            TimingAnchor::IndexEvent("GHOST".into()),
        )
        .with_offset(TimingOffset {
            value: 30,
            unit: TimeUnit::Days,
            direction: OffsetDirection::After,
        }),
    ))];
    spec.populations[0].criteria.children[0] = CriteriaNode::Element(element);

    let error = Compiler::new()
        .compile(&spec, TargetFormat::WarehouseSql, &OverrideStore::new())
        .unwrap_err();
    assert!(matches!(
        error,
        GenerationError::UndefinedIndexEvent { name, .. } if name == "GHOST"
    ));
}

#[test]
fn index_event_anchor_joins_the_index_cte_in_sql() {
    let mut spec = measure();
    let mut element = hypertension_element();
    element.timing = vec![Edited::new(TimingRequirement::Constraint(
        TimingConstraint::new(
            TimingOperator::Within,
            TimingAnchor::IndexEvent("IPSD".into()),
        )
        .with_offset(TimingOffset {
            value: 180,
            unit: TimeUnit::Days,
            direction: OffsetDirection::After,
        }),
    ))];
    spec.populations[0].criteria.children[0] = CriteriaNode::Element(element);

    let generated = Compiler::new()
        .compile(&spec, TargetFormat::WarehouseSql, &OverrideStore::new())
        .unwrap();
    assert!(generated
        .code
        .contains("JOIN idx_ipsd i1 ON i1.patient_id = d.patient_id"));
    assert!(generated
        .code
        .contains("i1.index_date + INTERVAL '180 days'"));
}

#[test]
fn locked_override_replaces_one_format_only() {
    let spec = measure();
    let store = OverrideStore::new();
    let key = OverrideKey::new("adh-001", "de-htn", TargetFormat::WarehouseSql);
    let manual = "de_essential_hypertension AS (\n    SELECT patient_id FROM curated_hypertension_cohort\n)";
    store
        .upsert(key.clone(), manual, "alice", "use the curated cohort table", None, None)
        .unwrap();
    store
        .set_locked(&key, true, "alice", "reviewed")
        .unwrap();

    let sql = Compiler::new()
        .compile(&spec, TargetFormat::WarehouseSql, &store)
        .unwrap();
    assert!(sql.code.contains("curated_hypertension_cohort"));
    assert!(!sql.code.contains("de_essential_hypertension AS (\n    SELECT DISTINCT d.patient_id"));

    // The clinical-expression rendering must not see the SQL override
    let cql = Compiler::new()
        .compile(&spec, TargetFormat::ClinicalExpression, &store)
        .unwrap();
    assert!(!cql.code.contains("curated_hypertension_cohort"));
    assert!(cql.code.contains("define \"Essential Hypertension\":"));
}

#[test]
fn unlocked_override_is_ignored_by_the_compiler() {
    let spec = measure();
    let store = OverrideStore::new();
    store
        .upsert(
            OverrideKey::new("adh-001", "de-htn", TargetFormat::WarehouseSql),
            "de_essential_hypertension AS (SELECT 1)",
            "alice",
            "draft, not ready",
            None,
            None,
        )
        .unwrap();

    let sql = Compiler::new()
        .compile(&spec, TargetFormat::WarehouseSql, &store)
        .unwrap();
    assert!(!sql.code.contains("SELECT 1"));
}

#[test]
fn generation_is_deterministic() {
    let spec = measure();
    let store = OverrideStore::new();
    let compiler = Compiler::new();
    let first = compiler
        .compile(&spec, TargetFormat::WarehouseSql, &store)
        .unwrap();
    let second = compiler
        .compile(&spec, TargetFormat::WarehouseSql, &store)
        .unwrap();
    assert_eq!(first, second);
}
