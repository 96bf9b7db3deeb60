//! Complexity scoring for editorial triage
//!
//! A small recursive metric over the criteria tree. Scores are additive and
//! monotonic: adding a timing clause, a negation, or an AND pair never
//! decreases a node's score, and a composite never scores below the sum of
//! its children.
//!
//! Scoring rules:
//! - atomic element: base 1, +1 per timing clause, +1 if negated, +1 if its
//!   code union is empty (flagged for manual review)
//! - composite clause: sum of children, +1 per effective AND pair, +1 per
//!   nesting level beyond the first

use measurekit_model::{
    CriteriaNode, DataElement, FactCategory, LogicalClause, LogicalOperator,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Bucketed complexity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComplexityLevel {
    Low,
    Medium,
    High,
}

impl ComplexityLevel {
    /// Bucket a numeric score
    pub fn from_score(score: u32) -> Self {
        match score {
            0..=3 => ComplexityLevel::Low,
            4..=7 => ComplexityLevel::Medium,
            _ => ComplexityLevel::High,
        }
    }
}

impl fmt::Display for ComplexityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComplexityLevel::Low => write!(f, "low"),
            ComplexityLevel::Medium => write!(f, "medium"),
            ComplexityLevel::High => write!(f, "high"),
        }
    }
}

/// Scoring result with the factors that contributed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplexityScore {
    pub level: ComplexityLevel,
    pub score: u32,
    pub factors: Vec<String>,
}

/// Score a criteria node
pub fn score(node: &CriteriaNode) -> ComplexityScore {
    let mut factors = Vec::new();
    let score = score_node(node, 0, &mut factors);
    ComplexityScore {
        level: ComplexityLevel::from_score(score),
        score,
        factors,
    }
}

/// Score a clause used as a population root
pub fn score_clause(clause: &LogicalClause) -> ComplexityScore {
    let mut factors = Vec::new();
    let score = clause_score(clause, 0, &mut factors);
    ComplexityScore {
        level: ComplexityLevel::from_score(score),
        score,
        factors,
    }
}

fn score_node(node: &CriteriaNode, depth: u32, factors: &mut Vec<String>) -> u32 {
    match node {
        CriteriaNode::Element(element) => element_score(element, factors),
        CriteriaNode::Clause(clause) => clause_score(clause, depth, factors),
    }
}

fn element_score(element: &DataElement, factors: &mut Vec<String>) -> u32 {
    let mut score = 1;

    let timing_count = element.timing.len() as u32;
    if timing_count > 0 {
        score += timing_count;
        factors.push(format!(
            "'{}': {} timing clause(s)",
            element.name, timing_count
        ));
    }
    if element.negation {
        score += 1;
        factors.push(format!("'{}': negation", element.name));
    }
    if element.category != FactCategory::Demographic
        && element.paired_check.is_none()
        && element.binding.is_code_empty()
    {
        score += 1;
        factors.push(format!("'{}': zero codes, needs manual review", element.name));
    }

    score
}

fn clause_score(clause: &LogicalClause, depth: u32, factors: &mut Vec<String>) -> u32 {
    let mut score: u32 = clause
        .children
        .iter()
        .map(|child| score_node(child, depth + 1, factors))
        .sum();

    let and_pairs = clause
        .children
        .windows(2)
        .filter(|pair| {
            clause.operator_between(pair[0].id(), pair[1].id()) == LogicalOperator::And
        })
        .count() as u32;
    if and_pairs > 0 {
        score += and_pairs;
        factors.push(format!("'{}': {} AND pair(s)", clause.name, and_pairs));
    }

    if depth > 0 {
        score += 1;
        factors.push(format!("'{}': nested {} level(s) deep", clause.name, depth));
    }

    score
}

#[cfg(test)]
mod tests {
    use super::*;
    use measurekit_model::{
        CodeBinding, CodeReference, TimingAnchor, TimingConstraint, TimingOperator,
        TimingRequirement,
    };
    use measurekit_model::Edited;
    use pretty_assertions::assert_eq;

    fn bound_element(id: &str) -> DataElement {
        DataElement::new(
            id,
            format!("Element {id}"),
            FactCategory::Diagnosis,
            CodeBinding::from_codes(vec![CodeReference::new("I10", "ICD-10-CM")]),
        )
    }

    fn mp_timing() -> Edited<TimingRequirement> {
        Edited::new(TimingRequirement::Constraint(TimingConstraint::new(
            TimingOperator::During,
            TimingAnchor::MeasurementPeriodStart,
        )))
    }

    #[test]
    fn atomic_element_scores_base_one() {
        let result = score(&CriteriaNode::Element(bound_element("a")));
        assert_eq!(result.score, 1);
        assert_eq!(result.level, ComplexityLevel::Low);
        assert!(result.factors.is_empty());
    }

    #[test]
    fn timing_clause_adds_exactly_one() {
        let mut element = bound_element("a");
        let before = score(&CriteriaNode::Element(element.clone())).score;

        element.timing.push(mp_timing());
        let after = score(&CriteriaNode::Element(element.clone())).score;
        assert_eq!(after, before + 1);

        element.timing.push(mp_timing());
        assert_eq!(score(&CriteriaNode::Element(element)).score, before + 2);
    }

    #[test]
    fn negation_and_zero_codes_each_add_one() {
        let mut element = bound_element("a");
        element.negation = true;
        assert_eq!(score(&CriteriaNode::Element(element)).score, 2);

        let mut empty = DataElement::new(
            "b",
            "Empty",
            FactCategory::Diagnosis,
            CodeBinding::default(),
        );
        empty.negation = true;
        let result = score(&CriteriaNode::Element(empty));
        assert_eq!(result.score, 3);
        assert!(result.factors.iter().any(|f| f.contains("manual review")));
    }

    #[test]
    fn composite_never_scores_below_child_sum() {
        let clause = LogicalClause::new(
            "c",
            "Pair",
            LogicalOperator::And,
            vec![
                CriteriaNode::Element(bound_element("a")),
                CriteriaNode::Element(bound_element("b")),
            ],
        );
        let child_sum: u32 = clause
            .children
            .iter()
            .map(|c| score(c).score)
            .sum();
        let result = score_clause(&clause);
        assert!(result.score >= child_sum);
        // Two children joined by one AND pair
        assert_eq!(result.score, child_sum + 1);
    }

    #[test]
    fn nesting_beyond_first_level_adds_one_per_level() {
        let inner = LogicalClause::new(
            "inner",
            "Inner",
            LogicalOperator::Or,
            vec![
                CriteriaNode::Element(bound_element("a")),
                CriteriaNode::Element(bound_element("b")),
            ],
        );
        let outer = LogicalClause::new(
            "outer",
            "Outer",
            LogicalOperator::Or,
            vec![CriteriaNode::Clause(inner.clone())],
        );

        // Inner at depth 0 scores its children only (OR pairs are free)
        assert_eq!(score_clause(&inner).score, 2);
        // Same clause nested once picks up the nesting point
        assert_eq!(score_clause(&outer).score, 3);
    }

    #[test]
    fn level_buckets() {
        assert_eq!(ComplexityLevel::from_score(1), ComplexityLevel::Low);
        assert_eq!(ComplexityLevel::from_score(3), ComplexityLevel::Low);
        assert_eq!(ComplexityLevel::from_score(4), ComplexityLevel::Medium);
        assert_eq!(ComplexityLevel::from_score(7), ComplexityLevel::Medium);
        assert_eq!(ComplexityLevel::from_score(8), ComplexityLevel::High);
    }
}
