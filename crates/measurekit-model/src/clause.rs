//! Interior criteria: logical clauses and the tagged criteria tree

use crate::element::DataElement;
use crate::error::{ModelError, ModelResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Boolean combinator for a clause's children
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogicalOperator {
    And,
    Or,
    Not,
}

impl fmt::Display for LogicalOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogicalOperator::And => write!(f, "AND"),
            LogicalOperator::Or => write!(f, "OR"),
            LogicalOperator::Not => write!(f, "NOT"),
        }
    }
}

/// Pairwise operator override between two named children of a clause.
///
/// Connections are keyed by child id, not child position, so reordering a
/// clause's children never silently re-targets an override.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiblingConnection {
    pub from_id: String,
    pub to_id: String,
    pub operator: LogicalOperator,
}

/// An interior node: a boolean combination of child criteria
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogicalClause {
    pub id: String,
    pub name: String,
    pub operator: LogicalOperator,
    pub children: Vec<CriteriaNode>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sibling_connections: Vec<SiblingConnection>,
}

impl LogicalClause {
    /// Clause with the given operator and children, no overrides
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        operator: LogicalOperator,
        children: Vec<CriteriaNode>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            operator,
            children,
            sibling_connections: Vec::new(),
        }
    }

    /// Effective operator between two adjacent children, by id.
    ///
    /// An override listed in either orientation applies; unlisted pairs use
    /// the clause default.
    pub fn operator_between(&self, from_id: &str, to_id: &str) -> LogicalOperator {
        self.sibling_connections
            .iter()
            .find(|c| {
                (c.from_id == from_id && c.to_id == to_id)
                    || (c.from_id == to_id && c.to_id == from_id)
            })
            .map(|c| c.operator)
            .unwrap_or(self.operator)
    }

    /// True when any adjacent child pair deviates from the default operator
    pub fn has_mixed_operators(&self) -> bool {
        self.children.windows(2).any(|pair| {
            self.operator_between(pair[0].id(), pair[1].id()) != self.operator
        })
    }

    /// Validate this clause and every node beneath it
    pub fn validate(&self) -> ModelResult<()> {
        if self.children.is_empty() {
            return Err(ModelError::EmptyClause {
                clause: self.id.clone(),
            });
        }
        if self.operator == LogicalOperator::Not && self.children.len() != 1 {
            return Err(ModelError::NotArity {
                clause: self.id.clone(),
                count: self.children.len(),
            });
        }

        let child_ids: HashSet<&str> = self.children.iter().map(CriteriaNode::id).collect();
        let mut seen_pairs: HashSet<(String, String)> = HashSet::new();
        for conn in &self.sibling_connections {
            for id in [&conn.from_id, &conn.to_id] {
                if !child_ids.contains(id.as_str()) {
                    return Err(ModelError::unknown_sibling_child(&self.id, id));
                }
            }
            // Normalize so (a, b) and (b, a) count as the same pair
            let key = if conn.from_id <= conn.to_id {
                (conn.from_id.clone(), conn.to_id.clone())
            } else {
                (conn.to_id.clone(), conn.from_id.clone())
            };
            if !seen_pairs.insert(key) {
                return Err(ModelError::DuplicateSiblingPair {
                    clause: self.id.clone(),
                    from: conn.from_id.clone(),
                    to: conn.to_id.clone(),
                });
            }
        }

        for child in &self.children {
            child.validate()?;
        }
        Ok(())
    }
}

/// A node of the criteria tree: either a leaf element or a nested clause.
///
/// Tagged explicitly so consumers match exhaustively instead of probing for
/// a `children` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum CriteriaNode {
    Element(DataElement),
    Clause(LogicalClause),
}

impl CriteriaNode {
    pub fn id(&self) -> &str {
        match self {
            CriteriaNode::Element(e) => &e.id,
            CriteriaNode::Clause(c) => &c.id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            CriteriaNode::Element(e) => &e.name,
            CriteriaNode::Clause(c) => &c.name,
        }
    }

    pub fn as_element(&self) -> Option<&DataElement> {
        match self {
            CriteriaNode::Element(e) => Some(e),
            CriteriaNode::Clause(_) => None,
        }
    }

    pub fn as_clause(&self) -> Option<&LogicalClause> {
        match self {
            CriteriaNode::Element(_) => None,
            CriteriaNode::Clause(c) => Some(c),
        }
    }

    /// Validate this node and everything beneath it
    pub fn validate(&self) -> ModelResult<()> {
        match self {
            CriteriaNode::Element(e) => e.validate(),
            CriteriaNode::Clause(c) => c.validate(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codes::{CodeBinding, CodeReference};
    use crate::element::FactCategory;
    use pretty_assertions::assert_eq;

    fn element(id: &str) -> CriteriaNode {
        CriteriaNode::Element(DataElement::new(
            id,
            id.to_uppercase(),
            FactCategory::Diagnosis,
            CodeBinding::from_codes(vec![CodeReference::new("I10", "ICD-10-CM")]),
        ))
    }

    fn connection(from: &str, to: &str, operator: LogicalOperator) -> SiblingConnection {
        SiblingConnection {
            from_id: from.into(),
            to_id: to.into(),
            operator,
        }
    }

    #[test]
    fn operator_between_prefers_override_in_either_orientation() {
        let mut clause = LogicalClause::new(
            "c1",
            "Mixed",
            LogicalOperator::And,
            vec![element("a"), element("b"), element("c")],
        );
        clause.sibling_connections = vec![connection("b", "a", LogicalOperator::Or)];

        assert_eq!(clause.operator_between("a", "b"), LogicalOperator::Or);
        assert_eq!(clause.operator_between("b", "a"), LogicalOperator::Or);
        assert_eq!(clause.operator_between("b", "c"), LogicalOperator::And);
        assert!(clause.has_mixed_operators());
    }

    #[test]
    fn duplicate_pair_rejected_even_when_reversed() {
        let mut clause = LogicalClause::new(
            "c1",
            "Dup",
            LogicalOperator::And,
            vec![element("a"), element("b")],
        );
        clause.sibling_connections = vec![
            connection("a", "b", LogicalOperator::Or),
            connection("b", "a", LogicalOperator::And),
        ];
        assert!(matches!(
            clause.validate(),
            Err(ModelError::DuplicateSiblingPair { .. })
        ));
    }

    #[test]
    fn connection_to_unknown_child_rejected() {
        let mut clause = LogicalClause::new(
            "c1",
            "Unknown",
            LogicalOperator::And,
            vec![element("a"), element("b")],
        );
        clause.sibling_connections = vec![connection("a", "ghost", LogicalOperator::Or)];
        assert!(matches!(
            clause.validate(),
            Err(ModelError::UnknownSiblingChild { .. })
        ));
    }

    #[test]
    fn not_requires_exactly_one_child() {
        let clause = LogicalClause::new(
            "c1",
            "Bad not",
            LogicalOperator::Not,
            vec![element("a"), element("b")],
        );
        assert!(matches!(clause.validate(), Err(ModelError::NotArity { .. })));
    }

    #[test]
    fn criteria_node_json_is_kind_tagged() {
        let node = element("a");
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json.get("kind").and_then(|k| k.as_str()), Some("element"));
        let back: CriteriaNode = serde_json::from_value(json).unwrap();
        assert_eq!(node, back);
    }
}
