//! "How close" gap descriptions for patients short of the numerator

use crate::trace::{ValidationNode, ValidationStatus};

/// Collect natural-language gap descriptions from the failing leaves of a
/// trace subtree, in document order.
///
/// Leaves set their own gap text during evaluation; this walk gathers the
/// ones that actually blocked the subtree. Children of passing nodes are
/// skipped: a failing branch of a satisfied OR is not a gap.
pub fn collect_gaps(node: &ValidationNode) -> Vec<String> {
    let mut gaps = Vec::new();
    walk(node, &mut gaps);
    gaps
}

fn walk(node: &ValidationNode, gaps: &mut Vec<String>) {
    if node.passed() || node.status == ValidationStatus::NotApplicable {
        return;
    }
    if node.children.is_empty() {
        if let Some(gap) = &node.gap {
            gaps.push(gap.clone());
        } else if node.diagnostic.is_none() {
            gaps.push(format!("'{}' was not met", node.label));
        }
        return;
    }
    for child in &node.children {
        walk(child, gaps);
    }
}
