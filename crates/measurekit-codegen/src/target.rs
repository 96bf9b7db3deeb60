//! Target formats and their syntax tables
//!
//! All per-format branching runs off [`TargetSyntax`] rather than ad hoc
//! conditionals, so adding a third target format is a table entry, not a
//! search for scattered `if` statements.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// A code-generation target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TargetFormat {
    /// CQL-style clinical expression language
    ClinicalExpression,
    /// Warehouse SQL with derived tables
    WarehouseSql,
}

impl TargetFormat {
    /// The syntax table for this format
    pub fn syntax(&self) -> &'static TargetSyntax {
        match self {
            TargetFormat::ClinicalExpression => &CLINICAL_EXPRESSION_SYNTAX,
            TargetFormat::WarehouseSql => &WAREHOUSE_SQL_SYNTAX,
        }
    }
}

impl fmt::Display for TargetFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetFormat::ClinicalExpression => write!(f, "clinical-expression"),
            TargetFormat::WarehouseSql => write!(f, "warehouse-sql"),
        }
    }
}

/// Per-format lexical rules
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetSyntax {
    /// Line-comment prefix
    pub comment_prefix: &'static str,
    /// Quote character for string literals
    pub string_quote: char,
    /// How a quote character inside a string literal is escaped
    pub string_escape: &'static str,
}

impl TargetSyntax {
    /// Render a line comment
    pub fn comment(&self, text: &str) -> String {
        format!("{} {}", self.comment_prefix, text)
    }

    /// Render a string literal with escaping
    pub fn string_literal(&self, text: &str) -> String {
        let escaped = text.replace(self.string_quote, self.string_escape);
        format!("{q}{escaped}{q}", q = self.string_quote)
    }
}

pub static CLINICAL_EXPRESSION_SYNTAX: TargetSyntax = TargetSyntax {
    comment_prefix: "//",
    string_quote: '\'',
    string_escape: "\\'",
};

pub static WAREHOUSE_SQL_SYNTAX: TargetSyntax = TargetSyntax {
    comment_prefix: "--",
    string_quote: '\'',
    string_escape: "''",
};

static NON_IDENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9]+").expect("valid regex"));

/// Lower-snake identifier for SQL table/CTE names
pub fn sql_identifier(name: &str) -> String {
    let lowered = name.to_lowercase();
    let replaced = NON_IDENT.replace_all(&lowered, "_");
    let trimmed = replaced.trim_matches('_');
    let mut ident = if trimmed.is_empty() {
        "unnamed".to_string()
    } else {
        trimmed.to_string()
    };
    if ident.starts_with(|c: char| c.is_ascii_digit()) {
        ident.insert(0, '_');
    }
    ident
}

/// Allocate a unique identifier, suffixing on collision
pub fn unique_identifier(base: &str, used: &mut HashSet<String>) -> String {
    if used.insert(base.to_string()) {
        return base.to_string();
    }
    let mut counter = 2;
    loop {
        let candidate = format!("{base}_{counter}");
        if used.insert(candidate.clone()) {
            return candidate;
        }
        counter += 1;
    }
}

/// Quoted name for clinical-expression definitions
pub fn cql_name(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\\\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comment_prefixes_differ_per_format() {
        assert_eq!(
            TargetFormat::ClinicalExpression.syntax().comment("note"),
            "// note"
        );
        assert_eq!(TargetFormat::WarehouseSql.syntax().comment("note"), "-- note");
    }

    #[test]
    fn sql_string_escaping_doubles_quotes() {
        assert_eq!(
            TargetFormat::WarehouseSql.syntax().string_literal("O'Brien"),
            "'O''Brien'"
        );
    }

    #[test]
    fn sql_identifier_is_lower_snake() {
        assert_eq!(sql_identifier("Essential Hypertension"), "essential_hypertension");
        assert_eq!(sql_identifier("BP < 140/90!"), "bp_140_90");
        assert_eq!(sql_identifier("90-day window"), "_90_day_window");
        assert_eq!(sql_identifier("***"), "unnamed");
    }

    #[test]
    fn unique_identifier_suffixes_on_collision() {
        let mut used = HashSet::new();
        assert_eq!(unique_identifier("de_bp", &mut used), "de_bp");
        assert_eq!(unique_identifier("de_bp", &mut used), "de_bp_2");
        assert_eq!(unique_identifier("de_bp", &mut used), "de_bp_3");
    }
}
