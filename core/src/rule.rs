//! Rule schema, validation, and the operator registry.
//!
//! Rules arrive as a loosely-typed JSON document drafted by an external
//! collaborator. Validation is per-rule: one malformed entry is skipped
//! and reported, never allowed to sink the whole list.
//!
//! RULES:
//!   - The operator set is closed. An operator that survives load is
//!     guaranteed evaluable; `Operator::holds` is total.
//!   - Load preserves input order. Aggregation tie-breaks on it.
//!   - Loading is a pure transform; persistence belongs to the pipeline.

use crate::table::Value;
use serde::{Deserialize, Serialize};

// ── Operator registry ────────────────────────────────────────────────────────

/// The closed set of rule operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    GreaterThan,
    LessThan,
    GreaterOrEqual,
    LessOrEqual,
    Equal,
    NotEqual,
    In,
    NotIn,
}

impl Operator {
    /// Parse an operator symbol. Both the symbolic form (`">"`) and the
    /// camelCase form (`"greaterThan"`) appear in drafted rule documents.
    pub fn parse(symbol: &str) -> Option<Operator> {
        match symbol.trim() {
            ">" | "greaterThan" => Some(Operator::GreaterThan),
            "<" | "lessThan" => Some(Operator::LessThan),
            ">=" | "greaterThanOrEqual" => Some(Operator::GreaterOrEqual),
            "<=" | "lessThanOrEqual" => Some(Operator::LessOrEqual),
            "==" | "equal" => Some(Operator::Equal),
            "!=" | "notEqual" => Some(Operator::NotEqual),
            "in" => Some(Operator::In),
            "not in" | "notIn" => Some(Operator::NotIn),
            _ => None,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Operator::GreaterThan => ">",
            Operator::LessThan => "<",
            Operator::GreaterOrEqual => ">=",
            Operator::LessOrEqual => "<=",
            Operator::Equal => "==",
            Operator::NotEqual => "!=",
            Operator::In => "in",
            Operator::NotIn => "not in",
        }
    }

    /// Ordering comparisons need a numeric threshold; membership needs a
    /// list; equality takes any scalar.
    pub fn accepts(&self, value: &RuleValue) -> bool {
        match self {
            Operator::GreaterThan
            | Operator::LessThan
            | Operator::GreaterOrEqual
            | Operator::LessOrEqual => matches!(value, RuleValue::Number(_)),
            Operator::Equal | Operator::NotEqual => {
                matches!(value, RuleValue::Number(_) | RuleValue::Text(_))
            }
            Operator::In | Operator::NotIn => matches!(value, RuleValue::List(_)),
        }
    }

    /// Evaluate this operator for one cell. Total over values that passed
    /// `accepts`: null cells and failed numeric coercions never match.
    pub fn holds(&self, cell: &Value, value: &RuleValue) -> bool {
        if cell.is_null() {
            return false;
        }
        match self {
            Operator::GreaterThan => cmp_numeric(cell, value, |a, b| a > b),
            Operator::LessThan => cmp_numeric(cell, value, |a, b| a < b),
            Operator::GreaterOrEqual => cmp_numeric(cell, value, |a, b| a >= b),
            Operator::LessOrEqual => cmp_numeric(cell, value, |a, b| a <= b),
            Operator::Equal => scalar_eq(cell, value),
            Operator::NotEqual => !scalar_eq(cell, value),
            Operator::In => match value {
                RuleValue::List(items) => items.iter().any(|item| scalar_eq(cell, item)),
                _ => false,
            },
            Operator::NotIn => match value {
                RuleValue::List(items) => !items.iter().any(|item| scalar_eq(cell, item)),
                _ => false,
            },
        }
    }
}

fn cmp_numeric(cell: &Value, value: &RuleValue, op: fn(f64, f64) -> bool) -> bool {
    let threshold = match value {
        RuleValue::Number(n) => *n,
        _ => return false,
    };
    match cell.as_number() {
        Some(n) => op(n, threshold),
        None => false, // coercion failure excludes the row
    }
}

/// Scalar equality without numeric coercion: numbers compare to numbers,
/// text to text, dates to ISO text. Cross-type comparisons are false.
fn scalar_eq(cell: &Value, value: &RuleValue) -> bool {
    match (cell, value) {
        (Value::Number(a), RuleValue::Number(b)) => a == b,
        (Value::Text(a), RuleValue::Text(b)) => a == b,
        (Value::Date(d), RuleValue::Text(s)) => d.to_string() == s.trim(),
        _ => false,
    }
}

// ── Rule values ──────────────────────────────────────────────────────────────

/// The threshold/value side of a rule: a scalar for comparisons, a list
/// for membership operators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RuleValue {
    Number(f64),
    Text(String),
    List(Vec<RuleValue>),
}

impl RuleValue {
    /// Convert a raw JSON value. Nested lists, objects, and nulls are
    /// rejected (None) and surface as a rule issue.
    pub fn from_json(raw: &serde_json::Value) -> Option<RuleValue> {
        match raw {
            serde_json::Value::Number(n) => n.as_f64().map(RuleValue::Number),
            serde_json::Value::String(s) => Some(RuleValue::Text(s.clone())),
            serde_json::Value::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    match RuleValue::from_json(item)? {
                        RuleValue::List(_) => return None,
                        scalar => out.push(scalar),
                    }
                }
                Some(RuleValue::List(out))
            }
            _ => None,
        }
    }
}

// ── Schema ───────────────────────────────────────────────────────────────────

/// A rule exactly as drafted, before validation. Every field is optional
/// so that one malformed entry deserializes instead of poisoning the
/// whole document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawRule {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub field: Option<String>,
    #[serde(default)]
    pub operator: Option<String>,
    #[serde(default)]
    pub value: Option<serde_json::Value>,
    #[serde(default)]
    pub action: Option<String>,
}

/// The document shape produced by the rule-drafting collaborator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RulesDocument {
    #[serde(default)]
    pub rules: Vec<RawRule>,
}

/// A validated, immutable rule.
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub name: String,
    pub field: String,
    pub operator: Operator,
    pub value: RuleValue,
    pub action: String,
}

// ── Loading ──────────────────────────────────────────────────────────────────

/// What to do with a rule whose `field` names no table column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", content = "column", rename_all = "snake_case")]
pub enum UnknownFieldPolicy {
    /// Skip the rule and report it (default).
    Skip,
    /// Rebind the rule to the named column, recording the substitution.
    RebindTo(String),
}

impl Default for UnknownFieldPolicy {
    fn default() -> Self {
        UnknownFieldPolicy::Skip
    }
}

/// One rejected rule: which entry, and why.
#[derive(Debug, Clone, Serialize)]
pub struct RuleIssue {
    pub index: usize,
    pub name: Option<String>,
    pub reason: String,
}

/// One field rebind performed under `UnknownFieldPolicy::RebindTo`.
#[derive(Debug, Clone, Serialize)]
pub struct FieldSubstitution {
    pub rule: String,
    pub from: String,
    pub to: String,
}

/// Validated rules plus everything that was skipped or rewritten.
#[derive(Debug, Clone, Default)]
pub struct LoadedRules {
    pub rules: Vec<Rule>,
    pub skipped: Vec<RuleIssue>,
    pub substitutions: Vec<FieldSubstitution>,
}

/// Validate a drafted rule document against the table's column set.
/// Order is preserved; malformed entries are skipped and reported.
pub fn load_rules(
    doc: &RulesDocument,
    columns: &[String],
    policy: &UnknownFieldPolicy,
) -> LoadedRules {
    let mut out = LoadedRules::default();

    for (index, raw) in doc.rules.iter().enumerate() {
        match validate_rule(raw, columns, policy, &mut out.substitutions) {
            Ok(rule) => out.rules.push(rule),
            Err(reason) => {
                log::warn!(
                    "rule {index} ({:?}) skipped: {reason}",
                    raw.name.as_deref().unwrap_or("unnamed")
                );
                out.skipped.push(RuleIssue {
                    index,
                    name: raw.name.clone(),
                    reason,
                });
            }
        }
    }

    out
}

fn validate_rule(
    raw: &RawRule,
    columns: &[String],
    policy: &UnknownFieldPolicy,
    substitutions: &mut Vec<FieldSubstitution>,
) -> Result<Rule, String> {
    let name = raw
        .name
        .clone()
        .ok_or_else(|| "missing 'name'".to_string())?;
    let field = raw
        .field
        .clone()
        .ok_or_else(|| "missing 'field'".to_string())?;
    let symbol = raw
        .operator
        .as_deref()
        .ok_or_else(|| "missing 'operator'".to_string())?;
    let operator =
        Operator::parse(symbol).ok_or_else(|| format!("unsupported operator '{symbol}'"))?;
    let raw_value = raw
        .value
        .as_ref()
        .ok_or_else(|| "missing 'value'".to_string())?;
    let value = RuleValue::from_json(raw_value)
        .ok_or_else(|| format!("value {raw_value} is not a scalar or list of scalars"))?;
    if !operator.accepts(&value) {
        return Err(format!(
            "operator '{}' is incompatible with value {raw_value}",
            operator.symbol()
        ));
    }
    let action = raw
        .action
        .clone()
        .ok_or_else(|| "missing 'action'".to_string())?;

    let field = if columns.iter().any(|c| c == &field) {
        field
    } else {
        match policy {
            UnknownFieldPolicy::Skip => {
                return Err(format!("unknown field '{field}'"));
            }
            UnknownFieldPolicy::RebindTo(target) => {
                if !columns.iter().any(|c| c == target) {
                    return Err(format!(
                        "unknown field '{field}' and rebind target '{target}' missing too"
                    ));
                }
                log::warn!("rule '{name}': field '{field}' rebound to '{target}'");
                substitutions.push(FieldSubstitution {
                    rule: name.clone(),
                    from: field,
                    to: target.clone(),
                });
                target.clone()
            }
        }
    };

    Ok(Rule {
        name,
        field,
        operator,
        value,
        action,
    })
}
