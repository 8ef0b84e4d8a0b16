//! Row evaluation: one rule against the whole table.
//!
//! Evaluation is independent per rule and safe to run concurrently; the
//! aggregator is the only reduction point. A rule that fails to apply is
//! skipped for the run and logged, never allowed to abort the batch.

use crate::{
    error::{EngineError, EngineResult},
    rule::{Rule, RuleIssue},
    table::Table,
    types::{CustomerId, RowIx, COL_CUSTOMER_ID},
};

/// One rule matching one transaction row.
#[derive(Debug, Clone, PartialEq)]
pub struct Flag {
    pub row: RowIx,
    pub customer_id: CustomerId,
    pub reason: String,
    pub action: String,
}

/// All flags produced by a single rule, in row order.
#[derive(Debug, Clone)]
pub struct RuleFlags {
    pub rule: String,
    pub flags: Vec<Flag>,
}

/// Per-rule flag sets in rule order, plus rules skipped at apply time.
#[derive(Debug, Clone, Default)]
pub struct EvalOutcome {
    pub per_rule: Vec<RuleFlags>,
    pub skipped: Vec<RuleIssue>,
}

/// Apply one validated rule to the table, producing the flags for every
/// matching row. The table is read-only; coercion failures exclude the
/// row from the match.
pub fn evaluate_rule(table: &Table, rule: &Rule) -> EngineResult<Vec<Flag>> {
    // An empty table has no columns at all; nothing to flag, not a miss.
    if table.is_empty() {
        return Ok(Vec::new());
    }

    // Load-time validation guarantees the field exists; a miss here means
    // the rule was built outside the loader.
    if !table.has_column(&rule.field) {
        return Err(EngineError::Other(anyhow::anyhow!(
            "rule '{}' targets unknown column '{}'",
            rule.name,
            rule.field
        )));
    }

    let cells = table.column(&rule.field);
    let mut flags = Vec::new();
    for (row, cell) in cells.iter().enumerate() {
        if rule.operator.holds(cell, &rule.value) {
            flags.push(Flag {
                row,
                customer_id: table.get(row, COL_CUSTOMER_ID).to_string(),
                reason: rule.name.clone(),
                action: rule.action.clone(),
            });
        }
    }
    Ok(flags)
}

/// Apply every rule in order. A failing rule is recorded and skipped;
/// later rules still run.
pub fn evaluate_rules(table: &Table, rules: &[Rule]) -> EvalOutcome {
    let mut outcome = EvalOutcome::default();

    for (index, rule) in rules.iter().enumerate() {
        match evaluate_rule(table, rule) {
            Ok(flags) => {
                log::info!("rule '{}' flagged {} rows", rule.name, flags.len());
                outcome.per_rule.push(RuleFlags {
                    rule: rule.name.clone(),
                    flags,
                });
            }
            Err(err) => {
                log::warn!("rule '{}' skipped at evaluation: {err}", rule.name);
                outcome.skipped.push(RuleIssue {
                    index,
                    name: Some(rule.name.clone()),
                    reason: err.to_string(),
                });
            }
        }
    }

    outcome
}
