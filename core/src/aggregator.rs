//! Flag aggregation: per-rule flag sets merged into one flagged table.
//!
//! Runs single-threaded after evaluation (global group-by across all
//! rules' outputs). Merge semantics:
//!   1. Concatenate per-rule flag sets in rule order.
//!   2. Group by customer.
//!   3. Dedup reasons and actions independently, first-occurrence order.
//!   4. One message stays unformatted; several become a numbered list.
//!   5. Broadcast the per-customer strings onto every original row.
//!
//! The broadcast join keys on the customer but writes per row, so the
//! output always has exactly one row per input row: no fan-out when a
//! customer owns several transactions, no silent drops.

use crate::{
    error::EngineResult,
    evaluator::{Flag, RuleFlags},
    table::{Table, Value},
    types::{CustomerId, COL_ACTION, COL_CUSTOMER_ID, COL_REASON},
};
use std::collections::HashMap;

/// The transaction table carrying aggregated Reason/Action columns.
#[derive(Debug, Clone, PartialEq)]
pub struct FlaggedTable {
    pub table: Table,
    pub flagged_customers: usize,
}

/// Distinguishes "nothing flagged" from an error and from a silently
/// column-less table.
#[derive(Debug, Clone, PartialEq)]
pub enum FlagOutcome {
    NothingFlagged,
    Flagged(FlaggedTable),
}

impl FlagOutcome {
    pub fn is_flagged(&self) -> bool {
        matches!(self, FlagOutcome::Flagged(_))
    }
}

/// Per-customer message sets, deduped in first-occurrence order.
#[derive(Debug, Default)]
struct CustomerMessages {
    reasons: Vec<String>,
    actions: Vec<String>,
}

fn push_unique(list: &mut Vec<String>, msg: &str) {
    if !list.iter().any(|m| m == msg) {
        list.push(msg.to_string());
    }
}

/// Single message unformatted; several become a 1-indexed numbered list.
fn format_messages(messages: &[String]) -> String {
    if messages.len() == 1 {
        return messages[0].clone();
    }
    messages
        .iter()
        .enumerate()
        .map(|(i, msg)| format!("{}. {msg}", i + 1))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Merge per-rule flag sets onto the original table.
pub fn aggregate(table: &Table, per_rule: &[RuleFlags]) -> EngineResult<FlagOutcome> {
    let all_flags: Vec<&Flag> = per_rule.iter().flat_map(|r| r.flags.iter()).collect();
    if all_flags.is_empty() {
        log::info!("no transactions were flagged");
        return Ok(FlagOutcome::NothingFlagged);
    }

    // Group by customer. Concatenation order is rule order, so the dedup
    // below is stable across runs.
    let mut by_customer: HashMap<CustomerId, CustomerMessages> = HashMap::new();
    for flag in &all_flags {
        let entry = by_customer.entry(flag.customer_id.clone()).or_default();
        push_unique(&mut entry.reasons, &flag.reason);
        push_unique(&mut entry.actions, &flag.action);
    }

    // Broadcast join: per-customer strings written onto every row owned
    // by that customer, Null elsewhere.
    let mut reasons = Vec::with_capacity(table.len());
    let mut actions = Vec::with_capacity(table.len());
    for row in 0..table.len() {
        let key = table.get(row, COL_CUSTOMER_ID).to_string();
        match by_customer.get(&key) {
            Some(msgs) => {
                reasons.push(Value::Text(format_messages(&msgs.reasons)));
                actions.push(Value::Text(format_messages(&msgs.actions)));
            }
            None => {
                reasons.push(Value::Null);
                actions.push(Value::Null);
            }
        }
    }

    let merged = table
        .with_column(COL_REASON, reasons)?
        .with_column(COL_ACTION, actions)?;
    debug_assert_eq!(merged.len(), table.len());

    log::info!(
        "{} customers flagged across {} rows",
        by_customer.len(),
        merged.len()
    );

    Ok(FlagOutcome::Flagged(FlaggedTable {
        table: merged,
        flagged_customers: by_customer.len(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::Flag;
    use serde_json::json;

    fn table() -> Table {
        Table::from_records(&json!([
            {"Customer_ID": 1, "Transaction_Amount": 60000},
            {"Customer_ID": 1, "Transaction_Amount": 120},
            {"Customer_ID": 2, "Transaction_Amount": 50},
        ]))
        .unwrap()
    }

    fn rule_flags(rule: &str, action: &str, hits: &[(usize, &str)]) -> RuleFlags {
        RuleFlags {
            rule: rule.into(),
            flags: hits
                .iter()
                .map(|(row, customer)| Flag {
                    row: *row,
                    customer_id: customer.to_string(),
                    reason: rule.into(),
                    action: action.into(),
                })
                .collect(),
        }
    }

    #[test]
    fn single_reason_is_unformatted() {
        let per_rule = vec![rule_flags("High Amount", "Review", &[(0, "1")])];
        let out = aggregate(&table(), &per_rule).unwrap();
        let FlagOutcome::Flagged(flagged) = out else {
            panic!("expected flagged outcome");
        };
        assert_eq!(
            flagged.table.get(0, "Reason"),
            &Value::Text("High Amount".into())
        );
        assert_eq!(
            flagged.table.get(0, "Action"),
            &Value::Text("Review".into())
        );
    }

    #[test]
    fn multiple_reasons_become_numbered_list_in_first_occurrence_order() {
        let per_rule = vec![
            rule_flags("High Amount", "Review", &[(0, "1")]),
            rule_flags("US Customer", "Verify", &[(1, "1")]),
        ];
        let out = aggregate(&table(), &per_rule).unwrap();
        let FlagOutcome::Flagged(flagged) = out else {
            panic!("expected flagged outcome");
        };
        assert_eq!(
            flagged.table.get(0, "Reason"),
            &Value::Text("1. High Amount\n2. US Customer".into())
        );
        assert_eq!(
            flagged.table.get(1, "Action"),
            &Value::Text("1. Review\n2. Verify".into())
        );
    }

    #[test]
    fn duplicate_reasons_collapse() {
        // same rule hits two transactions of the same customer
        let per_rule = vec![rule_flags("High Amount", "Review", &[(0, "1"), (1, "1")])];
        let out = aggregate(&table(), &per_rule).unwrap();
        let FlagOutcome::Flagged(flagged) = out else {
            panic!("expected flagged outcome");
        };
        assert_eq!(
            flagged.table.get(0, "Reason"),
            &Value::Text("High Amount".into())
        );
        assert_eq!(
            flagged.table.get(1, "Reason"),
            &Value::Text("High Amount".into())
        );
    }

    #[test]
    fn one_output_row_per_input_row_and_unflagged_rows_are_null() {
        let per_rule = vec![rule_flags("High Amount", "Review", &[(0, "1")])];
        let t = table();
        let out = aggregate(&t, &per_rule).unwrap();
        let FlagOutcome::Flagged(flagged) = out else {
            panic!("expected flagged outcome");
        };
        assert_eq!(flagged.table.len(), t.len());
        // customer 1 owns two rows, both carry the flag
        assert!(!flagged.table.get(1, "Reason").is_null());
        // customer 2 matched nothing
        assert!(flagged.table.get(2, "Reason").is_null());
        assert!(flagged.table.get(2, "Action").is_null());
    }

    #[test]
    fn no_flags_yields_explicit_nothing_flagged() {
        let out = aggregate(&table(), &[]).unwrap();
        assert_eq!(out, FlagOutcome::NothingFlagged);

        let empty_rule = vec![rule_flags("High Amount", "Review", &[])];
        let out = aggregate(&table(), &empty_rule).unwrap();
        assert_eq!(out, FlagOutcome::NothingFlagged);
    }

    #[test]
    fn aggregation_is_idempotent() {
        let per_rule = vec![
            rule_flags("High Amount", "Review", &[(0, "1"), (1, "1")]),
            rule_flags("US Customer", "Verify", &[(1, "1")]),
        ];
        let t = table();
        let first = aggregate(&t, &per_rule).unwrap();
        let second = aggregate(&t, &per_rule).unwrap();
        assert_eq!(first, second);
    }
}
