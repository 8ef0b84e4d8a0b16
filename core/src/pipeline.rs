//! Pipeline coordinator.
//!
//! STAGE ORDER (fixed, documented, never reordered):
//!   1. validate_table — required-column schema check (fatal on miss)
//!   2. load_rules     — per-rule validation, skip-and-report
//!   3. evaluate       — one pass per rule, per-rule failure isolation
//!   4. aggregate      — single-threaded global merge
//!   5. score          — chunked-map/ordered-reduce over the original table
//!
//! The coordinator holds no business logic: it sequences the pure
//! stages, wraps failures with the stage name, and owns the only I/O in
//! the crate (artifact persistence, fully overwritten per run).

use crate::{
    aggregator::{aggregate, FlagOutcome},
    anomaly::{merge_anomaly_scores, AnomalyScorer},
    config::EngineConfig,
    drafter::{draft_with_retry, RuleDrafter},
    error::{EngineError, EngineResult},
    evaluator::evaluate_rules,
    rule::{load_rules, FieldSubstitution, RuleIssue, RulesDocument},
    scorer::score_chunked,
    table::Table,
    types::{RunId, REQUIRED_COLUMNS},
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;

pub const FLAGGED_ARTIFACT: &str = "flagged_transactions.json";
pub const RULES_ARTIFACT: &str = "generated_rules.json";

/// A stage-scoped, non-fatal failure (upstream collaborators only; core
/// stage failures abort the run instead).
#[derive(Debug, Clone, Serialize)]
pub struct StageFailure {
    pub stage: &'static str,
    pub reason: String,
}

/// Everything one pipeline execution produced.
#[derive(Debug)]
pub struct RunReport {
    pub run_id: RunId,
    pub started_at: DateTime<Utc>,
    pub flags: FlagOutcome,
    pub scored: Table,
    pub skipped_rules: Vec<RuleIssue>,
    pub substitutions: Vec<FieldSubstitution>,
    pub stage_failures: Vec<StageFailure>,
}

pub struct Pipeline {
    config: EngineConfig,
}

impl Pipeline {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run flagging and scoring over a table and a drafted rule document.
    pub fn run(&self, table: &Table, doc: &RulesDocument) -> EngineResult<RunReport> {
        let run_id = uuid::Uuid::new_v4().to_string();
        let started_at = Utc::now();
        log::info!("run {run_id}: {} rows, {} raw rules", table.len(), doc.rules.len());

        // An empty table has nothing to validate, flag, or score.
        if table.is_empty() {
            return Ok(RunReport {
                run_id,
                started_at,
                flags: FlagOutcome::NothingFlagged,
                scored: table.clone(),
                skipped_rules: Vec::new(),
                substitutions: Vec::new(),
                stage_failures: Vec::new(),
            });
        }

        table
            .require_columns(REQUIRED_COLUMNS)
            .map_err(|e| e.in_stage("validate_table"))?;

        let loaded = load_rules(doc, table.columns(), &self.config.unknown_field_policy);
        let eval = evaluate_rules(table, &loaded.rules);

        let flags = aggregate(table, &eval.per_rule).map_err(|e| e.in_stage("aggregate"))?;

        // Risk scoring runs on the original (unflagged) table.
        let scored = score_chunked(table, &self.config.score, &self.config.chunk)
            .map_err(|e| e.in_stage("score"))?;

        let mut skipped_rules = loaded.skipped;
        skipped_rules.extend(eval.skipped);

        Ok(RunReport {
            run_id,
            started_at,
            flags,
            scored,
            skipped_rules,
            substitutions: loaded.substitutions,
            stage_failures: Vec::new(),
        })
    }

    /// Like `run`, but the rule document comes from the drafting
    /// collaborator. Drafter failure is recorded as a stage failure and
    /// the run continues with an empty rule list (scoring still runs).
    pub fn run_drafted(
        &self,
        table: &Table,
        drafter: &dyn RuleDrafter,
        prompt: &str,
    ) -> EngineResult<RunReport> {
        let (doc, draft_failure) = match draft_with_retry(drafter, prompt, &self.config.retry) {
            Ok(doc) => (doc, None),
            Err(err) => {
                log::warn!("rule drafting failed, continuing unflagged: {err}");
                (
                    RulesDocument::default(),
                    Some(StageFailure {
                        stage: "draft_rules",
                        reason: err.to_string(),
                    }),
                )
            }
        };

        let mut report = self.run(table, &doc)?;
        report.stage_failures.extend(draft_failure);
        Ok(report)
    }

    /// Attach collaborator anomaly labels to the scored table. Failure
    /// degrades gracefully: the report keeps its scores and records the
    /// stage failure.
    pub fn attach_anomaly_scores(&self, report: &mut RunReport, scorer: &dyn AnomalyScorer) {
        let merged = scorer
            .score(&report.scored)
            .map_err(|e| EngineError::Upstream {
                collaborator: "anomaly_scorer",
                reason: e.to_string(),
            })
            .and_then(|labels| merge_anomaly_scores(&report.scored, &labels));

        match merged {
            Ok(table) => report.scored = table,
            Err(err) => {
                log::warn!("anomaly scoring failed, keeping unlabeled scores: {err}");
                report.stage_failures.push(StageFailure {
                    stage: "anomaly_score",
                    reason: err.to_string(),
                });
            }
        }
    }

    /// Persist the two per-run artifacts, overwriting any previous run.
    pub fn persist_artifacts(
        &self,
        report: &RunReport,
        rules: &RulesDocument,
        out_dir: &Path,
    ) -> EngineResult<()> {
        std::fs::create_dir_all(out_dir)?;

        let flagged = match &report.flags {
            FlagOutcome::Flagged(f) => serde_json::json!({
                "run_id": report.run_id,
                "flagged": true,
                "flagged_customers": f.flagged_customers,
                "transactions": f.table.to_json_records(),
            }),
            FlagOutcome::NothingFlagged => serde_json::json!({
                "run_id": report.run_id,
                "flagged": false,
                "transactions": [],
            }),
        };
        std::fs::write(
            out_dir.join(FLAGGED_ARTIFACT),
            serde_json::to_string_pretty(&flagged)?,
        )?;

        std::fs::write(
            out_dir.join(RULES_ARTIFACT),
            serde_json::to_string_pretty(rules)?,
        )?;

        log::info!(
            "run {}: artifacts written to {}",
            report.run_id,
            out_dir.display()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::FlagOutcome;
    use crate::drafter::CannedDrafter;
    use crate::table::Value;
    use serde_json::json;

    fn table() -> Table {
        Table::from_records(&json!([
            {"Customer_ID": 1, "Transaction_Amount": 100, "Reported_Amount": 100,
             "Account_Balance": 500, "Country": "US", "Risk_Score": 2},
            {"Customer_ID": 2, "Transaction_Amount": 200, "Reported_Amount": 200,
             "Account_Balance": 500, "Country": "US", "Risk_Score": 2},
        ]))
        .unwrap()
    }

    fn doc(rules: serde_json::Value) -> RulesDocument {
        serde_json::from_value(json!({ "rules": rules })).unwrap()
    }

    fn pipeline() -> Pipeline {
        Pipeline::new(EngineConfig::default_test())
    }

    #[test]
    fn end_to_end_flags_matching_rows_only() {
        let doc = doc(json!([
            {"name": "High Amount", "field": "Transaction_Amount", "operator": ">",
             "value": 150, "action": "Review"},
        ]));
        let report = pipeline().run(&table(), &doc).unwrap();

        let FlagOutcome::Flagged(flagged) = &report.flags else {
            panic!("expected flags");
        };
        assert_eq!(flagged.table.len(), 2);
        assert!(flagged.table.get(0, "Reason").is_null());
        assert_eq!(
            flagged.table.get(1, "Reason"),
            &Value::Text("High Amount".into())
        );
        assert_eq!(report.scored.len(), 2);
        assert!(report.scored.has_column("Risk_Score_Adjusted"));
    }

    #[test]
    fn empty_rule_list_signals_nothing_flagged_not_an_error() {
        let report = pipeline().run(&table(), &RulesDocument::default()).unwrap();
        assert_eq!(report.flags, FlagOutcome::NothingFlagged);
        // scoring still ran
        assert!(report.scored.has_column("Risk_Score_Adjusted"));
    }

    #[test]
    fn bad_rule_is_skipped_while_valid_rules_still_flag() {
        let doc = doc(json!([
            {"name": "Ghost", "field": "No_Such_Column", "operator": ">",
             "value": 1, "action": "Review"},
            {"name": "High Amount", "field": "Transaction_Amount", "operator": ">",
             "value": 150, "action": "Review"},
            {"name": "US Customer", "field": "Country", "operator": "==",
             "value": "US", "action": "Verify"},
        ]));
        let report = pipeline().run(&table(), &doc).unwrap();

        assert_eq!(report.skipped_rules.len(), 1);
        assert_eq!(report.skipped_rules[0].name.as_deref(), Some("Ghost"));

        let FlagOutcome::Flagged(flagged) = &report.flags else {
            panic!("expected flags");
        };
        // customer 2 matched both surviving rules
        assert_eq!(
            flagged.table.get(1, "Reason"),
            &Value::Text("1. High Amount\n2. US Customer".into())
        );
    }

    #[test]
    fn missing_required_column_is_fatal_and_stage_scoped() {
        let bad = Table::from_records(&json!([
            {"Customer_ID": 1, "Transaction_Amount": 100},
        ]))
        .unwrap();
        let err = pipeline().run(&bad, &RulesDocument::default()).unwrap_err();
        match err {
            EngineError::Stage { stage, .. } => assert_eq!(stage, "validate_table"),
            other => panic!("expected stage failure, got {other:?}"),
        }
    }

    #[test]
    fn empty_table_returns_nothing_flagged() {
        let empty = Table::from_records(&json!([])).unwrap();
        let report = pipeline().run(&empty, &RulesDocument::default()).unwrap();
        assert_eq!(report.flags, FlagOutcome::NothingFlagged);
        assert!(report.scored.is_empty());
    }

    #[test]
    fn repeated_runs_are_deterministic() {
        let doc = doc(json!([
            {"name": "High Amount", "field": "Transaction_Amount", "operator": ">",
             "value": 150, "action": "Review"},
        ]));
        let p = pipeline();
        let a = p.run(&table(), &doc).unwrap();
        let b = p.run(&table(), &doc).unwrap();
        assert_eq!(a.flags, b.flags);
        assert_eq!(a.scored, b.scored);
    }

    #[test]
    fn drafter_failure_degrades_to_unflagged_run() {
        let drafter =
            CannedDrafter::new(RulesDocument::default()).failing_first(10);
        let mut config = EngineConfig::default_test();
        config.retry.initial_backoff_ms = 0;
        let p = Pipeline::new(config);

        let report = p.run_drafted(&table(), &drafter, "draft rules").unwrap();
        assert_eq!(report.flags, FlagOutcome::NothingFlagged);
        assert_eq!(report.stage_failures.len(), 1);
        assert_eq!(report.stage_failures[0].stage, "draft_rules");
        // scoring still ran on valid input
        assert!(report.scored.has_column("Risk_Score_Adjusted"));
    }

    #[test]
    fn anomaly_labels_merge_without_disturbing_rows() {
        let p = pipeline();
        let mut report = p.run(&table(), &RulesDocument::default()).unwrap();
        p.attach_anomaly_scores(&mut report, &crate::anomaly::ConstantScorer);
        assert!(report.stage_failures.is_empty());
        assert_eq!(report.scored.len(), 2);
        assert_eq!(report.scored.get(0, "anomaly_score").as_number(), Some(1.0));
    }

    #[test]
    fn anomaly_failure_keeps_scores_and_records_stage() {
        struct Broken;
        impl AnomalyScorer for Broken {
            fn score(&self, _table: &Table) -> anyhow::Result<Vec<i8>> {
                anyhow::bail!("estimator unavailable")
            }
        }
        let p = pipeline();
        let mut report = p.run(&table(), &RulesDocument::default()).unwrap();
        p.attach_anomaly_scores(&mut report, &Broken);
        assert_eq!(report.stage_failures.len(), 1);
        assert_eq!(report.stage_failures[0].stage, "anomaly_score");
        assert!(report.scored.has_column("Risk_Score_Adjusted"));
        assert!(!report.scored.has_column("anomaly_score"));
    }

    #[test]
    fn artifacts_are_overwritten_per_run() {
        let dir = std::env::temp_dir().join(format!("regwatch-test-{}", uuid::Uuid::new_v4()));
        let doc = doc(json!([
            {"name": "High Amount", "field": "Transaction_Amount", "operator": ">",
             "value": 150, "action": "Review"},
        ]));
        let p = pipeline();

        let report = p.run(&table(), &doc).unwrap();
        p.persist_artifacts(&report, &doc, &dir).unwrap();
        let first = std::fs::read_to_string(dir.join(FLAGGED_ARTIFACT)).unwrap();
        assert!(first.contains("\"flagged\": true"));

        // second run with no rules fully replaces the artifact
        let report = p.run(&table(), &RulesDocument::default()).unwrap();
        p.persist_artifacts(&report, &RulesDocument::default(), &dir)
            .unwrap();
        let second = std::fs::read_to_string(dir.join(FLAGGED_ARTIFACT)).unwrap();
        assert!(second.contains("\"flagged\": false"));
        assert!(!second.contains("High Amount"));

        std::fs::remove_dir_all(&dir).ok();
    }
}
