//! Anomaly-scoring collaborator contract.
//!
//! The collaborator (an isolation-forest estimator in the reference
//! deployment) labels each row -1 (outlier) or 1 (inlier). The engine
//! does not train or run the model; it only validates the labels and
//! merges them as one extra column, preserving row count and row order.

use crate::{
    error::{EngineError, EngineResult},
    table::{Table, Value},
    types::COL_ANOMALY_SCORE,
};

/// Black-box per-row outlier labeler. One label per row, in row order.
pub trait AnomalyScorer {
    fn score(&self, table: &Table) -> anyhow::Result<Vec<i8>>;
}

/// Attach collaborator labels as the `anomaly_score` column. Rejects
/// label vectors that are misaligned or outside {-1, 1}.
pub fn merge_anomaly_scores(table: &Table, labels: &[i8]) -> EngineResult<Table> {
    if labels.len() != table.len() {
        return Err(EngineError::Upstream {
            collaborator: "anomaly_scorer",
            reason: format!(
                "{} labels for {} rows",
                labels.len(),
                table.len()
            ),
        });
    }
    if let Some(bad) = labels.iter().find(|l| **l != -1 && **l != 1) {
        return Err(EngineError::Upstream {
            collaborator: "anomaly_scorer",
            reason: format!("label {bad} outside {{-1, 1}}"),
        });
    }

    let cells = labels.iter().map(|l| Value::Number(*l as f64)).collect();
    table.with_column(COL_ANOMALY_SCORE, cells)
}

/// Test double labeling every row as an inlier.
pub struct ConstantScorer;

impl AnomalyScorer for ConstantScorer {
    fn score(&self, table: &Table) -> anyhow::Result<Vec<i8>> {
        Ok(vec![1; table.len()])
    }
}
