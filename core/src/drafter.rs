//! Rule-drafting collaborator contract.
//!
//! The drafter is a black box (in production, a hosted language model)
//! that turns a prompt into a RulesDocument. Its only interesting
//! contract is retry-on-malformed-output, and that retry is bounded:
//! a fixed maximum attempt count with exponential backoff, ending in a
//! terminal Upstream failure. Malformed individual rules inside an
//! otherwise-parseable document are the loader's job, not the drafter's.

use crate::{
    config::RetryPolicy,
    error::{EngineError, EngineResult},
    rule::RulesDocument,
};
use std::time::Duration;

/// Black-box rule drafter. Implementations may do network I/O; the
/// engine only sees the parsed document or the error.
pub trait RuleDrafter {
    fn draft(&self, prompt: &str) -> anyhow::Result<RulesDocument>;
}

/// Call the drafter with bounded retry. Backoff doubles per attempt
/// starting from `initial_backoff_ms`; after `max_attempts` failures
/// the terminal error carries the last failure reason.
pub fn draft_with_retry(
    drafter: &dyn RuleDrafter,
    prompt: &str,
    policy: &RetryPolicy,
) -> EngineResult<RulesDocument> {
    let attempts = policy.max_attempts.max(1);
    let mut backoff = Duration::from_millis(policy.initial_backoff_ms);
    let mut last_error = String::new();

    for attempt in 1..=attempts {
        match drafter.draft(prompt) {
            Ok(doc) => {
                log::info!(
                    "drafter produced {} raw rules on attempt {attempt}",
                    doc.rules.len()
                );
                return Ok(doc);
            }
            Err(err) => {
                log::warn!("drafter attempt {attempt}/{attempts} failed: {err}");
                last_error = err.to_string();
                if attempt < attempts {
                    std::thread::sleep(backoff);
                    backoff *= 2;
                }
            }
        }
    }

    Err(EngineError::Upstream {
        collaborator: "rule_drafter",
        reason: format!("gave up after {attempts} attempts: {last_error}"),
    })
}

/// Test double: returns a fixed document, optionally failing the first
/// few calls to exercise the retry path.
pub struct CannedDrafter {
    document: RulesDocument,
    failures_before_success: std::cell::Cell<u32>,
}

impl CannedDrafter {
    pub fn new(document: RulesDocument) -> Self {
        Self {
            document,
            failures_before_success: std::cell::Cell::new(0),
        }
    }

    pub fn failing_first(mut self, failures: u32) -> Self {
        self.failures_before_success = std::cell::Cell::new(failures);
        self
    }
}

impl RuleDrafter for CannedDrafter {
    fn draft(&self, _prompt: &str) -> anyhow::Result<RulesDocument> {
        let remaining = self.failures_before_success.get();
        if remaining > 0 {
            self.failures_before_success.set(remaining - 1);
            anyhow::bail!("malformed model output");
        }
        Ok(self.document.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_backoff_ms: 0,
        }
    }

    fn canned_doc() -> RulesDocument {
        serde_json::from_str(
            r#"{"rules": [{"name": "High Amount", "field": "Transaction_Amount",
                "operator": ">", "value": 150, "action": "Review"}]}"#,
        )
        .unwrap()
    }

    #[test]
    fn succeeds_first_try() {
        let drafter = CannedDrafter::new(canned_doc());
        let doc = draft_with_retry(&drafter, "draft rules", &fast_policy(3)).unwrap();
        assert_eq!(doc.rules.len(), 1);
    }

    #[test]
    fn retries_through_malformed_output() {
        let drafter = CannedDrafter::new(canned_doc()).failing_first(2);
        let doc = draft_with_retry(&drafter, "draft rules", &fast_policy(3)).unwrap();
        assert_eq!(doc.rules.len(), 1);
    }

    #[test]
    fn exhausted_retries_end_in_terminal_upstream_failure() {
        let drafter = CannedDrafter::new(canned_doc()).failing_first(5);
        let err = draft_with_retry(&drafter, "draft rules", &fast_policy(3)).unwrap_err();
        match err {
            EngineError::Upstream { collaborator, reason } => {
                assert_eq!(collaborator, "rule_drafter");
                assert!(reason.contains("3 attempts"));
            }
            other => panic!("expected Upstream, got {other:?}"),
        }
    }
}
