//! regwatch-core: rule validation, transaction flagging, and risk scoring.
//!
//! The engine ingests a transaction table and a drafted rule document,
//! determines which rules each customer violates and why, and derives a
//! bounded risk score per row. Everything here is a pure, deterministic
//! transform; the only I/O lives in the pipeline coordinator (artifact
//! persistence) and behind the collaborator traits.
//!
//! Data flows one way:
//!   raw table + rule list → per-rule flags → flagged table
//!   raw table → risk-scored table (+ optional anomaly labels)

pub mod aggregator;
pub mod anomaly;
pub mod config;
pub mod drafter;
pub mod error;
pub mod evaluator;
pub mod pipeline;
pub mod rng;
pub mod rule;
pub mod scorer;
pub mod table;
pub mod types;
