//! regwatch-runner: headless pipeline runner.
//!
//! Usage:
//!   regwatch-runner --table transactions.json --rules generated_rules.json
//!   regwatch-runner --table transactions.json --rules rules.json \
//!       --config engine.json --seed 12345 --out-dir ./results

use anyhow::Result;
use regwatch_core::{
    aggregator::FlagOutcome, config::EngineConfig, pipeline::Pipeline, rule::RulesDocument,
    table::Table,
};
use std::env;
use std::path::PathBuf;

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let table_path = required_arg(&args, "--table")?;
    let rules_path = required_arg(&args, "--rules")?;
    let config_path = optional_arg(&args, "--config");
    let seed = optional_arg(&args, "--seed");
    let out_dir: PathBuf = optional_arg(&args, "--out-dir")
        .unwrap_or_else(|| "./results".into())
        .into();

    let mut config = match config_path {
        Some(path) => EngineConfig::load(&path)?,
        None => EngineConfig::default(),
    };
    if let Some(seed) = seed {
        config.score.base_score_seed = seed.parse()?;
    }

    println!("regwatch — pipeline runner");
    println!("  table:   {table_path}");
    println!("  rules:   {rules_path}");
    println!("  seed:    {}", config.score.base_score_seed);
    println!("  out_dir: {}", out_dir.display());
    println!();

    let table_raw = std::fs::read_to_string(&table_path)
        .map_err(|e| anyhow::anyhow!("Cannot read {table_path}: {e}"))?;
    let table = Table::from_records(&serde_json::from_str(&table_raw)?)?;

    let rules_raw = std::fs::read_to_string(&rules_path)
        .map_err(|e| anyhow::anyhow!("Cannot read {rules_path}: {e}"))?;
    let rules: RulesDocument = serde_json::from_str(&rules_raw)?;

    let pipeline = Pipeline::new(config);
    let report = pipeline.run(&table, &rules)?;
    pipeline.persist_artifacts(&report, &rules, &out_dir)?;

    print_summary(&report, table.len());
    Ok(())
}

fn print_summary(report: &regwatch_core::pipeline::RunReport, rows: usize) {
    println!("run {} finished", report.run_id);
    println!("  rows:          {rows}");
    match &report.flags {
        FlagOutcome::Flagged(f) => {
            println!("  flagged:       {} customers", f.flagged_customers);
        }
        FlagOutcome::NothingFlagged => {
            println!("  flagged:       nothing");
        }
    }
    println!("  skipped rules: {}", report.skipped_rules.len());
    for issue in &report.skipped_rules {
        println!(
            "    - rule {} ({}): {}",
            issue.index,
            issue.name.as_deref().unwrap_or("unnamed"),
            issue.reason
        );
    }
    for sub in &report.substitutions {
        println!("    - rule '{}' rebound {} -> {}", sub.rule, sub.from, sub.to);
    }
    for failure in &report.stage_failures {
        println!("  stage failure: {} ({})", failure.stage, failure.reason);
    }
}

fn required_arg(args: &[String], key: &str) -> Result<String> {
    optional_arg(args, key).ok_or_else(|| anyhow::anyhow!("missing required argument {key}"))
}

fn optional_arg(args: &[String], key: &str) -> Option<String> {
    args.windows(2).find(|w| w[0] == key).map(|w| w[1].clone())
}
