//! Risk scoring: bounded base score plus independent additive signals.
//!
//! Signals (all independent, all additive, evaluated per row):
//!   - large transaction   Transaction_Amount > threshold   (+2)
//!   - negative balance    Account_Balance < 0              (+3)
//!   - reporting mismatch  Transaction_Amount != Reported   (+1.5)
//!   - watch-list country  Country in configured list       (+4)
//! Final score is clamped to [1, 10].
//!
//! Base-score synthesis is the only randomness and runs sequentially
//! under a seeded stream. The adjustment is a pure row transform with no
//! cross-row state, so the chunked mode shards rows across a fixed-size
//! worker pool and concatenates in chunk order, bit-identical to the
//! serial pass.

use crate::{
    config::{ChunkConfig, ScoreConfig},
    error::{EngineError, EngineResult},
    rng::ScoreRng,
    table::{Table, Value},
    types::{
        COL_ACCOUNT_BALANCE, COL_COUNTRY, COL_REPORTED_AMOUNT, COL_RISK_SCORE,
        COL_RISK_SCORE_ADJUSTED, COL_TRANSACTION_AMOUNT,
    },
};

const SCORE_MIN: f64 = 1.0;
const SCORE_MAX: f64 = 10.0;

/// Ensure every row carries a numeric base Risk_Score. Missing or
/// unparseable cells are synthesized from the seeded stream in row
/// order, so the result is fixed by the seed.
pub fn ensure_base_scores(table: &Table, rng: &mut ScoreRng) -> EngineResult<Table> {
    let mut synthesized = 0usize;
    let scores: Vec<Value> = (0..table.len())
        .map(|row| match table.get(row, COL_RISK_SCORE).as_number() {
            Some(score) => Value::Number(score),
            None => {
                synthesized += 1;
                Value::Number(rng.uniform_base_score())
            }
        })
        .collect();

    if synthesized > 0 {
        log::info!("synthesized base risk scores for {synthesized} rows");
    }
    table.with_column(COL_RISK_SCORE, scores)
}

/// Evaluate the signal sum for one row. No cross-row state.
fn signal_sum(table: &Table, row: usize, config: &ScoreConfig) -> f64 {
    let mut added = 0.0;

    let amount = table.get(row, COL_TRANSACTION_AMOUNT).as_number();
    if let Some(a) = amount {
        if a > config.large_txn_threshold {
            added += config.large_txn_weight;
        }
    }

    if let Some(balance) = table.get(row, COL_ACCOUNT_BALANCE).as_number() {
        if balance < 0.0 {
            added += config.negative_balance_weight;
        }
    }

    let reported = table.get(row, COL_REPORTED_AMOUNT).as_number();
    if let (Some(a), Some(r)) = (amount, reported) {
        if a != r {
            added += config.mismatch_weight;
        }
    }

    let country = table.get(row, COL_COUNTRY).to_string();
    if config.watchlist.iter().any(|c| c == &country) {
        added += config.watchlist_weight;
    }

    added
}

/// Pure adjustment pass: Risk_Score_Adjusted = clamp(base + signals).
/// Requires base scores to be present (see `ensure_base_scores`).
pub fn adjust(table: &Table, config: &ScoreConfig) -> EngineResult<Table> {
    let adjusted: Vec<Value> = (0..table.len())
        .map(|row| {
            let base = table
                .get(row, COL_RISK_SCORE)
                .as_number()
                .unwrap_or(SCORE_MIN);
            let score = (base + signal_sum(table, row, config)).clamp(SCORE_MIN, SCORE_MAX);
            Value::Number(score)
        })
        .collect();
    table.with_column(COL_RISK_SCORE_ADJUSTED, adjusted)
}

/// Serial scoring: base synthesis then adjustment.
pub fn score(table: &Table, config: &ScoreConfig) -> EngineResult<Table> {
    let mut rng = ScoreRng::new(config.base_score_seed);
    let based = ensure_base_scores(table, &mut rng)?;
    adjust(&based, config)
}

/// Chunked scoring for large tables: fixed-size row chunks mapped across
/// a bounded worker pool, results concatenated in chunk order.
pub fn score_chunked(
    table: &Table,
    config: &ScoreConfig,
    chunk: &ChunkConfig,
) -> EngineResult<Table> {
    let mut rng = ScoreRng::new(config.base_score_seed);
    let based = ensure_base_scores(table, &mut rng)?;

    let chunk_size = chunk.chunk_size.max(1);
    let workers = chunk.workers.max(1);
    if based.len() <= chunk_size {
        return adjust(&based, config);
    }

    let shards: Vec<Table> = (0..based.len())
        .step_by(chunk_size)
        .map(|start| based.slice(start, start + chunk_size))
        .collect();
    let n = shards.len();
    log::info!("scoring {} rows in {n} chunks of {chunk_size}", based.len());

    let mut results: Vec<Option<EngineResult<Table>>> = Vec::with_capacity(n);
    results.resize_with(n, || None);

    // Waves of at most `workers` scoped threads; slot order preserves
    // chunk order regardless of completion order.
    let indices: Vec<usize> = (0..n).collect();
    for wave in indices.chunks(workers) {
        std::thread::scope(|scope| {
            let mut handles = Vec::with_capacity(wave.len());
            for &ix in wave {
                let shard = &shards[ix];
                handles.push((ix, scope.spawn(move || adjust(shard, config))));
            }
            for (ix, handle) in handles {
                results[ix] = Some(match handle.join() {
                    Ok(res) => res,
                    Err(_) => Err(EngineError::Other(anyhow::anyhow!(
                        "scoring worker for chunk {ix} panicked"
                    ))),
                });
            }
        });
    }

    let mut scored_shards = Vec::with_capacity(n);
    let mut columns = based.columns().to_vec();
    if !columns.iter().any(|c| c == COL_RISK_SCORE_ADJUSTED) {
        columns.push(COL_RISK_SCORE_ADJUSTED.to_string());
    }
    for slot in results {
        match slot {
            Some(Ok(shard)) => scored_shards.push(shard),
            Some(Err(err)) => return Err(err),
            None => {
                return Err(EngineError::Other(anyhow::anyhow!(
                    "scoring chunk never completed"
                )))
            }
        }
    }

    let out = Table::concat(columns, scored_shards);
    debug_assert_eq!(out.len(), table.len());
    Ok(out)
}
