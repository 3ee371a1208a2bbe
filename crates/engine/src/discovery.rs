//! Candidate discovery: scan every registered pattern over a recent window
//!
//! The classic patterns and the generated positional and memory families are
//! backtested independently on the rayon pool against the same read-only,
//! pre-computed window. Results are merged, then deduplicated on a single
//! thread against the names already in the registry and against each other.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{AdjustedRateConfig, BacktestConfig, EngineConfig, ScannerConfig};
use crate::digits::PredictedPair;
use crate::engine::{usable_draws, BacktestEngine, PreparedHistory};
use crate::error::EngineResult;
use crate::normalize::normalize_name;
use crate::registry::{all_specs, PatternSpec};
use crate::store::{DrawHistory, PatternRegistry};
use crate::types::*;

/// A pattern currently on a hit streak, not yet in the registry
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    pub pattern_id: String,
    pub name: String,
    /// Dedup key, see [`normalize_name`]
    pub normalized_name: String,
    pub description: String,
    pub kind: PatternKind,
    pub family: PatternFamily,
    pub metrics: PerformanceMetrics,
    pub rates: PatternRates,
    pub current_streak: i32,
    /// Prediction for the period after the newest scanned draw
    pub next_prediction: PredictedPair,
}

impl Candidate {
    /// A pending registry entry for this candidate
    pub fn to_managed(&self, now: DateTime<Utc>) -> ManagedPattern {
        ManagedPattern {
            id: None,
            pattern_id: self.pattern_id.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            kind: self.kind,
            state: PatternState::Pending,
            rates: self.rates.clone(),
            current_streak: self.current_streak,
            wins10: self.metrics.wins10,
            max_lose_streak: self.metrics.max_lose_streak,
            next_prediction: self.next_prediction.joined(),
            date_added: now,
            disabled_at: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScanOutcome {
    pub new_candidates: Vec<Candidate>,
    /// Patterns meeting the streak minimum, before dedup
    pub found_total: usize,
    /// Dropped because the registry already has the name
    pub excluded_existing: usize,
    /// Dropped because an earlier pattern in this scan had the same key
    pub duplicates_in_batch: usize,
    /// Draws actually scanned
    pub scan_depth: usize,
}

fn evaluate(
    spec: &PatternSpec,
    window: &PreparedHistory<'_>,
    newest: &DrawRecord,
    min_streak: u32,
    backtest: &BacktestConfig,
) -> Option<Candidate> {
    let result = BacktestEngine::replay(spec, window, backtest);
    if result.metrics.streak < min_streak {
        return None;
    }

    let next_prediction = spec.predict(newest);
    Some(Candidate {
        pattern_id: spec.id.to_string(),
        name: spec.name.to_string(),
        normalized_name: normalize_name(&spec.name),
        description: spec.describe(&next_prediction),
        kind: spec.kind,
        family: spec.family,
        metrics: result.metrics,
        rates: result.rates,
        current_streak: result.current_streak,
        next_prediction,
    })
}

/// Drop candidates whose key is already registered or was seen earlier in `found`
fn dedup(found: Vec<Candidate>, existing_names: &[String], outcome: &mut ScanOutcome) {
    let existing: HashSet<String> = existing_names.iter().map(|n| normalize_name(n)).collect();
    let mut seen: HashSet<String> = HashSet::new();
    outcome.found_total = found.len();

    for candidate in found {
        if existing.contains(&candidate.normalized_name) {
            outcome.excluded_existing += 1;
        } else if !seen.insert(candidate.normalized_name.clone()) {
            debug!(name = %candidate.name, "Duplicate candidate in batch");
            outcome.duplicates_in_batch += 1;
        } else {
            outcome.new_candidates.push(candidate);
        }
    }
}

/// Scan the configured pattern families over the most recent `lookback_depth` draws
pub fn scan_candidates(
    history: &[DrawRecord],
    existing_names: &[String],
    config: &ScannerConfig,
    rates: &AdjustedRateConfig,
) -> ScanOutcome {
    let usable: Vec<DrawRecord> = usable_draws(history, None, None)
        .into_iter()
        .cloned()
        .collect();

    if usable.len() < 2 {
        warn!(draws = usable.len(), "Not enough draw history to scan");
        return ScanOutcome {
            scan_depth: usable.len(),
            ..Default::default()
        };
    }

    if usable.len() < config.lookback_depth {
        warn!(
            available = usable.len(),
            lookback = config.lookback_depth,
            "History shorter than lookback depth, scanning what is available"
        );
    }

    let window = PreparedHistory::new(
        &usable[usable.len().saturating_sub(config.lookback_depth)..],
        None,
        None,
    );
    let Some(newest) = window.newest() else {
        return ScanOutcome::default();
    };
    let backtest = BacktestConfig {
        rates: rates.clone(),
        ..Default::default()
    };

    let specs: Vec<&PatternSpec> = all_specs()
        .iter()
        .filter(|spec| config.families.contains(&spec.family))
        .collect();
    debug!(patterns = specs.len(), families = ?config.families, "Scanning patterns");

    let found: Vec<Candidate> = specs
        .par_iter()
        .filter_map(|spec| evaluate(spec, &window, newest, config.min_streak, &backtest))
        .collect();

    let mut outcome = ScanOutcome {
        scan_depth: window.len(),
        ..Default::default()
    };
    dedup(found, existing_names, &mut outcome);

    info!(
        depth = outcome.scan_depth,
        patterns = specs.len(),
        found = outcome.found_total,
        new = outcome.new_candidates.len(),
        excluded = outcome.excluded_existing,
        duplicates = outcome.duplicates_in_batch,
        "Candidate scan complete"
    );

    outcome
}

/// Fetch the lookback window and registry names, then scan
pub async fn scan_from_store<S>(store: &S, config: &EngineConfig) -> EngineResult<ScanOutcome>
where
    S: DrawHistory + PatternRegistry,
{
    let history = store.recent_draws(config.scanner.lookback_depth).await?;
    let existing = store.existing_names().await?;
    Ok(scan_candidates(
        &history,
        &existing,
        &config.scanner,
        &config.rates,
    ))
}

/// Store candidates as pending patterns. Returns how many were new.
pub async fn import_candidates<R>(
    registry: &R,
    candidates: &[Candidate],
    now: DateTime<Utc>,
) -> EngineResult<usize>
where
    R: PatternRegistry + ?Sized,
{
    if candidates.is_empty() {
        return Ok(0);
    }

    let patterns: Vec<ManagedPattern> = candidates.iter().map(|c| c.to_managed(now)).collect();
    let inserted = registry.bulk_insert(&patterns).await?;

    info!(
        requested = candidates.len(),
        inserted,
        "Imported candidates as pending"
    );

    Ok(inserted)
}
