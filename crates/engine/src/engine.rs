//! Period-by-period backtest simulator

use rayon::prelude::*;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::config::{AdjustedRateConfig, BacktestConfig};
use crate::hit::{classify, HitClassification};
use crate::metrics::{self, percentage};
use crate::numbers::NumberSet;
use crate::registry::{all_specs, find_spec, PatternSpec};
use crate::types::*;

/// Signed streak bookkeeping over a most-recent-last hit sequence
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreakStats {
    /// Positive while hits continue, negative while misses continue
    pub current: i32,
    pub max_win: u32,
    pub max_lose: u32,
}

impl StreakStats {
    /// Fold one more result into the stats
    pub fn push(self, hit: bool) -> Self {
        let current = match (hit, self.current) {
            (true, c) if c > 0 => c + 1,
            (true, _) => 1,
            (false, c) if c < 0 => c - 1,
            (false, _) => -1,
        };
        Self {
            current,
            max_win: self.max_win.max(current.max(0) as u32),
            max_lose: self.max_lose.max((-current).max(0) as u32),
        }
    }

    pub fn from_results(results_oldest_first: &[bool]) -> Self {
        results_oldest_first
            .iter()
            .fold(Self::default(), |stats, &hit| stats.push(hit))
    }
}

/// Real rate for the pattern's own category, adjusted by the configured factor
pub fn rates_for(kind: PatternKind, win_rate: Decimal, config: &AdjustedRateConfig) -> PatternRates {
    let adjust = |factor: Decimal| (win_rate * factor).min(Decimal::ONE_HUNDRED).round_dp(2);
    match kind.category {
        Category::Lo => PatternRates {
            real_lo: win_rate,
            adjusted_lo: adjust(config.lo_factor),
            ..Default::default()
        },
        Category::De => PatternRates {
            real_de: win_rate,
            adjusted_de: adjust(config.de_factor),
            ..Default::default()
        },
    }
}

/// Sort by period, drop duplicates, out-of-bounds and incomplete records
pub fn usable_draws<'a>(
    history: &'a [DrawRecord],
    start: Option<u32>,
    end: Option<u32>,
) -> Vec<&'a DrawRecord> {
    let mut draws: Vec<&DrawRecord> = history
        .iter()
        .filter(|d| start.map_or(true, |s| d.period >= s))
        .filter(|d| end.map_or(true, |e| d.period <= e))
        .collect();
    draws.sort_by_key(|d| d.period);
    draws.dedup_by_key(|d| d.period);

    let in_bounds = draws.len();
    draws.retain(|d| d.is_complete());
    if draws.len() < in_bounds {
        debug!(
            dropped = in_bounds - draws.len(),
            "Skipping draws without a special prize"
        );
    }

    draws
}

/// Usable draws with their number sets, computed once and shared by every
/// pattern replayed over the same window
pub struct PreparedHistory<'a> {
    draws: Vec<&'a DrawRecord>,
    sets: Vec<NumberSet>,
}

impl<'a> PreparedHistory<'a> {
    pub fn new(history: &'a [DrawRecord], start: Option<u32>, end: Option<u32>) -> Self {
        let draws = usable_draws(history, start, end);
        let sets = draws.iter().map(|d| NumberSet::from_draw(d)).collect();
        Self { draws, sets }
    }

    pub fn len(&self) -> usize {
        self.draws.len()
    }

    pub fn is_empty(&self) -> bool {
        self.draws.is_empty()
    }

    pub fn newest(&self) -> Option<&'a DrawRecord> {
        self.draws.last().copied()
    }
}

/// Backtesting engine that replays a pattern over consecutive draws
pub struct BacktestEngine;

impl BacktestEngine {
    /// Replay `spec` across `history`: predict from each draw, check against the next
    pub fn simulate(
        spec: &PatternSpec,
        history: &[DrawRecord],
        config: &BacktestConfig,
    ) -> BacktestResult {
        let prepared = PreparedHistory::new(history, config.start_period, config.end_period);
        Self::replay(spec, &prepared, config)
    }

    /// [`Self::simulate`] over draws already filtered and prepared.
    /// The period bounds of `config` are not applied again.
    pub fn replay(
        spec: &PatternSpec,
        prepared: &PreparedHistory<'_>,
        config: &BacktestConfig,
    ) -> BacktestResult {
        let draws = &prepared.draws;

        let mut result = BacktestResult {
            pattern_id: spec.id.to_string(),
            pattern_name: spec.name.to_string(),
            trace: config.trace.then(Vec::new),
            ..Default::default()
        };

        if draws.len() < 2 {
            debug!(pattern = %spec.id, usable = draws.len(), "Not enough draws to backtest");
            return result;
        }

        let mut hits: Vec<bool> = Vec::with_capacity(draws.len() - 1);

        for (i, window) in draws.windows(2).enumerate() {
            let (today, next) = (window[0], window[1]);
            let predicted = spec.predict(today);
            let classification = classify(predicted.as_slice(), &prepared.sets[i + 1]);

            if classification == HitClassification::Malformed {
                result.malformed += 1;
            }
            hits.push(classification.is_hit());

            if let Some(trace) = result.trace.as_mut() {
                trace.push(BacktestStep {
                    from_period: today.period,
                    to_period: next.period,
                    predicted: predicted.into_inner(),
                    classification,
                });
            }
        }

        let streaks = StreakStats::from_results(&hits);

        result.total_tests = hits.len() as u32;
        result.wins = hits.iter().filter(|&&h| h).count() as u32;
        result.losses = result.total_tests - result.wins;
        result.win_rate = percentage(result.wins, result.total_tests);
        result.current_streak = streaks.current;
        result.max_win_streak = streaks.max_win;
        result.max_lose_streak = streaks.max_lose;
        result.rates = rates_for(spec.kind, result.win_rate, &config.rates);

        hits.reverse();
        result.metrics = metrics::calculate(&hits);

        debug!(
            pattern = %spec.id,
            tests = result.total_tests,
            wins = result.wins,
            win_rate = %result.win_rate,
            streak = result.current_streak,
            "Simulated pattern"
        );

        result
    }

    /// Backtest one pattern by id. Unknown ids yield a zero-filled result.
    pub fn backtest_pattern(
        id: &str,
        history: &[DrawRecord],
        config: &BacktestConfig,
    ) -> BacktestResult {
        let Some(spec) = find_spec(id) else {
            warn!(pattern = id, "Unknown pattern id, returning empty result");
            return BacktestResult {
                pattern_id: id.to_string(),
                ..Default::default()
            };
        };

        info!(
            pattern = %spec.id,
            draws = history.len(),
            start = ?config.start_period,
            end = ?config.end_period,
            "Starting backtest"
        );

        let result = Self::simulate(spec, history, config);

        info!(
            pattern = %spec.id,
            total_tests = result.total_tests,
            wins = result.wins,
            win_rate = %result.win_rate,
            current_streak = result.current_streak,
            malformed = result.malformed,
            "Backtest complete"
        );

        result
    }

    /// Backtest every registered pattern; keep those at or above `min_win_rate`,
    /// best win rate first
    pub fn backtest_all(
        history: &[DrawRecord],
        min_win_rate: Decimal,
        config: &BacktestConfig,
    ) -> Vec<BacktestResult> {
        let prepared = PreparedHistory::new(history, config.start_period, config.end_period);
        let mut results: Vec<BacktestResult> = all_specs()
            .par_iter()
            .map(|spec| Self::replay(spec, &prepared, config))
            .filter(|r| r.win_rate >= min_win_rate)
            .collect();

        // Stable tie-break on id keeps the order deterministic
        results.sort_by(|a, b| {
            b.win_rate
                .cmp(&a.win_rate)
                .then_with(|| a.pattern_id.cmp(&b.pattern_id))
        });

        info!(
            patterns = all_specs().len(),
            draws = prepared.len(),
            kept = results.len(),
            min_win_rate = %min_win_rate,
            "Backtested all patterns"
        );

        results
    }
}
