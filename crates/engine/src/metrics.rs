//! Recency-weighted performance metrics

use rust_decimal::Decimal;

use crate::types::PerformanceMetrics;

/// Compute metrics from hit results ordered most-recent-first.
///
/// Callers own the ordering: passing oldest-first data yields a different
/// (wrong) streak and `wins10`.
pub fn calculate(results_recent_first: &[bool]) -> PerformanceMetrics {
    let total_days = results_recent_first.len() as u32;
    let streak = results_recent_first.iter().take_while(|&&hit| hit).count() as u32;
    let total_wins = results_recent_first.iter().filter(|&&hit| hit).count() as u32;
    let wins10 = results_recent_first
        .iter()
        .take(10)
        .filter(|&&hit| hit)
        .count() as u32;

    let (max_lose_streak, _) = results_recent_first
        .iter()
        .fold((0u32, 0u32), |(max, run), &hit| {
            let run = if hit { 0 } else { run + 1 };
            (max.max(run), run)
        });

    PerformanceMetrics {
        streak,
        total_wins,
        win_rate: percentage(total_wins, total_days),
        wins10,
        total_days,
        max_lose_streak,
    }
}

/// `part * 100 / whole`, rounded to 2 places; 0 when `whole` is 0
pub fn percentage(part: u32, whole: u32) -> Decimal {
    if whole == 0 {
        return Decimal::ZERO;
    }
    (Decimal::from(part) * Decimal::ONE_HUNDRED / Decimal::from(whole)).round_dp(2)
}
