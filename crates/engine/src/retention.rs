//! Retention policy: keeps the registry limited to patterns that still perform
//!
//! [`RetentionPolicy::evaluate`] is a pure decision per pattern. A cycle
//! applies those decisions through the [`PatternRegistry`]; the worker runs
//! cycles on an interval until cancelled.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use crate::config::{BacktestConfig, EngineConfig, RetentionConfig};
use crate::engine::BacktestEngine;
use crate::error::{EngineError, EngineResult};
use crate::normalize::normalize_name;
use crate::registry::find_spec;
use crate::store::{DrawHistory, PatternRegistry};
use crate::types::*;

/// What the policy wants done with one pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Keep,
    Disable,
    Delete,
    Enable,
    /// Data anomaly; the pattern is left untouched
    Skip(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionReport {
    pub disabled: usize,
    pub deleted: usize,
    pub reenabled: usize,
    pub skipped: usize,
    /// Decisions the registry failed to apply
    pub failed: usize,
    pub processed: usize,
    /// More than the configured share of patterns was disabled or deleted
    pub large_change: bool,
}

pub struct RetentionPolicy {
    config: RetentionConfig,
}

impl RetentionPolicy {
    pub fn new(config: RetentionConfig) -> Self {
        Self { config }
    }

    pub fn evaluate(&self, pattern: &ManagedPattern, now: DateTime<Utc>) -> Decision {
        if let Some(reason) = anomaly(pattern) {
            return Decision::Skip(reason);
        }

        let primary = pattern.rates.primary();

        match pattern.state {
            PatternState::Enabled if primary < self.config.disable_threshold => Decision::Disable,
            PatternState::Disabled => {
                let since = pattern.disabled_at.unwrap_or(pattern.date_added);
                let grace = chrono::Duration::days(self.config.grace_days);

                if primary < self.config.delete_threshold && now - since > grace {
                    Decision::Delete
                } else if self
                    .config
                    .reenable_threshold
                    .is_some_and(|threshold| primary >= threshold)
                {
                    Decision::Enable
                } else {
                    Decision::Keep
                }
            }
            _ => Decision::Keep,
        }
    }

    /// Evaluate every pattern and apply the decisions. One pattern failing
    /// never stops the others.
    pub async fn run_retention_cycle<R>(
        &self,
        registry: &R,
        patterns: Vec<ManagedPattern>,
        now: DateTime<Utc>,
    ) -> RetentionReport
    where
        R: PatternRegistry + ?Sized,
    {
        let mut report = RetentionReport {
            processed: patterns.len(),
            ..Default::default()
        };

        for pattern in patterns {
            let decision = self.evaluate(&pattern, now);
            let name = pattern.name.clone();
            debug!(pattern = %name, ?decision, "Retention decision");

            let applied = match &decision {
                Decision::Keep => continue,
                Decision::Skip(reason) => {
                    warn!(pattern = %name, reason = %reason, "Skipping pattern with anomalous data");
                    report.skipped += 1;
                    continue;
                }
                Decision::Delete => registry.delete_pattern(&pattern).await,
                Decision::Disable => match transition(pattern, PatternState::Disabled, now) {
                    Ok(next) => registry.update_pattern(&next).await,
                    Err(e) => Err(e),
                },
                Decision::Enable => match transition(pattern, PatternState::Enabled, now) {
                    Ok(next) => registry.update_pattern(&next).await,
                    Err(e) => Err(e),
                },
            };

            match (applied, &decision) {
                (Ok(()), Decision::Disable) => report.disabled += 1,
                (Ok(()), Decision::Delete) => report.deleted += 1,
                (Ok(()), Decision::Enable) => report.reenabled += 1,
                (Ok(()), _) => {}
                (Err(e), _) => {
                    error!(pattern = %name, error = %e, ?decision, "Failed to apply retention decision");
                    report.failed += 1;
                }
            }
        }

        let changed = Decimal::from(report.disabled + report.deleted);
        let limit = self.config.large_change_fraction * Decimal::from(report.processed);
        if report.processed > 0 && changed > limit {
            report.large_change = true;
            warn!(
                disabled = report.disabled,
                deleted = report.deleted,
                processed = report.processed,
                "Large share of patterns changed in one retention cycle"
            );
        }

        info!(
            processed = report.processed,
            disabled = report.disabled,
            deleted = report.deleted,
            reenabled = report.reenabled,
            skipped = report.skipped,
            failed = report.failed,
            "Retention cycle complete"
        );

        report
    }
}

/// Reason a pattern's data cannot be trusted, if any
fn anomaly(pattern: &ManagedPattern) -> Option<String> {
    if pattern.name.trim().is_empty() {
        return Some("blank name".to_string());
    }
    let range = Decimal::ZERO..=Decimal::ONE_HUNDRED;
    pattern
        .rates
        .all()
        .iter()
        .find(|rate| !range.contains(*rate))
        .map(|rate| format!("rate {rate} outside 0..=100"))
}

/// Move `pattern` to `to`, stamping or clearing the disablement time
pub fn transition(
    mut pattern: ManagedPattern,
    to: PatternState,
    now: DateTime<Utc>,
) -> EngineResult<ManagedPattern> {
    if !pattern.state.can_transition_to(to) {
        return Err(EngineError::InvalidTransition {
            name: pattern.name,
            from: pattern.state,
            to,
        });
    }

    pattern.disabled_at = match to {
        PatternState::Disabled => Some(now),
        _ => None,
    };
    pattern.state = to;
    Ok(pattern)
}

/// Re-run a pattern's backtest over `history` and refresh its stored metrics.
/// Patterns with an unknown id, or too little history, are returned unchanged.
pub fn rescore_pattern(
    pattern: &ManagedPattern,
    history: &[DrawRecord],
    config: &BacktestConfig,
) -> ManagedPattern {
    let Some(spec) = find_spec(&pattern.pattern_id) else {
        warn!(pattern = %pattern.name, id = %pattern.pattern_id, "Cannot rescore unknown pattern id");
        return pattern.clone();
    };

    let result = BacktestEngine::simulate(spec, history, config);
    if result.total_tests == 0 {
        return pattern.clone();
    }

    let mut rescored = pattern.clone();
    rescored.rates = result.rates;
    rescored.current_streak = result.current_streak;
    rescored.wins10 = result.metrics.wins10;
    rescored.max_lose_streak = result.max_lose_streak;
    if let Some(newest) = history.iter().filter(|d| d.is_complete()).max_by_key(|d| d.period) {
        let pair = spec.predict(newest);
        rescored.next_prediction = pair.joined();
        rescored.description = spec.describe(&pair);
    }
    rescored
}

/// Approve a pending pattern by name (matched after normalization)
pub async fn approve_pattern<R>(registry: &R, name: &str, now: DateTime<Utc>) -> EngineResult<ManagedPattern>
where
    R: PatternRegistry + ?Sized,
{
    let pattern = registry
        .find_by_name(&normalize_name(name))
        .await?
        .ok_or_else(|| EngineError::NotFound(name.to_string()))?;

    if pattern.state != PatternState::Pending {
        return Err(EngineError::InvalidTransition {
            name: pattern.name,
            from: pattern.state,
            to: PatternState::Enabled,
        });
    }

    let approved = transition(pattern, PatternState::Enabled, now)?;
    registry.update_pattern(&approved).await?;
    info!(pattern = %approved.name, "Pattern approved");
    Ok(approved)
}

/// Rescore every enabled and disabled pattern, persist the new metrics, then run one cycle
pub async fn run_retention_once<S>(
    store: &S,
    config: &EngineConfig,
    now: DateTime<Utc>,
) -> EngineResult<RetentionReport>
where
    S: DrawHistory + PatternRegistry + ?Sized,
{
    let history = store.recent_draws(config.retention.rescore_depth).await?;
    let backtest = config.backtest();

    let candidates: Vec<ManagedPattern> = store
        .all_patterns()
        .await?
        .into_iter()
        .filter(|p| matches!(p.state, PatternState::Enabled | PatternState::Disabled))
        .collect();

    let mut rescored = Vec::with_capacity(candidates.len());
    for pattern in candidates {
        let fresh = rescore_pattern(&pattern, &history, &backtest);
        if fresh != pattern {
            if let Err(e) = store.update_pattern(&fresh).await {
                error!(pattern = %pattern.name, error = %e, "Failed to persist rescored metrics");
            }
        }
        rescored.push(fresh);
    }

    let policy = RetentionPolicy::new(config.retention.clone());
    Ok(policy.run_retention_cycle(store, rescored, now).await)
}

// ============================================================================
// Periodic worker
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetentionStatus {
    Idle,
    Running,
    Waiting,
    Stopped,
}

/// Shared state of the retention worker
pub struct RetentionProgress {
    pub status: RwLock<RetentionStatus>,
    pub cycles: AtomicU32,
    pub last_report: RwLock<Option<RetentionReport>>,
    pub last_error: RwLock<Option<String>>,
    pub cancelled: AtomicBool,
    wake: Notify,
}

impl RetentionProgress {
    pub fn new() -> Self {
        Self {
            status: RwLock::new(RetentionStatus::Idle),
            cycles: AtomicU32::new(0),
            last_report: RwLock::new(None),
            last_error: RwLock::new(None),
            cancelled: AtomicBool::new(false),
            wake: Notify::new(),
        }
    }

    /// Stop the worker; interrupts a pending interval wait
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
        // notify_one stores a permit, so a cancel issued before the wait starts is not lost
        self.wake.notify_one();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    pub fn status(&self) -> RetentionStatus {
        *self.status.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_status(&self, status: RetentionStatus) {
        *self.status.write().unwrap_or_else(PoisonError::into_inner) = status;
    }
}

impl Default for RetentionProgress {
    fn default() -> Self {
        Self::new()
    }
}

/// Run retention cycles every `interval_secs` until `progress` is cancelled.
/// A failed cycle is logged and retried at the next tick.
pub async fn run_retention_worker<S>(store: Arc<S>, config: EngineConfig, progress: Arc<RetentionProgress>)
where
    S: DrawHistory + PatternRegistry + ?Sized,
{
    let interval = Duration::from_secs(config.retention.interval_secs);
    info!(interval_secs = config.retention.interval_secs, "Starting retention worker");

    loop {
        if progress.is_cancelled() {
            break;
        }

        progress.set_status(RetentionStatus::Running);
        match run_retention_once(store.as_ref(), &config, Utc::now()).await {
            Ok(report) => {
                *progress.last_report.write().unwrap_or_else(PoisonError::into_inner) = Some(report);
                *progress.last_error.write().unwrap_or_else(PoisonError::into_inner) = None;
            }
            Err(e) => {
                error!(error = %e, "Retention cycle failed, waiting for next tick");
                *progress.last_error.write().unwrap_or_else(PoisonError::into_inner) = Some(e.to_string());
            }
        }
        progress.cycles.fetch_add(1, Ordering::Relaxed);

        if progress.is_cancelled() {
            break;
        }

        progress.set_status(RetentionStatus::Waiting);
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = progress.wake.notified() => {
                debug!("Retention worker woken");
            }
        }
    }

    progress.set_status(RetentionStatus::Stopped);
    info!(cycles = progress.cycles.load(Ordering::Relaxed), "Retention worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use chrono::{NaiveDate, TimeZone};
    use rust_decimal_macros::dec;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap()
    }

    fn pattern(name: &str, state: PatternState, rate: Decimal, disabled_days_ago: Option<i64>) -> ManagedPattern {
        ManagedPattern {
            id: None,
            pattern_id: "LO_STL_FIXED_01".into(),
            name: name.into(),
            description: String::new(),
            kind: PatternKind::LO_SINGLE,
            state,
            rates: PatternRates {
                real_lo: rate,
                adjusted_lo: rate,
                ..Default::default()
            },
            current_streak: 0,
            wins10: 0,
            max_lose_streak: 0,
            next_prediction: String::new(),
            date_added: now() - chrono::Duration::days(60),
            disabled_at: disabled_days_ago.map(|d| now() - chrono::Duration::days(d)),
        }
    }

    fn policy() -> RetentionPolicy {
        RetentionPolicy::new(RetentionConfig::default())
    }

    #[test]
    fn test_enabled_below_threshold_is_disabled() {
        let p = pattern("a", PatternState::Enabled, dec!(65), None);
        assert_eq!(policy().evaluate(&p, now()), Decision::Disable);

        let p = pattern("a", PatternState::Enabled, dec!(70), None);
        assert_eq!(policy().evaluate(&p, now()), Decision::Keep);
    }

    #[test]
    fn test_disabled_low_rate_deleted_after_grace() {
        let p = pattern("a", PatternState::Disabled, dec!(45), Some(10));
        assert_eq!(policy().evaluate(&p, now()), Decision::Delete);

        let p = pattern("a", PatternState::Disabled, dec!(45), Some(3));
        assert_eq!(policy().evaluate(&p, now()), Decision::Keep);
    }

    #[test]
    fn test_grace_falls_back_to_date_added() {
        // No disabled_at recorded; date_added is 60 days ago
        let p = pattern("a", PatternState::Disabled, dec!(45), None);
        assert_eq!(policy().evaluate(&p, now()), Decision::Delete);
    }

    #[test]
    fn test_primary_rate_is_max_of_categories() {
        let mut p = pattern("a", PatternState::Enabled, dec!(40), None);
        p.rates.real_de = dec!(75);
        assert_eq!(policy().evaluate(&p, now()), Decision::Keep);
    }

    #[test]
    fn test_reenable_hysteresis() {
        let p = pattern("a", PatternState::Disabled, dec!(85), Some(2));
        assert_eq!(policy().evaluate(&p, now()), Decision::Enable);

        // Between disable and re-enable thresholds: stays disabled
        let p = pattern("a", PatternState::Disabled, dec!(75), Some(2));
        assert_eq!(policy().evaluate(&p, now()), Decision::Keep);

        let no_reenable = RetentionPolicy::new(RetentionConfig {
            reenable_threshold: None,
            ..Default::default()
        });
        let p = pattern("a", PatternState::Disabled, dec!(95), Some(2));
        assert_eq!(no_reenable.evaluate(&p, now()), Decision::Keep);
    }

    #[test]
    fn test_anomalies_are_skipped() {
        let p = pattern("a", PatternState::Enabled, dec!(120), None);
        assert!(matches!(policy().evaluate(&p, now()), Decision::Skip(_)));

        let p = pattern("a", PatternState::Enabled, dec!(-1), None);
        assert!(matches!(policy().evaluate(&p, now()), Decision::Skip(_)));

        let p = pattern("   ", PatternState::Enabled, dec!(10), None);
        assert!(matches!(policy().evaluate(&p, now()), Decision::Skip(_)));
    }

    #[test]
    fn test_pending_is_untouched() {
        let p = pattern("a", PatternState::Pending, dec!(10), None);
        assert_eq!(policy().evaluate(&p, now()), Decision::Keep);
    }

    #[test]
    fn test_transition_rules() {
        let p = pattern("a", PatternState::Enabled, dec!(10), None);
        let disabled = transition(p, PatternState::Disabled, now()).unwrap();
        assert_eq!(disabled.disabled_at, Some(now()));

        let enabled = transition(disabled, PatternState::Enabled, now()).unwrap();
        assert_eq!(enabled.disabled_at, None);

        let err = transition(enabled, PatternState::Pending, now()).unwrap_err();
        assert!(matches!(err, EngineError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn test_cycle_applies_decisions_and_flags_large_change() {
        let store = MemoryStore::default();
        let disable_id = store.add_pattern(pattern("disable", PatternState::Enabled, dec!(65), None));
        let delete_id = store.add_pattern(pattern("delete", PatternState::Disabled, dec!(45), Some(10)));
        let keep_id = store.add_pattern(pattern("keep", PatternState::Disabled, dec!(45), Some(3)));
        store.add_pattern(pattern("bad", PatternState::Enabled, dec!(150), None));

        let patterns = store.all_patterns().await.unwrap();
        let report = policy().run_retention_cycle(&store, patterns, now()).await;

        assert_eq!(report.processed, 4);
        assert_eq!(report.disabled, 1);
        assert_eq!(report.deleted, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.failed, 0);
        // 2 changes out of 4 is above 30%
        assert!(report.large_change);

        let disabled = store.pattern(disable_id).unwrap();
        assert_eq!(disabled.state, PatternState::Disabled);
        assert_eq!(disabled.disabled_at, Some(now()));
        assert!(store.pattern(delete_id).is_none());
        assert_eq!(store.pattern(keep_id).unwrap().state, PatternState::Disabled);
    }

    #[tokio::test]
    async fn test_large_change_boundary() {
        async fn cycle(disabling: usize, total: usize) -> RetentionReport {
            let store = MemoryStore::default();
            for i in 0..total {
                let rate = if i < disabling { dec!(65) } else { dec!(90) };
                store.add_pattern(pattern(&format!("p{i}"), PatternState::Enabled, rate, None));
            }
            let patterns = store.all_patterns().await.unwrap();
            policy().run_retention_cycle(&store, patterns, now()).await
        }

        // 3 of 10 sits exactly on the 30% limit
        let at_limit = cycle(3, 10).await;
        assert_eq!((at_limit.disabled, at_limit.processed), (3, 10));
        assert!(!at_limit.large_change);

        let above = cycle(4, 10).await;
        assert_eq!(above.disabled, 4);
        assert!(above.large_change);

        let empty = cycle(0, 0).await;
        assert_eq!(empty.processed, 0);
        assert!(!empty.large_change);
    }

    #[tokio::test]
    async fn test_cycle_counts_failures_without_aborting() {
        let store = MemoryStore::default();
        let mut ghost = pattern("ghost", PatternState::Enabled, dec!(10), None);
        ghost.id = Some(999);
        let real_id = store.add_pattern(pattern("real", PatternState::Enabled, dec!(10), None));

        let mut patterns = vec![ghost];
        patterns.extend(store.all_patterns().await.unwrap());
        let report = policy().run_retention_cycle(&store, patterns, now()).await;

        assert_eq!(report.failed, 1);
        assert_eq!(report.disabled, 1);
        assert_eq!(store.pattern(real_id).unwrap().state, PatternState::Disabled);
    }

    #[tokio::test]
    async fn test_approve_pending_only() {
        let store = MemoryStore::default();
        store.add_pattern(pattern("Cầu Lô 01 (GĐB+5)", PatternState::Pending, dec!(80), None));
        store.add_pattern(pattern("other", PatternState::Enabled, dec!(80), None));

        let approved = approve_pattern(&store, "cau lo 01 gdb+5", now()).await.unwrap();
        assert_eq!(approved.state, PatternState::Enabled);

        let again = approve_pattern(&store, "cau lo 01 gdb+5", now()).await;
        assert!(matches!(again, Err(EngineError::InvalidTransition { .. })));

        let missing = approve_pattern(&store, "nope", now()).await;
        assert!(matches!(missing, Err(EngineError::NotFound(_))));
    }

    fn draw(period: u32, special: &str) -> DrawRecord {
        DrawRecord {
            period,
            date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + chrono::Days::new(period as u64),
            special: special.to_string(),
            first: String::new(),
            second: String::new(),
            third: String::new(),
            fourth: String::new(),
            fifth: String::new(),
            sixth: String::new(),
            seventh: String::new(),
        }
    }

    #[test]
    fn test_rescore_refreshes_rates_and_prediction() {
        // Specials alternate between ...00 and ...11. GĐB+5 predicts 55/00 and
        // 66/11 in turn, never matching the following draw.
        let history: Vec<DrawRecord> = (1..=6)
            .map(|p| draw(p, if p % 2 == 0 { "12311" } else { "12300" }))
            .collect();
        let stale = pattern("Cầu Lô 01 (GĐB+5)", PatternState::Enabled, dec!(90), None);

        let fresh = rescore_pattern(&stale, &history, &BacktestConfig::default());
        assert_eq!(fresh.rates.real_lo, Decimal::ZERO);
        assert_eq!(fresh.current_streak, -5);
        assert_eq!(fresh.max_lose_streak, 5);
        // Newest special ends in 11: shifted digits 6,6 give "66" and its shadow "11"
        assert_eq!(fresh.next_prediction, "66,11");

        let unknown = ManagedPattern {
            pattern_id: "LO_GONE".into(),
            ..stale.clone()
        };
        assert_eq!(rescore_pattern(&unknown, &history, &BacktestConfig::default()), unknown);
    }

    #[tokio::test]
    async fn test_run_once_rescores_before_policy() {
        let history: Vec<DrawRecord> = (1..=6)
            .map(|p| draw(p, if p % 2 == 0 { "12311" } else { "12300" }))
            .collect();
        let store = MemoryStore::with_draws(history);
        let id = store.add_pattern(pattern("Cầu Lô 01 (GĐB+5)", PatternState::Enabled, dec!(90), None));

        let report = run_retention_once(&store, &EngineConfig::default(), now())
            .await
            .unwrap();

        assert_eq!(report.processed, 1);
        assert_eq!(report.disabled, 1);
        let stored = store.pattern(id).unwrap();
        assert_eq!(stored.state, PatternState::Disabled);
        assert_eq!(stored.rates.real_lo, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_run_once_surfaces_collaborator_failure() {
        let store = MemoryStore::default();
        store.fail.store(true, Ordering::SeqCst);
        let result = run_retention_once(&store, &EngineConfig::default(), now()).await;
        assert!(matches!(result, Err(EngineError::Collaborator(_))));
    }

    #[tokio::test]
    async fn test_worker_stops_promptly_on_cancel() {
        let store = Arc::new(MemoryStore::default());
        let progress = Arc::new(RetentionProgress::new());
        let config = EngineConfig::default(); // 24h interval

        let handle = tokio::spawn(run_retention_worker(store, config, progress.clone()));

        // Wait for the first cycle, then cancel during the long sleep
        while progress.cycles.load(Ordering::Relaxed) == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        progress.cancel();

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("worker did not stop")
            .unwrap();
        assert_eq!(progress.status(), RetentionStatus::Stopped);
        assert_eq!(progress.cycles.load(Ordering::Relaxed), 1);
        assert_eq!(progress.last_report.read().unwrap().as_ref().unwrap().processed, 0);
    }

    #[tokio::test]
    async fn test_worker_survives_failed_cycle() {
        let store = Arc::new(MemoryStore::default());
        store.fail.store(true, Ordering::SeqCst);
        let progress = Arc::new(RetentionProgress::new());
        let config = EngineConfig {
            retention: RetentionConfig {
                interval_secs: 1,
                ..Default::default()
            },
            ..Default::default()
        };

        let handle = tokio::spawn(run_retention_worker(store.clone(), config, progress.clone()));
        while progress.cycles.load(Ordering::Relaxed) == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(progress.last_error.read().unwrap().is_some());

        progress.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("worker did not stop")
            .unwrap();
    }
}
