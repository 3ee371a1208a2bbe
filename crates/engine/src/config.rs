//! Engine configuration. Every threshold is injected, none are hard-coded in the policy.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::types::PatternFamily;

/// Candidate scanner settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    /// Number of most recent draws the scan looks at
    pub lookback_depth: usize,
    /// Minimum current hit streak for a pattern to become a candidate
    pub min_streak: u32,
    /// Pattern families the scan covers
    pub families: Vec<PatternFamily>,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            lookback_depth: 30,
            min_streak: 3,
            families: PatternFamily::ALL.to_vec(),
        }
    }
}

/// Retention policy settings (rates are percentages)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// Enabled patterns below this rate are disabled
    pub disable_threshold: Decimal,
    /// Disabled patterns below this rate are deleted once the grace period passed
    pub delete_threshold: Decimal,
    pub grace_days: i64,
    /// Disabled patterns at or above this rate are re-enabled. `None` turns re-enabling off.
    pub reenable_threshold: Option<Decimal>,
    /// Warn when more than this share of patterns changes in one cycle
    pub large_change_fraction: Decimal,
    /// Draws used to re-score persisted patterns before each cycle
    pub rescore_depth: usize,
    pub interval_secs: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            disable_threshold: dec!(70),
            delete_threshold: dec!(50),
            grace_days: 7,
            reenable_threshold: Some(dec!(80)),
            large_change_fraction: dec!(0.30),
            rescore_depth: 30,
            interval_secs: 24 * 60 * 60,
        }
    }
}

/// Scaling from real (K1N) to adjusted (K2N) rates, per category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdjustedRateConfig {
    pub lo_factor: Decimal,
    pub de_factor: Decimal,
}

impl Default for AdjustedRateConfig {
    fn default() -> Self {
        Self {
            lo_factor: Decimal::ONE,
            de_factor: Decimal::ONE,
        }
    }
}

/// Configuration for a single backtest run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestConfig {
    /// Inclusive lower period bound
    pub start_period: Option<u32>,
    /// Inclusive upper period bound
    pub end_period: Option<u32>,
    /// Record every simulated step in the result
    pub trace: bool,
    pub rates: AdjustedRateConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub scanner: ScannerConfig,
    pub retention: RetentionConfig,
    pub rates: AdjustedRateConfig,
}

impl EngineConfig {
    /// Backtest settings for an unbounded, untraced run with this config's rate factors
    pub fn backtest(&self) -> BacktestConfig {
        BacktestConfig {
            rates: self.rates.clone(),
            ..Default::default()
        }
    }

    /// Reject threshold combinations the retention policy cannot act on sensibly
    pub fn validate(&self) -> Result<(), String> {
        let r = &self.retention;
        let pct = Decimal::ZERO..=Decimal::ONE_HUNDRED;

        if !pct.contains(&r.disable_threshold) || !pct.contains(&r.delete_threshold) {
            return Err("retention thresholds must be within 0..=100".to_string());
        }
        if r.delete_threshold > r.disable_threshold {
            return Err(format!(
                "delete_threshold ({}) must not exceed disable_threshold ({})",
                r.delete_threshold, r.disable_threshold
            ));
        }
        if let Some(reenable) = r.reenable_threshold {
            if reenable < r.disable_threshold || reenable > Decimal::ONE_HUNDRED {
                return Err(format!(
                    "reenable_threshold ({reenable}) must be between disable_threshold and 100"
                ));
            }
        }
        if r.grace_days < 0 {
            return Err("grace_days must not be negative".to_string());
        }
        if r.interval_secs == 0 {
            return Err("interval_secs must be positive".to_string());
        }
        if self.scanner.lookback_depth < 2 {
            return Err("lookback_depth must be at least 2".to_string());
        }
        if self.scanner.families.is_empty() {
            return Err("scanner families must not be empty".to_string());
        }
        if self.rates.lo_factor < Decimal::ZERO || self.rates.de_factor < Decimal::ZERO {
            return Err("adjusted rate factors must not be negative".to_string());
        }
        Ok(())
    }
}
