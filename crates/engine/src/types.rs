//! Domain types shared by the simulator, scanner and retention policy

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Draw records
// ============================================================================

/// One of the eight prize tiers of a draw
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrizeTier {
    Special,
    First,
    Second,
    Third,
    Fourth,
    Fifth,
    Sixth,
    Seventh,
}

impl PrizeTier {
    pub const ALL: [PrizeTier; 8] = [
        PrizeTier::Special,
        PrizeTier::First,
        PrizeTier::Second,
        PrizeTier::Third,
        PrizeTier::Fourth,
        PrizeTier::Fifth,
        PrizeTier::Sixth,
        PrizeTier::Seventh,
    ];

    /// How many numbers this tier publishes (27 across all tiers)
    pub fn slots(self) -> usize {
        match self {
            PrizeTier::Special | PrizeTier::First => 1,
            PrizeTier::Second => 2,
            PrizeTier::Third => 6,
            PrizeTier::Fourth => 4,
            PrizeTier::Fifth => 6,
            PrizeTier::Sixth => 3,
            PrizeTier::Seventh => 4,
        }
    }

    /// Digits per published number (107 digit positions across all tiers)
    pub fn digit_width(self) -> usize {
        match self {
            PrizeTier::Special | PrizeTier::First | PrizeTier::Second | PrizeTier::Third => 5,
            PrizeTier::Fourth | PrizeTier::Fifth => 4,
            PrizeTier::Sixth => 3,
            PrizeTier::Seventh => 2,
        }
    }

    /// Short code used in generated pattern names
    pub fn code(self) -> &'static str {
        match self {
            PrizeTier::Special => "GDB",
            PrizeTier::First => "G1",
            PrizeTier::Second => "G2",
            PrizeTier::Third => "G3",
            PrizeTier::Fourth => "G4",
            PrizeTier::Fifth => "G5",
            PrizeTier::Sixth => "G6",
            PrizeTier::Seventh => "G7",
        }
    }

    /// "GDB", "G1", or "G3.2" for the second value of a multi-number tier
    pub fn slot_label(self, sub: usize) -> String {
        if self.slots() == 1 {
            self.code().to_string()
        } else {
            format!("{}.{}", self.code(), sub + 1)
        }
    }
}

/// A single published draw. Prize fields hold the raw text; multi-number
/// tiers are comma-separated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrawRecord {
    pub period: u32,
    pub date: NaiveDate,
    pub special: String,
    pub first: String,
    pub second: String,
    pub third: String,
    pub fourth: String,
    pub fifth: String,
    pub sixth: String,
    pub seventh: String,
}

impl DrawRecord {
    pub fn field(&self, tier: PrizeTier) -> &str {
        match tier {
            PrizeTier::Special => &self.special,
            PrizeTier::First => &self.first,
            PrizeTier::Second => &self.second,
            PrizeTier::Third => &self.third,
            PrizeTier::Fourth => &self.fourth,
            PrizeTier::Fifth => &self.fifth,
            PrizeTier::Sixth => &self.sixth,
            PrizeTier::Seventh => &self.seventh,
        }
    }

    /// The `sub`-th comma-separated value of a tier, trimmed.
    /// Single-number tiers only have sub-value 0.
    pub fn sub_value(&self, tier: PrizeTier, sub: usize) -> Option<&str> {
        self.field(tier).split(',').nth(sub).map(str::trim)
    }

    /// Records without a special prize are incomplete and excluded from simulation
    pub fn is_complete(&self) -> bool {
        !self.special.trim().is_empty()
    }
}

// ============================================================================
// Pattern classification and lifecycle
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Lo,
    De,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Arity {
    Single,
    Set,
}

/// What a pattern predicts (lo vs. de) and whether it yields one pair or a set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PatternKind {
    pub category: Category,
    pub arity: Arity,
}

/// Where a pattern definition comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternFamily {
    /// The fifteen fixed patterns
    Classic,
    /// Every pair of digit positions, plain or shadowed
    Positional,
    /// Sum or difference of two prize tails
    Memory,
}

impl PatternFamily {
    pub const ALL: [PatternFamily; 3] = [
        PatternFamily::Classic,
        PatternFamily::Positional,
        PatternFamily::Memory,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PatternFamily::Classic => "classic",
            PatternFamily::Positional => "positional",
            PatternFamily::Memory => "memory",
        }
    }
}

impl PatternKind {
    pub const LO_SINGLE: PatternKind = PatternKind {
        category: Category::Lo,
        arity: Arity::Single,
    };
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Lo => "lo",
            Category::De => "de",
        }
    }
}

impl Arity {
    pub fn as_str(self) -> &'static str {
        match self {
            Arity::Single => "single",
            Arity::Set => "set",
        }
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lo" => Ok(Category::Lo),
            "de" => Ok(Category::De),
            other => Err(format!("unknown pattern category: {other}")),
        }
    }
}

impl FromStr for Arity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "single" => Ok(Arity::Single),
            "set" => Ok(Arity::Set),
            other => Err(format!("unknown pattern arity: {other}")),
        }
    }
}

/// Lifecycle of a managed pattern: Pending → Enabled ⇄ Disabled → Deleted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternState {
    Pending,
    Enabled,
    Disabled,
    Deleted,
}

impl PatternState {
    pub fn as_str(self) -> &'static str {
        match self {
            PatternState::Pending => "pending",
            PatternState::Enabled => "enabled",
            PatternState::Disabled => "disabled",
            PatternState::Deleted => "deleted",
        }
    }

    /// Whether moving to `next` is a legal lifecycle step
    pub fn can_transition_to(self, next: PatternState) -> bool {
        use PatternState::*;
        matches!(
            (self, next),
            (Pending, Enabled) | (Enabled, Disabled) | (Disabled, Enabled) | (Disabled, Deleted)
        )
    }
}

impl fmt::Display for PatternState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for PatternState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(PatternState::Pending),
            "enabled" => Ok(PatternState::Enabled),
            "disabled" => Ok(PatternState::Disabled),
            "deleted" => Ok(PatternState::Deleted),
            other => Err(format!("unknown pattern state: {other}")),
        }
    }
}

// ============================================================================
// Metrics and results
// ============================================================================

/// Statistics over a most-recent-first hit sequence
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    /// Consecutive hits counted back from the most recent period
    pub streak: u32,
    pub total_wins: u32,
    /// Percentage (0–100)
    pub win_rate: Decimal,
    /// Hits among the 10 most recent periods
    pub wins10: u32,
    pub total_days: u32,
    pub max_lose_streak: u32,
}

/// Real (K1N) and adjusted (K2N) rates for both categories, as percentages
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternRates {
    pub real_lo: Decimal,
    pub real_de: Decimal,
    pub adjusted_lo: Decimal,
    pub adjusted_de: Decimal,
}

impl PatternRates {
    /// The rate retention decisions are based on
    pub fn primary(&self) -> Decimal {
        self.real_lo.max(self.real_de)
    }

    pub fn all(&self) -> [Decimal; 4] {
        [self.real_lo, self.real_de, self.adjusted_lo, self.adjusted_de]
    }
}

/// One simulated period, recorded when tracing is requested
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BacktestStep {
    pub from_period: u32,
    pub to_period: u32,
    pub predicted: [String; 2],
    pub classification: crate::hit::HitClassification,
}

/// Result of backtesting one pattern over a draw history
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BacktestResult {
    pub pattern_id: String,
    pub pattern_name: String,
    pub total_tests: u32,
    pub wins: u32,
    pub losses: u32,
    pub win_rate: Decimal,
    /// Positive while a hit run is ongoing, negative during a miss run
    pub current_streak: i32,
    pub max_win_streak: u32,
    pub max_lose_streak: u32,
    /// Predictions that could not be classified (counted among the losses).
    /// Registry patterns always predict two numbers, so this stays 0 for them;
    /// it is kept for predictions checked through the slice-based [`crate::hit::classify`].
    pub malformed: u32,
    pub metrics: PerformanceMetrics,
    pub rates: PatternRates,
    pub trace: Option<Vec<BacktestStep>>,
}

// ============================================================================
// Managed patterns
// ============================================================================

/// A pattern tracked in the registry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagedPattern {
    pub id: Option<i64>,
    pub pattern_id: String,
    pub name: String,
    pub description: String,
    pub kind: PatternKind,
    pub state: PatternState,
    pub rates: PatternRates,
    pub current_streak: i32,
    pub wins10: u32,
    pub max_lose_streak: u32,
    /// Comma-joined predicted pair for the next period
    pub next_prediction: String,
    pub date_added: DateTime<Utc>,
    pub disabled_at: Option<DateTime<Utc>>,
}
