//! Bridge Scan Engine: pattern backtesting, discovery and retention
//!
//! Provides:
//! - Fifteen table-driven classic patterns plus generated positional and memory families
//! - Period-by-period backtest simulator with streak and win-rate metrics
//! - Parallel candidate scanner with accent-insensitive deduplication
//! - Retention policy and a cancellable periodic retention worker
//! - Collaborator traits with a SQLite adapter

pub mod config;
pub mod digits;
pub mod discovery;
pub mod engine;
pub mod error;
pub mod hit;
pub mod metrics;
pub mod normalize;
pub mod numbers;
pub mod registry;
pub mod retention;
pub mod store;
pub mod types;

// Re-exports for convenience
pub use config::{AdjustedRateConfig, BacktestConfig, EngineConfig, RetentionConfig, ScannerConfig};
pub use digits::{build_pair, shadow, shifted_pair, PredictedPair};
pub use discovery::{import_candidates, scan_candidates, scan_from_store, Candidate, ScanOutcome};
pub use engine::{BacktestEngine, PreparedHistory};
pub use error::{EngineError, EngineResult};
pub use hit::{classify, HitClassification};
pub use normalize::normalize_name;
pub use numbers::NumberSet;
pub use registry::{all_specs, find_spec, MemoryOp, PatternSpec};
pub use retention::{
    approve_pattern, rescore_pattern, run_retention_once, run_retention_worker, Decision,
    RetentionPolicy, RetentionProgress, RetentionReport, RetentionStatus,
};
pub use store::{DrawHistory, PatternRegistry, SqliteStore};
pub use types::*;
