//! Collaborator seams: draw history and the managed pattern registry
//!
//! The engine only consumes these traits. [`SqliteStore`] implements both on
//! top of the `persistence` repositories; tests use an in-memory fake.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use persistence::repository::{DrawRepository, DrawRow, ManagedPatternRecord, PatternRepository};
use persistence::SqlitePool;
use rust_decimal::Decimal;
use tracing::warn;

use crate::error::{EngineError, EngineResult};
use crate::types::*;

#[async_trait]
pub trait DrawHistory: Send + Sync {
    /// The `limit` most recent draws, oldest first
    async fn recent_draws(&self, limit: usize) -> EngineResult<Vec<DrawRecord>>;

    /// Draws within inclusive period bounds, oldest first
    async fn draws_in_range(
        &self,
        start: Option<u32>,
        end: Option<u32>,
    ) -> EngineResult<Vec<DrawRecord>>;
}

#[async_trait]
pub trait PatternRegistry: Send + Sync {
    /// Display names of every registered pattern, whatever its state
    async fn existing_names(&self) -> EngineResult<Vec<String>>;
    async fn enabled_patterns(&self) -> EngineResult<Vec<ManagedPattern>>;
    async fn all_patterns(&self) -> EngineResult<Vec<ManagedPattern>>;
    /// Look up one pattern by its dedup key, see [`crate::normalize::normalize_name`]
    async fn find_by_name(&self, normalized_name: &str) -> EngineResult<Option<ManagedPattern>>;
    async fn update_pattern(&self, pattern: &ManagedPattern) -> EngineResult<()>;
    async fn delete_pattern(&self, pattern: &ManagedPattern) -> EngineResult<()>;
    /// Insert new patterns, skipping names already present. Returns the number inserted.
    async fn bulk_insert(&self, patterns: &[ManagedPattern]) -> EngineResult<usize>;
}

// ============================================================================
// SQLite adapter
// ============================================================================

/// Both collaborators backed by the SQLite database
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl DrawHistory for SqliteStore {
    async fn recent_draws(&self, limit: usize) -> EngineResult<Vec<DrawRecord>> {
        let repo = DrawRepository::new(&self.pool);
        let mut rows = repo.recent(limit as i64).await?;
        rows.reverse();
        Ok(rows_to_draws(rows))
    }

    async fn draws_in_range(
        &self,
        start: Option<u32>,
        end: Option<u32>,
    ) -> EngineResult<Vec<DrawRecord>> {
        let repo = DrawRepository::new(&self.pool);
        let rows = repo
            .range(start.map(i64::from), end.map(i64::from))
            .await?;
        Ok(rows_to_draws(rows))
    }
}

#[async_trait]
impl PatternRegistry for SqliteStore {
    async fn existing_names(&self) -> EngineResult<Vec<String>> {
        Ok(PatternRepository::new(&self.pool).names().await?)
    }

    async fn enabled_patterns(&self) -> EngineResult<Vec<ManagedPattern>> {
        let records = PatternRepository::new(&self.pool)
            .get_by_state(PatternState::Enabled.as_str())
            .await?;
        Ok(records_to_patterns(records))
    }

    async fn all_patterns(&self) -> EngineResult<Vec<ManagedPattern>> {
        let records = PatternRepository::new(&self.pool).get_all().await?;
        Ok(records_to_patterns(records))
    }

    async fn find_by_name(&self, normalized_name: &str) -> EngineResult<Option<ManagedPattern>> {
        PatternRepository::new(&self.pool)
            .get_by_normalized_name(normalized_name)
            .await?
            .map(record_to_pattern)
            .transpose()
    }

    async fn update_pattern(&self, pattern: &ManagedPattern) -> EngineResult<()> {
        let record = pattern_to_record(pattern);
        if record.id.is_none() {
            return Err(EngineError::Collaborator(format!(
                "cannot update unsaved pattern '{}'",
                pattern.name
            )));
        }
        if !PatternRepository::new(&self.pool).update(&record).await? {
            return Err(EngineError::NotFound(pattern.name.clone()));
        }
        Ok(())
    }

    async fn delete_pattern(&self, pattern: &ManagedPattern) -> EngineResult<()> {
        let id = pattern.id.ok_or_else(|| {
            EngineError::Collaborator(format!("cannot delete unsaved pattern '{}'", pattern.name))
        })?;
        PatternRepository::new(&self.pool).delete(id).await?;
        Ok(())
    }

    async fn bulk_insert(&self, patterns: &[ManagedPattern]) -> EngineResult<usize> {
        let records: Vec<ManagedPatternRecord> = patterns.iter().map(pattern_to_record).collect();
        Ok(PatternRepository::new(&self.pool)
            .bulk_insert(&records)
            .await?)
    }
}

// ============================================================================
// Record <-> domain conversion
// ============================================================================

pub fn draw_to_row(draw: &DrawRecord) -> DrawRow {
    DrawRow {
        period: i64::from(draw.period),
        draw_date: draw.date.format("%Y-%m-%d").to_string(),
        special: draw.special.clone(),
        first: draw.first.clone(),
        second: draw.second.clone(),
        third: draw.third.clone(),
        fourth: draw.fourth.clone(),
        fifth: draw.fifth.clone(),
        sixth: draw.sixth.clone(),
        seventh: draw.seventh.clone(),
    }
}

pub fn row_to_draw(row: DrawRow) -> EngineResult<DrawRecord> {
    let period = u32::try_from(row.period)
        .map_err(|_| EngineError::Collaborator(format!("invalid period {}", row.period)))?;
    let date = NaiveDate::parse_from_str(&row.draw_date, "%Y-%m-%d").map_err(|e| {
        EngineError::Collaborator(format!("invalid date '{}' for period {period}: {e}", row.draw_date))
    })?;

    Ok(DrawRecord {
        period,
        date,
        special: row.special,
        first: row.first,
        second: row.second,
        third: row.third,
        fourth: row.fourth,
        fifth: row.fifth,
        sixth: row.sixth,
        seventh: row.seventh,
    })
}

/// Convert rows, skipping (and logging) any that cannot be read
fn rows_to_draws(rows: Vec<DrawRow>) -> Vec<DrawRecord> {
    rows.into_iter()
        .filter_map(|row| match row_to_draw(row) {
            Ok(draw) => Some(draw),
            Err(e) => {
                warn!(error = %e, "Skipping unreadable draw row");
                None
            }
        })
        .collect()
}

pub fn pattern_to_record(pattern: &ManagedPattern) -> ManagedPatternRecord {
    ManagedPatternRecord {
        id: pattern.id,
        pattern_id: pattern.pattern_id.clone(),
        name: pattern.name.clone(),
        normalized_name: crate::normalize::normalize_name(&pattern.name),
        description: pattern.description.clone(),
        category: pattern.kind.category.as_str().to_string(),
        arity: pattern.kind.arity.as_str().to_string(),
        state: pattern.state.as_str().to_string(),
        real_rate_lo: pattern.rates.real_lo.to_string(),
        real_rate_de: pattern.rates.real_de.to_string(),
        adjusted_rate_lo: pattern.rates.adjusted_lo.to_string(),
        adjusted_rate_de: pattern.rates.adjusted_de.to_string(),
        current_streak: i64::from(pattern.current_streak),
        wins_10: i64::from(pattern.wins10),
        max_lose_streak: i64::from(pattern.max_lose_streak),
        next_prediction: pattern.next_prediction.clone(),
        date_added: pattern.date_added.timestamp(),
        disabled_at: pattern.disabled_at.map(|t| t.timestamp()),
    }
}

pub fn record_to_pattern(record: ManagedPatternRecord) -> EngineResult<ManagedPattern> {
    let bad = |what: &str, value: &str| {
        EngineError::Collaborator(format!("pattern '{}': invalid {what} '{value}'", record.name))
    };
    let rate = |value: &str| Decimal::from_str(value.trim()).map_err(|_| bad("rate", value));
    let timestamp = |secs: i64| {
        Utc.timestamp_opt(secs, 0)
            .single()
            .ok_or_else(|| bad("timestamp", &secs.to_string()))
    };

    let kind = PatternKind {
        category: Category::from_str(&record.category).map_err(|_| bad("category", &record.category))?,
        arity: Arity::from_str(&record.arity).map_err(|_| bad("arity", &record.arity))?,
    };
    let state = PatternState::from_str(&record.state).map_err(|_| bad("state", &record.state))?;
    let rates = PatternRates {
        real_lo: rate(&record.real_rate_lo)?,
        real_de: rate(&record.real_rate_de)?,
        adjusted_lo: rate(&record.adjusted_rate_lo)?,
        adjusted_de: rate(&record.adjusted_rate_de)?,
    };
    let date_added: DateTime<Utc> = timestamp(record.date_added)?;
    let disabled_at = record.disabled_at.map(timestamp).transpose()?;

    Ok(ManagedPattern {
        id: record.id,
        pattern_id: record.pattern_id.clone(),
        name: record.name.clone(),
        description: record.description.clone(),
        kind,
        state,
        rates,
        current_streak: record.current_streak.clamp(i32::MIN as i64, i32::MAX as i64) as i32,
        wins10: record.wins_10.clamp(0, u32::MAX as i64) as u32,
        max_lose_streak: record.max_lose_streak.clamp(0, u32::MAX as i64) as u32,
        next_prediction: record.next_prediction.clone(),
        date_added,
        disabled_at,
    })
}

fn records_to_patterns(records: Vec<ManagedPatternRecord>) -> Vec<ManagedPattern> {
    records
        .into_iter()
        .filter_map(|record| match record_to_pattern(record) {
            Ok(pattern) => Some(pattern),
            Err(e) => {
                warn!(error = %e, "Skipping unreadable pattern row");
                None
            }
        })
        .collect()
}

// ============================================================================
// In-memory fake for tests
// ============================================================================

#[cfg(test)]
pub(crate) mod memory {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
    use std::sync::Mutex;

    use crate::normalize::normalize_name;

    /// Both collaborators kept in memory. `fail` makes every call error.
    #[derive(Default)]
    pub struct MemoryStore {
        pub draws: Mutex<Vec<DrawRecord>>,
        pub patterns: Mutex<Vec<ManagedPattern>>,
        pub fail: AtomicBool,
        next_id: AtomicI64,
    }

    impl MemoryStore {
        pub fn with_draws(draws: Vec<DrawRecord>) -> Self {
            let store = Self::default();
            *store.draws.lock().unwrap() = draws;
            store
        }

        pub fn add_pattern(&self, mut pattern: ManagedPattern) -> i64 {
            let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
            pattern.id = Some(id);
            self.patterns.lock().unwrap().push(pattern);
            id
        }

        pub fn pattern(&self, id: i64) -> Option<ManagedPattern> {
            self.patterns
                .lock()
                .unwrap()
                .iter()
                .find(|p| p.id == Some(id))
                .cloned()
        }

        fn check(&self) -> EngineResult<()> {
            if self.fail.load(Ordering::SeqCst) {
                Err(EngineError::Collaborator("store unavailable".to_string()))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl DrawHistory for MemoryStore {
        async fn recent_draws(&self, limit: usize) -> EngineResult<Vec<DrawRecord>> {
            self.check()?;
            let mut draws = self.draws.lock().unwrap().clone();
            draws.sort_by_key(|d| d.period);
            let skip = draws.len().saturating_sub(limit);
            Ok(draws.split_off(skip))
        }

        async fn draws_in_range(
            &self,
            start: Option<u32>,
            end: Option<u32>,
        ) -> EngineResult<Vec<DrawRecord>> {
            self.check()?;
            let mut draws: Vec<DrawRecord> = self
                .draws
                .lock()
                .unwrap()
                .iter()
                .filter(|d| start.map_or(true, |s| d.period >= s))
                .filter(|d| end.map_or(true, |e| d.period <= e))
                .cloned()
                .collect();
            draws.sort_by_key(|d| d.period);
            Ok(draws)
        }
    }

    #[async_trait]
    impl PatternRegistry for MemoryStore {
        async fn existing_names(&self) -> EngineResult<Vec<String>> {
            self.check()?;
            Ok(self
                .patterns
                .lock()
                .unwrap()
                .iter()
                .map(|p| p.name.clone())
                .collect())
        }

        async fn enabled_patterns(&self) -> EngineResult<Vec<ManagedPattern>> {
            self.check()?;
            Ok(self
                .patterns
                .lock()
                .unwrap()
                .iter()
                .filter(|p| p.state == PatternState::Enabled)
                .cloned()
                .collect())
        }

        async fn all_patterns(&self) -> EngineResult<Vec<ManagedPattern>> {
            self.check()?;
            Ok(self.patterns.lock().unwrap().clone())
        }

        async fn find_by_name(&self, normalized_name: &str) -> EngineResult<Option<ManagedPattern>> {
            self.check()?;
            Ok(self
                .patterns
                .lock()
                .unwrap()
                .iter()
                .find(|p| normalize_name(&p.name) == normalized_name)
                .cloned())
        }

        async fn update_pattern(&self, pattern: &ManagedPattern) -> EngineResult<()> {
            self.check()?;
            let mut patterns = self.patterns.lock().unwrap();
            let slot = patterns
                .iter_mut()
                .find(|p| p.id.is_some() && p.id == pattern.id)
                .ok_or_else(|| EngineError::NotFound(pattern.name.clone()))?;
            *slot = pattern.clone();
            Ok(())
        }

        async fn delete_pattern(&self, pattern: &ManagedPattern) -> EngineResult<()> {
            self.check()?;
            self.patterns
                .lock()
                .unwrap()
                .retain(|p| p.id != pattern.id);
            Ok(())
        }

        async fn bulk_insert(&self, patterns: &[ManagedPattern]) -> EngineResult<usize> {
            self.check()?;
            let mut existing: HashSet<String> = self
                .patterns
                .lock()
                .unwrap()
                .iter()
                .map(|p| normalize_name(&p.name))
                .collect();

            let mut inserted = 0;
            for pattern in patterns {
                if existing.insert(normalize_name(&pattern.name)) {
                    self.add_pattern(pattern.clone());
                    inserted += 1;
                }
            }
            Ok(inserted)
        }
    }
}
