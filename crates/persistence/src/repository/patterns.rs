//! Managed pattern repository: registry of approved and pending patterns

use crate::DbResult;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use tracing::debug;

/// A persisted pattern. Rates are decimal strings; timestamps are unix seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct ManagedPatternRecord {
    pub id: Option<i64>,
    pub pattern_id: String,
    pub name: String,
    pub normalized_name: String,
    pub description: String,
    /// "lo" | "de"
    pub category: String,
    /// "single" | "set"
    pub arity: String,
    /// "pending" | "enabled" | "disabled" | "deleted"
    pub state: String,
    pub real_rate_lo: String,
    pub real_rate_de: String,
    pub adjusted_rate_lo: String,
    pub adjusted_rate_de: String,
    pub current_streak: i64,
    pub wins_10: i64,
    pub max_lose_streak: i64,
    pub next_prediction: String,
    pub date_added: i64,
    pub disabled_at: Option<i64>,
}

const SELECT_COLUMNS: &str = r#"
    SELECT id, pattern_id, name, normalized_name, description, category, arity, state,
           real_rate_lo, real_rate_de, adjusted_rate_lo, adjusted_rate_de,
           current_streak, wins_10, max_lose_streak, next_prediction, date_added, disabled_at
    FROM managed_patterns
"#;

/// Repository for managed patterns
pub struct PatternRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> PatternRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get_all(&self) -> DbResult<Vec<ManagedPatternRecord>> {
        let sql = format!("{SELECT_COLUMNS} ORDER BY id ASC");
        let records = sqlx::query_as::<_, ManagedPatternRecord>(&sql)
            .fetch_all(self.pool)
            .await?;

        Ok(records)
    }

    pub async fn get_by_state(&self, state: &str) -> DbResult<Vec<ManagedPatternRecord>> {
        let sql = format!("{SELECT_COLUMNS} WHERE state = ? ORDER BY id ASC");
        let records = sqlx::query_as::<_, ManagedPatternRecord>(&sql)
            .bind(state)
            .fetch_all(self.pool)
            .await?;

        Ok(records)
    }

    pub async fn get_by_normalized_name(
        &self,
        normalized_name: &str,
    ) -> DbResult<Option<ManagedPatternRecord>> {
        let sql = format!("{SELECT_COLUMNS} WHERE normalized_name = ?");
        let record = sqlx::query_as::<_, ManagedPatternRecord>(&sql)
            .bind(normalized_name)
            .fetch_optional(self.pool)
            .await?;

        Ok(record)
    }

    /// Display names of every stored pattern, whatever its state
    pub async fn names(&self) -> DbResult<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT name FROM managed_patterns")
            .fetch_all(self.pool)
            .await?;

        Ok(rows.into_iter().map(|(name,)| name).collect())
    }

    /// Overwrite the mutable columns of an existing pattern (matched by id).
    /// Returns false when no row has that id.
    pub async fn update(&self, record: &ManagedPatternRecord) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE managed_patterns SET
                description = ?,
                state = ?,
                real_rate_lo = ?,
                real_rate_de = ?,
                adjusted_rate_lo = ?,
                adjusted_rate_de = ?,
                current_streak = ?,
                wins_10 = ?,
                max_lose_streak = ?,
                next_prediction = ?,
                disabled_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&record.description)
        .bind(&record.state)
        .bind(&record.real_rate_lo)
        .bind(&record.real_rate_de)
        .bind(&record.adjusted_rate_lo)
        .bind(&record.adjusted_rate_de)
        .bind(record.current_streak)
        .bind(record.wins_10)
        .bind(record.max_lose_streak)
        .bind(&record.next_prediction)
        .bind(record.disabled_at)
        .bind(record.id)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn delete(&self, id: i64) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM managed_patterns WHERE id = ?")
            .bind(id)
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Insert a batch (INSERT OR IGNORE: rows whose normalized_name already
    /// exists are skipped). Returns how many rows were actually inserted.
    pub async fn bulk_insert(&self, records: &[ManagedPatternRecord]) -> DbResult<usize> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0usize;

        for record in records {
            let result = sqlx::query(
                r#"
                INSERT OR IGNORE INTO managed_patterns (
                    pattern_id, name, normalized_name, description, category, arity, state,
                    real_rate_lo, real_rate_de, adjusted_rate_lo, adjusted_rate_de,
                    current_streak, wins_10, max_lose_streak, next_prediction,
                    date_added, disabled_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&record.pattern_id)
            .bind(&record.name)
            .bind(&record.normalized_name)
            .bind(&record.description)
            .bind(&record.category)
            .bind(&record.arity)
            .bind(&record.state)
            .bind(&record.real_rate_lo)
            .bind(&record.real_rate_de)
            .bind(&record.adjusted_rate_lo)
            .bind(&record.adjusted_rate_de)
            .bind(record.current_streak)
            .bind(record.wins_10)
            .bind(record.max_lose_streak)
            .bind(&record.next_prediction)
            .bind(record.date_added)
            .bind(record.disabled_at)
            .execute(&mut *tx)
            .await?;

            inserted += result.rows_affected() as usize;
        }

        tx.commit().await?;
        debug!(requested = records.len(), inserted, "Bulk insert finished");
        Ok(inserted)
    }
}
