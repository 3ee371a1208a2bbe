//! Draw history repository

use crate::DbResult;
use serde::{Deserialize, Serialize};
use sqlx::query::Query;
use sqlx::sqlite::SqliteArguments;
use sqlx::{FromRow, Sqlite, SqlitePool};

/// One stored draw. Prize fields keep the raw text as published
/// (multi-number tiers are comma-separated).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct DrawRow {
    pub period: i64,
    /// ISO date (YYYY-MM-DD)
    pub draw_date: String,
    pub special: String,
    pub first: String,
    pub second: String,
    pub third: String,
    pub fourth: String,
    pub fifth: String,
    pub sixth: String,
    pub seventh: String,
}

const UPSERT_SQL: &str = r#"
    INSERT INTO draws (period, draw_date, special, first, second, third, fourth, fifth, sixth, seventh)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
    ON CONFLICT(period) DO UPDATE SET
        draw_date = excluded.draw_date,
        special = excluded.special,
        first = excluded.first,
        second = excluded.second,
        third = excluded.third,
        fourth = excluded.fourth,
        fifth = excluded.fifth,
        sixth = excluded.sixth,
        seventh = excluded.seventh
"#;

/// Bind every column of `row` in [`UPSERT_SQL`] order
fn bind_row<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    row: &'q DrawRow,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    query
        .bind(row.period)
        .bind(&row.draw_date)
        .bind(&row.special)
        .bind(&row.first)
        .bind(&row.second)
        .bind(&row.third)
        .bind(&row.fourth)
        .bind(&row.fifth)
        .bind(&row.sixth)
        .bind(&row.seventh)
}

/// Repository for the draw history
pub struct DrawRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> DrawRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a draw, replacing the prize fields if the period already exists
    pub async fn upsert(&self, row: &DrawRow) -> DbResult<()> {
        bind_row(sqlx::query(UPSERT_SQL), row)
            .execute(self.pool)
            .await?;

        Ok(())
    }

    /// Upsert a batch of draws in one transaction. Returns the number written.
    pub async fn upsert_many(&self, rows: &[DrawRow]) -> DbResult<usize> {
        let mut tx = self.pool.begin().await?;

        for row in rows {
            bind_row(sqlx::query(UPSERT_SQL), row)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(rows.len())
    }

    /// The `limit` most recent draws, newest first
    pub async fn recent(&self, limit: i64) -> DbResult<Vec<DrawRow>> {
        let rows = sqlx::query_as::<_, DrawRow>(
            r#"
            SELECT period, draw_date, special, first, second, third, fourth, fifth, sixth, seventh
            FROM draws
            ORDER BY period DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(self.pool)
        .await?;

        Ok(rows)
    }

    /// Draws with `start <= period <= end`, oldest first. Either bound may be open.
    pub async fn range(&self, start: Option<i64>, end: Option<i64>) -> DbResult<Vec<DrawRow>> {
        let rows = sqlx::query_as::<_, DrawRow>(
            r#"
            SELECT period, draw_date, special, first, second, third, fourth, fifth, sixth, seventh
            FROM draws
            WHERE (? IS NULL OR period >= ?)
              AND (? IS NULL OR period <= ?)
            ORDER BY period ASC
            "#,
        )
        .bind(start)
        .bind(start)
        .bind(end)
        .bind(end)
        .fetch_all(self.pool)
        .await?;

        Ok(rows)
    }

    pub async fn count(&self) -> DbResult<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM draws")
            .fetch_one(self.pool)
            .await?;

        Ok(row.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;

    fn row(period: i64, special: &str) -> DrawRow {
        DrawRow {
            period,
            draw_date: format!("2024-01-{:02}", period),
            special: special.to_string(),
            first: "12345".to_string(),
            second: "11111, 22222".to_string(),
            third: String::new(),
            fourth: String::new(),
            fifth: String::new(),
            sixth: String::new(),
            seventh: String::new(),
        }
    }

    #[tokio::test]
    async fn test_upsert_replaces_existing_period() {
        let db = Database::in_memory().await.unwrap();
        let repo = DrawRepository::new(db.pool());

        repo.upsert(&row(1, "11111")).await.unwrap();
        repo.upsert(&row(1, "99999")).await.unwrap();

        assert_eq!(repo.count().await.unwrap(), 1);
        let recent = repo.recent(5).await.unwrap();
        assert_eq!(recent[0].special, "99999");
    }

    #[tokio::test]
    async fn test_batch_upsert_replaces_like_single_upsert() {
        let db = Database::in_memory().await.unwrap();
        let repo = DrawRepository::new(db.pool());

        repo.upsert(&row(2, "22222")).await.unwrap();
        let mut changed = row(2, "77777");
        changed.seventh = "01, 02, 03, 04".to_string();
        assert_eq!(repo.upsert_many(&[row(1, "11111"), changed.clone()]).await.unwrap(), 2);

        assert_eq!(repo.count().await.unwrap(), 2);
        let stored = repo.range(Some(2), Some(2)).await.unwrap();
        assert_eq!(stored, vec![changed]);
    }

    #[tokio::test]
    async fn test_recent_is_newest_first_and_limited() {
        let db = Database::in_memory().await.unwrap();
        let repo = DrawRepository::new(db.pool());

        let rows: Vec<DrawRow> = (1..=5).map(|p| row(p, "00000")).collect();
        assert_eq!(repo.upsert_many(&rows).await.unwrap(), 5);

        let recent = repo.recent(3).await.unwrap();
        let periods: Vec<i64> = recent.iter().map(|r| r.period).collect();
        assert_eq!(periods, vec![5, 4, 3]);
    }

    #[tokio::test]
    async fn test_range_bounds_are_inclusive() {
        let db = Database::in_memory().await.unwrap();
        let repo = DrawRepository::new(db.pool());

        let rows: Vec<DrawRow> = (1..=6).map(|p| row(p, "00000")).collect();
        repo.upsert_many(&rows).await.unwrap();

        let mid = repo.range(Some(2), Some(4)).await.unwrap();
        assert_eq!(mid.iter().map(|r| r.period).collect::<Vec<_>>(), vec![2, 3, 4]);

        let tail = repo.range(Some(5), None).await.unwrap();
        assert_eq!(tail.iter().map(|r| r.period).collect::<Vec<_>>(), vec![5, 6]);

        let all = repo.range(None, None).await.unwrap();
        assert_eq!(all.len(), 6);
    }
}
