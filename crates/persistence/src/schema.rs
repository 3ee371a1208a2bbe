//! Database schema definitions

/// SQL to create all tables
/// NOTE: Rates are stored as TEXT to preserve rust_decimal::Decimal precision
pub const CREATE_TABLES: &str = r#"
-- Draw history, one row per period
CREATE TABLE IF NOT EXISTS draws (
    period INTEGER PRIMARY KEY,
    draw_date TEXT NOT NULL,
    special TEXT NOT NULL DEFAULT '',
    first TEXT NOT NULL DEFAULT '',
    second TEXT NOT NULL DEFAULT '',
    third TEXT NOT NULL DEFAULT '',
    fourth TEXT NOT NULL DEFAULT '',
    fifth TEXT NOT NULL DEFAULT '',
    sixth TEXT NOT NULL DEFAULT '',
    seventh TEXT NOT NULL DEFAULT ''
);

-- Managed patterns (approved or pending candidates)
CREATE TABLE IF NOT EXISTS managed_patterns (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    pattern_id TEXT NOT NULL,
    name TEXT NOT NULL,
    normalized_name TEXT NOT NULL UNIQUE,
    description TEXT NOT NULL DEFAULT '',
    category TEXT NOT NULL,
    arity TEXT NOT NULL,
    state TEXT NOT NULL DEFAULT 'pending',
    real_rate_lo TEXT NOT NULL DEFAULT '0',
    real_rate_de TEXT NOT NULL DEFAULT '0',
    adjusted_rate_lo TEXT NOT NULL DEFAULT '0',
    adjusted_rate_de TEXT NOT NULL DEFAULT '0',
    current_streak INTEGER NOT NULL DEFAULT 0,
    wins_10 INTEGER NOT NULL DEFAULT 0,
    next_prediction TEXT NOT NULL DEFAULT '',
    date_added INTEGER NOT NULL DEFAULT (strftime('%s', 'now')),
    disabled_at INTEGER
);

-- ========== INDEXES ==========

CREATE INDEX IF NOT EXISTS idx_draws_date ON draws(draw_date);
CREATE INDEX IF NOT EXISTS idx_patterns_state ON managed_patterns(state);
CREATE INDEX IF NOT EXISTS idx_patterns_pattern_id ON managed_patterns(pattern_id)
"#;

/// A column added after the first release. Applied only when `table` lacks `column`.
pub struct AddColumn {
    pub table: &'static str,
    pub column: &'static str,
    pub definition: &'static str,
}

impl AddColumn {
    pub fn sql(&self) -> String {
        format!(
            "ALTER TABLE {} ADD COLUMN {} {}",
            self.table, self.column, self.definition
        )
    }
}

pub const ADDED_COLUMNS: &[AddColumn] = &[AddColumn {
    table: "managed_patterns",
    column: "max_lose_streak",
    definition: "INTEGER NOT NULL DEFAULT 0",
}];

/// Split a script into executable statements, dropping `--` comment lines
/// and statements left empty
pub fn statements(script: &str) -> impl Iterator<Item = String> + '_ {
    script.split(';').filter_map(|chunk| {
        let sql = chunk
            .lines()
            .filter(|line| !line.trim_start().starts_with("--"))
            .collect::<Vec<_>>()
            .join("\n");
        let sql = sql.trim();
        (!sql.is_empty()).then(|| sql.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statements_skip_comments_and_blanks() {
        let script = "-- header\nCREATE TABLE a (x);\n\n  -- only a comment\n;\nCREATE INDEX i ON a(x)\n";
        let parsed: Vec<String> = statements(script).collect();
        assert_eq!(parsed, vec!["CREATE TABLE a (x)", "CREATE INDEX i ON a(x)"]);
    }

    #[test]
    fn test_schema_script_has_every_table_and_index() {
        let parsed: Vec<String> = statements(CREATE_TABLES).collect();
        assert_eq!(parsed.len(), 5);
        assert!(parsed.iter().all(|s| s.starts_with("CREATE")));
    }

    #[test]
    fn test_added_column_sql() {
        assert_eq!(
            ADDED_COLUMNS[0].sql(),
            "ALTER TABLE managed_patterns ADD COLUMN max_lose_streak INTEGER NOT NULL DEFAULT 0"
        );
    }
}
