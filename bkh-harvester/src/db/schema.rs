//! Table definitions (idempotent)

use sqlx::SqlitePool;

const RECORDS: &str = r#"
    CREATE TABLE IF NOT EXISTS records (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        title TEXT NOT NULL UNIQUE,
        is_template INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL
    )
"#;

const STEPS: &str = r#"
    CREATE TABLE IF NOT EXISTS steps (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        record_id INTEGER NOT NULL REFERENCES records(id) ON DELETE CASCADE,
        ordinal INTEGER NOT NULL,
        title TEXT NOT NULL,
        status TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        UNIQUE (record_id, ordinal)
    )
"#;

const METADATA: &str = r#"
    CREATE TABLE IF NOT EXISTS metadata (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        record_id INTEGER NOT NULL REFERENCES records(id) ON DELETE CASCADE,
        field TEXT NOT NULL,
        value TEXT NOT NULL
    )
"#;

const CATALOG_RECORDS: &str = r#"
    CREATE TABLE IF NOT EXISTS catalog_records (
        record_id INTEGER PRIMARY KEY REFERENCES records(id) ON DELETE CASCADE,
        catalog_name TEXT NOT NULL,
        search_field TEXT NOT NULL,
        search_value TEXT NOT NULL,
        title TEXT,
        marc_xml TEXT NOT NULL,
        attached_at TEXT NOT NULL
    )
"#;

const LOG_ENTRIES: &str = r#"
    CREATE TABLE IF NOT EXISTS log_entries (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        record_id INTEGER NOT NULL REFERENCES records(id) ON DELETE CASCADE,
        level TEXT NOT NULL,
        message TEXT NOT NULL,
        created_at TEXT NOT NULL
    )
"#;

const INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_steps_record ON steps(record_id, ordinal)",
    "CREATE INDEX IF NOT EXISTS idx_metadata_record ON metadata(record_id, field)",
    "CREATE INDEX IF NOT EXISTS idx_log_entries_record ON log_entries(record_id)",
];

pub async fn create_tables(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    for ddl in [RECORDS, STEPS, METADATA, CATALOG_RECORDS, LOG_ENTRIES] {
        sqlx::query(ddl).execute(pool).await?;
    }
    for ddl in INDEXES {
        sqlx::query(ddl).execute(pool).await?;
    }
    Ok(())
}
