//! SQLite implementation of [`WorkflowStore`]
//!
//! Records live under `<storage_root>/<record id>`. Templates are ordinary
//! records flagged `is_template`; creating from a template copies its steps
//! (with their statuses) and metadata in one transaction.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info};

use crate::models::{CatalogRecord, LogLevel, Step, StepStatus, WorkflowRecord};
use crate::workflow::{StoreError, WorkflowStore};

/// Workflow store backed by SQLite
#[derive(Debug, Clone)]
pub struct SqliteWorkflowStore {
    pool: SqlitePool,
    storage_root: PathBuf,
}

impl SqliteWorkflowStore {
    pub fn new(pool: SqlitePool, storage_root: impl Into<PathBuf>) -> Self {
        Self {
            pool,
            storage_root: storage_root.into(),
        }
    }

    /// Open `db_path` (creating tables if needed)
    pub async fn open(db_path: &Path, storage_root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let pool = super::init_database(db_path).await?;
        Ok(Self::new(pool, storage_root))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn storage_dir_for(&self, id: i64) -> PathBuf {
        self.storage_root.join(id.to_string())
    }

    /// Seed a template: first step OPEN, the rest LOCKED
    pub async fn create_template(
        &self,
        title: &str,
        step_titles: &[String],
    ) -> Result<WorkflowRecord, StoreError> {
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;

        let id: i64 = sqlx::query_scalar(
            "INSERT INTO records (title, is_template, created_at) VALUES (?, 1, ?) RETURNING id",
        )
        .bind(title)
        .bind(&now)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| duplicate_or(e, title))?;

        for (ordinal, step_title) in step_titles.iter().enumerate() {
            let status = if ordinal == 0 {
                StepStatus::Open
            } else {
                StepStatus::Locked
            };
            sqlx::query(
                "INSERT INTO steps (record_id, ordinal, title, status, updated_at) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(id)
            .bind(ordinal as i64 + 1)
            .bind(step_title)
            .bind(status.as_str())
            .bind(&now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        info!(title, steps = step_titles.len(), "Template created");
        Ok(WorkflowRecord::new(id, title, self.storage_dir_for(id)))
    }

    /// Look up a record by title
    pub async fn find_record(&self, title: &str) -> Result<Option<WorkflowRecord>, StoreError> {
        let id: Option<i64> = sqlx::query_scalar("SELECT id FROM records WHERE title = ?")
            .bind(title)
            .fetch_optional(&self.pool)
            .await?;
        Ok(id.map(|id| WorkflowRecord::new(id, title, self.storage_dir_for(id))))
    }

    /// All steps of a record in ordinal order
    pub async fn steps(&self, record: &WorkflowRecord) -> Result<Vec<Step>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, record_id, ordinal, title, status FROM steps WHERE record_id = ? ORDER BY ordinal",
        )
        .bind(record.id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(step_from_row).collect()
    }

    /// Values of one metadata field in insertion order
    pub async fn metadata(
        &self,
        record: &WorkflowRecord,
        field: &str,
    ) -> Result<Vec<String>, StoreError> {
        let values = sqlx::query_scalar(
            "SELECT value FROM metadata WHERE record_id = ? AND field = ? ORDER BY id",
        )
        .bind(record.id)
        .bind(field)
        .fetch_all(&self.pool)
        .await?;
        Ok(values)
    }

    /// Log messages of a record, oldest first
    pub async fn log_messages(&self, record: &WorkflowRecord) -> Result<Vec<String>, StoreError> {
        let messages = sqlx::query_scalar(
            "SELECT level || ': ' || message FROM log_entries WHERE record_id = ? ORDER BY id",
        )
        .bind(record.id)
        .fetch_all(&self.pool)
        .await?;
        Ok(messages)
    }

    async fn first_step_where(
        &self,
        record: &WorkflowRecord,
        status: Option<StepStatus>,
    ) -> Result<Option<Step>, StoreError> {
        let row = match status {
            Some(status) => {
                sqlx::query(
                    "SELECT id, record_id, ordinal, title, status FROM steps
                     WHERE record_id = ? AND status = ? ORDER BY ordinal LIMIT 1",
                )
                .bind(record.id)
                .bind(status.as_str())
                .fetch_optional(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT id, record_id, ordinal, title, status FROM steps
                     WHERE record_id = ? ORDER BY ordinal LIMIT 1",
                )
                .bind(record.id)
                .fetch_optional(&self.pool)
                .await?
            }
        };
        row.as_ref().map(step_from_row).transpose()
    }
}

#[async_trait]
impl WorkflowStore for SqliteWorkflowStore {
    async fn record_exists(&self, title: &str) -> Result<bool, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM records WHERE title = ?")
            .bind(title)
            .fetch_one(&self.pool)
            .await?;
        Ok(count > 0)
    }

    async fn create_from_template(
        &self,
        template_title: &str,
        new_title: &str,
    ) -> Result<WorkflowRecord, StoreError> {
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;

        let template_id: i64 =
            sqlx::query_scalar("SELECT id FROM records WHERE title = ? AND is_template = 1")
                .bind(template_title)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| StoreError::TemplateNotFound(template_title.to_string()))?;

        let id: i64 = sqlx::query_scalar(
            "INSERT INTO records (title, is_template, created_at) VALUES (?, 0, ?) RETURNING id",
        )
        .bind(new_title)
        .bind(&now)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| duplicate_or(e, new_title))?;

        sqlx::query(
            "INSERT INTO steps (record_id, ordinal, title, status, updated_at)
             SELECT ?, ordinal, title, status, ? FROM steps WHERE record_id = ? ORDER BY ordinal",
        )
        .bind(id)
        .bind(&now)
        .bind(template_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO metadata (record_id, field, value)
             SELECT ?, field, value FROM metadata WHERE record_id = ? ORDER BY id",
        )
        .bind(id)
        .bind(template_id)
        .execute(&mut *tx)
        .await?;

        // Directory first: an uncommitted transaction rolls back on drop, so a
        // failure here leaves no row behind.
        let record = WorkflowRecord::new(id, new_title, self.storage_dir_for(id));
        std::fs::create_dir_all(record.storage_dir()).map_err(|source| StoreError::Io {
            path: record.storage_dir().to_path_buf(),
            source,
        })?;

        if let Err(e) = tx.commit().await {
            let _ = std::fs::remove_dir_all(record.storage_dir());
            return Err(e.into());
        }

        debug!(title = new_title, id, template = template_title, "Record created from template");
        Ok(record)
    }

    async fn delete_record_and_storage(&self, record: &WorkflowRecord) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        for table in ["steps", "metadata", "catalog_records", "log_entries"] {
            sqlx::query(&format!("DELETE FROM {table} WHERE record_id = ?"))
                .bind(record.id)
                .execute(&mut *tx)
                .await?;
        }
        let deleted = sqlx::query("DELETE FROM records WHERE id = ?")
            .bind(record.id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        tx.commit().await?;

        if deleted == 0 {
            return Err(StoreError::RecordNotFound(record.title.clone()));
        }

        match std::fs::remove_dir_all(record.storage_dir()) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(source) => {
                return Err(StoreError::Io {
                    path: record.storage_dir().to_path_buf(),
                    source,
                })
            }
        }

        debug!(title = %record.title, id = record.id, "Record and storage deleted");
        Ok(())
    }

    async fn first_open_step(&self, record: &WorkflowRecord) -> Result<Option<Step>, StoreError> {
        self.first_step_where(record, Some(StepStatus::Open)).await
    }

    async fn first_step(&self, record: &WorkflowRecord) -> Result<Option<Step>, StoreError> {
        self.first_step_where(record, None).await
    }

    async fn advance_step(&self, step: &Step) -> Result<(), StoreError> {
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query("UPDATE steps SET status = ?, updated_at = ? WHERE id = ?")
            .bind(StepStatus::Done.as_str())
            .bind(&now)
            .bind(step.id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if updated == 0 {
            return Err(StoreError::RecordNotFound(format!("step {}", step.id)));
        }

        sqlx::query(
            "UPDATE steps SET status = ?, updated_at = ?
             WHERE id = (SELECT id FROM steps
                         WHERE record_id = ? AND ordinal > ? AND status = ?
                         ORDER BY ordinal LIMIT 1)",
        )
        .bind(StepStatus::Open.as_str())
        .bind(&now)
        .bind(step.record_id)
        .bind(step.ordinal)
        .bind(StepStatus::Locked.as_str())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        debug!(step_id = step.id, step = %step.title, "Step closed");
        Ok(())
    }

    async fn set_step_status(&self, step: &Step, status: StepStatus) -> Result<(), StoreError> {
        let updated = sqlx::query("UPDATE steps SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(Utc::now().to_rfc3339())
            .bind(step.id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        if updated == 0 {
            return Err(StoreError::RecordNotFound(format!("step {}", step.id)));
        }
        Ok(())
    }

    async fn append_log_entry(
        &self,
        record: &WorkflowRecord,
        message: &str,
        level: LogLevel,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO log_entries (record_id, level, message, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(record.id)
        .bind(level.as_str())
        .bind(message)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_metadata(
        &self,
        record: &WorkflowRecord,
        field: &str,
        values: &[String],
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM metadata WHERE record_id = ? AND field = ?")
            .bind(record.id)
            .bind(field)
            .execute(&mut *tx)
            .await?;
        for value in values {
            sqlx::query("INSERT INTO metadata (record_id, field, value) VALUES (?, ?, ?)")
                .bind(record.id)
                .bind(field)
                .bind(value)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn attach_catalog_record(
        &self,
        record: &WorkflowRecord,
        catalog: &CatalogRecord,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO catalog_records (
                record_id, catalog_name, search_field, search_value, title, marc_xml, attached_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(record_id) DO UPDATE SET
                catalog_name = excluded.catalog_name,
                search_field = excluded.search_field,
                search_value = excluded.search_value,
                title = excluded.title,
                marc_xml = excluded.marc_xml,
                attached_at = excluded.attached_at
            "#,
        )
        .bind(record.id)
        .bind(&catalog.catalog_name)
        .bind(&catalog.identifier.search_field)
        .bind(&catalog.identifier.search_value)
        .bind(&catalog.title)
        .bind(&catalog.marc_xml)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn step_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Step, StoreError> {
    let status: String = row.get("status");
    Ok(Step {
        id: row.get("id"),
        record_id: row.get("record_id"),
        ordinal: row.get("ordinal"),
        title: row.get("title"),
        status: StepStatus::from_str(&status).map_err(StoreError::Invalid)?,
    })
}

fn duplicate_or(error: sqlx::Error, title: &str) -> StoreError {
    match &error {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StoreError::DuplicateTitle(title.to_string())
        }
        _ => StoreError::Database(error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CatalogIdentifier;

    async fn store(dir: &Path) -> SqliteWorkflowStore {
        SqliteWorkflowStore::open(&dir.join("harvester.db"), dir.join("metadata"))
            .await
            .unwrap()
    }

    fn steps(titles: &[&str]) -> Vec<String> {
        titles.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_create_from_template_copies_steps() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path()).await;
        store
            .create_template("Template", &steps(&["Import", "QA", "Export"]))
            .await
            .unwrap();

        let record = store
            .create_from_template("Template", "Google-1")
            .await
            .unwrap();

        assert!(store.record_exists("Google-1").await.unwrap());
        assert!(record.storage_dir().is_dir());
        let copied = store.steps(&record).await.unwrap();
        let statuses: Vec<StepStatus> = copied.iter().map(|s| s.status).collect();
        assert_eq!(
            statuses,
            vec![StepStatus::Open, StepStatus::Locked, StepStatus::Locked]
        );
    }

    #[tokio::test]
    async fn test_duplicate_title_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path()).await;
        store.create_template("Template", &steps(&["Import"])).await.unwrap();
        store.create_from_template("Template", "Google-1").await.unwrap();

        let result = store.create_from_template("Template", "Google-1").await;
        assert!(matches!(result, Err(StoreError::DuplicateTitle(_))));
    }

    #[tokio::test]
    async fn test_missing_template() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path()).await;

        let result = store.create_from_template("Nope", "Google-1").await;
        assert!(matches!(result, Err(StoreError::TemplateNotFound(_))));
        assert!(!store.record_exists("Google-1").await.unwrap());
    }

    #[tokio::test]
    async fn test_directory_failure_leaves_no_record() {
        // Given: storage root is a regular file, so no record dir can be made
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("metadata");
        std::fs::write(&root, b"not a directory").unwrap();
        let store = SqliteWorkflowStore::open(&dir.path().join("harvester.db"), root)
            .await
            .unwrap();
        store.create_template("Template", &steps(&["Import", "QA"])).await.unwrap();

        // When
        let result = store.create_from_template("Template", "Google-1").await;

        // Then: error, and neither the record nor its steps were kept
        assert!(matches!(result, Err(StoreError::Io { .. })));
        assert!(!store.record_exists("Google-1").await.unwrap());
        let step_rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM steps")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(step_rows, 2);
    }

    #[tokio::test]
    async fn test_advance_opens_next_locked_step() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path()).await;
        store
            .create_template("Template", &steps(&["Import", "QA"]))
            .await
            .unwrap();
        let record = store.create_from_template("Template", "Google-1").await.unwrap();

        let open = store.first_open_step(&record).await.unwrap().unwrap();
        assert_eq!(open.title, "Import");
        store.advance_step(&open).await.unwrap();

        let after = store.steps(&record).await.unwrap();
        assert_eq!(after[0].status, StepStatus::Done);
        assert_eq!(after[1].status, StepStatus::Open);
        assert_eq!(
            store.first_open_step(&record).await.unwrap().unwrap().title,
            "QA"
        );
    }

    #[tokio::test]
    async fn test_flag_error_and_log() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path()).await;
        store.create_template("Template", &steps(&["Import"])).await.unwrap();
        let record = store.create_from_template("Template", "Google-1").await.unwrap();

        let first = store.first_step(&record).await.unwrap().unwrap();
        store.set_step_status(&first, StepStatus::Error).await.unwrap();
        store
            .append_log_entry(&record, "no identifier", LogLevel::Error)
            .await
            .unwrap();

        assert!(store.first_open_step(&record).await.unwrap().is_none());
        assert_eq!(
            store.log_messages(&record).await.unwrap(),
            vec!["error: no identifier".to_string()]
        );
    }

    #[tokio::test]
    async fn test_delete_removes_rows_and_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path()).await;
        store.create_template("Template", &steps(&["Import"])).await.unwrap();
        let record = store.create_from_template("Template", "Google-1").await.unwrap();
        std::fs::create_dir_all(record.source_dir()).unwrap();
        std::fs::write(record.source_dir().join("NLI_1.tar.gz.gpg"), b"x").unwrap();
        store
            .set_metadata(&record, "CatalogIDDigital", &["A-1".to_string()])
            .await
            .unwrap();

        store.delete_record_and_storage(&record).await.unwrap();

        assert!(!store.record_exists("Google-1").await.unwrap());
        assert!(!record.storage_dir().exists());
        assert!(store.steps(&record).await.unwrap().is_empty());
        assert!(store.metadata(&record, "CatalogIDDigital").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_set_metadata_replaces_values() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path()).await;
        store.create_template("Template", &steps(&["Import"])).await.unwrap();
        let record = store.create_from_template("Template", "Google-1").await.unwrap();

        store
            .set_metadata(&record, "CatalogIDDigital", &["A-1".to_string(), "B-2".to_string()])
            .await
            .unwrap();
        store
            .set_metadata(&record, "CatalogIDDigital", &["C-3".to_string()])
            .await
            .unwrap();

        assert_eq!(
            store.metadata(&record, "CatalogIDDigital").await.unwrap(),
            vec!["C-3".to_string()]
        );
    }

    #[tokio::test]
    async fn test_attach_catalog_record_upserts() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path()).await;
        store.create_template("Template", &steps(&["Import"])).await.unwrap();
        let record = store.create_from_template("Template", "Google-1").await.unwrap();

        let catalog = CatalogRecord {
            catalog_name: "NLI Alma".to_string(),
            identifier: CatalogIdentifier::new("1007", "A-1"),
            title: Some("Sefer".to_string()),
            marc_xml: "<record/>".to_string(),
        };
        store.attach_catalog_record(&record, &catalog).await.unwrap();
        store.attach_catalog_record(&record, &catalog).await.unwrap();

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM catalog_records WHERE record_id = ?")
            .bind(record.id)
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(count, 1);
    }
}
