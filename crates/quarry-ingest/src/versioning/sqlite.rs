//! SQLite version store (`metadata.db`)

use super::store::{ArtifactWriter, DatasetRegistration, NewVersion, VersionStore, SQLITE_FILE};
use crate::error::{IngestError, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use quarry_common::types::{DatasetRecord, DatasetVersion, RunRecord, RunStatus, Schema};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// Initialize the metadata schema
fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS datasets (
            id TEXT PRIMARY KEY,
            source TEXT NOT NULL,
            title TEXT,
            description TEXT,
            license TEXT,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS ingestion_runs (
            run_id TEXT PRIMARY KEY,
            manifest_name TEXT NOT NULL,
            manifest_hash TEXT NOT NULL,
            started_at TEXT NOT NULL,
            completed_at TEXT,
            status TEXT NOT NULL,
            datasets_processed INTEGER NOT NULL DEFAULT 0,
            datasets_failed INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS dataset_versions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            dataset_id TEXT NOT NULL,
            run_id TEXT NOT NULL,
            raw_path TEXT NOT NULL,
            normalized_path TEXT,
            content_hash TEXT NOT NULL,
            row_count INTEGER,
            retrieved_at TEXT NOT NULL,
            schema_json TEXT,  -- JSON

            FOREIGN KEY(dataset_id) REFERENCES datasets(id)
        );

        CREATE INDEX IF NOT EXISTS idx_versions_dataset
            ON dataset_versions(dataset_id, retrieved_at);
        CREATE INDEX IF NOT EXISTS idx_runs_started
            ON ingestion_runs(started_at);
        "#,
    )?;

    Ok(())
}

/// Fixed-width RFC 3339 so text ordering matches time ordering
fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(idx: usize, value: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn parse_optional_timestamp(idx: usize, value: Option<String>) -> rusqlite::Result<Option<DateTime<Utc>>> {
    value.map(|v| parse_timestamp(idx, &v)).transpose()
}

fn conversion_error(
    idx: usize,
    e: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
}

fn count(value: i64) -> usize {
    usize::try_from(value).unwrap_or_default()
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    let status: String = row.get(5)?;
    Ok(RunRecord {
        run_id: row.get(0)?,
        manifest_name: row.get(1)?,
        manifest_hash: row.get(2)?,
        started_at: parse_timestamp(3, &row.get::<_, String>(3)?)?,
        completed_at: parse_optional_timestamp(4, row.get(4)?)?,
        status: status.parse::<RunStatus>().map_err(|e| conversion_error(5, e))?,
        datasets_processed: count(row.get(6)?),
        datasets_failed: count(row.get(7)?),
    })
}

fn version_from_row(row: &Row<'_>) -> rusqlite::Result<DatasetVersion> {
    let schema = row
        .get::<_, Option<String>>(8)?
        .map(|json| serde_json::from_str::<Schema>(&json))
        .transpose()
        .map_err(|e| conversion_error(8, e))?;

    Ok(DatasetVersion {
        sequence: row.get(0)?,
        dataset_id: row.get(1)?,
        run_id: row.get(2)?,
        raw_path: row.get(3)?,
        normalized_path: row.get(4)?,
        content_hash: row.get(5)?,
        row_count: row.get::<_, Option<i64>>(6)?.map(count),
        retrieved_at: parse_timestamp(7, &row.get::<_, String>(7)?)?,
        schema,
    })
}

/// SQLite-backed version store
pub struct SqliteVersionStore {
    db: Arc<Mutex<Connection>>,
    artifacts: ArtifactWriter,
}

impl SqliteVersionStore {
    /// Open (or create) `metadata.db` under `output_dir`
    pub fn open(output_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(output_dir)?;

        let db_path = output_dir.join(SQLITE_FILE);
        let conn = Connection::open(&db_path).map_err(|e| {
            IngestError::store(format!(
                "Failed to open metadata database {}: {}",
                db_path.display(),
                e
            ))
        })?;

        Self::with_connection(conn, output_dir)
    }

    /// In-memory metadata with artifacts still written under `output_dir`
    pub fn in_memory(output_dir: &Path) -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| {
            IngestError::store(format!("Failed to create in-memory database: {}", e))
        })?;

        Self::with_connection(conn, output_dir)
    }

    fn with_connection(conn: Connection, output_dir: &Path) -> Result<Self> {
        init_schema(&conn)?;

        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
            artifacts: ArtifactWriter::new(output_dir),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.db
            .lock()
            .map_err(|e| IngestError::store(format!("Failed to acquire database lock: {}", e)))
    }
}

#[async_trait]
impl VersionStore for SqliteVersionStore {
    async fn start_run(&self, run_id: &str, manifest_name: &str, manifest_hash: &str) -> Result<()> {
        let conn = self.conn()?;

        conn.execute(
            r#"
            INSERT INTO ingestion_runs (run_id, manifest_name, manifest_hash, started_at, status)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                run_id,
                manifest_name,
                manifest_hash,
                timestamp(Utc::now()),
                RunStatus::Running.as_str(),
            ],
        )
        .map_err(|e| IngestError::store(format!("Failed to record run start: {}", e)))?;

        Ok(())
    }

    async fn complete_run(
        &self,
        run_id: &str,
        status: RunStatus,
        datasets_processed: usize,
        datasets_failed: usize,
    ) -> Result<()> {
        let conn = self.conn()?;

        let updated = conn
            .execute(
                r#"
                UPDATE ingestion_runs
                SET completed_at = ?1, status = ?2, datasets_processed = ?3, datasets_failed = ?4
                WHERE run_id = ?5
                "#,
                params![
                    timestamp(Utc::now()),
                    status.as_str(),
                    datasets_processed as i64,
                    datasets_failed as i64,
                    run_id,
                ],
            )
            .map_err(|e| IngestError::store(format!("Failed to record run completion: {}", e)))?;

        if updated == 0 {
            return Err(IngestError::store(format!("Unknown run: {run_id}")));
        }

        Ok(())
    }

    async fn register_dataset(&self, dataset: &DatasetRegistration) -> Result<()> {
        let conn = self.conn()?;

        conn.execute(
            r#"
            INSERT INTO datasets (id, source, title, description, license, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(id) DO UPDATE SET
                source = excluded.source,
                title = excluded.title,
                description = excluded.description,
                license = excluded.license
            "#,
            params![
                dataset.id,
                dataset.source,
                dataset.title,
                dataset.description,
                dataset.license,
                timestamp(Utc::now()),
            ],
        )
        .map_err(|e| IngestError::store(format!("Failed to register dataset: {}", e)))?;

        Ok(())
    }

    async fn record_version(&self, version: NewVersion) -> Result<DatasetVersion> {
        let conn = self.conn()?;

        let retrieved_at = Utc::now();
        let schema_json = version
            .schema
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        conn.execute(
            r#"
            INSERT INTO dataset_versions (
                dataset_id, run_id, raw_path, normalized_path,
                content_hash, row_count, retrieved_at, schema_json
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                version.dataset_id,
                version.run_id,
                version.raw_path,
                version.normalized_path,
                version.content_hash,
                version.row_count.map(|n| n as i64),
                timestamp(retrieved_at),
                schema_json,
            ],
        )
        .map_err(|e| IngestError::store(format!("Failed to record version: {}", e)))?;

        let sequence = conn.last_insert_rowid();
        Ok(version.stamp(sequence, retrieved_at))
    }

    async fn latest_hash(&self, dataset_id: &str) -> Result<Option<String>> {
        let conn = self.conn()?;

        let hash = conn
            .query_row(
                r#"
                SELECT content_hash FROM dataset_versions
                WHERE dataset_id = ?1
                ORDER BY retrieved_at DESC, id DESC
                LIMIT 1
                "#,
                params![dataset_id],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .map_err(|e| IngestError::store(format!("Failed to get latest hash: {}", e)))?;

        Ok(hash)
    }

    async fn datasets(&self) -> Result<Vec<DatasetRecord>> {
        let conn = self.conn()?;

        let mut stmt = conn
            .prepare(
                r#"
                SELECT d.id, d.source, d.title, d.description, d.license,
                       v.content_hash, v.retrieved_at
                FROM datasets d
                LEFT JOIN dataset_versions v ON v.id = (
                    SELECT id FROM dataset_versions
                    WHERE dataset_id = d.id
                    ORDER BY retrieved_at DESC, id DESC
                    LIMIT 1
                )
                ORDER BY d.rowid ASC
                "#,
            )
            .map_err(|e| IngestError::store(format!("Failed to prepare query: {}", e)))?;

        let rows = stmt
            .query_map([], |row| {
                Ok(DatasetRecord {
                    id: row.get(0)?,
                    source: row.get(1)?,
                    title: row.get(2)?,
                    description: row.get(3)?,
                    license: row.get(4)?,
                    latest_hash: row.get(5)?,
                    last_updated: parse_optional_timestamp(6, row.get(6)?)?,
                })
            })
            .map_err(|e| IngestError::store(format!("Failed to query datasets: {}", e)))?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| IngestError::store(format!("Failed to collect datasets: {}", e)))
    }

    async fn runs(&self, limit: usize) -> Result<Vec<RunRecord>> {
        let conn = self.conn()?;

        let mut stmt = conn
            .prepare(
                r#"
                SELECT run_id, manifest_name, manifest_hash, started_at, completed_at,
                       status, datasets_processed, datasets_failed
                FROM ingestion_runs
                ORDER BY started_at DESC, rowid DESC
                LIMIT ?1
                "#,
            )
            .map_err(|e| IngestError::store(format!("Failed to prepare query: {}", e)))?;

        let rows = stmt
            .query_map(params![limit as i64], run_from_row)
            .map_err(|e| IngestError::store(format!("Failed to query runs: {}", e)))?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| IngestError::store(format!("Failed to collect runs: {}", e)))
    }

    async fn versions(&self, dataset_id: &str) -> Result<Vec<DatasetVersion>> {
        let conn = self.conn()?;

        let mut stmt = conn
            .prepare(
                r#"
                SELECT id, dataset_id, run_id, raw_path, normalized_path,
                       content_hash, row_count, retrieved_at, schema_json
                FROM dataset_versions
                WHERE dataset_id = ?1
                ORDER BY retrieved_at ASC, id ASC
                "#,
            )
            .map_err(|e| IngestError::store(format!("Failed to prepare query: {}", e)))?;

        let rows = stmt
            .query_map(params![dataset_id], version_from_row)
            .map_err(|e| IngestError::store(format!("Failed to query versions: {}", e)))?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| IngestError::store(format!("Failed to collect versions: {}", e)))
    }

    fn artifacts(&self) -> &ArtifactWriter {
        &self.artifacts
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use quarry_common::types::{FieldSchema, FieldType};
    use tempfile::TempDir;

    fn registration(id: &str) -> DatasetRegistration {
        DatasetRegistration {
            id: id.to_string(),
            source: "fred".to_string(),
            title: Some("Gross Domestic Product".to_string()),
            description: None,
            license: Some("public-domain".to_string()),
        }
    }

    fn new_version(dataset_id: &str, run_id: &str, hash: &str) -> NewVersion {
        NewVersion {
            dataset_id: dataset_id.to_string(),
            run_id: run_id.to_string(),
            raw_path: format!("raw/{dataset_id}_{run_id}.json"),
            normalized_path: Some(format!("normalized/{dataset_id}_{run_id}.json")),
            content_hash: hash.to_string(),
            row_count: Some(2),
            schema: Some(Schema {
                fields: vec![FieldSchema {
                    name: "value".to_string(),
                    field_type: FieldType::Number,
                    nullable: true,
                }],
                row_count: 2,
            }),
        }
    }

    #[tokio::test]
    async fn test_run_lifecycle() {
        let dir = TempDir::new().unwrap();
        let store = SqliteVersionStore::in_memory(dir.path()).unwrap();

        store.start_run("run1", "phase1", "abcd").await.unwrap();
        let runs = store.runs(5).await.unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status, RunStatus::Running);
        assert!(runs[0].completed_at.is_none());

        store
            .complete_run("run1", RunStatus::CompletedWithErrors, 2, 1)
            .await
            .unwrap();
        let runs = store.runs(5).await.unwrap();
        assert_eq!(runs[0].status, RunStatus::CompletedWithErrors);
        assert_eq!(runs[0].datasets_processed, 2);
        assert_eq!(runs[0].datasets_failed, 1);
        assert!(runs[0].completed_at.is_some());
    }

    #[tokio::test]
    async fn test_complete_unknown_run_fails() {
        let dir = TempDir::new().unwrap();
        let store = SqliteVersionStore::in_memory(dir.path()).unwrap();

        let err = store
            .complete_run("missing", RunStatus::Completed, 0, 0)
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Store(_)));
    }

    #[tokio::test]
    async fn test_latest_hash_follows_appends() {
        let dir = TempDir::new().unwrap();
        let store = SqliteVersionStore::in_memory(dir.path()).unwrap();
        store.register_dataset(&registration("gdp")).await.unwrap();

        assert_eq!(store.latest_hash("gdp").await.unwrap(), None);

        let first = store.record_version(new_version("gdp", "r1", "h1")).await.unwrap();
        let second = store.record_version(new_version("gdp", "r2", "h2")).await.unwrap();
        assert!(second.sequence > first.sequence);

        assert_eq!(store.latest_hash("gdp").await.unwrap().as_deref(), Some("h2"));

        let versions = store.versions("gdp").await.unwrap();
        assert_eq!(versions.len(), 2);
        assert_eq!(versions[1].schema.as_ref().unwrap().type_of("value"), Some(FieldType::Number));
        assert_eq!(versions[1].row_count, Some(2));
    }

    #[tokio::test]
    async fn test_latest_hash_breaks_timestamp_ties_by_insertion() {
        let dir = TempDir::new().unwrap();
        let store = SqliteVersionStore::in_memory(dir.path()).unwrap();
        store.register_dataset(&registration("gdp")).await.unwrap();

        store.record_version(new_version("gdp", "r1", "h1")).await.unwrap();
        store.record_version(new_version("gdp", "r2", "h2")).await.unwrap();

        let at = timestamp(Utc::now());
        store
            .conn()
            .unwrap()
            .execute("UPDATE dataset_versions SET retrieved_at = ?1", params![at])
            .unwrap();
        assert_eq!(store.latest_hash("gdp").await.unwrap().as_deref(), Some("h2"));

        // A strictly newer timestamp wins over insertion order
        let later = timestamp(Utc::now() + chrono::Duration::seconds(60));
        store
            .conn()
            .unwrap()
            .execute(
                "UPDATE dataset_versions SET retrieved_at = ?1 WHERE content_hash = 'h1'",
                params![later],
            )
            .unwrap();
        assert_eq!(store.latest_hash("gdp").await.unwrap().as_deref(), Some("h1"));
    }

    #[tokio::test]
    async fn test_datasets_carry_latest_version() {
        let dir = TempDir::new().unwrap();
        let store = SqliteVersionStore::in_memory(dir.path()).unwrap();

        store.register_dataset(&registration("gdp")).await.unwrap();
        store.register_dataset(&registration("cpi")).await.unwrap();
        store.record_version(new_version("gdp", "r1", "h1")).await.unwrap();

        // Re-registration updates metadata in place
        let mut updated = registration("gdp");
        updated.license = Some("cc-by".to_string());
        store.register_dataset(&updated).await.unwrap();

        let datasets = store.datasets().await.unwrap();
        assert_eq!(datasets.len(), 2);
        assert_eq!(datasets[0].id, "gdp");
        assert_eq!(datasets[0].license.as_deref(), Some("cc-by"));
        assert_eq!(datasets[0].latest_hash.as_deref(), Some("h1"));
        assert!(datasets[0].last_updated.is_some());
        assert_eq!(datasets[1].latest_hash, None);
    }

    #[tokio::test]
    async fn test_reopen_persists_history() {
        let dir = TempDir::new().unwrap();
        {
            let store = SqliteVersionStore::open(dir.path()).unwrap();
            store.register_dataset(&registration("gdp")).await.unwrap();
            store.record_version(new_version("gdp", "r1", "h1")).await.unwrap();
        }

        assert!(dir.path().join(SQLITE_FILE).exists());
        let store = SqliteVersionStore::open(dir.path()).unwrap();
        assert_eq!(store.latest_hash("gdp").await.unwrap().as_deref(), Some("h1"));
    }

    #[tokio::test]
    async fn test_runs_limit_and_order() {
        let dir = TempDir::new().unwrap();
        let store = SqliteVersionStore::in_memory(dir.path()).unwrap();

        for i in 0..7 {
            store.start_run(&format!("run{i}"), "m", "h").await.unwrap();
        }

        let runs = store.runs(5).await.unwrap();
        assert_eq!(runs.len(), 5);
        assert_eq!(runs[0].run_id, "run6");
    }
}
