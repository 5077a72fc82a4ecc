//! Persistence seam for jobs, scans, and the cost ledger.
//!
//! The `JobStore` trait is the only surface the processor touches; the
//! SQLite implementation below backs the single-node workers and the test
//! suite (in-memory constructor). Job rows are created and deleted by the
//! external enqueuer — this store only reads them and updates status and
//! result fields.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::types::{CostRecord, Job, JobStatus, ScanRecord};
use crate::extraction::PageHints;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Invalid status value in store: {0}")]
    InvalidStatus(String),

    #[error("Illegal transition for job {job_id}: {from} → {to}")]
    IllegalTransition {
        job_id: String,
        from: JobStatus,
        to: JobStatus,
    },

    #[error("Corrupt page hints for scan {scan_id}: {reason}")]
    CorruptPageHints { scan_id: String, reason: String },

    #[error("Corrupt project id for scan {scan_id}: {value}")]
    CorruptProjectId { scan_id: String, value: String },

    #[error("Corrupt result for job {job_id}: {reason}")]
    CorruptResult { job_id: String, reason: String },
}

/// Status transitions, result writes, and the cost ledger.
pub trait JobStore: Send + Sync {
    /// Load the scan record a job points at.
    fn get_scan(
        &self,
        scan_id: Uuid,
    ) -> impl std::future::Future<Output = Result<ScanRecord, StoreError>> + Send;

    /// Durable `pending/processing → processing` write. Idempotent: a job
    /// re-driven after a crash is already `processing` and stays there.
    fn mark_processing(
        &self,
        job_id: Uuid,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    /// Append one cost-ledger row. Never updates existing rows.
    fn record_cost(
        &self,
        cost: &CostRecord,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    /// Terminal success write: persist the extracted data and set the
    /// status chosen by the discriminator (`completed` or
    /// `review_new_project`).
    fn complete_job(
        &self,
        job_id: Uuid,
        status: JobStatus,
        data: &serde_json::Value,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    /// Terminal failure write: record the human-readable message and the
    /// external attempt counter.
    fn fail_job(
        &self,
        job_id: Uuid,
        message: &str,
        attempts: u32,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;
}

const MIGRATION: &str = "
CREATE TABLE IF NOT EXISTS sheet_scans (
    id           TEXT PRIMARY KEY,
    file_path    TEXT,
    file_url     TEXT,
    page_hints   TEXT,
    project_id   TEXT
);

CREATE TABLE IF NOT EXISTS extraction_jobs (
    id            TEXT PRIMARY KEY,
    scan_id       TEXT NOT NULL REFERENCES sheet_scans(id),
    status        TEXT NOT NULL DEFAULT 'pending',
    attempts      INTEGER NOT NULL DEFAULT 0,
    error_message TEXT,
    result_json   TEXT,
    updated_at    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS extraction_costs (
    id                 INTEGER PRIMARY KEY AUTOINCREMENT,
    job_id             TEXT NOT NULL,
    provider           TEXT NOT NULL,
    model              TEXT NOT NULL,
    input_tokens       INTEGER NOT NULL,
    output_tokens      INTEGER NOT NULL,
    pages_processed    INTEGER NOT NULL,
    cost_usd           REAL NOT NULL,
    processing_time_ms INTEGER NOT NULL,
    created_at         TEXT NOT NULL
);
";

/// SQLite-backed job store. The connection sits behind a mutex because
/// rusqlite connections are not `Sync`; critical sections are short and
/// never await.
pub struct SqliteJobStore {
    conn: Mutex<Connection>,
}

impl SqliteJobStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// In-memory store for tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        conn.execute_batch(MIGRATION)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().expect("job store connection lock poisoned")
    }

    /// Enqueuer-side insert, used by tests and the single-node worker setup.
    pub fn insert_scan(&self, scan: &ScanRecord) -> Result<(), StoreError> {
        let hints = scan
            .page_hints
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| StoreError::CorruptPageHints {
                scan_id: scan.id.to_string(),
                reason: e.to_string(),
            })?;
        self.lock().execute(
            "INSERT INTO sheet_scans (id, file_path, file_url, page_hints, project_id)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                scan.id.to_string(),
                scan.file_path,
                scan.file_url,
                hints,
                scan.project_id.map(|id| id.to_string()),
            ],
        )?;
        Ok(())
    }

    /// Enqueuer-side insert of a pending job row.
    pub fn enqueue_job(&self, job: &Job) -> Result<(), StoreError> {
        self.lock().execute(
            "INSERT INTO extraction_jobs (id, scan_id, status, attempts, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                job.id.to_string(),
                job.scan_id.to_string(),
                job.status.as_str(),
                job.attempts,
                now(),
            ],
        )?;
        Ok(())
    }

    /// Current status of a job, for assertions and batch bookkeeping.
    pub fn job_status(&self, job_id: Uuid) -> Result<JobStatus, StoreError> {
        status_on(&self.lock(), job_id)
    }

    /// The job's recorded failure message, if any.
    pub fn job_error_message(&self, job_id: Uuid) -> Result<Option<String>, StoreError> {
        Ok(self.lock().query_row(
            "SELECT error_message FROM extraction_jobs WHERE id = ?1",
            params![job_id.to_string()],
            |row| row.get(0),
        )?)
    }

    /// The job's persisted extraction result, if any.
    pub fn job_result(&self, job_id: Uuid) -> Result<Option<serde_json::Value>, StoreError> {
        let raw: Option<String> = self.lock().query_row(
            "SELECT result_json FROM extraction_jobs WHERE id = ?1",
            params![job_id.to_string()],
            |row| row.get(0),
        )?;
        raw.map(|s| {
            serde_json::from_str(&s).map_err(|e| StoreError::CorruptResult {
                job_id: job_id.to_string(),
                reason: e.to_string(),
            })
        })
        .transpose()
    }

    /// Number of cost-ledger rows for a job.
    pub fn cost_row_count(&self, job_id: Uuid) -> Result<u32, StoreError> {
        Ok(self.lock().query_row(
            "SELECT COUNT(*) FROM extraction_costs WHERE job_id = ?1",
            params![job_id.to_string()],
            |row| row.get(0),
        )?)
    }

    /// Guarded status write: refuses to move a job out of a terminal state.
    /// Check and update run under one connection guard, so the guarantee
    /// holds even with competing callers.
    fn transition(
        &self,
        job_id: Uuid,
        to: JobStatus,
        apply: impl FnOnce(&Connection) -> Result<usize, rusqlite::Error>,
    ) -> Result<(), StoreError> {
        let conn = self.lock();
        let current = status_on(&conn, job_id)?;
        if current.is_terminal() {
            return Err(StoreError::IllegalTransition {
                job_id: job_id.to_string(),
                from: current,
                to,
            });
        }
        let changed = apply(&conn)?;
        if changed == 0 {
            return Err(StoreError::NotFound {
                entity: "job",
                id: job_id.to_string(),
            });
        }
        Ok(())
    }
}

fn status_on(conn: &Connection, job_id: Uuid) -> Result<JobStatus, StoreError> {
    let status: String = conn
        .query_row(
            "SELECT status FROM extraction_jobs WHERE id = ?1",
            params![job_id.to_string()],
            |row| row.get(0),
        )
        .optional()?
        .ok_or_else(|| StoreError::NotFound {
            entity: "job",
            id: job_id.to_string(),
        })?;
    JobStatus::from_str(&status).ok_or(StoreError::InvalidStatus(status))
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

impl JobStore for SqliteJobStore {
    async fn get_scan(&self, scan_id: Uuid) -> Result<ScanRecord, StoreError> {
        let row = self
            .lock()
            .query_row(
                "SELECT id, file_path, file_url, page_hints, project_id
                 FROM sheet_scans WHERE id = ?1",
                params![scan_id.to_string()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, Option<String>>(4)?,
                    ))
                },
            )
            .optional()?
            .ok_or_else(|| StoreError::NotFound {
                entity: "scan",
                id: scan_id.to_string(),
            })?;

        let (id, file_path, file_url, hints_json, project_id) = row;
        let page_hints: Option<PageHints> = hints_json
            .map(|raw| {
                serde_json::from_str(&raw).map_err(|e| StoreError::CorruptPageHints {
                    scan_id: id.clone(),
                    reason: e.to_string(),
                })
            })
            .transpose()?;

        // A malformed project id must not read as "no project": that would
        // flip the terminal status to review_new_project. Surface it.
        let project_id = project_id
            .map(|p| {
                Uuid::parse_str(&p).map_err(|_| StoreError::CorruptProjectId {
                    scan_id: id.clone(),
                    value: p,
                })
            })
            .transpose()?;

        Ok(ScanRecord {
            id: scan_id,
            file_path,
            file_url,
            page_hints,
            project_id,
        })
    }

    async fn mark_processing(&self, job_id: Uuid) -> Result<(), StoreError> {
        self.transition(job_id, JobStatus::Processing, |conn| {
            conn.execute(
                "UPDATE extraction_jobs SET status = 'processing', updated_at = ?2
                 WHERE id = ?1",
                params![job_id.to_string(), now()],
            )
        })
    }

    async fn record_cost(&self, cost: &CostRecord) -> Result<(), StoreError> {
        self.lock().execute(
            "INSERT INTO extraction_costs
             (job_id, provider, model, input_tokens, output_tokens, pages_processed,
              cost_usd, processing_time_ms, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                cost.job_id.to_string(),
                cost.provider,
                cost.model,
                cost.input_tokens,
                cost.output_tokens,
                cost.pages_processed,
                cost.cost_usd,
                cost.processing_time_ms,
                now(),
            ],
        )?;
        Ok(())
    }

    async fn complete_job(
        &self,
        job_id: Uuid,
        status: JobStatus,
        data: &serde_json::Value,
    ) -> Result<(), StoreError> {
        if !matches!(status, JobStatus::Completed | JobStatus::ReviewNewProject) {
            let current = self.job_status(job_id)?;
            return Err(StoreError::IllegalTransition {
                job_id: job_id.to_string(),
                from: current,
                to: status,
            });
        }
        let result_json = data.to_string();
        self.transition(job_id, status, |conn| {
            conn.execute(
                "UPDATE extraction_jobs
                 SET status = ?2, result_json = ?3, error_message = NULL, updated_at = ?4
                 WHERE id = ?1",
                params![job_id.to_string(), status.as_str(), result_json, now()],
            )
        })
    }

    async fn fail_job(&self, job_id: Uuid, message: &str, attempts: u32) -> Result<(), StoreError> {
        self.transition(job_id, JobStatus::Failed, |conn| {
            conn.execute(
                "UPDATE extraction_jobs
                 SET status = 'failed', error_message = ?2, attempts = ?3, updated_at = ?4
                 WHERE id = ?1",
                params![job_id.to_string(), message, attempts, now()],
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(project_id: Option<Uuid>) -> ScanRecord {
        ScanRecord {
            id: Uuid::new_v4(),
            file_path: Some("uploads/scan.pdf".into()),
            file_url: None,
            page_hints: PageHints::new(vec![1, 2]),
            project_id,
        }
    }

    fn pending_job(scan_id: Uuid) -> Job {
        Job {
            id: Uuid::new_v4(),
            scan_id,
            attempts: 0,
            status: JobStatus::Pending,
        }
    }

    fn seeded_store() -> (SqliteJobStore, Job) {
        let store = SqliteJobStore::open_in_memory().unwrap();
        let scan = scan(Some(Uuid::new_v4()));
        store.insert_scan(&scan).unwrap();
        let job = pending_job(scan.id);
        store.enqueue_job(&job).unwrap();
        (store, job)
    }

    #[tokio::test]
    async fn scan_round_trips_with_page_hints() {
        let store = SqliteJobStore::open_in_memory().unwrap();
        let original = scan(None);
        store.insert_scan(&original).unwrap();

        let loaded = store.get_scan(original.id).await.unwrap();
        assert_eq!(loaded.file_path.as_deref(), Some("uploads/scan.pdf"));
        assert_eq!(loaded.page_hints, PageHints::new(vec![1, 2]));
        assert_eq!(loaded.project_id, None);
    }

    #[tokio::test]
    async fn corrupt_project_id_surfaces_instead_of_reading_as_none() {
        let store = SqliteJobStore::open_in_memory().unwrap();
        let scan_id = Uuid::new_v4();
        store
            .lock()
            .execute(
                "INSERT INTO sheet_scans (id, file_path, project_id)
                 VALUES (?1, 'uploads/scan.pdf', 'not-a-uuid')",
                params![scan_id.to_string()],
            )
            .unwrap();

        let err = store.get_scan(scan_id).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::CorruptProjectId { ref value, .. } if value == "not-a-uuid"
        ));
    }

    #[tokio::test]
    async fn corrupt_result_json_surfaces_instead_of_reading_as_none() {
        let (store, job) = seeded_store();
        store
            .lock()
            .execute(
                "UPDATE extraction_jobs SET result_json = '{not json' WHERE id = ?1",
                params![job.id.to_string()],
            )
            .unwrap();

        let err = store.job_result(job.id).unwrap_err();
        assert!(matches!(err, StoreError::CorruptResult { .. }));
    }

    #[tokio::test]
    async fn transition_on_missing_job_is_not_found() {
        let store = SqliteJobStore::open_in_memory().unwrap();
        let err = store.mark_processing(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { entity: "job", .. }));
    }

    #[tokio::test]
    async fn missing_scan_is_not_found() {
        let store = SqliteJobStore::open_in_memory().unwrap();
        let err = store.get_scan(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { entity: "scan", .. }));
    }

    #[tokio::test]
    async fn mark_processing_is_idempotent() {
        let (store, job) = seeded_store();
        store.mark_processing(job.id).await.unwrap();
        assert_eq!(store.job_status(job.id).unwrap(), JobStatus::Processing);
        // Re-drive after a crash: marking again is fine.
        store.mark_processing(job.id).await.unwrap();
        assert_eq!(store.job_status(job.id).unwrap(), JobStatus::Processing);
    }

    #[tokio::test]
    async fn complete_job_persists_result_and_status() {
        let (store, job) = seeded_store();
        store.mark_processing(job.id).await.unwrap();
        let data = serde_json::json!({"rows": 3});
        store
            .complete_job(job.id, JobStatus::ReviewNewProject, &data)
            .await
            .unwrap();
        assert_eq!(
            store.job_status(job.id).unwrap(),
            JobStatus::ReviewNewProject
        );
        assert_eq!(store.job_result(job.id).unwrap(), Some(data));
    }

    #[tokio::test]
    async fn terminal_states_reject_further_transitions() {
        let (store, job) = seeded_store();
        store.mark_processing(job.id).await.unwrap();
        store
            .complete_job(job.id, JobStatus::Completed, &serde_json::json!({}))
            .await
            .unwrap();

        let err = store.fail_job(job.id, "late failure", 1).await.unwrap_err();
        assert!(matches!(err, StoreError::IllegalTransition { .. }));
        let err = store.mark_processing(job.id).await.unwrap_err();
        assert!(matches!(err, StoreError::IllegalTransition { .. }));
        assert_eq!(store.job_status(job.id).unwrap(), JobStatus::Completed);
    }

    #[tokio::test]
    async fn complete_job_rejects_non_success_statuses() {
        let (store, job) = seeded_store();
        let err = store
            .complete_job(job.id, JobStatus::Failed, &serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::IllegalTransition { .. }));
    }

    #[tokio::test]
    async fn fail_job_records_message_and_attempts() {
        let (store, job) = seeded_store();
        store.mark_processing(job.id).await.unwrap();
        store
            .fail_job(job.id, "Download failed: HTTP 404", 2)
            .await
            .unwrap();
        assert_eq!(store.job_status(job.id).unwrap(), JobStatus::Failed);
        assert_eq!(
            store.job_error_message(job.id).unwrap().as_deref(),
            Some("Download failed: HTTP 404")
        );
    }

    #[tokio::test]
    async fn cost_ledger_is_append_only() {
        let (store, job) = seeded_store();
        let cost = CostRecord {
            job_id: job.id,
            provider: "sheetread".into(),
            model: "sheetread-lite".into(),
            input_tokens: 100,
            output_tokens: 50,
            pages_processed: 1,
            cost_usd: 0.0001,
            processing_time_ms: 12,
        };
        store.record_cost(&cost).await.unwrap();
        store.record_cost(&cost).await.unwrap();
        assert_eq!(store.cost_row_count(job.id).unwrap(), 2);
    }

    #[tokio::test]
    async fn file_backed_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("worker.db");
        let job = {
            let store = SqliteJobStore::open(&path).unwrap();
            let scan = scan(None);
            store.insert_scan(&scan).unwrap();
            let job = pending_job(scan.id);
            store.enqueue_job(&job).unwrap();
            job
        };
        let reopened = SqliteJobStore::open(&path).unwrap();
        assert_eq!(reopened.job_status(job.id).unwrap(), JobStatus::Pending);
    }
}
