use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use chrono::{SecondsFormat, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::categorizer::RuleScorer;
use crate::db::get_connection;
use crate::error::{PennyError, Result};
use crate::importer::{load_batch, process_record};
use crate::models::{ImportJob, JobStatus, RecordError, RecordKind};

// Volatile process memory keyed by job id. A restart forgets all jobs; the
// ledger itself is unaffected. Lock poisoning is recovered everywhere: a
// worker that panics mid-update must not take status polling down with it.
fn registry() -> &'static Mutex<HashMap<String, ImportJob>> {
    static REGISTRY: OnceLock<Mutex<HashMap<String, ImportJob>>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn with_job<F: FnOnce(&mut ImportJob)>(job_id: &str, mutate: F) {
    let mut jobs = registry().lock().unwrap_or_else(|e| e.into_inner());
    if let Some(job) = jobs.get_mut(job_id) {
        mutate(job);
    }
}

// Only one worker may flip a job out of pending.
fn claim(job_id: &str) -> bool {
    let mut jobs = registry().lock().unwrap_or_else(|e| e.into_inner());
    match jobs.get_mut(job_id) {
        Some(job) if job.status == JobStatus::Pending => {
            job.status = JobStatus::Processing;
            true
        }
        _ => false,
    }
}

/// Registers a job and hands the file to a worker thread. Returns the job id
/// immediately along with the worker's handle; all record processing happens
/// afterward. The caller owns the handle: a short-lived process must join it
/// before exiting or teardown kills the worker mid-batch, while a resident
/// host can drop it and keep polling the registry instead.
pub fn submit(db_path: PathBuf, file_path: PathBuf, kind: RecordKind) -> (String, JoinHandle<()>) {
    let job_id = Uuid::new_v4().to_string();
    let source_label = file_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| file_path.to_string_lossy().to_string());

    let job = ImportJob {
        id: job_id.clone(),
        source_label: source_label.clone(),
        record_kind: kind,
        total_records: 0,
        processed_records: 0,
        failed_records: 0,
        status: JobStatus::Pending,
        error_report: Vec::new(),
        fatal_error: None,
        created_at: now(),
        completed_at: None,
    };
    registry()
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .insert(job_id.clone(), job);
    info!(job_id = %job_id, source = %source_label, kind = kind.key(), "import job submitted");

    let worker_id = job_id.clone();
    let worker = std::thread::spawn(move || run_job(&worker_id, &db_path, &file_path, kind));
    (job_id, worker)
}

// The worker. Per-record failures are counted and recorded; only a fatal
// condition (unreadable file, no worker claim) fails the job itself.
fn run_job(job_id: &str, db_path: &Path, file_path: &Path, kind: RecordKind) {
    if !claim(job_id) {
        warn!(job_id, "job already claimed, worker exiting");
        return;
    }

    let outcome = (|| -> Result<()> {
        let records = load_batch(file_path, kind)?;
        with_job(job_id, |job| job.total_records = records.len());

        let conn = get_connection(db_path)?;
        let scorer = RuleScorer::new(&conn);

        // Strictly sequential in input order: two records of one batch must
        // never race an insert-or-fetch on the same new dimension key.
        for (idx, fields) in records.iter().enumerate() {
            let record_index = idx + 1;
            match process_record(&conn, kind, fields, &scorer) {
                Ok(()) => with_job(job_id, |job| job.processed_records += 1),
                Err(e) => {
                    warn!(job_id, record_index, error = %e, "record failed");
                    with_job(job_id, |job| {
                        job.failed_records += 1;
                        job.error_report.push(RecordError {
                            record_index,
                            message: e.to_string(),
                        });
                    });
                }
            }
        }
        Ok(())
    })();

    match outcome {
        Ok(()) => {
            with_job(job_id, |job| {
                job.status = JobStatus::Completed;
                job.completed_at = Some(now());
            });
            if let Ok(job) = status(job_id) {
                info!(
                    job_id,
                    total = job.total_records,
                    processed = job.processed_records,
                    failed = job.failed_records,
                    "import job completed"
                );
            }
        }
        Err(e) => {
            warn!(job_id, error = %e, "import job failed");
            with_job(job_id, |job| {
                job.status = JobStatus::Failed;
                job.fatal_error = Some(e.to_string());
                job.completed_at = Some(now());
            });
        }
    }
}

/// Snapshot of a job's progress. Unknown ids are a not-found error.
pub fn status(job_id: &str) -> Result<ImportJob> {
    registry()
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .get(job_id)
        .cloned()
        .ok_or_else(|| PennyError::NotFound(format!("import job '{job_id}'")))
}

pub fn list_jobs() -> Vec<ImportJob> {
    let mut jobs: Vec<ImportJob> = registry()
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .values()
        .cloned()
        .collect();
    jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
    jobs
}

/// Polls until the job reaches a terminal state or the timeout elapses.
pub fn wait_for(job_id: &str, timeout: Duration) -> Result<ImportJob> {
    let deadline = Instant::now() + timeout;
    loop {
        let job = status(job_id)?;
        if job.status.is_terminal() {
            return Ok(job);
        }
        if Instant::now() >= deadline {
            return Err(PennyError::Other(format!(
                "timed out waiting for job '{job_id}' (still {})",
                job.status.as_str()
            )));
        }
        std::thread::sleep(Duration::from_millis(10));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_db;
    use std::path::Path;

    fn test_db(dir: &Path) -> PathBuf {
        let db_path = dir.join("test.db");
        let conn = get_connection(&db_path).unwrap();
        init_db(&conn).unwrap();
        db_path
    }

    fn write_csv(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    fn wait(job_id: &str) -> ImportJob {
        wait_for(job_id, Duration::from_secs(10)).unwrap()
    }

    #[test]
    fn test_submit_returns_id_before_processing() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = test_db(dir.path());
        let csv = write_csv(dir.path(), "origins.csv", "name\nHousehold\nSide Business\n");

        let (job_id, _worker) = submit(db_path.clone(), csv, RecordKind::Origins);
        // The id is always resolvable, whatever state the worker is in.
        let snapshot = status(&job_id).unwrap();
        assert!(!snapshot.status.is_terminal() || snapshot.total_records == 2);

        let done = wait(&job_id);
        assert_eq!(done.status, JobStatus::Completed);
        assert_eq!(done.processed_records, 2);
        assert_eq!(done.failed_records, 0);
        assert!(done.completed_at.is_some());

        let conn = get_connection(&db_path).unwrap();
        let count: i64 = conn.query_row("SELECT count(*) FROM origins", [], |r| r.get(0)).unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn test_joining_the_worker_lands_the_batch() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = test_db(dir.path());
        let mut content = String::from("date,flow,amount,description\n");
        for day in 1..=28 {
            content.push_str(&format!("2024-02-{day:02},OUTFLOW,3.50,COFFEE {day}\n"));
        }
        let csv = write_csv(dir.path(), "txns.csv", &content);

        // No polling at all: joining the handle is enough to guarantee every
        // row reached the ledger before the caller moves on.
        let (job_id, worker) = submit(db_path.clone(), csv, RecordKind::Transactions);
        worker.join().unwrap();

        let job = status(&job_id).unwrap();
        assert!(job.status.is_terminal(), "joined worker must leave a terminal job");
        assert_eq!(job.processed_records, 28);

        let conn = get_connection(&db_path).unwrap();
        let rows: i64 =
            conn.query_row("SELECT count(*) FROM transactions", [], |r| r.get(0)).unwrap();
        assert_eq!(rows, 28);
    }

    #[test]
    fn test_unknown_job_id_is_not_found() {
        assert!(matches!(status("no-such-job"), Err(PennyError::NotFound(_))));
    }

    #[test]
    fn test_registry_survives_a_poisoned_lock() {
        // A thread dying while holding the registry must not turn every later
        // status call into a panic.
        let _ = std::thread::spawn(|| {
            let _guard = registry().lock().unwrap_or_else(|e| e.into_inner());
            panic!("worker dies holding the registry");
        })
        .join();

        assert!(matches!(status("still-answering"), Err(PennyError::NotFound(_))));
        list_jobs();
    }

    #[test]
    fn test_partial_failure_keeps_job_completed() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = test_db(dir.path());
        // Record 3 has an empty category field.
        let csv = write_csv(
            dir.path(),
            "categories.csv",
            "flow,major_category,category\n\
             OUTFLOW,Food,Groceries\n\
             OUTFLOW,Food,Dining Out\n\
             OUTFLOW,Food,\n\
             INFLOW,Income,Salary\n",
        );

        let (job_id, _worker) = submit(db_path, csv, RecordKind::Categories);
        let done = wait(&job_id);
        assert_eq!(done.status, JobStatus::Completed, "per-record issues never fail the job");
        assert_eq!(done.total_records, 4);
        assert_eq!(done.processed_records, 3);
        assert_eq!(done.failed_records, 1);
        assert_eq!(done.error_report.len(), 1);
        assert_eq!(done.error_report[0].record_index, 3);
    }

    #[test]
    fn test_unreadable_file_fails_job() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = test_db(dir.path());
        let (job_id, _worker) = submit(db_path, dir.path().join("missing.csv"), RecordKind::Transactions);
        let done = wait(&job_id);
        assert_eq!(done.status, JobStatus::Failed);
        assert!(done.fatal_error.is_some());
    }

    #[test]
    fn test_progress_accounting_adds_up() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = test_db(dir.path());
        let mut content = String::from("date,flow,amount,description\n");
        for day in 1..=20 {
            content.push_str(&format!("2024-01-{day:02},OUTFLOW,5.00,COFFEE {day}\n"));
        }
        // Two malformed rows in the middle.
        content.push_str(",OUTFLOW,1.00,NO DATE\n");
        content.push_str("2024-01-21,OUTFLOW,,NO AMOUNT\n");
        let csv = write_csv(dir.path(), "txns.csv", &content);

        let (job_id, _worker) = submit(db_path, csv, RecordKind::Transactions);

        // While running, counters never exceed the total and never move
        // backwards.
        let (mut last_processed, mut last_failed) = (0, 0);
        loop {
            let job = status(&job_id).unwrap();
            if job.total_records > 0 {
                assert!(job.processed_records + job.failed_records <= job.total_records);
            }
            assert!(
                job.processed_records >= last_processed && job.failed_records >= last_failed,
                "progress counters regressed: {}/{} after {last_processed}/{last_failed}",
                job.processed_records,
                job.failed_records,
            );
            last_processed = job.processed_records;
            last_failed = job.failed_records;
            if job.status.is_terminal() {
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }

        let done = wait(&job_id);
        assert_eq!(done.total_records, 22);
        assert_eq!(done.processed_records, 20);
        assert_eq!(done.failed_records, 2);
        assert_eq!(done.processed_records + done.failed_records, done.total_records);
    }

    #[test]
    fn test_claim_is_exclusive() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = test_db(dir.path());
        let csv = write_csv(dir.path(), "origins.csv", "name\nA\n");
        let (job_id, _worker) = submit(db_path, csv, RecordKind::Origins);
        wait(&job_id);
        // Terminal jobs cannot be claimed again.
        assert!(!claim(&job_id));
    }

    #[test]
    fn test_list_jobs_contains_submissions() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = test_db(dir.path());
        let csv = write_csv(dir.path(), "banks.csv", "name\nFirst Bank\n");
        let (job_id, _worker) = submit(db_path, csv, RecordKind::Banks);
        wait(&job_id);
        assert!(list_jobs().iter().any(|j| j.id == job_id));
    }
}
