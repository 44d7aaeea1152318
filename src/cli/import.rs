use std::path::PathBuf;
use std::time::Duration;

use colored::Colorize;

use crate::error::{PennyError, Result};
use crate::fmt::percent;
use crate::jobs;
use crate::models::{JobStatus, RecordKind};
use crate::settings::get_data_dir;

pub fn run(file: &str, kind: &str, wait: bool) -> Result<()> {
    let kind = RecordKind::parse(kind).ok_or_else(|| {
        PennyError::Validation(format!(
            "unknown record kind '{kind}' (expected origins, banks, categories or transactions)"
        ))
    })?;
    let db_path = get_data_dir().join("penny.db");

    let (job_id, worker) = jobs::submit(db_path, PathBuf::from(file), kind);
    println!("Job submitted: {job_id}");

    // This process hosts the worker thread, so the batch must land before we
    // exit either way. Without --wait the summary stays terse.
    if !wait {
        worker
            .join()
            .map_err(|_| PennyError::Other(format!("import worker for job '{job_id}' panicked")))?;
        let job = jobs::status(&job_id)?;
        println!(
            "{}: {} of {} processed, {} failed (use --wait for the full report)",
            job.status.as_str(),
            job.processed_records,
            job.total_records,
            job.failed_records,
        );
        return Ok(());
    }

    let job = jobs::wait_for(&job_id, Duration::from_secs(600))?;
    println!(
        "{} of {} processed, {} failed ({})",
        job.processed_records,
        job.total_records,
        job.failed_records,
        percent(job.percentage()),
    );
    for error in &job.error_report {
        println!("  record {}: {}", error.record_index, error.message);
    }
    match job.status {
        JobStatus::Completed => println!("{}", "Completed.".green()),
        JobStatus::Failed => {
            let cause = job.fatal_error.unwrap_or_else(|| "unknown".to_string());
            println!("{} {cause}", "Failed:".red());
        }
        _ => {}
    }
    Ok(())
}
