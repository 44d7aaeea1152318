use comfy_table::{Cell, Table};

use crate::error::Result;
use crate::fmt::percent;
use crate::jobs;

pub fn status(id: &str) -> Result<()> {
    let job = jobs::status(id)?;
    println!("Job:        {}", job.id);
    println!("Source:     {} ({})", job.source_label, job.record_kind.key());
    println!("Status:     {}", job.status.as_str());
    println!(
        "Progress:   {}/{} processed, {} failed ({})",
        job.processed_records,
        job.total_records,
        job.failed_records,
        percent(job.percentage()),
    );
    println!("Created:    {}", job.created_at);
    if let Some(completed_at) = &job.completed_at {
        println!("Completed:  {completed_at}");
    }
    if let Some(fatal) = &job.fatal_error {
        println!("Error:      {fatal}");
    }
    for error in &job.error_report {
        println!("  record {}: {}", error.record_index, error.message);
    }
    Ok(())
}

pub fn list() -> Result<()> {
    let mut table = Table::new();
    table.set_header(vec!["ID", "Source", "Kind", "Status", "Processed", "Failed", "Total"]);
    for job in jobs::list_jobs() {
        table.add_row(vec![
            Cell::new(&job.id),
            Cell::new(&job.source_label),
            Cell::new(job.record_kind.key()),
            Cell::new(job.status.as_str()),
            Cell::new(job.processed_records),
            Cell::new(job.failed_records),
            Cell::new(job.total_records),
        ]);
    }
    println!("Import jobs\n{table}");
    Ok(())
}
