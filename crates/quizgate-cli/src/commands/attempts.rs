//! The `quizgate attempts` command.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use comfy_table::{Cell, Table};

use quizgate_core::events::{EventBus, DEFAULT_LOG_CAPACITY};
use quizgate_core::service::AssessmentService;
use quizgate_core::traits::{Clock, SystemClock};
use quizgate_storage::JsonFileStorage;

pub fn execute(quiz_id: String, store_path: PathBuf, format: String) -> Result<()> {
    let storage = JsonFileStorage::open(&store_path)?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let bus = Arc::new(EventBus::with_clock(DEFAULT_LOG_CAPACITY, clock.clone()));
    let service = AssessmentService::new(Arc::new(storage), clock, bus);

    let attempts = service.get_attempts(&quiz_id);

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&attempts)?);
        return Ok(());
    }

    if attempts.is_empty() {
        println!("No attempts stored for quiz {quiz_id}.");
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec!["Attempt", "Submitted", "Score", "Status"]);
    for a in &attempts {
        table.add_row(vec![
            Cell::new(&a.attempt_id),
            Cell::new(a.timestamp.format("%Y-%m-%d %H:%M:%S").to_string()),
            Cell::new(format!("{:.1}%", a.final_score)),
            Cell::new(a.status.to_string()),
        ]);
    }
    println!("{table}");
    println!("{} attempt(s) for quiz {quiz_id}", attempts.len());

    Ok(())
}
