//! The `quizgate submit` command.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;

use quizgate_core::config::load_config_from;
use quizgate_core::events::{EventBus, EventName};
use quizgate_core::model::AttemptStatus;
use quizgate_core::service::AssessmentService;
use quizgate_core::traits::{Clock, SystemClock};
use quizgate_storage::JsonFileStorage;

use crate::input;

pub async fn execute(
    quiz_path: PathBuf,
    answers_path: PathBuf,
    store_path: PathBuf,
    max_retries: Option<u32>,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;
    let quiz = input::load_quiz(&quiz_path)?;
    let answers = input::load_answers(&answers_path)?;
    let storage = JsonFileStorage::open(&store_path)?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let bus = Arc::new(EventBus::with_clock(
        config.events.log_capacity,
        clock.clone(),
    ));
    let service = AssessmentService::new(Arc::new(storage), clock, bus).with_config(&config);

    let attempt = service.grade(&quiz, answers);
    let retries = max_retries.unwrap_or(config.max_retries);
    tracing::info!(
        attempt_id = %attempt.attempt_id,
        quiz_id = %attempt.quiz_id,
        retries,
        "submitting attempt"
    );
    let outcome = service.submit_with_retry(attempt.clone(), retries).await;

    println!("Attempt {}: {}", outcome.attempt_id, outcome.status);
    println!("Final score: {:.1}%", attempt.final_score);

    match outcome.status {
        AttemptStatus::Saved => {
            let evicted: usize = service
                .bus()
                .events_named(EventName::AttemptsPruned)
                .iter()
                .filter_map(|e| e.payload["evicted"].as_array().map(Vec::len))
                .sum();
            if evicted > 0 {
                println!(
                    "Pruned {evicted} old attempt(s), keeping the newest {}",
                    service.retention().cap()
                );
            }
        }
        AttemptStatus::PendingSync => {
            println!(
                "Storage write failed; attempt kept as pending ({} waiting)",
                service.pending_attempts().len()
            );
        }
    }

    Ok(())
}
