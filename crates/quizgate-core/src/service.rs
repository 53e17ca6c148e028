//! Assessment service.
//!
//! A thin stateful façade over [`Storage`]: it persists attempts under the
//! retention policy, retries failed submissions with backoff, keeps drafts
//! and module progress, and publishes what happens on the [`EventBus`].
//! Scoring and gating are delegated to the pure modules.
//!
//! Reads degrade to empty results, writes report a [`StorageError`], and
//! submissions always end as [`AttemptStatus::Saved`] or
//! [`AttemptStatus::PendingSync`].

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::config::{BackoffPolicy, QuizgateConfig};
use crate::error::StorageError;
use crate::events::{EventBus, EventName};
use crate::gating::{self, FinalExamGate, StartDecision};
use crate::model::{Answer, Attempt, AttemptStatus, ModuleState, Quiz, SectionProgress};
use crate::retention::{self, RetentionPolicy};
use crate::scoring::{self, QuizScore};
use crate::traits::{Clock, Storage, StorageExt};

/// Every attempt, all quizzes, in insertion order.
pub const ATTEMPTS_KEY: &str = "assessment.attempts.v1";
/// Module id → [`ModuleState`].
pub const PROGRESS_KEY: &str = "assessment.progress.v1";
/// [`GatingFlags`].
pub const FLAGS_KEY: &str = "assessment.flags.v1";
/// Quiz id → [`Draft`].
pub const DRAFT_KEY: &str = "assessment.draft.v1";
/// Attempts whose submission exhausted its retries.
pub const PENDING_KEY: &str = "assessment.pending.v1";

/// Submission outcomes remembered for duplicate submits. Older ids fall back
/// to the stored-attempt duplicate check.
pub const OUTCOME_CACHE_CAPACITY: usize = 256;

/// Feature flags persisted next to progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatingFlags {
    pub gating_enabled: bool,
}

/// In-progress, unsubmitted quiz state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Draft {
    pub quiz_id: String,
    pub data: Value,
    pub updated_at: DateTime<Utc>,
}

/// What [`AssessmentService::save_attempt`] did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaveReceipt {
    /// The attempt id was already stored; nothing was written.
    pub duplicate: bool,
    /// Ids of attempts evicted by the retention policy, oldest first.
    pub evicted: Vec<String>,
}

/// Result of a submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitOutcome {
    pub attempt_id: String,
    pub status: AttemptStatus,
}

/// Outcomes of recent submissions, oldest evicted first.
#[derive(Debug, Default)]
struct OutcomeCache {
    by_id: HashMap<String, SubmitOutcome>,
    order: VecDeque<String>,
}

impl OutcomeCache {
    fn get(&self, attempt_id: &str) -> Option<SubmitOutcome> {
        self.by_id.get(attempt_id).cloned()
    }

    fn insert(&mut self, outcome: SubmitOutcome) {
        let id = outcome.attempt_id.clone();
        if self.by_id.insert(id.clone(), outcome).is_some() {
            return;
        }
        self.order.push_back(id);
        while self.order.len() > OUTCOME_CACHE_CAPACITY {
            if let Some(oldest) = self.order.pop_front() {
                self.by_id.remove(&oldest);
            }
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.by_id.len()
    }
}

/// Why a read-modify-write cycle stopped.
enum UpdateError {
    Read(StorageError),
    Write(StorageError),
}

/// The assessment service.
pub struct AssessmentService {
    storage: Arc<dyn Storage>,
    clock: Arc<dyn Clock>,
    bus: Arc<EventBus>,
    retention: RetentionPolicy,
    backoff: BackoffPolicy,
    gating_default: bool,
    max_retries: u32,
    /// Serializes read-modify-write cycles on storage keys.
    write_lock: Mutex<()>,
    pending: Mutex<Vec<Attempt>>,
    outcomes: Mutex<OutcomeCache>,
    /// One entry per quiz with a submission running or waiting.
    in_flight: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl AssessmentService {
    /// Envelope timestamps come from the bus's own clock; build it with
    /// [`EventBus::with_clock`] to share `clock`.
    pub fn new(storage: Arc<dyn Storage>, clock: Arc<dyn Clock>, bus: Arc<EventBus>) -> Self {
        let defaults = QuizgateConfig::default();
        Self {
            storage,
            clock,
            bus,
            retention: defaults.retention,
            backoff: defaults.backoff,
            gating_default: defaults.gating_enabled,
            max_retries: defaults.max_retries,
            write_lock: Mutex::new(()),
            pending: Mutex::new(Vec::new()),
            outcomes: Mutex::new(OutcomeCache::default()),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Apply retention, backoff, retry and gating settings from `config`.
    pub fn with_config(mut self, config: &QuizgateConfig) -> Self {
        self.retention = config.retention;
        self.backoff = config.backoff;
        self.gating_default = config.gating_enabled;
        self.max_retries = config.max_retries;
        self
    }

    pub fn with_retention(mut self, retention: RetentionPolicy) -> Self {
        self.retention = retention;
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn retention(&self) -> &RetentionPolicy {
        &self.retention
    }

    // -----------------------------------------------------------------------
    // Storage helpers
    // -----------------------------------------------------------------------

    fn report_read_failure(&self, key: &str, err: &StorageError) {
        tracing::warn!(key, error = %err, "storage read failed, using empty default");
        self.bus.publish(
            EventName::StorageReadError,
            json!({ "key": key, "error": err.to_string() }),
        );
    }

    /// Read `key`, degrading failures to `None` with a recoverable event.
    fn read_or_default<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.storage.get_json::<T>(key) {
            Ok(value) => value,
            Err(err) => {
                self.report_read_failure(key, &err);
                None
            }
        }
    }

    /// Read `key` for a read-modify-write cycle. Failures are returned so
    /// that an unreadable value is never overwritten.
    fn read_for_update<T: DeserializeOwned + Default>(&self, key: &str) -> Result<T, UpdateError> {
        self.storage
            .get_json::<T>(key)
            .map(Option::unwrap_or_default)
            .map_err(UpdateError::Read)
    }

    /// Finish an update of `key`. Call with the write lock released: read
    /// failures are published here and handlers may write through the service.
    fn settle<T>(&self, key: &str, result: Result<T, UpdateError>) -> Result<T, StorageError> {
        result.map_err(|err| match err {
            UpdateError::Read(err) => {
                self.report_read_failure(key, &err);
                err
            }
            UpdateError::Write(err) => err,
        })
    }

    fn lock_writes(&self) -> std::sync::MutexGuard<'_, ()> {
        self.write_lock.lock().unwrap_or_else(|e| e.into_inner())
    }

    // -----------------------------------------------------------------------
    // Attempts
    // -----------------------------------------------------------------------

    /// Stored attempts of `quiz_id`, oldest first.
    pub fn get_attempts(&self, quiz_id: &str) -> Vec<Attempt> {
        let all: Vec<Attempt> = self.read_or_default(ATTEMPTS_KEY).unwrap_or_default();
        let mut attempts: Vec<Attempt> = all.into_iter().filter(|a| a.quiz_id == quiz_id).collect();
        attempts.sort_by_key(|a| a.timestamp);
        attempts
    }

    /// Append `attempt` and prune its quiz to the retention cap.
    ///
    /// Saving an attempt id that is already stored is a no-op.
    pub fn save_attempt(&self, attempt: &Attempt) -> Result<SaveReceipt, StorageError> {
        let result = {
            let _guard = self.lock_writes();
            self.append_attempt(attempt)
        };
        let receipt = self.settle(ATTEMPTS_KEY, result)?;
        if receipt.duplicate {
            tracing::debug!(attempt_id = %attempt.attempt_id, "attempt already stored");
            return Ok(receipt);
        }

        tracing::info!(
            attempt_id = %attempt.attempt_id,
            quiz_id = %attempt.quiz_id,
            final_score = attempt.final_score,
            "attempt saved"
        );
        self.bus.publish(
            EventName::AttemptSaved,
            json!({
                "attemptId": attempt.attempt_id,
                "quizId": attempt.quiz_id,
                "moduleId": attempt.module_id,
                "finalScore": attempt.final_score,
            }),
        );
        if !receipt.evicted.is_empty() {
            self.bus.publish(
                EventName::AttemptsPruned,
                json!({ "quizId": attempt.quiz_id, "evicted": receipt.evicted }),
            );
        }

        Ok(receipt)
    }

    /// Caller holds the write lock.
    fn append_attempt(&self, attempt: &Attempt) -> Result<SaveReceipt, UpdateError> {
        let mut all: Vec<Attempt> = self.read_for_update(ATTEMPTS_KEY)?;
        if all.iter().any(|a| a.attempt_id == attempt.attempt_id) {
            return Ok(SaveReceipt {
                duplicate: true,
                evicted: Vec::new(),
            });
        }

        all.push(attempt.clone());
        let evicted = retention::prune(&mut all, &attempt.quiz_id, &self.retention);
        self.storage
            .set_json(ATTEMPTS_KEY, &all)
            .map_err(UpdateError::Write)?;

        Ok(SaveReceipt {
            duplicate: false,
            evicted: evicted.into_iter().map(|a| a.attempt_id).collect(),
        })
    }

    fn flight_lock(&self, quiz_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(in_flight.entry(quiz_id.to_string()).or_default())
    }

    /// Forget the quiz's flight lock once no other submission holds it.
    fn release_flight(&self, quiz_id: &str, flight: Arc<tokio::sync::Mutex<()>>) {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        let idle = in_flight
            .get(quiz_id)
            .is_some_and(|entry| Arc::ptr_eq(entry, &flight) && Arc::strong_count(entry) == 2);
        if idle {
            in_flight.remove(quiz_id);
        }
    }

    fn remembered(&self, attempt_id: &str) -> Option<SubmitOutcome> {
        let outcomes = self.outcomes.lock().unwrap_or_else(|e| e.into_inner());
        outcomes.get(attempt_id)
    }

    fn remember(&self, outcome: SubmitOutcome) -> SubmitOutcome {
        let mut outcomes = self.outcomes.lock().unwrap_or_else(|e| e.into_inner());
        outcomes.insert(outcome.clone());
        outcome
    }

    /// Submit with the configured number of retries.
    pub async fn submit(&self, attempt: Attempt) -> SubmitOutcome {
        self.submit_with_retry(attempt, self.max_retries).await
    }

    /// Persist `attempt`, retrying failed writes with exponential backoff.
    ///
    /// At most one submission per quiz is in flight; a second call for the
    /// same quiz waits for the first. Submitting an attempt id again returns
    /// the earlier outcome. When retries run out, or the failure cannot be
    /// fixed by retrying, the attempt is parked as pending.
    pub async fn submit_with_retry(&self, attempt: Attempt, max_retries: u32) -> SubmitOutcome {
        let quiz_id = attempt.quiz_id.clone();
        let flight = self.flight_lock(&quiz_id);
        let outcome = {
            let _in_flight = flight.lock().await;
            self.submit_exclusive(attempt, max_retries).await
        };
        self.release_flight(&quiz_id, flight);
        outcome
    }

    async fn submit_exclusive(&self, attempt: Attempt, max_retries: u32) -> SubmitOutcome {
        if let Some(outcome) = self.remembered(&attempt.attempt_id) {
            tracing::debug!(attempt_id = %attempt.attempt_id, "duplicate submit");
            return outcome;
        }

        self.bus.publish(
            EventName::QuizSubmitted,
            json!({ "attemptId": attempt.attempt_id, "quizId": attempt.quiz_id }),
        );

        let saved = attempt.with_status(AttemptStatus::Saved);
        let mut last_error = None;
        for retry in 0..=max_retries {
            if retry > 0 {
                let delay = self.backoff.delay(retry);
                tracing::debug!(
                    attempt_id = %attempt.attempt_id,
                    retry,
                    delay_ms = delay.as_millis() as u64,
                    "retrying attempt write"
                );
                tokio::time::sleep(delay).await;
            }
            match self.save_attempt(&saved) {
                Ok(_) => {
                    self.clear_draft(&attempt.quiz_id);
                    return self.remember(SubmitOutcome {
                        attempt_id: attempt.attempt_id.clone(),
                        status: AttemptStatus::Saved,
                    });
                }
                Err(err) => {
                    tracing::warn!(
                        attempt_id = %attempt.attempt_id,
                        retry,
                        error = %err,
                        "attempt write failed"
                    );
                    let transient = err.is_transient();
                    last_error = Some(err);
                    if !transient {
                        break;
                    }
                }
            }
        }

        let error = last_error.map(|e| e.to_string()).unwrap_or_default();
        self.park_pending(attempt.with_status(AttemptStatus::PendingSync), &error);
        self.remember(SubmitOutcome {
            attempt_id: attempt.attempt_id,
            status: AttemptStatus::PendingSync,
        })
    }

    fn park_pending(&self, attempt: Attempt, error: &str) {
        let snapshot = {
            let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
            if !pending.iter().any(|p| p.attempt_id == attempt.attempt_id) {
                pending.push(attempt.clone());
            }
            pending.clone()
        };

        let result = {
            let _guard = self.lock_writes();
            self.read_for_update::<Vec<Attempt>>(PENDING_KEY)
                .and_then(|stored| {
                    let merged = merge_by_id(stored, snapshot);
                    self.storage
                        .set_json(PENDING_KEY, &merged)
                        .map_err(UpdateError::Write)
                })
        };
        if let Err(err) = self.settle(PENDING_KEY, result) {
            tracing::warn!(error = %err, "pending bucket not persisted, keeping in memory");
        }

        tracing::warn!(attempt_id = %attempt.attempt_id, error, "attempt parked as pending");
        self.bus.publish(
            EventName::AttemptPending,
            json!({
                "attemptId": attempt.attempt_id,
                "quizId": attempt.quiz_id,
                "error": error,
            }),
        );
    }

    /// Attempts waiting for sync, oldest first. The core never retries them.
    pub fn pending_attempts(&self) -> Vec<Attempt> {
        let stored: Vec<Attempt> = self.read_or_default(PENDING_KEY).unwrap_or_default();
        let memory = self
            .pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        let mut merged = merge_by_id(stored, memory);
        merged.sort_by_key(|a| a.timestamp);
        merged
    }

    // -----------------------------------------------------------------------
    // Scoring
    // -----------------------------------------------------------------------

    /// Score answers against a quiz, publishing any scoring issues.
    pub fn score_quiz(&self, quiz: &Quiz, answers: &[Answer]) -> QuizScore {
        let score = scoring::score_quiz(quiz, answers);
        for issue in &score.issues {
            tracing::warn!(
                quiz_id = %issue.quiz_id,
                qid = %issue.qid,
                "scoring issue: {}",
                issue.kind
            );
            self.bus.publish(
                EventName::ScoringError,
                json!({
                    "quizId": issue.quiz_id,
                    "qid": issue.qid,
                    "reason": issue.kind.to_string(),
                }),
            );
        }
        score
    }

    /// Score `answers` and wrap them in a new attempt stamped with the clock.
    pub fn grade(&self, quiz: &Quiz, answers: Vec<Answer>) -> Attempt {
        let score = self.score_quiz(quiz, &answers);
        Attempt {
            attempt_id: Uuid::new_v4().to_string(),
            quiz_id: quiz.quiz_id.clone(),
            module_id: quiz.module_id.clone(),
            timestamp: self.clock.now(),
            answers,
            scores: score.scores,
            final_score: score.final_score,
            status: AttemptStatus::Saved,
        }
    }

    // -----------------------------------------------------------------------
    // Drafts
    // -----------------------------------------------------------------------

    /// Create or overwrite the draft for `quiz_id`.
    pub fn start_draft(&self, quiz_id: &str, data: Value) -> Result<(), StorageError> {
        let result = {
            let _guard = self.lock_writes();
            self.read_for_update::<HashMap<String, Draft>>(DRAFT_KEY)
                .and_then(|mut drafts| {
                    drafts.insert(
                        quiz_id.to_string(),
                        Draft {
                            quiz_id: quiz_id.to_string(),
                            data,
                            updated_at: self.clock.now(),
                        },
                    );
                    self.storage
                        .set_json(DRAFT_KEY, &drafts)
                        .map_err(UpdateError::Write)
                })
        };
        self.settle(DRAFT_KEY, result)
    }

    pub fn get_draft(&self, quiz_id: &str) -> Option<Draft> {
        let mut drafts: HashMap<String, Draft> = self.read_or_default(DRAFT_KEY)?;
        drafts.remove(quiz_id)
    }

    /// Drop the draft for `quiz_id`. Failures are logged and ignored.
    pub fn clear_draft(&self, quiz_id: &str) {
        let result = {
            let _guard = self.lock_writes();
            self.read_for_update::<HashMap<String, Draft>>(DRAFT_KEY)
                .and_then(|mut drafts| {
                    if drafts.remove(quiz_id).is_none() {
                        return Ok(());
                    }
                    let written = if drafts.is_empty() {
                        self.storage.remove(DRAFT_KEY)
                    } else {
                        self.storage.set_json(DRAFT_KEY, &drafts)
                    };
                    written.map_err(UpdateError::Write)
                })
        };
        if let Err(err) = self.settle(DRAFT_KEY, result) {
            tracing::warn!(quiz_id, error = %err, "failed to clear draft");
        }
    }

    // -----------------------------------------------------------------------
    // Gating and progress
    // -----------------------------------------------------------------------

    /// Final exam status of `state` at the clock's current instant.
    pub fn evaluate_module(&self, state: Option<&ModuleState>) -> FinalExamGate {
        gating::final_exam_status(state, self.clock.now())
    }

    /// Whether gating is on: the stored flag, else the configured default.
    pub fn gating_enabled(&self) -> bool {
        self.read_or_default::<GatingFlags>(FLAGS_KEY)
            .map_or(self.gating_default, |flags| flags.gating_enabled)
    }

    pub fn set_gating_enabled(&self, enabled: bool) -> Result<(), StorageError> {
        self.storage.set_json(
            FLAGS_KEY,
            &GatingFlags {
                gating_enabled: enabled,
            },
        )
    }

    pub fn micro_quiz_start_allowed(&self, progress: Option<&SectionProgress>) -> StartDecision {
        gating::micro_quiz_start_allowed(progress, self.gating_enabled())
    }

    pub fn module_state(&self, module_id: &str) -> Option<ModuleState> {
        let mut modules: HashMap<String, ModuleState> = self.read_or_default(PROGRESS_KEY)?;
        modules.remove(module_id)
    }

    /// Store a module snapshot, replacing any previous one.
    pub fn put_module_state(&self, state: ModuleState) -> Result<(), StorageError> {
        let module_id = state.module_id.clone();
        self.update_module(&module_id, move |slot| *slot = Some(state))
            .map(|_| ())
    }

    fn update_module(
        &self,
        module_id: &str,
        update: impl FnOnce(&mut Option<ModuleState>),
    ) -> Result<Option<ModuleState>, StorageError> {
        let result = {
            let _guard = self.lock_writes();
            self.read_for_update::<HashMap<String, ModuleState>>(PROGRESS_KEY)
                .and_then(|mut modules| {
                    let mut slot = modules.remove(module_id);
                    update(&mut slot);
                    if let Some(state) = &slot {
                        modules.insert(module_id.to_string(), state.clone());
                    }
                    self.storage
                        .set_json(PROGRESS_KEY, &modules)
                        .map_err(UpdateError::Write)?;
                    Ok(slot)
                })
        };
        self.settle(PROGRESS_KEY, result)
    }

    /// Mark `quiz` passed in its module when `final_score` meets the quiz's
    /// passing score. A pass is never revoked. Returns the updated state, or
    /// `None` when the module is unknown.
    pub fn record_micro_quiz_result(
        &self,
        module_id: &str,
        quiz: &Quiz,
        final_score: f64,
    ) -> Result<Option<ModuleState>, StorageError> {
        if !quiz.is_passing(final_score) {
            return Ok(self.module_state(module_id));
        }
        self.update_module(module_id, |slot| {
            if let Some(state) = slot {
                state
                    .micro_quiz_state
                    .entry(quiz.quiz_id.clone())
                    .or_default()
                    .passed = true;
            }
        })
    }

    /// Record a final-exam pass against the module's current structure.
    pub fn record_final_exam_pass(
        &self,
        module_id: &str,
    ) -> Result<Option<ModuleState>, StorageError> {
        self.update_module(module_id, |slot| {
            if let Some(state) = slot {
                state.final_exam_passed = true;
                state.last_passed_signature = Some(state.structure_signature.clone());
            }
        })
    }

    /// Final exam status of a stored module; locked when unknown.
    pub fn evaluate_stored_module(&self, module_id: &str) -> FinalExamGate {
        let state = self.module_state(module_id);
        self.evaluate_module(state.as_ref())
    }
}

/// Union of two attempt lists, first occurrence of each id wins.
fn merge_by_id(first: Vec<Attempt>, second: Vec<Attempt>) -> Vec<Attempt> {
    let mut merged: Vec<Attempt> = Vec::with_capacity(first.len() + second.len());
    for attempt in first.into_iter().chain(second) {
        if !merged.iter().any(|m| m.attempt_id == attempt.attempt_id) {
            merged.push(attempt);
        }
    }
    merged
}
