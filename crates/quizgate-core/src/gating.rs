//! Gating evaluators.
//!
//! Pure functions over a [`ModuleState`] snapshot that decide whether a
//! section counts as read, whether a micro-quiz may start and what state
//! the module's final exam is in.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{ModuleState, SectionProgress};

/// Read ratio at or above which a section counts as read.
pub const READ_THRESHOLD: f64 = 0.85;

/// Final exam state for a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FinalExamStatus {
    Locked,
    Ready,
    Passed,
    Outdated,
    Cooldown,
}

impl FinalExamStatus {
    /// Stable lowercase key, also used for i18n lookups.
    pub fn as_str(self) -> &'static str {
        match self {
            FinalExamStatus::Locked => "locked",
            FinalExamStatus::Ready => "ready",
            FinalExamStatus::Passed => "passed",
            FinalExamStatus::Outdated => "outdated",
            FinalExamStatus::Cooldown => "cooldown",
        }
    }
}

impl std::fmt::Display for FinalExamStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A requirement the learner has not met yet.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "camelCase")]
pub enum UnmetCriterion {
    SectionUnread(String),
    MicroNotPassed(String),
}

/// Final exam status with the criteria that are still unmet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalExamGate {
    pub status: FinalExamStatus,
    pub unmet_criteria: Vec<UnmetCriterion>,
}

impl FinalExamGate {
    fn locked(unmet_criteria: Vec<UnmetCriterion>) -> Self {
        Self {
            status: FinalExamStatus::Locked,
            unmet_criteria,
        }
    }
}

/// Why a micro-quiz may not start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StartBlocker {
    SectionUnread,
}

/// Decision on starting a micro-quiz.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartDecision {
    pub allowed: bool,
    pub reasons: Vec<StartBlocker>,
}

/// Whether a section counts as read. Missing progress is unread.
pub fn section_readable(progress: Option<&SectionProgress>) -> bool {
    match progress {
        Some(p) => p.read_ratio >= READ_THRESHOLD || p.manually_marked,
        None => false,
    }
}

/// Whether the micro-quiz attached to a section may start.
pub fn micro_quiz_start_allowed(
    progress: Option<&SectionProgress>,
    gating_enabled: bool,
) -> StartDecision {
    if !gating_enabled || section_readable(progress) {
        return StartDecision {
            allowed: true,
            reasons: Vec::new(),
        };
    }
    StartDecision {
        allowed: false,
        reasons: vec![StartBlocker::SectionUnread],
    }
}

/// Unmet requirements in declared order: sections first, then micro-quizzes.
pub fn unmet_criteria(state: &ModuleState) -> Vec<UnmetCriterion> {
    let sections = state
        .required_sections
        .iter()
        .filter(|id| !section_readable(state.section_progress.get(id.as_str())))
        .map(|id| UnmetCriterion::SectionUnread(id.clone()));

    let quizzes = state
        .micro_quizzes
        .iter()
        .filter(|id| {
            !state
                .micro_quiz_state
                .get(id.as_str())
                .is_some_and(|q| q.passed)
        })
        .map(|id| UnmetCriterion::MicroNotPassed(id.clone()));

    sections.chain(quizzes).collect()
}

/// Final exam status for a module at instant `now`.
///
/// Checks run in a fixed order: outdated pass, active cooldown, then
/// requirements. A missing or empty state is locked with no reasons.
pub fn final_exam_status(state: Option<&ModuleState>, now: DateTime<Utc>) -> FinalExamGate {
    let Some(state) = state.filter(|s| !s.is_empty()) else {
        return FinalExamGate::locked(Vec::new());
    };

    let unmet = unmet_criteria(state);

    let outdated = state.final_exam_passed
        && state.last_passed_signature.as_deref() != Some(state.structure_signature.as_str());

    let status = if outdated {
        FinalExamStatus::Outdated
    } else if state.cooldown_until.is_some_and(|until| until > now) {
        FinalExamStatus::Cooldown
    } else if unmet.is_empty() {
        if state.final_exam_passed {
            FinalExamStatus::Passed
        } else {
            FinalExamStatus::Ready
        }
    } else {
        FinalExamStatus::Locked
    };

    FinalExamGate {
        status,
        unmet_criteria: unmet,
    }
}
