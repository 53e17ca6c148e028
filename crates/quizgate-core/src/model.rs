//! Core data model types for quizgate.
//!
//! These are the types the whole assessment core passes around: quiz
//! definitions, learner answers, scored attempts and the module progress
//! snapshot the gating evaluators read. JSON field names are camelCase so
//! that content files and stored values stay readable by the web frontend.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::signature::structure_signature;

/// Passing threshold used when a quiz does not declare one.
pub const DEFAULT_PASSING_SCORE: f64 = 70.0;

/// How a question is answered and therefore how it is scored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
    #[serde(alias = "single")]
    SingleChoice,
    #[serde(alias = "multiple")]
    MultipleChoice,
    #[serde(alias = "truefalse", alias = "boolean")]
    TrueFalse,
    Ordering,
    #[serde(alias = "gap")]
    GapFill,
    /// A kind this engine cannot score. Such questions earn zero and are
    /// reported as a scoring error.
    #[serde(other)]
    Unknown,
}

impl QuestionKind {
    /// Kinds that are accepted but never earn credit.
    pub fn is_unscored(self) -> bool {
        matches!(self, QuestionKind::Ordering | QuestionKind::GapFill)
    }
}

impl fmt::Display for QuestionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuestionKind::SingleChoice => write!(f, "single_choice"),
            QuestionKind::MultipleChoice => write!(f, "multiple_choice"),
            QuestionKind::TrueFalse => write!(f, "true_false"),
            QuestionKind::Ordering => write!(f, "ordering"),
            QuestionKind::GapFill => write!(f, "gap_fill"),
            QuestionKind::Unknown => write!(f, "unknown"),
        }
    }
}

impl FromStr for QuestionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "single_choice" | "single" => Ok(QuestionKind::SingleChoice),
            "multiple_choice" | "multiple" => Ok(QuestionKind::MultipleChoice),
            "true_false" | "truefalse" | "boolean" => Ok(QuestionKind::TrueFalse),
            "ordering" => Ok(QuestionKind::Ordering),
            "gap_fill" | "gap" => Ok(QuestionKind::GapFill),
            other => Err(format!("unknown question kind: {other}")),
        }
    }
}

/// A declared correct answer or a learner's selection.
///
/// The same three shapes appear on both sides, so one type covers them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnswerValue {
    Flag(bool),
    One(String),
    Many(Vec<String>),
}

impl AnswerValue {
    /// Canonical single value used by single-choice and true/false scoring.
    ///
    /// Lists collapse to their first element; booleans become `"true"` or
    /// `"false"` so `true` and `"true"` compare equal.
    pub fn canonical_single(&self) -> Option<String> {
        match self {
            AnswerValue::Flag(b) => Some(b.to_string()),
            AnswerValue::One(s) => Some(s.clone()),
            AnswerValue::Many(items) => items.first().cloned(),
        }
    }

    /// The value viewed as a set of option labels.
    ///
    /// Booleans have no set view.
    pub fn as_set(&self) -> Option<Vec<&str>> {
        match self {
            AnswerValue::Flag(_) => None,
            AnswerValue::One(s) => Some(vec![s.as_str()]),
            AnswerValue::Many(items) => Some(items.iter().map(String::as_str).collect()),
        }
    }
}

/// A single question inside a quiz.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    /// Question identifier, unique within its quiz.
    pub qid: String,
    /// Question kind.
    #[serde(alias = "type")]
    pub kind: QuestionKind,
    /// Option labels for the choice kinds.
    #[serde(default)]
    pub options: Vec<String>,
    /// Declared correct answer. Missing on malformed content.
    #[serde(default)]
    pub correct: Option<AnswerValue>,
    /// Relative weight; must be strictly positive.
    #[serde(default = "default_weight")]
    pub weight: f64,
}

fn default_weight() -> f64 {
    1.0
}

/// A quiz: an ordered list of questions owned by a module.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quiz {
    pub quiz_id: String,
    pub module_id: String,
    #[serde(default)]
    pub questions: Vec<Question>,
    /// Percentage an attempt needs to count as passed.
    #[serde(default = "default_passing_score")]
    pub passing_score: f64,
    /// Descriptive title, not used by the core.
    #[serde(default)]
    pub title: String,
}

fn default_passing_score() -> f64 {
    DEFAULT_PASSING_SCORE
}

impl Quiz {
    /// Whether `final_score` meets this quiz's passing threshold.
    pub fn is_passing(&self, final_score: f64) -> bool {
        final_score >= self.passing_score
    }
}

/// A learner's answer to one question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Answer {
    pub qid: String,
    pub selected: AnswerValue,
}

impl Answer {
    pub fn new(qid: impl Into<String>, selected: AnswerValue) -> Self {
        Self {
            qid: qid.into(),
            selected,
        }
    }
}

/// The scored outcome of a single question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionScore {
    pub qid: String,
    /// Credit in `[0, 1]`, unrounded.
    pub fraction: f64,
    /// Effective weight used for aggregation (0 for ignored questions).
    pub weight: f64,
    /// `fraction * weight * 100`, bounded to `[0, 100 * weight]`.
    pub points: f64,
    /// True for kinds that are accepted but never earn credit.
    #[serde(default)]
    pub unscored: bool,
}

/// Lifecycle of a stored attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AttemptStatus {
    Saved,
    PendingSync,
}

impl fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptStatus::Saved => write!(f, "saved"),
            AttemptStatus::PendingSync => write!(f, "pendingSync"),
        }
    }
}

/// One completed submission of a quiz with its scored outcome.
///
/// Stored attempts are never changed in place; use [`Attempt::with_status`]
/// to derive a new value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attempt {
    pub attempt_id: String,
    pub quiz_id: String,
    pub module_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub answers: Vec<Answer>,
    #[serde(default)]
    pub scores: Vec<QuestionScore>,
    /// Aggregate percentage, rounded half-up to one decimal.
    pub final_score: f64,
    pub status: AttemptStatus,
}

impl Attempt {
    /// A copy of this attempt carrying `status`.
    pub fn with_status(&self, status: AttemptStatus) -> Attempt {
        Attempt {
            status,
            ..self.clone()
        }
    }
}

/// Reading progress for one section of a module.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionProgress {
    /// Fraction of the section scrolled through, in `[0, 1]`.
    #[serde(default)]
    pub read_ratio: f64,
    /// Learner explicitly marked the section as read.
    #[serde(default)]
    pub manually_marked: bool,
}

impl SectionProgress {
    pub fn read(read_ratio: f64) -> Self {
        Self {
            read_ratio,
            manually_marked: false,
        }
    }

    pub fn marked() -> Self {
        Self {
            read_ratio: 0.0,
            manually_marked: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MicroQuizState {
    #[serde(default)]
    pub passed: bool,
}

/// Snapshot of a learner's progress through one module.
///
/// Owned by the progress layer; the gating evaluators only read it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleState {
    pub module_id: String,
    #[serde(default)]
    pub required_sections: Vec<String>,
    #[serde(default)]
    pub micro_quizzes: Vec<String>,
    #[serde(default)]
    pub section_progress: HashMap<String, SectionProgress>,
    #[serde(default)]
    pub micro_quiz_state: HashMap<String, MicroQuizState>,
    #[serde(default)]
    pub final_exam_passed: bool,
    /// Signature of the current required structure.
    #[serde(default)]
    pub structure_signature: String,
    /// Signature recorded when the final exam was last passed.
    #[serde(default)]
    pub last_passed_signature: Option<String>,
    #[serde(default)]
    pub cooldown_until: Option<DateTime<Utc>>,
}

impl ModuleState {
    /// A fresh module state whose signature matches its structure.
    pub fn new(
        module_id: impl Into<String>,
        required_sections: Vec<String>,
        micro_quizzes: Vec<String>,
    ) -> Self {
        let structure_signature = structure_signature(&required_sections, &micro_quizzes);
        Self {
            module_id: module_id.into(),
            required_sections,
            micro_quizzes,
            structure_signature,
            ..Default::default()
        }
    }

    /// A copy with a new required structure and a recomputed signature.
    ///
    /// Progress and the last passed signature are carried over, so a module
    /// whose structure changed after a pass reports as outdated.
    pub fn with_structure(
        &self,
        required_sections: Vec<String>,
        micro_quizzes: Vec<String>,
    ) -> Self {
        let structure_signature = structure_signature(&required_sections, &micro_quizzes);
        Self {
            required_sections,
            micro_quizzes,
            structure_signature,
            ..self.clone()
        }
    }

    /// True when no module is described at all.
    pub fn is_empty(&self) -> bool {
        self.module_id.trim().is_empty()
    }
}
