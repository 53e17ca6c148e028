//! Quiz scoring with partial credit and half-up rounding.
//!
//! Scoring never fails: malformed questions earn zero and are reported as
//! [`ScoringIssue`]s so the caller can publish them. Per-question results
//! are kept unrounded; only the aggregate is rounded to one decimal.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{Answer, AnswerValue, Question, QuestionKind, QuestionScore, Quiz};

/// Why a question could not be scored normally.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "camelCase")]
pub enum ScoringIssueKind {
    #[error("question declares no correct answer")]
    MissingCorrectAnswer,

    #[error("correct answer has the wrong shape for a {kind} question")]
    MalformedCorrectAnswer { kind: QuestionKind },

    #[error("question kind is not supported")]
    UnknownKind,

    #[error("weight {weight} is not a positive, finite weight")]
    InvalidWeight { weight: f64 },
}

/// A scoring problem tied to one question of one quiz.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoringIssue {
    pub quiz_id: String,
    pub qid: String,
    pub kind: ScoringIssueKind,
}

/// Aggregate result of scoring one set of answers against a quiz.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizScore {
    pub quiz_id: String,
    pub scores: Vec<QuestionScore>,
    /// Sum of per-question points.
    pub earned: f64,
    /// Sum of `weight * 100` over scorable questions.
    pub total: f64,
    /// Unrounded percentage in `[0, 100]`.
    pub percent: f64,
    /// `percent` rounded half-up to one decimal.
    pub final_score: f64,
    #[serde(default)]
    pub issues: Vec<ScoringIssue>,
}

/// Round half-up (toward positive infinity) to one decimal place.
///
/// Non-finite input rounds to 0.
pub fn round_half_up_tenth(x: f64) -> f64 {
    if !x.is_finite() {
        return 0.0;
    }
    (x * 10.0 + 0.5).floor() / 10.0
}

/// Partial credit for a multiple-choice selection.
///
/// `hits / C - wrong / max(I, 1)` clamped to `[0, 1]`, where `C` is the
/// number of correct options and `I` the number of incorrect ones.
pub fn multiple_choice_fraction(selected: &[&str], correct: &[&str], option_count: usize) -> f64 {
    let correct: HashSet<&str> = correct.iter().copied().collect();
    if correct.is_empty() {
        return 0.0;
    }
    let selected: HashSet<&str> = selected.iter().copied().collect();

    let hits = selected.intersection(&correct).count() as f64;
    let wrong = selected.difference(&correct).count() as f64;
    let incorrect_options = option_count.saturating_sub(correct.len()).max(1) as f64;

    let fraction = hits / correct.len() as f64 - wrong / incorrect_options;
    fraction.clamp(0.0, 1.0)
}

/// Credit in `[0, 1]` for one question.
///
/// A missing answer earns zero without an issue. Weight is not checked
/// here; see [`score_quiz`].
pub fn score_question(
    question: &Question,
    selected: Option<&AnswerValue>,
) -> Result<f64, ScoringIssueKind> {
    match question.kind {
        QuestionKind::Ordering | QuestionKind::GapFill => return Ok(0.0),
        QuestionKind::Unknown => return Err(ScoringIssueKind::UnknownKind),
        _ => {}
    }

    let correct = question
        .correct
        .as_ref()
        .ok_or(ScoringIssueKind::MissingCorrectAnswer)?;
    let malformed = || ScoringIssueKind::MalformedCorrectAnswer {
        kind: question.kind,
    };

    match question.kind {
        QuestionKind::SingleChoice => {
            let expected = correct.canonical_single().ok_or_else(malformed)?;
            let Some(given) = selected.and_then(AnswerValue::canonical_single) else {
                return Ok(0.0);
            };
            Ok(if given == expected { 1.0 } else { 0.0 })
        }
        QuestionKind::TrueFalse => {
            let expected = correct
                .canonical_single()
                .map(|s| s.to_lowercase())
                .ok_or_else(malformed)?;
            let Some(given) = selected.and_then(AnswerValue::canonical_single) else {
                return Ok(0.0);
            };
            Ok(if given.to_lowercase() == expected {
                1.0
            } else {
                0.0
            })
        }
        QuestionKind::MultipleChoice => {
            let expected = correct
                .as_set()
                .filter(|set| !set.is_empty())
                .ok_or_else(malformed)?;
            let Some(given) = selected.and_then(AnswerValue::as_set) else {
                return Ok(0.0);
            };
            Ok(multiple_choice_fraction(
                &given,
                &expected,
                question.options.len(),
            ))
        }
        QuestionKind::Ordering | QuestionKind::GapFill | QuestionKind::Unknown => Ok(0.0),
    }
}

/// Score a set of answers against a quiz.
///
/// Questions with a non-positive weight, or one so large that its points
/// overflow, are left out of the totals and reported. When several answers
/// share a `qid`, the last wins.
pub fn score_quiz(quiz: &Quiz, answers: &[Answer]) -> QuizScore {
    let by_qid: HashMap<&str, &AnswerValue> = answers
        .iter()
        .map(|a| (a.qid.as_str(), &a.selected))
        .collect();

    let mut scores = Vec::with_capacity(quiz.questions.len());
    let mut issues = Vec::new();
    let mut earned = 0.0;
    let mut total = 0.0;

    for question in &quiz.questions {
        let weight = if question.weight > 0.0 && (question.weight * 100.0).is_finite() {
            question.weight
        } else {
            issues.push(ScoringIssue {
                quiz_id: quiz.quiz_id.clone(),
                qid: question.qid.clone(),
                kind: ScoringIssueKind::InvalidWeight {
                    weight: question.weight,
                },
            });
            0.0
        };

        let fraction = match score_question(question, by_qid.get(question.qid.as_str()).copied())
        {
            Ok(f) => f,
            Err(kind) => {
                issues.push(ScoringIssue {
                    quiz_id: quiz.quiz_id.clone(),
                    qid: question.qid.clone(),
                    kind,
                });
                0.0
            }
        };

        let max_points = weight * 100.0;
        let points = (fraction * max_points).clamp(0.0, max_points);
        earned += points;
        total += max_points;

        scores.push(QuestionScore {
            qid: question.qid.clone(),
            fraction,
            weight,
            points,
            unscored: question.kind.is_unscored(),
        });
    }

    let percent = if total.is_finite() {
        ratio_percent(earned, total)
    } else {
        // Sums overflowed; weights relative to the largest give the same ratio.
        let scale = scores.iter().map(|s| s.weight).fold(0.0, f64::max);
        let (earned, total) = scores.iter().fold((0.0, 0.0), |(e, t), s| {
            let w = s.weight / scale;
            (e + s.fraction * w, t + w)
        });
        ratio_percent(earned, total)
    };

    QuizScore {
        quiz_id: quiz.quiz_id.clone(),
        scores,
        earned,
        total,
        percent,
        final_score: round_half_up_tenth(percent).clamp(0.0, 100.0),
        issues,
    }
}

fn ratio_percent(earned: f64, total: f64) -> f64 {
    if total > 0.0 && earned.is_finite() && total.is_finite() {
        (earned / total * 100.0).clamp(0.0, 100.0)
    } else {
        0.0
    }
}
