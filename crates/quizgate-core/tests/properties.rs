//! Property tests for scoring, gating, signatures, retention and the
//! assessment service.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;
use serde_json::{json, Value};

use quizgate_core::events::{EventBus, DEFAULT_LOG_CAPACITY};
use quizgate_core::gating::{final_exam_status, unmet_criteria, FinalExamStatus, UnmetCriterion};
use quizgate_core::memory::MemoryStorage;
use quizgate_core::model::{
    Answer, AnswerValue, Attempt, AttemptStatus, MicroQuizState, ModuleState, Question,
    QuestionKind, Quiz, SectionProgress,
};
use quizgate_core::retention::{self, RetentionPolicy};
use quizgate_core::scoring::{score_quiz, ScoringIssueKind};
use quizgate_core::service::{
    AssessmentService, ATTEMPTS_KEY, DRAFT_KEY, FLAGS_KEY, PENDING_KEY, PROGRESS_KEY,
};
use quizgate_core::signature::structure_signature;
use quizgate_core::traits::{ManualClock, Storage};

// ---------------------------------------------------------------------------
// Helpers / Strategies
// ---------------------------------------------------------------------------

fn base() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
}

fn service_on(storage: Arc<MemoryStorage>, retention: RetentionPolicy) -> AssessmentService {
    let clock = Arc::new(ManualClock::new(base()));
    let bus = Arc::new(EventBus::with_clock(DEFAULT_LOG_CAPACITY, clock.clone()));
    AssessmentService::new(storage, clock, bus).with_retention(retention)
}

fn attempt(id: &str, quiz_id: &str, minute: i64) -> Attempt {
    Attempt {
        attempt_id: id.into(),
        quiz_id: quiz_id.into(),
        module_id: "m1".into(),
        timestamp: base() + Duration::minutes(minute),
        answers: vec![],
        scores: vec![],
        final_score: 50.0,
        status: AttemptStatus::Saved,
    }
}

fn arb_kind() -> impl Strategy<Value = QuestionKind> {
    prop_oneof![
        4 => Just(QuestionKind::SingleChoice),
        4 => Just(QuestionKind::MultipleChoice),
        3 => Just(QuestionKind::TrueFalse),
        1 => Just(QuestionKind::Ordering),
        1 => Just(QuestionKind::GapFill),
        1 => Just(QuestionKind::Unknown),
    ]
}

fn arb_label() -> impl Strategy<Value = String> {
    prop_oneof![
        4 => "[A-F]",
        1 => Just("true".to_string()),
        1 => Just("FALSE".to_string()),
    ]
}

fn arb_value() -> impl Strategy<Value = AnswerValue> {
    prop_oneof![
        any::<bool>().prop_map(AnswerValue::Flag),
        arb_label().prop_map(AnswerValue::One),
        prop::collection::vec(arb_label(), 0..5).prop_map(AnswerValue::Many),
    ]
}

/// Ordinary weights mixed with the extremes of `f64`.
fn arb_weight() -> impl Strategy<Value = f64> {
    prop_oneof![
        6 => 0.1f64..10.0,
        2 => 1e-300f64..1e-3,
        2 => 1e3f64..1e306,
        3 => prop::sample::select(vec![
            5e-324,
            f64::MIN_POSITIVE,
            1e308,
            f64::MAX,
            0.0,
            -3.0,
            f64::NAN,
            f64::INFINITY,
        ]),
        1 => any::<f64>(),
    ]
}

fn arb_question() -> impl Strategy<Value = Question> {
    (
        arb_kind(),
        prop::collection::vec(arb_label(), 0..6),
        prop::option::weighted(0.9, arb_value()),
        arb_weight(),
    )
        .prop_map(|(kind, options, correct, weight)| Question {
            qid: String::new(),
            kind,
            options,
            correct,
            weight,
        })
}

fn arb_quiz() -> impl Strategy<Value = Quiz> {
    prop::collection::vec(arb_question(), 0..12).prop_map(|questions| Quiz {
        quiz_id: "quiz-p".into(),
        module_id: "m1".into(),
        questions: questions
            .into_iter()
            .enumerate()
            .map(|(i, mut q)| {
                q.qid = format!("q{i}");
                q
            })
            .collect(),
        passing_score: 70.0,
        title: String::new(),
    })
}

/// Answers may name unknown qids and repeat known ones.
fn arb_answers() -> impl Strategy<Value = Vec<Answer>> {
    prop::collection::vec((0usize..14, arb_value()), 0..16).prop_map(|pairs| {
        pairs
            .into_iter()
            .map(|(i, value)| Answer::new(format!("q{i}"), value))
            .collect()
    })
}

fn arb_module_state() -> impl Strategy<Value = ModuleState> {
    (
        prop_oneof![
            4 => Just("m1".to_string()),
            1 => Just(String::new()),
            1 => Just("  ".to_string()),
        ],
        prop::collection::vec("s[0-4]", 0..5),
        prop::collection::vec("mq[0-3]", 0..4),
        prop::collection::hash_map("s[0-4]", (0.0f64..=1.0, any::<bool>()), 0..5),
        prop::collection::hash_map("mq[0-3]", any::<bool>(), 0..4),
        any::<bool>(),
        prop::option::of(any::<bool>()),
        prop::option::of(-120i64..120),
    )
        .prop_map(
            |(module_id, sections, quizzes, progress, quiz_state, passed, signed, cooldown)| {
                let mut state = ModuleState::new(module_id, sections, quizzes);
                state.section_progress = progress
                    .into_iter()
                    .map(|(id, (ratio, marked))| {
                        (
                            id,
                            SectionProgress {
                                read_ratio: ratio,
                                manually_marked: marked,
                            },
                        )
                    })
                    .collect();
                state.micro_quiz_state = quiz_state
                    .into_iter()
                    .map(|(id, passed)| (id, MicroQuizState { passed }))
                    .collect();
                state.final_exam_passed = passed;
                let signature = state.structure_signature.clone();
                state.last_passed_signature = signed.map(|current| {
                    if current {
                        signature
                    } else {
                        "0000000000000000".to_string()
                    }
                });
                state.cooldown_until = cooldown.map(|m| base() + Duration::minutes(m));
                state
            },
        )
}

/// An id list and a shuffled copy of it.
fn arb_ids_and_shuffle(pattern: &'static str) -> impl Strategy<Value = (Vec<String>, Vec<String>)> {
    prop::collection::vec(pattern, 0..6)
        .prop_flat_map(|ids| (Just(ids.clone()), Just(ids).prop_shuffle()))
}

/// Stored attempts over three quizzes with many tied timestamps.
fn arb_stored() -> impl Strategy<Value = Vec<Attempt>> {
    prop::collection::vec((0usize..3, 0i64..6), 0..25).prop_map(|rows| {
        rows.into_iter()
            .enumerate()
            .map(|(i, (quiz, minute))| attempt(&format!("s{i}"), &format!("quiz-{quiz}"), minute))
            .collect()
    })
}

fn arb_json() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::from),
        any::<f64>().prop_map(Value::from),
        "[a-z0-9 ]{0,8}".prop_map(Value::String),
    ];
    let nested = leaf.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::hash_map("[a-zA-Z]{1,6}", inner, 0..4)
                .prop_map(|map| Value::Object(map.into_iter().collect())),
        ]
    });
    prop_oneof![
        4 => nested,
        1 => Just(json!([])),
        1 => Just(json!({})),
    ]
}

// ---------------------------------------------------------------------------
// Property Tests
// ---------------------------------------------------------------------------

proptest! {
    /// Scores stay finite and inside their bounds for any quiz and answers.
    #[test]
    fn scores_stay_in_bounds(quiz in arb_quiz(), answers in arb_answers()) {
        let result = score_quiz(&quiz, &answers);

        prop_assert!(result.final_score.is_finite());
        prop_assert!((0.0..=100.0).contains(&result.final_score));
        prop_assert!((0.0..=100.0).contains(&result.percent));
        let tenths = result.final_score * 10.0;
        prop_assert!((tenths - tenths.round()).abs() < 1e-6);

        prop_assert_eq!(result.scores.len(), quiz.questions.len());
        for (question, score) in quiz.questions.iter().zip(&result.scores) {
            prop_assert!((0.0..=1.0).contains(&score.fraction));
            prop_assert!(score.points.is_finite());
            prop_assert!(score.points >= 0.0 && score.points <= score.weight * 100.0);
            if question.kind == QuestionKind::Unknown || question.kind.is_unscored() {
                prop_assert_eq!(score.fraction, 0.0);
            }
            if question.kind == QuestionKind::Unknown {
                let has_unknown_issue = result.issues.iter().any(|issue| {
                    issue.qid == question.qid
                        && matches!(issue.kind, ScoringIssueKind::UnknownKind)
                });
                prop_assert!(has_unknown_issue);
            }
        }
    }

    /// Scoring the same input twice gives the same result.
    #[test]
    fn scoring_is_repeatable(quiz in arb_quiz(), answers in arb_answers()) {
        let first = score_quiz(&quiz, &answers);
        let second = score_quiz(&quiz, &answers);
        prop_assert_eq!(first.final_score, second.final_score);
        prop_assert_eq!(first.percent.to_bits(), second.percent.to_bits());
        prop_assert_eq!(&first.scores, &second.scores);
        let qids = |s: &quizgate_core::scoring::QuizScore| {
            s.issues.iter().map(|i| i.qid.clone()).collect::<Vec<_>>()
        };
        prop_assert_eq!(qids(&first), qids(&second));
    }

    /// Weights near the top of the `f64` range keep their ratio.
    #[test]
    fn huge_weights_keep_their_ratio(w1 in 1e300f64..1e306, w2 in 1e300f64..1e306) {
        let single = |qid: &str, weight: f64| Question {
            qid: qid.into(),
            kind: QuestionKind::SingleChoice,
            options: vec!["A".into(), "B".into()],
            correct: Some(AnswerValue::One("A".into())),
            weight,
        };
        let quiz = Quiz {
            quiz_id: "huge".into(),
            module_id: "m1".into(),
            questions: vec![single("q1", w1), single("q2", w2)],
            passing_score: 70.0,
            title: String::new(),
        };
        let result = score_quiz(&quiz, &[Answer::new("q1", AnswerValue::One("A".into()))]);

        prop_assert!(result.issues.is_empty());
        let expected = w1 / (w1 + w2) * 100.0;
        prop_assert!((result.final_score - expected).abs() <= 0.1);
    }

    /// The gate is deterministic and follows its precedence order.
    #[test]
    fn gate_follows_precedence(state in arb_module_state()) {
        let now = base();
        let gate = final_exam_status(Some(&state), now);
        prop_assert_eq!(&gate, &final_exam_status(Some(&state), now));

        if state.is_empty() {
            prop_assert_eq!(gate.status, FinalExamStatus::Locked);
            prop_assert!(gate.unmet_criteria.is_empty());
            return Ok(());
        }

        let unmet = unmet_criteria(&state);
        prop_assert_eq!(&gate.unmet_criteria, &unmet);
        let first_quiz = unmet
            .iter()
            .position(|c| matches!(c, UnmetCriterion::MicroNotPassed(_)))
            .unwrap_or(unmet.len());
        prop_assert!(unmet[first_quiz..]
            .iter()
            .all(|c| matches!(c, UnmetCriterion::MicroNotPassed(_))));

        let outdated = state.final_exam_passed
            && state.last_passed_signature.as_deref() != Some(state.structure_signature.as_str());
        let cooling = state.cooldown_until.is_some_and(|until| until > now);
        prop_assert_eq!(gate.status == FinalExamStatus::Outdated, outdated);
        match gate.status {
            FinalExamStatus::Cooldown => {
                prop_assert!(cooling && !outdated);
            }
            FinalExamStatus::Passed => {
                prop_assert!(state.final_exam_passed && unmet.is_empty() && !cooling);
            }
            FinalExamStatus::Ready => {
                prop_assert!(!state.final_exam_passed && unmet.is_empty() && !cooling);
            }
            FinalExamStatus::Locked => {
                prop_assert!(!unmet.is_empty() && !cooling);
            }
            FinalExamStatus::Outdated => {}
        }
    }

    /// Reordering sections or micro-quizzes keeps the signature.
    #[test]
    fn signature_ignores_order(
        (sections, shuffled_sections) in arb_ids_and_shuffle("[a-z]{1,6}"),
        (quizzes, shuffled_quizzes) in arb_ids_and_shuffle("mq-[a-z0-9]{1,4}"),
    ) {
        let signature = structure_signature(&sections, &quizzes);
        prop_assert_eq!(signature.len(), 16);
        prop_assert_eq!(
            signature,
            structure_signature(&shuffled_sections, &shuffled_quizzes)
        );
    }

    /// Pruning evicts the oldest attempts of one quiz and nothing else.
    #[test]
    fn prune_evicts_oldest_of_one_quiz(
        stored in arb_stored(),
        cap in 1usize..5,
        target in 0usize..3,
    ) {
        let quiz_id = format!("quiz-{target}");
        let mut kept = stored.clone();
        let evicted = retention::prune(&mut kept, &quiz_id, &RetentionPolicy::fifo(cap));

        let owned_before = stored.iter().filter(|a| a.quiz_id == quiz_id).count();
        let owned_after: Vec<&Attempt> = kept.iter().filter(|a| a.quiz_id == quiz_id).collect();
        prop_assert_eq!(owned_after.len(), owned_before.min(cap));
        prop_assert_eq!(evicted.len(), owned_before - owned_after.len());
        prop_assert!(evicted.iter().all(|a| a.quiz_id == quiz_id));

        // Ties on the timestamp go to the earlier insertion.
        let index = |a: &Attempt| stored.iter().position(|s| s.attempt_id == a.attempt_id);
        for gone in &evicted {
            for survivor in &owned_after {
                prop_assert!(
                    gone.timestamp < survivor.timestamp
                        || (gone.timestamp == survivor.timestamp && index(gone) < index(survivor))
                );
            }
        }

        let others = |list: &[Attempt]| {
            list.iter()
                .filter(|a| a.quiz_id != quiz_id)
                .cloned()
                .collect::<Vec<_>>()
        };
        prop_assert_eq!(others(&kept), others(&stored));
        let positions: Vec<Option<usize>> = kept.iter().map(index).collect();
        prop_assert!(positions.windows(2).all(|w| w[0] < w[1]));
    }

    /// Every save leaves at most `cap` attempts per quiz.
    #[test]
    fn saves_respect_the_retention_cap(
        cap in 1usize..5,
        saves in prop::collection::vec((0usize..3, 0i64..4), 1..30),
    ) {
        let svc = service_on(Arc::new(MemoryStorage::new()), RetentionPolicy::fifo(cap));
        for (n, (quiz, minute)) in saves.into_iter().enumerate() {
            let quiz_id = format!("quiz-{quiz}");
            let before = svc.get_attempts(&quiz_id).len();
            let new = attempt(&format!("a{n}"), &quiz_id, minute);
            prop_assert!(svc.save_attempt(&new).is_ok());

            let after = svc.get_attempts(&quiz_id);
            prop_assert_eq!(after.len(), (before + 1).min(cap));
            if before < cap {
                prop_assert!(after.iter().any(|a| a.attempt_id == new.attempt_id));
            }
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Whatever is stored under the service's keys, no operation panics and
    /// a submission still ends saved or pending.
    #[test]
    fn service_survives_stored_garbage(
        attempts in arb_json(),
        progress in arb_json(),
        flags in arb_json(),
        drafts in arb_json(),
        pending in arb_json(),
        quiz in arb_quiz(),
        answers in arb_answers(),
    ) {
        let storage = Arc::new(MemoryStorage::new());
        for (key, value) in [
            (ATTEMPTS_KEY, attempts),
            (PROGRESS_KEY, progress),
            (FLAGS_KEY, flags),
            (DRAFT_KEY, drafts),
            (PENDING_KEY, pending),
        ] {
            storage.set(key, value).unwrap();
        }
        let svc = service_on(storage, RetentionPolicy::fifo(3));
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .start_paused(true)
            .build()
            .unwrap();

        let graded = svc.grade(&quiz, answers);
        prop_assert!((0.0..=100.0).contains(&graded.final_score));
        let _ = svc.get_attempts(&quiz.quiz_id);
        let _ = svc.start_draft(&quiz.quiz_id, json!({"q0": "A"}));
        let _ = svc.get_draft(&quiz.quiz_id);
        let _ = svc.micro_quiz_start_allowed(None);
        let _ = svc.evaluate_stored_module("m1");
        let _ = svc.record_micro_quiz_result("m1", &quiz, graded.final_score);
        let _ = svc.record_final_exam_pass("m1");

        let outcome = runtime.block_on(svc.submit_with_retry(graded.clone(), 1));
        prop_assert_eq!(&outcome.attempt_id, &graded.attempt_id);
        let listed = match outcome.status {
            AttemptStatus::Saved => svc.get_attempts(&quiz.quiz_id),
            AttemptStatus::PendingSync => svc.pending_attempts(),
        };
        prop_assert!(listed.iter().any(|a| a.attempt_id == graded.attempt_id));
        svc.clear_draft(&quiz.quiz_id);
    }
}
