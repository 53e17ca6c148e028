//! Attempt retention.
//!
//! Bounds how many attempts are kept per quiz. Only FIFO eviction is
//! defined: the oldest attempts of a quiz go first, by timestamp with
//! insertion order breaking ties.

use serde::{Deserialize, Serialize};

use crate::model::Attempt;

/// Eviction strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetentionStrategy {
    #[default]
    Fifo,
}

/// How many attempts to keep per quiz, and which to evict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    #[serde(default = "default_max_attempts")]
    pub max_attempts_stored: usize,
    #[serde(default)]
    pub strategy: RetentionStrategy,
}

fn default_max_attempts() -> usize {
    20
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            max_attempts_stored: default_max_attempts(),
            strategy: RetentionStrategy::Fifo,
        }
    }
}

impl RetentionPolicy {
    /// A FIFO policy keeping at most `max` attempts per quiz (at least 1).
    pub fn fifo(max: usize) -> Self {
        Self {
            max_attempts_stored: max.max(1),
            strategy: RetentionStrategy::Fifo,
        }
    }

    /// The cap actually enforced. A zero cap behaves as 1.
    pub fn cap(&self) -> usize {
        self.max_attempts_stored.max(1)
    }
}

/// Remove the oldest attempts of `quiz_id` beyond the policy cap.
///
/// Attempts of other quizzes are untouched and the relative order of the
/// survivors is preserved. Returns the evicted attempts, oldest first.
pub fn prune(attempts: &mut Vec<Attempt>, quiz_id: &str, policy: &RetentionPolicy) -> Vec<Attempt> {
    let mut owned: Vec<(usize, &Attempt)> = attempts
        .iter()
        .enumerate()
        .filter(|(_, a)| a.quiz_id == quiz_id)
        .collect();

    let cap = policy.cap();
    if owned.len() <= cap {
        return Vec::new();
    }

    match policy.strategy {
        RetentionStrategy::Fifo => owned.sort_by(|(ia, a), (ib, b)| {
            a.timestamp.cmp(&b.timestamp).then(ia.cmp(ib))
        }),
    }

    let excess = owned.len() - cap;
    let mut evict: Vec<usize> = owned.iter().take(excess).map(|(i, _)| *i).collect();
    let evicted: Vec<Attempt> = evict.iter().map(|&i| attempts[i].clone()).collect();

    evict.sort_unstable();
    let mut index = 0;
    attempts.retain(|_| {
        let keep = evict.binary_search(&index).is_err();
        index += 1;
        keep
    });

    evicted
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::*;
    use crate::model::AttemptStatus;

    fn attempt(id: &str, quiz: &str, minute: i64) -> Attempt {
        Attempt {
            attempt_id: id.into(),
            quiz_id: quiz.into(),
            module_id: "m1".into(),
            timestamp: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
                + Duration::minutes(minute),
            answers: vec![],
            scores: vec![],
            final_score: 0.0,
            status: AttemptStatus::Saved,
        }
    }

    fn ids(attempts: &[Attempt]) -> Vec<&str> {
        attempts.iter().map(|a| a.attempt_id.as_str()).collect()
    }

    #[test]
    fn under_cap_is_untouched() {
        let mut list = vec![attempt("a1", "q1", 0), attempt("a2", "q1", 1)];
        assert!(prune(&mut list, "q1", &RetentionPolicy::fifo(2)).is_empty());
        assert_eq!(ids(&list), vec!["a1", "a2"]);
    }

    #[test]
    fn evicts_oldest_of_the_quiz_only() {
        let mut list = vec![
            attempt("a1", "q1", 0),
            attempt("b1", "q2", -10),
            attempt("a2", "q1", 1),
            attempt("a3", "q1", 2),
        ];
        let evicted = prune(&mut list, "q1", &RetentionPolicy::fifo(2));
        assert_eq!(ids(&evicted), vec!["a1"]);
        assert_eq!(ids(&list), vec!["b1", "a2", "a3"]);
    }

    #[test]
    fn timestamp_beats_insertion_order() {
        let mut list = vec![
            attempt("late", "q1", 5),
            attempt("early", "q1", 1),
            attempt("mid", "q1", 3),
        ];
        let evicted = prune(&mut list, "q1", &RetentionPolicy::fifo(1));
        assert_eq!(ids(&evicted), vec!["early", "mid"]);
        assert_eq!(ids(&list), vec!["late"]);
    }

    #[test]
    fn insertion_order_breaks_ties() {
        let mut list = vec![
            attempt("first", "q1", 0),
            attempt("second", "q1", 0),
            attempt("third", "q1", 0),
        ];
        let evicted = prune(&mut list, "q1", &RetentionPolicy::fifo(2));
        assert_eq!(ids(&evicted), vec!["first"]);
    }

    #[test]
    fn zero_cap_keeps_one() {
        let policy = RetentionPolicy {
            max_attempts_stored: 0,
            strategy: RetentionStrategy::Fifo,
        };
        let mut list = vec![attempt("a1", "q1", 0), attempt("a2", "q1", 1)];
        prune(&mut list, "q1", &policy);
        assert_eq!(ids(&list), vec!["a2"]);
    }

    #[test]
    fn bound_holds_over_many_saves() {
        let policy = RetentionPolicy::fifo(3);
        let mut list = Vec::new();
        for i in 0..25 {
            list.push(attempt(&format!("a{i}"), "q1", i));
            let evicted = prune(&mut list, "q1", &policy);
            assert!(list.len() <= 3);
            let min_kept = list.iter().map(|a| a.timestamp).min().unwrap();
            assert!(evicted.iter().all(|e| e.timestamp <= min_kept));
        }
        assert_eq!(ids(&list), vec!["a22", "a23", "a24"]);
    }

    #[test]
    fn policy_defaults() {
        let policy: RetentionPolicy = toml::from_str("").unwrap();
        assert_eq!(policy.max_attempts_stored, 20);
        assert_eq!(policy.strategy, RetentionStrategy::Fifo);
    }
}
