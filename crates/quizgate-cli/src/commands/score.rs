//! The `quizgate score` command.

use std::path::PathBuf;

use anyhow::Result;
use comfy_table::{Cell, Table};

use quizgate_core::scoring::{score_quiz, QuizScore};

use crate::input;

pub fn execute(quiz_path: PathBuf, answers_path: PathBuf, format: String) -> Result<()> {
    let quiz = input::load_quiz(&quiz_path)?;
    let answers = input::load_answers(&answers_path)?;

    let score = score_quiz(&quiz, &answers);
    for issue in &score.issues {
        tracing::warn!(quiz_id = %issue.quiz_id, qid = %issue.qid, "scoring issue: {}", issue.kind);
    }

    match format.as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&score)?),
        _ => {
            print_table(&score);
            let verdict = if quiz.is_passing(score.final_score) {
                "passed"
            } else {
                "failed"
            };
            println!(
                "Final score: {:.1}% ({verdict}, passing score {:.1}%)",
                score.final_score, quiz.passing_score
            );
            if !score.issues.is_empty() {
                println!("\nIssues:");
                for issue in &score.issues {
                    println!("  [{}] {}", issue.qid, issue.kind);
                }
            }
        }
    }

    Ok(())
}

fn print_table(score: &QuizScore) {
    let mut table = Table::new();
    table.set_header(vec!["Question", "Credit", "Weight", "Points"]);

    for s in &score.scores {
        let credit = if s.unscored {
            "unscored".to_string()
        } else {
            format!("{:.0}%", s.fraction * 100.0)
        };
        table.add_row(vec![
            Cell::new(&s.qid),
            Cell::new(credit),
            Cell::new(format!("{}", s.weight)),
            Cell::new(format!("{:.1}", s.points)),
        ]);
    }

    println!("{table}");
}
