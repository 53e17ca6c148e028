//! The `quizgate init` command.

use std::path::Path;

use anyhow::{Context, Result};

fn write_if_missing(path: &str, content: &str) -> Result<()> {
    let path = Path::new(path);
    if path.exists() {
        println!("{} already exists, skipping.", path.display());
        return Ok(());
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    std::fs::write(path, content).with_context(|| format!("failed to write {}", path.display()))?;
    println!("Created {}", path.display());
    Ok(())
}

pub fn execute() -> Result<()> {
    write_if_missing("quizgate.toml", SAMPLE_CONFIG)?;
    write_if_missing("sample/quiz.json", SAMPLE_QUIZ)?;
    write_if_missing("sample/answers.json", SAMPLE_ANSWERS)?;
    write_if_missing("sample/module.json", SAMPLE_MODULE)?;

    println!("\nNext steps:");
    println!("  1. Run: quizgate score --quiz sample/quiz.json --answers sample/answers.json");
    println!("  2. Run: quizgate gate --module sample/module.json");
    println!(
        "  3. Run: quizgate submit --quiz sample/quiz.json --answers sample/answers.json --store quizgate-store.json"
    );

    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# quizgate configuration

gating_enabled = true
max_retries = 3
default_locale = "en"

[retention]
max_attempts_stored = 20
strategy = "fifo"

[backoff]
base_delay_ms = 1000
max_delay_ms = 30000

[events]
log_capacity = 1000
"#;

const SAMPLE_QUIZ: &str = r#"{
  "quizId": "rust-basics-mq1",
  "moduleId": "rust-basics",
  "title": "Ownership warm-up",
  "passingScore": 70,
  "questions": [
    {
      "qid": "q1",
      "kind": "single_choice",
      "options": ["move", "copy", "clone"],
      "correct": "move"
    },
    {
      "qid": "q2",
      "kind": "multiple_choice",
      "options": ["Box", "Rc", "i32", "bool"],
      "correct": ["Box", "Rc"]
    },
    {
      "qid": "q3",
      "kind": "true_false",
      "correct": true,
      "weight": 2
    }
  ]
}
"#;

const SAMPLE_ANSWERS: &str = r#"{
  "q1": "move",
  "q2": ["Box"],
  "q3": true
}
"#;

const SAMPLE_MODULE: &str = r#"{
  "moduleId": "rust-basics",
  "requiredSections": ["ownership", "borrowing"],
  "microQuizzes": ["rust-basics-mq1"],
  "sectionProgress": {
    "ownership": { "readRatio": 1.0 },
    "borrowing": { "readRatio": 0.4 }
  },
  "microQuizState": {
    "rust-basics-mq1": { "passed": true }
  }
}
"#;
