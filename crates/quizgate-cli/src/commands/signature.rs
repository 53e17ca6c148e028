//! The `quizgate signature` command.

use anyhow::Result;

use quizgate_core::signature::structure_signature;

fn clean(ids: Vec<String>) -> Vec<String> {
    ids.into_iter()
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .collect()
}

pub fn execute(sections: Vec<String>, micro_quizzes: Vec<String>) -> Result<()> {
    let sections = clean(sections);
    let micro_quizzes = clean(micro_quizzes);
    println!("{}", structure_signature(&sections, &micro_quizzes));
    Ok(())
}
