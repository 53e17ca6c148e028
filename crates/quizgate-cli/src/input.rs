//! Loading quiz, answer and module files.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use quizgate_core::model::{Answer, AnswerValue, ModuleState, Quiz};
use quizgate_core::signature::structure_signature;

fn read_json<T: DeserializeOwned>(path: &Path, what: &str) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {what} file: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("failed to parse {what} file: {}", path.display()))
}

pub fn load_quiz(path: &Path) -> Result<Quiz> {
    read_json(path, "quiz")
}

#[derive(Deserialize)]
#[serde(untagged)]
enum AnswerFile {
    List(Vec<Answer>),
    ByQid(BTreeMap<String, AnswerValue>),
}

/// Answers as a list of `{qid, selected}` or an object mapping qid to value.
pub fn load_answers(path: &Path) -> Result<Vec<Answer>> {
    Ok(match read_json(path, "answers")? {
        AnswerFile::List(answers) => answers,
        AnswerFile::ByQid(map) => map
            .into_iter()
            .map(|(qid, selected)| Answer::new(qid, selected))
            .collect(),
    })
}

/// A module snapshot. A missing `structureSignature` is computed from the
/// listed structure.
pub fn load_module(path: &Path) -> Result<ModuleState> {
    let mut module: ModuleState = read_json(path, "module")?;
    if module.structure_signature.is_empty() {
        module.structure_signature =
            structure_signature(&module.required_sections, &module.micro_quizzes);
    }
    Ok(module)
}
