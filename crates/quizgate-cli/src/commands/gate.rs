//! The `quizgate gate` command.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde_json::json;

use quizgate_core::config::load_config_from;
use quizgate_core::events::EventBus;
use quizgate_core::gating::{final_exam_status, UnmetCriterion};
use quizgate_core::i18n::{parse_catalog, Translator};

use crate::input;

const EN_CATALOG: &str = include_str!("../../locales/en.json");
const DE_CATALOG: &str = include_str!("../../locales/de.json");

fn translator() -> Result<Translator> {
    let catalogs = HashMap::from([
        ("en".to_string(), parse_catalog(EN_CATALOG)?),
        ("de".to_string(), parse_catalog(DE_CATALOG)?),
    ]);
    Ok(Translator::from_catalogs(catalogs, Arc::new(EventBus::default())))
}

fn criterion_label(t: &Translator, criterion: &UnmetCriterion, locale: &str) -> String {
    let (key, id) = match criterion {
        UnmetCriterion::SectionUnread(id) => ("gate.unmet.sectionUnread", id),
        UnmetCriterion::MicroNotPassed(id) => ("gate.unmet.microNotPassed", id),
    };
    t.t(key, locale).replace("{id}", id)
}

pub fn execute(
    module_path: PathBuf,
    now: Option<String>,
    locale: Option<String>,
    format: String,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let module = input::load_module(&module_path)?;
    let now = match now {
        Some(raw) => DateTime::parse_from_rfc3339(&raw)
            .with_context(|| format!("invalid --now timestamp: {raw}"))?
            .with_timezone(&Utc),
        None => Utc::now(),
    };
    let locale = match locale {
        Some(l) => l,
        None => load_config_from(config_path.as_deref())?.default_locale,
    };

    let gate = final_exam_status(Some(&module), now);
    let t = translator()?;
    let status_label = t.t(&format!("gate.status.{}", gate.status), &locale);

    match format.as_str() {
        "json" => {
            let out = json!({
                "moduleId": module.module_id,
                "status": gate.status,
                "label": status_label,
                "unmetCriteria": gate.unmet_criteria,
                "structureSignature": module.structure_signature,
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        _ => {
            println!("{}: {}", t.t("gate.module", &locale), module.module_id);
            println!("{}: {status_label}", t.t("gate.finalExam", &locale));
            if gate.unmet_criteria.is_empty() {
                println!("{}", t.t("gate.unmet.none", &locale));
            } else {
                println!("{}:", t.t("gate.unmet.heading", &locale));
                for criterion in &gate.unmet_criteria {
                    println!("  - {}", criterion_label(&t, criterion, &locale));
                }
            }
        }
    }

    Ok(())
}
