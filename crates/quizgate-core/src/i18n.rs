//! Translation lookup with English fallback.
//!
//! `t(key, locale)` tries the requested locale, then `en`, then gives back
//! the key itself and publishes `i18n.missing_key`. Interpolation is left
//! to callers.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::json;

use crate::events::{EventBus, EventName};

/// Locale every lookup falls back to.
pub const FALLBACK_LOCALE: &str = "en";

/// Flat key → message table for one locale.
pub type Catalog = HashMap<String, String>;

/// Parse a catalog from a flat JSON object of strings.
pub fn parse_catalog(json: &str) -> Result<Catalog> {
    serde_json::from_str(json).context("failed to parse translation catalog")
}

/// Resolves message keys against per-locale catalogs.
pub struct Translator {
    catalogs: HashMap<String, Catalog>,
    bus: Arc<EventBus>,
}

impl Translator {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            catalogs: HashMap::new(),
            bus,
        }
    }

    pub fn from_catalogs(catalogs: HashMap<String, Catalog>, bus: Arc<EventBus>) -> Self {
        Self { catalogs, bus }
    }

    /// Add or replace the catalog for `locale`.
    pub fn insert_catalog(&mut self, locale: impl Into<String>, catalog: Catalog) {
        self.catalogs.insert(locale.into(), catalog);
    }

    /// Locales with a catalog, sorted.
    pub fn locales(&self) -> Vec<&str> {
        let mut locales: Vec<&str> = self.catalogs.keys().map(String::as_str).collect();
        locales.sort_unstable();
        locales
    }

    fn lookup(&self, locale: &str, key: &str) -> Option<&str> {
        self.catalogs
            .get(locale)
            .and_then(|catalog| catalog.get(key))
            .map(String::as_str)
    }

    /// Translate `key` for `locale`.
    pub fn t(&self, key: &str, locale: &str) -> String {
        if let Some(message) = self
            .lookup(locale, key)
            .or_else(|| self.lookup(FALLBACK_LOCALE, key))
        {
            return message.to_string();
        }

        tracing::warn!(key, locale, "missing translation");
        self.bus.publish(
            EventName::MissingTranslation,
            json!({ "key": key, "locale": locale }),
        );
        key.to_string()
    }
}
