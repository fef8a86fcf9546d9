//! Localization extension point.
//!
//! An extension registered with the async route generator sees every record
//! that lands in the table, so it can build its own per-locale index.

use std::collections::{BTreeMap, BTreeSet};

use parking_lot::RwLock;

use crate::pipeline::BoxError;
use crate::processor::ContentRecord;

/// Receives every record of a generation pass.
pub trait LocalizationIndex: Send + Sync {
    /// Called once before a generation pass registers its records.
    fn reset(&self) {}

    /// Register one record.
    fn register(&self, record: &ContentRecord) -> Result<(), BoxError>;
}

/// Groups routes by locale.
///
/// The locale comes from the `lang` (or `locale`) front matter key and
/// falls back to the configured default.
#[derive(Debug)]
pub struct LocaleIndex {
    default_locale: String,
    routes: RwLock<BTreeMap<String, BTreeSet<String>>>,
}

impl LocaleIndex {
    pub fn new(default_locale: impl Into<String>) -> Self {
        Self {
            default_locale: default_locale.into(),
            routes: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn default_locale(&self) -> &str {
        &self.default_locale
    }

    /// Routes registered under `locale`, sorted.
    pub fn routes_for(&self, locale: &str) -> Vec<String> {
        self.routes
            .read()
            .get(locale)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Locales seen so far, sorted.
    pub fn locales(&self) -> Vec<String> {
        self.routes.read().keys().cloned().collect()
    }

    fn locale_of<'a>(&'a self, record: &'a ContentRecord) -> &'a str {
        record
            .front_matter
            .get_str("lang")
            .or_else(|| record.front_matter.get_str("locale"))
            .unwrap_or(&self.default_locale)
    }
}

impl LocalizationIndex for LocaleIndex {
    fn reset(&self) {
        self.routes.write().clear();
    }

    fn register(&self, record: &ContentRecord) -> Result<(), BoxError> {
        let locale = self.locale_of(record);
        if locale.trim().is_empty() {
            return Err(format!("empty locale on {}", record.route).into());
        }

        self.routes
            .write()
            .entry(locale.to_string())
            .or_default()
            .insert(record.route.clone());
        Ok(())
    }
}
