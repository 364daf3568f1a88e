use std::collections::BTreeMap;

use serde::Serialize;

use crate::value::{Row, Value};

/// A single change a shaped query result makes to the context.
#[derive(Debug, Clone, PartialEq)]
pub enum ContextUpdate {
    /// Copy every column into the root namespace.
    MergeRoot(Row),
    /// Set one key, replacing any previous value.
    Set(String, Value),
}

/// Flat key/value namespace shared by every section of one report run.
///
/// Accumulate-only: nothing is removed between sections, and a key written
/// twice keeps the last value.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ReportContext {
    values: BTreeMap<String, Value>,
}

impl ReportContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, update: ContextUpdate) {
        match update {
            ContextUpdate::MergeRoot(row) => self.values.extend(row),
            ContextUpdate::Set(key, value) => {
                self.values.insert(key, value);
            }
        }
    }

    pub fn apply_all(&mut self, updates: impl IntoIterator<Item = ContextUpdate>) {
        for update in updates {
            self.apply(update);
        }
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}
