//! Flat key/value store for ad hoc values outside the param-passing protocol.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::core::errors::Result;

/// Run-scoped `key -> value` store, last-writer-wins.
///
/// Shared by reference across an entire top-level run, including every
/// nested chain, so sibling sub-chains observe each other's writes.
#[derive(Debug, Clone, Default)]
pub struct VariableStore {
    data: Arc<DashMap<String, Value>>,
}

impl VariableStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        self.set_value(key, serde_json::to_value(value)?);
        Ok(())
    }

    pub fn set_value(&self, key: &str, value: Value) {
        self.data.insert(key.to_string(), value);
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.data.get(key).map(|entry| entry.value().clone())
    }

    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key) {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn snapshot(&self) -> HashMap<String, Value> {
        self.data
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(&self.snapshot()).map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn last_writer_wins() {
        let store = VariableStore::new();
        store.set("mode", &"draft").unwrap();
        store.set("mode", &"final").unwrap();

        assert_eq!(store.get("mode"), Some(json!("final")));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn typed_read_of_missing_key_is_none() {
        let store = VariableStore::new();
        assert_eq!(store.get_as::<String>("absent").unwrap(), None);
        assert!(store.is_empty());
    }
}
