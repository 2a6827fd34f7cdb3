//! Producer-prefixed store for explicit data flow between nodes.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::core::errors::Result;

/// Run-scoped `(producer, key) -> value` store.
///
/// Producers write under their own name; consumers declare a
/// `local -> "producer/key"` mapping and receive the resolved subset as
/// their input map. Cloning is cheap and shares the underlying storage, so
/// every node and nested chain of a run observes the same data.
#[derive(Debug, Clone, Default)]
pub struct ParamStore {
    data: Arc<DashMap<String, DashMap<String, Value>>>,
}

impl ParamStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores one value under `producer/key`.
    pub fn insert<T: Serialize>(&self, producer: &str, key: &str, value: &T) -> Result<()> {
        let value = serde_json::to_value(value)?;
        self.insert_value(producer, key, value);
        Ok(())
    }

    pub fn insert_value(&self, producer: &str, key: &str, value: Value) {
        let map = self
            .data
            .entry(producer.to_string())
            .or_insert_with(DashMap::new);
        map.insert(key.to_string(), value);
    }

    pub fn get(&self, producer: &str, key: &str) -> Option<Value> {
        self.data
            .get(producer)
            .and_then(|map| map.get(key).map(|entry| entry.value().clone()))
    }

    pub fn get_as<T: DeserializeOwned>(&self, producer: &str, key: &str) -> Result<Option<T>> {
        match self.get(producer, key) {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Bulk write: every output lands under `producer` as its namespace.
    pub fn store_outputs(&self, producer: &str, outputs: HashMap<String, Value>) {
        let map = self
            .data
            .entry(producer.to_string())
            .or_insert_with(DashMap::new);
        for (key, value) in outputs {
            map.insert(key, value);
        }
    }

    /// Bulk read: resolves a `local -> "producer/key"` mapping into the
    /// input map a node receives. Sources not present in the store are
    /// omitted from the result.
    pub fn resolve(&self, param_map: &HashMap<String, String>) -> HashMap<String, Value> {
        let mut inputs = HashMap::with_capacity(param_map.len());
        for (local, reference) in param_map {
            let Some((producer, key)) = reference.split_once('/') else {
                warn!("Param reference '{}' is missing its producer prefix", reference);
                continue;
            };
            match self.get(producer, key) {
                Some(value) => {
                    inputs.insert(local.clone(), value);
                }
                None => warn!("Param source '{}/{}' not present for input '{}'", producer, key, local),
            }
        }
        inputs
    }

    /// Serializable snapshot of the whole store.
    pub fn snapshot(&self) -> HashMap<String, HashMap<String, Value>> {
        self.data
            .iter()
            .map(|producer| {
                let values = producer
                    .value()
                    .iter()
                    .map(|entry| (entry.key().clone(), entry.value().clone()))
                    .collect();
                (producer.key().clone(), values)
            })
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
    fn insert_and_typed_read_round_trip() {
        let store = ParamStore::new();
        store.insert("fetch", "status", &200u16).unwrap();

        assert_eq!(store.get("fetch", "status"), Some(json!(200)));
        assert_eq!(store.get_as::<u16>("fetch", "status").unwrap(), Some(200));
        assert_eq!(store.get_as::<u16>("fetch", "missing").unwrap(), None);
    }

    #[test]
    fn resolve_maps_references_to_local_names() {
        let store = ParamStore::new();
        store.insert_value("fetch", "body", json!("payload"));
        store.insert_value("parse", "count", json!(3));

        let param_map = HashMap::from([
            ("raw".to_string(), "fetch/body".to_string()),
            ("n".to_string(), "parse/count".to_string()),
        ]);
        let inputs = store.resolve(&param_map);

        assert_eq!(inputs.len(), 2);
        assert_eq!(inputs["raw"], json!("payload"));
        assert_eq!(inputs["n"], json!(3));
    }

    #[test]
    fn resolve_omits_absent_sources() {
        let store = ParamStore::new();
        store.insert_value("fetch", "body", json!("payload"));

        let param_map = HashMap::from([
            ("raw".to_string(), "fetch/body".to_string()),
            ("gone".to_string(), "fetch/other".to_string()),
        ]);
        let inputs = store.resolve(&param_map);

        assert_eq!(inputs.len(), 1);
        assert!(inputs.contains_key("raw"));
    }

    #[test]
    fn store_outputs_namespaces_under_producer() {
        let store = ParamStore::new();
        let outputs = HashMap::from([
            ("a".to_string(), json!(1)),
            ("b".to_string(), json!(2)),
        ]);
        store.store_outputs("worker", outputs);

        assert_eq!(store.get("worker", "a"), Some(json!(1)));
        assert_eq!(store.get("worker", "b"), Some(json!(2)));
        assert_eq!(store.get("other", "a"), None);
    }
}
