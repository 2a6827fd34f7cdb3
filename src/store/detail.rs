//! Append-only audit trail accumulated during a run.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::errors::Result;

/// One audit entry recorded during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailEntry {
    pub key: String,
    pub value: Value,
    pub recorded_at: DateTime<Utc>,
}

/// Ordered, append-only log of `(key, value)` entries for one top-level run.
///
/// Entries are never removed during a run; the log can be serialized at any
/// time, including while nodes are still executing.
#[derive(Debug, Clone, Default)]
pub struct DetailLog {
    entries: Arc<Mutex<Vec<DetailEntry>>>,
}

impl DetailLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        self.append_value(key, serde_json::to_value(value)?);
        Ok(())
    }

    pub fn append_value(&self, key: &str, value: Value) {
        self.entries.lock().push(DetailEntry {
            key: key.to_string(),
            value,
            recorded_at: Utc::now(),
        });
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Point-in-time copy of the log, in append order.
    pub fn snapshot(&self) -> Vec<DetailEntry> {
        self.entries.lock().clone()
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(&self.snapshot()).map_err(Into::into)
    }

    pub fn to_pretty_json(&self) -> Result<String> {
        serde_json::to_string_pretty(&self.snapshot()).map_err(Into::into)
    }
}
