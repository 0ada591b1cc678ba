use serde_json::Value;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// Trigger values set by the host application.
///
/// A `null` value is the same as no value.
#[derive(Debug, Default)]
pub struct TriggerStore {
    values: RwLock<HashMap<String, Value>>,
}

impl TriggerStore {
    pub fn get(&self, key: &str) -> Option<Value> {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    pub fn set(&self, key: &str, value: Value) {
        let mut values = self.values.write().unwrap_or_else(PoisonError::into_inner);
        if value.is_null() {
            values.remove(key);
        } else {
            values.insert(key.to_string(), value);
        }
    }

    pub fn set_all(&self, entries: HashMap<String, Value>) {
        for (key, value) in entries {
            self.set(&key, value);
        }
    }

    pub fn remove(&self, keys: &[&str]) {
        let mut values = self.values.write().unwrap_or_else(PoisonError::into_inner);
        for key in keys {
            values.remove(*key);
        }
    }

    pub fn snapshot(&self) -> HashMap<String, Value> {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
