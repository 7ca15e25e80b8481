//! Submitted values, looked up by element hash.

use std::collections::HashMap;

use serde_json::Value;
use uuid::Uuid;

/// Source of submitted values for one synchronization session.
pub trait ValueSource {
    fn value(&self, hash: Uuid) -> Option<&Value>;
}

/// In-memory value map built from `(hash, value)` pairs.
#[derive(Debug, Clone, Default)]
pub struct SubmittedValues {
    values: HashMap<Uuid, Value>,
}

impl SubmittedValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, hash: Uuid, value: Value) -> Self {
        self.values.insert(hash, value);
        self
    }

    pub fn insert(&mut self, hash: Uuid, value: Value) {
        self.values.insert(hash, value);
    }

    pub fn remove(&mut self, hash: Uuid) -> Option<Value> {
        self.values.remove(&hash)
    }
}

impl ValueSource for SubmittedValues {
    fn value(&self, hash: Uuid) -> Option<&Value> {
        self.values.get(&hash)
    }
}
