//! Injected form definition source.
//!
//! Callers construct a source and hand it to whatever builds sessions; the
//! engine never consults a process-wide registry by name.

use indexmap::IndexMap;

use crate::element::FormTree;
use crate::error::{Result, SyncError};
use crate::schema::FormProperties;

/// A named, static form definition: document-level properties plus the
/// template element tree a session starts from.
#[derive(Debug, Clone)]
pub struct FormDefinition {
    pub properties: FormProperties,
    pub tree: FormTree,
}

/// Lookup interface for form definitions.
pub trait FormSource {
    fn list(&self) -> Vec<String>;
    fn get(&self, name: &str) -> Result<FormDefinition>;
    fn exists(&self, name: &str) -> bool;
}

/// In-memory form source; definitions registered explicitly per instance.
#[derive(Debug, Clone, Default)]
pub struct InMemoryFormSource {
    forms: IndexMap<String, FormDefinition>,
}

impl InMemoryFormSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, definition: FormDefinition) -> Self {
        self.forms.insert(name.into(), definition);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, definition: FormDefinition) {
        self.forms.insert(name.into(), definition);
    }
}

impl FormSource for InMemoryFormSource {
    fn list(&self) -> Vec<String> {
        self.forms.keys().cloned().collect()
    }

    fn get(&self, name: &str) -> Result<FormDefinition> {
        self.forms
            .get(name)
            .cloned()
            .ok_or_else(|| SyncError::UnknownForm {
                name: name.to_string(),
            })
    }

    fn exists(&self, name: &str) -> bool {
        self.forms.contains_key(name)
    }
}
