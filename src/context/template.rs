//! Template registry.
//!
//! An explicit registry, built once at startup from the static list of
//! contract families and handed to the initializer. Templates are deep
//! copied on registration; re-registering a key replaces the previous
//! template.

use std::collections::HashMap;

use tracing::debug;

use crate::contract::ContractFamily;
use crate::types::{GuardianError, Result};

#[derive(Debug, Clone, Default)]
pub struct TemplateRegistry {
    templates: HashMap<String, toml::Table>,
}

impl TemplateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in family
    pub fn builtin() -> Result<Self> {
        let mut registry = Self::new();
        for family in crate::contract::families() {
            registry.register_family(family)?;
        }
        Ok(registry)
    }

    pub fn add_context_mapping(&mut self, key: impl Into<String>, template: &toml::Table) {
        let key = key.into();
        if self.templates.insert(key.clone(), template.clone()).is_some() {
            debug!(key = %key, "Replaced context template");
        }
    }

    pub fn register_family(&mut self, family: &ContractFamily) -> Result<()> {
        for (key, text) in family.templates {
            let template: toml::Table = toml::from_str(text).map_err(|e| {
                GuardianError::Config(format!(
                    "invalid template {} in family {}: {}",
                    key, family.name, e
                ))
            })?;
            self.add_context_mapping(*key, &template);
        }
        debug!(family = family.name, count = family.templates.len(), "Registered templates");
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&toml::Table> {
        self.templates.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.templates.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.templates.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}
