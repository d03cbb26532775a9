//! Context initialization.
//!
//! Loads persisted state for a prefix, instantiates templates exactly once
//! (guarded by the `initialized` marker) and then applies caller overrides on
//! every call, initialized or not.

use std::path::Path;

use tracing::{debug, info, warn};

use super::file::load_context_file;
use super::state::State;
use super::template::TemplateRegistry;
use super::view::Context;
use crate::types::{GuardianError, Result};

const INITIALIZED: &str = "initialized";

/// Defaults written at the prefix root on first initialization
fn base_context() -> toml::Table {
    let mut base = toml::Table::new();
    base.insert("service_group".into(), "default".into());
    base.insert("eservice_group".into(), "${.service_group}".into());
    base.insert("pservice_group".into(), "${.service_group}".into());
    base.insert("sservice_group".into(), "${.service_group}".into());
    base
}

pub fn initialize_context<K, I>(
    state: &State,
    file: Option<&Path>,
    prefix: &str,
    registry: &TemplateRegistry,
    templates: &[&str],
    overrides: I,
) -> Result<Context>
where
    K: AsRef<str>,
    I: IntoIterator<Item = (K, toml::Value)>,
{
    if let Some(file) = file {
        if let Err(e) = load_context_file(state, file, prefix) {
            warn!(file = %file.display(), error = %e, "Unable to load context file, starting fresh");
        }
    }

    let context = state.context(prefix);

    if !context.has_key(INITIALIZED) {
        let selected = templates
            .iter()
            .map(|key| {
                registry
                    .get(key)
                    .map(|template| (*key, template))
                    .ok_or_else(|| GuardianError::Config(format!("unknown context template {}", key)))
            })
            .collect::<Result<Vec<_>>>()?;

        for (key, value) in base_context() {
            context.set_default(&key, value)?;
        }
        for (key, template) in selected {
            context.set(key, toml::Value::Table(template.clone()))?;
        }
        context.set(INITIALIZED, true)?;
        info!(prefix, templates = ?templates, "Initialized context");
    }

    for (key, value) in overrides {
        debug!(prefix, key = key.as_ref(), "Applying context override");
        context.set(key.as_ref(), value)?;
    }

    Ok(context)
}
