//! Context file persistence.
//!
//! A context file holds one or more prefixes nested under their full dotted
//! path, e.g. `[token.t1.asset_type]`. Placeholder strings are written back
//! exactly as they were read.

use std::path::Path;

use tracing::debug;

use super::path::split_key;
use super::state::State;

use crate::types::Result;

/// Merge the subtree at `prefix` from `file` into the state tree. A file
/// without that prefix leaves the state untouched.
pub fn load_context_file(state: &State, file: &Path, prefix: &str) -> Result<()> {
    let text = std::fs::read_to_string(file)?;
    let table: toml::Table = toml::from_str(&text)?;
    let path = split_key(prefix);

    let mut current = toml::Value::Table(table);
    for key in &path {
        current = match current {
            toml::Value::Table(mut table) => match table.remove(key) {
                Some(value) => value,
                None => {
                    debug!(file = %file.display(), prefix, "Context file has no entry for prefix");
                    return Ok(());
                }
            },
            _ => return Ok(()),
        };
    }

    state.merge_at(&path, current)?;
    debug!(file = %file.display(), prefix, "Loaded context file");
    Ok(())
}

/// Write the subtree at `prefix` to `file`, replacing its contents
pub fn save_context_file(state: &State, file: &Path, prefix: &str) -> Result<()> {
    let path = split_key(prefix);
    let mut value = state
        .raw_at(&path)?
        .unwrap_or_else(|| toml::Value::Table(toml::Table::new()));

    for key in path.iter().rev() {
        let mut table = toml::Table::new();
        table.insert(key.clone(), value);
        value = toml::Value::Table(table);
    }

    let text = toml::to_string(&value)?;
    if let Some(parent) = file.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(file, text)?;
    debug!(file = %file.display(), prefix, "Saved context file");
    Ok(())
}
