//! Process-wide client state.
//!
//! `State` owns one tree holding both configuration tables (for example
//! `ContractFamily.Exchange.*.source`) and every context prefix. Absolute
//! placeholders resolve against this root. Clones share the tree.

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::debug;

use super::path::split_key;
use super::resolve;
use super::value::Node;
use super::view::Context;
use crate::config::ClientConfig;
use crate::types::{GuardianError, Result};

/// Directory under the data dir where contract save files live
pub const CONTRACT_CACHE_DIR: &str = "__contract_cache__";

#[derive(Clone)]
pub struct State {
    tree: Arc<RwLock<Node>>,
    config: Arc<ClientConfig>,
}

impl State {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            tree: Arc::new(RwLock::new(Node::default())),
            config: Arc::new(config),
        }
    }

    /// Load a client configuration file. The `[client]` table configures the
    /// process, every other table is merged into the state tree.
    pub fn from_config_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let mut table: toml::Table = toml::from_str(&text)?;

        let config = match table.remove("client") {
            Some(value) => value.try_into::<ClientConfig>()?,
            None => ClientConfig::default(),
        };

        let state = Self::new(config);
        state.merge(table)?;
        debug!(path = %path.display(), "Loaded client configuration");
        Ok(state)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn contract_cache_dir(&self) -> PathBuf {
        self.config.data_dir.join(CONTRACT_CACHE_DIR)
    }

    /// Context view rooted at a dotted prefix
    pub fn context(&self, prefix: &str) -> Context {
        Context::new(self.clone(), split_key(prefix))
    }

    /// Resolved value at an absolute dotted path
    pub fn get(&self, key: &str) -> Result<Option<toml::Value>> {
        let tree = self.read_tree()?;
        resolve::resolve(&tree, &split_key(key))
    }

    pub fn merge(&self, table: toml::Table) -> Result<()> {
        let mut tree = self.write_tree()?;
        tree.merge(Node::from_toml(toml::Value::Table(table)));
        Ok(())
    }

    /// Deep merge `value` into the subtree at `path`
    pub fn merge_at(&self, path: &[String], value: toml::Value) -> Result<()> {
        let mut wrapped = value;
        for key in path.iter().rev() {
            let mut table = toml::Table::new();
            table.insert(key.clone(), wrapped);
            wrapped = toml::Value::Table(table);
        }

        let mut tree = self.write_tree()?;
        tree.merge(Node::from_toml(wrapped));
        Ok(())
    }

    /// Unresolved copy of the subtree at `path`
    pub fn raw_at(&self, path: &[String]) -> Result<Option<toml::Value>> {
        let tree = self.read_tree()?;
        Ok(tree.lookup(path).map(Node::to_toml))
    }

    pub(crate) fn read_tree(&self) -> Result<RwLockReadGuard<'_, Node>> {
        self.tree
            .read()
            .map_err(|_| GuardianError::Internal("context tree lock poisoned".into()))
    }

    pub(crate) fn write_tree(&self) -> Result<RwLockWriteGuard<'_, Node>> {
        self.tree
            .write()
            .map_err(|_| GuardianError::Internal("context tree lock poisoned".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_from_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            [client]
            data_dir = "/tmp/pdo-data"

            [ContractFamily.Exchange.asset_type]
            source = "asset_type.b64"
            "#
        )
        .unwrap();

        let state = State::from_config_file(file.path()).unwrap();
        assert_eq!(state.config().data_dir, PathBuf::from("/tmp/pdo-data"));
        assert_eq!(
            state.contract_cache_dir(),
            PathBuf::from("/tmp/pdo-data/__contract_cache__")
        );
        assert_eq!(
            state.get("ContractFamily.Exchange.asset_type.source").unwrap(),
            Some(toml::Value::String("asset_type.b64".into()))
        );
        assert_eq!(state.get("client").unwrap(), None);
    }

    #[test]
    fn test_merge_at_prefix() {
        let state = State::new(ClientConfig::default());
        let value: toml::Table = toml::from_str("initialized = true").unwrap();
        state
            .merge_at(&split_key("token.t1"), toml::Value::Table(value))
            .unwrap();
        assert_eq!(
            state.get("token.t1.initialized").unwrap(),
            Some(toml::Value::Boolean(true))
        );
    }

    #[test]
    fn test_clones_share_tree() {
        let state = State::new(ClientConfig::default());
        let other = state.clone();
        other.context("a").set("b", 7).unwrap();
        assert_eq!(state.get("a.b").unwrap(), Some(toml::Value::Integer(7)));
    }
}
