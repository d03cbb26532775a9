//! Path-addressable view onto the shared context tree.
//!
//! A `Context` is a `State` plus an absolute path. Views returned by
//! [`Context::get_context`] share the same tree, so a write made through a
//! `@{}` reference is visible at the referenced location and vice versa.

use serde::de::DeserializeOwned;

use super::path::{join_path, split_key, ContextPath};
use super::resolve;
use super::state::State;
use super::value::Node;
use crate::types::{GuardianError, Result};

#[derive(Clone)]
pub struct Context {
    state: State,
    path: Vec<String>,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context").field("path", &self.path()).finish()
    }
}

impl Context {
    pub(crate) fn new(state: State, path: Vec<String>) -> Self {
        Self { state, path }
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    /// Absolute dotted path of this view
    pub fn path(&self) -> String {
        join_path(&self.path)
    }

    pub fn segments(&self) -> &[String] {
        &self.path
    }

    /// Keys are dotted paths below this view. A leading dot addresses from
    /// this view with ascent, as placeholders do (`..identity`).
    fn absolute(&self, key: &str) -> Result<Vec<String>> {
        if key.starts_with('.') {
            ContextPath::parse(key)?.resolve(&self.path)
        } else {
            let mut path = self.path.clone();
            path.extend(split_key(key));
            Ok(path)
        }
    }

    /// Resolved value, `None` when the key is absent
    pub fn get(&self, key: &str) -> Result<Option<toml::Value>> {
        let path = self.absolute(key)?;
        let tree = self.state.read_tree()?;
        resolve::resolve(&tree, &path)
    }

    pub fn get_str(&self, key: &str) -> Result<Option<String>> {
        match self.get(key)? {
            None => Ok(None),
            Some(toml::Value::String(text)) => Ok(Some(text)),
            Some(other) => Err(GuardianError::Validation(format!(
                "{}.{} is a {}, expected a string",
                self.path(),
                key,
                other.type_str()
            ))),
        }
    }

    pub fn require_str(&self, key: &str) -> Result<String> {
        self.get_str(key)?
            .ok_or_else(|| GuardianError::MissingKey(format!("{}.{}", self.path(), key)))
    }

    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key)? {
            Some(value) => Ok(Some(value.try_into()?)),
            None => Ok(None),
        }
    }

    /// Resolved value converted to JSON for contract invocations
    pub fn get_json(&self, key: &str) -> Result<Option<serde_json::Value>> {
        match self.get(key)? {
            Some(value) => Ok(Some(serde_json::to_value(value)?)),
            None => Ok(None),
        }
    }

    /// Write a value, creating intermediate tables. Writes through
    /// references land in the referenced subtree.
    pub fn set(&self, key: &str, value: impl Into<toml::Value>) -> Result<()> {
        let path = self.absolute(key)?;
        let node = Node::from_toml(value.into());

        let mut tree = self.state.write_tree()?;
        let (last, parent) = path
            .split_last()
            .ok_or_else(|| GuardianError::Config("empty context key".into()))?;
        let mut target = resolve::follow(&tree, resolve::canonicalize(&tree, parent)?)?;
        target.push(last.clone());
        resolve::assign(&mut tree, &target, node)
    }

    pub fn set_json(&self, key: &str, value: &serde_json::Value) -> Result<()> {
        self.set(key, toml::Value::try_from(value)?)
    }

    /// Set only when the key is absent
    pub fn set_default(&self, key: &str, value: impl Into<toml::Value>) -> Result<()> {
        if !self.has_key(key) {
            self.set(key, value)?;
        }
        Ok(())
    }

    pub fn has_key(&self, key: &str) -> bool {
        let Ok(path) = self.absolute(key) else {
            return false;
        };
        match self.state.read_tree() {
            Ok(tree) => matches!(resolve::locate(&tree, &path), Ok(Some(_))),
            Err(_) => false,
        }
    }

    /// View rooted at `key`, following `@{}` links
    pub fn get_context(&self, key: &str) -> Result<Context> {
        let path = self.absolute(key)?;
        let tree = self.state.read_tree()?;
        let location = resolve::locate(&tree, &path)?.ok_or_else(|| {
            GuardianError::resolution(join_path(&path), "no such context")
        })?;

        match tree.lookup(&location) {
            Some(Node::Table(_)) => Ok(Context::new(self.state.clone(), location)),
            _ => Err(GuardianError::resolution(
                join_path(&location),
                "is a value, not a context",
            )),
        }
    }

    /// Dedicated resolution pass over the whole view
    pub fn resolve_all(&self) -> Result<toml::Table> {
        let tree = self.state.read_tree()?;
        match resolve::resolve(&tree, &self.path)? {
            Some(toml::Value::Table(table)) => Ok(table),
            Some(_) => Err(GuardianError::resolution(self.path(), "is not a table")),
            None => Ok(toml::Table::new()),
        }
    }

    /// Unresolved copy of the view, placeholders intact
    pub fn raw(&self) -> Result<toml::Table> {
        match self.state.raw_at(&self.path)? {
            Some(toml::Value::Table(table)) => Ok(table),
            _ => Ok(toml::Table::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;

    fn state_with(text: &str) -> State {
        let state = State::new(ClientConfig::default());
        state.merge(toml::from_str(text).unwrap()).unwrap();
        state
    }

    #[test]
    fn test_get_relative_and_absolute() {
        let state = state_with(
            r#"
            [ContractFamily.Exchange.vetting]
            source = "vetting.b64"
            [token.t1]
            identity = "alice"
            [token.t1.vetting]
            identity = "${..identity}"
            source = "${ContractFamily.Exchange.vetting.source}"
            "#,
        );
        let ctx = state.context("token.t1.vetting");
        assert_eq!(ctx.require_str("identity").unwrap(), "alice");
        assert_eq!(ctx.require_str("source").unwrap(), "vetting.b64");
        assert_eq!(ctx.require_str("..identity").unwrap(), "alice");
    }

    #[test]
    fn test_lazy_resolution_sees_overrides() {
        let state = state_with("[t]\nidentity = \"bob\"\n[t.issuer]\nidentity = \"${..identity}\"");
        let ctx = state.context("t");
        assert_eq!(ctx.require_str("issuer.identity").unwrap(), "bob");
        ctx.set("identity", "alice").unwrap();
        assert_eq!(ctx.require_str("issuer.identity").unwrap(), "alice");
    }

    #[test]
    fn test_set_creates_intermediate_structure() {
        let state = state_with("");
        let ctx = state.context("order.o1");
        ctx.set("order.offer.count", 4).unwrap();
        assert_eq!(ctx.get_as::<i64>("order.offer.count").unwrap(), Some(4));
    }

    #[test]
    fn test_reference_sharing() {
        let state = state_with(
            r#"
            [t.asset_type]
            name = "gold"
            [t.vetting]
            asset_type_context = "@{..asset_type}"
            "#,
        );
        let root = state.context("t");
        let via_ref = root.get_context("vetting.asset_type_context").unwrap();
        assert_eq!(via_ref.path(), "t.asset_type");

        via_ref.set("name", "silver").unwrap();
        assert_eq!(root.require_str("asset_type.name").unwrap(), "silver");

        root.set("asset_type.link", "https://example.com").unwrap();
        assert_eq!(via_ref.require_str("link").unwrap(), "https://example.com");

        root.set("vetting.asset_type_context.description", "shiny").unwrap();
        assert_eq!(root.require_str("asset_type.description").unwrap(), "shiny");
    }

    #[test]
    fn test_has_key_and_missing_context() {
        let state = state_with("[t]\ninitialized = true\nbroken = \"@{.nowhere}\"");
        let ctx = state.context("t");
        assert!(ctx.has_key("initialized"));
        assert!(!ctx.has_key("save_file"));
        assert!(!ctx.has_key("broken"));
        assert!(matches!(
            ctx.get_context("broken"),
            Err(GuardianError::Resolution { .. })
        ));
        assert!(ctx.get_context("initialized").is_err());
    }

    #[test]
    fn test_get_str_type_mismatch() {
        let state = state_with("[t]\ncount = 3");
        let ctx = state.context("t");
        assert!(matches!(ctx.get_str("count"), Err(GuardianError::Validation(_))));
        assert!(matches!(ctx.require_str("missing"), Err(GuardianError::MissingKey(_))));
    }

    #[test]
    fn test_resolve_all_and_raw() {
        let state = state_with(
            r#"
            [t]
            service_group = "default"
            eservice_group = "${.service_group}"
            [t.asset_type]
            name = "gold"
            [t.vetting]
            asset_type_context = "@{..asset_type}"
            "#,
        );
        let ctx = state.context("t");
        let resolved = ctx.resolve_all().unwrap();
        assert_eq!(resolved["eservice_group"].as_str(), Some("default"));
        assert_eq!(
            resolved["vetting"]["asset_type_context"].as_str(),
            Some("@{t.asset_type}")
        );

        let raw = ctx.raw().unwrap();
        assert_eq!(raw["eservice_group"].as_str(), Some("${.service_group}"));
    }

    #[test]
    fn test_set_json() {
        let state = state_with("");
        let ctx = state.context("t");
        ctx.set_json("meta", &serde_json::json!({"opaque": "", "n": 2}))
            .unwrap();
        assert_eq!(ctx.require_str("meta.opaque").unwrap(), "");
        assert_eq!(
            ctx.get_json("meta").unwrap(),
            Some(serde_json::json!({"opaque": "", "n": 2}))
        );
    }
}
