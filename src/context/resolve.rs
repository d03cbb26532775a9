//! Placeholder resolution over the shared context tree.
//!
//! Paths are walked segment by segment. Whenever the walk lands on a
//! reference node it jumps to the referenced location and carries on from
//! there, so `vetting_context.asset_type_context.name` works through two
//! `@{}` links. A reference whose target does not exist is an error, never
//! a silent `None`.

use super::path::join_path;
use super::value::{ContextValue, Node, ReferenceKind};
use crate::types::{GuardianError, Result};

/// Upper bound on reference hops in a single lookup
const MAX_HOPS: usize = 64;

/// Rewrite `path` so no prefix of it lands on a reference node
pub(crate) fn canonicalize(root: &Node, path: &[String]) -> Result<Vec<String>> {
    let mut hops = 0;
    canonicalize_with(root, path, &mut hops)
}

/// Follow any chain of references sitting exactly at `at`
pub(crate) fn follow(root: &Node, at: Vec<String>) -> Result<Vec<String>> {
    let mut hops = 0;
    follow_with(root, at, &mut hops)
}

/// Fully resolve the value at an absolute path. Tables come back with every
/// `${}` expanded and every `@{}` rewritten to its absolute target.
pub(crate) fn resolve(root: &Node, path: &[String]) -> Result<Option<toml::Value>> {
    let mut hops = 0;
    let at = canonicalize_with(root, path, &mut hops)?;
    let at = follow_with(root, at, &mut hops)?;
    match root.lookup(&at) {
        Some(node) => render(root, &at, node, 0).map(Some),
        None => Ok(None),
    }
}

/// Canonical location of an existing node, following references
pub(crate) fn locate(root: &Node, path: &[String]) -> Result<Option<Vec<String>>> {
    let at = follow(root, canonicalize(root, path)?)?;
    Ok(root.lookup(&at).map(|_| at))
}

fn canonicalize_with(root: &Node, path: &[String], hops: &mut usize) -> Result<Vec<String>> {
    let mut at = Vec::with_capacity(path.len());
    for segment in path {
        at = follow_with(root, at, hops)?;
        at.push(segment.clone());
    }
    Ok(at)
}

fn follow_with(root: &Node, mut at: Vec<String>, hops: &mut usize) -> Result<Vec<String>> {
    while let Some(reference) = root.lookup(&at).and_then(Node::reference) {
        *hops += 1;
        if *hops > MAX_HOPS {
            return Err(GuardianError::resolution(
                reference.to_string(),
                format!("reference cycle at {}", join_path(&at)),
            ));
        }

        // the reference lives in the table one level up
        let base = &at[..at.len() - 1];
        let target = reference.path.resolve(base)?;
        let target = canonicalize_with(root, &target, hops)?;
        if root.lookup(&target).is_none() {
            return Err(GuardianError::resolution(
                reference.to_string(),
                format!("{} does not exist", join_path(&target)),
            ));
        }
        at = target;
    }
    Ok(at)
}

fn render(root: &Node, at: &[String], node: &Node, depth: usize) -> Result<toml::Value> {
    if depth > MAX_HOPS {
        return Err(GuardianError::resolution(
            join_path(at),
            "value references nest too deeply",
        ));
    }

    match node {
        Node::Value(ContextValue::Literal(value)) => Ok(value.clone()),
        Node::Value(ContextValue::Reference(reference)) => {
            let target = follow(root, at.to_vec())?;
            match reference.kind {
                ReferenceKind::Context => {
                    Ok(toml::Value::String(format!("@{{{}}}", join_path(&target))))
                }
                ReferenceKind::Value => match root.lookup(&target) {
                    Some(resolved) => render(root, &target, resolved, depth + 1),
                    None => Err(GuardianError::resolution(
                        reference.to_string(),
                        "target disappeared during resolution",
                    )),
                },
            }
        }
        Node::Table(children) => {
            let mut table = toml::Table::new();
            for (key, child) in children {
                let mut child_path = at.to_vec();
                child_path.push(key.clone());
                table.insert(key.clone(), render(root, &child_path, child, depth + 1)?);
            }
            Ok(toml::Value::Table(table))
        }
    }
}

/// Store `node` at `path`, creating intermediate tables
pub(crate) fn assign(root: &mut Node, path: &[String], node: Node) -> Result<()> {
    let (last, parents) = path
        .split_last()
        .ok_or_else(|| GuardianError::Config("cannot assign to the context root".into()))?;

    let mut current = root;
    for (depth, key) in parents.iter().enumerate() {
        let Node::Table(children) = current else {
            return Err(GuardianError::Config(format!(
                "{} is a value, not a table",
                join_path(&parents[..depth])
            )));
        };
        current = children.entry(key.clone()).or_default();
    }

    match current {
        Node::Table(children) => {
            children.insert(last.clone(), node);
            Ok(())
        }
        Node::Value(_) => Err(GuardianError::Config(format!(
            "{} is a value, not a table",
            join_path(parents)
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::path::split_key;

    fn tree(text: &str) -> Node {
        Node::from_toml(toml::Value::Table(toml::from_str(text).unwrap()))
    }

    #[test]
    fn test_absolute_value_reference() {
        let root = tree("c = \"${a.b}\"\n[a]\nb = 1");
        let value = resolve(&root, &split_key("c")).unwrap();
        assert_eq!(value, Some(toml::Value::Integer(1)));
    }

    #[test]
    fn test_relative_value_reference() {
        let root = tree("[a.b]\nc = 2\nd = \"${.c}\"");
        let value = resolve(&root, &split_key("a.b.d")).unwrap();
        assert_eq!(value, Some(toml::Value::Integer(2)));
    }

    #[test]
    fn test_walk_through_context_reference() {
        let root = tree(
            r#"
            [t.asset_type]
            name = "gold"
            [t.vetting]
            asset_type_context = "@{..asset_type}"
            "#,
        );
        let value = resolve(&root, &split_key("t.vetting.asset_type_context.name")).unwrap();
        assert_eq!(value, Some(toml::Value::String("gold".into())));
    }

    #[test]
    fn test_missing_target_is_error() {
        let root = tree("c = \"${a.missing}\"\n[a]\nb = 1");
        assert!(matches!(
            resolve(&root, &split_key("c")),
            Err(GuardianError::Resolution { .. })
        ));
    }

    #[test]
    fn test_plain_missing_key_is_none() {
        let root = tree("[a]\nb = 1");
        assert_eq!(resolve(&root, &split_key("a.zzz")).unwrap(), None);
    }

    #[test]
    fn test_cycle_detected() {
        let root = tree("a = \"${b}\"\nb = \"${a}\"");
        assert!(resolve(&root, &split_key("a")).is_err());
    }

    #[test]
    fn test_chained_references() {
        let root = tree(
            r#"
            service_group = "default"
            eservice_group = "${.service_group}"
            [issuer]
            eservice_group = "${..eservice_group}"
            "#,
        );
        let value = resolve(&root, &split_key("issuer.eservice_group")).unwrap();
        assert_eq!(value, Some(toml::Value::String("default".into())));
    }

    #[test]
    fn test_assign_creates_intermediate_tables() {
        let mut root = Node::default();
        assign(&mut root, &split_key("order.offer.count"), tree("x = 5").child("x").unwrap().clone())
            .unwrap();
        assert_eq!(
            resolve(&root, &split_key("order.offer.count")).unwrap(),
            Some(toml::Value::Integer(5))
        );
    }

    #[test]
    fn test_assign_below_scalar_fails() {
        let mut root = tree("a = 1");
        assert!(assign(&mut root, &split_key("a.b"), Node::default()).is_err());
    }
}
