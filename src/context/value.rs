//! Context tree nodes and placeholder values.
//!
//! Placeholder strings are parsed once, when a value enters the tree (file
//! load, template instantiation or `set`), into a tagged [`ContextValue`].
//! They are only dereferenced at read time, so overriding a referenced value
//! after instantiation is always observed.

use std::collections::BTreeMap;
use std::fmt;

use super::path::ContextPath;

/// What a reference produces when read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceKind {
    /// `${path}`: a copy of the value at `path`
    Value,
    /// `@{path}`: a handle onto the subtree at `path`
    Context,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub path: ContextPath,
    pub kind: ReferenceKind,
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ReferenceKind::Value => write!(f, "${{{}}}", self.path),
            ReferenceKind::Context => write!(f, "@{{{}}}", self.path),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ContextValue {
    Literal(toml::Value),
    Reference(Reference),
}

impl ContextValue {
    /// Parse a string, recognising whole-string `${...}` and `@{...}` forms.
    /// Anything else, including malformed placeholders, stays literal.
    pub fn parse(text: String) -> Self {
        let kind = if text.starts_with("${") {
            Some(ReferenceKind::Value)
        } else if text.starts_with("@{") {
            Some(ReferenceKind::Context)
        } else {
            None
        };

        match kind {
            Some(kind) if text.ends_with('}') => {
                match ContextPath::parse(&text[2..text.len() - 1]) {
                    Ok(path) => ContextValue::Reference(Reference { path, kind }),
                    Err(_) => ContextValue::Literal(toml::Value::String(text)),
                }
            }
            _ => ContextValue::Literal(toml::Value::String(text)),
        }
    }

    /// Serialized form; references go back to their placeholder text
    pub fn to_toml(&self) -> toml::Value {
        match self {
            ContextValue::Literal(value) => value.clone(),
            ContextValue::Reference(reference) => toml::Value::String(reference.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Table(BTreeMap<String, Node>),
    Value(ContextValue),
}

impl Default for Node {
    fn default() -> Self {
        Node::Table(BTreeMap::new())
    }
}

impl Node {
    pub fn from_toml(value: toml::Value) -> Self {
        match value {
            toml::Value::Table(table) => Node::Table(
                table
                    .into_iter()
                    .map(|(key, value)| (key, Node::from_toml(value)))
                    .collect(),
            ),
            toml::Value::String(text) => Node::Value(ContextValue::parse(text)),
            other => Node::Value(ContextValue::Literal(other)),
        }
    }

    /// Unresolved TOML form of this subtree
    pub fn to_toml(&self) -> toml::Value {
        match self {
            Node::Table(children) => toml::Value::Table(
                children
                    .iter()
                    .map(|(key, node)| (key.clone(), node.to_toml()))
                    .collect(),
            ),
            Node::Value(value) => value.to_toml(),
        }
    }

    pub fn reference(&self) -> Option<&Reference> {
        match self {
            Node::Value(ContextValue::Reference(reference)) => Some(reference),
            _ => None,
        }
    }

    pub fn child(&self, key: &str) -> Option<&Node> {
        match self {
            Node::Table(children) => children.get(key),
            Node::Value(_) => None,
        }
    }

    /// Walk `path` without following references
    pub fn lookup(&self, path: &[String]) -> Option<&Node> {
        path.iter().try_fold(self, |node, key| node.child(key))
    }

    /// Deep merge `other` into this node. Tables merge key by key, anything
    /// else is replaced.
    pub fn merge(&mut self, other: Node) {
        match (self, other) {
            (Node::Table(mine), Node::Table(theirs)) => {
                for (key, node) in theirs {
                    match mine.get_mut(&key) {
                        Some(existing) => existing.merge(node),
                        None => {
                            mine.insert(key, node);
                        }
                    }
                }
            }
            (slot, other) => *slot = other,
        }
    }
}
