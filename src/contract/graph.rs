//! Explicit dependency graph between contract object types.
//!
//! Edges name the context key through which a dependent object reaches its
//! dependency. Creation order is a post-order walk over the concrete
//! contexts those keys lead to, deduplicated on the resolved context path,
//! so a dependency shared by two objects is planned once.

use std::collections::{HashMap, HashSet};

use super::family::ObjectType;
use crate::context::Context;
use crate::types::{GuardianError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyKind {
    /// Created on demand before the dependent object
    Create,
    /// Owned by someone else; must already exist
    Existing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dependency {
    pub context_key: &'static str,
    pub object_type: ObjectType,
    pub kind: DependencyKind,
}

impl Dependency {
    pub const fn create(context_key: &'static str, object_type: ObjectType) -> Self {
        Self {
            context_key,
            object_type,
            kind: DependencyKind::Create,
        }
    }

    pub const fn existing(context_key: &'static str, object_type: ObjectType) -> Self {
        Self {
            context_key,
            object_type,
            kind: DependencyKind::Existing,
        }
    }
}

/// An object scheduled for creation and the context it lives in
#[derive(Debug, Clone)]
pub struct PlannedObject {
    pub object_type: ObjectType,
    pub context: Context,
}

#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    edges: HashMap<ObjectType, Vec<Dependency>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Edges of the exchange family
    pub fn standard() -> Self {
        use ObjectType::*;

        let mut graph = Self::new();
        graph.add(Vetting, Dependency::create("asset_type_context", AssetType));
        graph.add(Issuer, Dependency::create("asset_type_context", AssetType));
        graph.add(Issuer, Dependency::create("vetting_context", Vetting));
        graph.add(TokenIssuer, Dependency::create("vetting_context", Vetting));
        graph.add(TokenIssuer, Dependency::create("guardian_context", Guardian));
        graph.add(TokenObject, Dependency::create("token_issuer_context", TokenIssuer));
        graph.add(TokenObject, Dependency::create("data_guardian_context", Guardian));
        graph.add(Order, Dependency::existing("offer.issuer_context", Issuer));
        graph.add(Order, Dependency::existing("request.issuer_context", Issuer));
        graph
    }

    pub fn add(&mut self, from: ObjectType, dependency: Dependency) {
        self.edges.entry(from).or_default().push(dependency);
    }

    pub fn dependencies(&self, object_type: ObjectType) -> &[Dependency] {
        self.edges.get(&object_type).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every object that must exist before `context` can be created,
    /// dependencies first, ending with `context` itself
    pub fn creation_order(&self, object_type: ObjectType, context: &Context) -> Result<Vec<PlannedObject>> {
        let mut walk = Walk::default();
        self.visit(object_type, context.clone(), &mut walk)?;
        Ok(walk.order)
    }

    fn visit(&self, object_type: ObjectType, context: Context, walk: &mut Walk) -> Result<()> {
        let key = context.path();
        if walk.done.contains(&key) {
            return Ok(());
        }
        if walk.visiting.contains(&key) {
            walk.visiting.push(key);
            return Err(GuardianError::Config(format!(
                "dependency cycle: {}",
                walk.visiting.join(" -> ")
            )));
        }

        walk.visiting.push(key.clone());
        for dependency in self.dependencies(object_type) {
            if dependency.kind != DependencyKind::Create {
                continue;
            }
            let child = context.get_context(dependency.context_key)?;
            self.visit(dependency.object_type, child, walk)?;
        }
        walk.visiting.pop();

        walk.done.insert(key);
        walk.order.push(PlannedObject {
            object_type,
            context,
        });
        Ok(())
    }
}

#[derive(Default)]
struct Walk {
    visiting: Vec<String>,
    done: HashSet<String>,
    order: Vec<PlannedObject>,
}
