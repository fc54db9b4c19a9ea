//! Declarative node construction.
//!
//! A [`NodeSchema`] lists named fields, each of which is one of:
//! - a plain value, stored in the node's initial snapshot
//! - an action, callable through [`StateNode::invoke`]
//! - a nested schema, built into an attached child node
//!
//! On-create hooks run once the node and all of its children exist.
//! Children are completed (hooks included) before their parent.
//!
//! ```ignore
//! let schema = NodeSchema::new()
//!     .value("title", "Inbox")
//!     .child("counter", NodeSchema::new()
//!         .value("value", 0)
//!         .action("increment", |node, _| {
//!             node.update("value", |v| Value::from(v.as_i64().unwrap_or(0) + 1))?;
//!             Ok(())
//!         }));
//!
//! let page = tree.build(&schema)?;
//! page.child("counter").unwrap().invoke("increment", Value::Null)?;
//! assert_eq!(page.get("counter.value")?, Value::from(1));
//! ```

use crate::error::{Result, StateError};
use crate::store::{StateNode, StateTree};
use crate::types::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::rc::Rc;
use tracing::warn;

/// Named operation bound to a node.
pub type Action = Rc<dyn Fn(&StateNode, Value) -> Result<()>>;

/// Hook run after a node is built.
pub type CreateHook = Rc<dyn Fn(&StateNode) -> Result<()>>;

/// How a schema field is realized.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldKind {
    Value,
    Action,
    Child,
}

#[derive(Clone)]
enum Field {
    Value(Value),
    Action(Action),
    Child(NodeSchema),
}

impl Field {
    fn kind(&self) -> FieldKind {
        match self {
            Field::Value(_) => FieldKind::Value,
            Field::Action(_) => FieldKind::Action,
            Field::Child(_) => FieldKind::Child,
        }
    }
}

/// Description of a node to build.
#[derive(Clone, Default)]
pub struct NodeSchema {
    fields: Vec<(String, Field)>,
    hooks: Vec<CreateHook>,
}

impl NodeSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn value(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.push((name.into(), Field::Value(value.into())));
        self
    }

    pub fn action<F>(mut self, name: impl Into<String>, action: F) -> Self
    where
        F: Fn(&StateNode, Value) -> Result<()> + 'static,
    {
        self.fields.push((name.into(), Field::Action(Rc::new(action))));
        self
    }

    pub fn child(mut self, name: impl Into<String>, schema: NodeSchema) -> Self {
        self.fields.push((name.into(), Field::Child(schema)));
        self
    }

    pub fn on_create<F>(mut self, hook: F) -> Self
    where
        F: Fn(&StateNode) -> Result<()> + 'static,
    {
        self.hooks.push(Rc::new(hook));
        self
    }

    /// Classification of a field, if declared.
    pub fn kind(&self, name: &str) -> Option<FieldKind> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, field)| field.kind())
    }

    /// Declared fields in declaration order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, FieldKind)> {
        self.fields
            .iter()
            .map(|(name, field)| (name.as_str(), field.kind()))
    }

    fn check_duplicates(&self) -> Result<()> {
        let mut seen = BTreeSet::new();
        for (name, _) in &self.fields {
            if !seen.insert(name.as_str()) {
                return Err(StateError::DuplicateField(name.clone()));
            }
        }
        Ok(())
    }
}

impl fmt::Debug for NodeSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeSchema")
            .field("fields", &self.fields().collect::<Vec<_>>())
            .field("hooks", &self.hooks.len())
            .finish()
    }
}

pub(crate) fn build(tree: &StateTree, schema: &NodeSchema) -> Result<StateNode> {
    schema.check_duplicates()?;

    let initial: BTreeMap<String, Value> = schema
        .fields
        .iter()
        .filter_map(|(name, field)| match field {
            Field::Value(value) => Some((name.clone(), value.clone())),
            _ => None,
        })
        .collect();

    let node = tree.create_node(initial);
    if let Err(err) = populate(tree, &node, schema) {
        // Already-attached children go with it.
        if let Err(cleanup) = node.dispose() {
            warn!(node = %node.id(), error = %cleanup, "failed to dispose partially built node");
        }
        return Err(err);
    }
    Ok(node)
}

fn populate(tree: &StateTree, node: &StateNode, schema: &NodeSchema) -> Result<()> {
    for (name, field) in &schema.fields {
        match field {
            Field::Value(_) => {}
            Field::Action(action) => node.insert_action(name.clone(), action.clone())?,
            Field::Child(child_schema) => {
                let child = build(tree, child_schema)?;
                node.set_child(name, &child)?;
            }
        }
    }
    for hook in &schema.hooks {
        hook(node)?;
    }
    Ok(())
}
