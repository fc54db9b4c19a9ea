//! Named projections over a node.
//!
//! A [`StateView`] maps field names to paths on one node and exposes the
//! values at those paths as a single map. View listeners are called when any
//! projected value changes, with the whole new and old view state.

use crate::error::{Result, StateError};
use crate::path::{IntoPath, PathKey, Segment};
use crate::store::{StateNode, WeakStateNode};
use crate::subscriptions::Subscription;
use crate::types::Value;
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::{Rc, Weak};
use tracing::trace;

type ViewListener = Rc<dyn Fn(&Value, &Value)>;

struct ViewShared {
    node: WeakStateNode,
    fields: Vec<(String, PathKey)>,
    state: RefCell<Value>,
    listeners: RefCell<Vec<(u64, ViewListener)>>,
    next_listener: Cell<u64>,
}

impl ViewShared {
    fn compute(node: &StateNode, fields: &[(String, PathKey)]) -> Result<Value> {
        let mut state = BTreeMap::new();
        for (name, path) in fields {
            state.insert(name.clone(), node.get(path)?);
        }
        Ok(Value::from(state))
    }

    /// Recompute and, if any projected value changed identity, notify.
    fn refresh(&self) {
        let Some(node) = self.node.upgrade() else {
            return;
        };
        let Ok(new_state) = Self::compute(&node, &self.fields) else {
            return;
        };

        let old_state = self.state.borrow().clone();
        let changed = self.fields.iter().any(|(name, _)| {
            let field = Segment::key(name.as_str());
            !new_state.child(&field).same(&old_state.child(&field))
        });
        if !changed {
            return;
        }
        *self.state.borrow_mut() = new_state.clone();

        let listeners = self.listeners.borrow().clone();
        trace!(listeners = listeners.len(), "view changed");
        for (id, listener) in listeners {
            let still_registered = self
                .listeners
                .borrow()
                .iter()
                .any(|(other, _)| *other == id);
            if still_registered {
                listener(&new_state, &old_state);
            }
        }
    }
}

/// Handle to a view listener.
#[must_use = "the listener stays registered until unsubscribe() is called"]
pub struct ViewSubscription {
    shared: Weak<ViewShared>,
    id: u64,
}

impl ViewSubscription {
    pub fn unsubscribe(&self) -> bool {
        let Some(shared) = self.shared.upgrade() else {
            return false;
        };
        let mut listeners = shared.listeners.borrow_mut();
        let before = listeners.len();
        listeners.retain(|(id, _)| *id != self.id);
        listeners.len() < before
    }
}

/// Projection of named paths of one node.
pub struct StateView {
    node: StateNode,
    shared: Rc<ViewShared>,
    subscriptions: Vec<Subscription>,
}

impl StateView {
    /// Create a view over `node` from `(field name, path)` pairs.
    pub fn new<I, K, P>(node: &StateNode, fields: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, P)>,
        K: Into<String>,
        P: IntoPath,
    {
        let fields = fields
            .into_iter()
            .map(|(name, path)| -> Result<(String, PathKey)> { Ok((name.into(), path.into_path()?)) })
            .collect::<Result<Vec<_>>>()?;

        let state = ViewShared::compute(node, &fields)?;
        let shared = Rc::new(ViewShared {
            node: node.downgrade(),
            fields,
            state: RefCell::new(state),
            listeners: RefCell::new(Vec::new()),
            next_listener: Cell::new(0),
        });

        let mut subscriptions = Vec::with_capacity(shared.fields.len());
        for (_, path) in &shared.fields {
            let weak = Rc::downgrade(&shared);
            let subscription = node.subscribe(path, move |_, _| {
                if let Some(shared) = weak.upgrade() {
                    shared.refresh();
                }
            });
            match subscription {
                Ok(subscription) => subscriptions.push(subscription),
                Err(err) => {
                    for subscription in &subscriptions {
                        subscription.unsubscribe();
                    }
                    return Err(err);
                }
            }
        }

        Ok(Self {
            node: node.clone(),
            shared,
            subscriptions,
        })
    }

    /// Current view state: a map from field name to value.
    pub fn state(&self) -> Value {
        self.shared.state.borrow().clone()
    }

    pub fn get(&self, field: &str) -> Result<Value> {
        let path = self.path_of(field)?;
        self.node.get(path)
    }

    /// Write through to the node at the field's path.
    pub fn set(&self, field: &str, value: impl Into<Value>) -> Result<bool> {
        let path = self.path_of(field)?;
        self.node.set(path, value)
    }

    /// Listen for view changes, called with `(new_state, old_state)`.
    pub fn subscribe<F>(&self, listener: F) -> ViewSubscription
    where
        F: Fn(&Value, &Value) + 'static,
    {
        let id = self.shared.next_listener.get();
        self.shared.next_listener.set(id + 1);
        self.shared
            .listeners
            .borrow_mut()
            .push((id, Rc::new(listener)));
        ViewSubscription {
            shared: Rc::downgrade(&self.shared),
            id,
        }
    }

    pub fn node(&self) -> &StateNode {
        &self.node
    }

    /// Unsubscribe from the node and drop all view listeners.
    pub fn destroy(self) {
        for subscription in &self.subscriptions {
            subscription.unsubscribe();
        }
        self.shared.listeners.borrow_mut().clear();
    }

    fn path_of(&self, field: &str) -> Result<&PathKey> {
        self.shared
            .fields
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, path)| path)
            .ok_or_else(|| StateError::UnknownField(field.to_string()))
    }
}

impl fmt::Debug for StateView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateView")
            .field("node", &self.node)
            .field("fields", &self.shared.fields)
            .finish()
    }
}
