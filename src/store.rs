//! State tree: the node arena and the node handle.
//!
//! A [`StateTree`] owns every node of one tree in an arena addressed by
//! [`NodeId`]. Parents own their children; a child refers back to its parent
//! by id only. [`StateNode`] is a cheap handle to one node.
//!
//! # Threading
//!
//! A tree is single-threaded (`!Send`): every operation runs to completion
//! synchronously and listeners run inline during the mutating call. Hosts
//! that share a tree between threads must serialize each root tree behind
//! one exclusive lock covering "read snapshot, compute new snapshot, swap,
//! broadcast", since a broadcast needs a consistent old/new pair.
//! Snapshots themselves are `Send + Sync`.

use crate::error::{Result, StateError};
use crate::path::{IntoPath, PathKey, Segment};
use crate::schema::{self, Action, NodeSchema};
use crate::state::{apply_mutation_bounded, value_at, Mutation, Outcome, DEFAULT_MAX_LIST_PADDING};
use crate::subscriptions::broadcast::{self, Delivery};
use crate::subscriptions::trie::SubscriptionTrie;
use crate::subscriptions::{Callback, Change, ListenerEntry, Subscription, WatchHandle};
use crate::types::{ListenerId, NodeId, Value};
use crossbeam_channel::{bounded, TrySendError};
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::{Rc, Weak};
use std::slice;
use tracing::{debug, trace, warn};

/// Default first segment of the event namespace.
pub const DEFAULT_EVENT_NAMESPACE: &str = "event";

/// What a broadcast does when a listener panics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PanicPolicy {
    /// Let the panic unwind to the caller of the mutating operation.
    /// Remaining listeners are not invoked; the new snapshot stays installed.
    #[default]
    Propagate,
    /// Catch the panic, log it, and continue with the next listener.
    Isolate,
}

/// Tree configuration.
#[derive(Clone, Debug)]
pub struct TreeConfig {
    /// Listener panic handling.
    pub listener_panics: PanicPolicy,

    /// Reserved first segment under which event listeners are registered.
    pub event_namespace: String,

    /// Max buffered changes per watch handle before changes are dropped.
    pub watch_buffer_size: usize,

    /// Max `Null` entries a single write may pad into a list.
    pub max_list_padding: usize,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            listener_panics: PanicPolicy::Propagate,
            event_namespace: DEFAULT_EVENT_NAMESPACE.to_string(),
            watch_buffer_size: 1024,
            max_list_padding: DEFAULT_MAX_LIST_PADDING,
        }
    }
}

/// Link from a parent to an attached child.
struct ChildLink {
    node: NodeId,
    /// Listener on the child's root that mirrors it into the parent.
    mirror: Rc<ListenerEntry>,
}

struct NodeData {
    snapshot: Value,
    children: BTreeMap<String, ChildLink>,
    parent: Option<NodeId>,
    trie: SubscriptionTrie,
    actions: BTreeMap<String, Action>,
}

impl NodeData {
    fn new(snapshot: Value) -> Self {
        Self {
            snapshot,
            children: BTreeMap::new(),
            parent: None,
            trie: SubscriptionTrie::new(),
            actions: BTreeMap::new(),
        }
    }

    fn mirror_of(&self, key: &str) -> Value {
        self.snapshot
            .as_map()
            .and_then(|map| map.get(key))
            .cloned()
            .unwrap_or_default()
    }
}

struct Slot {
    generation: u32,
    data: Option<NodeData>,
}

/// Generational arena of nodes.
#[derive(Default)]
struct Arena {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
}

impl Arena {
    fn insert(&mut self, data: NodeData) -> NodeId {
        self.live += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.data = Some(data);
            return NodeId {
                index,
                generation: slot.generation,
            };
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            data: Some(data),
        });
        NodeId {
            index,
            generation: 0,
        }
    }

    fn get(&self, id: NodeId) -> Result<&NodeData> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.data.as_ref())
            .ok_or(StateError::NodeDisposed(id))
    }

    fn get_mut(&mut self, id: NodeId) -> Result<&mut NodeData> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.data.as_mut())
            .ok_or(StateError::NodeDisposed(id))
    }

    fn contains(&self, id: NodeId) -> bool {
        self.get(id).is_ok()
    }

    fn remove(&mut self, id: NodeId) -> Option<NodeData> {
        let slot = self
            .slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)?;
        let data = slot.data.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        self.live -= 1;
        Some(data)
    }
}

/// Follow child delegation: while the next segment names a child, continue
/// in that child. Returns the node reached and how many segments it consumed.
fn resolve(arena: &Arena, mut node: NodeId, path: &[Segment]) -> Result<(NodeId, usize)> {
    let mut offset = 0;
    loop {
        let data = arena.get(node)?;
        let Some(segment) = path.get(offset) else {
            return Ok((node, offset));
        };
        match data.children.get(&*segment.as_key()) {
            Some(link) => {
                node = link.node;
                offset += 1;
            }
            None => return Ok((node, offset)),
        }
    }
}

/// Remove a node and all of its descendants from the arena.
///
/// The removed data is returned rather than dropped so the caller can drop
/// it after releasing the arena borrow: listener closures may own handles
/// whose destructors call back into the tree.
fn dispose_subtree(arena: &mut Arena, id: NodeId) -> Vec<NodeData> {
    let mut removed = Vec::new();
    let mut pending = vec![id];
    while let Some(id) = pending.pop() {
        let Some(data) = arena.remove(id) else {
            continue;
        };
        data.trie.deactivate_all();
        pending.extend(data.children.values().map(|link| link.node));
        debug!(node = %id, "node disposed");
        removed.push(data);
    }
    removed
}

/// Make a root-level write compatible with attached children.
///
/// Child-owned keys may be omitted (the current mirror is kept) or carry
/// the identical mirror; anything else would desynchronize the child.
fn reconcile_root(data: &NodeData, mutation: Mutation) -> Result<Mutation> {
    let Some(first_child) = data.children.keys().next() else {
        return Ok(mutation);
    };

    match mutation {
        Mutation::Set(Value::Map(map)) => {
            let mut completed: Option<BTreeMap<String, Value>> = None;
            for key in data.children.keys() {
                let mirror = data.mirror_of(key);
                match map.get(key) {
                    Some(value) if value.same(&mirror) => {}
                    Some(_) => return Err(StateError::ChildOwned(key.clone())),
                    None => {
                        completed
                            .get_or_insert_with(|| (*map).clone())
                            .insert(key.clone(), mirror);
                    }
                }
            }
            Ok(Mutation::Set(match completed {
                Some(map) => Value::from(map),
                None => Value::Map(map),
            }))
        }
        Mutation::Set(_) | Mutation::Unset => Err(StateError::ChildOwned(first_child.clone())),
        Mutation::Patch(entries) => {
            for key in data.children.keys() {
                if let Some(value) = entries.get(key) {
                    if !value.same(&data.mirror_of(key)) {
                        return Err(StateError::ChildOwned(key.clone()));
                    }
                }
            }
            Ok(Mutation::Patch(entries))
        }
    }
}

/// Shared tree state behind every handle.
pub(crate) struct TreeInner {
    config: TreeConfig,
    arena: RefCell<Arena>,
    next_listener: Cell<u64>,
}

impl TreeInner {
    fn next_listener_id(&self) -> ListenerId {
        let id = self.next_listener.get();
        self.next_listener.set(id + 1);
        ListenerId(id)
    }

    fn event_segment(&self) -> Segment {
        Segment::key(self.config.event_namespace.as_str())
    }

    /// Apply a mutation and broadcast it. With `delegate`, the path is first
    /// routed into children.
    fn mutate(&self, node: NodeId, path: &[Segment], mutation: Mutation, delegate: bool) -> Result<bool> {
        let deliveries = {
            let mut arena = self.arena.borrow_mut();
            let (target, offset) = if delegate {
                resolve(&arena, node, path)?
            } else {
                (node, 0)
            };
            let rest = &path[offset..];
            let data = arena.get_mut(target)?;
            let mutation = if rest.is_empty() {
                reconcile_root(data, mutation)?
            } else {
                mutation
            };

            let old_root = data.snapshot.clone();
            match apply_mutation_bounded(&old_root, rest, &mutation, self.config.max_list_padding) {
                Outcome::Changed(new_root) => {
                    data.snapshot = new_root.clone();
                    debug!(node = %target, path = ?rest, "snapshot updated");
                    broadcast::plan(&data.trie, rest, &old_root, &new_root)
                }
                Outcome::Unchanged => {
                    trace!(node = %target, path = ?rest, "write left snapshot unchanged");
                    return Ok(false);
                }
                Outcome::Missing => {
                    debug!(node = %target, path = ?rest, "write target has no parent container");
                    return Ok(false);
                }
                Outcome::OutOfRange { index, len } => {
                    return Err(StateError::IndexOutOfRange { index, len });
                }
            }
        };

        broadcast::deliver(deliveries, self.config.listener_panics);
        Ok(true)
    }

    /// Mirror a child's current snapshot into its parent under `key`.
    ///
    /// The snapshot is read at delivery time: an earlier listener of the same
    /// broadcast may already have written to the child again.
    fn mirror_child(&self, parent: NodeId, child: NodeId, key: &Segment) {
        let snapshot = match self.arena.borrow().get(child) {
            Ok(data) => data.snapshot.clone(),
            Err(_) => return,
        };
        if let Err(err) = self.mutate(parent, slice::from_ref(key), Mutation::Set(snapshot), false) {
            warn!(parent = %parent, error = %err, "failed to mirror child snapshot");
        }
    }

    fn insert_listener(
        self: &Rc<Self>,
        arena: &mut Arena,
        node: NodeId,
        path: PathKey,
        callback: Callback,
    ) -> Result<Subscription> {
        let entry = Rc::new(ListenerEntry::new(self.next_listener_id(), callback));
        arena.get_mut(node)?.trie.insert(path.segments(), entry.clone());
        trace!(node = %node, path = %path, listener = ?entry.id, "listener registered");
        Ok(Subscription::new(Rc::downgrade(self), node, path, entry))
    }

    fn subscribe(self: &Rc<Self>, node: NodeId, path: &[Segment], callback: Callback) -> Result<Subscription> {
        let mut arena = self.arena.borrow_mut();
        let (target, offset) = resolve(&arena, node, path)?;
        let rest = PathKey::from(path[offset..].to_vec());
        self.insert_listener(&mut arena, target, rest, callback)
    }

    fn on_event(self: &Rc<Self>, node: NodeId, path: &[Segment], callback: Callback) -> Result<Subscription> {
        let mut arena = self.arena.borrow_mut();
        let (target, offset) = resolve(&arena, node, path)?;
        let mut segments = vec![self.event_segment()];
        segments.extend_from_slice(&path[offset..]);
        self.insert_listener(&mut arena, target, PathKey::from(segments), callback)
    }

    /// Remove a listener from a node's trie. Missing nodes are ignored.
    pub(crate) fn remove_listener(&self, node: NodeId, path: &PathKey, id: ListenerId) {
        let mut arena = self.arena.borrow_mut();
        if let Ok(data) = arena.get_mut(node) {
            if data.trie.remove(path.segments(), id) {
                trace!(node = %node, path = %path, listener = ?id, "listener removed");
            }
        }
    }

    fn notify(&self, node: NodeId, path: &[Segment], data: Value) -> Result<()> {
        let deliveries = {
            let arena = self.arena.borrow();
            let (target, offset) = resolve(&arena, node, path)?;
            let mut segments = vec![self.event_segment()];
            segments.extend_from_slice(&path[offset..]);
            broadcast::plan_event(&arena.get(target)?.trie, &segments, &data)
        };
        trace!(node = %node, listeners = deliveries.len(), "event notified");
        broadcast::deliver(deliveries, self.config.listener_panics);
        Ok(())
    }

    /// Attach `child` under `key`, replacing and disposing any previous child.
    fn attach_child(self: &Rc<Self>, parent: NodeId, key: &Segment, child: NodeId) -> Result<bool> {
        let name = key.as_key().into_owned();
        let (deliveries, removed) = {
            let mut arena = self.arena.borrow_mut();
            let parent_data = arena.get(parent)?;
            if parent_data
                .children
                .get(&name)
                .is_some_and(|link| link.node == child)
            {
                return Ok(false);
            }
            if !matches!(parent_data.snapshot, Value::Map(_)) {
                return Err(StateError::NotAContainer(String::new()));
            }
            if arena.get(child)?.parent.is_some() {
                return Err(StateError::AlreadyAttached(child));
            }
            let mut cursor = Some(parent);
            while let Some(id) = cursor {
                if id == child {
                    return Err(StateError::Cycle { parent, child });
                }
                cursor = arena.get(id)?.parent;
            }

            let mut removed = Vec::new();
            if let Some(old) = arena.get_mut(parent)?.children.remove(&name) {
                old.mirror.deactivate();
                removed = dispose_subtree(&mut arena, old.node);
            }

            let weak = Rc::downgrade(self);
            let mirror_key = key.clone();
            let mirror = Rc::new(ListenerEntry::new(
                self.next_listener_id(),
                Box::new(move |_new: &Value, _old: &Value| {
                    if let Some(tree) = weak.upgrade() {
                        tree.mirror_child(parent, child, &mirror_key);
                    }
                }),
            ));

            let child_data = arena.get_mut(child)?;
            child_data.parent = Some(parent);
            child_data.trie.insert(&[], mirror.clone());
            let child_snapshot = child_data.snapshot.clone();

            let parent_data = arena.get_mut(parent)?;
            parent_data.children.insert(
                name.clone(),
                ChildLink {
                    node: child,
                    mirror,
                },
            );
            debug!(parent = %parent, child = %child, key = %name, "child attached");

            let old_root = parent_data.snapshot.clone();
            let deliveries = match apply_mutation_bounded(
                &old_root,
                slice::from_ref(key),
                &Mutation::Set(child_snapshot),
                0,
            ) {
                Outcome::Changed(new_root) => {
                    parent_data.snapshot = new_root.clone();
                    broadcast::plan(&parent_data.trie, slice::from_ref(key), &old_root, &new_root)
                }
                _ => Vec::new(),
            };
            (deliveries, removed)
        };

        drop(removed);
        broadcast::deliver(deliveries, self.config.listener_panics);
        Ok(true)
    }

    /// Detach and dispose the child under `key`, removing it from the snapshot.
    fn remove_child(&self, parent: NodeId, key: &Segment) -> Result<bool> {
        let name = key.as_key();
        let (deliveries, removed): (Vec<Delivery>, Vec<NodeData>) = {
            let mut arena = self.arena.borrow_mut();
            let Some(link) = arena.get_mut(parent)?.children.remove(&*name) else {
                return Ok(false);
            };
            link.mirror.deactivate();
            let removed = dispose_subtree(&mut arena, link.node);

            let parent_data = arena.get_mut(parent)?;
            let old_root = parent_data.snapshot.clone();
            let deliveries = match apply_mutation_bounded(&old_root, slice::from_ref(key), &Mutation::Unset, 0) {
                Outcome::Changed(new_root) => {
                    parent_data.snapshot = new_root.clone();
                    broadcast::plan(&parent_data.trie, slice::from_ref(key), &old_root, &new_root)
                }
                _ => Vec::new(),
            };
            debug!(parent = %parent, key = %name, "child removed");
            (deliveries, removed)
        };

        drop(removed);
        broadcast::deliver(deliveries, self.config.listener_panics);
        Ok(true)
    }
}

/// Owner of a tree of state nodes.
///
/// Cloning a `StateTree` yields another handle to the same tree.
#[derive(Clone)]
pub struct StateTree {
    inner: Rc<TreeInner>,
}

impl StateTree {
    /// Create an empty tree with the default configuration.
    pub fn new() -> Self {
        Self::with_config(TreeConfig::default())
    }

    pub fn with_config(config: TreeConfig) -> Self {
        Self {
            inner: Rc::new(TreeInner {
                config,
                arena: RefCell::new(Arena::default()),
                next_listener: Cell::new(1),
            }),
        }
    }

    pub fn config(&self) -> &TreeConfig {
        &self.inner.config
    }

    /// Create a detached node holding `initial`.
    pub fn create_node(&self, initial: impl Into<Value>) -> StateNode {
        let id = self
            .inner
            .arena
            .borrow_mut()
            .insert(NodeData::new(initial.into()));
        debug!(node = %id, "node created");
        StateNode {
            tree: self.inner.clone(),
            id,
        }
    }

    /// Build a node (and its children) from a schema.
    pub fn build(&self, schema: &NodeSchema) -> Result<StateNode> {
        schema::build(self, schema)
    }

    /// Handle for a live node.
    pub fn node(&self, id: NodeId) -> Option<StateNode> {
        self.inner.arena.borrow().contains(id).then(|| StateNode {
            tree: self.inner.clone(),
            id,
        })
    }

    /// Number of live nodes.
    pub fn node_count(&self) -> usize {
        self.inner.arena.borrow().live
    }
}

impl Default for StateTree {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for StateTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateTree")
            .field("nodes", &self.node_count())
            .field("config", &self.inner.config)
            .finish()
    }
}

/// Handle to one node of a [`StateTree`].
///
/// All operations accept any [`IntoPath`]. A path whose first segment names
/// an attached child is routed into that child with the remaining segments.
#[derive(Clone)]
pub struct StateNode {
    tree: Rc<TreeInner>,
    id: NodeId,
}

impl StateNode {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn tree(&self) -> StateTree {
        StateTree {
            inner: self.tree.clone(),
        }
    }

    pub fn is_alive(&self) -> bool {
        self.tree.arena.borrow().contains(self.id)
    }

    /// A handle that does not keep the tree alive.
    pub fn downgrade(&self) -> WeakStateNode {
        WeakStateNode {
            tree: Rc::downgrade(&self.tree),
            id: self.id,
        }
    }

    /// The node's current snapshot.
    pub fn snapshot(&self) -> Result<Value> {
        Ok(self.tree.arena.borrow().get(self.id)?.snapshot.clone())
    }

    /// Read the value at `path`. Missing values read as `Null`.
    pub fn get(&self, path: impl IntoPath) -> Result<Value> {
        let path = path.into_path()?;
        let arena = self.tree.arena.borrow();
        Ok(value_at(&arena.get(self.id)?.snapshot, path.segments()))
    }

    /// Store `value` at `path`.
    ///
    /// Returns `false` if the value is already there or the parent container
    /// does not exist.
    pub fn set(&self, path: impl IntoPath, value: impl Into<Value>) -> Result<bool> {
        let path = path.into_path()?;
        self.tree
            .mutate(self.id, path.segments(), Mutation::Set(value.into()), true)
    }

    /// Remove the key (or list element) at `path`.
    pub fn unset(&self, path: impl IntoPath) -> Result<bool> {
        let path = path.into_path()?;
        self.tree.mutate(self.id, path.segments(), Mutation::Unset, true)
    }

    /// Merge the entries of a map into the container at `path`, as one
    /// snapshot transition and one broadcast.
    pub fn patch(&self, path: impl IntoPath, entries: impl Into<Value>) -> Result<bool> {
        let path = path.into_path()?;
        let entries = match entries.into() {
            Value::Map(map) => map,
            other => return Err(StateError::InvalidPatch(other.kind())),
        };
        self.tree
            .mutate(self.id, path.segments(), Mutation::Patch(entries), true)
    }

    /// Read-modify-write of the value at `path`.
    pub fn update<F>(&self, path: impl IntoPath, f: F) -> Result<bool>
    where
        F: FnOnce(&Value) -> Value,
    {
        let path = path.into_path()?;
        let next = f(&self.get(&path)?);
        self.set(path, next)
    }

    /// Register `listener` for changes at `path`. It is called with
    /// `(new, old)` values at that path.
    pub fn subscribe<F>(&self, path: impl IntoPath, listener: F) -> Result<Subscription>
    where
        F: Fn(&Value, &Value) + 'static,
    {
        let path = path.into_path()?;
        self.tree
            .subscribe(self.id, path.segments(), Box::new(listener))
    }

    /// Register `listener` for events sent with [`notify`](StateNode::notify)
    /// to `path`.
    pub fn on_event<F>(&self, path: impl IntoPath, listener: F) -> Result<Subscription>
    where
        F: Fn(&Value) + 'static,
    {
        let path = path.into_path()?;
        self.tree.on_event(
            self.id,
            path.segments(),
            Box::new(move |data: &Value, _: &Value| listener(data)),
        )
    }

    /// Send a transient event. The snapshot is not touched.
    pub fn notify(&self, path: impl IntoPath, data: impl Into<Value>) -> Result<()> {
        let path = path.into_path()?;
        self.tree.notify(self.id, path.segments(), data.into())
    }

    /// Subscribe through a bounded channel.
    pub fn watch(&self, path: impl IntoPath) -> Result<WatchHandle> {
        let (sender, receiver) = bounded(self.tree.config.watch_buffer_size.max(1));
        let dropped = Rc::new(Cell::new(0u64));
        let counter = dropped.clone();
        let subscription = self.subscribe(path, move |new: &Value, old: &Value| {
            let change = Change {
                new: new.clone(),
                old: old.clone(),
            };
            match sender.try_send(change) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    counter.set(counter.get() + 1);
                    warn!(dropped = counter.get(), "watch buffer full, dropping change");
                }
                Err(TrySendError::Disconnected(_)) => {
                    trace!("watch receiver gone, change discarded");
                }
            }
        })?;
        Ok(WatchHandle::new(subscription, receiver, dropped))
    }

    /// Attach `child` under `name`, replacing (and disposing) any child
    /// already there. Returns `false` if `child` is already attached there.
    pub fn set_child(&self, name: &str, child: &StateNode) -> Result<bool> {
        if !Rc::ptr_eq(&self.tree, &child.tree) {
            return Err(StateError::ForeignNode(child.id));
        }
        self.tree.attach_child(self.id, &Segment::key(name), child.id)
    }

    /// Dispose the child under `name` and remove its key.
    pub fn remove_child(&self, name: &str) -> Result<bool> {
        self.tree.remove_child(self.id, &Segment::key(name))
    }

    /// The child attached under `name`.
    pub fn child(&self, name: &str) -> Option<StateNode> {
        let arena = self.tree.arena.borrow();
        let data = arena.get(self.id).ok()?;
        let link = data.children.get(&*Segment::key(name).as_key())?;
        Some(StateNode {
            tree: self.tree.clone(),
            id: link.node,
        })
    }

    /// Attached children by name.
    pub fn children(&self) -> Result<Vec<(String, StateNode)>> {
        let arena = self.tree.arena.borrow();
        Ok(arena
            .get(self.id)?
            .children
            .iter()
            .map(|(name, link)| {
                (
                    name.clone(),
                    StateNode {
                        tree: self.tree.clone(),
                        id: link.node,
                    },
                )
            })
            .collect())
    }

    pub fn parent(&self) -> Result<Option<StateNode>> {
        let arena = self.tree.arena.borrow();
        Ok(arena.get(self.id)?.parent.map(|id| StateNode {
            tree: self.tree.clone(),
            id,
        }))
    }

    /// Dispose this node and its descendants. An attached node is also
    /// removed from its parent.
    pub fn dispose(&self) -> Result<()> {
        let attached = {
            let arena = self.tree.arena.borrow();
            let data = arena.get(self.id)?;
            data.parent.and_then(|parent| {
                let parent_data = arena.get(parent).ok()?;
                parent_data
                    .children
                    .iter()
                    .find(|(_, link)| link.node == self.id)
                    .map(|(name, _)| (parent, Segment::key(name.as_str())))
            })
        };

        match attached {
            Some((parent, key)) => {
                self.tree.remove_child(parent, &key)?;
            }
            None => {
                let removed = dispose_subtree(&mut self.tree.arena.borrow_mut(), self.id);
                drop(removed);
            }
        }
        Ok(())
    }

    /// Register a named action on this node.
    pub fn register_action<F>(&self, name: impl Into<String>, action: F) -> Result<()>
    where
        F: Fn(&StateNode, Value) -> Result<()> + 'static,
    {
        self.insert_action(name.into(), Rc::new(action))
    }

    pub(crate) fn insert_action(&self, name: String, action: Action) -> Result<()> {
        let mut arena = self.tree.arena.borrow_mut();
        arena.get_mut(self.id)?.actions.insert(name, action);
        Ok(())
    }

    /// Run a named action with `args`.
    pub fn invoke(&self, name: &str, args: impl Into<Value>) -> Result<()> {
        let action = {
            let arena = self.tree.arena.borrow();
            arena
                .get(self.id)?
                .actions
                .get(name)
                .cloned()
                .ok_or_else(|| StateError::UnknownAction(name.to_string()))?
        };
        action(self, args.into())
    }

    /// Number of listeners registered in this node's trie, including the
    /// internal listener that mirrors an attached node into its parent.
    pub fn subscription_count(&self) -> Result<usize> {
        Ok(self.tree.arena.borrow().get(self.id)?.trie.listener_count())
    }

    /// Number of nodes in this node's subscription trie, including its root.
    pub fn trie_node_count(&self) -> Result<usize> {
        Ok(self.tree.arena.borrow().get(self.id)?.trie.node_count())
    }
}

impl PartialEq for StateNode {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.tree, &other.tree) && self.id == other.id
    }
}

impl Eq for StateNode {}

impl fmt::Debug for StateNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateNode").field("id", &self.id).finish()
    }
}

/// Non-owning handle to a node, for listeners that must not keep the tree
/// alive.
#[derive(Clone)]
pub struct WeakStateNode {
    tree: Weak<TreeInner>,
    id: NodeId,
}

impl WeakStateNode {
    pub fn upgrade(&self) -> Option<StateNode> {
        self.tree.upgrade().map(|tree| StateNode { tree, id: self.id })
    }

    pub fn id(&self) -> NodeId {
        self.id
    }
}

impl fmt::Debug for WeakStateNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakStateNode").field("id", &self.id).finish()
    }
}
