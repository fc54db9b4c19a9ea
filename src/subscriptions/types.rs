//! Subscription types.

use crate::path::PathKey;
use crate::store::TreeInner;
use crate::types::{ListenerId, NodeId, Value};
use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError};
use std::cell::Cell;
use std::fmt;
use std::rc::{Rc, Weak};
use std::time::Duration;

/// Boxed listener callback, invoked with `(new, old)`.
pub(crate) type Callback = Box<dyn Fn(&Value, &Value)>;

/// A listener registered in a subscription trie.
pub(crate) struct ListenerEntry {
    pub(crate) id: ListenerId,
    active: Cell<bool>,
    callback: Callback,
}

impl ListenerEntry {
    pub(crate) fn new(id: ListenerId, callback: Callback) -> Self {
        Self {
            id,
            active: Cell::new(true),
            callback,
        }
    }

    pub(crate) fn is_active(&self) -> bool {
        self.active.get()
    }

    /// Mark inactive. Returns whether the entry was active before.
    pub(crate) fn deactivate(&self) -> bool {
        self.active.replace(false)
    }

    pub(crate) fn invoke(&self, new: &Value, old: &Value) {
        (self.callback)(new, old)
    }
}

impl fmt::Debug for ListenerEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerEntry")
            .field("id", &self.id)
            .field("active", &self.active.get())
            .finish()
    }
}

/// Handle to a registered listener.
///
/// Dropping the handle does not remove the listener; call
/// [`unsubscribe`](Subscription::unsubscribe).
#[must_use = "the listener stays registered until unsubscribe() is called"]
pub struct Subscription {
    tree: Weak<TreeInner>,
    node: NodeId,
    path: PathKey,
    entry: Rc<ListenerEntry>,
}

impl Subscription {
    pub(crate) fn new(
        tree: Weak<TreeInner>,
        node: NodeId,
        path: PathKey,
        entry: Rc<ListenerEntry>,
    ) -> Self {
        Self {
            tree,
            node,
            path,
            entry,
        }
    }

    pub fn id(&self) -> ListenerId {
        self.entry.id
    }

    /// The node whose trie holds the listener (after child delegation).
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Path of the listener relative to [`node`](Subscription::node).
    pub fn path(&self) -> &PathKey {
        &self.path
    }

    pub fn is_active(&self) -> bool {
        self.entry.is_active()
    }

    /// Remove the listener and prune any trie branches left empty.
    ///
    /// Returns `true` on the first call and `false` afterwards.
    pub fn unsubscribe(&self) -> bool {
        if !self.entry.deactivate() {
            return false;
        }
        if let Some(tree) = self.tree.upgrade() {
            tree.remove_listener(self.node, &self.path, self.entry.id);
        }
        true
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.entry.id)
            .field("node", &self.node)
            .field("path", &self.path)
            .field("active", &self.entry.is_active())
            .finish()
    }
}

/// One observed change.
#[derive(Clone, Debug, PartialEq)]
pub struct Change {
    pub new: Value,
    pub old: Value,
}

/// Channel-backed subscription for consumers that poll.
///
/// Changes are buffered in a bounded channel. When the buffer is full,
/// further changes are dropped and counted. Dropping the handle
/// unsubscribes, even if clones of its receiver are still alive.
pub struct WatchHandle {
    subscription: Subscription,
    receiver: Receiver<Change>,
    dropped: Rc<Cell<u64>>,
}

impl WatchHandle {
    pub(crate) fn new(
        subscription: Subscription,
        receiver: Receiver<Change>,
        dropped: Rc<Cell<u64>>,
    ) -> Self {
        Self {
            subscription,
            receiver,
            dropped,
        }
    }

    /// Try to receive a change (non-blocking).
    pub fn try_recv(&self) -> Result<Change, TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Change, RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// All changes currently buffered.
    pub fn drain(&self) -> Vec<Change> {
        self.receiver.try_iter().collect()
    }

    /// The underlying receiver. It can be cloned and moved to another thread.
    pub fn receiver(&self) -> &Receiver<Change> {
        &self.receiver
    }

    /// Number of changes dropped because the buffer was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.get()
    }

    pub fn subscription(&self) -> &Subscription {
        &self.subscription
    }

    pub fn unsubscribe(&self) -> bool {
        self.subscription.unsubscribe()
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.subscription.unsubscribe();
    }
}
