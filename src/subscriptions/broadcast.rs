//! Two-phase change broadcast.
//!
//! A broadcast is planned against the trie while the arena is borrowed and
//! delivered afterwards, with no borrow held, so listeners are free to read,
//! write, subscribe and unsubscribe re-entrantly.

use super::trie::{SubscriptionTrie, TrieNode};
use super::types::ListenerEntry;
use crate::path::Segment;
use crate::store::PanicPolicy;
use crate::types::Value;
use std::any::Any;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;
use tracing::{error, trace};

/// One planned listener invocation.
pub(crate) struct Delivery {
    entry: Rc<ListenerEntry>,
    new: Value,
    old: Value,
}

impl Delivery {
    pub(crate) fn new(entry: Rc<ListenerEntry>, new: Value, old: Value) -> Self {
        Self { entry, new, old }
    }
}

fn push_listeners(out: &mut Vec<Delivery>, node: &TrieNode, new: &Value, old: &Value) {
    for entry in node.listeners() {
        out.push(Delivery::new(entry.clone(), new.clone(), old.clone()));
    }
}

/// Plan the invocations caused by a mutation at `path`.
///
/// Phase 1 visits the strict ancestors of `path` (root first) and plans
/// their listeners with the values at each ancestor. Phase 2 starts at the
/// trie node for `path` itself and walks its descendants breadth-first,
/// pruning every branch whose value kept its identity. Siblings are
/// visited in segment order.
pub(crate) fn plan(
    trie: &SubscriptionTrie,
    path: &[Segment],
    old_root: &Value,
    new_root: &Value,
) -> Vec<Delivery> {
    let mut out = Vec::new();

    let mut node = trie.root();
    let mut old = old_root.clone();
    let mut new = new_root.clone();

    for segment in path {
        push_listeners(&mut out, node, &new, &old);
        match node.child(segment) {
            Some(child) => node = child,
            None => {
                trace!(planned = out.len(), "broadcast stopped above mutated path");
                return out;
            }
        }
        old = old.child(segment);
        new = new.child(segment);
    }

    let ancestors = out.len();
    let mut queue: VecDeque<(&TrieNode, Value, Value)> = VecDeque::new();
    queue.push_back((node, old, new));

    while let Some((node, old, new)) = queue.pop_front() {
        push_listeners(&mut out, node, &new, &old);
        for (segment, child) in node.children() {
            let child_old = old.child(segment);
            let child_new = new.child(segment);
            if child_new.same(&child_old) {
                continue;
            }
            queue.push_back((child, child_old, child_new));
        }
    }

    trace!(ancestors, descendants = out.len() - ancestors, "broadcast planned");
    out
}

/// Plan an event delivery: listeners at exactly `path`, invoked with
/// `(data, Null)`.
pub(crate) fn plan_event(trie: &SubscriptionTrie, path: &[Segment], data: &Value) -> Vec<Delivery> {
    let mut out = Vec::new();
    if let Some(node) = trie.find(path) {
        push_listeners(&mut out, node, data, &Value::Null);
    }
    out
}

/// Run planned deliveries in order, skipping listeners removed meanwhile.
pub(crate) fn deliver(deliveries: Vec<Delivery>, policy: PanicPolicy) {
    for delivery in deliveries {
        if !delivery.entry.is_active() {
            continue;
        }
        match policy {
            PanicPolicy::Propagate => delivery.entry.invoke(&delivery.new, &delivery.old),
            PanicPolicy::Isolate => {
                let result = panic::catch_unwind(AssertUnwindSafe(|| {
                    delivery.entry.invoke(&delivery.new, &delivery.old)
                }));
                if let Err(payload) = result {
                    error!(
                        listener = ?delivery.entry.id,
                        reason = panic_message(payload.as_ref()),
                        "listener panicked during broadcast"
                    );
                }
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "<non-string panic payload>"
    }
}
