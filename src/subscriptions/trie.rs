//! Subscription trie.

use super::types::ListenerEntry;
use crate::path::Segment;
use crate::types::ListenerId;
use std::collections::BTreeMap;
use std::rc::Rc;

/// One node of the trie: listeners registered at exactly this path plus
/// child nodes keyed by the next segment.
#[derive(Default)]
pub(crate) struct TrieNode {
    children: BTreeMap<Segment, TrieNode>,
    listeners: Vec<Rc<ListenerEntry>>,
}

impl TrieNode {
    pub(crate) fn listeners(&self) -> &[Rc<ListenerEntry>] {
        &self.listeners
    }

    pub(crate) fn child(&self, segment: &Segment) -> Option<&TrieNode> {
        self.children.get(segment)
    }

    /// Children in segment order.
    pub(crate) fn children(&self) -> impl Iterator<Item = (&Segment, &TrieNode)> {
        self.children.iter()
    }

    fn is_empty(&self) -> bool {
        self.listeners.is_empty() && self.children.is_empty()
    }

    fn insert(&mut self, path: &[Segment], entry: Rc<ListenerEntry>) {
        match path.split_first() {
            None => self.listeners.push(entry),
            Some((head, rest)) => self
                .children
                .entry(head.clone())
                .or_default()
                .insert(rest, entry),
        }
    }

    /// Remove the listener and drop every child left empty on the way back up.
    fn remove(&mut self, path: &[Segment], id: ListenerId) -> bool {
        let Some((head, rest)) = path.split_first() else {
            let before = self.listeners.len();
            self.listeners.retain(|entry| entry.id != id);
            return self.listeners.len() < before;
        };

        let Some(child) = self.children.get_mut(head) else {
            return false;
        };
        let removed = child.remove(rest, id);
        if child.is_empty() {
            self.children.remove(head);
        }
        removed
    }

    fn count_nodes(&self) -> usize {
        1 + self.children.values().map(TrieNode::count_nodes).sum::<usize>()
    }

    fn count_listeners(&self) -> usize {
        self.listeners.len()
            + self
                .children
                .values()
                .map(TrieNode::count_listeners)
                .sum::<usize>()
    }

    fn for_each_listener(&self, f: &mut dyn FnMut(&Rc<ListenerEntry>)) {
        self.listeners.iter().for_each(&mut *f);
        for child in self.children.values() {
            child.for_each_listener(f);
        }
    }
}

/// Path-keyed tree of listener lists.
///
/// Trie nodes are created lazily on subscribe and pruned as soon as they
/// hold no listeners and no children, so memory tracks the live
/// subscriptions rather than the historical peak.
#[derive(Default)]
pub(crate) struct SubscriptionTrie {
    root: TrieNode,
}

impl SubscriptionTrie {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn root(&self) -> &TrieNode {
        &self.root
    }

    pub(crate) fn insert(&mut self, path: &[Segment], entry: Rc<ListenerEntry>) {
        self.root.insert(path, entry);
    }

    /// Remove a listener. Removing an unknown listener is a no-op.
    pub(crate) fn remove(&mut self, path: &[Segment], id: ListenerId) -> bool {
        self.root.remove(path, id)
    }

    /// Trie node at exactly `path`.
    pub(crate) fn find(&self, path: &[Segment]) -> Option<&TrieNode> {
        path.iter()
            .try_fold(&self.root, |node, segment| node.child(segment))
    }

    /// Number of trie nodes, including the root.
    pub(crate) fn node_count(&self) -> usize {
        self.root.count_nodes()
    }

    pub(crate) fn listener_count(&self) -> usize {
        self.root.count_listeners()
    }

    /// Deactivate every listener, e.g. when the owning node is disposed.
    pub(crate) fn deactivate_all(&self) {
        self.root.for_each_listener(&mut |entry| {
            entry.deactivate();
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::PathKey;
    use crate::types::Value;

    fn entry(id: u64) -> Rc<ListenerEntry> {
        Rc::new(ListenerEntry::new(
            ListenerId(id),
            Box::new(|_: &Value, _: &Value| {}),
        ))
    }

    fn path(s: &str) -> PathKey {
        PathKey::parse(s).unwrap()
    }

    fn ids(node: &TrieNode) -> Vec<u64> {
        node.listeners().iter().map(|e| e.id.0).collect()
    }

    #[test]
    fn test_insert_creates_nodes_lazily() {
        let mut trie = SubscriptionTrie::new();
        assert_eq!(trie.node_count(), 1);

        trie.insert(path("a.b.c").segments(), entry(1));
        assert_eq!(trie.node_count(), 4);
        assert_eq!(ids(trie.find(path("a.b.c").segments()).unwrap()), vec![1]);
        assert!(trie.find(path("a.b").segments()).unwrap().listeners().is_empty());
        assert!(trie.find(path("a.x").segments()).is_none());
    }

    #[test]
    fn test_listeners_keep_registration_order() {
        let mut trie = SubscriptionTrie::new();
        for id in [3, 1, 2] {
            trie.insert(path("a").segments(), entry(id));
        }
        assert_eq!(ids(trie.find(path("a").segments()).unwrap()), vec![3, 1, 2]);
    }

    #[test]
    fn test_remove_prunes_empty_chain() {
        let mut trie = SubscriptionTrie::new();
        trie.insert(path("a.b.c").segments(), entry(1));
        assert!(trie.remove(path("a.b.c").segments(), ListenerId(1)));
        assert_eq!(trie.node_count(), 1);
    }

    #[test]
    fn test_remove_stops_at_shared_ancestor() {
        let mut trie = SubscriptionTrie::new();
        trie.insert(path("a.b.c").segments(), entry(1));
        trie.insert(path("a.x").segments(), entry(2));
        trie.insert(path("a").segments(), entry(3));
        assert_eq!(trie.node_count(), 5);

        trie.remove(path("a.b.c").segments(), ListenerId(1));
        assert_eq!(trie.node_count(), 3);
        assert!(trie.find(path("a.b").segments()).is_none());
        assert!(trie.find(path("a.x").segments()).is_some());

        trie.remove(path("a.x").segments(), ListenerId(2));
        // "a" still has its own listener.
        assert_eq!(trie.node_count(), 2);

        trie.remove(path("a").segments(), ListenerId(3));
        assert_eq!(trie.node_count(), 1);
    }

    #[test]
    fn test_remove_keeps_node_with_other_listeners() {
        let mut trie = SubscriptionTrie::new();
        trie.insert(path("a.b").segments(), entry(1));
        trie.insert(path("a.b").segments(), entry(2));
        trie.remove(path("a.b").segments(), ListenerId(1));
        assert_eq!(ids(trie.find(path("a.b").segments()).unwrap()), vec![2]);
        assert_eq!(trie.node_count(), 3);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let mut trie = SubscriptionTrie::new();
        trie.insert(path("a").segments(), entry(1));
        assert!(trie.remove(path("a").segments(), ListenerId(1)));
        assert!(!trie.remove(path("a").segments(), ListenerId(1)));
        assert!(!trie.remove(path("q.r").segments(), ListenerId(1)));
        assert_eq!(trie.node_count(), 1);
    }

    #[test]
    fn test_repeated_cycles_do_not_grow() {
        let mut trie = SubscriptionTrie::new();
        trie.insert(path("keep").segments(), entry(0));
        for i in 1..200 {
            let p = path(&format!("x{}.y[{}].z", i % 7, i));
            trie.insert(p.segments(), entry(i));
            trie.remove(p.segments(), ListenerId(i));
        }
        assert_eq!(trie.node_count(), 2);
        assert_eq!(trie.listener_count(), 1);
    }

    #[test]
    fn test_deactivate_all() {
        let mut trie = SubscriptionTrie::new();
        let a = entry(1);
        let b = entry(2);
        trie.insert(path("a").segments(), a.clone());
        trie.insert(path("a.b").segments(), b.clone());
        trie.deactivate_all();
        assert!(!a.is_active());
        assert!(!b.is_active());
    }

    #[test]
    fn test_children_enumerate_in_segment_order() {
        let mut trie = SubscriptionTrie::new();
        for p in ["list.b", "list[10]", "list.a", "list[2]"] {
            trie.insert(path(p).segments(), entry(1));
        }
        let order: Vec<String> = trie
            .find(path("list").segments())
            .unwrap()
            .children()
            .map(|(segment, _)| segment.as_key().into_owned())
            .collect();
        assert_eq!(order, vec!["2", "10", "a", "b"]);
    }
}
