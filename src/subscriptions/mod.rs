//! Subscription system for path-level change notification.
//!
//! Listeners live in a per-node trie keyed by path segment. A mutation at a
//! path is broadcast in two phases:
//! - ancestors of the path, root first, each with its own old/new values
//! - the path itself and its subscribed descendants, breadth-first, skipping
//!   every branch whose value kept its identity
//!
//! Listeners fire synchronously, inside the mutating call.
//!
//! # Example
//!
//! ```ignore
//! let tree = StateTree::new();
//! let node = tree.create_node(json!({"counter": {"value": 0}}).into());
//!
//! let sub = node.subscribe("counter.value", |new, old| {
//!     println!("{} -> {}", old, new);
//! })?;
//!
//! node.set("counter.value", 5)?; // prints "0 -> 5"
//! sub.unsubscribe();
//! ```

pub(crate) mod broadcast;
pub(crate) mod trie;
mod types;

pub(crate) use types::{Callback, ListenerEntry};
pub use types::{Change, Subscription, WatchHandle};
