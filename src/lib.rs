//! # State Tree
//!
//! A hierarchical reactive state container: nested, independently
//! addressable state nodes whose values can be read, written and patched by
//! path, and whose paths can be watched with reference-equality diffing.
//!
//! ## Core Concepts
//!
//! - **Snapshots**: immutable [`Value`]s with `Arc`-shared containers; every
//!   write copies only the ancestors of the written path
//! - **Paths**: `"a.b[3].c"` strings or pre-split segment sequences
//! - **Subscriptions**: a per-node trie of listeners; a mutation notifies
//!   ancestors of the path, then the subscribed descendants whose values
//!   actually changed
//! - **Composition**: child nodes are mirrored into their parent's snapshot
//!   under their name and addressed transparently through the parent
//!
//! ## Example
//!
//! ```ignore
//! use statetree::{StateTree, Value};
//! use serde_json::json;
//!
//! let tree = StateTree::new();
//! let page = tree.create_node(json!({"title": "Inbox"}));
//! let counter = tree.create_node(json!({"value": 0}));
//! page.set_child("counter", &counter)?;
//!
//! let sub = page.subscribe("counter.value", |new, old| {
//!     println!("{old} -> {new}");
//! })?;
//!
//! page.set("counter.value", 5)?; // routed into the child, prints "0 -> 5"
//! assert_eq!(counter.get("value")?, Value::from(5));
//! sub.unsubscribe();
//! ```

pub mod error;
pub mod gate;
pub mod path;
pub mod schema;
pub mod state;
pub mod store;
pub mod subscriptions;
pub mod types;
pub mod view;

// Re-exports
pub use error::{Result, StateError};
pub use gate::{FifoGate, GateGuard};
pub use path::{IntoPath, PathKey, Segment};
pub use schema::{Action, CreateHook, FieldKind, NodeSchema};
pub use state::{
    apply_mutation, apply_mutation_bounded, value_at, Mutation, Outcome, DEFAULT_MAX_LIST_PADDING,
};
pub use store::{
    PanicPolicy, StateNode, StateTree, TreeConfig, WeakStateNode, DEFAULT_EVENT_NAMESPACE,
};
pub use subscriptions::{Change, Subscription, WatchHandle};
pub use types::*;
pub use view::{StateView, ViewSubscription};
