//! Snapshot operations.
//!
//! Pure functions over [`Value`](crate::Value): reading by path and
//! copy-on-write mutation. Nodes own the current snapshot; these functions
//! only compute the next one.

mod operations;

pub use operations::{
    apply_mutation, apply_mutation_bounded, value_at, Mutation, Outcome, DEFAULT_MAX_LIST_PADDING,
};
