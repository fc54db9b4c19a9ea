//! Copy-on-write mutation of snapshots.

use crate::path::Segment;
use crate::types::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Default bound on the `Null` entries a single list write may pad in.
pub const DEFAULT_MAX_LIST_PADDING: usize = 1024;

/// A structural change to apply at a path.
#[derive(Clone, Debug)]
pub enum Mutation {
    /// Store a value at the path.
    Set(Value),
    /// Remove the key (or list element) at the path.
    Unset,
    /// Merge entries into the container at the path.
    Patch(Arc<BTreeMap<String, Value>>),
}

/// What applying a mutation did.
#[derive(Clone, Debug)]
pub enum Outcome {
    /// The snapshot changed; carries the new root.
    Changed(Value),
    /// The target already held the requested value(s).
    Unchanged,
    /// A container on the way to the target does not exist.
    Missing,
    /// A list write would pad in more `Null` entries than allowed.
    OutOfRange { index: usize, len: usize },
}

impl Outcome {
    pub fn is_changed(&self) -> bool {
        matches!(self, Outcome::Changed(_))
    }
}

/// Read the value at `path`, short-circuiting to `Null` on the first
/// missing step.
pub fn value_at(root: &Value, path: &[Segment]) -> Value {
    let mut current = root.clone();
    for segment in path {
        if current.is_null() {
            return Value::Null;
        }
        current = current.child(segment);
    }
    current
}

/// Apply a mutation to `root` at `path`, padding lists by at most
/// [`DEFAULT_MAX_LIST_PADDING`] entries.
///
/// Every container between the root and the target is shallow-cloned with
/// exactly one entry replaced. Everything off the path keeps its original
/// reference. `root` itself is never modified.
pub fn apply_mutation(root: &Value, path: &[Segment], mutation: &Mutation) -> Outcome {
    apply_mutation_bounded(root, path, mutation, DEFAULT_MAX_LIST_PADDING)
}

/// [`apply_mutation`] with an explicit list padding bound. A write at
/// index `i` of a list of length `len` needs `i - len` padding entries.
pub fn apply_mutation_bounded(
    root: &Value,
    path: &[Segment],
    mutation: &Mutation,
    max_padding: usize,
) -> Outcome {
    match mutation {
        Mutation::Patch(entries) => rewrite(root, path, &mut |target| {
            merge_entries(target, entries, max_padding)
        }),
        Mutation::Set(value) => match path.split_last() {
            None => {
                if root.same(value) {
                    Outcome::Unchanged
                } else {
                    Outcome::Changed(value.clone())
                }
            }
            Some((last, parents)) => rewrite(root, parents, &mut |container| {
                write_entry(container, last, Some(value), max_padding)
            }),
        },
        Mutation::Unset => match path.split_last() {
            None => {
                if root.is_null() {
                    Outcome::Unchanged
                } else {
                    Outcome::Changed(Value::Null)
                }
            }
            Some((last, parents)) => rewrite(root, parents, &mut |container| {
                write_entry(container, last, None, max_padding)
            }),
        },
    }
}

/// Walk down `path`, apply `edit` to the value found there, and rebuild
/// the ancestors on the way back up.
fn rewrite(node: &Value, path: &[Segment], edit: &mut dyn FnMut(&Value) -> Outcome) -> Outcome {
    let Some((head, rest)) = path.split_first() else {
        return edit(node);
    };

    let child = node.child(head);
    if !child.is_container() {
        return Outcome::Missing;
    }

    match rewrite(&child, rest, edit) {
        // The child exists, so replacing it never pads.
        Outcome::Changed(new_child) => match write_entry(node, head, Some(&new_child), 0) {
            Outcome::Changed(new_node) => Outcome::Changed(new_node),
            _ => Outcome::Missing,
        },
        other => other,
    }
}

/// Store `new` at `index`, appending at `len` and padding with `Null`
/// beyond it. Returns whether the list changed.
fn store_index(
    items: &mut Vec<Value>,
    index: usize,
    new: &Value,
    max_padding: usize,
) -> Result<bool, Outcome> {
    let len = items.len();
    if index < len {
        if items[index].same(new) {
            return Ok(false);
        }
        items[index] = new.clone();
        return Ok(true);
    }
    if index - len > max_padding {
        return Err(Outcome::OutOfRange { index, len });
    }
    items.resize(index, Value::Null);
    items.push(new.clone());
    Ok(true)
}

/// Replace, insert or remove one entry of a container.
fn write_entry(container: &Value, segment: &Segment, value: Option<&Value>, max_padding: usize) -> Outcome {
    match container {
        Value::Map(map) => {
            let key = segment.as_key();
            let existing = map.get(&*key);
            match (existing, value) {
                (Some(old), Some(new)) if old.same(new) => Outcome::Unchanged,
                (None, None) => Outcome::Unchanged,
                (_, Some(new)) => {
                    let mut map = (**map).clone();
                    map.insert(key.into_owned(), new.clone());
                    Outcome::Changed(Value::Map(Arc::new(map)))
                }
                (Some(_), None) => {
                    let mut map = (**map).clone();
                    map.remove(&*key);
                    Outcome::Changed(Value::Map(Arc::new(map)))
                }
            }
        }
        Value::List(items) => {
            let Some(index) = segment.as_index() else {
                return Outcome::Missing;
            };
            match value {
                Some(new) => {
                    if items.get(index).is_some_and(|old| old.same(new)) {
                        return Outcome::Unchanged;
                    }
                    if index > items.len() && index - items.len() > max_padding {
                        return Outcome::OutOfRange { index, len: items.len() };
                    }
                    let mut items = (**items).clone();
                    match store_index(&mut items, index, new, max_padding) {
                        Ok(_) => Outcome::Changed(Value::List(Arc::new(items))),
                        Err(outcome) => outcome,
                    }
                }
                None => {
                    if index >= items.len() {
                        return Outcome::Unchanged;
                    }
                    let mut items = (**items).clone();
                    items.remove(index);
                    Outcome::Changed(Value::List(Arc::new(items)))
                }
            }
        }
        _ => Outcome::Missing,
    }
}

/// Merge all entries into the target container as one new container. The
/// container is cloned once, on the first entry that changes it.
fn merge_entries(target: &Value, entries: &BTreeMap<String, Value>, max_padding: usize) -> Outcome {
    match target {
        Value::Map(map) => {
            let mut merged: Option<BTreeMap<String, Value>> = None;
            for (key, value) in entries {
                let key = Segment::key(key.as_str()).as_key().into_owned();
                let current = merged.as_ref().unwrap_or(&**map);
                if current.get(&key).is_some_and(|old| old.same(value)) {
                    continue;
                }
                merged
                    .get_or_insert_with(|| (**map).clone())
                    .insert(key, value.clone());
            }
            match merged {
                Some(map) => Outcome::Changed(Value::Map(Arc::new(map))),
                None => Outcome::Unchanged,
            }
        }
        Value::List(items) => {
            let mut merged: Option<Vec<Value>> = None;
            for (key, value) in entries {
                let Some(index) = Segment::key(key.as_str()).as_index() else {
                    return Outcome::Missing;
                };
                let current = merged.as_ref().unwrap_or(&**items);
                if current.get(index).is_some_and(|old| old.same(value)) {
                    continue;
                }
                let list = merged.get_or_insert_with(|| (**items).clone());
                if let Err(outcome) = store_index(list, index, value, max_padding) {
                    return outcome;
                }
            }
            match merged {
                Some(items) => Outcome::Changed(Value::List(Arc::new(items))),
                None => Outcome::Unchanged,
            }
        }
        _ => Outcome::Missing,
    }
}
