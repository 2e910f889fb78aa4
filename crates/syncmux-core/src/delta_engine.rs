//! Minimal structural diffing between two `serde_json::Value` trees, and the
//! path-aware wrapper `compute_delta_for_path` the SharedObject server calls
//! on every flushed path.

use crate::error::CoreError;
use crate::nav;
use serde_json::{Map, Value};
use syncmux_wire::delta::{wrap_delta_at_path, Delta, DeltaEntry};
use syncmux_wire::path::{Path, PathSegment};

/// Produce a delta that, applied to `old`, yields `new`.
///
/// Object changes that touch a single property emit a one-key
/// replace/delete so that "removed" and "present but null" stay
/// distinguishable on the wire. Array changes always diff the whole array
/// rather than per-index, since array edits are tail-strict.
pub fn compute_delta(old: &Value, new: &Value) -> Delta {
    compute_delta_at(&[], old, new)
}

fn compute_delta_at(path: &[PathSegment], old: &Value, new: &Value) -> Delta {
    if old == new {
        return Vec::new();
    }
    match (old, new) {
        (Value::Object(old_map), Value::Object(new_map)) => diff_objects(path, old_map, new_map),
        _ => vec![DeltaEntry::Replace {
            path: path.to_vec(),
            value: new.clone(),
        }],
    }
}

fn diff_objects(path: &[PathSegment], old_map: &Map<String, Value>, new_map: &Map<String, Value>) -> Delta {
    let mut entries = Vec::new();
    for (key, old_value) in old_map {
        if !new_map.contains_key(key) {
            let mut key_path = path.to_vec();
            key_path.push(PathSegment::Key(key.clone()));
            entries.push(DeltaEntry::Delete { path: key_path });
        } else {
            let new_value = &new_map[key];
            if old_value != new_value {
                let mut key_path = path.to_vec();
                key_path.push(PathSegment::Key(key.clone()));
                entries.extend(compute_delta_at(&key_path, old_value, new_value));
            }
        }
    }
    for (key, new_value) in new_map {
        if !old_map.contains_key(key) {
            let mut key_path = path.to_vec();
            key_path.push(PathSegment::Key(key.clone()));
            entries.push(DeltaEntry::Replace {
                path: key_path,
                value: new_value.clone(),
            });
        }
    }
    entries
}

/// Mutate `target` by applying `delta` in order.
pub fn apply_delta(target: &mut Value, delta: &Delta) -> Result<(), CoreError> {
    for entry in delta {
        apply_entry(target, entry)?;
    }
    Ok(())
}

fn apply_entry(target: &mut Value, entry: &DeltaEntry) -> Result<(), CoreError> {
    match entry {
        DeltaEntry::Replace { path, value } => nav::set_at(target, path, value.clone())
            .map_err(|e| CoreError::DeltaApplyFailed(e.to_string())),
        DeltaEntry::Delete { path } => nav::delete_at(target, path)
            .map_err(|e| CoreError::DeltaApplyFailed(e.to_string())),
        DeltaEntry::Nested { path, entries } => {
            let subtree = nav::get_mut(target, path).map_err(|e| CoreError::DeltaApplyFailed(e.to_string()))?;
            apply_delta(subtree, entries)
        }
    }
}

/// Implements the path-selection rules the SharedObject server uses to keep
/// deltas minimal: prefer diffing the narrowest container that actually
/// contains `path`, falling back to a root diff when nothing narrower
/// applies.
pub fn compute_delta_for_path(snapshot: &Value, state: &Value, path: &Path) -> Delta {
    if path.is_empty() {
        return compute_delta(snapshot, state);
    }

    if let (Ok(old_sub), Ok(new_sub)) = (nav::get(snapshot, path), nav::get(state, path)) {
        if same_container_kind(old_sub, new_sub) {
            return wrap_delta_at_path(path.clone(), compute_delta_at(&[], old_sub, new_sub));
        }
    }

    let parent_path = &path[..path.len() - 1];
    let last = &path[path.len() - 1];

    if let (Ok(Value::Array(old_parent)), Ok(Value::Array(new_parent))) =
        (nav::get(snapshot, parent_path), nav::get(state, parent_path))
    {
        return wrap_delta_at_path(
            parent_path.to_vec(),
            compute_delta_at(&[], &Value::Array(old_parent.clone()), &Value::Array(new_parent.clone())),
        );
    }

    if let PathSegment::Key(key) = last {
        if let (Ok(Value::Object(old_parent)), Ok(Value::Object(new_parent))) =
            (nav::get(snapshot, parent_path), nav::get(state, parent_path))
        {
            let old_wrapper = single_key_map(old_parent, key);
            let new_wrapper = single_key_map(new_parent, key);
            return wrap_delta_at_path(
                parent_path.to_vec(),
                compute_delta_at(&[], &old_wrapper, &new_wrapper),
            );
        }
    }

    compute_delta(snapshot, state)
}

fn same_container_kind(a: &Value, b: &Value) -> bool {
    matches!(
        (a, b),
        (Value::Object(_), Value::Object(_)) | (Value::Array(_), Value::Array(_))
    )
}

fn single_key_map(map: &Map<String, Value>, key: &str) -> Value {
    let mut out = Map::new();
    if let Some(v) = map.get(key) {
        out.insert(key.to_owned(), v.clone());
    }
    Value::Object(out)
}
