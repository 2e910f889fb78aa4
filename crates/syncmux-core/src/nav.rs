//! Path navigation over `serde_json::Value`, shared by the write
//! interceptor, the read-only view, and the delta engine.

use crate::error::{kind_name, CoreError};
use serde_json::Value;
use syncmux_wire::path::{Path, PathSegment};

pub fn get<'a>(root: &'a Value, path: &[PathSegment]) -> Result<&'a Value, CoreError> {
    let mut cur = root;
    for (i, seg) in path.iter().enumerate() {
        cur = step(cur, seg, &path[..=i])?;
    }
    Ok(cur)
}

fn step<'a>(cur: &'a Value, seg: &PathSegment, path_so_far: &[PathSegment]) -> Result<&'a Value, CoreError> {
    match (cur, seg) {
        (Value::Object(map), PathSegment::Key(k)) => {
            map.get(k).ok_or_else(|| CoreError::PathNotFound {
                path: path_so_far.to_vec(),
            })
        }
        (Value::Array(arr), PathSegment::Index(i)) => {
            arr.get(*i).ok_or_else(|| CoreError::IndexOutOfBounds {
                path: path_so_far.to_vec(),
                index: *i,
                len: arr.len(),
            })
        }
        (other, PathSegment::Key(_)) => Err(CoreError::TypeMismatch {
            path: path_so_far.to_vec(),
            expected: "object",
            found: kind_name(other),
        }),
        (other, PathSegment::Index(_)) => Err(CoreError::TypeMismatch {
            path: path_so_far.to_vec(),
            expected: "array",
            found: kind_name(other),
        }),
    }
}

pub fn get_mut<'a>(root: &'a mut Value, path: &[PathSegment]) -> Result<&'a mut Value, CoreError> {
    let mut cur = root;
    for (i, seg) in path.iter().enumerate() {
        cur = step_mut(cur, seg, &path[..=i])?;
    }
    Ok(cur)
}

fn step_mut<'a>(
    cur: &'a mut Value,
    seg: &PathSegment,
    path_so_far: &[PathSegment],
) -> Result<&'a mut Value, CoreError> {
    match (cur, seg) {
        (Value::Object(map), PathSegment::Key(k)) => {
            map.get_mut(k).ok_or_else(|| CoreError::PathNotFound {
                path: path_so_far.to_vec(),
            })
        }
        (Value::Array(arr), PathSegment::Index(i)) => {
            let len = arr.len();
            arr.get_mut(*i).ok_or(CoreError::IndexOutOfBounds {
                path: path_so_far.to_vec(),
                index: *i,
                len,
            })
        }
        (other, PathSegment::Key(_)) => Err(CoreError::TypeMismatch {
            path: path_so_far.to_vec(),
            expected: "object",
            found: kind_name(other),
        }),
        (other, PathSegment::Index(_)) => Err(CoreError::TypeMismatch {
            path: path_so_far.to_vec(),
            expected: "array",
            found: kind_name(other),
        }),
    }
}

/// Set the value at `path`, auto-vivifying missing object keys along the
/// way (but never auto-vivifying arrays — an out-of-range index is an
/// error, matching the delta engine's "tail-strict" array edits).
pub fn set_at(root: &mut Value, path: &Path, value: Value) -> Result<(), CoreError> {
    if path.is_empty() {
        *root = value;
        return Ok(());
    }
    let (parent_path, last) = path.split_at(path.len() - 1);
    let parent = vivify_parent(root, parent_path)?;
    match (parent, &last[0]) {
        (Value::Object(map), PathSegment::Key(k)) => {
            map.insert(k.clone(), value);
            Ok(())
        }
        (Value::Array(arr), PathSegment::Index(i)) => {
            if *i == arr.len() {
                arr.push(value);
            } else if *i < arr.len() {
                arr[*i] = value;
            } else {
                return Err(CoreError::IndexOutOfBounds {
                    path: path.clone(),
                    index: *i,
                    len: arr.len(),
                });
            }
            Ok(())
        }
        (other, PathSegment::Key(_)) => Err(CoreError::TypeMismatch {
            path: parent_path.to_vec(),
            expected: "object",
            found: kind_name(other),
        }),
        (other, PathSegment::Index(_)) => Err(CoreError::TypeMismatch {
            path: parent_path.to_vec(),
            expected: "array",
            found: kind_name(other),
        }),
    }
}

/// Delete the key at `path` from its parent object. Deleting from an array
/// by path is not supported — use the array mutation API (splice/pop),
/// since array edits always diff the whole parent.
pub fn delete_at(root: &mut Value, path: &Path) -> Result<(), CoreError> {
    if path.is_empty() {
        return Err(CoreError::TypeMismatch {
            path: path.clone(),
            expected: "non-root path",
            found: kind_name(root),
        });
    }
    let (parent_path, last) = path.split_at(path.len() - 1);
    let parent = get_mut(root, parent_path)?;
    match (parent, &last[0]) {
        (Value::Object(map), PathSegment::Key(k)) => {
            map.remove(k)
                .map(|_| ())
                .ok_or_else(|| CoreError::PathNotFound { path: path.clone() })
        }
        (other, PathSegment::Key(_)) => Err(CoreError::TypeMismatch {
            path: parent_path.to_vec(),
            expected: "object",
            found: kind_name(other),
        }),
        (_, PathSegment::Index(_)) => Err(CoreError::TypeMismatch {
            path: parent_path.to_vec(),
            expected: "object (array deletion goes through splice)",
            found: "array",
        }),
    }
}

fn vivify_parent<'a>(root: &'a mut Value, parent_path: &[PathSegment]) -> Result<&'a mut Value, CoreError> {
    let mut cur = root;
    for (i, seg) in parent_path.iter().enumerate() {
        let path_so_far = &parent_path[..=i];
        cur = match cur {
            Value::Object(map) => match seg {
                PathSegment::Key(k) => map
                    .entry(k.clone())
                    .or_insert_with(|| Value::Object(Default::default())),
                PathSegment::Index(_) => {
                    return Err(CoreError::TypeMismatch {
                        path: path_so_far.to_vec(),
                        expected: "array",
                        found: "object",
                    })
                }
            },
            Value::Array(_) => match seg {
                PathSegment::Index(_) => step_mut(cur, seg, path_so_far)?,
                PathSegment::Key(_) => {
                    return Err(CoreError::TypeMismatch {
                        path: path_so_far.to_vec(),
                        expected: "object",
                        found: "array",
                    })
                }
            },
            other => match seg {
                PathSegment::Key(_) => {
                    return Err(CoreError::TypeMismatch {
                        path: path_so_far.to_vec(),
                        expected: "object",
                        found: kind_name(other),
                    })
                }
                PathSegment::Index(_) => {
                    return Err(CoreError::TypeMismatch {
                        path: path_so_far.to_vec(),
                        expected: "array",
                        found: kind_name(other),
                    })
                }
            },
        };
    }
    Ok(cur)
}
