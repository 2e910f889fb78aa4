//! The write interceptor.
//!
//! Rust has no transparent object proxies, so we expose an explicit builder
//! API instead: every mutating call takes a path and funnels through the
//! same sink a transparent-proxy implementation would use. Auto-notify
//! batching then reduces to "the explicit API records paths and schedules
//! a flush".

use crate::error::{kind_name, CoreError};
use crate::nav;
use serde_json::Value;
use syncmux_wire::path::{Path, PathSegment};

fn require_container_root(value: &Value) -> Result<(), CoreError> {
    match value {
        Value::Object(_) | Value::Array(_) => Ok(()),
        other => Err(CoreError::InvalidRootKind {
            found: kind_name(other),
        }),
    }
}

/// A state root wrapped so every mutation reports its absolute path to a
/// sink before taking effect. Reads (`get`) are transparent and never touch
/// the sink.
pub struct Intercepted {
    value: Value,
    sink: Box<dyn FnMut(Path) + Send>,
}

impl std::fmt::Debug for Intercepted {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Intercepted").field("value", &self.value).finish_non_exhaustive()
    }
}

impl Intercepted {
    pub fn new(value: Value, sink: impl FnMut(Path) + Send + 'static) -> Result<Self, CoreError> {
        require_container_root(&value)?;
        Ok(Self {
            value,
            sink: Box::new(sink),
        })
    }

    /// Transparent read access; never invokes the sink.
    pub fn get(&self) -> &Value {
        &self.value
    }

    fn emit(&mut self, path: Path) {
        (self.sink)(path);
    }

    /// Assign `value` at `path`, creating intermediate object keys as needed.
    pub fn set(&mut self, path: &Path, value: Value) -> Result<(), CoreError> {
        if path.is_empty() {
            let previous_kind = kind_name(&self.value);
            let next_kind = kind_name(&value);
            if matches!(
                (previous_kind, next_kind),
                ("object", "array") | ("array", "object")
            ) {
                return Err(CoreError::RootKindChanged {
                    from: previous_kind,
                    to: next_kind,
                });
            }
        }
        self.emit(path.clone());
        nav::set_at(&mut self.value, path, value)
    }

    /// Remove an object key at `path`. Distinguishable on the wire from a
    /// present `null`/undefined value.
    pub fn delete(&mut self, path: &Path) -> Result<(), CoreError> {
        self.emit(path.clone());
        nav::delete_at(&mut self.value, path)
    }

    /// Append `item` to the array at `array_path`.
    pub fn push(&mut self, array_path: &Path, item: Value) -> Result<(), CoreError> {
        self.emit(array_path.clone());
        as_array_mut(&mut self.value, array_path)?.push(item);
        Ok(())
    }

    /// Remove and return the last element of the array at `array_path`.
    pub fn pop(&mut self, array_path: &Path) -> Result<Option<Value>, CoreError> {
        self.emit(array_path.clone());
        Ok(as_array_mut(&mut self.value, array_path)?.pop())
    }

    /// Replace `delete_count` elements starting at `start` with `items`,
    /// returning the removed elements (JS `Array.prototype.splice` shape).
    pub fn splice(
        &mut self,
        array_path: &Path,
        start: usize,
        delete_count: usize,
        items: Vec<Value>,
    ) -> Result<Vec<Value>, CoreError> {
        self.emit(array_path.clone());
        let arr = as_array_mut(&mut self.value, array_path)?;
        let end = (start + delete_count).min(arr.len());
        let start = start.min(arr.len());
        let removed: Vec<Value> = arr.splice(start..end, items).collect();
        Ok(removed)
    }

    /// Replace the element at `array_path[index]`. The emitted path includes
    /// the index, so the delta engine's array-parent diffing rule applies.
    pub fn index_set(&mut self, array_path: &Path, index: usize, value: Value) -> Result<(), CoreError> {
        let mut full = array_path.clone();
        full.push(PathSegment::Index(index));
        self.emit(full.clone());
        nav::set_at(&mut self.value, &full, value)
    }

    /// Run a batch of mutations against this facade; a convenience for the
    /// explicit builder API asks for (`mutate(fn)`).
    pub fn mutate<F: FnOnce(&mut Self) -> R, R>(&mut self, f: F) -> R {
        f(self)
    }
}

fn as_array_mut<'a>(root: &'a mut Value, path: &Path) -> Result<&'a mut Vec<Value>, CoreError> {
    match nav::get_mut(root, path)? {
        Value::Array(arr) => Ok(arr),
        other => Err(CoreError::TypeMismatch {
            path: path.clone(),
            expected: "array",
            found: kind_name(other),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::{Arc, Mutex};
    use syncmux_wire::path::PathSegment::{Index, Key};

    fn sink_recorder() -> (Arc<Mutex<Vec<Path>>>, impl FnMut(Path) + Send) {
        let paths = Arc::new(Mutex::new(Vec::new()));
        let recorder = paths.clone();
        let sink = move |p: Path| recorder.lock().unwrap().push(p);
        (paths, sink)
    }

    #[test]
    fn set_emits_path_before_mutation_and_applies_it() {
        let (paths, sink) = sink_recorder();
        let mut state = Intercepted::new(json!({"value": 0}), sink).unwrap();
        state.set(&vec![Key("value".into())], json!(10)).unwrap();
        assert_eq!(state.get()["value"], 10);
        assert_eq!(*paths.lock().unwrap(), vec![vec![Key("value".into())]]);
    }

    #[test]
    fn reads_never_touch_the_sink() {
        let (paths, sink) = sink_recorder();
        let state = Intercepted::new(json!({"a": 1}), sink).unwrap();
        let _ = state.get();
        assert!(paths.lock().unwrap().is_empty());
    }

    #[test]
    fn delete_removes_key_and_distinguishes_from_null() {
        let (_, sink) = sink_recorder();
        let mut state = Intercepted::new(json!({"a": 1, "b": 2}), sink).unwrap();
        state.delete(&vec![Key("a".into())]).unwrap();
        assert!(!state.get().as_object().unwrap().contains_key("a"));
        assert!(state.get().as_object().unwrap().contains_key("b"));
    }

    #[test]
    fn array_push_and_pop_mutate_in_place() {
        let (paths, sink) = sink_recorder();
        let mut state = Intercepted::new(json!({"items": [1, 2]}), sink).unwrap();
        let items_path = vec![Key("items".into())];
        state.push(&items_path, json!(3)).unwrap();
        assert_eq!(state.get()["items"], json!([1, 2, 3]));
        let popped = state.pop(&items_path).unwrap();
        assert_eq!(popped, Some(json!(3)));
        assert_eq!(*paths.lock().unwrap(), vec![items_path.clone(), items_path]);
    }

    #[test]
    fn index_set_emits_path_including_index() {
        let (paths, sink) = sink_recorder();
        let mut state = Intercepted::new(json!({"items": [1, 2, 3]}), sink).unwrap();
        state
            .index_set(&vec![Key("items".into())], 1, json!(99))
            .unwrap();
        assert_eq!(state.get()["items"], json!([1, 99, 3]));
        assert_eq!(
            *paths.lock().unwrap(),
            vec![vec![Key("items".into()), Index(1)]]
        );
    }

    #[test]
    fn splice_removes_and_inserts() {
        let (_, sink) = sink_recorder();
        let mut state = Intercepted::new(json!({"items": [1, 2, 3, 4]}), sink).unwrap();
        let removed = state
            .splice(&vec![Key("items".into())], 1, 2, vec![json!(9)])
            .unwrap();
        assert_eq!(removed, vec![json!(2), json!(3)]);
        assert_eq!(state.get()["items"], json!([1, 9, 4]));
    }

    #[test]
    fn root_container_kind_change_is_rejected() {
        let (_, sink) = sink_recorder();
        let mut state = Intercepted::new(json!({"a": 1}), sink).unwrap();
        let err = state.set(&vec![], json!([1, 2])).unwrap_err();
        assert!(matches!(err, CoreError::RootKindChanged { .. }));
    }

    #[test]
    fn non_container_root_is_rejected_at_construction() {
        let (_, sink) = sink_recorder();
        let err = Intercepted::new(json!("not an object"), sink).unwrap_err();
        assert!(matches!(err, CoreError::InvalidRootKind { .. }));
    }

    #[test]
    fn set_autovivifies_missing_object_keys() {
        let (_, sink) = sink_recorder();
        let mut state = Intercepted::new(json!({}), sink).unwrap();
        state
            .set(&vec![Key("a".into()), Key("b".into())], json!(1))
            .unwrap();
        assert_eq!(state.get()["a"]["b"], 1);
    }
}
