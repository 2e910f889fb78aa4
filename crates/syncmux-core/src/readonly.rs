//! The read-only view.
//!
//! Rust's borrow checker already gives us "reads only" for free through a
//! shared reference — there is no proxy identity to cache, and primitives
//! pass through unwrapped since `&Value` borrows transparently. What this
//! type adds over a bare `&Value` is a clear, typed rejection when
//! something tries to mutate through it.

use crate::error::CoreError;
use crate::nav;
use serde_json::Value;
use syncmux_wire::path::Path;

/// A read-only façade over a state value. `set`/`delete` always fail with
/// [`CoreError::ReadOnly`]; reads walk the same path semantics as the write
/// interceptor.
#[derive(Debug, Clone, Copy)]
pub struct ReadOnlyView<'a> {
    value: &'a Value,
}

impl<'a> ReadOnlyView<'a> {
    pub fn new(value: &'a Value) -> Self {
        Self { value }
    }

    pub fn root(&self) -> &'a Value {
        self.value
    }

    pub fn get(&self, path: &Path) -> Result<&'a Value, CoreError> {
        nav::get(self.value, path)
    }

    pub fn set(&self, path: &Path, _value: Value) -> Result<(), CoreError> {
        Err(CoreError::ReadOnly { path: path.clone() })
    }

    pub fn delete(&self, path: &Path) -> Result<(), CoreError> {
        Err(CoreError::ReadOnly { path: path.clone() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use syncmux_wire::path::PathSegment::Key;

    #[test]
    fn reads_pass_through() {
        let value = json!({"value": 10});
        let view = ReadOnlyView::new(&value);
        assert_eq!(view.get(&vec![Key("value".into())]).unwrap(), &json!(10));
    }

    #[test]
    fn writes_fail_with_a_clear_error() {
        let value = json!({"value": 10});
        let view = ReadOnlyView::new(&value);
        let err = view.set(&vec![Key("value".into())], json!(20)).unwrap_err();
        assert!(matches!(err, CoreError::ReadOnly { .. }));
    }
}
