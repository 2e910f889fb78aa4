//! The schema subtree resolver.
//!
//! Walks a compiled root schema along a path and memoizes, per path, whether
//! the subtree is a primitive, a date-format leaf, or "complex" (meaning we
//! could not statically locate it — `additionalProperties: true`, a dynamic
//! item union, `anyOf`/`oneOf` with no single matching branch — in which
//! case we fall back to validating against the whole root schema).
//!
//! JSON-Schema compilation itself is treated as an opaque collaborator;
//! we reach it only through the `jsonschema` crate's `Validator`.

use crate::date_format;
use crate::error::CoreError;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use syncmux_wire::path::{Path, PathSegment};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaKind {
    Primitive,
    Date,
    Complex,
}

pub struct ResolvedSchema {
    pub kind: SchemaKind,
    pub schema: Value,
    validator: Arc<jsonschema::Validator>,
}

impl ResolvedSchema {
    /// Validate `value` against this subtree. Date leaves accept either a
    /// timestamp-shaped value or any string `chrono` can parse as a date.
    pub fn validate(&self, value: &Value) -> Result<(), String> {
        match self.kind {
            SchemaKind::Date => {
                if value.is_string() && date_format::try_parse(value).is_some() {
                    Ok(())
                } else {
                    Err(format!(
                        "expected a date/date-time formatted string, got {value}"
                    ))
                }
            }
            SchemaKind::Primitive | SchemaKind::Complex => self
                .validator
                .validate(value)
                .map_err(|e| e.to_string()),
        }
    }
}

pub struct SchemaResolver {
    root_schema: Value,
    root_validator: Arc<jsonschema::Validator>,
    cache: Mutex<HashMap<Path, Arc<ResolvedSchema>>>,
}

impl SchemaResolver {
    pub fn new(root_schema: Value) -> Result<Self, CoreError> {
        let root_validator = jsonschema::validator_for(&root_schema).map_err(|e| {
            CoreError::SchemaInvalid {
                path: Vec::new(),
                message: e.to_string(),
            }
        })?;
        Ok(Self {
            root_schema,
            root_validator: Arc::new(root_validator),
            cache: Mutex::new(HashMap::new()),
        })
    }

    pub fn root_schema(&self) -> &Value {
        &self.root_schema
    }

    pub fn validate_root(&self, value: &Value) -> Result<(), String> {
        self.root_validator.validate(value).map_err(|e| e.to_string())
    }

    /// Resolve (and memoize) the subschema at `path`.
    pub fn resolve(&self, path: &Path) -> Arc<ResolvedSchema> {
        if let Some(hit) = self.cache.lock().unwrap().get(path) {
            return hit.clone();
        }
        let resolved = self.resolve_uncached(path);
        self.cache
            .lock()
            .unwrap()
            .insert(path.clone(), resolved.clone());
        resolved
    }

    fn resolve_uncached(&self, path: &Path) -> Arc<ResolvedSchema> {
        let node = walk(&self.root_schema, path);
        match node {
            Some(schema) => {
                let kind = classify(&schema);
                match kind {
                    SchemaKind::Complex => Arc::new(ResolvedSchema {
                        kind,
                        schema: self.root_schema.clone(),
                        validator: self.root_validator.clone(),
                    }),
                    SchemaKind::Primitive | SchemaKind::Date => {
                        match jsonschema::validator_for(&schema) {
                            Ok(v) => Arc::new(ResolvedSchema {
                                kind,
                                schema,
                                validator: Arc::new(v),
                            }),
                            Err(_) => Arc::new(ResolvedSchema {
                                kind: SchemaKind::Complex,
                                schema: self.root_schema.clone(),
                                validator: self.root_validator.clone(),
                            }),
                        }
                    }
                }
            }
            None => Arc::new(ResolvedSchema {
                kind: SchemaKind::Complex,
                schema: self.root_schema.clone(),
                validator: self.root_validator.clone(),
            }),
        }
    }
}

fn classify(schema: &Value) -> SchemaKind {
    let Some(obj) = schema.as_object() else {
        // `true`/`false` boolean schemas, or a bare non-object node.
        return SchemaKind::Complex;
    };
    let format = obj.get("format").and_then(Value::as_str);
    if matches!(format, Some("date") | Some("date-time")) {
        return SchemaKind::Date;
    }
    match obj.get("type").and_then(Value::as_str) {
        Some("string") | Some("number") | Some("integer") | Some("boolean") | Some("null") => {
            SchemaKind::Primitive
        }
        Some("object") | Some("array") => SchemaKind::Complex,
        _ => {
            // No `type` keyword (e.g. just `enum`/`const` of scalars) is
            // still a primitive for our purposes if every alternative is a
            // scalar; otherwise treat it as complex.
            if obj.contains_key("properties") || obj.contains_key("items") {
                SchemaKind::Complex
            } else if let Some(values) = obj.get("enum").and_then(Value::as_array) {
                if values.iter().all(|v| !v.is_object() && !v.is_array()) {
                    SchemaKind::Primitive
                } else {
                    SchemaKind::Complex
                }
            } else {
                SchemaKind::Complex
            }
        }
    }
}

fn walk(root: &Value, path: &Path) -> Option<Value> {
    let mut cur = root.clone();
    for segment in path {
        cur = step(&cur, segment)?;
    }
    Some(cur)
}

fn step(schema: &Value, segment: &PathSegment) -> Option<Value> {
    let obj = schema.as_object()?;
    match segment {
        PathSegment::Key(key) => {
            if let Some(props) = obj.get("properties").and_then(Value::as_object) {
                if let Some(sub) = props.get(key) {
                    return Some(sub.clone());
                }
            }
            match obj.get("additionalProperties") {
                Some(Value::Object(_)) => obj.get("additionalProperties").cloned(),
                // `additionalProperties: true` or absent: cannot statically
                // locate the key's schema.
                _ => try_branches(obj, segment),
            }
        }
        PathSegment::Index(index) => match obj.get("items") {
            Some(Value::Array(tuple)) => tuple.get(*index).cloned(),
            Some(item_schema @ Value::Object(_)) => Some(item_schema.clone()),
            _ => try_branches(obj, segment),
        },
    }
}

/// Best-effort descent through `anyOf`/`oneOf`/`allOf`: if exactly one
/// branch resolves the segment, use it; otherwise this path cannot be
/// statically located.
fn try_branches(obj: &serde_json::Map<String, Value>, segment: &PathSegment) -> Option<Value> {
    for key in ["allOf", "anyOf", "oneOf"] {
        let Some(branches) = obj.get(key).and_then(Value::as_array) else {
            continue;
        };
        let resolved: Vec<Value> = branches.iter().filter_map(|b| step(b, segment)).collect();
        if resolved.len() == 1 {
            return resolved.into_iter().next();
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn path_of(keys: &[&str]) -> Path {
        keys.iter().map(|k| PathSegment::Key((*k).to_owned())).collect()
    }

    #[test]
    fn resolves_primitive_leaf() {
        let schema = json!({
            "type": "object",
            "properties": { "value": { "type": "number" } }
        });
        let resolver = SchemaResolver::new(schema).unwrap();
        let resolved = resolver.resolve(&path_of(&["value"]));
        assert_eq!(resolved.kind, SchemaKind::Primitive);
    }

    #[test]
    fn resolves_date_time_leaf() {
        let schema = json!({
            "type": "object",
            "properties": { "lastUpdated": { "type": "string", "format": "date-time" } }
        });
        let resolver = SchemaResolver::new(schema).unwrap();
        let resolved = resolver.resolve(&path_of(&["lastUpdated"]));
        assert_eq!(resolved.kind, SchemaKind::Date);
        assert!(resolved.validate(&json!("2024-01-01T00:00:00.000Z")).is_ok());
        assert!(resolved.validate(&json!("not a date")).is_err());
    }

    #[test]
    fn falls_back_to_complex_for_additional_properties_true() {
        let schema = json!({ "type": "object", "additionalProperties": true });
        let resolver = SchemaResolver::new(schema).unwrap();
        let resolved = resolver.resolve(&path_of(&["anything"]));
        assert_eq!(resolved.kind, SchemaKind::Complex);
    }

    #[test]
    fn resolution_is_memoized_by_path() {
        let schema = json!({
            "type": "object",
            "properties": { "value": { "type": "number" } }
        });
        let resolver = SchemaResolver::new(schema).unwrap();
        let a = resolver.resolve(&path_of(&["value"]));
        let b = resolver.resolve(&path_of(&["value"]));
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn array_items_schema_applies_to_every_index() {
        let schema = json!({
            "type": "object",
            "properties": {
                "items": { "type": "array", "items": { "type": "string" } }
            }
        });
        let resolver = SchemaResolver::new(schema).unwrap();
        let mut path = path_of(&["items"]);
        path.push(PathSegment::Index(3));
        let resolved = resolver.resolve(&path);
        assert_eq!(resolved.kind, SchemaKind::Primitive);
    }
}
