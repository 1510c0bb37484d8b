//! Type hierarchies and property-schema merging.
//!
//! A type's hierarchy is its parent's hierarchy plus its own name; a type
//! with no parent is its own one-element hierarchy. Property tables merge
//! down the chain key-by-key: a child entry of the same key fully replaces
//! the parent's, keys only in the parent are kept as-is.

use keystone_core::{CompileError, CompileResult, ValueMap};
use serde_json::Value;

/// Built-in property type names.
pub const PRIMITIVE_TYPES: &[&str] = &["string", "integer", "float", "boolean", "list", "dict"];

/// The hierarchy for a type named `name` deriving from `parent` (a resolved
/// type record carrying `type_hierarchy`).
#[must_use]
pub fn hierarchy_with(parent: Option<&Value>, name: &str) -> Vec<Value> {
    let mut chain = parent
        .and_then(|p| p.get("type_hierarchy"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    chain.push(Value::String(name.to_string()));
    chain
}

/// Overlay `child` onto `parent` key-by-key.
///
/// A child entry fully replaces the parent's entry of the same key; there
/// is no field-level merge.
#[must_use]
pub fn merge_property_schemas(parent: &ValueMap, child: &ValueMap) -> ValueMap {
    let mut merged = parent.clone();
    for (key, value) in child {
        merged.insert(key.clone(), value.clone());
    }
    merged
}

/// Check every declared property type against the primitives and the
/// declared data types.
///
/// # Errors
///
/// Returns [`CompileError::UnknownType`] for the first undeclared type name.
pub fn validate_property_types(
    schema: &ValueMap,
    data_types: &[String],
    element: &str,
) -> CompileResult<()> {
    for (name, entry) in schema {
        let Some(type_name) = entry.get("type").and_then(Value::as_str) else {
            continue;
        };
        if PRIMITIVE_TYPES.contains(&type_name) {
            continue;
        }
        if data_types.iter().any(|t| t == type_name) {
            continue;
        }
        return Err(CompileError::UnknownType {
            element: format!("{element}.{name}"),
            type_name: type_name.to_string(),
        });
    }
    Ok(())
}

/// Reconcile instance values with a property schema: reject undeclared
/// keys, fill defaults, and require every defaultless property that is not
/// marked optional.
///
/// # Errors
///
/// Returns [`CompileError::UndeclaredProperty`] or
/// [`CompileError::MissingRequiredProperty`].
pub fn apply_schema(
    schema: &ValueMap,
    instance: &ValueMap,
    element: &str,
) -> CompileResult<ValueMap> {
    for key in instance.keys() {
        if !schema.contains_key(key) {
            return Err(CompileError::UndeclaredProperty {
                element: element.to_string(),
                property: key.clone(),
            });
        }
    }

    let mut merged = ValueMap::new();
    for (key, entry) in schema {
        if let Some(value) = instance.get(key) {
            merged.insert(key.clone(), value.clone());
            continue;
        }
        if let Some(default) = entry.get("default") {
            merged.insert(key.clone(), default.clone());
            continue;
        }
        let required = entry
            .get("required")
            .and_then(Value::as_bool)
            .unwrap_or(true);
        if required {
            return Err(CompileError::MissingRequiredProperty {
                element: element.to_string(),
                property: key.clone(),
            });
        }
    }
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> ValueMap {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_hierarchy_concatenation() {
        let parent = json!({"type_hierarchy": ["d", "c", "b"]});
        let chain = hierarchy_with(Some(&parent), "a");
        assert_eq!(chain, vec![json!("d"), json!("c"), json!("b"), json!("a")]);

        let chain = hierarchy_with(None, "d");
        assert_eq!(chain, vec![json!("d")]);
    }

    #[test]
    fn test_merge_child_entry_fully_replaces() {
        let parent = map(json!({
            "key": {"default": "parent", "description": "kept on parent only"},
            "key2": {"default": "val2"},
        }));
        let child = map(json!({"key": {"default": "child"}}));
        let merged = merge_property_schemas(&parent, &child);

        // no field-level merge: the description is gone
        assert_eq!(merged["key"], json!({"default": "child"}));
        assert_eq!(merged["key2"], json!({"default": "val2"}));
    }

    #[test]
    fn test_merge_with_self_is_identity() {
        let schema = map(json!({
            "a": {"type": "string", "default": "x"},
            "b": {"type": "integer"},
        }));
        assert_eq!(merge_property_schemas(&schema, &schema), schema);
    }

    #[test]
    fn test_validate_property_types() {
        let schema = map(json!({"p": {"type": "string"}, "q": {"type": "volume"}}));
        validate_property_types(&schema, &["volume".to_string()], "node_types.t").unwrap();

        let err = validate_property_types(&schema, &[], "node_types.t").unwrap_err();
        assert_eq!(err.code(), 301);
        assert_eq!(err.element(), Some("node_types.t.q"));
    }

    #[test]
    fn test_apply_schema_fills_defaults() {
        let schema = map(json!({
            "key": {"default": "not_val"},
            "key2": {"default": "val2"},
        }));
        let instance = map(json!({"key": "val"}));
        let merged = apply_schema(&schema, &instance, "node_templates.t").unwrap();
        assert_eq!(Value::Object(merged), json!({"key": "val", "key2": "val2"}));
    }

    #[test]
    fn test_apply_schema_rejects_undeclared() {
        let schema = map(json!({"key": {}}));
        let instance = map(json!({"key": 1, "rogue": 2}));
        let err = apply_schema(&schema, &instance, "node_templates.t").unwrap_err();
        assert_eq!(err.code(), 316);
    }

    #[test]
    fn test_apply_schema_requires_defaultless() {
        let schema = map(json!({"key": {"type": "string"}}));
        let err = apply_schema(&schema, &ValueMap::new(), "node_templates.t").unwrap_err();
        assert_eq!(err.code(), 315);

        // explicitly optional: simply omitted
        let schema = map(json!({"key": {"type": "string", "required": false}}));
        let merged = apply_schema(&schema, &ValueMap::new(), "node_templates.t").unwrap();
        assert!(merged.is_empty());
    }
}
