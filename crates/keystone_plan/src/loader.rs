//! Document loading: YAML text to an ordered nested mapping.

use keystone_core::{CompileError, CompileResult};
use serde_json::Value;

/// Parse blueprint YAML into a document value. Mapping order is preserved.
///
/// # Errors
///
/// Returns [`CompileError::InvalidDocument`] when the text is not valid
/// YAML or uses non-string mapping keys.
pub fn load_yaml(text: &str) -> CompileResult<Value> {
    let parsed: serde_yaml::Value =
        serde_yaml::from_str(text).map_err(|e| CompileError::InvalidDocument {
            reason: e.to_string(),
        })?;
    serde_json::to_value(parsed).map_err(|e| CompileError::InvalidDocument {
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_load_preserves_mapping_order() {
        let doc = load_yaml("b: 1\na: 2\nc: 3\n").unwrap();
        let keys: Vec<&String> = doc.as_object().unwrap().keys().collect();
        assert_eq!(keys, ["b", "a", "c"]);
    }

    #[test]
    fn test_load_nested() {
        let doc = load_yaml("outer:\n  inner: [1, two]\n").unwrap();
        assert_eq!(doc, json!({"outer": {"inner": [1, "two"]}}));
    }

    #[test]
    fn test_load_rejects_garbage() {
        let err = load_yaml("a: [unclosed").unwrap_err();
        assert_eq!(err.code(), 206);
    }
}
