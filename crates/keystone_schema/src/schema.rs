//! Shape declarations for element types.
//!
//! A [`Schema`] describes what shape of document value an element accepts:
//! a scalar of a given kind, a mapping of named children, a homogeneous
//! mapping or sequence of children, or an ordered list of alternatives
//! tried in turn.

use crate::element::ElementTag;
use keystone_core::kind_name;
use serde_json::Value;

/// Kind of scalar value a [`Schema::Scalar`] accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarKind {
    /// A string
    String,
    /// An integer
    Int,
    /// Any number
    Float,
    /// A boolean
    Bool,
    /// A raw mapping, kept opaque (no child elements)
    Mapping,
    /// A raw sequence, kept opaque (no child elements)
    Sequence,
    /// Anything
    Any,
}

impl ScalarKind {
    /// Whether `value` is of this kind.
    #[must_use]
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Int => value.is_i64() || value.is_u64(),
            Self::Float => value.is_number(),
            Self::Bool => value.is_boolean(),
            Self::Mapping => value.is_object(),
            Self::Sequence => value.is_array(),
            Self::Any => true,
        }
    }

    /// Name used in format errors.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Int => "integer",
            Self::Float => "number",
            Self::Bool => "boolean",
            Self::Mapping => "mapping",
            Self::Sequence => "sequence",
            Self::Any => "any",
        }
    }
}

/// A named child slot in a [`Schema::Dict`].
#[derive(Debug, Clone, Copy)]
pub struct DictField {
    /// Document key this child is bound to
    pub key: &'static str,
    /// Element type handling the child
    pub element: ElementTag,
}

impl DictField {
    /// Create a new field.
    #[must_use]
    pub const fn new(key: &'static str, element: ElementTag) -> Self {
        Self { key, element }
    }
}

/// Shape of input an element type accepts.
#[derive(Debug, Clone)]
pub enum Schema {
    /// A scalar of the given kind
    Scalar(ScalarKind),
    /// A mapping with declared keys; only declared keys are visited
    Dict(Vec<DictField>),
    /// A homogeneous mapping, one child per document key
    Map(ElementTag),
    /// A homogeneous sequence, one child per document element
    List(ElementTag),
    /// Alternatives tried in declaration order
    OneOf(Vec<Schema>),
}

impl Schema {
    /// Convenience constructor for a [`Schema::Dict`].
    #[must_use]
    pub fn dict<const N: usize>(fields: [DictField; N]) -> Self {
        Self::Dict(fields.to_vec())
    }

    /// Whether `value` has the container shape (or scalar kind) this schema
    /// expects. For [`Schema::OneOf`] any alternative may match.
    #[must_use]
    pub fn shape_matches(&self, value: &Value) -> bool {
        match self {
            Self::Scalar(kind) => kind.matches(value),
            Self::Dict(_) | Self::Map(_) => value.is_object(),
            Self::List(_) => value.is_array(),
            Self::OneOf(alternatives) => alternatives.iter().any(|s| s.shape_matches(value)),
        }
    }

    /// Expected-shape name used in format errors.
    #[must_use]
    pub fn expected_name(&self) -> &'static str {
        match self {
            Self::Scalar(kind) => kind.name(),
            Self::Dict(_) | Self::Map(_) => "mapping",
            Self::List(_) => "sequence",
            Self::OneOf(_) => "one of the allowed forms",
        }
    }

    /// Element tags this schema references.
    #[must_use]
    pub fn child_tags(&self) -> Vec<ElementTag> {
        match self {
            Self::Scalar(_) => Vec::new(),
            Self::Dict(fields) => fields.iter().map(|f| f.element).collect(),
            Self::Map(tag) | Self::List(tag) => vec![*tag],
            Self::OneOf(alternatives) => {
                alternatives.iter().flat_map(Schema::child_tags).collect()
            }
        }
    }
}

/// Format-error helper: the actual kind of a value.
#[must_use]
pub fn actual_name(value: &Value) -> &'static str {
    kind_name(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scalar_kind_matches() {
        assert!(ScalarKind::String.matches(&json!("x")));
        assert!(!ScalarKind::String.matches(&json!(1)));
        assert!(ScalarKind::Int.matches(&json!(1)));
        assert!(!ScalarKind::Int.matches(&json!(1.5)));
        assert!(ScalarKind::Float.matches(&json!(1)));
        assert!(ScalarKind::Float.matches(&json!(1.5)));
        assert!(ScalarKind::Bool.matches(&json!(false)));
        assert!(ScalarKind::Mapping.matches(&json!({})));
        assert!(ScalarKind::Sequence.matches(&json!([])));
        assert!(ScalarKind::Any.matches(&json!(null)));
    }

    #[test]
    fn test_shape_matches_one_of() {
        let schema = Schema::OneOf(vec![
            Schema::Scalar(ScalarKind::String),
            Schema::Scalar(ScalarKind::Mapping),
        ]);
        assert!(schema.shape_matches(&json!("impl")));
        assert!(schema.shape_matches(&json!({"a": 1})));
        assert!(!schema.shape_matches(&json!([1])));
    }

    #[test]
    fn test_child_tags() {
        let a = ElementTag("a");
        let b = ElementTag("b");
        let schema = Schema::OneOf(vec![
            Schema::dict([DictField::new("x", a)]),
            Schema::List(b),
        ]);
        assert_eq!(schema.child_tags(), vec![a, b]);
    }
}
