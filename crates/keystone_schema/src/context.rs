//! Parse tree construction.
//!
//! The [`Context`] walks a document value against a root element's schema
//! and instantiates one [`ElementNode`] per schema-declared position. Nodes
//! live in an arena; parent links are arena indices, so ancestor search is
//! an iterative index walk. Building also populates an index from element
//! tag to all its instances, used by graph construction and requirement
//! resolution.

use crate::element::{ElementTag, Registry};
use crate::schema::Schema;
use indexmap::IndexMap;
use keystone_core::{CompileResult, ValueMap};
use serde_json::Value;

/// One instance of an element type, owning one document node.
#[derive(Debug)]
pub struct ElementNode {
    /// Arena index of this node
    pub index: usize,
    /// Element type identity
    pub tag: ElementTag,
    /// Local name: the document key, or the sequence index as a string
    pub name: String,
    /// Immutable snapshot of the document fragment; `None` when the key
    /// was absent in the parent mapping
    pub raw: Option<Value>,
    /// Parent arena index; `None` only for the root
    pub parent: Option<usize>,
    /// Child arena indices, in discovery order
    pub children: Vec<usize>,
    /// Chosen `OneOf` alternative, when the schema has alternatives
    pub alternative: Option<usize>,
    /// Final value; written exactly once by the scheduler
    pub parsed: Option<Value>,
    /// Published values; written exactly once by the scheduler
    pub provided: Option<ValueMap>,
}

/// The parse tree: an arena of element instances plus a per-tag index.
#[derive(Debug)]
pub struct Context {
    nodes: Vec<ElementNode>,
    by_tag: IndexMap<ElementTag, Vec<usize>>,
}

impl Context {
    /// Build the tree for `document` rooted at the `root` element type.
    ///
    /// Children of a node whose own raw value is not of the expected
    /// container shape are not visited; later structural validation reports
    /// the shape mismatch at that node instead of spurious missing-child
    /// errors.
    ///
    /// # Errors
    ///
    /// Returns a schema-API error if a referenced element type is missing
    /// from the registry.
    pub fn build(registry: &Registry, root: ElementTag, document: Value) -> CompileResult<Self> {
        let mut context = Self {
            nodes: Vec::new(),
            by_tag: IndexMap::new(),
        };
        let root_name = root.0.to_string();
        context.build_node(registry, root, root_name, Some(document), None)?;
        Ok(context)
    }

    fn build_node(
        &mut self,
        registry: &Registry,
        tag: ElementTag,
        name: String,
        raw: Option<Value>,
        parent: Option<usize>,
    ) -> CompileResult<usize> {
        let ty = registry.get(tag)?;

        let alternative = match (&ty.schema, raw.as_ref()) {
            (Schema::OneOf(alternatives), Some(value)) => alternatives
                .iter()
                .position(|schema| schema.shape_matches(value)),
            _ => None,
        };

        let index = self.nodes.len();
        self.nodes.push(ElementNode {
            index,
            tag,
            name,
            raw,
            parent,
            children: Vec::new(),
            alternative,
            parsed: None,
            provided: None,
        });
        self.by_tag.entry(tag).or_default().push(index);

        let schema = match (&ty.schema, alternative) {
            (Schema::OneOf(alternatives), Some(i)) => &alternatives[i],
            (schema, _) => schema,
        };

        match schema {
            Schema::Scalar(_) | Schema::OneOf(_) => {}
            Schema::Dict(fields) => {
                // Only declared keys are visited; a missing key becomes a
                // child with an absent value.
                if let Some(Value::Object(map)) = self.nodes[index].raw.clone().as_ref() {
                    for field in fields {
                        let child_raw = map.get(field.key).cloned();
                        let child = self.build_node(
                            registry,
                            field.element,
                            field.key.to_string(),
                            child_raw,
                            Some(index),
                        )?;
                        self.nodes[index].children.push(child);
                    }
                }
            }
            Schema::Map(child_tag) => {
                let child_tag = *child_tag;
                if let Some(Value::Object(map)) = self.nodes[index].raw.clone().as_ref() {
                    for (key, value) in map {
                        let child = self.build_node(
                            registry,
                            child_tag,
                            key.clone(),
                            Some(value.clone()),
                            Some(index),
                        )?;
                        self.nodes[index].children.push(child);
                    }
                }
            }
            Schema::List(child_tag) => {
                let child_tag = *child_tag;
                if let Some(Value::Array(items)) = self.nodes[index].raw.clone().as_ref() {
                    for (position, value) in items.iter().enumerate() {
                        let child = self.build_node(
                            registry,
                            child_tag,
                            position.to_string(),
                            Some(value.clone()),
                            Some(index),
                        )?;
                        self.nodes[index].children.push(child);
                    }
                }
            }
        }

        Ok(index)
    }

    /// Node by arena index.
    #[must_use]
    pub fn node(&self, index: usize) -> &ElementNode {
        &self.nodes[index]
    }

    /// The root node.
    #[must_use]
    pub fn root(&self) -> &ElementNode {
        &self.nodes[0]
    }

    /// All nodes, in discovery order.
    #[must_use]
    pub fn nodes(&self) -> &[ElementNode] {
        &self.nodes
    }

    /// Number of instances.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the tree is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Arena indices of every instance of `tag`, in discovery order.
    #[must_use]
    pub fn instances(&self, tag: ElementTag) -> &[usize] {
        self.by_tag.get(&tag).map_or(&[], Vec::as_slice)
    }

    /// Parent node of `index`, if any.
    #[must_use]
    pub fn parent_of(&self, index: usize) -> Option<&ElementNode> {
        self.nodes[index].parent.map(|p| &self.nodes[p])
    }

    /// Dotted path of `index` for diagnostics; the root is elided.
    #[must_use]
    pub fn path(&self, index: usize) -> String {
        let mut segments = Vec::new();
        let mut current = Some(index);
        while let Some(i) = current {
            let node = &self.nodes[i];
            if node.parent.is_some() {
                segments.push(node.name.as_str());
            }
            current = node.parent;
        }
        if segments.is_empty() {
            return self.nodes[index].name.clone();
        }
        segments.reverse();
        segments.join(".")
    }

    /// Record a node's final value. Slots are write-once.
    pub fn set_parsed(&mut self, index: usize, value: Value) {
        debug_assert!(self.nodes[index].parsed.is_none(), "parsed set twice");
        self.nodes[index].parsed = Some(value);
    }

    /// Record a node's published values. Slots are write-once.
    pub fn set_provided(&mut self, index: usize, values: ValueMap) {
        debug_assert!(self.nodes[index].provided.is_none(), "provided set twice");
        self.nodes[index].provided = Some(values);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::ElementType;
    use crate::schema::{DictField, ScalarKind};
    use serde_json::json;

    const ROOT: ElementTag = ElementTag("root");
    const ENTRY: ElementTag = ElementTag("entry");
    const NAME: ElementTag = ElementTag("name");

    fn registry() -> Registry {
        let mut registry = Registry::new();
        registry
            .define(ElementType::new(
                ROOT,
                Schema::dict([DictField::new("entries", ENTRY)]),
            ))
            .unwrap();
        registry
            .define(ElementType::new(ENTRY, Schema::Map(NAME)))
            .unwrap();
        registry
            .define(ElementType::new(NAME, Schema::Scalar(ScalarKind::String)))
            .unwrap();
        registry.validate().unwrap();
        registry
    }

    #[test]
    fn test_build_visits_declared_keys_only() {
        let doc = json!({"entries": {"a": "x", "b": "y"}, "junk": 1});
        let context = Context::build(&registry(), ROOT, doc).unwrap();

        // root + entries + two names; "junk" is not a declared key
        assert_eq!(context.len(), 4);
        assert_eq!(context.instances(NAME).len(), 2);

        let entries = context.node(context.root().children[0]);
        assert_eq!(entries.name, "entries");
        assert_eq!(entries.children.len(), 2);
    }

    #[test]
    fn test_missing_key_becomes_absent_child() {
        let context = Context::build(&registry(), ROOT, json!({})).unwrap();
        assert_eq!(context.len(), 2);
        let entries = context.node(context.root().children[0]);
        assert!(entries.raw.is_none());
        assert!(entries.children.is_empty());
    }

    #[test]
    fn test_wrong_shape_skips_children() {
        // entries is a string, not a mapping: no name children are built
        let context =
            Context::build(&registry(), ROOT, json!({"entries": "oops"})).unwrap();
        assert_eq!(context.instances(NAME).len(), 0);
        let entries = context.node(context.root().children[0]);
        assert_eq!(entries.raw, Some(json!("oops")));
    }

    #[test]
    fn test_paths() {
        let doc = json!({"entries": {"a": "x"}});
        let context = Context::build(&registry(), ROOT, doc).unwrap();
        let name_idx = context.instances(NAME)[0];
        assert_eq!(context.path(name_idx), "entries.a");
        assert_eq!(context.path(0), "root");
    }
}
