//! Element types, behaviors, and the type registry.
//!
//! An [`ElementType`] is a static descriptor for one kind of document node:
//! the shape it accepts, whether it is required, which other elements it
//! depends on, and which named values it publishes for dependents. The
//! [`Registry`] maps stable [`ElementTag`]s to descriptors and validates
//! every cross-reference between them at registration time; a dangling tag
//! is a schema-API error, not a document error.

use crate::context::{Context, ElementNode};
use crate::requirements::{RequirementGroup, RequirementSource, ResolvedRequirements, Resolution};
use crate::schema::Schema;
use indexmap::IndexMap;
use keystone_core::{CompileError, CompileResult, ValueMap};
use serde_json::Value;

/// Stable identity of an element type.
///
/// Tags are interned strings; two tags are the same type iff the strings
/// are equal. Requirement groups key off tags instead of introspecting a
/// type hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementTag(pub &'static str);

impl std::fmt::Display for ElementTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.0)
    }
}

/// Handler logic attached to an element type.
///
/// All three hooks see an [`EvalContext`] giving the instance's raw value,
/// its children's parsed values, and the resolved values of every declared
/// requirement. Defaults: no extra validation, schema-directed parse, no
/// provided values.
pub trait Behavior: Send + Sync {
    /// Handler-specific validation, run after structural validation.
    ///
    /// # Errors
    ///
    /// Returns a domain-specific error when the instance is invalid.
    fn validate(&self, cx: &EvalContext<'_>) -> CompileResult<()> {
        let _ = cx;
        Ok(())
    }

    /// Compute the instance's final value.
    ///
    /// # Errors
    ///
    /// Returns an error when the value cannot be computed.
    fn parse(&self, cx: &EvalContext<'_>) -> CompileResult<Value> {
        cx.default_parse()
    }

    /// Compute the named values this instance publishes for dependents.
    ///
    /// # Errors
    ///
    /// Returns an error when a published value cannot be computed.
    fn provide(&self, cx: &EvalContext<'_>) -> CompileResult<ValueMap> {
        let _ = cx;
        Ok(ValueMap::new())
    }
}

/// The default behavior: schema-directed parse, nothing provided.
pub struct DefaultBehavior;

impl Behavior for DefaultBehavior {}

/// Static descriptor of one element type.
pub struct ElementType {
    /// Stable identity
    pub tag: ElementTag,
    /// Accepted input shape
    pub schema: Schema,
    /// Whether the owning key must be present in the parent mapping
    pub required: bool,
    /// Declared dependencies on other element types (or pass inputs)
    pub requires: Vec<RequirementGroup>,
    /// Names this element publishes via [`Behavior::provide`]
    pub provides: Vec<&'static str>,
    /// Handler logic
    pub behavior: Box<dyn Behavior>,
}

impl ElementType {
    /// Create a new optional element type with the default behavior.
    #[must_use]
    pub fn new(tag: ElementTag, schema: Schema) -> Self {
        Self {
            tag,
            schema,
            required: false,
            requires: Vec::new(),
            provides: Vec::new(),
            behavior: Box::new(DefaultBehavior),
        }
    }

    /// Mark the element as required in its parent mapping.
    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Add a requirement group.
    #[must_use]
    pub fn requires(mut self, group: RequirementGroup) -> Self {
        self.requires.push(group);
        self
    }

    /// Declare published value names.
    #[must_use]
    pub fn provides<const N: usize>(mut self, names: [&'static str; N]) -> Self {
        self.provides = names.to_vec();
        self
    }

    /// Attach handler logic.
    #[must_use]
    pub fn behavior(mut self, behavior: impl Behavior + 'static) -> Self {
        self.behavior = Box::new(behavior);
        self
    }

    /// The schema actually in effect for `node` (resolves a chosen
    /// [`Schema::OneOf`] alternative).
    #[must_use]
    pub fn effective_schema(&self, node: &ElementNode) -> &Schema {
        match (&self.schema, node.alternative) {
            (Schema::OneOf(alternatives), Some(i)) => &alternatives[i],
            (schema, _) => schema,
        }
    }
}

/// Registry of element types, keyed by tag.
pub struct Registry {
    types: IndexMap<ElementTag, ElementType>,
}

impl Registry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            types: IndexMap::new(),
        }
    }

    /// Register an element type.
    ///
    /// # Errors
    ///
    /// Returns a schema-API error if the tag is already registered.
    pub fn define(&mut self, ty: ElementType) -> CompileResult<()> {
        if self.types.contains_key(&ty.tag) {
            return Err(CompileError::SchemaApi {
                reason: format!("element type '{}' registered twice", ty.tag),
            });
        }
        self.types.insert(ty.tag, ty);
        Ok(())
    }

    /// Look up an element type.
    ///
    /// # Errors
    ///
    /// Returns a schema-API error if the tag is unknown.
    pub fn get(&self, tag: ElementTag) -> CompileResult<&ElementType> {
        self.types.get(&tag).ok_or_else(|| CompileError::SchemaApi {
            reason: format!("unknown element type '{}'", tag),
        })
    }

    /// Validate every cross-reference between registered types.
    ///
    /// Checks that schemas only reference registered tags, that requirement
    /// groups point at registered tags, that requirement names are unique
    /// per element, and that a provided-value requirement names something
    /// its provider declares.
    ///
    /// # Errors
    ///
    /// Returns a schema-API error naming the first broken declaration.
    pub fn validate(&self) -> CompileResult<()> {
        for ty in self.types.values() {
            for child in ty.schema.child_tags() {
                if !self.types.contains_key(&child) {
                    return Err(CompileError::SchemaApi {
                        reason: format!("'{}' references unknown element '{}'", ty.tag, child),
                    });
                }
            }
            if let Schema::OneOf(alternatives) = &ty.schema {
                if alternatives.is_empty() {
                    return Err(CompileError::SchemaApi {
                        reason: format!("'{}' declares an empty alternative list", ty.tag),
                    });
                }
            }

            let mut seen = Vec::new();
            for group in &ty.requires {
                let provider = match group.source {
                    RequirementSource::Element(tag) => {
                        Some(self.types.get(&tag).ok_or_else(|| CompileError::SchemaApi {
                            reason: format!("'{}' requires unknown element '{}'", ty.tag, tag),
                        })?)
                    }
                    RequirementSource::PassInputs => None,
                };
                for spec in &group.specs {
                    if seen.contains(&spec.name) {
                        return Err(CompileError::SchemaApi {
                            reason: format!("'{}' declares requirement '{}' twice", ty.tag, spec.name),
                        });
                    }
                    seen.push(spec.name);
                    if let Some(provider) = provider {
                        if !spec.parsed && !provider.provides.contains(&spec.name) {
                            return Err(CompileError::SchemaApi {
                                reason: format!(
                                    "'{}' requires '{}' which '{}' does not provide",
                                    ty.tag, spec.name, provider.tag
                                ),
                            });
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Number of registered types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

/// Borrowed view handed to behavior hooks: one instance plus everything it
/// is allowed to see.
pub struct EvalContext<'a> {
    context: &'a Context,
    registry: &'a Registry,
    index: usize,
    requirements: &'a ResolvedRequirements,
}

impl<'a> EvalContext<'a> {
    /// Create a view for `index`.
    #[must_use]
    pub fn new(
        context: &'a Context,
        registry: &'a Registry,
        index: usize,
        requirements: &'a ResolvedRequirements,
    ) -> Self {
        Self {
            context,
            registry,
            index,
            requirements,
        }
    }

    /// The instance under evaluation.
    #[must_use]
    pub fn node(&self) -> &ElementNode {
        self.context.node(self.index)
    }

    /// The whole parse tree.
    #[must_use]
    pub fn tree(&self) -> &Context {
        self.context
    }

    /// Local name of the instance (its document key or sequence index).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.node().name
    }

    /// Dotted path of the instance, for diagnostics.
    #[must_use]
    pub fn path(&self) -> String {
        self.context.path(self.index)
    }

    /// Raw document fragment bound to this instance, if the key was present.
    #[must_use]
    pub fn raw(&self) -> Option<&Value> {
        self.node().raw.as_ref()
    }

    /// Child instances, in discovery order.
    pub fn children(&self) -> impl Iterator<Item = &ElementNode> {
        self.node()
            .children
            .iter()
            .map(|&i| self.context.node(i))
    }

    /// Child instance by local name.
    #[must_use]
    pub fn child(&self, name: &str) -> Option<&ElementNode> {
        self.children().find(|c| c.name == name)
    }

    /// A child's parsed value, `None` when the child is absent or parsed
    /// to null.
    #[must_use]
    pub fn child_parsed(&self, name: &str) -> Option<&Value> {
        self.child(name)
            .and_then(|c| c.parsed.as_ref())
            .filter(|v| !v.is_null())
    }

    /// A resolved requirement by name.
    #[must_use]
    pub fn requirement(&self, name: &str) -> Option<&Resolution> {
        self.requirements.get(name)
    }

    /// A single-valued requirement's value, `None` when absent.
    #[must_use]
    pub fn req_value(&self, name: &str) -> Option<&Value> {
        match self.requirement(name)? {
            Resolution::Value(v) => Some(v),
            _ => None,
        }
    }

    /// A multi-valued requirement's present values.
    #[must_use]
    pub fn req_values(&self, name: &str) -> Vec<&Value> {
        match self.requirement(name) {
            Some(Resolution::List(items)) => items
                .iter()
                .filter_map(|r| match r {
                    Resolution::Value(v) => Some(v),
                    _ => None,
                })
                .collect(),
            Some(Resolution::Value(v)) => vec![v],
            _ => Vec::new(),
        }
    }

    /// Schema-directed default parse of this instance.
    ///
    /// Scalars pass their raw value through unchanged; mapping shapes parse
    /// to the mapping of their children's parsed values (nulls omitted);
    /// sequences parse to the sequence of their children's parsed values.
    ///
    /// # Errors
    ///
    /// Returns a schema-API error if the element's type is not registered.
    pub fn default_parse(&self) -> CompileResult<Value> {
        let node = self.node();
        let Some(raw) = node.raw.as_ref() else {
            return Ok(Value::Null);
        };
        let ty = self.registry.get(node.tag)?;
        match ty.effective_schema(node) {
            Schema::Scalar(_) | Schema::OneOf(_) => Ok(raw.clone()),
            Schema::Dict(_) | Schema::Map(_) => {
                let mut out = ValueMap::new();
                for child in self.children() {
                    if let Some(parsed) = child.parsed.as_ref() {
                        if !parsed.is_null() {
                            out.insert(child.name.clone(), parsed.clone());
                        }
                    }
                }
                Ok(Value::Object(out))
            }
            Schema::List(_) => {
                let items = self
                    .children()
                    .map(|c| c.parsed.clone().unwrap_or(Value::Null))
                    .collect();
                Ok(Value::Array(items))
            }
        }
    }
}
