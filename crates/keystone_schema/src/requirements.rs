//! Requirement declaration and resolution.
//!
//! A requirement group names a dependency element type (or the sentinel
//! "current pass inputs") and a list of named specs. `parsed = true` asks
//! for the dependency's final parsed value; `parsed = false` asks for one
//! of its published values. A predicate filters which dependency instances
//! are relevant for a given dependent.
//!
//! Outcomes are tagged [`Resolution`] variants rather than errors, so the
//! scheduler can tell "optional and absent" from "required and missing"
//! without control flow as error signaling.

use crate::context::Context;
use crate::element::{ElementTag, Registry};
use indexmap::IndexMap;
use keystone_core::{CompileError, CompileResult, ValueMap};
use serde_json::Value;

/// Predicate over `(dependent, candidate)` arena indices.
pub type Predicate = Box<dyn Fn(&Context, usize, usize) -> bool + Send + Sync>;

/// What a requirement group draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequirementSource {
    /// All instances of another element type
    Element(ElementTag),
    /// The caller-supplied pass input mapping
    PassInputs,
}

/// One named requirement.
pub struct RequirementSpec {
    /// Name the resolved value is delivered under; for provided-value
    /// requirements, also the published name looked up on the dependency
    pub name: &'static str,
    /// Fail the pass when no candidate matches
    pub required: bool,
    /// `true`: deliver the dependency's parsed value; `false`: deliver its
    /// published value of this name
    pub parsed: bool,
    /// Deliver every matching candidate instead of exactly one
    pub multiple: bool,
    /// Keep only candidates the predicate accepts
    pub predicate: Option<Predicate>,
}

impl RequirementSpec {
    /// Require the dependency's parsed value, delivered under `name`.
    #[must_use]
    pub fn parsed(name: &'static str) -> Self {
        Self {
            name,
            required: true,
            parsed: true,
            multiple: false,
            predicate: None,
        }
    }

    /// Require the dependency's published value named `name`.
    #[must_use]
    pub fn provided(name: &'static str) -> Self {
        Self {
            name,
            required: true,
            parsed: false,
            multiple: false,
            predicate: None,
        }
    }

    /// Do not fail when no candidate matches.
    #[must_use]
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    /// Deliver all matching candidates.
    #[must_use]
    pub fn multiple(mut self) -> Self {
        self.multiple = true;
        self
    }

    /// Keep only candidates accepted by `predicate`.
    #[must_use]
    pub fn filtered(
        mut self,
        predicate: impl Fn(&Context, usize, usize) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.predicate = Some(Box::new(predicate));
        self
    }
}

/// A group of requirements against one source.
pub struct RequirementGroup {
    /// The dependency source
    pub source: RequirementSource,
    /// Named requirements against it
    pub specs: Vec<RequirementSpec>,
}

impl RequirementGroup {
    /// Requirements against all instances of `tag`.
    #[must_use]
    pub fn on_element(tag: ElementTag, specs: Vec<RequirementSpec>) -> Self {
        Self {
            source: RequirementSource::Element(tag),
            specs,
        }
    }

    /// Requirements against the caller-supplied pass inputs.
    #[must_use]
    pub fn on_inputs(specs: Vec<RequirementSpec>) -> Self {
        Self {
            source: RequirementSource::PassInputs,
            specs,
        }
    }
}

/// Outcome of resolving one requirement.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// Exactly one value
    Value(Value),
    /// Optional requirement with no matching candidate
    Absent,
    /// All matching candidates, for `multiple` requirements
    List(Vec<Resolution>),
}

impl Resolution {
    /// The value, when exactly one is present.
    #[must_use]
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Value(v) => Some(v),
            _ => None,
        }
    }
}

/// All resolved requirements of one instance, by name.
#[derive(Debug, Default)]
pub struct ResolvedRequirements(IndexMap<&'static str, Resolution>);

impl ResolvedRequirements {
    /// A resolution by requirement name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Resolution> {
        self.0.get(name)
    }

    /// Number of resolved requirements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether nothing was required.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Resolve every requirement of the instance at `index`.
///
/// Topological evaluation order guarantees every candidate instance has
/// already been parsed and has published its values.
///
/// Cardinality rules: a required requirement with zero candidates fails; a
/// single-valued requirement with two or more candidates fails; an optional
/// single-valued requirement with zero candidates resolves to
/// [`Resolution::Absent`]. An optional `multiple` requirement with zero
/// candidates resolves to a one-element list holding an absent value - a
/// long-standing asymmetry with the single-valued path, preserved
/// deliberately.
///
/// # Errors
///
/// Returns [`CompileError::MissingRequirement`] or
/// [`CompileError::AmbiguousRequirement`] on cardinality violations, and a
/// schema-API error if a dependency failed to publish a declared name.
pub fn resolve_for(
    context: &Context,
    registry: &Registry,
    inputs: &ValueMap,
    index: usize,
) -> CompileResult<ResolvedRequirements> {
    let ty = registry.get(context.node(index).tag)?;
    let mut resolved = IndexMap::new();

    for group in &ty.requires {
        match group.source {
            RequirementSource::PassInputs => {
                for spec in &group.specs {
                    let resolution = match inputs.get(spec.name) {
                        Some(value) => Resolution::Value(value.clone()),
                        None if spec.required => {
                            return Err(CompileError::MissingRequirement {
                                element: context.path(index),
                                requirement: spec.name.to_string(),
                            });
                        }
                        None => Resolution::Absent,
                    };
                    resolved.insert(spec.name, resolution);
                }
            }
            RequirementSource::Element(tag) => {
                for spec in &group.specs {
                    let resolution = resolve_spec(context, tag, index, spec)?;
                    resolved.insert(spec.name, resolution);
                }
            }
        }
    }

    Ok(ResolvedRequirements(resolved))
}

fn resolve_spec(
    context: &Context,
    tag: ElementTag,
    index: usize,
    spec: &RequirementSpec,
) -> CompileResult<Resolution> {
    let mut values = Vec::new();
    for &candidate in context.instances(tag) {
        if candidate == index {
            continue;
        }
        if let Some(predicate) = &spec.predicate {
            if !predicate(context, index, candidate) {
                continue;
            }
        }
        values.push(candidate_value(context, candidate, spec)?);
    }

    if values.is_empty() && spec.required {
        return Err(CompileError::MissingRequirement {
            element: context.path(index),
            requirement: spec.name.to_string(),
        });
    }

    if spec.multiple {
        if values.is_empty() {
            // Optional multi-valued requirements resolve to [absent], not
            // []; see module docs.
            return Ok(Resolution::List(vec![Resolution::Absent]));
        }
        return Ok(Resolution::List(
            values.into_iter().map(Resolution::Value).collect(),
        ));
    }

    match values.len() {
        0 => Ok(Resolution::Absent),
        1 => Ok(Resolution::Value(values.remove(0))),
        _ => Err(CompileError::AmbiguousRequirement {
            element: context.path(index),
            requirement: spec.name.to_string(),
        }),
    }
}

fn candidate_value(
    context: &Context,
    candidate: usize,
    spec: &RequirementSpec,
) -> CompileResult<Value> {
    let node = context.node(candidate);
    if spec.parsed {
        return Ok(node.parsed.clone().unwrap_or(Value::Null));
    }
    node.provided
        .as_ref()
        .and_then(|provided| provided.get(spec.name))
        .cloned()
        .ok_or_else(|| CompileError::SchemaApi {
            reason: format!(
                "'{}' did not publish declared value '{}'",
                context.path(candidate),
                spec.name
            ),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolution_as_value() {
        let r = Resolution::Value(Value::from(1));
        assert_eq!(r.as_value(), Some(&Value::from(1)));
        assert_eq!(Resolution::Absent.as_value(), None);
    }

    #[test]
    fn test_spec_builders() {
        let spec = RequirementSpec::parsed("x").optional().multiple();
        assert!(spec.parsed);
        assert!(!spec.required);
        assert!(spec.multiple);

        let spec = RequirementSpec::provided("y");
        assert!(!spec.parsed);
        assert!(spec.required);
        assert!(!spec.multiple);
    }
}
