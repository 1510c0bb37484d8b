//! Topological evaluation of the parse tree.
//!
//! Every instance passes through `unvisited -> validated -> parsed ->
//! exposed` exactly once, in full topological order of the reversed
//! dependency graph. Per instance: resolve requirements, structural
//! validation, handler validation, parse, expose. The first failure aborts
//! the whole pass; there is no partial output.

use crate::context::Context;
use crate::element::{ElementTag, EvalContext, Registry};
use crate::graph::DependencyGraph;
use crate::requirements::resolve_for;
use crate::schema::{Schema, actual_name};
use keystone_core::{CompileError, CompileResult, ValueMap};

/// Knobs for one resolution pass.
pub struct ResolveOptions {
    /// Reject mapping keys not declared in the schema
    pub strict: bool,
    /// Caller-supplied values backing pass-input requirements
    pub inputs: ValueMap,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            strict: true,
            inputs: ValueMap::new(),
        }
    }
}

/// Run one full resolution pass over `document`.
///
/// Returns the fully evaluated parse tree: every instance carries its
/// parsed value and its published values.
///
/// # Errors
///
/// Returns the first validation, parse, or cycle failure; nothing is
/// returned on failure.
pub fn resolve(
    registry: &Registry,
    root: ElementTag,
    document: serde_json::Value,
    options: &ResolveOptions,
) -> CompileResult<Context> {
    registry.validate()?;

    let mut context = Context::build(registry, root, document)?;
    let graph = DependencyGraph::build(&context, registry)?;
    let order = graph.evaluation_order(&context)?;
    tracing::debug!(instances = context.len(), "evaluation order computed");

    for &index in &order {
        let requirements = resolve_for(&context, registry, &options.inputs, index)?;
        structural_validate(&context, registry, index, options.strict)?;

        let ty = registry.get(context.node(index).tag)?;
        let parsed = {
            let cx = EvalContext::new(&context, registry, index, &requirements);
            ty.behavior.validate(&cx)?;
            ty.behavior.parse(&cx)?
        };
        context.set_parsed(index, parsed);

        let provided = {
            let cx = EvalContext::new(&context, registry, index, &requirements);
            ty.behavior.provide(&cx)?
        };
        context.set_provided(index, provided);
    }

    Ok(context)
}

/// Verify the instance's raw value against its declared shape.
fn structural_validate(
    context: &Context,
    registry: &Registry,
    index: usize,
    strict: bool,
) -> CompileResult<()> {
    let node = context.node(index);
    let ty = registry.get(node.tag)?;

    let Some(raw) = node.raw.as_ref() else {
        if ty.required {
            let owner = node
                .parent
                .map_or_else(|| node.name.clone(), |p| context.path(p));
            return Err(CompileError::MissingRequiredField {
                element: owner,
                field: node.name.clone(),
            });
        }
        return Ok(());
    };

    if matches!(ty.schema, Schema::OneOf(_)) && node.alternative.is_none() {
        return Err(CompileError::NoMatchingAlternative {
            element: context.path(index),
        });
    }

    let schema = ty.effective_schema(node);
    match schema {
        Schema::Scalar(kind) => {
            if !kind.matches(raw) {
                return Err(CompileError::UnexpectedType {
                    element: context.path(index),
                    expected: kind.name().to_string(),
                    actual: actual_name(raw).to_string(),
                });
            }
        }
        Schema::Dict(fields) => {
            let Some(map) = raw.as_object() else {
                return Err(CompileError::UnexpectedType {
                    element: context.path(index),
                    expected: "mapping".to_string(),
                    actual: actual_name(raw).to_string(),
                });
            };
            if strict {
                for key in map.keys() {
                    if !fields.iter().any(|f| f.key == key) {
                        return Err(CompileError::UndeclaredField {
                            element: context.path(index),
                            field: key.clone(),
                        });
                    }
                }
            }
        }
        Schema::Map(_) => {
            if !raw.is_object() {
                return Err(CompileError::UnexpectedType {
                    element: context.path(index),
                    expected: "mapping".to_string(),
                    actual: actual_name(raw).to_string(),
                });
            }
        }
        Schema::List(_) => {
            if !raw.is_array() {
                return Err(CompileError::UnexpectedType {
                    element: context.path(index),
                    expected: "sequence".to_string(),
                    actual: actual_name(raw).to_string(),
                });
            }
        }
        Schema::OneOf(_) => {}
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{Behavior, ElementType};
    use crate::requirements::{RequirementGroup, RequirementSpec, Resolution};
    use crate::schema::{DictField, ScalarKind};
    use keystone_core::ValueMap;
    use serde_json::{Value, json};

    const ROOT: ElementTag = ElementTag("root");
    const TYPES: ElementTag = ElementTag("types");
    const TYPE: ElementTag = ElementTag("type");
    const FLAG: ElementTag = ElementTag("flag");

    /// Candidate is the type the dependent derives from.
    fn derived_from(context: &Context, dependent: usize, candidate: usize) -> bool {
        let wanted = context
            .node(dependent)
            .raw
            .as_ref()
            .and_then(|v| v.get("derived_from"))
            .and_then(Value::as_str);
        wanted == Some(context.node(candidate).name.as_str())
    }

    /// A miniature type element: provides its ancestor chain.
    struct TypeBehavior;

    impl Behavior for TypeBehavior {
        fn provide(&self, cx: &EvalContext<'_>) -> CompileResult<ValueMap> {
            let mut chain = match cx.requirement("chain") {
                Some(Resolution::Value(Value::Array(parent))) => parent.clone(),
                _ => Vec::new(),
            };
            chain.push(Value::String(cx.name().to_string()));
            let mut provided = ValueMap::new();
            provided.insert("chain".to_string(), Value::Array(chain));
            Ok(provided)
        }
    }

    /// Pass-input echo: parses to the value of the `verbose` input.
    struct FlagBehavior;

    impl Behavior for FlagBehavior {
        fn parse(&self, cx: &EvalContext<'_>) -> CompileResult<Value> {
            Ok(cx.req_value("verbose").cloned().unwrap_or(Value::Null))
        }
    }

    fn registry() -> Registry {
        let mut registry = Registry::new();
        registry
            .define(ElementType::new(
                ROOT,
                Schema::dict([DictField::new("types", TYPES), DictField::new("flag", FLAG)]),
            ))
            .unwrap();
        registry
            .define(ElementType::new(TYPES, Schema::Map(TYPE)))
            .unwrap();
        registry
            .define(
                ElementType::new(TYPE, Schema::Scalar(ScalarKind::Mapping))
                    .requires(RequirementGroup::on_element(
                        TYPE,
                        vec![
                            RequirementSpec::provided("chain")
                                .optional()
                                .filtered(derived_from),
                        ],
                    ))
                    .provides(["chain"])
                    .behavior(TypeBehavior),
            )
            .unwrap();
        registry
            .define(
                ElementType::new(FLAG, Schema::Scalar(ScalarKind::Any))
                    .requires(RequirementGroup::on_inputs(vec![
                        RequirementSpec::parsed("verbose").optional(),
                    ]))
                    .behavior(FlagBehavior),
            )
            .unwrap();
        registry.validate().unwrap();
        registry
    }

    fn chain_of(context: &Context, name: &str) -> Vec<String> {
        let index = context
            .instances(TYPE)
            .iter()
            .copied()
            .find(|&i| context.node(i).name == name)
            .unwrap();
        context.node(index).provided.as_ref().unwrap()["chain"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap().to_string())
            .collect()
    }

    #[test]
    fn test_chain_resolution_is_order_independent() {
        // child listed before parent: the dependency graph reorders
        let doc = json!({"types": {
            "a": {"derived_from": "b"},
            "b": {"derived_from": "c"},
            "c": {},
        }});
        let context = resolve(&registry(), ROOT, doc, &ResolveOptions::default()).unwrap();
        assert_eq!(chain_of(&context, "a"), vec!["c", "b", "a"]);
        assert_eq!(chain_of(&context, "c"), vec!["c"]);
    }

    #[test]
    fn test_cycle_reports_participants_with_closing_repeat() {
        let doc = json!({"types": {
            "a": {"derived_from": "b"},
            "b": {"derived_from": "a"},
        }});
        let err = resolve(&registry(), ROOT, doc, &ResolveOptions::default()).unwrap_err();
        assert_eq!(err.code(), 401);
        let CompileError::DependencyCycle { names } = err else {
            panic!("expected cycle");
        };
        assert_eq!(names, vec!["a", "b", "a"]);
    }

    #[test]
    fn test_self_cycle_of_length_one() {
        let doc = json!({"types": {"a": {"derived_from": "a"}}});
        let err = resolve(&registry(), ROOT, doc, &ResolveOptions::default()).unwrap_err();
        let CompileError::DependencyCycle { names } = err else {
            panic!("expected cycle");
        };
        assert_eq!(names, vec!["a", "a"]);
    }

    #[test]
    fn test_strict_rejects_undeclared_key() {
        let doc = json!({"types": {}, "bogus": 1});
        let err = resolve(&registry(), ROOT, doc, &ResolveOptions::default()).unwrap_err();
        assert_eq!(err.code(), 203);

        let options = ResolveOptions {
            strict: false,
            ..Default::default()
        };
        resolve(&registry(), ROOT, json!({"types": {}, "bogus": 1}), &options).unwrap();
    }

    #[test]
    fn test_scalar_kind_mismatch() {
        let doc = json!({"types": {"a": "not-a-mapping"}});
        let err = resolve(&registry(), ROOT, doc, &ResolveOptions::default()).unwrap_err();
        assert_eq!(err.code(), 201);
        assert_eq!(err.element(), Some("types.a"));
    }

    #[test]
    fn test_pass_inputs_reach_handlers() {
        let mut inputs = ValueMap::new();
        inputs.insert("verbose".to_string(), json!(true));
        let options = ResolveOptions {
            strict: true,
            inputs,
        };
        let context = resolve(&registry(), ROOT, json!({"flag": 1}), &options).unwrap();
        let flag = context.instances(FLAG)[0];
        assert_eq!(context.node(flag).parsed, Some(json!(true)));
    }

    #[test]
    fn test_optional_multiple_resolves_to_absent_list() {
        // The preserved asymmetry: multiple + optional + no candidates
        // resolves to [absent], not [].
        const LONER: ElementTag = ElementTag("loner");
        const PEER: ElementTag = ElementTag("peer");

        struct LonerBehavior;
        impl Behavior for LonerBehavior {
            fn parse(&self, cx: &EvalContext<'_>) -> CompileResult<Value> {
                let Some(Resolution::List(items)) = cx.requirement("peers") else {
                    panic!("expected list resolution");
                };
                assert_eq!(items, &vec![Resolution::Absent]);
                Ok(Value::Null)
            }
        }

        let mut registry = Registry::new();
        registry
            .define(ElementType::new(
                ROOT,
                Schema::dict([DictField::new("loner", LONER)]),
            ))
            .unwrap();
        registry
            .define(
                ElementType::new(LONER, Schema::Scalar(ScalarKind::Any))
                    .requires(RequirementGroup::on_element(
                        PEER,
                        vec![RequirementSpec::parsed("peers").optional().multiple()],
                    ))
                    .behavior(LonerBehavior),
            )
            .unwrap();
        registry
            .define(ElementType::new(PEER, Schema::Scalar(ScalarKind::Any)))
            .unwrap();
        registry.validate().unwrap();

        resolve(&registry, ROOT, json!({"loner": 1}), &ResolveOptions::default()).unwrap();
    }

    #[test]
    fn test_required_requirement_missing_fails() {
        const NEEDY: ElementTag = ElementTag("needy");
        const PEER: ElementTag = ElementTag("peer");

        let mut registry = Registry::new();
        registry
            .define(ElementType::new(
                ROOT,
                Schema::dict([DictField::new("needy", NEEDY)]),
            ))
            .unwrap();
        registry
            .define(
                ElementType::new(NEEDY, Schema::Scalar(ScalarKind::Any)).requires(
                    RequirementGroup::on_element(PEER, vec![RequirementSpec::parsed("peer")]),
                ),
            )
            .unwrap();
        registry
            .define(ElementType::new(PEER, Schema::Scalar(ScalarKind::Any)))
            .unwrap();
        registry.validate().unwrap();

        let err = resolve(
            &registry,
            ROOT,
            json!({"needy": 1}),
            &ResolveOptions::default(),
        )
        .unwrap_err();
        assert_eq!(err.code(), 313);
        assert_eq!(err.element(), Some("needy"));
    }

    #[test]
    fn test_missing_required_field() {
        const MUST: ElementTag = ElementTag("must");

        let mut registry = Registry::new();
        registry
            .define(ElementType::new(
                ROOT,
                Schema::dict([DictField::new("must", MUST)]),
            ))
            .unwrap();
        registry
            .define(ElementType::new(MUST, Schema::Scalar(ScalarKind::Any)).required())
            .unwrap();
        registry.validate().unwrap();

        let err = resolve(&registry, ROOT, json!({}), &ResolveOptions::default()).unwrap_err();
        assert_eq!(err.code(), 202);
    }

    #[test]
    fn test_one_of_picks_first_matching_alternative() {
        const OP: ElementTag = ElementTag("op");
        const OP_BODY: ElementTag = ElementTag("op_body");

        let mut registry = Registry::new();
        registry
            .define(ElementType::new(
                ROOT,
                Schema::dict([DictField::new("op", OP)]),
            ))
            .unwrap();
        registry
            .define(ElementType::new(
                OP,
                Schema::OneOf(vec![
                    Schema::Scalar(ScalarKind::String),
                    Schema::dict([DictField::new("body", OP_BODY)]),
                ]),
            ))
            .unwrap();
        registry
            .define(ElementType::new(
                OP_BODY,
                Schema::Scalar(ScalarKind::String),
            ))
            .unwrap();
        registry.validate().unwrap();

        let context = resolve(
            &registry,
            ROOT,
            json!({"op": "shorthand"}),
            &ResolveOptions::default(),
        )
        .unwrap();
        let op = context.instances(OP)[0];
        assert_eq!(context.node(op).alternative, Some(0));
        assert_eq!(context.node(op).parsed, Some(json!("shorthand")));

        let context = resolve(
            &registry,
            ROOT,
            json!({"op": {"body": "full"}}),
            &ResolveOptions::default(),
        )
        .unwrap();
        let op = context.instances(OP)[0];
        assert_eq!(context.node(op).alternative, Some(1));

        let err = resolve(
            &registry,
            ROOT,
            json!({"op": [1]}),
            &ResolveOptions::default(),
        )
        .unwrap_err();
        assert_eq!(err.code(), 204);
    }
}
