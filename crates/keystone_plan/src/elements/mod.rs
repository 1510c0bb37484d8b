//! Element definitions for the blueprint language.
//!
//! One module per document section. Every element here wires a section of
//! the blueprint into the resolution engine: its accepted shape, its
//! dependencies on other sections, and the record it contributes to the
//! plan.

use keystone_core::CompileResult;
use keystone_schema::{
    Context, DictField, ElementTag, ElementType, Registry, ScalarKind, Schema,
};
use once_cell::sync::Lazy;
use serde_json::Value;

pub mod misc;
pub mod plugins;
pub mod policies;
pub mod relationships;
pub mod templates;
pub mod types;
pub mod version;
pub mod workflows;

/// The document root
pub const ROOT: ElementTag = ElementTag("blueprint");
/// `definitions_version` declarator
pub const VERSION: ElementTag = ElementTag("version");
/// Top-level description
pub const DESCRIPTION: ElementTag = ElementTag("description");
/// `imports` section (already flattened before resolution)
pub const IMPORTS: ElementTag = ElementTag("imports");
/// One import location
pub const IMPORT_ITEM: ElementTag = ElementTag("import");
/// `inputs` section
pub const INPUTS: ElementTag = ElementTag("inputs");
/// `outputs` section
pub const OUTPUTS: ElementTag = ElementTag("outputs");
/// One output definition
pub const OUTPUT_DEF: ElementTag = ElementTag("output");
/// An output's value (required)
pub const OUTPUT_VALUE: ElementTag = ElementTag("output_value");
/// `plugins` section
pub const PLUGINS: ElementTag = ElementTag("plugins");
/// One plugin declaration
pub const PLUGIN: ElementTag = ElementTag("plugin");
/// `node_types` section
pub const NODE_TYPES: ElementTag = ElementTag("node_types");
/// One node type
pub const NODE_TYPE: ElementTag = ElementTag("node_type");
/// `data_types` section
pub const DATA_TYPES: ElementTag = ElementTag("data_types");
/// One data type
pub const DATA_TYPE: ElementTag = ElementTag("data_type");
/// `relationships` section (relationship types)
pub const RELATIONSHIPS: ElementTag = ElementTag("relationships");
/// One relationship type
pub const RELATIONSHIP_TYPE: ElementTag = ElementTag("relationship_type");
/// `node_templates` section
pub const NODE_TEMPLATES: ElementTag = ElementTag("node_templates");
/// One node template
pub const NODE_TEMPLATE: ElementTag = ElementTag("node_template");
/// A template's relationship list
pub const TEMPLATE_RELATIONSHIPS: ElementTag = ElementTag("template_relationships");
/// One relationship instance on a template
pub const TEMPLATE_RELATIONSHIP: ElementTag = ElementTag("template_relationship");
/// `policy_types` section
pub const POLICY_TYPES: ElementTag = ElementTag("policy_types");
/// One policy type
pub const POLICY_TYPE: ElementTag = ElementTag("policy_type");
/// `policy_triggers` section
pub const POLICY_TRIGGERS: ElementTag = ElementTag("policy_triggers");
/// One policy trigger
pub const POLICY_TRIGGER: ElementTag = ElementTag("policy_trigger");
/// `groups` section
pub const GROUPS: ElementTag = ElementTag("groups");
/// One group
pub const GROUP: ElementTag = ElementTag("group");
/// A group's member list
pub const GROUP_MEMBERS: ElementTag = ElementTag("group_members");
/// One group member reference
pub const GROUP_MEMBER: ElementTag = ElementTag("group_member");
/// A group's policy mapping
pub const GROUP_POLICIES: ElementTag = ElementTag("group_policies");
/// One group policy
pub const GROUP_POLICY: ElementTag = ElementTag("group_policy");
/// A group policy's trigger mapping
pub const GROUP_POLICY_TRIGGERS: ElementTag = ElementTag("group_policy_triggers");
/// One group policy trigger
pub const GROUP_POLICY_TRIGGER: ElementTag = ElementTag("group_policy_trigger");
/// `workflows` section
pub const WORKFLOWS: ElementTag = ElementTag("workflows");
/// One workflow
pub const WORKFLOW: ElementTag = ElementTag("workflow");
/// A property-schema table
pub const PROPERTIES_SCHEMA: ElementTag = ElementTag("properties_schema");
/// One property-schema entry
pub const PROPERTY_SCHEMA: ElementTag = ElementTag("property_schema");
/// Generic optional string leaf
pub const STRING_VALUE: ElementTag = ElementTag("string_value");
/// Generic required string leaf
pub const REQUIRED_STRING: ElementTag = ElementTag("required_string");
/// Generic boolean leaf
pub const BOOL_VALUE: ElementTag = ElementTag("bool_value");
/// Generic unconstrained leaf
pub const ANY_VALUE: ElementTag = ElementTag("any_value");
/// Generic opaque mapping leaf
pub const RAW_MAPPING: ElementTag = ElementTag("raw_mapping");

/// Candidate is the type the dependent's `derived_from` names, within the
/// same section.
pub(crate) fn derives_from(context: &Context, dependent: usize, candidate: usize) -> bool {
    if context.node(dependent).parent != context.node(candidate).parent {
        return false;
    }
    let wanted = context
        .node(dependent)
        .raw
        .as_ref()
        .and_then(|v| v.get("derived_from"))
        .and_then(Value::as_str);
    wanted == Some(context.node(candidate).name.as_str())
}

/// Candidate is the node template the dependent's `target` names.
pub(crate) fn targets_template(context: &Context, dependent: usize, candidate: usize) -> bool {
    let wanted = context
        .node(dependent)
        .raw
        .as_ref()
        .and_then(|v| v.get("target"))
        .and_then(Value::as_str);
    wanted == Some(context.node(candidate).name.as_str())
}

fn define_leaves(registry: &mut Registry) -> CompileResult<()> {
    registry.define(ElementType::new(
        STRING_VALUE,
        Schema::Scalar(ScalarKind::String),
    ))?;
    registry.define(
        ElementType::new(REQUIRED_STRING, Schema::Scalar(ScalarKind::String)).required(),
    )?;
    registry.define(ElementType::new(BOOL_VALUE, Schema::Scalar(ScalarKind::Bool)))?;
    registry.define(ElementType::new(ANY_VALUE, Schema::Scalar(ScalarKind::Any)))?;
    registry.define(ElementType::new(
        RAW_MAPPING,
        Schema::Scalar(ScalarKind::Mapping),
    ))?;
    registry.define(
        ElementType::new(OUTPUT_VALUE, Schema::Scalar(ScalarKind::Any)).required(),
    )?;
    registry.define(ElementType::new(
        PROPERTY_SCHEMA,
        Schema::dict([
            DictField::new("type", STRING_VALUE),
            DictField::new("default", ANY_VALUE),
            DictField::new("description", STRING_VALUE),
            DictField::new("required", BOOL_VALUE),
        ]),
    ))?;
    registry.define(ElementType::new(
        PROPERTIES_SCHEMA,
        Schema::Map(PROPERTY_SCHEMA),
    ))?;
    Ok(())
}

fn define_root(registry: &mut Registry) -> CompileResult<()> {
    registry.define(ElementType::new(
        ROOT,
        Schema::dict([
            DictField::new("definitions_version", VERSION),
            DictField::new("description", DESCRIPTION),
            DictField::new("imports", IMPORTS),
            DictField::new("inputs", INPUTS),
            DictField::new("plugins", PLUGINS),
            DictField::new("data_types", DATA_TYPES),
            DictField::new("node_types", NODE_TYPES),
            DictField::new("relationships", RELATIONSHIPS),
            DictField::new("node_templates", NODE_TEMPLATES),
            DictField::new("policy_types", POLICY_TYPES),
            DictField::new("policy_triggers", POLICY_TRIGGERS),
            DictField::new("groups", GROUPS),
            DictField::new("workflows", WORKFLOWS),
            DictField::new("outputs", OUTPUTS),
        ]),
    ))
}

fn build_registry() -> CompileResult<Registry> {
    let mut registry = Registry::new();
    define_leaves(&mut registry)?;
    version::define(&mut registry)?;
    misc::define(&mut registry)?;
    plugins::define(&mut registry)?;
    types::define(&mut registry)?;
    relationships::define(&mut registry)?;
    templates::define(&mut registry)?;
    policies::define(&mut registry)?;
    workflows::define(&mut registry)?;
    define_root(&mut registry)?;
    registry.validate()?;
    Ok(registry)
}

static REGISTRY: Lazy<CompileResult<Registry>> = Lazy::new(build_registry);

/// The blueprint language registry.
///
/// # Errors
///
/// Returns the schema-API error that broke registry construction; this is
/// a bug in the element declarations, never a document problem.
pub fn registry() -> CompileResult<&'static Registry> {
    REGISTRY.as_ref().map_err(Clone::clone)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_builds_and_validates() {
        let registry = registry().unwrap();
        assert!(registry.len() > 30);
        registry.get(ROOT).unwrap();
        registry.get(NODE_TYPE).unwrap();
        registry.get(TEMPLATE_RELATIONSHIP).unwrap();
    }
}
