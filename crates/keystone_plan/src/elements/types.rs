//! Node types and data types.
//!
//! Both follow `derived_from` chains: a type declares a dependency on its
//! own element kind, filtered to the type it derives from, so parents are
//! always resolved first and derivation cycles surface as dependency
//! cycles. Property tables merge down the chain; node type interfaces
//! merge type-over-type.

use super::{
    DATA_TYPE, DATA_TYPES, NODE_TYPE, NODE_TYPES, PROPERTIES_SCHEMA, RAW_MAPPING, STRING_VALUE,
    derives_from,
};
use crate::hierarchy::{hierarchy_with, merge_property_schemas, validate_property_types};
use crate::interfaces::{
    interfaces_from_raw, interfaces_from_value, interfaces_to_value, merge_interfaces_type_over_type,
};
use keystone_core::{CompileError, CompileResult, ValueMap};
use keystone_schema::{
    Behavior, DictField, ElementType, EvalContext, Registry, RequirementGroup, RequirementSpec,
    Schema,
};
use serde_json::Value;

/// Fail when `derived_from` names a type the requirement did not find.
fn check_parent_resolved(cx: &EvalContext<'_>) -> CompileResult<()> {
    let declared = cx
        .raw()
        .and_then(|v| v.get("derived_from"))
        .and_then(Value::as_str);
    if let Some(parent) = declared {
        if cx.req_value("parent_type").is_none() {
            return Err(CompileError::UnknownType {
                element: cx.path(),
                type_name: parent.to_string(),
            });
        }
    }
    Ok(())
}

fn merged_properties(cx: &EvalContext<'_>) -> ValueMap {
    let parent_properties = cx
        .req_value("parent_type")
        .and_then(|p| p.get("properties"))
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    let own_properties = cx
        .child_parsed("properties")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    merge_property_schemas(&parent_properties, &own_properties)
}

struct NodeTypeBehavior;

impl Behavior for NodeTypeBehavior {
    fn validate(&self, cx: &EvalContext<'_>) -> CompileResult<()> {
        check_parent_resolved(cx)
    }

    fn parse(&self, cx: &EvalContext<'_>) -> CompileResult<Value> {
        let parent = cx.req_value("parent_type");

        let parent_interfaces = interfaces_from_value(parent.and_then(|p| p.get("interfaces")));
        let own_interfaces = interfaces_from_raw(
            cx.child_parsed("interfaces"),
            &format!("{}.interfaces", cx.path()),
        )?;
        let merged = merge_interfaces_type_over_type(&parent_interfaces, &own_interfaces);

        let mut record = ValueMap::new();
        record.insert(
            "properties".to_string(),
            Value::Object(merged_properties(cx)),
        );
        record.insert("interfaces".to_string(), interfaces_to_value(&merged));
        record.insert(
            "type_hierarchy".to_string(),
            Value::Array(hierarchy_with(parent, cx.name())),
        );
        Ok(Value::Object(record))
    }
}

struct DataTypeBehavior;

impl Behavior for DataTypeBehavior {
    fn validate(&self, cx: &EvalContext<'_>) -> CompileResult<()> {
        check_parent_resolved(cx)
    }

    fn parse(&self, cx: &EvalContext<'_>) -> CompileResult<Value> {
        let parent = cx.req_value("parent_type");
        let mut record = ValueMap::new();
        record.insert(
            "properties".to_string(),
            Value::Object(merged_properties(cx)),
        );
        record.insert(
            "type_hierarchy".to_string(),
            Value::Array(hierarchy_with(parent, cx.name())),
        );
        Ok(Value::Object(record))
    }
}

/// Section-level check of declared property types, run once all the
/// section's children are resolved.
fn validate_section_property_types(
    cx: &EvalContext<'_>,
    data_type_names: &[String],
) -> CompileResult<()> {
    for child in cx.children() {
        let Some(properties) = child
            .parsed
            .as_ref()
            .and_then(|v| v.get("properties"))
            .and_then(Value::as_object)
        else {
            continue;
        };
        validate_property_types(
            properties,
            data_type_names,
            &format!("{}.{}.properties", cx.path(), child.name),
        )?;
    }
    Ok(())
}

struct NodeTypesBehavior;

impl Behavior for NodeTypesBehavior {
    fn validate(&self, cx: &EvalContext<'_>) -> CompileResult<()> {
        let data_type_names = cx
            .req_value("data_type_names")
            .and_then(Value::as_array)
            .map(|names| {
                names
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        validate_section_property_types(cx, &data_type_names)
    }
}

struct DataTypesBehavior;

impl Behavior for DataTypesBehavior {
    fn validate(&self, cx: &EvalContext<'_>) -> CompileResult<()> {
        let own_names: Vec<String> = cx.children().map(|c| c.name.clone()).collect();
        validate_section_property_types(cx, &own_names)
    }

    fn provide(&self, cx: &EvalContext<'_>) -> CompileResult<ValueMap> {
        let names = cx
            .children()
            .map(|c| Value::String(c.name.clone()))
            .collect();
        let mut provided = ValueMap::new();
        provided.insert("data_type_names".to_string(), Value::Array(names));
        Ok(provided)
    }
}

pub(super) fn define(registry: &mut Registry) -> CompileResult<()> {
    registry.define(
        ElementType::new(NODE_TYPES, Schema::Map(NODE_TYPE))
            .requires(RequirementGroup::on_element(
                DATA_TYPES,
                vec![RequirementSpec::provided("data_type_names").optional()],
            ))
            .behavior(NodeTypesBehavior),
    )?;
    registry.define(
        ElementType::new(
            NODE_TYPE,
            Schema::dict([
                DictField::new("derived_from", STRING_VALUE),
                DictField::new("properties", PROPERTIES_SCHEMA),
                DictField::new("interfaces", RAW_MAPPING),
            ]),
        )
        .requires(RequirementGroup::on_element(
            NODE_TYPE,
            vec![
                RequirementSpec::parsed("parent_type")
                    .optional()
                    .filtered(derives_from),
            ],
        ))
        .behavior(NodeTypeBehavior),
    )?;
    registry.define(
        ElementType::new(DATA_TYPES, Schema::Map(DATA_TYPE))
            .provides(["data_type_names"])
            .behavior(DataTypesBehavior),
    )?;
    registry.define(
        ElementType::new(
            DATA_TYPE,
            Schema::dict([
                DictField::new("derived_from", STRING_VALUE),
                DictField::new("description", STRING_VALUE),
                DictField::new("properties", PROPERTIES_SCHEMA),
            ]),
        )
        .requires(RequirementGroup::on_element(
            DATA_TYPE,
            vec![
                RequirementSpec::parsed("parent_type")
                    .optional()
                    .filtered(derives_from),
            ],
        ))
        .behavior(DataTypeBehavior),
    )
}
