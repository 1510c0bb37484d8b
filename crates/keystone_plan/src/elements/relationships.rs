//! Relationship types.
//!
//! Like node types, but with two interface maps: `source_interfaces` run
//! on the relationship's source node, `target_interfaces` on its target.

use super::{
    DATA_TYPES, PROPERTIES_SCHEMA, RAW_MAPPING, RELATIONSHIP_TYPE, RELATIONSHIPS, STRING_VALUE,
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

struct RelationshipTypeBehavior;

impl RelationshipTypeBehavior {
    fn merged_interface_map(
        cx: &EvalContext<'_>,
        field: &str,
    ) -> CompileResult<Value> {
        let parent_interfaces = interfaces_from_value(
            cx.req_value("parent_type").and_then(|p| p.get(field)),
        );
        let own_interfaces = interfaces_from_raw(
            cx.child_parsed(field),
            &format!("{}.{}", cx.path(), field),
        )?;
        Ok(interfaces_to_value(&merge_interfaces_type_over_type(
            &parent_interfaces,
            &own_interfaces,
        )))
    }
}

impl Behavior for RelationshipTypeBehavior {
    fn validate(&self, cx: &EvalContext<'_>) -> CompileResult<()> {
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

    fn parse(&self, cx: &EvalContext<'_>) -> CompileResult<Value> {
        let parent = cx.req_value("parent_type");

        let parent_properties = parent
            .and_then(|p| p.get("properties"))
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        let own_properties = cx
            .child_parsed("properties")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        let mut record = ValueMap::new();
        record.insert("name".to_string(), Value::String(cx.name().to_string()));
        record.insert(
            "properties".to_string(),
            Value::Object(merge_property_schemas(&parent_properties, &own_properties)),
        );
        record.insert(
            "source_interfaces".to_string(),
            Self::merged_interface_map(cx, "source_interfaces")?,
        );
        record.insert(
            "target_interfaces".to_string(),
            Self::merged_interface_map(cx, "target_interfaces")?,
        );
        record.insert(
            "type_hierarchy".to_string(),
            Value::Array(hierarchy_with(parent, cx.name())),
        );
        Ok(Value::Object(record))
    }
}

struct RelationshipsBehavior;

impl Behavior for RelationshipsBehavior {
    fn validate(&self, cx: &EvalContext<'_>) -> CompileResult<()> {
        let data_type_names: Vec<String> = cx
            .req_value("data_type_names")
            .and_then(Value::as_array)
            .map(|names| {
                names
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
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
                &data_type_names,
                &format!("{}.{}.properties", cx.path(), child.name),
            )?;
        }
        Ok(())
    }
}

pub(super) fn define(registry: &mut Registry) -> CompileResult<()> {
    registry.define(
        ElementType::new(RELATIONSHIPS, Schema::Map(RELATIONSHIP_TYPE))
            .requires(RequirementGroup::on_element(
                DATA_TYPES,
                vec![RequirementSpec::provided("data_type_names").optional()],
            ))
            .behavior(RelationshipsBehavior),
    )?;
    registry.define(
        ElementType::new(
            RELATIONSHIP_TYPE,
            Schema::dict([
                DictField::new("derived_from", STRING_VALUE),
                DictField::new("properties", PROPERTIES_SCHEMA),
                DictField::new("source_interfaces", RAW_MAPPING),
                DictField::new("target_interfaces", RAW_MAPPING),
            ]),
        )
        .requires(RequirementGroup::on_element(
            RELATIONSHIP_TYPE,
            vec![
                RequirementSpec::parsed("parent_type")
                    .optional()
                    .filtered(derives_from),
            ],
        ))
        .behavior(RelationshipTypeBehavior),
    )
}
