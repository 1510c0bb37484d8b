//! Policy types, policy triggers, and groups.
//!
//! Policy types follow `derived_from` chains like node types. Groups bind
//! policies to member node templates; every cross-reference (member,
//! policy type, trigger type) must resolve.

use super::{
    GROUP, GROUP_MEMBER, GROUP_MEMBERS, GROUP_POLICIES, GROUP_POLICY, GROUP_POLICY_TRIGGER,
    GROUP_POLICY_TRIGGERS, GROUPS, NODE_TEMPLATES, POLICY_TRIGGER, POLICY_TRIGGERS, POLICY_TYPE,
    POLICY_TYPES, PROPERTIES_SCHEMA, RAW_MAPPING, REQUIRED_STRING, STRING_VALUE, derives_from,
};
use crate::hierarchy::{
    apply_schema, hierarchy_with, merge_property_schemas, validate_property_types,
};
use keystone_core::{CompileError, CompileResult, ValueMap, string_seq};
use keystone_schema::{
    Behavior, DictField, ElementType, EvalContext, Registry, RequirementGroup, RequirementSpec,
    ScalarKind, Schema,
};
use serde_json::Value;

struct PolicyTypeBehavior;

impl Behavior for PolicyTypeBehavior {
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

        // A root policy type must name its source; derived ones inherit it.
        let has_source = cx.child_parsed("source").is_some()
            || cx
                .req_value("parent_type")
                .and_then(|p| p.get("source"))
                .is_some();
        if !has_source {
            return Err(CompileError::MissingRequiredField {
                element: cx.path(),
                field: "source".to_string(),
            });
        }
        Ok(())
    }

    fn parse(&self, cx: &EvalContext<'_>) -> CompileResult<Value> {
        let parent = cx.req_value("parent_type");

        let source = cx
            .child_parsed("source")
            .cloned()
            .or_else(|| parent.and_then(|p| p.get("source")).cloned())
            .unwrap_or(Value::Null);
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
        record.insert("source".to_string(), source);
        record.insert(
            "properties".to_string(),
            Value::Object(merge_property_schemas(&parent_properties, &own_properties)),
        );
        record.insert(
            "type_hierarchy".to_string(),
            Value::Array(hierarchy_with(parent, cx.name())),
        );
        Ok(Value::Object(record))
    }
}

struct PolicyTypesBehavior;

impl Behavior for PolicyTypesBehavior {
    fn validate(&self, cx: &EvalContext<'_>) -> CompileResult<()> {
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
                &[],
                &format!("{}.{}.properties", cx.path(), child.name),
            )?;
        }
        Ok(())
    }
}

struct PolicyTriggerBehavior;

impl Behavior for PolicyTriggerBehavior {
    fn parse(&self, cx: &EvalContext<'_>) -> CompileResult<Value> {
        let mut record = ValueMap::new();
        record.insert(
            "source".to_string(),
            cx.child_parsed("source").cloned().unwrap_or(Value::Null),
        );
        record.insert(
            "parameters".to_string(),
            cx.child_parsed("parameters")
                .cloned()
                .unwrap_or_else(|| Value::Object(ValueMap::new())),
        );
        Ok(Value::Object(record))
    }
}

struct GroupBehavior;

impl Behavior for GroupBehavior {
    fn validate(&self, cx: &EvalContext<'_>) -> CompileResult<()> {
        let templates: Vec<String> = cx
            .req_value("template_names")
            .and_then(string_seq)
            .unwrap_or_default();
        let members = cx
            .child_parsed("members")
            .and_then(string_seq)
            .unwrap_or_default();

        let mut seen: Vec<&str> = Vec::new();
        for member in &members {
            if seen.contains(&member.as_str()) {
                return Err(CompileError::DuplicateEntry {
                    element: cx.path(),
                    entry: member.clone(),
                });
            }
            seen.push(member);
            if !templates.contains(member) {
                return Err(CompileError::UnknownGroupMember {
                    element: cx.path(),
                    member: member.clone(),
                });
            }
        }
        Ok(())
    }

    fn parse(&self, cx: &EvalContext<'_>) -> CompileResult<Value> {
        let mut record = ValueMap::new();
        record.insert(
            "members".to_string(),
            cx.child_parsed("members")
                .cloned()
                .unwrap_or_else(|| Value::Array(Vec::new())),
        );
        record.insert(
            "policies".to_string(),
            cx.child_parsed("policies")
                .cloned()
                .unwrap_or_else(|| Value::Object(ValueMap::new())),
        );
        Ok(Value::Object(record))
    }
}

struct GroupPolicyBehavior;

impl Behavior for GroupPolicyBehavior {
    fn validate(&self, cx: &EvalContext<'_>) -> CompileResult<()> {
        let Some(type_name) = cx.child_parsed("type").and_then(Value::as_str) else {
            return Ok(());
        };
        let declared = cx
            .req_value("policy_types")
            .and_then(Value::as_object)
            .is_some_and(|types| types.contains_key(type_name));
        if !declared {
            return Err(CompileError::UnknownPolicyType {
                element: cx.path(),
                policy_type: type_name.to_string(),
            });
        }
        Ok(())
    }

    fn parse(&self, cx: &EvalContext<'_>) -> CompileResult<Value> {
        let path = cx.path();
        let type_name = cx
            .child_parsed("type")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let schema = cx
            .req_value("policy_types")
            .and_then(|types| types.get(type_name))
            .and_then(|t| t.get("properties"))
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        let instance_properties = cx
            .child_parsed("properties")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        let mut record = ValueMap::new();
        record.insert("type".to_string(), Value::String(type_name.to_string()));
        record.insert(
            "properties".to_string(),
            Value::Object(apply_schema(&schema, &instance_properties, &path)?),
        );
        record.insert(
            "triggers".to_string(),
            cx.child_parsed("triggers")
                .cloned()
                .unwrap_or_else(|| Value::Object(ValueMap::new())),
        );
        Ok(Value::Object(record))
    }
}

struct GroupPolicyTriggerBehavior;

impl Behavior for GroupPolicyTriggerBehavior {
    fn validate(&self, cx: &EvalContext<'_>) -> CompileResult<()> {
        let Some(type_name) = cx.child_parsed("type").and_then(Value::as_str) else {
            return Ok(());
        };
        let declared = cx
            .req_value("policy_triggers")
            .and_then(Value::as_object)
            .is_some_and(|triggers| triggers.contains_key(type_name));
        if !declared {
            return Err(CompileError::UnknownPolicyTrigger {
                element: cx.path(),
                trigger: type_name.to_string(),
            });
        }
        Ok(())
    }

    fn parse(&self, cx: &EvalContext<'_>) -> CompileResult<Value> {
        let path = cx.path();
        let type_name = cx
            .child_parsed("type")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let schema = cx
            .req_value("policy_triggers")
            .and_then(|triggers| triggers.get(type_name))
            .and_then(|t| t.get("parameters"))
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        let instance_parameters = cx
            .child_parsed("parameters")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        let mut record = ValueMap::new();
        record.insert("type".to_string(), Value::String(type_name.to_string()));
        record.insert(
            "parameters".to_string(),
            Value::Object(apply_schema(&schema, &instance_parameters, &path)?),
        );
        Ok(Value::Object(record))
    }
}

pub(super) fn define(registry: &mut Registry) -> CompileResult<()> {
    registry.define(
        ElementType::new(POLICY_TYPES, Schema::Map(POLICY_TYPE)).behavior(PolicyTypesBehavior),
    )?;
    registry.define(
        ElementType::new(
            POLICY_TYPE,
            Schema::dict([
                DictField::new("derived_from", STRING_VALUE),
                DictField::new("source", STRING_VALUE),
                DictField::new("properties", PROPERTIES_SCHEMA),
            ]),
        )
        .requires(RequirementGroup::on_element(
            POLICY_TYPE,
            vec![
                RequirementSpec::parsed("parent_type")
                    .optional()
                    .filtered(derives_from),
            ],
        ))
        .behavior(PolicyTypeBehavior),
    )?;
    registry.define(ElementType::new(
        POLICY_TRIGGERS,
        Schema::Map(POLICY_TRIGGER),
    ))?;
    registry.define(
        ElementType::new(
            POLICY_TRIGGER,
            Schema::dict([
                DictField::new("source", REQUIRED_STRING),
                DictField::new("parameters", PROPERTIES_SCHEMA),
            ]),
        )
        .behavior(PolicyTriggerBehavior),
    )?;
    registry.define(ElementType::new(GROUPS, Schema::Map(GROUP)))?;
    registry.define(
        ElementType::new(
            GROUP,
            Schema::dict([
                DictField::new("members", GROUP_MEMBERS),
                DictField::new("policies", GROUP_POLICIES),
            ]),
        )
        .requires(RequirementGroup::on_element(
            NODE_TEMPLATES,
            vec![RequirementSpec::provided("template_names").optional()],
        ))
        .behavior(GroupBehavior),
    )?;
    registry
        .define(ElementType::new(GROUP_MEMBERS, Schema::List(GROUP_MEMBER)).required())?;
    registry.define(ElementType::new(
        GROUP_MEMBER,
        Schema::Scalar(ScalarKind::String),
    ))?;
    registry.define(ElementType::new(GROUP_POLICIES, Schema::Map(GROUP_POLICY)))?;
    registry.define(
        ElementType::new(
            GROUP_POLICY,
            Schema::dict([
                DictField::new("type", REQUIRED_STRING),
                DictField::new("properties", RAW_MAPPING),
                DictField::new("triggers", GROUP_POLICY_TRIGGERS),
            ]),
        )
        .requires(RequirementGroup::on_element(
            POLICY_TYPES,
            vec![RequirementSpec::parsed("policy_types").optional()],
        ))
        .behavior(GroupPolicyBehavior),
    )?;
    registry.define(ElementType::new(
        GROUP_POLICY_TRIGGERS,
        Schema::Map(GROUP_POLICY_TRIGGER),
    ))?;
    registry.define(
        ElementType::new(
            GROUP_POLICY_TRIGGER,
            Schema::dict([
                DictField::new("type", REQUIRED_STRING),
                DictField::new("parameters", RAW_MAPPING),
            ]),
        )
        .requires(RequirementGroup::on_element(
            POLICY_TRIGGERS,
            vec![RequirementSpec::parsed("policy_triggers").optional()],
        ))
        .behavior(GroupPolicyTriggerBehavior),
    )
}
