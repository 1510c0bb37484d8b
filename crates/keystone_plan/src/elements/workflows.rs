//! The `workflows` section.
//!
//! A workflow is either a bare `plugin.task` mapping string or a full
//! record with parameters. Every workflow is attributed to the plugin its
//! mapping names; the section publishes the deduplicated plugin list for
//! the plan's `workflow_plugins_to_install`.

use super::{PLUGINS, PROPERTIES_SCHEMA, REQUIRED_STRING, WORKFLOW, WORKFLOWS};
use crate::interfaces::plugin_of;
use keystone_core::{CompileError, CompileResult, ValueMap};
use keystone_schema::{
    Behavior, DictField, ElementType, EvalContext, Registry, RequirementGroup, RequirementSpec,
    ScalarKind, Schema,
};
use serde_json::Value;

fn mapping_of(cx: &EvalContext<'_>) -> Option<String> {
    match cx.raw() {
        Some(Value::String(mapping)) => Some(mapping.clone()),
        Some(Value::Object(_)) => cx
            .child_parsed("mapping")
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    }
}

struct WorkflowBehavior;

impl Behavior for WorkflowBehavior {
    fn validate(&self, cx: &EvalContext<'_>) -> CompileResult<()> {
        let Some(mapping) = mapping_of(cx) else {
            return Ok(());
        };
        let plugin = plugin_of(&mapping).unwrap_or(&mapping);
        let declared = cx
            .req_value("plugins")
            .and_then(Value::as_object)
            .is_some_and(|plugins| plugins.contains_key(plugin));
        if !declared {
            return Err(CompileError::UnknownPlugin {
                element: cx.path(),
                plugin: plugin.to_string(),
            });
        }
        Ok(())
    }

    fn parse(&self, cx: &EvalContext<'_>) -> CompileResult<Value> {
        let mapping = mapping_of(cx).unwrap_or_default();
        let plugin = plugin_of(&mapping).unwrap_or(&mapping).to_string();

        let mut record = ValueMap::new();
        record.insert("mapping".to_string(), Value::String(mapping.clone()));
        record.insert(
            "parameters".to_string(),
            cx.child_parsed("parameters")
                .cloned()
                .unwrap_or_else(|| Value::Object(ValueMap::new())),
        );
        record.insert("plugin".to_string(), Value::String(plugin));
        Ok(Value::Object(record))
    }
}

struct WorkflowsBehavior;

impl Behavior for WorkflowsBehavior {
    fn provide(&self, cx: &EvalContext<'_>) -> CompileResult<ValueMap> {
        let plugins = cx
            .req_value("plugins")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        let mut to_install: Vec<Value> = Vec::new();
        for child in cx.children() {
            let Some(plugin_name) = child
                .parsed
                .as_ref()
                .and_then(|v| v.get("plugin"))
                .and_then(Value::as_str)
            else {
                continue;
            };
            let Some(record) = plugins.get(plugin_name) else {
                continue;
            };
            if !to_install.contains(record) {
                to_install.push(record.clone());
            }
        }

        let mut provided = ValueMap::new();
        provided.insert(
            "workflow_plugins_to_install".to_string(),
            Value::Array(to_install),
        );
        Ok(provided)
    }
}

pub(super) fn define(registry: &mut Registry) -> CompileResult<()> {
    registry.define(
        ElementType::new(WORKFLOWS, Schema::Map(WORKFLOW))
            .requires(RequirementGroup::on_element(
                PLUGINS,
                vec![RequirementSpec::parsed("plugins").optional()],
            ))
            .provides(["workflow_plugins_to_install"])
            .behavior(WorkflowsBehavior),
    )?;
    registry.define(
        ElementType::new(
            WORKFLOW,
            Schema::OneOf(vec![
                Schema::Scalar(ScalarKind::String),
                Schema::dict([
                    DictField::new("mapping", REQUIRED_STRING),
                    DictField::new("parameters", PROPERTIES_SCHEMA),
                ]),
            ]),
        )
        .requires(RequirementGroup::on_element(
            PLUGINS,
            vec![RequirementSpec::parsed("plugins").optional()],
        ))
        .behavior(WorkflowBehavior),
    )
}
