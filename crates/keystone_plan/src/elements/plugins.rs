//! The `plugins` section.
//!
//! Each plugin declares where its operations run (`executor`), where it
//! comes from (`source`), and whether agents must install it (`install`,
//! defaulting to true).

use super::{BOOL_VALUE, PLUGIN, PLUGINS, REQUIRED_STRING, STRING_VALUE};
use crate::interfaces::Executor;
use keystone_core::CompileResult;
use keystone_schema::{
    Behavior, DictField, ElementType, EvalContext, Registry, Schema,
};
use serde_json::Value;

struct PluginBehavior;

impl Behavior for PluginBehavior {
    fn validate(&self, cx: &EvalContext<'_>) -> CompileResult<()> {
        if let Some(executor) = cx.child_parsed("executor").and_then(Value::as_str) {
            Executor::parse(executor, &cx.path())?;
        }
        Ok(())
    }

    fn parse(&self, cx: &EvalContext<'_>) -> CompileResult<Value> {
        let mut record = cx.default_parse()?;
        if let Some(map) = record.as_object_mut() {
            map.insert("name".to_string(), Value::String(cx.name().to_string()));
            map.entry("install").or_insert(Value::Bool(true));
        }
        Ok(record)
    }
}

pub(super) fn define(registry: &mut Registry) -> CompileResult<()> {
    registry.define(ElementType::new(PLUGINS, Schema::Map(PLUGIN)))?;
    registry.define(
        ElementType::new(
            PLUGIN,
            Schema::dict([
                DictField::new("executor", REQUIRED_STRING),
                DictField::new("source", STRING_VALUE),
                DictField::new("install", BOOL_VALUE),
            ]),
        )
        .behavior(PluginBehavior),
    )
}
