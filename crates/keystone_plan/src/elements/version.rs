//! The `definitions_version` declarator element.

use super::VERSION;
use keystone_core::{CompileError, CompileResult, DslVersion, ValueMap};
use keystone_schema::{
    Behavior, ElementType, EvalContext, Registry, RequirementGroup, RequirementSpec, ScalarKind,
    Schema,
};
use serde_json::Value;

/// Versions this compiler understands.
pub const SUPPORTED_VERSIONS: &[DslVersion] = &[DslVersion::new(1, 0), DslVersion::new(1, 1)];

struct VersionBehavior;

impl Behavior for VersionBehavior {
    fn validate(&self, cx: &EvalContext<'_>) -> CompileResult<()> {
        let Some(raw) = cx.raw().and_then(Value::as_str) else {
            return Ok(());
        };
        let version = DslVersion::parse(raw)?;

        // The compatibility check can be waived by the caller; the
        // declarator itself must still parse.
        let check = cx
            .req_value("validate_version")
            .and_then(Value::as_bool)
            .unwrap_or(true);
        if check && !SUPPORTED_VERSIONS.contains(&version) {
            return Err(CompileError::InvalidVersion {
                value: raw.to_string(),
            });
        }
        Ok(())
    }

    fn provide(&self, cx: &EvalContext<'_>) -> CompileResult<ValueMap> {
        let mut provided = ValueMap::new();
        let Some(raw) = cx.raw().and_then(Value::as_str) else {
            return Ok(provided);
        };
        let mut record = ValueMap::new();
        record.insert("raw".to_string(), Value::String(raw.to_string()));
        if let Ok(version) = DslVersion::parse(raw) {
            record.insert(
                "components".to_string(),
                Value::Array(vec![
                    Value::from(version.major),
                    Value::from(version.minor),
                ]),
            );
        }
        provided.insert("version".to_string(), Value::Object(record));
        Ok(provided)
    }
}

pub(super) fn define(registry: &mut Registry) -> CompileResult<()> {
    registry.define(
        ElementType::new(VERSION, Schema::Scalar(ScalarKind::String))
            .required()
            .requires(RequirementGroup::on_inputs(vec![
                RequirementSpec::parsed("validate_version").optional(),
            ]))
            .provides(["version"])
            .behavior(VersionBehavior),
    )
}
