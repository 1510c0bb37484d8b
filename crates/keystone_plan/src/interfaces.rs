//! Interface and operation merging.
//!
//! Interfaces appear at three abstraction levels - type, template, and
//! relationship instance - and merging two levels follows one of two
//! override policies:
//!
//! - **type-over-type**: a present overriding operation fully replaces the
//!   overridden one, no field inheritance; an explicit empty mapping
//!   becomes [`Operation::no_op`], which blocks inheritance of whatever it
//!   overrode.
//! - **template-over-type** (shared by relationship instances): a missing
//!   implementation is inherited from the type. When the implementation is
//!   inherited unchanged, the type's input *schema* governs the merged
//!   inputs (defaults filled, mandatory inputs enforced) and the type's
//!   executor/retry settings carry over; a different implementation takes
//!   the instance's inputs and settings as-is.

use indexmap::IndexMap;
use keystone_core::{CompileError, CompileResult, ValueMap, kind_name};
use serde_json::Value;

/// Where an operation runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Executor {
    /// On the central deployment orchestrator
    Central,
    /// On the host agent of the node
    Host,
}

impl Executor {
    /// Parse a document value.
    ///
    /// # Errors
    ///
    /// Returns [`CompileError::IllegalExecutor`] for anything but
    /// `central` or `host`.
    pub fn parse(value: &str, element: &str) -> CompileResult<Self> {
        match value {
            "central" => Ok(Self::Central),
            "host" => Ok(Self::Host),
            other => Err(CompileError::IllegalExecutor {
                element: element.to_string(),
                value: other.to_string(),
            }),
        }
    }

    /// Document spelling.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Central => "central",
            Self::Host => "host",
        }
    }
}

/// A resolved operation definition.
///
/// At type level `inputs` holds an input *schema* (property-schema
/// entries); after a template-level merge it holds concrete input values.
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    /// `plugin.task` path; empty for the explicit no-op
    pub implementation: String,
    /// Input schema (type level) or concrete inputs (instance level)
    pub inputs: ValueMap,
    /// Execution location override
    pub executor: Option<Executor>,
    /// Retry count override
    pub max_retries: Option<i64>,
    /// Retry interval override, in seconds
    pub retry_interval: Option<i64>,
}

impl Operation {
    /// The explicit "define nothing" operation. Overriding with it blocks
    /// inheritance of the overridden definition.
    #[must_use]
    pub fn no_op() -> Self {
        Self {
            implementation: String::new(),
            inputs: ValueMap::new(),
            executor: None,
            max_retries: None,
            retry_interval: None,
        }
    }

    /// Whether this is the explicit no-op.
    #[must_use]
    pub fn is_no_op(&self) -> bool {
        self.implementation.is_empty()
            && self.inputs.is_empty()
            && self.executor.is_none()
            && self.max_retries.is_none()
            && self.retry_interval.is_none()
    }

    /// Normalize a raw document operation: absent/empty becomes the no-op,
    /// a bare string is shorthand for an implementation with empty inputs,
    /// a mapping supplies any of the five fields.
    ///
    /// # Errors
    ///
    /// Returns format errors for wrong field shapes, an undeclared-field
    /// error for unknown keys, and [`CompileError::IllegalExecutor`] for a
    /// bad executor value.
    pub fn from_raw(raw: &Value, element: &str) -> CompileResult<Self> {
        match raw {
            Value::Null => Ok(Self::no_op()),
            Value::String(implementation) => Ok(Self {
                implementation: implementation.clone(),
                ..Self::no_op()
            }),
            Value::Object(map) => Self::from_fields(map, element),
            other => Err(CompileError::UnexpectedType {
                element: element.to_string(),
                expected: "string or mapping".to_string(),
                actual: kind_name(other).to_string(),
            }),
        }
    }

    fn from_fields(map: &ValueMap, element: &str) -> CompileResult<Self> {
        for key in map.keys() {
            if !matches!(
                key.as_str(),
                "implementation" | "inputs" | "executor" | "max_retries" | "retry_interval"
            ) {
                return Err(CompileError::UndeclaredField {
                    element: element.to_string(),
                    field: key.clone(),
                });
            }
        }

        let implementation = match map.get("implementation") {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s.clone(),
            Some(other) => {
                return Err(CompileError::UnexpectedType {
                    element: format!("{element}.implementation"),
                    expected: "string".to_string(),
                    actual: kind_name(other).to_string(),
                });
            }
        };

        let inputs = match map.get("inputs") {
            None | Some(Value::Null) => ValueMap::new(),
            Some(Value::Object(inputs)) => inputs.clone(),
            Some(other) => {
                return Err(CompileError::UnexpectedType {
                    element: format!("{element}.inputs"),
                    expected: "mapping".to_string(),
                    actual: kind_name(other).to_string(),
                });
            }
        };

        let executor = match map.get("executor") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(Executor::parse(s, element)?),
            Some(other) => {
                return Err(CompileError::UnexpectedType {
                    element: format!("{element}.executor"),
                    expected: "string".to_string(),
                    actual: kind_name(other).to_string(),
                });
            }
        };

        Ok(Self {
            implementation,
            inputs,
            executor,
            max_retries: int_field(map, "max_retries", element)?,
            retry_interval: int_field(map, "retry_interval", element)?,
        })
    }

    /// Serialize into the plan representation.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let mut out = ValueMap::new();
        out.insert(
            "implementation".to_string(),
            Value::String(self.implementation.clone()),
        );
        out.insert("inputs".to_string(), Value::Object(self.inputs.clone()));
        out.insert(
            "executor".to_string(),
            self.executor
                .map_or(Value::Null, |e| Value::String(e.as_str().to_string())),
        );
        out.insert(
            "max_retries".to_string(),
            self.max_retries.map_or(Value::Null, Value::from),
        );
        out.insert(
            "retry_interval".to_string(),
            self.retry_interval.map_or(Value::Null, Value::from),
        );
        Value::Object(out)
    }
}

fn int_field(map: &ValueMap, key: &str, element: &str) -> CompileResult<Option<i64>> {
    match map.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_i64()
            .map(Some)
            .ok_or_else(|| CompileError::UnexpectedType {
                element: format!("{element}.{key}"),
                expected: "integer".to_string(),
                actual: kind_name(value).to_string(),
            }),
    }
}

/// Operations of one interface, by operation name.
pub type OperationMap = IndexMap<String, Operation>;

/// Interfaces of one type or template, by interface name.
pub type InterfaceMap = IndexMap<String, OperationMap>;

/// Normalize a raw `interfaces` document fragment.
///
/// # Errors
///
/// Returns format errors when the fragment is not a mapping of mappings,
/// plus any operation normalization error.
pub fn interfaces_from_raw(raw: Option<&Value>, element: &str) -> CompileResult<InterfaceMap> {
    let mut interfaces = InterfaceMap::new();
    let Some(raw) = raw else {
        return Ok(interfaces);
    };
    let Some(map) = raw.as_object() else {
        return Err(CompileError::UnexpectedType {
            element: element.to_string(),
            expected: "mapping".to_string(),
            actual: kind_name(raw).to_string(),
        });
    };
    for (interface_name, operations) in map {
        let path = format!("{element}.{interface_name}");
        let Some(operations) = operations.as_object() else {
            return Err(CompileError::UnexpectedType {
                element: path,
                expected: "mapping".to_string(),
                actual: kind_name(operations).to_string(),
            });
        };
        let mut parsed = OperationMap::new();
        for (operation_name, raw_operation) in operations {
            let operation =
                Operation::from_raw(raw_operation, &format!("{path}.{operation_name}"))?;
            parsed.insert(operation_name.clone(), operation);
        }
        interfaces.insert(interface_name.clone(), parsed);
    }
    Ok(interfaces)
}

/// Rehydrate an interface map stored inside a resolved type record.
#[must_use]
pub fn interfaces_from_value(value: Option<&Value>) -> InterfaceMap {
    let mut interfaces = InterfaceMap::new();
    let Some(Value::Object(map)) = value else {
        return interfaces;
    };
    for (interface_name, operations) in map {
        let Some(operations) = operations.as_object() else {
            continue;
        };
        let mut parsed = OperationMap::new();
        for (operation_name, record) in operations {
            let implementation = record
                .get("implementation")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let inputs = record
                .get("inputs")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default();
            let executor = record
                .get("executor")
                .and_then(Value::as_str)
                .and_then(|s| Executor::parse(s, "").ok());
            let max_retries = record.get("max_retries").and_then(Value::as_i64);
            let retry_interval = record.get("retry_interval").and_then(Value::as_i64);
            parsed.insert(
                operation_name.clone(),
                Operation {
                    implementation,
                    inputs,
                    executor,
                    max_retries,
                    retry_interval,
                },
            );
        }
        interfaces.insert(interface_name.clone(), parsed);
    }
    interfaces
}

/// Serialize an interface map into a resolved record.
#[must_use]
pub fn interfaces_to_value(interfaces: &InterfaceMap) -> Value {
    let mut out = ValueMap::new();
    for (interface_name, operations) in interfaces {
        let mut ops = ValueMap::new();
        for (operation_name, operation) in operations {
            ops.insert(operation_name.clone(), operation.to_value());
        }
        out.insert(interface_name.clone(), Value::Object(ops));
    }
    Value::Object(out)
}

/// Merge one operation, type over type: full replacement, no field
/// inheritance.
#[must_use]
pub fn merge_operation_type_over_type(
    overridden: Option<&Operation>,
    overriding: Option<&Operation>,
) -> Operation {
    match (overridden, overriding) {
        (_, Some(overriding)) => overriding.clone(),
        (Some(overridden), None) => overridden.clone(),
        (None, None) => Operation::no_op(),
    }
}

/// Merge two interface maps, type over type, key-by-key.
#[must_use]
pub fn merge_interfaces_type_over_type(
    overridden: &InterfaceMap,
    overriding: &InterfaceMap,
) -> InterfaceMap {
    let mut merged = InterfaceMap::new();
    for (name, operations) in overridden {
        match overriding.get(name) {
            None => {
                merged.insert(name.clone(), operations.clone());
            }
            Some(overriding_operations) => {
                let mut ops = OperationMap::new();
                for (op_name, op) in operations {
                    ops.insert(
                        op_name.clone(),
                        merge_operation_type_over_type(Some(op), overriding_operations.get(op_name)),
                    );
                }
                for (op_name, op) in overriding_operations {
                    if !ops.contains_key(op_name) {
                        ops.insert(op_name.clone(), op.clone());
                    }
                }
                merged.insert(name.clone(), ops);
            }
        }
    }
    for (name, operations) in overriding {
        if !merged.contains_key(name) {
            merged.insert(name.clone(), operations.clone());
        }
    }
    merged
}

/// Merge one operation, template (or relationship instance) over type.
///
/// # Errors
///
/// Returns input reconciliation errors when the implementation is
/// inherited and the instance inputs do not satisfy the type's input
/// schema.
pub fn merge_operation_template_over_type(
    type_op: Option<&Operation>,
    instance_op: Option<&Operation>,
    element: &str,
) -> CompileResult<Operation> {
    let Some(instance_op) = instance_op else {
        // Pass-through: the type definition survives, with its input
        // schema reconciled against empty instance inputs.
        let Some(type_op) = type_op else {
            return Ok(Operation::no_op());
        };
        if type_op.implementation.is_empty() {
            return Ok(type_op.clone());
        }
        return Ok(Operation {
            implementation: type_op.implementation.clone(),
            inputs: apply_operation_inputs(&type_op.inputs, &ValueMap::new(), element)?,
            executor: type_op.executor,
            max_retries: type_op.max_retries,
            retry_interval: type_op.retry_interval,
        });
    };

    // An explicitly empty override defines nothing and blocks inheritance.
    if instance_op.is_no_op() {
        return Ok(Operation::no_op());
    }

    let Some(type_op) = type_op else {
        return Ok(instance_op.clone());
    };

    let implementation = if instance_op.implementation.is_empty() {
        type_op.implementation.clone()
    } else {
        instance_op.implementation.clone()
    };

    if implementation == type_op.implementation {
        // Implementation inherited unchanged: the type's input schema
        // governs the inputs and the type's settings carry over.
        Ok(Operation {
            implementation,
            inputs: apply_operation_inputs(&type_op.inputs, &instance_op.inputs, element)?,
            executor: type_op.executor,
            max_retries: type_op.max_retries,
            retry_interval: type_op.retry_interval,
        })
    } else {
        Ok(Operation {
            implementation,
            inputs: instance_op.inputs.clone(),
            executor: instance_op.executor,
            max_retries: instance_op.max_retries,
            retry_interval: instance_op.retry_interval,
        })
    }
}

/// Merge two interface maps, template (or relationship instance) over
/// type, key-by-key.
///
/// # Errors
///
/// Returns the first per-operation merge error.
pub fn merge_interfaces_template_over_type(
    type_interfaces: &InterfaceMap,
    instance_interfaces: &InterfaceMap,
    element: &str,
) -> CompileResult<InterfaceMap> {
    let mut merged = InterfaceMap::new();
    for (name, type_operations) in type_interfaces {
        let instance_operations = instance_interfaces.get(name);
        let mut ops = OperationMap::new();
        for (op_name, type_op) in type_operations {
            let instance_op = instance_operations.and_then(|m| m.get(op_name));
            let path = format!("{element}.{name}.{op_name}");
            ops.insert(
                op_name.clone(),
                merge_operation_template_over_type(Some(type_op), instance_op, &path)?,
            );
        }
        if let Some(instance_operations) = instance_operations {
            for (op_name, instance_op) in instance_operations {
                if ops.contains_key(op_name) {
                    continue;
                }
                let path = format!("{element}.{name}.{op_name}");
                ops.insert(
                    op_name.clone(),
                    merge_operation_template_over_type(None, Some(instance_op), &path)?,
                );
            }
        }
        merged.insert(name.clone(), ops);
    }
    for (name, instance_operations) in instance_interfaces {
        if merged.contains_key(name) {
            continue;
        }
        let mut ops = OperationMap::new();
        for (op_name, instance_op) in instance_operations {
            let path = format!("{element}.{name}.{op_name}");
            ops.insert(
                op_name.clone(),
                merge_operation_template_over_type(None, Some(instance_op), &path)?,
            );
        }
        merged.insert(name.clone(), ops);
    }
    Ok(merged)
}

/// Reconcile instance operation inputs with the type's input schema:
/// reject undeclared inputs, fill defaults, and require every defaultless
/// input not marked optional.
///
/// # Errors
///
/// Returns [`CompileError::UndeclaredOperationInput`] or
/// [`CompileError::MissingOperationInput`].
pub fn apply_operation_inputs(
    schema: &ValueMap,
    values: &ValueMap,
    element: &str,
) -> CompileResult<ValueMap> {
    for key in values.keys() {
        if !schema.contains_key(key) {
            return Err(CompileError::UndeclaredOperationInput {
                element: element.to_string(),
                input: key.clone(),
            });
        }
    }

    let mut merged = ValueMap::new();
    for (key, entry) in schema {
        if let Some(value) = values.get(key) {
            merged.insert(key.clone(), value.clone());
            continue;
        }
        let entry_map = entry.as_object();
        if let Some(default) = entry_map.and_then(|m| m.get("default")) {
            merged.insert(key.clone(), default.clone());
            continue;
        }
        let required = entry_map
            .and_then(|m| m.get("required"))
            .and_then(Value::as_bool)
            .unwrap_or(true);
        if required {
            return Err(CompileError::MissingOperationInput {
                element: element.to_string(),
                input: key.clone(),
            });
        }
    }
    Ok(merged)
}

/// The plugin a `plugin.task` implementation names.
#[must_use]
pub fn plugin_of(implementation: &str) -> Option<&str> {
    implementation.split_once('.').map(|(plugin, _)| plugin)
}

/// Check every concrete operation against the declared plugin names.
///
/// # Errors
///
/// Returns [`CompileError::UnknownPlugin`] for the first implementation
/// whose plugin is not declared.
pub fn validate_operation_plugins(
    interfaces: &InterfaceMap,
    plugin_names: &[String],
    element: &str,
) -> CompileResult<()> {
    for (interface_name, operations) in interfaces {
        for (operation_name, operation) in operations {
            if operation.implementation.is_empty() {
                continue;
            }
            let plugin = plugin_of(&operation.implementation)
                .unwrap_or(operation.implementation.as_str());
            if !plugin_names.iter().any(|p| p == plugin) {
                return Err(CompileError::UnknownPlugin {
                    element: format!("{element}.{interface_name}.{operation_name}"),
                    plugin: plugin.to_string(),
                });
            }
        }
    }
    Ok(())
}

/// Flatten merged interfaces into the plan's operation table: qualified
/// `interface.operation` names always, short names only when unambiguous
/// across interfaces.
#[must_use]
pub fn operations_table(interfaces: &InterfaceMap) -> ValueMap {
    let mut short_counts: IndexMap<&str, usize> = IndexMap::new();
    for operations in interfaces.values() {
        for op_name in operations.keys() {
            *short_counts.entry(op_name.as_str()).or_insert(0) += 1;
        }
    }

    let mut table = ValueMap::new();
    for (interface_name, operations) in interfaces {
        for (op_name, operation) in operations {
            let record = operation.to_value();
            if short_counts.get(op_name.as_str()) == Some(&1) {
                table.insert(op_name.clone(), record.clone());
            }
            table.insert(format!("{interface_name}.{op_name}"), record);
        }
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn op(implementation: &str) -> Operation {
        Operation {
            implementation: implementation.to_string(),
            ..Operation::no_op()
        }
    }

    fn map(value: Value) -> ValueMap {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_from_raw_shorthand_and_empty() {
        let parsed = Operation::from_raw(&json!("scripts.run"), "x").unwrap();
        assert_eq!(parsed.implementation, "scripts.run");
        assert!(parsed.inputs.is_empty());

        assert!(Operation::from_raw(&json!({}), "x").unwrap().is_no_op());
        assert!(Operation::from_raw(&Value::Null, "x").unwrap().is_no_op());
    }

    #[test]
    fn test_from_raw_full_record() {
        let parsed = Operation::from_raw(
            &json!({
                "implementation": "scripts.run",
                "inputs": {"retries": {"default": 3}},
                "executor": "host",
                "max_retries": 2,
                "retry_interval": 30,
            }),
            "x",
        )
        .unwrap();
        assert_eq!(parsed.executor, Some(Executor::Host));
        assert_eq!(parsed.max_retries, Some(2));
        assert_eq!(parsed.retry_interval, Some(30));
    }

    #[test]
    fn test_from_raw_rejects_bad_executor_and_unknown_key() {
        let err = Operation::from_raw(&json!({"executor": "everywhere"}), "x").unwrap_err();
        assert_eq!(err.code(), 307);

        let err = Operation::from_raw(&json!({"implementtion": "typo.run"}), "x").unwrap_err();
        assert_eq!(err.code(), 203);
    }

    #[test]
    fn test_type_over_type_full_replace() {
        let under = Operation {
            implementation: "old.run".to_string(),
            inputs: map(json!({"a": {"default": 1}})),
            executor: Some(Executor::Host),
            max_retries: Some(5),
            retry_interval: None,
        };
        let over = op("new.run");
        let merged = merge_operation_type_over_type(Some(&under), Some(&over));
        // no field inheritance at all
        assert_eq!(merged, over);
    }

    #[test]
    fn test_type_over_type_absent_override_passes_through() {
        let under = op("old.run");
        let merged = merge_operation_type_over_type(Some(&under), None);
        assert_eq!(merged, under);
    }

    #[test]
    fn test_no_op_absorbs_at_every_level() {
        let under = Operation {
            implementation: "old.run".to_string(),
            inputs: map(json!({"a": {"default": 1}})),
            executor: Some(Executor::Central),
            max_retries: None,
            retry_interval: None,
        };

        let merged = merge_operation_type_over_type(Some(&under), Some(&Operation::no_op()));
        assert!(merged.is_no_op());

        let merged =
            merge_operation_template_over_type(Some(&under), Some(&Operation::no_op()), "x")
                .unwrap();
        assert!(merged.is_no_op());
    }

    #[test]
    fn test_merge_over_no_op_keeps_overriding_inputs() {
        // overridden is NO_OP: the overriding implementation is never "the
        // same", so overriding inputs pass through unchanged
        let over = Operation {
            implementation: "new.run".to_string(),
            inputs: map(json!({"x": 1})),
            executor: Some(Executor::Host),
            max_retries: Some(1),
            retry_interval: None,
        };
        let merged =
            merge_operation_template_over_type(Some(&Operation::no_op()), Some(&over), "x")
                .unwrap();
        assert_eq!(merged, over);
    }

    #[test]
    fn test_template_inherits_implementation_and_schema() {
        let type_op = Operation {
            implementation: "scripts.run".to_string(),
            inputs: map(json!({
                "speed": {"default": 10},
                "path": {"type": "string"},
            })),
            executor: Some(Executor::Central),
            max_retries: Some(3),
            retry_interval: Some(60),
        };

        // instance supplies the mandatory input, inherits the rest
        let instance = Operation {
            implementation: String::new(),
            inputs: map(json!({"path": "/tmp/x"})),
            executor: None,
            max_retries: None,
            retry_interval: None,
        };
        let merged =
            merge_operation_template_over_type(Some(&type_op), Some(&instance), "x").unwrap();
        assert_eq!(merged.implementation, "scripts.run");
        assert_eq!(
            Value::Object(merged.inputs.clone()),
            json!({"speed": 10, "path": "/tmp/x"})
        );
        assert_eq!(merged.executor, Some(Executor::Central));
        assert_eq!(merged.max_retries, Some(3));
        assert_eq!(merged.retry_interval, Some(60));
    }

    #[test]
    fn test_template_missing_mandatory_input() {
        let type_op = Operation {
            implementation: "scripts.run".to_string(),
            inputs: map(json!({"path": {"type": "string"}})),
            ..op("scripts.run")
        };
        let err = merge_operation_template_over_type(Some(&type_op), None, "x").unwrap_err();
        assert_eq!(err.code(), 308);

        let instance = Operation {
            inputs: map(json!({"rogue": 1})),
            ..Operation::no_op()
        };
        let type_op = Operation {
            implementation: "scripts.run".to_string(),
            inputs: ValueMap::new(),
            ..op("scripts.run")
        };
        let err =
            merge_operation_template_over_type(Some(&type_op), Some(&instance), "x").unwrap_err();
        assert_eq!(err.code(), 309);
    }

    #[test]
    fn test_template_override_takes_inputs_as_is() {
        let type_op = Operation {
            implementation: "scripts.run".to_string(),
            inputs: map(json!({"speed": {"default": 10}})),
            executor: Some(Executor::Central),
            max_retries: Some(3),
            retry_interval: None,
        };
        let instance = Operation {
            implementation: "other.run".to_string(),
            inputs: map(json!({"anything": true})),
            executor: None,
            max_retries: None,
            retry_interval: None,
        };
        let merged =
            merge_operation_template_over_type(Some(&type_op), Some(&instance), "x").unwrap();
        assert_eq!(merged.implementation, "other.run");
        assert_eq!(merged.inputs, instance.inputs);
        // different implementation: the overriding side's unset settings win
        assert_eq!(merged.executor, None);
        assert_eq!(merged.max_retries, None);
    }

    #[test]
    fn test_identity_merge_inherits_from_type() {
        let type_interfaces: InterfaceMap = [(
            "lifecycle".to_string(),
            [
                ("create".to_string(), {
                    Operation {
                        implementation: "scripts.create".to_string(),
                        inputs: map(json!({"speed": {"default": 10}})),
                        executor: Some(Executor::Host),
                        max_retries: Some(7),
                        retry_interval: Some(5),
                    }
                }),
                ("delete".to_string(), Operation::no_op()),
            ]
            .into_iter()
            .collect(),
        )]
        .into_iter()
        .collect();

        let merged =
            merge_interfaces_template_over_type(&type_interfaces, &InterfaceMap::new(), "x")
                .unwrap();
        let create = &merged["lifecycle"]["create"];
        assert_eq!(create.implementation, "scripts.create");
        assert_eq!(Value::Object(create.inputs.clone()), json!({"speed": 10}));
        assert_eq!(create.executor, Some(Executor::Host));
        assert_eq!(create.max_retries, Some(7));
        assert_eq!(create.retry_interval, Some(5));
        assert!(merged["lifecycle"]["delete"].is_no_op());
    }

    #[test]
    fn test_map_merge_keeps_new_interfaces_and_operations() {
        let type_interfaces: InterfaceMap = [(
            "lifecycle".to_string(),
            [("create".to_string(), op("scripts.create"))]
                .into_iter()
                .collect(),
        )]
        .into_iter()
        .collect();
        let instance_interfaces: InterfaceMap = [
            (
                "lifecycle".to_string(),
                [("configure".to_string(), op("scripts.configure"))]
                    .into_iter()
                    .collect(),
            ),
            (
                "maintenance".to_string(),
                [("backup".to_string(), op("scripts.backup"))]
                    .into_iter()
                    .collect(),
            ),
        ]
        .into_iter()
        .collect();

        let merged =
            merge_interfaces_template_over_type(&type_interfaces, &instance_interfaces, "x")
                .unwrap();
        assert_eq!(merged["lifecycle"]["create"].implementation, "scripts.create");
        assert_eq!(
            merged["lifecycle"]["configure"].implementation,
            "scripts.configure"
        );
        assert_eq!(merged["maintenance"]["backup"].implementation, "scripts.backup");
    }

    #[test]
    fn test_operations_table_short_names() {
        let interfaces: InterfaceMap = [
            (
                "lifecycle".to_string(),
                [
                    ("create".to_string(), op("scripts.create")),
                    ("start".to_string(), op("scripts.start")),
                ]
                .into_iter()
                .collect(),
            ),
            (
                "maintenance".to_string(),
                [("start".to_string(), op("scripts.restart"))]
                    .into_iter()
                    .collect(),
            ),
        ]
        .into_iter()
        .collect();

        let table = operations_table(&interfaces);
        // unambiguous short name present
        assert!(table.contains_key("create"));
        // ambiguous short name omitted; qualified names always present
        assert!(!table.contains_key("start"));
        assert!(table.contains_key("lifecycle.start"));
        assert!(table.contains_key("maintenance.start"));
        assert_eq!(
            table["lifecycle.create"]["implementation"],
            json!("scripts.create")
        );
    }

    #[test]
    fn test_validate_operation_plugins() {
        let interfaces: InterfaceMap = [(
            "lifecycle".to_string(),
            [
                ("create".to_string(), op("scripts.create")),
                ("noop".to_string(), Operation::no_op()),
            ]
            .into_iter()
            .collect(),
        )]
        .into_iter()
        .collect();

        validate_operation_plugins(&interfaces, &["scripts".to_string()], "x").unwrap();

        let err = validate_operation_plugins(&interfaces, &[], "x").unwrap_err();
        assert_eq!(err.code(), 302);
    }

    #[test]
    fn test_plugin_of() {
        assert_eq!(plugin_of("scripts.tasks.run"), Some("scripts"));
        assert_eq!(plugin_of("bare"), None);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn arb_operation() -> impl Strategy<Value = Operation> {
            (
                "[a-z]{1,8}\\.[a-z]{1,8}",
                prop::collection::btree_map("[a-z]{1,5}", 0i64..100, 0..4),
                prop::option::of(prop_oneof![Just(Executor::Central), Just(Executor::Host)]),
                prop::option::of(0i64..10),
            )
                .prop_map(|(implementation, inputs, executor, max_retries)| Operation {
                    implementation,
                    inputs: inputs
                        .into_iter()
                        .map(|(k, v)| (k, Value::from(v)))
                        .collect(),
                    executor,
                    max_retries,
                    retry_interval: None,
                })
        }

        proptest::proptest! {
            #[test]
            fn prop_no_op_absorbs(under in arb_operation()) {
                let merged =
                    merge_operation_type_over_type(Some(&under), Some(&Operation::no_op()));
                prop_assert!(merged.is_no_op());

                let merged = merge_operation_template_over_type(
                    Some(&under),
                    Some(&Operation::no_op()),
                    "x",
                )
                .unwrap();
                prop_assert!(merged.is_no_op());
            }

            #[test]
            fn prop_merge_over_no_op_is_identity(over in arb_operation()) {
                let merged = merge_operation_template_over_type(
                    Some(&Operation::no_op()),
                    Some(&over),
                    "x",
                )
                .unwrap();
                prop_assert_eq!(merged, over);
            }
        }
    }
}
