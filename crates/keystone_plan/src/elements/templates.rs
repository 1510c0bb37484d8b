//! Node templates and their relationship instances.
//!
//! A template binds a node type to a concrete node: its properties are
//! reconciled with the type's property schema, its interfaces merge
//! template-over-type, and each relationship instance resolves its type
//! and its target template. The section element then derives everything
//! that needs the whole node set at once: host assignment and the plugin
//! install lists.

use super::{
    NODE_TEMPLATE, NODE_TEMPLATES, NODE_TYPES, PLUGINS, RAW_MAPPING, RELATIONSHIPS,
    REQUIRED_STRING, TEMPLATE_RELATIONSHIP, TEMPLATE_RELATIONSHIPS, targets_template,
};
use crate::hierarchy::apply_schema;
use crate::interfaces::{
    interfaces_from_raw, interfaces_from_value, interfaces_to_value,
    merge_interfaces_template_over_type, operations_table, plugin_of, validate_operation_plugins,
};
use crate::plan::{CONTAINED_IN, HOST_TYPE};
use indexmap::IndexMap;
use keystone_core::{CompileError, CompileResult, ValueMap};
use keystone_schema::{
    Behavior, DictField, ElementType, EvalContext, Registry, RequirementGroup, RequirementSpec,
    Schema,
};
use serde_json::Value;

fn plugin_names(cx: &EvalContext<'_>) -> Vec<String> {
    cx.req_value("plugins")
        .and_then(Value::as_object)
        .map(|plugins| plugins.keys().cloned().collect())
        .unwrap_or_default()
}

struct NodeTemplateBehavior;

impl Behavior for NodeTemplateBehavior {
    fn validate(&self, cx: &EvalContext<'_>) -> CompileResult<()> {
        let Some(type_name) = cx.child_parsed("type").and_then(Value::as_str) else {
            return Ok(());
        };
        let declared = cx
            .req_value("node_types")
            .and_then(Value::as_object)
            .is_some_and(|types| types.contains_key(type_name));
        if !declared {
            return Err(CompileError::UnknownType {
                element: cx.path(),
                type_name: type_name.to_string(),
            });
        }
        Ok(())
    }

    fn parse(&self, cx: &EvalContext<'_>) -> CompileResult<Value> {
        let path = cx.path();
        let type_name = cx
            .child_parsed("type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let type_record = cx
            .req_value("node_types")
            .and_then(|types| types.get(&type_name))
            .cloned()
            .unwrap_or(Value::Null);

        let schema = type_record
            .get("properties")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        let instance_properties = cx
            .child_parsed("properties")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        let properties = apply_schema(&schema, &instance_properties, &path)?;

        let type_interfaces = interfaces_from_value(type_record.get("interfaces"));
        let own_interfaces = interfaces_from_raw(
            cx.child_parsed("interfaces"),
            &format!("{path}.interfaces"),
        )?;
        let merged = merge_interfaces_template_over_type(&type_interfaces, &own_interfaces, &path)?;
        validate_operation_plugins(&merged, &plugin_names(cx), &path)?;

        let mut record = ValueMap::new();
        record.insert("id".to_string(), Value::String(cx.name().to_string()));
        record.insert("name".to_string(), Value::String(cx.name().to_string()));
        record.insert("type".to_string(), Value::String(type_name));
        record.insert(
            "type_hierarchy".to_string(),
            type_record
                .get("type_hierarchy")
                .cloned()
                .unwrap_or_else(|| Value::Array(Vec::new())),
        );
        record.insert("properties".to_string(), Value::Object(properties));
        record.insert("interfaces".to_string(), interfaces_to_value(&merged));
        record.insert(
            "operations".to_string(),
            Value::Object(operations_table(&merged)),
        );
        record.insert(
            "relationships".to_string(),
            cx.child_parsed("relationships")
                .cloned()
                .unwrap_or_else(|| Value::Array(Vec::new())),
        );
        Ok(Value::Object(record))
    }
}

struct TemplateRelationshipBehavior;

impl Behavior for TemplateRelationshipBehavior {
    fn validate(&self, cx: &EvalContext<'_>) -> CompileResult<()> {
        if let Some(type_name) = cx.child_parsed("type").and_then(Value::as_str) {
            let declared = cx
                .req_value("relationship_types")
                .and_then(Value::as_object)
                .is_some_and(|types| types.contains_key(type_name));
            if !declared {
                return Err(CompileError::UnknownType {
                    element: cx.path(),
                    type_name: type_name.to_string(),
                });
            }
        }
        if let Some(target) = cx.child_parsed("target").and_then(Value::as_str) {
            if cx.req_value("target_template").is_none() {
                return Err(CompileError::UnknownTarget {
                    element: cx.path(),
                    target: target.to_string(),
                });
            }
        }
        Ok(())
    }

    fn parse(&self, cx: &EvalContext<'_>) -> CompileResult<Value> {
        let path = cx.path();
        let type_name = cx
            .child_parsed("type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let type_record = cx
            .req_value("relationship_types")
            .and_then(|types| types.get(&type_name))
            .cloned()
            .unwrap_or(Value::Null);

        let schema = type_record
            .get("properties")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        let instance_properties = cx
            .child_parsed("properties")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        let properties = apply_schema(&schema, &instance_properties, &path)?;

        let names = plugin_names(cx);
        let interface_field = |field: &str| -> CompileResult<(Value, ValueMap)> {
            let type_interfaces = interfaces_from_value(type_record.get(field));
            let own_interfaces =
                interfaces_from_raw(cx.child_parsed(field), &format!("{path}.{field}"))?;
            let merged =
                merge_interfaces_template_over_type(&type_interfaces, &own_interfaces, &path)?;
            validate_operation_plugins(&merged, &names, &path)?;
            Ok((interfaces_to_value(&merged), operations_table(&merged)))
        };
        let (source_interfaces, source_operations) = interface_field("source_interfaces")?;
        let (target_interfaces, target_operations) = interface_field("target_interfaces")?;

        let mut record = ValueMap::new();
        record.insert("type".to_string(), Value::String(type_name));
        record.insert(
            "target_id".to_string(),
            cx.child_parsed("target").cloned().unwrap_or(Value::Null),
        );
        record.insert(
            "type_hierarchy".to_string(),
            type_record
                .get("type_hierarchy")
                .cloned()
                .unwrap_or_else(|| Value::Array(Vec::new())),
        );
        record.insert("properties".to_string(), Value::Object(properties));
        record.insert("source_interfaces".to_string(), source_interfaces);
        record.insert("target_interfaces".to_string(), target_interfaces);
        record.insert(
            "source_operations".to_string(),
            Value::Object(source_operations),
        );
        record.insert(
            "target_operations".to_string(),
            Value::Object(target_operations),
        );
        Ok(Value::Object(record))
    }
}

/// One plugin use: the plugin's name plus the operation-level executor
/// override, if any.
type PluginUse = (String, Option<String>);

struct NodeTemplatesBehavior;

impl NodeTemplatesBehavior {
    /// Plugin uses of one serialized interface map.
    fn interface_uses(interfaces: Option<&Value>, uses: &mut Vec<PluginUse>) {
        for operations in interfaces_from_value(interfaces).values() {
            for operation in operations.values() {
                if operation.implementation.is_empty() {
                    continue;
                }
                let plugin = plugin_of(&operation.implementation)
                    .unwrap_or(operation.implementation.as_str());
                uses.push((
                    plugin.to_string(),
                    operation.executor.map(|e| e.as_str().to_string()),
                ));
            }
        }
    }

    /// The target of the node's containment relationship, if any.
    fn contained_in(node: &ValueMap, element: &str) -> CompileResult<Option<String>> {
        let mut found = None;
        let relationships = node
            .get("relationships")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        for relationship in &relationships {
            let contains = relationship
                .get("type_hierarchy")
                .and_then(Value::as_array)
                .is_some_and(|h| h.iter().any(|t| t.as_str() == Some(CONTAINED_IN)));
            if !contains {
                continue;
            }
            if found.is_some() {
                return Err(CompileError::DuplicateEntry {
                    element: element.to_string(),
                    entry: "contained_in relationship".to_string(),
                });
            }
            found = relationship
                .get("target_id")
                .and_then(Value::as_str)
                .map(str::to_string);
        }
        Ok(found)
    }

    fn is_host(node: &ValueMap) -> bool {
        node.get("type_hierarchy")
            .and_then(Value::as_array)
            .is_some_and(|h| h.iter().any(|t| t.as_str() == Some(HOST_TYPE)))
    }
}

impl Behavior for NodeTemplatesBehavior {
    fn parse(&self, cx: &EvalContext<'_>) -> CompileResult<Value> {
        let plugins = cx
            .req_value("plugins")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        let mut nodes: Vec<ValueMap> = cx
            .children()
            .filter_map(|child| child.parsed.as_ref().and_then(Value::as_object).cloned())
            .collect();

        // Plugin uses per node. Source-side operations belong to the
        // declaring node, target-side operations to the target node.
        let mut uses: IndexMap<String, Vec<PluginUse>> = IndexMap::new();
        for node in &nodes {
            uses.entry(node["name"].as_str().unwrap_or_default().to_string())
                .or_default();
        }
        for node in &nodes {
            let name = node["name"].as_str().unwrap_or_default().to_string();
            let own = uses.entry(name).or_default();
            Self::interface_uses(node.get("interfaces"), own);

            let relationships = node
                .get("relationships")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            for relationship in &relationships {
                let mut source = Vec::new();
                Self::interface_uses(relationship.get("source_interfaces"), &mut source);
                uses.entry(node["name"].as_str().unwrap_or_default().to_string())
                    .or_default()
                    .extend(source);

                if let Some(target) = relationship.get("target_id").and_then(Value::as_str) {
                    let mut target_uses = Vec::new();
                    Self::interface_uses(relationship.get("target_interfaces"), &mut target_uses);
                    uses.entry(target.to_string()).or_default().extend(target_uses);
                }
            }
        }

        // Per-node plugin records with effective executors, deduplicated
        // by (name, executor).
        let mut node_plugins: IndexMap<String, Vec<Value>> = IndexMap::new();
        for (name, node_uses) in &uses {
            let mut records: Vec<Value> = Vec::new();
            for (plugin, op_executor) in node_uses {
                let Some(declared) = plugins.get(plugin).and_then(Value::as_object) else {
                    continue;
                };
                let mut record = declared.clone();
                let executor = op_executor.clone().or_else(|| {
                    declared
                        .get("executor")
                        .and_then(Value::as_str)
                        .map(str::to_string)
                });
                record.insert(
                    "executor".to_string(),
                    executor.map_or(Value::Null, Value::String),
                );
                let record = Value::Object(record);
                if !records.contains(&record) {
                    records.push(record);
                }
            }
            node_plugins.insert(name.clone(), records);
        }

        // Host assignment: walk containment to the nearest host-typed
        // ancestor, the node itself included.
        let by_name: IndexMap<String, ValueMap> = nodes
            .iter()
            .map(|n| (n["name"].as_str().unwrap_or_default().to_string(), n.clone()))
            .collect();
        let mut host_ids: IndexMap<String, Option<String>> = IndexMap::new();
        for node in &nodes {
            let name = node["name"].as_str().unwrap_or_default().to_string();
            let mut current = node.clone();
            let host = loop {
                if Self::is_host(&current) {
                    break Some(
                        current["name"].as_str().unwrap_or_default().to_string(),
                    );
                }
                let current_name = current["name"].as_str().unwrap_or_default().to_string();
                let current_element = format!("{}.{}", cx.path(), current_name);
                match Self::contained_in(&current, &current_element)? {
                    Some(target) => match by_name.get(&target) {
                        Some(next) => current = next.clone(),
                        None => break None,
                    },
                    None => break None,
                }
            };
            host_ids.insert(name.clone(), host);
        }

        // Host install lists: every host collects the host-executor
        // plugins of the nodes it hosts, deduplicated by name.
        let mut installs: IndexMap<String, Vec<Value>> = IndexMap::new();
        for node in &nodes {
            let name = node["name"].as_str().unwrap_or_default().to_string();
            let Some(Some(host)) = host_ids.get(&name) else {
                continue;
            };
            let host_list = installs.entry(host.clone()).or_default();
            for plugin in node_plugins.get(&name).map_or(&[][..], Vec::as_slice) {
                if plugin.get("executor").and_then(Value::as_str) != Some("host") {
                    continue;
                }
                let plugin_name = plugin.get("name").and_then(Value::as_str);
                let already = host_list
                    .iter()
                    .any(|p| p.get("name").and_then(Value::as_str) == plugin_name);
                if !already {
                    host_list.push(plugin.clone());
                }
            }
        }

        for node in &mut nodes {
            let name = node["name"].as_str().unwrap_or_default().to_string();
            let records = node_plugins.get(&name).cloned().unwrap_or_default();
            let central: Vec<Value> = records
                .iter()
                .filter(|p| p.get("executor").and_then(Value::as_str) == Some("central"))
                .cloned()
                .collect();
            node.insert("plugins".to_string(), Value::Array(records));
            node.insert(
                "deployment_plugins_to_install".to_string(),
                Value::Array(central),
            );
            if let Some(Some(host)) = host_ids.get(&name) {
                node.insert("host_id".to_string(), Value::String(host.clone()));
            }
            if Self::is_host(node) {
                node.insert(
                    "plugins_to_install".to_string(),
                    Value::Array(installs.get(&name).cloned().unwrap_or_default()),
                );
            }
        }

        Ok(Value::Array(nodes.into_iter().map(Value::Object).collect()))
    }

    fn provide(&self, cx: &EvalContext<'_>) -> CompileResult<ValueMap> {
        let names = cx
            .children()
            .map(|c| Value::String(c.name.clone()))
            .collect();
        let mut provided = ValueMap::new();
        provided.insert("template_names".to_string(), Value::Array(names));
        Ok(provided)
    }
}

pub(super) fn define(registry: &mut Registry) -> CompileResult<()> {
    registry.define(
        ElementType::new(NODE_TEMPLATES, Schema::Map(NODE_TEMPLATE))
            .requires(RequirementGroup::on_element(
                PLUGINS,
                vec![RequirementSpec::parsed("plugins").optional()],
            ))
            .provides(["template_names"])
            .behavior(NodeTemplatesBehavior),
    )?;
    registry.define(
        ElementType::new(
            NODE_TEMPLATE,
            Schema::dict([
                DictField::new("type", REQUIRED_STRING),
                DictField::new("properties", RAW_MAPPING),
                DictField::new("interfaces", RAW_MAPPING),
                DictField::new("relationships", TEMPLATE_RELATIONSHIPS),
            ]),
        )
        .requires(RequirementGroup::on_element(
            NODE_TYPES,
            vec![RequirementSpec::parsed("node_types").optional()],
        ))
        .requires(RequirementGroup::on_element(
            PLUGINS,
            vec![RequirementSpec::parsed("plugins").optional()],
        ))
        .behavior(NodeTemplateBehavior),
    )?;
    registry.define(ElementType::new(
        TEMPLATE_RELATIONSHIPS,
        Schema::List(TEMPLATE_RELATIONSHIP),
    ))?;
    registry.define(
        ElementType::new(
            TEMPLATE_RELATIONSHIP,
            Schema::dict([
                DictField::new("type", REQUIRED_STRING),
                DictField::new("target", REQUIRED_STRING),
                DictField::new("properties", RAW_MAPPING),
                DictField::new("source_interfaces", RAW_MAPPING),
                DictField::new("target_interfaces", RAW_MAPPING),
            ]),
        )
        .requires(RequirementGroup::on_element(
            RELATIONSHIPS,
            vec![RequirementSpec::parsed("relationship_types").optional()],
        ))
        .requires(RequirementGroup::on_element(
            NODE_TEMPLATE,
            vec![
                RequirementSpec::parsed("target_template")
                    .optional()
                    .filtered(targets_template),
            ],
        ))
        .requires(RequirementGroup::on_element(
            PLUGINS,
            vec![RequirementSpec::parsed("plugins").optional()],
        ))
        .behavior(TemplateRelationshipBehavior),
    )
}
