//! The deployment plan: the flat output of a resolution pass.

use crate::elements;
use keystone_core::{CompileResult, ValueMap};
use keystone_schema::Context;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A node is a host when its type hierarchy contains this marker type.
pub const HOST_TYPE: &str = "keystone.nodes.Host";

/// A relationship expresses containment when its type hierarchy contains
/// this marker type.
pub const CONTAINED_IN: &str = "keystone.relationships.contained_in";

/// The fully resolved deployment plan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    /// Parsed version declarator (`raw` plus numeric `components`)
    pub version: Value,
    /// Top-level description
    pub description: Value,
    /// Declared inputs, by name
    pub inputs: ValueMap,
    /// Declared outputs, by name
    pub outputs: ValueMap,
    /// Resolved nodes, in declaration order
    pub nodes: Vec<Value>,
    /// Resolved relationship types, by name
    pub relationships: ValueMap,
    /// Resolved groups, by name
    pub groups: ValueMap,
    /// Resolved policy types, by name
    pub policy_types: ValueMap,
    /// Resolved policy triggers, by name
    pub policy_triggers: ValueMap,
    /// Resolved workflows, by name
    pub workflows: ValueMap,
    /// Plugins referenced by workflow mappings
    pub workflow_plugins_to_install: Vec<Value>,
    /// Union of the nodes' central-executor plugins
    pub deployment_plugins_to_install: Vec<Value>,
}

impl Plan {
    /// The plan as a plain document value.
    ///
    /// # Errors
    ///
    /// Serialization of a well-formed plan cannot fail in practice; an
    /// error here indicates a bug in plan assembly.
    pub fn to_value(&self) -> CompileResult<Value> {
        serde_json::to_value(self).map_err(|e| keystone_core::CompileError::InvalidDocument {
            reason: e.to_string(),
        })
    }
}

/// Assemble the plan from a fully evaluated parse tree.
pub(crate) fn assemble(context: &Context) -> Plan {
    let section = |tag| -> Value {
        context
            .instances(tag)
            .first()
            .and_then(|&i| context.node(i).parsed.clone())
            .unwrap_or(Value::Null)
    };
    let section_map = |tag| -> ValueMap {
        match section(tag) {
            Value::Object(map) => map,
            _ => ValueMap::new(),
        }
    };

    let version = context
        .instances(elements::VERSION)
        .first()
        .and_then(|&i| context.node(i).provided.as_ref())
        .and_then(|provided| provided.get("version"))
        .cloned()
        .unwrap_or(Value::Null);

    let nodes = match section(elements::NODE_TEMPLATES) {
        Value::Array(nodes) => nodes,
        _ => Vec::new(),
    };

    let workflow_plugins_to_install = context
        .instances(elements::WORKFLOWS)
        .first()
        .and_then(|&i| context.node(i).provided.as_ref())
        .and_then(|provided| provided.get("workflow_plugins_to_install"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    // Plan-wide central plugins: union of the per-node lists, first
    // occurrence wins, keyed by plugin name.
    let mut deployment_plugins_to_install: Vec<Value> = Vec::new();
    for node in &nodes {
        let Some(plugins) = node
            .get("deployment_plugins_to_install")
            .and_then(Value::as_array)
        else {
            continue;
        };
        for plugin in plugins {
            let name = plugin.get("name").and_then(Value::as_str);
            let already = deployment_plugins_to_install
                .iter()
                .any(|p| p.get("name").and_then(Value::as_str) == name);
            if !already {
                deployment_plugins_to_install.push(plugin.clone());
            }
        }
    }

    Plan {
        version,
        description: section(elements::DESCRIPTION),
        inputs: section_map(elements::INPUTS),
        outputs: section_map(elements::OUTPUTS),
        nodes,
        relationships: section_map(elements::RELATIONSHIPS),
        groups: section_map(elements::GROUPS),
        policy_types: section_map(elements::POLICY_TYPES),
        policy_triggers: section_map(elements::POLICY_TRIGGERS),
        workflows: section_map(elements::WORKFLOWS),
        workflow_plugins_to_install,
        deployment_plugins_to_install,
    }
}
