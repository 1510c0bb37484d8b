//! The public compilation pipeline.
//!
//! `compile` runs one full pass: flatten imports, resolve every element in
//! dependency order, assemble the plan. All-or-nothing: the first failure
//! aborts the pass and nothing is returned.

use crate::elements;
use crate::imports::{self, ImportResolver};
use crate::plan::{self, Plan};
use keystone_core::{CompileError, CompileResult, ValueMap, kind_name};
use keystone_schema::ResolveOptions;
use serde_json::Value;

/// Caller knobs for one compilation pass.
#[derive(Default)]
pub struct CompileOptions {
    /// Accept document keys not declared in the schema
    pub lenient: bool,
    /// Pass inputs (e.g. `validate_version`) backing the elements'
    /// pass-input requirements
    pub inputs: ValueMap,
}

/// Compile a blueprint document into a deployment plan.
///
/// # Errors
///
/// Returns the first import, validation, parse, or cycle failure. Every
/// error carries a stable numeric code and, where one exists, the
/// offending element's name.
pub fn compile(
    document: Value,
    options: &CompileOptions,
    resolver: &dyn ImportResolver,
) -> CompileResult<Plan> {
    if !document.is_object() {
        return Err(CompileError::InvalidDocument {
            reason: format!("top level must be a mapping, got {}", kind_name(&document)),
        });
    }

    let document = imports::flatten(document, resolver)?;
    let registry = elements::registry()?;
    let resolve_options = ResolveOptions {
        strict: !options.lenient,
        inputs: options.inputs.clone(),
    };
    let context = keystone_schema::resolve(registry, elements::ROOT, document, &resolve_options)?;
    tracing::debug!("blueprint resolved");
    Ok(plan::assemble(&context))
}

/// Compile blueprint YAML source.
///
/// # Errors
///
/// As [`compile`], plus loader errors.
pub fn compile_source(
    text: &str,
    options: &CompileOptions,
    resolver: &dyn ImportResolver,
) -> CompileResult<Plan> {
    compile(crate::loader::load_yaml(text)?, options, resolver)
}

/// Validate a blueprint document without keeping the plan.
///
/// # Errors
///
/// As [`compile`].
pub fn validate(
    document: Value,
    options: &CompileOptions,
    resolver: &dyn ImportResolver,
) -> CompileResult<()> {
    compile(document, options, resolver).map(|_| ())
}
