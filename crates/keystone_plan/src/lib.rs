//! KEYSTONE Blueprint Compiler
//!
//! Compiles a declarative infrastructure blueprint - node types, node
//! templates, relationships, interfaces, policies, groups, workflows -
//! into a fully resolved, flat deployment plan: every type's inherited
//! properties resolved, every operation's implementation and inputs
//! resolved across type and instance boundaries, every cross-reference
//! validated to exist.
//!
//! This crate owns the blueprint language; the generic resolution engine
//! underneath lives in `keystone_schema`.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod compile;
pub mod elements;
pub mod hierarchy;
pub mod imports;
pub mod interfaces;
pub mod loader;
pub mod plan;

pub use compile::{CompileOptions, compile, compile_source, validate};
pub use imports::{FsResolver, ImportResolver, MemoryResolver, NullResolver};
pub use interfaces::{Executor, InterfaceMap, Operation, OperationMap};
pub use loader::load_yaml;
pub use plan::{CONTAINED_IN, HOST_TYPE, Plan};
