//! KEYSTONE Element Resolution Engine
//!
//! A small, general-purpose declarative-language compiler front end.
//! Document sub-trees declare typed handlers ("elements") with cross-tree
//! data dependencies; the engine builds a parse tree isomorphic to the
//! declared schema, derives a dependency graph from each element type's
//! declared requirements, and evaluates every element exactly once in
//! topological order, feeding each one the already-computed values it
//! asked for.
//!
//! This crate is domain-agnostic: it knows nothing about blueprints.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod context;
pub mod element;
pub mod graph;
pub mod requirements;
pub mod scheduler;
pub mod schema;

pub use context::{Context, ElementNode};
pub use element::{Behavior, DefaultBehavior, ElementTag, ElementType, EvalContext, Registry};
pub use graph::DependencyGraph;
pub use requirements::{
    Predicate, RequirementGroup, RequirementSource, RequirementSpec, ResolvedRequirements,
    Resolution,
};
pub use scheduler::{ResolveOptions, resolve};
pub use schema::{DictField, ScalarKind, Schema};
