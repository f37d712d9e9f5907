//! Type construction and schema assembly.
//!
//! ## Components
//!
//! - [`TypeRegistry`] - lazy, at-most-once type construction with thunks for cycles
//! - [`SchemaDirectiveVisitor`] - construction-time directive behavior
//! - [`SchemaAssembler`] - drives assembly and produces an [`ExecutableSchema`]
//!
//! ## Assembly
//!
//! 1. Type definitions are merged into one document
//! 2. The dependency map is recorded for diagnostics
//! 3. Every declaration is constructed through the registry
//! 4. Root types come from the schema definition, or from conventional names
//! 5. Types are lowered into the execution engine, which validates them

mod builder;
mod directives;
mod executable;
mod lower;
mod registry;
mod types;

pub use builder::{SchemaAssembler, SchemaContext, SchemaExtension, make_executable_schema};
pub use directives::{
    DEFAULT_DEPRECATION_REASON, DirectiveArgs, DirectiveContext, DirectiveTarget,
    SchemaDirectiveVisitor, SchemaDirectives, apply_directives, names,
};
pub use executable::ExecutableSchema;
pub use registry::TypeRegistry;
pub use types::{
    Deprecation, DirectiveLocation, DirectiveType, EnumType, EnumValueDefinition,
    FieldDefinition, InputObjectType, InputValueDefinition, InterfaceType, NamedType, ObjectType,
    ScalarType, SchemaRoots, Thunk, TypeHandle, TypeReference, UnionType,
};
