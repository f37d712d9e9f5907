//! # octofhir-graphql-tools
//!
//! Executable GraphQL schema assembly from SDL.
//!
//! This crate turns one or more SDL fragments plus a table of behavior
//! bindings into a single validated schema that the async-graphql dynamic
//! engine can execute. It supports:
//!
//! - Merging fragments that redeclare or `extend` the same types
//! - Mutually recursive types, resolved lazily with thunks
//! - Field resolvers, custom scalars, enum value mappings and type resolvers
//! - Construction-time schema directives
//! - Explicit `schema { ... }` blocks or conventionally named root types
//!
//! ## Example
//!
//! ```ignore
//! use async_graphql::Value;
//! use async_graphql::dynamic::FieldFuture;
//! use octofhir_graphql_tools::{Resolvers, make_executable_schema};
//!
//! let resolvers = Resolvers::builder()
//!     .field("Query.hello", |_| {
//!         FieldFuture::new(async { Ok(Some(Value::from("world"))) })
//!     })
//!     .build()?;
//!
//! let schema = make_executable_schema("type Query { hello: String }", resolvers)?;
//! let response = schema.execute("{ hello }").await;
//! ```
//!
//! ## Modules
//!
//! - [`document`] - Definition merging
//! - [`dependency`] - Declaration dependency map
//! - [`bindings`] - Resolver bindings
//! - [`schema`] - Type registry, directives and schema assembly
//! - [`config`] - Configuration options
//! - [`error`] - Error types for schema assembly

pub mod bindings;
pub mod config;
pub mod dependency;
pub mod document;
pub mod error;
pub mod schema;

// Re-export main types
pub use bindings::{
    Binding, EnumBinding, FieldResolver, Resolvers, ResolversBuilder, ScalarBinding,
    SubscriptionResolver, TypeResolver,
};
pub use config::{RootTypeNames, SchemaBuilderConfig};
pub use dependency::DependencyMap;
pub use document::{Document, TypeDefs, is_valid_name};
pub use error::SchemaError;
pub use schema::{
    ExecutableSchema, SchemaAssembler, SchemaContext, SchemaDirectiveVisitor, SchemaDirectives,
    TypeRegistry, make_executable_schema,
};

/// Result type for schema assembly.
pub type Result<T> = std::result::Result<T, SchemaError>;
