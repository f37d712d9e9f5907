//! Executable schema assembly.
//!
//! `SchemaAssembler` drives the whole pipeline: merge the type definitions,
//! record the dependency map, construct every declared type through the
//! registry, pick the root operation types, then lower everything into the
//! execution engine and let it validate the result.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use async_graphql::dynamic::{Schema, SchemaBuilder};
use tracing::debug;

use super::directives::{DirectiveTarget, SchemaDirectives, apply_directives};
use super::executable::ExecutableSchema;
use super::lower;
use super::registry::TypeRegistry;
use super::types::{ObjectType, SchemaRoots};
use crate::bindings::Resolvers;
use crate::config::SchemaBuilderConfig;
use crate::dependency::DependencyMap;
use crate::document::{DeclarationKind, Document, TypeDefs};
use crate::error::SchemaError;

/// Hook applied to the engine's schema builder before it is finished.
pub type SchemaExtension = Arc<dyn Fn(SchemaBuilder) -> SchemaBuilder + Send + Sync>;

/// Caller context registered as schema data.
///
/// Resolvers reach it with `ctx.data::<SchemaContext>()`.
#[derive(Clone)]
pub struct SchemaContext(Arc<dyn Any + Send + Sync>);

impl SchemaContext {
    /// Returns the context if it has type `T`.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }
}

impl fmt::Debug for SchemaContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SchemaContext(..)")
    }
}

/// Assembles an [`ExecutableSchema`] from type definitions and bindings.
///
/// # Example
///
/// ```ignore
/// let schema = SchemaAssembler::new("type Query { hello: String }")
///     .resolvers(resolvers)
///     .config(SchemaBuilderConfig::default())
///     .build()?;
///
/// let response = schema.execute("{ hello }").await;
/// ```
pub struct SchemaAssembler {
    type_defs: TypeDefs,
    resolvers: Resolvers,
    directives: SchemaDirectives,
    extensions: Vec<SchemaExtension>,
    context: Option<Arc<dyn Any + Send + Sync>>,
    config: SchemaBuilderConfig,
}

impl SchemaAssembler {
    /// Creates an assembler for the given type definitions.
    #[must_use]
    pub fn new(type_defs: impl Into<TypeDefs>) -> Self {
        Self {
            type_defs: type_defs.into(),
            resolvers: Resolvers::default(),
            directives: SchemaDirectives::default(),
            extensions: Vec::new(),
            context: None,
            config: SchemaBuilderConfig::default(),
        }
    }

    #[must_use]
    pub fn resolvers(mut self, resolvers: Resolvers) -> Self {
        self.resolvers = resolvers;
        self
    }

    #[must_use]
    pub fn directives(mut self, directives: SchemaDirectives) -> Self {
        self.directives = directives;
        self
    }

    /// Adds an engine extension. Extensions run in the order they were added.
    #[must_use]
    pub fn extension(
        mut self,
        extension: impl Fn(SchemaBuilder) -> SchemaBuilder + Send + Sync + 'static,
    ) -> Self {
        self.extensions.push(Arc::new(extension));
        self
    }

    /// Sets the caller context handed to directive implementations and
    /// registered as [`SchemaContext`] for resolvers.
    #[must_use]
    pub fn context<T: Any + Send + Sync>(mut self, context: T) -> Self {
        self.context = Some(Arc::new(context));
        self
    }

    #[must_use]
    pub fn config(mut self, config: SchemaBuilderConfig) -> Self {
        self.config = config;
        self
    }

    /// Runs the assembly.
    ///
    /// # Errors
    ///
    /// Returns the first failure of any step. Engine validation failures
    /// carry the dependency map of the definitions.
    pub fn build(self) -> Result<ExecutableSchema, SchemaError> {
        let Self {
            type_defs,
            resolvers,
            directives,
            extensions,
            context,
            config,
        } = self;

        config.validate()?;
        debug!("Starting schema assembly");

        let document = Document::parse(type_defs)?;
        let dependencies = DependencyMap::from_document(&document);
        debug!(declarations = dependencies.len(), "Built dependency map");

        resolvers.check_against(&document)?;

        let mut registry = TypeRegistry::new(&document, &resolvers, &directives, context.as_deref());
        registry.resolve_all()?;

        let roots = match document.schema_definition() {
            Some(schema) => {
                let roots = SchemaRoots {
                    query: match &schema.query {
                        Some(name) => {
                            explicit_root(&mut registry, &dependencies, "query", &name.node)?
                        }
                        None => {
                            return Err(SchemaError::invalid_root(
                                "query",
                                "",
                                "the schema definition declares no query type",
                                &dependencies,
                            ));
                        }
                    },
                    mutation: schema
                        .mutation
                        .as_ref()
                        .map(|name| explicit_root(&mut registry, &dependencies, "mutation", &name.node))
                        .transpose()?,
                    subscription: schema
                        .subscription
                        .as_ref()
                        .map(|name| {
                            explicit_root(&mut registry, &dependencies, "subscription", &name.node)
                        })
                        .transpose()?,
                };
                apply_directives(
                    &registry,
                    DirectiveTarget::Schema(&roots),
                    &schema.directives,
                    "schema",
                    false,
                )?;
                roots
            }
            None => SchemaRoots {
                query: explicit_root(
                    &mut registry,
                    &dependencies,
                    "query",
                    &config.root_names.query,
                )?,
                mutation: conventional_root(&mut registry, "mutation", &config.root_names.mutation)?,
                subscription: conventional_root(
                    &mut registry,
                    "subscription",
                    &config.root_names.subscription,
                )?,
            },
        };

        let (types, directive_types) = registry.into_parts();

        let mut builder = Schema::build(
            &roots.query.name,
            roots.mutation.as_ref().map(|root| root.name.as_str()),
            roots.subscription.as_ref().map(|root| root.name.as_str()),
        );
        builder = lower::register_types(
            builder,
            &types,
            roots.subscription.as_ref().map(|root| root.name.as_str()),
        )?;

        if let Some(max_depth) = config.max_depth {
            builder = builder.limit_depth(max_depth);
        }
        if let Some(max_complexity) = config.max_complexity {
            builder = builder.limit_complexity(max_complexity);
        }
        if !config.introspection {
            builder = builder.disable_introspection();
        }
        if let Some(context) = context {
            builder = builder.data(SchemaContext(context));
        }
        for extension in &extensions {
            builder = extension(builder);
        }

        let engine = match builder.finish() {
            Ok(engine) => engine,
            Err(err) => {
                debug!(
                    error = %err,
                    dependencies = %dependencies.to_pretty_json(),
                    "Schema construction failed"
                );
                return Err(SchemaError::SchemaConstruction {
                    message: err.to_string(),
                    dependencies,
                });
            }
        };

        debug!(
            types = types.len(),
            query = %roots.query.name,
            "Schema assembly complete"
        );
        Ok(ExecutableSchema::new(roots, types, directive_types, dependencies, engine))
    }
}

impl fmt::Debug for SchemaAssembler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaAssembler")
            .field("type_defs", &self.type_defs)
            .field("resolvers", &self.resolvers)
            .field("directives", &self.directives)
            .field("extensions", &self.extensions.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Assembles a schema with default configuration.
pub fn make_executable_schema(
    type_defs: impl Into<TypeDefs>,
    resolvers: Resolvers,
) -> Result<ExecutableSchema, SchemaError> {
    SchemaAssembler::new(type_defs).resolvers(resolvers).build()
}

/// A required root: missing or non-object is an error.
fn explicit_root(
    registry: &mut TypeRegistry<'_>,
    dependencies: &DependencyMap,
    operation: &'static str,
    name: &str,
) -> Result<Arc<ObjectType>, SchemaError> {
    match registry.get_object(name) {
        Ok(root) => Ok(root),
        Err(SchemaError::UnresolvedReference { .. }) => Err(SchemaError::invalid_root(
            operation,
            name,
            "type is not declared",
            dependencies,
        )),
        Err(SchemaError::InvalidReference { found, .. }) => Err(SchemaError::invalid_root(
            operation,
            name,
            format!("`{name}` is {found}, not an object"),
            dependencies,
        )),
        Err(err) => Err(err),
    }
}

/// An optional root found by naming convention.
fn conventional_root(
    registry: &mut TypeRegistry<'_>,
    operation: &'static str,
    name: &str,
) -> Result<Option<Arc<ObjectType>>, SchemaError> {
    match registry.document().kind_of(name) {
        Some(DeclarationKind::Object) => registry.get_object(name).map(Some),
        Some(kind) => {
            debug!(operation, type_name = %name, %kind, "Conventional root is not an object, skipping");
            Ok(None)
        }
        None => {
            debug!(operation, type_name = %name, "No conventional root declared");
            Ok(None)
        }
    }
}
