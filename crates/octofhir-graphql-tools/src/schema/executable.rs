//! The assembled schema.

use std::fmt;
use std::sync::Arc;

use async_graphql::dynamic::Schema;
use async_graphql::{Request, Response};
use indexmap::IndexMap;

use super::types::{DirectiveType, NamedType, ObjectType, SchemaRoots};
use crate::dependency::DependencyMap;

/// Root types, every constructed type and directive, and the engine schema
/// built from them. Immutable once assembled.
///
/// The schema owns the type graph. Deferred references between types are
/// weak, so types cloned out of it resolve their [`Thunk`](super::Thunk)s
/// only while the schema, or another owner of the target type, is alive.
#[derive(Clone)]
pub struct ExecutableSchema {
    roots: SchemaRoots,
    types: IndexMap<String, NamedType>,
    directives: IndexMap<String, Arc<DirectiveType>>,
    dependencies: DependencyMap,
    engine: Schema,
}

impl ExecutableSchema {
    pub(crate) fn new(
        roots: SchemaRoots,
        types: IndexMap<String, NamedType>,
        directives: IndexMap<String, Arc<DirectiveType>>,
        dependencies: DependencyMap,
        engine: Schema,
    ) -> Self {
        Self {
            roots,
            types,
            directives,
            dependencies,
            engine,
        }
    }

    pub fn query(&self) -> &Arc<ObjectType> {
        &self.roots.query
    }

    pub fn mutation(&self) -> Option<&Arc<ObjectType>> {
        self.roots.mutation.as_ref()
    }

    pub fn subscription(&self) -> Option<&Arc<ObjectType>> {
        self.roots.subscription.as_ref()
    }

    /// Every constructed type, built-in scalars included.
    pub fn types(&self) -> impl Iterator<Item = (&str, &NamedType)> {
        self.types.iter().map(|(name, ty)| (name.as_str(), ty))
    }

    pub fn get_type(&self, name: &str) -> Option<&NamedType> {
        self.types.get(name)
    }

    pub fn directives(&self) -> impl Iterator<Item = (&str, &Arc<DirectiveType>)> {
        self.directives
            .iter()
            .map(|(name, directive)| (name.as_str(), directive))
    }

    pub fn get_directive(&self, name: &str) -> Option<&Arc<DirectiveType>> {
        self.directives.get(name)
    }

    /// Dependency map of the merged definitions.
    pub fn dependencies(&self) -> &DependencyMap {
        &self.dependencies
    }

    /// The execution engine schema.
    pub fn engine(&self) -> &Schema {
        &self.engine
    }

    /// SDL of the engine schema.
    pub fn sdl(&self) -> String {
        self.engine.sdl()
    }

    /// Executes a query or mutation.
    pub async fn execute(&self, request: impl Into<Request>) -> Response {
        let request: Request = request.into();
        self.engine.execute(request).await
    }
}

impl fmt::Debug for ExecutableSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutableSchema")
            .field("query", &self.roots.query.name)
            .field("mutation", &self.roots.mutation.as_ref().map(|r| &r.name))
            .field("subscription", &self.roots.subscription.as_ref().map(|r| &r.name))
            .field("types", &self.types.keys().collect::<Vec<_>>())
            .field("directives", &self.directives.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}
