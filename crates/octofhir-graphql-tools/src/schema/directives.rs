//! Schema directive application.
//!
//! Directives attached to types, fields, arguments, enum values, input fields
//! and the schema block are applied while the host is being constructed, in
//! the order they are written. Three built-in directives are handled
//! natively:
//!
//! - `@deprecated(reason)` - marks fields, arguments, input fields and enum values
//! - `@specifiedBy(url)` - records a scalar's specification URL
//! - `@oneOf` - marks an input object as a one-of input
//!
//! Every other directive needs an implementation, either in the
//! [`SchemaDirectives`] table or as a directive binding in the resolver table.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use async_graphql::Value;
use async_graphql_parser::Positioned;
use async_graphql_parser::types::{ConstDirective, DirectiveDefinition};
use indexmap::IndexMap;
use tracing::trace;

use super::registry::TypeRegistry;
use super::types::{
    Deprecation, DirectiveLocation, EnumType, EnumValueDefinition, FieldDefinition,
    InputObjectType, InputValueDefinition, InterfaceType, ObjectType, ScalarType, SchemaRoots,
    TypeHandle, UnionType,
};
use crate::error::SchemaError;

/// Built-in directive names.
pub mod names {
    pub const DEPRECATED: &str = "deprecated";
    pub const SPECIFIED_BY: &str = "specifiedBy";
    pub const ONE_OF: &str = "oneOf";
}

/// Reason recorded by `@deprecated` without arguments.
pub const DEFAULT_DEPRECATION_REASON: &str = "No longer supported";

/// Construction-time behavior of a schema directive.
///
/// Each method receives the in-progress host, before it is frozen into the
/// registry. Methods that are not overridden leave the host unchanged.
#[allow(unused_variables)]
pub trait SchemaDirectiveVisitor: Send + Sync {
    /// Observes the root operation types, which are the registered types
    /// themselves.
    fn visit_schema(
        &self,
        schema: &SchemaRoots,
        args: &DirectiveArgs,
        ctx: &DirectiveContext<'_>,
    ) -> Result<(), SchemaError> {
        Ok(())
    }

    fn visit_object(
        &self,
        object: &mut ObjectType,
        args: &DirectiveArgs,
        ctx: &DirectiveContext<'_>,
    ) -> Result<(), SchemaError> {
        Ok(())
    }

    fn visit_interface(
        &self,
        interface: &mut InterfaceType,
        args: &DirectiveArgs,
        ctx: &DirectiveContext<'_>,
    ) -> Result<(), SchemaError> {
        Ok(())
    }

    fn visit_union(
        &self,
        union: &mut UnionType,
        args: &DirectiveArgs,
        ctx: &DirectiveContext<'_>,
    ) -> Result<(), SchemaError> {
        Ok(())
    }

    fn visit_enum(
        &self,
        enm: &mut EnumType,
        args: &DirectiveArgs,
        ctx: &DirectiveContext<'_>,
    ) -> Result<(), SchemaError> {
        Ok(())
    }

    fn visit_enum_value(
        &self,
        value: &mut EnumValueDefinition,
        args: &DirectiveArgs,
        ctx: &DirectiveContext<'_>,
    ) -> Result<(), SchemaError> {
        Ok(())
    }

    fn visit_scalar(
        &self,
        scalar: &mut ScalarType,
        args: &DirectiveArgs,
        ctx: &DirectiveContext<'_>,
    ) -> Result<(), SchemaError> {
        Ok(())
    }

    fn visit_input_object(
        &self,
        input: &mut InputObjectType,
        args: &DirectiveArgs,
        ctx: &DirectiveContext<'_>,
    ) -> Result<(), SchemaError> {
        Ok(())
    }

    fn visit_input_field(
        &self,
        field: &mut InputValueDefinition,
        args: &DirectiveArgs,
        ctx: &DirectiveContext<'_>,
    ) -> Result<(), SchemaError> {
        Ok(())
    }

    fn visit_field_definition(
        &self,
        field: &mut FieldDefinition,
        args: &DirectiveArgs,
        ctx: &DirectiveContext<'_>,
    ) -> Result<(), SchemaError> {
        Ok(())
    }

    fn visit_argument(
        &self,
        argument: &mut InputValueDefinition,
        args: &DirectiveArgs,
        ctx: &DirectiveContext<'_>,
    ) -> Result<(), SchemaError> {
        Ok(())
    }
}

/// Arguments of one directive invocation, with defaults from the directive
/// definition filled in.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DirectiveArgs {
    values: IndexMap<String, Value>,
}

impl DirectiveArgs {
    fn from_invocation(
        invocation: &ConstDirective,
        definition: Option<&DirectiveDefinition>,
    ) -> Self {
        let mut values: IndexMap<String, Value> = invocation
            .arguments
            .iter()
            .map(|(name, value)| (name.node.to_string(), value.node.clone()))
            .collect();

        for argument in definition.map(|def| def.arguments.as_slice()).unwrap_or_default() {
            let name = argument.node.name.node.as_str();
            if let Some(default) = &argument.node.default_value
                && !values.contains_key(name)
            {
                values.insert(name.to_string(), default.node.clone());
            }
        }

        Self { values }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// String argument, `None` if absent or not a string.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        match self.values.get(name) {
            Some(Value::String(s)) => Some(s),
            _ => None,
        }
    }

    /// Boolean argument, `None` if absent or not a boolean.
    pub fn get_bool(&self, name: &str) -> Option<bool> {
        match self.values.get(name) {
            Some(Value::Boolean(b)) => Some(*b),
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// What a directive implementation can see besides its host.
pub struct DirectiveContext<'r> {
    directive: &'r str,
    host: &'r str,
    location: DirectiveLocation,
    allow_thunks: bool,
    registry: &'r TypeRegistry<'r>,
}

impl<'r> DirectiveContext<'r> {
    /// Directive name without `@`.
    pub fn directive(&self) -> &str {
        self.directive
    }

    /// Name of the host, e.g. `User` or `Query.user`.
    pub fn host(&self) -> &str {
        self.host
    }

    pub fn location(&self) -> DirectiveLocation {
        self.location
    }

    /// Whether deferred type references may be handed out.
    pub fn allow_thunks(&self) -> bool {
        self.allow_thunks
    }

    /// The caller context, if one was supplied and has type `T`.
    pub fn context<T: Any>(&self) -> Option<&T> {
        self.registry.context()?.downcast_ref::<T>()
    }

    /// Returns a handle to a named type.
    ///
    /// Completed types are returned ready. Declared types that are not
    /// complete yet are returned deferred when thunks are allowed.
    ///
    /// # Errors
    ///
    /// `PrematureDirective` if the type is not complete and thunks are not
    /// allowed; `UnresolvedReference` if no such type is declared.
    pub fn type_handle(&self, name: &str) -> Result<TypeHandle, SchemaError> {
        if let Some(ty) = self.registry.completed(name) {
            return Ok(TypeHandle::Ready(ty.clone()));
        }

        let Some(thunk) = self.registry.thunk(name) else {
            return Err(SchemaError::unresolved(
                "type",
                name,
                format!("@{}", self.directive),
            ));
        };

        if self.allow_thunks {
            Ok(TypeHandle::Deferred(thunk))
        } else {
            Err(SchemaError::PrematureDirective {
                directive: self.directive.to_string(),
                type_name: name.to_string(),
            })
        }
    }
}

impl fmt::Debug for DirectiveContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectiveContext")
            .field("directive", &self.directive)
            .field("host", &self.host)
            .field("location", &self.location)
            .field("allow_thunks", &self.allow_thunks)
            .finish_non_exhaustive()
    }
}

/// Table of directive implementations keyed by directive name (without `@`).
#[derive(Clone, Default)]
pub struct SchemaDirectives {
    visitors: IndexMap<String, Arc<dyn SchemaDirectiveVisitor>>,
}

impl SchemaDirectives {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an implementation, replacing any previous one of the same name.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, visitor: impl SchemaDirectiveVisitor + 'static) -> Self {
        self.insert(name, Arc::new(visitor));
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, visitor: Arc<dyn SchemaDirectiveVisitor>) {
        self.visitors.insert(name.into(), visitor);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn SchemaDirectiveVisitor>> {
        self.visitors.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.visitors.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.visitors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.visitors.is_empty()
    }
}

impl fmt::Debug for SchemaDirectives {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.visitors.keys()).finish()
    }
}

/// The in-progress node a directive is applied to.
pub enum DirectiveTarget<'t> {
    Schema(&'t SchemaRoots),
    Object(&'t mut ObjectType),
    Interface(&'t mut InterfaceType),
    Union(&'t mut UnionType),
    Enum(&'t mut EnumType),
    EnumValue(&'t mut EnumValueDefinition),
    Scalar(&'t mut ScalarType),
    InputObject(&'t mut InputObjectType),
    InputField(&'t mut InputValueDefinition),
    FieldDefinition(&'t mut FieldDefinition),
    Argument(&'t mut InputValueDefinition),
}

impl DirectiveTarget<'_> {
    pub fn location(&self) -> DirectiveLocation {
        match self {
            Self::Schema(_) => DirectiveLocation::Schema,
            Self::Object(_) => DirectiveLocation::Object,
            Self::Interface(_) => DirectiveLocation::Interface,
            Self::Union(_) => DirectiveLocation::Union,
            Self::Enum(_) => DirectiveLocation::Enum,
            Self::EnumValue(_) => DirectiveLocation::EnumValue,
            Self::Scalar(_) => DirectiveLocation::Scalar,
            Self::InputObject(_) => DirectiveLocation::InputObject,
            Self::InputField(_) => DirectiveLocation::InputFieldDefinition,
            Self::FieldDefinition(_) => DirectiveLocation::FieldDefinition,
            Self::Argument(_) => DirectiveLocation::ArgumentDefinition,
        }
    }
}

/// Applies directive invocations to `target` in written order.
///
/// # Errors
///
/// - `UnknownDirective` if a non-built-in directive has no implementation
/// - `MisplacedDirective` if the directive's declared locations exclude the target
/// - `PrematureDirective` if an implementation needs an unfinished type while
///   `allow_thunks` is false
/// - any error returned by an implementation
pub fn apply_directives(
    registry: &TypeRegistry<'_>,
    mut target: DirectiveTarget<'_>,
    invocations: &[Positioned<ConstDirective>],
    host: &str,
    allow_thunks: bool,
) -> Result<(), SchemaError> {
    let location = target.location();

    for invocation in invocations {
        let invocation = &invocation.node;
        let name = invocation.name.node.as_str();
        trace!(directive = %name, host = %host, location = %location, "Applying directive");

        if matches!(name, names::DEPRECATED | names::SPECIFIED_BY | names::ONE_OF) {
            let args = DirectiveArgs::from_invocation(invocation, None);
            apply_builtin(name, &args, &mut target, host)?;
            continue;
        }

        let Some(visitor) = registry
            .schema_directives()
            .get(name)
            .or_else(|| registry.resolvers().directive(name))
        else {
            return Err(SchemaError::UnknownDirective {
                name: name.to_string(),
                location: location.as_str(),
                host: host.to_string(),
            });
        };

        let definition = registry.document().directive(name);
        if let Some(definition) = definition
            && !definition
                .locations
                .iter()
                .any(|l| DirectiveLocation::from(&l.node) == location)
        {
            return Err(misplaced(name, location, host));
        }

        let args = DirectiveArgs::from_invocation(invocation, definition);
        let ctx = DirectiveContext {
            directive: name,
            host,
            location,
            allow_thunks,
            registry,
        };

        let result = match &mut target {
            DirectiveTarget::Schema(schema) => visitor.visit_schema(*schema, &args, &ctx),
            DirectiveTarget::Object(object) => visitor.visit_object(object, &args, &ctx),
            DirectiveTarget::Interface(iface) => visitor.visit_interface(iface, &args, &ctx),
            DirectiveTarget::Union(union) => visitor.visit_union(union, &args, &ctx),
            DirectiveTarget::Enum(enm) => visitor.visit_enum(enm, &args, &ctx),
            DirectiveTarget::EnumValue(value) => visitor.visit_enum_value(value, &args, &ctx),
            DirectiveTarget::Scalar(scalar) => visitor.visit_scalar(scalar, &args, &ctx),
            DirectiveTarget::InputObject(input) => visitor.visit_input_object(input, &args, &ctx),
            DirectiveTarget::InputField(field) => visitor.visit_input_field(field, &args, &ctx),
            DirectiveTarget::FieldDefinition(field) => {
                visitor.visit_field_definition(field, &args, &ctx)
            }
            DirectiveTarget::Argument(argument) => visitor.visit_argument(argument, &args, &ctx),
        };
        result?;
    }

    Ok(())
}

fn apply_builtin(
    name: &str,
    args: &DirectiveArgs,
    target: &mut DirectiveTarget<'_>,
    host: &str,
) -> Result<(), SchemaError> {
    let deprecation = || Deprecation::Deprecated {
        reason: Some(
            args.get_str("reason")
                .unwrap_or(DEFAULT_DEPRECATION_REASON)
                .to_string(),
        ),
    };

    match (name, target) {
        (names::DEPRECATED, DirectiveTarget::FieldDefinition(field)) => {
            field.deprecation = deprecation();
        }
        (
            names::DEPRECATED,
            DirectiveTarget::Argument(value) | DirectiveTarget::InputField(value),
        ) => {
            value.deprecation = deprecation();
        }
        (names::DEPRECATED, DirectiveTarget::EnumValue(value)) => {
            value.deprecation = deprecation();
        }
        (names::SPECIFIED_BY, DirectiveTarget::Scalar(scalar)) => {
            let Some(url) = args.get_str("url") else {
                return Err(SchemaError::directive_failed(
                    names::SPECIFIED_BY,
                    format!("`{host}` must pass a `url` string"),
                ));
            };
            if let Err(err) = url::Url::parse(url) {
                return Err(SchemaError::directive_failed(
                    names::SPECIFIED_BY,
                    format!("`{host}` has an invalid url `{url}`: {err}"),
                ));
            }
            scalar.specified_by_url = Some(url.to_string());
        }
        (names::ONE_OF, DirectiveTarget::InputObject(input)) => input.one_of = true,
        (name, target) => return Err(misplaced(name, target.location(), host)),
    }

    Ok(())
}

fn misplaced(name: &str, location: DirectiveLocation, host: &str) -> SchemaError {
    SchemaError::MisplacedDirective {
        name: name.to_string(),
        location: location.as_str(),
        host: host.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::bindings::{FieldResolver, Resolvers};
    use crate::document::Document;
    use crate::schema::types::{NamedType, TypeReference};

    struct Recorder {
        tag: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl SchemaDirectiveVisitor for Recorder {
        fn visit_field_definition(
            &self,
            field: &mut FieldDefinition,
            args: &DirectiveArgs,
            ctx: &DirectiveContext<'_>,
        ) -> Result<(), SchemaError> {
            let mut log = self.log.lock().unwrap();
            log.push(format!("{}:{}:{}", self.tag, ctx.host(), field.name));
            if let Some(note) = args.get_str("note") {
                log.push(note.to_string());
            }
            Ok(())
        }
    }

    fn field(name: &str) -> FieldDefinition {
        FieldDefinition {
            name: name.to_string(),
            description: None,
            ty: TypeReference::Named(TypeHandle::Ready(NamedType::Scalar(Arc::new(
                ScalarType::builtin("String"),
            )))),
            arguments: IndexMap::new(),
            resolver: FieldResolver::default_for(name),
            subscription_resolver: None,
            deprecation: Deprecation::Active,
        }
    }

    fn invocations(sdl: &str) -> Vec<Positioned<ConstDirective>> {
        let document = Document::parse(sdl).unwrap();
        match &document.get("Query").unwrap().kind {
            async_graphql_parser::types::TypeKind::Object(object) => {
                object.fields[0].node.directives.clone()
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_directives_apply_in_written_order() {
        let sdl = "directive @a(note: String = \"from a\") on FIELD_DEFINITION
                   directive @b on FIELD_DEFINITION
                   type Query { hello: String @a @b }";
        let document = Document::parse(sdl).unwrap();
        let log = Arc::new(Mutex::new(Vec::new()));
        let directives = SchemaDirectives::new()
            .with("a", Recorder { tag: "a", log: log.clone() })
            .with("b", Recorder { tag: "b", log: log.clone() });
        let resolvers = Resolvers::default();
        let registry = TypeRegistry::new(&document, &resolvers, &directives, None);

        let mut hello = field("hello");
        apply_directives(
            &registry,
            DirectiveTarget::FieldDefinition(&mut hello),
            &invocations(sdl),
            "Query.hello",
            true,
        )
        .unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            vec!["a:Query.hello:hello", "from a", "b:Query.hello:hello"]
        );
    }

    #[test]
    fn test_unknown_directive() {
        let sdl = "type Query { hello: String @nope }";
        let document = Document::parse(sdl).unwrap();
        let resolvers = Resolvers::default();
        let directives = SchemaDirectives::new();
        let registry = TypeRegistry::new(&document, &resolvers, &directives, None);

        let err = apply_directives(
            &registry,
            DirectiveTarget::FieldDefinition(&mut field("hello")),
            &invocations(sdl),
            "Query.hello",
            true,
        )
        .unwrap_err();

        match err {
            SchemaError::UnknownDirective {
                name,
                location,
                host,
            } => {
                assert_eq!(name, "nope");
                assert_eq!(location, "FIELD_DEFINITION");
                assert_eq!(host, "Query.hello");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_directive_from_bindings() {
        let sdl = "type Query { hello: String @a }";
        let document = Document::parse(sdl).unwrap();
        let log = Arc::new(Mutex::new(Vec::new()));
        let resolvers = Resolvers::builder()
            .directive("a", Recorder { tag: "a", log: log.clone() })
            .build()
            .unwrap();
        let directives = SchemaDirectives::new();
        let registry = TypeRegistry::new(&document, &resolvers, &directives, None);

        apply_directives(
            &registry,
            DirectiveTarget::FieldDefinition(&mut field("hello")),
            &invocations(sdl),
            "Query.hello",
            true,
        )
        .unwrap();
        assert_eq!(log.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_misplaced_directive() {
        let sdl = "directive @a on OBJECT type Query { hello: String @a }";
        let document = Document::parse(sdl).unwrap();
        let log = Arc::new(Mutex::new(Vec::new()));
        let directives = SchemaDirectives::new().with("a", Recorder { tag: "a", log });
        let resolvers = Resolvers::default();
        let registry = TypeRegistry::new(&document, &resolvers, &directives, None);

        let err = apply_directives(
            &registry,
            DirectiveTarget::FieldDefinition(&mut field("hello")),
            &invocations(sdl),
            "Query.hello",
            true,
        )
        .unwrap_err();
        assert_eq!(err.error_code(), "MISPLACED_DIRECTIVE");
    }

    #[test]
    fn test_builtin_deprecated() {
        let sdl = "type Query { a: String @deprecated(reason: \"use b\") }";
        let document = Document::parse(sdl).unwrap();
        let resolvers = Resolvers::default();
        let directives = SchemaDirectives::new();
        let registry = TypeRegistry::new(&document, &resolvers, &directives, None);

        let mut a = field("a");
        apply_directives(
            &registry,
            DirectiveTarget::FieldDefinition(&mut a),
            &invocations(sdl),
            "Query.a",
            true,
        )
        .unwrap();
        assert_eq!(a.deprecation.reason(), Some("use b"));

        let sdl = "type Query { a: String @deprecated }";
        let mut a = field("a");
        apply_directives(
            &registry,
            DirectiveTarget::FieldDefinition(&mut a),
            &invocations(sdl),
            "Query.a",
            true,
        )
        .unwrap();
        assert_eq!(a.deprecation.reason(), Some(DEFAULT_DEPRECATION_REASON));
    }

    #[test]
    fn test_builtin_on_wrong_target() {
        let sdl = "type Query { a: String @oneOf }";
        let document = Document::parse(sdl).unwrap();
        let resolvers = Resolvers::default();
        let directives = SchemaDirectives::new();
        let registry = TypeRegistry::new(&document, &resolvers, &directives, None);

        let err = apply_directives(
            &registry,
            DirectiveTarget::FieldDefinition(&mut field("a")),
            &invocations(sdl),
            "Query.a",
            true,
        )
        .unwrap_err();
        assert!(matches!(err, SchemaError::MisplacedDirective { ref name, .. } if name == "oneOf"));
    }

    #[test]
    fn test_specified_by_needs_a_valid_url() {
        let document = Document::parse("type Query { a: String }").unwrap();
        let resolvers = Resolvers::default();
        let directives = SchemaDirectives::new();
        let registry = TypeRegistry::new(&document, &resolvers, &directives, None);

        let mut scalar = ScalarType::builtin("Url");
        let err = apply_directives(
            &registry,
            DirectiveTarget::Scalar(&mut scalar),
            &scalar_invocations("scalar Url @specifiedBy(url: \"not a url\")"),
            "Url",
            true,
        )
        .unwrap_err();
        assert_eq!(err.error_code(), "DIRECTIVE_FAILED");

        apply_directives(
            &registry,
            DirectiveTarget::Scalar(&mut scalar),
            &scalar_invocations("scalar Url @specifiedBy(url: \"https://example.com/url\")"),
            "Url",
            true,
        )
        .unwrap();
        assert_eq!(
            scalar.specified_by_url.as_deref(),
            Some("https://example.com/url")
        );
    }

    fn scalar_invocations(sdl: &str) -> Vec<Positioned<ConstDirective>> {
        Document::parse(sdl).unwrap().get("Url").unwrap().directives.clone()
    }

    #[test]
    fn test_args_defaults_do_not_override_passed_values() {
        let document = Document::parse(
            "directive @a(note: String = \"default\", level: Int = 1) on FIELD_DEFINITION
             type Query { hello: String @a(note: \"passed\") }",
        )
        .unwrap();
        let invocation = match &document.get("Query").unwrap().kind {
            async_graphql_parser::types::TypeKind::Object(object) => {
                object.fields[0].node.directives[0].node.clone()
            }
            _ => unreachable!(),
        };
        let args = DirectiveArgs::from_invocation(&invocation, document.directive("a"));
        assert_eq!(args.get_str("note"), Some("passed"));
        assert_eq!(args.get("level"), Some(&Value::Number(1.into())));
        assert_eq!(args.len(), 2);
    }
}
