//! Resolver bindings.
//!
//! Caller-supplied behavior is looked up by name while types are constructed.
//! Field-level bindings use dotted keys (`"Query.user"`); type-level bindings
//! (scalars, enums, type resolvers, directives) use the bare name. The table
//! is validated when it is built and checked against the merged definitions
//! before construction starts.
//!
//! # Example
//!
//! ```ignore
//! let resolvers = Resolvers::builder()
//!     .field("Query.hello", |_| {
//!         FieldFuture::new(async { Ok(Some(Value::String("world".into()))) })
//!     })
//!     .type_resolver("Node", |value| value_type_name(value))
//!     .build()?;
//! ```

use std::fmt;
use std::sync::Arc;

use async_graphql::Value;
use async_graphql::dynamic::{FieldFuture, FieldValue, ResolverContext, SubscriptionFieldFuture};
use async_graphql_parser::types::TypeKind;
use indexmap::IndexMap;

use crate::document::{DeclarationKind, Document, is_valid_name};
use crate::error::SchemaError;
use crate::schema::SchemaDirectiveVisitor;

type FieldResolverFn = dyn for<'a> Fn(ResolverContext<'a>) -> FieldFuture<'a> + Send + Sync;
type SubscriptionResolverFn =
    dyn for<'a> Fn(ResolverContext<'a>) -> SubscriptionFieldFuture<'a> + Send + Sync;

/// Resolver for a single output field.
#[derive(Clone)]
pub struct FieldResolver(Arc<FieldResolverFn>);

impl FieldResolver {
    /// Wraps a resolver function.
    pub fn new<F>(resolver: F) -> Self
    where
        F: for<'a> Fn(ResolverContext<'a>) -> FieldFuture<'a> + Send + Sync + 'static,
    {
        Self(Arc::new(resolver))
    }

    /// Resolver that reads the property of the same name from the parent
    /// value. Used for every field without an explicit binding.
    pub fn default_for(field_name: &str) -> Self {
        let field_name = field_name.to_string();
        Self::new(move |ctx| {
            let field_name = field_name.clone();
            FieldFuture::new(async move {
                let value = match ctx.parent_value.as_value() {
                    Some(Value::Object(object)) => object.get(field_name.as_str()).cloned(),
                    _ => None,
                };
                Ok(value)
            })
        })
    }

    /// Invokes the resolver.
    pub fn call<'a>(&self, ctx: ResolverContext<'a>) -> FieldFuture<'a> {
        (self.0)(ctx)
    }
}

impl fmt::Debug for FieldResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FieldResolver(..)")
    }
}

/// Stream source for a field on the subscription root.
#[derive(Clone)]
pub struct SubscriptionResolver(Arc<SubscriptionResolverFn>);

impl SubscriptionResolver {
    /// Wraps a subscription resolver function.
    pub fn new<F>(resolver: F) -> Self
    where
        F: for<'a> Fn(ResolverContext<'a>) -> SubscriptionFieldFuture<'a> + Send + Sync + 'static,
    {
        Self(Arc::new(resolver))
    }

    /// Invokes the resolver.
    pub fn call<'a>(&self, ctx: ResolverContext<'a>) -> SubscriptionFieldFuture<'a> {
        (self.0)(ctx)
    }
}

impl fmt::Debug for SubscriptionResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SubscriptionResolver(..)")
    }
}

/// Picks the concrete object type of a value returned for an interface or
/// union field.
#[derive(Clone)]
pub struct TypeResolver(Arc<dyn Fn(&Value) -> Option<String> + Send + Sync>);

impl TypeResolver {
    /// Wraps a type resolver function.
    pub fn new(resolver: impl Fn(&Value) -> Option<String> + Send + Sync + 'static) -> Self {
        Self(Arc::new(resolver))
    }

    /// Resolver that always answers with the same type.
    pub fn fixed(type_name: impl Into<String>) -> Self {
        let type_name = type_name.into();
        Self::new(move |_| Some(type_name.clone()))
    }

    /// Returns the concrete type name for `value`.
    pub fn resolve(&self, value: &Value) -> Option<String> {
        (self.0)(value)
    }
}

impl fmt::Debug for TypeResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TypeResolver(..)")
    }
}

/// Serialize/parse pair for a custom scalar. Both halves are required.
#[derive(Clone)]
pub struct ScalarBinding {
    serialize: Arc<dyn Fn(&Value) -> Value + Send + Sync>,
    parse: Arc<dyn Fn(&Value) -> Result<Value, String> + Send + Sync>,
}

impl ScalarBinding {
    /// Creates a scalar binding.
    pub fn new(
        serialize: impl Fn(&Value) -> Value + Send + Sync + 'static,
        parse: impl Fn(&Value) -> Result<Value, String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            serialize: Arc::new(serialize),
            parse: Arc::new(parse),
        }
    }

    /// Converts an internal value into its output representation.
    pub fn serialize(&self, value: &Value) -> Value {
        (self.serialize)(value)
    }

    /// Validates and converts an input value.
    pub fn parse(&self, value: &Value) -> Result<Value, String> {
        (self.parse)(value)
    }
}

impl fmt::Debug for ScalarBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScalarBinding").finish_non_exhaustive()
    }
}

/// Mapping from enum value names to internal values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnumBinding {
    values: IndexMap<String, Value>,
}

impl EnumBinding {
    /// Creates an empty mapping.
    pub fn new() -> Self {
        Self::default()
    }

    /// Maps an enum value name to an internal value.
    #[must_use]
    pub fn value(mut self, name: impl Into<String>, internal: impl Into<Value>) -> Self {
        self.values.insert(name.into(), internal.into());
        self
    }

    /// Returns the internal value of an enum value name.
    pub fn internal_value(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Returns the enum value name an internal value maps to.
    pub fn name_of(&self, internal: &Value) -> Option<&str> {
        self.values
            .iter()
            .find(|(_, value)| *value == internal)
            .map(|(name, _)| name.as_str())
    }

    /// Mapped enum value names.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }
}

/// A caller-supplied behavior.
#[derive(Clone)]
pub enum Binding {
    /// Output field resolver, keyed `Type.field`.
    Field(FieldResolver),
    /// Subscription stream source, keyed `Subscription.field`.
    Subscription(SubscriptionResolver),
    /// Custom scalar serialize/parse pair.
    Scalar(ScalarBinding),
    /// Enum internal value mapping.
    Enum(EnumBinding),
    /// Interface or union concrete type resolver.
    TypeResolver(TypeResolver),
    /// Directive implementation, keyed by directive name without `@`.
    Directive(Arc<dyn SchemaDirectiveVisitor>),
}

impl Binding {
    /// Short description used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Field(_) => "field resolver",
            Self::Subscription(_) => "subscription resolver",
            Self::Scalar(_) => "scalar",
            Self::Enum(_) => "enum",
            Self::TypeResolver(_) => "type resolver",
            Self::Directive(_) => "directive",
        }
    }

    fn is_field_level(&self) -> bool {
        matches!(self, Self::Field(_) | Self::Subscription(_))
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Binding::{}", self.kind())
    }
}

/// Validated resolver binding table.
#[derive(Debug, Clone, Default)]
pub struct Resolvers {
    bindings: IndexMap<String, Binding>,
}

impl Resolvers {
    /// Starts building a binding table.
    pub fn builder() -> ResolversBuilder {
        ResolversBuilder::default()
    }

    /// Returns the binding stored under `key`.
    pub fn get(&self, key: &str) -> Option<&Binding> {
        self.bindings.get(key)
    }

    /// Number of bindings.
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Iterates over binding keys.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.bindings.keys().map(String::as_str)
    }

    /// Returns the resolver bound to `type_name.field_name`.
    pub fn field_resolver(&self, type_name: &str, field_name: &str) -> Option<&FieldResolver> {
        match self.bindings.get(&format!("{type_name}.{field_name}")) {
            Some(Binding::Field(resolver)) => Some(resolver),
            _ => None,
        }
    }

    /// Returns the subscription resolver bound to `type_name.field_name`.
    pub fn subscription_resolver(
        &self,
        type_name: &str,
        field_name: &str,
    ) -> Option<&SubscriptionResolver> {
        match self.bindings.get(&format!("{type_name}.{field_name}")) {
            Some(Binding::Subscription(resolver)) => Some(resolver),
            _ => None,
        }
    }

    /// Returns the scalar binding for `name`.
    pub fn scalar(&self, name: &str) -> Option<&ScalarBinding> {
        match self.bindings.get(name) {
            Some(Binding::Scalar(binding)) => Some(binding),
            _ => None,
        }
    }

    /// Returns the enum binding for `name`.
    pub fn enum_binding(&self, name: &str) -> Option<&EnumBinding> {
        match self.bindings.get(name) {
            Some(Binding::Enum(binding)) => Some(binding),
            _ => None,
        }
    }

    /// Returns the type resolver for the interface or union `name`.
    pub fn type_resolver(&self, name: &str) -> Option<&TypeResolver> {
        match self.bindings.get(name) {
            Some(Binding::TypeResolver(resolver)) => Some(resolver),
            _ => None,
        }
    }

    /// Returns the directive implementation bound to `name`.
    pub fn directive(&self, name: &str) -> Option<&Arc<dyn SchemaDirectiveVisitor>> {
        match self.bindings.get(name) {
            Some(Binding::Directive(visitor)) => Some(visitor),
            _ => None,
        }
    }

    /// Checks every binding against the merged definitions.
    ///
    /// # Errors
    ///
    /// Returns `InvalidBinding` when a binding targets an undeclared type or
    /// field, a declaration of the wrong kind, or an undeclared enum value.
    pub fn check_against(&self, document: &Document) -> Result<(), SchemaError> {
        for (key, binding) in &self.bindings {
            match binding {
                Binding::Field(_) | Binding::Subscription(_) => {
                    let (type_name, field_name) = split_field_key(key)?;
                    let declares_field = match document.get(type_name).map(|def| &def.kind) {
                        Some(TypeKind::Object(object)) => object
                            .fields
                            .iter()
                            .any(|f| f.node.name.node.as_str() == field_name),
                        Some(other) => {
                            return Err(SchemaError::invalid_binding(
                                key,
                                format!(
                                    "`{type_name}` is {}, not an object",
                                    DeclarationKind::of(other)
                                ),
                            ));
                        }
                        None => {
                            return Err(SchemaError::invalid_binding(
                                key,
                                format!("type `{type_name}` is not declared"),
                            ));
                        }
                    };
                    if !declares_field {
                        return Err(SchemaError::invalid_binding(
                            key,
                            format!("`{type_name}` has no field `{field_name}`"),
                        ));
                    }
                }
                Binding::Scalar(_) => expect_kind(document, key, &[DeclarationKind::Scalar])?,
                Binding::Enum(mapping) => {
                    expect_kind(document, key, &[DeclarationKind::Enum])?;
                    if let Some(TypeKind::Enum(enm)) = document.get(key).map(|def| &def.kind) {
                        for name in mapping.names() {
                            if !enm.values.iter().any(|v| v.node.value.node.as_str() == name) {
                                return Err(SchemaError::invalid_binding(
                                    key,
                                    format!("enum `{key}` has no value `{name}`"),
                                ));
                            }
                        }
                    }
                }
                Binding::TypeResolver(_) => expect_kind(
                    document,
                    key,
                    &[DeclarationKind::Interface, DeclarationKind::Union],
                )?,
                Binding::Directive(_) => {}
            }
        }
        Ok(())
    }
}

fn expect_kind(
    document: &Document,
    key: &str,
    expected: &[DeclarationKind],
) -> Result<(), SchemaError> {
    match document.kind_of(key) {
        Some(kind) if expected.contains(&kind) => Ok(()),
        Some(kind) => Err(SchemaError::invalid_binding(
            key,
            format!("`{key}` is {kind}, expected {}", expected[0]),
        )),
        None => Err(SchemaError::invalid_binding(
            key,
            format!("type `{key}` is not declared"),
        )),
    }
}

fn split_field_key(key: &str) -> Result<(&str, &str), SchemaError> {
    match key.split_once('.') {
        Some((type_name, field_name)) if is_valid_name(type_name) && is_valid_name(field_name) => {
            Ok((type_name, field_name))
        }
        _ => Err(SchemaError::invalid_binding(
            key,
            "field bindings must be keyed `Type.field`",
        )),
    }
}

/// Builder for [`Resolvers`].
#[derive(Default)]
pub struct ResolversBuilder {
    entries: Vec<(String, Binding)>,
}

impl ResolversBuilder {
    /// Binds an output field resolver to `Type.field`.
    #[must_use]
    pub fn field<F>(self, key: impl Into<String>, resolver: F) -> Self
    where
        F: for<'a> Fn(ResolverContext<'a>) -> FieldFuture<'a> + Send + Sync + 'static,
    {
        self.binding(key, Binding::Field(FieldResolver::new(resolver)))
    }

    /// Binds a subscription stream source to `Subscription.field`.
    #[must_use]
    pub fn subscription<F>(self, key: impl Into<String>, resolver: F) -> Self
    where
        F: for<'a> Fn(ResolverContext<'a>) -> SubscriptionFieldFuture<'a> + Send + Sync + 'static,
    {
        self.binding(key, Binding::Subscription(SubscriptionResolver::new(resolver)))
    }

    /// Binds a custom scalar.
    #[must_use]
    pub fn scalar(self, key: impl Into<String>, binding: ScalarBinding) -> Self {
        self.binding(key, Binding::Scalar(binding))
    }

    /// Binds enum internal values.
    #[must_use]
    pub fn enum_values(self, key: impl Into<String>, binding: EnumBinding) -> Self {
        self.binding(key, Binding::Enum(binding))
    }

    /// Binds a type resolver to an interface or union.
    #[must_use]
    pub fn type_resolver(
        self,
        key: impl Into<String>,
        resolver: impl Fn(&Value) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        self.binding(key, Binding::TypeResolver(TypeResolver::new(resolver)))
    }

    /// Binds a directive implementation.
    #[must_use]
    pub fn directive(
        self,
        key: impl Into<String>,
        visitor: impl SchemaDirectiveVisitor + 'static,
    ) -> Self {
        self.binding(key, Binding::Directive(Arc::new(visitor)))
    }

    /// Adds a binding of any kind.
    #[must_use]
    pub fn binding(mut self, key: impl Into<String>, binding: Binding) -> Self {
        self.entries.push((key.into(), binding));
        self
    }

    /// Validates key shapes and builds the table.
    ///
    /// # Errors
    ///
    /// Returns `InvalidBinding` for duplicate keys, field bindings not keyed
    /// `Type.field`, and type-level bindings whose key is not a plain name.
    pub fn build(self) -> Result<Resolvers, SchemaError> {
        let mut bindings = IndexMap::with_capacity(self.entries.len());

        for (key, binding) in self.entries {
            if binding.is_field_level() {
                split_field_key(&key)?;
            } else if !is_valid_name(&key) {
                return Err(SchemaError::invalid_binding(
                    &key,
                    format!("{} bindings must be keyed by a plain name", binding.kind()),
                ));
            }

            if bindings.contains_key(&key) {
                return Err(SchemaError::invalid_binding(&key, "bound more than once"));
            }
            bindings.insert(key, binding);
        }

        Ok(Resolvers { bindings })
    }
}

/// Awaits a field future, whichever form the resolver produced.
pub async fn settle_field_future(
    future: FieldFuture<'_>,
) -> async_graphql::Result<Option<FieldValue<'_>>> {
    match future {
        FieldFuture::Value(value) => Ok(value),
        FieldFuture::Future(future) => future.await,
    }
}
