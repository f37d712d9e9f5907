//! Constructed runtime types.
//!
//! Every reference from one constructed type to another goes through a
//! [`TypeHandle`]. A handle is either ready (the target was complete when the
//! reference was made) or a [`Thunk`] standing in for a type that was still
//! under construction. Thunks hold only a weak pointer to their target, so
//! reference cycles never keep each other alive; the registry and the
//! assembled schema own the types.

use std::fmt;
use std::sync::{Arc, OnceLock, Weak};

use async_graphql::Value;
use async_graphql_parser::types::DirectiveLocation as AstDirectiveLocation;
use indexmap::IndexMap;

use crate::bindings::{FieldResolver, ScalarBinding, SubscriptionResolver, TypeResolver};
use crate::document::DeclarationKind;

/// Write-once cell receiving the completed type of one name.
pub(crate) type TypeSlot = Arc<OnceLock<WeakNamedType>>;

/// A constructed named type.
///
/// Cloning is cheap; clones share the same underlying type.
#[derive(Debug, Clone)]
pub enum NamedType {
    Object(Arc<ObjectType>),
    Interface(Arc<InterfaceType>),
    Union(Arc<UnionType>),
    Enum(Arc<EnumType>),
    Scalar(Arc<ScalarType>),
    InputObject(Arc<InputObjectType>),
}

impl NamedType {
    /// Type name.
    pub fn name(&self) -> &str {
        match self {
            Self::Object(t) => &t.name,
            Self::Interface(t) => &t.name,
            Self::Union(t) => &t.name,
            Self::Enum(t) => &t.name,
            Self::Scalar(t) => &t.name,
            Self::InputObject(t) => &t.name,
        }
    }

    /// Declaration kind.
    pub fn kind(&self) -> DeclarationKind {
        match self {
            Self::Object(_) => DeclarationKind::Object,
            Self::Interface(_) => DeclarationKind::Interface,
            Self::Union(_) => DeclarationKind::Union,
            Self::Enum(_) => DeclarationKind::Enum,
            Self::Scalar(_) => DeclarationKind::Scalar,
            Self::InputObject(_) => DeclarationKind::InputObject,
        }
    }

    pub fn as_object(&self) -> Option<&Arc<ObjectType>> {
        match self {
            Self::Object(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_interface(&self) -> Option<&Arc<InterfaceType>> {
        match self {
            Self::Interface(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_union(&self) -> Option<&Arc<UnionType>> {
        match self {
            Self::Union(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_enum(&self) -> Option<&Arc<EnumType>> {
        match self {
            Self::Enum(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_scalar(&self) -> Option<&Arc<ScalarType>> {
        match self {
            Self::Scalar(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_input_object(&self) -> Option<&Arc<InputObjectType>> {
        match self {
            Self::InputObject(t) => Some(t),
            _ => None,
        }
    }

    /// Whether both values point at the same constructed type.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Object(a), Self::Object(b)) => Arc::ptr_eq(a, b),
            (Self::Interface(a), Self::Interface(b)) => Arc::ptr_eq(a, b),
            (Self::Union(a), Self::Union(b)) => Arc::ptr_eq(a, b),
            (Self::Enum(a), Self::Enum(b)) => Arc::ptr_eq(a, b),
            (Self::Scalar(a), Self::Scalar(b)) => Arc::ptr_eq(a, b),
            (Self::InputObject(a), Self::InputObject(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    pub(crate) fn downgrade(&self) -> WeakNamedType {
        match self {
            Self::Object(t) => WeakNamedType::Object(Arc::downgrade(t)),
            Self::Interface(t) => WeakNamedType::Interface(Arc::downgrade(t)),
            Self::Union(t) => WeakNamedType::Union(Arc::downgrade(t)),
            Self::Enum(t) => WeakNamedType::Enum(Arc::downgrade(t)),
            Self::Scalar(t) => WeakNamedType::Scalar(Arc::downgrade(t)),
            Self::InputObject(t) => WeakNamedType::InputObject(Arc::downgrade(t)),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) enum WeakNamedType {
    Object(Weak<ObjectType>),
    Interface(Weak<InterfaceType>),
    Union(Weak<UnionType>),
    Enum(Weak<EnumType>),
    Scalar(Weak<ScalarType>),
    InputObject(Weak<InputObjectType>),
}

impl WeakNamedType {
    fn upgrade(&self) -> Option<NamedType> {
        Some(match self {
            Self::Object(t) => NamedType::Object(t.upgrade()?),
            Self::Interface(t) => NamedType::Interface(t.upgrade()?),
            Self::Union(t) => NamedType::Union(t.upgrade()?),
            Self::Enum(t) => NamedType::Enum(t.upgrade()?),
            Self::Scalar(t) => NamedType::Scalar(t.upgrade()?),
            Self::InputObject(t) => NamedType::InputObject(t.upgrade()?),
        })
    }
}

/// Deferred reference to a type that was under construction when the
/// reference was made.
///
/// The slot is filled exactly once, when the target completes. Forcing is
/// safe from any thread, any number of times, and returns the same type
/// every time.
///
/// The slot holds a weak reference. The target stays reachable only while
/// something still owns it: the [`ExecutableSchema`](super::ExecutableSchema)
/// it was assembled into, or a clone of the target's `Arc`. A thunk taken out
/// of a dropped schema forces to `None`.
#[derive(Clone)]
pub struct Thunk {
    name: String,
    slot: TypeSlot,
}

impl Thunk {
    pub(crate) fn new(name: impl Into<String>, slot: TypeSlot) -> Self {
        Self {
            name: name.into(),
            slot,
        }
    }

    /// Name of the referenced type.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the referenced type has completed.
    pub fn is_ready(&self) -> bool {
        self.slot.get().is_some()
    }

    /// Returns the completed type.
    ///
    /// `None` while the type is still under construction, or once every
    /// owner of the type has been dropped.
    pub fn force(&self) -> Option<NamedType> {
        self.slot.get().and_then(WeakNamedType::upgrade)
    }
}

impl fmt::Debug for Thunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Thunk")
            .field("name", &self.name)
            .field("ready", &self.is_ready())
            .finish()
    }
}

/// Reference to a named type from inside another type.
#[derive(Clone)]
pub enum TypeHandle {
    Ready(NamedType),
    Deferred(Thunk),
}

impl TypeHandle {
    /// Name of the referenced type.
    pub fn name(&self) -> &str {
        match self {
            Self::Ready(ty) => ty.name(),
            Self::Deferred(thunk) => thunk.name(),
        }
    }

    /// Returns the referenced type, forcing the thunk if deferred.
    pub fn force(&self) -> Option<NamedType> {
        match self {
            Self::Ready(ty) => Some(ty.clone()),
            Self::Deferred(thunk) => thunk.force(),
        }
    }

    pub fn is_deferred(&self) -> bool {
        matches!(self, Self::Deferred(_))
    }
}

// Only the name is printed: ready handles would otherwise print whole graphs.
impl fmt::Debug for TypeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready(ty) => write!(f, "Ready({})", ty.name()),
            Self::Deferred(thunk) => write!(f, "Deferred({})", thunk.name()),
        }
    }
}

/// A type reference with its list and non-null modifiers.
#[derive(Debug, Clone)]
pub enum TypeReference {
    Named(TypeHandle),
    List(Box<TypeReference>),
    NonNull(Box<TypeReference>),
}

impl TypeReference {
    /// The referenced named type, modifiers unwrapped.
    pub fn handle(&self) -> &TypeHandle {
        match self {
            Self::Named(handle) => handle,
            Self::List(inner) | Self::NonNull(inner) => inner.handle(),
        }
    }

    /// Name of the referenced named type.
    pub fn base_name(&self) -> &str {
        self.handle().name()
    }
}

impl fmt::Display for TypeReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(handle) => f.write_str(handle.name()),
            Self::List(inner) => write!(f, "[{inner}]"),
            Self::NonNull(inner) => write!(f, "{inner}!"),
        }
    }
}

/// Deprecation state of a field, argument, input field or enum value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Deprecation {
    #[default]
    Active,
    Deprecated { reason: Option<String> },
}

impl Deprecation {
    pub fn is_deprecated(&self) -> bool {
        matches!(self, Self::Deprecated { .. })
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Deprecated { reason } => reason.as_deref(),
            Self::Active => None,
        }
    }
}

/// Argument or input object field.
#[derive(Debug, Clone)]
pub struct InputValueDefinition {
    pub name: String,
    pub description: Option<String>,
    pub ty: TypeReference,
    pub default_value: Option<Value>,
    pub deprecation: Deprecation,
}

/// Output field of an object or interface.
#[derive(Debug, Clone)]
pub struct FieldDefinition {
    pub name: String,
    pub description: Option<String>,
    pub ty: TypeReference,
    pub arguments: IndexMap<String, InputValueDefinition>,
    /// Bound resolver, or the default property reader. Not used for
    /// interface fields or fields of the subscription root.
    pub resolver: FieldResolver,
    /// Stream source for fields of the subscription root.
    pub subscription_resolver: Option<SubscriptionResolver>,
    pub deprecation: Deprecation,
}

#[derive(Debug, Clone)]
pub struct ObjectType {
    pub name: String,
    pub description: Option<String>,
    pub fields: IndexMap<String, FieldDefinition>,
    pub interfaces: Vec<TypeHandle>,
}

#[derive(Debug, Clone)]
pub struct InterfaceType {
    pub name: String,
    pub description: Option<String>,
    pub fields: IndexMap<String, FieldDefinition>,
    pub interfaces: Vec<TypeHandle>,
    /// Names of the object types implementing this interface.
    pub possible_types: Vec<String>,
    pub type_resolver: Option<TypeResolver>,
}

#[derive(Debug, Clone)]
pub struct UnionType {
    pub name: String,
    pub description: Option<String>,
    pub members: Vec<TypeHandle>,
    pub type_resolver: Option<TypeResolver>,
}

#[derive(Debug, Clone)]
pub struct EnumValueDefinition {
    pub name: String,
    pub description: Option<String>,
    /// Value resolvers produce for this enum value. `None` means the enum
    /// value name itself.
    pub internal: Option<Value>,
    pub deprecation: Deprecation,
}

#[derive(Debug, Clone)]
pub struct EnumType {
    pub name: String,
    pub description: Option<String>,
    pub values: IndexMap<String, EnumValueDefinition>,
}

impl EnumType {
    /// Whether any value maps to an internal value other than its name.
    pub fn has_internal_values(&self) -> bool {
        self.values.values().any(|v| v.internal.is_some())
    }

    /// Enum value name for an internal value.
    pub fn name_of(&self, internal: &Value) -> Option<&str> {
        self.values
            .values()
            .find(|v| v.internal.as_ref() == Some(internal))
            .map(|v| v.name.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct ScalarType {
    pub name: String,
    pub description: Option<String>,
    /// Serialize/parse pair. Always present on custom scalars.
    pub binding: Option<ScalarBinding>,
    pub specified_by_url: Option<String>,
    pub builtin: bool,
}

impl ScalarType {
    pub(crate) fn builtin(name: &str) -> Self {
        Self {
            name: name.to_string(),
            description: None,
            binding: None,
            specified_by_url: None,
            builtin: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct InputObjectType {
    pub name: String,
    pub description: Option<String>,
    pub fields: IndexMap<String, InputValueDefinition>,
    /// Set by `@oneOf`.
    pub one_of: bool,
}

/// A constructed directive definition.
#[derive(Debug, Clone)]
pub struct DirectiveType {
    pub name: String,
    pub description: Option<String>,
    pub arguments: IndexMap<String, InputValueDefinition>,
    pub locations: Vec<DirectiveLocation>,
    pub repeatable: bool,
}

/// Root operation types, the target of schema-level directives.
#[derive(Debug, Clone)]
pub struct SchemaRoots {
    pub query: Arc<ObjectType>,
    pub mutation: Option<Arc<ObjectType>>,
    pub subscription: Option<Arc<ObjectType>>,
}

/// Places a directive may appear.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DirectiveLocation {
    Query,
    Mutation,
    Subscription,
    Field,
    FragmentDefinition,
    FragmentSpread,
    InlineFragment,
    VariableDefinition,
    Schema,
    Scalar,
    Object,
    FieldDefinition,
    ArgumentDefinition,
    Interface,
    Union,
    Enum,
    EnumValue,
    InputObject,
    InputFieldDefinition,
}

impl DirectiveLocation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Query => "QUERY",
            Self::Mutation => "MUTATION",
            Self::Subscription => "SUBSCRIPTION",
            Self::Field => "FIELD",
            Self::FragmentDefinition => "FRAGMENT_DEFINITION",
            Self::FragmentSpread => "FRAGMENT_SPREAD",
            Self::InlineFragment => "INLINE_FRAGMENT",
            Self::VariableDefinition => "VARIABLE_DEFINITION",
            Self::Schema => "SCHEMA",
            Self::Scalar => "SCALAR",
            Self::Object => "OBJECT",
            Self::FieldDefinition => "FIELD_DEFINITION",
            Self::ArgumentDefinition => "ARGUMENT_DEFINITION",
            Self::Interface => "INTERFACE",
            Self::Union => "UNION",
            Self::Enum => "ENUM",
            Self::EnumValue => "ENUM_VALUE",
            Self::InputObject => "INPUT_OBJECT",
            Self::InputFieldDefinition => "INPUT_FIELD_DEFINITION",
        }
    }
}

impl From<&AstDirectiveLocation> for DirectiveLocation {
    fn from(location: &AstDirectiveLocation) -> Self {
        match location {
            AstDirectiveLocation::Query => Self::Query,
            AstDirectiveLocation::Mutation => Self::Mutation,
            AstDirectiveLocation::Subscription => Self::Subscription,
            AstDirectiveLocation::Field => Self::Field,
            AstDirectiveLocation::FragmentDefinition => Self::FragmentDefinition,
            AstDirectiveLocation::FragmentSpread => Self::FragmentSpread,
            AstDirectiveLocation::InlineFragment => Self::InlineFragment,
            AstDirectiveLocation::VariableDefinition => Self::VariableDefinition,
            AstDirectiveLocation::Schema => Self::Schema,
            AstDirectiveLocation::Scalar => Self::Scalar,
            AstDirectiveLocation::Object => Self::Object,
            AstDirectiveLocation::FieldDefinition => Self::FieldDefinition,
            AstDirectiveLocation::ArgumentDefinition => Self::ArgumentDefinition,
            AstDirectiveLocation::Interface => Self::Interface,
            AstDirectiveLocation::Union => Self::Union,
            AstDirectiveLocation::Enum => Self::Enum,
            AstDirectiveLocation::EnumValue => Self::EnumValue,
            AstDirectiveLocation::InputObject => Self::InputObject,
            AstDirectiveLocation::InputFieldDefinition => Self::InputFieldDefinition,
        }
    }
}

impl fmt::Display for DirectiveLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scalar(name: &str) -> NamedType {
        NamedType::Scalar(Arc::new(ScalarType::builtin(name)))
    }

    #[test]
    fn test_thunk_before_and_after_completion() {
        let slot: TypeSlot = Arc::default();
        let thunk = Thunk::new("Date", slot.clone());
        assert!(!thunk.is_ready());
        assert!(thunk.force().is_none());

        let ty = scalar("Date");
        slot.set(ty.downgrade()).unwrap();

        let first = thunk.force().unwrap();
        let second = thunk.clone().force().unwrap();
        assert!(first.ptr_eq(&ty));
        assert!(first.ptr_eq(&second));
    }

    #[test]
    fn test_thunk_does_not_keep_type_alive() {
        let slot: TypeSlot = Arc::default();
        let thunk = Thunk::new("Date", slot.clone());
        let ty = scalar("Date");
        slot.set(ty.downgrade()).unwrap();
        drop(ty);

        assert!(thunk.is_ready());
        assert!(thunk.force().is_none());
    }

    #[test]
    fn test_type_reference_display() {
        let string = TypeHandle::Ready(scalar("String"));
        let reference = TypeReference::NonNull(Box::new(TypeReference::List(Box::new(
            TypeReference::NonNull(Box::new(TypeReference::Named(string))),
        ))));
        assert_eq!(reference.to_string(), "[String!]!");
        assert_eq!(reference.base_name(), "String");
    }

    #[test]
    fn test_deprecation() {
        assert!(!Deprecation::default().is_deprecated());
        let deprecated = Deprecation::Deprecated {
            reason: Some("use b".into()),
        };
        assert!(deprecated.is_deprecated());
        assert_eq!(deprecated.reason(), Some("use b"));
    }

    #[test]
    fn test_location_names() {
        assert_eq!(
            DirectiveLocation::from(&AstDirectiveLocation::FieldDefinition).as_str(),
            "FIELD_DEFINITION"
        );
        assert_eq!(DirectiveLocation::InputObject.to_string(), "INPUT_OBJECT");
    }
}
