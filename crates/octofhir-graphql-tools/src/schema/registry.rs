//! Type registry.
//!
//! Maps type names to constructed types. Construction is lazy and happens at
//! most once per name: the first request builds the type from its merged
//! declaration, resolving every reference through the registry again. A
//! request for a name that is still being built (a self reference or any
//! other cycle) gets a [`Thunk`] sharing the name's slot instead of
//! recursing; the slot is filled when the type completes.

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_graphql_parser::Positioned;
use async_graphql_parser::types::{
    BaseType, ConstDirective, EnumType as AstEnumType, FieldDefinition as AstFieldDefinition,
    InputObjectType as AstInputObjectType, InputValueDefinition as AstInputValueDefinition,
    InterfaceType as AstInterfaceType, ObjectType as AstObjectType, Type, TypeDefinition,
    TypeKind, UnionType as AstUnionType,
};
use indexmap::IndexMap;
use tracing::{debug, trace};

use super::directives::{DirectiveTarget, SchemaDirectives, apply_directives};
use super::types::{
    Deprecation, DirectiveLocation, DirectiveType, EnumType, EnumValueDefinition,
    FieldDefinition, InputObjectType, InputValueDefinition, InterfaceType, NamedType, ObjectType,
    ScalarType, Thunk, TypeHandle, TypeReference, TypeSlot, UnionType,
};
use crate::bindings::{FieldResolver, Resolvers, TypeResolver};
use crate::document::{BUILTIN_SCALARS, DeclarationKind, Document, is_builtin_scalar};
use crate::error::SchemaError;

/// Referencer reported for lookups made through the public accessors.
const LOOKUP: &str = "registry lookup";

/// What a reference position accepts.
#[derive(Debug, Clone, Copy)]
enum Expect {
    Output,
    Input,
    Interface,
    Object,
}

impl Expect {
    fn label(self) -> &'static str {
        match self {
            Self::Output => "output type",
            Self::Input => "input type",
            Self::Interface => "interface",
            Self::Object => "object",
        }
    }

    fn accepts(self, kind: DeclarationKind) -> bool {
        match self {
            Self::Output => kind != DeclarationKind::InputObject,
            Self::Input => matches!(
                kind,
                DeclarationKind::Scalar | DeclarationKind::Enum | DeclarationKind::InputObject
            ),
            Self::Interface => kind == DeclarationKind::Interface,
            Self::Object => kind == DeclarationKind::Object,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum InputPosition {
    Argument,
    InputField,
}

/// Registry of constructed types for one assembly.
pub struct TypeRegistry<'a> {
    document: &'a Document,
    resolvers: &'a Resolvers,
    directives: &'a SchemaDirectives,
    context: Option<&'a (dyn Any + Send + Sync)>,
    /// Completed types. Monotonic: a bound name is never replaced.
    types: IndexMap<String, NamedType>,
    /// One write-once slot per declared or built-in name.
    slots: HashMap<String, TypeSlot>,
    /// Names currently being built (for cycle detection).
    under_construction: HashSet<String>,
    directive_types: IndexMap<String, Arc<DirectiveType>>,
}

impl<'a> TypeRegistry<'a> {
    /// Creates a registry over merged definitions. Built-in scalars are
    /// available immediately; everything else is built on first request.
    pub fn new(
        document: &'a Document,
        resolvers: &'a Resolvers,
        directives: &'a SchemaDirectives,
        context: Option<&'a (dyn Any + Send + Sync)>,
    ) -> Self {
        let mut registry = Self {
            document,
            resolvers,
            directives,
            context,
            types: IndexMap::with_capacity(document.len() + BUILTIN_SCALARS.len()),
            slots: HashMap::with_capacity(document.len() + BUILTIN_SCALARS.len()),
            under_construction: HashSet::new(),
            directive_types: IndexMap::new(),
        };

        for name in BUILTIN_SCALARS {
            let ty = NamedType::Scalar(Arc::new(ScalarType::builtin(name)));
            let slot = TypeSlot::default();
            let _ = slot.set(ty.downgrade());
            registry.slots.insert(name.to_string(), slot);
            registry.types.insert(name.to_string(), ty);
        }
        for name in document.type_names() {
            registry.slots.insert(name.to_string(), TypeSlot::default());
        }

        registry
    }

    /// Returns a handle to any named type, building it if needed.
    ///
    /// The handle is deferred if the type is currently under construction.
    pub fn get_type(&mut self, name: &str) -> Result<TypeHandle, SchemaError> {
        if !is_builtin_scalar(name) && self.document.get(name).is_none() {
            return Err(SchemaError::unresolved("type", name, LOOKUP));
        }
        self.handle(name)
    }

    pub fn get_object(&mut self, name: &str) -> Result<Arc<ObjectType>, SchemaError> {
        match self.get_kind(name, DeclarationKind::Object)? {
            NamedType::Object(ty) => Ok(ty),
            other => Err(kind_mismatch(name, DeclarationKind::Object, other.kind(), LOOKUP)),
        }
    }

    pub fn get_interface(&mut self, name: &str) -> Result<Arc<InterfaceType>, SchemaError> {
        match self.get_kind(name, DeclarationKind::Interface)? {
            NamedType::Interface(ty) => Ok(ty),
            other => Err(kind_mismatch(name, DeclarationKind::Interface, other.kind(), LOOKUP)),
        }
    }

    pub fn get_union(&mut self, name: &str) -> Result<Arc<UnionType>, SchemaError> {
        match self.get_kind(name, DeclarationKind::Union)? {
            NamedType::Union(ty) => Ok(ty),
            other => Err(kind_mismatch(name, DeclarationKind::Union, other.kind(), LOOKUP)),
        }
    }

    pub fn get_input_object(&mut self, name: &str) -> Result<Arc<InputObjectType>, SchemaError> {
        match self.get_kind(name, DeclarationKind::InputObject)? {
            NamedType::InputObject(ty) => Ok(ty),
            other => Err(kind_mismatch(name, DeclarationKind::InputObject, other.kind(), LOOKUP)),
        }
    }

    pub fn get_enum(&mut self, name: &str) -> Result<Arc<EnumType>, SchemaError> {
        match self.get_kind(name, DeclarationKind::Enum)? {
            NamedType::Enum(ty) => Ok(ty),
            other => Err(kind_mismatch(name, DeclarationKind::Enum, other.kind(), LOOKUP)),
        }
    }

    pub fn get_scalar(&mut self, name: &str) -> Result<Arc<ScalarType>, SchemaError> {
        match self.get_kind(name, DeclarationKind::Scalar)? {
            NamedType::Scalar(ty) => Ok(ty),
            other => Err(kind_mismatch(name, DeclarationKind::Scalar, other.kind(), LOOKUP)),
        }
    }

    /// Returns a constructed directive definition, building it if needed.
    pub fn get_directive(&mut self, name: &str) -> Result<Arc<DirectiveType>, SchemaError> {
        if let Some(directive) = self.directive_types.get(name) {
            return Ok(directive.clone());
        }

        let document = self.document;
        let Some(definition) = document.directive(name) else {
            return Err(SchemaError::unresolved("directive", format!("@{name}"), LOOKUP));
        };

        let owner = format!("@{name}");
        let arguments =
            self.build_input_values(&owner, &definition.arguments, InputPosition::Argument)?;
        let directive = Arc::new(DirectiveType {
            name: name.to_string(),
            description: definition.description.as_ref().map(|d| d.node.clone()),
            arguments,
            locations: definition
                .locations
                .iter()
                .map(|l| DirectiveLocation::from(&l.node))
                .collect(),
            repeatable: definition.is_repeatable,
        });

        self.directive_types
            .insert(name.to_string(), directive.clone());
        Ok(directive)
    }

    /// Builds every declared type and directive definition.
    pub fn resolve_all(&mut self) -> Result<(), SchemaError> {
        let document = self.document;
        for name in document.type_names() {
            self.handle(name)?;
        }
        for (name, _) in document.directives() {
            self.get_directive(name)?;
        }

        debug!(
            types = self.types.len(),
            directives = self.directive_types.len(),
            "Resolved all declarations"
        );
        Ok(())
    }

    /// Completed types, built-in scalars first, then in completion order.
    pub fn types(&self) -> impl Iterator<Item = (&str, &NamedType)> {
        self.types.iter().map(|(name, ty)| (name.as_str(), ty))
    }

    /// Constructed directive definitions.
    pub fn directives(&self) -> impl Iterator<Item = (&str, &Arc<DirectiveType>)> {
        self.directive_types
            .iter()
            .map(|(name, directive)| (name.as_str(), directive))
    }

    /// Whether `name` is being built right now.
    pub fn is_under_construction(&self, name: &str) -> bool {
        self.under_construction.contains(name)
    }

    /// Consumes the registry, returning the completed types and directives.
    pub fn into_parts(
        self,
    ) -> (
        IndexMap<String, NamedType>,
        IndexMap<String, Arc<DirectiveType>>,
    ) {
        (self.types, self.directive_types)
    }

    pub(crate) fn completed(&self, name: &str) -> Option<&NamedType> {
        self.types.get(name)
    }

    pub(crate) fn thunk(&self, name: &str) -> Option<Thunk> {
        self.slots
            .get(name)
            .map(|slot| Thunk::new(name, slot.clone()))
    }

    pub(crate) fn document(&self) -> &'a Document {
        self.document
    }

    pub(crate) fn resolvers(&self) -> &'a Resolvers {
        self.resolvers
    }

    pub(crate) fn schema_directives(&self) -> &'a SchemaDirectives {
        self.directives
    }

    pub(crate) fn context(&self) -> Option<&'a (dyn Any + Send + Sync)> {
        self.context
    }

    fn get_kind(
        &mut self,
        name: &str,
        expected: DeclarationKind,
    ) -> Result<NamedType, SchemaError> {
        let found = self.declared_kind(name, LOOKUP)?;
        if found != expected {
            return Err(kind_mismatch(name, expected, found, LOOKUP));
        }

        match self.handle(name)? {
            TypeHandle::Ready(ty) => Ok(ty),
            TypeHandle::Deferred(_) => Err(SchemaError::UnderConstruction {
                name: name.to_string(),
            }),
        }
    }

    fn declared_kind(
        &self,
        name: &str,
        referenced_by: &str,
    ) -> Result<DeclarationKind, SchemaError> {
        if is_builtin_scalar(name) {
            return Ok(DeclarationKind::Scalar);
        }
        self.document
            .kind_of(name)
            .ok_or_else(|| SchemaError::unresolved("type", name, referenced_by))
    }

    /// Cached type, thunk for a reentrant request, or a fresh build.
    fn handle(&mut self, name: &str) -> Result<TypeHandle, SchemaError> {
        if let Some(ty) = self.types.get(name) {
            return Ok(TypeHandle::Ready(ty.clone()));
        }

        if self.under_construction.contains(name) {
            trace!(type_name = %name, "Deferring reentrant reference");
            return self
                .thunk(name)
                .map(TypeHandle::Deferred)
                .ok_or_else(|| SchemaError::unresolved("type", name, name));
        }

        self.construct(name).map(TypeHandle::Ready)
    }

    fn construct(&mut self, name: &str) -> Result<NamedType, SchemaError> {
        let document = self.document;
        let Some(definition) = document.get(name) else {
            return Err(SchemaError::unresolved("type", name, LOOKUP));
        };

        trace!(
            type_name = %name,
            kind = %DeclarationKind::of(&definition.kind),
            "Constructing type"
        );
        self.under_construction.insert(name.to_string());

        let built = self.build(name, definition);
        if let Ok(ty) = &built {
            self.types.insert(name.to_string(), ty.clone());
            if let Some(slot) = self.slots.get(name) {
                let _ = slot.set(ty.downgrade());
            }
        }

        self.under_construction.remove(name);
        built
    }

    fn build(&mut self, name: &str, definition: &'a TypeDefinition) -> Result<NamedType, SchemaError> {
        let description = definition.description.as_ref().map(|d| d.node.clone());
        let directives = definition.directives.as_slice();

        match &definition.kind {
            TypeKind::Scalar => self.build_scalar(name, description, directives),
            TypeKind::Object(object) => self.build_object(name, description, object, directives),
            TypeKind::Interface(iface) => {
                self.build_interface(name, description, iface, directives)
            }
            TypeKind::Union(union) => self.build_union(name, description, union, directives),
            TypeKind::Enum(enm) => self.build_enum(name, description, enm, directives),
            TypeKind::InputObject(input) => {
                self.build_input_object(name, description, input, directives)
            }
        }
    }

    fn build_object(
        &mut self,
        name: &str,
        description: Option<String>,
        object: &'a AstObjectType,
        directives: &'a [Positioned<ConstDirective>],
    ) -> Result<NamedType, SchemaError> {
        let interfaces = object
            .implements
            .iter()
            .map(|i| self.reference(&i.node, Expect::Interface, name))
            .collect::<Result<Vec<_>, _>>()?;
        let fields = self.build_fields(name, &object.fields)?;

        let mut ty = ObjectType {
            name: name.to_string(),
            description,
            fields,
            interfaces,
        };
        apply_directives(self, DirectiveTarget::Object(&mut ty), directives, name, true)?;

        Ok(NamedType::Object(Arc::new(ty)))
    }

    fn build_interface(
        &mut self,
        name: &str,
        description: Option<String>,
        iface: &'a AstInterfaceType,
        directives: &'a [Positioned<ConstDirective>],
    ) -> Result<NamedType, SchemaError> {
        let interfaces = iface
            .implements
            .iter()
            .map(|i| self.reference(&i.node, Expect::Interface, name))
            .collect::<Result<Vec<_>, _>>()?;
        let fields = self.build_fields(name, &iface.fields)?;

        let possible_types: Vec<String> = self
            .document
            .implementors(name)
            .into_iter()
            .map(str::to_string)
            .collect();
        let type_resolver = self.abstract_type_resolver("interface", name, &possible_types)?;

        let mut ty = InterfaceType {
            name: name.to_string(),
            description,
            fields,
            interfaces,
            possible_types,
            type_resolver,
        };
        apply_directives(self, DirectiveTarget::Interface(&mut ty), directives, name, true)?;

        Ok(NamedType::Interface(Arc::new(ty)))
    }

    fn build_union(
        &mut self,
        name: &str,
        description: Option<String>,
        union: &'a AstUnionType,
        directives: &'a [Positioned<ConstDirective>],
    ) -> Result<NamedType, SchemaError> {
        let members = union
            .members
            .iter()
            .map(|m| self.reference(&m.node, Expect::Object, name))
            .collect::<Result<Vec<_>, _>>()?;

        let member_names: Vec<String> = members.iter().map(|m| m.name().to_string()).collect();
        let type_resolver = self.abstract_type_resolver("union", name, &member_names)?;

        let mut ty = UnionType {
            name: name.to_string(),
            description,
            members,
            type_resolver,
        };
        apply_directives(self, DirectiveTarget::Union(&mut ty), directives, name, true)?;

        Ok(NamedType::Union(Arc::new(ty)))
    }

    fn build_enum(
        &mut self,
        name: &str,
        description: Option<String>,
        enm: &'a AstEnumType,
        directives: &'a [Positioned<ConstDirective>],
    ) -> Result<NamedType, SchemaError> {
        let resolvers = self.resolvers;
        let binding = resolvers.enum_binding(name);

        let mut values = IndexMap::with_capacity(enm.values.len());
        for value in &enm.values {
            let value = &value.node;
            let value_name = value.value.node.as_str();
            let host = format!("{name}.{value_name}");

            let mut definition = EnumValueDefinition {
                name: value_name.to_string(),
                description: value.description.as_ref().map(|d| d.node.clone()),
                internal: binding.and_then(|b| b.internal_value(value_name)).cloned(),
                deprecation: Deprecation::Active,
            };
            apply_directives(
                self,
                DirectiveTarget::EnumValue(&mut definition),
                &value.directives,
                &host,
                true,
            )?;
            values.insert(value_name.to_string(), definition);
        }

        if let Some(binding) = binding
            && let Some(unknown) = binding.names().find(|n| !values.contains_key(*n))
        {
            return Err(SchemaError::invalid_binding(
                name,
                format!("enum `{name}` has no value `{unknown}`"),
            ));
        }

        let mut ty = EnumType {
            name: name.to_string(),
            description,
            values,
        };
        apply_directives(self, DirectiveTarget::Enum(&mut ty), directives, name, true)?;

        Ok(NamedType::Enum(Arc::new(ty)))
    }

    fn build_scalar(
        &mut self,
        name: &str,
        description: Option<String>,
        directives: &'a [Positioned<ConstDirective>],
    ) -> Result<NamedType, SchemaError> {
        let Some(binding) = self.resolvers.scalar(name) else {
            return Err(SchemaError::missing_resolver("scalar", name, "scalar"));
        };

        let mut ty = ScalarType {
            name: name.to_string(),
            description,
            binding: Some(binding.clone()),
            specified_by_url: None,
            builtin: false,
        };
        apply_directives(self, DirectiveTarget::Scalar(&mut ty), directives, name, true)?;

        Ok(NamedType::Scalar(Arc::new(ty)))
    }

    fn build_input_object(
        &mut self,
        name: &str,
        description: Option<String>,
        input: &'a AstInputObjectType,
        directives: &'a [Positioned<ConstDirective>],
    ) -> Result<NamedType, SchemaError> {
        let fields = self.build_input_values(name, &input.fields, InputPosition::InputField)?;

        let mut ty = InputObjectType {
            name: name.to_string(),
            description,
            fields,
            one_of: false,
        };
        apply_directives(self, DirectiveTarget::InputObject(&mut ty), directives, name, true)?;

        Ok(NamedType::InputObject(Arc::new(ty)))
    }

    fn build_fields(
        &mut self,
        owner: &str,
        fields: &'a [Positioned<AstFieldDefinition>],
    ) -> Result<IndexMap<String, FieldDefinition>, SchemaError> {
        let resolvers = self.resolvers;
        let mut built = IndexMap::with_capacity(fields.len());

        for field in fields {
            let field = &field.node;
            let field_name = field.name.node.as_str();
            let host = format!("{owner}.{field_name}");

            let ty = self.type_reference(&field.ty.node, Expect::Output, &host)?;
            let arguments =
                self.build_input_values(&host, &field.arguments, InputPosition::Argument)?;

            let mut definition = FieldDefinition {
                name: field_name.to_string(),
                description: field.description.as_ref().map(|d| d.node.clone()),
                ty,
                arguments,
                resolver: resolvers
                    .field_resolver(owner, field_name)
                    .cloned()
                    .unwrap_or_else(|| FieldResolver::default_for(field_name)),
                subscription_resolver: resolvers.subscription_resolver(owner, field_name).cloned(),
                deprecation: Deprecation::Active,
            };
            apply_directives(
                self,
                DirectiveTarget::FieldDefinition(&mut definition),
                &field.directives,
                &host,
                true,
            )?;

            built.insert(field_name.to_string(), definition);
        }

        Ok(built)
    }

    fn build_input_values(
        &mut self,
        owner: &str,
        values: &'a [Positioned<AstInputValueDefinition>],
        position: InputPosition,
    ) -> Result<IndexMap<String, InputValueDefinition>, SchemaError> {
        let mut built = IndexMap::with_capacity(values.len());

        for value in values {
            let value = &value.node;
            let value_name = value.name.node.as_str();
            let host = match position {
                InputPosition::Argument => format!("{owner}({value_name}:)"),
                InputPosition::InputField => format!("{owner}.{value_name}"),
            };

            let ty = self.type_reference(&value.ty.node, Expect::Input, &host)?;
            let mut definition = InputValueDefinition {
                name: value_name.to_string(),
                description: value.description.as_ref().map(|d| d.node.clone()),
                ty,
                default_value: value.default_value.as_ref().map(|v| v.node.clone()),
                deprecation: Deprecation::Active,
            };

            let target = match position {
                InputPosition::Argument => DirectiveTarget::Argument(&mut definition),
                InputPosition::InputField => DirectiveTarget::InputField(&mut definition),
            };
            apply_directives(self, target, &value.directives, &host, true)?;

            built.insert(value_name.to_string(), definition);
        }

        Ok(built)
    }

    fn type_reference(
        &mut self,
        ty: &Type,
        expect: Expect,
        referenced_by: &str,
    ) -> Result<TypeReference, SchemaError> {
        let inner = match &ty.base {
            BaseType::Named(name) => {
                TypeReference::Named(self.reference(name, expect, referenced_by)?)
            }
            BaseType::List(item) => {
                TypeReference::List(Box::new(self.type_reference(item, expect, referenced_by)?))
            }
        };

        Ok(if ty.nullable {
            inner
        } else {
            TypeReference::NonNull(Box::new(inner))
        })
    }

    fn reference(
        &mut self,
        name: &str,
        expect: Expect,
        referenced_by: &str,
    ) -> Result<TypeHandle, SchemaError> {
        let kind = self.declared_kind(name, referenced_by)?;
        if !expect.accepts(kind) {
            return Err(SchemaError::InvalidReference {
                name: name.to_string(),
                expected: expect.label(),
                found: kind.as_str(),
                referenced_by: referenced_by.to_string(),
            });
        }
        self.handle(name)
    }

    /// Bound type resolver, or a fixed one when there is a single candidate.
    fn abstract_type_resolver(
        &self,
        kind: &'static str,
        name: &str,
        candidates: &[String],
    ) -> Result<Option<TypeResolver>, SchemaError> {
        if let Some(resolver) = self.resolvers.type_resolver(name) {
            return Ok(Some(resolver.clone()));
        }

        match candidates {
            [] => Ok(None),
            [only] => Ok(Some(TypeResolver::fixed(only.clone()))),
            _ => Err(SchemaError::missing_resolver(kind, name, "type resolver")),
        }
    }
}

impl std::fmt::Debug for TypeRegistry<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("types", &self.types.keys().collect::<Vec<_>>())
            .field("under_construction", &self.under_construction)
            .field("directives", &self.directive_types.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

fn kind_mismatch(
    name: &str,
    expected: DeclarationKind,
    found: DeclarationKind,
    referenced_by: &str,
) -> SchemaError {
    SchemaError::InvalidReference {
        name: name.to_string(),
        expected: expected.as_str(),
        found: found.as_str(),
        referenced_by: referenced_by.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use async_graphql::Value;

    use super::*;
    use crate::bindings::{EnumBinding, ScalarBinding};
    use crate::schema::directives::{DirectiveArgs, DirectiveContext, SchemaDirectiveVisitor};
    use crate::schema::types::SchemaRoots;

    struct Fixture {
        document: Document,
        resolvers: Resolvers,
        directives: SchemaDirectives,
    }

    impl Fixture {
        fn new(sdl: &str) -> Self {
            Self::with_resolvers(sdl, Resolvers::default())
        }

        fn with_resolvers(sdl: &str, resolvers: Resolvers) -> Self {
            Self {
                document: Document::parse(sdl).unwrap(),
                resolvers,
                directives: SchemaDirectives::new(),
            }
        }

        fn registry(&self) -> TypeRegistry<'_> {
            TypeRegistry::new(&self.document, &self.resolvers, &self.directives, None)
        }
    }

    fn field_handle<'t>(object: &'t ObjectType, field: &str) -> &'t TypeHandle {
        object.fields[field].ty.handle()
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let input = Fixture::new("type Query { user: User } type User { id: ID! }");
        let mut registry = input.registry();

        let first = registry.get_object("User").unwrap();
        let second = registry.get_object("User").unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        let query = registry.get_object("Query").unwrap();
        match field_handle(&query, "user") {
            TypeHandle::Ready(NamedType::Object(user)) => assert!(Arc::ptr_eq(user, &first)),
            other => panic!("unexpected handle {other:?}"),
        }
    }

    #[test]
    fn test_self_reference_yields_thunk() {
        let input = Fixture::new("type Query { me: User } type User { friends: [User!] }");
        let mut registry = input.registry();
        registry.resolve_all().unwrap();

        let user = registry.get_object("User").unwrap();
        let friends = field_handle(&user, "friends");
        assert!(friends.is_deferred());
        assert_eq!(user.fields["friends"].ty.to_string(), "[User!]");

        let forced = friends.force().unwrap();
        assert!(Arc::ptr_eq(forced.as_object().unwrap(), &user));
        assert!(friends.force().unwrap().ptr_eq(&forced));
    }

    #[test]
    fn test_thunk_resolves_only_while_owners_live() {
        let input = Fixture::new("type Query { me: User } type User { friends: [User!] }");
        let mut registry = input.registry();
        registry.resolve_all().unwrap();
        let (types, _) = registry.into_parts();

        let friends = field_handle(types["User"].as_object().unwrap(), "friends").clone();
        assert!(friends.is_deferred());
        assert!(friends.force().is_some());

        drop(types);
        assert!(friends.force().is_none());
    }

    #[test]
    fn test_mutual_cycle() {
        let input = Fixture::new("type A { b: B } type B { a: A } type Query { a: A }");
        let mut registry = input.registry();
        registry.resolve_all().unwrap();

        let a = registry.get_object("A").unwrap();
        let b = registry.get_object("B").unwrap();

        let a_to_b = field_handle(&a, "b");
        assert!(!a_to_b.is_deferred());
        assert!(Arc::ptr_eq(a_to_b.force().unwrap().as_object().unwrap(), &b));

        let b_to_a = field_handle(&b, "a");
        assert!(b_to_a.is_deferred());
        assert!(Arc::ptr_eq(b_to_a.force().unwrap().as_object().unwrap(), &a));
        assert!(!registry.is_under_construction("A"));
    }

    #[test]
    fn test_unresolved_reference() {
        let input = Fixture::new("type Query { foo: Foo }");
        let err = input.registry().resolve_all().unwrap_err();
        match err {
            SchemaError::UnresolvedReference {
                name,
                referenced_by,
                ..
            } => {
                assert_eq!(name, "Foo");
                assert_eq!(referenced_by, "Query.foo");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_interface_needs_type_resolver() {
        let sdl = "interface Node { id: ID! }
                   type User implements Node { id: ID! }
                   type Post implements Node { id: ID! }
                   type Query { node: Node }";
        let err = Fixture::new(sdl).registry().resolve_all().unwrap_err();
        assert!(matches!(
            err,
            SchemaError::MissingResolver { kind: "interface", ref name, .. } if name == "Node"
        ));

        let resolvers = Resolvers::builder()
            .type_resolver("Node", |_| Some("User".into()))
            .build()
            .unwrap();
        let input = Fixture::with_resolvers(sdl, resolvers);
        let mut registry = input.registry();
        registry.resolve_all().unwrap();
        let node = registry.get_interface("Node").unwrap();
        assert_eq!(node.possible_types, vec!["User", "Post"]);
    }

    #[test]
    fn test_single_implementor_is_the_default() {
        let input = Fixture::new(
            "interface Node { id: ID! } type User implements Node { id: ID! } type Query { node: Node }",
        );
        let mut registry = input.registry();
        let node = registry.get_interface("Node").unwrap();
        let resolver = node.type_resolver.as_ref().unwrap();
        assert_eq!(resolver.resolve(&Value::Null).as_deref(), Some("User"));
    }

    #[test]
    fn test_union_needs_type_resolver() {
        let sdl = "type A { a: Int } type B { b: Int } union AB = A | B type Query { ab: AB }";
        let err = Fixture::new(sdl).registry().resolve_all().unwrap_err();
        assert_eq!(err.error_code(), "MISSING_RESOLVER");

        let input = Fixture::new("type A { a: Int } union OnlyA = A type Query { a: OnlyA }");
        let mut registry = input.registry();
        assert!(registry.get_union("OnlyA").unwrap().type_resolver.is_some());
    }

    #[test]
    fn test_union_members_must_be_objects() {
        let sdl = "interface I { a: Int } union U = I type Query { u: U }";
        let err = Fixture::new(sdl).registry().resolve_all().unwrap_err();
        assert!(matches!(
            err,
            SchemaError::InvalidReference { expected: "object", found: "interface", .. }
        ));
    }

    #[test]
    fn test_custom_scalar_needs_binding() {
        let sdl = "scalar Date type Query { today: Date }";
        let err = Fixture::new(sdl).registry().resolve_all().unwrap_err();
        assert!(matches!(
            err,
            SchemaError::MissingResolver { kind: "scalar", ref name, .. } if name == "Date"
        ));

        let resolvers = Resolvers::builder()
            .scalar("Date", ScalarBinding::new(|v| v.clone(), |v| Ok(v.clone())))
            .build()
            .unwrap();
        let input = Fixture::with_resolvers(sdl, resolvers);
        let mut registry = input.registry();
        let date = registry.get_scalar("Date").unwrap();
        assert!(!date.builtin);
        assert!(date.binding.is_some());
    }

    #[test]
    fn test_enum_binding_must_name_declared_values() {
        let resolvers = Resolvers::builder()
            .enum_values("Color", EnumBinding::new().value("BLUE", 3))
            .build()
            .unwrap();
        let input = Fixture::with_resolvers("enum Color { RED } type Query { c: Color }", resolvers);
        let err = input.registry().resolve_all().unwrap_err();
        assert_eq!(err.error_code(), "INVALID_BINDING");
    }

    #[test]
    fn test_enum_internal_values() {
        let resolvers = Resolvers::builder()
            .enum_values("Color", EnumBinding::new().value("RED", "#f00"))
            .build()
            .unwrap();
        let input =
            Fixture::with_resolvers("enum Color { RED GREEN } type Query { c: Color }", resolvers);
        let mut registry = input.registry();
        let color = registry.get_enum("Color").unwrap();
        assert!(color.has_internal_values());
        assert_eq!(color.name_of(&Value::String("#f00".into())), Some("RED"));
        assert!(color.values["GREEN"].internal.is_none());
    }

    #[test]
    fn test_kind_checked_accessors() {
        let input = Fixture::new("enum Color { RED } type Query { c: Color }");
        let mut registry = input.registry();

        let err = registry.get_object("Color").unwrap_err();
        assert!(matches!(
            err,
            SchemaError::InvalidReference { expected: "object", found: "enum", .. }
        ));
        assert!(registry.get_scalar("String").unwrap().builtin);
        assert_eq!(
            registry.get_type("Missing").unwrap_err().error_code(),
            "UNRESOLVED_REFERENCE"
        );
    }

    #[test]
    fn test_input_and_output_positions() {
        let err = Fixture::new("input Filter { a: Int } type Query { f: Filter }")
            .registry()
            .resolve_all()
            .unwrap_err();
        assert!(matches!(
            err,
            SchemaError::InvalidReference { expected: "output type", .. }
        ));

        let err = Fixture::new("type Out { a: Int } type Query { f(arg: Out): Int }")
            .registry()
            .resolve_all()
            .unwrap_err();
        match err {
            SchemaError::InvalidReference { referenced_by, .. } => {
                assert_eq!(referenced_by, "Query.f(arg:)");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_arguments_keep_defaults() {
        let input = Fixture::new("type Query { items(first: Int = 10, after: String): [String] }");
        let mut registry = input.registry();
        let query = registry.get_object("Query").unwrap();
        let items = &query.fields["items"];
        assert_eq!(
            items.arguments["first"].default_value,
            Some(Value::Number(10.into()))
        );
        assert!(items.arguments["after"].default_value.is_none());
    }

    #[test]
    fn test_directive_definitions_are_constructed() {
        let input = Fixture::new(
            "directive @cache(maxAge: Int) repeatable on FIELD_DEFINITION | OBJECT
             type Query { a: Int }",
        );
        let mut registry = input.registry();
        registry.resolve_all().unwrap();

        let cache = registry.get_directive("cache").unwrap();
        assert!(cache.repeatable);
        assert_eq!(
            cache.locations,
            vec![DirectiveLocation::FieldDefinition, DirectiveLocation::Object]
        );
        assert!(cache.arguments.contains_key("maxAge"));
        assert_eq!(registry.directives().count(), 1);
    }

    struct NeedsOrphan;

    impl SchemaDirectiveVisitor for NeedsOrphan {
        fn visit_schema(
            &self,
            _schema: &SchemaRoots,
            _args: &DirectiveArgs,
            ctx: &DirectiveContext<'_>,
        ) -> Result<(), SchemaError> {
            ctx.type_handle("Orphan").map(|_| ())
        }
    }

    #[test]
    fn test_premature_directive_without_thunks() {
        let document = Document::parse(
            "schema @needsOrphan { query: Query }
             type Query { a: Int }
             type Orphan { b: Int }",
        )
        .unwrap();
        let resolvers = Resolvers::default();
        let directives = SchemaDirectives::new().with("needsOrphan", NeedsOrphan);
        let mut registry = TypeRegistry::new(&document, &resolvers, &directives, None);

        let roots = SchemaRoots {
            query: registry.get_object("Query").unwrap(),
            mutation: None,
            subscription: None,
        };
        let invocations = &document.schema_definition().unwrap().directives;

        let err = apply_directives(
            &registry,
            DirectiveTarget::Schema(&roots),
            invocations,
            "schema",
            false,
        )
        .unwrap_err();
        match err {
            SchemaError::PrematureDirective {
                directive,
                type_name,
            } => {
                assert_eq!(directive, "needsOrphan");
                assert_eq!(type_name, "Orphan");
            }
            other => panic!("unexpected error: {other}"),
        }

        assert!(
            apply_directives(
                &registry,
                DirectiveTarget::Schema(&roots),
                invocations,
                "schema",
                true,
            )
            .is_ok()
        );
    }
}
