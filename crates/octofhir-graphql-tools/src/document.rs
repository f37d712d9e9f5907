//! Definition merging.
//!
//! Type definitions arrive as one or more SDL fragments. They are joined in
//! input order, parsed once, and folded into a [`Document`] holding exactly
//! one declaration per type name: redeclarations of the same kind are merged
//! and `extend` blocks are applied to their targets regardless of which
//! fragment declared the target.

use std::fmt;

use async_graphql_parser::Positioned;
use async_graphql_parser::types::{
    ConstDirective, DirectiveDefinition, EnumValueDefinition, FieldDefinition,
    InputValueDefinition, SchemaDefinition, ServiceDocument, TypeDefinition, TypeKind,
    TypeSystemDefinition,
};
use async_graphql_value::Name;
use indexmap::IndexMap;
use tracing::{debug, trace};

use crate::error::SchemaError;

/// Scalars every schema has without declaring them.
pub const BUILTIN_SCALARS: [&str; 5] = ["String", "Int", "Float", "Boolean", "ID"];

/// Directives every schema has without declaring them.
pub const BUILTIN_DIRECTIVES: [&str; 5] = ["deprecated", "specifiedBy", "oneOf", "skip", "include"];

/// Returns true for `String`, `Int`, `Float`, `Boolean` and `ID`.
pub fn is_builtin_scalar(name: &str) -> bool {
    BUILTIN_SCALARS.contains(&name)
}

/// Returns true for directives the schema language defines itself.
pub fn is_builtin_directive(name: &str) -> bool {
    BUILTIN_DIRECTIVES.contains(&name)
}

/// Checks that `name` matches `/[_A-Za-z][_0-9A-Za-z]*/`.
pub fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();

    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }

    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Type definition sources.
///
/// The provider variant supports late-bound or generated fragments; it is
/// called exactly once, when the definitions are merged.
pub enum TypeDefs {
    /// A single SDL string.
    Single(String),
    /// Several SDL fragments, merged in order.
    Many(Vec<String>),
    /// A deferred provider of SDL fragments.
    Provider(Box<dyn FnOnce() -> Vec<String> + Send>),
}

impl TypeDefs {
    /// Creates type definitions from a deferred provider.
    pub fn from_provider(provider: impl FnOnce() -> Vec<String> + Send + 'static) -> Self {
        Self::Provider(Box::new(provider))
    }

    /// Resolves the sources, calling the provider if there is one.
    pub fn into_sources(self) -> Vec<String> {
        match self {
            Self::Single(source) => vec![source],
            Self::Many(sources) => sources,
            Self::Provider(provider) => provider(),
        }
    }

    /// Joins all sources into one SDL text.
    pub fn concatenate(self) -> String {
        self.into_sources().join("\n")
    }
}

impl fmt::Debug for TypeDefs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single(source) => f.debug_tuple("Single").field(source).finish(),
            Self::Many(sources) => f.debug_tuple("Many").field(sources).finish(),
            Self::Provider(_) => f.write_str("Provider(..)"),
        }
    }
}

impl From<&str> for TypeDefs {
    fn from(source: &str) -> Self {
        Self::Single(source.to_string())
    }
}

impl From<String> for TypeDefs {
    fn from(source: String) -> Self {
        Self::Single(source)
    }
}

impl From<Vec<String>> for TypeDefs {
    fn from(sources: Vec<String>) -> Self {
        Self::Many(sources)
    }
}

impl From<Vec<&str>> for TypeDefs {
    fn from(sources: Vec<&str>) -> Self {
        Self::Many(sources.into_iter().map(str::to_string).collect())
    }
}

impl From<&[&str]> for TypeDefs {
    fn from(sources: &[&str]) -> Self {
        Self::Many(sources.iter().map(|s| s.to_string()).collect())
    }
}

/// Kind of a named type declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeclarationKind {
    Object,
    Interface,
    Union,
    InputObject,
    Enum,
    Scalar,
}

impl DeclarationKind {
    /// Returns the kind of a parsed type definition.
    pub fn of(kind: &TypeKind) -> Self {
        match kind {
            TypeKind::Scalar => Self::Scalar,
            TypeKind::Object(_) => Self::Object,
            TypeKind::Interface(_) => Self::Interface,
            TypeKind::Union(_) => Self::Union,
            TypeKind::Enum(_) => Self::Enum,
            TypeKind::InputObject(_) => Self::InputObject,
        }
    }

    /// Lower-case name used in error messages.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Object => "object",
            Self::Interface => "interface",
            Self::Union => "union",
            Self::InputObject => "input object",
            Self::Enum => "enum",
            Self::Scalar => "scalar",
        }
    }
}

impl fmt::Display for DeclarationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The merged type definition document.
#[derive(Debug, Clone, Default)]
pub struct Document {
    types: IndexMap<String, Positioned<TypeDefinition>>,
    directives: IndexMap<String, Positioned<DirectiveDefinition>>,
    schema: Option<Positioned<SchemaDefinition>>,
}

impl Document {
    /// Concatenates the sources, parses them once and merges the result.
    ///
    /// # Errors
    ///
    /// Returns `MalformedDefinition` if the combined text does not parse,
    /// `ConflictingDefinition` for incompatible redeclarations and
    /// `UnresolvedReference` for extensions without a target.
    pub fn parse(type_defs: impl Into<TypeDefs>) -> Result<Self, SchemaError> {
        let source = type_defs.into().concatenate();
        trace!(len = source.len(), "Parsing merged type definitions");

        let parsed = async_graphql_parser::parse_schema(&source).map_err(|err| {
            let pos = err.positions().next();
            SchemaError::MalformedDefinition {
                message: err.to_string(),
                line: pos.map_or(0, |p| p.line),
                column: pos.map_or(0, |p| p.column),
            }
        })?;

        Self::from_service_document(parsed)
    }

    /// Merges an already parsed document.
    pub fn from_service_document(parsed: ServiceDocument) -> Result<Self, SchemaError> {
        let mut document = Self::default();
        let mut type_extensions = Vec::new();
        let mut schema_extensions = Vec::new();

        for definition in parsed.definitions {
            match definition {
                TypeSystemDefinition::Type(typedef) if typedef.node.extend => {
                    type_extensions.push(typedef);
                }
                TypeSystemDefinition::Type(typedef) => document.add_type(typedef)?,
                TypeSystemDefinition::Directive(directive) => document.add_directive(directive)?,
                TypeSystemDefinition::Schema(schema) if schema.node.extend => {
                    schema_extensions.push(schema);
                }
                TypeSystemDefinition::Schema(schema) => {
                    if document.schema.is_some() {
                        return Err(SchemaError::conflicting(
                            "schema",
                            "a schema definition",
                            "a second schema definition",
                        ));
                    }
                    document.schema = Some(schema);
                }
            }
        }

        for extension in type_extensions {
            let name = extension.node.name.node.to_string();
            let kind = DeclarationKind::of(&extension.node.kind);
            let Some(target) = document.types.get_mut(&name) else {
                return Err(SchemaError::unresolved(
                    "extension target",
                    &name,
                    format!("extend {kind} {name}"),
                ));
            };
            trace!(type_name = %name, "Folding type extension");
            merge_type(target, extension)?;
        }

        for extension in schema_extensions {
            document.extend_schema(extension)?;
        }

        debug!(
            types = document.types.len(),
            directives = document.directives.len(),
            explicit_schema = document.schema.is_some(),
            "Merged type definitions"
        );
        Ok(document)
    }

    fn add_type(&mut self, typedef: Positioned<TypeDefinition>) -> Result<(), SchemaError> {
        let name = typedef.node.name.node.to_string();

        if is_builtin_scalar(&name) {
            if !matches!(typedef.node.kind, TypeKind::Scalar) {
                return Err(SchemaError::conflicting(
                    name,
                    DeclarationKind::Scalar.as_str(),
                    DeclarationKind::of(&typedef.node.kind).as_str(),
                ));
            }
            trace!(type_name = %name, "Ignoring redeclared built-in scalar");
            return Ok(());
        }

        match self.types.get_mut(&name) {
            Some(existing) => merge_type(existing, typedef),
            None => {
                self.types.insert(name, typedef);
                Ok(())
            }
        }
    }

    fn add_directive(
        &mut self,
        directive: Positioned<DirectiveDefinition>,
    ) -> Result<(), SchemaError> {
        let name = directive.node.name.node.to_string();

        if let Some(existing) = self.directives.get(&name) {
            let same_locations = existing.node.locations.len() == directive.node.locations.len()
                && existing
                    .node
                    .locations
                    .iter()
                    .zip(&directive.node.locations)
                    .all(|(a, b)| a.node == b.node);
            if !same_locations {
                return Err(SchemaError::conflicting(
                    format!("@{name}"),
                    "a directive",
                    "a directive with different locations",
                ));
            }
            return Ok(());
        }

        self.directives.insert(name, directive);
        Ok(())
    }

    fn extend_schema(&mut self, extension: Positioned<SchemaDefinition>) -> Result<(), SchemaError> {
        let Some(schema) = self.schema.as_mut() else {
            let mut schema = extension;
            schema.node.extend = false;
            self.schema = Some(schema);
            return Ok(());
        };

        let Positioned { node: extension, .. } = extension;
        merge_root(&mut schema.node.query, extension.query, "query")?;
        merge_root(&mut schema.node.mutation, extension.mutation, "mutation")?;
        merge_root(&mut schema.node.subscription, extension.subscription, "subscription")?;
        append_directives(&mut schema.node.directives, extension.directives);
        Ok(())
    }

    /// Number of type declarations.
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Whether the document declares no types.
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Iterates over type declarations in first-appearance order.
    pub fn types(&self) -> impl Iterator<Item = (&str, &TypeDefinition)> {
        self.types.iter().map(|(name, def)| (name.as_str(), &def.node))
    }

    /// Names of all declared types, in first-appearance order.
    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }

    /// Returns the merged declaration of a type.
    pub fn get(&self, name: &str) -> Option<&TypeDefinition> {
        self.types.get(name).map(|def| &def.node)
    }

    /// Returns the kind of a declared type.
    pub fn kind_of(&self, name: &str) -> Option<DeclarationKind> {
        self.get(name).map(|def| DeclarationKind::of(&def.kind))
    }

    /// Iterates over directive definitions.
    pub fn directives(&self) -> impl Iterator<Item = (&str, &DirectiveDefinition)> {
        self.directives
            .iter()
            .map(|(name, def)| (name.as_str(), &def.node))
    }

    /// Returns a directive definition by name (without `@`).
    pub fn directive(&self, name: &str) -> Option<&DirectiveDefinition> {
        self.directives.get(name).map(|def| &def.node)
    }

    /// Returns the explicit schema definition, if any.
    pub fn schema_definition(&self) -> Option<&SchemaDefinition> {
        self.schema.as_ref().map(|def| &def.node)
    }

    /// Names of object types implementing the given interface.
    pub fn implementors(&self, interface: &str) -> Vec<&str> {
        self.types
            .iter()
            .filter_map(|(name, def)| match &def.node.kind {
                TypeKind::Object(object)
                    if object.implements.iter().any(|i| i.node.as_str() == interface) =>
                {
                    Some(name.as_str())
                }
                _ => None,
            })
            .collect()
    }
}

fn merge_type(
    existing: &mut Positioned<TypeDefinition>,
    incoming: Positioned<TypeDefinition>,
) -> Result<(), SchemaError> {
    let name = existing.node.name.node.to_string();
    let Positioned { node: incoming, .. } = incoming;

    if existing.node.description.is_none() {
        existing.node.description = incoming.description;
    }
    append_directives(&mut existing.node.directives, incoming.directives);

    match (&mut existing.node.kind, incoming.kind) {
        (TypeKind::Scalar, TypeKind::Scalar) => {}
        (TypeKind::Object(base), TypeKind::Object(ext)) => {
            append_names(&mut base.implements, ext.implements);
            merge_fields(&name, &mut base.fields, ext.fields)?;
        }
        (TypeKind::Interface(base), TypeKind::Interface(ext)) => {
            append_names(&mut base.implements, ext.implements);
            merge_fields(&name, &mut base.fields, ext.fields)?;
        }
        (TypeKind::Union(base), TypeKind::Union(ext)) => {
            append_names(&mut base.members, ext.members);
        }
        (TypeKind::Enum(base), TypeKind::Enum(ext)) => {
            merge_enum_values(&mut base.values, ext.values);
        }
        (TypeKind::InputObject(base), TypeKind::InputObject(ext)) => {
            merge_input_fields(&name, &mut base.fields, ext.fields)?;
        }
        (existing_kind, incoming_kind) => {
            return Err(SchemaError::conflicting(
                name,
                DeclarationKind::of(existing_kind).as_str(),
                DeclarationKind::of(&incoming_kind).as_str(),
            ));
        }
    }

    Ok(())
}

fn merge_fields(
    owner: &str,
    fields: &mut Vec<Positioned<FieldDefinition>>,
    incoming: Vec<Positioned<FieldDefinition>>,
) -> Result<(), SchemaError> {
    for field in incoming {
        let Some(existing) = fields
            .iter_mut()
            .find(|f| f.node.name.node == field.node.name.node)
        else {
            fields.push(field);
            continue;
        };
        if existing.node.ty.node.to_string() != field.node.ty.node.to_string() {
            return Err(SchemaError::conflicting(
                format!("{owner}.{}", field.node.name.node),
                existing.node.ty.node.to_string(),
                field.node.ty.node.to_string(),
            ));
        }

        let Positioned { node: field, .. } = field;
        if existing.node.description.is_none() {
            existing.node.description = field.description;
        }
        append_directives(&mut existing.node.directives, field.directives);
    }
    Ok(())
}

fn merge_input_fields(
    owner: &str,
    fields: &mut Vec<Positioned<InputValueDefinition>>,
    incoming: Vec<Positioned<InputValueDefinition>>,
) -> Result<(), SchemaError> {
    for field in incoming {
        let Some(existing) = fields
            .iter_mut()
            .find(|f| f.node.name.node == field.node.name.node)
        else {
            fields.push(field);
            continue;
        };
        if existing.node.ty.node.to_string() != field.node.ty.node.to_string() {
            return Err(SchemaError::conflicting(
                format!("{owner}.{}", field.node.name.node),
                existing.node.ty.node.to_string(),
                field.node.ty.node.to_string(),
            ));
        }

        let Positioned { node: field, .. } = field;
        if existing.node.description.is_none() {
            existing.node.description = field.description;
        }
        append_directives(&mut existing.node.directives, field.directives);
    }
    Ok(())
}

fn merge_enum_values(
    values: &mut Vec<Positioned<EnumValueDefinition>>,
    incoming: Vec<Positioned<EnumValueDefinition>>,
) {
    for value in incoming {
        let Some(existing) = values
            .iter_mut()
            .find(|v| v.node.value.node == value.node.value.node)
        else {
            values.push(value);
            continue;
        };

        let Positioned { node: value, .. } = value;
        if existing.node.description.is_none() {
            existing.node.description = value.description;
        }
        append_directives(&mut existing.node.directives, value.directives);
    }
}

fn append_names(names: &mut Vec<Positioned<Name>>, incoming: Vec<Positioned<Name>>) {
    for name in incoming {
        if !names.iter().any(|n| n.node == name.node) {
            names.push(name);
        }
    }
}

fn append_directives(
    directives: &mut Vec<Positioned<ConstDirective>>,
    incoming: Vec<Positioned<ConstDirective>>,
) {
    for directive in incoming {
        if !directives.iter().any(|d| same_directive(&d.node, &directive.node)) {
            directives.push(directive);
        }
    }
}

fn same_directive(a: &ConstDirective, b: &ConstDirective) -> bool {
    a.name.node == b.name.node
        && a.arguments.len() == b.arguments.len()
        && a
            .arguments
            .iter()
            .zip(&b.arguments)
            .all(|((an, av), (bn, bv))| an.node == bn.node && av.node == bv.node)
}

fn merge_root(
    root: &mut Option<Positioned<Name>>,
    incoming: Option<Positioned<Name>>,
    operation: &str,
) -> Result<(), SchemaError> {
    match (root.as_ref(), incoming) {
        (_, None) => Ok(()),
        (None, Some(incoming)) => {
            *root = Some(incoming);
            Ok(())
        }
        (Some(existing), Some(incoming)) if existing.node == incoming.node => Ok(()),
        (Some(existing), Some(incoming)) => Err(SchemaError::conflicting(
            format!("schema.{operation}"),
            existing.node.to_string(),
            incoming.node.to_string(),
        )),
    }
}
