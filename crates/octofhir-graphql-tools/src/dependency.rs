//! Declaration dependency map.
//!
//! Records, for every declaration in a [`Document`], the names it refers to.
//! The map is advisory: it is kept for diagnostics and may contain cycles;
//! type resolution never relies on it being acyclic.

use std::collections::{BTreeMap, BTreeSet};

use async_graphql_parser::Positioned;
use async_graphql_parser::types::{
    BaseType, ConstDirective, FieldDefinition, InputValueDefinition, Type, TypeKind,
};
use serde::Serialize;

use crate::document::{Document, is_builtin_directive, is_builtin_scalar};

/// Key under which the schema definition's references are recorded.
pub const SCHEMA_KEY: &str = "schema";

/// Mapping from declaration name to the names it references.
///
/// Directive references are recorded as `@name`. Built-in scalars and
/// built-in directives are left out.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct DependencyMap(BTreeMap<String, BTreeSet<String>>);

impl DependencyMap {
    /// Builds the map in a single pass over the document.
    pub fn from_document(document: &Document) -> Self {
        let mut map = Self::default();

        for (name, typedef) in document.types() {
            let mut refs = BTreeSet::new();
            collect_directives(&typedef.directives, &mut refs);

            match &typedef.kind {
                TypeKind::Scalar => {}
                TypeKind::Object(object) => {
                    collect_names(object.implements.iter().map(|i| i.node.as_str()), &mut refs);
                    collect_fields(&object.fields, &mut refs);
                }
                TypeKind::Interface(iface) => {
                    collect_names(iface.implements.iter().map(|i| i.node.as_str()), &mut refs);
                    collect_fields(&iface.fields, &mut refs);
                }
                TypeKind::Union(union) => {
                    collect_names(union.members.iter().map(|m| m.node.as_str()), &mut refs);
                }
                TypeKind::Enum(enm) => {
                    for value in &enm.values {
                        collect_directives(&value.node.directives, &mut refs);
                    }
                }
                TypeKind::InputObject(input) => collect_input_values(&input.fields, &mut refs),
            }

            map.0.insert(name.to_string(), refs);
        }

        for (name, directive) in document.directives() {
            let mut refs = BTreeSet::new();
            collect_input_values(&directive.arguments, &mut refs);
            map.0.insert(format!("@{name}"), refs);
        }

        if let Some(schema) = document.schema_definition() {
            let mut refs = BTreeSet::new();
            let roots = [&schema.query, &schema.mutation, &schema.subscription];
            collect_names(
                roots.into_iter().flatten().map(|root| root.node.as_str()),
                &mut refs,
            );
            collect_directives(&schema.directives, &mut refs);
            map.0.insert(SCHEMA_KEY.to_string(), refs);
        }

        map
    }

    /// Returns the references recorded for a declaration.
    pub fn get(&self, name: &str) -> Option<&BTreeSet<String>> {
        self.0.get(name)
    }

    /// Whether `name` references `other`.
    pub fn references(&self, name: &str, other: &str) -> bool {
        self.0.get(name).is_some_and(|refs| refs.contains(other))
    }

    /// Iterates over declarations in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &BTreeSet<String>)> {
        self.0.iter().map(|(name, refs)| (name.as_str(), refs))
    }

    /// Number of declarations in the map.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the map is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Referenced names that the document does not declare, as
    /// `(referencing declaration, missing name)` pairs.
    pub fn unresolved(&self, document: &Document) -> Vec<(&str, &str)> {
        self.iter()
            .flat_map(|(name, refs)| refs.iter().map(move |r| (name, r.as_str())))
            .filter(|(_, r)| match r.strip_prefix('@') {
                Some(directive) => document.directive(directive).is_none(),
                None => document.get(r).is_none(),
            })
            .collect()
    }

    /// Pretty-printed JSON with a stable key order.
    pub fn to_pretty_json(&self) -> String {
        // A map of strings to sets of strings always serializes.
        serde_json::to_string_pretty(&self.0).unwrap_or_default()
    }
}

/// Unwraps list and non-null modifiers down to the named type.
pub(crate) fn named_type(ty: &Type) -> &str {
    match &ty.base {
        BaseType::Named(name) => name.as_str(),
        BaseType::List(inner) => named_type(inner),
    }
}

fn collect_names<'a>(names: impl Iterator<Item = &'a str>, refs: &mut BTreeSet<String>) {
    for name in names {
        if !is_builtin_scalar(name) {
            refs.insert(name.to_string());
        }
    }
}

fn collect_directives(directives: &[Positioned<ConstDirective>], refs: &mut BTreeSet<String>) {
    for directive in directives {
        let name = directive.node.name.node.as_str();
        if !is_builtin_directive(name) {
            refs.insert(format!("@{name}"));
        }
    }
}

fn collect_input_values(
    values: &[Positioned<InputValueDefinition>],
    refs: &mut BTreeSet<String>,
) {
    for value in values {
        collect_names(std::iter::once(named_type(&value.node.ty.node)), refs);
        collect_directives(&value.node.directives, refs);
    }
}

fn collect_fields(fields: &[Positioned<FieldDefinition>], refs: &mut BTreeSet<String>) {
    for field in fields {
        collect_names(std::iter::once(named_type(&field.node.ty.node)), refs);
        collect_input_values(&field.node.arguments, refs);
        collect_directives(&field.node.directives, refs);
    }
}
