//! Lowering of constructed types into the execution engine's dynamic schema.
//!
//! References are lowered by name only; deferred handles are never forced
//! here, since the engine resolves names against its own type table.
//! Resolvers whose output needs translation are wrapped in an adapter:
//! custom scalars are serialized through their binding, enum internal values
//! are mapped back to value names, and interface or union values are tagged
//! with their concrete type.

use std::sync::Arc;

use async_graphql::dynamic::{
    Enum, EnumItem, Field, FieldFuture, FieldValue, InputObject, InputValue, Interface,
    InterfaceField, Object, Scalar, SchemaBuilder, Subscription, SubscriptionField, TypeRef,
    Union,
};
use async_graphql::{Error, Name, Value};
use indexmap::IndexMap;
use tracing::trace;

use super::types::{
    EnumType, FieldDefinition, InputObjectType, InputValueDefinition, InterfaceType, NamedType,
    ObjectType, ScalarType, TypeReference, UnionType,
};
use crate::bindings::{ScalarBinding, TypeResolver, settle_field_future};
use crate::error::SchemaError;

/// Registers every non-built-in type with the engine builder.
///
/// The object named `subscription_root` is registered as the engine's
/// subscription type instead of a plain object.
pub(crate) fn register_types(
    mut builder: SchemaBuilder,
    types: &IndexMap<String, NamedType>,
    subscription_root: Option<&str>,
) -> Result<SchemaBuilder, SchemaError> {
    for ty in types.values() {
        trace!(type_name = %ty.name(), kind = %ty.kind(), "Lowering type");
        builder = match ty {
            NamedType::Object(object) if Some(object.name.as_str()) == subscription_root => {
                builder.register(lower_subscription(object)?)
            }
            NamedType::Object(object) => builder.register(lower_object(object, types)),
            NamedType::Interface(iface) => builder.register(lower_interface(iface)),
            NamedType::Union(union) => builder.register(lower_union(union)),
            NamedType::Enum(enm) => builder.register(lower_enum(enm)),
            NamedType::Scalar(scalar) if scalar.builtin => builder,
            NamedType::Scalar(scalar) => builder.register(lower_scalar(scalar)),
            NamedType::InputObject(input) => builder.register(lower_input_object(input)),
        };
    }

    Ok(builder)
}

pub(crate) fn type_ref(reference: &TypeReference) -> TypeRef {
    match reference {
        TypeReference::Named(handle) => TypeRef::Named(handle.name().to_string().into()),
        TypeReference::List(inner) => TypeRef::List(Box::new(type_ref(inner))),
        TypeReference::NonNull(inner) => TypeRef::NonNull(Box::new(type_ref(inner))),
    }
}

fn lower_object(object: &ObjectType, types: &IndexMap<String, NamedType>) -> Object {
    let mut lowered = Object::new(&object.name);
    if let Some(description) = &object.description {
        lowered = lowered.description(description);
    }
    for iface in &object.interfaces {
        lowered = lowered.implement(iface.name());
    }
    for field in object.fields.values() {
        lowered = lowered.field(lower_field(field, types));
    }
    lowered
}

fn lower_field(field: &FieldDefinition, types: &IndexMap<String, NamedType>) -> Field {
    let resolver = field.resolver.clone();

    let mut lowered = match OutputAdapter::for_type(types, field.ty.base_name()) {
        None => Field::new(&field.name, type_ref(&field.ty), move |ctx| resolver.call(ctx)),
        Some(adapter) => {
            let shape = field.ty.clone();
            Field::new(&field.name, type_ref(&field.ty), move |ctx| {
                let output = resolver.call(ctx);
                let adapter = adapter.clone();
                let shape = shape.clone();
                FieldFuture::new(async move {
                    let output = settle_field_future(output).await?;
                    adapter.apply(&shape, output)
                })
            })
        }
    };

    if let Some(description) = &field.description {
        lowered = lowered.description(description);
    }
    if field.deprecation.is_deprecated() {
        lowered = lowered.deprecation(field.deprecation.reason());
    }
    for argument in field.arguments.values() {
        lowered = lowered.argument(lower_input_value(argument));
    }
    lowered
}

fn lower_subscription(object: &ObjectType) -> Result<Subscription, SchemaError> {
    let mut lowered = Subscription::new(&object.name);
    if let Some(description) = &object.description {
        lowered = lowered.description(description);
    }

    for field in object.fields.values() {
        let Some(resolver) = field.subscription_resolver.clone() else {
            return Err(SchemaError::missing_resolver(
                "subscription field",
                format!("{}.{}", object.name, field.name),
                "subscription resolver",
            ));
        };

        let mut subscription_field =
            SubscriptionField::new(&field.name, type_ref(&field.ty), move |ctx| {
                resolver.call(ctx)
            });
        if let Some(description) = &field.description {
            subscription_field = subscription_field.description(description);
        }
        if field.deprecation.is_deprecated() {
            subscription_field = subscription_field.deprecation(field.deprecation.reason());
        }
        for argument in field.arguments.values() {
            subscription_field = subscription_field.argument(lower_input_value(argument));
        }
        lowered = lowered.field(subscription_field);
    }

    Ok(lowered)
}

fn lower_interface(iface: &InterfaceType) -> Interface {
    let mut lowered = Interface::new(&iface.name);
    if let Some(description) = &iface.description {
        lowered = lowered.description(description);
    }
    for parent in &iface.interfaces {
        lowered = lowered.implement(parent.name());
    }

    for field in iface.fields.values() {
        let mut lowered_field = InterfaceField::new(&field.name, type_ref(&field.ty));
        if let Some(description) = &field.description {
            lowered_field = lowered_field.description(description);
        }
        if field.deprecation.is_deprecated() {
            lowered_field = lowered_field.deprecation(field.deprecation.reason());
        }
        for argument in field.arguments.values() {
            lowered_field = lowered_field.argument(lower_input_value(argument));
        }
        lowered = lowered.field(lowered_field);
    }

    lowered
}

fn lower_union(union: &UnionType) -> Union {
    let mut lowered = Union::new(&union.name);
    if let Some(description) = &union.description {
        lowered = lowered.description(description);
    }
    for member in &union.members {
        lowered = lowered.possible_type(member.name());
    }
    lowered
}

fn lower_enum(enm: &EnumType) -> Enum {
    let mut lowered = Enum::new(&enm.name);
    if let Some(description) = &enm.description {
        lowered = lowered.description(description);
    }

    for value in enm.values.values() {
        let mut item = EnumItem::new(&value.name);
        if let Some(description) = &value.description {
            item = item.description(description);
        }
        if value.deprecation.is_deprecated() {
            item = item.deprecation(value.deprecation.reason());
        }
        lowered = lowered.item(item);
    }

    lowered
}

fn lower_scalar(scalar: &ScalarType) -> Scalar {
    let mut lowered = Scalar::new(&scalar.name);
    if let Some(description) = &scalar.description {
        lowered = lowered.description(description);
    }
    if let Some(binding) = scalar.binding.clone() {
        lowered = lowered.validator(move |value| binding.parse(value).is_ok());
    }
    if let Some(url) = &scalar.specified_by_url {
        lowered = lowered.specified_by_url(url);
    }
    lowered
}

fn lower_input_object(input: &InputObjectType) -> InputObject {
    let mut lowered = InputObject::new(&input.name);
    if let Some(description) = &input.description {
        lowered = lowered.description(description);
    }
    for field in input.fields.values() {
        lowered = lowered.field(lower_input_value(field));
    }
    lowered
}

fn lower_input_value(value: &InputValueDefinition) -> InputValue {
    let mut lowered = InputValue::new(&value.name, type_ref(&value.ty));
    if let Some(description) = &value.description {
        lowered = lowered.description(description);
    }
    if let Some(default) = &value.default_value {
        lowered = lowered.default_value(default.clone());
    }
    lowered
}

/// Translation applied to a resolver's output.
#[derive(Clone)]
enum OutputAdapter {
    Scalar(ScalarBinding),
    Enum(Arc<EnumType>),
    Abstract {
        type_name: String,
        resolver: TypeResolver,
    },
}

impl OutputAdapter {
    fn for_type(types: &IndexMap<String, NamedType>, name: &str) -> Option<Self> {
        match types.get(name)? {
            NamedType::Scalar(scalar) => scalar.binding.clone().map(Self::Scalar),
            NamedType::Enum(enm) if enm.has_internal_values() => Some(Self::Enum(enm.clone())),
            NamedType::Interface(iface) => {
                iface.type_resolver.clone().map(|resolver| Self::Abstract {
                    type_name: iface.name.clone(),
                    resolver,
                })
            }
            NamedType::Union(union) => union.type_resolver.clone().map(|resolver| Self::Abstract {
                type_name: union.name.clone(),
                resolver,
            }),
            _ => None,
        }
    }

    /// Adapts plain values; anything else a resolver produced passes through.
    fn apply<'a>(
        &self,
        shape: &TypeReference,
        output: Option<FieldValue<'a>>,
    ) -> async_graphql::Result<Option<FieldValue<'a>>> {
        let Some(output) = output else {
            return Ok(None);
        };
        match output.as_value() {
            Some(value) => self.adapt(shape, value.clone()).map(Some),
            None => Ok(Some(output)),
        }
    }

    fn adapt<'a>(&self, shape: &TypeReference, value: Value) -> async_graphql::Result<FieldValue<'a>> {
        match (shape, value) {
            (_, Value::Null) => Ok(FieldValue::value(Value::Null)),
            (TypeReference::NonNull(inner), value) => self.adapt(inner, value),
            (TypeReference::List(inner), Value::List(items)) => {
                let items = items
                    .into_iter()
                    .map(|item| self.adapt(inner, item))
                    .collect::<async_graphql::Result<Vec<_>>>()?;
                Ok(FieldValue::list(items))
            }
            (_, value) => self.adapt_named(value),
        }
    }

    fn adapt_named<'a>(&self, value: Value) -> async_graphql::Result<FieldValue<'a>> {
        match self {
            Self::Scalar(binding) => Ok(FieldValue::value(binding.serialize(&value))),
            Self::Enum(enm) => match enm.name_of(&value) {
                Some(name) => Ok(FieldValue::value(Value::Enum(Name::new(name)))),
                None => Ok(FieldValue::value(value)),
            },
            Self::Abstract {
                type_name,
                resolver,
            } => match resolver.resolve(&value) {
                Some(concrete) => Ok(FieldValue::value(value).with_type(concrete)),
                None => Err(Error::new(format!(
                    "Could not resolve the concrete type of `{type_name}`"
                ))),
            },
        }
    }
}
