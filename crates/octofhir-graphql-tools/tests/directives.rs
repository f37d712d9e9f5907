//! Integration tests for construction-time schema directives.

use std::sync::{Arc, Mutex};

use async_graphql::Value;
use async_graphql::dynamic::FieldFuture;
use octofhir_graphql_tools::bindings::settle_field_future;
use octofhir_graphql_tools::schema::{
    Deprecation, DirectiveArgs, DirectiveContext, FieldDefinition, NamedType, ObjectType,
    SchemaRoots,
};
use octofhir_graphql_tools::{
    FieldResolver, Resolvers, SchemaAssembler, SchemaDirectiveVisitor, SchemaDirectives,
    SchemaError,
};
use serde_json::json;

/// Uppercases string results of the field it is applied to.
struct Upper;

impl SchemaDirectiveVisitor for Upper {
    fn visit_field_definition(
        &self,
        field: &mut FieldDefinition,
        _args: &DirectiveArgs,
        _ctx: &DirectiveContext<'_>,
    ) -> Result<(), SchemaError> {
        let inner = field.resolver.clone();
        field.resolver = FieldResolver::new(move |ctx| {
            let output = inner.call(ctx);
            FieldFuture::new(async move {
                let value = settle_field_future(output).await?;
                Ok(value
                    .and_then(|value| value.as_value().cloned())
                    .map(|value| match value {
                        Value::String(s) => Value::String(s.to_uppercase()),
                        other => other,
                    }))
            })
        });
        Ok(())
    }
}

/// Sets the description of an object, prefixed with the caller context.
struct Describe;

struct Prefix(&'static str);

impl SchemaDirectiveVisitor for Describe {
    fn visit_object(
        &self,
        object: &mut ObjectType,
        args: &DirectiveArgs,
        ctx: &DirectiveContext<'_>,
    ) -> Result<(), SchemaError> {
        let prefix = ctx.context::<Prefix>().map(|p| p.0).unwrap_or("");
        let text = args.get_str("text").unwrap_or("undocumented");
        object.description = Some(format!("{prefix}{text}"));
        Ok(())
    }
}

/// Records every visit as `directive:host`.
struct Recorder(Arc<Mutex<Vec<String>>>);

impl SchemaDirectiveVisitor for Recorder {
    fn visit_field_definition(
        &self,
        _field: &mut FieldDefinition,
        _args: &DirectiveArgs,
        ctx: &DirectiveContext<'_>,
    ) -> Result<(), SchemaError> {
        self.0
            .lock()
            .unwrap()
            .push(format!("{}:{}", ctx.directive(), ctx.host()));
        Ok(())
    }

    fn visit_schema(
        &self,
        schema: &SchemaRoots,
        _args: &DirectiveArgs,
        ctx: &DirectiveContext<'_>,
    ) -> Result<(), SchemaError> {
        // Every declared type is complete by the time schema directives run.
        let handle = ctx.type_handle("User")?;
        assert!(!handle.is_deferred());

        let registered = ctx.type_handle(&schema.query.name)?.force();
        assert!(matches!(
            registered,
            Some(NamedType::Object(ref query)) if Arc::ptr_eq(query, &schema.query)
        ));

        self.0
            .lock()
            .unwrap()
            .push(format!("{}:{}", ctx.directive(), ctx.host()));
        Ok(())
    }
}

/// Fails every object it is applied to.
struct Reject;

impl SchemaDirectiveVisitor for Reject {
    fn visit_object(
        &self,
        object: &mut ObjectType,
        _args: &DirectiveArgs,
        ctx: &DirectiveContext<'_>,
    ) -> Result<(), SchemaError> {
        Err(SchemaError::directive_failed(
            ctx.directive(),
            format!("`{}` is not allowed", object.name),
        ))
    }
}

fn hello_resolvers() -> Resolvers {
    Resolvers::builder()
        .field("Query.hello", |_| {
            FieldFuture::new(async { Ok(Some(Value::String("world".into()))) })
        })
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_field_directive_wraps_resolver() {
    let schema = SchemaAssembler::new(
        r#"
        directive @upper on FIELD_DEFINITION
        type Query { hello: String @upper }
        "#,
    )
    .resolvers(hello_resolvers())
    .directives(SchemaDirectives::new().with("upper", Upper))
    .build()
    .unwrap();

    let response = schema.execute("{ hello }").await;
    assert!(response.errors.is_empty(), "{:?}", response.errors);
    assert_eq!(response.data.into_json().unwrap(), json!({ "hello": "WORLD" }));
    assert!(schema.get_directive("upper").is_some());
}

#[tokio::test]
async fn test_directive_implementation_from_bindings() {
    let resolvers = Resolvers::builder()
        .field("Query.hello", |_| {
            FieldFuture::new(async { Ok(Some(Value::String("world".into()))) })
        })
        .directive("upper", Upper)
        .build()
        .unwrap();

    let schema = SchemaAssembler::new("type Query { hello: String @upper }")
        .resolvers(resolvers)
        .build()
        .unwrap();

    let response = schema.execute("{ hello }").await;
    assert_eq!(response.data.into_json().unwrap(), json!({ "hello": "WORLD" }));
}

#[test]
fn test_unknown_directive() {
    let err = SchemaAssembler::new("type Query { hello: String @nope }")
        .build()
        .unwrap_err();

    match err {
        SchemaError::UnknownDirective { name, host, .. } => {
            assert_eq!(name, "nope");
            assert_eq!(host, "Query.hello");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_misplaced_directive() {
    let err = SchemaAssembler::new(
        r#"
        directive @upper on FIELD_DEFINITION
        type Query @upper { hello: String }
        "#,
    )
    .directives(SchemaDirectives::new().with("upper", Upper))
    .build()
    .unwrap_err();

    assert_eq!(err.error_code(), "MISPLACED_DIRECTIVE");
}

#[test]
fn test_object_directive_sees_context_and_defaults() {
    let schema = SchemaAssembler::new(
        r#"
        directive @describe(text: String = "documented") on OBJECT
        type Query @describe { user: User }
        type User @describe(text: "a person") { name: String }
        "#,
    )
    .directives(SchemaDirectives::new().with("describe", Describe))
    .context(Prefix("> "))
    .build()
    .unwrap();

    assert_eq!(schema.query().description.as_deref(), Some("> documented"));
    let user = schema.get_type("User").and_then(|ty| ty.as_object()).unwrap();
    assert_eq!(user.description.as_deref(), Some("> a person"));
}

#[test]
fn test_directives_run_in_written_order() {
    let log = Arc::new(Mutex::new(Vec::new()));

    SchemaAssembler::new(
        r#"
        schema @audit { query: Query }
        type Query { a: String @first @second b: String @second }
        type User { name: String }
        "#,
    )
    .directives(
        SchemaDirectives::new()
            .with("first", Recorder(log.clone()))
            .with("second", Recorder(log.clone()))
            .with("audit", Recorder(log.clone())),
    )
    .build()
    .unwrap();

    let log = log.lock().unwrap();
    assert_eq!(
        *log,
        vec![
            "first:Query.a",
            "second:Query.a",
            "second:Query.b",
            "audit:schema",
        ]
    );
}

#[test]
fn test_self_referencing_root_resolves_to_registered_root() {
    let log = Arc::new(Mutex::new(Vec::new()));

    let schema = SchemaAssembler::new(
        r#"
        schema @audit { query: Query }
        type Query { me: Query user: User }
        type User { name: String }
        "#,
    )
    .directives(SchemaDirectives::new().with("audit", Recorder(log.clone())))
    .build()
    .unwrap();

    assert_eq!(*log.lock().unwrap(), vec!["audit:schema"]);

    let registered = schema.get_type("Query").and_then(|ty| ty.as_object()).unwrap();
    assert!(Arc::ptr_eq(registered, schema.query()));

    let me = schema.query().fields["me"].ty.handle();
    assert!(me.is_deferred());
    let forced = me.force().unwrap();
    assert!(forced.ptr_eq(&NamedType::Object(schema.query().clone())));
}

#[test]
fn test_directive_failure_aborts_assembly() {
    let err = SchemaAssembler::new("type Query @reject { a: String }")
        .directives(SchemaDirectives::new().with("reject", Reject))
        .build()
        .unwrap_err();

    assert_eq!(err.error_code(), "DIRECTIVE_FAILED");
    assert!(err.to_string().contains("`Query` is not allowed"));
}

#[test]
fn test_builtin_directives() {
    let schema = SchemaAssembler::new(
        r#"
        type Query {
            old: String @deprecated
            older: String @deprecated(reason: "use `new`")
            new: String
        }
        scalar Url @specifiedBy(url: "https://url.spec.whatwg.org/")
        input Filter @oneOf { id: ID name: String }
        "#,
    )
    .resolvers(
        Resolvers::builder()
            .scalar(
                "Url",
                octofhir_graphql_tools::ScalarBinding::new(|v| v.clone(), |v| Ok(v.clone())),
            )
            .build()
            .unwrap(),
    )
    .build()
    .unwrap();

    let fields = &schema.query().fields;
    assert_eq!(
        fields["old"].deprecation.reason(),
        Some(octofhir_graphql_tools::schema::DEFAULT_DEPRECATION_REASON)
    );
    assert_eq!(fields["older"].deprecation.reason(), Some("use `new`"));
    assert_eq!(fields["new"].deprecation, Deprecation::Active);

    let url = schema.get_type("Url").and_then(|ty| ty.as_scalar()).unwrap();
    assert_eq!(
        url.specified_by_url.as_deref(),
        Some("https://url.spec.whatwg.org/")
    );

    let filter = schema
        .get_type("Filter")
        .and_then(|ty| ty.as_input_object())
        .unwrap();
    assert!(filter.one_of);

    assert!(schema.sdl().contains("@deprecated"));
}
