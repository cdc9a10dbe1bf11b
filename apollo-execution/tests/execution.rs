use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use apollo_compiler::Schema;
use apollo_compiler::validation::Valid;
use apollo_execution::Configuration;
use apollo_execution::ExecutionError;
use apollo_execution::Executor;
use apollo_execution::FieldError;
use apollo_execution::Limits;
use apollo_execution::ParseAndValidateResult;
use apollo_execution::Request;
use apollo_execution::ResolverContext;
use apollo_execution::ResultPath;
use apollo_execution::Resolvers;
use apollo_execution::graphql::ErrorClassification;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use serde_json_bytes::Value;
use serde_json_bytes::json;

const SDL: &str = r#"
    type Query {
        a: A
        d: Int
        required: A!
        list: [Int]
        pets: [Pet]
        greeting(name: String = "world"): String
        first: Int
        second: Int
    }
    type Mutation { first: Int second: Int }
    type A { b: Int c: String d: Int e: Int f: Int strict: Int! }
    interface Pet { name: String }
    type Dog implements Pet { name: String barks: Boolean }
    type Cat implements Pet { name: String }
"#;

fn schema() -> Arc<Valid<Schema>> {
    Arc::new(Schema::parse_and_validate(SDL, "schema.graphql").unwrap())
}

fn executor(resolvers: Resolvers) -> Executor {
    Executor::builder()
        .schema(schema())
        .resolvers(resolvers)
        .build()
}

fn path(path: &str) -> Option<ResultPath> {
    Some(ResultPath::parse(path).unwrap())
}

#[tokio::test]
async fn default_resolvers_read_the_root_value() {
    let response = executor(Resolvers::new())
        .execute(
            Request::builder()
                .query("{ a { b c } }")
                .root_value(json!({ "a": { "b": 1, "c": "x", "d": 2 } }))
                .build(),
        )
        .await;
    assert_eq!(response.data, json!({ "a": { "b": 1, "c": "x" } }));
    assert!(response.errors.is_empty());
}

#[tokio::test]
async fn resolvers_receive_coerced_arguments() {
    let resolvers = Resolvers::new().field("Query", "greeting", |context: ResolverContext| async move {
        let name = context.argument("name").cloned().unwrap_or_default();
        Ok::<_, FieldError>(json!(format!("hello {}", name.as_str().unwrap_or_default())))
    });
    let executor = executor(resolvers);

    let response = executor
        .execute(Request::builder().query("{ greeting }").build())
        .await;
    assert_eq!(response.data, json!({ "greeting": "hello world" }));

    let response = executor
        .execute(
            Request::builder()
                .query("query($name: String) { hi: greeting(name: $name) }")
                .variable("name", "there")
                .build(),
        )
        .await;
    assert_eq!(response.data, json!({ "hi": "hello there" }));
}

#[tokio::test]
async fn a_failing_non_null_root_field_nulls_the_data() {
    let resolvers = Resolvers::new().field("Query", "required", |_: ResolverContext| async {
        Err::<Value, _>(FieldError::new("boom"))
    });
    let response = executor(resolvers)
        .execute(Request::builder().query("{ d required { b } }").build())
        .await;

    assert_eq!(response.data, Value::Null);
    assert_eq!(response.errors.len(), 1, "{:?}", response.errors);
    let error = &response.errors[0];
    assert_eq!(error.message, "boom");
    assert_eq!(error.path, path("/required"));
    assert_eq!(
        error.classification(),
        Some(ErrorClassification::DataFetchingException)
    );
    assert_eq!(error.locations.len(), 1);
}

#[tokio::test]
async fn a_null_non_null_field_nulls_its_nullable_parent() {
    let response = executor(Resolvers::new())
        .execute(
            Request::builder()
                .query("{ a { b strict } d }")
                .root_value(json!({ "a": { "b": 1 }, "d": 4 }))
                .build(),
        )
        .await;

    assert_eq!(response.data, json!({ "a": null, "d": 4 }));
    assert_eq!(response.errors.len(), 1);
    assert_eq!(response.errors[0].path, path("/a/strict"));
    assert_eq!(
        response.errors[0].classification(),
        Some(ErrorClassification::NullValueInNonNullableField)
    );
}

#[tokio::test]
async fn values_that_do_not_fit_their_type_are_field_errors() {
    let response = executor(Resolvers::new())
        .execute(
            Request::builder()
                .query("{ list d }")
                .root_value(json!({ "list": "nope", "d": "four" }))
                .build(),
        )
        .await;

    assert_eq!(response.data, json!({ "list": null, "d": null }));
    assert_eq!(response.errors.len(), 2);
    assert!(
        response.errors[0].message.contains("Expected an array"),
        "{}",
        response.errors[0].message
    );
    assert_eq!(response.errors[0].path, path("/list"));
    assert_eq!(response.errors[1].path, path("/d"));
}

#[tokio::test]
async fn abstract_types_resolve_to_their_object_type() {
    let response = executor(Resolvers::new())
        .execute(
            Request::builder()
                .query("{ pets { name ... on Dog { barks } __typename } }")
                .root_value(json!({
                    "pets": [
                        { "__typename": "Dog", "name": "Rex", "barks": true },
                        { "__typename": "Cat", "name": "Tom", "barks": false },
                    ]
                }))
                .build(),
        )
        .await;

    assert_eq!(
        response.data,
        json!({
            "pets": [
                { "name": "Rex", "barks": true, "__typename": "Dog" },
                { "name": "Tom", "__typename": "Cat" },
            ]
        })
    );
}

#[tokio::test]
async fn unresolvable_abstract_types_are_field_errors() {
    let response = executor(Resolvers::new())
        .execute(
            Request::builder()
                .query("{ pets { name } }")
                .root_value(json!({ "pets": [{ "name": "Rex" }] }))
                .build(),
        )
        .await;

    assert_eq!(response.data, json!({ "pets": [null] }));
    assert_eq!(response.errors[0].path, path("/pets[0]"));
}

fn recording(
    events: &Arc<Mutex<Vec<String>>>,
    name: &'static str,
) -> impl Fn(ResolverContext) -> BoxFuture<'static, Result<Value, FieldError>> + Send + Sync + 'static
{
    let events = events.clone();
    move |_| {
        let events = events.clone();
        Box::pin(async move {
            events.lock().push(format!("{name} started"));
            tokio::task::yield_now().await;
            tokio::task::yield_now().await;
            events.lock().push(format!("{name} finished"));
            Ok(json!(1))
        })
    }
}

#[tokio::test]
async fn mutation_fields_run_one_after_the_other() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let resolvers = Resolvers::new()
        .field("Mutation", "first", recording(&events, "first"))
        .field("Mutation", "second", recording(&events, "second"));
    let response = executor(resolvers)
        .execute(Request::builder().query("mutation { first second }").build())
        .await;

    assert_eq!(response.data, json!({ "first": 1, "second": 1 }));
    assert_eq!(
        *events.lock(),
        vec![
            "first started",
            "first finished",
            "second started",
            "second finished"
        ]
    );
}

#[tokio::test]
async fn query_fields_run_concurrently() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let resolvers = Resolvers::new()
        .field("Query", "first", recording(&events, "first"))
        .field("Query", "second", recording(&events, "second"));
    let response = executor(resolvers)
        .execute(Request::builder().query("{ first second }").build())
        .await;

    assert_eq!(response.data, json!({ "first": 1, "second": 1 }));
    assert_eq!(
        events.lock()[..2],
        ["first started".to_string(), "second started".to_string()]
    );
}

#[tokio::test]
async fn complexity_above_the_ceiling_aborts_before_any_fetch() {
    let fetches = Arc::new(AtomicUsize::new(0));
    let counted = fetches.clone();
    let resolvers = Resolvers::new().field("Query", "a", move |_: ResolverContext| {
        counted.fetch_add(1, Ordering::SeqCst);
        async { Ok::<_, FieldError>(json!({ "b": 1, "c": "x", "d": 2, "e": 3, "f": 4 })) }
    });
    let executor = Executor::builder()
        .schema(schema())
        .resolvers(resolvers)
        .configuration(
            Configuration::builder()
                .limits(Limits {
                    max_complexity: Some(5),
                    warn_only: false,
                })
                .build(),
        )
        .build();

    let response = executor
        .execute(Request::builder().query("{ a { b c } d }").build())
        .await;
    assert!(response.errors.is_empty(), "{:?}", response.errors);
    assert_eq!(fetches.load(Ordering::SeqCst), 1);

    let response = executor
        .execute(Request::builder().query("{ a { b c d e f } }").build())
        .await;
    assert_eq!(response.data, Value::Null);
    assert_eq!(
        response.errors,
        ExecutionError::MaxQueryComplexityExceeded {
            complexity: 6,
            max: 5
        }
        .to_graphql_errors()
    );
    assert_eq!(
        response.errors[0].message,
        "maximum query complexity exceeded 6 > 5"
    );
    assert_eq!(
        response.errors[0].classification(),
        Some(ErrorClassification::ExecutionAborted)
    );
    assert_eq!(fetches.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn warn_only_limits_let_the_operation_run() {
    let executor = Executor::builder()
        .schema(schema())
        .configuration(
            Configuration::builder()
                .limits(Limits {
                    max_complexity: Some(1),
                    warn_only: true,
                })
                .build(),
        )
        .build();
    let response = executor
        .execute(
            Request::builder()
                .query("{ a { b } }")
                .root_value(json!({ "a": { "b": 1 } }))
                .build(),
        )
        .await;
    assert_eq!(response.data, json!({ "a": { "b": 1 } }));
    assert!(response.errors.is_empty());
}

#[tokio::test]
async fn requests_that_cannot_run_are_classified() {
    let executor = executor(Resolvers::new());

    let response = executor
        .execute(Request::builder().query("{ a { b ").build())
        .await;
    assert_eq!(response.data, Value::Null);
    assert!(!response.errors.is_empty());
    assert_eq!(
        response.errors[0].classification(),
        Some(ErrorClassification::InvalidSyntax)
    );

    let response = executor
        .execute(Request::builder().query("{ unknown }").build())
        .await;
    assert_eq!(
        response.errors[0].classification(),
        Some(ErrorClassification::ValidationError)
    );

    let response = executor
        .execute(
            Request::builder()
                .query("query A { d } query B { d }")
                .operation_name("C")
                .build(),
        )
        .await;
    assert_eq!(
        response.errors,
        ExecutionError::UnknownOperation("C".to_string()).to_graphql_errors()
    );

    let response = executor
        .execute(Request::builder().query("query A { d } query B { d }").build())
        .await;
    assert_eq!(
        response.errors,
        ExecutionError::OperationNameRequired.to_graphql_errors()
    );
}

#[test]
fn documents_can_be_checked_without_executing() {
    let executor = executor(Resolvers::new());

    let valid = executor.parse_and_validate("{ a { b } }");
    assert!(!valid.is_failure());
    assert!(valid.errors().is_empty());
    assert!(valid.document().is_some());

    let invalid = executor.parse_and_validate("{ a { nope } }");
    assert!(matches!(invalid, ParseAndValidateResult::ValidationFailed(_)));
    assert!(invalid.is_failure());
    assert!(!invalid.errors().is_empty());

    let unparsable = executor.parse_and_validate("{");
    assert!(matches!(unparsable, ParseAndValidateResult::InvalidSyntax(_)));
}
