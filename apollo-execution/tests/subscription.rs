use std::sync::Arc;

use apollo_compiler::Schema;
use apollo_execution::ExecutionError;
use apollo_execution::Executor;
use apollo_execution::FieldError;
use apollo_execution::Request;
use apollo_execution::ResolverContext;
use apollo_execution::ResultPath;
use apollo_execution::Resolvers;
use apollo_execution::resolver::EventStream;
use futures::StreamExt;
use futures::stream;
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use serde_json_bytes::Value;
use serde_json_bytes::json;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

const SDL: &str = r#"
    type Query { a: Int }
    type Subscription { counter: Counter }
    type Counter { value: Int label: String }
"#;

const SUBSCRIPTION: &str = "subscription { counter { value } }";

fn executor(resolvers: Resolvers) -> Executor {
    Executor::builder()
        .schema(Arc::new(
            Schema::parse_and_validate(SDL, "schema.graphql").unwrap(),
        ))
        .resolvers(resolvers)
        .build()
}

fn from_events(events: Vec<Result<Value, FieldError>>) -> Resolvers {
    Resolvers::new().subscription("Subscription", "counter", move |_: ResolverContext| {
        let events = events.clone();
        async move { Ok::<EventStream, FieldError>(stream::iter(events).boxed()) }
    })
}

#[tokio::test]
async fn every_event_becomes_a_response() {
    let executor = executor(from_events(vec![
        Ok(json!({ "value": 1, "label": "one" })),
        Ok(json!({ "value": 2, "label": "two" })),
    ]));
    let responses: Vec<_> = executor
        .subscribe(Request::builder().query(SUBSCRIPTION).build())
        .await
        .collect()
        .await;

    assert_eq!(responses.len(), 2);
    assert_eq!(responses[0].data, json!({ "counter": { "value": 1 } }));
    assert_eq!(responses[1].data, json!({ "counter": { "value": 2 } }));
    assert!(responses.iter().all(|response| response.errors.is_empty()));
}

#[tokio::test]
async fn failed_events_are_field_errors() {
    let executor = executor(from_events(vec![
        Err(FieldError::new("tick failed")),
        Ok(json!({ "value": 3 })),
    ]));
    let mut responses = executor
        .subscribe(Request::builder().query(SUBSCRIPTION).build())
        .await;

    let failed = responses.next().await.unwrap();
    assert_eq!(failed.data, json!({ "counter": null }));
    assert_eq!(failed.errors.len(), 1);
    assert_eq!(failed.errors[0].message, "tick failed");
    assert_eq!(
        failed.errors[0].path,
        Some(ResultPath::parse("/counter").unwrap())
    );

    let next = responses.next().await.unwrap();
    assert_eq!(next.data, json!({ "counter": { "value": 3 } }));
    assert!(responses.next().await.is_none());
}

#[tokio::test]
async fn dropping_the_responses_unsubscribes() {
    let (sender, receiver) = mpsc::channel(4);
    let receiver = Arc::new(Mutex::new(Some(receiver)));
    let resolvers =
        Resolvers::new().subscription("Subscription", "counter", move |_: ResolverContext| {
            let receiver = receiver.lock().take();
            async move {
                match receiver {
                    Some(receiver) => {
                        Ok::<EventStream, FieldError>(ReceiverStream::new(receiver).boxed())
                    }
                    None => Err(FieldError::new("already subscribed")),
                }
            }
        });
    let executor = executor(resolvers);

    let mut responses = executor
        .subscribe(Request::builder().query(SUBSCRIPTION).build())
        .await;
    sender.send(Ok(json!({ "value": 1 }))).await.unwrap();
    let first = responses.next().await.unwrap();
    assert_eq!(first.data, json!({ "counter": { "value": 1 } }));
    assert!(!sender.is_closed());

    drop(responses);
    assert!(sender.is_closed());
}

#[tokio::test]
async fn a_missing_source_stream_is_a_single_error() {
    let responses: Vec<_> = executor(Resolvers::new())
        .subscribe(Request::builder().query(SUBSCRIPTION).build())
        .await
        .collect()
        .await;

    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].data, Value::Null);
    assert_eq!(responses[0].errors.len(), 1);
    assert_eq!(
        responses[0].errors[0].message,
        "no subscription resolver for Subscription.counter"
    );
}

#[tokio::test]
async fn entry_points_only_accept_their_operations() {
    let executor = executor(from_events(vec![Ok(json!({ "value": 1 }))]));

    let response = executor
        .execute(Request::builder().query(SUBSCRIPTION).build())
        .await;
    assert_eq!(response.data, Value::Null);
    assert_eq!(
        response.errors,
        ExecutionError::OperationNotSupported {
            operation_type: "subscription".to_string(),
            entry_point: "execute",
        }
        .to_graphql_errors()
    );

    let responses: Vec<_> = executor
        .subscribe(Request::builder().query("{ a }").build())
        .await
        .collect()
        .await;
    assert_eq!(responses.len(), 1);
    assert_eq!(
        responses[0].errors[0].message,
        "query operations are not supported by subscribe"
    );
}
