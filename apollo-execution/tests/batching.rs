use std::sync::Arc;
use std::time::Duration;

use apollo_compiler::Schema;
use apollo_execution::Batching;
use apollo_execution::Configuration;
use apollo_execution::Executor;
use apollo_execution::FieldError;
use apollo_execution::Request;
use apollo_execution::ResolverContext;
use apollo_execution::Resolvers;
use apollo_execution::Response;
use apollo_execution::dataloader::BatchLoader;
use apollo_execution::dataloader::DataLoader;
use apollo_execution::dataloader::DataLoaderRegistry;
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use serde_json_bytes::Value;
use serde_json_bytes::json;

const SDL: &str = r#"
    type Query { users: [User] teams: [[User]] pets: [Pet] }
    type Mutation { createUser(id: ID!): User }
    type User { id: ID name: String friends: [User] mentor: User }
    interface Pet { id: ID }
    type Dog implements Pet { id: ID name: String }
    type Cat implements Pet { id: ID lives: Int }
"#;

#[derive(Clone, Default)]
struct NameLoader {
    batches: Arc<Mutex<Vec<Vec<String>>>>,
}

#[async_trait::async_trait]
impl BatchLoader for NameLoader {
    type Key = String;
    type Value = Value;

    async fn load(&self, keys: Vec<String>) -> Result<Vec<Value>, FieldError> {
        self.batches.lock().push(keys.clone());
        Ok(keys
            .into_iter()
            .map(|id| json!(format!("name {id}")))
            .collect())
    }
}

struct Fixture {
    executor: Executor,
    registry: DataLoaderRegistry,
    batches: Arc<Mutex<Vec<Vec<String>>>>,
}

fn fixture(batching: bool) -> Fixture {
    let names = NameLoader::default();
    let batches = names.batches.clone();
    let loader = DataLoader::new(names);
    let registry = DataLoaderRegistry::new();
    registry.register(loader.clone());

    let resolvers = Resolvers::new()
        .field("Query", "users", |_: ResolverContext| async {
            Ok::<_, FieldError>(json!([{ "id": "1" }, { "id": "2" }, { "id": "3" }]))
        })
        .field("Mutation", "createUser", |context: ResolverContext| async move {
            let id = context.argument("id").cloned().unwrap_or_default();
            Ok::<_, FieldError>(json!({ "id": id }))
        })
        .field("Query", "teams", |_: ResolverContext| async {
            Ok::<_, FieldError>(json!([[{ "id": "1" }, { "id": "2" }], [], [{ "id": "3" }]]))
        })
        .field("Query", "pets", |_: ResolverContext| async {
            Ok::<_, FieldError>(json!([
                { "__typename": "Dog", "id": "rex" },
                { "__typename": "Cat", "id": "tom" },
            ]))
        })
        .field("User", "friends", |context: ResolverContext| async move {
            let friends = match source_id(&context).as_str() {
                "1" => json!([{ "id": "4" }]),
                "2" => json!([{ "id": "5" }, null, { "id": "6" }]),
                _ => json!([]),
            };
            Ok::<_, FieldError>(friends)
        })
        .field("User", "mentor", |context: ResolverContext| async move {
            let mentor = match source_id(&context).as_str() {
                "1" => json!({ "id": "9" }),
                "3" => json!({ "id": "8" }),
                _ => Value::Null,
            };
            Ok::<_, FieldError>(mentor)
        })
        .field("User", "name", {
            let loader = loader.clone();
            move |context: ResolverContext| loader.load(source_id(&context))
        })
        .field("Dog", "name", move |context: ResolverContext| {
            loader.load(source_id(&context))
        });

    let executor = Executor::builder()
        .schema(Arc::new(
            Schema::parse_and_validate(SDL, "schema.graphql").unwrap(),
        ))
        .resolvers(resolvers)
        .data_loader_registry(registry.clone())
        .configuration(
            Configuration::builder()
                .batching(Batching { enabled: batching })
                .build(),
        )
        .build();

    Fixture {
        executor,
        registry,
        batches,
    }
}

fn source_id(context: &ResolverContext) -> String {
    context
        .source
        .as_object()
        .and_then(|source| source.get("id"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Executes `request`, failing the test if a level is never dispatched.
async fn execute(fixture: &Fixture, request: Request) -> Response {
    tokio::time::timeout(Duration::from_secs(5), fixture.executor.execute(request))
        .await
        .expect("a data loader level was never dispatched")
}

#[tokio::test]
async fn loads_of_one_level_are_batched_together() {
    let fixture = fixture(true);
    let response = fixture
        .executor
        .execute(Request::builder().query("{ users { id name } }").build())
        .await;

    assert!(response.errors.is_empty(), "{:?}", response.errors);
    assert_eq!(
        response.data,
        json!({
            "users": [
                { "id": "1", "name": "name 1" },
                { "id": "2", "name": "name 2" },
                { "id": "3", "name": "name 3" },
            ]
        })
    );
    assert_eq!(*fixture.batches.lock(), vec![vec!["1", "2", "3"]]);
    // once for the users, once for their fields
    assert_eq!(fixture.registry.dispatch_count(), 2);
}

#[tokio::test]
async fn without_batching_every_fetch_dispatches() {
    let fixture = fixture(false);
    let response = fixture
        .executor
        .execute(Request::builder().query("{ users { name } }").build())
        .await;

    assert!(response.errors.is_empty(), "{:?}", response.errors);
    assert_eq!(
        response.data,
        json!({ "users": [{ "name": "name 1" }, { "name": "name 2" }, { "name": "name 3" }] })
    );
    let batches = fixture.batches.lock();
    assert_eq!(batches.len(), 3);
    assert!(batches.iter().all(|batch| batch.len() == 1));
}

#[tokio::test]
async fn mutations_dispatch_after_every_fetch() {
    let fixture = fixture(true);
    let response = fixture
        .executor
        .execute(
            Request::builder()
                .query(
                    r#"mutation {
                        first: createUser(id: "7") { name }
                        second: createUser(id: "8") { name }
                    }"#,
                )
                .build(),
        )
        .await;

    assert!(response.errors.is_empty(), "{:?}", response.errors);
    assert_eq!(
        response.data,
        json!({ "first": { "name": "name 7" }, "second": { "name": "name 8" } })
    );
    assert_eq!(*fixture.batches.lock(), vec![vec!["7"], vec!["8"]]);
}

#[tokio::test]
async fn every_execution_tracks_its_own_levels() {
    let fixture = fixture(true);
    for _ in 0..2 {
        let response = fixture
            .executor
            .execute(Request::builder().query("{ users { name } }").build())
            .await;
        assert!(response.errors.is_empty(), "{:?}", response.errors);
    }
    assert_eq!(fixture.batches.lock().len(), 2);
    assert_eq!(fixture.registry.dispatch_count(), 4);
}

#[tokio::test]
async fn each_level_is_one_batch_across_parents() {
    let fixture = fixture(true);
    let response = execute(
        &fixture,
        Request::builder()
            .query("{ users { name friends { name } } }")
            .build(),
    )
    .await;

    assert!(response.errors.is_empty(), "{:?}", response.errors);
    assert_eq!(
        response.data,
        json!({
            "users": [
                { "name": "name 1", "friends": [{ "name": "name 4" }] },
                {
                    "name": "name 2",
                    "friends": [{ "name": "name 5" }, null, { "name": "name 6" }]
                },
                { "name": "name 3", "friends": [] },
            ]
        })
    );
    // the friends batch waits for the batch of the level above
    assert_eq!(
        *fixture.batches.lock(),
        vec![vec!["1", "2", "3"], vec!["4", "5", "6"]]
    );
    assert_eq!(fixture.registry.dispatch_count(), 3);
}

#[tokio::test]
async fn null_and_leaf_siblings_do_not_hold_a_level_back() {
    let fixture = fixture(true);
    let response = execute(
        &fixture,
        Request::builder()
            .query("{ users { id mentor { name } } }")
            .build(),
    )
    .await;

    assert!(response.errors.is_empty(), "{:?}", response.errors);
    assert_eq!(
        response.data,
        json!({
            "users": [
                { "id": "1", "mentor": { "name": "name 9" } },
                { "id": "2", "mentor": null },
                { "id": "3", "mentor": { "name": "name 8" } },
            ]
        })
    );
    assert_eq!(*fixture.batches.lock(), vec![vec!["9", "8"]]);
}

#[tokio::test]
async fn nested_lists_are_one_level() {
    let fixture = fixture(true);
    let response = execute(
        &fixture,
        Request::builder().query("{ teams { name } }").build(),
    )
    .await;

    assert!(response.errors.is_empty(), "{:?}", response.errors);
    assert_eq!(
        response.data,
        json!({
            "teams": [[{ "name": "name 1" }, { "name": "name 2" }], [], [{ "name": "name 3" }]]
        })
    );
    assert_eq!(*fixture.batches.lock(), vec![vec!["1", "2", "3"]]);
}

#[tokio::test]
async fn an_object_outside_every_fragment_still_completes_its_level() {
    let fixture = fixture(true);
    let response = execute(
        &fixture,
        Request::builder()
            .query("{ pets { ... on Dog { name } } }")
            .build(),
    )
    .await;

    assert!(response.errors.is_empty(), "{:?}", response.errors);
    assert_eq!(response.data, json!({ "pets": [{ "name": "name rex" }, {}] }));
    assert_eq!(*fixture.batches.lock(), vec![vec!["rex"]]);
    assert_eq!(fixture.registry.dispatch_count(), 2);
}

#[tokio::test]
async fn an_object_with_every_field_skipped_still_completes_its_level() {
    let fixture = fixture(true);
    let response = execute(
        &fixture,
        Request::builder()
            .query(
                r#"query ($hide: Boolean!) {
                    users { name }
                    hidden: users { name @skip(if: $hide) }
                }"#,
            )
            .variable("hide", true)
            .build(),
    )
    .await;

    assert!(response.errors.is_empty(), "{:?}", response.errors);
    assert_eq!(
        response.data,
        json!({
            "users": [{ "name": "name 1" }, { "name": "name 2" }, { "name": "name 3" }],
            "hidden": [{}, {}, {}],
        })
    );
    assert_eq!(*fixture.batches.lock(), vec![vec!["1", "2", "3"]]);
}
