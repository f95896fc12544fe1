mod common;

use common::{Call, Fixture, Tag, User, fixture, fixture_with};
use tamarind::{
    ConnectionOptions, Connections, Error, Fields, Finder, SequenceStrategy,
    UpdateOptions, Value,
    mongodb::bson::doc,
};

#[tokio::test]
async fn find_and_modify_takes_one_round_trip_per_id() {
    let Fixture { store, connection } = fixture();

    User::create(&connection, [("name", "Martyn")]).await.unwrap();

    let calls = store.calls_to("counters");
    assert_eq!(
        calls,
        [Call::FindOneAndUpdate {
            collection: "counters".to_owned(),
            filter: doc! {},
            update: doc! { "$inc": { "users": 1_i64 } },
        }]
    );
}

#[tokio::test]
async fn upsert_then_read_updates_and_reads_back() {
    let Fixture { store, connection } = fixture_with(
        ConnectionOptions::new().sequence_strategy(SequenceStrategy::UpsertThenRead),
    );

    let user = User::create(&connection, [("name", "Martyn")]).await.unwrap();
    assert_eq!(user.raw("id"), Some(&Value::from(1_i64)));

    let calls = store.calls_to("counters");
    let [
        Call::Update {
            filter: selector,
            update,
            options,
            ..
        },
        Call::FindOne { filter, .. },
    ] = calls.as_slice()
    else {
        panic!("expected an upsert and a read, got {calls:?}");
    };

    assert_eq!(selector, &doc! { "users": { "$exists": true } });
    assert_eq!(update, &doc! { "$inc": { "users": 1_i64 } });
    assert_eq!(options, &UpdateOptions::upsert());
    assert_eq!(filter, selector);
}

#[tokio::test]
async fn counters_collection_is_configurable() {
    let Fixture { store, connection } =
        fixture_with(ConnectionOptions::new().counters_collection("sequences"));

    User::create(&connection, [("name", "Martyn")]).await.unwrap();

    assert!(store.calls_to("counters").is_empty());
    assert_eq!(store.calls_to("sequences").len(), 1);

    let counters = store.inner().documents("sequences");
    assert_eq!(counters.len(), 1);
    assert_eq!(counters[0].get_i64("users").unwrap(), 1);
}

#[tokio::test]
async fn each_collection_counts_on_its_own() {
    let Fixture { connection, .. } = fixture();

    let mut ids = vec![];

    for name in ["a", "b", "c"] {
        let user = User::create(&connection, [("name", name)]).await.unwrap();
        ids.push(user.raw("id").cloned().unwrap());
    }

    let tag = Tag::create(&connection, [("name", "rust")]).await.unwrap();

    assert_eq!(ids, [Value::from(1_i64), Value::from(2_i64), Value::from(3_i64)]);
    assert_eq!(tag.raw("id"), Some(&Value::from(1_i64)));
}

#[tokio::test]
async fn explicit_id_is_kept() {
    let Fixture { store, connection } = fixture();

    let mut values = doc! { "id": 42, "name": "Martyn" };
    connection.insert("users", &mut values).await.unwrap();

    assert_eq!(values.get_i32("id").unwrap(), 42);
    assert!(values.get_object_id("_id").is_ok());
    assert!(store.calls_to("counters").is_empty());
}

#[tokio::test]
async fn multi_update_reaches_every_match() {
    let Fixture { store, connection } = fixture();

    for name in ["a", "a", "b"] {
        User::create(&connection, [("name", name)]).await.unwrap();
    }
    store.clear_calls();

    let matched = connection
        .update(
            "users",
            doc! { "name": "a" },
            doc! { "$set": { "email": "a@example.com" } },
            UpdateOptions::multi(),
        )
        .await
        .unwrap();

    assert_eq!(matched, 2);
    assert!(matches!(
        store.calls().as_slice(),
        [Call::Update { options, .. }] if options.multi
    ));
    assert_eq!(
        User::count(&connection, [("email", "a@example.com")])
            .await
            .unwrap(),
        2
    );
}

#[tokio::test]
async fn registry_hands_out_named_connections() {
    let connections = Connections::new();

    assert!(matches!(
        connections.default_connection(),
        Err(Error::ConnectionNotInitialized { name }) if name == Connections::DEFAULT
    ));

    let Fixture { connection, .. } = fixture();
    connections.insert(Connections::DEFAULT, connection.into());

    let connection = connections.default_connection().unwrap();
    User::create(&connection, [("name", "Martyn")]).await.unwrap();

    let again = connections.get(Connections::DEFAULT).unwrap();
    assert_eq!(User::count(&again, Fields::new()).await.unwrap(), 1);

    assert!(connections.reset(Connections::DEFAULT).is_some());
    assert!(connections.get(Connections::DEFAULT).is_err());
}

#[test]
fn connection_exposes_its_options() {
    let Fixture { connection, .. } = fixture_with(ConnectionOptions::new().db("blog"));

    assert_eq!(connection.options().db.as_deref(), Some("blog"));
    assert!(format!("{connection:?}").contains("Connection"));
}
