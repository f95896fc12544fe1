use crate::{
    ConnectionOptions, DeleteOptions, Error, FindOptions, Model, Result, SequenceStrategy,
    UpdateOptions,
    store::{MongoStore, Store},
};
use dashmap::DashMap;
use mongodb::bson::{Bson, Document, doc, oid::ObjectId};
use std::{collections::HashMap, fmt, sync::Arc};
use tracing::{debug, warn};

/// A handle to a document store plus the classmap used to turn references
/// into entities.
///
/// Handles are explicit: create one with [`Connection::init`] (or
/// [`Connection::with_store`]) and pass it to every mapper call. Keep named
/// handles in [`Connections`] when an application talks to several
/// databases.
pub struct Connection {
    store: Arc<dyn Store>,
    options: ConnectionOptions,
    class_map: DashMap<String, Arc<dyn Model>>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("options", &self.options)
            .field("class_map", &self.class_map().collections())
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Opens a [`MongoStore`] for `options`. Every call returns a new,
    /// independent handle.
    pub async fn init(options: ConnectionOptions) -> Result<Self> {
        let store = MongoStore::connect(&options).await?;

        debug!(target: "tamarind::connection", uri = %options.uri(), db = ?options.db, "Connection initialized");

        Ok(Self::with_store(Arc::new(store), options))
    }

    pub fn with_store(store: Arc<dyn Store>, options: ConnectionOptions) -> Self {
        Self {
            store,
            options,
            class_map: DashMap::new(),
        }
    }

    pub fn options(&self) -> &ConnectionOptions {
        &self.options
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Swaps the underlying store, e.g. for a test double.
    pub fn set_store(&mut self, store: Arc<dyn Store>) {
        self.store = store;
    }

    pub async fn find(
        &self,
        collection: &str,
        query: Document,
        options: FindOptions,
    ) -> Result<Vec<Document>> {
        let documents = self.store.find(collection, query, options).await?;

        debug!(target: "tamarind::store", collection, results = documents.len(), "find");

        Ok(documents)
    }

    pub async fn find_one(
        &self,
        collection: &str,
        query: Document,
        options: FindOptions,
    ) -> Result<Option<Document>> {
        let document = self.store.find_one(collection, query, options).await?;

        debug!(target: "tamarind::store", collection, found = document.is_some(), "find_one");

        Ok(document)
    }

    /// Inserts `values`, first assigning a fresh `_id` and the next `id` of
    /// the collection's sequence when they are absent. The assigned fields
    /// are written back into `values`.
    pub async fn insert(&self, collection: &str, values: &mut Document) -> Result<Bson> {
        if !values.contains_key("_id") {
            values.insert("_id", ObjectId::new());
        }

        if !values.contains_key("id") {
            let id = self.next_sequence(collection).await?;
            values.insert("id", id);
        }

        let inserted_id = self.store.insert_one(collection, values.clone()).await?;

        debug!(target: "tamarind::store", collection, id = %inserted_id, "insert");

        Ok(inserted_id)
    }

    /// Returns the number of documents matched. An empty `values` document
    /// is refused without reaching the store, so a missing update can never
    /// replace a whole document.
    pub async fn update(
        &self,
        collection: &str,
        query: Document,
        values: Document,
        options: UpdateOptions,
    ) -> Result<u64> {
        if values.is_empty() {
            warn!(target: "tamarind::store", collection, "Skipped update with empty values");
            return Ok(0);
        }

        let matched = self.store.update(collection, query, values, options).await?;

        debug!(target: "tamarind::store", collection, matched, multi = options.multi, "update");

        Ok(matched)
    }

    pub async fn delete(
        &self,
        collection: &str,
        query: Document,
        options: DeleteOptions,
    ) -> Result<u64> {
        let deleted = self.store.delete(collection, query, options).await?;

        debug!(target: "tamarind::store", collection, deleted, multi = options.multi, "delete");

        Ok(deleted)
    }

    pub async fn count(&self, collection: &str, query: Document) -> Result<u64> {
        let count = self.store.count(collection, query).await?;

        debug!(target: "tamarind::store", collection, count, "count");

        Ok(count)
    }

    /// Increments and returns the counter `name`.
    ///
    /// With [`SequenceStrategy::FindAndModify`] all counters live as fields
    /// of one document in the counters collection; the document, and the
    /// field, are created at 1 on first use. With
    /// [`SequenceStrategy::UpsertThenRead`] each counter is selected by
    /// `{ name: { $exists: true } }`, so a counter missing from every
    /// document gets a document of its own.
    pub async fn next_sequence(&self, name: &str) -> Result<i64> {
        let counters = self.options.counters_collection.as_str();
        let increment = doc! { "$inc": { name: 1_i64 } };

        let counter = match self.options.sequence_strategy {
            SequenceStrategy::FindAndModify => {
                self.store
                    .find_one_and_update(counters, doc! {}, increment, true)
                    .await?
            }
            SequenceStrategy::UpsertThenRead => {
                let selector = doc! { name: { "$exists": true } };

                self.store
                    .update(counters, selector.clone(), increment, UpdateOptions::upsert())
                    .await?;

                self.store
                    .find_one(counters, selector, FindOptions::default())
                    .await?
            }
        };

        let value = match counter.as_ref().and_then(|counter| counter.get(name)) {
            Some(Bson::Int64(value)) => *value,
            Some(Bson::Int32(value)) => i64::from(*value),
            _ => {
                return Err(Error::InvalidSequence {
                    name: name.to_owned(),
                });
            }
        };

        debug!(target: "tamarind::sequence", name, value, "Sequence incremented");

        Ok(value)
    }

    /// The model registered for `collection`.
    pub fn class_for(&self, collection: &str) -> Result<Arc<dyn Model>> {
        self.class_map
            .get(collection)
            .map(|model| Arc::clone(model.value()))
            .ok_or_else(|| Error::ClassNotFound {
                collection: collection.to_owned(),
            })
    }

    pub fn class_map(&self) -> ClassMap {
        ClassMap(
            self.class_map
                .iter()
                .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
                .collect(),
        )
    }

    /// Replaces the classmap.
    pub fn set_class_map(&self, class_map: ClassMap) {
        self.class_map.clear();
        self.append_class_map(class_map);
    }

    /// Merges `class_map` into the current one. Entries of `class_map` win
    /// on conflict.
    pub fn append_class_map(&self, class_map: ClassMap) {
        for (collection, model) in class_map.0 {
            self.class_map.insert(collection, model);
        }
    }

    /// Registers `model` under its own collection.
    pub fn register(&self, model: Arc<dyn Model>) -> Result<()> {
        let collection = model
            .collection()
            .filter(|collection| !collection.is_empty())
            .ok_or(Error::CollectionUndefined)?
            .to_owned();

        self.class_map.insert(collection, model);

        Ok(())
    }
}

/// Collection name → model mapping.
#[derive(Clone, Default)]
pub struct ClassMap(HashMap<String, Arc<dyn Model>>);

impl fmt::Debug for ClassMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.collections()).finish()
    }
}

impl ClassMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every model declared with `#[model(register)]`.
    #[cfg(feature = "meta")]
    pub fn registered() -> Self {
        crate::meta::model_metadata()
            .map(|metadata| (metadata.collection_name().to_owned(), metadata.model()))
            .collect()
    }

    pub fn insert(&mut self, collection: impl Into<String>, model: Arc<dyn Model>) {
        self.0.insert(collection.into(), model);
    }

    pub fn with(mut self, collection: impl Into<String>, model: Arc<dyn Model>) -> Self {
        self.insert(collection, model);
        self
    }

    pub fn get(&self, collection: &str) -> Option<&Arc<dyn Model>> {
        self.0.get(collection)
    }

    pub fn contains(&self, collection: &str) -> bool {
        self.0.contains_key(collection)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Registered collection names, sorted.
    pub fn collections(&self) -> Vec<&str> {
        let mut collections: Vec<_> = self.0.keys().map(String::as_str).collect();
        collections.sort_unstable();
        collections
    }
}

impl FromIterator<(String, Arc<dyn Model>)> for ClassMap {
    fn from_iter<T: IntoIterator<Item = (String, Arc<dyn Model>)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Named connection handles.
#[derive(Debug, Default)]
pub struct Connections {
    instances: DashMap<String, Arc<Connection>>,
}

impl Connections {
    pub const DEFAULT: &'static str = "default";

    pub fn new() -> Self {
        Self::default()
    }

    /// Initializes a connection and stores it under `name`, replacing any
    /// previous one.
    pub async fn init(&self, name: &str, options: ConnectionOptions) -> Result<Arc<Connection>> {
        let connection = Arc::new(Connection::init(options).await?);

        self.insert(name, Arc::clone(&connection));

        Ok(connection)
    }

    pub fn insert(&self, name: impl Into<String>, connection: Arc<Connection>) {
        self.instances.insert(name.into(), connection);
    }

    pub fn get(&self, name: &str) -> Result<Arc<Connection>> {
        self.instances
            .get(name)
            .map(|connection| Arc::clone(connection.value()))
            .ok_or_else(|| Error::ConnectionNotInitialized {
                name: name.to_owned(),
            })
    }

    pub fn default_connection(&self) -> Result<Arc<Connection>> {
        self.get(Self::DEFAULT)
    }

    /// Forgets the connection stored under `name`.
    pub fn reset(&self, name: &str) -> Option<Arc<Connection>> {
        self.instances
            .remove(name)
            .map(|(_, connection)| connection)
    }

    pub fn reset_all(&self) {
        self.instances.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[derive(Default)]
    struct Users;

    impl Model for Users {
        fn collection(&self) -> Option<&str> {
            Some("users")
        }
    }

    #[derive(Default)]
    struct Admins;

    impl Model for Admins {
        fn collection(&self) -> Option<&str> {
            Some("admins")
        }
    }

    fn connection(strategy: SequenceStrategy) -> Connection {
        Connection::with_store(
            Arc::new(MemoryStore::new()),
            ConnectionOptions::new().sequence_strategy(strategy),
        )
    }

    #[tokio::test]
    async fn sequences_are_gapless_for_both_strategies() {
        for strategy in [
            SequenceStrategy::FindAndModify,
            SequenceStrategy::UpsertThenRead,
        ] {
            let connection = connection(strategy);

            let mut values = vec![];
            for _ in 0..5 {
                values.push(connection.next_sequence("users").await.unwrap());
            }

            assert_eq!(values, [1, 2, 3, 4, 5]);
            assert_eq!(connection.next_sequence("articles").await.unwrap(), 1);
            assert_eq!(connection.next_sequence("users").await.unwrap(), 6);
        }
    }

    #[tokio::test]
    async fn sequence_keeps_other_fields() {
        for strategy in [
            SequenceStrategy::FindAndModify,
            SequenceStrategy::UpsertThenRead,
        ] {
            let store = Arc::new(MemoryStore::new());
            store
                .insert_one("counters", doc! { "articles": 41_i64 })
                .await
                .unwrap();

            let connection = Connection::with_store(
                store.clone(),
                ConnectionOptions::new().sequence_strategy(strategy),
            );

            assert_eq!(connection.next_sequence("users").await.unwrap(), 1);
            assert_eq!(connection.next_sequence("articles").await.unwrap(), 42);
            assert_eq!(connection.next_sequence("users").await.unwrap(), 2);

            let counters = store.documents("counters");
            let articles: Vec<_> = counters
                .iter()
                .filter_map(|counter| counter.get_i64("articles").ok())
                .collect();
            let users: Vec<_> = counters
                .iter()
                .filter_map(|counter| counter.get_i64("users").ok())
                .collect();

            assert_eq!(articles, [42]);
            assert_eq!(users, [2]);
        }
    }

    #[tokio::test]
    async fn upsert_then_read_follows_per_name_counters() {
        let store = Arc::new(MemoryStore::new());
        store
            .insert_one("sequences", doc! { "users": 10_i64 })
            .await
            .unwrap();
        store
            .insert_one("sequences", doc! { "articles": 3_i64 })
            .await
            .unwrap();

        let connection = Connection::with_store(
            store.clone(),
            ConnectionOptions::new()
                .counters_collection("sequences")
                .sequence_strategy(SequenceStrategy::UpsertThenRead),
        );

        assert_eq!(connection.next_sequence("articles").await.unwrap(), 4);
        assert_eq!(connection.next_sequence("users").await.unwrap(), 11);
        assert_eq!(connection.next_sequence("tags").await.unwrap(), 1);

        let counters = store.documents("sequences");
        assert_eq!(counters.len(), 3);
        assert_eq!(counters[0].get_i64("users").unwrap(), 11);
        assert_eq!(counters[1].get_i64("articles").unwrap(), 4);
        assert!(!counters[1].contains_key("users"));
    }

    #[tokio::test]
    async fn non_integer_counter_is_rejected() {
        let store = Arc::new(MemoryStore::new());
        store
            .insert_one("counters", doc! { "users": "many" })
            .await
            .unwrap();

        let connection = Connection::with_store(store, ConnectionOptions::new());

        assert!(matches!(
            connection.next_sequence("users").await,
            Err(Error::InvalidOperation { .. })
        ));
    }

    #[tokio::test]
    async fn insert_assigns_missing_identifiers() {
        let connection = connection(SequenceStrategy::default());

        let mut values = doc! { "name": "Martyn" };
        let inserted_id = connection.insert("users", &mut values).await.unwrap();

        assert_eq!(values.get("_id"), Some(&inserted_id));
        assert_eq!(values.get_i64("id").unwrap(), 1);

        let mut values = doc! { "_id": 7, "id": 99, "name": "Kit" };
        connection.insert("users", &mut values).await.unwrap();

        assert_eq!(values, doc! { "_id": 7, "id": 99, "name": "Kit" });
        assert_eq!(connection.next_sequence("users").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn empty_update_is_refused() {
        let connection = connection(SequenceStrategy::default());

        let matched = connection
            .update("users", doc! {}, doc! {}, UpdateOptions::default())
            .await
            .unwrap();

        assert_eq!(matched, 0);
    }

    #[test]
    fn class_map_append_overrides() {
        let connection = connection(SequenceStrategy::default());

        connection.register(Arc::new(Users)).unwrap();
        assert_eq!(connection.class_map().collections(), ["users"]);

        connection.append_class_map(
            ClassMap::new()
                .with("users", Arc::new(Admins))
                .with("admins", Arc::new(Admins)),
        );

        assert_eq!(connection.class_map().collections(), ["admins", "users"]);
        assert_eq!(
            connection.class_for("users").unwrap().collection(),
            Some("admins")
        );

        connection.set_class_map(ClassMap::new().with("users", Arc::new(Users)));
        assert_eq!(connection.class_map().collections(), ["users"]);

        assert!(matches!(
            connection.class_for("tags"),
            Err(Error::ClassNotFound { collection }) if collection == "tags"
        ));
    }

    #[test]
    fn named_connections() {
        let connections = Connections::new();

        assert!(matches!(
            connections.default_connection(),
            Err(Error::ConnectionNotInitialized { .. })
        ));

        connections.insert(
            Connections::DEFAULT,
            Arc::new(connection(SequenceStrategy::default())),
        );
        connections.insert(
            "archive",
            Arc::new(connection(SequenceStrategy::UpsertThenRead)),
        );

        assert!(connections.default_connection().is_ok());
        assert_eq!(
            connections.get("archive").unwrap().options().sequence_strategy,
            SequenceStrategy::UpsertThenRead
        );

        assert!(connections.reset("archive").is_some());
        assert!(connections.get("archive").is_err());

        connections.reset_all();
        assert!(connections.default_connection().is_err());
    }
}
