#![allow(dead_code)]

use futures_util::future::BoxFuture;
use std::sync::{Arc, Mutex};
use tamarind::{
    Connection, ConnectionOptions, CustomGetter, CustomSetter, DeleteOptions, Entity, FindOptions,
    Model, Result, UpdateOptions, Validator, Value,
    mongodb::bson::{Bson, Document},
    store::{MemoryStore, Store},
};

#[derive(Clone, Debug, PartialEq)]
pub enum Call {
    Find {
        collection: String,
        filter: Document,
        options: FindOptions,
    },
    FindOne {
        collection: String,
        filter: Document,
    },
    InsertOne {
        collection: String,
        document: Document,
    },
    Update {
        collection: String,
        filter: Document,
        update: Document,
        options: UpdateOptions,
    },
    Delete {
        collection: String,
        filter: Document,
        options: DeleteOptions,
    },
    FindOneAndUpdate {
        collection: String,
        filter: Document,
        update: Document,
    },
    Count {
        collection: String,
        filter: Document,
    },
}

impl Call {
    pub fn collection(&self) -> &str {
        match self {
            Self::Find { collection, .. }
            | Self::FindOne { collection, .. }
            | Self::InsertOne { collection, .. }
            | Self::Update { collection, .. }
            | Self::Delete { collection, .. }
            | Self::FindOneAndUpdate { collection, .. }
            | Self::Count { collection, .. } => collection,
        }
    }
}

/// A [`MemoryStore`] that remembers every call made to it.
#[derive(Debug, Default)]
pub struct RecordingStore {
    inner: MemoryStore,
    calls: Mutex<Vec<Call>>,
}

impl RecordingStore {
    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Calls made against `collection`.
    pub fn calls_to(&self, collection: &str) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|call| call.collection() == collection)
            .collect()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

impl Store for RecordingStore {
    fn find<'a>(
        &'a self,
        collection: &'a str,
        filter: Document,
        options: FindOptions,
    ) -> BoxFuture<'a, Result<Vec<Document>>> {
        self.record(Call::Find {
            collection: collection.to_owned(),
            filter: filter.clone(),
            options: options.clone(),
        });

        self.inner.find(collection, filter, options)
    }

    fn find_one<'a>(
        &'a self,
        collection: &'a str,
        filter: Document,
        options: FindOptions,
    ) -> BoxFuture<'a, Result<Option<Document>>> {
        self.record(Call::FindOne {
            collection: collection.to_owned(),
            filter: filter.clone(),
        });

        self.inner.find_one(collection, filter, options)
    }

    fn insert_one<'a>(
        &'a self,
        collection: &'a str,
        document: Document,
    ) -> BoxFuture<'a, Result<Bson>> {
        self.record(Call::InsertOne {
            collection: collection.to_owned(),
            document: document.clone(),
        });

        self.inner.insert_one(collection, document)
    }

    fn update<'a>(
        &'a self,
        collection: &'a str,
        filter: Document,
        update: Document,
        options: UpdateOptions,
    ) -> BoxFuture<'a, Result<u64>> {
        self.record(Call::Update {
            collection: collection.to_owned(),
            filter: filter.clone(),
            update: update.clone(),
            options,
        });

        self.inner.update(collection, filter, update, options)
    }

    fn delete<'a>(
        &'a self,
        collection: &'a str,
        filter: Document,
        options: DeleteOptions,
    ) -> BoxFuture<'a, Result<u64>> {
        self.record(Call::Delete {
            collection: collection.to_owned(),
            filter: filter.clone(),
            options,
        });

        self.inner.delete(collection, filter, options)
    }

    fn find_one_and_update<'a>(
        &'a self,
        collection: &'a str,
        filter: Document,
        update: Document,
        upsert: bool,
    ) -> BoxFuture<'a, Result<Option<Document>>> {
        self.record(Call::FindOneAndUpdate {
            collection: collection.to_owned(),
            filter: filter.clone(),
            update: update.clone(),
        });

        self.inner
            .find_one_and_update(collection, filter, update, upsert)
    }

    fn count<'a>(&'a self, collection: &'a str, filter: Document) -> BoxFuture<'a, Result<u64>> {
        self.record(Call::Count {
            collection: collection.to_owned(),
            filter: filter.clone(),
        });

        self.inner.count(collection, filter)
    }
}

pub struct Fixture {
    pub store: Arc<RecordingStore>,
    pub connection: Connection,
}

/// A connection over a fresh recording store with the test models
/// registered.
pub fn fixture() -> Fixture {
    fixture_with(ConnectionOptions::new())
}

pub fn fixture_with(options: ConnectionOptions) -> Fixture {
    let store = Arc::new(RecordingStore::default());
    let connection = Connection::with_store(store.clone(), options);

    connection.register(Arc::new(User)).unwrap();
    connection.register(Arc::new(Article)).unwrap();
    connection.register(Arc::new(Tag::default())).unwrap();

    Fixture { store, connection }
}

#[derive(Default, Model)]
#[model(collection = "users", whitelist(name, email, friend, friends))]
pub struct User;

#[derive(Default, Model)]
#[model(collection = "articles", whitelist(title, author, tags, meta))]
pub struct Article;

#[derive(Default, Model)]
#[model(collection = "tags")]
pub struct Tag {
    pub name: String,
}

#[derive(Default, Model)]
#[model(collection = "users", whitelist(first_name, last_name), getter, setter)]
pub struct UserCustomGetterSetter;

impl CustomGetter for UserCustomGetterSetter {
    fn get(&self, field: &str, value: Value) -> Value {
        if field == "first_name" {
            if let Some(name) = value.as_str() {
                return Value::from(name.to_uppercase());
            }
        }

        value
    }
}

impl CustomSetter for UserCustomGetterSetter {
    fn set(&self, field: &str, value: Value) -> Value {
        if field == "last_name" {
            if let Some(name) = value.as_str() {
                return Value::from(name.to_lowercase());
            }
        }

        value
    }
}

#[derive(Default, Model)]
#[model(collection = "users", whitelist(name, email), validator)]
pub struct UserValidator;

impl Validator for UserValidator {
    fn validate(&self, entity: &Entity, errors: &mut Vec<String>) {
        let name = entity.raw("name").and_then(Value::as_str);

        if name.is_none_or(str::is_empty) {
            errors.push("name_missing_error".to_owned());
        }
    }
}

#[derive(Default, Model)]
pub struct Untitled;

#[derive(Default, Model)]
#[model(collection = "users")]
pub struct NoWhitelist;

#[derive(Default, Model)]
#[model(collection = "posts", whitelist(title), soft_deletes)]
pub struct Post;

#[derive(Default, Model)]
#[model(collection = "comments", whitelist(body), register)]
pub struct Comment;
