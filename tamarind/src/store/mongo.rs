use super::{Store, is_operator_document};
use crate::{ConnectionOptions, DeleteOptions, Error, FindOptions, Result, UpdateOptions};
use futures_util::{FutureExt, TryStreamExt, future::BoxFuture};
use mongodb::{
    Client, Collection, Database,
    bson::{Bson, Document, doc},
    options::{ClientOptions, Credential, ReturnDocument},
};
use std::sync::OnceLock;

/// [`Store`] backed by the official `MongoDB` driver.
#[derive(Debug)]
pub struct MongoStore {
    client: Client,
    db_name: Option<String>,
    database: OnceLock<Database>,
}

impl MongoStore {
    /// Opens a client for `options`. When `options.connect` is set the
    /// server is pinged before returning.
    pub async fn connect(options: &ConnectionOptions) -> Result<Self> {
        let mut client_options = ClientOptions::parse(options.uri()).await?;

        if options.username.is_some() || options.password.is_some() {
            let mut credential = Credential::default();
            credential.username.clone_from(&options.username);
            credential.password.clone_from(&options.password);
            credential.source.clone_from(&options.db);
            client_options.credential = Some(credential);
        }

        let store = Self::from_client(Client::with_options(client_options)?, options.db.clone());

        if options.connect {
            store.database()?.run_command(doc! { "ping": 1 }).await?;
        }

        Ok(store)
    }

    pub fn from_client(client: Client, db_name: Option<String>) -> Self {
        Self {
            client,
            db_name,
            database: OnceLock::new(),
        }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// The selected database, chosen on first use and cached afterwards.
    pub fn database(&self) -> Result<&Database> {
        if let Some(database) = self.database.get() {
            return Ok(database);
        }

        let database = match &self.db_name {
            Some(name) => self.client.database(name),
            None => self
                .client
                .default_database()
                .ok_or(Error::DatabaseUndefined)?,
        };

        Ok(self.database.get_or_init(|| database))
    }

    fn collection(&self, name: &str) -> Result<Collection<Document>> {
        Ok(self.database()?.collection(name))
    }
}

impl Store for MongoStore {
    fn find<'a>(
        &'a self,
        collection: &'a str,
        filter: Document,
        options: FindOptions,
    ) -> BoxFuture<'a, Result<Vec<Document>>> {
        async move {
            let collection = self.collection(collection)?;

            let mut query = collection.find(filter);

            if let Some(projection) = options.fields {
                query = query.projection(projection);
            }

            if let Some(limit) = options.limit {
                query = query.limit(limit);
            }

            if let Some(skip) = options.skip {
                query = query.skip(skip);
            }

            if let Some(sort) = options.sort {
                query = query.sort(sort);
            }

            let documents = query.await?.try_collect().await?;

            Ok(documents)
        }
        .boxed()
    }

    fn find_one<'a>(
        &'a self,
        collection: &'a str,
        filter: Document,
        options: FindOptions,
    ) -> BoxFuture<'a, Result<Option<Document>>> {
        async move {
            let collection = self.collection(collection)?;

            let mut query = collection.find_one(filter);

            if let Some(projection) = options.fields {
                query = query.projection(projection);
            }

            if let Some(skip) = options.skip {
                query = query.skip(skip);
            }

            if let Some(sort) = options.sort {
                query = query.sort(sort);
            }

            let document = query.await?;

            Ok(document)
        }
        .boxed()
    }

    fn insert_one<'a>(
        &'a self,
        collection: &'a str,
        document: Document,
    ) -> BoxFuture<'a, Result<Bson>> {
        async move {
            let collection = self.collection(collection)?;

            let result = collection.insert_one(document).await?;

            Ok(result.inserted_id)
        }
        .boxed()
    }

    fn update<'a>(
        &'a self,
        collection: &'a str,
        filter: Document,
        update: Document,
        options: UpdateOptions,
    ) -> BoxFuture<'a, Result<u64>> {
        async move {
            let collection = self.collection(collection)?;

            let result = if !is_operator_document(&update) {
                collection
                    .replace_one(filter, update)
                    .upsert(options.upsert)
                    .await?
            } else if options.multi {
                collection
                    .update_many(filter, update)
                    .upsert(options.upsert)
                    .await?
            } else {
                collection
                    .update_one(filter, update)
                    .upsert(options.upsert)
                    .await?
            };

            let upserted = u64::from(result.upserted_id.is_some());

            Ok(result.matched_count + upserted)
        }
        .boxed()
    }

    fn delete<'a>(
        &'a self,
        collection: &'a str,
        filter: Document,
        options: DeleteOptions,
    ) -> BoxFuture<'a, Result<u64>> {
        async move {
            let collection = self.collection(collection)?;

            let result = if options.multi {
                collection.delete_many(filter).await?
            } else {
                collection.delete_one(filter).await?
            };

            Ok(result.deleted_count)
        }
        .boxed()
    }

    fn find_one_and_update<'a>(
        &'a self,
        collection: &'a str,
        filter: Document,
        update: Document,
        upsert: bool,
    ) -> BoxFuture<'a, Result<Option<Document>>> {
        async move {
            let collection = self.collection(collection)?;

            let document = collection
                .find_one_and_update(filter, update)
                .upsert(upsert)
                .return_document(ReturnDocument::After)
                .await?;

            Ok(document)
        }
        .boxed()
    }

    fn count<'a>(&'a self, collection: &'a str, filter: Document) -> BoxFuture<'a, Result<u64>> {
        async move {
            let collection = self.collection(collection)?;

            let count = collection.count_documents(filter).await?;

            Ok(count)
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn database_must_be_named() {
        let store = MongoStore::connect(&ConnectionOptions::new().connect(false))
            .await
            .unwrap();

        assert!(matches!(store.database(), Err(Error::DatabaseUndefined)));
    }

    #[tokio::test]
    async fn named_database_is_selected_lazily() {
        let store = MongoStore::connect(&ConnectionOptions::new().db("blog").connect(false))
            .await
            .unwrap();

        assert_eq!(store.database().unwrap().name(), "blog");
        assert!(std::ptr::eq(
            store.database().unwrap(),
            store.database().unwrap()
        ));
    }
}
