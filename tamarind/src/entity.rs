use crate::{
    Connection, DeleteOptions, Entities, Error, FindOptions, Model, PushOptions, Result,
    UpdateOptions,
    reference::DbRef,
    value::{
        Fields, IntoFields, Value, assign, fields_from_document, fields_into_document,
        filter_whitelist, lookup, query_document,
    },
};
use futures_util::{FutureExt, future::BoxFuture};
use mongodb::bson::{Bson, DateTime, Document, doc};
use std::{collections::HashMap, fmt, sync::Arc};
use tracing::trace;

/// Rendered by [`Entity::to_array`] in place of values nested deeper than
/// the requested depth.
pub const DEPTH_PLACEHOLDER: &str = "...";

pub const DEFAULT_DEPTH: u32 = 2;

/// An instance of a [`Model`]: one document, loaded or about to be saved.
///
/// References stored in the document are resolved on first read through
/// [`Entity::get`] and kept in a cache next to the raw data, so reading the
/// same field again does not reach the store.
#[derive(Clone)]
pub struct Entity {
    model: Arc<dyn Model>,
    data: Fields,
    resolved: HashMap<String, Value>,
    errors: Vec<String>,
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("collection", &self.collection())
            .field("data", &self.data)
            .field("errors", &self.errors)
            .finish_non_exhaustive()
    }
}

impl PartialEq for Entity {
    fn eq(&self, other: &Self) -> bool {
        self.collection() == other.collection() && self.data == other.data
    }
}

fn collection_of(model: &dyn Model) -> Result<&str> {
    model
        .collection()
        .filter(|collection| !collection.is_empty())
        .ok_or(Error::CollectionUndefined)
}

/// Adds the soft-delete condition for models that need it and converts the
/// query to a filter document.
fn scoped_query(model: &dyn Model, mut query: Fields) -> Result<Document> {
    if model.soft_deletes() {
        query.insert(
            "deleted_at".to_owned(),
            Value::from(doc! { "$exists": false }),
        );
    }

    query_document(query)
}

impl Entity {
    /// A new entity holding the whitelisted part of `data`, passed through
    /// the model's setter.
    pub fn new(model: Arc<dyn Model>, data: impl IntoFields) -> Result<Self> {
        let data = filter_whitelist(data.into_fields(), model.whitelist());

        let mut entity = Self::hydrate(model, Fields::new())?;
        entity.set_many(data);

        Ok(entity)
    }

    /// An entity holding `data` as is, e.g. a document read from the store.
    pub fn hydrate(model: Arc<dyn Model>, data: Fields) -> Result<Self> {
        collection_of(model.as_ref())?;

        Ok(Self {
            model,
            data,
            resolved: HashMap::new(),
            errors: vec![],
        })
    }

    pub fn model(&self) -> &Arc<dyn Model> {
        &self.model
    }

    pub fn collection(&self) -> &str {
        self.model.collection().unwrap_or_default()
    }

    pub fn data(&self) -> &Fields {
        &self.data
    }

    /// The `_id` of a persisted entity.
    pub fn id(&self) -> Option<&Value> {
        self.data.get("_id")
    }

    pub fn is_new(&self) -> bool {
        self.id().is_none()
    }

    /// Reads a field without resolving references or applying the getter.
    pub fn raw(&self, name: &str) -> Option<&Value> {
        lookup(&self.data, name)
    }

    /// Whether a resolved value for `name` is cached.
    pub fn is_resolved(&self, name: &str) -> bool {
        self.resolved.contains_key(name)
    }

    /// Reads a field.
    ///
    /// A reference is replaced with the entity it points at, and an array is
    /// returned with every reference element replaced. The model to build
    /// is picked from the connection's classmap; a reference to a missing
    /// document yields an empty entity. Resolutions are cached until the
    /// field is written or the entity reloaded. The model's getter, if any,
    /// sees the final value.
    pub async fn get(&mut self, connection: &Connection, name: &str) -> Result<Option<Value>> {
        let value = match self.resolved.get(name) {
            Some(cached) => {
                trace!(target: "tamarind::entity", collection = self.collection(), field = name, "Resolved value cache hit");
                Some(cached.clone())
            }
            None => match lookup(&self.data, name).cloned() {
                Some(Value::Reference(reference)) => {
                    let value = Value::from(resolve(connection, &reference).await?);
                    self.resolved.insert(name.to_owned(), value.clone());
                    Some(value)
                }
                Some(Value::Array(items)) if items.iter().any(Value::is_reference) => {
                    let mut resolved = Vec::with_capacity(items.len());

                    for item in items {
                        resolved.push(match item {
                            Value::Reference(reference) => {
                                Value::from(resolve(connection, &reference).await?)
                            }
                            other => other,
                        });
                    }

                    let value = Value::Array(resolved);
                    self.resolved.insert(name.to_owned(), value.clone());
                    Some(value)
                }
                other => other,
            },
        };

        Ok(value.map(|value| self.apply_getter(name, value)))
    }

    fn apply_getter(&self, name: &str, value: Value) -> Value {
        match self.model.getter() {
            Some(getter) => getter.get(name, value),
            None => value,
        }
    }

    /// Writes a field. Dotted names write into nested documents, keeping
    /// their other keys.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) {
        let value = value.into();
        let value = match self.model.setter() {
            Some(setter) => setter.set(name, value),
            None => value,
        };

        assign(&mut self.data, name, value);
        self.invalidate(name);
    }

    pub fn set_many(&mut self, fields: impl IntoFields) {
        for (name, value) in fields.into_fields() {
            self.set(&name, value);
        }
    }

    fn invalidate(&mut self, name: &str) {
        let head = name.split('.').next().unwrap_or(name);
        let prefix = format!("{head}.");

        self.resolved
            .retain(|key, _| key != head && !key.starts_with(&prefix));
    }

    pub async fn find(
        connection: &Connection,
        model: Arc<dyn Model>,
        query: impl IntoFields,
        options: FindOptions,
    ) -> Result<Entities> {
        let collection = collection_of(model.as_ref())?.to_owned();
        let filter = scoped_query(model.as_ref(), query.into_fields())?;

        let documents = connection.find(&collection, filter, options).await?;

        documents
            .into_iter()
            .map(|document| Self::hydrate(Arc::clone(&model), fields_from_document(document)))
            .collect()
    }

    pub async fn find_one(
        connection: &Connection,
        model: Arc<dyn Model>,
        query: impl IntoFields,
        options: FindOptions,
    ) -> Result<Option<Self>> {
        let collection = collection_of(model.as_ref())?.to_owned();
        let filter = scoped_query(model.as_ref(), query.into_fields())?;

        let document = connection.find_one(&collection, filter, options).await?;

        document
            .map(|document| Self::hydrate(model, fields_from_document(document)))
            .transpose()
    }

    pub async fn find_one_or_fail(
        connection: &Connection,
        model: Arc<dyn Model>,
        query: impl IntoFields,
        options: FindOptions,
    ) -> Result<Self> {
        let collection = collection_of(model.as_ref())?.to_owned();

        Self::find_one(connection, model, query, options)
            .await?
            .ok_or(Error::NotFound { collection })
    }

    pub async fn count(
        connection: &Connection,
        model: Arc<dyn Model>,
        query: impl IntoFields,
    ) -> Result<u64> {
        let collection = collection_of(model.as_ref())?;
        let filter = scoped_query(model.as_ref(), query.into_fields())?;

        connection.count(collection, filter).await
    }

    pub async fn remove(
        connection: &Connection,
        model: Arc<dyn Model>,
        query: impl IntoFields,
        options: DeleteOptions,
    ) -> Result<u64> {
        let collection = collection_of(model.as_ref())?;
        let filter = query_document(query.into_fields())?;

        connection.delete(collection, filter, options).await
    }

    /// Replaces this entity's data with the first match of `query`. Returns
    /// `false`, leaving the entity untouched, when nothing matches.
    pub async fn load(
        &mut self,
        connection: &Connection,
        query: impl IntoFields,
        options: FindOptions,
    ) -> Result<bool> {
        let filter = query_document(query.into_fields())?;

        let Some(document) = connection
            .find_one(self.collection(), filter, options)
            .await?
        else {
            return Ok(false);
        };

        self.data = fields_from_document(document);
        self.resolved.clear();

        Ok(true)
    }

    /// Clears the errors and runs the model's validation. Returns whether
    /// no errors were reported.
    pub fn validate(&mut self) -> bool {
        self.errors.clear();

        let model = Arc::clone(&self.model);
        let mut errors = vec![];
        model.validate(self, &mut errors);
        self.errors = errors;

        self.errors.is_empty()
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn set_error(&mut self, error: impl Into<String>) {
        self.errors.push(error.into());
    }

    pub fn set_errors<I>(&mut self, errors: I)
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.errors.extend(errors.into_iter().map(Into::into));
    }

    pub fn reset_errors(&mut self) {
        self.errors.clear();
    }

    /// Merges the whitelisted part of `data` into the entity, validates it,
    /// and persists its whitelisted fields.
    ///
    /// A new entity is inserted with a `created_at` timestamp and receives
    /// the `_id` and `id` assigned on insert. A persisted one is updated in
    /// place with `$set` and an `updated_at` timestamp. Entities among the
    /// values are stored as references. Returns `false` without touching
    /// the store when validation fails.
    pub async fn save(&mut self, connection: &Connection, data: impl IntoFields) -> Result<bool> {
        let model = Arc::clone(&self.model);
        let whitelist = model.whitelist();

        if whitelist.is_empty() {
            return Err(Error::WhitelistEmpty {
                collection: self.collection().to_owned(),
            });
        }

        self.set_many(filter_whitelist(data.into_fields(), whitelist));

        if !self.validate() {
            return Ok(false);
        }

        let mut values = fields_into_document(filter_whitelist(self.data.clone(), whitelist))?;

        match self.id().cloned() {
            None => {
                values.insert("created_at", DateTime::now());

                connection.insert(self.collection(), &mut values).await?;

                for (key, value) in values {
                    self.data.entry(key).or_insert_with(|| Value::from(value));
                }
            }
            Some(id) => {
                let id = id.into_bson()?;
                let now = DateTime::now();

                values.insert("updated_at", now);
                values.remove("_id");

                connection
                    .update(
                        self.collection(),
                        doc! { "_id": id },
                        doc! { "$set": values },
                        UpdateOptions::default(),
                    )
                    .await?;

                self.data.insert("updated_at".to_owned(), Value::from(now));
            }
        }

        Ok(true)
    }

    /// Appends to array fields of the stored document, then reloads the
    /// entity.
    ///
    /// Every value is treated as a list of items; entities among them are
    /// stored as references. With [`PushOptions::each`] the items are
    /// appended one by one, otherwise the list is appended as one nested
    /// array.
    pub async fn push(
        &mut self,
        connection: &Connection,
        data: impl IntoFields,
        options: PushOptions,
    ) -> Result<()> {
        let id = self.require_id()?;
        let data = data.into_fields();

        if data.is_empty() {
            return Ok(());
        }

        let mut push = Document::new();

        for (field, value) in data {
            let items = match value {
                Value::Array(items) => items,
                single => vec![single],
            };

            let items = items
                .into_iter()
                .map(Value::into_bson)
                .collect::<Result<Vec<_>>>()?;

            let items = if options.each {
                Bson::Document(doc! { "$each": items })
            } else {
                Bson::Array(items)
            };

            push.insert(field, items);
        }

        connection
            .update(
                self.collection(),
                doc! { "_id": id.clone() },
                doc! { "$push": push },
                UpdateOptions::default(),
            )
            .await?;

        connection
            .update(
                self.collection(),
                doc! { "_id": id.clone() },
                doc! { "$set": { "updated_at": DateTime::now() } },
                UpdateOptions::default(),
            )
            .await?;

        self.load(connection, [("_id", id)], FindOptions::default())
            .await?;

        Ok(())
    }

    /// Same as [`Entity::push`].
    pub async fn attach(
        &mut self,
        connection: &Connection,
        data: impl IntoFields,
        options: PushOptions,
    ) -> Result<()> {
        self.push(connection, data, options).await
    }

    /// Deletes the stored document. Returns `false` without a store call
    /// when the entity was never saved.
    ///
    /// Models with soft deletes get `deleted_at` set instead.
    pub async fn delete(&mut self, connection: &Connection) -> Result<bool> {
        let Some(id) = self.id().cloned() else {
            return Ok(false);
        };

        let id = id.into_bson()?;
        let query = doc! { "_id": id };

        if self.model.soft_deletes() {
            let now = DateTime::now();

            let matched = connection
                .update(
                    self.collection(),
                    query,
                    doc! { "$set": { "deleted_at": now } },
                    UpdateOptions::default(),
                )
                .await?;

            self.data.insert("deleted_at".to_owned(), Value::from(now));

            return Ok(matched > 0);
        }

        let deleted = connection
            .delete(self.collection(), query, DeleteOptions::default())
            .await?;

        Ok(deleted > 0)
    }

    fn require_id(&self) -> Result<Bson> {
        self.id()
            .cloned()
            .ok_or_else(|| Error::MissingId {
                collection: self.collection().to_owned(),
            })?
            .into_bson()
    }

    /// A reference to this entity's document.
    pub fn db_ref(&self) -> Result<DbRef> {
        Ok(DbRef::new(self.collection(), self.require_id()?))
    }

    /// Converts the entity into a plain document.
    ///
    /// Object ids become hex strings. Nested entities and references are
    /// rendered while `depth` allows, one level per nesting, and as
    /// [`DEPTH_PLACEHOLDER`] beyond that; references already resolved by
    /// [`Entity::get`] are rendered from the cache. Embedded documents and
    /// arrays do not count as a level. Top-level scalars go through the
    /// model's getter.
    pub fn to_array<'a>(
        &'a self,
        connection: &'a Connection,
        depth: u32,
    ) -> BoxFuture<'a, Result<Document>> {
        async move {
            let mut document = Document::new();

            for (name, raw) in &self.data {
                let value = match self.resolved.get(name) {
                    Some(resolved) => settle(raw, resolved, depth),
                    None => match raw {
                        Value::Scalar(Bson::ObjectId(_)) => raw.clone(),
                        Value::Scalar(_) => self.apply_getter(name, raw.clone()),
                        other => other.clone(),
                    },
                };

                document.insert(name.clone(), render(connection, value, depth).await?);
            }

            Ok(document)
        }
        .boxed()
    }
}

/// Pairs a cached resolution with the raw value it came from. A reference
/// whose document was missing renders the same as an uncached one: a
/// placeholder at depth 0, `null` otherwise.
fn settle(raw: &Value, resolved: &Value, depth: u32) -> Value {
    match (raw, resolved) {
        (Value::Reference(_), Value::Entity(entity)) if entity.is_new() => {
            if depth == 0 {
                Value::from(DEPTH_PLACEHOLDER)
            } else {
                Value::NULL
            }
        }
        (Value::Array(raw_items), Value::Array(items)) => Value::Array(
            raw_items
                .iter()
                .zip(items)
                .map(|(raw, resolved)| settle(raw, resolved, depth))
                .collect(),
        ),
        _ => resolved.clone(),
    }
}

async fn resolve(connection: &Connection, reference: &DbRef) -> Result<Entity> {
    let model = connection.class_for(reference.collection())?;

    trace!(target: "tamarind::entity", reference = %reference, "Resolving reference");

    let document = connection
        .find_one(
            reference.collection(),
            reference.filter(),
            FindOptions::default(),
        )
        .await?;

    Entity::hydrate(model, document.map(fields_from_document).unwrap_or_default())
}

fn render(connection: &Connection, value: Value, depth: u32) -> BoxFuture<'_, Result<Bson>> {
    async move {
        let bson = match value {
            Value::Scalar(Bson::ObjectId(id)) => Bson::String(id.to_hex()),
            Value::Scalar(bson) => bson,
            Value::Entity(_) | Value::Reference(_) if depth == 0 => {
                Bson::String(DEPTH_PLACEHOLDER.to_owned())
            }
            Value::Entity(entity) => Bson::Document(entity.to_array(connection, depth - 1).await?),
            Value::Reference(reference) => {
                let document = connection
                    .find_one(
                        reference.collection(),
                        reference.filter(),
                        FindOptions::default(),
                    )
                    .await?;

                match document {
                    Some(document) => {
                        render(
                            connection,
                            Value::Document(fields_from_document(document)),
                            depth - 1,
                        )
                        .await?
                    }
                    None => Bson::Null,
                }
            }
            Value::Document(fields) => {
                let mut document = Document::new();

                for (name, value) in fields {
                    document.insert(name, render(connection, value, depth).await?);
                }

                Bson::Document(document)
            }
            Value::Array(items) => {
                let mut array = Vec::with_capacity(items.len());

                for item in items {
                    array.push(render(connection, item, depth).await?);
                }

                Bson::Array(array)
            }
        };

        Ok(bson)
    }
    .boxed()
}
