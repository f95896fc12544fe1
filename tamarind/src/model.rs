use crate::{
    Connection, DeleteOptions, Entities, Entity, FindOptions, Result,
    value::{Fields, IntoFields, Value},
};
use futures_util::{FutureExt, future::BoxFuture};
use std::sync::Arc;

/// Describes a kind of entity: where it is stored and how its fields are
/// treated.
///
/// Usually derived:
///
/// ```
/// use tamarind::Model;
///
/// #[derive(Default, Model)]
/// #[model(collection = "users")]
/// struct User {
///     name: String,
///     email: String,
/// }
///
/// let user = User::default();
/// assert_eq!(user.collection(), Some("users"));
/// assert_eq!(user.whitelist(), ["name", "email"]);
/// ```
pub trait Model: Send + Sync + 'static {
    /// Backing collection. Entities of a model without one cannot be
    /// constructed.
    fn collection(&self) -> Option<&str>;

    /// Fields that [`Entity::save`] is allowed to persist.
    fn whitelist(&self) -> &[&str] {
        &[]
    }

    fn getter(&self) -> Option<&dyn CustomGetter> {
        None
    }

    fn setter(&self) -> Option<&dyn CustomSetter> {
        None
    }

    /// Appends validation failures for `entity` to `errors`. Runs before
    /// every save.
    fn validate(&self, entity: &Entity, errors: &mut Vec<String>) {
        let _ = (entity, errors);
    }

    /// Whether deleting marks documents with `deleted_at` instead of
    /// removing them. Finders of such models skip marked documents.
    fn soft_deletes(&self) -> bool {
        false
    }
}

/// Post-processes field values on read.
pub trait CustomGetter: Send + Sync {
    /// Returns the value to hand out for `field`. Fields the getter does
    /// not care about should pass `value` through.
    fn get(&self, field: &str, value: Value) -> Value;
}

/// Transforms field values on write.
pub trait CustomSetter: Send + Sync {
    fn set(&self, field: &str, value: Value) -> Value;
}

/// Validation for models deriving [`Model`](tamarind_macros::Model) with
/// `#[model(validator)]`.
pub trait Validator: Send + Sync {
    fn validate(&self, entity: &Entity, errors: &mut Vec<String>);
}

/// Type-level finders for models that can be instantiated on their own.
///
/// Implemented for every `Model + Default`, so `User::find(&conn, ..)`
/// works for any derived model.
pub trait Finder: Model + Default + Sized {
    fn model() -> Arc<dyn Model> {
        Arc::new(Self::default())
    }

    /// A new, unsaved entity holding the whitelisted part of `data`.
    fn new(data: impl IntoFields) -> Result<Entity> {
        Entity::new(Self::model(), data)
    }

    /// Alias of [`Finder::new`].
    fn factory(data: impl IntoFields) -> Result<Entity> {
        Self::new(data)
    }

    /// Builds an entity from `data` and saves it.
    fn create(connection: &Connection, data: impl IntoFields) -> BoxFuture<'_, Result<Entity>> {
        let data = data.into_fields();

        async move {
            let mut entity = Entity::new(Self::model(), Fields::new())?;

            entity.save(connection, data).await?;

            Ok(entity)
        }
        .boxed()
    }

    fn find(
        connection: &Connection,
        query: impl IntoFields,
        options: FindOptions,
    ) -> BoxFuture<'_, Result<Entities>> {
        let query = query.into_fields();

        async move { Entity::find(connection, Self::model(), query, options).await }.boxed()
    }

    fn find_one(
        connection: &Connection,
        query: impl IntoFields,
        options: FindOptions,
    ) -> BoxFuture<'_, Result<Option<Entity>>> {
        let query = query.into_fields();

        async move { Entity::find_one(connection, Self::model(), query, options).await }.boxed()
    }

    fn find_one_or_fail(
        connection: &Connection,
        query: impl IntoFields,
        options: FindOptions,
    ) -> BoxFuture<'_, Result<Entity>> {
        let query = query.into_fields();

        async move { Entity::find_one_or_fail(connection, Self::model(), query, options).await }
            .boxed()
    }

    fn count(connection: &Connection, query: impl IntoFields) -> BoxFuture<'_, Result<u64>> {
        let query = query.into_fields();

        async move { Entity::count(connection, Self::model(), query).await }.boxed()
    }

    /// Deletes matching documents without loading them.
    fn remove(
        connection: &Connection,
        query: impl IntoFields,
        options: DeleteOptions,
    ) -> BoxFuture<'_, Result<u64>> {
        let query = query.into_fields();

        async move { Entity::remove(connection, Self::model(), query, options).await }.boxed()
    }
}

impl<M: Model + Default> Finder for M {}
