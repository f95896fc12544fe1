//! The document-store seam.
//!
//! [`Connection`](crate::Connection) never talks to a driver directly; it
//! goes through a [`Store`]. [`mongo::MongoStore`] is backed by the official
//! driver, [`memory::MemoryStore`] keeps collections in process.

use crate::{DeleteOptions, FindOptions, Result, UpdateOptions, reference::DbRef};
use futures_util::future::BoxFuture;
use mongodb::bson::{Bson, Document};

pub mod memory;
pub mod mongo;

pub use memory::MemoryStore;
pub use mongo::MongoStore;

/// The operations the mapper needs from a document database client.
pub trait Store: Send + Sync + 'static {
    fn find<'a>(
        &'a self,
        collection: &'a str,
        filter: Document,
        options: FindOptions,
    ) -> BoxFuture<'a, Result<Vec<Document>>>;

    fn find_one<'a>(
        &'a self,
        collection: &'a str,
        filter: Document,
        options: FindOptions,
    ) -> BoxFuture<'a, Result<Option<Document>>>;

    /// Inserts `document` and returns its `_id`.
    fn insert_one<'a>(
        &'a self,
        collection: &'a str,
        document: Document,
    ) -> BoxFuture<'a, Result<Bson>>;

    /// Applies an operator update (`$set`, `$push`, ...) or, when `update`
    /// has no operator keys, replaces the matched document. Returns the
    /// number of documents matched or upserted.
    fn update<'a>(
        &'a self,
        collection: &'a str,
        filter: Document,
        update: Document,
        options: UpdateOptions,
    ) -> BoxFuture<'a, Result<u64>>;

    /// Returns the number of documents deleted.
    fn delete<'a>(
        &'a self,
        collection: &'a str,
        filter: Document,
        options: DeleteOptions,
    ) -> BoxFuture<'a, Result<u64>>;

    /// Atomically applies `update` to the first match (inserting one when
    /// `upsert` is set and nothing matches) and returns the document as it
    /// is after the update.
    fn find_one_and_update<'a>(
        &'a self,
        collection: &'a str,
        filter: Document,
        update: Document,
        upsert: bool,
    ) -> BoxFuture<'a, Result<Option<Document>>>;

    fn count<'a>(&'a self, collection: &'a str, filter: Document) -> BoxFuture<'a, Result<u64>>;
}

/// Whether every key of `document` is an update or query operator.
pub fn is_operator_document(document: &Document) -> bool {
    !document.is_empty()
        && document.keys().all(|key| key.starts_with('$'))
        && !DbRef::is_ref_document(document)
}
