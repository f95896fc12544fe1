use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Failures raised by the mapper. Each one terminates the current operation;
/// "nothing matched" from a finder is not among them.
#[derive(Debug, Error)]
pub enum Error {
    /// The model declares no backing collection.
    #[error("model has no collection defined")]
    CollectionUndefined,

    /// `save` was called on a model that declares no whitelist.
    #[error("model for collection `{collection}` has an empty whitelist")]
    WhitelistEmpty { collection: String },

    /// `find_one_or_fail` matched nothing.
    #[error("no document found in collection `{collection}`")]
    NotFound { collection: String },

    /// The operation needs an `_id` the entity does not have yet.
    #[error("entity in collection `{collection}` has no `_id`")]
    MissingId { collection: String },

    /// A reference points at a collection with no registered model.
    #[error("class not found in classmap for `{collection}`")]
    ClassNotFound { collection: String },

    #[error("connection `{name}` has not been initialized")]
    ConnectionNotInitialized { name: String },

    /// Neither the options nor the connection string name a database.
    #[error("no database selected")]
    DatabaseUndefined,

    /// The counter document holds something other than an integer.
    #[error("sequence `{name}` is not an integer")]
    InvalidSequence { name: String },

    /// The store rejected a malformed filter or update.
    #[error("invalid operation: {message}")]
    InvalidOperation { message: String },

    #[error(transparent)]
    Store(#[from] mongodb::error::Error),
}

impl Error {
    pub(crate) fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }
}
