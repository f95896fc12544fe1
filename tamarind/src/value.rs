use crate::{Entities, Entity, Error, Result, reference::DbRef};
use mongodb::bson::{Bson, Document, oid::ObjectId};
use indexmap::IndexMap;

/// Field name → value mapping held by an [`Entity`]. Keeps insertion order,
/// as stored documents do.
pub type Fields = IndexMap<String, Value>;

/// A field value.
///
/// Raw BSON coming from the store is split into the variants the mapper
/// treats differently: references are resolved, entities are converted to
/// references before persisting, and documents and arrays are walked
/// recursively.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// Any BSON value other than a document or an array.
    Scalar(Bson),
    Document(Fields),
    Array(Vec<Value>),
    Reference(DbRef),
    Entity(Box<Entity>),
}

impl Value {
    pub const NULL: Value = Value::Scalar(Bson::Null);

    pub fn is_reference(&self) -> bool {
        matches!(self, Self::Reference(_))
    }

    pub fn as_scalar(&self) -> Option<&Bson> {
        match self {
            Self::Scalar(bson) => Some(bson),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        self.as_scalar().and_then(Bson::as_str)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self.as_scalar()? {
            Bson::Int32(value) => Some(i64::from(*value)),
            Bson::Int64(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        self.as_scalar().and_then(Bson::as_bool)
    }

    pub fn as_object_id(&self) -> Option<ObjectId> {
        self.as_scalar().and_then(Bson::as_object_id)
    }

    pub fn as_document(&self) -> Option<&Fields> {
        match self {
            Self::Document(fields) => Some(fields),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<&DbRef> {
        match self {
            Self::Reference(reference) => Some(reference),
            _ => None,
        }
    }

    pub fn as_entity(&self) -> Option<&Entity> {
        match self {
            Self::Entity(entity) => Some(entity),
            _ => None,
        }
    }

    /// Whether this value or anything nested in it is a reference.
    pub fn contains_reference(&self) -> bool {
        match self {
            Self::Reference(_) => true,
            Self::Array(items) => items.iter().any(Value::contains_reference),
            Self::Document(fields) => fields.values().any(Value::contains_reference),
            Self::Scalar(_) | Self::Entity(_) => false,
        }
    }

    /// Replaces every entity, however deeply nested, with a reference to it.
    pub fn into_reference_form(self) -> Result<Value> {
        let value = match self {
            Self::Entity(entity) => Self::Reference(entity.db_ref()?),
            Self::Array(items) => Self::Array(
                items
                    .into_iter()
                    .map(Value::into_reference_form)
                    .collect::<Result<_>>()?,
            ),
            Self::Document(fields) => Self::Document(
                fields
                    .into_iter()
                    .map(|(key, value)| Ok((key, value.into_reference_form()?)))
                    .collect::<Result<_>>()?,
            ),
            other => other,
        };

        Ok(value)
    }

    /// Converts to the BSON sent to the store. Entities are stored as
    /// references, so they must have an `_id`.
    pub fn into_bson(self) -> Result<Bson> {
        let bson = match self {
            Self::Scalar(bson) => bson,
            Self::Document(fields) => Bson::Document(fields_into_document(fields)?),
            Self::Array(items) => Bson::Array(
                items
                    .into_iter()
                    .map(Value::into_bson)
                    .collect::<Result<_>>()?,
            ),
            Self::Reference(reference) => reference.into(),
            Self::Entity(entity) => entity.db_ref()?.into(),
        };

        Ok(bson)
    }
}

impl From<Bson> for Value {
    fn from(value: Bson) -> Self {
        match value {
            Bson::Document(document) => document.into(),
            Bson::Array(items) => Self::Array(items.into_iter().map(Value::from).collect()),
            other => Self::Scalar(other),
        }
    }
}

impl From<Document> for Value {
    fn from(value: Document) -> Self {
        match DbRef::from_document(&value) {
            Some(reference) => Self::Reference(reference),
            None => Self::Document(fields_from_document(value)),
        }
    }
}

impl From<Fields> for Value {
    fn from(value: Fields) -> Self {
        Self::Document(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Self::Array(value)
    }
}

impl From<DbRef> for Value {
    fn from(value: DbRef) -> Self {
        Self::Reference(value)
    }
}

impl From<Entity> for Value {
    fn from(value: Entity) -> Self {
        Self::Entity(Box::new(value))
    }
}

impl From<Vec<Entity>> for Value {
    fn from(value: Vec<Entity>) -> Self {
        Self::Array(value.into_iter().map(Value::from).collect())
    }
}

impl From<Entities> for Value {
    fn from(value: Entities) -> Self {
        Self::Array(value.into_vec())
    }
}

macro_rules! impl_from_scalar {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(value: $ty) -> Self {
                    Self::Scalar(Bson::from(value))
                }
            }
        )*
    };
}

impl_from_scalar!(
    &str,
    String,
    bool,
    i32,
    i64,
    f64,
    ObjectId,
    mongodb::bson::DateTime,
);

/// Anything a mapping of fields can be built from.
pub trait IntoFields {
    fn into_fields(self) -> Fields;
}

impl IntoFields for Fields {
    fn into_fields(self) -> Fields {
        self
    }
}

impl IntoFields for Document {
    fn into_fields(self) -> Fields {
        fields_from_document(self)
    }
}

impl<K: Into<String>, V: Into<Value>, const N: usize> IntoFields for [(K, V); N] {
    fn into_fields(self) -> Fields {
        self.into_iter()
            .map(|(key, value)| (key.into(), value.into()))
            .collect()
    }
}

impl<K: Into<String>, V: Into<Value>> IntoFields for Vec<(K, V)> {
    fn into_fields(self) -> Fields {
        self.into_iter()
            .map(|(key, value)| (key.into(), value.into()))
            .collect()
    }
}

pub fn fields_from_document(document: Document) -> Fields {
    document
        .into_iter()
        .map(|(key, value)| (key, Value::from(value)))
        .collect()
}

pub fn fields_into_document(fields: Fields) -> Result<Document> {
    fields
        .into_iter()
        .map(|(key, value)| Ok((key, value.into_bson()?)))
        .collect()
}

/// Converts a query into the filter document sent to the store, replacing
/// entity values with references so related objects can be queried directly.
pub(crate) fn query_document(query: Fields) -> Result<Document> {
    query
        .into_iter()
        .map(|(key, value)| Ok((key, value.into_reference_form()?.into_bson()?)))
        .collect::<Result<Document, Error>>()
}

/// Keeps only the whitelisted keys.
pub fn filter_whitelist(fields: Fields, whitelist: &[&str]) -> Fields {
    fields
        .into_iter()
        .filter(|(key, _)| whitelist.contains(&key.as_str()))
        .collect()
}

/// Reads a dot-separated path (`"model.name"`) through nested documents.
pub fn lookup<'a>(fields: &'a Fields, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = fields.get(segments.next()?)?;

    for segment in segments {
        current = match current {
            Value::Document(inner) => inner.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }

    Some(current)
}

/// Writes `value` at a dot-separated path, creating intermediate documents
/// and keeping sibling keys of documents that already exist.
pub fn assign(fields: &mut Fields, path: &str, value: Value) {
    match path.split_once('.') {
        None => {
            fields.insert(path.to_owned(), value);
        }
        Some((head, rest)) => {
            let entry = fields
                .entry(head.to_owned())
                .or_insert_with(|| Value::Document(Fields::new()));

            if !matches!(entry, Value::Document(_)) {
                *entry = Value::Document(Fields::new());
            }

            if let Value::Document(inner) = entry {
                assign(inner, rest, value);
            }
        }
    }
}
