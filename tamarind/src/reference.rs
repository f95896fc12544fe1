use mongodb::bson::{Bson, Document, doc};
use std::fmt::{self, Display};

pub const REF_KEY: &str = "$ref";
pub const ID_KEY: &str = "$id";

/// A pointer to a document in another collection, stored in place of the
/// document itself.
///
/// On the wire a reference is the two-field document
/// `{ "$ref": <collection>, "$id": <id> }`. Any document with exactly those
/// two keys is read back as a reference rather than as an embedded document.
#[derive(Clone, Debug, PartialEq)]
pub struct DbRef {
    collection: String,
    id: Bson,
}

impl DbRef {
    pub fn new(collection: impl Into<String>, id: impl Into<Bson>) -> Self {
        Self {
            collection: collection.into(),
            id: id.into(),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn id(&self) -> &Bson {
        &self.id
    }

    /// Filter selecting the referenced document.
    pub fn filter(&self) -> Document {
        doc! { "_id": self.id.clone() }
    }

    pub fn is_ref_document(document: &Document) -> bool {
        document.len() == 2
            && matches!(document.get(REF_KEY), Some(Bson::String(_)))
            && document.contains_key(ID_KEY)
    }

    pub fn from_document(document: &Document) -> Option<Self> {
        if !Self::is_ref_document(document) {
            return None;
        }

        let collection = document.get_str(REF_KEY).ok()?;
        let id = document.get(ID_KEY)?;

        Some(Self::new(collection, id.clone()))
    }

    pub fn to_document(&self) -> Document {
        doc! {
            REF_KEY: self.collection.as_str(),
            ID_KEY: self.id.clone(),
        }
    }
}

impl From<DbRef> for Bson {
    fn from(value: DbRef) -> Self {
        Bson::Document(value.to_document())
    }
}

impl Display for DbRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.collection, self.id)
    }
}
