use crate::{Connection, DEFAULT_DEPTH, Entity, Result, Value};
use mongodb::bson::Bson;

/// The result of a find: an ordered, restartable sequence of entities (or
/// plain values).
///
/// Iterating yields clones and advances an internal position;
/// [`Entities::rewind`] starts over.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Entities {
    items: Vec<Value>,
    position: usize,
}

impl Entities {
    pub fn new(items: Vec<Value>) -> Self {
        Self { items, position: 0 }
    }

    pub fn rewind(&mut self) {
        self.position = 0;
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.items.get(index)
    }

    pub fn first(&self) -> Option<&Value> {
        self.items.first()
    }

    /// The entity at `index`, if that item is one.
    pub fn entity(&self, index: usize) -> Option<&Entity> {
        self.get(index).and_then(Value::as_entity)
    }

    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.items.iter().filter_map(Value::as_entity)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn into_vec(self) -> Vec<Value> {
        self.items
    }

    /// Converts every entity with [`Entity::to_array`] at the default depth;
    /// other items are converted as they are.
    pub async fn to_array(&self, connection: &Connection) -> Result<Vec<Bson>> {
        let mut array = Vec::with_capacity(self.items.len());

        for item in &self.items {
            let bson = match item {
                Value::Entity(entity) => {
                    Bson::Document(entity.to_array(connection, DEFAULT_DEPTH).await?)
                }
                other => other.clone().into_bson()?,
            };

            array.push(bson);
        }

        Ok(array)
    }
}

impl Iterator for Entities {
    type Item = Value;

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.items.get(self.position).cloned()?;
        self.position += 1;
        Some(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.items.len().saturating_sub(self.position);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Entities {}

impl From<Vec<Entity>> for Entities {
    fn from(value: Vec<Entity>) -> Self {
        value.into_iter().collect()
    }
}

impl From<Vec<Value>> for Entities {
    fn from(value: Vec<Value>) -> Self {
        Self::new(value)
    }
}

impl FromIterator<Entity> for Entities {
    fn from_iter<T: IntoIterator<Item = Entity>>(iter: T) -> Self {
        Self::new(iter.into_iter().map(Value::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ConnectionOptions, Model, store::MemoryStore, value::IntoFields};
    use mongodb::bson::{doc, oid::ObjectId};
    use std::sync::Arc;

    struct Tags;

    impl Model for Tags {
        fn collection(&self) -> Option<&str> {
            Some("tags")
        }
    }

    fn tag(name: &str) -> Entity {
        Entity::hydrate(Arc::new(Tags), doc! { "name": name }.into_fields()).unwrap()
    }

    #[test]
    fn iterates_and_rewinds() {
        let mut entities: Entities = vec![tag("rust"), tag("mongo")].into();

        assert_eq!(entities.len(), 2);
        assert_eq!(
            entities.next().and_then(|value| value.as_entity().cloned()),
            Some(tag("rust"))
        );
        assert_eq!(entities.position(), 1);
        assert_eq!(entities.by_ref().count(), 1);
        assert_eq!(entities.next(), None);

        entities.rewind();

        let names: Vec<_> = entities
            .map(|value| value.as_entity().unwrap().raw("name").cloned().unwrap())
            .collect();
        assert_eq!(names, [Value::from("rust"), Value::from("mongo")]);
    }

    #[test]
    fn indexed_access() {
        let entities: Entities = vec![tag("rust")].into();

        assert_eq!(entities.entity(0), Some(&tag("rust")));
        assert_eq!(entities.first(), entities.get(0));
        assert!(entities.get(1).is_none());
        assert_eq!(entities.entities().count(), 1);
    }

    #[tokio::test]
    async fn to_array_renders_entities_and_keeps_other_values() {
        let connection =
            Connection::with_store(Arc::new(MemoryStore::new()), ConnectionOptions::new());
        let id = ObjectId::new();

        let entities = Entities::new(vec![
            Value::from(Entity::hydrate(Arc::new(Tags), doc! { "_id": id }.into_fields()).unwrap()),
            Value::from(3),
        ]);

        assert_eq!(
            entities.to_array(&connection).await.unwrap(),
            [Bson::Document(doc! { "_id": id.to_hex() }), Bson::Int32(3)]
        );
    }
}
