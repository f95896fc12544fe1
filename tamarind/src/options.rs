use mongodb::bson::Document;

/// Options accepted by `find` and `find_one`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FindOptions {
    /// Projection document, e.g. `{ "name": 1 }`.
    pub fields: Option<Document>,
    pub limit: Option<i64>,
    pub skip: Option<u64>,
    pub sort: Option<Document>,
}

impl FindOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fields(mut self, fields: Document) -> Self {
        self.fields = Some(fields);
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn sort(mut self, sort: Document) -> Self {
        self.sort = Some(sort);
        self
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UpdateOptions {
    /// Update every matching document instead of the first one.
    pub multi: bool,
    pub upsert: bool,
}

impl UpdateOptions {
    pub fn multi() -> Self {
        Self {
            multi: true,
            ..Self::default()
        }
    }

    pub fn upsert() -> Self {
        Self {
            upsert: true,
            ..Self::default()
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DeleteOptions {
    /// Delete every matching document instead of the first one.
    pub multi: bool,
}

impl DeleteOptions {
    pub fn multi() -> Self {
        Self { multi: true }
    }
}

/// Options for [`Entity::push`](crate::Entity::push).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PushOptions {
    /// Splice the values into the target array one by one (`$each`).
    /// When false the values are appended as a single nested array.
    pub each: bool,
}

impl Default for PushOptions {
    fn default() -> Self {
        Self { each: true }
    }
}

impl PushOptions {
    pub fn nested() -> Self {
        Self { each: false }
    }
}
