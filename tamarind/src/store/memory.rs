//! In-process [`Store`] for tests and local development.
//!
//! Implements the subset of the `MongoDB` query and update language the
//! mapper issues: equality (with array membership), `$eq`, `$ne`, `$gt`,
//! `$gte`, `$lt`, `$lte`, `$in`, `$nin`, `$exists`, `$and`, `$or`, and the
//! `$set`, `$unset`, `$inc` and `$push` (with `$each`) update operators.

use super::{Store, is_operator_document};
use crate::{DeleteOptions, Error, FindOptions, Result, UpdateOptions, reference::DbRef};
use dashmap::DashMap;
use futures_util::{
    FutureExt,
    future::{self, BoxFuture},
};
use mongodb::bson::{Bson, Document, oid::ObjectId};
use std::cmp::Ordering;

#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: DashMap<String, Vec<Document>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every document currently stored in `collection`, in insertion order.
    pub fn documents(&self, collection: &str) -> Vec<Document> {
        self.collections
            .get(collection)
            .map(|documents| documents.clone())
            .unwrap_or_default()
    }

    pub fn clear(&self) {
        self.collections.clear();
    }

    fn find_sync(
        &self,
        collection: &str,
        filter: &Document,
        options: &FindOptions,
    ) -> Result<Vec<Document>> {
        let mut matched = match self.collections.get(collection) {
            Some(documents) => documents
                .iter()
                .filter_map(|document| match matches(document, filter) {
                    Ok(true) => Some(Ok(document.clone())),
                    Ok(false) => None,
                    Err(err) => Some(Err(err)),
                })
                .collect::<Result<Vec<_>>>()?,
            None => vec![],
        };

        if let Some(sort) = &options.sort {
            matched.sort_by(|a, b| compare_by(a, b, sort));
        }

        let skip = options
            .skip
            .map_or(0, |skip| usize::try_from(skip).unwrap_or(usize::MAX));

        let limit = match options.limit {
            Some(limit) if limit != 0 => usize::try_from(limit.unsigned_abs()).unwrap_or(usize::MAX),
            _ => usize::MAX,
        };

        Ok(matched
            .into_iter()
            .skip(skip)
            .take(limit)
            .map(|document| match &options.fields {
                Some(projection) => project(document, projection),
                None => document,
            })
            .collect())
    }

    fn insert_sync(&self, collection: &str, mut document: Document) -> Result<Bson> {
        let id = document
            .entry("_id".to_owned())
            .or_insert_with(|| Bson::ObjectId(ObjectId::new()))
            .clone();

        let mut documents = self.collections.entry(collection.to_owned()).or_default();

        if documents
            .iter()
            .any(|existing| existing.get("_id") == Some(&id))
        {
            return Err(Error::invalid_operation(format!(
                "duplicate key `_id: {id}` in collection `{collection}`"
            )));
        }

        documents.push(document);

        Ok(id)
    }

    /// Updates the matched documents and returns the positions touched.
    fn update_sync(
        &self,
        collection: &str,
        filter: &Document,
        update: &Document,
        options: UpdateOptions,
    ) -> Result<Vec<usize>> {
        let replacement = !is_operator_document(update);

        let mut documents = self.collections.entry(collection.to_owned()).or_default();

        let mut touched = vec![];

        for (position, document) in documents.iter_mut().enumerate() {
            if !matches(document, filter)? {
                continue;
            }

            if replacement {
                replace(document, update);
            } else {
                apply_update(document, update)?;
            }

            touched.push(position);

            if !options.multi || replacement {
                break;
            }
        }

        if touched.is_empty() && options.upsert {
            let mut document = if replacement {
                update.clone()
            } else {
                let mut seeded = seed_from_filter(filter);
                apply_update(&mut seeded, update)?;
                seeded
            };

            if !document.contains_key("_id") {
                let id = filter
                    .get("_id")
                    .filter(|id| !matches!(id, Bson::Document(_)))
                    .cloned()
                    .unwrap_or_else(|| Bson::ObjectId(ObjectId::new()));
                document.insert("_id", id);
            }

            documents.push(document);
            touched.push(documents.len() - 1);
        }

        Ok(touched)
    }

    fn delete_sync(
        &self,
        collection: &str,
        filter: &Document,
        options: DeleteOptions,
    ) -> Result<u64> {
        let Some(mut documents) = self.collections.get_mut(collection) else {
            return Ok(0);
        };

        let mut deleted = 0;
        let mut index = 0;

        while index < documents.len() {
            if matches(&documents[index], filter)? {
                documents.remove(index);
                deleted += 1;

                if !options.multi {
                    break;
                }
            } else {
                index += 1;
            }
        }

        Ok(deleted)
    }

    fn find_one_and_update_sync(
        &self,
        collection: &str,
        filter: &Document,
        update: &Document,
        upsert: bool,
    ) -> Result<Option<Document>> {
        let options = UpdateOptions {
            multi: false,
            upsert,
        };

        let touched = self.update_sync(collection, filter, update, options)?;

        Ok(touched.first().and_then(|position| {
            self.collections
                .get(collection)
                .and_then(|documents| documents.get(*position).cloned())
        }))
    }
}

impl Store for MemoryStore {
    fn find<'a>(
        &'a self,
        collection: &'a str,
        filter: Document,
        options: FindOptions,
    ) -> BoxFuture<'a, Result<Vec<Document>>> {
        future::ready(self.find_sync(collection, &filter, &options)).boxed()
    }

    fn find_one<'a>(
        &'a self,
        collection: &'a str,
        filter: Document,
        options: FindOptions,
    ) -> BoxFuture<'a, Result<Option<Document>>> {
        let options = FindOptions {
            limit: Some(1),
            ..options
        };

        let result = self
            .find_sync(collection, &filter, &options)
            .map(|documents| documents.into_iter().next());

        future::ready(result).boxed()
    }

    fn insert_one<'a>(
        &'a self,
        collection: &'a str,
        document: Document,
    ) -> BoxFuture<'a, Result<Bson>> {
        future::ready(self.insert_sync(collection, document)).boxed()
    }

    fn update<'a>(
        &'a self,
        collection: &'a str,
        filter: Document,
        update: Document,
        options: UpdateOptions,
    ) -> BoxFuture<'a, Result<u64>> {
        let result = self
            .update_sync(collection, &filter, &update, options)
            .map(|touched| touched.len() as u64);

        future::ready(result).boxed()
    }

    fn delete<'a>(
        &'a self,
        collection: &'a str,
        filter: Document,
        options: DeleteOptions,
    ) -> BoxFuture<'a, Result<u64>> {
        future::ready(self.delete_sync(collection, &filter, options)).boxed()
    }

    fn find_one_and_update<'a>(
        &'a self,
        collection: &'a str,
        filter: Document,
        update: Document,
        upsert: bool,
    ) -> BoxFuture<'a, Result<Option<Document>>> {
        future::ready(self.find_one_and_update_sync(collection, &filter, &update, upsert)).boxed()
    }

    fn count<'a>(&'a self, collection: &'a str, filter: Document) -> BoxFuture<'a, Result<u64>> {
        let result = self
            .find_sync(collection, &filter, &FindOptions::default())
            .map(|documents| documents.len() as u64);

        future::ready(result).boxed()
    }
}

fn lookup<'a>(document: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut segments = path.split('.');
    let mut current = document.get(segments.next()?)?;

    for segment in segments {
        current = match current {
            Bson::Document(inner) => inner.get(segment)?,
            Bson::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }

    Some(current)
}

fn matches(document: &Document, filter: &Document) -> Result<bool> {
    for (key, condition) in filter {
        let matched = match key.as_str() {
            "$and" => all_of(document, condition)?.iter().all(|matched| *matched),
            "$or" => all_of(document, condition)?.iter().any(|matched| *matched),
            operator if operator.starts_with('$') => {
                return Err(Error::invalid_operation(format!(
                    "unsupported top-level operator `{operator}`"
                )));
            }
            path => matches_condition(lookup(document, path), condition)?,
        };

        if !matched {
            return Ok(false);
        }
    }

    Ok(true)
}

fn all_of(document: &Document, clauses: &Bson) -> Result<Vec<bool>> {
    let Bson::Array(clauses) = clauses else {
        return Err(Error::invalid_operation("`$and`/`$or` expect an array"));
    };

    clauses
        .iter()
        .map(|clause| match clause {
            Bson::Document(clause) => matches(document, clause),
            _ => Err(Error::invalid_operation("`$and`/`$or` clauses must be documents")),
        })
        .collect()
}

fn matches_condition(value: Option<&Bson>, condition: &Bson) -> Result<bool> {
    let Bson::Document(operators) = condition else {
        return Ok(equals_or_contains(value, condition));
    };

    if !is_operator_document(operators) {
        return Ok(equals_or_contains(value, condition));
    }

    for (operator, operand) in operators {
        let matched = match operator.as_str() {
            "$eq" => equals_or_contains(value, operand),
            "$ne" => !equals_or_contains(value, operand),
            "$gt" => ordered(value, operand, |ordering| ordering.is_gt()),
            "$gte" => ordered(value, operand, |ordering| ordering.is_ge()),
            "$lt" => ordered(value, operand, |ordering| ordering.is_lt()),
            "$lte" => ordered(value, operand, |ordering| ordering.is_le()),
            "$in" => in_list(value, operand)?,
            "$nin" => !in_list(value, operand)?,
            "$exists" => {
                let should_exist = match operand {
                    Bson::Boolean(flag) => *flag,
                    other => truthy(other),
                };
                value.is_some() == should_exist
            }
            other => {
                return Err(Error::invalid_operation(format!(
                    "unsupported query operator `{other}`"
                )));
            }
        };

        if !matched {
            return Ok(false);
        }
    }

    Ok(true)
}

fn in_list(value: Option<&Bson>, operand: &Bson) -> Result<bool> {
    let Bson::Array(candidates) = operand else {
        return Err(Error::invalid_operation("`$in`/`$nin` expect an array"));
    };

    Ok(candidates
        .iter()
        .any(|candidate| equals_or_contains(value, candidate)))
}

fn equals_or_contains(value: Option<&Bson>, expected: &Bson) -> bool {
    match value {
        None => matches!(expected, Bson::Null),
        Some(Bson::Array(items)) if !matches!(expected, Bson::Array(_)) => {
            items.iter().any(|item| equals(item, expected))
        }
        Some(value) => equals(value, expected),
    }
}

fn equals(a: &Bson, b: &Bson) -> bool {
    match (as_number(a), as_number(b)) {
        (Some(a), Some(b)) => a == b,
        _ => a == b,
    }
}

fn ordered(value: Option<&Bson>, operand: &Bson, accept: impl Fn(Ordering) -> bool) -> bool {
    value
        .and_then(|value| compare(value, operand))
        .is_some_and(accept)
}

#[allow(clippy::cast_precision_loss)]
fn as_number(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(value) => Some(f64::from(*value)),
        Bson::Int64(value) => Some(*value as f64),
        Bson::Double(value) => Some(*value),
        _ => None,
    }
}

fn truthy(value: &Bson) -> bool {
    match value {
        Bson::Boolean(flag) => *flag,
        Bson::Null => false,
        other => as_number(other).is_none_or(|number| number != 0.0),
    }
}

fn compare(a: &Bson, b: &Bson) -> Option<Ordering> {
    if let (Some(a), Some(b)) = (as_number(a), as_number(b)) {
        return a.partial_cmp(&b);
    }

    match (a, b) {
        (Bson::String(a), Bson::String(b)) => Some(a.cmp(b)),
        (Bson::DateTime(a), Bson::DateTime(b)) => Some(a.cmp(b)),
        (Bson::ObjectId(a), Bson::ObjectId(b)) => Some(a.cmp(b)),
        (Bson::Boolean(a), Bson::Boolean(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

fn compare_by(a: &Document, b: &Document, sort: &Document) -> Ordering {
    for (path, direction) in sort {
        let ordering = match (lookup(a, path), lookup(b, path)) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(a), Some(b)) => compare(a, b).unwrap_or(Ordering::Equal),
        };

        let ordering = if as_number(direction).is_some_and(|direction| direction < 0.0) {
            ordering.reverse()
        } else {
            ordering
        };

        if ordering.is_ne() {
            return ordering;
        }
    }

    Ordering::Equal
}

fn project(document: Document, projection: &Document) -> Document {
    let include_id = projection.get("_id").is_none_or(truthy);

    let inclusive = projection
        .iter()
        .any(|(key, flag)| key != "_id" && truthy(flag));

    if inclusive {
        document
            .into_iter()
            .filter(|(key, _)| {
                if key == "_id" {
                    include_id
                } else {
                    projection.get(key).is_some_and(truthy)
                }
            })
            .collect()
    } else {
        document
            .into_iter()
            .filter(|(key, _)| {
                if key == "_id" {
                    include_id
                } else {
                    projection.get(key).is_none_or(truthy)
                }
            })
            .collect()
    }
}

fn replace(document: &mut Document, replacement: &Document) {
    let id = document.get("_id").cloned();

    *document = replacement.clone();

    if let Some(id) = id {
        document.insert("_id", id);
    }
}

fn seed_from_filter(filter: &Document) -> Document {
    filter
        .iter()
        .filter(|(key, condition)| {
            !key.starts_with('$')
                && !key.contains('.')
                && match condition {
                    Bson::Document(inner) => {
                        !is_operator_document(inner) || DbRef::is_ref_document(inner)
                    }
                    _ => true,
                }
        })
        .map(|(key, condition)| (key.clone(), condition.clone()))
        .collect()
}

fn apply_update(document: &mut Document, update: &Document) -> Result<()> {
    for (operator, fields) in update {
        let Bson::Document(fields) = fields else {
            return Err(Error::invalid_operation(format!(
                "`{operator}` expects a document"
            )));
        };

        for (path, value) in fields {
            match operator.as_str() {
                "$set" => set_path(document, path, value.clone())?,
                "$unset" => unset_path(document, path),
                "$inc" => increment(document, path, value)?,
                "$push" => push(document, path, value)?,
                other => {
                    return Err(Error::invalid_operation(format!(
                        "unsupported update operator `{other}`"
                    )));
                }
            }
        }
    }

    Ok(())
}

fn parent_mut<'a>(document: &'a mut Document, path: &'a str) -> Result<(&'a mut Document, &'a str)> {
    let Some((head, rest)) = path.split_once('.') else {
        return Ok((document, path));
    };

    let entry = document
        .entry(head.to_owned())
        .or_insert_with(|| Bson::Document(Document::new()));

    match entry {
        Bson::Document(inner) => parent_mut(inner, rest),
        _ => Err(Error::invalid_operation(format!(
            "cannot create field `{rest}` inside non-document `{head}`"
        ))),
    }
}

fn set_path(document: &mut Document, path: &str, value: Bson) -> Result<()> {
    let (parent, key) = parent_mut(document, path)?;
    parent.insert(key, value);
    Ok(())
}

fn unset_path(document: &mut Document, path: &str) {
    match path.split_once('.') {
        None => {
            document.remove(path);
        }
        Some((head, rest)) => {
            if let Some(Bson::Document(inner)) = document.get_mut(head) {
                unset_path(inner, rest);
            }
        }
    }
}

fn increment(document: &mut Document, path: &str, by: &Bson) -> Result<()> {
    let (parent, key) = parent_mut(document, path)?;

    let next = match (parent.get(key), by) {
        (None, by) => by.clone(),
        (Some(Bson::Int32(current)), Bson::Int32(by)) => Bson::Int32(current + by),
        (Some(Bson::Int32(current)), Bson::Int64(by)) => Bson::Int64(i64::from(*current) + by),
        (Some(Bson::Int64(current)), Bson::Int32(by)) => Bson::Int64(current + i64::from(*by)),
        (Some(Bson::Int64(current)), Bson::Int64(by)) => Bson::Int64(current + by),
        (Some(current), by) => match (as_number(current), as_number(by)) {
            (Some(current), Some(by)) => Bson::Double(current + by),
            _ => {
                return Err(Error::invalid_operation(format!(
                    "cannot `$inc` non-numeric field `{path}`"
                )));
            }
        },
    };

    parent.insert(key, next);

    Ok(())
}

fn push(document: &mut Document, path: &str, value: &Bson) -> Result<()> {
    let items = match value {
        Bson::Document(modifiers) if modifiers.contains_key("$each") => {
            match modifiers.get("$each") {
                Some(Bson::Array(items)) => items.clone(),
                _ => return Err(Error::invalid_operation("`$each` expects an array")),
            }
        }
        single => vec![single.clone()],
    };

    let (parent, key) = parent_mut(document, path)?;

    match parent
        .entry(key.to_owned())
        .or_insert_with(|| Bson::Array(vec![]))
    {
        Bson::Array(array) => {
            array.extend(items);
            Ok(())
        }
        _ => Err(Error::invalid_operation(format!(
            "`$push` target `{path}` is not an array"
        ))),
    }
}
