//! Filter evaluation for in-memory document matching.
//!
//! Filters are MongoDB-style documents. Supported forms:
//!
//! - `{ field: value }` equality; an array field matches if any element equals `value`
//! - `{ "a.b": value }` dotted paths into embedded documents
//! - `{ field: { $eq | $ne | $gt | $gte | $lt | $lte | $in | $nin | $exists: operand } }`
//! - `{ $and: [filter, ..] }`, `{ $or: [filter, ..] }`, `{ $nor: [filter, ..] }`
//!
//! Any other `$` operator is rejected rather than silently ignored.

use std::{cmp::Ordering, collections::HashMap};

use bson::{Bson, Document, datetime::DateTime, oid::ObjectId};

use docache_core::error::{DocCacheError, DocCacheResult};

/// Type-erased, comparable representation of BSON values.
///
/// Numeric types are normalized to f64.
#[derive(Debug)]
pub(crate) enum Comparable<'a> {
    Null,
    Bool(bool),
    Number(f64),
    DateTime(DateTime),
    ObjectId(ObjectId),
    String(&'a str),
    Array(Vec<Comparable<'a>>),
    Map(HashMap<&'a str, Comparable<'a>>),
}

impl<'a> From<&'a Bson> for Comparable<'a> {
    fn from(bson: &'a Bson) -> Self {
        match bson {
            Bson::Null => Comparable::Null,
            Bson::Boolean(value) => Comparable::Bool(*value),
            Bson::Int32(value) => Comparable::Number(*value as f64),
            Bson::Int64(value) => Comparable::Number(*value as f64),
            Bson::Double(value) => Comparable::Number(*value),
            Bson::DateTime(value) => Comparable::DateTime(*value),
            Bson::ObjectId(value) => Comparable::ObjectId(*value),
            Bson::String(value) => Comparable::String(value),
            Bson::Array(arr) => Comparable::Array(
                arr
                    .iter()
                    .map(Comparable::from)
                    .collect::<Vec<_>>()
            ),
            Bson::Document(doc) => Comparable::Map(
                doc
                    .iter()
                    .map(|(k, v)| (k.as_str(), Comparable::from(v)))
                    .collect::<HashMap<_, _>>()
            ),
            _ => Comparable::Null,
        }
    }
}

impl<'a> PartialEq for Comparable<'a> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => true,
            (Comparable::Bool(a), Comparable::Bool(b)) => a == b,
            (Comparable::Number(a), Comparable::Number(b)) => a == b,
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a == b,
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a == b,
            (Comparable::String(a), Comparable::String(b)) => a == b,
            (Comparable::Array(a), Comparable::Array(b)) => a == b,
            (Comparable::Map(a), Comparable::Map(b)) => a == b,
            _ => false,
        }
    }
}

impl<'a> PartialOrd for Comparable<'a> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Comparable::Bool(a), Comparable::Bool(b)) => a.partial_cmp(b),
            (Comparable::Number(a), Comparable::Number(b)) => a.partial_cmp(b),
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a.partial_cmp(b),
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a.partial_cmp(b),
            (Comparable::String(a), Comparable::String(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

/// Evaluates filters against a single document.
pub(crate) struct FilterEvaluator<'a> {
    document: &'a Document,
}

impl<'a> FilterEvaluator<'a> {
    pub fn new(document: &'a Document) -> Self {
        Self { document }
    }

    /// Returns `true` if the document satisfies every clause of `filter`.
    pub fn matches(&self, filter: &Document) -> DocCacheResult<bool> {
        for (key, condition) in filter {
            let matched = match key.as_str() {
                "$and" => self.visit_and(clauses(key, condition)?)?,
                "$or" => self.visit_or(clauses(key, condition)?)?,
                "$nor" => !self.visit_or(clauses(key, condition)?)?,
                op if op.starts_with('$') => return Err(unsupported(op)),
                field => self.visit_field(field, condition)?,
            };

            if !matched {
                return Ok(false);
            }
        }

        Ok(true)
    }

    /// Returns the documents of `documents` matching `filter`, in order.
    pub fn filter_documents(
        documents: impl IntoIterator<Item = &'a Document>,
        filter: &Document,
    ) -> DocCacheResult<Vec<&'a Document>> {
        let mut matched = Vec::new();

        for document in documents {
            if FilterEvaluator::new(document).matches(filter)? {
                matched.push(document);
            }
        }

        Ok(matched)
    }

    fn visit_and(&self, filters: Vec<&Document>) -> DocCacheResult<bool> {
        for filter in filters {
            if !self.matches(filter)? {
                return Ok(false);
            }
        }

        Ok(true)
    }

    fn visit_or(&self, filters: Vec<&Document>) -> DocCacheResult<bool> {
        for filter in filters {
            if self.matches(filter)? {
                return Ok(true);
            }
        }

        Ok(false)
    }

    fn visit_field(&self, field: &str, condition: &Bson) -> DocCacheResult<bool> {
        let value = lookup(self.document, field);

        match condition {
            Bson::Document(ops) if ops.keys().any(|k| k.starts_with('$')) => {
                for (op, operand) in ops {
                    if !visit_op(value, op, operand)? {
                        return Ok(false);
                    }
                }

                Ok(true)
            }
            literal => Ok(equals(value, literal)),
        }
    }
}

fn visit_op(value: Option<&Bson>, op: &str, operand: &Bson) -> DocCacheResult<bool> {
    match op {
        "$eq" => Ok(equals(value, operand)),
        "$ne" => Ok(!equals(value, operand)),
        "$gt" => Ok(compare(value, operand, |o| o == Ordering::Greater)),
        "$gte" => Ok(compare(value, operand, |o| o != Ordering::Less)),
        "$lt" => Ok(compare(value, operand, |o| o == Ordering::Less)),
        "$lte" => Ok(compare(value, operand, |o| o != Ordering::Greater)),
        "$in" => Ok(operand_array(op, operand)?
            .iter()
            .any(|candidate| equals(value, candidate))),
        "$nin" => Ok(!operand_array(op, operand)?
            .iter()
            .any(|candidate| equals(value, candidate))),
        "$exists" => Ok(value.is_some() == truthy(operand)),
        _ => Err(unsupported(op)),
    }
}

/// Resolves a possibly dotted path inside `document`.
fn lookup<'d>(document: &'d Document, path: &str) -> Option<&'d Bson> {
    let mut parts = path.split('.');
    let mut current = document.get(parts.next()?)?;

    for part in parts {
        current = current.as_document()?.get(part)?;
    }

    Some(current)
}

/// Equality with MongoDB semantics: a missing field equals `null`, and an
/// array field equals a scalar it contains.
fn equals(value: Option<&Bson>, expected: &Bson) -> bool {
    let expected_cmp = Comparable::from(expected);

    match value {
        None => expected_cmp == Comparable::Null,
        Some(Bson::Array(items)) if !matches!(expected, Bson::Array(_)) => items
            .iter()
            .any(|item| Comparable::from(item) == expected_cmp),
        Some(value) => Comparable::from(value) == expected_cmp,
    }
}

fn compare(value: Option<&Bson>, operand: &Bson, accept: impl Fn(Ordering) -> bool) -> bool {
    let operand = Comparable::from(operand);
    let check = |item: &Bson| {
        Comparable::from(item)
            .partial_cmp(&operand)
            .is_some_and(&accept)
    };

    match value {
        None => false,
        Some(Bson::Array(items)) => items.iter().any(check),
        Some(value) => check(value),
    }
}

fn truthy(value: &Bson) -> bool {
    match value {
        Bson::Boolean(flag) => *flag,
        Bson::Int32(n) => *n != 0,
        Bson::Int64(n) => *n != 0,
        Bson::Double(n) => *n != 0.0,
        Bson::Null => false,
        _ => true,
    }
}

fn clauses<'f>(op: &str, condition: &'f Bson) -> DocCacheResult<Vec<&'f Document>> {
    condition
        .as_array()
        .ok_or_else(|| DocCacheError::Store(format!("{op} expects an array of filters")))?
        .iter()
        .map(|clause| {
            clause
                .as_document()
                .ok_or_else(|| DocCacheError::Store(format!("{op} expects an array of filters")))
        })
        .collect()
}

fn operand_array<'o>(op: &str, operand: &'o Bson) -> DocCacheResult<&'o Vec<Bson>> {
    operand
        .as_array()
        .ok_or_else(|| DocCacheError::Store(format!("{op} expects an array")))
}

fn unsupported(op: &str) -> DocCacheError {
    DocCacheError::Store(format!("unsupported query operator '{op}'"))
}

/// Orders two documents by a sort specification such as `{ age: -1, name: 1 }`.
///
/// Missing fields and nulls sort before every other value.
pub(crate) fn compare_by(sort: &Document, a: &Document, b: &Document) -> Ordering {
    for (field, direction) in sort {
        let left = lookup(a, field).map(Comparable::from).unwrap_or(Comparable::Null);
        let right = lookup(b, field).map(Comparable::from).unwrap_or(Comparable::Null);

        let ordering = match (&left, &right) {
            (Comparable::Null, Comparable::Null) => Ordering::Equal,
            (Comparable::Null, _) => Ordering::Less,
            (_, Comparable::Null) => Ordering::Greater,
            _ => left.partial_cmp(&right).unwrap_or(Ordering::Equal),
        };
        let ordering = if descending(direction) { ordering.reverse() } else { ordering };

        if ordering != Ordering::Equal {
            return ordering;
        }
    }

    Ordering::Equal
}

fn descending(direction: &Bson) -> bool {
    match direction {
        Bson::Int32(n) => *n < 0,
        Bson::Int64(n) => *n < 0,
        Bson::Double(n) => *n < 0.0,
        Bson::String(s) => s.eq_ignore_ascii_case("desc") || s.eq_ignore_ascii_case("descending"),
        _ => false,
    }
}

/// Applies a top-level projection such as `{ name: 1 }` or `{ password: 0 }`.
///
/// Inclusion projections keep `_id` unless it is excluded explicitly.
pub(crate) fn project(projection: &Document, document: Document) -> Document {
    let including = projection
        .iter()
        .any(|(field, flag)| field != "_id" && truthy(flag));

    if including {
        let keep_id = projection.get("_id").is_none_or(truthy);

        document
            .into_iter()
            .filter(|(field, _)| {
                if field == "_id" {
                    keep_id
                } else {
                    projection.get(field).is_some_and(truthy)
                }
            })
            .collect()
    } else {
        document
            .into_iter()
            .filter(|(field, _)| projection.get(field).is_none_or(truthy))
            .collect()
    }
}
