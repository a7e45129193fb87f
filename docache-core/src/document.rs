//! Dynamic document representation and payload helpers.
//!
//! Documents are untyped ordered maps ([`bson::Document`]) whose shape is only
//! constrained by a [`Schema`](crate::schema::Schema) at validation time. Every
//! payload entering the facade names its target collection in a
//! [`COLLECTION_FIELD`] entry, which is stripped here before anything reaches a store.

use bson::{Bson, oid::ObjectId};

use crate::error::{DocCacheError, DocCacheResult};

pub use bson::Document;

/// Name of the routing field identifying the target collection of a payload.
pub const COLLECTION_FIELD: &str = "collection";

/// Name of the identifier field of stored documents.
pub const ID_FIELD: &str = "_id";

/// Removes the [`COLLECTION_FIELD`] from a payload and returns it alongside the
/// remaining document.
///
/// # Errors
///
/// Returns [`DocCacheError::MissingCollection`] if the field is absent, empty, or
/// not a string.
pub fn split_collection(mut payload: Document) -> DocCacheResult<(String, Document)> {
    match payload.remove(COLLECTION_FIELD) {
        Some(Bson::String(name)) if !name.is_empty() => Ok((name, payload)),
        _ => Err(DocCacheError::MissingCollection),
    }
}

/// Removes a [`COLLECTION_FIELD`] from a secondary payload when present.
///
/// A secondary payload (the document of a find-or-create) may repeat the
/// collection of its query, but may not name a different one.
pub(crate) fn strip_collection(payload: &mut Document, collection: &str) -> DocCacheResult<()> {
    match payload.remove(COLLECTION_FIELD) {
        None => Ok(()),
        Some(Bson::String(name)) if name == collection => Ok(()),
        Some(other) => Err(DocCacheError::InvalidOptions(format!(
            "document targets collection {other} but the query targets {collection}"
        ))),
    }
}

/// Returns the runtime type name of a value, as used in validation errors.
pub fn type_name(value: &Bson) -> &'static str {
    match value {
        Bson::String(_) => "string",
        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) | Bson::Decimal128(_) => "number",
        Bson::Boolean(_) => "boolean",
        Bson::Document(_) => "object",
        Bson::Array(_) => "array",
        Bson::DateTime(_) => "date",
        Bson::ObjectId(_) => "objectId",
        Bson::Null | Bson::Undefined => "null",
        _ => "other",
    }
}

/// Interprets a reference value as a document identifier.
///
/// Strings holding a 24 digit hex ObjectId are converted to an [`ObjectId`]; every
/// other value is used as the identifier unchanged.
pub fn reference_id(value: &Bson) -> Bson {
    match value {
        Bson::String(raw) => ObjectId::parse_str(raw)
            .map(Bson::ObjectId)
            .unwrap_or_else(|_| value.clone()),
        _ => value.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn split_collection_strips_the_routing_field() {
        let (collection, rest) =
            split_collection(doc! { "collection": "users", "email": "a@b.com" }).unwrap();

        assert_eq!(collection, "users");
        assert_eq!(rest, doc! { "email": "a@b.com" });
    }

    #[test]
    fn split_collection_rejects_missing_or_non_string_names() {
        assert!(matches!(
            split_collection(doc! { "email": "a@b.com" }),
            Err(DocCacheError::MissingCollection)
        ));
        assert!(matches!(
            split_collection(doc! { "collection": 3 }),
            Err(DocCacheError::MissingCollection)
        ));
        assert!(matches!(
            split_collection(doc! { "collection": "" }),
            Err(DocCacheError::MissingCollection)
        ));
    }

    #[test]
    fn strip_collection_rejects_a_conflicting_target() {
        let mut same = doc! { "collection": "users", "a": 1 };
        strip_collection(&mut same, "users").unwrap();
        assert_eq!(same, doc! { "a": 1 });

        let mut other = doc! { "collection": "posts" };
        assert!(matches!(
            strip_collection(&mut other, "users"),
            Err(DocCacheError::InvalidOptions(_))
        ));
    }

    #[test]
    fn reference_id_parses_hex_object_ids_only() {
        let oid = ObjectId::new();

        assert_eq!(reference_id(&Bson::String(oid.to_hex())), Bson::ObjectId(oid));
        assert_eq!(reference_id(&Bson::String("alice".into())), Bson::String("alice".into()));
        assert_eq!(reference_id(&Bson::Int32(7)), Bson::Int32(7));
    }
}
