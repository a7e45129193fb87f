//! Schema validation and reference resolution.
//!
//! Validation runs in four passes over a document:
//!
//! 1. every supplied field must be declared by the schema,
//! 2. every supplied value must have its declared type,
//! 3. every absent required field is filled from its default or rejected,
//! 4. every present `via` field is replaced by the document it refers to.
//!
//! Passes 1-3 are pure and exposed as [`check`]. Pass 4 needs a
//! [`ReferenceResolver`], normally the [`StoreGateway`](crate::gateway::StoreGateway).
//!
//! Documents are taken by value and handed back only on success, so a failed
//! validation never leaves a partially defaulted document behind.

use async_trait::async_trait;
use bson::{Bson, Document};

use crate::{
    document::{reference_id, type_name},
    error::{DocCacheResult, SchemaError},
    schema::Schema,
};

/// Looks up the document a reference field points to.
#[async_trait]
pub trait ReferenceResolver: Send + Sync {
    /// Fetches the document with identifier `id` from `collection`, if it exists.
    async fn resolve_reference(&self, collection: &str, id: Bson) -> DocCacheResult<Option<Document>>;
}

#[async_trait]
impl<R> ReferenceResolver for &R
where
    R: ReferenceResolver + ?Sized,
{
    async fn resolve_reference(&self, collection: &str, id: Bson) -> DocCacheResult<Option<Document>> {
        (**self).resolve_reference(collection, id).await
    }
}

/// Runs the unknown-field, type and required/default passes.
///
/// # Errors
///
/// Returns the first [`SchemaError`] found, in pass order.
pub fn check(schema: &Schema, mut document: Document) -> Result<Document, SchemaError> {
    for key in document.keys() {
        if schema.rule(key).is_none() {
            return Err(SchemaError::UnknownField(key.clone()));
        }
    }

    for (key, value) in document.iter() {
        // Declared by the first pass.
        let Some(rule) = schema.rule(key) else { continue };

        if !rule.field_type.matches(value) {
            return Err(SchemaError::TypeMismatch {
                field: key.clone(),
                expected: rule.field_type.to_string(),
                found: type_name(value).to_string(),
            });
        }
    }

    for (name, rule) in schema.fields() {
        if !rule.required || document.contains_key(name) {
            continue;
        }

        match &rule.default {
            Some(default) => {
                document.insert(name, default.clone());
            }
            None => return Err(SchemaError::MissingRequiredField(name.to_string())),
        }
    }

    Ok(document)
}

/// Validates documents against a schema, resolving references through a resolver.
pub struct SchemaValidator<'a, R: ?Sized> {
    schema: &'a Schema,
    resolver: &'a R,
}

impl<'a, R> SchemaValidator<'a, R>
where
    R: ReferenceResolver + ?Sized,
{
    pub fn new(schema: &'a Schema, resolver: &'a R) -> Self {
        Self { schema, resolver }
    }

    /// Validates and normalizes `document`.
    ///
    /// A reference whose target does not exist is replaced by `null`.
    ///
    /// # Errors
    ///
    /// Returns a schema error from [`check`], or the resolver's error if a
    /// reference lookup fails.
    pub async fn validate(&self, document: Document) -> DocCacheResult<Document> {
        let mut document = check(self.schema, document)?;

        for (name, rule) in self.schema.fields() {
            let Some(collection) = rule.via.as_deref() else { continue };
            let Some(value) = document.get(name) else { continue };

            let id = reference_id(value);
            let resolved = self
                .resolver
                .resolve_reference(collection, id)
                .await?;

            tracing::debug!(field = name, collection, found = resolved.is_some(), "resolved reference");

            document.insert(name, resolved.map(Bson::Document).unwrap_or(Bson::Null));
        }

        Ok(document)
    }
}
