//! Declarative schema definitions.
//!
//! A [`Schema`] maps field names to [`FieldRule`]s. Rules can be written in full
//! form or, when no modifiers are needed, as a bare type name:
//!
//! ```ignore
//! let schema = Schema::from_json(r#"{
//!     "email": "string",
//!     "password": { "type": "string", "required": true, "default": "x" },
//!     "author": { "type": "string", "via": "users" }
//! }"#)?;
//! ```

use std::{collections::BTreeMap, fmt, str::FromStr};

use bson::{Bson, Document, de::deserialize_from_document};
use serde::{Deserialize, Serialize};

use crate::error::{DocCacheResult, SchemaError};

/// Primitive value types a field can be declared with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum FieldType {
    String,
    /// Any numeric value: int32, int64, double or decimal128.
    Number,
    Boolean,
    /// An embedded document.
    Object,
    Array,
    Date,
    ObjectId,
    Null,
    /// Accepts every value.
    Any,
}

impl FieldType {
    /// Returns the canonical name of this type.
    pub fn name(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
            FieldType::Object => "object",
            FieldType::Array => "array",
            FieldType::Date => "date",
            FieldType::ObjectId => "objectId",
            FieldType::Null => "null",
            FieldType::Any => "any",
        }
    }

    /// Returns `true` if `value` has this type at runtime.
    pub fn matches(&self, value: &Bson) -> bool {
        match self {
            FieldType::String => matches!(value, Bson::String(_)),
            FieldType::Number => matches!(
                value,
                Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) | Bson::Decimal128(_)
            ),
            FieldType::Boolean => matches!(value, Bson::Boolean(_)),
            FieldType::Object => matches!(value, Bson::Document(_)),
            FieldType::Array => matches!(value, Bson::Array(_)),
            FieldType::Date => matches!(value, Bson::DateTime(_)),
            FieldType::ObjectId => matches!(value, Bson::ObjectId(_)),
            FieldType::Null => matches!(value, Bson::Null),
            FieldType::Any => true,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FieldType {
    type Err = SchemaError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name.to_ascii_lowercase().as_str() {
            "string" => Ok(FieldType::String),
            "number" | "int" | "integer" | "float" | "double" => Ok(FieldType::Number),
            "boolean" | "bool" => Ok(FieldType::Boolean),
            "object" => Ok(FieldType::Object),
            "array" => Ok(FieldType::Array),
            "date" => Ok(FieldType::Date),
            "objectid" | "oid" => Ok(FieldType::ObjectId),
            "null" => Ok(FieldType::Null),
            "any" => Ok(FieldType::Any),
            _ => Err(SchemaError::InvalidSchema(format!("unknown field type '{name}'"))),
        }
    }
}

impl TryFrom<String> for FieldType {
    type Error = SchemaError;

    fn try_from(name: String) -> Result<Self, Self::Error> {
        name.parse()
    }
}

impl From<FieldType> for String {
    fn from(field_type: FieldType) -> Self {
        field_type.name().to_string()
    }
}

/// Validation rule for a single field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawFieldRule")]
pub struct FieldRule {
    /// The declared value type.
    #[serde(rename = "type")]
    pub field_type: FieldType,
    /// Whether the field must be present after defaults are applied.
    #[serde(default)]
    pub required: bool,
    /// Value filled in when a required field is absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Bson>,
    /// Collection the field's value refers to by `_id`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub via: Option<String>,
}

impl FieldRule {
    /// Creates an optional rule of the given type without modifiers.
    pub fn new(field_type: FieldType) -> Self {
        Self {
            field_type,
            required: false,
            default: None,
            via: None,
        }
    }

    /// Marks the field as required.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Declares the value used when the required field is absent.
    pub fn with_default(mut self, default: impl Into<Bson>) -> Self {
        self.default = Some(default.into());
        self
    }

    /// Declares the field as a reference into `collection`.
    pub fn via(mut self, collection: impl Into<String>) -> Self {
        self.via = Some(collection.into());
        self
    }
}

impl From<FieldType> for FieldRule {
    fn from(field_type: FieldType) -> Self {
        FieldRule::new(field_type)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawFieldRule {
    Short(FieldType),
    Full {
        #[serde(rename = "type")]
        field_type: FieldType,
        #[serde(default)]
        required: bool,
        #[serde(default)]
        default: Option<Bson>,
        #[serde(default)]
        via: Option<String>,
    },
}

impl From<RawFieldRule> for FieldRule {
    fn from(raw: RawFieldRule) -> Self {
        match raw {
            RawFieldRule::Short(field_type) => FieldRule::new(field_type),
            RawFieldRule::Full { field_type, required, default, via } => FieldRule {
                field_type,
                required,
                default,
                via,
            },
        }
    }
}

/// A schema definition: field name to [`FieldRule`].
///
/// Schemas are immutable once built. Construction rejects defaults whose type
/// disagrees with their rule and references naming an empty collection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<String, FieldRule>", into = "BTreeMap<String, FieldRule>")]
pub struct Schema {
    fields: BTreeMap<String, FieldRule>,
}

impl Schema {
    /// Creates a schema from a set of field rules.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::InvalidSchema`] if a rule is inconsistent.
    pub fn new<I, K>(fields: I) -> Result<Self, SchemaError>
    where
        I: IntoIterator<Item = (K, FieldRule)>,
        K: Into<String>,
    {
        let fields = fields
            .into_iter()
            .map(|(name, rule)| (name.into(), rule))
            .collect::<BTreeMap<_, _>>();

        for (name, rule) in &fields {
            if let Some(default) = &rule.default {
                if !rule.field_type.matches(default) {
                    return Err(SchemaError::InvalidSchema(format!(
                        "default for '{name}' is not a {}",
                        rule.field_type
                    )));
                }
            }

            if rule.via.as_deref().is_some_and(str::is_empty) {
                return Err(SchemaError::InvalidSchema(format!(
                    "reference for '{name}' names an empty collection"
                )));
            }
        }

        Ok(Self { fields })
    }

    /// Creates a builder for assembling a schema field by field.
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }

    /// Parses a schema from its JSON form.
    ///
    /// # Errors
    ///
    /// Returns [`DocCacheError::Serialization`](crate::error::DocCacheError::Serialization)
    /// if the text is not a valid schema.
    pub fn from_json(text: &str) -> DocCacheResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Returns the rule declared for `field`, if any.
    pub fn rule(&self, field: &str) -> Option<&FieldRule> {
        self.fields.get(field)
    }

    /// Iterates over every declared field and its rule.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldRule)> {
        self.fields.iter().map(|(name, rule)| (name.as_str(), rule))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl TryFrom<BTreeMap<String, FieldRule>> for Schema {
    type Error = SchemaError;

    fn try_from(fields: BTreeMap<String, FieldRule>) -> Result<Self, Self::Error> {
        Schema::new(fields)
    }
}

impl From<Schema> for BTreeMap<String, FieldRule> {
    fn from(schema: Schema) -> Self {
        schema.fields
    }
}

impl TryFrom<Document> for Schema {
    type Error = crate::error::DocCacheError;

    fn try_from(document: Document) -> Result<Self, Self::Error> {
        Ok(deserialize_from_document(document)?)
    }
}

/// Builder for [`Schema`].
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    fields: Vec<(String, FieldRule)>,
}

impl SchemaBuilder {
    /// Declares a field. A later declaration of the same name replaces the earlier one.
    pub fn field(mut self, name: impl Into<String>, rule: impl Into<FieldRule>) -> Self {
        self.fields.push((name.into(), rule.into()));
        self
    }

    /// Builds the schema.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::InvalidSchema`] if a rule is inconsistent.
    pub fn build(self) -> Result<Schema, SchemaError> {
        Schema::new(self.fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn parses_shorthand_and_full_rules() {
        let schema = Schema::from_json(
            r#"{
                "email": "string",
                "password": { "type": "string", "required": true, "default": "x" },
                "author": { "type": "string", "via": "users" }
            }"#,
        )
        .unwrap();

        assert_eq!(schema.len(), 3);
        assert_eq!(schema.rule("email"), Some(&FieldRule::new(FieldType::String)));
        assert_eq!(
            schema.rule("password"),
            Some(&FieldRule::new(FieldType::String).required().with_default("x"))
        );
        assert_eq!(schema.rule("author").and_then(|r| r.via.as_deref()), Some("users"));
    }

    #[test]
    fn parses_from_a_bson_document() {
        let schema = Schema::try_from(doc! {
            "age": { "type": "int", "required": true, "default": 0 },
            "admin": "bool",
        })
        .unwrap();

        assert_eq!(schema.rule("age").unwrap().field_type, FieldType::Number);
        assert_eq!(schema.rule("age").unwrap().default, Some(Bson::Int32(0)));
        assert_eq!(schema.rule("admin").unwrap().field_type, FieldType::Boolean);
    }

    #[test]
    fn rejects_unknown_type_names() {
        assert!(Schema::from_json(r#"{ "email": "text" }"#).is_err());
    }

    #[test]
    fn rejects_defaults_of_the_wrong_type() {
        let err = Schema::builder()
            .field("password", FieldRule::new(FieldType::String).required().with_default(5))
            .build()
            .unwrap_err();

        assert!(matches!(err, SchemaError::InvalidSchema(_)));
    }

    #[test]
    fn number_accepts_every_numeric_representation() {
        for value in [Bson::Int32(1), Bson::Int64(1), Bson::Double(1.5)] {
            assert!(FieldType::Number.matches(&value));
        }
        assert!(!FieldType::Number.matches(&Bson::String("1".into())));
        assert!(FieldType::Any.matches(&Bson::Null));
    }
}
