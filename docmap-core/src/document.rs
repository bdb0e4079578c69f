//! The generic document layer the mapper reads and writes.
//!
//! Documents are plain [`bson::Document`] values: insertion-ordered maps from
//! string keys to BSON values. This module holds the reserved keys, the
//! serialized form of a reference, and JSON conversions for documents.

use bson::{Bson, Document, de::deserialize_from_bson, ser::serialize_to_bson};
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, from_value, to_value};

use crate::error::{MappingError, MappingResult};

/// Key under which an entity's identity is stored.
pub const ID_KEY: &str = "_id";

/// Key carrying the discriminator of a polymorphic record or enum.
pub const DISCRIMINATOR_KEY: &str = "class_name";

/// Key carrying the variant name of an enum written in its discriminated form.
pub const ENUM_NAME_KEY: &str = "name";

/// Key of the discriminator inside a serialized [`ReferenceValue`].
pub const REFERENCE_DISCRIMINATOR_KEY: &str = "discriminator";

/// The serialized pointer written for references held in lists and maps.
///
/// A single reference field stores only the raw identity of its target. Inside a
/// list or a map each element is a `ReferenceValue` so that the target type can be
/// recovered without consulting the declaration.
///
/// # Example
///
/// ```ignore
/// // { "discriminator": "app::Customer", "id": "c1", "collection_name": "customer" }
/// let pointer = ReferenceValue::new("app::Customer", "c1", Some("customer".into()));
/// let document = pointer.to_document()?;
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceValue {
    pub discriminator: String,
    #[serde(default = "missing_id")]
    pub id: Bson,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection_name: Option<String>,
}

fn missing_id() -> Bson {
    Bson::Null
}

impl ReferenceValue {
    pub fn new(
        discriminator: impl Into<String>,
        id: impl Into<Bson>,
        collection_name: Option<String>,
    ) -> Self {
        Self {
            discriminator: discriminator.into(),
            id: id.into(),
            collection_name,
        }
    }

    /// Returns `true` when a document has the shape of a serialized reference.
    pub fn is_reference_document(document: &Document) -> bool {
        matches!(
            document.get(REFERENCE_DISCRIMINATOR_KEY),
            Some(Bson::String(_))
        )
    }

    /// Converts this pointer into its document form.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_document(&self) -> MappingResult<Document> {
        match serialize_to_bson(self)? {
            Bson::Document(document) => Ok(document),
            other => Err(MappingError::Serialization(format!(
                "reference serialized to {:?} instead of a document",
                other.element_type()
            ))),
        }
    }

    /// Reads a pointer back from its document form.
    ///
    /// # Errors
    ///
    /// Returns an error if the document does not have the reference shape.
    pub fn from_document(document: &Document) -> MappingResult<Self> {
        Ok(deserialize_from_bson(Bson::Document(document.clone()))?)
    }
}

/// Extension trait converting documents to and from JSON.
///
/// BSON types without a JSON counterpart use the extended JSON forms
/// (`{"$oid": ...}`, `{"$date": ...}`), which are recognised again on the way back.
pub trait DocumentJson: Sized {
    /// Converts this document to a JSON value.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    fn to_json(&self) -> MappingResult<JsonValue>;

    /// Creates a document from a JSON value.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is not a JSON object.
    fn from_json(value: JsonValue) -> MappingResult<Self>;
}

impl DocumentJson for Document {
    fn to_json(&self) -> MappingResult<JsonValue> {
        Ok(to_value(self)?)
    }

    fn from_json(value: JsonValue) -> MappingResult<Self> {
        Ok(from_value(value)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use pretty_assertions::assert_eq;

    #[test]
    fn reference_value_omits_absent_collection() {
        let pointer = ReferenceValue::new("app::Customer", "c1", None);
        let document = pointer.to_document().unwrap();
        assert_eq!(document, doc! { "discriminator": "app::Customer", "id": "c1" });
        assert_eq!(ReferenceValue::from_document(&document).unwrap(), pointer);
    }

    #[test]
    fn reference_value_without_id_reads_as_null() {
        let pointer =
            ReferenceValue::from_document(&doc! { "discriminator": "app::Customer" }).unwrap();
        assert_eq!(pointer.id, Bson::Null);
        assert!(ReferenceValue::is_reference_document(&doc! { "discriminator": "x" }));
        assert!(!ReferenceValue::is_reference_document(&doc! { "id": "x" }));
    }

    #[test]
    fn documents_cross_json() {
        let document = doc! { "name": "Ada", "tags": ["a", "b"], "nested": { "flag": true } };
        let json = document.to_json().unwrap();
        assert_eq!(json["name"], "Ada");
        assert_eq!(json["nested"]["flag"], true);
        assert_eq!(Document::from_json(json).unwrap(), document);
    }
}
