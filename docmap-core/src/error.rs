//! Error types and result types for mapping operations.
//!
//! Every fallible operation in the mapper returns [`MappingResult<T>`]. Declaration
//! problems surface the first time a type is described, conversion problems surface
//! while a document or record is being walked.

use std::fmt::Display;

use bson::error::Error as BsonError;
use serde_json::Error as SerdeJsonError;
use thiserror::Error;

/// Represents all possible errors raised while mapping records to documents and back.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MappingError {
    /// A field name did not match any declared field of the record type.
    #[error("Field {field} not found on {type_name}")]
    FieldNotFound { type_name: String, field: String },
    /// More than one field of a record type carries the identity directive.
    #[error("Type {0} declares more than one identity field")]
    AmbiguousIdentity(String),
    /// An operation that needs an identity field was given a type without one.
    #[error("Type {0} has no identity field")]
    MissingIdentity(String),
    /// The field directives of a type contradict each other.
    #[error("Invalid declaration of {type_name}: {reason}")]
    InvalidDeclaration { type_name: String, reason: String },
    /// A discriminator was read from a document but no type is registered under it.
    #[error("Unknown discriminator: {0}")]
    UnknownDiscriminator(String),
    /// Two different types tried to register the same discriminator.
    #[error("Discriminator {discriminator} is already registered to {existing}")]
    DuplicateDiscriminator { discriminator: String, existing: String },
    /// The stored identity could not be coerced to the declared identity type.
    #[error("Identity of {type_name} expected {expected}, found {actual}")]
    IdentityMismatch {
        type_name: String,
        expected: String,
        actual: String,
    },
    /// A value could not be assigned to a field of the declared type.
    #[error("Cannot assign {actual} to field {field}: expected {expected}")]
    Coercion {
        field: String,
        expected: String,
        actual: String,
    },
    /// A custom value was encountered but no converter is registered for its type.
    #[error("No converter registered for {0}")]
    MissingConverter(String),
    /// A reference had to be resolved or stored but no resolver is configured.
    #[error("No reference resolver configured")]
    NoReferenceResolver,
    /// A referenced record has no identity and auto-store is not enabled.
    #[error("Referenced {0} has no identity and auto_store is disabled")]
    ReferenceNotStored(String),
    /// A fetch was refused by the access policy of the storage layer.
    #[error("Access to {type_name} {id} vetoed")]
    AccessVetoed { type_name: String, id: String },
    /// The encryption provider failed or is missing.
    #[error("Encryption error: {0}")]
    Encryption(String),
    /// A registered converter failed.
    #[error("Conversion error: {0}")]
    Conversion(String),
    /// The document violates the shape the mapper expects.
    #[error("Invalid document: {0}")]
    InvalidDocument(String),
    /// A stored record changed since it was loaded.
    #[error("Concurrent modification of {type_name} {id}: expected version {expected}, found {actual}")]
    ConcurrentModification {
        type_name: String,
        id: String,
        expected: i64,
        actual: i64,
    },
    /// An error occurred in the underlying storage layer.
    #[error("Backend error: {0}")]
    Backend(String),
    /// Serialization/deserialization error when converting between BSON and JSON.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// A specialized `Result` type for mapping operations.
pub type MappingResult<T> = Result<T, MappingError>;

impl MappingError {
    pub fn field_not_found(type_name: impl Into<String>, field: impl Into<String>) -> Self {
        MappingError::FieldNotFound {
            type_name: type_name.into(),
            field: field.into(),
        }
    }

    /// Builds a [`MappingError::Coercion`] that is not yet attached to a field.
    ///
    /// Use [`MappingError::in_field`] to attach the field name once it is known.
    pub fn coercion(expected: impl Display, actual: impl Display) -> Self {
        MappingError::Coercion {
            field: String::new(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    pub fn invalid_declaration(type_name: impl Into<String>, reason: impl Into<String>) -> Self {
        MappingError::InvalidDeclaration {
            type_name: type_name.into(),
            reason: reason.into(),
        }
    }

    /// Attaches a field name to a coercion error that does not carry one yet.
    ///
    /// Errors raised deeper in a nested record keep the innermost field name.
    pub fn in_field(self, name: &str) -> Self {
        match self {
            MappingError::Coercion {
                field,
                expected,
                actual,
            } if field.is_empty() => MappingError::Coercion {
                field: name.to_string(),
                expected,
                actual,
            },
            other => other,
        }
    }

    /// Returns `true` for the access-policy refusal that reference loading absorbs.
    pub fn is_veto(&self) -> bool {
        matches!(self, MappingError::AccessVetoed { .. })
    }

    pub fn is_field_not_found(&self) -> bool {
        matches!(self, MappingError::FieldNotFound { .. })
    }
}

impl From<BsonError> for MappingError {
    fn from(err: BsonError) -> Self {
        MappingError::Serialization(err.to_string())
    }
}

impl From<SerdeJsonError> for MappingError {
    fn from(err: SerdeJsonError) -> Self {
        MappingError::Serialization(err.to_string())
    }
}
